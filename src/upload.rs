//! # Cloud Upload Module
//!
//! Packages a trailing window of samples for the remote emotion classifier and
//! interprets its answer.
//!
//! ## Key Components
//! - `CloudUploadClient`: snapshot → request → single POST → `EmotionResult`
//! - `EmotionTransport`: the HTTP seam; `HttpTransport` is the reqwest implementation
//! - `AutoUploader`: periodic submission on a tokio task, outcomes over a channel
//!
//! Every attempt works on an owned store snapshot, so a slow or failing server
//! never touches acquisition, recording or the live view. There are no retries;
//! the periodic uploader simply tries again on its next tick.
//!
//! ## Wire Format
//! Request (`POST`, JSON): `timestamp`, `sample_rate`, `data_length`, `eeg_data`,
//! `ppg_red_data`, `ppg_ir_data`, `imu_data` (one `[q0, q1, q2, q3]` per sample).
//!
//! Response: `status`, `emotion`, `confidence`, optional `details` scores and
//! optional server `timestamp`.

use crate::error::UploadError;
use crate::sample_store::SampleStore;
use crate::sensor::Sample;
use async_trait::async_trait;
use crossbeam_channel::{unbounded, Receiver};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

// Longest slice of a server error body kept in an error message
const ERROR_BODY_LIMIT: usize = 200;

/// Body of an upload request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionRequest {
    pub timestamp: String,
    pub sample_rate: u32,
    pub data_length: usize,
    pub eeg_data: Vec<i16>,
    pub ppg_red_data: Vec<u32>,
    pub ppg_ir_data: Vec<u32>,
    pub imu_data: Vec<[i32; 4]>,
}

impl EmotionRequest {
    /// Build a request from consecutive samples, stamped with local wall-clock time.
    pub fn from_samples(samples: &[Sample], sample_rate: u32) -> Self {
        Self {
            timestamp: chrono::Local::now()
                .format("%Y-%m-%dT%H:%M:%S%.6f")
                .to_string(),
            sample_rate,
            data_length: samples.len(),
            eeg_data: samples.iter().map(|s| s.eeg).collect(),
            ppg_red_data: samples.iter().map(|s| s.ppg_red).collect(),
            ppg_ir_data: samples.iter().map(|s| s.ppg_ir).collect(),
            imu_data: samples.iter().map(|s| s.quaternion).collect(),
        }
    }

    /// All channel arrays must have exactly `data_length` entries.
    pub fn validate(&self) -> Result<(), UploadError> {
        let lengths = [
            ("eeg_data", self.eeg_data.len()),
            ("ppg_red_data", self.ppg_red_data.len()),
            ("ppg_ir_data", self.ppg_ir_data.len()),
            ("imu_data", self.imu_data.len()),
        ];
        for (field, len) in lengths {
            if len != self.data_length {
                return Err(UploadError::RequestMalformed(format!(
                    "{} has {} entries, data_length is {}",
                    field, len, self.data_length
                )));
            }
        }
        if self.sample_rate == 0 {
            return Err(UploadError::RequestMalformed("sample_rate is zero".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Emotion {
    Happy,
    Sad,
    Neutral,
}

impl Emotion {
    /// Parse a classifier label.
    ///
    /// English labels are case-insensitive; the reference test server's
    /// Chinese labels are accepted as well.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "happy" | "开心" => Some(Emotion::Happy),
            "sad" | "悲伤" => Some(Emotion::Sad),
            "neutral" | "中性" => Some(Emotion::Neutral),
            _ => None,
        }
    }

    /// Key of this emotion's entry in `EmotionResult::details`
    pub fn score_key(&self) -> &'static str {
        match self {
            Emotion::Happy => "happy_score",
            Emotion::Sad => "sad_score",
            Emotion::Neutral => "neutral_score",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Emotion::Happy => write!(f, "Happy"),
            Emotion::Sad => write!(f, "Sad"),
            Emotion::Neutral => write!(f, "Neutral"),
        }
    }
}

/// Classifier verdict for one upload
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionResult {
    pub emotion: Emotion,
    /// In `0.0..=1.0`
    pub confidence: f64,
    /// Per-emotion scores, empty when the server sent none
    pub details: BTreeMap<String, f64>,
    pub server_timestamp: Option<String>,
}

impl EmotionResult {
    pub fn score(&self, emotion: Emotion) -> Option<f64> {
        self.details.get(emotion.score_key()).copied()
    }
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    status: Option<String>,
    emotion: Option<String>,
    confidence: Option<f64>,
    #[serde(default)]
    details: BTreeMap<String, f64>,
    message: Option<String>,
    timestamp: Option<String>,
}

/// Interpret a response body from a 2xx reply.
pub fn parse_response(body: &str) -> Result<EmotionResult, UploadError> {
    let raw: RawResponse = serde_json::from_str(body)
        .map_err(|e| UploadError::ResponseMalformed(format!("invalid JSON: {}", e)))?;

    match raw.status.as_deref() {
        Some("success") => {}
        Some("error") => {
            return Err(UploadError::UploadFailed(format!(
                "server rejected upload: {}",
                raw.message.as_deref().unwrap_or("no message")
            )))
        }
        Some(other) => {
            return Err(UploadError::ResponseMalformed(format!("unknown status '{}'", other)))
        }
        None => return Err(UploadError::ResponseMalformed("missing status".to_string())),
    }

    let label = raw
        .emotion
        .ok_or_else(|| UploadError::ResponseMalformed("missing emotion".to_string()))?;
    let emotion = Emotion::from_label(&label)
        .ok_or_else(|| UploadError::ResponseMalformed(format!("unknown emotion '{}'", label)))?;
    let confidence = raw
        .confidence
        .ok_or_else(|| UploadError::ResponseMalformed("missing confidence".to_string()))?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(UploadError::ResponseMalformed(format!(
            "confidence {} outside 0..=1",
            confidence
        )));
    }

    Ok(EmotionResult {
        emotion,
        confidence,
        details: raw.details,
        server_timestamp: raw.timestamp,
    })
}

/// Raw HTTP answer
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    Timeout,
    Failed(String),
}

/// Sends one JSON request and returns the raw reply.
#[async_trait]
pub trait EmotionTransport: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        body: &EmotionRequest,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError>;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl HttpTransport {
    /// # Arguments
    /// * `api_key` - Sent as a bearer token when present
    /// * `verify_ssl` - Reject invalid TLS certificates
    pub fn new(api_key: Option<String>, verify_ssl: bool) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify_ssl)
            .build()
            .map_err(|e| UploadError::UploadFailed(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self { client, api_key })
    }
}

fn transport_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Failed(e.to_string())
    }
}

#[async_trait]
impl EmotionTransport for HttpTransport {
    async fn post_json(
        &self,
        url: &str,
        body: &EmotionRequest,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let mut request = self.client.post(url).timeout(timeout).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;
        Ok(TransportResponse { status, body })
    }
}

/// Uploads trailing windows of the sample store to the classifier.
pub struct CloudUploadClient<T: EmotionTransport> {
    store: Arc<SampleStore>,
    transport: T,
    min_seconds: f64,
}

impl<T: EmotionTransport> CloudUploadClient<T> {
    /// # Arguments
    /// * `min_seconds` - Minimum buffered duration required before any request is sent
    pub fn new(store: Arc<SampleStore>, transport: T, min_seconds: f64) -> Self {
        Self {
            store,
            transport,
            min_seconds,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Samples required at `sample_rate`
    pub fn min_samples(&self, sample_rate: u32) -> usize {
        (self.min_seconds * sample_rate as f64).round() as usize
    }

    /// Whether a window of `window_seconds` would currently pass the minimum.
    pub fn has_enough_data(&self, window_seconds: f64, sample_rate: u32) -> bool {
        self.store.snapshot(window_seconds).len() >= self.min_samples(sample_rate)
    }

    // The snapshot window is measured at the store's rate, so the request must agree
    fn check_rate(&self, sample_rate: u32) -> Result<(), UploadError> {
        let store_rate = self.store.sample_rate();
        if sample_rate != store_rate {
            return Err(UploadError::RequestMalformed(format!(
                "sample_rate {} does not match the store's {} Hz",
                sample_rate, store_rate
            )));
        }
        Ok(())
    }

    /// Run one upload attempt.
    ///
    /// Fails with `InsufficientData` or `RequestMalformed` before any network
    /// call; otherwise sends exactly one request and waits at most `timeout`.
    pub async fn submit(
        &self,
        window_seconds: f64,
        sample_rate: u32,
        server_url: &str,
        timeout: Duration,
    ) -> Result<EmotionResult, UploadError> {
        self.check_rate(sample_rate)?;
        let samples = self.store.snapshot(window_seconds);
        let required = self.min_samples(sample_rate);
        if samples.len() < required {
            return Err(UploadError::InsufficientData {
                available: samples.len(),
                required,
            });
        }

        let request = EmotionRequest::from_samples(&samples, sample_rate);
        request.validate()?;
        log::info!(
            "Uploading {} samples ({:.1}s) to {}",
            request.data_length,
            request.data_length as f64 / sample_rate as f64,
            server_url
        );

        let sent = tokio::time::timeout(
            timeout,
            self.transport.post_json(server_url, &request, timeout),
        )
        .await;
        let response = match sent {
            Err(_) | Ok(Err(TransportError::Timeout)) => {
                log::warn!("Upload to {} timed out after {:?}", server_url, timeout);
                return Err(UploadError::UploadTimeout);
            }
            Ok(Err(TransportError::Failed(reason))) => {
                log::warn!("Upload to {} failed: {}", server_url, reason);
                return Err(UploadError::UploadFailed(reason));
            }
            Ok(Ok(response)) => response,
        };

        if !(200..300).contains(&response.status) {
            let excerpt: String = response.body.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(UploadError::UploadFailed(format!(
                "HTTP {}: {}",
                response.status, excerpt
            )));
        }

        let result = parse_response(&response.body)?;
        log::info!(
            "Emotion result: {} ({:.1}% confidence)",
            result.emotion,
            result.confidence * 100.0
        );
        Ok(result)
    }
}

impl<T: EmotionTransport + 'static> CloudUploadClient<T> {
    /// Run `submit` on `handle` without blocking the caller.
    pub fn spawn_submit(
        self: &Arc<Self>,
        handle: &Handle,
        window_seconds: f64,
        sample_rate: u32,
        server_url: String,
        timeout: Duration,
    ) -> JoinHandle<Result<EmotionResult, UploadError>> {
        let client = self.clone();
        handle.spawn(async move {
            client
                .submit(window_seconds, sample_rate, &server_url, timeout)
                .await
        })
    }
}

/// Parameters of periodic uploading
#[derive(Debug, Clone, PartialEq)]
pub struct UploadSchedule {
    pub server_url: String,
    pub window_seconds: f64,
    pub sample_rate: u32,
    pub timeout: Duration,
    pub interval: Duration,
}

/// Result of one periodic attempt
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    /// 1-based attempt counter
    pub attempt: u64,
    pub result: Result<EmotionResult, UploadError>,
}

/// Submits on a fixed interval until stopped.
///
/// Attempts never overlap: ticks that come due while an upload is in flight
/// are skipped.
pub struct AutoUploader {
    task: JoinHandle<()>,
}

impl AutoUploader {
    /// Start uploading on `handle`.
    ///
    /// Refuses to start with `InsufficientData` when the store does not yet
    /// hold the minimum window. The first attempt is made immediately.
    pub fn start<T: EmotionTransport + 'static>(
        client: Arc<CloudUploadClient<T>>,
        handle: &Handle,
        schedule: UploadSchedule,
    ) -> Result<(Self, Receiver<UploadOutcome>), UploadError> {
        client.check_rate(schedule.sample_rate)?;
        let available = client.store.snapshot(schedule.window_seconds).len();
        let required = client.min_samples(schedule.sample_rate);
        if available < required {
            return Err(UploadError::InsufficientData {
                available,
                required,
            });
        }

        let (outcome_tx, outcome_rx) = unbounded();
        log::info!(
            "Starting periodic upload every {:?} to {}",
            schedule.interval,
            schedule.server_url
        );

        let task = handle.spawn(async move {
            let mut ticker = tokio::time::interval(schedule.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut attempt = 0u64;
            loop {
                ticker.tick().await;
                attempt += 1;
                let result = client
                    .submit(
                        schedule.window_seconds,
                        schedule.sample_rate,
                        &schedule.server_url,
                        schedule.timeout,
                    )
                    .await;
                if outcome_tx.send(UploadOutcome { attempt, result }).is_err() {
                    log::debug!("Upload outcome receiver dropped, stopping periodic upload");
                    break;
                }
            }
        });

        Ok((Self { task }, outcome_rx))
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop uploading. An attempt in flight is abandoned.
    pub fn stop(&self) {
        self.task.abort();
        log::info!("Periodic upload stopped");
    }
}

impl Drop for AutoUploader {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const SUCCESS_BODY: &str = r#"{
        "status": "success",
        "emotion": "开心",
        "confidence": 0.72,
        "details": {"happy_score": 0.72, "sad_score": 0.18, "neutral_score": 0.10},
        "timestamp": "2024-01-01T12:00:00.000000"
    }"#;

    struct MockTransport {
        calls: AtomicUsize,
        reply: Result<TransportResponse, TransportError>,
        delay: Duration,
        last_request: Mutex<Option<EmotionRequest>>,
    }

    impl MockTransport {
        fn replying(status: u16, body: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                reply: Ok(TransportResponse {
                    status,
                    body: body.to_string(),
                }),
                delay: Duration::ZERO,
                last_request: Mutex::new(None),
            }
        }

        fn failing(error: TransportError) -> Self {
            Self {
                reply: Err(error),
                ..Self::replying(200, "")
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmotionTransport for MockTransport {
        async fn post_json(
            &self,
            _url: &str,
            body: &EmotionRequest,
            _timeout: Duration,
        ) -> Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(body.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply.clone()
        }
    }

    fn filled_store(count: u64) -> Arc<SampleStore> {
        let store = Arc::new(SampleStore::new(500, 10.0));
        for sequence in 0..count {
            store.append(Sample {
                session: 1,
                sequence,
                relative_timestamp: Sample::relative_time(sequence, 500),
                eeg: 1156,
                ppg_red: 585311,
                ppg_ir: 1137662,
                quaternion: [449216056, -667929544, -468222394, -534569319],
            });
        }
        store
    }

    fn mock_client(count: u64, transport: MockTransport) -> CloudUploadClient<MockTransport> {
        CloudUploadClient::new(filled_store(count), transport, 5.0)
    }

    async fn submit(client: &CloudUploadClient<MockTransport>) -> Result<EmotionResult, UploadError> {
        client
            .submit(5.0, 500, "http://127.0.0.1:5000/api/emotion", Duration::from_secs(1))
            .await
    }

    #[tokio::test]
    async fn test_sample_rate_mismatch_makes_no_call() {
        let client = mock_client(3000, MockTransport::replying(200, SUCCESS_BODY));
        let result = client
            .submit(5.0, 250, "http://127.0.0.1:5000/api/emotion", Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(UploadError::RequestMalformed(_))));
        assert_eq!(client.transport().calls(), 0);

        let schedule = UploadSchedule {
            server_url: "http://localhost".to_string(),
            window_seconds: 5.0,
            sample_rate: 1000,
            timeout: Duration::from_secs(1),
            interval: Duration::from_secs(2),
        };
        let started = AutoUploader::start(Arc::new(client), &Handle::current(), schedule);
        assert!(matches!(started, Err(UploadError::RequestMalformed(_))));
    }

    #[tokio::test]
    async fn test_insufficient_data_makes_no_call() {
        let client = mock_client(1000, MockTransport::replying(200, SUCCESS_BODY));
        let result = submit(&client).await;
        assert_eq!(
            result,
            Err(UploadError::InsufficientData {
                available: 1000,
                required: 2500
            })
        );
        assert_eq!(client.transport().calls(), 0);
    }

    #[tokio::test]
    async fn test_successful_upload() {
        let client = mock_client(3000, MockTransport::replying(200, SUCCESS_BODY));
        let result = submit(&client).await.unwrap();
        assert_eq!(result.emotion, Emotion::Happy);
        assert_eq!(result.confidence, 0.72);
        assert_eq!(result.score(Emotion::Sad), Some(0.18));
        assert_eq!(client.transport().calls(), 1);

        let request = client.transport().last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.data_length, 2500);
        assert_eq!(request.sample_rate, 500);
        assert_eq!(request.eeg_data.len(), 2500);
        assert_eq!(request.imu_data[0], [449216056, -667929544, -468222394, -534569319]);
    }

    #[tokio::test]
    async fn test_request_json_shape() {
        let client = mock_client(2500, MockTransport::replying(200, SUCCESS_BODY));
        submit(&client).await.unwrap();
        let request = client.transport().last_request.lock().unwrap().clone().unwrap();
        let json: serde_json::Value = serde_json::to_value(&request).unwrap();
        assert_eq!(json["data_length"], 2500);
        assert_eq!(json["ppg_red_data"][0], 585311);
        assert_eq!(json["imu_data"][0][1], -667929544);
        assert!(json["timestamp"].as_str().is_some_and(|t| t.contains('T')));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let client = mock_client(2500, MockTransport::replying(500, "internal error"));
        match submit(&client).await {
            Err(UploadError::UploadFailed(msg)) => assert!(msg.contains("500")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_failures() {
        let client = mock_client(
            2500,
            MockTransport::failing(TransportError::Failed("connection refused".to_string())),
        );
        assert_eq!(
            submit(&client).await,
            Err(UploadError::UploadFailed("connection refused".to_string()))
        );

        let client = mock_client(2500, MockTransport::failing(TransportError::Timeout));
        assert_eq!(submit(&client).await, Err(UploadError::UploadTimeout));
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let transport = MockTransport {
            delay: Duration::from_millis(500),
            ..MockTransport::replying(200, SUCCESS_BODY)
        };
        let client = mock_client(2500, transport);
        let result = client
            .submit(5.0, 500, "http://localhost", Duration::from_millis(50))
            .await;
        assert_eq!(result, Err(UploadError::UploadTimeout));
        assert_eq!(client.transport().calls(), 1);
    }

    #[test]
    fn test_malformed_responses() {
        let cases = [
            "not json",
            r#"{"emotion": "happy", "confidence": 0.5}"#,
            r#"{"status": "pending", "emotion": "happy", "confidence": 0.5}"#,
            r#"{"status": "success", "confidence": 0.5}"#,
            r#"{"status": "success", "emotion": "angry", "confidence": 0.5}"#,
            r#"{"status": "success", "emotion": "happy"}"#,
            r#"{"status": "success", "emotion": "happy", "confidence": 1.5}"#,
        ];
        for body in cases {
            assert!(
                matches!(parse_response(body), Err(UploadError::ResponseMalformed(_))),
                "accepted {}",
                body
            );
        }
    }

    #[test]
    fn test_server_error_status() {
        let body = r#"{"status": "error", "error_code": "INVALID_DATA", "message": "missing field"}"#;
        match parse_response(body) {
            Err(UploadError::UploadFailed(msg)) => assert!(msg.contains("missing field")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_emotion_labels() {
        assert_eq!(Emotion::from_label("HAPPY"), Some(Emotion::Happy));
        assert_eq!(Emotion::from_label(" sad "), Some(Emotion::Sad));
        assert_eq!(Emotion::from_label("中性"), Some(Emotion::Neutral));
        assert_eq!(Emotion::from_label("surprised"), None);

        let result = parse_response(r#"{"status": "success", "emotion": "Neutral", "confidence": 0.4}"#).unwrap();
        assert_eq!(result.emotion, Emotion::Neutral);
        assert!(result.details.is_empty());
        assert_eq!(result.server_timestamp, None);
    }

    #[test]
    fn test_request_validation() {
        let mut request = EmotionRequest::from_samples(&filled_store(10).snapshot_all(), 500);
        assert!(request.validate().is_ok());
        request.ppg_ir_data.pop();
        assert!(matches!(request.validate(), Err(UploadError::RequestMalformed(_))));
    }

    #[tokio::test]
    async fn test_spawn_submit() {
        let client = Arc::new(mock_client(2500, MockTransport::replying(200, SUCCESS_BODY)));
        let handle = client.spawn_submit(
            &Handle::current(),
            5.0,
            500,
            "http://localhost".to_string(),
            Duration::from_secs(1),
        );
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.emotion, Emotion::Happy);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_auto_uploader_repeats() {
        let client = Arc::new(mock_client(2500, MockTransport::replying(200, SUCCESS_BODY)));
        let schedule = UploadSchedule {
            server_url: "http://localhost".to_string(),
            window_seconds: 5.0,
            sample_rate: 500,
            timeout: Duration::from_secs(1),
            interval: Duration::from_millis(20),
        };
        let (uploader, outcomes) =
            AutoUploader::start(client.clone(), &Handle::current(), schedule).unwrap();

        let first = tokio::task::spawn_blocking(move || {
            let a = outcomes.recv_timeout(Duration::from_secs(2));
            let b = outcomes.recv_timeout(Duration::from_secs(2));
            (a, b)
        })
        .await
        .unwrap();
        let (a, b) = (first.0.unwrap(), first.1.unwrap());
        assert_eq!(a.attempt, 1);
        assert_eq!(b.attempt, 2);
        assert!(a.result.is_ok());

        uploader.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!uploader.is_running());
    }

    #[tokio::test]
    async fn test_auto_uploader_needs_minimum_data() {
        let client = Arc::new(mock_client(100, MockTransport::replying(200, SUCCESS_BODY)));
        let schedule = UploadSchedule {
            server_url: "http://localhost".to_string(),
            window_seconds: 5.0,
            sample_rate: 500,
            timeout: Duration::from_secs(1),
            interval: Duration::from_secs(2),
        };
        let started = AutoUploader::start(client.clone(), &Handle::current(), schedule);
        assert!(matches!(started, Err(UploadError::InsufficientData { .. })));
        assert_eq!(client.transport().calls(), 0);
    }
}
