//! # Recording Module
//!
//! Persists the sample stream to CSV on a dedicated writer thread.
//!
//! ## Architecture
//! - **Recorder**: owns the recording lifecycle (`start` / `stop`)
//! - **Writer Thread**: drains a hub subscription into the CSV file
//! - **Helpers**: `export_csv` / `export_json` for buffer snapshots, `read_recording` to load a file back
//!
//! ## Key Features
//! 1. Non-blocking: the read thread only ever `publish`es; the writer runs on its own pace
//! 2. Fail fast: the file is opened and the header written before `start` returns
//! 3. Lossless or loud: a full writer queue is counted, and `stop` reports it
//!
//! ## CSV Format
//! ```text
//! timestamp,ads1118,red_led,ir_led,quat_0,quat_1,quat_2,quat_3
//! 0.000000,1156,585311,1137662,449216056,-667929544,-468222394,-534569319
//! ```
//! `timestamp` is seconds since the first row of the file, with six decimals;
//! all other columns are the raw integers as decoded. A file that spans a
//! reconnect continues one sample period after the last row of the previous
//! session, so the column never goes backwards.

use crate::error::RecorderError;
use crate::hub::{ConsumerStats, DistributionHub, OverflowPolicy, Subscription};
use crate::sensor::{Sample, SessionId};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

pub const CSV_HEADER: [&str; 8] = [
    "timestamp", "ads1118", "red_led", "ir_led", "quat_0", "quat_1", "quat_2", "quat_3",
];

/// Outcome of a completed recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSummary {
    pub path: PathBuf,
    pub rows_written: u64,
}

/// Places samples on the timeline of one output file.
#[derive(Debug, Default)]
struct RowClock {
    session: Option<SessionId>,
    /// `relative_timestamp` of the current session's first row
    origin: f64,
    /// File time of the current session's first row
    offset: f64,
    previous: Option<(u64, f64)>,
    last_row: f64,
    period: f64,
}

impl RowClock {
    fn row_time(&mut self, sample: &Sample) -> f64 {
        if self.session != Some(sample.session) {
            if self.session.is_some() {
                self.offset = self.last_row + self.period;
            }
            self.session = Some(sample.session);
            self.origin = sample.relative_timestamp;
        } else if let Some((sequence, timestamp)) = self.previous {
            if sample.sequence > sequence {
                self.period =
                    (sample.relative_timestamp - timestamp) / (sample.sequence - sequence) as f64;
            }
        }
        self.previous = Some((sample.sequence, sample.relative_timestamp));
        self.last_row = self.offset + (sample.relative_timestamp - self.origin);
        self.last_row
    }
}

fn sample_record(sample: &Sample, timestamp: f64) -> [String; 8] {
    [
        format!("{:.6}", timestamp),
        sample.eeg.to_string(),
        sample.ppg_red.to_string(),
        sample.ppg_ir.to_string(),
        sample.quaternion[0].to_string(),
        sample.quaternion[1].to_string(),
        sample.quaternion[2].to_string(),
        sample.quaternion[3].to_string(),
    ]
}

struct ActiveRecording {
    path: PathBuf,
    stop_tx: Sender<()>,
    writer_thread: thread::JoinHandle<Result<(), RecorderError>>,
    rows_written: Arc<AtomicU64>,
    consumer: Arc<ConsumerStats>,
}

/// Records hub samples to a CSV file.
///
/// One recording at a time. The writer thread owns the file, so the handle is
/// released on every exit path, including a write error mid-recording.
pub struct Recorder {
    hub: Arc<DistributionHub>,
    queue_capacity: usize,
    active: Option<ActiveRecording>,
}

impl Recorder {
    /// # Arguments
    /// * `hub` - Distribution hub to subscribe to
    /// * `queue_capacity` - Samples the writer may fall behind before backlog is reported
    pub fn new(hub: Arc<DistributionHub>, queue_capacity: usize) -> Self {
        Self {
            hub,
            queue_capacity,
            active: None,
        }
    }

    /// Start recording to a timestamped file in `output_dir`.
    pub fn start_in(&mut self, output_dir: impl AsRef<Path>) -> Result<PathBuf, RecorderError> {
        let output_dir = output_dir.as_ref();
        if !output_dir.exists() {
            fs::create_dir_all(output_dir)?;
        }

        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = output_dir.join(format!("data_record_{}.csv", timestamp));
        self.start(&path)?;
        Ok(path)
    }

    /// Start recording to `path`.
    ///
    /// The file is created and the header written before the subscription is
    /// registered, so an unwritable destination fails here and not later.
    pub fn start(&mut self, path: impl AsRef<Path>) -> Result<(), RecorderError> {
        if self.active.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }
        let path = path.as_ref().to_path_buf();

        let file = File::create(&path)?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(CSV_HEADER)?;
        writer.flush()?;

        let subscription = self
            .hub
            .subscribe("recorder", self.queue_capacity, OverflowPolicy::ReportBacklog);
        let consumer = subscription.stats();
        let rows_written = Arc::new(AtomicU64::new(0));
        let (stop_tx, stop_rx) = bounded(1);

        let rows = rows_written.clone();
        let writer_thread = thread::Builder::new()
            .name("recorder-writer".to_string())
            .spawn(move || Self::writer_loop(writer, subscription, stop_rx, rows))?;

        log::info!("Starting recording to: {}", path.display());
        self.active = Some(ActiveRecording {
            path,
            stop_tx,
            writer_thread,
            rows_written,
            consumer,
        });
        Ok(())
    }

    /// Stop recording, draining everything already queued before closing the file.
    ///
    /// Returns `RecorderError::Backlog` if any sample could not be queued for
    /// the writer; the file is complete up to that point and closed either way.
    pub fn stop(&mut self) -> Result<RecordingSummary, RecorderError> {
        let Some(active) = self.active.take() else {
            return Err(RecorderError::NotRecording);
        };

        log::info!("Stopping recording");
        let _ = active.stop_tx.send(());
        let written = match active.writer_thread.join() {
            Ok(result) => result,
            Err(_) => Err(RecorderError::WriterPanicked),
        };

        let rows_written = active.rows_written.load(Ordering::Relaxed);
        let missed = active.consumer.backlogged();
        written?;

        log::info!(
            "Recording closed: {} ({} rows)",
            active.path.display(),
            rows_written
        );
        if missed > 0 {
            log::warn!("Recording incomplete: {} samples were not queued", missed);
            return Err(RecorderError::Backlog {
                rows_written,
                missed,
            });
        }

        Ok(RecordingSummary {
            path: active.path,
            rows_written,
        })
    }

    /// Report a backlog on the running recording, if there is one.
    pub fn check_backlog(&self) -> Result<(), RecorderError> {
        match &self.active {
            Some(active) if active.consumer.backlogged() > 0 => Err(RecorderError::Backlog {
                rows_written: active.rows_written.load(Ordering::Relaxed),
                missed: active.consumer.backlogged(),
            }),
            _ => Ok(()),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.path.as_path())
    }

    /// Rows written so far by the running recording
    pub fn rows_written(&self) -> u64 {
        self.active
            .as_ref()
            .map(|a| a.rows_written.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Writer thread loop
    ///
    /// Writes samples as they arrive. On the stop signal, drains whatever is
    /// still queued, then flushes. The file closes when `writer` drops.
    fn writer_loop(
        mut writer: csv::Writer<File>,
        subscription: Subscription,
        stop_rx: Receiver<()>,
        rows_written: Arc<AtomicU64>,
    ) -> Result<(), RecorderError> {
        let mut clock = RowClock::default();
        loop {
            let next = select! {
                recv(subscription.receiver()) -> msg => msg.ok(),
                recv(stop_rx) -> _ => None,
            };
            match next {
                Some(sample) => {
                    writer.write_record(sample_record(&sample, clock.row_time(&sample)))?;
                    rows_written.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }

        for sample in subscription.try_iter() {
            writer.write_record(sample_record(&sample, clock.row_time(&sample)))?;
            rows_written.fetch_add(1, Ordering::Relaxed);
        }
        writer.flush()?;
        log::debug!("Writer thread stopped");
        Ok(())
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if self.active.is_some() {
            if let Err(e) = self.stop() {
                log::error!("Failed to stop recording cleanly: {}", e);
            }
        }
    }
}

/// Write `samples` to `path` in the recording format.
///
/// Used to export a sample store snapshot. Timestamps start at 0 on the first
/// sample. Returns the number of rows written.
pub fn export_csv(samples: &[Sample], path: impl AsRef<Path>) -> Result<usize, RecorderError> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_writer(File::create(path)?);
    writer.write_record(CSV_HEADER)?;
    let mut clock = RowClock::default();
    for sample in samples {
        writer.write_record(sample_record(sample, clock.row_time(sample)))?;
    }
    writer.flush()?;

    log::info!("Exported {} samples to {}", samples.len(), path.display());
    Ok(samples.len())
}

/// One entry of a JSON export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    /// Seconds since the first exported sample
    pub timestamp: f64,
    pub frame_id: u64,
    pub ads1118: i16,
    pub red_led: u32,
    pub ir_led: u32,
    pub quat: [i32; 4],
}

/// Write `samples` to `path` as a pretty-printed JSON array of `ExportRecord`s.
///
/// `frame_id` is the sample's sequence number within its session. Returns the
/// number of records written.
pub fn export_json(samples: &[Sample], path: impl AsRef<Path>) -> Result<usize, RecorderError> {
    let path = path.as_ref();
    let mut clock = RowClock::default();
    let records: Vec<ExportRecord> = samples
        .iter()
        .map(|sample| ExportRecord {
            timestamp: clock.row_time(sample),
            frame_id: sample.sequence,
            ads1118: sample.eeg,
            red_led: sample.ppg_red,
            ir_led: sample.ppg_ir,
            quat: sample.quaternion,
        })
        .collect();

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &records)?;
    writer.flush()?;

    log::info!("Exported {} samples to {}", records.len(), path.display());
    Ok(records.len())
}

/// Load a recording back into samples.
///
/// The sequence number is recovered from the timestamp at `sample_rate`, so
/// gaps in a recording stay visible as sequence gaps. Samples carry session 0.
pub fn read_recording(path: impl AsRef<Path>, sample_rate: u32) -> Result<Vec<Sample>, RecorderError> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;

    let headers = reader.headers()?.clone();
    if headers.iter().ne(CSV_HEADER.iter().copied()) {
        return Err(RecorderError::InvalidRow {
            line: 1,
            reason: format!("unexpected header: {:?}", headers),
        });
    }

    let mut samples = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let invalid = |reason: String| RecorderError::InvalidRow { line, reason };

        if record.len() != CSV_HEADER.len() {
            return Err(invalid(format!("expected {} fields, got {}", CSV_HEADER.len(), record.len())));
        }
        let timestamp: f64 = record[0]
            .parse()
            .map_err(|e| invalid(format!("timestamp '{}': {}", &record[0], e)))?;
        if !timestamp.is_finite() || timestamp < 0.0 {
            return Err(invalid(format!("timestamp out of range: {}", timestamp)));
        }
        let eeg: i16 = record[1]
            .parse()
            .map_err(|e| invalid(format!("ads1118 '{}': {}", &record[1], e)))?;
        let ppg_red: u32 = record[2]
            .parse()
            .map_err(|e| invalid(format!("red_led '{}': {}", &record[2], e)))?;
        let ppg_ir: u32 = record[3]
            .parse()
            .map_err(|e| invalid(format!("ir_led '{}': {}", &record[3], e)))?;
        let mut quaternion = [0i32; 4];
        for (i, q) in quaternion.iter_mut().enumerate() {
            *q = record[4 + i]
                .parse()
                .map_err(|e| invalid(format!("quat_{} '{}': {}", i, &record[4 + i], e)))?;
        }

        let sequence = (timestamp * sample_rate as f64).round() as u64;
        samples.push(Sample {
            session: 0,
            sequence,
            relative_timestamp: Sample::relative_time(sequence, sample_rate),
            eeg,
            ppg_red,
            ppg_ir,
            quaternion,
        });
    }

    Ok(samples)
}
