use clap::Parser;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use physio_acq::args::AcqArgs;
use physio_acq::config::Config;
use physio_acq::connection::SerialLinkManager;
use physio_acq::hub::DistributionHub;
use physio_acq::live_view::LiveViewFeed;
use physio_acq::recorder::Recorder;
use physio_acq::sample_store::SampleStore;
use physio_acq::sensor::LinkEvent;
use physio_acq::upload::{
    AutoUploader, CloudUploadClient, HttpTransport, UploadOutcome, UploadSchedule,
};
use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

const EVENT_POLL: Duration = Duration::from_millis(250);
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = AcqArgs::parse();
    match run(args) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: AcqArgs) -> Result<ExitCode, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    args.apply(&mut config);
    config.validate()?;

    let sample_rate = config.acquisition.sample_rate;
    let store = Arc::new(SampleStore::new(sample_rate, config.acquisition.capacity_seconds));
    let hub = Arc::new(DistributionHub::new());

    let mut live = LiveViewFeed::start(
        &hub,
        config.distribution.live_queue_capacity,
        config.distribution.live_window_seconds,
        sample_rate,
    )?;

    let mut recorder = Recorder::new(hub.clone(), config.distribution.recorder_queue_capacity);
    if !args.no_record {
        recorder.start_in(&config.recording.output_dir)?;
    }

    let mut link = SerialLinkManager::new(
        store.clone(),
        hub.clone(),
        config.acquisition.checksum,
        sample_rate,
        Duration::from_millis(config.serial.read_timeout_ms),
    );
    let events = link.events();
    match (&args.replay, &config.serial.port) {
        (Some(capture), _) => {
            let file = File::open(capture)?;
            link.connect_with(BufReader::new(file), &capture.display().to_string())?;
        }
        (None, Some(port)) => {
            link.connect(port, config.serial.baud_rate)?;
        }
        (None, None) => return Err("no serial port configured (use --port)".into()),
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let upload_client = if args.upload {
        let transport = HttpTransport::new(config.cloud.api_key.clone(), config.cloud.verify_ssl)?;
        Some(Arc::new(CloudUploadClient::new(
            store.clone(),
            transport,
            config.cloud.min_seconds,
        )))
    } else {
        None
    };
    let mut uploader: Option<(AutoUploader, Receiver<UploadOutcome>)> = None;

    let deadline = args
        .duration
        .map(|secs| Instant::now() + Duration::from_secs_f64(secs.max(0.0)));
    let mut next_status = Instant::now() + STATUS_INTERVAL;
    let mut lost = false;

    loop {
        match events.recv_timeout(EVENT_POLL) {
            Ok(LinkEvent::Lost(e)) => {
                log::error!("Acquisition stopped: {}", e);
                lost = true;
                break;
            }
            Ok(LinkEvent::Connected { session, port }) => {
                log::info!("Session {} running on {}", session, port);
            }
            Ok(LinkEvent::Disconnected { session }) => {
                log::info!("Session {} disconnected", session);
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        // Periodic upload starts once the first full window is buffered
        if uploader.is_none() {
            if let Some(client) = &upload_client {
                if client.has_enough_data(config.cloud.window_seconds, sample_rate) {
                    let schedule = UploadSchedule {
                        server_url: config.cloud.server_url.clone(),
                        window_seconds: config.cloud.window_seconds,
                        sample_rate,
                        timeout: config.cloud.timeout(),
                        interval: config.cloud.upload_interval(),
                    };
                    uploader = Some(AutoUploader::start(client.clone(), runtime.handle(), schedule)?);
                }
            }
        }
        if let Some((_, outcomes)) = &uploader {
            for outcome in outcomes.try_iter() {
                if let Err(e) = outcome.result {
                    log::warn!("Upload {} failed: {}", outcome.attempt, e);
                }
            }
        }

        if Instant::now() >= next_status {
            next_status += STATUS_INTERVAL;
            let stats = link.decoder_stats();
            let gaps = live.gap_stats();
            log::info!(
                "{} samples buffered, {} frames decoded ({:.1}% success), {} gaps, {} rows recorded",
                store.len(),
                stats.frames_decoded,
                stats.success_rate(),
                gaps.gaps,
                recorder.rows_written()
            );
            if let Err(e) = recorder.check_backlog() {
                log::warn!("{}", e);
            }
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            log::info!("Duration reached, stopping");
            break;
        }
    }

    if let Some((uploader, _)) = &uploader {
        uploader.stop();
    }
    link.disconnect();
    live.stop();

    let mut exit = if lost && args.replay.is_none() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    };
    if recorder.is_recording() {
        match recorder.stop() {
            Ok(summary) => log::info!(
                "Saved {} rows to {}",
                summary.rows_written,
                summary.path.display()
            ),
            Err(e) => {
                log::error!("{}", e);
                exit = ExitCode::FAILURE;
            }
        }
    }

    runtime.shutdown_timeout(Duration::from_secs(1));
    Ok(exit)
}
