//! # Connection Management Module
//!
//! Owns the serial link and the dedicated read thread that feeds the pipeline.
//!
//! ## Key Components
//! - `SerialLinkManager`: opens the port, runs sessions, surfaces link loss
//! - Read loop: bytes → `FrameDecoder` → `SampleStore::append` → `DistributionHub::publish`
//! - Per-session atomic stop flag for deterministic disconnect
//!
//! ## Sessions
//! Every successful connect starts a new session: a fresh session id, a fresh
//! decoder with its sequence back at 0, and a cleared sample store. A link
//! failure ends the session and is reported once; reconnecting is left to the
//! caller.

use crate::error::LinkError;
use crate::frame::{ChecksumKind, DecoderStats, FrameDecoder};
use crate::hub::DistributionHub;
use crate::sample_store::SampleStore;
use crate::sensor::{LinkEvent, LinkStatus, SessionId};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serial2::SerialPort;
use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

const READ_CHUNK: usize = 4096;

struct ActiveLink {
    session: SessionId,
    should_stop: Arc<AtomicBool>,
    read_thread: thread::JoinHandle<()>,
}

/// State the read thread shares with the manager
struct LinkShared {
    status: Mutex<LinkStatus>,
    decoder_stats: Mutex<DecoderStats>,
    events: Sender<LinkEvent>,
}

impl LinkShared {
    fn status(&self) -> MutexGuard<'_, LinkStatus> {
        self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn decoder_stats(&self) -> MutexGuard<'_, DecoderStats> {
        self.decoder_stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: LinkEvent) {
        // Nobody listening is fine; status() still reflects the state
        let _ = self.events.send(event);
    }
}

/// Manages the serial link lifecycle.
///
/// One session at a time. `connect` while connected ends the current session
/// first.
pub struct SerialLinkManager {
    store: Arc<SampleStore>,
    hub: Arc<DistributionHub>,
    checksum: ChecksumKind,
    sample_rate: u32,
    read_timeout: Duration,
    last_session: SessionId,
    shared: Arc<LinkShared>,
    event_rx: Receiver<LinkEvent>,
    active: Option<ActiveLink>,
}

impl SerialLinkManager {
    pub fn new(
        store: Arc<SampleStore>,
        hub: Arc<DistributionHub>,
        checksum: ChecksumKind,
        sample_rate: u32,
        read_timeout: Duration,
    ) -> Self {
        let (events, event_rx) = unbounded();
        Self {
            store,
            hub,
            checksum,
            sample_rate,
            read_timeout,
            last_session: 0,
            shared: Arc::new(LinkShared {
                status: Mutex::new(LinkStatus::Idle),
                decoder_stats: Mutex::new(DecoderStats::default()),
                events,
            }),
            event_rx,
            active: None,
        }
    }

    /// Open `port` at `baud_rate` (8N1) and start a new session.
    pub fn connect(&mut self, port: &str, baud_rate: u32) -> Result<SessionId, LinkError> {
        self.disconnect();
        log::info!("Connecting to {} at {} baud", port, baud_rate);

        let unavailable = |e: std::io::Error| LinkError::Unavailable {
            port: port.to_string(),
            reason: e.to_string(),
        };
        let mut serial = SerialPort::open(port, baud_rate).map_err(unavailable)?;
        serial.set_read_timeout(self.read_timeout).map_err(unavailable)?;

        self.start_session(serial, port.to_string())
    }

    /// Start a new session reading from any byte source.
    ///
    /// Runs exactly the same loop as `connect`; used for replaying captures.
    pub fn connect_with<R>(&mut self, source: R, description: &str) -> Result<SessionId, LinkError>
    where
        R: Read + Send + 'static,
    {
        self.disconnect();
        log::info!("Connecting to {}", description);
        self.start_session(source, description.to_string())
    }

    fn start_session<R>(&mut self, source: R, port: String) -> Result<SessionId, LinkError>
    where
        R: Read + Send + 'static,
    {
        self.last_session += 1;
        let session = self.last_session;

        // No thread of an earlier session is running at this point
        self.store.begin_session(session);
        *self.shared.decoder_stats() = DecoderStats::default();
        *self.shared.status() = LinkStatus::Connected { session };
        self.shared.emit(LinkEvent::Connected {
            session,
            port: port.clone(),
        });

        let should_stop = Arc::new(AtomicBool::new(false));
        let reader = ReadLoop {
            session,
            port,
            decoder: FrameDecoder::new(self.checksum, self.sample_rate, session),
            store: self.store.clone(),
            hub: self.hub.clone(),
            shared: self.shared.clone(),
            should_stop: should_stop.clone(),
        };

        let spawned = thread::Builder::new()
            .name(format!("serial-read-{}", session))
            .spawn(move || reader.run(source));
        let read_thread = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                let error = LinkError::ThreadSpawn(e.to_string());
                log::error!("{}", error);
                *self.shared.status() = LinkStatus::Lost(error.clone());
                self.shared.emit(LinkEvent::Lost(error.clone()));
                return Err(error);
            }
        };

        log::info!("Session {} started", session);
        self.active = Some(ActiveLink {
            session,
            should_stop,
            read_thread,
        });
        Ok(session)
    }

    /// Stop the read loop and wait for the thread to exit.
    ///
    /// Returns once no further sample of the session will be appended or
    /// published. A no-op when nothing is connected.
    pub fn disconnect(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        log::info!("Disconnect requested for session {}", active.session);
        active.should_stop.store(true, Ordering::Relaxed);
        if active.read_thread.join().is_err() {
            log::error!("Serial read thread panicked");
        }

        let mut status = self.shared.status();
        if status.is_connected() {
            *status = LinkStatus::Disconnected {
                session: active.session,
            };
            drop(status);
            self.shared.emit(LinkEvent::Disconnected {
                session: active.session,
            });
        }
    }

    pub fn status(&self) -> LinkStatus {
        self.shared.status().clone()
    }

    /// Session of the running (or last) link, 0 before the first connect
    pub fn session(&self) -> SessionId {
        self.last_session
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Link events: connected, lost, disconnected
    pub fn events(&self) -> Receiver<LinkEvent> {
        self.event_rx.clone()
    }

    /// Decode statistics of the current or last session
    pub fn decoder_stats(&self) -> DecoderStats {
        *self.shared.decoder_stats()
    }
}

impl Drop for SerialLinkManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

struct ReadLoop {
    session: SessionId,
    port: String,
    decoder: FrameDecoder,
    store: Arc<SampleStore>,
    hub: Arc<DistributionHub>,
    shared: Arc<LinkShared>,
    should_stop: Arc<AtomicBool>,
}

impl ReadLoop {
    fn run<R: Read>(mut self, mut source: R) {
        let mut buffer = [0u8; READ_CHUNK];

        let failure = loop {
            if self.should_stop.load(Ordering::Relaxed) {
                break None;
            }
            match source.read(&mut buffer) {
                Ok(0) => break Some("end of stream".to_string()),
                Ok(n) => self.ingest(&buffer[..n]),
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Err(e) => break Some(e.to_string()),
            }
        };

        let stats = self.decoder.stats();
        log::debug!(
            "Session {} read loop ended: {} frames, {} bytes discarded, {:.1}% success",
            self.session,
            stats.frames_decoded,
            stats.bytes_discarded,
            stats.success_rate()
        );

        // A failure racing a requested disconnect is reported as the disconnect
        if let Some(reason) = failure {
            if !self.should_stop.load(Ordering::Relaxed) {
                let error = LinkError::Lost {
                    session: self.session,
                    reason,
                };
                log::error!("{} ({})", error, self.port);
                *self.shared.status() = LinkStatus::Lost(error.clone());
                self.shared.emit(LinkEvent::Lost(error));
            }
        }
    }

    fn ingest(&mut self, bytes: &[u8]) {
        self.decoder.push(bytes);
        for sample in self.decoder.samples() {
            self.store.append(sample);
            self.hub.publish(&sample);
        }
        *self.shared.decoder_stats() = self.decoder.stats();
    }
}
