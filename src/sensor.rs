//! # Sensor Data Types
//!
//! The decoded multi-channel `Sample` plus the status and event types the
//! serial link publishes to its caller.

use crate::error::LinkError;

/// Identifier of one acquisition session (connect → disconnect/loss)
pub type SessionId = u64;

/// One synchronized reading across all channels at one acquisition tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub session: SessionId,
    pub sequence: u64,
    pub relative_timestamp: f64,
    /// ADS1118 EEG reading
    pub eeg: i16,
    pub ppg_red: u32,
    pub ppg_ir: u32,
    /// Raw MPU6050 quaternion `(q0, q1, q2, q3)`
    pub quaternion: [i32; 4],
}

impl Sample {
    /// Nominal timestamp of `sequence` at `sample_rate`.
    ///
    /// Computed from the sequence number on every call so there is no drift,
    /// regardless of how many samples came before.
    pub fn relative_time(sequence: u64, sample_rate: u32) -> f64 {
        sequence as f64 / sample_rate as f64
    }
}

/// Events sent from the read thread to whoever holds `SerialLinkManager::events`
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Connected { session: SessionId, port: String },
    Lost(LinkError),
    Disconnected { session: SessionId },
}

/// Polled link state
#[derive(Debug, Clone, PartialEq)]
pub enum LinkStatus {
    Idle,
    Connected { session: SessionId },
    Lost(LinkError),
    Disconnected { session: SessionId },
}

impl LinkStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkStatus::Connected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_time_is_exact() {
        assert_eq!(Sample::relative_time(0, 500), 0.0);
        assert_eq!(Sample::relative_time(1, 500), 0.002);
        assert_eq!(format!("{:.6}", Sample::relative_time(2499, 500)), "4.998000");
        // No accumulation: a large index is still exact division
        assert_eq!(Sample::relative_time(1_000_000, 500), 2000.0);
    }

    #[test]
    fn test_link_status_connected() {
        assert!(LinkStatus::Connected { session: 1 }.is_connected());
        assert!(!LinkStatus::Idle.is_connected());
    }
}
