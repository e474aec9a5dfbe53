//! # Frame Decoder Module
//!
//! Turns the raw serial byte stream into validated `Sample` records.
//!
//! ## Frame Layout (big-endian)
//! ```text
//! offset  size  field
//!  0      4     marker AB CD 11 26
//!  4      2     ADS1118 EEG (i16)
//!  6      14    internal ADC channels / reserved
//! 20      3     PPG red (u24)
//! 23      3     PPG IR (u24)
//! 26      16    quaternion q0..q3 (i32 each)
//! 42      0|1   checksum (ChecksumKind::Sum8 only)
//! ```
//!
//! ## Resynchronization
//! Bytes arrive in arbitrary chunks. A frame is only consumed once the marker
//! matches and the checksum (if any) verifies. Anything else discards exactly
//! one byte and rescans, so a corrupted stream heals itself at the next marker.
//! Partial frames stay buffered until the next `push`.
//!
//! Without a checksum the marker is the only integrity check. A frame that was
//! cut short on the wire runs into the next frame, which shows up as (part of)
//! a marker inside the 42 candidate bytes. Such a candidate is only accepted
//! when the next marker follows it directly; if the bytes after it disagree,
//! it is rejected as misaligned, and if they have not arrived yet the decoder
//! waits for them.

use crate::sensor::{Sample, SessionId};
use serde::{Deserialize, Serialize};

pub const FRAME_MARKER: [u8; 4] = [0xAB, 0xCD, 0x11, 0x26];

/// Frame length without a trailing checksum byte
pub const FRAME_BODY_LEN: usize = 42;

const EEG_OFFSET: usize = 4;
const PPG_RED_OFFSET: usize = 20;
const PPG_IR_OFFSET: usize = 23;
const QUAT_OFFSET: usize = 26;

// Compact the receive buffer once this many consumed bytes sit at its front
const COMPACT_THRESHOLD: usize = 4096;

/// Integrity check carried by each frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumKind {
    /// Marker-only validation, as the current firmware transmits
    #[default]
    None,
    /// One trailing byte: wrapping sum of bytes 4..42
    Sum8,
}

impl ChecksumKind {
    pub fn frame_len(&self) -> usize {
        match self {
            ChecksumKind::None => FRAME_BODY_LEN,
            ChecksumKind::Sum8 => FRAME_BODY_LEN + 1,
        }
    }

    fn verify(&self, frame: &[u8]) -> bool {
        match self {
            ChecksumKind::None => true,
            ChecksumKind::Sum8 => sum8(&frame[FRAME_MARKER.len()..FRAME_BODY_LEN]) == frame[FRAME_BODY_LEN],
        }
    }
}

fn sum8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Result of a single decode step that did not produce a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Marker or checksum mismatch; one byte was discarded
    Corrupt,
    /// More bytes are needed
    Incomplete,
}

/// Aggregate decode statistics for one session
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DecoderStats {
    pub frames_decoded: u64,
    pub bytes_discarded: u64,
    pub checksum_failures: u64,
    /// Candidates rejected because they overlap the next frame
    pub misaligned_frames: u64,
}

impl DecoderStats {
    /// Percentage of decode attempts that yielded a frame
    pub fn success_rate(&self) -> f64 {
        let total = self.frames_decoded + self.checksum_failures + self.misaligned_frames;
        if total == 0 {
            0.0
        } else {
            self.frames_decoded as f64 / total as f64 * 100.0
        }
    }
}

/// Incremental frame decoder for one acquisition session.
pub struct FrameDecoder {
    checksum: ChecksumKind,
    sample_rate: u32,
    session: SessionId,
    buffer: Vec<u8>,
    start: usize,
    next_sequence: u64,
    stats: DecoderStats,
}

impl FrameDecoder {
    pub fn new(checksum: ChecksumKind, sample_rate: u32, session: SessionId) -> Self {
        Self {
            checksum,
            sample_rate,
            session,
            buffer: Vec::with_capacity(COMPACT_THRESHOLD * 2),
            start: 0,
            next_sequence: 0,
            stats: DecoderStats::default(),
        }
    }

    /// Append raw bytes from the link.
    pub fn push(&mut self, bytes: &[u8]) {
        if self.start >= COMPACT_THRESHOLD {
            self.buffer.drain(..self.start);
            self.start = 0;
        }
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet consumed
    pub fn pending(&self) -> usize {
        self.buffer.len() - self.start
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    pub fn reset_statistics(&mut self) {
        self.stats = DecoderStats::default();
    }

    /// Start a new session: drop buffered bytes and restart the sequence at 0.
    pub fn reset(&mut self, session: SessionId) {
        self.buffer.clear();
        self.start = 0;
        self.next_sequence = 0;
        self.session = session;
        self.stats = DecoderStats::default();
    }

    /// Try to decode one frame from the buffered bytes.
    pub fn decode_next(&mut self) -> Result<Sample, DecodeError> {
        let available = &self.buffer[self.start..];
        let marker_len = FRAME_MARKER.len().min(available.len());
        if available[..marker_len] != FRAME_MARKER[..marker_len] {
            self.discard_one();
            return Err(DecodeError::Corrupt);
        }

        let frame_len = self.checksum.frame_len();
        if available.len() < frame_len {
            return Err(DecodeError::Incomplete);
        }

        let frame = &available[..frame_len];
        if !self.checksum.verify(frame) {
            log::debug!(
                "Checksum mismatch at sequence {}, resynchronizing",
                self.next_sequence
            );
            self.stats.checksum_failures += 1;
            self.discard_one();
            return Err(DecodeError::Corrupt);
        }

        if self.checksum == ChecksumKind::None && overlaps_next_marker(frame) {
            let lookahead = &available[frame_len..];
            let n = FRAME_MARKER.len().min(lookahead.len());
            if lookahead[..n] != FRAME_MARKER[..n] {
                log::debug!(
                    "Truncated frame at sequence {}, resynchronizing",
                    self.next_sequence
                );
                self.stats.misaligned_frames += 1;
                self.discard_one();
                return Err(DecodeError::Corrupt);
            }
            if n < FRAME_MARKER.len() {
                return Err(DecodeError::Incomplete);
            }
        }

        let sample = parse_frame(frame, self.session, self.next_sequence, self.sample_rate);
        self.start += frame_len;
        self.next_sequence += 1;
        self.stats.frames_decoded += 1;
        Ok(sample)
    }

    /// Lazily yield every complete sample currently buffered.
    ///
    /// Corrupt bytes are skipped; the iterator ends when more input is needed
    /// and can be resumed after the next `push`.
    pub fn samples(&mut self) -> Samples<'_> {
        Samples { decoder: self }
    }

    fn discard_one(&mut self) {
        self.start += 1;
        self.stats.bytes_discarded += 1;
    }
}

pub struct Samples<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Samples<'_> {
    type Item = Sample;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.decoder.decode_next() {
                Ok(sample) => return Some(sample),
                Err(DecodeError::Corrupt) => continue,
                Err(DecodeError::Incomplete) => return None,
            }
        }
    }
}

/// True if a marker, or a marker prefix running off the end, starts inside `frame`
fn overlaps_next_marker(frame: &[u8]) -> bool {
    (1..frame.len()).any(|p| {
        let tail = &frame[p..];
        let n = FRAME_MARKER.len().min(tail.len());
        tail[..n] == FRAME_MARKER[..n]
    })
}

fn parse_frame(frame: &[u8], session: SessionId, sequence: u64, sample_rate: u32) -> Sample {
    let eeg = i16::from_be_bytes([frame[EEG_OFFSET], frame[EEG_OFFSET + 1]]);
    let mut quaternion = [0i32; 4];
    for (i, q) in quaternion.iter_mut().enumerate() {
        let o = QUAT_OFFSET + i * 4;
        *q = i32::from_be_bytes([frame[o], frame[o + 1], frame[o + 2], frame[o + 3]]);
    }

    Sample {
        session,
        sequence,
        relative_timestamp: Sample::relative_time(sequence, sample_rate),
        eeg,
        ppg_red: read_u24(&frame[PPG_RED_OFFSET..]),
        ppg_ir: read_u24(&frame[PPG_IR_OFFSET..]),
        quaternion,
    }
}

fn read_u24(bytes: &[u8]) -> u32 {
    (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2])
}

/// Encode one frame in the device wire format.
///
/// Used by replay tools and tests; PPG values are truncated to 24 bits.
pub fn encode_frame(
    checksum: ChecksumKind,
    eeg: i16,
    ppg_red: u32,
    ppg_ir: u32,
    quaternion: [i32; 4],
) -> Vec<u8> {
    let mut frame = vec![0u8; checksum.frame_len()];
    frame[..4].copy_from_slice(&FRAME_MARKER);
    frame[EEG_OFFSET..EEG_OFFSET + 2].copy_from_slice(&eeg.to_be_bytes());
    frame[PPG_RED_OFFSET..PPG_RED_OFFSET + 3].copy_from_slice(&ppg_red.to_be_bytes()[1..]);
    frame[PPG_IR_OFFSET..PPG_IR_OFFSET + 3].copy_from_slice(&ppg_ir.to_be_bytes()[1..]);
    for (i, q) in quaternion.iter().enumerate() {
        let o = QUAT_OFFSET + i * 4;
        frame[o..o + 4].copy_from_slice(&q.to_be_bytes());
    }
    if checksum == ChecksumKind::Sum8 {
        frame[FRAME_BODY_LEN] = sum8(&frame[FRAME_MARKER.len()..FRAME_BODY_LEN]);
    }
    frame
}
