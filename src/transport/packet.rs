//! Datagram wire format
//!
//! Every audio datagram carries a fixed 16-byte little-endian header followed
//! by raw 16-bit mono PCM:
//!
//! ```text
//! ┌──────┬───────┬─────────────┬──────┬──────────────┬──────────┐
//! │ type │ flags │ payload_len │ ssrc │ timestamp_ms │ sequence │
//! │  u8  │  u8   │   u16 LE    │ u32  │    u32 LE    │  u32 LE  │
//! └──────┴───────┴─────────────┴──────┴──────────────┴──────────┘
//! ```
//!
//! `timestamp_ms` and `sequence` are producer-local counters that wrap
//! modulo 2³²; the receive side tolerates wraparound and does not reorder
//! on them.

use std::time::Instant;

use thiserror::Error;

/// Header size in bytes
pub const HEADER_LEN: usize = 16;

/// Packet type for audio payloads; all other values are reserved
pub const PACKET_TYPE_AUDIO: u8 = 0x01;

/// Errors raised while decoding a datagram
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Datagram shorter than the fixed header
    #[error("packet too short: {0} bytes")]
    TooShort(usize),

    /// Packet type is not an audio packet
    #[error("unknown packet type: {0:#04x}")]
    UnknownType(u8),

    /// Declared payload length does not match the fixed device frame size
    #[error("payload length mismatch: declared {declared}, expected {expected}")]
    LengthMismatch {
        /// Length the header declared
        declared: usize,
        /// Fixed device frame size the bridge expects
        expected: usize,
    },
}

/// Parsed datagram header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Packet type (`PACKET_TYPE_AUDIO` for audio)
    pub packet_type: u8,
    /// Reserved flag bits
    pub flags: u8,
    /// Payload length in bytes
    pub payload_len: u16,
    /// Stream source identifier
    pub ssrc: u32,
    /// Producer-local millisecond timestamp, wrapping
    pub timestamp_ms: u32,
    /// Producer-local sequence counter, wrapping
    pub sequence: u32,
}

/// Encode an audio packet: fixed header followed by the payload.
///
/// The only allocation is the output buffer.
#[must_use]
pub fn encode(payload: &[u8], ssrc: u32, sequence: u32, timestamp_ms: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.push(PACKET_TYPE_AUDIO);
    out.push(0x00);
    #[allow(clippy::cast_possible_truncation)]
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(&ssrc.to_le_bytes());
    out.extend_from_slice(&timestamp_ms.to_le_bytes());
    out.extend_from_slice(&sequence.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Decode a datagram into its header and payload slice.
///
/// `expected_payload` is the fixed device frame size; datagrams declaring any
/// other length are rejected. Never panics on malformed input.
///
/// # Errors
///
/// Returns `FrameError` for short, wrong-type, or wrong-length datagrams.
pub fn decode(buf: &[u8], expected_payload: usize) -> Result<(PacketHeader, &[u8]), FrameError> {
    if buf.len() < HEADER_LEN {
        return Err(FrameError::TooShort(buf.len()));
    }

    let header = PacketHeader {
        packet_type: buf[0],
        flags: buf[1],
        payload_len: u16::from_le_bytes([buf[2], buf[3]]),
        ssrc: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        timestamp_ms: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
        sequence: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
    };

    if header.packet_type != PACKET_TYPE_AUDIO {
        return Err(FrameError::UnknownType(header.packet_type));
    }

    let declared = header.payload_len as usize;
    if declared != expected_payload || buf.len() - HEADER_LEN < declared {
        return Err(FrameError::LengthMismatch {
            declared,
            expected: expected_payload,
        });
    }

    Ok((header, &buf[HEADER_LEN..HEADER_LEN + declared]))
}

/// Stateful encoder for the outbound packet stream.
///
/// Stamps each packet with a wrapping sequence number and a wrapping
/// millisecond timestamp measured from encoder creation.
#[derive(Debug)]
pub struct PacketEncoder {
    ssrc: u32,
    sequence: u32,
    epoch: Instant,
}

impl PacketEncoder {
    /// Create an encoder for the given stream source
    #[must_use]
    pub fn new(ssrc: u32) -> Self {
        Self {
            ssrc,
            sequence: 0,
            epoch: Instant::now(),
        }
    }

    /// Encode the next packet in the stream
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode(&mut self, payload: &[u8]) -> Vec<u8> {
        let timestamp_ms = (self.epoch.elapsed().as_millis() & u128::from(u32::MAX)) as u32;
        let packet = encode(payload, self.ssrc, self.sequence, timestamp_ms);
        self.sequence = self.sequence.wrapping_add(1);
        packet
    }

    /// Sequence number the next packet will carry
    #[must_use]
    pub const fn next_sequence(&self) -> u32 {
        self.sequence
    }
}
