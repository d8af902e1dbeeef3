//! Jawbone - audio bridge between a UDP hardware endpoint and a realtime
//! speech service
//!
//! Moves 16-bit mono PCM in both directions with bounded latency, converts
//! between the device and cloud sample rates, absorbs network jitter, and
//! derives a jaw-actuator control signal phase-locked to what is actually
//! playing out of the speaker.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐  UDP datagrams   ┌─────────────────────────┐   WebSocket
//! │ hardware │ ───────────────► │ inbound assembler       │ ───────────►
//! │ endpoint │                  │ (decode → resample)     │    cloud
//! │          │ ◄─────────────── │ playout scheduler       │ ◄───────────
//! └──────────┘   paced frames   │ (resample → buffer →    │   realtime
//!                               │  deadline-paced emit)   │   session
//!                               └───────────┬─────────────┘
//!                                           │ openness
//!                                           ▼
//!                                    MQTT control channel
//! ```
//!
//! The session supervisor owns the cloud connection, spawns the pipeline
//! tasks per session, and reconnects with exponential backoff forever.

pub mod audio;
pub mod bridge;
pub mod config;
pub mod control;
pub mod error;
pub mod realtime;
pub mod transport;

pub use config::Config;
pub use error::{Error, Result};
