//! Configuration for the jawbone bridge
//!
//! Assembled from CLI flags and environment variables in `main.rs`; every
//! tunable the hardware or the cloud service cares about lives here so the
//! code never hard-codes a rate, port, or actuator constant.

use std::net::IpAddr;
use std::time::Duration;

/// Bridge configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PCM formats and frame geometry
    pub audio: AudioConfig,

    /// UDP transport to the hardware endpoint
    pub transport: TransportConfig,

    /// Cloud realtime session
    pub realtime: RealtimeConfig,

    /// MQTT control channel
    pub control: ControlConfig,

    /// Actuator (jaw) drive tuning
    pub actuator: ActuatorConfig,
}

/// PCM formats and frame geometry
///
/// The hardware endpoint speaks fixed-size frames at its own rate; the cloud
/// service streams arbitrary-size chunks at a different rate. Both are 16-bit
/// signed mono PCM.
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Sample rate of the hardware endpoint (Hz)
    pub device_rate: u32,

    /// Sample rate of the cloud service (Hz)
    pub cloud_rate: u32,

    /// Duration of one device frame (ms)
    pub frame_ms: u32,

    /// Soft cap on queued playout frames (default 500 = 20s of 40ms frames)
    pub max_buffered_frames: usize,
}

impl AudioConfig {
    /// Samples in one device frame
    #[must_use]
    pub const fn frame_samples(&self) -> usize {
        (self.device_rate as usize * self.frame_ms as usize) / 1000
    }

    /// Bytes in one device frame (16-bit samples)
    #[must_use]
    pub const fn frame_bytes(&self) -> usize {
        self.frame_samples() * 2
    }

    /// Wall-clock duration of one device frame
    #[must_use]
    pub const fn frame_duration(&self) -> Duration {
        Duration::from_millis(self.frame_ms as u64)
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device_rate: 16_000,
            cloud_rate: 24_000,
            frame_ms: 40,
            max_buffered_frames: 500,
        }
    }
}

/// UDP transport to the hardware endpoint
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port the bridge listens on for microphone frames
    pub listen_port: u16,

    /// Port on the device that receives speaker frames
    pub device_port: u16,

    /// Fixed device address; when unset the peer is learned from the first
    /// valid inbound datagram
    pub device_ip: Option<IpAddr>,

    /// Stream source identifier stamped into outbound packet headers
    pub ssrc: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen_port: 5001,
            device_port: 5002,
            device_ip: None,
            ssrc: 0x00FA_AC01,
        }
    }
}

/// Cloud realtime session configuration
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// WebSocket URL of the realtime service
    pub url: String,

    /// Bearer token for the realtime service
    pub api_key: String,

    /// Voice preset requested in the session configuration
    pub voice: String,

    /// System instructions sent in the session configuration
    pub instructions: String,

    /// Server-side VAD threshold (0.0 to 1.0)
    pub vad_threshold: f32,

    /// Audio retained before detected speech (ms)
    pub vad_prefix_ms: u32,

    /// Silence that ends a turn (ms)
    pub vad_silence_ms: u32,

    /// Cap on exponential reconnect backoff
    pub max_backoff: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            voice: "ash".to_string(),
            instructions: String::new(),
            vad_threshold: 0.5,
            vad_prefix_ms: 300,
            vad_silence_ms: 500,
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// MQTT control channel configuration
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Broker host; None disables the control channel entirely
    pub broker_host: Option<String>,

    /// Broker port
    pub broker_port: u16,

    /// MQTT client identifier
    pub client_id: String,

    /// Topic the openness scalar is published on
    pub openness_topic: String,

    /// Topic the bridge subscribes to for volume commands
    pub volume_topic: String,

    /// Topic volume commands are forwarded to for the device
    pub device_volume_topic: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            broker_host: None,
            broker_port: 1883,
            client_id: "jawbone".to_string(),
            openness_topic: "prop/jaw".to_string(),
            volume_topic: "prop/volume".to_string(),
            device_volume_topic: "device/volume".to_string(),
        }
    }
}

/// Actuator drive tuning
///
/// All constants here are empirically tuned for a specific physical prop;
/// nothing in the bridge assumes their particular values beyond "louder
/// audio opens the jaw further".
#[derive(Debug, Clone)]
pub struct ActuatorConfig {
    /// Recompute openness every Nth emitted frame
    pub stride: u64,

    /// Mean absolute amplitude that maps to full deflection
    pub divisor: f32,

    /// Offset added before clamping
    pub base: f32,

    /// Span of the linear amplitude mapping
    pub range: f32,

    /// Lower clamp of the published openness
    pub min_openness: f32,

    /// Upper clamp of the published openness
    pub max_openness: f32,

    /// Exponential smoothing factor applied to the target openness
    pub smoothing: f32,

    /// Mean absolute amplitude below which publishes are suppressed
    pub amplitude_gate: f32,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            stride: 6,
            divisor: 8000.0,
            base: 0.0,
            range: 1.0,
            min_openness: 0.0,
            max_openness: 1.0,
            smoothing: 0.6,
            amplitude_gate: 500.0,
        }
    }
}
