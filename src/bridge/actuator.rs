//! Actuator drive
//!
//! Derives the jaw "openness" scalar from the frame *currently leaving* the
//! playout queue, so the physical prop moves in lockstep with audible
//! playback rather than with network delivery. Values are published
//! fire-and-forget on the control channel; silence closes the jaw once and
//! then goes quiet instead of flooding the channel with zeros.

use crate::audio::mean_abs_amplitude;
use crate::config::ActuatorConfig;
use crate::control::ControlPublisher;

/// Openness value published when playout falls silent
const CLOSED: f32 = 0.0;

/// Maps emitted frames to actuator openness
pub struct ActuatorDriver {
    config: ActuatorConfig,
    publisher: ControlPublisher,
    frame_counter: u64,
    smoothed: f32,
    open: bool,
}

impl ActuatorDriver {
    /// Create a driver with the given tuning
    #[must_use]
    pub fn new(config: ActuatorConfig, publisher: ControlPublisher) -> Self {
        Self {
            config,
            publisher,
            frame_counter: 0,
            smoothed: CLOSED,
            open: false,
        }
    }

    /// Account one emitted frame; every Nth frame recomputes and publishes
    /// openness. Returns the published value, if any.
    pub fn on_frame(&mut self, frame: &[u8]) -> Option<f32> {
        self.frame_counter += 1;
        if self.frame_counter % self.config.stride != 0 {
            return None;
        }

        let amplitude = mean_abs_amplitude(frame);
        if amplitude < self.config.amplitude_gate {
            return None;
        }

        let target = (self.config.base + amplitude / self.config.divisor * self.config.range)
            .clamp(self.config.min_openness, self.config.max_openness);
        self.smoothed =
            self.smoothed * (1.0 - self.config.smoothing) + target * self.config.smoothing;
        self.open = true;

        tracing::trace!(amplitude, openness = self.smoothed, "actuator pulse");
        self.publisher.publish_openness(self.smoothed);
        Some(self.smoothed)
    }

    /// Playout fell silent: close once, then suppress until sound resumes.
    /// Returns the published value, if any.
    pub fn on_silence(&mut self) -> Option<f32> {
        self.frame_counter = 0;
        self.smoothed = CLOSED;

        if !self.open {
            return None;
        }
        self.open = false;

        tracing::trace!("actuator closed");
        self.publisher.publish_openness(CLOSED);
        Some(CLOSED)
    }
}
