//! The audio bridge pipeline
//!
//! Device → cloud: `inbound` validates datagrams and forwards microphone
//! audio. Cloud → device: `playout` paces synthesized audio back out at the
//! hardware's frame cadence while `actuator` derives the jaw drive from
//! whatever is actually leaving the buffer. `supervisor` owns the session
//! lifecycle around all of it.

pub mod actuator;
pub mod inbound;
pub mod playout;
pub mod supervisor;

pub use actuator::ActuatorDriver;
pub use playout::{FramePacer, PlayoutHandle, PlayoutQueue};
pub use supervisor::{Backoff, CloudReceiver, SessionState, Supervisor};
