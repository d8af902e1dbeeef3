//! Cloud realtime session
//!
//! WebSocket connection to the speech-to-speech service and the JSON event
//! envelope it speaks.

pub mod events;
mod session;

pub use events::{ClientEvent, ServerEvent, SessionParams, TurnDetection};
pub use session::RealtimeSession;
