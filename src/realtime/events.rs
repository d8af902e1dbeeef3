//! Cloud session event envelope
//!
//! JSON messages on the realtime connection, modeled as closed tagged enums.
//! The bridge only depends on the audio-carrying and turn-control events;
//! everything else the service sends is tolerated and skipped.

use serde::{Deserialize, Serialize};

/// Messages the bridge sends to the realtime service
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Append captured microphone audio (base64 PCM at the cloud rate)
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioAppend {
        /// Base64-encoded 16-bit mono PCM
        audio: String,
    },

    /// Configure the session after connecting
    #[serde(rename = "session.update")]
    SessionUpdate {
        /// Session parameters
        session: SessionParams,
    },

    /// Cancel the in-flight response (barge-in)
    #[serde(rename = "response.cancel")]
    ResponseCancel,
}

/// Session configuration sent on reaching the active state
#[derive(Debug, Clone, Serialize)]
pub struct SessionParams {
    /// Requested modalities
    pub modalities: Vec<String>,
    /// System instructions
    pub instructions: String,
    /// Voice preset
    pub voice: String,
    /// Input PCM format tag
    pub input_audio_format: String,
    /// Output PCM format tag
    pub output_audio_format: String,
    /// Server-side voice activity detection
    pub turn_detection: TurnDetection,
}

/// Server-side VAD configuration
#[derive(Debug, Clone, Serialize)]
pub struct TurnDetection {
    /// Detection type tag
    #[serde(rename = "type")]
    pub kind: String,
    /// Speech probability threshold
    pub threshold: f32,
    /// Audio retained before detected speech (ms)
    pub prefix_padding_ms: u32,
    /// Silence that ends a turn (ms)
    pub silence_duration_ms: u32,
}

/// Messages the realtime service sends to the bridge
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// A chunk of synthesized audio (base64 PCM at the cloud rate,
    /// arbitrary length)
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        /// Base64-encoded 16-bit mono PCM
        #[serde(default)]
        delta: String,
    },

    /// The in-flight response finished producing audio
    #[serde(rename = "response.audio.done")]
    AudioDone,

    /// The user started speaking
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,

    /// The user stopped speaking
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,

    /// Transcript of the user's speech
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscript {
        /// Transcribed text
        #[serde(default)]
        transcript: String,
    },

    /// Transcript of the synthesized response
    #[serde(rename = "response.audio_transcript.done")]
    OutputTranscript {
        /// Transcribed text
        #[serde(default)]
        transcript: String,
    },

    /// Error reported by the service
    #[serde(rename = "error")]
    ServiceError {
        /// Raw error body
        #[serde(default)]
        error: serde_json::Value,
    },

    /// Any event type the bridge does not consume (tool calls, response
    /// lifecycle chatter, session acks)
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_tags() {
        let append = serde_json::to_value(ClientEvent::InputAudioAppend {
            audio: "AAAA".to_string(),
        })
        .unwrap();
        assert_eq!(append["type"], "input_audio_buffer.append");
        assert_eq!(append["audio"], "AAAA");

        let cancel = serde_json::to_value(ClientEvent::ResponseCancel).unwrap();
        assert_eq!(cancel["type"], "response.cancel");
    }

    #[test]
    fn test_session_update_shape() {
        let event = ClientEvent::SessionUpdate {
            session: SessionParams {
                modalities: vec!["text".to_string(), "audio".to_string()],
                instructions: "be brief".to_string(),
                voice: "ash".to_string(),
                input_audio_format: "pcm16".to_string(),
                output_audio_format: "pcm16".to_string(),
                turn_detection: TurnDetection {
                    kind: "server_vad".to_string(),
                    threshold: 0.5,
                    prefix_padding_ms: 300,
                    silence_duration_ms: 500,
                },
            },
        };

        let value = serde_json::to_value(event).unwrap();
        assert_eq!(value["type"], "session.update");
        assert_eq!(value["session"]["turn_detection"]["type"], "server_vad");
        assert_eq!(value["session"]["voice"], "ash");
    }

    #[test]
    fn test_server_event_parsing() {
        let delta: ServerEvent =
            serde_json::from_str(r#"{"type":"response.audio.delta","delta":"UklGRg=="}"#).unwrap();
        assert!(matches!(delta, ServerEvent::AudioDelta { delta } if delta == "UklGRg=="));

        let started: ServerEvent =
            serde_json::from_str(r#"{"type":"input_audio_buffer.speech_started"}"#).unwrap();
        assert!(matches!(started, ServerEvent::SpeechStarted));
    }

    #[test]
    fn test_unknown_server_event_tolerated() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"response.function_call_arguments.done","call_id":"x","arguments":"{}"}"#,
        )
        .unwrap();
        assert!(matches!(event, ServerEvent::Other));
    }

    #[test]
    fn test_service_error_parsing() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"error","error":{"code":"rate_limit","message":"slow down"}}"#,
        )
        .unwrap();
        match event {
            ServerEvent::ServiceError { error } => {
                assert_eq!(error["code"], "rate_limit");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
