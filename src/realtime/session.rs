//! Realtime session connection
//!
//! Owns the framed WebSocket connection to the speech service. The write
//! half is driven by a dedicated task fed over a channel so any pipeline
//! stage can enqueue events without holding the socket; the read half is
//! consumed by the supervisor's receive loop.

use futures::stream::{SplitStream, StreamExt};
use futures::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::events::{ClientEvent, ServerEvent, SessionParams, TurnDetection};
use crate::config::RealtimeConfig;
use crate::{Error, Result};

/// Depth of the outbound event queue; one entry per microphone frame plus
/// control traffic, so this never fills in practice
const OUTBOUND_QUEUE: usize = 64;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An established realtime session
pub struct RealtimeSession {
    reader: SplitStream<WsStream>,
    outbound: mpsc::Sender<ClientEvent>,
    writer_task: JoinHandle<()>,
}

impl RealtimeSession {
    /// Connect, authenticate, and configure a session.
    ///
    /// # Errors
    ///
    /// Returns `Error::Session` if the handshake fails or the configuration
    /// message cannot be sent.
    pub async fn connect(config: &RealtimeConfig) -> Result<Self> {
        let mut request = config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Session(format!("invalid realtime url: {e}")))?;

        let auth = format!("Bearer {}", config.api_key)
            .parse()
            .map_err(|e| Error::Session(format!("invalid api key header: {e}")))?;
        request.headers_mut().insert("Authorization", auth);
        request.headers_mut().insert(
            "OpenAI-Beta",
            "realtime=v1"
                .parse()
                .map_err(|e| Error::Session(format!("invalid header: {e}")))?,
        );

        let (stream, response) = connect_async(request)
            .await
            .map_err(|e| Error::Session(format!("connect failed: {e}")))?;
        tracing::debug!(status = %response.status(), "realtime handshake complete");

        let (mut sink, reader) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::channel::<ClientEvent>(OUTBOUND_QUEUE);

        let writer_task = tokio::spawn(async move {
            while let Some(event) = outbound_rx.recv().await {
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize client event");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(json)).await {
                    tracing::warn!(error = %e, "realtime send failed, closing writer");
                    break;
                }
            }
        });

        let session = Self {
            reader,
            outbound,
            writer_task,
        };
        session.configure(config).await?;

        Ok(session)
    }

    /// Send the session configuration message
    async fn configure(&self, config: &RealtimeConfig) -> Result<()> {
        let params = SessionParams {
            modalities: vec!["text".to_string(), "audio".to_string()],
            instructions: config.instructions.clone(),
            voice: config.voice.clone(),
            input_audio_format: "pcm16".to_string(),
            output_audio_format: "pcm16".to_string(),
            turn_detection: TurnDetection {
                kind: "server_vad".to_string(),
                threshold: config.vad_threshold,
                prefix_padding_ms: config.vad_prefix_ms,
                silence_duration_ms: config.vad_silence_ms,
            },
        };

        self.send(ClientEvent::SessionUpdate { session: params })
            .await
    }

    /// Enqueue an event for the write half.
    ///
    /// # Errors
    ///
    /// Returns `Error::Session` if the connection's writer has shut down.
    pub async fn send(&self, event: ClientEvent) -> Result<()> {
        self.outbound
            .send(event)
            .await
            .map_err(|_| Error::Session("realtime writer closed".to_string()))
    }

    /// Handle for pipeline stages that produce outbound events
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<ClientEvent> {
        self.outbound.clone()
    }

    /// Receive the next server event.
    ///
    /// Returns `Ok(None)` on a clean close. Non-text frames and unparseable
    /// messages are skipped, not fatal.
    ///
    /// # Errors
    ///
    /// Returns `Error::Session` if the connection breaks.
    pub async fn next_event(&mut self) -> Result<Option<ServerEvent>> {
        loop {
            match self.reader.next().await {
                None => return Ok(None),
                Some(Ok(Message::Text(text))) => match serde_json::from_str(&text) {
                    Ok(event) => return Ok(Some(event)),
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping unparseable server message");
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "realtime session closed by peer");
                    return Ok(None);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Err(Error::Session(format!("receive failed: {e}")));
                }
            }
        }
    }
}

impl Drop for RealtimeSession {
    fn drop(&mut self) {
        self.writer_task.abort();
    }
}
