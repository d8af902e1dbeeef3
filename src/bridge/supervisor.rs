//! Session supervision
//!
//! Owns the cloud connection lifecycle: connect, configure, spawn the
//! per-session tasks, tear everything down on failure, and retry with
//! exponential backoff, indefinitely. The bridge never exits on a network
//! failure; it reconnects until the process is stopped.
//!
//! Barge-in lives here too: when the service reports user speech while a
//! response is still playing, the playout buffer is drained and a cancel is
//! sent before the next queued frame can reach the hardware.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::audio::{pcm_to_samples, resample, samples_to_pcm};
use crate::bridge::actuator::ActuatorDriver;
use crate::bridge::{inbound, playout, playout::PlayoutHandle};
use crate::config::{AudioConfig, Config};
use crate::control::ControlPublisher;
use crate::realtime::{ClientEvent, RealtimeSession, ServerEvent};
use crate::transport::{DeviceLink, PacketEncoder};
use crate::{Error, Result};

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No cloud connection
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Session established, pipeline running
    Active,
    /// Pipeline shutting down after a failure or close
    Draining,
}

/// Exponential reconnect backoff: `min(2^attempts, max_delay)`.
///
/// The attempt counter resets when a connection reaches the active state,
/// so a session that drops after running fine retries quickly.
#[derive(Debug)]
pub struct Backoff {
    attempts: u32,
    max: Duration,
}

impl Backoff {
    /// Create a backoff capped at `max`
    #[must_use]
    pub const fn new(max: Duration) -> Self {
        Self { attempts: 0, max }
    }

    /// Record a failure and return how long to wait before the next attempt
    pub fn failure(&mut self) -> Duration {
        self.attempts += 1;
        let secs = 1u64.checked_shl(self.attempts).unwrap_or(u64::MAX);
        Duration::from_secs(secs).min(self.max)
    }

    /// Record a successful connection
    pub fn succeeded(&mut self) {
        self.attempts = 0;
    }

    /// Consecutive failures so far
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Handles server events for one active session.
///
/// Sole writer of the playout queue; tracks whether a response is in flight
/// so a speech-started event can trigger barge-in, and suppresses the
/// remainder of a cancelled response.
pub struct CloudReceiver {
    playout: PlayoutHandle,
    events: mpsc::Sender<ClientEvent>,
    audio: AudioConfig,
    response_active: bool,
    suppressing: bool,
}

impl CloudReceiver {
    /// Create a receiver feeding the given playout queue
    #[must_use]
    pub fn new(
        playout: PlayoutHandle,
        events: mpsc::Sender<ClientEvent>,
        audio: AudioConfig,
    ) -> Self {
        Self {
            playout,
            events,
            audio,
            response_active: false,
            suppressing: false,
        }
    }

    /// Process one server event.
    ///
    /// Chunk-local failures (bad base64, torn PCM, resample errors) discard
    /// the chunk and continue.
    ///
    /// # Errors
    ///
    /// Returns `Error::Session` if the outbound event channel has closed.
    pub async fn handle(&mut self, event: ServerEvent) -> Result<()> {
        match event {
            ServerEvent::AudioDelta { delta } => self.handle_delta(&delta),
            ServerEvent::AudioDone => {
                tracing::debug!("response audio complete");
                self.response_active = false;
                self.suppressing = false;
            }
            ServerEvent::SpeechStarted => {
                tracing::debug!("speech started");
                if self.response_active {
                    self.barge_in().await?;
                }
            }
            ServerEvent::SpeechStopped => {
                tracing::debug!("speech stopped");
            }
            ServerEvent::InputTranscript { transcript } => {
                tracing::debug!(transcript, "user said");
            }
            ServerEvent::OutputTranscript { transcript } => {
                tracing::debug!(transcript, "response said");
            }
            ServerEvent::ServiceError { error } => {
                tracing::warn!(%error, "service reported an error");
            }
            ServerEvent::Other => {
                tracing::trace!("skipping unconsumed server event");
            }
        }
        Ok(())
    }

    /// Resample an audio delta to the device rate and queue it for playout
    fn handle_delta(&mut self, delta: &str) {
        if self.suppressing {
            tracing::trace!("suppressing delta from cancelled response");
            return;
        }
        self.response_active = true;

        let pcm = match BASE64.decode(delta) {
            Ok(pcm) => pcm,
            Err(e) => {
                tracing::warn!(error = %e, "discarding undecodable audio delta");
                return;
            }
        };

        let device_pcm = match downsample(&pcm, &self.audio) {
            Ok(pcm) => pcm,
            Err(e) => {
                tracing::warn!(error = %e, "discarding audio delta after resample failure");
                return;
            }
        };

        let dropped = self.playout.ingest(&device_pcm);
        if dropped > 0 {
            tracing::warn!(
                dropped,
                total_dropped = self.playout.dropped_frames(),
                "playout buffer full, dropped newest frames"
            );
        }
    }

    /// Drain queued playback and cancel the in-flight response.
    ///
    /// The drain happens before the cancel is enqueued, so nothing of the
    /// interrupted response beyond the frame already in flight reaches the
    /// hardware.
    async fn barge_in(&mut self) -> Result<()> {
        let cleared = self.playout.clear();
        self.suppressing = true;
        self.response_active = false;

        self.events
            .send(ClientEvent::ResponseCancel)
            .await
            .map_err(|_| Error::Session("realtime session closed".to_string()))?;

        tracing::info!(cleared, "barge-in: cancelled in-flight response");
        Ok(())
    }
}

/// Convert cloud-rate PCM bytes to device-rate PCM bytes
fn downsample(pcm: &[u8], audio: &AudioConfig) -> Result<Vec<u8>> {
    let samples = pcm_to_samples(pcm)?;
    let resampled = resample(&samples, audio.cloud_rate, audio.device_rate)?;
    Ok(samples_to_pcm(&resampled))
}

/// Runs the bridge: one session at a time, forever
pub struct Supervisor {
    config: Config,
    control: ControlPublisher,
    peer: watch::Sender<Option<SocketAddr>>,
    state: SessionState,
}

impl Supervisor {
    /// Create a supervisor; the peer address channel it owns is process-wide
    /// so a discovered device survives reconnects
    #[must_use]
    pub fn new(config: Config, control: ControlPublisher) -> Self {
        let (peer, _) = watch::channel(None);
        Self {
            config,
            control,
            peer,
            state: SessionState::Disconnected,
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Run sessions until the process is stopped.
    ///
    /// Every failure, from handshake to mid-session drop, lands
    /// back here and is retried after backoff. Nothing short of process
    /// shutdown ends the loop.
    pub async fn run(mut self) -> Result<()> {
        let mut backoff = Backoff::new(self.config.realtime.max_backoff);

        loop {
            self.transition(SessionState::Connecting);
            match self.run_session(&mut backoff).await {
                Ok(()) => tracing::info!("session ended"),
                Err(e) => tracing::warn!(error = %e, "session failed"),
            }
            self.transition(SessionState::Disconnected);

            let delay = backoff.failure();
            tracing::info!(
                delay_secs = delay.as_secs(),
                attempts = backoff.attempts(),
                "reconnecting after backoff"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// One connection attempt: connect, spawn the pipeline, wait for the
    /// first task to end, tear the rest down
    async fn run_session(&mut self, backoff: &mut Backoff) -> Result<()> {
        let session = RealtimeSession::connect(&self.config.realtime).await?;
        backoff.succeeded();
        self.transition(SessionState::Active);

        // fresh per-session resources; nothing carries over from the last run
        let link = Arc::new(DeviceLink::bind(&self.config.transport, self.peer.clone()).await?);
        let playout = PlayoutHandle::new(
            self.config.audio.frame_bytes(),
            self.config.audio.max_buffered_frames,
        );
        let actuator = ActuatorDriver::new(self.config.actuator.clone(), self.control.clone());
        let encoder = PacketEncoder::new(self.config.transport.ssrc);
        let receiver = CloudReceiver::new(
            playout.clone(),
            session.sender(),
            self.config.audio.clone(),
        );

        let mut tasks: JoinSet<(&'static str, Result<()>)> = JoinSet::new();
        {
            let link = Arc::clone(&link);
            let audio = self.config.audio.clone();
            let sender = session.sender();
            tasks.spawn(async move { ("inbound", inbound::run(link, audio, sender).await) });
        }
        {
            let link = Arc::clone(&link);
            let playout = playout.clone();
            let frame_duration = self.config.audio.frame_duration();
            tasks.spawn(async move {
                (
                    "playout",
                    playout::run(playout, link, encoder, actuator, frame_duration).await,
                )
            });
        }
        tasks.spawn(async move { ("cloud", cloud_loop(session, receiver).await) });

        let outcome = match tasks.join_next().await {
            Some(Ok((task, result))) => {
                match &result {
                    Ok(()) => tracing::info!(task, "session task ended"),
                    Err(e) => tracing::warn!(task, error = %e, "session task failed"),
                }
                result
            }
            Some(Err(e)) => Err(Error::Session(format!("session task panicked: {e}"))),
            None => Ok(()),
        };

        self.transition(SessionState::Draining);
        tasks.shutdown().await;
        let cleared = playout.clear();
        tracing::debug!(
            cleared,
            dropped = playout.dropped_frames(),
            "session resources released"
        );

        outcome
    }

    fn transition(&mut self, to: SessionState) {
        if self.state != to {
            tracing::info!(from = ?self.state, to = ?to, "session state");
            self.state = to;
        }
    }
}

/// Pump server events into the receiver until the connection ends
async fn cloud_loop(mut session: RealtimeSession, mut receiver: CloudReceiver) -> Result<()> {
    while let Some(event) = session.next_event().await? {
        receiver.handle(event).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_secs(60));

        assert_eq!(backoff.failure(), Duration::from_secs(2));
        assert_eq!(backoff.failure(), Duration::from_secs(4));
        assert_eq!(backoff.failure(), Duration::from_secs(8));

        for _ in 0..10 {
            backoff.failure();
        }
        assert_eq!(backoff.failure(), Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_resets_on_success() {
        let mut backoff = Backoff::new(Duration::from_secs(60));
        backoff.failure();
        backoff.failure();
        backoff.failure();

        backoff.succeeded();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.failure(), Duration::from_secs(2));
    }

    fn delta_of(cloud_samples: usize) -> ServerEvent {
        let pcm = samples_to_pcm(&vec![4000i16; cloud_samples]);
        ServerEvent::AudioDelta {
            delta: BASE64.encode(pcm),
        }
    }

    #[tokio::test]
    async fn test_deltas_become_device_frames() {
        let audio = AudioConfig::default();
        let playout = PlayoutHandle::new(audio.frame_bytes(), audio.max_buffered_frames);
        let (tx, _rx) = mpsc::channel(8);
        let mut receiver = CloudReceiver::new(playout.clone(), tx, audio);

        // 2880 cloud samples = 1920 device samples = 3 exact frames
        receiver.handle(delta_of(2880)).await.unwrap();
        assert_eq!(playout.depth(), 3);
        assert_eq!(playout.pop().unwrap().len(), 1280);
    }

    #[tokio::test]
    async fn test_bad_delta_is_discarded() {
        let audio = AudioConfig::default();
        let playout = PlayoutHandle::new(audio.frame_bytes(), audio.max_buffered_frames);
        let (tx, _rx) = mpsc::channel(8);
        let mut receiver = CloudReceiver::new(playout.clone(), tx, audio);

        receiver
            .handle(ServerEvent::AudioDelta {
                delta: "not base64!!!".to_string(),
            })
            .await
            .unwrap();
        assert!(playout.is_empty());
    }

    #[tokio::test]
    async fn test_barge_in_drains_and_cancels() {
        let audio = AudioConfig::default();
        let playout = PlayoutHandle::new(audio.frame_bytes(), audio.max_buffered_frames);
        let (tx, mut rx) = mpsc::channel(8);
        let mut receiver = CloudReceiver::new(playout.clone(), tx, audio);

        receiver.handle(delta_of(2880)).await.unwrap();
        assert_eq!(playout.depth(), 3);

        receiver.handle(ServerEvent::SpeechStarted).await.unwrap();

        // buffer drained before the cancel went out
        assert!(playout.is_empty());
        assert!(matches!(
            rx.try_recv().unwrap(),
            ClientEvent::ResponseCancel
        ));

        // the rest of the cancelled response is suppressed
        receiver.handle(delta_of(2880)).await.unwrap();
        assert!(playout.is_empty());

        // a fresh response flows again
        receiver.handle(ServerEvent::AudioDone).await.unwrap();
        receiver.handle(delta_of(2880)).await.unwrap();
        assert_eq!(playout.depth(), 3);
    }

    #[tokio::test]
    async fn test_speech_without_response_does_not_cancel() {
        let audio = AudioConfig::default();
        let playout = PlayoutHandle::new(audio.frame_bytes(), audio.max_buffered_frames);
        let (tx, mut rx) = mpsc::channel(8);
        let mut receiver = CloudReceiver::new(playout.clone(), tx, audio);

        receiver.handle(ServerEvent::SpeechStarted).await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
