//! Inbound assembly (device → cloud)
//!
//! Turns the datagram stream from the hardware endpoint into the cloud
//! session's input audio stream. This is the live microphone path: each
//! accepted frame is resampled, encoded, and forwarded immediately, with no
//! buffering beyond the frame in hand.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::sync::mpsc;

use crate::audio::{pcm_to_samples, resample, samples_to_pcm};
use crate::config::AudioConfig;
use crate::realtime::ClientEvent;
use crate::transport::{packet, DeviceLink};
use crate::{Error, Result};

/// Receive buffer size; comfortably above header + one device frame
const RECV_BUF: usize = 2048;

/// Datagram receive loop.
///
/// Malformed datagrams and bad chunks are dropped and counted, never fatal;
/// the loop only returns when the realtime session goes away.
///
/// # Errors
///
/// Returns `Error::Session` when the outbound event channel closes.
pub async fn run(
    link: Arc<DeviceLink>,
    audio: AudioConfig,
    events: mpsc::Sender<ClientEvent>,
) -> Result<()> {
    let frame_bytes = audio.frame_bytes();
    let mut buf = vec![0u8; RECV_BUF];
    let mut accepted: u64 = 0;
    let mut malformed: u64 = 0;

    loop {
        let (len, from) = match link.recv(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                // the local link is lossy by nature; keep listening
                tracing::warn!(error = %e, "datagram receive failed, retrying");
                continue;
            }
        };

        let payload = match packet::decode(&buf[..len], frame_bytes) {
            Ok((_header, payload)) => payload,
            Err(e) => {
                malformed += 1;
                tracing::debug!(error = %e, %from, malformed, "dropping malformed datagram");
                continue;
            }
        };

        link.learn_peer(from);

        let cloud_pcm = match upsample(payload, &audio) {
            Ok(pcm) => pcm,
            Err(e) => {
                tracing::warn!(error = %e, "discarding frame after resample failure");
                continue;
            }
        };

        events
            .send(ClientEvent::InputAudioAppend {
                audio: BASE64.encode(cloud_pcm),
            })
            .await
            .map_err(|_| Error::Session("realtime session closed".to_string()))?;

        accepted += 1;
        if accepted == 1 {
            tracing::info!(%from, "microphone stream started");
        }
    }
}

/// Convert one device-rate frame to cloud-rate PCM bytes
fn upsample(payload: &[u8], audio: &AudioConfig) -> Result<Vec<u8>> {
    let samples = pcm_to_samples(payload)?;
    let resampled = resample(&samples, audio.device_rate, audio.cloud_rate)?;
    Ok(samples_to_pcm(&resampled))
}
