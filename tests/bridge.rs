//! Bridge pipeline integration tests
//!
//! Exercises the audio path end to end without hardware or network: wire
//! codec, rate conversion, frame alignment, playout pacing, barge-in, and
//! reconnect backoff.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::sync::mpsc;
use tokio::time::Instant;

use jawbone::audio::{pcm_to_samples, resample, samples_to_pcm};
use jawbone::bridge::{Backoff, CloudReceiver, FramePacer, PlayoutQueue};
use jawbone::config::AudioConfig;
use jawbone::realtime::{ClientEvent, ServerEvent};
use jawbone::transport::packet;

/// One device frame: 640 samples of 16-bit PCM at 16kHz = 1280 bytes
const FRAME_BYTES: usize = 1280;

/// Generate a sine tone as i16 samples
fn sine(frequency: f32, rate: u32, len: usize, amplitude: f32) -> Vec<i16> {
    (0..len)
        .map(|i| {
            let t = i as f32 / rate as f32;
            (amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()) as i16
        })
        .collect()
}

#[test]
fn test_packet_round_trip_preserves_payload_and_header() {
    let payload = samples_to_pcm(&sine(440.0, 16_000, FRAME_BYTES / 2, 10_000.0));
    let wire = packet::encode(&payload, 0x00FA_AC01, 77, 123_456);

    let (header, decoded) = packet::decode(&wire, FRAME_BYTES).unwrap();
    assert_eq!(header.ssrc, 0x00FA_AC01);
    assert_eq!(header.sequence, 77);
    assert_eq!(header.payload_len as usize, FRAME_BYTES);
    assert_eq!(decoded, &payload[..]);
}

#[test]
fn test_resample_length_law_both_directions() {
    for len in [160usize, 640, 960, 1000, 2881] {
        let buf = vec![0i16; len];

        let up = resample(&buf, 16_000, 24_000).unwrap();
        let expected = (len as f64 * 24_000.0 / 16_000.0).round() as usize;
        assert!(
            (up.len() as i64 - expected as i64).abs() <= 1,
            "upsample {len}: got {}, expected {expected}",
            up.len()
        );

        let down = resample(&buf, 24_000, 16_000).unwrap();
        let expected = (len as f64 * 16_000.0 / 24_000.0).round() as usize;
        assert!(
            (down.len() as i64 - expected as i64).abs() <= 1,
            "downsample {len}: got {}, expected {expected}",
            down.len()
        );
    }
}

#[test]
fn test_directions_are_not_inverses_in_length() {
    // 100 samples up: round(100 * 3/2) = 150; 150 down: round(150 * 2/3) = 100
    // but 101 up: round(151.5) = 152, and 152 down: round(101.33) = 101.
    // The two directions round independently
    let up = resample(&vec![0i16; 101], 16_000, 24_000).unwrap();
    assert_eq!(up.len(), 152);
    let down = resample(&up, 24_000, 16_000).unwrap();
    assert_eq!(down.len(), 101);
}

#[test]
fn test_frame_alignment_at_every_chunk_offset() {
    // any split of a frame-multiple input must yield exactly the same frames
    let frame = 64usize;
    let total = frame * 4;
    let data: Vec<u8> = (0..total).map(|i| (i % 251) as u8).collect();

    for split in 0..=total {
        let mut queue = PlayoutQueue::new(frame, 100);
        queue.ingest(&data[..split]);
        queue.ingest(&data[split..]);

        let mut emitted = Vec::new();
        while let Some(f) = queue.pop() {
            assert_eq!(f.len(), frame, "split at {split}");
            emitted.extend_from_slice(&f);
        }
        assert_eq!(emitted, data, "split at {split}");
    }
}

#[test]
fn test_frame_alignment_with_many_small_chunks() {
    let frame = 64usize;
    let total = frame * 8;
    let data: Vec<u8> = (0..total).map(|i| (i % 7) as u8).collect();

    // chunk sizes sweep every residue class of the frame size
    let mut queue = PlayoutQueue::new(frame, 100);
    let mut offset = 0;
    let mut step = 1;
    while offset < total {
        let end = (offset + step).min(total);
        queue.ingest(&data[offset..end]);
        offset = end;
        step = step % 67 + 1;
    }

    assert_eq!(queue.len(), 8);
    let mut emitted = Vec::new();
    while let Some(f) = queue.pop() {
        emitted.extend_from_slice(&f);
    }
    assert_eq!(emitted, data);
}

#[test]
fn test_overflow_drops_newest_keeps_oldest() {
    let capacity = 5usize;
    let mut queue = PlayoutQueue::new(FRAME_BYTES, capacity);

    for i in 0..capacity {
        queue.ingest(&vec![i as u8; FRAME_BYTES]);
    }
    assert_eq!(queue.len(), capacity);

    queue.ingest(&vec![0xFF; FRAME_BYTES]);
    assert_eq!(queue.len(), capacity);
    assert_eq!(queue.dropped_frames(), 1);

    for i in 0..capacity {
        assert_eq!(queue.pop().unwrap(), vec![i as u8; FRAME_BYTES]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_pacing_has_no_cumulative_drift() {
    let frame_duration = Duration::from_millis(40);
    let mut pacer = FramePacer::new(frame_duration);
    let start = Instant::now();

    let mut deadlines = Vec::new();
    for n in 0..50u32 {
        let deadline = pacer.schedule();
        tokio::time::sleep_until(deadline).await;
        deadlines.push(deadline);

        // jitter smaller than one frame: delay the loop a little sometimes
        if n % 3 == 0 {
            tokio::time::advance(Duration::from_millis(11)).await;
        }
    }

    // emitting N frames takes exactly N * frame_duration of scheduled time
    for (n, deadline) in deadlines.iter().enumerate() {
        assert_eq!(*deadline, start + frame_duration * n as u32);
    }
}

#[tokio::test(start_paused = true)]
async fn test_pacing_restarts_after_gap() {
    let frame_duration = Duration::from_millis(40);
    let mut pacer = FramePacer::new(frame_duration);

    let first_burst_start = pacer.schedule();
    tokio::time::sleep_until(pacer.schedule()).await;

    // buffer drained: cadence resets, a long gap passes
    pacer.reset();
    tokio::time::advance(Duration::from_secs(3)).await;

    // the next burst starts from now, not from the stale schedule
    let second_burst_start = pacer.schedule();
    assert_eq!(second_burst_start, Instant::now());
    assert!(second_burst_start > first_burst_start + Duration::from_secs(2));
}

#[tokio::test]
async fn test_barge_in_empties_buffer_before_cancel() {
    let audio = AudioConfig::default();
    let playout = jawbone::bridge::PlayoutHandle::new(
        audio.frame_bytes(),
        audio.max_buffered_frames,
    );
    let (tx, mut rx) = mpsc::channel(8);
    let mut receiver = CloudReceiver::new(playout.clone(), tx, audio);

    // queue up an active response: 2880 cloud samples = 3 device frames
    let pcm = samples_to_pcm(&vec![6000i16; 2880]);
    receiver
        .handle(ServerEvent::AudioDelta {
            delta: BASE64.encode(&pcm),
        })
        .await
        .unwrap();
    assert_eq!(playout.depth(), 3);

    receiver.handle(ServerEvent::SpeechStarted).await.unwrap();

    // the buffer was drained and the cancel message emitted
    assert!(playout.is_empty());
    assert!(matches!(rx.try_recv().unwrap(), ClientEvent::ResponseCancel));

    // no frame of the interrupted response survives to be transmitted
    assert!(playout.pop().is_none());
}

#[test]
fn test_reconnect_backoff_scenario() {
    let mut backoff = Backoff::new(Duration::from_secs(60));

    // three consecutive failures: 2, 4, 8
    assert_eq!(backoff.failure(), Duration::from_secs(2));
    assert_eq!(backoff.failure(), Duration::from_secs(4));
    assert_eq!(backoff.failure(), Duration::from_secs(8));

    // a successful connection resets the progression
    backoff.succeeded();
    assert_eq!(backoff.failure(), Duration::from_secs(2));
}

#[test]
fn test_full_audio_path_preserves_frame_geometry() {
    let audio = AudioConfig::default();

    // microphone frame off the wire
    let mic = samples_to_pcm(&sine(330.0, 16_000, audio.frame_samples(), 9_000.0));
    let wire = packet::encode(&mic, 1, 0, 0);
    let (_, payload) = packet::decode(&wire, audio.frame_bytes()).unwrap();

    // up to the cloud rate and back, as the two bridge directions do
    let up = resample(
        &pcm_to_samples(payload).unwrap(),
        audio.device_rate,
        audio.cloud_rate,
    )
    .unwrap();
    assert_eq!(up.len(), 960);

    let down = resample(&up, audio.cloud_rate, audio.device_rate).unwrap();
    let device_pcm = samples_to_pcm(&down);

    // regrouped for playout: exactly one device frame, nothing left over
    let mut queue = PlayoutQueue::new(audio.frame_bytes(), audio.max_buffered_frames);
    queue.ingest(&device_pcm);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.pop().unwrap().len(), audio.frame_bytes());
}
