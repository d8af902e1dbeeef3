//! Playout scheduling
//!
//! The cloud sends audio in bursts of arbitrary-size chunks; the hardware
//! wants one fixed-size frame on a fixed cadence. This module owns the
//! buffering between the two: a byte accumulator that re-slices chunks into
//! exact device frames, a bounded FIFO of frames awaiting emission, and a
//! deadline-driven pacing loop that transmits them at wall-clock rate.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::bridge::actuator::ActuatorDriver;
use crate::transport::{DeviceLink, PacketEncoder};
use crate::Result;

/// Emit a progress log line every this many frames (one second of 40ms frames)
const PROGRESS_INTERVAL: u64 = 25;

/// Accumulator plus bounded frame FIFO.
///
/// Single-writer/single-reader: the cloud-receive side appends, the pacing
/// side removes. When the FIFO is full the *newest* frame is dropped so the
/// continuity of already-buffered speech is preserved over freshness.
#[derive(Debug)]
pub struct PlayoutQueue {
    frames: VecDeque<Vec<u8>>,
    pending: Vec<u8>,
    frame_bytes: usize,
    max_frames: usize,
    dropped: u64,
}

impl PlayoutQueue {
    /// Create an empty queue for the given frame geometry
    #[must_use]
    pub fn new(frame_bytes: usize, max_frames: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(max_frames.min(1024)),
            pending: Vec::with_capacity(frame_bytes * 2),
            frame_bytes,
            max_frames,
            dropped: 0,
        }
    }

    /// Append device-rate PCM and slice off every complete frame.
    ///
    /// Leftover bytes stay in the accumulator for the next chunk, so every
    /// queued frame is exactly `frame_bytes` long no matter how the input
    /// was chunked. Returns how many frames were dropped to the cap.
    pub fn ingest(&mut self, pcm: &[u8]) -> u64 {
        self.pending.extend_from_slice(pcm);

        let mut dropped_now = 0;
        while self.pending.len() >= self.frame_bytes {
            let frame: Vec<u8> = self.pending.drain(..self.frame_bytes).collect();
            if self.frames.len() < self.max_frames {
                self.frames.push_back(frame);
            } else {
                dropped_now += 1;
            }
        }

        self.dropped += dropped_now;
        dropped_now
    }

    /// Remove the oldest queued frame
    pub fn pop(&mut self) -> Option<Vec<u8>> {
        self.frames.pop_front()
    }

    /// Discard all queued frames and the accumulator; returns the number of
    /// frames thrown away
    pub fn clear(&mut self) -> usize {
        let discarded = self.frames.len();
        self.frames.clear();
        self.pending.clear();
        discarded
    }

    /// Queued frame count
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether no frames are queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total frames dropped to the cap since creation
    #[must_use]
    pub const fn dropped_frames(&self) -> u64 {
        self.dropped
    }
}

/// Shared handle to the playout queue.
///
/// The cloud-receive task is the sole appender and the pacing task the sole
/// remover; the mutex only guards the brief splice operations.
#[derive(Clone)]
pub struct PlayoutHandle {
    queue: Arc<Mutex<PlayoutQueue>>,
    notify: Arc<Notify>,
}

impl PlayoutHandle {
    /// Create a handle around a fresh queue
    #[must_use]
    pub fn new(frame_bytes: usize, max_frames: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(PlayoutQueue::new(frame_bytes, max_frames))),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Append PCM, waking the pacing task if frames became available.
    ///
    /// Returns how many frames were dropped to the cap.
    pub fn ingest(&self, pcm: &[u8]) -> u64 {
        let (dropped, has_frames) = {
            let mut queue = self.queue.lock().expect("playout queue poisoned");
            let dropped = queue.ingest(pcm);
            (dropped, !queue.is_empty())
        };

        if has_frames {
            self.notify.notify_one();
        }
        dropped
    }

    /// Remove the oldest queued frame
    pub fn pop(&self) -> Option<Vec<u8>> {
        self.queue.lock().expect("playout queue poisoned").pop()
    }

    /// Drain everything queued (barge-in, session teardown); returns the
    /// number of frames discarded
    pub fn clear(&self) -> usize {
        self.queue.lock().expect("playout queue poisoned").clear()
    }

    /// Queued frame count
    #[must_use]
    pub fn depth(&self) -> usize {
        self.queue.lock().expect("playout queue poisoned").len()
    }

    /// Whether no frames are queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().expect("playout queue poisoned").is_empty()
    }

    /// Total frames dropped to the cap
    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.queue
            .lock()
            .expect("playout queue poisoned")
            .dropped_frames()
    }

    /// Wait until at least one frame is queued
    pub async fn wait_nonempty(&self) {
        loop {
            let notified = self.notify.notified();
            if !self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

/// Wall-clock cadence for frame emission.
///
/// Each deadline is the previous deadline plus exactly one frame duration,
/// never "now plus a frame", so scheduling jitter smaller than a frame does
/// not accumulate into drift. An empty buffer unsets the deadline so the
/// next burst starts a fresh cadence.
#[derive(Debug)]
pub struct FramePacer {
    frame_duration: Duration,
    deadline: Option<Instant>,
}

impl FramePacer {
    /// Create a pacer for the given frame duration
    #[must_use]
    pub const fn new(frame_duration: Duration) -> Self {
        Self {
            frame_duration,
            deadline: None,
        }
    }

    /// Deadline the next frame should leave at, advancing the cadence.
    ///
    /// Starts a new cadence at "now" when none is active.
    pub fn schedule(&mut self) -> Instant {
        let next = self.deadline.unwrap_or_else(Instant::now);
        self.deadline = Some(next + self.frame_duration);
        next
    }

    /// Unset the cadence; returns whether one was active
    pub fn reset(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}

/// Pacing loop: dequeue, transmit, drive the actuator.
///
/// Runs until the supervisor cancels it. Local transport failures are
/// logged and the loop keeps going; the hardware peer may just be
/// rebooting.
pub async fn run(
    playout: PlayoutHandle,
    link: Arc<DeviceLink>,
    mut encoder: PacketEncoder,
    mut actuator: ActuatorDriver,
    frame_duration: Duration,
) -> Result<()> {
    let mut pacer = FramePacer::new(frame_duration);
    let mut frames_sent: u64 = 0;

    loop {
        if playout.is_empty() {
            if pacer.reset() {
                tracing::debug!(frames_sent, "playout drained, cadence reset");
                actuator.on_silence();
            }
            playout.wait_nonempty().await;
            tracing::debug!(depth = playout.depth(), "playout stream starting");
            continue;
        }

        let deadline = pacer.schedule();
        tokio::time::sleep_until(deadline).await;

        // barge-in may have drained the queue while we slept
        let Some(frame) = playout.pop() else {
            continue;
        };

        if let Err(e) = link.send(&encoder.encode(&frame)).await {
            tracing::warn!(error = %e, "frame transmit failed, continuing");
        }
        frames_sent += 1;
        actuator.on_frame(&frame);

        if frames_sent % PROGRESS_INTERVAL == 0 {
            tracing::debug!(
                frames_sent,
                depth = playout.depth(),
                dropped = playout.dropped_frames(),
                "playout progress"
            );
        }
    }
}
