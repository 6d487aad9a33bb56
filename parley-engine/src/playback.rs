//! Real-time playback and pacing
//!
//! Every outgoing stream is converted to the channel's output format, cut into
//! fixed-size frames and sent against an absolute schedule: after each frame
//! the next deadline advances by exactly one frame duration and the task sleeps
//! only until that deadline. Late wakeups are absorbed by the following sleep
//! instead of accumulating.
//!
//! Playback requests are serialized by the speaking lock. Each request runs as
//! its own task and stops cooperatively at the next frame boundary when its
//! handle is cancelled or dropped.

use parley_audio::{AudioBuffer, AudioFormat};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::transport::VoiceTransport;

/// How a playback request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed { frames: usize },
    Cancelled { frames: usize },
}

impl PlaybackOutcome {
    pub fn frames(&self) -> usize {
        match self {
            Self::Completed { frames } | Self::Cancelled { frames } => *frames,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// State guarded by the speaking lock
struct SpeakingState {
    speaking: bool,
}

struct PlaybackInner {
    transport: Arc<dyn VoiceTransport>,
    format: AudioFormat,
    frame_frames: usize,
    frame_duration: Duration,
    state: Mutex<SpeakingState>,
    /// Requests started and not yet finished
    pending: AtomicUsize,
}

/// Channel-wide playback engine
#[derive(Clone)]
pub struct PlaybackEngine {
    inner: Arc<PlaybackInner>,
}

enum Source {
    Buffer(AudioBuffer),
    Stream(mpsc::Receiver<AudioBuffer>),
    Loop(AudioBuffer),
}

impl PlaybackEngine {
    pub fn new(
        transport: Arc<dyn VoiceTransport>,
        format: AudioFormat,
        frame_duration: Duration,
    ) -> Result<Self> {
        format.validate()?;

        let frame_frames = format.frames_for(frame_duration);
        if frame_frames == 0 {
            return Err(EngineError::config(format!(
                "Frame duration {:?} is shorter than one frame at {}",
                frame_duration, format
            )));
        }

        info!(
            "Playback engine ready (format: {}, frame: {} frames)",
            format, frame_frames
        );

        Ok(Self {
            inner: Arc::new(PlaybackInner {
                transport,
                format,
                frame_frames,
                frame_duration: format.duration_of(frame_frames),
                state: Mutex::new(SpeakingState { speaking: false }),
                pending: AtomicUsize::new(0),
            }),
        })
    }

    /// Output format every frame is sent in
    pub fn format(&self) -> AudioFormat {
        self.inner.format
    }

    /// Duration of one outbound frame
    pub fn frame_duration(&self) -> Duration {
        self.inner.frame_duration
    }

    /// Whether any playback request is queued or running
    pub(crate) fn is_busy(&self) -> bool {
        self.inner.pending.load(Ordering::SeqCst) > 0
    }

    /// Convert `audio` to the output format and split it into frames
    ///
    /// The final short frame is padded with silence.
    #[cfg(test)]
    fn frames(&self, audio: &AudioBuffer) -> Result<Vec<Vec<u8>>> {
        self.inner.frames(audio)
    }

    /// Start playing a buffer
    pub fn start(&self, audio: AudioBuffer) -> PlaybackHandle {
        self.spawn(Source::Buffer(audio))
    }

    /// Start playing a stream of buffers as one continuous playback
    ///
    /// Buffers may arrive in any format and any length; they are re-framed on
    /// the fly. The playback ends when the sender is dropped.
    pub fn start_stream(&self, stream: mpsc::Receiver<AudioBuffer>) -> PlaybackHandle {
        self.spawn(Source::Stream(stream))
    }

    /// Repeat a buffer back to back until the handle is cancelled
    ///
    /// The whole loop is one request, so the speaking state stays on between
    /// repeats. A cancelled loop still ends with [`PlaybackOutcome::Cancelled`].
    pub fn start_loop(&self, audio: AudioBuffer) -> PlaybackHandle {
        self.spawn(Source::Loop(audio))
    }

    /// Play a buffer to completion
    pub async fn play(&self, audio: AudioBuffer) -> Result<PlaybackOutcome> {
        self.start(audio).wait().await
    }

    fn spawn(&self, source: Source) -> PlaybackHandle {
        let token = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        inner.pending.fetch_add(1, Ordering::SeqCst);

        let task_token = token.clone();
        let task = tokio::spawn(async move { inner.run(source, task_token).await });

        PlaybackHandle {
            token,
            task: Some(task),
        }
    }
}

impl PlaybackInner {
    fn frame_bytes(&self) -> usize {
        self.frame_frames * self.format.frame_width()
    }

    fn frames(&self, audio: &AudioBuffer) -> Result<Vec<Vec<u8>>> {
        let converted = audio.convert(self.format)?;
        let total = converted.frames();

        let mut frames = Vec::with_capacity(total.div_ceil(self.frame_frames));
        let mut start = 0;
        while start < total {
            let end = (start + self.frame_frames).min(total);
            let mut frame = converted.slice(start..end);
            if frame.frames() < self.frame_frames {
                let pad = AudioBuffer::silence(self.format, self.frame_frames - frame.frames());
                frame.append(&pad)?;
            }
            frames.push(frame.into_data());
            start = end;
        }
        Ok(frames)
    }

    async fn run(&self, source: Source, token: CancellationToken) -> Result<PlaybackOutcome> {
        let mut state = self.state.lock().await;

        let result = {
            let mut sink = FrameSink {
                inner: self,
                state: &mut *state,
                token: &token,
                next: None,
                sent: 0,
            };
            match source {
                Source::Buffer(audio) => sink.play_buffer(&audio).await,
                Source::Stream(stream) => sink.play_stream(stream).await,
                Source::Loop(audio) => sink.play_loop(&audio).await,
            }
        };

        // The inactive toggle goes out only once the last queued request is done
        let remaining = self.pending.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 && state.speaking {
            state.speaking = false;
            if let Err(e) = self.transport.set_speaking(false).await {
                warn!("Failed to clear speaking state: {}", e);
                if result.is_ok() {
                    return Err(e);
                }
            }
            info!("Speaking stopped");
        }

        result
    }
}

/// Paced frame emitter for one playback request
struct FrameSink<'a> {
    inner: &'a PlaybackInner,
    state: &'a mut SpeakingState,
    token: &'a CancellationToken,
    next: Option<Instant>,
    sent: usize,
}

impl FrameSink<'_> {
    fn cancelled(&self) -> PlaybackOutcome {
        debug!("Playback cancelled after {} frames", self.sent);
        PlaybackOutcome::Cancelled { frames: self.sent }
    }

    async fn play_buffer(&mut self, audio: &AudioBuffer) -> Result<PlaybackOutcome> {
        if self.token.is_cancelled() {
            return Ok(self.cancelled());
        }

        let frames = self.inner.frames(audio)?;
        debug!(
            "Playing {} frames ({:?})",
            frames.len(),
            self.inner.frame_duration * frames.len() as u32
        );

        for frame in &frames {
            if !self.send(frame).await? {
                return Ok(self.cancelled());
            }
        }
        Ok(PlaybackOutcome::Completed { frames: self.sent })
    }

    async fn play_loop(&mut self, audio: &AudioBuffer) -> Result<PlaybackOutcome> {
        if self.token.is_cancelled() {
            return Ok(self.cancelled());
        }

        let frames = self.inner.frames(audio)?;
        if frames.is_empty() {
            return Ok(PlaybackOutcome::Completed { frames: 0 });
        }
        debug!("Looping {} frames", frames.len());

        for frame in frames.iter().cycle() {
            if !self.send(frame).await? {
                break;
            }
        }
        Ok(self.cancelled())
    }

    async fn play_stream(
        &mut self,
        mut stream: mpsc::Receiver<AudioBuffer>,
    ) -> Result<PlaybackOutcome> {
        let format = self.inner.format;
        let frame_bytes = self.inner.frame_bytes();
        let mut carry: Vec<u8> = Vec::with_capacity(frame_bytes * 2);

        loop {
            let chunk = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Ok(self.cancelled()),
                chunk = stream.recv() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };

            let converted = chunk.convert(format)?;
            carry.extend_from_slice(converted.data());
            self.resync();

            while carry.len() >= frame_bytes {
                let frame: Vec<u8> = carry.drain(..frame_bytes).collect();
                if !self.send(&frame).await? {
                    return Ok(self.cancelled());
                }
            }
        }

        if !carry.is_empty() {
            let missing = (frame_bytes - carry.len()) / format.frame_width();
            carry.extend_from_slice(AudioBuffer::silence(format, missing).data());
            if !self.send(&carry).await? {
                return Ok(self.cancelled());
            }
        }

        Ok(PlaybackOutcome::Completed { frames: self.sent })
    }

    /// Restart the schedule after the producer fell behind real time
    fn resync(&mut self) {
        let now = Instant::now();
        if let Some(next) = self.next {
            if next + self.inner.frame_duration < now {
                self.next = Some(now);
            }
        }
    }

    /// Send one frame and sleep until its slot ends
    ///
    /// Returns `false` when cancelled.
    async fn send(&mut self, frame: &[u8]) -> Result<bool> {
        if self.token.is_cancelled() {
            return Ok(false);
        }

        if !self.state.speaking {
            self.inner.transport.set_speaking(true).await?;
            self.state.speaking = true;
            info!("Speaking started");
        }

        let slot = self.next.unwrap_or_else(Instant::now);
        self.inner.transport.send_frame(frame).await?;
        self.sent += 1;

        let deadline = slot + self.inner.frame_duration;
        self.next = Some(deadline);

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Ok(false),
            _ = sleep_until(deadline) => Ok(true),
        }
    }
}

/// Handle to a running playback
///
/// Dropping the handle cancels the playback.
pub struct PlaybackHandle {
    token: CancellationToken,
    task: Option<JoinHandle<Result<PlaybackOutcome>>>,
}

impl PlaybackHandle {
    /// Ask the playback to stop at the next frame boundary
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the playback to end
    ///
    /// Safe to use as a `select!` branch: if the branch loses, the playback
    /// keeps running and can be joined again.
    pub async fn join(&mut self) -> Result<PlaybackOutcome> {
        let Some(task) = self.task.as_mut() else {
            return Err(EngineError::task("Playback already joined"));
        };
        let result = task.await;
        self.task = None;
        result?
    }

    /// Wait for the playback to end, consuming the handle
    pub async fn wait(mut self) -> Result<PlaybackOutcome> {
        self.join().await
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.token.cancel();
        }
    }
}
