//! Barge-in coordination
//!
//! An interruptible playback races against one fresh wake-word wait per
//! speaker tracked when the race starts. Each wait reads from a temporary
//! frame tap that the demultiplexer fills alongside the speaker's own queue,
//! so the speaker pipelines keep their queues and detector state untouched.
//!
//! Speakers that join after a race has started are not part of it.

use parking_lot::Mutex;
use parley_audio::AudioBuffer;
use parley_wake::{WakeDetector, WakeEngineFactory};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::playback::{PlaybackEngine, PlaybackHandle, PlaybackOutcome};
use crate::transport::SpeakerId;

struct Tap {
    id: u64,
    tx: mpsc::UnboundedSender<AudioBuffer>,
}

pub struct InterruptCoordinator {
    wake: Arc<dyn WakeEngineFactory>,
    tracked: Mutex<BTreeSet<SpeakerId>>,
    taps: Mutex<HashMap<SpeakerId, Vec<Tap>>>,
    next_tap: AtomicU64,
}

impl InterruptCoordinator {
    pub fn new(wake: Arc<dyn WakeEngineFactory>) -> Self {
        Self {
            wake,
            tracked: Mutex::new(BTreeSet::new()),
            taps: Mutex::new(HashMap::new()),
            next_tap: AtomicU64::new(0),
        }
    }

    /// Include `speaker` in races started from now on
    pub fn track(&self, speaker: &SpeakerId) {
        self.tracked.lock().insert(speaker.clone());
    }

    /// Remove `speaker` and close its open taps
    pub fn untrack(&self, speaker: &SpeakerId) {
        self.tracked.lock().remove(speaker);
        self.taps.lock().remove(speaker);
    }

    pub fn tracked(&self) -> Vec<SpeakerId> {
        self.tracked.lock().iter().cloned().collect()
    }

    /// Copy an inbound frame into every live tap for `speaker`
    pub fn dispatch(&self, speaker: &SpeakerId, frame: &AudioBuffer) {
        let mut taps = self.taps.lock();
        let Some(open) = taps.get_mut(speaker) else {
            return;
        };

        open.retain(|tap| tap.tx.send(frame.clone()).is_ok());
        if open.is_empty() {
            taps.remove(speaker);
        }
    }

    /// Open taps count, for diagnostics
    pub fn open_taps(&self) -> usize {
        self.taps.lock().values().map(Vec::len).sum()
    }

    fn open_tap(&self, speaker: &SpeakerId) -> (u64, mpsc::UnboundedReceiver<AudioBuffer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_tap.fetch_add(1, Ordering::Relaxed);
        self.taps
            .lock()
            .entry(speaker.clone())
            .or_default()
            .push(Tap { id, tx });
        (id, rx)
    }

    fn close_tap(&self, speaker: &SpeakerId, id: u64) {
        let mut taps = self.taps.lock();
        if let Some(open) = taps.get_mut(speaker) {
            open.retain(|tap| tap.id != id);
            if open.is_empty() {
                taps.remove(speaker);
            }
        }
    }

    /// Play `audio` so that any tracked speaker's wake word stops it
    pub async fn play_interruptible(
        &self,
        playback: &PlaybackEngine,
        audio: AudioBuffer,
    ) -> Result<PlaybackOutcome> {
        self.race(playback.start(audio)).await
    }

    /// Race a running playback against a wake-word wait per tracked speaker
    ///
    /// Returns the playback outcome when it finishes first, or
    /// [`EngineError::Interrupted`] after cancelling it when a wake word wins.
    pub async fn race(&self, mut playback: PlaybackHandle) -> Result<PlaybackOutcome> {
        let mut opened = RaceTaps {
            coordinator: self,
            taps: Vec::new(),
        };
        let mut waits = JoinSet::new();
        for speaker in self.tracked() {
            let detector = WakeDetector::from_factory(self.wake.as_ref())?;
            let (id, tap) = self.open_tap(&speaker);
            opened.taps.push((speaker.clone(), id));
            waits.spawn(wait_for_wake(speaker, tap, detector));
        }
        debug!("Interrupt race started with {} wake waits", waits.len());

        loop {
            tokio::select! {
                outcome = playback.join() => {
                    // Pending waits are dropped with their partial detector state
                    waits.abort_all();
                    return outcome;
                }
                Some(joined) = waits.join_next(), if !waits.is_empty() => {
                    match joined {
                        Ok(Some(by)) => {
                            info!("Playback interrupted by {}", by);
                            playback.cancel();
                            waits.abort_all();
                            match playback.join().await {
                                Ok(outcome) => debug!("Interrupted playback ended: {:?}", outcome),
                                Err(e) => warn!("Interrupted playback failed: {}", e),
                            }
                            return Err(EngineError::Interrupted { by });
                        }
                        Ok(None) => {}
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => warn!("Wake wait failed: {}", e),
                    }
                }
            }
        }
    }
}

/// Taps opened by one race, closed when the race ends or is dropped
struct RaceTaps<'a> {
    coordinator: &'a InterruptCoordinator,
    taps: Vec<(SpeakerId, u64)>,
}

impl Drop for RaceTaps<'_> {
    fn drop(&mut self) {
        for (speaker, id) in self.taps.drain(..) {
            self.coordinator.close_tap(&speaker, id);
        }
    }
}

/// Feed a tap into a fresh detector until it matches or the tap closes
async fn wait_for_wake(
    speaker: SpeakerId,
    mut tap: mpsc::UnboundedReceiver<AudioBuffer>,
    mut detector: WakeDetector,
) -> Option<SpeakerId> {
    while let Some(frame) = tap.recv().await {
        match detector.feed(&frame) {
            Ok(Some(_)) => return Some(speaker),
            Ok(None) => {}
            Err(e) => {
                warn!("Wake detection failed for {} during playback: {}", speaker, e);
                return None;
            }
        }
    }
    None
}
