//! Test helpers for driving a voice channel without real services
//!
//! Provides:
//! - A recording transport
//! - Scripted recognizer, NLU, synthesizer and skill runner
//! - A keyword fake wake engine and an amplitude fake VAD
//! - Scripted per-speaker microphones feeding real-time frames

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use parley_engine::backend::BackendResult;
use parley_engine::{
    AudioBuffer, AudioFormat, Backends, ChannelServices, Conversation, Detectors, EngineConfig,
    Intent, IntentDetector, NluInput, NluQuery, Recognizer, Result, SkillRunner, SpeakerId,
    Synthesizer, TransportEvent, VoiceChannel, VoiceTransport,
};
use parley_engine::services::Assets;
use parley_vad::VoiceActivity;
use parley_wake::WakeWordEngine;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Sample value the fake wake engine triggers on
pub const WAKE: i16 = 7777;
/// Level of a speech frame
pub const SPEECH: i16 = 3000;
/// Samples in one 20ms inbound frame (16kHz mono)
pub const FRAME: usize = 320;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn frame(level: i16) -> AudioBuffer {
    AudioBuffer::from_i16(1, 16000, &[level; FRAME]).unwrap()
}

/// Output-format audio of the given length
pub fn output_audio(duration: Duration) -> AudioBuffer {
    let format = AudioFormat::stereo_i16(48000);
    AudioBuffer::silence(format, format.frames_for(duration))
}

/// A looping background cue of 200ms
pub fn ambient_assets() -> Assets {
    Assets {
        ambient: Some(output_audio(Duration::from_millis(200))),
        ..Assets::default()
    }
}

// ---------------------------------------------------------------------------
// Detectors
// ---------------------------------------------------------------------------

/// Matches keyword 0 when a frame holds the [`WAKE`] sample
pub struct KeywordEngine;

impl WakeWordEngine for KeywordEngine {
    fn frame_length(&self) -> usize {
        160
    }

    fn sample_rate(&self) -> u32 {
        16000
    }

    fn process(&mut self, frame: &[i16]) -> parley_wake::Result<Option<usize>> {
        Ok(frame.contains(&WAKE).then_some(0))
    }
}

/// Voiced whenever any sample is louder than 500
pub struct AmplitudeVad;

impl VoiceActivity for AmplitudeVad {
    fn sample_rate(&self) -> u32 {
        16000
    }

    fn is_speech(&mut self, samples: &[i16]) -> parley_vad::Result<bool> {
        Ok(samples.iter().any(|s| s.unsigned_abs() > 500))
    }
}

fn keyword_engine() -> parley_wake::Result<Box<dyn WakeWordEngine>> {
    Ok(Box::new(KeywordEngine))
}

fn amplitude_vad() -> parley_vad::Result<Box<dyn VoiceActivity>> {
    Ok(Box::new(AmplitudeVad))
}

pub fn detectors() -> Detectors {
    Detectors {
        vad: Arc::new(amplitude_vad),
        wake: Arc::new(keyword_engine),
    }
}

// ---------------------------------------------------------------------------
// Shared event log
// ---------------------------------------------------------------------------

/// Ordered record of backend calls across all fakes
#[derive(Default)]
pub struct EventLog {
    entries: Mutex<Vec<String>>,
}

impl EventLog {
    pub fn push<S: Into<String>>(&self, entry: S) {
        self.entries.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries.lock().iter().position(|e| e == entry)
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Frame(Instant),
    Speaking(bool),
}

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn frames(&self) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|s| matches!(s, Sent::Frame(_)))
            .count()
    }

    pub fn toggles(&self) -> Vec<bool> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::Speaking(on) => Some(*on),
                Sent::Frame(_) => None,
            })
            .collect()
    }

    /// Frames sent in each speaking period
    pub fn bursts(&self) -> Vec<usize> {
        let mut bursts = Vec::new();
        for sent in self.sent.lock().iter() {
            match sent {
                Sent::Speaking(true) => bursts.push(0),
                Sent::Frame(_) => {
                    if let Some(last) = bursts.last_mut() {
                        *last += 1;
                    }
                }
                Sent::Speaking(false) => {}
            }
        }
        bursts
    }
}

#[async_trait]
impl VoiceTransport for RecordingTransport {
    async fn send_frame(&self, _pcm: &[u8]) -> Result<()> {
        self.sent.lock().push(Sent::Frame(Instant::now()));
        Ok(())
    }

    async fn set_speaking(&self, speaking: bool) -> Result<()> {
        self.sent.lock().push(Sent::Speaking(speaking));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

pub struct ScriptedRecognizer {
    log: Arc<EventLog>,
    transcripts: Mutex<VecDeque<BackendResult<String>>>,
    languages: Mutex<Vec<String>>,
}

impl ScriptedRecognizer {
    pub fn script(&self, transcript: BackendResult<String>) {
        self.transcripts.lock().push_back(transcript);
    }

    pub fn languages(&self) -> Vec<String> {
        self.languages.lock().clone()
    }
}

#[async_trait]
impl Recognizer for ScriptedRecognizer {
    async fn recognize(&self, audio: &AudioBuffer, language: &str) -> BackendResult<String> {
        assert!(!audio.is_empty());
        self.log.push("recognize");
        self.languages.lock().push(language.to_string());
        self.transcripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok("hello there".to_string()))
    }
}

pub struct ScriptedNlu {
    log: Arc<EventLog>,
    scripts: Mutex<HashMap<String, VecDeque<Intent>>>,
    queries: Mutex<Vec<NluQuery>>,
}

impl ScriptedNlu {
    /// Queue an intent for `session`
    pub fn script(&self, session: &str, intent: Intent) {
        self.scripts
            .lock()
            .entry(session.to_string())
            .or_default()
            .push_back(intent);
    }

    pub fn queries(&self) -> Vec<NluQuery> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl IntentDetector for ScriptedNlu {
    async fn detect(&self, query: &NluQuery) -> BackendResult<Intent> {
        let kind = match &query.input {
            NluInput::Text(_) => "text",
            NluInput::Audio(_) => "audio",
            NluInput::Event { .. } => "event",
        };
        self.log.push(format!("nlu:{}:{}", query.session_id, kind));
        self.queries.lock().push(query.clone());

        let scripted = self
            .scripts
            .lock()
            .get_mut(&query.session_id)
            .and_then(VecDeque::pop_front);
        Ok(scripted.unwrap_or_else(|| Intent::default().text("Okay")))
    }
}

pub struct ToneSynth {
    log: Arc<EventLog>,
    spoken: Mutex<Vec<(String, String)>>,
    durations: Mutex<HashMap<String, Duration>>,
}

impl ToneSynth {
    /// Make `text` synthesize to `duration` of audio (default 100ms)
    pub fn set_duration(&self, text: &str, duration: Duration) {
        self.durations.lock().insert(text.to_string(), duration);
    }

    pub fn texts(&self) -> Vec<String> {
        self.spoken.lock().iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn spoken(&self) -> Vec<(String, String)> {
        self.spoken.lock().clone()
    }
}

#[async_trait]
impl Synthesizer for ToneSynth {
    async fn synthesize(&self, text: &str, language: &str) -> BackendResult<AudioBuffer> {
        self.log.push(format!("say:{}", text));
        self.spoken
            .lock()
            .push((text.to_string(), language.to_string()));
        let duration = self
            .durations
            .lock()
            .get(text)
            .copied()
            .unwrap_or(Duration::from_millis(100));
        Ok(output_audio(duration))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkillCall {
    pub skill: String,
    pub speaker: SpeakerId,
    pub params: HashMap<String, String>,
}

/// Skill runner with a few canned skills
///
/// - `timer` speaks "Timer set"
/// - `confirm` asks a yes/no question and records the answer
/// - `echo` asks for a name with two tries and repeats it
/// - anything else does nothing
pub struct RecordingSkills {
    log: Arc<EventLog>,
    calls: Mutex<Vec<SkillCall>>,
    answers: Mutex<Vec<bool>>,
}

impl RecordingSkills {
    pub fn calls(&self) -> Vec<SkillCall> {
        self.calls.lock().clone()
    }

    pub fn answers(&self) -> Vec<bool> {
        self.answers.lock().clone()
    }
}

#[async_trait]
impl SkillRunner for RecordingSkills {
    async fn run(
        &self,
        skill: &str,
        conversation: &mut Conversation<'_>,
        speaker: &SpeakerId,
        params: &HashMap<String, String>,
    ) -> Result<Option<serde_json::Value>> {
        self.log.push(format!("skill:{}", skill));
        self.calls.lock().push(SkillCall {
            skill: skill.to_string(),
            speaker: speaker.clone(),
            params: params.clone(),
        });

        match skill {
            "timer" => {
                conversation.speak("Timer set").await?;
                Ok(None)
            }
            "echo" => {
                let heard = conversation.ask("What is your name?", None, Some(2)).await?;
                conversation.speak(&heard).await?;
                Ok(None)
            }
            "confirm" => {
                let answer = conversation.ask_yes_no("Are you sure?").await?;
                self.answers.lock().push(answer);
                Ok(Some(serde_json::json!({ "confirmed": answer })))
            }
            _ => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Per-speaker microphone script
///
/// Sends one 20ms frame every 20ms. `wake_at` emits a single wake frame at
/// that frame index. After it the speaker says `bursts` phrases of 300ms, each
/// followed by 600ms of silence, then stays silent. `rewake_at` repeats the
/// wake word later and restarts the phrases after it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mic {
    pub wake_at: Option<usize>,
    pub rewake_at: Option<usize>,
    pub bursts: usize,
}

impl Mic {
    pub fn silent() -> Self {
        Self::default()
    }

    /// Talks forever without ever saying the wake word
    pub fn chatter() -> Self {
        Self {
            bursts: usize::MAX,
            ..Self::default()
        }
    }

    pub fn wake_then_silent(at: usize) -> Self {
        Self::wake_then_bursts(at, 0)
    }

    pub fn wake_then_chatter(at: usize) -> Self {
        Self::wake_then_bursts(at, usize::MAX)
    }

    pub fn wake_then_bursts(at: usize, bursts: usize) -> Self {
        Self {
            wake_at: Some(at),
            bursts,
            ..Self::default()
        }
    }

    /// Wakes at `first` and again at `again`, with `bursts` phrases after each
    pub fn wake_twice(first: usize, again: usize, bursts: usize) -> Self {
        Self {
            rewake_at: Some(again),
            ..Self::wake_then_bursts(first, bursts)
        }
    }

    fn level(&self, index: usize) -> i16 {
        if self.wake_at == Some(index) || self.rewake_at == Some(index) {
            return WAKE;
        }
        let from = match (self.wake_at, self.rewake_at) {
            (Some(at), _) if index < at => return 0,
            (_, Some(again)) if index > again => again + 1,
            (Some(at), _) => at + 1,
            (None, _) => 0,
        };
        let offset = index - from;
        if offset / 45 < self.bursts && offset % 45 < 15 {
            SPEECH
        } else {
            0
        }
    }
}

pub struct Harness {
    pub log: Arc<EventLog>,
    pub transport: Arc<RecordingTransport>,
    pub recognizer: Arc<ScriptedRecognizer>,
    pub nlu: Arc<ScriptedNlu>,
    pub synth: Arc<ToneSynth>,
    pub skills: Arc<RecordingSkills>,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        let log = Arc::new(EventLog::default());
        Self {
            transport: Arc::new(RecordingTransport::default()),
            recognizer: Arc::new(ScriptedRecognizer {
                log: log.clone(),
                transcripts: Mutex::new(VecDeque::new()),
                languages: Mutex::new(Vec::new()),
            }),
            nlu: Arc::new(ScriptedNlu {
                log: log.clone(),
                scripts: Mutex::new(HashMap::new()),
                queries: Mutex::new(Vec::new()),
            }),
            synth: Arc::new(ToneSynth {
                log: log.clone(),
                spoken: Mutex::new(Vec::new()),
                durations: Mutex::new(HashMap::new()),
            }),
            skills: Arc::new(RecordingSkills {
                log: log.clone(),
                calls: Mutex::new(Vec::new()),
                answers: Mutex::new(Vec::new()),
            }),
            log,
        }
    }

    /// Default engine config with 16kHz mono inbound audio and no cues
    pub fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.channel.inbound = AudioFormat::mono_i16(16000);
        config.conversation.greet_on_start = false;
        config.conversation.welcome_on_join = false;
        config
    }

    pub fn backends(&self) -> Backends {
        Backends {
            recognizer: self.recognizer.clone(),
            nlu: self.nlu.clone(),
            synthesizer: self.synth.clone(),
            skills: self.skills.clone(),
        }
    }

    pub fn services(&self, config: EngineConfig) -> Arc<ChannelServices> {
        self.services_with(config, Assets::default())
    }

    pub fn services_with(&self, config: EngineConfig, assets: Assets) -> Arc<ChannelServices> {
        Arc::new(
            ChannelServices::new(
                config,
                self.transport.clone(),
                self.backends(),
                detectors(),
                assets,
            )
            .unwrap(),
        )
    }

    pub fn channel(&self, config: EngineConfig, assets: Assets) -> VoiceChannel {
        VoiceChannel::with_assets(
            config,
            self.transport.clone(),
            self.backends(),
            detectors(),
            assets,
        )
        .unwrap()
    }

    /// Start a channel and return its event sender
    pub fn start(&self, config: EngineConfig) -> Running {
        self.start_with(config, Assets::default())
    }

    pub fn start_with(&self, config: EngineConfig, assets: Assets) -> Running {
        let channel = self.channel(config, assets);
        let (events, rx) = mpsc::channel(256);
        let task = tokio::spawn(channel.run(rx));
        Running {
            events,
            task,
            mics: Vec::new(),
        }
    }
}

pub struct Running {
    pub events: mpsc::Sender<TransportEvent>,
    task: JoinHandle<()>,
    mics: Vec<JoinHandle<()>>,
}

impl Running {
    /// Feed a speaker's scripted microphone into the channel
    pub fn mic(&mut self, speaker: &str, script: Mic) {
        let events = self.events.clone();
        let speaker = SpeakerId::from(speaker);
        self.mics.push(tokio::spawn(async move {
            let mut index = 0;
            loop {
                let pcm = frame(script.level(index)).into_data();
                let event = TransportEvent::Frame(parley_engine::InboundFrame {
                    speaker: speaker.clone(),
                    pcm,
                });
                if events.send(event).await.is_err() {
                    break;
                }
                index += 1;
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }));
    }

    /// Stop the microphones and end the transport stream
    pub async fn stop(self) {
        for mic in &self.mics {
            mic.abort();
        }
        for mic in self.mics {
            let _ = mic.await;
        }
        drop(self.events);
        self.task.await.unwrap();
    }
}

/// Poll `condition` every 10ms of virtual time until it holds
pub async fn wait_for<F: Fn() -> bool>(condition: F, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
