//! Speech engine seam and the kokoro-tiny backed implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use kokoro_tiny::TtsEngine;
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::error::DebateError;
use crate::turn_log::Turn;
use crate::voice::{VoiceDirectory, VoiceProfile, kokoro_language_tag};

/// Kokoro renders mono audio at 24 kHz.
pub const SAMPLE_RATE: u32 = 24_000;

const CHUNK_GAP_SAMPLES: usize = 7_200;
const PLAYBACK_POLL: Duration = Duration::from_millis(20);

/// A process-wide speech device.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Voices the engine can currently speak with. May be empty while loading.
    async fn voices(&self) -> Result<Vec<VoiceProfile>, DebateError>;

    /// Speak `text`, resolving once playback has finished, been halted, or failed.
    /// `None` uses the engine's default voice.
    async fn speak(&self, text: &str, voice: Option<&VoiceProfile>) -> Result<(), DebateError>;

    /// Stop whatever is being spoken right now. Safe to call from any task.
    fn halt(&self);

    /// Resolve once the engine has released the audio device, including
    /// playback left behind by a cancelled `speak`.
    async fn wait_idle(&self) {}
}

/// Text spoken for a turn: the speaker's name, then the turn's content.
pub fn utterance_text(turn: &Turn) -> String {
    let speaker = sanitize_for_speech(&turn.speaker_name);
    let text = sanitize_for_speech(&turn.text);
    if speaker.is_empty() {
        text
    } else {
        format!("{}. {}", speaker, text)
    }
}

/// Strip markup a speech engine would read aloud or choke on.
///
/// Removes reasoning blocks such as `<think>...</think>`, leftover XML-like
/// tags, markdown structure characters and non-speakable symbols (emoji),
/// then collapses whitespace.
pub fn sanitize_for_speech(text: &str) -> String {
    let tags_to_strip = ["thinking", "think", "reflection", "reasoning", "scratchpad"];

    let mut result = text.to_string();

    for tag in &tags_to_strip {
        let pattern = format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag);
        if let Ok(re) = regex::Regex::new(&pattern) {
            result = re.replace_all(&result, " ").to_string();
        }
    }

    if let Ok(orphan_re) = regex::Regex::new(r"</?[\w]+[^>]*>") {
        result = orphan_re.replace_all(&result, " ").to_string();
    }

    let result: String = result
        .chars()
        .map(|c| match c {
            '*' | '_' | '#' | '~' | '`' | '>' | '<' | '|' | '[' | ']' | '{' | '}' => ' ',
            c if c.is_alphanumeric() || c.is_whitespace() => c,
            '.' | ',' | ';' | ':' | '!' | '?' | '\'' | '"' | '(' | ')' | '-' | '%' | '$' | '&' | '/' => c,
            _ => ' ',
        })
        .collect();

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split text into chunks that are safe for TTS synthesis.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current_chunk = String::new();

    // Split by sentence-ending punctuation
    for sentence in text.split_inclusive(&['.', '!', '?', ';'][..]) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        if current_chunk.len() + sentence.len() > max_chars {
            if !current_chunk.is_empty() {
                chunks.push(current_chunk.trim().to_string());
                current_chunk = String::new();
            }

            // If single sentence is too long, split by commas
            if sentence.len() > max_chars {
                for part in sentence.split_inclusive(',') {
                    if current_chunk.len() + part.len() > max_chars && !current_chunk.is_empty() {
                        chunks.push(current_chunk.trim().to_string());
                        current_chunk = String::new();
                    }
                    current_chunk.push_str(part);
                    current_chunk.push(' ');
                }
            } else {
                current_chunk.push_str(sentence);
                current_chunk.push(' ');
            }
        } else {
            current_chunk.push_str(sentence);
            current_chunk.push(' ');
        }
    }

    if !current_chunk.trim().is_empty() {
        chunks.push(current_chunk.trim().to_string());
    }

    chunks
}

/// kokoro-tiny synthesis played through the default audio output.
///
/// The model is loaded on a background thread (it is downloaded on first
/// run); the voice directory is refreshed once it is ready.
pub struct KokoroSpeech {
    engine: Arc<OnceLock<Mutex<TtsEngine>>>,
    current: Mutex<Option<Playback>>,
    chunk_chars: usize,
}

/// The utterance holding the audio device.
struct Playback {
    halt: Arc<AtomicBool>,
    /// Flips to `true`, or closes, once the blocking player has returned.
    done: watch::Receiver<bool>,
}

impl KokoroSpeech {
    /// Start loading the model and return immediately.
    pub fn load_in_background(directory: VoiceDirectory, chunk_chars: usize) -> Self {
        let engine: Arc<OnceLock<Mutex<TtsEngine>>> = Arc::new(OnceLock::new());
        let cell = Arc::clone(&engine);

        std::thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    error!(error = %e, "failed to build runtime for TTS model load");
                    return;
                }
            };

            match runtime.block_on(TtsEngine::new()) {
                Ok(tts) => {
                    let voices = kokoro_profiles(tts.voices());
                    info!(voices = voices.len(), "kokoro TTS model loaded");
                    if cell.set(Mutex::new(tts)).is_err() {
                        return;
                    }
                    directory.refresh(voices);
                }
                Err(e) => error!(error = %e, "failed to initialize TTS"),
            }
        });

        Self {
            engine,
            current: Mutex::new(None),
            chunk_chars,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.get().is_some()
    }
}

#[async_trait]
impl SpeechEngine for KokoroSpeech {
    async fn voices(&self) -> Result<Vec<VoiceProfile>, DebateError> {
        match self.engine.get() {
            Some(engine) => {
                let engine = engine
                    .lock()
                    .map_err(|_| DebateError::TtsError("TTS engine lock poisoned".to_string()))?;
                Ok(kokoro_profiles(engine.voices()))
            }
            None => Ok(Vec::new()),
        }
    }

    async fn speak(&self, text: &str, voice: Option<&VoiceProfile>) -> Result<(), DebateError> {
        if !self.is_loaded() {
            return Err(DebateError::TtsError("TTS model is still loading".to_string()));
        }

        // One device at a time: a cancelled utterance may still be draining.
        self.wait_idle().await;

        let halt = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = watch::channel(false);
        if let Ok(mut current) = self.current.lock() {
            *current = Some(Playback {
                halt: Arc::clone(&halt),
                done: done_rx,
            });
        }

        let engine = Arc::clone(&self.engine);
        let chunks = split_into_chunks(text, self.chunk_chars);
        let voice_id = voice.map(|v| v.name.clone());
        let flag = Arc::clone(&halt);

        let result = tokio::task::spawn_blocking(move || {
            let played = play_chunks(&engine, &chunks, voice_id.as_deref(), &flag);
            done_tx.send_replace(true);
            played
        })
        .await
        .map_err(|e| DebateError::TtsError(format!("Playback task failed: {}", e)));

        if let Ok(mut current) = self.current.lock()
            && current.as_ref().is_some_and(|p| Arc::ptr_eq(&p.halt, &halt))
        {
            *current = None;
        }

        result?
    }

    fn halt(&self) {
        if let Ok(current) = self.current.lock()
            && let Some(playback) = current.as_ref()
        {
            playback.halt.store(true, Ordering::SeqCst);
        }
    }

    async fn wait_idle(&self) {
        let done = match self.current.lock() {
            Ok(current) => current.as_ref().map(|p| p.done.clone()),
            Err(_) => None,
        };
        if let Some(mut done) = done {
            // A closed channel means the player is gone as well.
            let _ = done.wait_for(|finished| *finished).await;
            debug!("audio device released");
        }
    }
}

/// Synthesize chunk by chunk into one sink so playback starts with the first
/// chunk, then block until the sink drains or `halt` is raised.
fn play_chunks(
    engine: &OnceLock<Mutex<TtsEngine>>,
    chunks: &[String],
    voice_id: Option<&str>,
    halt: &AtomicBool,
) -> Result<(), DebateError> {
    let engine = engine
        .get()
        .ok_or_else(|| DebateError::TtsError("TTS model is not loaded".to_string()))?;

    let (_stream, handle) = OutputStream::try_default()
        .map_err(|e| DebateError::TtsError(format!("No audio output: {}", e)))?;
    let sink = Sink::try_new(&handle).map_err(|e| DebateError::TtsError(format!("Failed to open sink: {}", e)))?;

    for chunk in chunks {
        if halt.load(Ordering::SeqCst) {
            sink.stop();
            return Ok(());
        }

        let mut samples = {
            let mut tts = engine
                .lock()
                .map_err(|_| DebateError::TtsError("TTS engine lock poisoned".to_string()))?;
            tts.synthesize(chunk, voice_id)
                .map_err(|e| DebateError::TtsError(format!("Synthesis failed: {}", e)))?
        };
        // Pause between chunks to prevent cutoff
        samples.extend(std::iter::repeat_n(0.0, CHUNK_GAP_SAMPLES));
        sink.append(SamplesBuffer::new(1, SAMPLE_RATE, samples));
    }

    while !sink.empty() {
        if halt.load(Ordering::SeqCst) {
            debug!("utterance halted");
            sink.stop();
            break;
        }
        std::thread::sleep(PLAYBACK_POLL);
    }

    Ok(())
}

fn kokoro_profiles(ids: Vec<String>) -> Vec<VoiceProfile> {
    let mut profiles: Vec<VoiceProfile> = ids
        .into_iter()
        .map(|id| {
            let tag = kokoro_language_tag(&id);
            VoiceProfile::new(id, tag)
        })
        .collect();
    profiles.sort_by(|a, b| a.name.cmp(&b.name));
    profiles
}
