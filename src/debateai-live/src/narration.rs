//! Narration scheduler: speaks committed turns one after another through the
//! speech engine.
//!
//! At most one run is active. Starting a run stops the previous one first.
//! A run reads the turn list once, at start; turns committed afterwards need
//! a fresh start.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::NarrationConfig;
use crate::participant::Participant;
use crate::speech::{SpeechEngine, utterance_text};
use crate::transcript::SessionView;
use crate::turn_log::Turn;
use crate::voice::VoiceDirectory;

/// Observable narration state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NarrationState {
    pub is_active: bool,
    /// Position in the turn list of the turn being spoken.
    pub current_index: Option<usize>,
}

struct ActiveRun {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct NarrationScheduler {
    engine: Arc<dyn SpeechEngine>,
    directory: VoiceDirectory,
    participants: Arc<[Participant]>,
    transcript: watch::Receiver<SessionView>,
    pause: Duration,
    voice_wait: Duration,
    state: Arc<watch::Sender<NarrationState>>,
    active: Option<ActiveRun>,
}

impl NarrationScheduler {
    pub fn new(
        engine: Arc<dyn SpeechEngine>,
        directory: VoiceDirectory,
        participants: Arc<[Participant]>,
        transcript: watch::Receiver<SessionView>,
        config: &NarrationConfig,
    ) -> Self {
        let (state, _rx) = watch::channel(NarrationState::default());
        Self {
            engine,
            directory,
            participants,
            transcript,
            pause: config.pause(),
            voice_wait: config.voice_wait(),
            state: Arc::new(state),
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.borrow().is_active
    }

    pub fn state(&self) -> NarrationState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<NarrationState> {
        self.state.subscribe()
    }

    /// Narrate committed turns from position `from_index` to the end of the
    /// turn list as it is now. Any running narration is stopped first.
    pub async fn start(&mut self, from_index: usize) {
        self.stop().await;

        let turns: Vec<Turn> = self.transcript.borrow().turns.iter().skip(from_index).cloned().collect();
        if turns.is_empty() {
            debug!(from_index, "nothing to narrate");
            return;
        }

        info!(from_index, turns = turns.len(), "starting narration");
        let cancel = CancellationToken::new();
        self.state.send_replace(NarrationState {
            is_active: true,
            current_index: Some(from_index),
        });

        let run = NarrationRun {
            engine: Arc::clone(&self.engine),
            directory: self.directory.clone(),
            participants: Arc::clone(&self.participants),
            pause: self.pause,
            voice_wait: self.voice_wait,
            state: Arc::clone(&self.state),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(run.play(turns, from_index));
        self.active = Some(ActiveRun { cancel, task });
    }

    /// Stop narration, cutting off the utterance in progress. Returns once
    /// the engine has let go of the audio device.
    pub async fn stop(&mut self) {
        if let Some(run) = self.active.take() {
            run.cancel.cancel();
            self.engine.halt();
            if let Err(e) = run.task.await {
                warn!(error = %e, "narration task failed");
            }
            self.engine.wait_idle().await;
            debug!("narration stopped");
        }
        self.state.send_replace(NarrationState::default());
    }
}

impl Drop for NarrationScheduler {
    fn drop(&mut self) {
        if let Some(run) = self.active.take() {
            run.cancel.cancel();
            self.engine.halt();
        }
    }
}

/// Everything one narration run needs, moved into its task.
struct NarrationRun {
    engine: Arc<dyn SpeechEngine>,
    directory: VoiceDirectory,
    participants: Arc<[Participant]>,
    pause: Duration,
    voice_wait: Duration,
    state: Arc<watch::Sender<NarrationState>>,
    cancel: CancellationToken,
}

impl NarrationRun {
    async fn play(self, turns: Vec<Turn>, from_index: usize) {
        if self.directory.snapshot().is_empty() {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                populated = self.directory.wait_populated(self.voice_wait) => {
                    if !populated {
                        warn!("no voices available; narrating with the engine default");
                    }
                }
            }
        }

        for (offset, turn) in turns.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return;
            }

            let position = from_index + offset;
            self.state.send_replace(NarrationState {
                is_active: true,
                current_index: Some(position),
            });

            let text = utterance_text(turn);
            if text.is_empty() {
                continue;
            }
            let voice = self.directory.resolve(&turn.speaker_name, &self.participants);
            debug!(
                sequence_index = turn.sequence_index,
                speaker = %turn.speaker_name,
                voice = ?voice.as_ref().map(|v| v.name.as_str()),
                "speaking turn"
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.engine.halt();
                    return;
                }
                result = self.engine.speak(&text, voice.as_ref()) => {
                    if let Err(e) = result {
                        warn!(sequence_index = turn.sequence_index, error = %e, "utterance failed; moving on");
                    }
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.pause) => {}
            }
        }

        info!("narration finished");
        self.state.send_replace(NarrationState::default());
    }
}
