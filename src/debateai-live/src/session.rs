//! Session controller: loads a debate, keeps it live, and relays narration
//! requests.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::client::DebateService;
use crate::config::Config;
use crate::error::DebateError;
use crate::narration::{NarrationScheduler, NarrationState};
use crate::participant::Participant;
use crate::speech::SpeechEngine;
use crate::stream::{StreamConsumer, StreamHandle};
use crate::transcript::{SessionStatus, SessionView, Transcript};
use crate::voice::{VoiceDirectory, VoiceProfile};

/// One viewed debate.
pub struct DebateSession {
    debate_id: String,
    title: String,
    created_at: Option<String>,
    participants: Arc<[Participant]>,
    directory: VoiceDirectory,
    view: watch::Receiver<SessionView>,
    stream: Option<StreamHandle>,
    narration: NarrationScheduler,
}

impl DebateSession {
    /// Fetch the persisted debate and, unless it is already over, connect to
    /// its live event feed.
    pub async fn open(
        debate_id: &str,
        service: Arc<dyn DebateService>,
        engine: Arc<dyn SpeechEngine>,
        directory: VoiceDirectory,
        config: &Config,
    ) -> Result<Self, DebateError> {
        info!(%debate_id, "loading debate");
        let record = service.fetch_debate(debate_id).await?;
        let status = SessionStatus::from_service(&record.status);
        info!(
            %debate_id,
            status = status.as_str(),
            turns = record.turns.len(),
            participants = record.participants.len(),
            "debate loaded"
        );

        match engine.voices().await {
            Ok(voices) if !voices.is_empty() => {
                directory.refresh(voices);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "could not list voices"),
        }

        let participants: Arc<[Participant]> = Arc::from(record.participants);
        let transcript = Transcript::seeded(status, record.turns);

        let (stream, view) = if status.is_terminal() {
            // No live feed: the seeded view is final.
            let (tx, rx) = watch::channel(transcript.view());
            drop(tx);
            (None, rx)
        } else {
            let consumer = StreamConsumer::new(service, config.stream.clone());
            let handle = consumer.open(debate_id, transcript);
            let rx = handle.subscribe();
            (Some(handle), rx)
        };

        let narration = NarrationScheduler::new(
            engine,
            directory.clone(),
            Arc::clone(&participants),
            view.clone(),
            &config.narration,
        );

        Ok(Self {
            debate_id: debate_id.to_string(),
            title: record.title,
            created_at: record.created_at,
            participants,
            directory,
            view,
            stream,
            narration,
        })
    }

    pub fn debate_id(&self) -> &str {
        &self.debate_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn created_at(&self) -> Option<&str> {
        self.created_at.as_deref()
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Latest merged read model.
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.view.borrow().status
    }

    /// Receiver notified on every transcript change. Its sender is gone once
    /// the session stops receiving updates.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    pub fn voices(&self) -> &VoiceDirectory {
        &self.directory
    }

    /// Voice a speaker would be narrated with right now.
    pub fn voice_for(&self, speaker_name: &str) -> Option<VoiceProfile> {
        self.directory.resolve(speaker_name, &self.participants)
    }

    pub async fn start_narration(&mut self, from_index: usize) {
        self.narration.start(from_index).await;
    }

    pub async fn stop_narration(&mut self) {
        self.narration.stop().await;
    }

    pub fn is_narrating(&self) -> bool {
        self.narration.is_active()
    }

    pub fn narration(&self) -> watch::Receiver<NarrationState> {
        self.narration.subscribe()
    }

    /// Close the live connection and stop narration.
    pub async fn close(mut self) {
        if let Some(stream) = self.stream.as_mut() {
            stream.close().await;
        }
        self.narration.stop().await;
        info!(debate_id = %self.debate_id, "session closed");
    }
}
