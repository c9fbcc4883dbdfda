//! Live transcript state: the committed turn log plus the provisional turn
//! currently being streamed, and the merged view handed to readers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::events::StreamEvent;
use crate::turn_log::{Turn, TurnLog};

/// Lifecycle of a viewed session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Loading,
    Active,
    Completed,
    Error,
}

impl SessionStatus {
    /// Map a status string reported by the debate service.
    pub fn from_service(status: &str) -> Self {
        match status {
            "completed" => SessionStatus::Completed,
            "error" | "failed" => SessionStatus::Error,
            _ => SessionStatus::Active,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Loading => "loading",
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
        }
    }
}

/// The single uncommitted turn being streamed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InProgressTurn {
    pub speaker: Option<String>,
    pub sequence_index: Option<u64>,
    pub text: String,
}

impl InProgressTurn {
    pub fn is_empty(&self) -> bool {
        self.speaker.is_none() && self.text.is_empty()
    }

    /// Adopt a speaker only if none is known yet.
    fn adopt_speaker(&mut self, speaker: Option<&str>) {
        if self.speaker.is_none()
            && let Some(name) = speaker
        {
            self.speaker = Some(name.to_string());
        }
    }

    fn adopt_index(&mut self, sequence_index: Option<u64>) {
        if self.sequence_index.is_none() {
            self.sequence_index = sequence_index;
        }
    }
}

/// One row of the merged read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub sequence_index: Option<u64>,
    pub speaker: Option<String>,
    pub text: String,
    /// `false` for the provisional in-progress entry.
    pub is_final: bool,
}

/// Read-only snapshot published to the presentation layer.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub status: SessionStatus,
    pub turns: Arc<Vec<Turn>>,
    pub in_progress: Option<InProgressTurn>,
}

impl Default for SessionView {
    fn default() -> Self {
        Self {
            status: SessionStatus::Loading,
            turns: Arc::new(Vec::new()),
            in_progress: None,
        }
    }
}

impl SessionView {
    /// Committed turns in order, followed by the provisional turn if any.
    pub fn entries(&self) -> Vec<TranscriptEntry> {
        let mut entries: Vec<TranscriptEntry> = self
            .turns
            .iter()
            .map(|t| TranscriptEntry {
                sequence_index: Some(t.sequence_index),
                speaker: Some(t.speaker_name.clone()),
                text: t.text.clone(),
                is_final: true,
            })
            .collect();

        if let Some(live) = &self.in_progress {
            entries.push(TranscriptEntry {
                sequence_index: live.sequence_index,
                speaker: live.speaker.clone(),
                text: live.text.clone(),
                is_final: false,
            });
        }
        entries
    }
}

/// What applying one event changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The in-progress buffer changed.
    Buffer,
    /// A turn completed. `committed` is false for a duplicate delivery.
    Turn { committed: bool },
    /// The session status changed.
    Status,
    /// The event had no effect (e.g. arrived after completion).
    Nothing,
}

impl Applied {
    /// Whether the transcript moved forward. Redelivered turns do not count.
    pub fn is_progress(self) -> bool {
        matches!(self, Applied::Buffer | Applied::Status | Applied::Turn { committed: true })
    }
}

/// Mutable session state. Owned by exactly one writer, the stream consumer.
#[derive(Debug, Clone)]
pub struct Transcript {
    status: SessionStatus,
    log: TurnLog,
    buffer: InProgressTurn,
    turns: Arc<Vec<Turn>>,
}

impl Transcript {
    /// Seed from persisted state.
    pub fn seeded(status: SessionStatus, turns: impl IntoIterator<Item = Turn>) -> Self {
        let log: TurnLog = turns.into_iter().collect();
        let turns = Arc::new(log.snapshot());
        Self {
            status,
            log,
            buffer: InProgressTurn::default(),
            turns,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn log(&self) -> &TurnLog {
        &self.log
    }

    pub fn in_progress(&self) -> &InProgressTurn {
        &self.buffer
    }

    pub fn apply(&mut self, event: StreamEvent) -> Applied {
        if self.status.is_terminal() {
            debug!(?event, "ignoring event after terminal status");
            return Applied::Nothing;
        }

        match event {
            StreamEvent::DebateStarted => self.set_status(SessionStatus::Active),
            StreamEvent::TurnStarted(started) => {
                self.buffer = InProgressTurn::default();
                self.buffer.adopt_speaker(started.speaker_name.as_deref());
                self.buffer.adopt_index(started.sequence_index);
                Applied::Buffer
            }
            StreamEvent::TurnDelta(delta) => {
                self.buffer.adopt_speaker(delta.speaker_name.as_deref());
                self.buffer.adopt_index(delta.sequence_index);
                self.buffer.text.push_str(&delta.delta);
                Applied::Buffer
            }
            StreamEvent::TurnCompleted(done) => {
                if self.buffer.speaker.as_deref().is_some_and(|s| s != done.speaker_name) {
                    warn!(
                        buffered = ?self.buffer.speaker,
                        completed = %done.speaker_name,
                        "completed turn speaker differs from streamed speaker"
                    );
                }
                self.buffer = InProgressTurn::default();

                let committed = self.log.commit(Turn::new(done.sequence_index, done.speaker_name, done.text));
                if committed {
                    self.turns = Arc::new(self.log.snapshot());
                } else {
                    debug!(sequence_index = done.sequence_index, "duplicate turn_completed absorbed");
                }
                Applied::Turn { committed }
            }
            StreamEvent::DebateCompleted => {
                self.buffer = InProgressTurn::default();
                self.set_status(SessionStatus::Completed)
            }
        }
    }

    /// Drop the provisional turn without committing it.
    pub fn discard_in_progress(&mut self) {
        self.buffer = InProgressTurn::default();
    }

    pub fn set_status(&mut self, status: SessionStatus) -> Applied {
        if self.status == status {
            return Applied::Nothing;
        }
        self.status = status;
        Applied::Status
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            status: self.status,
            turns: Arc::clone(&self.turns),
            in_progress: (!self.buffer.is_empty()).then(|| self.buffer.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{TurnCompleted, TurnDelta, TurnStarted};

    fn delta(speaker: Option<&str>, text: &str) -> StreamEvent {
        StreamEvent::TurnDelta(TurnDelta {
            sequence_index: None,
            speaker_name: speaker.map(str::to_string),
            delta: text.to_string(),
        })
    }

    fn completed(index: u64, speaker: &str, text: &str) -> StreamEvent {
        StreamEvent::TurnCompleted(TurnCompleted {
            sequence_index: index,
            speaker_name: speaker.to_string(),
            text: text.to_string(),
        })
    }

    #[test]
    fn test_speaker_adopted_from_first_delta_carrying_one() {
        let mut t = Transcript::seeded(SessionStatus::Active, []);
        t.apply(delta(None, "Hel"));
        assert_eq!(t.in_progress().speaker, None);
        t.apply(delta(Some("Pro"), "lo"));
        t.apply(delta(Some("Con"), "!"));
        assert_eq!(t.in_progress().speaker.as_deref(), Some("Pro"));
        assert_eq!(t.in_progress().text, "Hello!");
    }

    #[test]
    fn test_completion_clears_buffer_even_for_other_speaker() {
        let mut t = Transcript::seeded(SessionStatus::Active, []);
        t.apply(delta(Some("Pro"), "partial"));
        let applied = t.apply(completed(0, "Con", "Something else"));
        assert_eq!(applied, Applied::Turn { committed: true });
        assert!(t.in_progress().is_empty());
        assert!(t.view().in_progress.is_none());
        assert_eq!(t.log().snapshot()[0].speaker_name, "Con");
    }

    #[test]
    fn test_duplicate_completion_still_clears_buffer() {
        let mut t = Transcript::seeded(SessionStatus::Active, [Turn::new(0, "Pro", "original")]);
        t.apply(delta(Some("Pro"), "replay"));
        assert_eq!(t.apply(completed(0, "Pro", "changed")), Applied::Turn { committed: false });
        assert!(t.in_progress().is_empty());
        assert_eq!(t.view().turns[0].text, "original");
    }

    #[test]
    fn test_turn_started_resets_stale_buffer() {
        let mut t = Transcript::seeded(SessionStatus::Active, []);
        t.apply(delta(Some("Pro"), "never finished"));
        t.apply(StreamEvent::TurnStarted(TurnStarted {
            sequence_index: Some(4),
            speaker_name: Some("Con".to_string()),
        }));
        assert_eq!(t.in_progress().speaker.as_deref(), Some("Con"));
        assert_eq!(t.in_progress().sequence_index, Some(4));
        assert_eq!(t.in_progress().text, "");
        assert!(t.view().in_progress.is_some());
    }

    #[test]
    fn test_nothing_applies_after_completion() {
        let mut t = Transcript::seeded(SessionStatus::Active, []);
        assert_eq!(t.apply(StreamEvent::DebateCompleted), Applied::Status);
        assert_eq!(t.apply(completed(0, "Pro", "late")), Applied::Nothing);
        assert_eq!(t.apply(delta(Some("Pro"), "late")), Applied::Nothing);
        assert!(t.log().is_empty());
        assert_eq!(t.status(), SessionStatus::Completed);
    }

    #[test]
    fn test_entries_mark_provisional_turn() {
        let mut t = Transcript::seeded(SessionStatus::Active, [Turn::new(1, "Con", "b"), Turn::new(0, "Pro", "a")]);
        t.apply(delta(Some("Moderator"), "thinking"));
        let entries = t.view().entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].text, "a");
        assert_eq!(entries[1].text, "b");
        assert!(entries[0].is_final && entries[1].is_final);
        assert!(!entries[2].is_final);
        assert_eq!(entries[2].speaker.as_deref(), Some("Moderator"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(SessionStatus::from_service("queued"), SessionStatus::Active);
        assert_eq!(SessionStatus::from_service("running"), SessionStatus::Active);
        assert_eq!(SessionStatus::from_service("completed"), SessionStatus::Completed);
        assert_eq!(SessionStatus::from_service("failed"), SessionStatus::Error);
        assert!(SessionStatus::Error.is_terminal());
        assert!(!SessionStatus::Loading.is_terminal());
    }
}
