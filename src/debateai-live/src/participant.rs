//! Debate participant definitions.
//!
//! Participants are static per-session metadata, fetched once when the
//! session loads.

use serde::{Deserialize, Serialize};

/// Role of a participant in the debate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    /// Frames the debate and delivers the verdict.
    Moderator,
    /// Argues a position.
    #[serde(other)]
    Debater,
}

impl ParticipantRole {
    pub fn display_name(&self) -> &str {
        match self {
            ParticipantRole::Moderator => "MODERATOR",
            ParticipantRole::Debater => "DEBATER",
        }
    }
}

/// A participant in the debate as reported by the debate service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    /// Display name, matched against a turn's speaker name.
    pub name: String,
    pub role: ParticipantRole,
    /// The LLM model identifier (e.g. "google/gemini-2.0-flash-exp:free").
    pub model: String,
    /// Operator-chosen narration voice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl Participant {
    /// Create a new participant with the given name, model, and role.
    pub fn new(name: impl Into<String>, model: impl Into<String>, role: ParticipantRole) -> Self {
        Self {
            name: name.into(),
            role,
            model: model.into(),
            voice_name: None,
            avatar: None,
        }
    }

    /// Set the explicit narration voice.
    pub fn with_voice(mut self, voice_name: impl Into<String>) -> Self {
        self.voice_name = Some(voice_name.into());
        self
    }

    /// Get the full display name with role.
    pub fn display_name_with_role(&self) -> String {
        format!("{} ({})", self.name, self.role.display_name())
    }
}

/// Find the participant a speaker name refers to.
pub fn find_participant<'a>(participants: &'a [Participant], speaker_name: &str) -> Option<&'a Participant> {
    participants.iter().find(|p| p.name == speaker_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_service_participant() {
        let p: Participant =
            serde_json::from_str(r#"{"name":"Ada","role":"debater","model":"m1"}"#).unwrap();
        assert_eq!(p.role, ParticipantRole::Debater);
        assert_eq!(p.voice_name, None);

        let m: Participant = serde_json::from_str(
            r#"{"name":"Moderator","role":"moderator","model":"m2","voice_name":"af_sky"}"#,
        )
        .unwrap();
        assert_eq!(m.role, ParticipantRole::Moderator);
        assert_eq!(m.voice_name.as_deref(), Some("af_sky"));
    }

    #[test]
    fn test_unknown_role_is_debater() {
        let p: Participant =
            serde_json::from_str(r#"{"name":"Eve","role":"judge","model":"m"}"#).unwrap();
        assert_eq!(p.role, ParticipantRole::Debater);
    }

    #[test]
    fn test_find_participant_exact_name() {
        let participants = vec![
            Participant::new("Pro", "m", ParticipantRole::Debater),
            Participant::new("Con", "m", ParticipantRole::Debater),
        ];
        assert_eq!(find_participant(&participants, "Con").unwrap().name, "Con");
        assert!(find_participant(&participants, "con").is_none());
        assert_eq!(participants[0].display_name_with_role(), "Pro (DEBATER)");
    }
}
