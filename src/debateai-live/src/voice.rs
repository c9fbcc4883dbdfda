//! Voice directory and speaker-to-voice resolution.
//!
//! Speech engines may report their voices late (kokoro loads its model in the
//! background), so the directory starts empty, can be refreshed, and notifies
//! subscribers when it first becomes populated.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::VoicesConfig;
use crate::participant::{Participant, ParticipantRole, find_participant};

/// Exact speaker name the service uses for the moderator.
pub const MODERATOR_NAME: &str = "Moderator";
/// Marker the service appends to the moderator's name on the closing verdict
/// turn. The role field is not updated for that turn.
pub const VERDICT_MARKER: &str = "Verdict";

/// A named, language-tagged synthesis voice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct VoiceProfile {
    pub name: String,
    pub language_tag: String,
}

impl VoiceProfile {
    pub fn new(name: impl Into<String>, language_tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language_tag: language_tag.into(),
        }
    }
}

/// An immutable view of the voices known at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceSnapshot {
    voices: Vec<VoiceProfile>,
    standard_voice: Option<String>,
}

impl VoiceSnapshot {
    pub fn new(voices: Vec<VoiceProfile>, standard_voice: Option<String>) -> Self {
        Self { voices, standard_voice }
    }

    pub fn voices(&self) -> &[VoiceProfile] {
        &self.voices
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&VoiceProfile> {
        self.voices.iter().find(|v| v.name == name)
    }

    /// The designated moderator voice, if the engine offers it.
    pub fn standard(&self) -> Option<&VoiceProfile> {
        self.standard_voice.as_deref().and_then(|name| self.get(name))
    }

    /// Pick the voice for a speaker.
    ///
    /// 1. The participant's explicit `voice_name`, if this snapshot has it.
    /// 2. Moderators get the standard voice, else the first voice.
    /// 3. Debaters get a voice picked by the sum of the name's character
    ///    codes, modulo the voices other than the standard one.
    pub fn resolve(&self, speaker_name: &str, participants: &[Participant]) -> Option<VoiceProfile> {
        let participant = find_participant(participants, speaker_name);

        if let Some(voice) = participant
            .and_then(|p| p.voice_name.as_deref())
            .and_then(|name| self.get(name))
        {
            return Some(voice.clone());
        }

        let is_moderator = speaker_name == MODERATOR_NAME
            || speaker_name.contains(VERDICT_MARKER)
            || participant.is_some_and(|p| p.role == ParticipantRole::Moderator);
        if is_moderator {
            return self.standard().or_else(|| self.voices.first()).cloned();
        }

        let standard = self.standard().map(|v| v.name.as_str());
        let mut pool: Vec<&VoiceProfile> = self
            .voices
            .iter()
            .filter(|v| Some(v.name.as_str()) != standard)
            .collect();
        if pool.is_empty() {
            pool = self.voices.iter().collect();
        }
        if pool.is_empty() {
            return None;
        }

        let index = (name_code_sum(speaker_name) % pool.len() as u64) as usize;
        Some(pool[index].clone())
    }
}

fn name_code_sum(name: &str) -> u64 {
    name.chars().map(|c| c as u64).sum()
}

/// Shared, refreshable voice directory. Clones share one underlying list.
#[derive(Debug, Clone)]
pub struct VoiceDirectory {
    tx: Arc<watch::Sender<Arc<VoiceSnapshot>>>,
    standard_voice: Option<String>,
    language: Option<String>,
}

impl VoiceDirectory {
    pub fn new(config: &VoicesConfig) -> Self {
        let standard_voice = Some(config.standard_voice.clone()).filter(|s| !s.is_empty());
        let (tx, _rx) = watch::channel(Arc::new(VoiceSnapshot::new(Vec::new(), standard_voice.clone())));
        Self {
            tx: Arc::new(tx),
            standard_voice,
            language: config.language.clone(),
        }
    }

    /// Current voice list.
    pub fn list(&self) -> Vec<VoiceProfile> {
        self.tx.borrow().voices().to_vec()
    }

    pub fn snapshot(&self) -> Arc<VoiceSnapshot> {
        Arc::clone(&self.tx.borrow())
    }

    pub fn resolve(&self, speaker_name: &str, participants: &[Participant]) -> Option<VoiceProfile> {
        self.tx.borrow().resolve(speaker_name, participants)
    }

    /// Replace the voice list. Subscribers are notified only when the
    /// directory goes from empty to populated; returns whether it did.
    pub fn refresh(&self, voices: Vec<VoiceProfile>) -> bool {
        let voices: Vec<VoiceProfile> = match self.language.as_deref() {
            Some(lang) => voices
                .into_iter()
                .filter(|v| v.language_tag.starts_with(lang))
                .collect(),
            None => voices,
        };
        let next = Arc::new(VoiceSnapshot::new(voices, self.standard_voice.clone()));

        let populated = self.tx.send_if_modified(|current| {
            let was_empty = current.is_empty();
            *current = next;
            was_empty && !current.is_empty()
        });
        if populated {
            info!(count = self.tx.borrow().voices().len(), "voice directory populated");
        } else {
            debug!(count = self.tx.borrow().voices().len(), "voice directory refreshed");
        }
        populated
    }

    /// Receiver that wakes when the directory becomes populated.
    pub fn subscribe(&self) -> watch::Receiver<Arc<VoiceSnapshot>> {
        self.tx.subscribe()
    }

    /// Wait until the directory has at least one voice. Returns `false` on timeout.
    pub async fn wait_populated(&self, timeout: Duration) -> bool {
        let mut rx = self.subscribe();
        let waited = tokio::time::timeout(timeout, rx.wait_for(|snapshot| !snapshot.is_empty())).await;
        matches!(waited, Ok(Ok(_)))
    }
}

/// Language tag for a kokoro voice id such as `af_sky` or `bm_george`.
pub fn kokoro_language_tag(voice_id: &str) -> &'static str {
    match voice_id.chars().next() {
        Some('a') => "en-US",
        Some('b') => "en-GB",
        Some('e') => "es",
        Some('f') => "fr-FR",
        Some('h') => "hi",
        Some('i') => "it",
        Some('j') => "ja",
        Some('p') => "pt-BR",
        Some('z') => "zh-CN",
        _ => "und",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voices(names: &[&str]) -> Vec<VoiceProfile> {
        names
            .iter()
            .map(|n| VoiceProfile::new(*n, kokoro_language_tag(n)))
            .collect()
    }

    fn snapshot() -> VoiceSnapshot {
        VoiceSnapshot::new(
            voices(&["af_sky", "am_adam", "bf_emma", "bm_george"]),
            Some("af_sky".to_string()),
        )
    }

    #[test]
    fn test_explicit_voice_wins_when_available() {
        let participants = vec![Participant::new("Pro", "m", ParticipantRole::Debater).with_voice("bm_george")];
        let voice = snapshot().resolve("Pro", &participants).unwrap();
        assert_eq!(voice.name, "bm_george");
    }

    #[test]
    fn test_missing_explicit_voice_falls_through() {
        let participants = vec![Participant::new("Pro", "m", ParticipantRole::Debater).with_voice("zf_xiaoxiao")];
        let voice = snapshot().resolve("Pro", &participants).unwrap();
        assert_ne!(voice.name, "zf_xiaoxiao");
        assert_ne!(voice.name, "af_sky");
    }

    #[test]
    fn test_moderator_detection_paths() {
        let snap = snapshot();
        let participants = vec![Participant::new("Judge Judy", "m", ParticipantRole::Moderator)];
        assert_eq!(snap.resolve("Moderator", &[]).unwrap().name, "af_sky");
        assert_eq!(snap.resolve("⚖️ Moderator (Verdict)", &[]).unwrap().name, "af_sky");
        assert_eq!(snap.resolve("Judge Judy", &participants).unwrap().name, "af_sky");
    }

    #[test]
    fn test_moderator_without_standard_takes_first() {
        let snap = VoiceSnapshot::new(voices(&["bm_lewis", "am_adam"]), Some("af_sky".to_string()));
        assert_eq!(snap.resolve("Moderator", &[]).unwrap().name, "bm_lewis");
    }

    #[test]
    fn test_debater_voice_from_name_code_sum() {
        let snap = snapshot();
        // Pool excludes the standard voice: [am_adam, bf_emma, bm_george].
        // "Pro" = 80 + 114 + 111 = 305, 305 % 3 = 2.
        assert_eq!(snap.resolve("Pro", &[]).unwrap().name, "bm_george");
        // "Con" = 67 + 111 + 110 = 288, 288 % 3 = 0.
        assert_eq!(snap.resolve("Con", &[]).unwrap().name, "am_adam");
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let snap = snapshot();
        for name in ["Pro", "Con", "Ada Lovelace", "Moderator", ""] {
            assert_eq!(snap.resolve(name, &[]), snap.resolve(name, &[]));
        }
    }

    #[test]
    fn test_empty_directory_resolves_nothing() {
        let snap = VoiceSnapshot::default();
        assert_eq!(snap.resolve("Pro", &[]), None);
        assert_eq!(snap.resolve("Moderator", &[]), None);
    }

    #[test]
    fn test_only_standard_voice_still_serves_debaters() {
        let snap = VoiceSnapshot::new(voices(&["af_sky"]), Some("af_sky".to_string()));
        assert_eq!(snap.resolve("Pro", &[]).unwrap().name, "af_sky");
    }

    #[test]
    fn test_refresh_notifies_on_first_population_only() {
        let directory = VoiceDirectory::new(&VoicesConfig::default());
        let mut rx = directory.subscribe();
        assert!(directory.list().is_empty());

        assert!(!directory.refresh(Vec::new()));
        assert!(!rx.has_changed().unwrap());

        assert!(directory.refresh(voices(&["af_sky", "am_adam"])));
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        assert!(!directory.refresh(voices(&["af_sky", "am_adam", "bf_emma"])));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(directory.list().len(), 3);
    }

    #[test]
    fn test_language_filter_applied_on_refresh() {
        let directory = VoiceDirectory::new(&VoicesConfig {
            standard_voice: "af_sky".to_string(),
            language: Some("en".to_string()),
        });
        directory.refresh(voices(&["af_sky", "jf_alpha", "bm_george", "zf_xiaoxiao"]));
        let names: Vec<String> = directory.list().into_iter().map(|v| v.name).collect();
        assert_eq!(names, vec!["af_sky", "bm_george"]);
    }

    #[tokio::test]
    async fn test_wait_populated_wakes_on_refresh() {
        let directory = VoiceDirectory::new(&VoicesConfig::default());
        let waiter = {
            let directory = directory.clone();
            tokio::spawn(async move { directory.wait_populated(Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;
        directory.refresh(voices(&["am_adam"]));
        assert!(waiter.await.unwrap());

        let empty = VoiceDirectory::new(&VoicesConfig::default());
        assert!(!empty.wait_populated(Duration::from_millis(10)).await);
    }
}
