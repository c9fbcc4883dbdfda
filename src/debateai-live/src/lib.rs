//! DebateAI Live Library
//!
//! Follows a debate while it is being generated: consumes the service's event
//! stream, rebuilds an ordered transcript from partial fragments, and narrates
//! committed turns with per-speaker voices.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod narration;
pub mod participant;
pub mod session;
pub mod speech;
pub mod stream;
pub mod transcript;
pub mod turn_log;
pub mod voice;

pub use client::{DebateRecord, DebateService, EventStream, HttpDebateService};
pub use config::{Config, default_config};
pub use error::DebateError;
pub use events::{RawEvent, StreamEvent};
pub use narration::{NarrationScheduler, NarrationState};
pub use participant::{Participant, ParticipantRole};
pub use session::DebateSession;
pub use speech::{KokoroSpeech, SpeechEngine};
pub use stream::{StreamConsumer, StreamHandle};
pub use transcript::{InProgressTurn, SessionStatus, SessionView, TranscriptEntry};
pub use turn_log::{Turn, TurnLog};
pub use voice::{VoiceDirectory, VoiceProfile};
