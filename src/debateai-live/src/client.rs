//! Access to the external debate service: the persisted debate record and
//! the live event feed.

use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::{BoxStream, Stream, StreamExt};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::config::ServiceConfig;
use crate::error::DebateError;
use crate::events::RawEvent;
use crate::participant::Participant;
use crate::turn_log::Turn;

/// A debate as persisted by the service (`GET /debates/{id}`).
#[derive(Debug, Clone, Deserialize)]
pub struct DebateRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub turns: Vec<Turn>,
}

/// Named SSE frames of one connection, in arrival order.
pub type EventStream = BoxStream<'static, Result<RawEvent, DebateError>>;

/// The debate service as seen by a live session.
#[async_trait]
pub trait DebateService: Send + Sync {
    /// One-time fetch of the persisted debate state.
    async fn fetch_debate(&self, debate_id: &str) -> Result<DebateRecord, DebateError>;

    /// Open a new connection to the debate's event feed.
    async fn open_stream(&self, debate_id: &str) -> Result<EventStream, DebateError>;
}

/// HTTP implementation against the debate REST API.
#[derive(Debug, Clone)]
pub struct HttpDebateService {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpDebateService {
    pub fn new(config: &ServiceConfig) -> Result<Self, DebateError> {
        // No overall timeout on the client: it would cut long-lived event streams.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| DebateError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    fn debate_url(&self, debate_id: &str) -> String {
        format!("{}/debates/{}", self.base_url, debate_id)
    }
}

#[async_trait]
impl DebateService for HttpDebateService {
    async fn fetch_debate(&self, debate_id: &str) -> Result<DebateRecord, DebateError> {
        let url = self.debate_url(debate_id);
        debug!(%url, "fetching debate");

        let response = self.client.get(&url).timeout(self.request_timeout).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(DebateError::NotFound(debate_id.to_string())),
            status if !status.is_success() => Err(DebateError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            }),
            _ => Ok(response.json::<DebateRecord>().await?),
        }
    }

    async fn open_stream(&self, debate_id: &str) -> Result<EventStream, DebateError> {
        let url = format!("{}/stream", self.debate_url(debate_id));
        debug!(%url, "opening event stream");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DebateError::UnexpectedStatus {
                status: response.status().as_u16(),
                url,
            });
        }

        Ok(sse_events(response.bytes_stream()))
    }
}

/// Parse a byte stream as server-sent events.
pub fn sse_events<S, B, E>(bytes: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    bytes
        .eventsource()
        .map(|item| match item {
            Ok(event) => Ok(RawEvent::new(event.event, event.data)),
            Err(e) => Err(DebateError::StreamError(e.to_string())),
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    #[tokio::test]
    async fn test_sse_events_parses_named_frames() {
        let frames = vec![
            Ok::<_, Infallible>("event: connected\ndata: {\"message\":\"Monitor connected\"}\n\n".to_string()),
            Ok("event: turn_delta\ndata: {\"delta\":\"Hel".to_string()),
            Ok("lo\"}\n\n".to_string()),
            Ok("data: unnamed\n\n".to_string()),
        ];
        let events: Vec<RawEvent> = sse_events(futures::stream::iter(frames))
            .filter_map(|e| async move { e.ok() })
            .collect()
            .await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].name, "connected");
        assert_eq!(events[1], RawEvent::new("turn_delta", r#"{"delta":"Hello"}"#));
        assert_eq!(events[2].data, "unnamed");
    }

    #[test]
    fn test_debate_record_from_service_json() {
        let json = r#"{
            "id": "0b6c",
            "status": "running",
            "title": "Debate: Cats vs dogs...",
            "created_at": "2025-02-01T10:00:00",
            "participants": [{"name": "Moderator", "role": "moderator", "model": "m0"},
                             {"name": "Pro", "role": "debater", "model": "m1"}],
            "turns": [{"seq_index": 1, "speaker_name": "Pro", "text": "b"},
                      {"seq_index": 0, "speaker_name": "Moderator", "text": "a"}]
        }"#;
        let record: DebateRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.participants.len(), 2);
        assert_eq!(record.turns[0].sequence_index, 1);
        assert_eq!(record.created_at.as_deref(), Some("2025-02-01T10:00:00"));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let service = HttpDebateService::new(&ServiceConfig {
            base_url: "http://localhost:8000/".to_string(),
            ..ServiceConfig::default()
        })
        .unwrap();
        assert_eq!(service.debate_url("abc"), "http://localhost:8000/debates/abc");
    }
}
