//! Stream consumer: keeps a debate's event feed connected and folds its
//! events into the session transcript.
//!
//! The consumer task is the only writer of the transcript. Every change is
//! published as a fresh [`SessionView`] on a watch channel.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::{DebateService, EventStream};
use crate::config::StreamConfig;
use crate::events::StreamEvent;
use crate::transcript::{Applied, SessionStatus, SessionView, Transcript};

/// How one connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PumpOutcome {
    /// `debate_completed` was received.
    Finished,
    /// The handle was closed.
    Cancelled,
    /// The connection failed or ended early.
    Lost(String),
}

pub struct StreamConsumer {
    service: Arc<dyn DebateService>,
    config: StreamConfig,
}

impl StreamConsumer {
    pub fn new(service: Arc<dyn DebateService>, config: StreamConfig) -> Self {
        Self { service, config }
    }

    /// Connect to the debate's feed and start applying events to `seed`.
    pub fn open(&self, debate_id: &str, seed: Transcript) -> StreamHandle {
        let (tx, rx) = watch::channel(seed.view());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_consumer(
            Arc::clone(&self.service),
            self.config.clone(),
            debate_id.to_string(),
            seed,
            tx,
            cancel.clone(),
        ));

        StreamHandle {
            debate_id: debate_id.to_string(),
            cancel,
            task: Some(task),
            view: rx,
        }
    }
}

/// Owner of one live connection. Dropping the handle closes the connection.
pub struct StreamHandle {
    debate_id: String,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    view: watch::Receiver<SessionView>,
}

impl StreamHandle {
    pub fn debate_id(&self) -> &str {
        &self.debate_id
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// Whether the consumer has stopped delivering updates.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Close the connection and wait for the consumer to wind down.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(debate_id = %self.debate_id, error = %e, "stream consumer task failed");
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_consumer(
    service: Arc<dyn DebateService>,
    config: StreamConfig,
    debate_id: String,
    mut transcript: Transcript,
    tx: watch::Sender<SessionView>,
    cancel: CancellationToken,
) {
    let mut attempt = 0u32;

    loop {
        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            opened = service.open_stream(&debate_id) => opened,
        };

        let outcome = match opened {
            Ok(events) => {
                info!(%debate_id, "event stream connected");
                pump(events, &mut transcript, &tx, &cancel, config.idle_timeout(), &mut attempt).await
            }
            Err(e) => PumpOutcome::Lost(e.to_string()),
        };

        match outcome {
            PumpOutcome::Finished => {
                info!(%debate_id, turns = transcript.log().len(), "debate completed; closing stream");
                return;
            }
            PumpOutcome::Cancelled => {
                debug!(%debate_id, "event stream closed");
                return;
            }
            PumpOutcome::Lost(reason) if attempt < config.max_reconnects => {
                let delay = config.reconnect_delay(attempt);
                attempt += 1;
                warn!(
                    %debate_id,
                    %reason,
                    attempt,
                    max = config.max_reconnects,
                    delay_ms = delay.as_millis() as u64,
                    last_index = ?transcript.log().last_index(),
                    "event stream lost; reconnecting"
                );
                // Deltas already received cannot be matched to the resumed feed.
                transcript.discard_in_progress();
                tx.send_replace(transcript.view());

                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            PumpOutcome::Lost(reason) => {
                error!(%debate_id, %reason, "event stream lost");
                transcript.discard_in_progress();
                transcript.set_status(SessionStatus::Error);
                tx.send_replace(transcript.view());
                return;
            }
        }
    }
}

async fn pump(
    mut events: EventStream,
    transcript: &mut Transcript,
    tx: &watch::Sender<SessionView>,
    cancel: &CancellationToken,
    idle_timeout: Duration,
    attempt: &mut u32,
) -> PumpOutcome {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return PumpOutcome::Cancelled,
            next = tokio::time::timeout(idle_timeout, events.next()) => next,
        };

        let raw = match next {
            Ok(Some(Ok(raw))) => raw,
            Ok(Some(Err(e))) => return PumpOutcome::Lost(e.to_string()),
            Ok(None) => return PumpOutcome::Lost("stream closed before debate completed".to_string()),
            Err(_) => return PumpOutcome::Lost(format!("no event for {}s", idle_timeout.as_secs())),
        };

        let Some(event) = StreamEvent::decode(&raw) else {
            continue;
        };

        let applied = transcript.apply(event);
        if applied.is_progress() {
            // Only a connection that delivers something new earns a fresh budget.
            *attempt = 0;
        }
        if applied != Applied::Nothing {
            tx.send_replace(transcript.view());
        }

        if transcript.status() == SessionStatus::Completed {
            return PumpOutcome::Finished;
        }
    }
}
