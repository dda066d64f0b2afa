use chrono::{DateTime, Utc};
use foreman_model::ServerEvent;
use std::fmt;
use std::future::Future;
use tokio::sync::broadcast;
use uuid::Uuid;

tokio::task_local! {
    /// Correlation id of the request currently being served. Scoped at the
    /// API edge; everything below (logs, emitted events) reads it lazily.
    static CORRELATION_ID: Uuid;
}

/// Run `fut` with `id` as the ambient correlation id.
pub async fn with_correlation<F>(id: Uuid, fut: F) -> F::Output
where
    F: Future,
{
    CORRELATION_ID.scope(id, fut).await
}

/// Correlation id of the current request, if one is in scope.
pub fn current_correlation_id() -> Option<Uuid> {
    CORRELATION_ID.try_with(|id| *id).ok()
}

/// A published event plus its delivery metadata.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct EventEnvelope {
    pub at: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
    #[serde(flatten)]
    pub event: ServerEvent,
}

/// In-process publish/subscribe channel.
///
/// Fan-out happens over a tokio broadcast channel; subscribers that lag past
/// the buffer miss events rather than block publishers, which matches the
/// at-least-once-to-connected-subscribers contract (no persistence, no
/// replay). Services publish only after the persisting store call returned.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.tx.receiver_count())
            .finish()
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Publish an event, stamping the ambient correlation id when present.
    /// Send errors only mean "no subscribers right now" and are ignored.
    pub fn publish(&self, event: ServerEvent) {
        let envelope = EventEnvelope {
            at: Utc::now(),
            correlation_id: current_correlation_id(),
            event,
        };
        tracing::debug!(event = ?envelope.event, "publishing event");
        let _ = self.tx.send(envelope);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
