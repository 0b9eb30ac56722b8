//! Per-task event-sink context (§4.H Event-context pattern, §9).
//!
//! The reference implementation threads an event sink through a
//! process-level global, which is only correct because it runs one job per
//! worker process. This engine runs a worker pool of concurrent jobs per
//! process, so the sink is bound to the executing task via
//! `tokio::task_local!` rather than a process-wide mutable global.

use std::sync::Arc;

use uuid::Uuid;

use crate::events::{Event, EventBus, EventKind};
use crate::models::LogLevel;

#[derive(Clone)]
struct SinkContext {
    bus: Arc<dyn EventBus>,
    post_id: Uuid,
}

tokio::task_local! {
    static SINK: SinkContext;
}

/// Run `fut` with the event sink bound to `post_id`/`bus` for its duration.
/// The binding is scoped to `fut` and is cleared on every exit path,
/// including panics and early returns, by construction of `task_local!::scope`.
pub async fn with_sink<F, T>(bus: Arc<dyn EventBus>, post_id: Uuid, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    SINK.scope(SinkContext { bus, post_id }, fut).await
}

/// Emit a `log` event on the bus bound to the current task, if any. A safe
/// no-op when called outside a runner-installed scope (e.g. in unit tests
/// that exercise a stage function directly).
pub async fn publish_log(message: impl Into<String>, level: LogLevel) {
    let message = message.into();
    let ctx = SINK.try_with(|ctx| ctx.clone());
    if let Ok(ctx) = ctx {
        let payload = serde_json::json!({ "level": level, "message": message });
        let _ = ctx.bus.publish(Event::new(EventKind::Log, ctx.post_id, payload)).await;
    }
}
