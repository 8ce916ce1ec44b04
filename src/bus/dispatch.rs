//! Handler dispatch utilities.
//!
//! Provides the two dispatch patterns used by the bus implementations:
//! inline sequential dispatch and detached concurrent dispatch.

use std::sync::Arc;

use tracing::error;

use super::EventHandler;
use crate::events::EventEnvelope;

/// Dispatch an envelope to all given handlers, one after another.
///
/// Logs errors but continues to subsequent handlers. Returns `true` if all
/// handlers succeeded, `false` if any failed.
pub async fn dispatch_to_handlers(
    handlers: &[Arc<dyn EventHandler>],
    envelope: &Arc<EventEnvelope>,
) -> bool {
    let mut all_succeeded = true;

    for handler in handlers {
        if let Err(e) = handler.handle(Arc::clone(envelope)).await {
            error!(
                event = envelope.name(),
                event_id = %envelope.event_id,
                error = %e,
                "Handler failed"
            );
            all_succeeded = false;
        }
    }

    all_succeeded
}

/// Run a handler on its own task without waiting for it.
///
/// Failures are logged; there is no retry and no dead-letter queue.
pub fn spawn_dispatch(handler: &dyn EventHandler, envelope: Arc<EventEnvelope>) {
    let name = envelope.name();
    let event_id = envelope.event_id;
    let fut = handler.handle(envelope);

    tokio::spawn(async move {
        if let Err(e) = fut.await {
            error!(event = name, event_id = %event_id, error = %e, "Handler failed");
        }
    });
}
