use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use usher_provider::AuthEvent;

use crate::context::StepStore;
use crate::step::InitialStep;

/// Listener for provider-side auth events. Holds only the step store, not
/// the whole flow context, so dropping the flow tears everything down.
/// Dropping the subscription aborts the task.
pub(crate) struct EventSubscription {
    task: JoinHandle<()>,
}

impl EventSubscription {
    pub(crate) fn spawn(
        mut receiver: broadcast::Receiver<AuthEvent>,
        store: Arc<StepStore>,
        initial: InitialStep,
    ) -> Self {
        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        tracing::info!(event = ?event, "provider event, returning to initial step");
                        store.force(initial.as_step());
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "auth event subscriber lagged, some events were dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Self { task }
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
