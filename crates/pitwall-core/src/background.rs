//! Background refresh of every resource, reporting progress over a channel.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::error;

use crate::api::DataSource;
use crate::service::F1Service;

const CHANNEL_BUFFER_SIZE: usize = 32;

/// Progress messages from a background refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshEvent {
    Started { total: usize },
    Updated { key: String },
    Failed { key: String, reason: String },
    Completed { succeeded: usize, failed: usize },
}

/// Helper to send refresh events, logging any channel errors
pub(crate) async fn send_event(tx: &mpsc::Sender<RefreshEvent>, event: RefreshEvent) {
    if let Err(e) = tx.send(event).await {
        error!(error = %e, "Failed to send refresh event - channel closed");
    }
}

/// Force-refresh every resource on a spawned task.
///
/// Resources are refreshed one after another. A failure is reported and the
/// next resource still runs. The last event is always `Completed`, after
/// which the channel closes.
pub fn spawn_refresh_all<S>(service: Arc<F1Service<S>>) -> mpsc::Receiver<RefreshEvent>
where
    S: DataSource + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);

    tokio::spawn(async move {
        service.refresh_all_with_progress(Some(&tx)).await;
    });

    rx
}
