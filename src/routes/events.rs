/// Account sync status and live event stream
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::services::sync_service::{AccountStatus, SyncManager};

/// GET /api/accounts/status
pub async fn account_status(State(sync): State<Arc<SyncManager>>) -> Json<Vec<AccountStatus>> {
    Json(sync.statuses().await)
}

/// GET /api/events - SSE stream of sync events
pub async fn sync_events_stream(
    State(sync): State<Arc<SyncManager>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = sync.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let json = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().event("sync").data(json));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
