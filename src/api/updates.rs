// Push-update channel
//
// Mutations publish the key path of the data that went stale
// (`["boards"]`, `["boards", <id>]`, `["users"]`); clients refetch whatever
// they cached under that prefix. An empty key list means "refetch everything".

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::debug;

use super::AppState;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub keys: Vec<String>,
}

#[derive(Clone)]
pub struct UpdateNotifier {
    sender: broadcast::Sender<Update>,
}

impl UpdateNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Announce stale data, returns how many subscribers were notified
    pub fn publish(&self, keys: &[&str]) -> usize {
        let update = Update {
            keys: keys.iter().map(|k| k.to_string()).collect(),
        };
        // no subscribers is not an error
        let notified = self.sender.send(update).unwrap_or(0);
        debug!(?keys, notified, "published update");
        notified
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Update> {
        self.sender.subscribe()
    }
}

impl Default for UpdateNotifier {
    fn default() -> Self {
        Self::new()
    }
}

fn to_event(update: Update) -> Event {
    let data = serde_json::to_string(&update.keys).unwrap_or_else(|_| "[]".to_string());
    Event::default().event("update").data(data)
}

/// GET /api/updates - Server-Sent Events stream of `update` events
pub async fn stream_updates(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // lagging subscribers skip what they missed
    let stream = BroadcastStream::new(state.updates.subscribe())
        .filter_map(|message| message.ok())
        .map(|update| Ok(to_event(update)));

    Sse::new(stream).keep_alive(KeepAlive::default())
}
