//! Best-effort change feed for the dashboard
//!
//! Writes publish a [`ChangeEvent`] on a broadcast channel; the `/events`
//! endpoint relays it as Server-Sent Events. Nobody listening, or a listener
//! falling behind, never affects the write that published.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChangeTable {
    Books,
    Reservations,
    Users,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ChangeEvent {
    pub table: ChangeTable,
    pub action: ChangeAction,
    /// Row id; absent for bulk changes
    pub id: Option<i32>,
    pub at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ChangeNotifier {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, table: ChangeTable, action: ChangeAction, id: Option<i32>) {
        let event = ChangeEvent {
            table,
            action,
            id,
            at: Utc::now(),
        };
        // Err only means there are no subscribers right now
        if self.sender.send(event).is_err() {
            tracing::trace!("No change subscribers for {:?} {:?}", table, action);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}
