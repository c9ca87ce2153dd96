//! Event Sink - Append-only audit trail of committed escrow transitions
//!
//! Events are observability only: no escrow state is derived from them, and
//! a sink failure never undoes a committed transition.

use crate::{
    models::{AssetId, EscrowEvent, EventRecord},
    EscrowResult,
};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// Receiver of escrow events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: EscrowEvent) -> EscrowResult<()>;
}

/// In-memory append-only event log
#[derive(Debug, Default)]
pub struct EventLog {
    records: RwLock<Vec<EventRecord>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event, returning the stored record
    pub async fn append(&self, event: EscrowEvent) -> EventRecord {
        let mut records = self.records.write().await;
        let record = EventRecord {
            id: Uuid::new_v4(),
            sequence: records.len() as u64 + 1,
            event,
            emitted_at: Utc::now(),
        };
        records.push(record.clone());
        record
    }

    /// All events in emission order
    pub async fn events(&self) -> Vec<EventRecord> {
        self.records.read().await.clone()
    }

    /// Events for one asset in emission order
    pub async fn events_for(&self, asset_id: AssetId) -> Vec<EventRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|record| record.event.asset_id() == asset_id)
            .cloned()
            .collect()
    }

    pub async fn last(&self) -> Option<EventRecord> {
        self.records.read().await.last().cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Serialize the whole trail as a JSON array
    pub async fn export_json(&self) -> EscrowResult<String> {
        let records = self.records.read().await;
        Ok(serde_json::to_string(&*records)?)
    }
}

#[async_trait]
impl EventSink for EventLog {
    async fn publish(&self, event: EscrowEvent) -> EscrowResult<()> {
        let payload = serde_json::to_string(&event)?;
        let record = self.append(event).await;

        info!(
            sequence = record.sequence,
            kind = record.event.kind(),
            asset_id = %record.event.asset_id(),
            %payload,
            "Published escrow event"
        );

        Ok(())
    }
}
