//! Escrow Node - High-level API for a self-contained escrow deployment
//!
//! Wires an [`EscrowEngine`] to the in-memory custodian, transport and event
//! log, registers the engine's intake hook with the custodian, and exposes
//! queries and a health check over the assembled components.

use crate::{
    config::EscrowNodeConfig,
    custodian::{AssetCustodian, CustodyReceiver, InMemoryCustodian},
    escrow_engine::EscrowEngine,
    event_sink::EventLog,
    models::{AssetId, EscrowRecord, EventRecord, PartyId},
    transport::InMemoryTransport,
    EscrowResult,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Main escrow node that owns all components
pub struct EscrowNode {
    config: EscrowNodeConfig,
    engine: Arc<EscrowEngine>,
    custodian: Arc<InMemoryCustodian>,
    transport: Arc<InMemoryTransport>,
    event_log: Arc<EventLog>,
}

/// Escrow information response
#[derive(Debug, Clone, Serialize)]
pub struct EscrowInfo {
    pub record: EscrowRecord,
    pub events: Vec<EventRecord>,
}

/// Node health status
#[derive(Debug, Clone, Serialize)]
pub struct NodeHealth {
    pub healthy: bool,
    pub escrow_count: usize,
    pub event_count: usize,
    pub issues: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl EscrowNode {
    /// Create a new escrow node with all components initialized
    pub async fn new(config: EscrowNodeConfig) -> EscrowResult<Self> {
        config.validate()?;
        info!("Initializing escrow node");

        let custodian = Arc::new(InMemoryCustodian::new());
        let transport = Arc::new(InMemoryTransport::new());
        let event_log = Arc::new(EventLog::new());

        let engine = Arc::new(EscrowEngine::new(
            config.engine.clone(),
            custodian.clone(),
            transport.clone(),
            event_log.clone(),
        ));

        // Custodian keeps a weak handle so the engine can still be dropped
        let receiver: Arc<dyn CustodyReceiver> = engine.clone();
        custodian
            .register_receiver(config.engine.custody_party.clone(), Arc::downgrade(&receiver))
            .await;

        info!(custody_party = %config.engine.custody_party, "Escrow node initialized");

        Ok(Self {
            config,
            engine,
            custodian,
            transport,
            event_log,
        })
    }

    pub fn config(&self) -> &EscrowNodeConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<EscrowEngine> {
        &self.engine
    }

    pub fn custodian(&self) -> &Arc<InMemoryCustodian> {
        &self.custodian
    }

    pub fn transport(&self) -> &Arc<InMemoryTransport> {
        &self.transport
    }

    pub fn event_log(&self) -> &Arc<EventLog> {
        &self.event_log
    }

    pub fn custody_party(&self) -> &PartyId {
        self.engine.custody_party()
    }

    /// Transfer an asset from its owner into escrow custody
    pub async fn deposit(&self, asset_id: AssetId, owner: &PartyId) -> EscrowResult<EscrowRecord> {
        self.custodian
            .transfer(asset_id, owner, self.custody_party())
            .await?;
        self.engine.get_record(asset_id)
    }

    /// Get an escrow record with its event history
    pub async fn get_escrow_info(&self, asset_id: AssetId) -> EscrowResult<EscrowInfo> {
        let record = self.engine.get_record(asset_id)?;
        let events = self.event_log.events_for(asset_id).await;

        Ok(EscrowInfo { record, events })
    }

    /// Health check: a record must exist for exactly the assets the custody
    /// party holds, and every record must be consistent
    pub async fn health_check(&self) -> EscrowResult<NodeHealth> {
        let mut issues = Vec::new();
        let records = self.engine.records();

        for record in &records {
            if !record.is_consistent() {
                issues.push(format!(
                    "Escrow {} in state {} has inconsistent price or payee",
                    record.asset_id, record.state
                ));
            }

            match self.custodian.owner_of(record.asset_id).await {
                Ok(owner) if &owner == self.custody_party() => {}
                Ok(owner) => issues.push(format!(
                    "Escrow {} exists but asset is held by {}",
                    record.asset_id, owner
                )),
                Err(e) => issues.push(format!("Custodian error for {}: {}", record.asset_id, e)),
            }
        }

        for asset_id in self.custodian.assets_held_by(self.custody_party()).await {
            if !records.iter().any(|record| record.asset_id == asset_id) {
                issues.push(format!("Asset {} is held by the escrow without a record", asset_id));
            }
        }

        if !issues.is_empty() {
            warn!("Escrow node health check found {} issue(s)", issues.len());
        }

        Ok(NodeHealth {
            healthy: issues.is_empty(),
            escrow_count: records.len(),
            event_count: self.event_log.len().await,
            issues,
            timestamp: Utc::now(),
        })
    }
}
