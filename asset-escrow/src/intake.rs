//! Intake hook - opens an escrow record when an asset arrives
//!
//! The custodian calls [`CustodyReceiver::on_asset_received`] synchronously
//! while transferring an asset to the engine's custody party. Rejecting the
//! arrival makes the custodian revert the transfer, so an asset is never held
//! without a record.

use crate::{
    custodian::CustodyReceiver,
    error::EscrowError,
    escrow_engine::EscrowEngine,
    models::{AssetId, EscrowRecord, PartyId},
    EscrowResult,
};
use async_trait::async_trait;
use tracing::{debug, info};

impl EscrowEngine {
    /// Open an escrow record for an asset that just moved into custody.
    ///
    /// The bound custodian must already report the engine as owner.
    pub async fn receive_asset(&self, asset_id: AssetId, from: &PartyId) -> EscrowResult<EscrowRecord> {
        if from == &self.config.custody_party {
            return Err(EscrowError::custody(format!(
                "Asset {} cannot be deposited by the escrow itself",
                asset_id
            )));
        }

        let owner = self.custodian.owner_of(asset_id).await?;
        if owner != self.config.custody_party {
            debug!(%asset_id, %owner, "Arrival without custody rejected");
            return Err(EscrowError::custody(format!(
                "Asset {} is held by {}, not by the escrow",
                asset_id, owner
            )));
        }

        let record = EscrowRecord::new(asset_id, from.clone());
        self.ledger.open(record.clone())?;

        info!(%asset_id, depositor = %from, "Asset deposited into escrow");
        Ok(record)
    }
}

#[async_trait]
impl CustodyReceiver for EscrowEngine {
    async fn on_asset_received(&self, asset_id: AssetId, from: &PartyId) -> EscrowResult<()> {
        self.receive_asset(asset_id, from).await.map(|_| ())
    }
}
