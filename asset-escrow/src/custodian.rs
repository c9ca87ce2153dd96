//! Asset Custodian - Registry of asset ownership
//!
//! The custodian tracks which party owns each asset and performs custody
//! transfers. When an asset moves to a party that registered a
//! [`CustodyReceiver`], the receiver is notified synchronously as part of the
//! transfer, and a rejected notification reverts the transfer.

use crate::{
    error::EscrowError,
    models::{AssetId, PartyId},
    EscrowResult,
};
use async_trait::async_trait;
use std::{collections::HashMap, sync::Weak};
use parking_lot::RwLock;
use tracing::{debug, warn};

/// Ownership registry consumed by the escrow engine
#[async_trait]
pub trait AssetCustodian: Send + Sync {
    /// Current owner of an asset
    async fn owner_of(&self, asset_id: AssetId) -> EscrowResult<PartyId>;

    /// Move custody of an asset from `from` to `to`.
    ///
    /// Fails without effect if `from` is not the owner or `to` cannot
    /// receive the asset.
    async fn transfer(&self, asset_id: AssetId, from: &PartyId, to: &PartyId) -> EscrowResult<()>;
}

/// Arrival notification invoked by the custodian after an asset moves to
/// the receiving party. Returning an error rejects the asset.
#[async_trait]
pub trait CustodyReceiver: Send + Sync {
    async fn on_asset_received(&self, asset_id: AssetId, from: &PartyId) -> EscrowResult<()>;
}

/// In-memory asset registry implementing [`AssetCustodian`]
pub struct InMemoryCustodian {
    owners: RwLock<HashMap<AssetId, PartyId>>,
    /// Parties that want arrival notifications
    receivers: RwLock<HashMap<PartyId, Weak<dyn CustodyReceiver>>>,
}

impl InMemoryCustodian {
    pub fn new() -> Self {
        Self {
            owners: RwLock::new(HashMap::new()),
            receivers: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new asset owned by `owner`
    pub async fn mint(&self, asset_id: AssetId, owner: &PartyId) -> EscrowResult<()> {
        let mut owners = self.owners.write();
        if owners.contains_key(&asset_id) {
            return Err(EscrowError::custody(format!("Asset {} already exists", asset_id)));
        }
        owners.insert(asset_id, owner.clone());
        debug!(%asset_id, %owner, "Minted asset");
        Ok(())
    }

    /// Register the arrival hook for a party
    pub async fn register_receiver(&self, party: PartyId, receiver: Weak<dyn CustodyReceiver>) {
        self.receivers.write().insert(party, receiver);
    }

    /// Assets currently owned by `party`, ordered by identifier
    pub async fn assets_held_by(&self, party: &PartyId) -> Vec<AssetId> {
        let mut assets: Vec<AssetId> = self
            .owners
            .read()
            .iter()
            .filter(|(_, owner)| *owner == party)
            .map(|(asset_id, _)| *asset_id)
            .collect();
        assets.sort();
        assets
    }
}

impl Default for InMemoryCustodian {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetCustodian for InMemoryCustodian {
    async fn owner_of(&self, asset_id: AssetId) -> EscrowResult<PartyId> {
        self.owners
            .read()
            .get(&asset_id)
            .cloned()
            .ok_or_else(|| EscrowError::custody(format!("Unknown asset {}", asset_id)))
    }

    async fn transfer(&self, asset_id: AssetId, from: &PartyId, to: &PartyId) -> EscrowResult<()> {
        let registered = self.receivers.read().get(to).cloned();
        let receiver = match registered {
            Some(weak) => Some(weak.upgrade().ok_or_else(|| {
                EscrowError::custody(format!("Receiver {} is no longer available", to))
            })?),
            None => None,
        };

        {
            let mut owners = self.owners.write();
            let owner = owners
                .get(&asset_id)
                .ok_or_else(|| EscrowError::custody(format!("Unknown asset {}", asset_id)))?;

            if owner != from {
                return Err(EscrowError::custody(format!(
                    "{} is not the owner of asset {}",
                    from, asset_id
                )));
            }

            owners.insert(asset_id, to.clone());
        }

        // Owner lock released: the receiver may query the registry.
        // Until the hook accepts, dropping the guard hands the asset back.
        if let Some(receiver) = receiver {
            let pending = PendingTransfer {
                owners: &self.owners,
                asset_id,
                from,
                to,
                accepted: false,
            };

            if let Err(err) = receiver.on_asset_received(asset_id, from).await {
                warn!("Receiver {} rejected asset {}: {}", to, asset_id, err);
                return Err(err);
            }
            pending.accept();
        }

        debug!(%asset_id, %from, %to, "Transferred custody");
        Ok(())
    }
}

/// Ownership change awaiting the receiver's acceptance
struct PendingTransfer<'a> {
    owners: &'a RwLock<HashMap<AssetId, PartyId>>,
    asset_id: AssetId,
    from: &'a PartyId,
    to: &'a PartyId,
    accepted: bool,
}

impl PendingTransfer<'_> {
    fn accept(mut self) {
        self.accepted = true;
    }
}

impl Drop for PendingTransfer<'_> {
    fn drop(&mut self) {
        if self.accepted {
            return;
        }

        let mut owners = self.owners.write();
        if owners.get(&self.asset_id) == Some(self.to) {
            warn!(
                asset_id = %self.asset_id,
                from = %self.from,
                to = %self.to,
                "Reverting unaccepted custody transfer"
            );
            owners.insert(self.asset_id, self.from.clone());
        }
    }
}
