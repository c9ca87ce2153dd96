//! Escrow Ledger - Owns the mapping from asset identifier to escrow record
//!
//! The ledger is the only place records are created, replaced or deleted.
//! All operations are synchronous: the lock is `parking_lot`, never held
//! across an `.await`, so a collaborator that calls back into the engine
//! observes the already committed state instead of deadlocking.
//!
//! Operations that must talk to a collaborator after committing take a
//! [`Settlement`] guard. Until the guard is completed the asset is marked as
//! settling, and dropping the guard without completing it puts the previous
//! record back.

use crate::{
    error::EscrowError,
    models::{AssetId, EscrowRecord, PartyId},
    EscrowResult,
};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::warn;

#[derive(Debug, Default)]
struct LedgerInner {
    records: HashMap<AssetId, EscrowRecord>,
    /// Assets with a collaborator call in flight
    settling: HashSet<AssetId>,
}

/// In-memory escrow ledger keyed by asset identifier
#[derive(Debug, Default)]
pub struct EscrowLedger {
    inner: RwLock<LedgerInner>,
}

impl EscrowLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the record for a newly deposited asset
    pub fn open(&self, record: EscrowRecord) -> EscrowResult<()> {
        let mut inner = self.inner.write();
        let asset_id = record.asset_id;

        if inner.records.contains_key(&asset_id) || inner.settling.contains(&asset_id) {
            return Err(EscrowError::AlreadyDeposited { asset_id });
        }

        inner.records.insert(asset_id, record);
        Ok(())
    }

    /// Get a copy of the record for an asset
    pub fn get(&self, asset_id: AssetId) -> Option<EscrowRecord> {
        self.inner.read().records.get(&asset_id).cloned()
    }

    pub fn contains(&self, asset_id: AssetId) -> bool {
        self.inner.read().records.contains_key(&asset_id)
    }

    pub fn is_settling(&self, asset_id: AssetId) -> bool {
        self.inner.read().settling.contains(&asset_id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }

    /// All records, ordered by asset identifier
    pub fn records(&self) -> Vec<EscrowRecord> {
        let mut records: Vec<EscrowRecord> = self.inner.read().records.values().cloned().collect();
        records.sort_by_key(|record| record.asset_id);
        records
    }

    /// Records deposited by a party, ordered by asset identifier
    pub fn records_for_depositor(&self, depositor: &PartyId) -> Vec<EscrowRecord> {
        let mut records: Vec<EscrowRecord> = self
            .inner
            .read()
            .records
            .values()
            .filter(|record| record.is_depositor(depositor))
            .cloned()
            .collect();
        records.sort_by_key(|record| record.asset_id);
        records
    }

    /// Atomically read-validate-update a record.
    ///
    /// The closure runs on a copy under a single write lock; the copy is
    /// written back only if it returns `Ok`. Returns the updated record.
    pub fn update<R>(
        &self,
        asset_id: AssetId,
        f: impl FnOnce(&mut EscrowRecord) -> EscrowResult<R>,
    ) -> EscrowResult<(EscrowRecord, R)> {
        let mut inner = self.inner.write();
        let (updated, result) = Self::stage(&inner, asset_id, f)?;
        inner.records.insert(asset_id, updated.clone());
        Ok((updated, result))
    }

    /// Like [`update`](Self::update), but keeps the previous record in a
    /// [`Settlement`] guard so the change can be undone if the collaborator
    /// call that follows fails.
    pub fn begin_settlement<R>(
        &self,
        asset_id: AssetId,
        f: impl FnOnce(&mut EscrowRecord) -> EscrowResult<R>,
    ) -> EscrowResult<(Settlement<'_>, EscrowRecord, R)> {
        let mut inner = self.inner.write();
        let (updated, result) = Self::stage(&inner, asset_id, f)?;

        let previous = inner.records.insert(asset_id, updated.clone());
        inner.settling.insert(asset_id);

        Ok((Settlement::new(self, asset_id, previous), updated, result))
    }

    /// Validate and delete a record, keeping it in a [`Settlement`] guard so
    /// it can be restored if returning custody fails.
    pub fn begin_removal<R>(
        &self,
        asset_id: AssetId,
        check: impl FnOnce(&EscrowRecord) -> EscrowResult<R>,
    ) -> EscrowResult<(Settlement<'_>, EscrowRecord, R)> {
        let mut inner = self.inner.write();
        let record = inner
            .records
            .get(&asset_id)
            .ok_or(EscrowError::NotFound { asset_id })?;

        let result = check(record)?;
        if inner.settling.contains(&asset_id) {
            return Err(EscrowError::SettlementInProgress { asset_id });
        }

        let removed = inner
            .records
            .remove(&asset_id)
            .ok_or(EscrowError::NotFound { asset_id })?;
        inner.settling.insert(asset_id);

        Ok((Settlement::new(self, asset_id, Some(removed.clone())), removed, result))
    }

    fn stage<R>(
        inner: &LedgerInner,
        asset_id: AssetId,
        f: impl FnOnce(&mut EscrowRecord) -> EscrowResult<R>,
    ) -> EscrowResult<(EscrowRecord, R)> {
        let mut staged = inner
            .records
            .get(&asset_id)
            .cloned()
            .ok_or(EscrowError::NotFound { asset_id })?;

        let result = f(&mut staged)?;

        // Ordinary rejections win; only an otherwise valid operation is
        // turned away while a collaborator call is in flight.
        if inner.settling.contains(&asset_id) {
            return Err(EscrowError::SettlementInProgress { asset_id });
        }

        Ok((staged, result))
    }
}

/// Guard for a committed change awaiting its collaborator call.
///
/// Dropping the guard without calling [`complete`](Settlement::complete)
/// restores the record as it was before the change. This covers both a
/// failed collaborator call and a cancelled future.
#[must_use = "dropping a settlement rolls the change back"]
pub struct Settlement<'a> {
    ledger: &'a EscrowLedger,
    asset_id: AssetId,
    restore: Option<EscrowRecord>,
}

impl<'a> Settlement<'a> {
    fn new(ledger: &'a EscrowLedger, asset_id: AssetId, restore: Option<EscrowRecord>) -> Self {
        Self {
            ledger,
            asset_id,
            restore,
        }
    }

    /// Make the committed change permanent
    pub fn complete(mut self) {
        self.restore = None;
    }
}

impl Drop for Settlement<'_> {
    fn drop(&mut self) {
        let mut inner = self.ledger.inner.write();
        inner.settling.remove(&self.asset_id);

        if let Some(previous) = self.restore.take() {
            warn!(
                asset_id = %self.asset_id,
                state = %previous.state,
                "Rolling back escrow record"
            );
            inner.records.insert(self.asset_id, previous);
        }
    }
}
