//! Value Transport - Moves payment amounts between parties
//!
//! The escrow engine never holds funds itself: `fund` pays the depositor
//! directly and `refund` pays the buyer back. A transport call either moves
//! the whole amount or fails without effect.

use crate::{
    error::EscrowError,
    models::{Amount, PartyId},
    EscrowResult,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Payment rail consumed by the escrow engine
#[async_trait]
pub trait ValueTransport: Send + Sync {
    /// Move `amount` from `from` to `to`, atomically
    async fn pay(&self, from: &PartyId, to: &PartyId, amount: Amount) -> EscrowResult<()>;
}

/// In-memory balance book implementing [`ValueTransport`]
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    balances: RwLock<HashMap<PartyId, Amount>>,
}

impl InMemoryTransport {
    /// Create an empty balance book
    pub fn new() -> Self {
        Self::default()
    }

    /// Add funds to a party's balance
    pub async fn credit(&self, party: &PartyId, amount: Amount) -> EscrowResult<Amount> {
        let mut balances = self.balances.write().await;
        let balance = balances.entry(party.clone()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| EscrowError::transport(format!("Balance overflow for {}", party)))?;
        Ok(*balance)
    }

    /// Current balance of a party (zero if unknown)
    pub async fn balance_of(&self, party: &PartyId) -> Amount {
        self.balances.read().await.get(party).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ValueTransport for InMemoryTransport {
    async fn pay(&self, from: &PartyId, to: &PartyId, amount: Amount) -> EscrowResult<()> {
        if amount == 0 || from == to {
            return Ok(());
        }

        let mut balances = self.balances.write().await;

        let from_balance = balances.get(from).copied().unwrap_or(0);
        if from_balance < amount {
            return Err(EscrowError::transport(format!(
                "Insufficient balance for {}: has {}, needs {}",
                from, from_balance, amount
            )));
        }

        let to_balance = balances.get(to).copied().unwrap_or(0);
        let credited = to_balance
            .checked_add(amount)
            .ok_or_else(|| EscrowError::transport(format!("Balance overflow for {}", to)))?;

        // Both sides validated; apply together
        balances.insert(from.clone(), from_balance - amount);
        balances.insert(to.clone(), credited);

        debug!(%from, %to, amount, "Transferred value");
        Ok(())
    }
}
