//! Core data models for the escrow system
//!
//! Identifiers, the escrow record and its state enum, and the events
//! emitted for committed transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Payment amount in the transport's smallest unit
pub type Amount = u64;

/// Unique key naming a custodial (non-fungible) asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub u64);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for AssetId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Opaque party identity, compared by value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(String);

impl PartyId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartyId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PartyId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Escrow state machine enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscrowState {
    /// Asset deposited, no asking price yet
    Init,
    /// Price set, awaiting a buyer
    Active,
    /// Buyer paid the price to the depositor
    Funded,
    /// Depositor returned the payment to the buyer
    Refunded,
}

impl EscrowState {
    /// Check if this state allows activation
    pub fn can_activate(&self) -> bool {
        matches!(self, Self::Init)
    }

    /// Check if this state allows funding
    pub fn can_fund(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Check if this state allows a refund
    pub fn can_refund(&self) -> bool {
        matches!(self, Self::Funded)
    }

    /// Check if the depositor may take the asset back.
    ///
    /// Only a funded sale blocks reclamation.
    pub fn can_reclaim(&self) -> bool {
        !matches!(self, Self::Funded)
    }

    /// Whether a payee is recorded in this state
    pub fn has_payee(&self) -> bool {
        matches!(self, Self::Funded | Self::Refunded)
    }

    /// Whether the price has been fixed
    pub fn is_priced(&self) -> bool {
        !matches!(self, Self::Init)
    }
}

impl fmt::Display for EscrowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Init => "Init",
            Self::Active => "Active",
            Self::Funded => "Funded",
            Self::Refunded => "Refunded",
        };
        f.write_str(s)
    }
}

/// Escrow record for one asset held in custody
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRecord {
    pub asset_id: AssetId,
    /// Party that placed the asset into custody
    pub depositor: PartyId,
    pub state: EscrowState,
    /// Asking price, fixed at activation
    pub price: Option<Amount>,
    /// Party that funded the sale
    pub payee: Option<PartyId>,

    // Timestamps
    pub deposited_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EscrowRecord {
    /// Create a record for a freshly deposited asset
    pub fn new(asset_id: AssetId, depositor: PartyId) -> Self {
        let now = Utc::now();
        Self {
            asset_id,
            depositor,
            state: EscrowState::Init,
            price: None,
            payee: None,
            deposited_at: now,
            updated_at: now,
        }
    }

    pub fn is_depositor(&self, party: &PartyId) -> bool {
        &self.depositor == party
    }

    /// Check the record-level invariants: a price exactly when past `Init`,
    /// a payee exactly when funded or refunded.
    pub fn is_consistent(&self) -> bool {
        let priced = matches!(self.price, Some(price) if price > 0);
        priced == self.state.is_priced() && self.payee.is_some() == self.state.has_payee()
    }
}

/// Observable notification for a committed transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EscrowEvent {
    Activated {
        depositor: PartyId,
        asset_id: AssetId,
        price: Amount,
    },
    Funded {
        payee: PartyId,
        asset_id: AssetId,
        amount: Amount,
    },
    Refunded {
        payee: PartyId,
        asset_id: AssetId,
        amount: Amount,
    },
    Reclaimed {
        depositor: PartyId,
        asset_id: AssetId,
    },
}

impl EscrowEvent {
    pub fn asset_id(&self) -> AssetId {
        match self {
            Self::Activated { asset_id, .. }
            | Self::Funded { asset_id, .. }
            | Self::Refunded { asset_id, .. }
            | Self::Reclaimed { asset_id, .. } => *asset_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Activated { .. } => "activated",
            Self::Funded { .. } => "funded",
            Self::Refunded { .. } => "refunded",
            Self::Reclaimed { .. } => "reclaimed",
        }
    }
}

/// Escrow event as stored in the audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    /// Position in the append-only log, starting at 1
    pub sequence: u64,
    pub event: EscrowEvent,
    pub emitted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_init() {
        let record = EscrowRecord::new(AssetId(933), PartyId::from("alice"));
        assert_eq!(record.state, EscrowState::Init);
        assert_eq!(record.price, None);
        assert_eq!(record.payee, None);
        assert!(record.is_depositor(&PartyId::from("alice")));
        assert!(!record.is_depositor(&PartyId::from("bob")));
        assert!(record.is_consistent());
    }

    #[test]
    fn test_state_permissions() {
        assert!(EscrowState::Init.can_activate());
        assert!(!EscrowState::Active.can_activate());

        assert!(EscrowState::Active.can_fund());
        assert!(!EscrowState::Init.can_fund());
        assert!(!EscrowState::Refunded.can_fund());

        assert!(EscrowState::Funded.can_refund());
        assert!(!EscrowState::Refunded.can_refund());

        assert!(EscrowState::Init.can_reclaim());
        assert!(EscrowState::Active.can_reclaim());
        assert!(EscrowState::Refunded.can_reclaim());
        assert!(!EscrowState::Funded.can_reclaim());
    }

    #[test]
    fn test_inconsistent_record_detected() {
        let mut record = EscrowRecord::new(AssetId(1), PartyId::from("alice"));
        record.state = EscrowState::Active;
        assert!(!record.is_consistent());

        record.price = Some(100);
        assert!(record.is_consistent());

        record.payee = Some(PartyId::from("bob"));
        assert!(!record.is_consistent());
    }

    #[test]
    fn test_event_serialization() {
        let event = EscrowEvent::Funded {
            payee: PartyId::from("bob"),
            asset_id: AssetId(9648),
            amount: 1000,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "funded");
        assert_eq!(json["payee"], "bob");
        assert_eq!(json["asset_id"], 9648);
        assert_eq!(json["amount"], 1000);

        let parsed: EscrowEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
        assert_eq!(parsed.asset_id(), AssetId(9648));
    }
}
