//! Error types for the escrow system
//!
//! Every failure is atomic: by the time an `EscrowError` reaches the caller,
//! no partial state change from the failed operation persists.

use crate::models::{AssetId, EscrowState};
use thiserror::Error;

/// Main error type for escrow operations
#[derive(Error, Debug)]
pub enum EscrowError {
    /// No escrow record exists for the asset
    #[error("No escrow record for asset {asset_id}")]
    NotFound { asset_id: AssetId },

    /// Caller is not entitled to invoke the operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The record's current state does not permit the operation
    #[error("Cannot {operation} asset {asset_id} in state {state}")]
    InvalidState {
        asset_id: AssetId,
        state: EscrowState,
        operation: &'static str,
    },

    /// Amount is zero or does not match the configured price
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Reclaim attempted while a funded sale is unsettled
    #[error("Asset {asset_id} has a funded claim pending; refund before reclaiming")]
    ActiveClaimPending { asset_id: AssetId },

    /// Asset arrived while a record for it still exists
    #[error("Asset {asset_id} is already held in escrow")]
    AlreadyDeposited { asset_id: AssetId },

    /// A collaborator call for this asset has not finished yet
    #[error("Settlement in progress for asset {asset_id}")]
    SettlementInProgress { asset_id: AssetId },

    /// Asset registry errors (unknown asset, wrong owner, rejected receiver)
    #[error("Custody error: {0}")]
    Custody(String),

    /// Value transport errors (insufficient balance, rejected transfer)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EscrowError {
    /// Create an unauthorized error
    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Create an invalid amount error
    pub fn invalid_amount<S: Into<String>>(msg: S) -> Self {
        Self::InvalidAmount(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(asset_id: AssetId, state: EscrowState, operation: &'static str) -> Self {
        Self::InvalidState {
            asset_id,
            state,
            operation,
        }
    }

    /// Create a custody error
    pub fn custody<S: Into<String>>(msg: S) -> Self {
        Self::Custody(msg.into())
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// True when the operation was refused by a precondition check rather
    /// than failing inside a collaborator.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Unauthorized(_)
                | Self::InvalidState { .. }
                | Self::InvalidAmount(_)
                | Self::ActiveClaimPending { .. }
                | Self::AlreadyDeposited { .. }
                | Self::SettlementInProgress { .. }
        )
    }
}
