//! Escrow state machine
//!
//! Validates and applies the four party operations against a single record.
//! Nothing in here performs I/O: the engine runs these functions on a copy of
//! the record under the ledger lock and only talks to collaborators once the
//! new state has been committed.
//!
//! ```text
//! State     | activate  | fund      | refund     | reclaim
//! ----------+-----------+-----------+------------+-------------------
//! Init      | -> Active | rejected  | rejected   | -> deleted
//! Active    | rejected  | -> Funded | rejected   | -> deleted
//! Funded    | rejected  | rejected  | -> Refunded| ActiveClaimPending
//! Refunded  | rejected  | rejected  | rejected   | -> deleted
//! ```

use crate::{
    error::EscrowError,
    models::{Amount, EscrowEvent, EscrowRecord, EscrowState, PartyId},
    EscrowResult,
};
use chrono::Utc;

/// Reject a zero asking price before any record is consulted
pub fn ensure_positive_price(price: Amount) -> EscrowResult<()> {
    if price == 0 {
        return Err(EscrowError::invalid_amount("Price must be greater than 0"));
    }
    Ok(())
}

/// Set the asking price (Init -> Active)
pub fn activate(record: &mut EscrowRecord, caller: &PartyId, price: Amount) -> EscrowResult<EscrowEvent> {
    ensure_positive_price(price)?;
    ensure_depositor(record, caller, "activate")?;

    if !record.state.can_activate() {
        return Err(EscrowError::invalid_state(record.asset_id, record.state, "activate"));
    }

    record.price = Some(price);
    apply_transition(record, EscrowState::Active)?;

    Ok(EscrowEvent::Activated {
        depositor: record.depositor.clone(),
        asset_id: record.asset_id,
        price,
    })
}

/// Record the buyer's payment (Active -> Funded)
pub fn fund(record: &mut EscrowRecord, payer: &PartyId, amount: Amount) -> EscrowResult<EscrowEvent> {
    if !record.state.can_fund() {
        return Err(EscrowError::invalid_state(record.asset_id, record.state, "fund"));
    }

    if record.is_depositor(payer) {
        return Err(EscrowError::unauthorized(format!(
            "Depositor {} cannot fund its own asset {}",
            payer, record.asset_id
        )));
    }

    let price = configured_price(record)?;
    ensure_exact_amount(amount, price)?;

    record.payee = Some(payer.clone());
    apply_transition(record, EscrowState::Funded)?;

    Ok(EscrowEvent::Funded {
        payee: payer.clone(),
        asset_id: record.asset_id,
        amount,
    })
}

/// Return the buyer's payment (Funded -> Refunded)
pub fn refund(record: &mut EscrowRecord, caller: &PartyId, amount: Amount) -> EscrowResult<EscrowEvent> {
    ensure_depositor(record, caller, "refund")?;

    if !record.state.can_refund() {
        return Err(EscrowError::invalid_state(record.asset_id, record.state, "refund"));
    }

    let price = configured_price(record)?;
    ensure_exact_amount(amount, price)?;

    let payee = record.payee.clone().ok_or_else(|| {
        EscrowError::internal(format!("Funded escrow {} has no payee", record.asset_id))
    })?;

    apply_transition(record, EscrowState::Refunded)?;

    Ok(EscrowEvent::Refunded {
        payee,
        asset_id: record.asset_id,
        amount,
    })
}

/// Check that the depositor may take the asset back.
///
/// The record itself is not mutated; the ledger deletes it.
pub fn reclaim(record: &EscrowRecord, caller: &PartyId) -> EscrowResult<EscrowEvent> {
    ensure_depositor(record, caller, "reclaim")?;

    if !record.state.can_reclaim() {
        return Err(EscrowError::ActiveClaimPending {
            asset_id: record.asset_id,
        });
    }

    Ok(EscrowEvent::Reclaimed {
        depositor: record.depositor.clone(),
        asset_id: record.asset_id,
    })
}

/// Validate a state transition against the lifecycle table
pub fn validate_transition(from: EscrowState, to: EscrowState) -> bool {
    matches!(
        (from, to),
        (EscrowState::Init, EscrowState::Active)
            | (EscrowState::Active, EscrowState::Funded)
            | (EscrowState::Funded, EscrowState::Refunded)
    )
}

fn apply_transition(record: &mut EscrowRecord, to: EscrowState) -> EscrowResult<()> {
    if !validate_transition(record.state, to) {
        return Err(EscrowError::internal(format!(
            "Invalid state transition: {} -> {}",
            record.state, to
        )));
    }

    record.state = to;
    record.updated_at = Utc::now();
    Ok(())
}

fn ensure_depositor(record: &EscrowRecord, caller: &PartyId, operation: &str) -> EscrowResult<()> {
    if !record.is_depositor(caller) {
        return Err(EscrowError::unauthorized(format!(
            "Only the depositor can {} asset {}",
            operation, record.asset_id
        )));
    }
    Ok(())
}

fn configured_price(record: &EscrowRecord) -> EscrowResult<Amount> {
    record.price.ok_or_else(|| {
        EscrowError::internal(format!("Escrow {} in state {} has no price", record.asset_id, record.state))
    })
}

fn ensure_exact_amount(amount: Amount, price: Amount) -> EscrowResult<()> {
    if amount != price {
        return Err(EscrowError::invalid_amount(format!(
            "Amount {} does not match price {}",
            amount, price
        )));
    }
    Ok(())
}
