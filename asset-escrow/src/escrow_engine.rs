//! Escrow Engine - Drives escrow records through their lifecycle
//!
//! The engine binds the ledger and the state machine to its collaborators:
//! the asset custodian it was created with, the value transport that moves
//! payments, and the event sink.
//!
//! Every operation validates and commits under the ledger lock first and
//! only then calls out. A collaborator that calls back into the engine sees
//! the committed state, so the same transition cannot run twice. If the
//! call out fails, the settlement guard restores the previous record.

use crate::{
    config::EscrowEngineConfig,
    custodian::AssetCustodian,
    error::EscrowError,
    event_sink::EventSink,
    ledger::EscrowLedger,
    models::{Amount, AssetId, EscrowEvent, EscrowRecord, PartyId},
    state_machine,
    transport::ValueTransport,
    EscrowResult,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Main escrow engine
pub struct EscrowEngine {
    /// Configuration
    pub(crate) config: EscrowEngineConfig,
    /// Records of assets currently in custody
    pub(crate) ledger: EscrowLedger,
    /// Asset registry, bound at construction
    pub(crate) custodian: Arc<dyn AssetCustodian>,
    /// Payment rail
    transport: Arc<dyn ValueTransport>,
    /// Audit trail
    events: Arc<dyn EventSink>,
}

impl EscrowEngine {
    /// Create a new escrow engine bound to one custodian
    pub fn new(
        config: EscrowEngineConfig,
        custodian: Arc<dyn AssetCustodian>,
        transport: Arc<dyn ValueTransport>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        info!("Initializing escrow engine (custody party: {})", config.custody_party);

        Self {
            config,
            ledger: EscrowLedger::new(),
            custodian,
            transport,
            events,
        }
    }

    /// Identity under which the engine holds custody
    pub fn custody_party(&self) -> &PartyId {
        &self.config.custody_party
    }

    /// Set the asking price for a deposited asset
    pub async fn activate(
        &self,
        caller: &PartyId,
        asset_id: AssetId,
        price: Amount,
    ) -> EscrowResult<EscrowRecord> {
        info!("Activating escrow {} at price {}", asset_id, price);

        let (record, event) = state_machine::ensure_positive_price(price)
            .and_then(|()| {
                self.ledger
                    .update(asset_id, |record| state_machine::activate(record, caller, price))
            })
            .map_err(|e| rejected("activate", asset_id, e))?;

        self.publish(event).await;

        info!(%asset_id, %caller, price, "Activated escrow");
        Ok(record)
    }

    /// Pay the asking price and become the payee
    pub async fn fund(
        &self,
        payer: &PartyId,
        asset_id: AssetId,
        amount: Amount,
    ) -> EscrowResult<EscrowRecord> {
        info!("Funding escrow {} with {} from {}", asset_id, amount, payer);

        let (settlement, record, event) = self
            .ledger
            .begin_settlement(asset_id, |record| state_machine::fund(record, payer, amount))
            .map_err(|e| rejected("fund", asset_id, e))?;

        // Record is already Funded; dropping the settlement on error undoes it
        if let Err(err) = self.transport.pay(payer, &record.depositor, amount).await {
            error!(%asset_id, %payer, amount, error = %err, "Funding payment failed");
            return Err(err);
        }
        settlement.complete();

        self.publish(event).await;

        info!(%asset_id, %payer, amount, "Funded escrow");
        Ok(record)
    }

    /// Return the payee's payment
    pub async fn refund(
        &self,
        caller: &PartyId,
        asset_id: AssetId,
        amount: Amount,
    ) -> EscrowResult<EscrowRecord> {
        info!("Refunding {} on escrow {}", amount, asset_id);

        let (settlement, record, event) = self
            .ledger
            .begin_settlement(asset_id, |record| state_machine::refund(record, caller, amount))
            .map_err(|e| rejected("refund", asset_id, e))?;

        let payee = record
            .payee
            .clone()
            .ok_or_else(|| EscrowError::internal(format!("Refunded escrow {} has no payee", asset_id)))?;

        if let Err(err) = self.transport.pay(&record.depositor, &payee, amount).await {
            error!(%asset_id, %payee, amount, error = %err, "Refund payment failed");
            return Err(err);
        }
        settlement.complete();

        self.publish(event).await;

        info!(%asset_id, %payee, amount, "Refunded escrow");
        Ok(record)
    }

    /// Return the asset to its depositor and delete the record
    pub async fn reclaim(&self, caller: &PartyId, asset_id: AssetId) -> EscrowResult<EscrowRecord> {
        info!("Reclaiming escrow {}", asset_id);

        let (settlement, record, event) = self
            .ledger
            .begin_removal(asset_id, |record| state_machine::reclaim(record, caller))
            .map_err(|e| rejected("reclaim", asset_id, e))?;

        if let Err(err) = self
            .custodian
            .transfer(asset_id, &self.config.custody_party, &record.depositor)
            .await
        {
            error!(%asset_id, depositor = %record.depositor, error = %err, "Returning custody failed");
            return Err(err);
        }
        settlement.complete();

        self.publish(event).await;

        info!(%asset_id, depositor = %record.depositor, "Reclaimed escrow");
        Ok(record)
    }

    /// Get the escrow record for an asset
    pub fn get_record(&self, asset_id: AssetId) -> EscrowResult<EscrowRecord> {
        self.ledger
            .get(asset_id)
            .ok_or(EscrowError::NotFound { asset_id })
    }

    /// All records, ordered by asset identifier
    pub fn records(&self) -> Vec<EscrowRecord> {
        self.ledger.records()
    }

    /// Records deposited by a party
    pub fn records_for_depositor(&self, depositor: &PartyId) -> Vec<EscrowRecord> {
        self.ledger.records_for_depositor(depositor)
    }

    /// Number of assets currently in custody
    pub fn escrow_count(&self) -> usize {
        self.ledger.len()
    }

    /// Whether a collaborator call for the asset is in flight
    pub fn is_settling(&self, asset_id: AssetId) -> bool {
        self.ledger.is_settling(asset_id)
    }

    async fn publish(&self, event: EscrowEvent) {
        let asset_id = event.asset_id();
        let kind = event.kind();

        if let Err(err) = self.events.publish(event).await {
            warn!(%asset_id, kind, error = %err, "Failed to publish escrow event");
        }
    }
}

fn rejected(
    operation: &'static str,
    asset_id: AssetId,
    err: EscrowError,
) -> EscrowError {
    if err.is_rejection() {
        debug!(%asset_id, operation, error = %err, "Escrow operation rejected");
    } else {
        error!("Failed to {} escrow {}: {}", operation, asset_id, err);
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        custodian::{CustodyReceiver, InMemoryCustodian},
        event_sink::EventLog,
        models::EscrowState,
        transport::InMemoryTransport,
    };
    use async_trait::async_trait;
    use std::time::Duration;

    struct Fixture {
        engine: Arc<EscrowEngine>,
        custodian: Arc<InMemoryCustodian>,
        transport: Arc<InMemoryTransport>,
        events: Arc<EventLog>,
    }

    fn alice() -> PartyId {
        PartyId::from("alice")
    }

    fn bob() -> PartyId {
        PartyId::from("bob")
    }

    async fn setup() -> Fixture {
        let custodian = Arc::new(InMemoryCustodian::new());
        let transport = Arc::new(InMemoryTransport::new());
        let events = Arc::new(EventLog::new());
        let engine = Arc::new(EscrowEngine::new(
            EscrowEngineConfig::default(),
            custodian.clone(),
            transport.clone(),
            events.clone(),
        ));

        let receiver: Arc<dyn CustodyReceiver> = engine.clone();
        custodian
            .register_receiver(engine.custody_party().clone(), Arc::downgrade(&receiver))
            .await;

        Fixture {
            engine,
            custodian,
            transport,
            events,
        }
    }

    impl Fixture {
        async fn deposit(&self, asset: u64) {
            let asset_id = AssetId(asset);
            self.custodian.mint(asset_id, &alice()).await.unwrap();
            self.custodian
                .transfer(asset_id, &alice(), self.engine.custody_party())
                .await
                .unwrap();
        }

        async fn funded(&self, asset: u64, price: Amount) {
            self.deposit(asset).await;
            self.engine.activate(&alice(), AssetId(asset), price).await.unwrap();
            self.transport.credit(&bob(), price).await.unwrap();
            self.engine.fund(&bob(), AssetId(asset), price).await.unwrap();
        }
    }

    struct RejectingReceiver;

    #[async_trait]
    impl CustodyReceiver for RejectingReceiver {
        async fn on_asset_received(&self, _asset_id: AssetId, _from: &PartyId) -> EscrowResult<()> {
            Err(EscrowError::custody("receiver refuses assets"))
        }
    }

    struct StallingReceiver;

    #[async_trait]
    impl CustodyReceiver for StallingReceiver {
        async fn on_asset_received(&self, _asset_id: AssetId, _from: &PartyId) -> EscrowResult<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    struct StalledTransport;

    #[async_trait]
    impl ValueTransport for StalledTransport {
        async fn pay(&self, _from: &PartyId, _to: &PartyId, _amount: Amount) -> EscrowResult<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl EventSink for FailingSink {
        async fn publish(&self, _event: EscrowEvent) -> EscrowResult<()> {
            Err(EscrowError::internal("sink offline"))
        }
    }

    #[tokio::test]
    async fn test_activate_emits_event() {
        let fx = setup().await;
        fx.deposit(3881).await;

        let record = fx.engine.activate(&alice(), AssetId(3881), 100).await.unwrap();

        assert_eq!(record.state, EscrowState::Active);
        assert_eq!(
            fx.events.last().await.unwrap().event,
            EscrowEvent::Activated {
                depositor: alice(),
                asset_id: AssetId(3881),
                price: 100,
            }
        );
    }

    #[tokio::test]
    async fn test_operations_on_missing_record() {
        let fx = setup().await;
        let missing = AssetId(298);

        let activate = fx.engine.activate(&alice(), missing, 1).await;
        let fund = fx.engine.fund(&bob(), missing, 1).await;
        let refund = fx.engine.refund(&alice(), missing, 1).await;
        let reclaim = fx.engine.reclaim(&alice(), missing).await;

        assert!(matches!(activate, Err(EscrowError::NotFound { .. })));
        assert!(matches!(fund, Err(EscrowError::NotFound { .. })));
        assert!(matches!(refund, Err(EscrowError::NotFound { .. })));
        assert!(matches!(reclaim, Err(EscrowError::NotFound { .. })));
        assert!(fx.events.is_empty().await);
    }

    #[tokio::test]
    async fn test_zero_price_rejected_before_lookup() {
        let fx = setup().await;
        let result = fx.engine.activate(&bob(), AssetId(933), 0).await;
        assert!(matches!(result, Err(EscrowError::InvalidAmount(_))));
    }

    #[tokio::test]
    async fn test_failed_payment_rolls_back_funding() {
        let fx = setup().await;
        fx.deposit(12).await;
        fx.engine.activate(&alice(), AssetId(12), 1000).await.unwrap();
        fx.transport.credit(&bob(), 999).await.unwrap();

        let result = fx.engine.fund(&bob(), AssetId(12), 1000).await;

        assert!(matches!(result, Err(EscrowError::Transport(_))));
        let record = fx.engine.get_record(AssetId(12)).unwrap();
        assert_eq!(record.state, EscrowState::Active);
        assert_eq!(record.payee, None);
        assert!(!fx.engine.is_settling(AssetId(12)));
        assert_eq!(fx.transport.balance_of(&bob()).await, 999);
        assert_eq!(fx.events.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_refund_payment_rolls_back() {
        let fx = setup().await;
        fx.funded(5, 1000).await;

        // Depositor spends the proceeds before refunding
        fx.transport.pay(&alice(), &PartyId::from("carol"), 1).await.unwrap();

        let result = fx.engine.refund(&alice(), AssetId(5), 1000).await;

        assert!(matches!(result, Err(EscrowError::Transport(_))));
        assert_eq!(fx.engine.get_record(AssetId(5)).unwrap().state, EscrowState::Funded);
    }

    #[tokio::test]
    async fn test_failed_custody_return_restores_record() {
        let fx = setup().await;
        fx.deposit(143).await;

        let hook: Arc<dyn CustodyReceiver> = Arc::new(RejectingReceiver);
        fx.custodian.register_receiver(alice(), Arc::downgrade(&hook)).await;

        let result = fx.engine.reclaim(&alice(), AssetId(143)).await;

        assert!(matches!(result, Err(EscrowError::Custody(_))));
        assert_eq!(fx.engine.get_record(AssetId(143)).unwrap().state, EscrowState::Init);
        assert_eq!(
            fx.custodian.owner_of(AssetId(143)).await.unwrap(),
            fx.engine.custody_party().clone()
        );
        assert!(fx.events.is_empty().await);
    }

    #[tokio::test]
    async fn test_cancelled_fund_rolls_back() {
        let custodian = Arc::new(InMemoryCustodian::new());
        let engine = Arc::new(EscrowEngine::new(
            EscrowEngineConfig::default(),
            custodian.clone(),
            Arc::new(StalledTransport),
            Arc::new(EventLog::new()),
        ));
        let receiver: Arc<dyn CustodyReceiver> = engine.clone();
        custodian
            .register_receiver(engine.custody_party().clone(), Arc::downgrade(&receiver))
            .await;
        custodian.mint(AssetId(1), &alice()).await.unwrap();
        custodian.transfer(AssetId(1), &alice(), engine.custody_party()).await.unwrap();
        engine.activate(&alice(), AssetId(1), 10).await.unwrap();

        let result = tokio::time::timeout(
            Duration::from_millis(50),
            engine.fund(&bob(), AssetId(1), 10),
        )
        .await;

        assert!(result.is_err());
        let record = engine.get_record(AssetId(1)).unwrap();
        assert_eq!(record.state, EscrowState::Active);
        assert!(!engine.is_settling(AssetId(1)));
    }

    #[tokio::test]
    async fn test_cancelled_reclaim_keeps_custody_and_record() {
        let fx = setup().await;
        fx.deposit(31).await;

        let hook: Arc<dyn CustodyReceiver> = Arc::new(StallingReceiver);
        fx.custodian.register_receiver(alice(), Arc::downgrade(&hook)).await;

        let result = tokio::time::timeout(
            Duration::from_millis(50),
            fx.engine.reclaim(&alice(), AssetId(31)),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(fx.engine.get_record(AssetId(31)).unwrap().state, EscrowState::Init);
        assert_eq!(
            fx.custodian.owner_of(AssetId(31)).await.unwrap(),
            fx.engine.custody_party().clone()
        );
        assert!(!fx.engine.is_settling(AssetId(31)));
        assert!(fx.events.is_empty().await);

        // The restored record cannot be sold for an asset the escrow no longer holds
        fx.engine.activate(&alice(), AssetId(31), 100).await.unwrap();
        fx.transport.credit(&bob(), 100).await.unwrap();
        fx.engine.fund(&bob(), AssetId(31), 100).await.unwrap();
        assert_eq!(
            fx.custodian.owner_of(AssetId(31)).await.unwrap(),
            fx.engine.custody_party().clone()
        );
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_fail_operation() {
        let custodian = Arc::new(InMemoryCustodian::new());
        let engine = Arc::new(EscrowEngine::new(
            EscrowEngineConfig::default(),
            custodian.clone(),
            Arc::new(InMemoryTransport::new()),
            Arc::new(FailingSink),
        ));
        let receiver: Arc<dyn CustodyReceiver> = engine.clone();
        custodian
            .register_receiver(engine.custody_party().clone(), Arc::downgrade(&receiver))
            .await;
        custodian.mint(AssetId(2), &alice()).await.unwrap();
        custodian.transfer(AssetId(2), &alice(), engine.custody_party()).await.unwrap();

        let record = engine.activate(&alice(), AssetId(2), 10).await.unwrap();
        assert_eq!(record.state, EscrowState::Active);
    }

    #[tokio::test]
    async fn test_records_for_depositor() {
        let fx = setup().await;
        fx.deposit(2).await;
        fx.deposit(1).await;

        let records = fx.engine.records_for_depositor(&alice());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].asset_id, AssetId(1));
        assert!(fx.engine.records_for_depositor(&bob()).is_empty());
        assert_eq!(fx.engine.escrow_count(), 2);
    }
}
