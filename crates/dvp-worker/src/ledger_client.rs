//! The worker's view of the registry.
//!
//! [`SettlementLedger`] is everything the worker needs: history, a live
//! feed, two reads and the two oracle reports. [`LocalLedger`] binds it to an
//! in-process [`Ledger`] under a fixed oracle identity.

use std::sync::Arc;

use async_trait::async_trait;
use dvp_registry::Ledger;
use dvp_types::{Address, EventRecord, ExternalRegId, Result, Trade, TradeId, TradeState};
use tokio::sync::broadcast;

#[async_trait]
pub trait SettlementLedger: Send + Sync {
    /// Latest committed block.
    async fn head(&self) -> Result<u64>;

    /// `Triggered` events in blocks `from..=to`, in commit order.
    async fn triggered_between(&self, from: u64, to: u64) -> Result<Vec<EventRecord>>;

    /// Live feed of every event committed after this call.
    fn subscribe(&self) -> broadcast::Receiver<EventRecord>;

    async fn state_of(&self, trade_id: &TradeId) -> Result<Option<TradeState>>;

    async fn get_trade(&self, trade_id: &TradeId) -> Result<Trade>;

    /// Returns once the transaction is committed.
    async fn confirm_registration(
        &self,
        trade_id: TradeId,
        external_reg_id: ExternalRegId,
    ) -> Result<()>;

    /// Returns once the transaction is committed.
    async fn reject(&self, trade_id: TradeId, reason: &str) -> Result<()>;
}

/// In-process ledger, reporting as `oracle`.
#[derive(Debug, Clone)]
pub struct LocalLedger {
    ledger: Arc<Ledger>,
    oracle: Address,
}

impl LocalLedger {
    #[must_use]
    pub fn new(ledger: Arc<Ledger>, oracle: Address) -> Self {
        Self { ledger, oracle }
    }

    #[must_use]
    pub fn inner(&self) -> &Arc<Ledger> {
        &self.ledger
    }
}

#[async_trait]
impl SettlementLedger for LocalLedger {
    async fn head(&self) -> Result<u64> {
        self.ledger.head()
    }

    async fn triggered_between(&self, from: u64, to: u64) -> Result<Vec<EventRecord>> {
        let mut events = self.ledger.events_between(from, to)?;
        events.retain(|r| r.event.is_triggered());
        Ok(events)
    }

    fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.ledger.subscribe()
    }

    async fn state_of(&self, trade_id: &TradeId) -> Result<Option<TradeState>> {
        self.ledger.state_of(trade_id)
    }

    async fn get_trade(&self, trade_id: &TradeId) -> Result<Trade> {
        self.ledger.get_trade(trade_id)
    }

    async fn confirm_registration(
        &self,
        trade_id: TradeId,
        external_reg_id: ExternalRegId,
    ) -> Result<()> {
        self.ledger
            .confirm_registration(self.oracle, trade_id, external_reg_id)
            .map(|_| ())
    }

    async fn reject(&self, trade_id: TradeId, reason: &str) -> Result<()> {
        self.ledger.reject(self.oracle, trade_id, reason).map(|_| ())
    }
}
