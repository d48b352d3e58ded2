//! In-process ledger: serializes registry transactions into blocks.
//!
//! Each committed transaction is exactly one block. Its events are appended
//! to the log and broadcast to subscribers **while the ledger lock is held**,
//! so every subscriber sees events in commit order. A transaction that
//! returns an error produces no block and no events.
//!
//! The log is kept in full so consumers can replay any block range
//! ([`Ledger::events_between`]) after a restart or a lagged subscription.

use std::{
    fmt,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use dvp_types::{
    Address, Attestation, Digest, DvpError, EventRecord, ExternalRegId, RegistryConfig,
    RegistryEvent, Result, SignedAttestation, Trade, TradeId, TradeState, TradeTerms, constants,
};
use tokio::sync::broadcast;

use crate::registry::{TradeRegistry, TxContext};

// =============================================================================
// CLOCK
// =============================================================================

/// Source of transaction timestamps (unix seconds).
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
    }
}

/// Settable clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    #[must_use]
    pub fn new(start: u64) -> Self {
        Self(AtomicU64::new(start))
    }

    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

// =============================================================================
// LEDGER
// =============================================================================

/// Outcome of a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub block: u64,
    pub timestamp: u64,
    pub events: Vec<RegistryEvent>,
}

#[derive(Debug)]
struct LedgerState {
    registry: TradeRegistry,
    log: Vec<EventRecord>,
    height: u64,
}

/// Single-writer ledger hosting one [`TradeRegistry`].
pub struct Ledger {
    state: Mutex<LedgerState>,
    events_tx: broadcast::Sender<EventRecord>,
    clock: Arc<dyn Clock>,
}

impl Ledger {
    #[must_use]
    pub fn new(config: RegistryConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(config, clock, constants::DEFAULT_EVENT_CHANNEL_CAPACITY)
    }

    /// `capacity` bounds how far a subscriber may fall behind before it
    /// observes `Lagged`.
    #[must_use]
    pub fn with_capacity(config: RegistryConfig, clock: Arc<dyn Clock>, capacity: usize) -> Self {
        let (events_tx, _) = broadcast::channel(capacity.max(1));
        tracing::info!(
            chain_id = config.chain_id,
            registry = %config.registry_address,
            admin = %config.admin,
            "Ledger started"
        );
        Self {
            state: Mutex::new(LedgerState {
                registry: TradeRegistry::new(config),
                log: Vec::new(),
                height: 0,
            }),
            events_tx,
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>> {
        self.state
            .lock()
            .map_err(|_| DvpError::Internal("ledger lock poisoned".to_string()))
    }

    /// Run `f` as one atomic transaction on behalf of `caller`.
    ///
    /// # Errors
    /// Whatever `f` returns; in that case nothing is committed.
    pub fn transact<T>(
        &self,
        caller: Address,
        f: impl FnOnce(&mut TradeRegistry, &mut TxContext) -> Result<T>,
    ) -> Result<(T, TxReceipt)> {
        let mut state = self.lock()?;
        let now = self.clock.now();
        let mut tx = TxContext::new(caller, now);
        let out = f(&mut state.registry, &mut tx)?;

        state.height += 1;
        let block = state.height;
        let events = tx.into_events();
        for (index, event) in events.iter().enumerate() {
            let record = EventRecord {
                block,
                log_index: u32::try_from(index)
                    .map_err(|_| DvpError::Internal("too many events in one block".to_string()))?,
                timestamp: now,
                event: event.clone(),
            };
            state.log.push(record.clone());
            // No receivers is fine; the log still has it.
            let _ = self.events_tx.send(record);
        }

        tracing::debug!(block, caller = %caller, events = events.len(), "Block committed");
        Ok((
            out,
            TxReceipt {
                block,
                timestamp: now,
                events,
            },
        ))
    }

    /// Read-only access to the registry.
    pub fn view<T>(&self, f: impl FnOnce(&TradeRegistry) -> T) -> Result<T> {
        Ok(f(&self.lock()?.registry))
    }

    /// Latest committed block (0 before the first transaction).
    pub fn head(&self) -> Result<u64> {
        Ok(self.lock()?.height)
    }

    /// All events in blocks `from..=to`, in commit order.
    pub fn events_between(&self, from: u64, to: u64) -> Result<Vec<EventRecord>> {
        let state = self.lock()?;
        let start = state.log.partition_point(|r| r.block < from);
        Ok(state.log[start..]
            .iter()
            .take_while(|r| r.block <= to)
            .cloned()
            .collect())
    }

    /// Live events committed after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.events_tx.subscribe()
    }

    #[must_use]
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    // -------------------------------------------------------------------------
    // Typed transactions
    // -------------------------------------------------------------------------

    pub fn propose(&self, caller: Address, terms: TradeTerms) -> Result<TradeId> {
        self.transact(caller, |r, tx| r.propose(tx, terms))
            .map(|(id, _)| id)
    }

    pub fn submit_proofs(
        &self,
        caller: Address,
        seller: &SignedAttestation,
        buyer: &SignedAttestation,
    ) -> Result<TxReceipt> {
        self.transact(caller, |r, tx| r.submit_proofs(tx, seller, buyer))
            .map(|((), receipt)| receipt)
    }

    pub fn trigger(&self, caller: Address, trade_id: TradeId) -> Result<TxReceipt> {
        self.transact(caller, |r, tx| r.trigger(tx, trade_id))
            .map(|((), receipt)| receipt)
    }

    pub fn confirm_registration(
        &self,
        caller: Address,
        trade_id: TradeId,
        external_reg_id: ExternalRegId,
    ) -> Result<TxReceipt> {
        self.transact(caller, |r, tx| {
            r.confirm_registration(tx, trade_id, external_reg_id)
        })
        .map(|((), receipt)| receipt)
    }

    pub fn reject(&self, caller: Address, trade_id: TradeId, reason: &str) -> Result<TxReceipt> {
        self.transact(caller, |r, tx| r.reject(tx, trade_id, reason))
            .map(|((), receipt)| receipt)
    }

    pub fn cancel(&self, caller: Address, trade_id: TradeId) -> Result<TxReceipt> {
        self.transact(caller, |r, tx| r.cancel(tx, trade_id))
            .map(|((), receipt)| receipt)
    }

    pub fn expire(&self, caller: Address, trade_id: TradeId) -> Result<TxReceipt> {
        self.transact(caller, |r, tx| r.expire(tx, trade_id))
            .map(|((), receipt)| receipt)
    }

    pub fn add_attestor(&self, caller: Address, account: Address) -> Result<TxReceipt> {
        self.transact(caller, |r, tx| r.add_attestor(tx, account))
            .map(|((), receipt)| receipt)
    }

    pub fn remove_attestor(&self, caller: Address, account: Address) -> Result<TxReceipt> {
        self.transact(caller, |r, tx| r.remove_attestor(tx, account))
            .map(|((), receipt)| receipt)
    }

    pub fn add_oracle(&self, caller: Address, account: Address) -> Result<TxReceipt> {
        self.transact(caller, |r, tx| r.add_oracle(tx, account))
            .map(|((), receipt)| receipt)
    }

    pub fn remove_oracle(&self, caller: Address, account: Address) -> Result<TxReceipt> {
        self.transact(caller, |r, tx| r.remove_oracle(tx, account))
            .map(|((), receipt)| receipt)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub fn state_of(&self, trade_id: &TradeId) -> Result<Option<TradeState>> {
        self.view(|r| r.state_of(trade_id))
    }

    pub fn get_trade(&self, trade_id: &TradeId) -> Result<Trade> {
        self.view(|r| r.get_trade(trade_id))?
    }

    pub fn attestation_digest(&self, attestation: &Attestation) -> Result<Digest> {
        self.view(|r| r.attestation_digest(attestation))
    }

    pub fn is_attestor(&self, who: &Address) -> Result<bool> {
        self.view(|r| r.is_attestor(who))
    }

    pub fn is_oracle(&self, who: &Address) -> Result<bool> {
        self.view(|r| r.is_oracle(who))
    }

    pub fn admin(&self) -> Result<Address> {
        self.view(TradeRegistry::admin)
    }
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("clock", &self.clock)
            .field("subscribers", &self.events_tx.receiver_count())
            .finish_non_exhaustive()
    }
}
