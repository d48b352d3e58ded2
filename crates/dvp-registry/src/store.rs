//! Trade store: the registry's process-wide state in one owned object.
//!
//! Holds the trade table, the consumed-attestation set and the proposal
//! counter. Each registry instance owns its own store, so tests running many
//! registries side by side never share a counter.
//!
//! Like a UTXO set, the consumed set only grows: a digest, once spent,
//! stays spent for the registry's lifetime. There is no eviction.

use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicU64, Ordering},
};

use dvp_types::{Digest, DvpError, Result, Trade, TradeId};

/// Trade table, replay set and proposal counter.
#[derive(Debug, Default)]
pub struct TradeStore {
    /// All trades ever proposed, terminal ones included.
    trades: HashMap<TradeId, Trade>,
    /// Attestation digests already accepted.
    consumed: HashSet<Digest>,
    /// Strictly increasing proposal sequence.
    proposals: AtomicU64,
}

impl TradeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next proposal sequence number.
    pub fn next_sequence(&self) -> u64 {
        self.proposals.fetch_add(1, Ordering::SeqCst)
    }

    /// Number of sequence numbers handed out so far.
    #[must_use]
    pub fn proposals(&self) -> u64 {
        self.proposals.load(Ordering::SeqCst)
    }

    /// Insert a new trade.
    ///
    /// # Errors
    /// [`DvpError::DuplicateTrade`] if the id is already present.
    pub fn insert(&mut self, trade: Trade) -> Result<()> {
        if self.trades.contains_key(&trade.trade_id) {
            return Err(DvpError::DuplicateTrade(trade.trade_id));
        }
        self.trades.insert(trade.trade_id, trade);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, trade_id: &TradeId) -> Option<&Trade> {
        self.trades.get(trade_id)
    }

    /// # Errors
    /// [`DvpError::TradeNotFound`] if unknown.
    pub fn require(&self, trade_id: &TradeId) -> Result<&Trade> {
        self.trades
            .get(trade_id)
            .ok_or(DvpError::TradeNotFound(*trade_id))
    }

    /// # Errors
    /// [`DvpError::TradeNotFound`] if unknown.
    pub fn require_mut(&mut self, trade_id: &TradeId) -> Result<&mut Trade> {
        self.trades
            .get_mut(trade_id)
            .ok_or(DvpError::TradeNotFound(*trade_id))
    }

    #[must_use]
    pub fn is_consumed(&self, digest: &Digest) -> bool {
        self.consumed.contains(digest)
    }

    /// Mark a digest as consumed. Returns `false` if it already was.
    pub fn consume(&mut self, digest: Digest) -> bool {
        self.consumed.insert(digest)
    }

    /// Number of trades stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.trades.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Number of consumed attestation digests.
    #[must_use]
    pub fn consumed_len(&self) -> usize {
        self.consumed.len()
    }

    pub fn trades(&self) -> impl Iterator<Item = &Trade> {
        self.trades.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dvp_types::{Address, SecurityId, TradeState, TradeTerms};

    fn trade(id: u8) -> Trade {
        let terms = TradeTerms {
            seller: Address([1u8; 20]),
            buyer: Address([2u8; 20]),
            security_id: SecurityId([3u8; 32]),
            qty: 1,
            currency_code: "EUR".parse().unwrap(),
            amount: 1,
            deadline: 100,
        };
        Trade::new(TradeId([id; 32]), terms, 0)
    }

    #[test]
    fn sequence_is_strictly_increasing() {
        let store = TradeStore::new();
        assert_eq!(store.next_sequence(), 0);
        assert_eq!(store.next_sequence(), 1);
        assert_eq!(store.proposals(), 2);
    }

    #[test]
    fn separate_stores_do_not_share_counter() {
        let a = TradeStore::new();
        let b = TradeStore::new();
        a.next_sequence();
        a.next_sequence();
        assert_eq!(b.next_sequence(), 0);
    }

    #[test]
    fn insert_and_lookup() {
        let mut store = TradeStore::new();
        store.insert(trade(1)).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.require(&TradeId([1u8; 32])).unwrap().state, TradeState::Draft);
        let err = store.require(&TradeId([2u8; 32])).unwrap_err();
        assert!(matches!(err, DvpError::TradeNotFound(_)));
    }

    #[test]
    fn duplicate_insert_blocked() {
        let mut store = TradeStore::new();
        store.insert(trade(1)).unwrap();
        let err = store.insert(trade(1)).unwrap_err();
        assert!(matches!(err, DvpError::DuplicateTrade(_)));
    }

    #[test]
    fn consume_once() {
        let mut store = TradeStore::new();
        let d = Digest([7u8; 32]);
        assert!(!store.is_consumed(&d));
        assert!(store.consume(d));
        assert!(!store.consume(d), "second consume must report already-spent");
        assert!(store.is_consumed(&d));
        assert_eq!(store.consumed_len(), 1);
    }
}
