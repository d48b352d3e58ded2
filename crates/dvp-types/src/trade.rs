//! Trade model: the record the registry owns for each proposed DvP trade.
//!
//! ## State Machine
//!
//! ```text
//!   ┌───────┐ proofs  ┌───────┐ trigger ┌───────────┐ confirm ┌────────────┐      ┌─────────┐
//!   │ DRAFT ├────────▶│ READY ├────────▶│ TRIGGERED ├────────▶│(REGISTERED)├─────▶│ SETTLED │
//!   └──┬────┘         └──┬────┘         └─────┬─────┘         └────────────┘      └─────────┘
//!      │ cancel/expire   │ cancel/expire      │ reject
//!      ▼                 ▼                    ▼
//!   CANCELED / EXPIRED                    REJECTED
//! ```
//!
//! `Registered` is never persisted: confirmation passes through it and lands
//! on `Settled` inside the same transaction. Both events are still emitted,
//! in that order, so event consumers see the full path.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::{Address, CurrencyCode, Digest, DvpError, ExternalRegId, Result, SecurityId, TradeId};

/// Lifecycle state of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeState {
    Draft,
    Ready,
    Triggered,
    /// Transient. Emitted as an event, never stored.
    Registered,
    Settled,
    Rejected,
    Expired,
    Canceled,
}

impl TradeState {
    /// No further transition is possible from a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Settled | Self::Rejected | Self::Expired | Self::Canceled
        )
    }

    /// Edges of the transition graph. [`Trade::advance`] enforces them.
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Draft, Self::Ready | Self::Canceled | Self::Expired)
                | (Self::Ready, Self::Triggered | Self::Canceled | Self::Expired)
                | (Self::Triggered, Self::Registered | Self::Rejected)
                | (Self::Registered, Self::Settled)
        )
    }
}

impl fmt::Display for TradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "DRAFT"),
            Self::Ready => write!(f, "READY"),
            Self::Triggered => write!(f, "TRIGGERED"),
            Self::Registered => write!(f, "REGISTERED"),
            Self::Settled => write!(f, "SETTLED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Expired => write!(f, "EXPIRED"),
            Self::Canceled => write!(f, "CANCELED"),
        }
    }
}

/// Which side of the trade an attestation or vote belongs to.
///
/// The discriminants are the on-wire `party` flag of an attestation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Party {
    Seller = 0,
    Buyer = 1,
}

impl Party {
    #[must_use]
    pub fn flag(self) -> u8 {
        self as u8
    }

    /// Bit this party sets in [`CancelVotes`].
    #[must_use]
    pub fn vote_bit(self) -> u8 {
        match self {
            Self::Seller => 0b01,
            Self::Buyer => 0b10,
        }
    }
}

impl TryFrom<u8> for Party {
    type Error = u8;

    fn try_from(flag: u8) -> std::result::Result<Self, Self::Error> {
        match flag {
            0 => Ok(Self::Seller),
            1 => Ok(Self::Buyer),
            other => Err(other),
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seller => write!(f, "seller"),
            Self::Buyer => write!(f, "buyer"),
        }
    }
}

/// Two-bit cancellation ballot. Votes are never withdrawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CancelVotes(u8);

impl CancelVotes {
    const BOTH: u8 = 0b11;

    /// Record a vote. Returns `false` if this party had already voted.
    pub fn cast(&mut self, party: Party) -> bool {
        let bit = party.vote_bit();
        if self.0 & bit != 0 {
            return false;
        }
        self.0 |= bit;
        true
    }

    #[must_use]
    pub fn unanimous(self) -> bool {
        self.0 & Self::BOTH == Self::BOTH
    }

    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }
}

/// Economic terms supplied at proposal time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeTerms {
    pub seller: Address,
    pub buyer: Address,
    pub security_id: SecurityId,
    /// Quantity of the security, in its smallest unit.
    #[serde(with = "crate::wire::decimal")]
    pub qty: u128,
    pub currency_code: CurrencyCode,
    /// Cash leg, in the currency's smallest unit.
    #[serde(with = "crate::wire::decimal")]
    pub amount: u128,
    /// Unix seconds. Strictly in the future at proposal time.
    pub deadline: u64,
}

impl TradeTerms {
    /// Deterministic trade identifier.
    ///
    /// Format: `SHA-256("dvp:trade_id:v1:" || chain_id || registry || counter || seller || buyer
    /// || security_id || qty || currency || amount || deadline)`, integers big-endian.
    ///
    /// The counter is the registry's strictly increasing proposal sequence, so two
    /// proposals with identical terms still get distinct ids.
    #[must_use]
    pub fn derive_id(&self, chain_id: u64, registry: &Address, counter: u64) -> TradeId {
        let mut hasher = Sha256::new();
        hasher.update(b"dvp:trade_id:v1:");
        hasher.update(chain_id.to_be_bytes());
        hasher.update(registry.as_bytes());
        hasher.update(counter.to_be_bytes());
        hasher.update(self.seller.as_bytes());
        hasher.update(self.buyer.as_bytes());
        hasher.update(self.security_id.as_bytes());
        hasher.update(self.qty.to_be_bytes());
        hasher.update(self.currency_code.as_bytes());
        hasher.update(self.amount.to_be_bytes());
        hasher.update(self.deadline.to_be_bytes());
        TradeId(hasher.finalize().into())
    }

    /// Which side `who` is on, if any.
    #[must_use]
    pub fn party_of(&self, who: &Address) -> Option<Party> {
        if *who == self.seller {
            Some(Party::Seller)
        } else if *who == self.buyer {
            Some(Party::Buyer)
        } else {
            None
        }
    }
}

/// Evidence recorded when both attestations are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRecord {
    pub seller_proof_hash: Digest,
    pub buyer_proof_hash: Digest,
    pub seller_attestor: Address,
    pub buyer_attestor: Address,
}

/// A trade as stored by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub trade_id: TradeId,
    pub terms: TradeTerms,
    pub state: TradeState,
    /// Set once by `submitProofs`.
    pub proofs: Option<ProofRecord>,
    pub cancel_votes: CancelVotes,
    /// Immutable once set.
    pub external_reg_id: Option<ExternalRegId>,
    pub created_at: u64,
    pub ready_at: Option<u64>,
    pub triggered_at: Option<u64>,
    pub registered_at: Option<u64>,
}

impl Trade {
    /// A fresh `Draft` trade.
    #[must_use]
    pub fn new(trade_id: TradeId, terms: TradeTerms, created_at: u64) -> Self {
        Self {
            trade_id,
            terms,
            state: TradeState::Draft,
            proofs: None,
            cancel_votes: CancelVotes::default(),
            external_reg_id: None,
            created_at,
            ready_at: None,
            triggered_at: None,
            registered_at: None,
        }
    }

    /// `true` once `now` is strictly past the deadline.
    #[must_use]
    pub fn is_past_deadline(&self, now: u64) -> bool {
        now > self.terms.deadline
    }

    /// Move to `target` along one edge of the transition graph.
    ///
    /// # Errors
    /// `Internal` if `target` is not reachable from the current state. Callers
    /// check the user-facing preconditions first, so this only fires when a
    /// guard and the graph disagree.
    pub fn advance(&mut self, target: TradeState) -> Result<()> {
        if !self.state.can_transition_to(target) {
            return Err(DvpError::Internal(format!(
                "trade {}: illegal transition {} -> {target}",
                self.trade_id, self.state
            )));
        }
        self.state = target;
        Ok(())
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Trade[{}] {} {} x{} for {} {} ({} -> {})",
            self.trade_id.short(),
            self.state,
            self.terms.security_id.short(),
            self.terms.qty,
            self.terms.amount,
            self.terms.currency_code,
            self.terms.seller.short(),
            self.terms.buyer.short(),
        )
    }
}
