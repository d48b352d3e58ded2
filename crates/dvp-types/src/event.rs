//! Registry events and the ledger's envelope around them.
//!
//! Events are the only interface the settlement worker consumes. Every
//! lifecycle event is keyed by `trade_id`; role events are keyed by account.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Address, CurrencyCode, Digest, ExternalRegId, SecurityId, TradeId};

/// Capabilities the administrative authority can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// May sign attestations accepted by `submitProofs`.
    Attestor,
    /// May report registrar outcomes (`confirmRegistration`, `reject`).
    Oracle,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attestor => write!(f, "ATTESTOR"),
            Self::Oracle => write!(f, "ORACLE"),
        }
    }
}

/// Everything the registry can emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum RegistryEvent {
    DealCreated {
        trade_id: TradeId,
        seller: Address,
        buyer: Address,
        security_id: SecurityId,
        #[serde(with = "crate::wire::decimal")]
        qty: u128,
        currency_code: CurrencyCode,
        #[serde(with = "crate::wire::decimal")]
        amount: u128,
        deadline: u64,
    },
    ProofsAccepted {
        trade_id: TradeId,
        seller_proof_hash: Digest,
        buyer_proof_hash: Digest,
        seller_attestor: Address,
        buyer_attestor: Address,
    },
    Triggered {
        trade_id: TradeId,
        triggered_at: u64,
    },
    Registered {
        trade_id: TradeId,
        external_reg_id: ExternalRegId,
    },
    Settled {
        trade_id: TradeId,
        settled_at: u64,
    },
    Rejected {
        trade_id: TradeId,
        reason: String,
    },
    Canceled {
        trade_id: TradeId,
    },
    Expired {
        trade_id: TradeId,
    },
    RoleGranted {
        role: Role,
        account: Address,
    },
    RoleRevoked {
        role: Role,
        account: Address,
    },
}

impl RegistryEvent {
    /// The trade this event concerns; `None` for role events.
    #[must_use]
    pub fn trade_id(&self) -> Option<TradeId> {
        match self {
            Self::DealCreated { trade_id, .. }
            | Self::ProofsAccepted { trade_id, .. }
            | Self::Triggered { trade_id, .. }
            | Self::Registered { trade_id, .. }
            | Self::Settled { trade_id, .. }
            | Self::Rejected { trade_id, .. }
            | Self::Canceled { trade_id }
            | Self::Expired { trade_id } => Some(*trade_id),
            Self::RoleGranted { .. } | Self::RoleRevoked { .. } => None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::DealCreated { .. } => "DealCreated",
            Self::ProofsAccepted { .. } => "ProofsAccepted",
            Self::Triggered { .. } => "Triggered",
            Self::Registered { .. } => "Registered",
            Self::Settled { .. } => "Settled",
            Self::Rejected { .. } => "Rejected",
            Self::Canceled { .. } => "Canceled",
            Self::Expired { .. } => "Expired",
            Self::RoleGranted { .. } => "RoleGranted",
            Self::RoleRevoked { .. } => "RoleRevoked",
        }
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        matches!(self, Self::Triggered { .. })
    }
}

/// An event as committed to the ledger log.
///
/// `(block, log_index)` is unique and totally orders the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub block: u64,
    pub log_index: u32,
    /// Timestamp of the transaction that emitted the event.
    pub timestamp: u64,
    pub event: RegistryEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_id_accessor() {
        let id = TradeId([4u8; 32]);
        assert_eq!(RegistryEvent::Canceled { trade_id: id }.trade_id(), Some(id));
        let role = RegistryEvent::RoleGranted {
            role: Role::Oracle,
            account: Address([1u8; 20]),
        };
        assert_eq!(role.trade_id(), None);
        assert_eq!(role.name(), "RoleGranted");
    }

    #[test]
    fn event_json_is_tagged() {
        let ev = RegistryEvent::Triggered {
            trade_id: TradeId([4u8; 32]),
            triggered_at: 42,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "Triggered");
        assert_eq!(json["triggeredAt"], 42);
        let back: RegistryEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, ev);
        assert!(back.is_triggered());
    }

    #[test]
    fn role_display() {
        assert_eq!(Role::Attestor.to_string(), "ATTESTOR");
        assert_eq!(Role::Oracle.to_string(), "ORACLE");
    }
}
