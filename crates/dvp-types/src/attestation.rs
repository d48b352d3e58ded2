//! Attestation model: the signed, single-use claim an attestor makes about
//! one side of a trade.
//!
//! An attestation is only meaningful together with the registry's domain
//! (chain id + registry address). The digest that is signed, and that goes
//! into the replay set, is computed by the registry's verifier.

use serde::{Deserialize, Serialize};

use crate::{CurrencyCode, Party, SecurityId, TradeId};

/// The claim itself. Field order here is the canonical hashing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attestation {
    pub trade_id: TradeId,
    pub security_id: SecurityId,
    /// Quantity the seller's attestor vouches is available for delivery.
    #[serde(with = "crate::wire::decimal")]
    pub qty: u128,
    pub currency_code: CurrencyCode,
    /// Cash the buyer's attestor vouches is available for payment.
    #[serde(with = "crate::wire::decimal")]
    pub amount: u128,
    /// Unix seconds. Valid while `expiry >= now`.
    pub expiry: u64,
    /// Raw party flag: `0` seller, `1` buyer. Kept raw because it is signed data.
    pub party: u8,
    pub nonce: u64,
}

impl Attestation {
    /// The party flag decoded, if it is one of the two valid values.
    #[must_use]
    pub fn party(&self) -> Option<Party> {
        Party::try_from(self.party).ok()
    }

    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expiry < now
    }
}

/// An attestation together with its 65-byte `r || s || v` signature.
///
/// The signature is held as raw bytes so malformed input can reach the
/// verifier and be rejected there instead of at deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedAttestation {
    pub attestation: Attestation,
    #[serde(with = "crate::wire::hex_bytes")]
    pub signature: Vec<u8>,
}
