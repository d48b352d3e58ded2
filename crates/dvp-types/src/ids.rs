//! Identifiers used throughout the DvP registry.
//!
//! Everything here is a fixed-width byte string rendered as `0x`-prefixed
//! lowercase hex, both in `Display` and on the serde wire. Parsing accepts
//! the prefix optionally and is case-insensitive.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::DvpError;

/// Decode a hex string (optional `0x` prefix) into exactly `N` bytes.
fn decode_fixed<const N: usize>(what: &str, s: &str) -> Result<[u8; N], DvpError> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    let bytes = hex::decode(digits).map_err(|e| DvpError::InvalidInput {
        reason: format!("{what}: invalid hex: {e}"),
    })?;
    bytes.try_into().map_err(|b: Vec<u8>| DvpError::InvalidInput {
        reason: format!("{what}: expected {N} bytes, got {}", b.len()),
    })
}

macro_rules! hex_id {
    ($(#[$meta:meta])* $name:ident, $len:literal, $what:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Default)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// The all-zero value.
            pub const ZERO: Self = Self([0u8; $len]);

            #[must_use]
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            #[must_use]
            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; $len]
            }

            /// First four bytes as hex, for compact log lines.
            #[must_use]
            pub fn short(&self) -> String {
                hex::encode(&self.0[..4])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = DvpError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_fixed::<$len>($what, s).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

hex_id!(
    /// A 20-byte account identity: the last 20 bytes of the Keccak-256 hash
    /// of an uncompressed secp256k1 public key.
    Address,
    20,
    "address"
);

#[cfg(any(test, feature = "test-helpers"))]
impl Address {
    /// A random non-zero address. **Test use only.**
    #[must_use]
    pub fn random() -> Self {
        loop {
            let candidate = Self(rand::random::<[u8; 20]>());
            if !candidate.is_zero() {
                return candidate;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 32-byte identifiers
// ---------------------------------------------------------------------------

hex_id!(
    /// Content-derived trade identifier. See [`crate::TradeTerms::derive_id`].
    TradeId,
    32,
    "trade id"
);

hex_id!(
    /// Opaque identifier of the security being delivered (e.g. hashed ISIN).
    SecurityId,
    32,
    "security id"
);

hex_id!(
    /// Identifier issued by the external registrar once a transfer is recorded.
    ExternalRegId,
    32,
    "external registration id"
);

hex_id!(
    /// Domain-separated attestation digest; the unit of replay protection.
    Digest,
    32,
    "digest"
);

// ---------------------------------------------------------------------------
// CurrencyCode
// ---------------------------------------------------------------------------

/// Three upper-case ASCII letters, ISO-4217 style (e.g. `EUR`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct CurrencyCode([u8; 3]);

impl CurrencyCode {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 3] {
        &self.0
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        // Construction guarantees ASCII.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl FromStr for CurrencyCode {
    type Err = DvpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 3] = s
            .as_bytes()
            .try_into()
            .map_err(|_| DvpError::InvalidInput {
                reason: format!("currency code must be 3 letters, got {s:?}"),
            })?;
        if !bytes.iter().all(u8::is_ascii_uppercase) {
            return Err(DvpError::InvalidInput {
                reason: format!("currency code must be upper-case ASCII, got {s:?}"),
            });
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CurrencyCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CurrencyCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
