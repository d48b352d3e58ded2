//! # Attestation Verifier
//!
//! Domain-separated hashing of attestations and secp256k1 signer recovery.
//!
//! ## Digest
//!
//! ```text
//! domainSeparator = keccak256(abi.encode(
//!     keccak256("EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)"),
//!     keccak256("DvpRegistry"), keccak256("1"), chainId, registryAddress))
//!
//! structHash = keccak256(abi.encode(ATTESTATION_TYPEHASH,
//!     tradeId, securityId, qty, currencyCode, amount, expiry, party, nonce))
//!
//! digest = keccak256(0x19 || 0x01 || domainSeparator || structHash)
//! ```
//!
//! ## Security Notes
//!
//! - **Cross-registry replay**: chain id and registry address are in the domain
//! - **Malleability (EIP-2)**: upper-half `s` values are rejected
//! - **Fail-closed**: malformed signatures produce a [`SignatureError`], never a panic

use dvp_types::{
    Address, Attestation, Digest, DvpError, Result, SignatureError, SignedAttestation, constants,
};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha3::{Digest as _, Keccak256};

const DOMAIN_TYPE: &[u8] =
    b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

const ATTESTATION_TYPE: &[u8] = b"Attestation(bytes32 tradeId,bytes32 securityId,uint256 qty,bytes3 currencyCode,uint256 amount,uint64 expiry,uint8 party,uint64 nonce)";

/// Length of an `r || s || v` signature.
pub const SIGNATURE_LEN: usize = 65;

#[must_use]
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

// =============================================================================
// ABI WORD ENCODING
// =============================================================================

fn word_u128(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn word_u64(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

fn word_address(address: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

/// `bytesN` values are left-aligned.
fn word_bytes3(bytes: &[u8; 3]) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[..3].copy_from_slice(bytes);
    word
}

fn hash_words(words: &[[u8; 32]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for word in words {
        hasher.update(word);
    }
    hasher.finalize().into()
}

// =============================================================================
// VERIFIER
// =============================================================================

/// Computes attestation digests for one registry domain and recovers signers.
#[derive(Debug, Clone)]
pub struct AttestationVerifier {
    domain_separator: [u8; 32],
}

impl AttestationVerifier {
    #[must_use]
    pub fn new(chain_id: u64, registry: &Address) -> Self {
        let domain_separator = hash_words(&[
            keccak256(DOMAIN_TYPE),
            keccak256(constants::DOMAIN_NAME.as_bytes()),
            keccak256(constants::DOMAIN_VERSION.as_bytes()),
            word_u64(chain_id),
            word_address(registry),
        ]);
        Self { domain_separator }
    }

    #[must_use]
    pub fn domain_separator(&self) -> [u8; 32] {
        self.domain_separator
    }

    /// Hash of the attestation's fields in canonical order.
    #[must_use]
    pub fn struct_hash(attestation: &Attestation) -> [u8; 32] {
        hash_words(&[
            keccak256(ATTESTATION_TYPE),
            attestation.trade_id.0,
            attestation.security_id.0,
            word_u128(attestation.qty),
            word_bytes3(attestation.currency_code.as_bytes()),
            word_u128(attestation.amount),
            word_u64(attestation.expiry),
            word_u64(u64::from(attestation.party)),
            word_u64(attestation.nonce),
        ])
    }

    /// The digest an attestor signs and the registry marks as consumed.
    #[must_use]
    pub fn digest(&self, attestation: &Attestation) -> Digest {
        let mut hasher = Keccak256::new();
        hasher.update([0x19, 0x01]);
        hasher.update(self.domain_separator);
        hasher.update(Self::struct_hash(attestation));
        Digest(hasher.finalize().into())
    }

    /// Digest plus recovered signer of a signed attestation.
    pub fn recover(
        &self,
        signed: &SignedAttestation,
    ) -> std::result::Result<(Digest, Address), SignatureError> {
        let digest = self.digest(&signed.attestation);
        let signer = recover_signer(&digest, &signed.signature)?;
        Ok((digest, signer))
    }
}

// =============================================================================
// RECOVERY
// =============================================================================

/// Recover the address that produced `signature` over `digest`.
///
/// Validations performed, each mapped to a [`SignatureError`]:
/// 1. Length is exactly 65 bytes
/// 2. `v` is 0, 1, 27 or 28
/// 3. `r` and `s` are in `[1, n-1]`
/// 4. `s` is in the lower half of the curve order
/// 5. Public key recovery succeeds
pub fn recover_signer(
    digest: &Digest,
    signature: &[u8],
) -> std::result::Result<Address, SignatureError> {
    if signature.len() != SIGNATURE_LEN {
        return Err(SignatureError::InvalidLength(signature.len()));
    }

    let v = signature[64];
    let recovery_byte = match v {
        0 | 1 => v,
        27 | 28 => v - 27,
        other => return Err(SignatureError::InvalidRecoveryId(other)),
    };
    let recovery_id =
        RecoveryId::from_byte(recovery_byte).ok_or(SignatureError::InvalidRecoveryId(v))?;

    let sig = Signature::from_slice(&signature[..64]).map_err(|_| SignatureError::InvalidScalar)?;
    if sig.normalize_s().is_some() {
        return Err(SignatureError::MalleableSignature);
    }

    let key = VerifyingKey::recover_from_prehash(digest.as_bytes(), &sig, recovery_id)
        .map_err(|_| SignatureError::RecoveryFailed)?;
    Ok(address_of(&key))
}

/// Keccak-256 of the uncompressed public key (without the `0x04` tag), last 20 bytes.
#[must_use]
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    Address(address)
}

// =============================================================================
// SIGNER
// =============================================================================

/// An attestor's signing key.
pub struct AttestationSigner {
    key: SigningKey,
    address: Address,
}

impl AttestationSigner {
    /// # Errors
    /// `InvalidInput` if the bytes are not a valid secp256k1 secret scalar.
    pub fn from_bytes(secret: &[u8; 32]) -> Result<Self> {
        let key = SigningKey::from_slice(secret).map_err(|_| DvpError::InvalidInput {
            reason: "invalid secp256k1 secret key".to_string(),
        })?;
        let address = address_of(key.verifying_key());
        Ok(Self { key, address })
    }

    /// Parse a hex secret key (optional `0x` prefix).
    pub fn from_hex(secret: &str) -> Result<Self> {
        let digits = secret.strip_prefix("0x").unwrap_or(secret);
        let bytes: [u8; 32] = hex::decode(digits)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| DvpError::InvalidInput {
                reason: "secret key must be 32 bytes of hex".to_string(),
            })?;
        Self::from_bytes(&bytes)
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// 65-byte `r || s || v` signature over `digest`, `v` in `{27, 28}`.
    pub fn sign_digest(&self, digest: &Digest) -> Result<Vec<u8>> {
        let (sig, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest.as_bytes())
            .map_err(|e| DvpError::Internal(format!("signing failed: {e}")))?;
        let mut out = Vec::with_capacity(SIGNATURE_LEN);
        out.extend_from_slice(&sig.to_bytes());
        out.push(recovery_id.to_byte() + 27);
        Ok(out)
    }

    /// Sign `attestation` for the verifier's domain.
    pub fn sign(
        &self,
        verifier: &AttestationVerifier,
        attestation: Attestation,
    ) -> Result<SignedAttestation> {
        let signature = self.sign_digest(&verifier.digest(&attestation))?;
        Ok(SignedAttestation {
            attestation,
            signature,
        })
    }
}

impl std::fmt::Debug for AttestationSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttestationSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
