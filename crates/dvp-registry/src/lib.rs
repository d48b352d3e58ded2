//! # dvp-registry
//!
//! **Authority plane**: the single source of truth for DvP trade state.
//!
//! ## Architecture
//!
//! A trade moves through:
//! 1. `propose` by a party → `DRAFT`
//! 2. `submit_proofs` with one seller and one buyer attestation → `READY`
//! 3. `trigger` by a party → `TRIGGERED`
//! 4. the settlement worker calls the registrar, then the oracle reports
//!    `confirm_registration` → `SETTLED`, or `reject` → `REJECTED`
//!
//! `cancel` (both parties) and `expire` (anyone, after the deadline) close
//! trades that never reached `TRIGGERED`.
//!
//! ## Modules
//!
//! - [`access`]: admin-managed attestor and oracle sets
//! - [`verifier`]: typed-data digests and secp256k1 signer recovery
//! - [`store`]: trade table, consumed digests, proposal counter
//! - [`registry`]: the state machine
//! - [`ledger`]: block-serialized transactions and the event log

pub mod access;
pub mod ledger;
pub mod registry;
pub mod store;
pub mod verifier;

pub use access::AccessController;
pub use ledger::{Clock, Ledger, ManualClock, SystemClock, TxReceipt};
pub use registry::{TradeRegistry, TxContext};
pub use store::TradeStore;
pub use verifier::{AttestationSigner, AttestationVerifier};
