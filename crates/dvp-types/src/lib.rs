//! # dvp-types
//!
//! Shared types, errors, and configuration for **DvP settlement**.
//!
//! This crate is the leaf dependency of the workspace: every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`Address`], [`TradeId`], [`SecurityId`], [`ExternalRegId`], [`Digest`], [`CurrencyCode`]
//! - **Trade model**: [`Trade`], [`TradeTerms`], [`TradeState`], [`Party`], [`CancelVotes`], [`ProofRecord`]
//! - **Attestation model**: [`Attestation`], [`SignedAttestation`]
//! - **Event model**: [`RegistryEvent`], [`EventRecord`], [`Role`]
//! - **Configuration**: [`RegistryConfig`], [`WorkerConfig`], [`RegistrarConfig`]
//! - **Errors**: [`DvpError`] with `DVP_ERR_` prefix codes, [`ErrorKind`], [`SignatureError`]
//! - **Helpers**: [`truncate_reason`]
//! - **Constants**: system-wide limits and defaults

pub mod attestation;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod ids;
pub mod reason;
pub mod trade;
pub mod wire;

// Re-export all primary types at crate root for ergonomic imports:
//   use dvp_types::{Trade, TradeState, Attestation, ...};

pub use attestation::*;
pub use config::*;
pub use error::*;
pub use event::*;
pub use ids::*;
pub use reason::truncate_reason;
pub use trade::*;

// Constants are accessed via `dvp_types::constants::FOO`
// (not re-exported to avoid name collisions).
