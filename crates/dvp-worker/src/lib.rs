//! # dvp-worker
//!
//! **Settlement plane**: the off-ledger process that finishes what a
//! `trigger` starts.
//!
//! ## Architecture
//!
//! ```text
//! Ledger ──Triggered──▶ SettlementWorker ──POST /register──▶ Registrar
//!    ▲                          │
//!    └── confirm_registration ──┤  (success)
//!    └── reject(reason) ────────┘  (any failure)
//! ```
//!
//! - [`registrar`]: wire types, the [`Registrar`] seam and [`HttpRegistrar`]
//! - [`ledger_client`]: the [`SettlementLedger`] seam and [`LocalLedger`]
//! - [`worker`]: backfill, live dispatch, idempotent handling
//! - [`telemetry`]: tracing subscriber setup

pub mod ledger_client;
pub mod registrar;
pub mod telemetry;
pub mod worker;

pub use ledger_client::{LocalLedger, SettlementLedger};
pub use registrar::{
    HttpRegistrar, Registrar, RegistrarError, RegistrationRequest, RegistrationResponse,
};
pub use worker::{HandleOutcome, SettlementWorker};
