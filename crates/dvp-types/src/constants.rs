//! System-wide constants for DvP settlement.

/// EIP-712 domain name mixed into every attestation digest.
pub const DOMAIN_NAME: &str = "DvpRegistry";

/// EIP-712 domain version.
pub const DOMAIN_VERSION: &str = "1";

/// Maximum characters of a rejection reason stored in the `Rejected` event.
pub const MAX_REJECT_REASON_CHARS: usize = 200;

/// Default number of blocks the worker replays on start.
pub const DEFAULT_MAX_LOOKBACK_BLOCKS: u64 = 50_000;

/// Default number of live handlers running at once.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 8;

/// Default capacity of the ledger's live event broadcast channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Default registrar request timeout in milliseconds.
pub const DEFAULT_REGISTRAR_TIMEOUT_MS: u64 = 10_000;

/// Default registrar connect timeout in milliseconds.
pub const DEFAULT_REGISTRAR_CONNECT_TIMEOUT_MS: u64 = 2_000;

/// Default chain id for local sandboxes.
pub const DEFAULT_CHAIN_ID: u64 = 31_337;
