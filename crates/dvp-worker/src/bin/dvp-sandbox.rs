//! DvP sandbox
//!
//! Runs one trade end to end against a real registrar: an in-process ledger,
//! freshly generated parties and attestors, and a settlement worker calling
//! the registrar configured in the environment.
//!
//! Usage:
//!   DVP_REGISTRAR_URL=http://localhost:8080 DVP_REGISTRAR_TOKEN=dev dvp-sandbox
//!
//! Worker tuning comes from `DVP_*` variables (see `WorkerConfig::from_env`);
//! `DVP_LOG_JSON=true` switches to JSON logs.

use std::{sync::Arc, time::Duration};

use dvp_registry::{AttestationSigner, Ledger, SystemClock};
use dvp_types::{
    Address, Attestation, DvpError, Party, RegistrarConfig, RegistryConfig, Result, SecurityId,
    TradeTerms, WorkerConfig, constants,
};
use dvp_worker::{HttpRegistrar, LocalLedger, SettlementWorker, telemetry};
use tokio::sync::watch;

const DAY: u64 = 86_400;
const SETTLE_WAIT: Duration = Duration::from_secs(60);

fn random_address() -> Address {
    loop {
        let candidate = Address(rand::random());
        if !candidate.is_zero() {
            return candidate;
        }
    }
}

fn random_signer() -> Result<AttestationSigner> {
    AttestationSigner::from_bytes(&rand::random())
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_from_env()?;
    let worker_config = WorkerConfig::from_env()?;
    let registrar_config = RegistrarConfig::from_env()?;

    let admin = random_address();
    let oracle = random_address();
    let seller = random_address();
    let buyer = random_address();
    let seller_attestor = random_signer()?;
    let buyer_attestor = random_signer()?;

    let registry_config =
        RegistryConfig::new(constants::DEFAULT_CHAIN_ID, random_address(), admin)?;
    let ledger = Arc::new(Ledger::with_capacity(
        registry_config,
        Arc::new(SystemClock),
        worker_config.event_channel_capacity,
    ));
    ledger.add_attestor(admin, seller_attestor.address())?;
    ledger.add_attestor(admin, buyer_attestor.address())?;
    ledger.add_oracle(admin, oracle)?;

    let registrar = HttpRegistrar::new(registrar_config)?;
    let worker = SettlementWorker::new(
        Arc::new(LocalLedger::new(Arc::clone(&ledger), oracle)),
        Arc::new(registrar),
        worker_config,
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = worker.spawn(shutdown_rx);

    // Propose, attest, trigger.
    let now = ledger.now();
    let terms = TradeTerms {
        seller,
        buyer,
        security_id: SecurityId(rand::random()),
        qty: 100,
        currency_code: "EUR".parse()?,
        amount: 1_000 * 10u128.pow(18),
        deadline: now + 7 * DAY,
    };
    let trade_id = ledger.propose(seller, terms.clone())?;

    let attest = |party: Party| Attestation {
        trade_id,
        security_id: terms.security_id,
        qty: terms.qty,
        currency_code: terms.currency_code,
        amount: terms.amount,
        expiry: now + DAY,
        party: party.flag(),
        nonce: rand::random(),
    };
    let (seller_signed, buyer_signed) = ledger.view(|r| {
        Ok::<_, DvpError>((
            seller_attestor.sign(r.verifier(), attest(Party::Seller))?,
            buyer_attestor.sign(r.verifier(), attest(Party::Buyer))?,
        ))
    })??;
    ledger.submit_proofs(buyer, &seller_signed, &buyer_signed)?;
    ledger.trigger(seller, trade_id)?;
    tracing::info!(trade_id = %trade_id, "Trade triggered; waiting for the worker");

    let deadline = tokio::time::Instant::now() + SETTLE_WAIT;
    let outcome = loop {
        let trade = ledger.get_trade(&trade_id)?;
        if trade.state.is_terminal() {
            break Ok(trade);
        }
        if tokio::time::Instant::now() >= deadline {
            break Err(DvpError::Internal(format!(
                "trade {trade_id} still {} after {}s",
                trade.state,
                SETTLE_WAIT.as_secs()
            )));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    };

    let _ = shutdown_tx.send(true);
    handle
        .await
        .map_err(|e| DvpError::Internal(format!("worker task: {e}")))??;

    let trade = outcome?;
    match trade.external_reg_id {
        Some(reg_id) => tracing::info!(trade_id = %trade_id, external_reg_id = %reg_id, "Settled"),
        None => tracing::warn!(trade_id = %trade_id, state = %trade.state, "Not settled"),
    }
    println!("{}", serde_json::to_string_pretty(&trade)?);
    Ok(())
}
