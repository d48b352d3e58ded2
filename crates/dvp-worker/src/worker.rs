//! Settlement worker: bridges `Triggered` events to the external registrar.
//!
//! ## Lifecycle
//!
//! 1. Subscribe to the live feed, then read the head. Anything committed in
//!    between shows up in both places and is skipped on the live side.
//! 2. Backfill `Triggered` events from `max(floor, head - lookback)` to the
//!    head, strictly one at a time.
//! 3. Dispatch live `Triggered` events concurrently, bounded by a semaphore.
//!    A lagged subscription rescans the gap from the log.
//!
//! ## Idempotency
//!
//! Every handler re-reads the trade state first and does nothing unless it is
//! still `TRIGGERED`. Two handlers racing on the same trade are settled by the
//! registry itself: it refuses a second `confirm_registration`/`reject`, and
//! the loser logs and skips.
//!
//! ## Isolation
//!
//! Each handler runs in its own task. An error or panic is logged against its
//! trade and never reaches the subscription loop.

use std::sync::Arc;

use dvp_types::{
    DvpError, ErrorKind, EventRecord, ExternalRegId, Result, TradeId, TradeState, WorkerConfig,
    constants, truncate_reason,
};
use tokio::{
    sync::{Semaphore, broadcast::error::RecvError, watch},
    task::{JoinHandle, JoinSet},
};

use crate::{
    ledger_client::SettlementLedger,
    registrar::{Registrar, RegistrationRequest},
};

/// What one handler invocation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Registrar accepted; trade is now `SETTLED`.
    Settled(ExternalRegId),
    /// Registrar failed; trade is now `REJECTED` with this reason.
    Rejected(String),
    /// Trade was not `TRIGGERED` (or another handler got there first).
    Skipped(Option<TradeState>),
}

#[derive(Clone)]
pub struct SettlementWorker {
    ledger: Arc<dyn SettlementLedger>,
    registrar: Arc<dyn Registrar>,
    config: WorkerConfig,
    permits: Arc<Semaphore>,
}

impl SettlementWorker {
    #[must_use]
    pub fn new(
        ledger: Arc<dyn SettlementLedger>,
        registrar: Arc<dyn Registrar>,
        config: WorkerConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_handlers.max(1)));
        Self {
            ledger,
            registrar,
            config,
            permits,
        }
    }

    #[must_use]
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Capped at what the registry stores, so the reported reason matches the
    /// recorded one.
    fn reason_cap(&self) -> usize {
        self.config
            .reject_reason_max_chars
            .min(constants::MAX_REJECT_REASON_CHARS)
    }

    /// Drive one triggered trade to a terminal state.
    ///
    /// # Errors
    /// Ledger failures only. Registrar failures become `reject`.
    pub async fn handle_triggered(&self, trade_id: TradeId) -> Result<HandleOutcome> {
        let state = self.ledger.state_of(&trade_id).await?;
        if state != Some(TradeState::Triggered) {
            tracing::debug!(trade_id = %trade_id, state = ?state, "Not TRIGGERED; skipping");
            return Ok(HandleOutcome::Skipped(state));
        }

        let trade = self.ledger.get_trade(&trade_id).await?;
        let request = RegistrationRequest::from_trade(&trade);

        let report = match self.registrar.register(&request).await {
            Ok(external_reg_id) => self
                .ledger
                .confirm_registration(trade_id, external_reg_id)
                .await
                .map(|()| HandleOutcome::Settled(external_reg_id)),
            Err(err) => {
                let reason = truncate_reason(&err.to_string(), self.reason_cap());
                tracing::warn!(trade_id = %trade_id, error = %err, "Registrar failed; rejecting");
                self.ledger
                    .reject(trade_id, &reason)
                    .await
                    .map(|()| HandleOutcome::Rejected(reason))
            }
        };

        match report {
            Ok(outcome) => {
                tracing::info!(trade_id = %trade_id, outcome = ?outcome, "Trade handled");
                Ok(outcome)
            }
            // Someone else reported first.
            Err(err) if err.kind() == ErrorKind::State => {
                let state = self.ledger.state_of(&trade_id).await?;
                tracing::info!(trade_id = %trade_id, state = ?state, "Lost report race; skipping");
                Ok(HandleOutcome::Skipped(state))
            }
            Err(err) => Err(err),
        }
    }

    /// Run the handler in its own task so a panic stays contained.
    async fn handle_isolated(&self, trade_id: TradeId) -> Option<HandleOutcome> {
        let worker = self.clone();
        let joined = tokio::spawn(async move { worker.handle_triggered(trade_id).await }).await;
        match joined {
            Ok(Ok(outcome)) => Some(outcome),
            Ok(Err(err)) => {
                let err = DvpError::HandlerFailed {
                    trade_id,
                    reason: err.to_string(),
                };
                tracing::error!(trade_id = %trade_id, error = %err, "Handler failed");
                None
            }
            Err(join_err) => {
                tracing::error!(trade_id = %trade_id, error = %join_err, "Handler panicked");
                None
            }
        }
    }

    /// Sequentially handle every `Triggered` event in blocks `from..=to`.
    ///
    /// Returns how many events were replayed.
    pub async fn backfill(&self, from: u64, to: u64) -> Result<usize> {
        self.replay(from, to, None).await
    }

    /// [`Self::backfill`], stopping between events once `shutdown` is set.
    async fn replay(
        &self,
        from: u64,
        to: u64,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<usize> {
        if from > to {
            return Ok(0);
        }
        let events = self.ledger.triggered_between(from, to).await?;
        tracing::info!(from, to, count = events.len(), "Backfilling triggered events");
        let mut handled = 0;
        for record in &events {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                tracing::info!(handled, remaining = events.len() - handled, "Shutdown during backfill");
                break;
            }
            if let Some(trade_id) = record.event.trade_id() {
                self.handle_isolated(trade_id).await;
            }
            handled += 1;
        }
        Ok(handled)
    }

    fn dispatch(&self, tasks: &mut JoinSet<()>, record: &EventRecord) {
        let Some(trade_id) = record.event.trade_id() else {
            return;
        };
        let worker = self.clone();
        let permits = Arc::clone(&self.permits);
        tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            worker.handle_isolated(trade_id).await;
        });
    }

    /// Backfill, then follow the live feed until `shutdown` flips to `true`
    /// or its sender is dropped. Waits for in-flight handlers before
    /// returning.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut feed = self.ledger.subscribe();
        let head = self.ledger.head().await?;
        let start = self.config.backfill_start(head);
        tracing::info!(head, start, "Settlement worker starting");
        self.replay(start, head, Some(&shutdown)).await?;
        if *shutdown.borrow() {
            tracing::info!("Settlement worker stopped");
            return Ok(());
        }

        // Live events at or below `covered` were already replayed.
        let mut covered = head;
        let mut last_seen = head;
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Shutdown requested");
                        break;
                    }
                }
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
                received = feed.recv() => match received {
                    Ok(record) => {
                        last_seen = last_seen.max(record.block);
                        if record.block > covered && record.event.is_triggered() {
                            self.dispatch(&mut tasks, &record);
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        let now = self.ledger.head().await?;
                        tracing::warn!(missed, from = last_seen + 1, to = now, "Event feed lagged; rescanning");
                        self.replay(last_seen + 1, now, Some(&shutdown)).await?;
                        if *shutdown.borrow() {
                            tracing::info!("Shutdown requested");
                            break;
                        }
                        covered = now;
                        last_seen = now;
                    }
                    Err(RecvError::Closed) => {
                        tracing::info!("Event feed closed");
                        break;
                    }
                }
            }
        }

        while tasks.join_next().await.is_some() {}
        tracing::info!("Settlement worker stopped");
        Ok(())
    }

    /// Spawn [`Self::run`] onto the runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run(shutdown))
    }
}

impl std::fmt::Debug for SettlementWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementWorker")
            .field("config", &self.config)
            .field("available_permits", &self.permits.available_permits())
            .finish_non_exhaustive()
    }
}
