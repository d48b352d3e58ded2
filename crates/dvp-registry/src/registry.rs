//! Trade registry: the authoritative DvP state machine.
//!
//! Every operation runs inside one ledger transaction and follows the same
//! shape:
//! 1. Validate every precondition against current state (read-only)
//! 2. Apply all mutations
//! 3. Emit events into the transaction context
//!
//! Because nothing is written before step 2, an error at any check leaves
//! the registry exactly as it was. The ledger discards the context's events
//! on error, so a failed call is invisible to consumers too.

use dvp_types::{
    Address, Attestation, Digest, DvpError, ExternalRegId, ProofRecord, RegistryConfig,
    RegistryEvent, Result, Role, SignedAttestation, Trade, TradeId, TradeState, TradeTerms,
    constants, truncate_reason,
};

use crate::{
    access::AccessController,
    store::TradeStore,
    verifier::{AttestationVerifier, recover_signer},
};

/// Per-transaction environment: who is calling, the transaction timestamp,
/// and the events emitted so far.
#[derive(Debug)]
pub struct TxContext {
    caller: Address,
    now: u64,
    events: Vec<RegistryEvent>,
}

impl TxContext {
    #[must_use]
    pub fn new(caller: Address, now: u64) -> Self {
        Self {
            caller,
            now,
            events: Vec::new(),
        }
    }

    #[must_use]
    pub fn caller(&self) -> Address {
        self.caller
    }

    #[must_use]
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn emit(&mut self, event: RegistryEvent) {
        self.events.push(event);
    }

    #[must_use]
    pub fn events(&self) -> &[RegistryEvent] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<RegistryEvent> {
        self.events
    }
}

/// The DvP trade registry.
#[derive(Debug)]
pub struct TradeRegistry {
    config: RegistryConfig,
    access: AccessController,
    verifier: AttestationVerifier,
    store: TradeStore,
}

impl TradeRegistry {
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            access: AccessController::new(config.admin),
            verifier: AttestationVerifier::new(config.chain_id, &config.registry_address),
            store: TradeStore::new(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    #[must_use]
    pub fn verifier(&self) -> &AttestationVerifier {
        &self.verifier
    }

    #[must_use]
    pub fn access(&self) -> &AccessController {
        &self.access
    }

    #[must_use]
    pub fn store(&self) -> &TradeStore {
        &self.store
    }

    // =================================================================
    // Reads
    // =================================================================

    /// Current state, or `None` for an unknown id.
    #[must_use]
    pub fn state_of(&self, trade_id: &TradeId) -> Option<TradeState> {
        self.store.get(trade_id).map(|t| t.state)
    }

    /// # Errors
    /// [`DvpError::TradeNotFound`] if unknown.
    pub fn get_trade(&self, trade_id: &TradeId) -> Result<Trade> {
        self.store.require(trade_id).cloned()
    }

    #[must_use]
    pub fn attestation_digest(&self, attestation: &Attestation) -> Digest {
        self.verifier.digest(attestation)
    }

    #[must_use]
    pub fn is_attestor(&self, who: &Address) -> bool {
        self.access.has_role(Role::Attestor, who)
    }

    #[must_use]
    pub fn is_oracle(&self, who: &Address) -> bool {
        self.access.has_role(Role::Oracle, who)
    }

    #[must_use]
    pub fn admin(&self) -> Address {
        self.access.admin()
    }

    // =================================================================
    // Admin
    // =================================================================

    pub fn add_attestor(&mut self, tx: &mut TxContext, account: Address) -> Result<()> {
        self.grant(tx, Role::Attestor, account)
    }

    pub fn remove_attestor(&mut self, tx: &mut TxContext, account: Address) -> Result<()> {
        self.revoke(tx, Role::Attestor, account)
    }

    pub fn add_oracle(&mut self, tx: &mut TxContext, account: Address) -> Result<()> {
        self.grant(tx, Role::Oracle, account)
    }

    pub fn remove_oracle(&mut self, tx: &mut TxContext, account: Address) -> Result<()> {
        self.revoke(tx, Role::Oracle, account)
    }

    fn grant(&mut self, tx: &mut TxContext, role: Role, account: Address) -> Result<()> {
        if self.access.grant(&tx.caller, role, account)? {
            tracing::info!(%role, %account, "Role granted");
            tx.emit(RegistryEvent::RoleGranted { role, account });
        }
        Ok(())
    }

    fn revoke(&mut self, tx: &mut TxContext, role: Role, account: Address) -> Result<()> {
        if self.access.revoke(&tx.caller, role, &account)? {
            tracing::info!(%role, %account, "Role revoked");
            tx.emit(RegistryEvent::RoleRevoked { role, account });
        }
        Ok(())
    }

    // =================================================================
    // Lifecycle
    // =================================================================

    /// Create a `Draft` trade. The caller must be one of the two parties.
    ///
    /// # Errors
    /// - `NotParty` if the caller is neither seller nor buyer
    /// - `InvalidInput` for zero or identical party addresses
    /// - `NonPositive` for a zero `qty` or `amount`
    /// - `DeadlineNotInFuture` unless `deadline > now`
    pub fn propose(&mut self, tx: &mut TxContext, terms: TradeTerms) -> Result<TradeId> {
        if terms.party_of(&tx.caller).is_none() {
            return Err(DvpError::NotParty { caller: tx.caller });
        }
        if terms.seller.is_zero() || terms.buyer.is_zero() {
            return Err(DvpError::InvalidInput {
                reason: "seller and buyer must be non-zero".to_string(),
            });
        }
        if terms.seller == terms.buyer {
            return Err(DvpError::InvalidInput {
                reason: "seller and buyer must differ".to_string(),
            });
        }
        if terms.qty == 0 {
            return Err(DvpError::NonPositive { field: "qty" });
        }
        if terms.amount == 0 {
            return Err(DvpError::NonPositive { field: "amount" });
        }
        if terms.deadline <= tx.now {
            return Err(DvpError::DeadlineNotInFuture {
                deadline: terms.deadline,
                now: tx.now,
            });
        }

        let sequence = self.store.next_sequence();
        let trade_id = terms.derive_id(
            self.config.chain_id,
            &self.config.registry_address,
            sequence,
        );
        let event = RegistryEvent::DealCreated {
            trade_id,
            seller: terms.seller,
            buyer: terms.buyer,
            security_id: terms.security_id,
            qty: terms.qty,
            currency_code: terms.currency_code,
            amount: terms.amount,
            deadline: terms.deadline,
        };
        self.store.insert(Trade::new(trade_id, terms, tx.now))?;

        tracing::info!(trade_id = %trade_id, sequence, "Deal created");
        tx.emit(event);
        Ok(trade_id)
    }

    /// Accept a seller/buyer attestation pair and move the trade to `Ready`.
    ///
    /// All-or-nothing: a valid attestation paired with an invalid counterpart
    /// is rejected as a whole, and neither digest is consumed.
    ///
    /// # Errors
    /// - `AttestationMismatch` if the pair disagrees with itself or the trade
    /// - `Replay` if either digest was consumed before
    /// - `TradeNotFound`, `InvalidState`, `DeadlinePassed`
    /// - `AttestationExpired` if either `expiry < now`
    /// - `InvalidSignature` if signer recovery fails
    /// - `MissingRole` if a recovered signer is not currently an attestor
    pub fn submit_proofs(
        &mut self,
        tx: &mut TxContext,
        seller: &SignedAttestation,
        buyer: &SignedAttestation,
    ) -> Result<()> {
        let (sa, ba) = (&seller.attestation, &buyer.attestation);

        // 1. Both attestations name the same trade
        if sa.trade_id != ba.trade_id {
            return Err(DvpError::AttestationMismatch {
                reason: format!(
                    "seller attests {} but buyer attests {}",
                    sa.trade_id, ba.trade_id
                ),
            });
        }
        let trade_id = sa.trade_id;

        // 2. Neither half was accepted before. Checked ahead of trade state
        //    so a reused attestation reports as a replay even once the trade
        //    has moved on.
        let seller_digest = self.verifier.digest(sa);
        let buyer_digest = self.verifier.digest(ba);
        for digest in [seller_digest, buyer_digest] {
            if self.store.is_consumed(&digest) {
                return Err(DvpError::Replay(digest));
            }
        }

        let trade = self.store.require(&trade_id)?;

        // 3. Trade is open for proofs
        if trade.state != TradeState::Draft {
            return Err(DvpError::InvalidState {
                trade_id,
                expected: "DRAFT",
                actual: trade.state,
            });
        }
        if trade.is_past_deadline(tx.now) {
            return Err(DvpError::DeadlinePassed {
                trade_id,
                deadline: trade.terms.deadline,
            });
        }

        // 4. Party flags are exactly seller=0 / buyer=1
        if sa.party != 0 || ba.party != 1 {
            return Err(DvpError::AttestationMismatch {
                reason: format!(
                    "party flags must be seller=0/buyer=1, got {}/{}",
                    sa.party, ba.party
                ),
            });
        }

        // 5. Economic terms
        for (label, att) in [("seller", sa), ("buyer", ba)] {
            if att.security_id != trade.terms.security_id {
                return Err(DvpError::AttestationMismatch {
                    reason: format!("{label} security id does not match trade"),
                });
            }
            if att.currency_code != trade.terms.currency_code {
                return Err(DvpError::AttestationMismatch {
                    reason: format!("{label} currency does not match trade"),
                });
            }
        }
        if sa.qty < trade.terms.qty {
            return Err(DvpError::AttestationMismatch {
                reason: format!(
                    "seller attests qty {} below required {}",
                    sa.qty, trade.terms.qty
                ),
            });
        }
        if ba.amount < trade.terms.amount {
            return Err(DvpError::AttestationMismatch {
                reason: format!(
                    "buyer attests amount {} below required {}",
                    ba.amount, trade.terms.amount
                ),
            });
        }

        // 6. Freshness
        for (label, att) in [("seller", sa), ("buyer", ba)] {
            if att.is_expired(tx.now) {
                return Err(DvpError::AttestationExpired {
                    party: label,
                    expiry: att.expiry,
                });
            }
        }

        // 7. Signatures, and the attestor role as of now
        let seller_attestor = recover_signer(&seller_digest, &seller.signature).map_err(
            |source| DvpError::InvalidSignature {
                party: "seller",
                source,
            },
        )?;
        let buyer_attestor = recover_signer(&buyer_digest, &buyer.signature).map_err(|source| {
            DvpError::InvalidSignature {
                party: "buyer",
                source,
            }
        })?;
        self.access.require_role(Role::Attestor, &seller_attestor)?;
        self.access.require_role(Role::Attestor, &buyer_attestor)?;

        // ---- all checks passed; mutate ----
        self.store.consume(seller_digest);
        self.store.consume(buyer_digest);
        let trade = self.store.require_mut(&trade_id)?;
        trade.advance(TradeState::Ready)?;
        trade.proofs = Some(ProofRecord {
            seller_proof_hash: seller_digest,
            buyer_proof_hash: buyer_digest,
            seller_attestor,
            buyer_attestor,
        });
        trade.ready_at = Some(tx.now);

        tracing::info!(
            trade_id = %trade_id,
            seller_attestor = %seller_attestor,
            buyer_attestor = %buyer_attestor,
            "Proofs accepted"
        );
        tx.emit(RegistryEvent::ProofsAccepted {
            trade_id,
            seller_proof_hash: seller_digest,
            buyer_proof_hash: buyer_digest,
            seller_attestor,
            buyer_attestor,
        });
        Ok(())
    }

    /// Hand the trade to the settlement worker. Party only, from `Ready`.
    pub fn trigger(&mut self, tx: &mut TxContext, trade_id: TradeId) -> Result<()> {
        let trade = self.store.require(&trade_id)?;
        if trade.terms.party_of(&tx.caller).is_none() {
            return Err(DvpError::NotParty { caller: tx.caller });
        }
        Self::require_state(trade, TradeState::Ready, "READY")?;

        let trade = self.store.require_mut(&trade_id)?;
        trade.advance(TradeState::Triggered)?;
        trade.triggered_at = Some(tx.now);

        tracing::info!(trade_id = %trade_id, "Trade triggered");
        tx.emit(RegistryEvent::Triggered {
            trade_id,
            triggered_at: tx.now,
        });
        Ok(())
    }

    /// Record the registrar's identifier and settle. Oracle only, from `Triggered`.
    ///
    /// Passes through `Registered` without persisting it: emits `Registered`
    /// then `Settled`, stores `Settled`.
    pub fn confirm_registration(
        &mut self,
        tx: &mut TxContext,
        trade_id: TradeId,
        external_reg_id: ExternalRegId,
    ) -> Result<()> {
        self.access.require_role(Role::Oracle, &tx.caller)?;
        let trade = self.store.require(&trade_id)?;
        Self::require_state(trade, TradeState::Triggered, "TRIGGERED")?;
        if trade.external_reg_id.is_some() {
            return Err(DvpError::Internal(format!(
                "trade {trade_id} already carries an external registration id"
            )));
        }

        let trade = self.store.require_mut(&trade_id)?;
        trade.advance(TradeState::Registered)?;
        trade.advance(TradeState::Settled)?;
        trade.external_reg_id = Some(external_reg_id);
        trade.registered_at = Some(tx.now);
        tx.emit(RegistryEvent::Registered {
            trade_id,
            external_reg_id,
        });
        tx.emit(RegistryEvent::Settled {
            trade_id,
            settled_at: tx.now,
        });

        tracing::info!(trade_id = %trade_id, external_reg_id = %external_reg_id, "Trade settled");
        Ok(())
    }

    /// Record a registrar failure. Oracle only, from `Triggered`.
    pub fn reject(&mut self, tx: &mut TxContext, trade_id: TradeId, reason: &str) -> Result<()> {
        self.access.require_role(Role::Oracle, &tx.caller)?;
        let trade = self.store.require(&trade_id)?;
        Self::require_state(trade, TradeState::Triggered, "TRIGGERED")?;

        let reason = truncate_reason(reason, constants::MAX_REJECT_REASON_CHARS);
        self.store.require_mut(&trade_id)?.advance(TradeState::Rejected)?;

        tracing::warn!(trade_id = %trade_id, reason = %reason, "Trade rejected");
        tx.emit(RegistryEvent::Rejected { trade_id, reason });
        Ok(())
    }

    /// Cast the caller's cancellation vote. Cancels once both parties voted.
    ///
    /// A party voting again is accepted and changes nothing.
    pub fn cancel(&mut self, tx: &mut TxContext, trade_id: TradeId) -> Result<()> {
        let trade = self.store.require(&trade_id)?;
        let party = trade
            .terms
            .party_of(&tx.caller)
            .ok_or(DvpError::NotParty { caller: tx.caller })?;
        Self::require_open(trade, "DRAFT or READY")?;

        let trade = self.store.require_mut(&trade_id)?;
        let mut votes = trade.cancel_votes;
        if !votes.cast(party) {
            tracing::debug!(trade_id = %trade_id, %party, "Repeat cancel vote ignored");
            return Ok(());
        }
        if votes.unanimous() {
            trade.advance(TradeState::Canceled)?;
            trade.cancel_votes = votes;
            tracing::info!(trade_id = %trade_id, "Trade canceled");
            tx.emit(RegistryEvent::Canceled { trade_id });
        } else {
            trade.cancel_votes = votes;
            tracing::info!(trade_id = %trade_id, %party, "Cancel vote recorded");
        }
        Ok(())
    }

    /// Expire an open trade whose deadline has passed. Anyone may call.
    pub fn expire(&mut self, tx: &mut TxContext, trade_id: TradeId) -> Result<()> {
        let trade = self.store.require(&trade_id)?;
        Self::require_open(trade, "DRAFT or READY")?;
        if !trade.is_past_deadline(tx.now) {
            return Err(DvpError::DeadlineNotReached {
                trade_id,
                deadline: trade.terms.deadline,
            });
        }

        self.store.require_mut(&trade_id)?.advance(TradeState::Expired)?;
        tracing::info!(trade_id = %trade_id, "Trade expired");
        tx.emit(RegistryEvent::Expired { trade_id });
        Ok(())
    }

    fn require_state(trade: &Trade, expected: TradeState, label: &'static str) -> Result<()> {
        if trade.state == expected {
            Ok(())
        } else {
            Err(DvpError::InvalidState {
                trade_id: trade.trade_id,
                expected: label,
                actual: trade.state,
            })
        }
    }

    fn require_open(trade: &Trade, label: &'static str) -> Result<()> {
        if matches!(trade.state, TradeState::Draft | TradeState::Ready) {
            Ok(())
        } else {
            Err(DvpError::InvalidState {
                trade_id: trade.trade_id,
                expected: label,
                actual: trade.state,
            })
        }
    }
}
