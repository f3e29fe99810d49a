//! Module state and transaction execution
//!
//! [`TrustModule`] owns the store, the parameters, the collaborator handles
//! and the event queue. Each component adds its handlers in its own file as
//! an `impl` block on the module; this file holds what they share:
//! typed load/save, id counters, and the all-or-nothing transaction wrapper.
//!
//! ```text
//! deliver(msg) ──▶ begin ──▶ apply ──┬─ Ok  ──▶ commit, publish events
//!                                    ├─ Err ──▶ rollback, drop events
//!                                    └─ panic ─▶ rollback, drop events, resume unwind
//! ```

use std::panic::{self, AssertUnwindSafe};

use persistence::{codec, determinism, KvStore, TxStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, info, warn};
use trust_types::ids::Address;

use crate::capability::Capabilities;
use crate::config::Params;
use crate::context::BlockContext;
use crate::errors::{OversightError, TrustError};
use crate::events::{ParamsUpdated, TrustEvent};
use crate::keys::{self, Counter};
use crate::msg::Msg;
use crate::security;

pub struct TrustModule<S: KvStore> {
    pub(crate) store: TxStore<S>,
    pub(crate) params: Params,
    pub(crate) caps: Capabilities,
    /// Committed, awaiting `drain_events`
    events: Vec<TrustEvent>,
    /// Emitted by the open transaction
    pending: Vec<TrustEvent>,
}

impl<S: KvStore> TrustModule<S> {
    /// Create a module over `store`.
    ///
    /// Parameters already persisted in the store win over `params`, so a
    /// restarted node keeps the governance-updated values.
    pub fn new(store: S, params: Params, caps: Capabilities) -> Result<Self, TrustError> {
        let mut module = Self {
            store: TxStore::new(store),
            params,
            caps,
            events: Vec::new(),
            pending: Vec::new(),
        };
        if let Some(stored) = module.load::<Params>(&keys::params())? {
            module.params = stored;
        }
        module.params.validate()?;
        let params = module.params.clone();
        module.save(keys::params(), &params)?;
        info!(
            custody = %module.params.custody_account,
            denom = %module.params.native_denom,
            capabilities = ?module.caps,
            "TrustModule initialized"
        );
        Ok(module)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Collaborator handles, for hosts that wire them after bootstrap.
    pub fn capabilities_mut(&mut self) -> &mut Capabilities {
        &mut self.caps
    }

    /// Committed store contents, for hashing and inspection.
    pub fn store(&self) -> &S {
        self.store.base()
    }

    /// SHA-256 over the committed store.
    pub fn state_hash(&self) -> String {
        determinism::state_hash(self.store.base())
    }

    pub fn events(&self) -> &[TrustEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<TrustEvent> {
        std::mem::take(&mut self.events)
    }

    // ───────────────────────── Transactions ─────────────────────────

    /// Apply one inbound operation atomically.
    ///
    /// Returns the events the operation emitted; they are also queued for
    /// `drain_events`. On error nothing is written and nothing is emitted.
    pub fn deliver(&mut self, ctx: &BlockContext, msg: Msg) -> Result<Vec<TrustEvent>, TrustError> {
        let msg_type = msg.type_name();
        let first = self.events.len();
        match self.atomic(|module| module.apply(ctx, msg)) {
            Ok(()) => Ok(self.events[first..].to_vec()),
            Err(err) => {
                warn!(
                    msg_type,
                    height = ctx.height,
                    code = err.code(),
                    kind = ?err.kind(),
                    error = %err,
                    "Transaction rejected"
                );
                Err(err)
            }
        }
    }

    /// Run `f` inside a store transaction.
    ///
    /// A panic in `f` rolls the overlay back before it propagates, so a host
    /// that catches it can keep delivering. An overlay left open by an
    /// earlier unwind is discarded first.
    pub(crate) fn atomic<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, TrustError>,
    ) -> Result<T, TrustError> {
        if self.store.in_transaction() {
            let discarded = self.store.rollback()?;
            self.pending.clear();
            warn!(discarded, "Discarded stale transaction overlay");
        }
        self.store.begin()?;
        match panic::catch_unwind(AssertUnwindSafe(|| f(self))) {
            Ok(Ok(value)) => {
                self.store.commit()?;
                self.events.append(&mut self.pending);
                Ok(value)
            }
            Ok(Err(err)) => {
                self.store.rollback()?;
                self.pending.clear();
                Err(err)
            }
            Err(payload) => {
                let discarded = self.store.rollback().unwrap_or_default();
                self.pending.clear();
                error!(discarded, "Transaction panicked, overlay rolled back");
                panic::resume_unwind(payload)
            }
        }
    }

    fn apply(&mut self, ctx: &BlockContext, msg: Msg) -> Result<(), TrustError> {
        match msg {
            Msg::CreateEscrow {
                sender,
                recipient,
                moderator,
                assets,
                terms,
                expires_at,
            } => self
                .create_escrow(ctx, sender, recipient, moderator, assets, terms, expires_at)
                .map(drop),
            Msg::FundEscrow { funder, escrow_id } => self.fund_escrow(ctx, &funder, escrow_id),
            Msg::ReleaseEscrow { caller, escrow_id } => {
                self.release_escrow(ctx, &caller, escrow_id)
            }
            Msg::RefundEscrow { caller, escrow_id } => self.refund_escrow(ctx, &caller, escrow_id),
            Msg::CancelEscrow { caller, escrow_id } => self.cancel_escrow(ctx, &caller, escrow_id),
            Msg::ConfirmEscrow { party, escrow_id } => {
                self.confirm_escrow(ctx, &party, escrow_id)
            }
            Msg::OpenDispute {
                initiator,
                escrow_id,
                reason,
            } => self.open_dispute(ctx, initiator, escrow_id, reason).map(drop),
            Msg::SubmitEvidence {
                submitter,
                dispute_id,
                content_hash,
                description,
            } => self.submit_evidence(ctx, submitter, dispute_id, content_hash, description),
            Msg::VoteOnDispute {
                moderator,
                dispute_id,
                resolution,
                reason,
            } => self.vote_on_dispute(ctx, moderator, dispute_id, resolution, reason),
            Msg::AppealDispute {
                appellant,
                dispute_id,
                reason,
            } => self.appeal_dispute(ctx, appellant, dispute_id, reason),
            Msg::RegisterModerator { address, stake } => {
                self.register_moderator(ctx, address, stake)
            }
            Msg::IncreaseModeratorStake { address, amount } => {
                self.increase_moderator_stake(&address, amount)
            }
            Msg::RequestUnstake { address, amount } => self.request_unstake(ctx, &address, amount),
            Msg::CompleteUnstake { address } => self.complete_unstake(ctx, &address),
            Msg::CancelUnstake { address } => self.cancel_unstake(&address),
            Msg::SlashModerator {
                validator,
                moderator,
                fraction,
                reason,
            } => self.slash_moderator(ctx, validator, moderator, fraction, reason),
            Msg::BlacklistModerator {
                validator,
                moderator,
                reason,
                permanent,
                duration_secs,
            } => self.blacklist_moderator(ctx, validator, moderator, reason, permanent, duration_secs),
            Msg::UnblacklistModerator {
                validator,
                moderator,
                reason,
            } => self.unblacklist_moderator(ctx, validator, moderator, reason),
            Msg::SubmitFraudReport {
                reporter,
                company_id,
                description,
                evidence_hash,
            } => self
                .submit_fraud_report(ctx, reporter, company_id, description, evidence_hash)
                .map(drop),
            Msg::VoteOnInvestigation {
                voter,
                investigation_id,
                approve,
                reason,
            } => self.vote_on_investigation(ctx, voter, investigation_id, approve, reason),
            Msg::CancelInvestigation {
                admin,
                investigation_id,
                reason,
            } => self.cancel_investigation(ctx, &admin, investigation_id, reason),
            Msg::UpdateParams { admin, params } => self.update_params(&admin, *params),
        }
    }

    fn update_params(&mut self, admin: &Address, params: Params) -> Result<(), TrustError> {
        let required = self.params.admin_tier;
        security::require_tier(&self.caps, admin, required, |actual| {
            OversightError::InsufficientTier {
                validator: admin.to_string(),
                required,
                actual,
            }
        })?;
        params.validate()?;
        self.save(keys::params(), &params)?;
        self.params = params;
        info!(admin = %admin, "Parameters updated");
        self.emit(TrustEvent::ParamsUpdated(ParamsUpdated {
            admin: admin.clone(),
        }));
        Ok(())
    }

    // ───────────────────────── Store access ─────────────────────────

    pub(crate) fn load<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, TrustError> {
        match self.store.get(key) {
            Some(bytes) => Ok(Some(codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn save<T: Serialize>(&mut self, key: Vec<u8>, value: &T) -> Result<(), TrustError> {
        let bytes = codec::encode(value)?;
        self.store.set(key, bytes);
        Ok(())
    }

    pub(crate) fn remove(&mut self, key: &[u8]) {
        self.store.delete(key);
    }

    /// Presence-only index entry.
    pub(crate) fn mark(&mut self, key: Vec<u8>) {
        self.store.set(key, Vec::new());
    }

    /// Move a presence entry from one index key to another.
    pub(crate) fn reindex(&mut self, from: &[u8], to: Vec<u8>) {
        self.store.delete(from);
        self.store.set(to, Vec::new());
    }

    /// Trailing ids of every index key under `prefix`, in ascending order.
    pub(crate) fn index_ids(&self, prefix: &[u8]) -> Vec<u64> {
        self.store
            .scan_prefix(prefix)
            .iter()
            .filter_map(|(key, _)| keys::id_suffix(key))
            .collect()
    }

    /// Decode every record under `prefix`.
    pub(crate) fn load_all<T: DeserializeOwned>(&self, prefix: &[u8]) -> Result<Vec<T>, TrustError> {
        self.store
            .scan_prefix(prefix)
            .iter()
            .map(|(_, bytes)| codec::decode(bytes).map_err(TrustError::from))
            .collect()
    }

    /// Next value of a monotonic id sequence, starting at 1.
    pub(crate) fn next_id(&mut self, counter: Counter) -> Result<u64, TrustError> {
        let key = keys::counter(counter);
        let next = self.load::<u64>(&key)?.unwrap_or(0) + 1;
        self.save(key, &next)?;
        Ok(next)
    }

    pub(crate) fn emit(&mut self, event: TrustEvent) {
        self.pending.push(event);
    }
}
