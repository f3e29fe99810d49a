//! Validator Oversight
//!
//! Slashing and blacklisting of moderators by tier-holding validators, and
//! the append-only audit log of every such action.
//!
//! A slash burns from custody before any bookkeeping changes. If the burn
//! fails the operation aborts, so recorded stake never diverges from what
//! custody actually holds.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use trust_types::ids::{ActionId, Address};
use trust_types::tier::Tier;

use persistence::KvStore;

use crate::context::BlockContext;
use crate::errors::{ModeratorError, OversightError, TrustError};
use crate::events::{ModeratorBlacklisted, ModeratorSlashed, ModeratorUnblacklisted, TrustEvent};
use crate::keys::{self, Counter};
use crate::security;
use crate::state::TrustModule;
use crate::unbonding::UnbondingStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeratorBlacklist {
    pub address: Address,
    pub issued_by: Address,
    pub reason: String,
    pub permanent: bool,
    /// Zero for permanent bans
    pub duration_secs: i64,
    pub issued_at: i64,
    pub expires_at: Option<i64>,
}

impl ModeratorBlacklist {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Slash,
    Blacklist,
    Unblacklist,
    /// Temporary ban lifted by the scheduler
    BanExpired,
}

/// Audit record. Written once, never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorAction {
    pub id: ActionId,
    pub actor: Address,
    pub kind: ActionKind,
    pub target: Address,
    pub reason: String,
    /// Burned amount for slashes, zero otherwise
    pub amount: Decimal,
    pub time: i64,
}

impl<S: KvStore> TrustModule<S> {
    // ───────────────────────── Queries ─────────────────────────

    pub fn action(&self, id: ActionId) -> Result<ValidatorAction, TrustError> {
        self.load(&keys::action(id))?.ok_or_else(|| {
            OversightError::ActionNotFound {
                action_id: id.to_string(),
            }
            .into()
        })
    }

    pub fn blacklist_entry(&self, address: &Address) -> Result<Option<ModeratorBlacklist>, TrustError> {
        self.load(&keys::blacklist(address))
    }

    pub fn blacklist(&self) -> Result<Vec<ModeratorBlacklist>, TrustError> {
        self.load_all(&keys::blacklist_prefix())
    }

    fn record_action(
        &mut self,
        ctx: &BlockContext,
        actor: &Address,
        kind: ActionKind,
        target: &Address,
        reason: &str,
        amount: Decimal,
    ) -> Result<ActionId, TrustError> {
        let id = ActionId::new(self.next_id(Counter::Action)?);
        let action = ValidatorAction {
            id,
            actor: actor.clone(),
            kind,
            target: target.clone(),
            reason: reason.to_string(),
            amount,
            time: ctx.time,
        };
        self.save(keys::action(id), &action)?;
        Ok(id)
    }

    fn require_validator(&self, validator: &Address, required: Tier) -> Result<(), TrustError> {
        security::require_tier(&self.caps, validator, required, |actual| {
            OversightError::InsufficientTier {
                validator: validator.to_string(),
                required,
                actual,
            }
        })
        .map(drop)
    }

    // ───────────────────────── Slashing ─────────────────────────

    pub(crate) fn slash_moderator(
        &mut self,
        ctx: &BlockContext,
        validator: Address,
        target: Address,
        fraction: Decimal,
        reason: String,
    ) -> Result<(), TrustError> {
        self.require_validator(&validator, self.params.slash_tier)?;
        if fraction < Decimal::ZERO || fraction > Decimal::ONE {
            return Err(OversightError::InvalidFraction {
                fraction: fraction.to_string(),
            }
            .into());
        }
        let mut moderator = self.require_moderator(&target)?;
        let mut record = self.unbonding(&target)?;

        let slashable = moderator
            .staked
            .checked_add(moderator.unbonding)
            .ok_or_else(|| ModeratorError::StakeOverflow {
                address: target.to_string(),
            })?;
        let amount = (slashable * fraction).trunc();
        if amount > Decimal::ZERO {
            let custody = self.params.custody_account.clone();
            let denom = self.params.native_denom.clone();
            self.caps
                .ledger_mut()?
                .burn(&custody, &denom, amount)
                .map_err(|err| OversightError::BurnFailed {
                    amount: amount.to_string(),
                    reason: err.to_string(),
                })?;
        }

        let from_stake = amount.min(moderator.staked);
        moderator.staked -= from_stake;
        let from_unbonding = (amount - from_stake).min(moderator.unbonding);
        moderator.unbonding -= from_unbonding;
        if let Some(record) = record.as_mut() {
            record.amount = (record.amount - from_unbonding).max(Decimal::ZERO);
            if record.amount.is_zero() && record.status == UnbondingStatus::Active {
                record.status = UnbondingStatus::Slashed;
            }
            self.save(keys::unbonding(&target), record)?;
        }

        self.penalize_reputation(&mut moderator);
        let change = moderator.refresh();
        let was_active = moderator.active;
        if moderator.staked < self.params.min_moderator_stake {
            moderator.active = false;
        }
        let over_committed = moderator.exposure() > moderator.trust_ceiling;
        if over_committed {
            moderator.over_committed = true;
            moderator.active = false;
        }
        let deactivated = was_active && !moderator.active;
        self.put_moderator(&moderator, change)?;

        let action_id =
            self.record_action(ctx, &validator, ActionKind::Slash, &target, &reason, amount)?;
        info!(
            moderator = %target,
            validator = %validator,
            amount = %amount,
            staked = %moderator.staked,
            over_committed,
            deactivated,
            "Moderator slashed"
        );
        self.emit(TrustEvent::ModeratorSlashed(ModeratorSlashed {
            action_id,
            validator,
            moderator: target,
            amount,
            reason,
            over_committed,
            deactivated,
        }));
        Ok(())
    }

    // ───────────────────────── Blacklist ─────────────────────────

    pub(crate) fn blacklist_moderator(
        &mut self,
        ctx: &BlockContext,
        validator: Address,
        target: Address,
        reason: String,
        permanent: bool,
        duration_secs: i64,
    ) -> Result<(), TrustError> {
        self.require_validator(&validator, self.params.blacklist_tier)?;
        let mut moderator = self.require_moderator(&target)?;
        if moderator.blacklisted || self.store.contains(&keys::blacklist(&target)) {
            return Err(OversightError::AlreadyBlacklisted {
                address: target.to_string(),
            }
            .into());
        }
        let expires_at = if permanent {
            None
        } else {
            let max = self.params.max_ban_secs;
            if !(1..=max).contains(&duration_secs) {
                return Err(OversightError::InvalidDuration {
                    duration: duration_secs,
                    max,
                }
                .into());
            }
            Some(ctx.time.checked_add(duration_secs).ok_or(
                OversightError::InvalidDuration {
                    duration: duration_secs,
                    max,
                },
            )?)
        };

        let entry = ModeratorBlacklist {
            address: target.clone(),
            issued_by: validator.clone(),
            reason: reason.clone(),
            permanent,
            duration_secs: if permanent { 0 } else { duration_secs },
            issued_at: ctx.time,
            expires_at,
        };
        self.save(keys::blacklist(&target), &entry)?;

        moderator.blacklisted = true;
        moderator.blacklisted_at = Some(ctx.time);
        moderator.active = false;
        self.put_moderator(&moderator, None)?;

        let action_id = self.record_action(
            ctx,
            &validator,
            ActionKind::Blacklist,
            &target,
            &reason,
            Decimal::ZERO,
        )?;
        info!(
            moderator = %target,
            validator = %validator,
            permanent,
            expires_at = ?entry.expires_at,
            "Moderator blacklisted"
        );
        self.emit(TrustEvent::ModeratorBlacklisted(ModeratorBlacklisted {
            action_id,
            validator,
            moderator: target,
            permanent,
            expires_at: entry.expires_at,
        }));
        Ok(())
    }

    pub(crate) fn unblacklist_moderator(
        &mut self,
        ctx: &BlockContext,
        validator: Address,
        target: Address,
        reason: String,
    ) -> Result<(), TrustError> {
        let entry = self
            .blacklist_entry(&target)?
            .ok_or_else(|| OversightError::NotBlacklisted {
                address: target.to_string(),
            })?;
        let required = if entry.permanent {
            self.params.permanent_lift_tier
        } else {
            self.params.temporary_lift_tier
        };
        self.require_validator(&validator, required)?;
        self.lift_ban(ctx, &validator, &target, ActionKind::Unblacklist, &reason)
    }

    fn lift_ban(
        &mut self,
        ctx: &BlockContext,
        actor: &Address,
        target: &Address,
        kind: ActionKind,
        reason: &str,
    ) -> Result<(), TrustError> {
        self.remove(&keys::blacklist(target));
        let mut moderator = self.require_moderator(target)?;
        moderator.blacklisted = false;
        moderator.blacklisted_at = None;
        let reactivated = self.try_reactivate(&mut moderator);
        self.put_moderator(&moderator, None)?;

        let action_id = self.record_action(ctx, actor, kind, target, reason, Decimal::ZERO)?;
        let expired = kind == ActionKind::BanExpired;
        info!(moderator = %target, actor = %actor, expired, reactivated, "Moderator unblacklisted");
        self.emit(TrustEvent::ModeratorUnblacklisted(ModeratorUnblacklisted {
            action_id,
            actor: actor.clone(),
            moderator: target.clone(),
            expired,
        }));
        Ok(())
    }

    // ───────────────────────── Scheduler ─────────────────────────

    pub(crate) fn expired_bans(&self, now: i64) -> Result<Vec<Address>, TrustError> {
        Ok(self
            .blacklist()?
            .into_iter()
            .filter(|entry| !entry.permanent && entry.is_expired(now))
            .map(|entry| entry.address)
            .collect())
    }

    /// Lift a temporary ban whose term has run. Returns false if not due.
    pub(crate) fn expire_ban(&mut self, ctx: &BlockContext, target: &Address) -> Result<bool, TrustError> {
        let Some(entry) = self.blacklist_entry(target)? else {
            return Ok(false);
        };
        if entry.permanent || !entry.is_expired(ctx.time) {
            return Ok(false);
        }
        debug!(moderator = %target, expires_at = ?entry.expires_at, "Temporary ban expired");
        let custody = self.params.custody_account.clone();
        self.lift_ban(ctx, &custody, target, ActionKind::BanExpired, "ban expired")?;
        Ok(true)
    }
}
