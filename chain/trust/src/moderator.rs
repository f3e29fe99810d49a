//! Moderator Trust Ledger
//!
//! Registration, staking, tier classification and trust-ceiling accounting.
//! This is the only component that writes a moderator's stake fields; the
//! escrow, dispute and oversight components go through the helpers here.
//!
//! Exposure has two parts:
//! - `reserved_value`: escrows the moderator is assigned to, booked at
//!   creation and released when the escrow settles;
//! - `active_dispute_value`: disputes the moderator has voted on, booked per
//!   vote and released when the round is cleared or the dispute is final.
//!
//! Invariant: `reserved_value + active_dispute_value <= trust_ceiling`,
//! except right after a slash, when the moderator is flagged over-committed
//! and deactivated.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use trust_types::ids::Address;
use trust_types::tier::ModeratorTier;

use persistence::KvStore;

use crate::context::BlockContext;
use crate::errors::{ModeratorError, TrustError};
use crate::events::{
    ModeratorRegistered, ModeratorStakeIncreased, ModeratorTierChanged, TrustEvent,
};
use crate::keys;
use crate::security;
use crate::state::TrustModule;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Moderator {
    pub address: Address,
    /// Bonded stake
    pub staked: Decimal,
    /// Stake in an unbonding window; still slashable
    pub unbonding: Decimal,
    pub active_dispute_value: Decimal,
    pub active_dispute_count: u32,
    pub reserved_value: Decimal,
    pub disputes_handled: u64,
    pub reputation: u32,
    pub tier: ModeratorTier,
    /// Always equal to bonded stake
    pub trust_ceiling: Decimal,
    pub active: bool,
    pub over_committed: bool,
    pub blacklisted: bool,
    pub blacklisted_at: Option<i64>,
    pub registered_at: i64,
}

impl Moderator {
    pub fn new(address: Address, stake: Decimal, reputation: u32, now: i64) -> Self {
        let mut moderator = Self {
            address,
            staked: stake,
            unbonding: Decimal::ZERO,
            active_dispute_value: Decimal::ZERO,
            active_dispute_count: 0,
            reserved_value: Decimal::ZERO,
            disputes_handled: 0,
            reputation,
            tier: ModeratorTier::Bronze,
            trust_ceiling: Decimal::ZERO,
            active: true,
            over_committed: false,
            blacklisted: false,
            blacklisted_at: None,
            registered_at: now,
        };
        moderator.refresh();
        moderator
    }

    /// Value currently backed by this moderator's stake.
    pub fn exposure(&self) -> Decimal {
        self.reserved_value + self.active_dispute_value
    }

    pub fn available_capacity(&self) -> Decimal {
        (self.trust_ceiling - self.exposure()).max(Decimal::ZERO)
    }

    pub fn can_handle_dispute(&self, value: Decimal) -> bool {
        self.exposure() <= self.trust_ceiling && value <= self.available_capacity()
    }

    /// Not deactivated and not banned.
    pub fn is_available(&self) -> bool {
        self.active && !self.blacklisted
    }

    /// Recompute derived fields. Returns `(old, new)` when the tier moved.
    pub(crate) fn refresh(&mut self) -> Option<(ModeratorTier, ModeratorTier)> {
        self.trust_ceiling = self.staked;
        if self.exposure() <= self.trust_ceiling {
            self.over_committed = false;
        }
        let tier = ModeratorTier::classify(self.disputes_handled, self.reputation);
        if tier == self.tier {
            return None;
        }
        let old = std::mem::replace(&mut self.tier, tier);
        Some((old, tier))
    }
}

impl<S: KvStore> TrustModule<S> {
    // ───────────────────────── Queries ─────────────────────────

    pub fn moderator(&self, address: &Address) -> Result<Option<Moderator>, TrustError> {
        self.load(&keys::moderator(address))
    }

    /// Every registered moderator, in key order.
    pub fn moderators(&self) -> Result<Vec<Moderator>, TrustError> {
        self.load_all(&keys::moderator_prefix())
    }

    pub(crate) fn require_moderator(&self, address: &Address) -> Result<Moderator, TrustError> {
        self.moderator(address)?.ok_or_else(|| {
            ModeratorError::NotFound {
                address: address.to_string(),
            }
            .into()
        })
    }

    /// Persist a moderator, emitting a tier-change event when `change` is set.
    pub(crate) fn put_moderator(
        &mut self,
        moderator: &Moderator,
        change: Option<(ModeratorTier, ModeratorTier)>,
    ) -> Result<(), TrustError> {
        self.save(keys::moderator(&moderator.address), moderator)?;
        if let Some((from, to)) = change {
            info!(moderator = %moderator.address, %from, %to, "Moderator tier changed");
            self.emit(TrustEvent::ModeratorTierChanged(ModeratorTierChanged {
                address: moderator.address.clone(),
                from,
                to,
            }));
        }
        Ok(())
    }

    // ───────────────────────── Registration ─────────────────────────

    pub(crate) fn register_moderator(
        &mut self,
        ctx: &BlockContext,
        address: Address,
        stake: Decimal,
    ) -> Result<(), TrustError> {
        let required = self.params.min_register_tier;
        security::require_tier(&self.caps, &address, required, |actual| {
            ModeratorError::InsufficientTier {
                address: address.to_string(),
                required,
                actual,
            }
        })?;
        if stake < self.params.min_moderator_stake {
            return Err(ModeratorError::StakeBelowMinimum {
                stake: stake.to_string(),
                minimum: self.params.min_moderator_stake.to_string(),
            }
            .into());
        }
        if self.moderator(&address)?.is_some() {
            return Err(ModeratorError::AlreadyRegistered {
                address: address.to_string(),
            }
            .into());
        }
        if self.store.contains(&keys::blacklist(&address)) {
            return Err(ModeratorError::Blacklisted {
                address: address.to_string(),
            }
            .into());
        }

        let custody = self.params.custody_account.clone();
        let denom = self.params.native_denom.clone();
        self.caps
            .ledger_mut()?
            .transfer(&address, &custody, &denom, stake)?;

        let moderator = Moderator::new(address, stake, self.params.initial_reputation, ctx.time);
        self.put_moderator(&moderator, None)?;

        info!(
            moderator = %moderator.address,
            stake = %stake,
            tier = %moderator.tier,
            "Moderator registered"
        );
        self.emit(TrustEvent::ModeratorRegistered(ModeratorRegistered {
            address: moderator.address.clone(),
            stake,
            tier: moderator.tier,
        }));
        Ok(())
    }

    pub(crate) fn increase_moderator_stake(
        &mut self,
        address: &Address,
        amount: Decimal,
    ) -> Result<(), TrustError> {
        if amount <= Decimal::ZERO {
            return Err(ModeratorError::InvalidAmount.into());
        }
        let mut moderator = self.require_moderator(address)?;
        if moderator.blacklisted {
            return Err(ModeratorError::Blacklisted {
                address: address.to_string(),
            }
            .into());
        }

        let staked = moderator
            .staked
            .checked_add(amount)
            .ok_or_else(|| ModeratorError::StakeOverflow {
                address: address.to_string(),
            })?;

        let custody = self.params.custody_account.clone();
        let denom = self.params.native_denom.clone();
        self.caps
            .ledger_mut()?
            .transfer(address, &custody, &denom, amount)?;

        moderator.staked = staked;
        let change = moderator.refresh();
        let reactivated = self.try_reactivate(&mut moderator);
        self.put_moderator(&moderator, change)?;

        info!(
            moderator = %address,
            amount = %amount,
            staked = %moderator.staked,
            reactivated,
            "Moderator stake increased"
        );
        self.emit(TrustEvent::ModeratorStakeIncreased(ModeratorStakeIncreased {
            address: address.clone(),
            amount,
            staked: moderator.staked,
            reactivated,
        }));
        Ok(())
    }

    /// Reactivate when stake and exposure allow. Returns true on change.
    pub(crate) fn try_reactivate(&self, moderator: &mut Moderator) -> bool {
        if moderator.active
            || moderator.blacklisted
            || moderator.staked < self.params.min_moderator_stake
            || moderator.exposure() > moderator.trust_ceiling
        {
            return false;
        }
        moderator.active = true;
        moderator.over_committed = false;
        true
    }

    // ───────────────────────── Exposure ─────────────────────────

    /// Check that `moderator` may be assigned an escrow worth `value`.
    pub(crate) fn check_assignment(
        &self,
        moderator: &Moderator,
        value: Decimal,
    ) -> Result<(), TrustError> {
        let address = moderator.address.to_string();
        if moderator.blacklisted {
            return Err(ModeratorError::Blacklisted { address }.into());
        }
        if !moderator.active {
            return Err(ModeratorError::Inactive { address }.into());
        }
        if let Some(limit) = self.params.single_escrow_limit(moderator.tier) {
            if value > limit {
                return Err(ModeratorError::ExceedsTierLimit {
                    address,
                    tier: moderator.tier.to_string(),
                    limit: limit.to_string(),
                    value: value.to_string(),
                }
                .into());
            }
        }
        if !moderator.can_handle_dispute(value) {
            return Err(ModeratorError::TrustCeilingExceeded {
                address,
                requested: value.to_string(),
                available: moderator.available_capacity().to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub(crate) fn reserve_exposure(
        &mut self,
        address: &Address,
        value: Decimal,
    ) -> Result<(), TrustError> {
        let mut moderator = self.require_moderator(address)?;
        self.check_assignment(&moderator, value)?;
        moderator.reserved_value += value;
        self.put_moderator(&moderator, None)
    }

    pub(crate) fn release_reservation(
        &mut self,
        address: &Address,
        value: Decimal,
    ) -> Result<(), TrustError> {
        let mut moderator = self.require_moderator(address)?;
        moderator.reserved_value = (moderator.reserved_value - value).max(Decimal::ZERO);
        let change = moderator.refresh();
        self.put_moderator(&moderator, change)
    }

    /// Book a dispute vote's exposure on the voter.
    pub(crate) fn book_vote_exposure(
        &mut self,
        moderator: &mut Moderator,
        value: Decimal,
    ) -> Result<(), TrustError> {
        if !moderator.can_handle_dispute(value) {
            return Err(ModeratorError::TrustCeilingExceeded {
                address: moderator.address.to_string(),
                requested: value.to_string(),
                available: moderator.available_capacity().to_string(),
            }
            .into());
        }
        moderator.active_dispute_value += value;
        moderator.active_dispute_count += 1;
        self.put_moderator(moderator, None)
    }

    pub(crate) fn release_vote_exposure(
        &mut self,
        address: &Address,
        value: Decimal,
    ) -> Result<(), TrustError> {
        let mut moderator = self.require_moderator(address)?;
        moderator.active_dispute_value = (moderator.active_dispute_value - value).max(Decimal::ZERO);
        moderator.active_dispute_count = moderator.active_dispute_count.saturating_sub(1);
        let change = moderator.refresh();
        self.put_moderator(&moderator, change)
    }

    // ───────────────────────── Reputation ─────────────────────────

    /// Credit a voter who backed the winning resolution.
    pub(crate) fn reward_winner(&mut self, address: &Address) -> Result<(), TrustError> {
        let mut moderator = self.require_moderator(address)?;
        moderator.disputes_handled += 1;
        moderator.reputation = moderator
            .reputation
            .saturating_add(self.params.winner_reward)
            .min(self.params.max_reputation);
        let change = moderator.refresh();
        self.put_moderator(&moderator, change)?;

        let points = self.params.winner_reward;
        match self.caps.tiers_mut() {
            Ok(tiers) => {
                if let Err(err) = tiers.reward(address, points) {
                    warn!(moderator = %address, error = %err, "Reputation reward failed");
                }
            }
            Err(err) => warn!(moderator = %address, error = %err, "Reputation reward skipped"),
        }
        Ok(())
    }

    /// Lower local reputation and report the penalty to the tier system.
    pub(crate) fn penalize_reputation(&mut self, moderator: &mut Moderator) {
        moderator.reputation = moderator.reputation.saturating_sub(self.params.slash_penalty);
        let points = self.params.slash_penalty;
        match self.caps.tiers_mut() {
            Ok(tiers) => {
                if let Err(err) = tiers.penalize(&moderator.address, points) {
                    warn!(moderator = %moderator.address, error = %err, "Reputation penalty failed");
                }
            }
            Err(err) => {
                warn!(moderator = %moderator.address, error = %err, "Reputation penalty skipped")
            }
        }
    }

    /// Count moderators able to vote on a dispute worth `value`.
    pub(crate) fn eligible_voters(
        &self,
        value: Decimal,
        exclude: &[&Address],
    ) -> Result<u32, TrustError> {
        let large = self.params.is_large(value);
        let mut count = 0u32;
        for moderator in self.moderators()? {
            if !moderator.is_available()
                || exclude.contains(&&moderator.address)
                || !moderator.can_handle_dispute(value)
            {
                continue;
            }
            if large {
                let tier = security::tier_of(&self.caps, &moderator.address)?;
                if tier < self.params.large_dispute_tier {
                    continue;
                }
            }
            count += 1;
        }
        Ok(count)
    }
}
