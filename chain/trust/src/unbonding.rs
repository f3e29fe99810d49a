//! Unbonding Manager: request, wait, complete, cancel
//!
//! Withdrawn stake sits in a fixed unbonding window before it is paid out.
//! During the window it no longer backs new assignments but remains
//! slashable. One record per moderator:
//!
//! `request → (wait period) → complete` or `request → cancel`
//!
//! A record that a slash drains to zero is marked `Slashed` and can never
//! complete.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use trust_types::ids::Address;

use persistence::KvStore;

use crate::context::BlockContext;
use crate::errors::{ModeratorError, TrustError};
use crate::events::{TrustEvent, UnstakeCancelled, UnstakeCompleted, UnstakeRequested};
use crate::keys;
use crate::state::TrustModule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnbondingStatus {
    /// Waiting for the unbonding period
    Active,
    /// Paid out; records are deleted on completion, so this is transient
    Completed,
    /// Drained by a slash; completion is blocked
    Slashed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingModerator {
    pub address: Address,
    pub amount: Decimal,
    pub requested_at: i64,
    pub completes_at: i64,
    pub status: UnbondingStatus,
}

impl UnbondingModerator {
    pub fn is_matured(&self, now: i64) -> bool {
        now >= self.completes_at
    }
}

impl<S: KvStore> TrustModule<S> {
    pub fn unbonding(&self, address: &Address) -> Result<Option<UnbondingModerator>, TrustError> {
        self.load(&keys::unbonding(address))
    }

    pub(crate) fn request_unstake(
        &mut self,
        ctx: &BlockContext,
        address: &Address,
        amount: Decimal,
    ) -> Result<(), TrustError> {
        if amount <= Decimal::ZERO {
            return Err(ModeratorError::InvalidAmount.into());
        }
        let mut moderator = self.require_moderator(address)?;
        if moderator.active_dispute_count > 0 {
            return Err(ModeratorError::ActiveDisputes {
                count: moderator.active_dispute_count,
            }
            .into());
        }
        if let Some(existing) = self.unbonding(address)? {
            if existing.status == UnbondingStatus::Active {
                return Err(ModeratorError::AlreadyUnbonding {
                    address: address.to_string(),
                }
                .into());
            }
        }
        // Stake backing reserved escrows stays bonded
        let available = (moderator.staked - moderator.exposure()).max(Decimal::ZERO);
        if amount > available {
            return Err(ModeratorError::InsufficientAvailableStake {
                requested: amount.to_string(),
                available: available.to_string(),
            }
            .into());
        }

        moderator.unbonding = moderator
            .unbonding
            .checked_add(amount)
            .ok_or_else(|| ModeratorError::StakeOverflow {
                address: address.to_string(),
            })?;
        moderator.staked -= amount;
        let change = moderator.refresh();
        self.put_moderator(&moderator, change)?;

        let record = UnbondingModerator {
            address: address.clone(),
            amount,
            requested_at: ctx.time,
            completes_at: ctx.time.saturating_add(self.params.unbonding_period_secs),
            status: UnbondingStatus::Active,
        };
        self.save(keys::unbonding(address), &record)?;

        info!(
            moderator = %address,
            amount = %amount,
            completes_at = record.completes_at,
            "Unstake requested"
        );
        self.emit(TrustEvent::UnstakeRequested(UnstakeRequested {
            address: address.clone(),
            amount,
            completes_at: record.completes_at,
        }));
        Ok(())
    }

    pub(crate) fn complete_unstake(
        &mut self,
        ctx: &BlockContext,
        address: &Address,
    ) -> Result<(), TrustError> {
        let record = self.unbonding(address)?.ok_or_else(|| ModeratorError::NoUnbonding {
            address: address.to_string(),
        })?;
        if record.status == UnbondingStatus::Slashed {
            return Err(ModeratorError::UnbondingSlashed {
                address: address.to_string(),
            }
            .into());
        }
        if !record.is_matured(ctx.time) {
            return Err(ModeratorError::UnbondingNotMatured {
                completes_at: record.completes_at,
            }
            .into());
        }
        self.finish_unbonding(record)
    }

    /// Pay out a matured record and delete it.
    pub(crate) fn finish_unbonding(&mut self, record: UnbondingModerator) -> Result<(), TrustError> {
        let address = record.address.clone();
        let mut moderator = self.require_moderator(&address)?;

        let custody = self.params.custody_account.clone();
        let denom = self.params.native_denom.clone();
        if record.amount > Decimal::ZERO {
            self.caps
                .ledger_mut()?
                .transfer(&custody, &address, &denom, record.amount)?;
        }

        moderator.unbonding = (moderator.unbonding - record.amount).max(Decimal::ZERO);
        let deactivated =
            moderator.active && moderator.staked < self.params.min_moderator_stake;
        if deactivated {
            moderator.active = false;
        }
        let change = moderator.refresh();
        self.put_moderator(&moderator, change)?;
        self.remove(&keys::unbonding(&address));

        info!(
            moderator = %address,
            amount = %record.amount,
            deactivated,
            "Unstake completed"
        );
        self.emit(TrustEvent::UnstakeCompleted(UnstakeCompleted {
            address,
            amount: record.amount,
            deactivated,
        }));
        Ok(())
    }

    pub(crate) fn cancel_unstake(&mut self, address: &Address) -> Result<(), TrustError> {
        let record = self.unbonding(address)?.ok_or_else(|| ModeratorError::NoUnbonding {
            address: address.to_string(),
        })?;
        if record.status == UnbondingStatus::Slashed {
            return Err(ModeratorError::UnbondingSlashed {
                address: address.to_string(),
            }
            .into());
        }

        let mut moderator = self.require_moderator(address)?;
        moderator.staked = moderator
            .staked
            .checked_add(record.amount)
            .ok_or_else(|| ModeratorError::StakeOverflow {
                address: address.to_string(),
            })?;
        moderator.unbonding = (moderator.unbonding - record.amount).max(Decimal::ZERO);
        let change = moderator.refresh();
        self.put_moderator(&moderator, change)?;
        self.remove(&keys::unbonding(address));

        info!(moderator = %address, amount = %record.amount, "Unstake cancelled");
        self.emit(TrustEvent::UnstakeCancelled(UnstakeCancelled {
            address: address.clone(),
            amount: record.amount,
        }));
        Ok(())
    }

    /// Active records whose period has elapsed, for the scheduler.
    pub(crate) fn matured_unbondings(&self, now: i64) -> Result<Vec<UnbondingModerator>, TrustError> {
        let records: Vec<UnbondingModerator> = self.load_all(&keys::unbonding_prefix())?;
        let matured: Vec<_> = records
            .into_iter()
            .filter(|r| r.status == UnbondingStatus::Active && r.is_matured(now))
            .collect();
        debug!(count = matured.len(), now, "Matured unbondings");
        Ok(matured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::Msg;
    use crate::testkit::TestEnv;

    fn unstake(env: &mut TestEnv, who: &str, amount: i64) -> Result<Vec<TrustEvent>, TrustError> {
        env.deliver(Msg::RequestUnstake {
            address: Address::new(who),
            amount: Decimal::from(amount),
        })
    }

    #[test]
    fn test_request_moves_stake_to_unbonding() {
        let mut env = TestEnv::new();
        env.register_moderator("mod", 3_000).unwrap();
        unstake(&mut env, "mod", 1_000).unwrap();

        let m = env.module.moderator(&Address::new("mod")).unwrap().unwrap();
        assert_eq!(m.staked, Decimal::from(2_000));
        assert_eq!(m.unbonding, Decimal::from(1_000));
        assert_eq!(m.trust_ceiling, Decimal::from(2_000));

        let record = env.module.unbonding(&Address::new("mod")).unwrap().unwrap();
        assert_eq!(record.completes_at, env.ctx.time + 1_209_600);
    }

    #[test]
    fn test_completion_time_saturates_at_end_of_time() {
        let mut env = TestEnv::new();
        env.register_moderator("mod", 3_000).unwrap();
        env.ctx.time = i64::MAX - 10;
        unstake(&mut env, "mod", 1_000).unwrap();

        let record = env.module.unbonding(&Address::new("mod")).unwrap().unwrap();
        assert_eq!(record.completes_at, i64::MAX);
    }

    #[test]
    fn test_second_request_rejected() {
        let mut env = TestEnv::new();
        env.register_moderator("mod", 3_000).unwrap();
        unstake(&mut env, "mod", 500).unwrap();
        let err = unstake(&mut env, "mod", 500).unwrap_err();
        assert_eq!(err.code(), 311);
    }

    #[test]
    fn test_request_capped_at_unlocked_stake() {
        let mut env = TestEnv::new();
        env.register_moderator("mod", 2_000).unwrap();
        env.create_escrow("alice", "bob", Some("mod"), 1_500).unwrap();
        let err = unstake(&mut env, "mod", 600).unwrap_err();
        assert!(matches!(
            err,
            TrustError::Moderator(ModeratorError::InsufficientAvailableStake { .. })
        ));
        unstake(&mut env, "mod", 500).unwrap();
    }

    #[test]
    fn test_complete_before_period_rejected() {
        let mut env = TestEnv::new();
        env.register_moderator("mod", 2_000).unwrap();
        unstake(&mut env, "mod", 500).unwrap();
        env.advance(1_209_599);
        let err = env
            .deliver(Msg::CompleteUnstake {
                address: Address::new("mod"),
            })
            .unwrap_err();
        assert_eq!(err.code(), 314);
    }

    #[test]
    fn test_complete_pays_out_and_deactivates_below_minimum() {
        let mut env = TestEnv::new();
        env.register_moderator("mod", 1_500).unwrap();
        unstake(&mut env, "mod", 1_000).unwrap();
        env.advance(1_209_600);
        let events = env
            .deliver(Msg::CompleteUnstake {
                address: Address::new("mod"),
            })
            .unwrap();

        assert!(matches!(&events[0], TrustEvent::UnstakeCompleted(e) if e.deactivated));
        assert_eq!(env.balance("mod"), Decimal::from(1_000));
        let m = env.module.moderator(&Address::new("mod")).unwrap().unwrap();
        assert!(!m.active);
        assert_eq!(m.unbonding, Decimal::ZERO);
        assert!(env.module.unbonding(&Address::new("mod")).unwrap().is_none());
    }

    #[test]
    fn test_cancel_restores_stake() {
        let mut env = TestEnv::new();
        env.register_moderator("mod", 2_000).unwrap();
        unstake(&mut env, "mod", 800).unwrap();
        env.deliver(Msg::CancelUnstake {
            address: Address::new("mod"),
        })
        .unwrap();

        let m = env.module.moderator(&Address::new("mod")).unwrap().unwrap();
        assert_eq!(m.staked, Decimal::from(2_000));
        assert_eq!(m.unbonding, Decimal::ZERO);
        assert!(env.module.unbonding(&Address::new("mod")).unwrap().is_none());
    }

    #[test]
    fn test_cancel_without_record() {
        let mut env = TestEnv::new();
        env.register_moderator("mod", 2_000).unwrap();
        let err = env
            .deliver(Msg::CancelUnstake {
                address: Address::new("mod"),
            })
            .unwrap_err();
        assert_eq!(err.code(), 313);
    }
}
