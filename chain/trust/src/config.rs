//! Module parameters
//!
//! Every tunable the module reads lives in [`Params`]. Parameters are
//! validated before the module accepts them, both at construction and on
//! governance updates, and are persisted in the store so replicas agree.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trust_types::ids::Address;
use trust_types::tier::{ModeratorTier, Tier};

use crate::errors::ConfigError;

const HOUR: i64 = 3_600;
const DAY: i64 = 24 * HOUR;

/// Upper bound on every duration parameter, so deadlines stay far from `i64::MAX`.
pub const MAX_PERIOD_SECS: i64 = 100 * 365 * DAY;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Denom used for moderator stake, burns and fee accounting
    pub native_denom: String,
    /// Account holding escrowed assets and bonded stake
    pub custody_account: Address,
    /// Receives escrow fees
    pub fee_collector: Address,

    pub escrow_fee_rate: Decimal,
    pub max_moderator_fee_rate: Decimal,
    /// Furthest an escrow expiry may lie ahead of creation
    pub max_escrow_secs: i64,

    pub min_moderator_stake: Decimal,
    pub min_register_tier: Tier,
    pub unbonding_period_secs: i64,

    pub dispute_period_secs: i64,
    pub appeal_window_secs: i64,
    /// Escrows strictly above this value are large disputes
    pub large_dispute_threshold: Decimal,
    pub standard_votes_required: u32,
    pub large_votes_required: u32,
    pub appeal_votes_required: u32,
    pub max_appeals: u32,
    pub max_evidence: u32,
    pub large_dispute_tier: Tier,

    pub slash_tier: Tier,
    pub blacklist_tier: Tier,
    /// Longest temporary ban
    pub max_ban_secs: i64,
    pub temporary_lift_tier: Tier,
    pub permanent_lift_tier: Tier,
    /// Cancels investigations and updates parameters
    pub admin_tier: Tier,

    pub initial_reputation: u32,
    pub max_reputation: u32,
    pub winner_reward: u32,
    pub slash_penalty: u32,

    /// Single-escrow limits per moderator tier; platinum is unlimited
    pub bronze_escrow_limit: Decimal,
    pub silver_escrow_limit: Decimal,
    pub gold_escrow_limit: Decimal,

    pub warden_review_secs: i64,
    pub warden_quorum: u32,
    pub warden_approvals: u32,
    pub steward_review_secs: i64,
    pub steward_quorum: u32,
    pub steward_approvals: u32,
    pub freeze_warning_secs: i64,
    pub reviewer_tier: Tier,
    pub min_available_reviewers: u64,
    pub min_stake_age_secs: i64,
    pub max_report_description: u32,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            native_denom: "unative".to_string(),
            custody_account: Address::new("trust-custody"),
            fee_collector: Address::new("trust-fees"),
            escrow_fee_rate: Decimal::new(1, 2),
            max_moderator_fee_rate: Decimal::new(5, 2),
            max_escrow_secs: 365 * DAY,
            min_moderator_stake: Decimal::from(1_000),
            min_register_tier: Tier::Keeper,
            unbonding_period_secs: 14 * DAY,
            dispute_period_secs: 7 * DAY,
            appeal_window_secs: 48 * HOUR,
            large_dispute_threshold: Decimal::from(10_000),
            standard_votes_required: 3,
            large_votes_required: 5,
            appeal_votes_required: 5,
            max_appeals: 2,
            max_evidence: 32,
            large_dispute_tier: Tier::Warden,
            slash_tier: Tier::Warden,
            blacklist_tier: Tier::Steward,
            max_ban_secs: 365 * DAY,
            temporary_lift_tier: Tier::Steward,
            permanent_lift_tier: Tier::Archon,
            admin_tier: Tier::Archon,
            initial_reputation: 50,
            max_reputation: 100,
            winner_reward: 2,
            slash_penalty: 10,
            bronze_escrow_limit: Decimal::from(5_000),
            silver_escrow_limit: Decimal::from(25_000),
            gold_escrow_limit: Decimal::from(100_000),
            warden_review_secs: 48 * HOUR,
            warden_quorum: 3,
            warden_approvals: 2,
            steward_review_secs: 72 * HOUR,
            steward_quorum: 5,
            steward_approvals: 3,
            freeze_warning_secs: 24 * HOUR,
            reviewer_tier: Tier::Warden,
            min_available_reviewers: 5,
            min_stake_age_secs: 30 * DAY,
            max_report_description: 2_048,
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn check_rate(field: &'static str, rate: Decimal) -> Result<(), ConfigError> {
    if rate < Decimal::ZERO || rate > Decimal::ONE {
        return Err(invalid(field, format!("{rate} outside [0, 1]")));
    }
    Ok(())
}

fn check_period(field: &'static str, secs: i64) -> Result<(), ConfigError> {
    if secs <= 0 {
        return Err(invalid(field, "must be positive"));
    }
    if secs > MAX_PERIOD_SECS {
        return Err(invalid(field, format!("exceeds {MAX_PERIOD_SECS}s")));
    }
    Ok(())
}

fn check_quorum(field: &'static str, quorum: u32) -> Result<(), ConfigError> {
    if quorum == 0 {
        return Err(invalid(field, "must be positive"));
    }
    Ok(())
}

impl Params {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let params: Params =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.native_denom.is_empty() {
            return Err(invalid("native_denom", "must not be empty"));
        }
        if self.custody_account.as_str().is_empty() {
            return Err(invalid("custody_account", "must not be empty"));
        }
        if self.fee_collector.as_str().is_empty() {
            return Err(invalid("fee_collector", "must not be empty"));
        }

        check_rate("escrow_fee_rate", self.escrow_fee_rate)?;
        check_rate("max_moderator_fee_rate", self.max_moderator_fee_rate)?;
        if self.escrow_fee_rate + self.max_moderator_fee_rate > Decimal::ONE {
            return Err(invalid("max_moderator_fee_rate", "combined fees exceed 100%"));
        }
        if self.min_moderator_stake <= Decimal::ZERO {
            return Err(invalid("min_moderator_stake", "must be positive"));
        }

        check_period("unbonding_period_secs", self.unbonding_period_secs)?;
        check_period("dispute_period_secs", self.dispute_period_secs)?;
        check_period("appeal_window_secs", self.appeal_window_secs)?;
        check_period("warden_review_secs", self.warden_review_secs)?;
        check_period("steward_review_secs", self.steward_review_secs)?;
        check_period("freeze_warning_secs", self.freeze_warning_secs)?;
        check_period("max_escrow_secs", self.max_escrow_secs)?;
        check_period("max_ban_secs", self.max_ban_secs)?;
        if !(0..=MAX_PERIOD_SECS).contains(&self.min_stake_age_secs) {
            return Err(invalid("min_stake_age_secs", "must be within 0..=MAX_PERIOD_SECS"));
        }

        check_quorum("standard_votes_required", self.standard_votes_required)?;
        check_quorum("large_votes_required", self.large_votes_required)?;
        check_quorum("appeal_votes_required", self.appeal_votes_required)?;
        if self.standard_votes_required > self.large_votes_required {
            return Err(invalid("large_votes_required", "below standard quorum"));
        }
        if self.standard_votes_required > self.appeal_votes_required {
            return Err(invalid("appeal_votes_required", "below standard quorum"));
        }

        check_quorum("warden_quorum", self.warden_quorum)?;
        check_quorum("steward_quorum", self.steward_quorum)?;
        if self.warden_approvals == 0 || self.warden_approvals > self.warden_quorum {
            return Err(invalid("warden_approvals", "must be within 1..=warden_quorum"));
        }
        if self.steward_approvals == 0 || self.steward_approvals > self.steward_quorum {
            return Err(invalid("steward_approvals", "must be within 1..=steward_quorum"));
        }

        if self.initial_reputation > self.max_reputation {
            return Err(invalid("initial_reputation", "exceeds max_reputation"));
        }
        if self.blacklist_tier <= self.slash_tier {
            return Err(invalid("blacklist_tier", "must be strictly above slash_tier"));
        }
        if self.temporary_lift_tier < self.blacklist_tier {
            return Err(invalid("temporary_lift_tier", "below blacklist_tier"));
        }
        if self.permanent_lift_tier < self.temporary_lift_tier {
            return Err(invalid("permanent_lift_tier", "below temporary_lift_tier"));
        }
        if self.max_evidence == 0 {
            return Err(invalid("max_evidence", "must be positive"));
        }
        if self.max_report_description == 0 {
            return Err(invalid("max_report_description", "must be positive"));
        }
        Ok(())
    }

    /// Largest single escrow a moderator of `tier` may back.
    ///
    /// `None` means unlimited.
    pub fn single_escrow_limit(&self, tier: ModeratorTier) -> Option<Decimal> {
        match tier {
            ModeratorTier::Bronze => Some(self.bronze_escrow_limit),
            ModeratorTier::Silver => Some(self.silver_escrow_limit),
            ModeratorTier::Gold => Some(self.gold_escrow_limit),
            ModeratorTier::Platinum => None,
        }
    }

    /// Quorum for a fresh dispute on an escrow of `value`.
    pub fn votes_required_for(&self, value: Decimal) -> u32 {
        if self.is_large(value) {
            self.large_votes_required
        } else {
            self.standard_votes_required
        }
    }

    pub fn is_large(&self, value: Decimal) -> bool {
        value > self.large_dispute_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(Params::default().validate(), Ok(()));
    }

    #[test]
    fn test_default_periods() {
        let p = Params::default();
        assert_eq!(p.unbonding_period_secs, 1_209_600);
        assert_eq!(p.dispute_period_secs, 604_800);
        assert_eq!(p.appeal_window_secs, 172_800);
        assert_eq!(p.min_stake_age_secs, 2_592_000);
    }

    #[test]
    fn test_rejects_unbounded_periods() {
        let p = Params {
            unbonding_period_secs: i64::MAX,
            ..Params::default()
        };
        assert!(matches!(
            p.validate(),
            Err(ConfigError::Invalid { field: "unbonding_period_secs", .. })
        ));
        let p = Params {
            max_ban_secs: MAX_PERIOD_SECS + 1,
            ..Params::default()
        };
        assert!(p.validate().is_err());
        let p = Params {
            unbonding_period_secs: MAX_PERIOD_SECS,
            ..Params::default()
        };
        assert_eq!(p.validate(), Ok(()));
    }

    #[test]
    fn test_from_json_partial_uses_defaults() {
        let p = Params::from_json(r#"{"max_appeals": 1, "escrow_fee_rate": "0.02"}"#).unwrap();
        assert_eq!(p.max_appeals, 1);
        assert_eq!(p.escrow_fee_rate, Decimal::new(2, 2));
        assert_eq!(p.standard_votes_required, 3);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(Params::from_json("{"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_json_round_trip() {
        let p = Params::default();
        let back = Params::from_json(&p.to_json().unwrap()).unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn test_rejects_rate_above_one() {
        let p = Params {
            escrow_fee_rate: Decimal::from(2),
            ..Params::default()
        };
        assert!(matches!(
            p.validate(),
            Err(ConfigError::Invalid { field: "escrow_fee_rate", .. })
        ));
    }

    #[test]
    fn test_rejects_approvals_above_quorum() {
        let p = Params {
            warden_approvals: 4,
            ..Params::default()
        };
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_rejects_blacklist_not_above_slash() {
        let p = Params {
            blacklist_tier: Tier::Warden,
            ..Params::default()
        };
        assert!(matches!(
            p.validate(),
            Err(ConfigError::Invalid { field: "blacklist_tier", .. })
        ));
    }

    #[test]
    fn test_rejects_permanent_lift_below_temporary() {
        let p = Params {
            permanent_lift_tier: Tier::Steward,
            temporary_lift_tier: Tier::Archon,
            ..Params::default()
        };
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_single_escrow_limits() {
        let p = Params::default();
        assert_eq!(p.single_escrow_limit(ModeratorTier::Bronze), Some(Decimal::from(5_000)));
        assert_eq!(p.single_escrow_limit(ModeratorTier::Platinum), None);
    }

    #[test]
    fn test_large_threshold_is_strict() {
        let p = Params::default();
        assert_eq!(p.votes_required_for(Decimal::from(10_000)), 3);
        assert_eq!(p.votes_required_for(Decimal::from(10_001)), 5);
    }
}
