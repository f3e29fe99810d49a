//! Tier types
//!
//! Two unrelated ladders live here:
//! - [`Tier`]: the capability level an address holds in the external
//!   reputation/staking system. Gates moderation, oversight and review.
//! - [`ModeratorTier`]: the performance grade of a registered moderator,
//!   derived from disputes handled and reputation score.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Capability tier granted by the external reputation system.
///
/// Ordered ascending; comparisons (`>=`) are how gates are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// No standing in the reputation system
    None,
    /// Base tier, may moderate ordinary escrows
    Keeper,
    /// Junior oversight: large disputes, slashing, first review round
    Warden,
    /// Senior oversight: blacklisting, second review round
    Steward,
    /// Top tier: reverses permanent bans, administrative actions
    Archon,
}

impl Tier {
    pub fn level(&self) -> u8 {
        match self {
            Tier::None => 0,
            Tier::Keeper => 1,
            Tier::Warden => 2,
            Tier::Steward => 3,
            Tier::Archon => 4,
        }
    }

    /// Map the numeric level reported by the reputation system.
    ///
    /// Levels above the top tier saturate to [`Tier::Archon`].
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Tier::None,
            1 => Tier::Keeper,
            2 => Tier::Warden,
            3 => Tier::Steward,
            _ => Tier::Archon,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::None => "none",
            Tier::Keeper => "keeper",
            Tier::Warden => "warden",
            Tier::Steward => "steward",
            Tier::Archon => "archon",
        };
        f.write_str(name)
    }
}

/// Performance grade of a moderator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModeratorTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

/// (tier, minimum disputes handled, minimum reputation), highest first
const PROMOTION_LADDER: [(ModeratorTier, u64, u32); 3] = [
    (ModeratorTier::Platinum, 150, 90),
    (ModeratorTier::Gold, 50, 75),
    (ModeratorTier::Silver, 10, 60),
];

impl ModeratorTier {
    /// Grade a moderator from their track record.
    pub fn classify(disputes_handled: u64, reputation: u32) -> Self {
        PROMOTION_LADDER
            .iter()
            .find(|(_, disputes, rep)| disputes_handled >= *disputes && reputation >= *rep)
            .map(|(tier, _, _)| *tier)
            .unwrap_or(ModeratorTier::Bronze)
    }
}

impl fmt::Display for ModeratorTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModeratorTier::Bronze => "bronze",
            ModeratorTier::Silver => "silver",
            ModeratorTier::Gold => "gold",
            ModeratorTier::Platinum => "platinum",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Archon > Tier::Steward);
        assert!(Tier::Steward > Tier::Warden);
        assert!(Tier::Warden > Tier::Keeper);
        assert!(Tier::Keeper > Tier::None);
    }

    #[test]
    fn test_tier_level_round_trip() {
        for tier in [Tier::None, Tier::Keeper, Tier::Warden, Tier::Steward, Tier::Archon] {
            assert_eq!(Tier::from_level(tier.level()), tier);
        }
        assert_eq!(Tier::from_level(200), Tier::Archon);
    }

    #[test]
    fn test_classify_new_moderator_is_bronze() {
        assert_eq!(ModeratorTier::classify(0, 50), ModeratorTier::Bronze);
    }

    #[test]
    fn test_classify_needs_both_thresholds() {
        // Plenty of disputes but weak reputation stays low
        assert_eq!(ModeratorTier::classify(500, 59), ModeratorTier::Bronze);
        assert_eq!(ModeratorTier::classify(10, 60), ModeratorTier::Silver);
        assert_eq!(ModeratorTier::classify(50, 74), ModeratorTier::Silver);
        assert_eq!(ModeratorTier::classify(50, 75), ModeratorTier::Gold);
        assert_eq!(ModeratorTier::classify(150, 90), ModeratorTier::Platinum);
    }
}
