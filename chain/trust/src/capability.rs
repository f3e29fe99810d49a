//! Collaborator capabilities
//!
//! The module moves value and consults reputation through three external
//! collaborators. Each is injected as an optional handle; a missing handle
//! is a distinct case every call site handles explicitly:
//!
//! - `Ledger` absent: currency movement and burns fail hard.
//! - `Registry` absent: equity movement and conflict checks fail hard;
//!   beneficial-owner bookkeeping and trading resume are skipped with a
//!   warning; the freeze halt is retried next block.
//! - `TierOracle` absent: tier-gated actions fail hard; reputation
//!   reward/penalty is skipped with a warning.

use rust_decimal::Decimal;
use trust_types::ids::{Address, CompanyId, EscrowId};
use trust_types::tier::Tier;

use crate::errors::CapabilityError;

/// Fungible balances, including this module's custody account.
pub trait Ledger {
    fn balance(&self, account: &Address, denom: &str) -> Decimal;

    fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        denom: &str,
        amount: Decimal,
    ) -> Result<(), CapabilityError>;

    fn mint(&mut self, to: &Address, denom: &str, amount: Decimal) -> Result<(), CapabilityError>;

    fn burn(&mut self, from: &Address, denom: &str, amount: Decimal)
        -> Result<(), CapabilityError>;
}

/// Equity registry: share ownership, beneficial owners, trading halts.
pub trait Registry {
    /// Shares of `company` held by `holder`; `class_id = None` sums all classes.
    fn shares_held(&self, holder: &Address, company: &CompanyId, class_id: Option<&str>) -> Decimal;

    fn transfer_shares(
        &mut self,
        from: &Address,
        to: &Address,
        company: &CompanyId,
        class_id: &str,
        shares: Decimal,
    ) -> Result<(), CapabilityError>;

    /// Record `owner` as the economic owner of shares held by `custodian`.
    fn register_beneficial_owner(
        &mut self,
        custodian: &Address,
        owner: &Address,
        company: &CompanyId,
        class_id: &str,
        shares: Decimal,
        escrow_id: EscrowId,
    ) -> Result<(), CapabilityError>;

    fn unregister_beneficial_owner(
        &mut self,
        custodian: &Address,
        owner: &Address,
        company: &CompanyId,
        class_id: &str,
        shares: Decimal,
        escrow_id: EscrowId,
    ) -> Result<(), CapabilityError>;

    fn halt_trading(&mut self, company: &CompanyId, reason: &str) -> Result<(), CapabilityError>;

    fn resume_trading(&mut self, company: &CompanyId) -> Result<(), CapabilityError>;
}

/// External reputation / staking system.
pub trait TierOracle {
    fn tier_of(&self, addr: &Address) -> Tier;

    fn meets(&self, addr: &Address, min: Tier) -> bool {
        self.tier_of(addr) >= min
    }

    /// Number of addresses holding `min` or a higher tier.
    fn count_at_or_above(&self, min: Tier) -> u64;

    /// Seconds since `addr` last bonded stake, zero if never.
    fn stake_age(&self, addr: &Address, now: i64) -> i64;

    fn reward(&mut self, addr: &Address, points: u32) -> Result<(), CapabilityError>;

    fn penalize(&mut self, addr: &Address, points: u32) -> Result<(), CapabilityError>;
}

/// Optional collaborator handles injected at construction.
#[derive(Default)]
pub struct Capabilities {
    pub ledger: Option<Box<dyn Ledger>>,
    pub registry: Option<Box<dyn Registry>>,
    pub tiers: Option<Box<dyn TierOracle>>,
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("ledger", &self.ledger.is_some())
            .field("registry", &self.registry.is_some())
            .field("tiers", &self.tiers.is_some())
            .finish()
    }
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ledger(mut self, ledger: impl Ledger + 'static) -> Self {
        self.ledger = Some(Box::new(ledger));
        self
    }

    pub fn with_registry(mut self, registry: impl Registry + 'static) -> Self {
        self.registry = Some(Box::new(registry));
        self
    }

    pub fn with_tiers(mut self, tiers: impl TierOracle + 'static) -> Self {
        self.tiers = Some(Box::new(tiers));
        self
    }

    pub fn ledger(&self) -> Result<&(dyn Ledger + 'static), CapabilityError> {
        self.ledger
            .as_deref()
            .ok_or(CapabilityError::Unavailable { capability: "ledger" })
    }

    pub fn ledger_mut(&mut self) -> Result<&mut (dyn Ledger + 'static), CapabilityError> {
        self.ledger
            .as_deref_mut()
            .ok_or(CapabilityError::Unavailable { capability: "ledger" })
    }

    pub fn registry(&self) -> Result<&(dyn Registry + 'static), CapabilityError> {
        self.registry
            .as_deref()
            .ok_or(CapabilityError::Unavailable { capability: "registry" })
    }

    pub fn registry_mut(&mut self) -> Result<&mut (dyn Registry + 'static), CapabilityError> {
        self.registry
            .as_deref_mut()
            .ok_or(CapabilityError::Unavailable { capability: "registry" })
    }

    pub fn tiers(&self) -> Result<&(dyn TierOracle + 'static), CapabilityError> {
        self.tiers
            .as_deref()
            .ok_or(CapabilityError::Unavailable { capability: "tiers" })
    }

    pub fn tiers_mut(&mut self) -> Result<&mut (dyn TierOracle + 'static), CapabilityError> {
        self.tiers
            .as_deref_mut()
            .ok_or(CapabilityError::Unavailable { capability: "tiers" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{MemLedger, MemTiers};

    #[test]
    fn test_absent_capabilities_are_distinct_errors() {
        let caps = Capabilities::new();
        assert_eq!(
            caps.ledger().err(),
            Some(CapabilityError::Unavailable { capability: "ledger" })
        );
        assert_eq!(
            caps.registry().err(),
            Some(CapabilityError::Unavailable { capability: "registry" })
        );
        assert_eq!(
            caps.tiers().err(),
            Some(CapabilityError::Unavailable { capability: "tiers" })
        );
    }

    #[test]
    fn test_meets_uses_tier_order() {
        let tiers = MemTiers::new();
        tiers.set_tier("w1", Tier::Warden);
        let caps = Capabilities::new().with_tiers(tiers);
        let oracle = caps.tiers().unwrap();
        assert!(oracle.meets(&Address::new("w1"), Tier::Keeper));
        assert!(oracle.meets(&Address::new("w1"), Tier::Warden));
        assert!(!oracle.meets(&Address::new("w1"), Tier::Steward));
        assert!(!oracle.meets(&Address::new("nobody"), Tier::Keeper));
    }

    #[test]
    fn test_debug_shows_presence_only() {
        let caps = Capabilities::new().with_ledger(MemLedger::new());
        let rendered = format!("{caps:?}");
        assert!(rendered.contains("ledger: true"));
        assert!(rendered.contains("registry: false"));
    }
}
