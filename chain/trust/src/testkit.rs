//! In-memory collaborators and a test harness
//!
//! [`MemLedger`], [`MemRegistry`] and [`MemTiers`] implement the capability
//! traits over shared in-memory state. Each is a cheap handle: clone one
//! into the module and keep the other to seed balances, inject failures and
//! inspect results.
//!
//! [`TestEnv`] wires all three into a module over a [`MemStore`] and keeps
//! a block clock.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use persistence::MemStore;
use rust_decimal::Decimal;
use trust_types::asset::Asset;
use trust_types::ids::{Address, CompanyId, EscrowId};
use trust_types::tier::Tier;

use crate::capability::{Capabilities, Ledger, Registry, TierOracle};
use crate::config::Params;
use crate::context::BlockContext;
use crate::errors::{CapabilityError, EscrowError, TrustError};
use crate::escrow::EscrowTerms;
use crate::events::TrustEvent;
use crate::msg::Msg;
use crate::scheduler::EndBlockSummary;
use crate::state::TrustModule;

const NATIVE: &str = "unative";
const YEAR: i64 = 365 * 86_400;

fn rejected(capability: &'static str, reason: &str) -> CapabilityError {
    CapabilityError::Rejected {
        capability,
        reason: reason.to_string(),
    }
}

// ───────────────────────── Ledger ─────────────────────────

#[derive(Debug, Default)]
struct LedgerState {
    balances: BTreeMap<(String, String), Decimal>,
    fail_transfers: bool,
    fail_burns: bool,
    burned: Decimal,
    burns: u32,
}

impl LedgerState {
    fn debit(&mut self, account: &Address, denom: &str, amount: Decimal) -> Result<(), CapabilityError> {
        let key = (account.as_str().to_string(), denom.to_string());
        let available = self.balances.get(&key).copied().unwrap_or_default();
        if available < amount {
            return Err(CapabilityError::InsufficientBalance {
                account: account.to_string(),
                asset: denom.to_string(),
                required: amount.to_string(),
                available: available.to_string(),
            });
        }
        self.balances.insert(key, available - amount);
        Ok(())
    }

    fn credit(&mut self, account: &Address, denom: &str, amount: Decimal) -> Result<(), CapabilityError> {
        let key = (account.as_str().to_string(), denom.to_string());
        let held = self.balances.get(&key).copied().unwrap_or_default();
        let next = held
            .checked_add(amount)
            .ok_or_else(|| rejected("ledger", "balance overflow"))?;
        self.balances.insert(key, next);
        Ok(())
    }
}

/// Fungible balances keyed by `(account, denom)`.
#[derive(Debug, Clone, Default)]
pub struct MemLedger {
    state: Rc<RefCell<LedgerState>>,
}

impl MemLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit native tokens to `account`.
    ///
    /// # Panics
    /// If the balance would overflow.
    pub fn mint_to(&self, account: &str, amount: impl Into<Decimal>) {
        if let Err(err) = self
            .state
            .borrow_mut()
            .credit(&Address::new(account), NATIVE, amount.into())
        {
            panic!("mint_to {account}: {err}");
        }
    }

    pub fn balance_of(&self, account: &str) -> Decimal {
        self.balance_in(account, NATIVE)
    }

    pub fn balance_in(&self, account: &str, denom: &str) -> Decimal {
        self.state
            .borrow()
            .balances
            .get(&(account.to_string(), denom.to_string()))
            .copied()
            .unwrap_or_default()
    }

    pub fn fail_transfers(&self, fail: bool) {
        self.state.borrow_mut().fail_transfers = fail;
    }

    pub fn fail_burns(&self, fail: bool) {
        self.state.borrow_mut().fail_burns = fail;
    }

    /// Successful burn calls so far.
    pub fn burns(&self) -> u32 {
        self.state.borrow().burns
    }

    pub fn total_burned(&self) -> Decimal {
        self.state.borrow().burned
    }
}

impl Ledger for MemLedger {
    fn balance(&self, account: &Address, denom: &str) -> Decimal {
        self.balance_in(account.as_str(), denom)
    }

    fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        denom: &str,
        amount: Decimal,
    ) -> Result<(), CapabilityError> {
        let mut state = self.state.borrow_mut();
        if state.fail_transfers {
            return Err(rejected("ledger", "transfers disabled"));
        }
        state.debit(from, denom, amount)?;
        if let Err(err) = state.credit(to, denom, amount) {
            // Restores what was just debited, cannot overflow
            let _ = state.credit(from, denom, amount);
            return Err(err);
        }
        Ok(())
    }

    fn mint(&mut self, to: &Address, denom: &str, amount: Decimal) -> Result<(), CapabilityError> {
        self.state.borrow_mut().credit(to, denom, amount)
    }

    fn burn(&mut self, from: &Address, denom: &str, amount: Decimal) -> Result<(), CapabilityError> {
        let mut state = self.state.borrow_mut();
        if state.fail_burns {
            return Err(rejected("ledger", "burns disabled"));
        }
        state.debit(from, denom, amount)?;
        state.burned = state.burned.saturating_add(amount);
        state.burns += 1;
        Ok(())
    }
}

// ───────────────────────── Registry ─────────────────────────

type Lot = (String, String, String);

#[derive(Debug, Default)]
struct RegistryState {
    /// (holder, company, class) → shares
    shares: BTreeMap<Lot, Decimal>,
    /// (escrow, owner, company, class) → shares
    owners: BTreeMap<(u64, String, String, String), Decimal>,
    halted: BTreeSet<String>,
    resumes: BTreeMap<String, u32>,
    fail_transfers: bool,
    fail_halt: bool,
}

fn lot(holder: &Address, company: &CompanyId, class_id: &str) -> Lot {
    (
        holder.as_str().to_string(),
        company.as_str().to_string(),
        class_id.to_string(),
    )
}

/// Share registry with beneficial-owner records and trading halts.
#[derive(Debug, Clone, Default)]
pub struct MemRegistry {
    state: Rc<RefCell<RegistryState>>,
}

impl MemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_shares(&self, holder: &str, company: &CompanyId, class_id: &str, shares: i64) {
        self.state
            .borrow_mut()
            .shares
            .insert(lot(&Address::new(holder), company, class_id), Decimal::from(shares));
    }

    pub fn shares_of(&self, holder: &str, company: &CompanyId, class_id: &str) -> Decimal {
        self.state
            .borrow()
            .shares
            .get(&lot(&Address::new(holder), company, class_id))
            .copied()
            .unwrap_or_default()
    }

    /// Live beneficial-owner records.
    pub fn beneficial_owners(&self) -> usize {
        self.state.borrow().owners.len()
    }

    pub fn is_halted(&self, company: &CompanyId) -> bool {
        self.state.borrow().halted.contains(company.as_str())
    }

    /// Number of `resume_trading` calls for `company`.
    pub fn resumes(&self, company: &CompanyId) -> u32 {
        self.state
            .borrow()
            .resumes
            .get(company.as_str())
            .copied()
            .unwrap_or(0)
    }

    pub fn fail_transfers(&self, fail: bool) {
        self.state.borrow_mut().fail_transfers = fail;
    }

    pub fn fail_halt(&self, fail: bool) {
        self.state.borrow_mut().fail_halt = fail;
    }
}

impl Registry for MemRegistry {
    fn shares_held(&self, holder: &Address, company: &CompanyId, class_id: Option<&str>) -> Decimal {
        let state = self.state.borrow();
        match class_id {
            Some(class_id) => state
                .shares
                .get(&lot(holder, company, class_id))
                .copied()
                .unwrap_or_default(),
            None => state
                .shares
                .iter()
                .filter(|((h, c, _), _)| h == holder.as_str() && c == company.as_str())
                .map(|(_, shares)| *shares)
                .sum(),
        }
    }

    fn transfer_shares(
        &mut self,
        from: &Address,
        to: &Address,
        company: &CompanyId,
        class_id: &str,
        shares: Decimal,
    ) -> Result<(), CapabilityError> {
        let mut state = self.state.borrow_mut();
        if state.fail_transfers {
            return Err(rejected("registry", "transfers disabled"));
        }
        let source = lot(from, company, class_id);
        let held = state.shares.get(&source).copied().unwrap_or_default();
        if held < shares {
            return Err(CapabilityError::InsufficientBalance {
                account: from.to_string(),
                asset: format!("{company}/{class_id}"),
                required: shares.to_string(),
                available: held.to_string(),
            });
        }
        state.shares.insert(source.clone(), held - shares);
        let target = lot(to, company, class_id);
        let credited = state.shares.get(&target).copied().unwrap_or_default().checked_add(shares);
        match credited {
            Some(credited) => {
                state.shares.insert(target, credited);
                Ok(())
            }
            None => {
                state.shares.insert(source, held);
                Err(rejected("registry", "share count overflow"))
            }
        }
    }

    fn register_beneficial_owner(
        &mut self,
        _custodian: &Address,
        owner: &Address,
        company: &CompanyId,
        class_id: &str,
        shares: Decimal,
        escrow_id: EscrowId,
    ) -> Result<(), CapabilityError> {
        let (owner, company, class_id) = lot(owner, company, class_id);
        self.state
            .borrow_mut()
            .owners
            .insert((escrow_id.get(), owner, company, class_id), shares);
        Ok(())
    }

    fn unregister_beneficial_owner(
        &mut self,
        _custodian: &Address,
        owner: &Address,
        company: &CompanyId,
        class_id: &str,
        _shares: Decimal,
        escrow_id: EscrowId,
    ) -> Result<(), CapabilityError> {
        let (owner, company, class_id) = lot(owner, company, class_id);
        self.state
            .borrow_mut()
            .owners
            .remove(&(escrow_id.get(), owner, company, class_id));
        Ok(())
    }

    fn halt_trading(&mut self, company: &CompanyId, _reason: &str) -> Result<(), CapabilityError> {
        let mut state = self.state.borrow_mut();
        if state.fail_halt {
            return Err(rejected("registry", "halt unavailable"));
        }
        state.halted.insert(company.as_str().to_string());
        Ok(())
    }

    fn resume_trading(&mut self, company: &CompanyId) -> Result<(), CapabilityError> {
        let mut state = self.state.borrow_mut();
        state.halted.remove(company.as_str());
        *state.resumes.entry(company.as_str().to_string()).or_default() += 1;
        Ok(())
    }
}

// ───────────────────────── Tiers ─────────────────────────

#[derive(Debug, Default)]
struct TierState {
    tiers: BTreeMap<String, Tier>,
    stake_since: BTreeMap<String, i64>,
    rewards: BTreeMap<String, u32>,
    penalties: BTreeMap<String, u32>,
}

/// Tier table with reward and penalty counters.
///
/// Addresses without an explicit bond time report a stake age of one year.
#[derive(Debug, Clone, Default)]
pub struct MemTiers {
    state: Rc<RefCell<TierState>>,
}

impl MemTiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tier(&self, addr: &str, tier: Tier) {
        self.state.borrow_mut().tiers.insert(addr.to_string(), tier);
    }

    pub fn set_stake_since(&self, addr: &str, time: i64) {
        self.state
            .borrow_mut()
            .stake_since
            .insert(addr.to_string(), time);
    }

    /// Reward points credited to `addr`.
    pub fn rewards_for(&self, addr: &str) -> u32 {
        self.state.borrow().rewards.get(addr).copied().unwrap_or(0)
    }

    pub fn penalties_for(&self, addr: &str) -> u32 {
        self.state.borrow().penalties.get(addr).copied().unwrap_or(0)
    }
}

impl TierOracle for MemTiers {
    fn tier_of(&self, addr: &Address) -> Tier {
        self.state
            .borrow()
            .tiers
            .get(addr.as_str())
            .copied()
            .unwrap_or(Tier::None)
    }

    fn count_at_or_above(&self, min: Tier) -> u64 {
        self.state
            .borrow()
            .tiers
            .values()
            .filter(|tier| **tier >= min)
            .count() as u64
    }

    fn stake_age(&self, addr: &Address, now: i64) -> i64 {
        match self.state.borrow().stake_since.get(addr.as_str()) {
            Some(since) => (now - since).max(0),
            None => YEAR,
        }
    }

    fn reward(&mut self, addr: &Address, points: u32) -> Result<(), CapabilityError> {
        *self
            .state
            .borrow_mut()
            .rewards
            .entry(addr.as_str().to_string())
            .or_default() += points;
        Ok(())
    }

    fn penalize(&mut self, addr: &Address, points: u32) -> Result<(), CapabilityError> {
        *self
            .state
            .borrow_mut()
            .penalties
            .entry(addr.as_str().to_string())
            .or_default() += points;
        Ok(())
    }
}

// ───────────────────────── Harness ─────────────────────────

/// A module wired to in-memory collaborators, with a block clock.
pub struct TestEnv {
    pub module: TrustModule<MemStore>,
    pub ledger: MemLedger,
    pub registry: MemRegistry,
    pub tiers: MemTiers,
    pub ctx: BlockContext,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_params(Params::default())
    }

    /// # Panics
    ///
    /// If `params` fail validation.
    pub fn with_params(params: Params) -> Self {
        let ledger = MemLedger::new();
        let registry = MemRegistry::new();
        let tiers = MemTiers::new();
        let caps = Capabilities::new()
            .with_ledger(ledger.clone())
            .with_registry(registry.clone())
            .with_tiers(tiers.clone());
        let module = match TrustModule::new(MemStore::new(), params, caps) {
            Ok(module) => module,
            Err(err) => panic!("test environment params rejected: {err}"),
        };
        Self {
            module,
            ledger,
            registry,
            tiers,
            ctx: BlockContext::new(1, 1_700_000_000),
        }
    }

    pub fn deliver(&mut self, msg: Msg) -> Result<Vec<TrustEvent>, TrustError> {
        let ctx = self.ctx;
        self.module.deliver(&ctx, msg)
    }

    /// Move the clock forward by `secs`, one block higher.
    pub fn advance(&mut self, secs: i64) {
        self.ctx = self.ctx.advance(secs);
    }

    pub fn end_block(&mut self) -> EndBlockSummary {
        let ctx = self.ctx;
        self.module.end_block(&ctx)
    }

    pub fn balance(&self, account: &str) -> Decimal {
        self.ledger.balance_of(account)
    }

    pub fn custody_balance(&self) -> Decimal {
        let custody = self.module.params().custody_account.clone();
        self.ledger.balance_of(custody.as_str())
    }

    /// Mint `stake` to `name` and register it, granting Keeper if it has no tier.
    pub fn register_moderator(&mut self, name: &str, stake: i64) -> Result<Vec<TrustEvent>, TrustError> {
        let address = Address::new(name);
        if self.tiers.tier_of(&address) == Tier::None {
            self.tiers.set_tier(name, Tier::Keeper);
        }
        self.ledger.mint_to(name, stake);
        self.deliver(Msg::RegisterModerator {
            address,
            stake: Decimal::from(stake),
        })
    }

    /// Create a native-token escrow expiring in 30 days.
    pub fn create_escrow(
        &mut self,
        sender: &str,
        recipient: &str,
        moderator: Option<&str>,
        amount: i64,
    ) -> Result<EscrowId, TrustError> {
        let expires_at = self.ctx.time + 30 * 86_400;
        let events = self.deliver(Msg::CreateEscrow {
            sender: Address::new(sender),
            recipient: Address::new(recipient),
            moderator: moderator.map(Address::new),
            assets: vec![Asset::currency(NATIVE, Decimal::from(amount))],
            terms: EscrowTerms::default(),
            expires_at,
        })?;
        events
            .iter()
            .find_map(|event| match event {
                TrustEvent::EscrowCreated(created) => Some(created.escrow_id),
                _ => None,
            })
            .ok_or_else(|| {
                EscrowError::NotFound {
                    escrow_id: "created".to_string(),
                }
                .into()
            })
    }

    /// Mint `amount` to the sender, then create and fund an escrow.
    pub fn create_funded_escrow(
        &mut self,
        sender: &str,
        recipient: &str,
        moderator: Option<&str>,
        amount: i64,
    ) -> Result<EscrowId, TrustError> {
        self.ledger.mint_to(sender, amount);
        let id = self.create_escrow(sender, recipient, moderator, amount)?;
        self.deliver(Msg::FundEscrow {
            funder: Address::new(sender),
            escrow_id: id,
        })?;
        Ok(id)
    }
}
