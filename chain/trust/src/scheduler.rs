//! Periodic Scheduler
//!
//! Deadline-driven work, run once per block after its transactions:
//! 1. Expire Pending and Funded escrows past their expiry
//! 2. Finalize disputes whose appeal window closed, split expired ones
//! 3. Complete matured unbondings
//! 4. Lift temporary bans that ran out
//! 5. Clear investigations past their review deadline, freeze companies
//!    whose warning window is over
//!
//! Due items are collected before any is touched. Each item then runs in
//! its own transaction: a failure is logged, counted and retried next
//! block without rolling back the others. Every step re-checks that its
//! item is still due, so a second run for the same tick is a no-op.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use trust_types::ids::Address;

use persistence::KvStore;

use crate::context::BlockContext;
use crate::dispute::DisputeDuty;
use crate::errors::TrustError;
use crate::investigation::InvestigationDuty;
use crate::state::TrustModule;
use crate::unbonding::UnbondingStatus;

/// Work done by one `end_block` run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndBlockSummary {
    pub escrows_expired: u32,
    pub disputes_finalized: u32,
    /// Split 50/50 after the voting deadline
    pub disputes_expired: u32,
    pub unbondings_completed: u32,
    pub bans_lifted: u32,
    pub investigations_cleared: u32,
    pub companies_frozen: u32,
    /// Items that errored and stay due
    pub failures: u32,
}

impl EndBlockSummary {
    pub fn advanced(&self) -> u32 {
        self.escrows_expired
            + self.disputes_finalized
            + self.disputes_expired
            + self.unbondings_completed
            + self.bans_lifted
            + self.investigations_cleared
            + self.companies_frozen
    }

    pub fn is_idle(&self) -> bool {
        self.advanced() == 0 && self.failures == 0
    }
}

impl<S: KvStore> TrustModule<S> {
    pub fn end_block(&mut self, ctx: &BlockContext) -> EndBlockSummary {
        let mut summary = EndBlockSummary::default();

        // Step 1: escrow expiry
        if let Some(ids) = collect(&mut summary, "escrows", self.expired_escrow_ids(ctx.time)) {
            for id in ids {
                if self.run_item(&mut summary, "escrow", &id, |m| m.expire_escrow(ctx, id)) {
                    summary.escrows_expired += 1;
                }
            }
        }

        // Step 2: disputes
        if let Some(due) = collect(&mut summary, "disputes", self.due_disputes(ctx.time)) {
            for (id, duty) in due {
                if self.run_item(&mut summary, "dispute", &id, |m| m.advance_dispute(ctx, id, duty)) {
                    match duty {
                        DisputeDuty::Finalize => summary.disputes_finalized += 1,
                        DisputeDuty::Expire => summary.disputes_expired += 1,
                    }
                }
            }
        }

        // Step 3: unbondings
        if let Some(records) = collect(&mut summary, "unbondings", self.matured_unbondings(ctx.time)) {
            for record in records {
                let address = record.address;
                if self.run_item(&mut summary, "unbonding", &address, |m| {
                    m.complete_matured(ctx, &address)
                }) {
                    summary.unbondings_completed += 1;
                }
            }
        }

        // Step 4: bans
        if let Some(addresses) = collect(&mut summary, "bans", self.expired_bans(ctx.time)) {
            for address in addresses {
                if self.run_item(&mut summary, "ban", &address, |m| m.expire_ban(ctx, &address)) {
                    summary.bans_lifted += 1;
                }
            }
        }

        // Step 5: investigations
        if let Some(due) = collect(&mut summary, "investigations", self.due_investigations(ctx.time)) {
            for (id, duty) in due {
                if self.run_item(&mut summary, "investigation", &id, |m| {
                    m.advance_investigation(ctx, id, duty)
                }) {
                    match duty {
                        InvestigationDuty::Expire => summary.investigations_cleared += 1,
                        InvestigationDuty::Freeze => summary.companies_frozen += 1,
                    }
                }
            }
        }

        if summary.is_idle() {
            debug!(height = ctx.height, "End block: nothing due");
        } else {
            info!(
                height = ctx.height,
                advanced = summary.advanced(),
                failures = summary.failures,
                summary = ?summary,
                "End block processed"
            );
        }
        summary
    }

    /// Run one scheduler step in its own transaction.
    fn run_item(
        &mut self,
        summary: &mut EndBlockSummary,
        what: &'static str,
        item: &dyn Display,
        step: impl FnOnce(&mut Self) -> Result<bool, TrustError>,
    ) -> bool {
        match self.atomic(step) {
            Ok(true) => {
                debug!(what, item = %item, "Scheduler advanced item");
                true
            }
            Ok(false) => {
                debug!(what, item = %item, "Scheduler item no longer due");
                false
            }
            Err(err) => {
                summary.failures += 1;
                warn!(
                    what,
                    item = %item,
                    code = err.code(),
                    error = %err,
                    "Scheduler item failed, retrying next block"
                );
                false
            }
        }
    }

    fn complete_matured(&mut self, ctx: &BlockContext, address: &Address) -> Result<bool, TrustError> {
        match self.unbonding(address)? {
            Some(record) if record.status == UnbondingStatus::Active && record.is_matured(ctx.time) => {
                self.finish_unbonding(record)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Unwrap a due-list scan, counting a failed scan and skipping its step.
fn collect<T>(
    summary: &mut EndBlockSummary,
    what: &'static str,
    scan: Result<Vec<T>, TrustError>,
) -> Option<Vec<T>> {
    match scan {
        Ok(items) => Some(items),
        Err(err) => {
            summary.failures += 1;
            error!(what, code = err.code(), error = %err, "Scheduler scan failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escrow::{EscrowStatus, EscrowTerms};
    use crate::msg::Msg;
    use crate::testkit::TestEnv;
    use rust_decimal::Decimal;
    use trust_types::asset::Asset;
    use trust_types::ids::{CompanyId, EscrowId};

    const MONTH: i64 = 30 * 86_400;

    #[test]
    fn test_idle_block() {
        let mut env = TestEnv::new();
        let summary = env.end_block();
        assert!(summary.is_idle());
        assert_eq!(summary, EndBlockSummary::default());
    }

    #[test]
    fn test_expires_pending_and_refunds_funded() {
        let mut env = TestEnv::new();
        let pending = env.create_escrow("alice", "bob", None, 300).unwrap();
        let funded = env.create_funded_escrow("carol", "dave", None, 1_000).unwrap();

        env.advance(MONTH - 1);
        assert_eq!(env.end_block().escrows_expired, 0);
        env.advance(1);
        let summary = env.end_block();
        assert_eq!(summary.escrows_expired, 2);

        let status = |id: EscrowId| env.module.escrow(id).unwrap().unwrap().status;
        assert_eq!(status(pending), EscrowStatus::Expired);
        assert_eq!(status(funded), EscrowStatus::Expired);
        assert_eq!(env.balance("carol"), Decimal::from(990));
        assert_eq!(env.custody_balance(), Decimal::ZERO);
    }

    #[test]
    fn test_second_run_same_tick_is_noop() {
        let mut env = TestEnv::new();
        env.create_funded_escrow("alice", "bob", None, 500).unwrap();
        env.advance(MONTH);
        assert_eq!(env.end_block().escrows_expired, 1);

        let hash = env.module.state_hash();
        let events = env.module.events().len();
        assert!(env.end_block().is_idle());
        assert_eq!(env.module.state_hash(), hash);
        assert_eq!(env.module.events().len(), events);
    }

    #[test]
    fn test_completes_matured_unbonding() {
        let mut env = TestEnv::new();
        env.register_moderator("mod", 3_000).unwrap();
        env.deliver(Msg::RequestUnstake {
            address: Address::new("mod"),
            amount: Decimal::from(1_000),
        })
        .unwrap();

        env.advance(1_209_600);
        assert_eq!(env.end_block().unbondings_completed, 1);
        assert_eq!(env.balance("mod"), Decimal::from(1_000));
        assert!(env.module.unbonding(&Address::new("mod")).unwrap().is_none());
    }

    #[test]
    fn test_failed_item_does_not_block_others() {
        let mut env = TestEnv::new();
        let acme = CompanyId::new("ACME");
        env.registry.set_shares("alice", &acme, "common", 5);
        let expires_at = env.ctx.time + MONTH;
        env.deliver(Msg::CreateEscrow {
            sender: Address::new("alice"),
            recipient: Address::new("bob"),
            moderator: None,
            assets: vec![Asset::equity(acme.clone(), "common", Decimal::from(5), Decimal::ONE)],
            terms: EscrowTerms::default(),
            expires_at,
        })
        .unwrap();
        env.deliver(Msg::FundEscrow {
            funder: Address::new("alice"),
            escrow_id: EscrowId::new(1),
        })
        .unwrap();
        let pending = env.create_escrow("carol", "dave", None, 100).unwrap();

        env.registry.fail_transfers(true);
        env.advance(MONTH);
        let summary = env.end_block();
        assert_eq!(summary.escrows_expired, 1);
        assert_eq!(summary.failures, 1);
        let status = |id: EscrowId| env.module.escrow(id).unwrap().unwrap().status;
        assert_eq!(status(EscrowId::new(1)), EscrowStatus::Funded);
        assert_eq!(status(pending), EscrowStatus::Expired);

        // Retried once the registry recovers
        env.registry.fail_transfers(false);
        env.advance(1);
        assert_eq!(env.end_block().escrows_expired, 1);
        assert_eq!(env.registry.shares_of("alice", &acme, "common"), Decimal::from(5));
    }
}
