//! End-to-end scenarios
//!
//! Each test drives the module only through `Msg` delivery and `end_block`,
//! the way a host chain would:
//! - Escrow with an assigned moderator, funded and released
//! - Disputed escrow decided 2:1 by moderator vote
//! - Fraud investigation escalated through both review rounds to a freeze
//! - Slashing below the minimum stake, then draining an unbonding record

use rust_decimal::Decimal;
use trust::dispute::{DisputeStatus, Resolution};
use trust::escrow::{EscrowStatus, EscrowTerms};
use trust::investigation::{ClearCause, InvestigationStatus};
use trust::testkit::TestEnv;
use trust::unbonding::UnbondingStatus;
use trust::{Msg, TrustEvent};
use trust_types::asset::Asset;
use trust_types::ids::{Address, CompanyId, DisputeId, EscrowId, InvestigationId};
use trust_types::tier::Tier;

const HOUR: i64 = 3_600;
const DAY: i64 = 24 * HOUR;

fn addr(s: &str) -> Address {
    Address::new(s)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// ═══════════════════════════════════════════════════════════════════
// Escrow with moderator, immediate release
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_moderated_escrow_release() {
    init_tracing();
    let mut env = TestEnv::new();
    env.register_moderator("M", 2_000).unwrap();
    let m = env.module.moderator(&addr("M")).unwrap().unwrap();
    assert_eq!(m.trust_ceiling, Decimal::from(2_000));

    env.ledger.mint_to("alice", 1_000);
    let expires_at = env.ctx.time + 7 * DAY;
    env.deliver(Msg::CreateEscrow {
        sender: addr("alice"),
        recipient: addr("bob"),
        moderator: Some(addr("M")),
        assets: vec![Asset::currency("unative", Decimal::from(1_000))],
        terms: EscrowTerms {
            moderator_fee_rate: Decimal::new(2, 2),
            ..EscrowTerms::default()
        },
        expires_at,
    })
    .unwrap();
    let id = EscrowId::new(1);

    env.deliver(Msg::FundEscrow {
        funder: addr("alice"),
        escrow_id: id,
    })
    .unwrap();
    assert_eq!(env.custody_balance(), Decimal::from(3_000));
    let m = env.module.moderator(&addr("M")).unwrap().unwrap();
    assert_eq!(m.reserved_value, Decimal::from(1_000));
    assert_eq!(m.active_dispute_value, Decimal::ZERO);

    env.deliver(Msg::ReleaseEscrow {
        caller: addr("alice"),
        escrow_id: id,
    })
    .unwrap();

    // 1% escrow fee, 2% moderator fee
    assert_eq!(env.balance("bob"), Decimal::from(970));
    assert_eq!(env.balance("trust-fees"), Decimal::from(10));
    assert_eq!(env.balance("M"), Decimal::from(20));
    assert_eq!(env.balance("alice"), Decimal::ZERO);
    assert_eq!(env.custody_balance(), Decimal::from(2_000));

    let m = env.module.moderator(&addr("M")).unwrap().unwrap();
    assert_eq!(m.active_dispute_value, Decimal::ZERO);
    assert_eq!(m.reserved_value, Decimal::ZERO);
    assert_eq!(
        env.module.escrow(id).unwrap().unwrap().status,
        EscrowStatus::Released
    );
}

// ═══════════════════════════════════════════════════════════════════
// Dispute decided by vote
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_dispute_majority_releases_to_recipient() {
    init_tracing();
    let mut env = TestEnv::new();
    for m in ["m1", "m2", "m3"] {
        env.register_moderator(m, 2_000).unwrap();
    }
    let escrow_id = env.create_funded_escrow("alice", "bob", None, 1_000).unwrap();
    env.deliver(Msg::OpenDispute {
        initiator: addr("bob"),
        escrow_id,
        reason: "paid but never shipped".into(),
    })
    .unwrap();
    let dispute_id = DisputeId::new(1);

    let votes = [
        ("m1", Resolution::ReleaseToRecipient),
        ("m2", Resolution::RefundToSender),
        ("m3", Resolution::ReleaseToRecipient),
    ];
    for (m, resolution) in votes {
        env.deliver(Msg::VoteOnDispute {
            moderator: addr(m),
            dispute_id,
            resolution,
            reason: String::new(),
        })
        .unwrap();
    }
    let dispute = env.module.dispute(dispute_id).unwrap().unwrap();
    assert_eq!(dispute.status, DisputeStatus::Resolved);
    assert_eq!(dispute.resolution, Some(Resolution::ReleaseToRecipient));

    env.advance(48 * HOUR + 1);
    assert_eq!(env.end_block().disputes_finalized, 1);

    assert_eq!(env.balance("bob"), Decimal::from(990));
    assert_eq!(env.balance("alice"), Decimal::ZERO);
    let dispute = env.module.dispute(dispute_id).unwrap().unwrap();
    assert_eq!(dispute.status, DisputeStatus::Final);

    let winner = env.module.moderator(&addr("m1")).unwrap().unwrap();
    let loser = env.module.moderator(&addr("m2")).unwrap().unwrap();
    assert_eq!(winner.reputation, 52);
    assert_eq!(winner.disputes_handled, 1);
    assert_eq!(loser.reputation, 50);
    assert_eq!(loser.disputes_handled, 0);
    assert_eq!(env.tiers.penalties_for("m2"), 0);
    for m in [winner, loser] {
        assert_eq!(m.active_dispute_value, Decimal::ZERO);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Investigation through to freeze
// ═══════════════════════════════════════════════════════════════════

fn investigation_env() -> TestEnv {
    let env = TestEnv::new();
    for w in ["w1", "w2", "w3"] {
        env.tiers.set_tier(w, Tier::Warden);
    }
    for s in ["s1", "s2", "s3", "s4", "s5"] {
        env.tiers.set_tier(s, Tier::Steward);
    }
    env
}

fn open_case(env: &mut TestEnv, company: &CompanyId) -> InvestigationId {
    let events = env
        .deliver(Msg::SubmitFraudReport {
            reporter: addr("analyst"),
            company_id: company.clone(),
            description: "inventory does not exist".into(),
            evidence_hash: "sha256:9f2c".into(),
        })
        .unwrap();
    events
        .iter()
        .find_map(|e| match e {
            TrustEvent::InvestigationCreated(c) => Some(c.investigation_id),
            _ => None,
        })
        .unwrap()
}

fn review(env: &mut TestEnv, id: InvestigationId, voter: &str, approve: bool) {
    env.deliver(Msg::VoteOnInvestigation {
        voter: addr(voter),
        investigation_id: id,
        approve,
        reason: String::new(),
    })
    .unwrap();
}

#[test]
fn test_investigation_escalates_to_freeze() {
    init_tracing();
    let mut env = investigation_env();
    let company = CompanyId::new("C");
    let id = open_case(&mut env, &company);

    review(&mut env, id, "w1", true);
    review(&mut env, id, "w2", false);
    review(&mut env, id, "w3", true);
    let inv = env.module.investigation(id).unwrap().unwrap();
    assert_eq!(inv.status, InvestigationStatus::StewardReview);
    assert_eq!(inv.phase_deadline, Some(env.ctx.time + 72 * HOUR));

    for (s, approve) in [("s1", true), ("s2", false), ("s3", true), ("s4", false), ("s5", true)] {
        review(&mut env, id, s, approve);
    }
    let inv = env.module.investigation(id).unwrap().unwrap();
    assert_eq!(inv.status, InvestigationStatus::FreezeApproved);
    assert_eq!(inv.warning_expires_at, Some(env.ctx.time + 24 * HOUR));
    assert!(!env.registry.is_halted(&company));

    env.advance(24 * HOUR);
    assert_eq!(env.end_block().companies_frozen, 1);
    let inv = env.module.investigation(id).unwrap().unwrap();
    assert_eq!(inv.status, InvestigationStatus::Frozen);
    assert!(env.registry.is_halted(&company));
    assert!(env
        .module
        .events()
        .iter()
        .any(|e| matches!(e, TrustEvent::CompanyFrozen(f) if f.company_id == company)));

    // Slot released: the company can be reported again
    open_case(&mut env, &company);
    assert_eq!(env.module.investigations_of(&company).unwrap().len(), 2);
}

#[test]
fn test_unreviewed_investigation_clears_at_deadline() {
    let mut env = investigation_env();
    let company = CompanyId::new("C");
    let id = open_case(&mut env, &company);

    env.advance(48 * HOUR + 1);
    assert_eq!(env.end_block().investigations_cleared, 1);
    let inv = env.module.investigation(id).unwrap().unwrap();
    assert_eq!(inv.status, InvestigationStatus::Cleared);
    assert_eq!(inv.clear_cause, Some(ClearCause::DeadlineExpired { votes_cast: 0 }));
    assert_eq!(env.registry.resumes(&company), 1);
}

// ═══════════════════════════════════════════════════════════════════
// Slashing
// ═══════════════════════════════════════════════════════════════════

fn slash(env: &mut TestEnv, fraction: Decimal) -> Vec<TrustEvent> {
    env.deliver(Msg::SlashModerator {
        validator: addr("validator"),
        moderator: addr("M"),
        fraction,
        reason: "collusion".into(),
    })
    .unwrap()
}

#[test]
fn test_slash_below_minimum_then_zero_burn() {
    init_tracing();
    let mut env = TestEnv::new();
    env.tiers.set_tier("validator", Tier::Warden);
    env.register_moderator("M", 1_500).unwrap();

    let events = slash(&mut env, Decimal::new(5, 1));
    let TrustEvent::ModeratorSlashed(slashed) = &events[0] else {
        panic!("expected a slash event, got {events:?}");
    };
    assert_eq!(slashed.amount, Decimal::from(750));
    assert!(slashed.deactivated);
    let m = env.module.moderator(&addr("M")).unwrap().unwrap();
    assert_eq!(m.staked, Decimal::from(750));
    assert!(!m.active);
    let action = env.module.action(slashed.action_id).unwrap();
    assert_eq!(action.reason, "collusion");

    // Withdraw the rest, then lose it all while unbonding
    env.deliver(Msg::RequestUnstake {
        address: addr("M"),
        amount: Decimal::from(750),
    })
    .unwrap();
    slash(&mut env, Decimal::ONE);
    let record = env.module.unbonding(&addr("M")).unwrap().unwrap();
    assert_eq!(record.status, UnbondingStatus::Slashed);
    assert_eq!(env.ledger.burns(), 2);

    let events = slash(&mut env, Decimal::new(5, 1));
    assert!(matches!(
        &events[0],
        TrustEvent::ModeratorSlashed(e) if e.amount.is_zero()
    ));
    assert_eq!(env.ledger.burns(), 2);
    assert_eq!(env.ledger.total_burned(), Decimal::from(1_500));
    assert_eq!(env.custody_balance(), Decimal::ZERO);
}
