//! Failure-path and invariant tests
//!
//! Sections:
//! 1. Atomicity: failed collaborator calls leave no trace
//! 2. Rejected messages emit nothing
//! 3. Scheduler re-runs
//! 4. Property tests: trust ceiling and custody conservation
//! 5. Extreme inputs are rejected without touching state

use rust_decimal::Decimal;
use trust::escrow::{EscrowStatus, EscrowTerms};
use trust::testkit::TestEnv;
use trust::{ErrorKind, Msg, TrustEvent};
use trust_types::asset::Asset;
use trust_types::ids::{Address, CompanyId, DisputeId, EscrowId};
use trust_types::tier::Tier;

const DAY: i64 = 86_400;

fn addr(s: &str) -> Address {
    Address::new(s)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// ═══════════════════════════════════════════════════════════════════
// 1. Atomicity
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_failed_burn_changes_nothing() {
    init_tracing();
    let mut env = TestEnv::new();
    env.tiers.set_tier("validator", Tier::Warden);
    env.register_moderator("M", 2_000).unwrap();

    let hash = env.module.state_hash();
    let events = env.module.events().len();
    env.ledger.fail_burns(true);
    let err = env
        .deliver(Msg::SlashModerator {
            validator: addr("validator"),
            moderator: addr("M"),
            fraction: Decimal::new(25, 2),
            reason: "double vote".into(),
        })
        .unwrap_err();

    assert_eq!(err.code(), 406);
    assert_eq!(err.kind(), ErrorKind::Capability);
    assert_eq!(env.module.state_hash(), hash);
    assert_eq!(env.module.events().len(), events);
    assert_eq!(env.custody_balance(), Decimal::from(2_000));
    let m = env.module.moderator(&addr("M")).unwrap().unwrap();
    assert_eq!(m.staked, Decimal::from(2_000));
    assert_eq!(m.reputation, 50);
}

#[test]
fn test_failed_equity_leg_rolls_back_funding() {
    let mut env = TestEnv::new();
    let acme = CompanyId::new("ACME");
    env.ledger.mint_to("alice", 500);
    env.registry.set_shares("alice", &acme, "common", 10);
    let expires_at = env.ctx.time + 7 * DAY;
    env.deliver(Msg::CreateEscrow {
        sender: addr("alice"),
        recipient: addr("bob"),
        moderator: None,
        assets: vec![
            Asset::currency("unative", Decimal::from(500)),
            Asset::equity(acme.clone(), "common", Decimal::from(10), Decimal::from(3)),
        ],
        terms: EscrowTerms::default(),
        expires_at,
    })
    .unwrap();

    let hash = env.module.state_hash();
    env.registry.fail_transfers(true);
    env.deliver(Msg::FundEscrow {
        funder: addr("alice"),
        escrow_id: EscrowId::new(1),
    })
    .unwrap_err();

    // The currency leg already moved must come back
    assert_eq!(env.balance("alice"), Decimal::from(500));
    assert_eq!(env.custody_balance(), Decimal::ZERO);
    assert_eq!(env.registry.shares_of("alice", &acme, "common"), Decimal::from(10));
    assert_eq!(env.registry.beneficial_owners(), 0);
    assert_eq!(env.module.state_hash(), hash);
    let escrow = env.module.escrow(EscrowId::new(1)).unwrap().unwrap();
    assert_eq!(escrow.status, EscrowStatus::Pending);

    env.registry.fail_transfers(false);
    env.deliver(Msg::FundEscrow {
        funder: addr("alice"),
        escrow_id: EscrowId::new(1),
    })
    .unwrap();
    assert_eq!(env.registry.shares_of("alice", &acme, "common"), Decimal::ZERO);
    assert_eq!(env.registry.beneficial_owners(), 1);
}

#[test]
fn test_failed_release_keeps_escrow_funded() {
    let mut env = TestEnv::new();
    let id = env.create_funded_escrow("alice", "bob", None, 1_000).unwrap();
    env.ledger.fail_transfers(true);
    env.deliver(Msg::ReleaseEscrow {
        caller: addr("alice"),
        escrow_id: id,
    })
    .unwrap_err();

    env.ledger.fail_transfers(false);
    assert_eq!(env.module.escrow(id).unwrap().unwrap().status, EscrowStatus::Funded);
    assert_eq!(env.custody_balance(), Decimal::from(1_000));
    assert_eq!(env.balance("bob"), Decimal::ZERO);
}

// ═══════════════════════════════════════════════════════════════════
// 2. Rejected messages
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_rejected_messages_emit_nothing() {
    let mut env = TestEnv::new();
    env.register_moderator("M", 1_500).unwrap();
    let id = env.create_funded_escrow("alice", "bob", None, 100).unwrap();

    let hash = env.module.state_hash();
    let events = env.module.events().len();
    let rejected = vec![
        // Stranger releases
        Msg::ReleaseEscrow {
            caller: addr("mallory"),
            escrow_id: id,
        },
        // Already funded
        Msg::FundEscrow {
            funder: addr("alice"),
            escrow_id: id,
        },
        // Unknown escrow
        Msg::OpenDispute {
            initiator: addr("alice"),
            escrow_id: EscrowId::new(99),
            reason: String::new(),
        },
        // Keeper cannot slash
        Msg::SlashModerator {
            validator: addr("M"),
            moderator: addr("M"),
            fraction: Decimal::ONE,
            reason: String::new(),
        },
        // More than is free
        Msg::RequestUnstake {
            address: addr("M"),
            amount: Decimal::from(1_501),
        },
        // No dispute
        Msg::VoteOnDispute {
            moderator: addr("M"),
            dispute_id: DisputeId::new(1),
            resolution: trust::dispute::Resolution::Split,
            reason: String::new(),
        },
        // Too few reviewers registered
        Msg::SubmitFraudReport {
            reporter: addr("alice"),
            company_id: CompanyId::new("ACME"),
            description: "wash trading".into(),
            evidence_hash: "sha256:00".into(),
        },
    ];
    for msg in rejected {
        let name = msg.type_name();
        assert!(env.deliver(msg).is_err(), "{name} should be rejected");
    }
    assert_eq!(env.module.state_hash(), hash);
    assert_eq!(env.module.events().len(), events);
}

// ═══════════════════════════════════════════════════════════════════
// 3. Scheduler
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_scheduler_rerun_is_idempotent() {
    init_tracing();
    let mut env = TestEnv::new();
    for m in ["m1", "m2", "m3"] {
        env.register_moderator(m, 2_000).unwrap();
    }
    env.create_funded_escrow("alice", "bob", None, 400).unwrap();
    let disputed = env.create_funded_escrow("carol", "dave", None, 600).unwrap();
    env.deliver(Msg::OpenDispute {
        initiator: addr("carol"),
        escrow_id: disputed,
        reason: "wrong item".into(),
    })
    .unwrap();
    env.deliver(Msg::RequestUnstake {
        address: addr("m1"),
        amount: Decimal::from(500),
    })
    .unwrap();

    env.advance(30 * DAY);
    let first = env.end_block();
    assert_eq!(first.escrows_expired, 1);
    assert_eq!(first.disputes_expired, 1);
    assert_eq!(first.unbondings_completed, 1);
    assert_eq!(first.failures, 0);

    let hash = env.module.state_hash();
    let events = env.module.events().len();
    let balances: Vec<_> = ["alice", "bob", "carol", "dave", "m1"]
        .iter()
        .map(|a| env.balance(a))
        .collect();

    assert!(env.end_block().is_idle());
    assert_eq!(env.module.state_hash(), hash);
    assert_eq!(env.module.events().len(), events);
    let after: Vec<_> = ["alice", "bob", "carol", "dave", "m1"]
        .iter()
        .map(|a| env.balance(a))
        .collect();
    assert_eq!(after, balances);

    // Expired dispute splits the net 50/50
    assert_eq!(env.balance("carol"), Decimal::from(297));
    assert_eq!(env.balance("dave"), Decimal::from(297));
}

// ═══════════════════════════════════════════════════════════════════
// 4. Property tests
// ═══════════════════════════════════════════════════════════════════

mod fuzz {
    use super::*;
    use proptest::prelude::*;
    use trust::dispute::Resolution;

    const MODERATORS: [&str; 4] = ["m0", "m1", "m2", "m3"];

    #[derive(Debug, Clone)]
    enum Op {
        Escrow { moderator: usize, amount: i64, dispute: bool },
        Vote { dispute: u64, voter: usize, resolution: u8 },
        Slash { moderator: usize, pct: i64 },
        Unstake { moderator: usize, amount: i64 },
        Advance { secs: i64 },
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (0..4usize, 1..4_000i64, any::<bool>())
                .prop_map(|(moderator, amount, dispute)| Op::Escrow { moderator, amount, dispute }),
            3 => (1..8u64, 0..4usize, 0..3u8)
                .prop_map(|(dispute, voter, resolution)| Op::Vote { dispute, voter, resolution }),
            1 => (0..4usize, 0..=100i64).prop_map(|(moderator, pct)| Op::Slash { moderator, pct }),
            1 => (0..4usize, 1..3_000i64)
                .prop_map(|(moderator, amount)| Op::Unstake { moderator, amount }),
            1 => (1..(10 * DAY)).prop_map(|secs| Op::Advance { secs }),
        ]
    }

    fn resolution(n: u8) -> Resolution {
        match n {
            0 => Resolution::ReleaseToRecipient,
            1 => Resolution::RefundToSender,
            _ => Resolution::Split,
        }
    }

    fn apply(env: &mut TestEnv, op: Op) {
        // Rejections are expected; only the invariants matter
        let _ = match op {
            Op::Escrow {
                moderator,
                amount,
                dispute,
            } => env
                .create_funded_escrow("alice", "bob", Some(MODERATORS[moderator]), amount)
                .and_then(|escrow_id| {
                    if !dispute {
                        return Ok(Vec::new());
                    }
                    env.deliver(Msg::OpenDispute {
                        initiator: addr("bob"),
                        escrow_id,
                        reason: "not as described".into(),
                    })
                }),
            Op::Vote {
                dispute,
                voter,
                resolution: r,
            } => env.deliver(Msg::VoteOnDispute {
                moderator: addr(MODERATORS[voter]),
                dispute_id: DisputeId::new(dispute),
                resolution: resolution(r),
                reason: String::new(),
            }),
            Op::Slash { moderator, pct } => env.deliver(Msg::SlashModerator {
                validator: addr("validator"),
                moderator: addr(MODERATORS[moderator]),
                fraction: Decimal::new(pct, 2),
                reason: "fuzz".into(),
            }),
            Op::Unstake { moderator, amount } => env.deliver(Msg::RequestUnstake {
                address: addr(MODERATORS[moderator]),
                amount: Decimal::from(amount),
            }),
            Op::Advance { secs } => {
                env.advance(secs);
                env.end_block();
                Ok(Vec::new())
            }
        };
    }

    fn check_invariants(env: &TestEnv) -> Result<(), TestCaseError> {
        let moderators = env.module.moderators().unwrap();
        for m in &moderators {
            prop_assert!(
                m.exposure() <= m.trust_ceiling || (m.over_committed && !m.active),
                "{} exposed {} over ceiling {}",
                m.address,
                m.exposure(),
                m.trust_ceiling
            );
            prop_assert!(m.staked >= Decimal::ZERO && m.unbonding >= Decimal::ZERO);
        }

        let bonded: Decimal = moderators.iter().map(|m| m.staked + m.unbonding).sum();
        let mut held = Decimal::ZERO;
        for status in [EscrowStatus::Funded, EscrowStatus::Disputed] {
            held += env
                .module
                .escrows_by_status(status)
                .unwrap()
                .iter()
                .map(|e| e.total_value)
                .sum::<Decimal>();
        }
        prop_assert_eq!(env.custody_balance(), bonded + held);
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_ceiling_and_custody_hold(
            stakes in prop::collection::vec(1_000..5_000i64, 4),
            ops in prop::collection::vec(op(), 1..40),
        ) {
            let mut env = TestEnv::new();
            env.tiers.set_tier("validator", Tier::Warden);
            for (name, stake) in MODERATORS.iter().zip(stakes) {
                env.register_moderator(name, stake).unwrap();
            }
            check_invariants(&env)?;

            for op in ops {
                apply(&mut env, op);
                check_invariants(&env)?;
            }
        }

        #[test]
        fn prop_release_conserves_value(amount in 1..1_000_000i64) {
            let mut env = TestEnv::new();
            let id = env.create_funded_escrow("alice", "bob", None, amount).unwrap();
            let events = env
                .deliver(Msg::ReleaseEscrow { caller: addr("alice"), escrow_id: id })
                .unwrap();

            let fee = env.balance("trust-fees");
            prop_assert_eq!(fee, (Decimal::from(amount) * Decimal::new(1, 2)).trunc());
            prop_assert_eq!(env.balance("bob") + fee, Decimal::from(amount));
            prop_assert_eq!(env.custody_balance(), Decimal::ZERO);
            prop_assert!(matches!(&events[0], TrustEvent::EscrowReleased(e) if e.escrow_fee == fee));
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// 5. Extreme inputs
// ═══════════════════════════════════════════════════════════════════

#[test]
fn test_extreme_inputs_are_rejected_cleanly() {
    init_tracing();
    let mut env = TestEnv::new();
    env.tiers.set_tier("validator", Tier::Steward);
    env.register_moderator("M", 1_500).unwrap();
    let acme = CompanyId::new("ACME");
    let huge = Decimal::from_i128_with_scale(100_000_000_000_000_000_000, 0);
    let escrow = |assets: Vec<Asset>, expires_at: i64| Msg::CreateEscrow {
        sender: addr("alice"),
        recipient: addr("bob"),
        moderator: None,
        assets,
        terms: EscrowTerms::default(),
        expires_at,
    };
    let week = env.ctx.time + 7 * DAY;

    let hash = env.module.state_hash();
    let events = env.module.events().len();
    let cases = vec![
        // Share count times unit value does not fit a Decimal
        (
            escrow(vec![Asset::equity(acme, "common", huge, huge)], week),
            105,
        ),
        // Each lot is valid, the sum is not
        (
            escrow(
                vec![
                    Asset::currency("unative", Decimal::MAX),
                    Asset::currency("unative", Decimal::MAX),
                ],
                week,
            ),
            105,
        ),
        (
            escrow(vec![Asset::currency("unative", Decimal::from(10))], i64::MAX),
            113,
        ),
        (
            Msg::BlacklistModerator {
                validator: addr("validator"),
                moderator: addr("M"),
                reason: "spam".into(),
                permanent: false,
                duration_secs: i64::MAX,
            },
            405,
        ),
        (
            Msg::IncreaseModeratorStake {
                address: addr("M"),
                amount: Decimal::MAX,
            },
            316,
        ),
    ];
    for (msg, code) in cases {
        let name = msg.type_name();
        let err = env.deliver(msg).unwrap_err();
        assert_eq!(err.code(), code, "{name}: {err}");
    }
    assert_eq!(env.module.state_hash(), hash);
    assert_eq!(env.module.events().len(), events);

    // The module keeps accepting ordinary traffic
    let id = env.create_funded_escrow("alice", "bob", None, 250).unwrap();
    assert_eq!(
        env.module.escrow(id).unwrap().unwrap().status,
        EscrowStatus::Funded
    );
    let m = env.module.moderator(&addr("M")).unwrap().unwrap();
    assert_eq!(m.staked, Decimal::from(1_500));
    assert!(!m.blacklisted);
}
