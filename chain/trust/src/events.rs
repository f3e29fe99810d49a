//! Module events
//!
//! Immutable records emitted on every committed state transition. Events of
//! a rejected transaction are discarded together with its writes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trust_types::asset::Asset;
use trust_types::ids::{
    ActionId, Address, CompanyId, DisputeId, EscrowId, InvestigationId, ReportId,
};
use trust_types::tier::{ModeratorTier, Tier};

use crate::dispute::{EmergencyCause, Resolution};
use crate::investigation::{ClearCause, InvestigationStatus};

// ─── Escrow ───

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowCreated {
    pub escrow_id: EscrowId,
    pub sender: Address,
    pub recipient: Address,
    pub moderator: Option<Address>,
    pub total_value: Decimal,
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowFunded {
    pub escrow_id: EscrowId,
    pub funder: Address,
    pub assets: Vec<Asset>,
}

/// Assets left custody for one party.
///
/// Emitted for releases, refunds and expiry refunds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowSettled {
    pub escrow_id: EscrowId,
    pub paid_to: Address,
    pub escrow_fee: Decimal,
    pub moderator_fee: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowCancelled {
    pub escrow_id: EscrowId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowConfirmed {
    pub escrow_id: EscrowId,
    pub party: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowExpired {
    pub escrow_id: EscrowId,
    /// True when funded assets went back to the sender
    pub refunded: bool,
}

// ─── Dispute ───

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeOpened {
    pub dispute_id: DisputeId,
    pub escrow_id: EscrowId,
    pub initiator: Address,
    pub votes_required: u32,
    pub deadline: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSubmitted {
    pub dispute_id: DisputeId,
    pub submitter: Address,
    pub content_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeVoted {
    pub dispute_id: DisputeId,
    pub moderator: Address,
    pub resolution: Resolution,
    pub votes_cast: u32,
    pub votes_required: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeResolved {
    pub dispute_id: DisputeId,
    pub resolution: Resolution,
    pub votes_for: u32,
    pub appeal_deadline: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeAppealed {
    pub dispute_id: DisputeId,
    pub appellant: Address,
    pub appeal_count: u32,
    pub votes_required: u32,
    pub deadline: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeFinalized {
    pub dispute_id: DisputeId,
    pub escrow_id: EscrowId,
    pub resolution: Resolution,
    pub winners: Vec<Address>,
    pub escrow_fee: Decimal,
    pub moderator_fee: Decimal,
}

/// 50/50 split executed without a quorum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyResolution {
    pub dispute_id: DisputeId,
    pub escrow_id: EscrowId,
    pub cause: EmergencyCause,
}

// ─── Trust ledger ───

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeratorRegistered {
    pub address: Address,
    pub stake: Decimal,
    pub tier: ModeratorTier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeratorStakeIncreased {
    pub address: Address,
    pub amount: Decimal,
    pub staked: Decimal,
    pub reactivated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeratorTierChanged {
    pub address: Address,
    pub from: ModeratorTier,
    pub to: ModeratorTier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnstakeRequested {
    pub address: Address,
    pub amount: Decimal,
    pub completes_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnstakeCompleted {
    pub address: Address,
    pub amount: Decimal,
    pub deactivated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnstakeCancelled {
    pub address: Address,
    pub amount: Decimal,
}

// ─── Oversight ───

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeratorSlashed {
    pub action_id: ActionId,
    pub validator: Address,
    pub moderator: Address,
    pub amount: Decimal,
    pub reason: String,
    pub over_committed: bool,
    pub deactivated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeratorBlacklisted {
    pub action_id: ActionId,
    pub validator: Address,
    pub moderator: Address,
    pub permanent: bool,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeratorUnblacklisted {
    pub action_id: ActionId,
    pub actor: Address,
    pub moderator: Address,
    /// Lifted by the scheduler rather than a validator
    pub expired: bool,
}

// ─── Investigation ───

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudReportSubmitted {
    pub report_id: ReportId,
    pub reporter: Address,
    pub company_id: CompanyId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigationCreated {
    pub investigation_id: InvestigationId,
    pub company_id: CompanyId,
    pub report_id: ReportId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigationPhaseChanged {
    pub investigation_id: InvestigationId,
    pub from: InvestigationStatus,
    pub to: InvestigationStatus,
    pub deadline: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigationVoted {
    pub investigation_id: InvestigationId,
    pub voter: Address,
    pub tier: Tier,
    pub approve: bool,
    pub phase: InvestigationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreezeWarningIssued {
    pub investigation_id: InvestigationId,
    pub company_id: CompanyId,
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyFrozen {
    pub investigation_id: InvestigationId,
    pub company_id: CompanyId,
    pub frozen_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigationCleared {
    pub investigation_id: InvestigationId,
    pub company_id: CompanyId,
    pub cause: ClearCause,
}

// ─── Governance ───

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamsUpdated {
    pub admin: Address,
}

/// Enum wrapper for all module events, enabling uniform handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustEvent {
    EscrowCreated(EscrowCreated),
    EscrowFunded(EscrowFunded),
    EscrowReleased(EscrowSettled),
    EscrowRefunded(EscrowSettled),
    EscrowCancelled(EscrowCancelled),
    EscrowConfirmed(EscrowConfirmed),
    EscrowExpired(EscrowExpired),
    DisputeOpened(DisputeOpened),
    EvidenceSubmitted(EvidenceSubmitted),
    DisputeVoted(DisputeVoted),
    DisputeResolved(DisputeResolved),
    DisputeAppealed(DisputeAppealed),
    DisputeFinalized(DisputeFinalized),
    EmergencyResolution(EmergencyResolution),
    ModeratorRegistered(ModeratorRegistered),
    ModeratorStakeIncreased(ModeratorStakeIncreased),
    ModeratorTierChanged(ModeratorTierChanged),
    UnstakeRequested(UnstakeRequested),
    UnstakeCompleted(UnstakeCompleted),
    UnstakeCancelled(UnstakeCancelled),
    ModeratorSlashed(ModeratorSlashed),
    ModeratorBlacklisted(ModeratorBlacklisted),
    ModeratorUnblacklisted(ModeratorUnblacklisted),
    FraudReportSubmitted(FraudReportSubmitted),
    InvestigationCreated(InvestigationCreated),
    InvestigationPhaseChanged(InvestigationPhaseChanged),
    InvestigationVoted(InvestigationVoted),
    FreezeWarningIssued(FreezeWarningIssued),
    CompanyFrozen(CompanyFrozen),
    InvestigationCleared(InvestigationCleared),
    ParamsUpdated(ParamsUpdated),
}

impl TrustEvent {
    /// Stable event type name for hosts that index events by string.
    pub fn name(&self) -> &'static str {
        match self {
            TrustEvent::EscrowCreated(_) => "escrow_created",
            TrustEvent::EscrowFunded(_) => "escrow_funded",
            TrustEvent::EscrowReleased(_) => "escrow_released",
            TrustEvent::EscrowRefunded(_) => "escrow_refunded",
            TrustEvent::EscrowCancelled(_) => "escrow_cancelled",
            TrustEvent::EscrowConfirmed(_) => "escrow_confirmed",
            TrustEvent::EscrowExpired(_) => "escrow_expired",
            TrustEvent::DisputeOpened(_) => "dispute_opened",
            TrustEvent::EvidenceSubmitted(_) => "evidence_submitted",
            TrustEvent::DisputeVoted(_) => "dispute_voted",
            TrustEvent::DisputeResolved(_) => "dispute_resolved",
            TrustEvent::DisputeAppealed(_) => "dispute_appealed",
            TrustEvent::DisputeFinalized(_) => "dispute_finalized",
            TrustEvent::EmergencyResolution(_) => "emergency_resolution",
            TrustEvent::ModeratorRegistered(_) => "moderator_registered",
            TrustEvent::ModeratorStakeIncreased(_) => "moderator_stake_increased",
            TrustEvent::ModeratorTierChanged(_) => "moderator_tier_changed",
            TrustEvent::UnstakeRequested(_) => "unstake_requested",
            TrustEvent::UnstakeCompleted(_) => "unstake_completed",
            TrustEvent::UnstakeCancelled(_) => "unstake_cancelled",
            TrustEvent::ModeratorSlashed(_) => "moderator_slashed",
            TrustEvent::ModeratorBlacklisted(_) => "moderator_blacklisted",
            TrustEvent::ModeratorUnblacklisted(_) => "moderator_unblacklisted",
            TrustEvent::FraudReportSubmitted(_) => "fraud_report_submitted",
            TrustEvent::InvestigationCreated(_) => "investigation_created",
            TrustEvent::InvestigationPhaseChanged(_) => "investigation_phase_changed",
            TrustEvent::InvestigationVoted(_) => "investigation_voted",
            TrustEvent::FreezeWarningIssued(_) => "freeze_warning_issued",
            TrustEvent::CompanyFrozen(_) => "company_frozen",
            TrustEvent::InvestigationCleared(_) => "investigation_cleared",
            TrustEvent::ParamsUpdated(_) => "params_updated",
        }
    }
}
