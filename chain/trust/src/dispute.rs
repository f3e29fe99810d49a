//! Dispute Engine
//!
//! ```text
//! open ──▶ Open ──vote──▶ Voting ──quorum──▶ Resolved ──window elapsed──▶ Final
//!                                              │  ▲
//!                                       appeal │  │ quorum
//!                                              ▼  │
//!                                            Appealed
//! ```
//!
//! A quorum decides the resolution; assets move only at finalization, after
//! the appeal window or immediately once no appeal is left. When too few
//! moderators can vote, or the voting deadline passes without quorum, the
//! escrow is split 50/50 instead.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use trust_types::ids::{Address, DisputeId, EscrowId};

use persistence::KvStore;

use crate::context::BlockContext;
use crate::errors::{DisputeError, ModeratorError, TrustError};
use crate::escrow::{Escrow, EscrowStatus, Payout};
use crate::events::{
    DisputeAppealed, DisputeFinalized, DisputeOpened, DisputeResolved, DisputeVoted,
    EmergencyResolution, EvidenceSubmitted, TrustEvent,
};
use crate::keys::{self, Counter};
use crate::security::{self, Role};
use crate::state::TrustModule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisputeStatus {
    Open,
    Voting,
    /// Quorum reached, appeal window running
    Resolved,
    Appealed,
    Final,
}

impl DisputeStatus {
    pub fn code(&self) -> u8 {
        match self {
            DisputeStatus::Open => 1,
            DisputeStatus::Voting => 2,
            DisputeStatus::Resolved => 3,
            DisputeStatus::Appealed => 4,
            DisputeStatus::Final => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DisputeStatus::Open => "open",
            DisputeStatus::Voting => "voting",
            DisputeStatus::Resolved => "resolved",
            DisputeStatus::Appealed => "appealed",
            DisputeStatus::Final => "final",
        }
    }

    /// Accepting votes.
    pub fn is_voting(&self) -> bool {
        matches!(
            self,
            DisputeStatus::Open | DisputeStatus::Voting | DisputeStatus::Appealed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    ReleaseToRecipient,
    RefundToSender,
    Split,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmergencyCause {
    /// Not enough eligible moderators for the quorum
    InsufficientModerators,
    /// Voting deadline passed without quorum
    DeadlineExpired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub submitter: Address,
    pub content_hash: String,
    pub description: String,
    pub submitted_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeVote {
    pub moderator: Address,
    pub resolution: Resolution,
    pub reason: String,
    pub voted_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    pub escrow_id: EscrowId,
    pub initiator: Address,
    pub reason: String,
    pub evidence: Vec<Evidence>,
    /// Current round, in cast order
    pub votes: Vec<DisputeVote>,
    pub status: DisputeStatus,
    pub resolution: Option<Resolution>,
    pub emergency: bool,
    pub votes_required: u32,
    pub deadline: i64,
    pub appeal_count: u32,
    pub max_appeals: u32,
    pub appeal_deadline: Option<i64>,
    pub resolved_at: Option<i64>,
    /// Escrow value at opening; booked on every voter
    pub escrow_value: Decimal,
    pub large: bool,
    pub opened_at: i64,
}

impl Dispute {
    pub fn has_voted(&self, moderator: &Address) -> bool {
        self.votes.iter().any(|v| v.moderator == *moderator)
    }

    fn invalid_status(&self) -> DisputeError {
        DisputeError::InvalidStatus {
            dispute_id: self.id.to_string(),
            status: self.status.name().to_string(),
        }
    }
}

/// Plurality winner of a round and its vote count.
///
/// Ties go to the resolution whose first vote was cast earliest.
pub fn tally(votes: &[DisputeVote]) -> Option<(Resolution, u32)> {
    let mut counts: Vec<(Resolution, u32)> = Vec::with_capacity(3);
    for vote in votes {
        match counts.iter_mut().find(|(r, _)| *r == vote.resolution) {
            Some((_, n)) => *n += 1,
            None => counts.push((vote.resolution, 1)),
        }
    }
    counts
        .into_iter()
        .fold(None, |best, (resolution, n)| match best {
            Some((_, top)) if top >= n => best,
            _ => Some((resolution, n)),
        })
}

/// Work the scheduler found for one dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DisputeDuty {
    Finalize,
    Expire,
}

impl<S: KvStore> TrustModule<S> {
    // ───────────────────────── Queries ─────────────────────────

    pub fn dispute(&self, id: DisputeId) -> Result<Option<Dispute>, TrustError> {
        self.load(&keys::dispute(id))
    }

    pub fn dispute_for_escrow(&self, escrow_id: EscrowId) -> Result<Option<Dispute>, TrustError> {
        match self.load::<DisputeId>(&keys::dispute_by_escrow(escrow_id))? {
            Some(id) => self.dispute(id),
            None => Ok(None),
        }
    }

    pub fn disputes_by_status(&self, status: DisputeStatus) -> Result<Vec<Dispute>, TrustError> {
        self.index_ids(&keys::dispute_status_prefix(status.code()))
            .into_iter()
            .map(|id| self.require_dispute(DisputeId::new(id)))
            .collect()
    }

    fn require_dispute(&self, id: DisputeId) -> Result<Dispute, TrustError> {
        self.dispute(id)?.ok_or_else(|| {
            DisputeError::NotFound {
                dispute_id: id.to_string(),
            }
            .into()
        })
    }

    fn put_dispute(
        &mut self,
        dispute: &mut Dispute,
        status: DisputeStatus,
    ) -> Result<(), TrustError> {
        if dispute.status != status {
            let old = keys::dispute_status(dispute.status.code(), dispute.id);
            dispute.status = status;
            self.reindex(&old, keys::dispute_status(status.code(), dispute.id));
        }
        self.save(keys::dispute(dispute.id), dispute)
    }

    // ───────────────────────── Handlers ─────────────────────────

    pub(crate) fn open_dispute(
        &mut self,
        ctx: &BlockContext,
        initiator: Address,
        escrow_id: EscrowId,
        reason: String,
    ) -> Result<DisputeId, TrustError> {
        let mut escrow = self.require_escrow(escrow_id)?;
        if !Role::of(&escrow, &initiator).is_participant() {
            return Err(DisputeError::NotParticipant {
                caller: initiator.to_string(),
            }
            .into());
        }
        if self.store.contains(&keys::dispute_by_escrow(escrow_id)) {
            return Err(DisputeError::AlreadyDisputed {
                escrow_id: escrow_id.to_string(),
            }
            .into());
        }
        escrow.expect_status(EscrowStatus::Funded)?;

        let id = DisputeId::new(self.next_id(Counter::Dispute)?);
        let value = escrow.total_value;
        let mut dispute = Dispute {
            id,
            escrow_id,
            initiator,
            reason,
            evidence: Vec::new(),
            votes: Vec::new(),
            status: DisputeStatus::Open,
            resolution: None,
            emergency: false,
            votes_required: self.params.votes_required_for(value),
            deadline: ctx.time + self.params.dispute_period_secs,
            appeal_count: 0,
            max_appeals: self.params.max_appeals,
            appeal_deadline: None,
            resolved_at: None,
            escrow_value: value,
            large: self.params.is_large(value),
            opened_at: ctx.time,
        };
        self.put_escrow_status(&mut escrow, EscrowStatus::Disputed)?;
        self.save(keys::dispute(id), &dispute)?;
        self.save(keys::dispute_by_escrow(escrow_id), &id)?;
        self.mark(keys::dispute_status(dispute.status.code(), id));

        info!(
            dispute_id = %id,
            escrow_id = %escrow_id,
            initiator = %dispute.initiator,
            votes_required = dispute.votes_required,
            large = dispute.large,
            "Dispute opened"
        );
        self.emit(TrustEvent::DisputeOpened(DisputeOpened {
            dispute_id: id,
            escrow_id,
            initiator: dispute.initiator.clone(),
            votes_required: dispute.votes_required,
            deadline: dispute.deadline,
        }));

        self.ensure_voter_pool(ctx, &mut dispute, &escrow)?;
        Ok(id)
    }

    pub(crate) fn submit_evidence(
        &mut self,
        ctx: &BlockContext,
        submitter: Address,
        dispute_id: DisputeId,
        content_hash: String,
        description: String,
    ) -> Result<(), TrustError> {
        let mut dispute = self.require_dispute(dispute_id)?;
        let escrow = self.require_escrow(dispute.escrow_id)?;
        if !Role::of(&escrow, &submitter).is_participant() {
            return Err(DisputeError::NotParticipant {
                caller: submitter.to_string(),
            }
            .into());
        }
        if matches!(dispute.status, DisputeStatus::Resolved | DisputeStatus::Final) {
            return Err(dispute.invalid_status().into());
        }
        if dispute.evidence.len() >= self.params.max_evidence as usize {
            return Err(DisputeError::EvidenceLimit {
                max: self.params.max_evidence,
            }
            .into());
        }
        if content_hash.trim().is_empty() {
            return Err(DisputeError::EmptyContentHash.into());
        }

        dispute.evidence.push(Evidence {
            submitter: submitter.clone(),
            content_hash: content_hash.clone(),
            description,
            submitted_at: ctx.time,
        });
        self.save(keys::dispute(dispute_id), &dispute)?;

        debug!(dispute_id = %dispute_id, submitter = %submitter, "Evidence submitted");
        self.emit(TrustEvent::EvidenceSubmitted(EvidenceSubmitted {
            dispute_id,
            submitter,
            content_hash,
        }));
        Ok(())
    }

    pub(crate) fn vote_on_dispute(
        &mut self,
        ctx: &BlockContext,
        voter: Address,
        dispute_id: DisputeId,
        resolution: Resolution,
        reason: String,
    ) -> Result<(), TrustError> {
        let mut dispute = self.require_dispute(dispute_id)?;
        if !dispute.status.is_voting() {
            return Err(dispute.invalid_status().into());
        }
        if ctx.time > dispute.deadline {
            return Err(DisputeError::DeadlinePassed {
                deadline: dispute.deadline,
            }
            .into());
        }
        let escrow = self.require_escrow(dispute.escrow_id)?;
        if Role::of(&escrow, &voter).is_participant() {
            return Err(DisputeError::PartyCannotVote {
                moderator: voter.to_string(),
            }
            .into());
        }
        let mut moderator = self.require_moderator(&voter)?;
        if moderator.blacklisted {
            return Err(ModeratorError::Blacklisted {
                address: voter.to_string(),
            }
            .into());
        }
        if !moderator.active {
            return Err(ModeratorError::Inactive {
                address: voter.to_string(),
            }
            .into());
        }
        if dispute.large {
            let required = self.params.large_dispute_tier;
            if security::tier_of(&self.caps, &voter)? < required {
                return Err(DisputeError::InsufficientTier {
                    voter: voter.to_string(),
                    required,
                }
                .into());
            }
        }
        if dispute.has_voted(&voter) {
            return Err(DisputeError::AlreadyVoted {
                moderator: voter.to_string(),
            }
            .into());
        }

        self.book_vote_exposure(&mut moderator, dispute.escrow_value)?;
        dispute.votes.push(DisputeVote {
            moderator: voter.clone(),
            resolution,
            reason,
            voted_at: ctx.time,
        });
        let votes_cast = dispute.votes.len() as u32;
        self.emit(TrustEvent::DisputeVoted(DisputeVoted {
            dispute_id,
            moderator: voter.clone(),
            resolution,
            votes_cast,
            votes_required: dispute.votes_required,
        }));
        debug!(
            dispute_id = %dispute_id,
            moderator = %voter,
            ?resolution,
            votes_cast,
            votes_required = dispute.votes_required,
            "Dispute vote recorded"
        );

        if votes_cast < dispute.votes_required {
            let status = if dispute.status == DisputeStatus::Open {
                DisputeStatus::Voting
            } else {
                dispute.status
            };
            return self.put_dispute(&mut dispute, status);
        }

        let Some((winner, votes_for)) = tally(&dispute.votes) else {
            return self.put_dispute(&mut dispute, DisputeStatus::Voting);
        };
        let appeal_deadline = ctx.time + self.params.appeal_window_secs;
        dispute.resolution = Some(winner);
        dispute.resolved_at = Some(ctx.time);
        dispute.appeal_deadline = Some(appeal_deadline);
        self.put_dispute(&mut dispute, DisputeStatus::Resolved)?;

        info!(
            dispute_id = %dispute_id,
            resolution = ?winner,
            votes_for,
            appeal_deadline,
            "Dispute resolved"
        );
        self.emit(TrustEvent::DisputeResolved(DisputeResolved {
            dispute_id,
            resolution: winner,
            votes_for,
            appeal_deadline,
        }));

        if dispute.appeal_count >= dispute.max_appeals {
            self.finalize_dispute(ctx, &mut dispute)?;
        }
        Ok(())
    }

    pub(crate) fn appeal_dispute(
        &mut self,
        ctx: &BlockContext,
        appellant: Address,
        dispute_id: DisputeId,
        reason: String,
    ) -> Result<(), TrustError> {
        let mut dispute = self.require_dispute(dispute_id)?;
        let escrow = self.require_escrow(dispute.escrow_id)?;
        if !Role::of(&escrow, &appellant).is_participant() {
            return Err(DisputeError::NotParticipant {
                caller: appellant.to_string(),
            }
            .into());
        }
        if dispute.status != DisputeStatus::Resolved {
            return Err(dispute.invalid_status().into());
        }
        if dispute.appeal_count >= dispute.max_appeals {
            return Err(DisputeError::AppealLimit {
                max: dispute.max_appeals,
            }
            .into());
        }
        if let Some(closed_at) = dispute.appeal_deadline {
            if ctx.time > closed_at {
                return Err(DisputeError::AppealWindowClosed { closed_at }.into());
            }
        }

        self.release_round(&mut dispute)?;
        dispute.appeal_count += 1;
        dispute.votes_required = dispute
            .votes_required
            .max(self.params.appeal_votes_required);
        dispute.deadline = ctx.time + self.params.dispute_period_secs;
        dispute.resolution = None;
        dispute.resolved_at = None;
        dispute.appeal_deadline = None;
        self.put_dispute(&mut dispute, DisputeStatus::Appealed)?;

        info!(
            dispute_id = %dispute_id,
            appellant = %appellant,
            appeal_count = dispute.appeal_count,
            reason = %reason,
            "Dispute appealed"
        );
        self.emit(TrustEvent::DisputeAppealed(DisputeAppealed {
            dispute_id,
            appellant,
            appeal_count: dispute.appeal_count,
            votes_required: dispute.votes_required,
            deadline: dispute.deadline,
        }));

        self.ensure_voter_pool(ctx, &mut dispute, &escrow)
    }

    // ───────────────────────── Resolution ─────────────────────────

    /// Fall back to the emergency split when too few moderators can vote.
    fn ensure_voter_pool(
        &mut self,
        ctx: &BlockContext,
        dispute: &mut Dispute,
        escrow: &Escrow,
    ) -> Result<(), TrustError> {
        let eligible =
            self.eligible_voters(dispute.escrow_value, &[&escrow.sender, &escrow.recipient])?;
        if eligible >= dispute.votes_required {
            return Ok(());
        }
        warn!(
            dispute_id = %dispute.id,
            eligible,
            required = dispute.votes_required,
            "Moderator pool too small, splitting escrow"
        );
        self.emergency_resolve(ctx, dispute, EmergencyCause::InsufficientModerators)
    }

    /// Release every vote's exposure and clear the round.
    fn release_round(&mut self, dispute: &mut Dispute) -> Result<(), TrustError> {
        for vote in std::mem::take(&mut dispute.votes) {
            self.release_vote_exposure(&vote.moderator, dispute.escrow_value)?;
        }
        Ok(())
    }

    fn emergency_resolve(
        &mut self,
        ctx: &BlockContext,
        dispute: &mut Dispute,
        cause: EmergencyCause,
    ) -> Result<(), TrustError> {
        self.release_round(dispute)?;
        dispute.resolution = Some(Resolution::Split);
        dispute.emergency = true;
        dispute.resolved_at = Some(ctx.time);
        self.put_dispute(dispute, DisputeStatus::Final)?;

        let mut escrow = self.require_escrow(dispute.escrow_id)?;
        let half = Payout::Split {
            sender_share: Decimal::new(5, 1),
        };
        self.settle_escrow(&mut escrow, half, EscrowStatus::Resolved, ctx.time)?;

        info!(
            dispute_id = %dispute.id,
            escrow_id = %dispute.escrow_id,
            ?cause,
            "Emergency resolution executed"
        );
        self.emit(TrustEvent::EmergencyResolution(EmergencyResolution {
            dispute_id: dispute.id,
            escrow_id: dispute.escrow_id,
            cause,
        }));
        Ok(())
    }

    fn finalize_dispute(
        &mut self,
        ctx: &BlockContext,
        dispute: &mut Dispute,
    ) -> Result<(), TrustError> {
        let Some(resolution) = dispute.resolution else {
            return Err(dispute.invalid_status().into());
        };
        let winners: Vec<Address> = dispute
            .votes
            .iter()
            .filter(|v| v.resolution == resolution)
            .map(|v| v.moderator.clone())
            .collect();
        for vote in &dispute.votes {
            self.release_vote_exposure(&vote.moderator, dispute.escrow_value)?;
        }
        self.put_dispute(dispute, DisputeStatus::Final)?;

        let mut escrow = self.require_escrow(dispute.escrow_id)?;
        let payout = match resolution {
            Resolution::ReleaseToRecipient => Payout::ToRecipient,
            Resolution::RefundToSender => Payout::ToSender,
            Resolution::Split => Payout::Split {
                sender_share: escrow.sender_share,
            },
        };
        let settlement =
            self.settle_escrow(&mut escrow, payout, EscrowStatus::Resolved, ctx.time)?;
        for winner in &winners {
            self.reward_winner(winner)?;
        }

        info!(
            dispute_id = %dispute.id,
            escrow_id = %dispute.escrow_id,
            ?resolution,
            winners = winners.len(),
            "Dispute finalized"
        );
        self.emit(TrustEvent::DisputeFinalized(DisputeFinalized {
            dispute_id: dispute.id,
            escrow_id: dispute.escrow_id,
            resolution,
            winners,
            escrow_fee: settlement.escrow_fee,
            moderator_fee: settlement.moderator_fee,
        }));
        Ok(())
    }

    // ───────────────────────── Scheduler ─────────────────────────

    /// Disputes with an elapsed appeal window or voting deadline.
    pub(crate) fn due_disputes(
        &self,
        now: i64,
    ) -> Result<Vec<(DisputeId, DisputeDuty)>, TrustError> {
        let mut due = Vec::new();
        for dispute in self.disputes_by_status(DisputeStatus::Resolved)? {
            if dispute.appeal_deadline.is_some_and(|d| now > d) {
                due.push((dispute.id, DisputeDuty::Finalize));
            }
        }
        for status in [
            DisputeStatus::Open,
            DisputeStatus::Voting,
            DisputeStatus::Appealed,
        ] {
            for dispute in self.disputes_by_status(status)? {
                if now > dispute.deadline {
                    due.push((dispute.id, DisputeDuty::Expire));
                }
            }
        }
        due.sort_by_key(|(id, _)| *id);
        Ok(due)
    }

    /// Carry out a scheduler duty. Returns false if it is no longer due.
    pub(crate) fn advance_dispute(
        &mut self,
        ctx: &BlockContext,
        id: DisputeId,
        duty: DisputeDuty,
    ) -> Result<bool, TrustError> {
        let mut dispute = self.require_dispute(id)?;
        match duty {
            DisputeDuty::Finalize => {
                let due = dispute.status == DisputeStatus::Resolved
                    && dispute.appeal_deadline.is_some_and(|d| ctx.time > d);
                if !due {
                    return Ok(false);
                }
                self.finalize_dispute(ctx, &mut dispute)?;
            }
            DisputeDuty::Expire => {
                if !dispute.status.is_voting() || ctx.time <= dispute.deadline {
                    return Ok(false);
                }
                self.emergency_resolve(ctx, &mut dispute, EmergencyCause::DeadlineExpired)?;
            }
        }
        Ok(true)
    }
}
