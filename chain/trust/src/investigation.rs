//! Investigation Engine
//!
//! Tiered review of fraud reports against a listed company:
//!
//! ```text
//! Preliminary ─▶ WardenReview ─approve─▶ StewardReview ─approve─▶ FreezeApproved ─warning─▶ Frozen
//!                     │                        │                        (no reversal)
//!                     └── reject / expiry / cancel ──▶ Cleared ◀────────┘
//! ```
//!
//! One non-terminal investigation per company. Reviewers must hold the
//! phase's tier, hold no shares in the company, and have stake older than
//! the minimum age. The freeze halt is retried every block until the
//! registry accepts it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use trust_types::ids::{Address, CompanyId, InvestigationId, ReportId};
use trust_types::tier::Tier;

use persistence::KvStore;

use crate::context::BlockContext;
use crate::errors::{InvestigationError, TrustError};
use crate::events::{
    CompanyFrozen, FraudReportSubmitted, FreezeWarningIssued, InvestigationCleared,
    InvestigationCreated, InvestigationPhaseChanged, InvestigationVoted, TrustEvent,
};
use crate::keys::{self, Counter};
use crate::security;
use crate::state::TrustModule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvestigationStatus {
    /// Transient; advances on creation
    Preliminary,
    WardenReview,
    StewardReview,
    /// Warning window running; cannot be reversed
    FreezeApproved,
    Frozen,
    Cleared,
}

impl InvestigationStatus {
    pub fn code(&self) -> u8 {
        match self {
            InvestigationStatus::Preliminary => 1,
            InvestigationStatus::WardenReview => 2,
            InvestigationStatus::StewardReview => 3,
            InvestigationStatus::FreezeApproved => 4,
            InvestigationStatus::Frozen => 5,
            InvestigationStatus::Cleared => 6,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InvestigationStatus::Preliminary => "preliminary",
            InvestigationStatus::WardenReview => "warden_review",
            InvestigationStatus::StewardReview => "steward_review",
            InvestigationStatus::FreezeApproved => "freeze_approved",
            InvestigationStatus::Frozen => "frozen",
            InvestigationStatus::Cleared => "cleared",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvestigationStatus::Frozen | InvestigationStatus::Cleared)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClearCause {
    /// Quorum reached without enough approvals
    InsufficientApprovals,
    DeadlineExpired { votes_cast: u32 },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierVote {
    pub voter: Address,
    pub tier: Tier,
    pub approve: bool,
    pub reason: String,
    pub voted_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    Open,
    UnderInvestigation,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudReport {
    pub id: ReportId,
    pub reporter: Address,
    pub company_id: CompanyId,
    pub description: String,
    pub evidence_hash: String,
    pub status: ReportStatus,
    pub investigation_id: Option<InvestigationId>,
    pub submitted_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyInvestigation {
    pub id: InvestigationId,
    pub company_id: CompanyId,
    pub report_id: ReportId,
    pub reporter: Address,
    pub status: InvestigationStatus,
    pub warden_votes: Vec<TierVote>,
    pub steward_votes: Vec<TierVote>,
    /// Review deadline of the current phase
    pub phase_deadline: Option<i64>,
    pub warning_expires_at: Option<i64>,
    pub created_at: i64,
    pub frozen_at: Option<i64>,
    pub cleared_at: Option<i64>,
    pub clear_cause: Option<ClearCause>,
}

impl CompanyInvestigation {
    /// Votes of the current review phase.
    pub fn phase_votes(&self) -> &[TierVote] {
        match self.status {
            InvestigationStatus::StewardReview => &self.steward_votes,
            _ => &self.warden_votes,
        }
    }

    pub fn approvals(&self) -> u32 {
        self.phase_votes().iter().filter(|v| v.approve).count() as u32
    }

    fn invalid_status(&self) -> InvestigationError {
        InvestigationError::InvalidStatus {
            investigation_id: self.id.to_string(),
            status: self.status.name().to_string(),
        }
    }
}

/// Work the scheduler found for one investigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InvestigationDuty {
    /// Review deadline passed
    Expire,
    /// Warning window over, halt trading
    Freeze,
}

impl<S: KvStore> TrustModule<S> {
    // ───────────────────────── Queries ─────────────────────────

    pub fn investigation(
        &self,
        id: InvestigationId,
    ) -> Result<Option<CompanyInvestigation>, TrustError> {
        self.load(&keys::investigation(id))
    }

    /// Every investigation ever opened against `company`, oldest first.
    pub fn investigations_of(
        &self,
        company: &CompanyId,
    ) -> Result<Vec<CompanyInvestigation>, TrustError> {
        self.index_ids(&keys::investigation_company_prefix(company))
            .into_iter()
            .map(|id| self.require_investigation(InvestigationId::new(id)))
            .collect()
    }

    pub fn active_investigation(
        &self,
        company: &CompanyId,
    ) -> Result<Option<CompanyInvestigation>, TrustError> {
        match self.load::<InvestigationId>(&keys::active_investigation(company))? {
            Some(id) => self.investigation(id),
            None => Ok(None),
        }
    }

    pub fn investigations_by_status(
        &self,
        status: InvestigationStatus,
    ) -> Result<Vec<CompanyInvestigation>, TrustError> {
        self.index_ids(&keys::investigation_status_prefix(status.code()))
            .into_iter()
            .map(|id| self.require_investigation(InvestigationId::new(id)))
            .collect()
    }

    pub fn report(&self, id: ReportId) -> Result<FraudReport, TrustError> {
        self.load(&keys::report(id))?.ok_or_else(|| {
            InvestigationError::ReportNotFound {
                report_id: id.to_string(),
            }
            .into()
        })
    }

    pub fn reports_of(&self, company: &CompanyId) -> Result<Vec<FraudReport>, TrustError> {
        self.index_ids(&keys::report_company_prefix(company))
            .into_iter()
            .map(|id| self.report(ReportId::new(id)))
            .collect()
    }

    fn require_investigation(&self, id: InvestigationId) -> Result<CompanyInvestigation, TrustError> {
        self.investigation(id)?.ok_or_else(|| {
            InvestigationError::NotFound {
                investigation_id: id.to_string(),
            }
            .into()
        })
    }

    fn put_investigation(
        &mut self,
        investigation: &mut CompanyInvestigation,
        status: InvestigationStatus,
    ) -> Result<(), TrustError> {
        if investigation.status != status {
            let old = keys::investigation_status(investigation.status.code(), investigation.id);
            investigation.status = status;
            self.reindex(&old, keys::investigation_status(status.code(), investigation.id));
        }
        self.save(keys::investigation(investigation.id), investigation)
    }

    // ───────────────────────── Handlers ─────────────────────────

    pub(crate) fn submit_fraud_report(
        &mut self,
        ctx: &BlockContext,
        reporter: Address,
        company_id: CompanyId,
        description: String,
        evidence_hash: String,
    ) -> Result<InvestigationId, TrustError> {
        let max = self.params.max_report_description;
        if description.is_empty() || description.len() > max as usize {
            return Err(InvestigationError::InvalidDescription {
                len: description.len(),
                max,
            }
            .into());
        }
        if evidence_hash.trim().is_empty() {
            return Err(InvestigationError::EmptyEvidence.into());
        }
        if self.store.contains(&keys::active_investigation(&company_id)) {
            return Err(InvestigationError::DuplicateInvestigation {
                company_id: company_id.to_string(),
            }
            .into());
        }
        let available = self.caps.tiers()?.count_at_or_above(self.params.reviewer_tier);
        let required = self.params.min_available_reviewers;
        if available < required {
            return Err(InvestigationError::InsufficientReviewers {
                available,
                required,
            }
            .into());
        }

        let report_id = ReportId::new(self.next_id(Counter::Report)?);
        let id = InvestigationId::new(self.next_id(Counter::Investigation)?);

        let report = FraudReport {
            id: report_id,
            reporter: reporter.clone(),
            company_id: company_id.clone(),
            description,
            evidence_hash,
            status: ReportStatus::UnderInvestigation,
            investigation_id: Some(id),
            submitted_at: ctx.time,
        };
        self.save(keys::report(report_id), &report)?;
        self.mark(keys::report_by_company(&company_id, report_id));

        let mut investigation = CompanyInvestigation {
            id,
            company_id: company_id.clone(),
            report_id,
            reporter: reporter.clone(),
            status: InvestigationStatus::Preliminary,
            warden_votes: Vec::new(),
            steward_votes: Vec::new(),
            phase_deadline: None,
            warning_expires_at: None,
            created_at: ctx.time,
            frozen_at: None,
            cleared_at: None,
            clear_cause: None,
        };
        self.save(keys::investigation(id), &investigation)?;
        self.mark(keys::investigation_by_company(&company_id, id));
        self.mark(keys::investigation_status(investigation.status.code(), id));
        self.save(keys::active_investigation(&company_id), &id)?;

        info!(
            investigation_id = %id,
            report_id = %report_id,
            company_id = %company_id,
            reporter = %reporter,
            "Investigation opened"
        );
        self.emit(TrustEvent::FraudReportSubmitted(FraudReportSubmitted {
            report_id,
            reporter,
            company_id: company_id.clone(),
        }));
        self.emit(TrustEvent::InvestigationCreated(InvestigationCreated {
            investigation_id: id,
            company_id,
            report_id,
        }));

        let deadline = ctx.time + self.params.warden_review_secs;
        self.change_phase(&mut investigation, InvestigationStatus::WardenReview, Some(deadline))?;
        Ok(id)
    }

    pub(crate) fn vote_on_investigation(
        &mut self,
        ctx: &BlockContext,
        voter: Address,
        id: InvestigationId,
        approve: bool,
        reason: String,
    ) -> Result<(), TrustError> {
        let mut investigation = self.require_investigation(id)?;
        let (required, quorum, threshold) = match investigation.status {
            InvestigationStatus::WardenReview => (
                Tier::Warden,
                self.params.warden_quorum,
                self.params.warden_approvals,
            ),
            InvestigationStatus::StewardReview => (
                Tier::Steward,
                self.params.steward_quorum,
                self.params.steward_approvals,
            ),
            _ => return Err(investigation.invalid_status().into()),
        };
        if let Some(deadline) = investigation.phase_deadline {
            if ctx.time > deadline {
                return Err(InvestigationError::DeadlinePassed { deadline }.into());
            }
        }
        let tier = security::require_tier(&self.caps, &voter, required, |actual| {
            InvestigationError::InsufficientTier {
                voter: voter.to_string(),
                required,
                actual,
            }
        })?;
        let holds_shares = self
            .caps
            .registry()?
            .shares_held(&voter, &investigation.company_id, None)
            > Decimal::ZERO;
        if voter == investigation.reporter || holds_shares {
            return Err(InvestigationError::ConflictOfInterest {
                voter: voter.to_string(),
                company_id: investigation.company_id.to_string(),
            }
            .into());
        }
        let age = self.caps.tiers()?.stake_age(&voter, ctx.time);
        if age < self.params.min_stake_age_secs {
            return Err(InvestigationError::StakeTooYoung {
                voter: voter.to_string(),
                age,
                minimum: self.params.min_stake_age_secs,
            }
            .into());
        }
        if investigation.phase_votes().iter().any(|v| v.voter == voter) {
            return Err(InvestigationError::AlreadyVoted {
                voter: voter.to_string(),
            }
            .into());
        }

        let phase = investigation.status;
        let vote = TierVote {
            voter: voter.clone(),
            tier,
            approve,
            reason,
            voted_at: ctx.time,
        };
        match phase {
            InvestigationStatus::StewardReview => investigation.steward_votes.push(vote),
            _ => investigation.warden_votes.push(vote),
        }
        let cast = investigation.phase_votes().len() as u32;
        debug!(investigation_id = %id, voter = %voter, approve, cast, quorum, "Investigation vote");
        self.emit(TrustEvent::InvestigationVoted(InvestigationVoted {
            investigation_id: id,
            voter,
            tier,
            approve,
            phase,
        }));

        if cast < quorum {
            return self.save(keys::investigation(id), &investigation);
        }
        if investigation.approvals() >= threshold {
            self.escalate(ctx, &mut investigation)
        } else {
            self.clear_investigation(ctx, &mut investigation, ClearCause::InsufficientApprovals)
        }
    }

    pub(crate) fn cancel_investigation(
        &mut self,
        ctx: &BlockContext,
        admin: &Address,
        id: InvestigationId,
        reason: String,
    ) -> Result<(), TrustError> {
        let required = self.params.admin_tier;
        security::require_tier(&self.caps, admin, required, |actual| {
            InvestigationError::InsufficientTier {
                voter: admin.to_string(),
                required,
                actual,
            }
        })?;
        let mut investigation = self.require_investigation(id)?;
        match investigation.status {
            InvestigationStatus::FreezeApproved => {
                return Err(InvestigationError::FreezeIrreversible.into())
            }
            status if status.is_terminal() => return Err(investigation.invalid_status().into()),
            _ => {}
        }
        info!(investigation_id = %id, admin = %admin, reason = %reason, "Investigation cancelled");
        self.clear_investigation(ctx, &mut investigation, ClearCause::Cancelled)
    }

    // ───────────────────────── Transitions ─────────────────────────

    fn change_phase(
        &mut self,
        investigation: &mut CompanyInvestigation,
        to: InvestigationStatus,
        deadline: Option<i64>,
    ) -> Result<(), TrustError> {
        let from = investigation.status;
        investigation.phase_deadline = deadline;
        self.put_investigation(investigation, to)?;
        info!(
            investigation_id = %investigation.id,
            company_id = %investigation.company_id,
            from = from.name(),
            to = to.name(),
            deadline = ?deadline,
            "Investigation phase changed"
        );
        self.emit(TrustEvent::InvestigationPhaseChanged(InvestigationPhaseChanged {
            investigation_id: investigation.id,
            from,
            to,
            deadline,
        }));
        Ok(())
    }

    /// Move an approved review to the next phase.
    fn escalate(
        &mut self,
        ctx: &BlockContext,
        investigation: &mut CompanyInvestigation,
    ) -> Result<(), TrustError> {
        match investigation.status {
            InvestigationStatus::WardenReview => {
                let deadline = ctx.time + self.params.steward_review_secs;
                self.change_phase(investigation, InvestigationStatus::StewardReview, Some(deadline))
            }
            InvestigationStatus::StewardReview => {
                let expires_at = ctx.time + self.params.freeze_warning_secs;
                investigation.warning_expires_at = Some(expires_at);
                self.change_phase(investigation, InvestigationStatus::FreezeApproved, Some(expires_at))?;
                warn!(
                    investigation_id = %investigation.id,
                    company_id = %investigation.company_id,
                    expires_at,
                    "Freeze warning issued"
                );
                self.emit(TrustEvent::FreezeWarningIssued(FreezeWarningIssued {
                    investigation_id: investigation.id,
                    company_id: investigation.company_id.clone(),
                    expires_at,
                }));
                Ok(())
            }
            _ => Err(investigation.invalid_status().into()),
        }
    }

    fn clear_investigation(
        &mut self,
        ctx: &BlockContext,
        investigation: &mut CompanyInvestigation,
        cause: ClearCause,
    ) -> Result<(), TrustError> {
        investigation.cleared_at = Some(ctx.time);
        investigation.clear_cause = Some(cause.clone());
        investigation.phase_deadline = None;
        self.put_investigation(investigation, InvestigationStatus::Cleared)?;
        self.close_case(investigation)?;

        let company = investigation.company_id.clone();
        match self.caps.registry_mut() {
            Ok(registry) => {
                if let Err(err) = registry.resume_trading(&company) {
                    warn!(company_id = %company, error = %err, "Trading resume failed");
                }
            }
            Err(err) => warn!(company_id = %company, error = %err, "Trading resume skipped"),
        }

        info!(
            investigation_id = %investigation.id,
            company_id = %company,
            cause = ?cause,
            "Investigation cleared"
        );
        self.emit(TrustEvent::InvestigationCleared(InvestigationCleared {
            investigation_id: investigation.id,
            company_id: company,
            cause,
        }));
        Ok(())
    }

    /// Release the company's slot and close the source report.
    fn close_case(&mut self, investigation: &CompanyInvestigation) -> Result<(), TrustError> {
        self.remove(&keys::active_investigation(&investigation.company_id));
        let mut report = self.report(investigation.report_id)?;
        report.status = ReportStatus::Closed;
        self.save(keys::report(report.id), &report)
    }

    fn freeze_company(
        &mut self,
        ctx: &BlockContext,
        investigation: &mut CompanyInvestigation,
    ) -> Result<(), TrustError> {
        let company = investigation.company_id.clone();
        let reason = format!("fraud investigation {}", investigation.id);
        self.caps.registry_mut()?.halt_trading(&company, &reason)?;

        investigation.frozen_at = Some(ctx.time);
        investigation.phase_deadline = None;
        self.put_investigation(investigation, InvestigationStatus::Frozen)?;
        self.close_case(investigation)?;

        info!(investigation_id = %investigation.id, company_id = %company, "Company frozen");
        self.emit(TrustEvent::CompanyFrozen(CompanyFrozen {
            investigation_id: investigation.id,
            company_id: company,
            frozen_at: ctx.time,
        }));
        Ok(())
    }

    // ───────────────────────── Scheduler ─────────────────────────

    pub(crate) fn due_investigations(
        &self,
        now: i64,
    ) -> Result<Vec<(InvestigationId, InvestigationDuty)>, TrustError> {
        let mut due = Vec::new();
        for status in [
            InvestigationStatus::WardenReview,
            InvestigationStatus::StewardReview,
        ] {
            for investigation in self.investigations_by_status(status)? {
                if investigation.phase_deadline.is_some_and(|d| now > d) {
                    due.push((investigation.id, InvestigationDuty::Expire));
                }
            }
        }
        for investigation in self.investigations_by_status(InvestigationStatus::FreezeApproved)? {
            if investigation.warning_expires_at.is_some_and(|at| now >= at) {
                due.push((investigation.id, InvestigationDuty::Freeze));
            }
        }
        due.sort_by_key(|(id, _)| *id);
        Ok(due)
    }

    /// Carry out a scheduler duty. Returns false if it is no longer due.
    pub(crate) fn advance_investigation(
        &mut self,
        ctx: &BlockContext,
        id: InvestigationId,
        duty: InvestigationDuty,
    ) -> Result<bool, TrustError> {
        let mut investigation = self.require_investigation(id)?;
        match duty {
            InvestigationDuty::Expire => {
                let in_review = matches!(
                    investigation.status,
                    InvestigationStatus::WardenReview | InvestigationStatus::StewardReview
                );
                if !in_review || !investigation.phase_deadline.is_some_and(|d| ctx.time > d) {
                    return Ok(false);
                }
                let votes_cast = investigation.phase_votes().len() as u32;
                self.clear_investigation(
                    ctx,
                    &mut investigation,
                    ClearCause::DeadlineExpired { votes_cast },
                )?;
            }
            InvestigationDuty::Freeze => {
                let due = investigation.status == InvestigationStatus::FreezeApproved
                    && investigation.warning_expires_at.is_some_and(|at| ctx.time >= at);
                if !due {
                    return Ok(false);
                }
                self.freeze_company(ctx, &mut investigation)?;
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::Msg;
    use crate::testkit::TestEnv;

    const WARDENS: [&str; 3] = ["w1", "w2", "w3"];
    const STEWARDS: [&str; 5] = ["s1", "s2", "s3", "s4", "s5"];

    fn acme() -> CompanyId {
        CompanyId::new("ACME")
    }

    fn env_with_reviewers() -> TestEnv {
        let env = TestEnv::new();
        for w in WARDENS {
            env.tiers.set_tier(w, Tier::Warden);
        }
        for s in STEWARDS {
            env.tiers.set_tier(s, Tier::Steward);
        }
        env.tiers.set_tier("archon", Tier::Archon);
        env
    }

    fn report(env: &mut TestEnv) -> Result<InvestigationId, TrustError> {
        env.deliver(Msg::SubmitFraudReport {
            reporter: Address::new("whistle"),
            company_id: acme(),
            description: "revenue booked twice".into(),
            evidence_hash: "sha256:ab12".into(),
        })?;
        let id = env.module.events().iter().rev().find_map(|e| match e {
            TrustEvent::InvestigationCreated(c) => Some(c.investigation_id),
            _ => None,
        });
        Ok(id.unwrap())
    }

    fn vote(
        env: &mut TestEnv,
        who: &str,
        id: InvestigationId,
        approve: bool,
    ) -> Result<Vec<TrustEvent>, TrustError> {
        env.deliver(Msg::VoteOnInvestigation {
            voter: Address::new(who),
            investigation_id: id,
            approve,
            reason: String::new(),
        })
    }

    fn status(env: &TestEnv, id: InvestigationId) -> InvestigationStatus {
        env.module.investigation(id).unwrap().unwrap().status
    }

    #[test]
    fn test_report_opens_warden_review() {
        let mut env = env_with_reviewers();
        let id = report(&mut env).unwrap();
        let inv = env.module.investigation(id).unwrap().unwrap();
        assert_eq!(inv.status, InvestigationStatus::WardenReview);
        assert_eq!(inv.phase_deadline, Some(env.ctx.time + 48 * 3_600));

        let report = env.module.report(inv.report_id).unwrap();
        assert_eq!(report.status, ReportStatus::UnderInvestigation);
        assert_eq!(env.module.active_investigation(&acme()).unwrap().unwrap().id, id);
    }

    #[test]
    fn test_duplicate_investigation_rejected() {
        let mut env = env_with_reviewers();
        report(&mut env).unwrap();
        let err = report(&mut env).unwrap_err();
        assert_eq!(err.code(), 503);
    }

    #[test]
    fn test_too_few_reviewers_rejected() {
        let mut env = TestEnv::new();
        env.tiers.set_tier("w1", Tier::Warden);
        let err = report(&mut env).unwrap_err();
        assert_eq!(
            err,
            TrustError::Investigation(InvestigationError::InsufficientReviewers {
                available: 1,
                required: 5
            })
        );
    }

    #[test]
    fn test_report_input_validation() {
        let mut env = env_with_reviewers();
        let err = env
            .deliver(Msg::SubmitFraudReport {
                reporter: Address::new("whistle"),
                company_id: acme(),
                description: String::new(),
                evidence_hash: "h".into(),
            })
            .unwrap_err();
        assert_eq!(err.code(), 512);
        let err = env
            .deliver(Msg::SubmitFraudReport {
                reporter: Address::new("whistle"),
                company_id: acme(),
                description: "d".into(),
                evidence_hash: " ".into(),
            })
            .unwrap_err();
        assert_eq!(err.code(), 513);
    }

    #[test]
    fn test_voter_guards() {
        let mut env = env_with_reviewers();
        env.tiers.set_tier("keeper", Tier::Keeper);
        env.tiers.set_tier("whistle", Tier::Warden);
        env.tiers.set_tier("young", Tier::Warden);
        env.tiers.set_stake_since("young", env.ctx.time - 3_600);
        env.registry.set_shares("w3", &acme(), "common", 1);
        let id = report(&mut env).unwrap();

        assert_eq!(vote(&mut env, "keeper", id, true).unwrap_err().code(), 507);
        assert_eq!(vote(&mut env, "whistle", id, true).unwrap_err().code(), 505);
        assert_eq!(vote(&mut env, "w3", id, true).unwrap_err().code(), 505);
        assert_eq!(vote(&mut env, "young", id, true).unwrap_err().code(), 506);
        vote(&mut env, "w1", id, true).unwrap();
        assert_eq!(vote(&mut env, "w1", id, false).unwrap_err().code(), 509);
    }

    #[test]
    fn test_vote_after_deadline_rejected() {
        let mut env = env_with_reviewers();
        let id = report(&mut env).unwrap();
        env.advance(48 * 3_600 + 1);
        assert_eq!(vote(&mut env, "w1", id, true).unwrap_err().code(), 510);
    }

    #[test]
    fn test_warden_rejection_clears() {
        let mut env = env_with_reviewers();
        let id = report(&mut env).unwrap();
        vote(&mut env, "w1", id, true).unwrap();
        vote(&mut env, "w2", id, false).unwrap();
        vote(&mut env, "s1", id, false).unwrap();

        let inv = env.module.investigation(id).unwrap().unwrap();
        assert_eq!(inv.status, InvestigationStatus::Cleared);
        assert_eq!(inv.clear_cause, Some(ClearCause::InsufficientApprovals));
        assert!(env.module.active_investigation(&acme()).unwrap().is_none());
        assert_eq!(env.module.report(inv.report_id).unwrap().status, ReportStatus::Closed);
        assert_eq!(env.registry.resumes(&acme()), 1);
    }

    #[test]
    fn test_steward_phase_requires_steward() {
        let mut env = env_with_reviewers();
        let id = report(&mut env).unwrap();
        for w in ["w1", "w2"] {
            vote(&mut env, w, id, true).unwrap();
        }
        vote(&mut env, "w3", id, false).unwrap();
        assert_eq!(status(&env, id), InvestigationStatus::StewardReview);
        assert_eq!(vote(&mut env, "w1", id, true).unwrap_err().code(), 507);
    }

    #[test]
    fn test_expiry_with_no_votes_clears() {
        let mut env = env_with_reviewers();
        let id = report(&mut env).unwrap();
        env.advance(48 * 3_600);
        assert_eq!(env.end_block().investigations_cleared, 0);
        env.advance(1);
        assert_eq!(env.end_block().investigations_cleared, 1);

        let inv = env.module.investigation(id).unwrap().unwrap();
        assert_eq!(inv.clear_cause, Some(ClearCause::DeadlineExpired { votes_cast: 0 }));
        assert_eq!(env.registry.resumes(&acme()), 1);
    }

    #[test]
    fn test_freeze_retried_until_registry_accepts() {
        let mut env = env_with_reviewers();
        let id = report(&mut env).unwrap();
        for w in WARDENS {
            vote(&mut env, w, id, true).unwrap();
        }
        for s in STEWARDS {
            vote(&mut env, s, id, true).unwrap();
        }
        assert_eq!(status(&env, id), InvestigationStatus::FreezeApproved);

        env.registry.fail_halt(true);
        env.advance(24 * 3_600);
        let summary = env.end_block();
        assert_eq!(summary.companies_frozen, 0);
        assert_eq!(summary.failures, 1);
        assert_eq!(status(&env, id), InvestigationStatus::FreezeApproved);

        env.registry.fail_halt(false);
        env.advance(60);
        assert_eq!(env.end_block().companies_frozen, 1);
        assert_eq!(status(&env, id), InvestigationStatus::Frozen);
        assert!(env.registry.is_halted(&acme()));
    }

    #[test]
    fn test_cancel_rules() {
        let mut env = env_with_reviewers();
        let id = report(&mut env).unwrap();
        let cancel = |by: &str| Msg::CancelInvestigation {
            admin: Address::new(by),
            investigation_id: id,
            reason: "withdrawn".into(),
        };
        assert_eq!(env.deliver(cancel("s1")).unwrap_err().code(), 507);
        env.deliver(cancel("archon")).unwrap();
        assert_eq!(status(&env, id), InvestigationStatus::Cleared);
        assert_eq!(env.deliver(cancel("archon")).unwrap_err().code(), 508);
    }

    #[test]
    fn test_freeze_approved_cannot_be_cancelled() {
        let mut env = env_with_reviewers();
        let id = report(&mut env).unwrap();
        for w in WARDENS {
            vote(&mut env, w, id, true).unwrap();
        }
        for s in STEWARDS {
            vote(&mut env, s, id, s != "s5").unwrap();
        }
        let err = env
            .deliver(Msg::CancelInvestigation {
                admin: Address::new("archon"),
                investigation_id: id,
                reason: "pressure".into(),
            })
            .unwrap_err();
        assert_eq!(err, TrustError::Investigation(InvestigationError::FreezeIrreversible));
    }
}
