//! Inbound operations
//!
//! One variant per transaction type. The host decodes a transaction into a
//! [`Msg`] and hands it to `TrustModule::deliver`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trust_types::asset::Asset;
use trust_types::ids::{Address, CompanyId, DisputeId, EscrowId, InvestigationId};

use crate::config::Params;
use crate::dispute::Resolution;
use crate::escrow::EscrowTerms;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Msg {
    CreateEscrow {
        sender: Address,
        recipient: Address,
        moderator: Option<Address>,
        assets: Vec<Asset>,
        terms: EscrowTerms,
        expires_at: i64,
    },
    FundEscrow {
        funder: Address,
        escrow_id: EscrowId,
    },
    ReleaseEscrow {
        caller: Address,
        escrow_id: EscrowId,
    },
    RefundEscrow {
        caller: Address,
        escrow_id: EscrowId,
    },
    CancelEscrow {
        caller: Address,
        escrow_id: EscrowId,
    },
    ConfirmEscrow {
        party: Address,
        escrow_id: EscrowId,
    },
    OpenDispute {
        initiator: Address,
        escrow_id: EscrowId,
        reason: String,
    },
    SubmitEvidence {
        submitter: Address,
        dispute_id: DisputeId,
        content_hash: String,
        description: String,
    },
    VoteOnDispute {
        moderator: Address,
        dispute_id: DisputeId,
        resolution: Resolution,
        reason: String,
    },
    AppealDispute {
        appellant: Address,
        dispute_id: DisputeId,
        reason: String,
    },
    RegisterModerator {
        address: Address,
        stake: Decimal,
    },
    IncreaseModeratorStake {
        address: Address,
        amount: Decimal,
    },
    RequestUnstake {
        address: Address,
        amount: Decimal,
    },
    CompleteUnstake {
        address: Address,
    },
    CancelUnstake {
        address: Address,
    },
    SlashModerator {
        validator: Address,
        moderator: Address,
        /// Share of slashable stake to burn, within [0, 1]
        fraction: Decimal,
        reason: String,
    },
    BlacklistModerator {
        validator: Address,
        moderator: Address,
        reason: String,
        permanent: bool,
        /// Ignored for permanent bans
        duration_secs: i64,
    },
    UnblacklistModerator {
        validator: Address,
        moderator: Address,
        reason: String,
    },
    SubmitFraudReport {
        reporter: Address,
        company_id: CompanyId,
        description: String,
        evidence_hash: String,
    },
    VoteOnInvestigation {
        voter: Address,
        investigation_id: InvestigationId,
        approve: bool,
        reason: String,
    },
    CancelInvestigation {
        admin: Address,
        investigation_id: InvestigationId,
        reason: String,
    },
    UpdateParams {
        admin: Address,
        params: Box<Params>,
    },
}

impl Msg {
    pub fn type_name(&self) -> &'static str {
        match self {
            Msg::CreateEscrow { .. } => "create_escrow",
            Msg::FundEscrow { .. } => "fund_escrow",
            Msg::ReleaseEscrow { .. } => "release_escrow",
            Msg::RefundEscrow { .. } => "refund_escrow",
            Msg::CancelEscrow { .. } => "cancel_escrow",
            Msg::ConfirmEscrow { .. } => "confirm_escrow",
            Msg::OpenDispute { .. } => "open_dispute",
            Msg::SubmitEvidence { .. } => "submit_evidence",
            Msg::VoteOnDispute { .. } => "vote_on_dispute",
            Msg::AppealDispute { .. } => "appeal_dispute",
            Msg::RegisterModerator { .. } => "register_moderator",
            Msg::IncreaseModeratorStake { .. } => "increase_moderator_stake",
            Msg::RequestUnstake { .. } => "request_unstake",
            Msg::CompleteUnstake { .. } => "complete_unstake",
            Msg::CancelUnstake { .. } => "cancel_unstake",
            Msg::SlashModerator { .. } => "slash_moderator",
            Msg::BlacklistModerator { .. } => "blacklist_moderator",
            Msg::UnblacklistModerator { .. } => "unblacklist_moderator",
            Msg::SubmitFraudReport { .. } => "submit_fraud_report",
            Msg::VoteOnInvestigation { .. } => "vote_on_investigation",
            Msg::CancelInvestigation { .. } => "cancel_investigation",
            Msg::UpdateParams { .. } => "update_params",
        }
    }

    /// Address that authorized the transaction.
    pub fn signer(&self) -> &Address {
        match self {
            Msg::CreateEscrow { sender, .. } => sender,
            Msg::FundEscrow { funder, .. } => funder,
            Msg::ReleaseEscrow { caller, .. }
            | Msg::RefundEscrow { caller, .. }
            | Msg::CancelEscrow { caller, .. } => caller,
            Msg::ConfirmEscrow { party, .. } => party,
            Msg::OpenDispute { initiator, .. } => initiator,
            Msg::SubmitEvidence { submitter, .. } => submitter,
            Msg::VoteOnDispute { moderator, .. } => moderator,
            Msg::AppealDispute { appellant, .. } => appellant,
            Msg::RegisterModerator { address, .. }
            | Msg::IncreaseModeratorStake { address, .. }
            | Msg::RequestUnstake { address, .. }
            | Msg::CompleteUnstake { address }
            | Msg::CancelUnstake { address } => address,
            Msg::SlashModerator { validator, .. }
            | Msg::BlacklistModerator { validator, .. }
            | Msg::UnblacklistModerator { validator, .. } => validator,
            Msg::SubmitFraudReport { reporter, .. } => reporter,
            Msg::VoteOnInvestigation { voter, .. } => voter,
            Msg::CancelInvestigation { admin, .. } | Msg::UpdateParams { admin, .. } => admin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg_json_round_trip() {
        let msg = Msg::VoteOnDispute {
            moderator: Address::new("mod-1"),
            dispute_id: DisputeId::new(4),
            resolution: Resolution::Split,
            reason: "both at fault".into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: Msg = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn test_signer_and_type_name() {
        let msg = Msg::SlashModerator {
            validator: Address::new("val"),
            moderator: Address::new("mod"),
            fraction: Decimal::new(5, 1),
            reason: "collusion".into(),
        };
        assert_eq!(msg.signer().as_str(), "val");
        assert_eq!(msg.type_name(), "slash_moderator");
    }
}
