//! Module error types
//!
//! One enum per component, aggregated into [`TrustError`]. Every error maps
//! to a coarse [`ErrorKind`] and a stable numeric code:
//!
//! | Range | Component |
//! |-------|-----------|
//! | 1xx | escrow |
//! | 2xx | dispute |
//! | 3xx | moderator / unbonding |
//! | 4xx | oversight |
//! | 5xx | investigation |
//! | 6xx | collaborator capabilities |
//! | 7xx | store / integrity |
//! | 8xx | configuration |
//!
//! Codes are part of the external interface and never change once assigned.

use persistence::{CodecError, StoreError};
use thiserror::Error;
use trust_types::asset::AssetError;
use trust_types::tier::Tier;

/// Coarse failure class reported alongside the numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    InvalidInput,
    InvalidState,
    Capacity,
    Temporal,
    Governance,
    Integrity,
    Capability,
    Config,
}

/// Escrow lifecycle errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EscrowError {
    #[error("Escrow not found: {escrow_id}")]
    NotFound { escrow_id: String },

    #[error("Unauthorized: {caller} may not {action} this escrow")]
    Unauthorized { caller: String, action: String },

    #[error("Escrow {escrow_id} is {actual}, expected {expected}")]
    InvalidStatus {
        escrow_id: String,
        expected: String,
        actual: String,
    },

    #[error("Escrow must hold at least one asset")]
    NoAssets,

    #[error("Invalid asset: {0}")]
    InvalidAsset(#[from] AssetError),

    #[error("Sender and recipient must differ")]
    SameParty,

    #[error("Moderator cannot be a party to the escrow")]
    ModeratorIsParty,

    #[error("Moderator fee rate {rate} exceeds maximum {max}")]
    FeeRateTooHigh { rate: String, max: String },

    #[error("Sender share must be within [0, 1]: {share}")]
    InvalidSenderShare { share: String },

    #[error("Expiry {expires_at} is not after current time {now}")]
    ExpiryInPast { expires_at: i64, now: i64 },

    #[error("Escrow {escrow_id} expired at {expired_at}")]
    Expired { escrow_id: String, expired_at: i64 },

    #[error("Expiry {expires_at} is more than {max_secs}s away")]
    ExpiryTooFar { expires_at: i64, max_secs: i64 },

    #[error("Insufficient funds for {asset}: required {required}, available {available}")]
    InsufficientFunds {
        asset: String,
        required: String,
        available: String,
    },
}

/// Dispute engine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DisputeError {
    #[error("Dispute not found: {dispute_id}")]
    NotFound { dispute_id: String },

    #[error("Not a participant in the escrow: {caller}")]
    NotParticipant { caller: String },

    #[error("Escrow {escrow_id} already has a dispute")]
    AlreadyDisputed { escrow_id: String },

    #[error("Dispute {dispute_id} is {status}")]
    InvalidStatus { dispute_id: String, status: String },

    #[error("Voting deadline passed at {deadline}")]
    DeadlinePassed { deadline: i64 },

    #[error("Moderator {moderator} already voted in this round")]
    AlreadyVoted { moderator: String },

    #[error("Moderator {moderator} is a party to the escrow")]
    PartyCannotVote { moderator: String },

    #[error("Voter {voter} lacks tier {required} for a large dispute")]
    InsufficientTier { voter: String, required: Tier },

    #[error("Evidence limit reached: {max} items")]
    EvidenceLimit { max: u32 },

    #[error("Evidence content hash must not be empty")]
    EmptyContentHash,

    #[error("Appeal limit reached: {max}")]
    AppealLimit { max: u32 },

    #[error("Appeal window closed at {closed_at}")]
    AppealWindowClosed { closed_at: i64 },
}

/// Trust ledger and unbonding errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModeratorError {
    #[error("Moderator not found: {address}")]
    NotFound { address: String },

    #[error("Moderator already registered: {address}")]
    AlreadyRegistered { address: String },

    #[error("Address {address} has tier {actual}, requires {required}")]
    InsufficientTier {
        address: String,
        required: Tier,
        actual: Tier,
    },

    #[error("Stake {stake} below minimum {minimum}")]
    StakeBelowMinimum { stake: String, minimum: String },

    #[error("Moderator is inactive: {address}")]
    Inactive { address: String },

    #[error("Moderator is blacklisted: {address}")]
    Blacklisted { address: String },

    #[error("Trust ceiling exceeded for {address}: requested {requested}, available {available}")]
    TrustCeilingExceeded {
        address: String,
        requested: String,
        available: String,
    },

    #[error("Escrow value {value} exceeds {tier} limit {limit} for {address}")]
    ExceedsTierLimit {
        address: String,
        tier: String,
        limit: String,
        value: String,
    },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Moderator has {count} active disputes")]
    ActiveDisputes { count: u32 },

    #[error("Unbonding already in progress for {address}")]
    AlreadyUnbonding { address: String },

    #[error("Insufficient unlocked stake: requested {requested}, available {available}")]
    InsufficientAvailableStake { requested: String, available: String },

    #[error("No unbonding in progress for {address}")]
    NoUnbonding { address: String },

    #[error("Unbonding not complete until {completes_at}")]
    UnbondingNotMatured { completes_at: i64 },

    #[error("Unbonding for {address} was slashed")]
    UnbondingSlashed { address: String },

    #[error("Stake of {address} would overflow")]
    StakeOverflow { address: String },
}

/// Validator oversight errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OversightError {
    #[error("Validator {validator} has tier {actual}, requires {required}")]
    InsufficientTier {
        validator: String,
        required: Tier,
        actual: Tier,
    },

    #[error("Slash fraction must be within [0, 1]: {fraction}")]
    InvalidFraction { fraction: String },

    #[error("Moderator already blacklisted: {address}")]
    AlreadyBlacklisted { address: String },

    #[error("Moderator not blacklisted: {address}")]
    NotBlacklisted { address: String },

    #[error("Temporary ban duration must be within 1..={max}s, got {duration}")]
    InvalidDuration { duration: i64, max: i64 },

    #[error("Burn of {amount} failed: {reason}")]
    BurnFailed { amount: String, reason: String },

    #[error("Validator action not found: {action_id}")]
    ActionNotFound { action_id: String },
}

/// Investigation engine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvestigationError {
    #[error("Investigation not found: {investigation_id}")]
    NotFound { investigation_id: String },

    #[error("Fraud report not found: {report_id}")]
    ReportNotFound { report_id: String },

    #[error("Company {company_id} already under investigation")]
    DuplicateInvestigation { company_id: String },

    #[error("Insufficient reviewers: {available} available, {required} required")]
    InsufficientReviewers { available: u64, required: u64 },

    #[error("Conflict of interest: {voter} on {company_id}")]
    ConflictOfInterest { voter: String, company_id: String },

    #[error("Stake of {voter} is {age}s old, minimum {minimum}s")]
    StakeTooYoung { voter: String, age: i64, minimum: i64 },

    #[error("Address {voter} has tier {actual}, requires {required}")]
    InsufficientTier {
        voter: String,
        required: Tier,
        actual: Tier,
    },

    #[error("Investigation {investigation_id} is {status}")]
    InvalidStatus {
        investigation_id: String,
        status: String,
    },

    #[error("Reviewer {voter} already voted in this phase")]
    AlreadyVoted { voter: String },

    #[error("Review deadline passed at {deadline}")]
    DeadlinePassed { deadline: i64 },

    #[error("Freeze approved: investigation can no longer be reversed")]
    FreezeIrreversible,

    #[error("Report description must be 1..={max} bytes, got {len}")]
    InvalidDescription { len: usize, max: u32 },

    #[error("Evidence hash must not be empty")]
    EmptyEvidence,
}

/// Collaborator (ledger, registry, tier oracle) failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CapabilityError {
    #[error("Capability unavailable: {capability}")]
    Unavailable { capability: &'static str },

    #[error("{capability} rejected the call: {reason}")]
    Rejected {
        capability: &'static str,
        reason: String,
    },

    #[error("Insufficient balance for {asset} at {account}: required {required}, available {available}")]
    InsufficientBalance {
        account: String,
        asset: String,
        required: String,
        available: String,
    },
}

/// Parameter validation and loading errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid parameter {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Failed to parse parameters: {0}")]
    Parse(String),
}

/// Top-level error returned by every module entry point.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrustError {
    #[error(transparent)]
    Escrow(#[from] EscrowError),

    #[error(transparent)]
    Dispute(#[from] DisputeError),

    #[error(transparent)]
    Moderator(#[from] ModeratorError),

    #[error(transparent)]
    Oversight(#[from] OversightError),

    #[error(transparent)]
    Investigation(#[from] InvestigationError),

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl From<AssetError> for TrustError {
    fn from(err: AssetError) -> Self {
        TrustError::Escrow(EscrowError::InvalidAsset(err))
    }
}

impl TrustError {
    pub fn kind(&self) -> ErrorKind {
        self.classify().0
    }

    pub fn code(&self) -> u32 {
        self.classify().1
    }

    fn classify(&self) -> (ErrorKind, u32) {
        use ErrorKind::*;
        match self {
            TrustError::Escrow(e) => match e {
                EscrowError::NotFound { .. } => (NotFound, 101),
                EscrowError::Unauthorized { .. } => (Unauthorized, 102),
                EscrowError::InvalidStatus { .. } => (InvalidState, 103),
                EscrowError::NoAssets => (InvalidInput, 104),
                EscrowError::InvalidAsset(_) => (InvalidInput, 105),
                EscrowError::SameParty => (InvalidInput, 106),
                EscrowError::ModeratorIsParty => (InvalidInput, 107),
                EscrowError::FeeRateTooHigh { .. } => (InvalidInput, 108),
                EscrowError::InvalidSenderShare { .. } => (InvalidInput, 109),
                EscrowError::ExpiryInPast { .. } => (Temporal, 110),
                EscrowError::Expired { .. } => (Temporal, 111),
                EscrowError::InsufficientFunds { .. } => (Capacity, 112),
                EscrowError::ExpiryTooFar { .. } => (Temporal, 113),
            },
            TrustError::Dispute(e) => match e {
                DisputeError::NotFound { .. } => (NotFound, 201),
                DisputeError::NotParticipant { .. } => (Unauthorized, 202),
                DisputeError::AlreadyDisputed { .. } => (InvalidState, 203),
                DisputeError::InvalidStatus { .. } => (InvalidState, 204),
                DisputeError::DeadlinePassed { .. } => (Temporal, 205),
                DisputeError::AlreadyVoted { .. } => (InvalidState, 206),
                DisputeError::PartyCannotVote { .. } => (Governance, 207),
                DisputeError::InsufficientTier { .. } => (Unauthorized, 208),
                DisputeError::EvidenceLimit { .. } => (Capacity, 209),
                DisputeError::EmptyContentHash => (InvalidInput, 210),
                DisputeError::AppealLimit { .. } => (Capacity, 211),
                DisputeError::AppealWindowClosed { .. } => (Temporal, 212),
            },
            TrustError::Moderator(e) => match e {
                ModeratorError::NotFound { .. } => (NotFound, 301),
                ModeratorError::AlreadyRegistered { .. } => (InvalidState, 302),
                ModeratorError::InsufficientTier { .. } => (Unauthorized, 303),
                ModeratorError::StakeBelowMinimum { .. } => (Capacity, 304),
                ModeratorError::Inactive { .. } => (InvalidState, 305),
                ModeratorError::Blacklisted { .. } => (Unauthorized, 306),
                ModeratorError::TrustCeilingExceeded { .. } => (Capacity, 307),
                ModeratorError::ExceedsTierLimit { .. } => (Capacity, 308),
                ModeratorError::InvalidAmount => (InvalidInput, 309),
                ModeratorError::ActiveDisputes { .. } => (InvalidState, 310),
                ModeratorError::AlreadyUnbonding { .. } => (Temporal, 311),
                ModeratorError::InsufficientAvailableStake { .. } => (Capacity, 312),
                ModeratorError::NoUnbonding { .. } => (NotFound, 313),
                ModeratorError::UnbondingNotMatured { .. } => (Temporal, 314),
                ModeratorError::UnbondingSlashed { .. } => (InvalidState, 315),
                ModeratorError::StakeOverflow { .. } => (Capacity, 316),
            },
            TrustError::Oversight(e) => match e {
                OversightError::InsufficientTier { .. } => (Unauthorized, 401),
                OversightError::InvalidFraction { .. } => (InvalidInput, 402),
                OversightError::AlreadyBlacklisted { .. } => (InvalidState, 403),
                OversightError::NotBlacklisted { .. } => (NotFound, 404),
                OversightError::InvalidDuration { .. } => (InvalidInput, 405),
                OversightError::BurnFailed { .. } => (Capability, 406),
                OversightError::ActionNotFound { .. } => (NotFound, 407),
            },
            TrustError::Investigation(e) => match e {
                InvestigationError::NotFound { .. } => (NotFound, 501),
                InvestigationError::ReportNotFound { .. } => (NotFound, 502),
                InvestigationError::DuplicateInvestigation { .. } => (Governance, 503),
                InvestigationError::InsufficientReviewers { .. } => (Governance, 504),
                InvestigationError::ConflictOfInterest { .. } => (Governance, 505),
                InvestigationError::StakeTooYoung { .. } => (Governance, 506),
                InvestigationError::InsufficientTier { .. } => (Unauthorized, 507),
                InvestigationError::InvalidStatus { .. } => (InvalidState, 508),
                InvestigationError::AlreadyVoted { .. } => (InvalidState, 509),
                InvestigationError::DeadlinePassed { .. } => (Temporal, 510),
                InvestigationError::FreezeIrreversible => (InvalidState, 511),
                InvestigationError::InvalidDescription { .. } => (InvalidInput, 512),
                InvestigationError::EmptyEvidence => (InvalidInput, 513),
            },
            TrustError::Capability(e) => match e {
                CapabilityError::Unavailable { .. } => (Capability, 601),
                CapabilityError::Rejected { .. } => (Capability, 602),
                CapabilityError::InsufficientBalance { .. } => (Capacity, 603),
            },
            TrustError::Store(e) => match e {
                StoreError::TransactionActive => (Integrity, 701),
                StoreError::NoTransaction => (Integrity, 702),
            },
            TrustError::Codec(e) => match e {
                CodecError::Serialization(_) => (Integrity, 703),
                CodecError::Truncated { .. } => (Integrity, 704),
                CodecError::ChecksumMismatch { .. } => (Integrity, 705),
            },
            TrustError::Config(e) => match e {
                ConfigError::Invalid { .. } => (Config, 801),
                ConfigError::Parse(_) => (Config, 802),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escrow_error_display() {
        let err = EscrowError::NotFound {
            escrow_id: "escrow-9".to_string(),
        };
        assert_eq!(err.to_string(), "Escrow not found: escrow-9");
    }

    #[test]
    fn test_transparent_wrapping_keeps_message() {
        let err: TrustError = DisputeError::EvidenceLimit { max: 32 }.into();
        assert_eq!(err.to_string(), "Evidence limit reached: 32 items");
        assert_eq!(err.code(), 209);
        assert_eq!(err.kind(), ErrorKind::Capacity);
    }

    #[test]
    fn test_asset_error_maps_to_escrow_code() {
        let err: TrustError = AssetError::EmptyDenom.into();
        assert!(matches!(err, TrustError::Escrow(EscrowError::InvalidAsset(_))));
        assert_eq!(err.code(), 105);
    }

    #[test]
    fn test_store_errors_are_integrity() {
        let err: TrustError = StoreError::NoTransaction.into();
        assert_eq!(err.kind(), ErrorKind::Integrity);
        let err: TrustError = CodecError::Truncated { len: 1 }.into();
        assert_eq!(err.kind(), ErrorKind::Integrity);
    }

    #[test]
    fn test_governance_errors() {
        let err: TrustError = InvestigationError::StakeTooYoung {
            voter: "w1".into(),
            age: 10,
            minimum: 100,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Governance);
        assert_eq!(err.code(), 506);
    }

    #[test]
    fn test_codes_are_unique_per_range() {
        let samples: Vec<TrustError> = vec![
            EscrowError::NoAssets.into(),
            EscrowError::SameParty.into(),
            DisputeError::EmptyContentHash.into(),
            ModeratorError::InvalidAmount.into(),
            OversightError::InvalidDuration { duration: 0, max: 1 }.into(),
            InvestigationError::FreezeIrreversible.into(),
            CapabilityError::Unavailable { capability: "ledger" }.into(),
            ConfigError::Parse("x".into()).into(),
        ];
        let mut codes: Vec<u32> = samples.iter().map(TrustError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), samples.len());
    }
}
