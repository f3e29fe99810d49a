//! Trust, Escrow & Dispute Module
//!
//! Holds assets in custody between two parties, resolves disagreements by
//! moderator vote, bounds every moderator's responsibility by their bonded
//! stake, and runs tiered fraud investigations that can halt a company's
//! trading.
//!
//! # Modules
//! - `escrow`: Escrow lifecycle, custody transfers, fees, expiry
//! - `dispute`: Disputes, evidence, voting rounds, appeals, emergency splits
//! - `moderator`: Registration, stake, tiers, trust-ceiling accounting
//! - `unbonding`: Stake withdrawal window
//! - `oversight`: Slashing, blacklisting, validator audit log
//! - `investigation`: Fraud reports and tiered company review
//! - `scheduler`: Per-block deadline processing
//! - `state`: Module state, transactions, message dispatch
//! - `capability`: Ledger, Registry and TierOracle collaborator traits
//! - `testkit`: In-memory collaborators and a test harness (`testkit` feature)
//!
//! # Version
//! v0.1.0

pub mod capability;
pub mod config;
pub mod context;
pub mod dispute;
pub mod errors;
pub mod escrow;
pub mod events;
pub mod investigation;
pub mod keys;
pub mod moderator;
pub mod msg;
pub mod oversight;
pub mod scheduler;
pub mod security;
pub mod state;
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
pub mod unbonding;

pub use capability::{Capabilities, Ledger, Registry, TierOracle};
pub use config::Params;
pub use context::BlockContext;
pub use errors::{ErrorKind, TrustError};
pub use events::TrustEvent;
pub use msg::Msg;
pub use scheduler::EndBlockSummary;
pub use state::TrustModule;

/// Module version, bumped on any change to stored record layout
pub const MODULE_VERSION: &str = "1.0.0";
