//! Types library for the trust, escrow and dispute module
//!
//! Value types shared by the module and its store: identifiers, typed
//! assets, tier ladders and fee schedules. Nothing here performs I/O.
//!
//! # Modules
//! - `ids`: Sequence identifiers (EscrowId, DisputeId, ...), Address, CompanyId
//! - `asset`: Currency and equity lots
//! - `tier`: Reputation-system tiers and moderator performance tiers
//! - `fee`: Escrow fee schedule and per-asset fee breakdown

pub mod asset;
pub mod fee;
pub mod ids;
pub mod tier;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::asset::*;
    pub use crate::fee::*;
    pub use crate::ids::*;
    pub use crate::tier::*;
}
