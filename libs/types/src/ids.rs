//! Identifier types for module entities
//!
//! Entity ids are plain monotonic sequence numbers handed out by the module's
//! persistent counter, never random: identical transaction streams must
//! produce identical ids on every replica.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Longest accepted address or company id, in bytes.
pub const MAX_ID_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("{kind} must not be empty")]
    Empty { kind: &'static str },

    #[error("{kind} is {len} bytes, longer than {max}", max = MAX_ID_LEN)]
    TooLong { kind: &'static str, len: usize },
}

fn check_id(kind: &'static str, s: &str) -> Result<(), IdError> {
    if s.is_empty() {
        return Err(IdError::Empty { kind });
    }
    if s.len() > MAX_ID_LEN {
        return Err(IdError::TooLong { kind, len: s.len() });
    }
    Ok(())
}

macro_rules! sequence_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn get(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "-{}"), self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

sequence_id!(
    /// Identifier of an escrow agreement
    EscrowId,
    "escrow"
);
sequence_id!(
    /// Identifier of a dispute raised on an escrow
    DisputeId,
    "dispute"
);
sequence_id!(
    /// Identifier of a company fraud investigation
    InvestigationId,
    "investigation"
);
sequence_id!(
    /// Identifier of a user-submitted fraud report
    ReportId,
    "report"
);
sequence_id!(
    /// Identifier of an append-only validator audit record
    ActionId,
    "action"
);

/// Account address on the ledger.
///
/// Opaque to this module; only equality and ordering matter. Length is
/// bounded by [`MAX_ID_LEN`], also when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Create an address from a string
    ///
    /// # Panics
    /// Panics if the string is empty or longer than [`MAX_ID_LEN`]
    pub fn new(addr: impl Into<String>) -> Self {
        match Self::parse(addr) {
            Ok(address) => address,
            Err(err) => panic!("{err}"),
        }
    }

    pub fn parse(addr: impl Into<String>) -> Result<Self, IdError> {
        let s = addr.into();
        check_id("Address", &s)?;
        Ok(Self(s))
    }

    /// Try to create an address, returning None if empty or oversize
    pub fn try_new(addr: impl Into<String>) -> Option<Self> {
        Self::parse(addr).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl TryFrom<String> for Address {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// Identifier of a company listed in the equity registry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CompanyId(String);

impl CompanyId {
    /// # Panics
    /// Panics if the string is empty or longer than [`MAX_ID_LEN`]
    pub fn new(id: impl Into<String>) -> Self {
        match Self::parse(id) {
            Ok(company) => company,
            Err(err) => panic!("{err}"),
        }
    }

    pub fn parse(id: impl Into<String>) -> Result<Self, IdError> {
        let s = id.into();
        check_id("CompanyId", &s)?;
        Ok(Self(s))
    }

    pub fn try_new(id: impl Into<String>) -> Option<Self> {
        Self::parse(id).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CompanyId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl TryFrom<String> for CompanyId {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<CompanyId> for String {
    fn from(company: CompanyId) -> Self {
        company.0
    }
}
