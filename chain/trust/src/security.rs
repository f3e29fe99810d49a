//! Access control
//!
//! Two kinds of authority exist in the module:
//! - escrow roles: who the caller is relative to one escrow;
//! - reputation tiers: the caller's standing in the external tier system,
//!   which gates moderation, oversight and investigation review.

use trust_types::ids::Address;
use trust_types::tier::Tier;

use crate::capability::Capabilities;
use crate::errors::{EscrowError, TrustError};
use crate::escrow::Escrow;

/// Caller's relation to an escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Sender,
    Recipient,
    /// Assigned moderator
    Moderator,
    Outsider,
}

impl Role {
    pub fn of(escrow: &Escrow, caller: &Address) -> Role {
        if *caller == escrow.sender {
            Role::Sender
        } else if *caller == escrow.recipient {
            Role::Recipient
        } else if escrow.moderator.as_ref() == Some(caller) {
            Role::Moderator
        } else {
            Role::Outsider
        }
    }

    /// Sender or recipient.
    pub fn is_participant(&self) -> bool {
        matches!(self, Role::Sender | Role::Recipient)
    }
}

/// Escrow operations subject to role checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowAction {
    Fund,
    Release,
    Refund,
    Cancel,
    Confirm,
}

impl EscrowAction {
    pub fn permits(&self, role: Role) -> bool {
        match self {
            EscrowAction::Fund | EscrowAction::Cancel => role == Role::Sender,
            EscrowAction::Release => matches!(role, Role::Sender | Role::Moderator),
            EscrowAction::Refund => matches!(role, Role::Recipient | Role::Moderator),
            EscrowAction::Confirm => role.is_participant(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EscrowAction::Fund => "fund",
            EscrowAction::Release => "release",
            EscrowAction::Refund => "refund",
            EscrowAction::Cancel => "cancel",
            EscrowAction::Confirm => "confirm",
        }
    }
}

/// Resolve the caller's role and check it may perform `action`.
pub fn authorize(
    escrow: &Escrow,
    caller: &Address,
    action: EscrowAction,
) -> Result<Role, EscrowError> {
    let role = Role::of(escrow, caller);
    if !action.permits(role) {
        return Err(EscrowError::Unauthorized {
            caller: caller.to_string(),
            action: action.name().to_string(),
        });
    }
    Ok(role)
}

/// Look up a tier; a missing oracle is a hard error.
pub fn tier_of(caps: &Capabilities, who: &Address) -> Result<Tier, TrustError> {
    Ok(caps.tiers()?.tier_of(who))
}

/// Require `who` to hold at least `min`, building the denial with `deny`.
pub fn require_tier<E>(
    caps: &Capabilities,
    who: &Address,
    min: Tier,
    deny: impl FnOnce(Tier) -> E,
) -> Result<Tier, TrustError>
where
    E: Into<TrustError>,
{
    let actual = tier_of(caps, who)?;
    if actual < min {
        return Err(deny(actual).into());
    }
    Ok(actual)
}
