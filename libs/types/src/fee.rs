//! Escrow fee calculation
//!
//! Fees are charged when a funded escrow settles. Only currency lots pay;
//! equity lots always move whole.

use crate::asset::Asset;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fee rates frozen onto an escrow at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Protocol fee, paid to the fee collector
    pub escrow_fee_rate: Decimal,
    /// Paid to the assigned moderator, zero when there is none
    pub moderator_fee_rate: Decimal,
}

/// Fee split of one asset line.
///
/// Invariant: `escrow_fee + moderator_fee + net == gross`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBreakdown {
    pub gross: Decimal,
    pub escrow_fee: Decimal,
    pub moderator_fee: Decimal,
    pub net: Decimal,
}

impl FeeSchedule {
    pub fn new(escrow_fee_rate: Decimal, moderator_fee_rate: Decimal) -> Self {
        Self {
            escrow_fee_rate,
            moderator_fee_rate,
        }
    }

    pub fn zero() -> Self {
        Self::new(Decimal::ZERO, Decimal::ZERO)
    }

    /// Compute fees for one asset line.
    ///
    /// Fees are truncated to whole units. Equity lots are fee-free.
    pub fn breakdown(&self, asset: &Asset) -> FeeBreakdown {
        let gross = asset.amount();
        match asset {
            Asset::Equity(_) => FeeBreakdown {
                gross,
                escrow_fee: Decimal::ZERO,
                moderator_fee: Decimal::ZERO,
                net: gross,
            },
            Asset::Currency { .. } => {
                let escrow_fee = (gross * self.escrow_fee_rate).trunc();
                let moderator_fee = (gross * self.moderator_fee_rate).trunc();
                FeeBreakdown {
                    gross,
                    escrow_fee,
                    moderator_fee,
                    net: gross - escrow_fee - moderator_fee,
                }
            }
        }
    }
}
