//! Typed assets held in escrow
//!
//! An escrow can hold native currency and tokenized equity side by side.
//! The two kinds only behave differently in a few places (custody movement,
//! beneficial-owner bookkeeping, fees), so they are a tagged variant rather
//! than a trait object.

use crate::ids::CompanyId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation failures for a single asset lot
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssetError {
    #[error("Asset amount must be positive: {label} {amount}")]
    NonPositiveAmount { label: String, amount: String },

    #[error("Currency denom must not be empty")]
    EmptyDenom,

    #[error("Share class must not be empty for {company_id}")]
    EmptyShareClass { company_id: String },

    #[error("Declared unit value must not be negative: {unit_value}")]
    NegativeUnitValue { unit_value: String },

    #[error("Value of {label} overflows")]
    Overflow { label: String },
}

/// Discriminant of an [`Asset`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    Currency,
    Equity,
}

/// A lot of shares in one class of one company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLot {
    pub company_id: CompanyId,
    pub class_id: String,
    pub shares: Decimal,
    /// Declared value per share, used only for trust-ceiling accounting
    pub unit_value: Decimal,
}

/// One asset line of an escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Asset {
    Currency { denom: String, amount: Decimal },
    Equity(ShareLot),
}

impl Asset {
    pub fn currency(denom: impl Into<String>, amount: Decimal) -> Self {
        Asset::Currency {
            denom: denom.into(),
            amount,
        }
    }

    pub fn equity(
        company_id: CompanyId,
        class_id: impl Into<String>,
        shares: Decimal,
        unit_value: Decimal,
    ) -> Self {
        Asset::Equity(ShareLot {
            company_id,
            class_id: class_id.into(),
            shares,
            unit_value,
        })
    }

    pub fn kind(&self) -> AssetKind {
        match self {
            Asset::Currency { .. } => AssetKind::Currency,
            Asset::Equity(_) => AssetKind::Equity,
        }
    }

    /// Quantity held: currency units or share count.
    pub fn amount(&self) -> Decimal {
        match self {
            Asset::Currency { amount, .. } => *amount,
            Asset::Equity(lot) => lot.shares,
        }
    }

    /// Value counted against a moderator's trust ceiling.
    pub fn value(&self) -> Result<Decimal, AssetError> {
        match self {
            Asset::Currency { amount, .. } => Ok(*amount),
            Asset::Equity(lot) => lot
                .shares
                .checked_mul(lot.unit_value)
                .ok_or_else(|| AssetError::Overflow { label: self.label() }),
        }
    }

    /// Same asset line with a different quantity.
    pub fn with_amount(&self, amount: Decimal) -> Asset {
        match self {
            Asset::Currency { denom, .. } => Asset::Currency {
                denom: denom.clone(),
                amount,
            },
            Asset::Equity(lot) => Asset::Equity(ShareLot {
                shares: amount,
                ..lot.clone()
            }),
        }
    }

    /// Human-readable label: the denom, or `company/class` for equity.
    pub fn label(&self) -> String {
        match self {
            Asset::Currency { denom, .. } => denom.clone(),
            Asset::Equity(lot) => format!("{}/{}", lot.company_id, lot.class_id),
        }
    }

    pub fn validate(&self) -> Result<(), AssetError> {
        if self.amount() <= Decimal::ZERO {
            return Err(AssetError::NonPositiveAmount {
                label: self.label(),
                amount: self.amount().to_string(),
            });
        }
        match self {
            Asset::Currency { denom, .. } if denom.is_empty() => Err(AssetError::EmptyDenom),
            Asset::Equity(lot) if lot.class_id.is_empty() => Err(AssetError::EmptyShareClass {
                company_id: lot.company_id.to_string(),
            }),
            Asset::Equity(lot) if lot.unit_value < Decimal::ZERO => {
                Err(AssetError::NegativeUnitValue {
                    unit_value: lot.unit_value.to_string(),
                })
            }
            _ => self.value().map(|_| ()),
        }
    }
}

/// Sum of [`Asset::value`] over a lot list.
pub fn total_value(assets: &[Asset]) -> Result<Decimal, AssetError> {
    assets.iter().try_fold(Decimal::ZERO, |sum, asset| {
        sum.checked_add(asset.value()?)
            .ok_or_else(|| AssetError::Overflow {
                label: "escrow total".to_string(),
            })
    })
}

/// Split a quantity between sender and recipient.
///
/// The sender part is truncated to whole units; the recipient receives the
/// remainder, so `sender + recipient == amount` always holds.
pub fn split_whole(amount: Decimal, sender_share: Decimal) -> (Decimal, Decimal) {
    let sender = (amount * sender_share).trunc();
    (sender, amount - sender)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_equity_value_uses_unit_value() {
        let lot = Asset::equity(CompanyId::new("ACME"), "common", Decimal::from(10), Decimal::from(25));
        assert_eq!(lot.value(), Ok(Decimal::from(250)));
        assert_eq!(lot.amount(), Decimal::from(10));
        assert_eq!(lot.kind(), AssetKind::Equity);
    }

    #[test]
    fn test_total_value_mixed() {
        let assets = vec![
            Asset::currency("unative", Decimal::from(1000)),
            Asset::equity(CompanyId::new("ACME"), "common", Decimal::from(4), Decimal::from(50)),
        ];
        assert_eq!(total_value(&assets), Ok(Decimal::from(1200)));
    }

    #[test]
    fn test_equity_value_overflow_is_an_error() {
        let huge = Decimal::from_i128_with_scale(100_000_000_000_000_000_000, 0);
        let lot = Asset::equity(CompanyId::new("ACME"), "common", huge, huge);
        assert!(matches!(lot.value(), Err(AssetError::Overflow { .. })));
        assert!(matches!(lot.validate(), Err(AssetError::Overflow { .. })));
    }

    #[test]
    fn test_total_value_overflow_is_an_error() {
        let assets = vec![
            Asset::currency("unative", Decimal::MAX),
            Asset::currency("unative", Decimal::MAX),
        ];
        assert!(matches!(total_value(&assets), Err(AssetError::Overflow { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_amount() {
        let asset = Asset::currency("unative", Decimal::ZERO);
        assert!(matches!(asset.validate(), Err(AssetError::NonPositiveAmount { .. })));
    }

    #[test]
    fn test_validate_rejects_empty_denom() {
        let asset = Asset::currency("", Decimal::ONE);
        assert_eq!(asset.validate(), Err(AssetError::EmptyDenom));
    }

    #[test]
    fn test_validate_rejects_negative_unit_value() {
        let asset = Asset::equity(CompanyId::new("ACME"), "common", Decimal::ONE, Decimal::from(-1));
        assert!(matches!(asset.validate(), Err(AssetError::NegativeUnitValue { .. })));
    }

    #[test]
    fn test_with_amount_keeps_identity() {
        let lot = Asset::equity(CompanyId::new("ACME"), "pref", Decimal::from(9), Decimal::ONE);
        let half = lot.with_amount(Decimal::from(4));
        assert_eq!(half.label(), "ACME/pref");
        assert_eq!(half.amount(), Decimal::from(4));
    }

    #[test]
    fn test_split_whole_odd_shares() {
        let (sender, recipient) = split_whole(Decimal::from(7), Decimal::new(5, 1));
        assert_eq!(sender, Decimal::from(3));
        assert_eq!(recipient, Decimal::from(4));
    }

    proptest! {
        #[test]
        fn prop_split_conserves_amount(amount in 1u64..1_000_000_000u64, pct in 0u32..=100u32) {
            let amount = Decimal::from(amount);
            let share = Decimal::new(pct as i64, 2);
            let (sender, recipient) = split_whole(amount, share);
            prop_assert_eq!(sender + recipient, amount);
            prop_assert!(sender >= Decimal::ZERO);
            prop_assert!(recipient >= Decimal::ZERO);
        }
    }
}
