//! Escrow Lifecycle Manager
//!
//! ```text
//! create ──▶ Pending ──fund──▶ Funded ──release/confirm──▶ Released
//!              │                  │ └────refund──────────▶ Refunded
//!              │                  ├─open dispute─▶ Disputed ──▶ Resolved
//!              │                  └─expiry (refund)──────▶ Expired
//!              ├─cancel──▶ Cancelled
//!              └─expiry──▶ Expired
//! ```
//!
//! Assets only move while an escrow is Funded, and every terminal status
//! releases the moderator's reserved exposure exactly once.
//!
//! Store writes of a handler happen before its asset movements: if a
//! movement fails, the open transaction rolls the writes back, and a
//! multi-leg [`TransferPlan`] reverses the legs it already executed.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use trust_types::asset::{split_whole, total_value, Asset, AssetError};
use trust_types::fee::FeeSchedule;
use trust_types::ids::{Address, EscrowId};

use persistence::KvStore;

use crate::context::BlockContext;
use crate::errors::{EscrowError, TrustError};
use crate::events::{
    EscrowCancelled, EscrowConfirmed, EscrowCreated, EscrowExpired, EscrowFunded, EscrowSettled,
    TrustEvent,
};
use crate::keys::{self, Counter};
use crate::security::{self, EscrowAction, Role};
use crate::state::TrustModule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscrowStatus {
    Pending,
    Funded,
    Disputed,
    Released,
    Refunded,
    Cancelled,
    Expired,
    Resolved,
}

impl EscrowStatus {
    /// Byte used by the status index.
    pub fn code(&self) -> u8 {
        match self {
            EscrowStatus::Pending => 1,
            EscrowStatus::Funded => 2,
            EscrowStatus::Disputed => 3,
            EscrowStatus::Released => 4,
            EscrowStatus::Refunded => 5,
            EscrowStatus::Cancelled => 6,
            EscrowStatus::Expired => 7,
            EscrowStatus::Resolved => 8,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            EscrowStatus::Pending | EscrowStatus::Funded | EscrowStatus::Disputed
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            EscrowStatus::Pending => "pending",
            EscrowStatus::Funded => "funded",
            EscrowStatus::Disputed => "disputed",
            EscrowStatus::Released => "released",
            EscrowStatus::Refunded => "refunded",
            EscrowStatus::Cancelled => "cancelled",
            EscrowStatus::Expired => "expired",
            EscrowStatus::Resolved => "resolved",
        }
    }
}

/// Caller-chosen terms of an escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowTerms {
    /// Charged only when a moderator is assigned
    pub moderator_fee_rate: Decimal,
    /// Sender's part of each asset under a Split resolution
    pub sender_share: Decimal,
    pub description: String,
}

impl Default for EscrowTerms {
    fn default() -> Self {
        Self {
            moderator_fee_rate: Decimal::ZERO,
            sender_share: Decimal::new(5, 1),
            description: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escrow {
    pub id: EscrowId,
    pub sender: Address,
    pub recipient: Address,
    pub moderator: Option<Address>,
    pub assets: Vec<Asset>,
    /// Sum of asset values, booked against the moderator's ceiling
    pub total_value: Decimal,
    pub fees: FeeSchedule,
    pub sender_share: Decimal,
    pub description: String,
    pub status: EscrowStatus,
    pub sender_confirmed: bool,
    pub recipient_confirmed: bool,
    pub created_at: i64,
    pub funded_at: Option<i64>,
    pub expires_at: i64,
    pub completed_at: Option<i64>,
}

impl Escrow {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    pub(crate) fn expect_status(&self, expected: EscrowStatus) -> Result<(), EscrowError> {
        if self.status != expected {
            return Err(EscrowError::InvalidStatus {
                escrow_id: self.id.to_string(),
                expected: expected.name().to_string(),
                actual: self.status.name().to_string(),
            });
        }
        Ok(())
    }
}

/// Where the net assets of a settlement go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payout {
    ToRecipient,
    ToSender,
    /// Each lot split between the parties; `sender_share` goes to the sender
    Split { sender_share: Decimal },
}

/// Fee totals of one settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Settlement {
    pub escrow_fee: Decimal,
    pub moderator_fee: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Leg {
    from: Address,
    to: Address,
    asset: Asset,
}

/// Ordered asset movements executed all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferPlan {
    legs: Vec<Leg>,
}

impl TransferPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a movement; zero-amount legs are dropped.
    pub fn push(&mut self, from: &Address, to: &Address, asset: Asset) {
        if asset.amount() <= Decimal::ZERO {
            return;
        }
        self.legs.push(Leg {
            from: from.clone(),
            to: to.clone(),
            asset,
        });
    }

    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }
}

impl<S: KvStore> TrustModule<S> {
    // ───────────────────────── Queries ─────────────────────────

    pub fn escrow(&self, id: EscrowId) -> Result<Option<Escrow>, TrustError> {
        self.load(&keys::escrow(id))
    }

    pub fn escrows_by_status(&self, status: EscrowStatus) -> Result<Vec<Escrow>, TrustError> {
        self.index_ids(&keys::escrow_status_prefix(status.code()))
            .into_iter()
            .map(|id| self.require_escrow(EscrowId::new(id)))
            .collect()
    }

    /// Escrows where `party` is sender, recipient or moderator.
    pub fn escrows_of(&self, party: &Address) -> Result<Vec<Escrow>, TrustError> {
        self.index_ids(&keys::escrow_party_prefix(party))
            .into_iter()
            .map(|id| self.require_escrow(EscrowId::new(id)))
            .collect()
    }

    pub(crate) fn require_escrow(&self, id: EscrowId) -> Result<Escrow, TrustError> {
        self.escrow(id)?.ok_or_else(|| {
            EscrowError::NotFound {
                escrow_id: id.to_string(),
            }
            .into()
        })
    }

    /// Move an escrow to `status`, keeping the status index in step.
    pub(crate) fn put_escrow_status(
        &mut self,
        escrow: &mut Escrow,
        status: EscrowStatus,
    ) -> Result<(), TrustError> {
        let old = keys::escrow_status(escrow.status.code(), escrow.id);
        escrow.status = status;
        self.reindex(&old, keys::escrow_status(status.code(), escrow.id));
        self.save(keys::escrow(escrow.id), escrow)
    }

    // ───────────────────────── Handlers ─────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn create_escrow(
        &mut self,
        ctx: &BlockContext,
        sender: Address,
        recipient: Address,
        moderator: Option<Address>,
        assets: Vec<Asset>,
        terms: EscrowTerms,
        expires_at: i64,
    ) -> Result<EscrowId, TrustError> {
        if assets.is_empty() {
            return Err(EscrowError::NoAssets.into());
        }
        for asset in &assets {
            asset.validate()?;
        }
        if sender == recipient {
            return Err(EscrowError::SameParty.into());
        }
        if moderator
            .as_ref()
            .is_some_and(|m| *m == sender || *m == recipient)
        {
            return Err(EscrowError::ModeratorIsParty.into());
        }
        if terms.moderator_fee_rate < Decimal::ZERO
            || terms.moderator_fee_rate > self.params.max_moderator_fee_rate
        {
            return Err(EscrowError::FeeRateTooHigh {
                rate: terms.moderator_fee_rate.to_string(),
                max: self.params.max_moderator_fee_rate.to_string(),
            }
            .into());
        }
        if terms.sender_share < Decimal::ZERO || terms.sender_share > Decimal::ONE {
            return Err(EscrowError::InvalidSenderShare {
                share: terms.sender_share.to_string(),
            }
            .into());
        }
        if expires_at <= ctx.time {
            return Err(EscrowError::ExpiryInPast {
                expires_at,
                now: ctx.time,
            }
            .into());
        }
        if expires_at.saturating_sub(ctx.time) > self.params.max_escrow_secs {
            return Err(EscrowError::ExpiryTooFar {
                expires_at,
                max_secs: self.params.max_escrow_secs,
            }
            .into());
        }

        let value = total_value(&assets)?;
        if let Some(address) = &moderator {
            self.reserve_exposure(address, value)?;
        }

        let moderator_fee_rate = if moderator.is_some() {
            terms.moderator_fee_rate
        } else {
            Decimal::ZERO
        };
        let id = EscrowId::new(self.next_id(Counter::Escrow)?);
        let escrow = Escrow {
            id,
            sender,
            recipient,
            moderator,
            assets,
            total_value: value,
            fees: FeeSchedule::new(self.params.escrow_fee_rate, moderator_fee_rate),
            sender_share: terms.sender_share,
            description: terms.description,
            status: EscrowStatus::Pending,
            sender_confirmed: false,
            recipient_confirmed: false,
            created_at: ctx.time,
            funded_at: None,
            expires_at,
            completed_at: None,
        };
        self.save(keys::escrow(id), &escrow)?;
        self.mark(keys::escrow_status(escrow.status.code(), id));
        self.mark(keys::escrow_party(&escrow.sender, id));
        self.mark(keys::escrow_party(&escrow.recipient, id));
        if let Some(m) = &escrow.moderator {
            self.mark(keys::escrow_party(m, id));
        }

        info!(
            escrow_id = %id,
            sender = %escrow.sender,
            recipient = %escrow.recipient,
            total_value = %value,
            "Escrow created"
        );
        self.emit(TrustEvent::EscrowCreated(EscrowCreated {
            escrow_id: id,
            sender: escrow.sender.clone(),
            recipient: escrow.recipient.clone(),
            moderator: escrow.moderator.clone(),
            total_value: value,
            expires_at,
        }));
        Ok(id)
    }

    pub(crate) fn fund_escrow(
        &mut self,
        ctx: &BlockContext,
        funder: &Address,
        id: EscrowId,
    ) -> Result<(), TrustError> {
        let mut escrow = self.require_escrow(id)?;
        security::authorize(&escrow, funder, EscrowAction::Fund)?;
        escrow.expect_status(EscrowStatus::Pending)?;
        if escrow.is_expired(ctx.time) {
            return Err(EscrowError::Expired {
                escrow_id: id.to_string(),
                expired_at: escrow.expires_at,
            }
            .into());
        }
        self.check_balances(&escrow.sender, &escrow.assets)?;

        escrow.funded_at = Some(ctx.time);
        self.put_escrow_status(&mut escrow, EscrowStatus::Funded)?;

        let custody = self.params.custody_account.clone();
        let mut plan = TransferPlan::new();
        for asset in &escrow.assets {
            plan.push(&escrow.sender, &custody, asset.clone());
        }
        self.execute_plan(&plan)?;
        self.register_owners(&escrow);

        info!(escrow_id = %id, funder = %funder, legs = plan.len(), "Escrow funded");
        self.emit(TrustEvent::EscrowFunded(EscrowFunded {
            escrow_id: id,
            funder: funder.clone(),
            assets: escrow.assets.clone(),
        }));
        Ok(())
    }

    pub(crate) fn release_escrow(
        &mut self,
        ctx: &BlockContext,
        caller: &Address,
        id: EscrowId,
    ) -> Result<(), TrustError> {
        let mut escrow = self.require_escrow(id)?;
        security::authorize(&escrow, caller, EscrowAction::Release)?;
        escrow.expect_status(EscrowStatus::Funded)?;
        self.release_funded(ctx, &mut escrow)
    }

    pub(crate) fn refund_escrow(
        &mut self,
        ctx: &BlockContext,
        caller: &Address,
        id: EscrowId,
    ) -> Result<(), TrustError> {
        let mut escrow = self.require_escrow(id)?;
        security::authorize(&escrow, caller, EscrowAction::Refund)?;
        escrow.expect_status(EscrowStatus::Funded)?;

        let settlement =
            self.settle_escrow(&mut escrow, Payout::ToSender, EscrowStatus::Refunded, ctx.time)?;
        info!(escrow_id = %id, caller = %caller, "Escrow refunded");
        self.emit(TrustEvent::EscrowRefunded(EscrowSettled {
            escrow_id: id,
            paid_to: escrow.sender.clone(),
            escrow_fee: settlement.escrow_fee,
            moderator_fee: settlement.moderator_fee,
        }));
        Ok(())
    }

    pub(crate) fn cancel_escrow(
        &mut self,
        ctx: &BlockContext,
        caller: &Address,
        id: EscrowId,
    ) -> Result<(), TrustError> {
        let mut escrow = self.require_escrow(id)?;
        security::authorize(&escrow, caller, EscrowAction::Cancel)?;
        escrow.expect_status(EscrowStatus::Pending)?;

        escrow.completed_at = Some(ctx.time);
        self.put_escrow_status(&mut escrow, EscrowStatus::Cancelled)?;
        self.release_escrow_reservation(&escrow)?;

        info!(escrow_id = %id, "Escrow cancelled");
        self.emit(TrustEvent::EscrowCancelled(EscrowCancelled { escrow_id: id }));
        Ok(())
    }

    pub(crate) fn confirm_escrow(
        &mut self,
        ctx: &BlockContext,
        party: &Address,
        id: EscrowId,
    ) -> Result<(), TrustError> {
        let mut escrow = self.require_escrow(id)?;
        let role = security::authorize(&escrow, party, EscrowAction::Confirm)?;
        escrow.expect_status(EscrowStatus::Funded)?;

        match role {
            Role::Sender => escrow.sender_confirmed = true,
            Role::Recipient => escrow.recipient_confirmed = true,
            Role::Moderator | Role::Outsider => {}
        }
        self.save(keys::escrow(id), &escrow)?;
        debug!(escrow_id = %id, party = %party, "Escrow confirmed");
        self.emit(TrustEvent::EscrowConfirmed(EscrowConfirmed {
            escrow_id: id,
            party: party.clone(),
        }));

        if escrow.sender_confirmed && escrow.recipient_confirmed {
            self.release_funded(ctx, &mut escrow)?;
        }
        Ok(())
    }

    /// Expire one escrow found by the scheduler. Returns false if it is no
    /// longer due.
    pub(crate) fn expire_escrow(
        &mut self,
        ctx: &BlockContext,
        id: EscrowId,
    ) -> Result<bool, TrustError> {
        let mut escrow = self.require_escrow(id)?;
        if !escrow.is_expired(ctx.time) {
            return Ok(false);
        }
        let refunded = match escrow.status {
            EscrowStatus::Pending => {
                escrow.completed_at = Some(ctx.time);
                self.put_escrow_status(&mut escrow, EscrowStatus::Expired)?;
                self.release_escrow_reservation(&escrow)?;
                false
            }
            EscrowStatus::Funded => {
                let settlement = self.settle_escrow(
                    &mut escrow,
                    Payout::ToSender,
                    EscrowStatus::Expired,
                    ctx.time,
                )?;
                self.emit(TrustEvent::EscrowRefunded(EscrowSettled {
                    escrow_id: id,
                    paid_to: escrow.sender.clone(),
                    escrow_fee: settlement.escrow_fee,
                    moderator_fee: settlement.moderator_fee,
                }));
                true
            }
            _ => return Ok(false),
        };

        info!(escrow_id = %id, refunded, "Escrow expired");
        self.emit(TrustEvent::EscrowExpired(EscrowExpired {
            escrow_id: id,
            refunded,
        }));
        Ok(true)
    }

    /// Pending or Funded escrows whose expiry has passed.
    pub(crate) fn expired_escrow_ids(&self, now: i64) -> Result<Vec<EscrowId>, TrustError> {
        let mut due = Vec::new();
        for status in [EscrowStatus::Pending, EscrowStatus::Funded] {
            for escrow in self.escrows_by_status(status)? {
                if escrow.is_expired(now) {
                    due.push(escrow.id);
                }
            }
        }
        due.sort();
        Ok(due)
    }

    // ───────────────────────── Settlement ─────────────────────────

    fn release_funded(&mut self, ctx: &BlockContext, escrow: &mut Escrow) -> Result<(), TrustError> {
        let settlement =
            self.settle_escrow(escrow, Payout::ToRecipient, EscrowStatus::Released, ctx.time)?;
        info!(
            escrow_id = %escrow.id,
            recipient = %escrow.recipient,
            escrow_fee = %settlement.escrow_fee,
            "Escrow released"
        );
        self.emit(TrustEvent::EscrowReleased(EscrowSettled {
            escrow_id: escrow.id,
            paid_to: escrow.recipient.clone(),
            escrow_fee: settlement.escrow_fee,
            moderator_fee: settlement.moderator_fee,
        }));
        Ok(())
    }

    /// Close a funded or disputed escrow, paying custody out per `payout`.
    ///
    /// Status, index and reservation are written first; the asset legs run
    /// last so a failed leg leaves nothing behind once the transaction rolls
    /// back.
    pub(crate) fn settle_escrow(
        &mut self,
        escrow: &mut Escrow,
        payout: Payout,
        status: EscrowStatus,
        now: i64,
    ) -> Result<Settlement, TrustError> {
        escrow.completed_at = Some(now);
        self.put_escrow_status(escrow, status)?;
        self.release_escrow_reservation(escrow)?;

        let (plan, settlement) = self.payout_plan(escrow, payout);
        self.execute_plan(&plan)?;
        self.unregister_owners(escrow);
        debug!(
            escrow_id = %escrow.id,
            legs = plan.len(),
            status = escrow.status.name(),
            "Escrow settled"
        );
        Ok(settlement)
    }

    fn payout_plan(&self, escrow: &Escrow, payout: Payout) -> (TransferPlan, Settlement) {
        let custody = &self.params.custody_account;
        let mut plan = TransferPlan::new();
        let mut settlement = Settlement::default();

        for asset in &escrow.assets {
            let fees = escrow.fees.breakdown(asset);
            plan.push(custody, &self.params.fee_collector, asset.with_amount(fees.escrow_fee));
            settlement.escrow_fee += fees.escrow_fee;
            if let Some(moderator) = &escrow.moderator {
                plan.push(custody, moderator, asset.with_amount(fees.moderator_fee));
                settlement.moderator_fee += fees.moderator_fee;
            }

            match payout {
                Payout::ToRecipient => {
                    plan.push(custody, &escrow.recipient, asset.with_amount(fees.net))
                }
                Payout::ToSender => plan.push(custody, &escrow.sender, asset.with_amount(fees.net)),
                Payout::Split { sender_share } => {
                    let (to_sender, to_recipient) = split_whole(fees.net, sender_share);
                    plan.push(custody, &escrow.sender, asset.with_amount(to_sender));
                    plan.push(custody, &escrow.recipient, asset.with_amount(to_recipient));
                }
            }
        }
        (plan, settlement)
    }

    fn release_escrow_reservation(&mut self, escrow: &Escrow) -> Result<(), TrustError> {
        match &escrow.moderator {
            Some(moderator) => self.release_reservation(moderator, escrow.total_value),
            None => Ok(()),
        }
    }

    /// Confirm the funder holds every lot before anything moves.
    fn check_balances(&self, owner: &Address, assets: &[Asset]) -> Result<(), TrustError> {
        let mut required: BTreeMap<String, (&Asset, Decimal)> = BTreeMap::new();
        for asset in assets {
            let label = asset.label();
            let total = match required.get(&label) {
                Some((_, sum)) => sum
                    .checked_add(asset.amount())
                    .ok_or(AssetError::Overflow { label: label.clone() })?,
                None => asset.amount(),
            };
            required.insert(label, (asset, total));
        }
        for (label, (asset, amount)) in required {
            let available = match asset {
                Asset::Currency { denom, .. } => self.caps.ledger()?.balance(owner, denom),
                Asset::Equity(lot) => self.caps.registry()?.shares_held(
                    owner,
                    &lot.company_id,
                    Some(&lot.class_id),
                ),
            };
            if available < amount {
                return Err(EscrowError::InsufficientFunds {
                    asset: label,
                    required: amount.to_string(),
                    available: available.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn move_asset(&mut self, from: &Address, to: &Address, asset: &Asset) -> Result<(), TrustError> {
        match asset {
            Asset::Currency { denom, amount } => {
                self.caps.ledger_mut()?.transfer(from, to, denom, *amount)?
            }
            Asset::Equity(lot) => self.caps.registry_mut()?.transfer_shares(
                from,
                to,
                &lot.company_id,
                &lot.class_id,
                lot.shares,
            )?,
        }
        Ok(())
    }

    /// Run every leg; on failure reverse the legs already executed.
    pub(crate) fn execute_plan(&mut self, plan: &TransferPlan) -> Result<(), TrustError> {
        for (done, leg) in plan.legs.iter().enumerate() {
            if let Err(err) = self.move_asset(&leg.from, &leg.to, &leg.asset) {
                warn!(
                    from = %leg.from,
                    to = %leg.to,
                    asset = %leg.asset.label(),
                    error = %err,
                    "Transfer leg failed, compensating"
                );
                for undo in plan.legs[..done].iter().rev() {
                    if let Err(undo_err) = self.move_asset(&undo.to, &undo.from, &undo.asset) {
                        error!(
                            from = %undo.to,
                            to = %undo.from,
                            asset = %undo.asset.label(),
                            error = %undo_err,
                            "Compensating transfer failed"
                        );
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    // ─────────────────── Beneficial ownership ───────────────────

    fn register_owners(&mut self, escrow: &Escrow) {
        let custody = self.params.custody_account.clone();
        let registry = match self.caps.registry_mut() {
            Ok(registry) => registry,
            Err(err) => {
                if escrow.assets.iter().any(|a| matches!(a, Asset::Equity(_))) {
                    warn!(escrow_id = %escrow.id, error = %err, "Beneficial owner registration skipped");
                }
                return;
            }
        };
        for asset in &escrow.assets {
            if let Asset::Equity(lot) = asset {
                if let Err(err) = registry.register_beneficial_owner(
                    &custody,
                    &escrow.sender,
                    &lot.company_id,
                    &lot.class_id,
                    lot.shares,
                    escrow.id,
                ) {
                    warn!(
                        escrow_id = %escrow.id,
                        company = %lot.company_id,
                        error = %err,
                        "Beneficial owner registration failed"
                    );
                }
            }
        }
    }

    fn unregister_owners(&mut self, escrow: &Escrow) {
        let custody = self.params.custody_account.clone();
        let registry = match self.caps.registry_mut() {
            Ok(registry) => registry,
            Err(err) => {
                if escrow.assets.iter().any(|a| matches!(a, Asset::Equity(_))) {
                    warn!(escrow_id = %escrow.id, error = %err, "Beneficial owner removal skipped");
                }
                return;
            }
        };
        for asset in &escrow.assets {
            if let Asset::Equity(lot) = asset {
                if let Err(err) = registry.unregister_beneficial_owner(
                    &custody,
                    &escrow.sender,
                    &lot.company_id,
                    &lot.class_id,
                    lot.shares,
                    escrow.id,
                ) {
                    warn!(
                        escrow_id = %escrow.id,
                        company = %lot.company_id,
                        error = %err,
                        "Beneficial owner removal failed"
                    );
                }
            }
        }
    }
}
