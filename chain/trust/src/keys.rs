//! Store key layout
//!
//! ```text
//! [prefix: u8][components...]
//! ```
//!
//! Numeric ids are big-endian so range scans return them in id order.
//! Strings are `[len: u16 BE][bytes]` so no address is a prefix of another.
//! Status indexes carry the status byte right after the prefix, letting the
//! scheduler scan one status without touching the rest.

use trust_types::ids::{
    ActionId, Address, CompanyId, DisputeId, EscrowId, InvestigationId, ReportId, MAX_ID_LEN,
};

pub const ESCROW: u8 = 0x01;
pub const ESCROW_BY_STATUS: u8 = 0x02;
pub const DISPUTE: u8 = 0x03;
pub const DISPUTE_BY_ESCROW: u8 = 0x04;
pub const DISPUTE_BY_STATUS: u8 = 0x05;
pub const MODERATOR: u8 = 0x06;
pub const UNBONDING: u8 = 0x07;
pub const BLACKLIST: u8 = 0x08;
pub const ACTION: u8 = 0x09;
pub const INVESTIGATION: u8 = 0x0A;
pub const INVESTIGATION_BY_COMPANY: u8 = 0x0B;
pub const ACTIVE_INVESTIGATION: u8 = 0x0C;
pub const INVESTIGATION_BY_STATUS: u8 = 0x0D;
pub const REPORT: u8 = 0x0E;
pub const COUNTER: u8 = 0x0F;
pub const ESCROW_BY_PARTY: u8 = 0x10;
pub const REPORT_BY_COMPANY: u8 = 0x11;
pub const PARAMS: u8 = 0x12;

/// Monotonic id sequences, one per entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Escrow = 1,
    Dispute = 2,
    Action = 3,
    Investigation = 4,
    Report = 5,
}

fn with_prefix(prefix: u8, capacity: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + capacity);
    key.push(prefix);
    key
}

// Every string segment is an `Address` or `CompanyId`, so the length fits.
const _: () = assert!(MAX_ID_LEN <= u16::MAX as usize);

fn push_str(key: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    debug_assert!(bytes.len() <= MAX_ID_LEN);
    key.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    key.extend_from_slice(bytes);
}

fn push_id(key: &mut Vec<u8>, id: u64) {
    key.extend_from_slice(&id.to_be_bytes());
}

/// Trailing big-endian id of an index key.
pub fn id_suffix(key: &[u8]) -> Option<u64> {
    let start = key.len().checked_sub(8)?;
    let bytes: [u8; 8] = key[start..].try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

// ─── Escrows ───

pub fn escrow(id: EscrowId) -> Vec<u8> {
    let mut key = with_prefix(ESCROW, 8);
    push_id(&mut key, id.get());
    key
}

pub fn escrow_status_prefix(status: u8) -> Vec<u8> {
    vec![ESCROW_BY_STATUS, status]
}

pub fn escrow_status(status: u8, id: EscrowId) -> Vec<u8> {
    let mut key = escrow_status_prefix(status);
    push_id(&mut key, id.get());
    key
}

pub fn escrow_party_prefix(party: &Address) -> Vec<u8> {
    let mut key = with_prefix(ESCROW_BY_PARTY, 2 + party.as_str().len());
    push_str(&mut key, party.as_str());
    key
}

pub fn escrow_party(party: &Address, id: EscrowId) -> Vec<u8> {
    let mut key = escrow_party_prefix(party);
    push_id(&mut key, id.get());
    key
}

// ─── Disputes ───

pub fn dispute(id: DisputeId) -> Vec<u8> {
    let mut key = with_prefix(DISPUTE, 8);
    push_id(&mut key, id.get());
    key
}

pub fn dispute_by_escrow(escrow_id: EscrowId) -> Vec<u8> {
    let mut key = with_prefix(DISPUTE_BY_ESCROW, 8);
    push_id(&mut key, escrow_id.get());
    key
}

pub fn dispute_status_prefix(status: u8) -> Vec<u8> {
    vec![DISPUTE_BY_STATUS, status]
}

pub fn dispute_status(status: u8, id: DisputeId) -> Vec<u8> {
    let mut key = dispute_status_prefix(status);
    push_id(&mut key, id.get());
    key
}

// ─── Trust ledger ───

pub fn moderator_prefix() -> Vec<u8> {
    vec![MODERATOR]
}

pub fn moderator(address: &Address) -> Vec<u8> {
    let mut key = with_prefix(MODERATOR, 2 + address.as_str().len());
    push_str(&mut key, address.as_str());
    key
}

pub fn unbonding_prefix() -> Vec<u8> {
    vec![UNBONDING]
}

pub fn unbonding(address: &Address) -> Vec<u8> {
    let mut key = with_prefix(UNBONDING, 2 + address.as_str().len());
    push_str(&mut key, address.as_str());
    key
}

// ─── Oversight ───

pub fn blacklist_prefix() -> Vec<u8> {
    vec![BLACKLIST]
}

pub fn blacklist(address: &Address) -> Vec<u8> {
    let mut key = with_prefix(BLACKLIST, 2 + address.as_str().len());
    push_str(&mut key, address.as_str());
    key
}

pub fn action(id: ActionId) -> Vec<u8> {
    let mut key = with_prefix(ACTION, 8);
    push_id(&mut key, id.get());
    key
}

// ─── Investigations ───

pub fn investigation(id: InvestigationId) -> Vec<u8> {
    let mut key = with_prefix(INVESTIGATION, 8);
    push_id(&mut key, id.get());
    key
}

pub fn investigation_company_prefix(company: &CompanyId) -> Vec<u8> {
    let mut key = with_prefix(INVESTIGATION_BY_COMPANY, 2 + company.as_str().len());
    push_str(&mut key, company.as_str());
    key
}

pub fn investigation_by_company(company: &CompanyId, id: InvestigationId) -> Vec<u8> {
    let mut key = investigation_company_prefix(company);
    push_id(&mut key, id.get());
    key
}

pub fn active_investigation(company: &CompanyId) -> Vec<u8> {
    let mut key = with_prefix(ACTIVE_INVESTIGATION, 2 + company.as_str().len());
    push_str(&mut key, company.as_str());
    key
}

pub fn investigation_status_prefix(status: u8) -> Vec<u8> {
    vec![INVESTIGATION_BY_STATUS, status]
}

pub fn investigation_status(status: u8, id: InvestigationId) -> Vec<u8> {
    let mut key = investigation_status_prefix(status);
    push_id(&mut key, id.get());
    key
}

pub fn report(id: ReportId) -> Vec<u8> {
    let mut key = with_prefix(REPORT, 8);
    push_id(&mut key, id.get());
    key
}

pub fn report_company_prefix(company: &CompanyId) -> Vec<u8> {
    let mut key = with_prefix(REPORT_BY_COMPANY, 2 + company.as_str().len());
    push_str(&mut key, company.as_str());
    key
}

pub fn report_by_company(company: &CompanyId, id: ReportId) -> Vec<u8> {
    let mut key = report_company_prefix(company);
    push_id(&mut key, id.get());
    key
}

// ─── Module ───

pub fn counter(counter: Counter) -> Vec<u8> {
    vec![COUNTER, counter as u8]
}

pub fn params() -> Vec<u8> {
    vec![PARAMS]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_sort_numerically() {
        assert!(escrow(EscrowId::new(2)) < escrow(EscrowId::new(256)));
    }

    #[test]
    fn test_id_suffix() {
        let key = escrow_status(3, EscrowId::new(77));
        assert_eq!(id_suffix(&key), Some(77));
        assert_eq!(id_suffix(&[1, 2]), None);
    }

    #[test]
    fn test_length_prefix_prevents_address_collisions() {
        let short = escrow_party_prefix(&Address::new("bob"));
        let long = escrow_party(&Address::new("bobby"), EscrowId::new(1));
        assert!(!long.starts_with(&short));
    }

    #[test]
    fn test_longest_address_is_kept_whole() {
        let address = Address::new("z".repeat(MAX_ID_LEN));
        let key = moderator(&address);
        assert_eq!(key.len(), 1 + 2 + MAX_ID_LEN);
        assert_eq!(u16::from_be_bytes([key[1], key[2]]), MAX_ID_LEN as u16);
        assert_eq!(&key[3..], address.as_str().as_bytes());
    }

    #[test]
    fn test_status_index_shares_prefix() {
        let key = dispute_status(2, DisputeId::new(5));
        assert!(key.starts_with(&dispute_status_prefix(2)));
        assert!(!key.starts_with(&dispute_status_prefix(3)));
    }

    #[test]
    fn test_prefixes_are_distinct() {
        let company = CompanyId::new("ACME");
        let keys = [
            investigation_by_company(&company, InvestigationId::new(1)),
            active_investigation(&company),
            report_by_company(&company, ReportId::new(1)),
        ];
        assert_ne!(keys[0][0], keys[1][0]);
        assert_ne!(keys[1][0], keys[2][0]);
    }
}
