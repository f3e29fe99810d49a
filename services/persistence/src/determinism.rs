//! Determinism checks: state hashing and divergence reports
//!
//! Two replicas that applied the same transaction stream must hold
//! byte-identical stores. `state_hash` folds the whole ordered store into one
//! SHA-256 digest; `compare_stores` explains where two stores differ.

use sha2::{Digest, Sha256};

use crate::kv::KvStore;

/// SHA-256 over every entry in key order.
///
/// Keys and values are length-prefixed so `("ab", "c")` and `("a", "bc")`
/// hash differently.
pub fn state_hash<S: KvStore + ?Sized>(store: &S) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in store.scan_prefix(&[]) {
        hasher.update((key.len() as u64).to_be_bytes());
        hasher.update(&key);
        hasher.update((value.len() as u64).to_be_bytes());
        hasher.update(&value);
    }
    format!("{:x}", hasher.finalize())
}

// ── Divergence Report ───────────────────────────────────────────────

/// Result of comparing two stores entry by entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DivergenceReport {
    pub hash_a: String,
    pub hash_b: String,
    /// Keys present only in A
    pub only_in_a: Vec<Vec<u8>>,
    /// Keys present only in B
    pub only_in_b: Vec<Vec<u8>>,
    /// Keys present in both with different values
    pub changed: Vec<Vec<u8>>,
}

impl DivergenceReport {
    pub fn is_match(&self) -> bool {
        self.hash_a == self.hash_b
    }

    pub fn detail(&self) -> String {
        if self.is_match() {
            return "States are identical".to_string();
        }
        format!(
            "{} only in A, {} only in B, {} changed",
            self.only_in_a.len(),
            self.only_in_b.len(),
            self.changed.len()
        )
    }
}

/// Walk both stores in key order and record every difference.
pub fn compare_stores<A, B>(a: &A, b: &B) -> DivergenceReport
where
    A: KvStore + ?Sized,
    B: KvStore + ?Sized,
{
    let entries_a = a.scan_prefix(&[]);
    let entries_b = b.scan_prefix(&[]);

    let mut only_in_a = Vec::new();
    let mut only_in_b = Vec::new();
    let mut changed = Vec::new();

    let mut ia = entries_a.iter().peekable();
    let mut ib = entries_b.iter().peekable();
    loop {
        match (ia.peek(), ib.peek()) {
            (Some((ka, va)), Some((kb, vb))) => match ka.cmp(kb) {
                std::cmp::Ordering::Less => {
                    only_in_a.push(ka.clone());
                    ia.next();
                }
                std::cmp::Ordering::Greater => {
                    only_in_b.push(kb.clone());
                    ib.next();
                }
                std::cmp::Ordering::Equal => {
                    if va != vb {
                        changed.push(ka.clone());
                    }
                    ia.next();
                    ib.next();
                }
            },
            (Some((ka, _)), None) => {
                only_in_a.push(ka.clone());
                ia.next();
            }
            (None, Some((kb, _))) => {
                only_in_b.push(kb.clone());
                ib.next();
            }
            (None, None) => break,
        }
    }

    DivergenceReport {
        hash_a: state_hash(a),
        hash_b: state_hash(b),
        only_in_a,
        only_in_b,
        changed,
    }
}
