//! Transactional overlay: all-or-nothing writes
//!
//! `TxStore` wraps a base store. Between `begin()` and `commit()` every write
//! lands in an overlay; reads and scans see the overlay merged over the base.
//! `rollback()` throws the overlay away, leaving the base byte-for-byte as it
//! was before `begin()`.
//!
//! Outside a transaction, writes go straight to the base store.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::kv::KvStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Transaction already active")]
    TransactionActive,

    #[error("No active transaction")]
    NoTransaction,
}

/// Pending write: `Some(value)` to set, `None` to delete.
type Overlay = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

/// Store with a single-level write overlay.
#[derive(Debug, Clone, Default)]
pub struct TxStore<S> {
    base: S,
    overlay: Option<Overlay>,
}

impl<S: KvStore> TxStore<S> {
    pub fn new(base: S) -> Self {
        Self {
            base,
            overlay: None,
        }
    }

    /// Start buffering writes. Nested transactions are not supported.
    pub fn begin(&mut self) -> Result<(), StoreError> {
        if self.overlay.is_some() {
            return Err(StoreError::TransactionActive);
        }
        self.overlay = Some(Overlay::new());
        Ok(())
    }

    /// Apply buffered writes to the base store.
    ///
    /// Returns the number of keys written or deleted.
    pub fn commit(&mut self) -> Result<usize, StoreError> {
        let overlay = self.overlay.take().ok_or(StoreError::NoTransaction)?;
        let count = overlay.len();
        for (key, value) in overlay {
            match value {
                Some(v) => self.base.set(key, v),
                None => self.base.delete(&key),
            }
        }
        Ok(count)
    }

    /// Discard buffered writes.
    ///
    /// Returns the number of discarded keys.
    pub fn rollback(&mut self) -> Result<usize, StoreError> {
        let overlay = self.overlay.take().ok_or(StoreError::NoTransaction)?;
        Ok(overlay.len())
    }

    pub fn in_transaction(&self) -> bool {
        self.overlay.is_some()
    }

    /// The committed state, ignoring any open overlay.
    pub fn base(&self) -> &S {
        &self.base
    }

    pub fn into_inner(self) -> S {
        self.base
    }
}

impl<S: KvStore> KvStore for TxStore<S> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        if let Some(pending) = self.overlay.as_ref().and_then(|o| o.get(key)) {
            return pending.clone();
        }
        self.base.get(key)
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        match self.overlay.as_mut() {
            Some(overlay) => {
                overlay.insert(key, Some(value));
            }
            None => self.base.set(key, value),
        }
    }

    fn delete(&mut self, key: &[u8]) {
        match self.overlay.as_mut() {
            Some(overlay) => {
                overlay.insert(key.to_vec(), None);
            }
            None => self.base.delete(key),
        }
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let base = self.base.scan_prefix(prefix);
        let Some(overlay) = self.overlay.as_ref() else {
            return base;
        };

        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = base.into_iter().collect();
        for (key, value) in overlay
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            match value {
                Some(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        merged.into_iter().collect()
    }
}
