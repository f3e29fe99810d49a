//! Persistence for the trust module
//!
//! A flat, ordered key-value namespace with all-or-nothing transactions,
//! checksummed records and replay-determinism checks.
//!
//! # Modules
//! - `kv`: `KvStore` trait and the in-memory ordered store
//! - `cache`: transactional write overlay (`begin` / `commit` / `rollback`)
//! - `codec`: bincode records framed with a CRC32C trailer
//! - `determinism`: SHA-256 state hash and store comparison

pub mod cache;
pub mod codec;
pub mod determinism;
pub mod kv;

pub use cache::{StoreError, TxStore};
pub use codec::{decode, encode, CodecError};
pub use determinism::{compare_stores, state_hash, DivergenceReport};
pub use kv::{KvStore, MemStore};
