//! Versioned, transactional storage for TrustDB.
//!
//! Trust objects are keyed by (kind, scope, version) and immutable once
//! stored. Callers read an exact version or the latest one, insert single
//! objects directly on a [`Database`], or group inserts into a
//! [`Transaction`] that becomes visible all at once on commit.
//!
//! # Layers
//!
//! - [`TrustReader`] / [`TrustWriter`] -- the capability traits; typed
//!   getters and inserts are default methods over one query and one write
//! - [`Database`] -- the store, backed by a connection pool
//! - [`DbTransaction`] -- an isolated unit of work on one connection
//! - [`ConnectionPool`] -- bounded, runtime-tunable connection pool
//! - [`Engine`] -- version indexes, conflict detection, and the commit log
//! - [`WriteAheadLog`] -- CRC-framed append-only log for durability
//!
//! # Rules
//!
//! 1. At most one record exists per (kind, scope, version).
//! 2. Re-inserting identical content is a no-op that writes zero records.
//! 3. Different content at an occupied key is a conflict and changes nothing.
//! 4. A successful insert is in the log before it returns.
//! 5. Every operation takes a [`Context`] and gives up when it expires.
//!
//! [`Database::in_memory`] is the same engine without a log and serves as
//! the test fake for consumers.

pub mod config;
pub mod context;
pub mod database;
pub mod engine;
pub mod error;
pub mod index;
pub mod pool;
pub mod record;
pub mod traits;
pub mod transaction;
pub mod wal;

#[cfg(test)]
mod testutil;

pub use config::TrustDbConfig;
pub use context::{CancelHandle, Context};
pub use database::Database;
pub use engine::Engine;
pub use error::{TrustDbError, TrustDbResult};
pub use pool::{ConnectionPool, PoolStats};
pub use record::{Kind, Query, Record, RecordKey, Scope};
pub use traits::{Isolation, Transaction, TrustDb, TrustReader, TrustWriter, TxOptions};
pub use transaction::DbTransaction;
pub use wal::{LogRecord, SyncMode, WriteAheadLog};
