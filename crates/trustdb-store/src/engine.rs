//! The backing engine: versioned tables, conflict detection, and the commit
//! log. Everything above this module reaches it through a pooled connection.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};
use trustdb_types::{Certificate, Chain, CustKey, Isd, Trc, IA};

use crate::error::{TrustDbError, TrustDbResult};
use crate::index::{Slot, VersionIndex};
use crate::record::{conflict, Kind, Query, Record, RecordKey, Scope};
use crate::wal::{LogRecord, SyncMode, WriteAheadLog, SCHEMA_VERSION};

/// Outcome of checking one record against committed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Vacant,
    Identical,
    Conflict { existing: Record },
}

fn classify<V: Clone>(slot: Slot<'_, V>, wrap: fn(V) -> Record) -> Probe {
    match slot {
        Slot::Vacant => Probe::Vacant,
        Slot::Identical => Probe::Identical,
        Slot::Conflict(v) => Probe::Conflict {
            existing: wrap(v.clone()),
        },
    }
}

/// A scope a serializable transaction depends on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReadScope {
    /// One (kind, scope) pair: exact-version and max-version reads.
    Key(Kind, Scope),
    /// A whole collection: `get_all_*` reads.
    Kind(Kind),
}

/// The five collections.
#[derive(Debug, Default)]
pub struct Tables {
    trcs: VersionIndex<Isd, Trc>,
    chains: VersionIndex<IA, Chain>,
    iss_certs: VersionIndex<IA, Certificate>,
    leaf_certs: VersionIndex<IA, Certificate>,
    cust_keys: VersionIndex<IA, CustKey>,
}

impl Tables {
    pub fn probe(&self, record: &Record) -> Probe {
        match record {
            Record::Trc(t) => classify(self.trcs.probe(t.isd, t.version, t), Record::Trc),
            Record::Chain(c) => classify(self.chains.probe(c.ia(), c.version(), c), Record::Chain),
            Record::IssCert(c) => {
                classify(self.iss_certs.probe(c.subject, c.version, c), Record::IssCert)
            }
            Record::LeafCert(c) => {
                classify(self.leaf_certs.probe(c.subject, c.version, c), Record::LeafCert)
            }
            Record::CustKey(k) => {
                classify(self.cust_keys.probe(k.ia, k.version, k), Record::CustKey)
            }
        }
    }

    fn insert(&mut self, record: Record) -> bool {
        match record {
            Record::Trc(t) => self.trcs.insert(t.isd, t.version, t),
            Record::Chain(c) => self.chains.insert(c.ia(), c.version(), c),
            Record::IssCert(c) => self.iss_certs.insert(c.subject, c.version, c),
            Record::LeafCert(c) => self.leaf_certs.insert(c.subject, c.version, c),
            Record::CustKey(k) => self.cust_keys.insert(k.ia, k.version, k),
        }
    }

    pub fn query(&self, query: &Query) -> Vec<Record> {
        match *query {
            Query::Version {
                kind,
                scope,
                version,
            } => self.get(kind, scope, version).into_iter().collect(),
            Query::Max { kind, scope } => self.max(kind, scope).into_iter().collect(),
            Query::All(kind) => self.all(kind),
        }
    }

    fn get(&self, kind: Kind, scope: Scope, version: u64) -> Option<Record> {
        match (kind, scope) {
            (Kind::Trc, Scope::Isd(isd)) => self.trcs.get(isd, version).cloned().map(Record::Trc),
            (Kind::Chain, Scope::Ia(ia)) => {
                self.chains.get(ia, version).cloned().map(Record::Chain)
            }
            (Kind::IssCert, Scope::Ia(ia)) => {
                self.iss_certs.get(ia, version).cloned().map(Record::IssCert)
            }
            (Kind::LeafCert, Scope::Ia(ia)) => {
                self.leaf_certs.get(ia, version).cloned().map(Record::LeafCert)
            }
            (Kind::CustKey, Scope::Ia(ia)) => {
                self.cust_keys.get(ia, version).cloned().map(Record::CustKey)
            }
            _ => None,
        }
    }

    fn max(&self, kind: Kind, scope: Scope) -> Option<Record> {
        match (kind, scope) {
            (Kind::Trc, Scope::Isd(isd)) => self.trcs.max(isd).cloned().map(Record::Trc),
            (Kind::Chain, Scope::Ia(ia)) => self.chains.max(ia).cloned().map(Record::Chain),
            (Kind::IssCert, Scope::Ia(ia)) => {
                self.iss_certs.max(ia).cloned().map(Record::IssCert)
            }
            (Kind::LeafCert, Scope::Ia(ia)) => {
                self.leaf_certs.max(ia).cloned().map(Record::LeafCert)
            }
            (Kind::CustKey, Scope::Ia(ia)) => {
                self.cust_keys.max(ia).cloned().map(Record::CustKey)
            }
            _ => None,
        }
    }

    fn all(&self, kind: Kind) -> Vec<Record> {
        match kind {
            Kind::Trc => self.trcs.values().cloned().map(Record::Trc).collect(),
            Kind::Chain => self.chains.values().cloned().map(Record::Chain).collect(),
            Kind::IssCert => self.iss_certs.values().cloned().map(Record::IssCert).collect(),
            Kind::LeafCert => self.leaf_certs.values().cloned().map(Record::LeafCert).collect(),
            Kind::CustKey => self.cust_keys.values().cloned().map(Record::CustKey).collect(),
        }
    }

    pub fn count(&self, kind: Kind) -> usize {
        match kind {
            Kind::Trc => self.trcs.len(),
            Kind::Chain => self.chains.len(),
            Kind::IssCert => self.iss_certs.len(),
            Kind::LeafCert => self.leaf_certs.len(),
            Kind::CustKey => self.cust_keys.len(),
        }
    }
}

#[derive(Debug, Default)]
struct EngineState {
    tables: Tables,
    commit_seq: u64,
    /// Commit sequence of the last write to each scope.
    modified: HashMap<ReadScope, u64>,
}

/// Read-set validation for a serializable commit.
pub struct ReadCheck<'a> {
    pub start_seq: u64,
    pub reads: &'a HashSet<ReadScope>,
}

/// Versioned trust tables with an optional durable commit log.
///
/// All writes funnel through [`Engine::apply`], which holds the write lock
/// across conflict detection, the log append, and the table update, so
/// commits are serialized and a batch is visible all at once or not at all.
///
/// The lock is a blocking `std::sync::RwLock`. Under
/// [`SyncMode::EveryWrite`] a commit holds it through the `fsync`, which
/// stalls the calling runtime worker and every reader for that long.
/// Deployments with slow disks should use [`SyncMode::OsDefault`] or a
/// multi-threaded runtime with spare workers.
#[derive(Debug)]
pub struct Engine {
    state: RwLock<EngineState>,
    wal: Option<WriteAheadLog>,
}

impl Engine {
    /// Tables only; nothing survives the process.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(EngineState::default()),
            wal: None,
        }
    }

    /// Open a log-backed engine and replay its committed batches.
    pub fn open(path: &Path, sync_mode: SyncMode) -> TrustDbResult<Self> {
        let wal = WriteAheadLog::open(path, sync_mode)?;
        let mut state = EngineState::default();

        let batches = wal.recover()?;
        let mut replayed = 0usize;
        for batch in &batches {
            if batch.schema > SCHEMA_VERSION {
                return Err(TrustDbError::Unavailable(format!(
                    "log {} uses schema {}, newest supported is {SCHEMA_VERSION}",
                    path.display(),
                    batch.schema
                )));
            }
            for record in &batch.records {
                match state.tables.probe(record) {
                    Probe::Vacant => {
                        mark_modified(&mut state.modified, record.key(), batch.commit_seq);
                        state.tables.insert(record.clone());
                        replayed += 1;
                    }
                    Probe::Identical => {}
                    Probe::Conflict { .. } => {
                        warn!(
                            key = %record.key(),
                            commit_seq = batch.commit_seq,
                            "conflicting record in log; keeping first"
                        );
                    }
                }
            }
            state.commit_seq = state.commit_seq.max(batch.commit_seq);
        }

        info!(
            path = %path.display(),
            batches = batches.len(),
            records = replayed,
            commit_seq = state.commit_seq,
            "trust database opened"
        );

        Ok(Self {
            state: RwLock::new(state),
            wal: Some(wal),
        })
    }

    pub fn is_durable(&self) -> bool {
        self.wal.is_some()
    }

    fn read(&self) -> TrustDbResult<RwLockReadGuard<'_, EngineState>> {
        self.state
            .read()
            .map_err(|_| TrustDbError::Unavailable("engine lock poisoned".into()))
    }

    fn write(&self) -> TrustDbResult<RwLockWriteGuard<'_, EngineState>> {
        self.state
            .write()
            .map_err(|_| TrustDbError::Unavailable("engine lock poisoned".into()))
    }

    pub fn commit_seq(&self) -> TrustDbResult<u64> {
        Ok(self.read()?.commit_seq)
    }

    pub fn query(&self, query: &Query) -> TrustDbResult<Vec<Record>> {
        Ok(self.read()?.tables.query(query))
    }

    pub fn probe(&self, record: &Record) -> TrustDbResult<Probe> {
        Ok(self.read()?.tables.probe(record))
    }

    pub fn counts(&self) -> TrustDbResult<Vec<(Kind, usize)>> {
        let state = self.read()?;
        Ok(Kind::ALL
            .iter()
            .map(|&kind| (kind, state.tables.count(kind)))
            .collect())
    }

    /// Atomically apply a batch and return how many records were newly
    /// written.
    ///
    /// Records identical to committed ones (or repeated within the batch)
    /// are skipped. Any record conflicting with committed state, or any
    /// dependency in `reads` modified after `start_seq`, fails the whole
    /// batch with [`TrustDbError::Conflict`] and writes nothing.
    pub fn apply(&self, batch: &[Record], reads: Option<ReadCheck<'_>>) -> TrustDbResult<u64> {
        let mut state = self.write()?;

        if let Some(check) = reads {
            for scope in check.reads {
                if let Some(&seq) = state.modified.get(scope) {
                    if seq > check.start_seq {
                        return Err(TrustDbError::Conflict {
                            key: describe_scope(scope),
                            reason: format!(
                                "serialization failure: modified by commit {seq} after snapshot {}",
                                check.start_seq
                            ),
                        });
                    }
                }
            }
        }

        let mut fresh: Vec<Record> = Vec::new();
        let mut staged: HashMap<RecordKey, usize> = HashMap::new();
        for record in batch {
            let key = record.key();
            if let Some(&i) = staged.get(&key) {
                if fresh[i] != *record {
                    return Err(conflict(&fresh[i], record, "batch holds two versions of this key"));
                }
                continue;
            }
            match state.tables.probe(record) {
                Probe::Vacant => {
                    staged.insert(key, fresh.len());
                    fresh.push(record.clone());
                }
                Probe::Identical => {}
                Probe::Conflict { existing } => {
                    debug!(key = %key, "insert rejected: key holds different content");
                    return Err(conflict(&existing, record, "key already holds different content"));
                }
            }
        }

        if fresh.is_empty() {
            return Ok(0);
        }

        let seq = state.commit_seq + 1;
        if let Some(wal) = &self.wal {
            wal.append(&LogRecord {
                schema: SCHEMA_VERSION,
                commit_seq: seq,
                records: fresh.clone(),
            })?;
        }

        let written = fresh.len() as u64;
        for record in fresh {
            mark_modified(&mut state.modified, record.key(), seq);
            state.tables.insert(record);
        }
        state.commit_seq = seq;

        debug!(commit_seq = seq, written, "batch applied");
        Ok(written)
    }
}

fn mark_modified(modified: &mut HashMap<ReadScope, u64>, key: RecordKey, seq: u64) {
    modified.insert(ReadScope::Key(key.kind, key.scope), seq);
    modified.insert(ReadScope::Kind(key.kind), seq);
}

fn describe_scope(scope: &ReadScope) -> String {
    match scope {
        ReadScope::Key(kind, scope) => format!("{kind} {scope}"),
        ReadScope::Kind(kind) => format!("all {kind} records"),
    }
}
