use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::Context;
use crate::engine::{Engine, Probe, ReadCheck, ReadScope};
use crate::error::{TrustDbError, TrustDbResult};
use crate::pool::{ConnectionPool, PooledConnection};
use crate::record::{conflict, Query, Record, RecordKey};
use crate::traits::{Isolation, Transaction, TrustReader, TrustWriter, TxOptions};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TxState {
    Open,
    Committed,
    RolledBack,
}

/// Writes and reads accumulated by an open transaction.
#[derive(Debug, Default)]
struct Workset {
    records: Vec<Record>,
    staged: HashMap<RecordKey, usize>,
    reads: HashSet<ReadScope>,
    poisoned: Option<String>,
}

impl Workset {
    fn clear(&mut self) {
        self.records.clear();
        self.staged.clear();
        self.reads.clear();
    }

    fn pending<'a>(&'a self, query: &'a Query) -> impl Iterator<Item = &'a Record> + 'a {
        self.records.iter().filter(move |r| matches(query, r))
    }
}

#[derive(Debug)]
struct TxInner {
    state: TxState,
    conn: Option<PooledConnection>,
    work: Workset,
}

fn matches(query: &Query, record: &Record) -> bool {
    let key = record.key();
    match *query {
        Query::Version {
            kind,
            scope,
            version,
        } => key.kind == kind && key.scope == scope && key.version == version,
        Query::Max { kind, scope } => key.kind == kind && key.scope == scope,
        Query::All(kind) => key.kind == kind,
    }
}

fn read_scope(query: &Query) -> ReadScope {
    match *query {
        Query::Version { kind, scope, .. } | Query::Max { kind, scope } => {
            ReadScope::Key(kind, scope)
        }
        Query::All(kind) => ReadScope::Kind(kind),
    }
}

/// A transaction over one pooled connection of a [`Database`](crate::Database).
///
/// Writes are staged locally and checked against committed state as they
/// are made; [`Transaction::commit`] re-checks them under the engine's
/// commit lock so the first committer of a key wins. Any failed operation
/// poisons the transaction and its commit fails with a conflict.
#[derive(Debug)]
pub struct DbTransaction {
    id: Uuid,
    options: TxOptions,
    start_seq: u64,
    pool: Arc<ConnectionPool>,
    inner: Mutex<TxInner>,
}

impl DbTransaction {
    pub(crate) fn new(
        conn: PooledConnection,
        pool: Arc<ConnectionPool>,
        options: TxOptions,
    ) -> TrustDbResult<Self> {
        let start_seq = conn.engine().commit_seq()?;
        let id = Uuid::now_v7();
        debug!(tx = %id, conn = conn.id(), start_seq, ?options, "transaction begun");
        Ok(Self {
            id,
            options,
            start_seq,
            pool,
            inner: Mutex::new(TxInner {
                state: TxState::Open,
                conn: Some(conn),
                work: Workset::default(),
            }),
        })
    }

    pub fn options(&self) -> TxOptions {
        self.options
    }

    /// Whether the transaction is still open.
    pub fn is_open(&self) -> bool {
        self.inner
            .lock()
            .map(|i| i.state == TxState::Open)
            .unwrap_or(false)
    }

    fn lock(&self) -> TrustDbResult<MutexGuard<'_, TxInner>> {
        self.inner
            .lock()
            .map_err(|_| TrustDbError::Unavailable("transaction lock poisoned".into()))
    }

    /// Run `op` against the engine and the workset, poisoning the
    /// transaction if it fails.
    fn run<T>(
        &self,
        ctx: &Context,
        op: impl FnOnce(&Engine, &mut Workset) -> TrustDbResult<T>,
    ) -> TrustDbResult<T> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        if inner.state != TxState::Open {
            return Err(TrustDbError::Closed("transaction"));
        }
        if self.pool.is_closed() {
            return Err(TrustDbError::Closed("database"));
        }
        let Some(conn) = inner.conn.as_ref() else {
            return Err(TrustDbError::Closed("transaction"));
        };

        let result = ctx.check().and_then(|()| op(conn.engine(), &mut inner.work));
        if let Err(e) = &result {
            if inner.work.poisoned.is_none() {
                debug!(tx = %self.id, error = %e, "transaction poisoned");
                inner.work.poisoned = Some(e.to_string());
            }
        }
        result
    }

    fn finish(&self, inner: &mut TxInner, state: TxState) {
        inner.state = state;
        inner.work.clear();
        inner.conn = None;
    }
}

#[async_trait]
impl TrustReader for DbTransaction {
    async fn query(&self, ctx: &Context, query: Query) -> TrustDbResult<Vec<Record>> {
        let serializable = self.options.isolation == Isolation::Serializable;
        self.run(ctx, |engine, work| {
            query.validate()?;
            if serializable {
                work.reads.insert(read_scope(&query));
            }

            let mut out = engine.query(&query)?;
            let committed: HashSet<RecordKey> = out.iter().map(Record::key).collect();
            out.extend(
                work.pending(&query)
                    .filter(|r| !committed.contains(&r.key()))
                    .cloned(),
            );
            out.sort_by_key(Record::key);

            if let Query::Max { .. } = query {
                out = out.pop().into_iter().collect();
            }
            Ok(out)
        })
    }
}

#[async_trait]
impl TrustWriter for DbTransaction {
    async fn write(&self, ctx: &Context, records: Vec<Record>) -> TrustDbResult<u64> {
        let read_only = self.options.read_only;
        self.run(ctx, |engine, work| {
            if read_only {
                return Err(TrustDbError::Validation(
                    "insert through a read-only transaction".into(),
                ));
            }
            for record in &records {
                record.validate()?;
            }

            let mut fresh: Vec<Record> = Vec::new();
            let mut batch: HashMap<RecordKey, usize> = HashMap::new();
            for record in records {
                let key = record.key();
                let earlier = work
                    .staged
                    .get(&key)
                    .map(|&i| &work.records[i])
                    .or_else(|| batch.get(&key).map(|&i| &fresh[i]));
                if let Some(earlier) = earlier {
                    if *earlier != record {
                        return Err(conflict(
                            earlier,
                            &record,
                            "transaction already holds a different version",
                        ));
                    }
                    continue;
                }
                match engine.probe(&record)? {
                    Probe::Vacant => {
                        batch.insert(key, fresh.len());
                        fresh.push(record);
                    }
                    Probe::Identical => {}
                    Probe::Conflict { existing } => {
                        return Err(conflict(
                            &existing,
                            &record,
                            "key already holds different content",
                        ));
                    }
                }
            }

            let written = fresh.len() as u64;
            for record in fresh {
                work.staged.insert(record.key(), work.records.len());
                work.records.push(record);
            }
            Ok(written)
        })
    }
}

#[async_trait]
impl Transaction for DbTransaction {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn commit(&self, ctx: &Context) -> TrustDbResult<()> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        if inner.state != TxState::Open {
            return Err(TrustDbError::Closed("transaction"));
        }

        let outcome = if self.pool.is_closed() {
            Err(TrustDbError::Closed("database"))
        } else if let Some(reason) = &inner.work.poisoned {
            Err(TrustDbError::Conflict {
                key: format!("transaction {}", self.id),
                reason: format!("an earlier operation failed: {reason}"),
            })
        } else {
            ctx.check().and_then(|()| {
                let conn = inner
                    .conn
                    .as_ref()
                    .ok_or(TrustDbError::Closed("transaction"))?;
                let reads = (self.options.isolation == Isolation::Serializable).then(|| ReadCheck {
                    start_seq: self.start_seq,
                    reads: &inner.work.reads,
                });
                conn.engine().apply(&inner.work.records, reads)
            })
        };

        match outcome {
            Ok(written) => {
                info!(tx = %self.id, written, "transaction committed");
                self.finish(inner, TxState::Committed);
                Ok(())
            }
            Err(e) => {
                debug!(tx = %self.id, error = %e, "commit failed; rolled back");
                self.finish(inner, TxState::RolledBack);
                Err(e)
            }
        }
    }

    fn rollback(&self) -> TrustDbResult<()> {
        let mut guard = self.lock()?;
        if guard.state != TxState::Open {
            return Err(TrustDbError::Closed("transaction"));
        }
        debug!(tx = %self.id, discarded = guard.work.records.len(), "transaction rolled back");
        self.finish(&mut guard, TxState::RolledBack);
        Ok(())
    }
}

impl Drop for DbTransaction {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.get_mut() {
            if inner.state == TxState::Open {
                debug!(
                    tx = %self.id,
                    discarded = inner.work.records.len(),
                    "open transaction dropped; rolled back"
                );
                inner.state = TxState::RolledBack;
                inner.work.clear();
                inner.conn = None;
            }
        }
    }
}
