//! Bounded pool of engine connections.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::engine::Engine;
use crate::error::{TrustDbError, TrustDbResult};

/// A handle to the backing engine. Every store operation runs on one.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    engine: Arc<Engine>,
}

impl Connection {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

/// Point-in-time pool counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub open: usize,
    pub in_use: usize,
    pub idle: usize,
    /// Zero means unlimited.
    pub max_open: usize,
    pub max_idle: usize,
    /// Cumulative number of acquisitions that had to wait.
    pub wait_count: u64,
}

#[derive(Debug)]
struct PoolState {
    open: usize,
    idle: Vec<Connection>,
    max_open: usize,
    max_idle: usize,
    closed: bool,
    wait_count: u64,
}

impl PoolState {
    fn over_open_limit(&self) -> bool {
        self.max_open != 0 && self.open > self.max_open
    }

    fn trim_idle(&mut self) {
        while !self.idle.is_empty() && (self.idle.len() > self.max_idle || self.over_open_limit()) {
            self.idle.pop();
            self.open -= 1;
        }
    }
}

fn open_limit(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

/// Pool of reusable connections with runtime-adjustable limits.
///
/// Waiters blocked on a full pool park on a [`Notify`] and retry whenever a
/// connection is released, a limit is raised, or the pool closes. Each wait
/// is raced against the caller's [`Context`].
#[derive(Debug)]
pub struct ConnectionPool {
    engine: Arc<Engine>,
    state: Mutex<PoolState>,
    available: Notify,
    next_id: AtomicU64,
}

impl ConnectionPool {
    pub fn new(engine: Engine, max_open_conns: i64, max_idle_conns: i64) -> Arc<Self> {
        let max_open = open_limit(max_open_conns);
        let mut max_idle = open_limit(max_idle_conns);
        if max_open != 0 {
            max_idle = max_idle.min(max_open);
        }
        Arc::new(Self {
            engine: Arc::new(engine),
            state: Mutex::new(PoolState {
                open: 0,
                idle: Vec::new(),
                max_open,
                max_idle,
                closed: false,
                wait_count: 0,
            }),
            available: Notify::new(),
            next_id: AtomicU64::new(1),
        })
    }

    fn lock(&self) -> TrustDbResult<MutexGuard<'_, PoolState>> {
        self.state
            .lock()
            .map_err(|_| TrustDbError::Unavailable("pool lock poisoned".into()))
    }

    /// Take an idle connection or open a new one, waiting while the pool is
    /// at its open limit.
    pub async fn acquire(self: &Arc<Self>, ctx: &Context) -> TrustDbResult<PooledConnection> {
        let mut counted = false;
        loop {
            ctx.check()?;

            // Register interest before inspecting state so a release between
            // the check and the wait is not missed.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock()?;
                if state.closed {
                    return Err(TrustDbError::Closed("database"));
                }
                if let Some(conn) = state.idle.pop() {
                    return Ok(PooledConnection::new(self, conn));
                }
                if state.max_open == 0 || state.open < state.max_open {
                    state.open += 1;
                    let conn = Connection {
                        id: self.next_id.fetch_add(1, Ordering::Relaxed),
                        engine: Arc::clone(&self.engine),
                    };
                    debug!(conn = conn.id, open = state.open, "connection opened");
                    return Ok(PooledConnection::new(self, conn));
                }
                if !counted {
                    state.wait_count += 1;
                    counted = true;
                }
            }

            ctx.run(notified).await?;
        }
    }

    /// Return `conn` to the pool. The counters stay correct even when the
    /// lock is poisoned, and waiters are always woken.
    fn release(&self, conn: Connection) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| {
            warn!(conn = conn.id, "pool lock poisoned; releasing anyway");
            poisoned.into_inner()
        });
        if state.closed || state.over_open_limit() || state.idle.len() >= state.max_idle {
            state.open -= 1;
            debug!(conn = conn.id, open = state.open, "connection closed");
        } else {
            state.idle.push(conn);
        }
        drop(state);
        self.available.notify_waiters();
    }

    /// Zero or negative means unlimited. Lowering the limit below the idle
    /// limit lowers that too.
    pub fn set_max_open_conns(&self, n: i64) -> TrustDbResult<()> {
        let mut state = self.lock()?;
        state.max_open = open_limit(n);
        if state.max_open != 0 && state.max_idle > state.max_open {
            state.max_idle = state.max_open;
        }
        state.trim_idle();
        drop(state);
        self.available.notify_waiters();
        Ok(())
    }

    /// Zero or negative retains no idle connections. Capped at the open
    /// limit.
    pub fn set_max_idle_conns(&self, n: i64) -> TrustDbResult<()> {
        let mut state = self.lock()?;
        let mut max_idle = open_limit(n);
        if state.max_open != 0 {
            max_idle = max_idle.min(state.max_open);
        }
        state.max_idle = max_idle;
        state.trim_idle();
        Ok(())
    }

    /// Drop every idle connection and refuse new acquisitions. Connections
    /// still in use are discarded when released. Idempotent.
    pub fn close(&self) -> TrustDbResult<()> {
        let mut state = self.lock()?;
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        let drained = state.idle.len();
        state.open -= drained;
        state.idle.clear();
        let in_use = state.open;
        drop(state);

        self.available.notify_waiters();
        info!(drained, in_use, "connection pool closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().map(|s| s.closed).unwrap_or(true)
    }

    pub fn stats(&self) -> TrustDbResult<PoolStats> {
        let state = self.lock()?;
        Ok(PoolStats {
            open: state.open,
            in_use: state.open - state.idle.len(),
            idle: state.idle.len(),
            max_open: state.max_open,
            max_idle: state.max_idle,
            wait_count: state.wait_count,
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

/// A checked-out connection; returns itself to the pool on drop.
#[derive(Debug)]
pub struct PooledConnection {
    pool: Arc<ConnectionPool>,
    conn: Option<Connection>,
}

impl PooledConnection {
    fn new(pool: &Arc<ConnectionPool>, conn: Connection) -> Self {
        Self {
            pool: Arc::clone(pool),
            conn: Some(conn),
        }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only taken in `drop`.
        self.conn.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
