use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::TrustDbConfig;
use crate::context::Context;
use crate::engine::Engine;
use crate::error::{TrustDbError, TrustDbResult};
use crate::pool::{ConnectionPool, PoolStats};
use crate::record::{Kind, Query, Record};
use crate::traits::{TrustDb, TrustReader, TrustWriter, TxOptions};
use crate::transaction::DbTransaction;

/// The trust material store.
///
/// Cheap to clone; clones share the pool and the engine. Single-record
/// operations each borrow a pooled connection for their duration, while a
/// transaction holds one until it finishes.
#[derive(Clone, Debug)]
pub struct Database {
    pool: Arc<ConnectionPool>,
    config: TrustDbConfig,
}

impl Database {
    /// Open a store. A configured `path` replays (or creates) the commit
    /// log there; without one the store lives in memory.
    pub fn open(config: TrustDbConfig) -> TrustDbResult<Self> {
        let engine = match &config.path {
            Some(path) => Engine::open(path, config.sync_mode)?,
            None => Engine::in_memory(),
        };
        info!(
            durable = engine.is_durable(),
            max_open_conns = config.max_open_conns,
            max_idle_conns = config.max_idle_conns,
            "trust database ready"
        );
        Ok(Self {
            pool: ConnectionPool::new(engine, config.max_open_conns, config.max_idle_conns),
            config,
        })
    }

    /// A store with no backing log.
    pub fn in_memory() -> Self {
        let config = TrustDbConfig::in_memory();
        Self {
            pool: ConnectionPool::new(
                Engine::in_memory(),
                config.max_open_conns,
                config.max_idle_conns,
            ),
            config,
        }
    }

    pub fn config(&self) -> &TrustDbConfig {
        &self.config
    }

    pub fn pool_stats(&self) -> TrustDbResult<PoolStats> {
        self.pool.stats()
    }

    /// Number of stored records per kind.
    pub async fn record_counts(&self, ctx: &Context) -> TrustDbResult<Vec<(Kind, usize)>> {
        let conn = self.pool.acquire(ctx).await?;
        ctx.check()?;
        conn.engine().counts()
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    fn ensure_open(&self) -> TrustDbResult<()> {
        if self.pool.is_closed() {
            return Err(TrustDbError::Closed("database"));
        }
        Ok(())
    }
}

#[async_trait]
impl TrustReader for Database {
    async fn query(&self, ctx: &Context, query: Query) -> TrustDbResult<Vec<Record>> {
        self.ensure_open()?;
        query.validate()?;
        let conn = self.pool.acquire(ctx).await?;
        ctx.check()?;
        conn.engine().query(&query)
    }
}

#[async_trait]
impl TrustWriter for Database {
    async fn write(&self, ctx: &Context, records: Vec<Record>) -> TrustDbResult<u64> {
        self.ensure_open()?;
        for record in &records {
            record.validate()?;
        }
        let conn = self.pool.acquire(ctx).await?;
        ctx.check()?;
        conn.engine().apply(&records, None)
    }
}

#[async_trait]
impl TrustDb for Database {
    type Tx = DbTransaction;

    async fn begin_transaction(
        &self,
        ctx: &Context,
        options: TxOptions,
    ) -> TrustDbResult<DbTransaction> {
        let conn = self.pool.acquire(ctx).await?;
        DbTransaction::new(conn, Arc::clone(&self.pool), options)
    }

    fn set_max_idle_conns(&self, n: i64) -> TrustDbResult<()> {
        self.pool.set_max_idle_conns(n)
    }

    fn set_max_open_conns(&self, n: i64) -> TrustDbResult<()> {
        self.pool.set_max_open_conns(n)
    }

    async fn close(&self) -> TrustDbResult<()> {
        self.pool.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrustDbError;
    use crate::testutil::{chain, ia, issuer_cert, trc};
    use crate::traits::Transaction;
    use std::time::Duration;
    use trustdb_types::Isd;

    fn ctx() -> Context {
        Context::background()
    }

    // ---- single-record operations ----

    #[tokio::test]
    async fn trc_insert_then_get() {
        let db = Database::in_memory();
        let t = trc(1, 1, "base");
        assert_eq!(db.insert_trc(&ctx(), &t).await.unwrap(), 1);
        assert_eq!(db.get_trc_version(&ctx(), Isd(1), 1).await.unwrap(), t);
        assert_eq!(db.get_trc_max_version(&ctx(), Isd(1)).await.unwrap(), t);
    }

    #[tokio::test]
    async fn identical_reinsert_writes_nothing() {
        let db = Database::in_memory();
        let t = trc(1, 1, "base");
        db.insert_trc(&ctx(), &t).await.unwrap();
        assert_eq!(db.insert_trc(&ctx(), &t).await.unwrap(), 0);
        assert_eq!(db.get_all_trcs(&ctx()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn conflicting_insert_changes_nothing() {
        let db = Database::in_memory();
        db.insert_trc(&ctx(), &trc(1, 1, "first")).await.unwrap();

        let err = db.insert_trc(&ctx(), &trc(1, 1, "second")).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(
            db.get_trc_version(&ctx(), Isd(1), 1).await.unwrap().description,
            "first"
        );
    }

    #[tokio::test]
    async fn max_version_is_numeric_maximum() {
        let db = Database::in_memory();
        for v in [2, 5, 1] {
            db.insert_trc(&ctx(), &trc(1, v, "t")).await.unwrap();
        }
        assert_eq!(db.get_trc_max_version(&ctx(), Isd(1)).await.unwrap().version, 5);
        assert_eq!(db.get_trc_version(&ctx(), Isd(1), 2).await.unwrap().version, 2);

        let err = db.get_trc_max_version(&ctx(), Isd(2)).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(db.get_trc_version(&ctx(), Isd(1), 3).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn get_all_is_ordered_by_scope_then_version() {
        let db = Database::in_memory();
        for (isd, v) in [(2, 1), (1, 2), (1, 1)] {
            db.insert_trc(&ctx(), &trc(isd, v, "t")).await.unwrap();
        }
        let order: Vec<_> = db
            .get_all_trcs(&ctx())
            .await
            .unwrap()
            .into_iter()
            .map(|t| (t.isd.0, t.version))
            .collect();
        assert_eq!(order, vec![(1, 1), (1, 2), (2, 1)]);
        assert!(db.get_all_chains(&ctx()).await.unwrap().is_empty());
    }

    // ---- chains and certificates ----

    #[tokio::test]
    async fn chain_insert_stores_both_certificates() {
        let db = Database::in_memory();
        let c = chain("1-ff00:0:111", 3);
        assert_eq!(db.insert_chain(&ctx(), &c).await.unwrap(), 3);

        let leaf_ia = ia("1-ff00:0:111");
        assert_eq!(db.get_chain_version(&ctx(), leaf_ia, 3).await.unwrap(), c);
        assert_eq!(db.get_chain_max_version(&ctx(), leaf_ia).await.unwrap(), c);
        assert_eq!(db.get_leaf_cert_version(&ctx(), leaf_ia, 3).await.unwrap(), c.leaf);
        assert_eq!(
            db.get_iss_cert_max_version(&ctx(), ia("1-ff00:0:110")).await.unwrap(),
            c.issuer
        );

        // The shared issuer already exists identically.
        let next = chain("1-ff00:0:111", 4);
        assert_eq!(db.insert_chain(&ctx(), &next).await.unwrap(), 2);
        assert_eq!(db.get_all_leaf_certs(&ctx()).await.unwrap().len(), 2);
        assert_eq!(db.get_all_iss_certs(&ctx()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn chain_with_conflicting_issuer_writes_nothing() {
        let db = Database::in_memory();
        let mut other = issuer_cert(ia("1-ff00:0:110"), 1);
        other.signature = vec![0xAA; 64];
        db.insert_iss_cert(&ctx(), &other).await.unwrap();

        let err = db
            .insert_chain(&ctx(), &chain("1-ff00:0:111", 1))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(db.get_all_chains(&ctx()).await.unwrap().is_empty());
        assert!(db.get_all_leaf_certs(&ctx()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_chain_is_rejected() {
        let db = Database::in_memory();
        let mut c = chain("1-ff00:0:111", 1);
        c.leaf.issuer_version = 7;
        let err = db.insert_chain(&ctx(), &c).await.unwrap_err();
        assert!(matches!(err, TrustDbError::Validation(_)));
    }

    // ---- customer keys ----

    #[tokio::test]
    async fn cust_key_latest_and_explicit_version() {
        let db = Database::in_memory();
        let a = ia("1-ff00:0:111");
        db.insert_cust_key(&ctx(), a, 1, &[1; 32], 1).await.unwrap();
        db.insert_cust_key(&ctx(), a, 2, &[2; 32], 3).await.unwrap();

        assert_eq!(db.get_cust_key(&ctx(), a).await.unwrap(), (vec![2; 32], 3));
        let v1 = db.get_cust_key_version(&ctx(), a, 1).await.unwrap();
        assert_eq!((v1.key, v1.trc_version), (vec![1; 32], 1));

        db.insert_cust_key(&ctx(), a, 1, &[1; 32], 1).await.unwrap();
        let err = db.insert_cust_key(&ctx(), a, 1, &[9; 32], 1).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(db.get_all_cust_keys(&ctx()).await.unwrap().len(), 2);

        assert!(db
            .get_cust_key(&ctx(), ia("1-ff00:0:112"))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn malformed_input_is_a_validation_error() {
        let db = Database::in_memory();
        let a = ia("1-ff00:0:111");

        let cases = [
            db.insert_trc(&ctx(), &trc(0, 1, "wildcard")).await,
            db.insert_trc(&ctx(), &trc(1, 0, "zero")).await,
            db.insert_cust_key(&ctx(), a, 1, &[], 1).await.map(|_| 0),
            db.insert_cust_key(&ctx(), a, 1, &[1], 0).await.map(|_| 0),
            db.insert_cust_key(&ctx(), ia("0-0"), 1, &[1], 1).await.map(|_| 0),
        ];
        for result in cases {
            assert!(matches!(result, Err(TrustDbError::Validation(_))), "{result:?}");
        }

        let err = db.get_trc_version(&ctx(), Isd(1), 0).await.unwrap_err();
        assert!(matches!(err, TrustDbError::Validation(_)));
        let err = db.get_chain_max_version(&ctx(), ia("0-0")).await.unwrap_err();
        assert!(matches!(err, TrustDbError::Validation(_)));
    }

    // ---- contexts ----

    #[tokio::test]
    async fn cancelled_context_aborts_without_writing() {
        let db = Database::in_memory();
        let (cancelled, handle) = ctx().with_cancel();
        handle.cancel();

        let err = db.insert_trc(&cancelled, &trc(1, 1, "t")).await.unwrap_err();
        assert_eq!(err, TrustDbError::Cancelled);
        assert!(db.get_all_trcs(&ctx()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn saturated_pool_times_out() {
        let db = Database::in_memory();
        db.set_max_open_conns(1).unwrap();
        let _tx = db.begin_transaction(&ctx(), TxOptions::default()).await.unwrap();

        let short = Context::with_timeout(Duration::from_millis(50));
        let err = db.get_all_trcs(&short).await.unwrap_err();
        assert_eq!(err, TrustDbError::Timeout);
        assert_eq!(db.pool_stats().unwrap().wait_count, 1);
    }

    // ---- concurrency ----

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn exactly_one_conflicting_writer_wins() {
        let db = Database::in_memory();
        let mut tasks = Vec::new();
        for i in 0..8 {
            let db = db.clone();
            tasks.push(tokio::spawn(async move {
                db.insert_trc(&Context::background(), &trc(1, 1, &format!("writer {i}")))
                    .await
            }));
        }

        let mut won = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(1) => won += 1,
                Err(e) => assert!(e.is_conflict(), "{e}"),
                Ok(n) => panic!("unexpected count {n}"),
            }
        }
        assert_eq!(won, 1);
    }

    // ---- lifecycle ----

    #[tokio::test]
    async fn close_refuses_everything_afterwards() {
        let db = Database::in_memory();
        db.insert_trc(&ctx(), &trc(1, 1, "t")).await.unwrap();
        let tx = db.begin_transaction(&ctx(), TxOptions::default()).await.unwrap();

        db.close().await.unwrap();
        db.close().await.unwrap();
        assert!(db.is_closed());

        let closed = TrustDbError::Closed("database");
        assert_eq!(db.insert_trc(&ctx(), &trc(1, 2, "t")).await.unwrap_err(), closed);
        assert_eq!(db.get_trc_max_version(&ctx(), Isd(1)).await.unwrap_err(), closed);
        // Closed wins over malformed arguments.
        assert_eq!(db.insert_trc(&ctx(), &trc(1, 0, "t")).await.unwrap_err(), closed);
        assert_eq!(db.get_trc_version(&ctx(), Isd(1), 0).await.unwrap_err(), closed);
        assert_eq!(
            db.begin_transaction(&ctx(), TxOptions::default()).await.unwrap_err(),
            closed
        );

        assert_eq!(tx.insert_trc(&ctx(), &trc(1, 2, "t")).await.unwrap_err(), closed);
        assert_eq!(tx.commit(&ctx()).await.unwrap_err(), closed);
        assert_eq!(tx.rollback().unwrap_err(), TrustDbError::Closed("transaction"));
    }

    #[tokio::test]
    async fn durable_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrustDbConfig::at(dir.path().join("trust.log"));

        {
            let db = Database::open(config.clone()).unwrap();
            db.insert_trc(&ctx(), &trc(1, 1, "t")).await.unwrap();
            db.insert_chain(&ctx(), &chain("1-ff00:0:111", 1)).await.unwrap();
            db.insert_cust_key(&ctx(), ia("1-ff00:0:111"), 1, &[5; 32], 1)
                .await
                .unwrap();
            db.close().await.unwrap();
        }

        let db = Database::open(config).unwrap();
        assert_eq!(db.get_trc_max_version(&ctx(), Isd(1)).await.unwrap().description, "t");
        assert_eq!(
            db.get_chain_max_version(&ctx(), ia("1-ff00:0:111")).await.unwrap(),
            chain("1-ff00:0:111", 1)
        );
        assert_eq!(
            db.get_cust_key(&ctx(), ia("1-ff00:0:111")).await.unwrap(),
            (vec![5; 32], 1)
        );
        let counts = db.record_counts(&ctx()).await.unwrap();
        assert!(counts.contains(&(Kind::IssCert, 1)));
        assert!(db.insert_trc(&ctx(), &trc(1, 1, "changed")).await.unwrap_err().is_conflict());
    }
}
