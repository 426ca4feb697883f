use async_trait::async_trait;
use trustdb_types::{Certificate, Chain, CustKey, Isd, Trc, IA};
use uuid::Uuid;

use crate::context::Context;
use crate::error::{TrustDbError, TrustDbResult};
use crate::record::{Kind, Query, Record, Scope};

/// Read access to trust material.
///
/// Implementors provide [`TrustReader::query`]; the typed getters are
/// derived from it. Exact-version and max-version getters return
/// [`TrustDbError::NotFound`] when nothing matches; the `get_all_*`
/// getters return an empty list instead, ordered by (scope, version).
#[async_trait]
pub trait TrustReader: Send + Sync {
    async fn query(&self, ctx: &Context, query: Query) -> TrustDbResult<Vec<Record>>;

    /// Run a single-record query, mapping an empty result to `NotFound`.
    async fn query_one(&self, ctx: &Context, query: Query) -> TrustDbResult<Record> {
        self.query(ctx, query)
            .await?
            .pop()
            .ok_or_else(|| TrustDbError::NotFound(query.to_string()))
    }

    async fn get_trc_version(&self, ctx: &Context, isd: Isd, version: u64) -> TrustDbResult<Trc> {
        self.query_one(ctx, Query::Version {
            kind: Kind::Trc,
            scope: Scope::Isd(isd),
            version,
        })
        .await?
        .into_trc()
    }

    async fn get_trc_max_version(&self, ctx: &Context, isd: Isd) -> TrustDbResult<Trc> {
        self.query_one(ctx, Query::Max {
            kind: Kind::Trc,
            scope: Scope::Isd(isd),
        })
        .await?
        .into_trc()
    }

    async fn get_chain_version(&self, ctx: &Context, ia: IA, version: u64) -> TrustDbResult<Chain> {
        self.query_one(ctx, Query::Version {
            kind: Kind::Chain,
            scope: Scope::Ia(ia),
            version,
        })
        .await?
        .into_chain()
    }

    async fn get_chain_max_version(&self, ctx: &Context, ia: IA) -> TrustDbResult<Chain> {
        self.query_one(ctx, Query::Max {
            kind: Kind::Chain,
            scope: Scope::Ia(ia),
        })
        .await?
        .into_chain()
    }

    async fn get_iss_cert_version(
        &self,
        ctx: &Context,
        ia: IA,
        version: u64,
    ) -> TrustDbResult<Certificate> {
        self.query_one(ctx, Query::Version {
            kind: Kind::IssCert,
            scope: Scope::Ia(ia),
            version,
        })
        .await?
        .into_certificate()
    }

    async fn get_iss_cert_max_version(&self, ctx: &Context, ia: IA) -> TrustDbResult<Certificate> {
        self.query_one(ctx, Query::Max {
            kind: Kind::IssCert,
            scope: Scope::Ia(ia),
        })
        .await?
        .into_certificate()
    }

    async fn get_leaf_cert_version(
        &self,
        ctx: &Context,
        ia: IA,
        version: u64,
    ) -> TrustDbResult<Certificate> {
        self.query_one(ctx, Query::Version {
            kind: Kind::LeafCert,
            scope: Scope::Ia(ia),
            version,
        })
        .await?
        .into_certificate()
    }

    async fn get_leaf_cert_max_version(&self, ctx: &Context, ia: IA) -> TrustDbResult<Certificate> {
        self.query_one(ctx, Query::Max {
            kind: Kind::LeafCert,
            scope: Scope::Ia(ia),
        })
        .await?
        .into_certificate()
    }

    /// Raw key and issuing TRC version of the latest key version for `ia`.
    async fn get_cust_key(&self, ctx: &Context, ia: IA) -> TrustDbResult<(Vec<u8>, u64)> {
        let key = self
            .query_one(ctx, Query::Max {
                kind: Kind::CustKey,
                scope: Scope::Ia(ia),
            })
            .await?
            .into_cust_key()?;
        Ok((key.key, key.trc_version))
    }

    async fn get_cust_key_version(
        &self,
        ctx: &Context,
        ia: IA,
        version: u64,
    ) -> TrustDbResult<CustKey> {
        self.query_one(ctx, Query::Version {
            kind: Kind::CustKey,
            scope: Scope::Ia(ia),
            version,
        })
        .await?
        .into_cust_key()
    }

    async fn get_all_trcs(&self, ctx: &Context) -> TrustDbResult<Vec<Trc>> {
        self.query(ctx, Query::All(Kind::Trc))
            .await?
            .into_iter()
            .map(Record::into_trc)
            .collect()
    }

    async fn get_all_chains(&self, ctx: &Context) -> TrustDbResult<Vec<Chain>> {
        self.query(ctx, Query::All(Kind::Chain))
            .await?
            .into_iter()
            .map(Record::into_chain)
            .collect()
    }

    async fn get_all_iss_certs(&self, ctx: &Context) -> TrustDbResult<Vec<Certificate>> {
        self.query(ctx, Query::All(Kind::IssCert))
            .await?
            .into_iter()
            .map(Record::into_certificate)
            .collect()
    }

    async fn get_all_leaf_certs(&self, ctx: &Context) -> TrustDbResult<Vec<Certificate>> {
        self.query(ctx, Query::All(Kind::LeafCert))
            .await?
            .into_iter()
            .map(Record::into_certificate)
            .collect()
    }

    async fn get_all_cust_keys(&self, ctx: &Context) -> TrustDbResult<Vec<CustKey>> {
        self.query(ctx, Query::All(Kind::CustKey))
            .await?
            .into_iter()
            .map(Record::into_cust_key)
            .collect()
    }
}

/// Write access to trust material.
///
/// Implementors provide [`TrustWriter::write`], which stores a batch
/// atomically and returns how many records were newly written. Re-inserting
/// identical content counts zero; different content at an occupied key is a
/// [`TrustDbError::Conflict`] and writes nothing.
#[async_trait]
pub trait TrustWriter: Send + Sync {
    async fn write(&self, ctx: &Context, records: Vec<Record>) -> TrustDbResult<u64>;

    async fn insert_trc(&self, ctx: &Context, trc: &Trc) -> TrustDbResult<u64> {
        self.write(ctx, vec![Record::Trc(trc.clone())]).await
    }

    /// Stores the chain together with its issuer and leaf certificates.
    async fn insert_chain(&self, ctx: &Context, chain: &Chain) -> TrustDbResult<u64> {
        self.write(ctx, Record::chain_with_certs(chain)).await
    }

    async fn insert_iss_cert(&self, ctx: &Context, cert: &Certificate) -> TrustDbResult<u64> {
        self.write(ctx, vec![Record::IssCert(cert.clone())]).await
    }

    async fn insert_leaf_cert(&self, ctx: &Context, cert: &Certificate) -> TrustDbResult<u64> {
        self.write(ctx, vec![Record::LeafCert(cert.clone())]).await
    }

    async fn insert_cust_key(
        &self,
        ctx: &Context,
        ia: IA,
        key_version: u64,
        key: &[u8],
        trc_version: u64,
    ) -> TrustDbResult<()> {
        let key = CustKey::new(ia, key_version, key.to_vec(), trc_version);
        self.write(ctx, vec![Record::CustKey(key)]).await.map(|_| ())
    }
}

/// Transaction isolation level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Isolation {
    /// Read committed: only the write set is validated at commit.
    #[default]
    Default,
    /// Reads are validated at commit as well; a scope modified by another
    /// commit since the transaction began fails the commit.
    Serializable,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TxOptions {
    pub isolation: Isolation,
    pub read_only: bool,
}

impl TxOptions {
    pub fn serializable() -> Self {
        Self {
            isolation: Isolation::Serializable,
            ..Default::default()
        }
    }

    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }
}

/// A scoped unit of work over one pooled connection.
///
/// Reads see committed state plus the transaction's own pending writes.
/// Once committed or rolled back every operation fails with
/// [`TrustDbError::Closed`]. Dropping an open transaction rolls it back.
#[async_trait]
pub trait Transaction: TrustReader + TrustWriter {
    fn id(&self) -> Uuid;

    /// Apply every pending write atomically.
    async fn commit(&self, ctx: &Context) -> TrustDbResult<()>;

    /// Discard every pending write.
    fn rollback(&self) -> TrustDbResult<()>;
}

/// A trust material store.
#[async_trait]
pub trait TrustDb: TrustReader + TrustWriter {
    type Tx: Transaction;

    async fn begin_transaction(&self, ctx: &Context, options: TxOptions) -> TrustDbResult<Self::Tx>;

    fn set_max_idle_conns(&self, n: i64) -> TrustDbResult<()>;

    fn set_max_open_conns(&self, n: i64) -> TrustDbResult<()>;

    /// Release every connection. Idempotent; afterwards every operation on
    /// the store or its transactions fails with [`TrustDbError::Closed`].
    async fn close(&self) -> TrustDbResult<()>;
}
