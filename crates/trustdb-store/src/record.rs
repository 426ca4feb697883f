//! Uniform record and query shapes shared by every trust-object kind.

use std::fmt;

use serde::{Deserialize, Serialize};
use trustdb_types::{Certificate, Chain, CustKey, Digest, Isd, Trc, TypeError, IA};

use crate::error::{TrustDbError, TrustDbResult};

/// The five trust-object collections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    Trc,
    Chain,
    IssCert,
    LeafCert,
    CustKey,
}

impl Kind {
    pub const ALL: [Kind; 5] = [
        Kind::Trc,
        Kind::Chain,
        Kind::IssCert,
        Kind::LeafCert,
        Kind::CustKey,
    ];
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Trc => "trc",
            Kind::Chain => "chain",
            Kind::IssCert => "issuer certificate",
            Kind::LeafCert => "leaf certificate",
            Kind::CustKey => "customer key",
        };
        f.write_str(name)
    }
}

/// Scope key of a record: TRCs are scoped by ISD, everything else by IA.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    Isd(Isd),
    Ia(IA),
}

impl Scope {
    fn is_wildcard(&self) -> bool {
        match self {
            Scope::Isd(isd) => isd.is_wildcard(),
            Scope::Ia(ia) => ia.is_wildcard(),
        }
    }

    fn fits(&self, kind: Kind) -> bool {
        matches!(
            (kind, self),
            (Kind::Trc, Scope::Isd(_))
                | (
                    Kind::Chain | Kind::IssCert | Kind::LeafCert | Kind::CustKey,
                    Scope::Ia(_)
                )
        )
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Isd(isd) => write!(f, "isd {isd}"),
            Scope::Ia(ia) => write!(f, "{ia}"),
        }
    }
}

/// The uniqueness key: at most one record exists per `RecordKey`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub kind: Kind,
    pub scope: Scope,
    pub version: u64,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} v{}", self.kind, self.scope, self.version)
    }
}

/// One stored trust object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    Trc(Trc),
    Chain(Chain),
    IssCert(Certificate),
    LeafCert(Certificate),
    CustKey(CustKey),
}

impl Record {
    /// Records written by a chain insert: both certificates, then the chain.
    pub fn chain_with_certs(chain: &Chain) -> Vec<Record> {
        vec![
            Record::IssCert(chain.issuer.clone()),
            Record::LeafCert(chain.leaf.clone()),
            Record::Chain(chain.clone()),
        ]
    }

    pub fn kind(&self) -> Kind {
        match self {
            Record::Trc(_) => Kind::Trc,
            Record::Chain(_) => Kind::Chain,
            Record::IssCert(_) => Kind::IssCert,
            Record::LeafCert(_) => Kind::LeafCert,
            Record::CustKey(_) => Kind::CustKey,
        }
    }

    pub fn key(&self) -> RecordKey {
        let (scope, version) = match self {
            Record::Trc(t) => (Scope::Isd(t.isd), t.version),
            Record::Chain(c) => (Scope::Ia(c.ia()), c.version()),
            Record::IssCert(c) | Record::LeafCert(c) => (Scope::Ia(c.subject), c.version),
            Record::CustKey(k) => (Scope::Ia(k.ia), k.version),
        };
        RecordKey {
            kind: self.kind(),
            scope,
            version,
        }
    }

    pub fn validate(&self) -> Result<(), TypeError> {
        match self {
            Record::Trc(t) => t.validate(),
            Record::Chain(c) => c.validate(),
            Record::IssCert(c) => c.validate_issuer(),
            Record::LeafCert(c) => c.validate(),
            Record::CustKey(k) => k.validate(),
        }
    }

    pub fn digest(&self) -> Result<Digest, TypeError> {
        match self {
            Record::Trc(t) => t.digest(),
            Record::Chain(c) => c.digest(),
            Record::IssCert(c) | Record::LeafCert(c) => c.digest(),
            Record::CustKey(k) => k.digest(),
        }
    }

    pub fn into_trc(self) -> TrustDbResult<Trc> {
        match self {
            Record::Trc(t) => Ok(t),
            other => Err(unexpected(Kind::Trc, &other)),
        }
    }

    pub fn into_chain(self) -> TrustDbResult<Chain> {
        match self {
            Record::Chain(c) => Ok(c),
            other => Err(unexpected(Kind::Chain, &other)),
        }
    }

    pub fn into_certificate(self) -> TrustDbResult<Certificate> {
        match self {
            Record::IssCert(c) | Record::LeafCert(c) => Ok(c),
            other => Err(unexpected(Kind::LeafCert, &other)),
        }
    }

    pub fn into_cust_key(self) -> TrustDbResult<CustKey> {
        match self {
            Record::CustKey(k) => Ok(k),
            other => Err(unexpected(Kind::CustKey, &other)),
        }
    }
}

fn unexpected(wanted: Kind, got: &Record) -> TrustDbError {
    TrustDbError::Unavailable(format!(
        "engine returned a {} record where a {wanted} was expected",
        got.kind()
    ))
}

/// Build the conflict error for `offered` colliding with `existing`.
pub(crate) fn conflict(existing: &Record, offered: &Record, reason: &str) -> TrustDbError {
    let short = |r: &Record| {
        r.digest()
            .map(|d| d.short_hex())
            .unwrap_or_else(|_| "?".into())
    };
    TrustDbError::Conflict {
        key: offered.key().to_string(),
        reason: format!(
            "{reason} (stored {}, offered {})",
            short(existing),
            short(offered)
        ),
    }
}

/// A read against one collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Query {
    /// The record at exactly this version.
    Version { kind: Kind, scope: Scope, version: u64 },
    /// The record with the greatest version for the scope.
    Max { kind: Kind, scope: Scope },
    /// Every record of the kind, ordered by (scope, version).
    All(Kind),
}

impl Query {
    pub fn kind(&self) -> Kind {
        match *self {
            Query::Version { kind, .. } | Query::Max { kind, .. } | Query::All(kind) => kind,
        }
    }

    pub fn validate(&self) -> TrustDbResult<()> {
        let (kind, scope) = match *self {
            Query::All(_) => return Ok(()),
            Query::Version { version: 0, .. } => {
                return Err(TrustDbError::Validation(format!(
                    "{self}: version must be at least 1"
                )))
            }
            Query::Version { kind, scope, .. } | Query::Max { kind, scope } => (kind, scope),
        };
        if !scope.fits(kind) {
            return Err(TrustDbError::Validation(format!(
                "{self}: {kind} records are not scoped by {scope}"
            )));
        }
        if scope.is_wildcard() {
            return Err(TrustDbError::Validation(format!(
                "{self}: wildcard scope key"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Version {
                kind,
                scope,
                version,
            } => write!(f, "{kind} {scope} v{version}"),
            Query::Max { kind, scope } => write!(f, "{kind} {scope} (max version)"),
            Query::All(kind) => write!(f, "all {kind} records"),
        }
    }
}
