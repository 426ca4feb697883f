use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::digest::{canonical_bytes, Digest};
use crate::error::TypeError;
use crate::ia::{Isd, IA};

/// Keys a core AS contributes to a TRC.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreAs {
    #[serde(with = "crate::bytes")]
    pub online_key: Vec<u8>,
    #[serde(with = "crate::bytes")]
    pub offline_key: Vec<u8>,
}

/// Trust Root Configuration: the signed root-of-trust bundle of one ISD.
///
/// TRCs of an ISD form a total order by `version`; the greatest stored
/// version is the latest trusted root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trc {
    pub isd: Isd,
    pub version: u64,
    #[serde(default)]
    pub description: String,
    /// Unix seconds.
    pub issuing_time: u64,
    /// Unix seconds.
    pub expiration_time: u64,
    #[serde(default)]
    pub grace_period: u64,
    pub quorum_trcs: u32,
    pub core_ases: BTreeMap<IA, CoreAs>,
    #[serde(with = "crate::bytes::map")]
    pub signatures: BTreeMap<IA, Vec<u8>>,
}

impl Trc {
    /// Structural checks only; signatures are not verified here.
    pub fn validate(&self) -> Result<(), TypeError> {
        if self.isd.is_wildcard() {
            return Err(TypeError::Wildcard {
                field: "trc.isd",
                value: self.isd.to_string(),
            });
        }
        if self.version == 0 {
            return Err(TypeError::ZeroVersion {
                field: "trc.version",
            });
        }
        if self.core_ases.is_empty() {
            return Err(TypeError::EmptyField("trc.core_ases"));
        }
        if self.signatures.is_empty() || self.signatures.values().any(Vec::is_empty) {
            return Err(TypeError::EmptyField("trc.signatures"));
        }
        Ok(())
    }

    pub fn digest(&self) -> Result<Digest, TypeError> {
        Ok(Digest::compute("trc", &canonical_bytes(self)?))
    }
}
