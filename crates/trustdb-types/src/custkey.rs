use serde::{Deserialize, Serialize};

use crate::digest::{canonical_bytes, Digest};
use crate::error::TypeError;
use crate::ia::IA;

/// A customer AS signing key together with the TRC version it was issued
/// under.
///
/// `version` tracks key rotation; `trc_version` records the trust epoch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustKey {
    pub ia: IA,
    pub version: u64,
    #[serde(with = "crate::bytes")]
    pub key: Vec<u8>,
    pub trc_version: u64,
}

impl CustKey {
    pub fn new(ia: IA, version: u64, key: Vec<u8>, trc_version: u64) -> Self {
        Self {
            ia,
            version,
            key,
            trc_version,
        }
    }

    pub fn validate(&self) -> Result<(), TypeError> {
        self.ia.require_concrete("cust_key.ia")?;
        if self.version == 0 {
            return Err(TypeError::ZeroVersion {
                field: "cust_key.version",
            });
        }
        if self.trc_version == 0 {
            return Err(TypeError::ZeroVersion {
                field: "cust_key.trc_version",
            });
        }
        if self.key.is_empty() {
            return Err(TypeError::EmptyField("cust_key.key"));
        }
        Ok(())
    }

    pub fn digest(&self) -> Result<Digest, TypeError> {
        Ok(Digest::compute("cust_key", &canonical_bytes(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_requires_both_versions() {
        let ia: IA = "1-ff00:0:111".parse().unwrap();
        CustKey::new(ia, 1, vec![7; 32], 1).validate().unwrap();
        assert!(CustKey::new(ia, 0, vec![7; 32], 1).validate().is_err());
        assert!(CustKey::new(ia, 1, vec![7; 32], 0).validate().is_err());
        assert_eq!(
            CustKey::new(ia, 1, vec![], 1).validate(),
            Err(TypeError::EmptyField("cust_key.key"))
        );
    }
}
