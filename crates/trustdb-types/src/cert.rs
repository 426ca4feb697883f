use serde::{Deserialize, Serialize};

use crate::digest::{canonical_bytes, Digest};
use crate::error::TypeError;
use crate::ia::IA;

/// An AS certificate, either an issuer certificate (`can_issue`) or a leaf.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub subject: IA,
    pub version: u64,
    pub issuer: IA,
    /// Version of the issuing certificate (or TRC, for issuer certificates).
    pub issuer_version: u64,
    pub can_issue: bool,
    /// Unix seconds.
    pub issuing_time: u64,
    /// Unix seconds.
    pub expiration_time: u64,
    #[serde(with = "crate::bytes")]
    pub subject_sign_key: Vec<u8>,
    #[serde(with = "crate::bytes", default)]
    pub subject_enc_key: Vec<u8>,
    #[serde(with = "crate::bytes")]
    pub signature: Vec<u8>,
}

impl Certificate {
    pub fn validate(&self) -> Result<(), TypeError> {
        self.subject.require_concrete("certificate.subject")?;
        self.issuer.require_concrete("certificate.issuer")?;
        if self.version == 0 {
            return Err(TypeError::ZeroVersion {
                field: "certificate.version",
            });
        }
        if self.issuer_version == 0 {
            return Err(TypeError::ZeroVersion {
                field: "certificate.issuer_version",
            });
        }
        if self.subject_sign_key.is_empty() {
            return Err(TypeError::EmptyField("certificate.subject_sign_key"));
        }
        if self.signature.is_empty() {
            return Err(TypeError::EmptyField("certificate.signature"));
        }
        Ok(())
    }

    /// Validation for certificates stored in the issuer collection.
    pub fn validate_issuer(&self) -> Result<(), TypeError> {
        self.validate()?;
        if !self.can_issue {
            return Err(TypeError::MalformedChain(format!(
                "issuer certificate {} v{} cannot issue",
                self.subject, self.version
            )));
        }
        Ok(())
    }

    pub fn digest(&self) -> Result<Digest, TypeError> {
        Ok(Digest::compute("certificate", &canonical_bytes(self)?))
    }
}

/// Certificate chain: a leaf certificate bundled with the issuer certificate
/// that signed it. Keyed by the leaf's subject and version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    pub leaf: Certificate,
    pub issuer: Certificate,
}

impl Chain {
    pub fn new(leaf: Certificate, issuer: Certificate) -> Self {
        Self { leaf, issuer }
    }

    pub fn ia(&self) -> IA {
        self.leaf.subject
    }

    pub fn version(&self) -> u64 {
        self.leaf.version
    }

    /// Both certificates must be well formed and the leaf must name the
    /// bundled issuer certificate exactly.
    pub fn validate(&self) -> Result<(), TypeError> {
        self.leaf.validate()?;
        self.issuer.validate_issuer()?;
        if self.leaf.issuer != self.issuer.subject
            || self.leaf.issuer_version != self.issuer.version
        {
            return Err(TypeError::MalformedChain(format!(
                "leaf names issuer {} v{}, bundled issuer is {} v{}",
                self.leaf.issuer,
                self.leaf.issuer_version,
                self.issuer.subject,
                self.issuer.version
            )));
        }
        Ok(())
    }

    pub fn digest(&self) -> Result<Digest, TypeError> {
        Ok(Digest::compute("chain", &canonical_bytes(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> Certificate {
        let core: IA = "1-ff00:0:110".parse().unwrap();
        Certificate {
            subject: core,
            version: 1,
            issuer: core,
            issuer_version: 1,
            can_issue: true,
            issuing_time: 10,
            expiration_time: 20,
            subject_sign_key: vec![1; 32],
            subject_enc_key: vec![],
            signature: vec![2; 64],
        }
    }

    fn leaf() -> Certificate {
        Certificate {
            subject: "1-ff00:0:111".parse().unwrap(),
            version: 3,
            issuer: "1-ff00:0:110".parse().unwrap(),
            issuer_version: 1,
            can_issue: false,
            issuing_time: 10,
            expiration_time: 20,
            subject_sign_key: vec![3; 32],
            subject_enc_key: vec![4; 32],
            signature: vec![5; 64],
        }
    }

    #[test]
    fn chain_is_keyed_by_leaf() {
        let chain = Chain::new(leaf(), issuer());
        chain.validate().unwrap();
        assert_eq!(chain.ia().to_string(), "1-ff00:0:111");
        assert_eq!(chain.version(), 3);
    }

    #[test]
    fn chain_with_mismatched_issuer_version_rejected() {
        let mut l = leaf();
        l.issuer_version = 2;
        let err = Chain::new(l, issuer()).validate().unwrap_err();
        assert!(matches!(err, TypeError::MalformedChain(_)));
    }

    #[test]
    fn chain_issuer_must_be_able_to_issue() {
        let mut i = issuer();
        i.can_issue = false;
        assert!(Chain::new(leaf(), i).validate().is_err());
    }

    #[test]
    fn empty_signature_rejected() {
        let mut c = leaf();
        c.signature.clear();
        assert_eq!(c.validate(), Err(TypeError::EmptyField("certificate.signature")));
    }

    #[test]
    fn wildcard_subject_rejected() {
        let mut c = leaf();
        c.subject = "1-0".parse().unwrap();
        assert!(matches!(c.validate(), Err(TypeError::Wildcard { .. })));
    }
}
