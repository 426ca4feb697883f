//! Trust object builders shared by the store's tests.

use std::collections::BTreeMap;

use trustdb_types::{Certificate, Chain, CoreAs, Isd, Trc, IA};

pub fn ia(s: &str) -> IA {
    s.parse().unwrap()
}

pub fn trc(isd: u16, version: u64, description: &str) -> Trc {
    let core = ia(&format!("{isd}-ff00:0:110"));
    Trc {
        isd: Isd(isd),
        version,
        description: description.into(),
        issuing_time: 1_000,
        expiration_time: 2_000,
        grace_period: 0,
        quorum_trcs: 1,
        core_ases: BTreeMap::from([(
            core,
            CoreAs {
                online_key: vec![1; 32],
                offline_key: vec![2; 32],
            },
        )]),
        signatures: BTreeMap::from([(core, vec![3; 64])]),
    }
}

pub fn issuer_cert(subject: IA, version: u64) -> Certificate {
    Certificate {
        subject,
        version,
        issuer: subject,
        issuer_version: 1,
        can_issue: true,
        issuing_time: 1_000,
        expiration_time: 2_000,
        subject_sign_key: vec![version as u8; 32],
        subject_enc_key: vec![],
        signature: vec![9; 64],
    }
}

pub fn leaf_cert(subject: IA, version: u64, issuer: &Certificate) -> Certificate {
    Certificate {
        subject,
        version,
        issuer: issuer.subject,
        issuer_version: issuer.version,
        can_issue: false,
        issuing_time: 1_000,
        expiration_time: 2_000,
        subject_sign_key: vec![version as u8 + 100; 32],
        subject_enc_key: vec![7; 32],
        signature: vec![8; 64],
    }
}

/// A chain for `leaf_ia` at `version`, issued by `1-ff00:0:110` v1.
pub fn chain(leaf_ia: &str, version: u64) -> Chain {
    let issuer = issuer_cert(ia("1-ff00:0:110"), 1);
    Chain::new(leaf_cert(ia(leaf_ia), version, &issuer), issuer)
}
