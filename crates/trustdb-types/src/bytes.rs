//! Serde helpers that write byte fields as lowercase hex strings.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serializer};

use crate::ia::IA;

pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(deserializer)?;
    hex::decode(&s).map_err(serde::de::Error::custom)
}

/// Hex encoding for maps of IA to raw bytes (TRC signatures).
pub mod map {
    use super::*;
    use serde::ser::SerializeMap;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<IA, Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut out = serializer.serialize_map(Some(map.len()))?;
        for (ia, bytes) in map {
            out.serialize_entry(ia, &hex::encode(bytes))?;
        }
        out.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<IA, Vec<u8>>, D::Error> {
        let raw = BTreeMap::<IA, String>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(ia, s)| {
                hex::decode(&s)
                    .map(|bytes| (ia, bytes))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}
