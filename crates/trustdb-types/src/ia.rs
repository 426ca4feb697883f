use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Largest AS number that is written in decimal (the BGP range).
const MAX_BGP_ASN: u64 = u32::MAX as u64;
/// AS numbers are 48 bits wide.
const MAX_ASN: u64 = (1 << 48) - 1;
const ASN_GROUP_BITS: u32 = 16;

/// Isolation domain identifier. `0` is the wildcard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Isd(pub u16);

impl Isd {
    pub const WILDCARD: Isd = Isd(0);

    pub fn is_wildcard(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Isd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Isd {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u16>()
            .map(Isd)
            .map_err(|_| TypeError::InvalidIsd(s.to_string()))
    }
}

/// 48-bit autonomous system number. `0` is the wildcard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Asn(u64);

impl Asn {
    pub const WILDCARD: Asn = Asn(0);

    /// Build an AS number, rejecting values wider than 48 bits.
    pub fn new(value: u64) -> Result<Self, TypeError> {
        if value > MAX_ASN {
            return Err(TypeError::InvalidAsn(format!("{value} exceeds 48 bits")));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn is_wildcard(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Asn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 <= MAX_BGP_ASN {
            return write!(f, "{}", self.0);
        }
        let mask = (1u64 << ASN_GROUP_BITS) - 1;
        write!(
            f,
            "{:x}:{:x}:{:x}",
            (self.0 >> (2 * ASN_GROUP_BITS)) & mask,
            (self.0 >> ASN_GROUP_BITS) & mask,
            self.0 & mask
        )
    }
}

impl FromStr for Asn {
    type Err = TypeError;

    /// Accepts either a decimal BGP-range number or three colon-separated
    /// 16-bit hex groups.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TypeError::InvalidAsn(s.to_string());

        if !s.contains(':') {
            let value = s.parse::<u64>().map_err(|_| invalid())?;
            if value > MAX_BGP_ASN {
                return Err(invalid());
            }
            return Ok(Self(value));
        }

        let groups: Vec<&str> = s.split(':').collect();
        if groups.len() != 3 {
            return Err(invalid());
        }
        let mut value = 0u64;
        for group in groups {
            if group.is_empty() || group.len() > 4 {
                return Err(invalid());
            }
            let part = u64::from_str_radix(group, 16).map_err(|_| invalid())?;
            value = (value << ASN_GROUP_BITS) | part;
        }
        Ok(Self(value))
    }
}

/// An ISD-AS pair, written `<isd>-<asn>` (e.g. `1-ff00:0:110`).
///
/// Serialized as its text form so it can key JSON maps.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IA {
    pub isd: Isd,
    pub asn: Asn,
}

impl IA {
    pub fn new(isd: Isd, asn: Asn) -> Self {
        Self { isd, asn }
    }

    /// True if either half is the wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.isd.is_wildcard() || self.asn.is_wildcard()
    }

    /// Reject wildcard identifiers where a concrete scope key is required.
    pub fn require_concrete(&self, field: &'static str) -> Result<(), TypeError> {
        if self.is_wildcard() {
            return Err(TypeError::Wildcard {
                field,
                value: self.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for IA {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IA({self})")
    }
}

impl fmt::Display for IA {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.isd, self.asn)
    }
}

impl FromStr for IA {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (isd, asn) = s
            .split_once('-')
            .ok_or_else(|| TypeError::InvalidIa(s.to_string()))?;
        let isd = isd
            .parse::<Isd>()
            .map_err(|_| TypeError::InvalidIa(s.to_string()))?;
        let asn = asn
            .parse::<Asn>()
            .map_err(|_| TypeError::InvalidIa(s.to_string()))?;
        Ok(Self { isd, asn })
    }
}

impl Serialize for IA {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IA {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
