//! Foundation types for TrustDB.
//!
//! This crate defines the identifiers and trust objects that the store keeps
//! versioned: every other TrustDB crate depends on `trustdb-types`.
//!
//! # Key Types
//!
//! - [`Isd`], [`Asn`], [`IA`] -- isolation domain and AS identifiers
//! - [`Trc`] -- Trust Root Configuration, scoped by ISD
//! - [`Certificate`] -- issuer or leaf certificate, scoped by subject IA
//! - [`Chain`] -- leaf certificate bundled with its issuer certificate
//! - [`CustKey`] -- customer signing key with its issuing TRC version
//! - [`Digest`] -- BLAKE3 digest of an object's canonical encoding
//!
//! Validation in this crate is structural only (wildcards, zero versions,
//! empty payloads). Signatures are never checked here.

pub mod bytes;
pub mod cert;
pub mod custkey;
pub mod digest;
pub mod error;
pub mod ia;
pub mod trc;

pub use cert::{Certificate, Chain};
pub use custkey::CustKey;
pub use digest::Digest;
pub use error::TypeError;
pub use ia::{Asn, Isd, IA};
pub use trc::{CoreAs, Trc};
