//! Domain logic for the drawbridge access broker.
//!
//! Everything in this crate is independent of the database and the HTTP
//! layer: request canonicalization and integrity hashing, Git pkt-line
//! inspection for the push-safety gate, secret generation/hashing, and
//! the credential cipher. The `db` and `api` crates build on top.

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod hashing;
pub mod pktline;
pub mod secrets;
pub mod types;
