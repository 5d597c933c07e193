//! # sealbook-contracts
//!
//! Shared types, payloads, and error contracts for the Sealbook forensic
//! ledger.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate: only data definitions, canonical payload encoding, and error
//! types.

pub mod backup;
pub mod error;
pub mod event;
pub mod journal;
pub mod money;
pub mod tax;
pub mod time;
