//! # sealbook-journal
//!
//! Immutable double-entry journal.  Every posted entry is sealed into the
//! ledger by an `entry-posted` event carrying the SHA-256 of the entry's
//! canonical form and its transaction date.
//!
//! Entries are never edited.  Corrections are new entries (`reverse`), and
//! attempted edits are both refused by storage and recorded on the chain
//! (`attempt_amend`).

pub mod canonical;
pub mod journal;
pub mod validation;

pub use canonical::EntryContent;
pub use journal::{Amendment, Journal};
pub use validation::validate_lines;

// ── Tests ─────────────────────────────────────────────────────────────────────
