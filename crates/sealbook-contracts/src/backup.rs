//! Backup artifact metadata and table selection.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SealError, SealResult};

/// Version of the storage schema written into every backup.  Restore refuses
/// artifacts produced by a newer schema.
pub const SCHEMA_VERSION: u32 = 2;

/// A table that can be included in a backup.
///
/// Declaration order is parent-before-child: rows are inserted in this
/// order and deleted in reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupTable {
    AuditEvents,
    JournalEntries,
    JournalLines,
    TaxJurisdictions,
    TaxTransactions,
    TaxReports,
}

impl BackupTable {
    pub const ALL: [BackupTable; 6] = [
        BackupTable::AuditEvents,
        BackupTable::JournalEntries,
        BackupTable::JournalLines,
        BackupTable::TaxJurisdictions,
        BackupTable::TaxTransactions,
        BackupTable::TaxReports,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            BackupTable::AuditEvents => "audit_events",
            BackupTable::JournalEntries => "journal_entries",
            BackupTable::JournalLines => "journal_lines",
            BackupTable::TaxJurisdictions => "tax_jurisdictions",
            BackupTable::TaxTransactions => "tax_transactions",
            BackupTable::TaxReports => "tax_reports",
        }
    }

    /// Tables that must travel together with this one.
    fn companions(&self) -> &'static [BackupTable] {
        match self {
            BackupTable::JournalEntries | BackupTable::JournalLines => {
                &[BackupTable::JournalEntries, BackupTable::JournalLines]
            }
            _ => &[],
        }
    }

    /// Expand `selection` with companion tables and return it in insert
    /// order.  An empty selection means every table.
    pub fn closure(selection: &[BackupTable]) -> Vec<BackupTable> {
        if selection.is_empty() {
            return BackupTable::ALL.to_vec();
        }
        let mut set: BTreeSet<BackupTable> = selection.iter().copied().collect();
        for table in selection {
            set.extend(table.companions().iter().copied());
        }
        set.into_iter().collect()
    }
}

impl fmt::Display for BackupTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

impl FromStr for BackupTable {
    type Err = SealError;

    fn from_str(s: &str) -> SealResult<Self> {
        BackupTable::ALL
            .into_iter()
            .find(|t| t.table_name() == s)
            .ok_or_else(|| SealError::InvalidInput {
                reason: format!("unknown backup table '{s}'"),
            })
    }
}

/// How the payload was encrypted, everything needed to re-derive the key
/// except the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionHeader {
    /// Always `"AES-256-GCM"`.
    pub algorithm: String,
    /// Always `"PBKDF2-HMAC-SHA256"`.
    pub kdf: String,
    pub iterations: u32,
    /// Hex-encoded.
    pub salt: String,
    /// Hex-encoded 96-bit nonce.
    pub iv: String,
}

/// Self-describing metadata, readable without the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub backup_id: Uuid,
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    /// SHA-256 of the uncompressed canonical dataset.
    pub content_checksum: String,
    /// SHA-256 of the payload bytes as stored in the artifact.
    pub artifact_checksum: String,
    /// Ledger head at the moment the dataset was read.
    pub ledger_provenance_hash: String,
    pub tables_included: Vec<BackupTable>,
    pub size_uncompressed: u64,
    pub size_compressed: u64,
    pub is_encrypted: bool,
    pub encryption: Option<EncryptionHeader>,
}

/// Metadata plus the opaque compressed (and usually encrypted) payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    pub metadata: BackupMetadata,
    pub payload: Vec<u8>,
}
