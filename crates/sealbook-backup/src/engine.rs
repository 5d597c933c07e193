//! Backup creation and restore.
//!
//! Create:
//!
//! 1. In one read transaction, capture the ledger head and dump the selected
//!    tables.
//! 2. Serialize, compress, and (with a password) encrypt.  The metadata
//!    header is the AES-GCM associated data, so it cannot be swapped onto
//!    another payload.
//! 3. Seal a `backup-created` event naming the artifact checksum and the
//!    captured head.  `export_backup` writes the artifact file first, so a
//!    failed write seals nothing.
//!
//! Restore reverses the pipeline and replaces the included tables inside a
//! single write transaction.  Any failure leaves the database, guards
//! included, exactly as it was.

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use sealbook_audit::{
    ledger::{self, head, load_events},
    verify_chain,
};
use sealbook_contracts::{
    backup::{BackupArtifact, BackupMetadata, BackupTable, EncryptionHeader, SCHEMA_VERSION},
    error::{SealError, SealResult},
    event::{BackupProvenance, EventPayload},
    time::{format_timestamp, now_millis},
};
use sealbook_core::{
    compress,
    crypto::{self, sha256_hex, CIPHER_NAME, DEFAULT_PBKDF2_ITERATIONS, IV_LEN, KDF_NAME, SALT_LEN},
    schema, StorageResultExt, Store,
};

use crate::artifact;
use crate::dataset::{clear_table, dump_table, load_table, Dataset};

/// Work factors for new backups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupSettings {
    pub pbkdf2_iterations: u32,
    pub compression_level: u32,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
            compression_level: compress::DEFAULT_LEVEL,
        }
    }
}

/// What a restore replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreSummary {
    pub backup_id: Uuid,
    pub tables_restored: Vec<BackupTable>,
    pub rows_restored: u64,
    /// Ledger head after the `backup-restored` event was sealed.
    pub ledger_head: String,
}

/// The metadata fields bound into the ciphertext.
#[derive(Serialize)]
struct AssociatedHeader<'a> {
    backup_id: &'a Uuid,
    schema_version: u32,
    created_at: String,
    content_checksum: &'a str,
    ledger_provenance_hash: &'a str,
    tables_included: &'a [BackupTable],
}

fn associated_data(metadata: &BackupMetadata) -> SealResult<Vec<u8>> {
    Ok(serde_json::to_vec(&AssociatedHeader {
        backup_id: &metadata.backup_id,
        schema_version: metadata.schema_version,
        created_at: format_timestamp(&metadata.created_at),
        content_checksum: &metadata.content_checksum,
        ledger_provenance_hash: &metadata.ledger_provenance_hash,
        tables_included: &metadata.tables_included,
    })?)
}

fn capture(conn: &Connection, tables: &[BackupTable]) -> SealResult<(String, Dataset)> {
    // A deferred transaction gives every dump the same snapshot.
    let tx = conn.unchecked_transaction().storage()?;
    let provenance = head(&tx)?.hash;
    let dumps = tables
        .iter()
        .map(|table| dump_table(&tx, *table))
        .collect::<SealResult<Vec<_>>>()?;
    tx.commit().storage()?;
    Ok((
        provenance,
        Dataset {
            schema_version: SCHEMA_VERSION,
            tables: dumps,
        },
    ))
}

/// Decrypt (when needed), decompress, and check the content checksum.
fn open_payload(artifact: &BackupArtifact, password: Option<&str>) -> SealResult<Dataset> {
    let metadata = &artifact.metadata;

    let compressed = match (&metadata.encryption, metadata.is_encrypted) {
        (Some(header), true) => {
            let password = password.ok_or_else(|| SealError::Crypto {
                reason: "backup is encrypted; a password is required".to_string(),
            })?;
            if header.algorithm != CIPHER_NAME || header.kdf != KDF_NAME {
                return Err(SealError::InvalidArtifact {
                    reason: format!(
                        "unsupported encryption {} / {}",
                        header.algorithm, header.kdf
                    ),
                });
            }
            let decode = |field: &str, value: &str| {
                hex::decode(value).map_err(|e| SealError::InvalidArtifact {
                    reason: format!("encryption {field} is not hex: {e}"),
                })
            };
            let salt = decode("salt", &header.salt)?;
            let iv = decode("iv", &header.iv)?;
            let key = crypto::derive_key(password, &salt, header.iterations)?;
            crypto::decrypt(&key, &iv, &artifact.payload, &associated_data(metadata)?)?
        }
        (None, false) => artifact.payload.clone(),
        _ => {
            return Err(SealError::InvalidArtifact {
                reason: "encryption flag and header disagree".to_string(),
            })
        }
    };

    let plain = compress::decompress(&compressed)?;
    if sha256_hex(&plain) != metadata.content_checksum {
        return Err(SealError::IntegrityViolation {
            reason: format!(
                "backup {} content does not match its content checksum",
                metadata.backup_id
            ),
        });
    }

    let dataset: Dataset = serde_json::from_slice(&plain)?;
    if dataset.table_list() != metadata.tables_included {
        return Err(SealError::InvalidArtifact {
            reason: "dataset tables differ from the metadata".to_string(),
        });
    }
    Ok(dataset)
}

/// Replace the included tables and re-seal, inside the caller's transaction.
fn replace_tables(
    conn: &Connection,
    dataset: Dataset,
    metadata: &BackupMetadata,
    actor_id: &str,
) -> SealResult<RestoreSummary> {
    let tables = dataset.table_list();
    let rows_restored = dataset.row_count();

    schema::drop_guards(conn)?;
    for table in tables.iter().rev() {
        let removed = clear_table(conn, *table)?;
        debug!(table = %table, removed, "table cleared");
    }
    for dump in dataset.tables {
        let table = dump.table;
        let inserted = load_table(conn, dump)?;
        debug!(table = %table, inserted, "table restored");
    }
    schema::install_guards(conn)?;

    if tables.contains(&BackupTable::AuditEvents) {
        verify_chain(&load_events(conn, None)?).into_result()?;
        let restored_head = head(conn)?.hash;
        if restored_head != metadata.ledger_provenance_hash {
            return Err(SealError::IntegrityViolation {
                reason: format!(
                    "restored ledger head {restored_head} does not match provenance {}",
                    metadata.ledger_provenance_hash
                ),
            });
        }
    }

    let event = ledger::append(
        conn,
        &EventPayload::BackupRestored(BackupProvenance {
            backup_id: metadata.backup_id.to_string(),
            artifact_checksum: metadata.artifact_checksum.clone(),
            provenance_hash: metadata.ledger_provenance_hash.clone(),
        }),
        actor_id,
    )?;

    Ok(RestoreSummary {
        backup_id: metadata.backup_id,
        tables_restored: tables,
        rows_restored,
        ledger_head: event.current_hash,
    })
}

// ── Service ───────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct BackupEngine {
    store: Arc<Store>,
    settings: BackupSettings,
}

impl BackupEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self::with_settings(store, BackupSettings::default())
    }

    pub fn with_settings(store: Arc<Store>, settings: BackupSettings) -> Self {
        Self { store, settings }
    }

    /// Back up `selection` (empty means every table).  With `password` the
    /// payload is encrypted; without it the payload is only compressed.
    pub fn create_backup(
        &self,
        password: Option<&str>,
        selection: &[BackupTable],
        actor_id: &str,
    ) -> SealResult<BackupArtifact> {
        let (artifact, rows) = self.build(password, selection)?;
        self.seal_created(&artifact, rows, actor_id)?;
        Ok(artifact)
    }

    /// Like `create_backup`, but writes the artifact to `path` before the
    /// `backup-created` event is sealed.
    pub fn export_backup(
        &self,
        password: Option<&str>,
        selection: &[BackupTable],
        path: &Path,
        actor_id: &str,
    ) -> SealResult<BackupArtifact> {
        let (artifact, rows) = self.build(password, selection)?;
        artifact::write_to(&artifact, path).inspect_err(|e| {
            warn!(
                backup_id = %artifact.metadata.backup_id,
                path = %path.display(),
                error = %e,
                "backup file not written; nothing sealed"
            );
        })?;
        self.seal_created(&artifact, rows, actor_id)?;
        Ok(artifact)
    }

    fn build(
        &self,
        password: Option<&str>,
        selection: &[BackupTable],
    ) -> SealResult<(BackupArtifact, u64)> {
        let tables = BackupTable::closure(selection);
        let (provenance, dataset) = self.store.read(|conn| capture(conn, &tables))?;

        let plain = serde_json::to_vec(&dataset)?;
        let compressed = compress::compress(&plain, self.settings.compression_level)?;

        let mut metadata = BackupMetadata {
            backup_id: Uuid::new_v4(),
            schema_version: SCHEMA_VERSION,
            created_at: now_millis(),
            content_checksum: sha256_hex(&plain),
            artifact_checksum: String::new(),
            ledger_provenance_hash: provenance,
            tables_included: tables,
            size_uncompressed: plain.len() as u64,
            size_compressed: compressed.len() as u64,
            is_encrypted: password.is_some(),
            encryption: None,
        };

        let payload = match password {
            Some(password) => {
                let salt = crypto::random_bytes(SALT_LEN);
                let iv = crypto::random_bytes(IV_LEN);
                let key = crypto::derive_key(password, &salt, self.settings.pbkdf2_iterations)?;
                let ciphertext = crypto::encrypt(&key, &iv, &compressed, &associated_data(&metadata)?)?;
                metadata.encryption = Some(EncryptionHeader {
                    algorithm: CIPHER_NAME.to_string(),
                    kdf: KDF_NAME.to_string(),
                    iterations: self.settings.pbkdf2_iterations,
                    salt: hex::encode(salt),
                    iv: hex::encode(iv),
                });
                ciphertext
            }
            None => {
                warn!("creating an unencrypted backup");
                compressed
            }
        };
        metadata.artifact_checksum = sha256_hex(&payload);

        Ok((BackupArtifact { metadata, payload }, dataset.row_count()))
    }

    fn seal_created(&self, artifact: &BackupArtifact, rows: u64, actor_id: &str) -> SealResult<()> {
        let metadata = &artifact.metadata;
        self.store.write(|tx| {
            ledger::append(
                tx,
                &EventPayload::BackupCreated(BackupProvenance {
                    backup_id: metadata.backup_id.to_string(),
                    artifact_checksum: metadata.artifact_checksum.clone(),
                    provenance_hash: metadata.ledger_provenance_hash.clone(),
                }),
                actor_id,
            )
        })?;

        info!(
            backup_id = %metadata.backup_id,
            tables = metadata.tables_included.len(),
            rows,
            size_uncompressed = metadata.size_uncompressed,
            size_compressed = metadata.size_compressed,
            encrypted = metadata.is_encrypted,
            provenance = %metadata.ledger_provenance_hash,
            "backup created"
        );
        Ok(())
    }

    /// Replace the included tables with the artifact's content.
    pub fn restore_backup(
        &self,
        artifact: &BackupArtifact,
        password: Option<&str>,
        actor_id: &str,
    ) -> SealResult<RestoreSummary> {
        let metadata = &artifact.metadata;

        if metadata.schema_version > SCHEMA_VERSION {
            return Err(SealError::InvalidArtifact {
                reason: format!(
                    "backup schema version {} is newer than supported version {SCHEMA_VERSION}",
                    metadata.schema_version
                ),
            });
        }

        // Authenticated decryption and the content checksum decide; a stale
        // outer checksum alone is not fatal.
        let actual = sha256_hex(&artifact.payload);
        if actual != metadata.artifact_checksum {
            warn!(
                backup_id = %metadata.backup_id,
                expected = %metadata.artifact_checksum,
                actual = %actual,
                "backup artifact checksum mismatch"
            );
        }

        let dataset = open_payload(artifact, password).inspect_err(|e| {
            warn!(backup_id = %metadata.backup_id, error = %e, "backup could not be opened");
        })?;

        let summary = self
            .store
            .write(|tx| replace_tables(tx, dataset, metadata, actor_id))
            .inspect_err(|e| {
                warn!(backup_id = %metadata.backup_id, error = %e, "restore rolled back");
            })?;

        info!(
            backup_id = %summary.backup_id,
            tables = summary.tables_restored.len(),
            rows = summary.rows_restored,
            ledger_head = %summary.ledger_head,
            "backup restored"
        );
        Ok(summary)
    }
}
