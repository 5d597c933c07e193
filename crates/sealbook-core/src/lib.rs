//! # sealbook-core
//!
//! The adapters every Sealbook component sits on:
//!
//! - `store`    — the transactional SQLite handle and error translation
//! - `schema`   — table definitions and the append-only trigger guards
//! - `crypto`   — SHA-256, PBKDF2, AES-256-GCM, OS randomness
//! - `compress` — zlib for backup payloads
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sealbook_core::{Store, StorageResultExt};
//!
//! let store = Store::open("books.db")?;
//! store.write(|tx| {
//!     tx.execute("INSERT INTO tax_jurisdictions ...", []).storage()?;
//!     Ok(())
//! })?;
//! ```

pub mod compress;
pub mod crypto;
pub mod schema;
pub mod store;

pub use store::{StorageResultExt, Store};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use sealbook_contracts::error::SealError;

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn insert_event(store: &Store, n: u32) {
        store
            .write(|tx| {
                tx.execute(
                    "INSERT INTO audit_events
                     (previous_hash, current_hash, event_type, event_payload, actor_id, timestamp, nonce)
                     VALUES (?1, ?2, 'verification-run', '{}', 'tester', '2024-01-01T00:00:00.000Z', '00')",
                    rusqlite::params![format!("prev-{n}"), format!("cur-{n}")],
                )
                .storage()?;
                Ok(())
            })
            .unwrap();
    }

    fn event_count(store: &Store) -> i64 {
        store
            .read(|conn| {
                conn.query_row("SELECT COUNT(*) FROM audit_events", [], |r| r.get(0))
                    .storage()
            })
            .unwrap()
    }

    // ── crypto ────────────────────────────────────────────────────────────────

    /// Known-answer test for the empty-string digest.
    #[test]
    fn test_sha256_known_answer() {
        assert_eq!(
            crypto::sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    /// Length prefixes keep field boundaries significant.
    #[test]
    fn test_field_hasher_is_boundary_sensitive() {
        let a = crypto::FieldHasher::new().field("ab").field("c").finish();
        let b = crypto::FieldHasher::new().field("a").field("bc").finish();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let salt = crypto::random_bytes(crypto::SALT_LEN);
        let iv = crypto::random_bytes(crypto::IV_LEN);
        let key = crypto::derive_key("correct horse", &salt, 1_000).unwrap();

        let sealed = crypto::encrypt(&key, &iv, b"ledger bytes", b"header").unwrap();
        assert_ne!(sealed.as_slice(), b"ledger bytes");

        let opened = crypto::decrypt(&key, &iv, &sealed, b"header").unwrap();
        assert_eq!(opened, b"ledger bytes");
    }

    /// A different password yields a different key and fails authentication.
    #[test]
    fn test_wrong_key_fails_authentication() {
        let salt = crypto::random_bytes(crypto::SALT_LEN);
        let iv = crypto::random_bytes(crypto::IV_LEN);
        let key = crypto::derive_key("right", &salt, 1_000).unwrap();
        let wrong = crypto::derive_key("wrong", &salt, 1_000).unwrap();

        let sealed = crypto::encrypt(&key, &iv, b"payload", b"").unwrap();
        let err = crypto::decrypt(&wrong, &iv, &sealed, b"").unwrap_err();
        assert!(matches!(err, SealError::AuthenticationFailed));
    }

    /// Modified associated data is rejected even with the right key.
    #[test]
    fn test_modified_aad_fails_authentication() {
        let salt = crypto::random_bytes(crypto::SALT_LEN);
        let iv = crypto::random_bytes(crypto::IV_LEN);
        let key = crypto::derive_key("pw", &salt, 1_000).unwrap();

        let sealed = crypto::encrypt(&key, &iv, b"payload", b"v1").unwrap();
        assert!(matches!(
            crypto::decrypt(&key, &iv, &sealed, b"v2"),
            Err(SealError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_derive_key_rejects_zero_iterations_and_short_salt() {
        let salt = crypto::random_bytes(crypto::SALT_LEN);
        assert!(matches!(
            crypto::derive_key("pw", &salt, 0),
            Err(SealError::Crypto { .. })
        ));
        assert!(matches!(
            crypto::derive_key("pw", b"short", 1_000),
            Err(SealError::Crypto { .. })
        ));
    }

    #[test]
    fn test_random_bytes_differ() {
        assert_ne!(crypto::random_bytes(16), crypto::random_bytes(16));
    }

    // ── compress ──────────────────────────────────────────────────────────────

    #[test]
    fn test_compress_round_trip() {
        let data = b"debit debit credit credit ".repeat(200);
        let packed = compress::compress(&data, compress::DEFAULT_LEVEL).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(compress::decompress(&packed).unwrap(), data);
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        assert!(matches!(
            compress::decompress(b"not zlib at all"),
            Err(SealError::Compression { .. })
        ));
        assert!(compress::compress(b"x", 10).is_err());
    }

    // ── store / schema ────────────────────────────────────────────────────────

    /// A failing write closure leaves nothing behind.
    #[test]
    fn test_write_rolls_back_on_error() {
        let store = Store::in_memory().unwrap();
        let result: Result<(), SealError> = store.write(|tx| {
            tx.execute(
                "INSERT INTO audit_events
                 (previous_hash, current_hash, event_type, event_payload, actor_id, timestamp, nonce)
                 VALUES ('p', 'c', 'verification-run', '{}', 'a', 't', 'n')",
                [],
            )
            .storage()?;
            Err(SealError::InvalidInput {
                reason: "abort".to_string(),
            })
        });

        assert!(result.is_err());
        assert_eq!(event_count(&store), 0);
    }

    /// Raw UPDATE and DELETE on sealed rows are refused by the engine and
    /// surface as `AppendOnly`.
    #[test]
    fn test_guards_reject_update_and_delete() {
        let store = Store::in_memory().unwrap();
        insert_event(&store, 1);

        let update = store.read(|conn| {
            conn.execute("UPDATE audit_events SET actor_id = 'mallory'", [])
                .storage()
        });
        match update {
            Err(SealError::AppendOnly { reason }) => {
                assert!(reason.contains("sealed"), "unexpected reason: {reason}")
            }
            other => panic!("expected AppendOnly, got {:?}", other),
        }

        let delete = store.read(|conn| conn.execute("DELETE FROM audit_events", []).storage());
        assert!(matches!(delete, Err(SealError::AppendOnly { .. })));
        assert_eq!(event_count(&store), 1);
    }

    /// Two events can never share a predecessor.
    #[test]
    fn test_previous_hash_is_unique() {
        let store = Store::in_memory().unwrap();
        insert_event(&store, 1);
        let dup = store.write(|tx| {
            tx.execute(
                "INSERT INTO audit_events
                 (previous_hash, current_hash, event_type, event_payload, actor_id, timestamp, nonce)
                 VALUES ('prev-1', 'other', 'verification-run', '{}', 'a', 't', 'n')",
                [],
            )
            .storage()
        });
        assert!(matches!(dup, Err(SealError::Storage { .. })));
    }

    /// Dropped guards come back on rollback because DDL is transactional.
    #[test]
    fn test_guard_removal_is_transactional() {
        let store = Store::in_memory().unwrap();
        let installed = store.read(schema::guard_count).unwrap();
        assert_eq!(installed, schema::GUARDED_TABLES.len() * 2);

        let result: Result<(), SealError> = store.write(|tx| {
            schema::drop_guards(tx)?;
            assert_eq!(schema::guard_count(tx)?, 0);
            Err(SealError::InvalidInput {
                reason: "abort".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(store.read(schema::guard_count).unwrap(), installed);
    }

    /// The schema survives reopening an on-disk database.
    #[test]
    fn test_reopen_on_disk_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.db");
        {
            let store = Store::open(&path).unwrap();
            insert_event(&store, 1);
            assert_eq!(store.path(), Some(path.as_path()));
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(event_count(&store), 1);
    }
}
