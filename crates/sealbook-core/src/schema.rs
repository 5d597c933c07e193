//! Storage schema and the engine-level immutability guards.
//!
//! Sealed tables carry `BEFORE UPDATE` / `BEFORE DELETE` triggers that abort
//! the statement.  The guards hold even for callers that bypass every
//! component in this workspace and talk SQL directly.  Only a restore lifts
//! them, inside its own transaction, and reinstalls them before commit.

use rusqlite::Connection;

use sealbook_contracts::error::SealResult;

use crate::store::StorageResultExt;

/// Prefix of every trigger abort message.  `store::translate` keys on it.
pub const APPEND_ONLY_MARKER: &str = "append-only:";

const TABLES_SQL: &str = r"
CREATE TABLE IF NOT EXISTS audit_events (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    previous_hash   TEXT NOT NULL UNIQUE,
    current_hash    TEXT NOT NULL UNIQUE,
    event_type      TEXT NOT NULL,
    event_payload   TEXT NOT NULL,
    actor_id        TEXT NOT NULL,
    timestamp       TEXT NOT NULL,
    nonce           TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS journal_entries (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_number      TEXT NOT NULL UNIQUE,
    description       TEXT NOT NULL,
    transaction_date  TEXT NOT NULL,
    total_debit       INTEGER NOT NULL,
    total_credit      INTEGER NOT NULL,
    created_by        TEXT NOT NULL,
    data_hash         TEXT NOT NULL,
    audit_event_id    INTEGER NOT NULL,
    canonical_form    TEXT NOT NULL,
    CHECK (total_debit = total_credit)
);

CREATE TABLE IF NOT EXISTS journal_lines (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_id          INTEGER NOT NULL REFERENCES journal_entries(id),
    line_no           INTEGER NOT NULL,
    account_code      TEXT NOT NULL,
    debit             INTEGER NOT NULL CHECK (debit >= 0),
    credit            INTEGER NOT NULL CHECK (credit >= 0),
    line_description  TEXT NOT NULL DEFAULT '',
    UNIQUE (entry_id, line_no)
);

CREATE TABLE IF NOT EXISTS tax_jurisdictions (
    code              TEXT PRIMARY KEY,
    display_name      TEXT NOT NULL,
    base_rate_bps     INTEGER NOT NULL CHECK (base_rate_bps >= 0),
    surtax_rate_bps   INTEGER NOT NULL DEFAULT 0 CHECK (surtax_rate_bps >= 0),
    effective_date    TEXT NOT NULL,
    expiry_date       TEXT,
    active            INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS tax_transactions (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    linked_document_id    TEXT NOT NULL,
    jurisdiction_code     TEXT NOT NULL,
    taxable_amount_cents  INTEGER NOT NULL CHECK (taxable_amount_cents >= 0),
    tax_amount_cents      INTEGER NOT NULL CHECK (tax_amount_cents >= 0),
    effective_rate_bps    INTEGER NOT NULL,
    as_of_date            TEXT NOT NULL,
    transaction_date      TEXT NOT NULL,
    verification_hash     TEXT NOT NULL,
    audit_event_id        INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tax_transactions_date
    ON tax_transactions(transaction_date);

CREATE TABLE IF NOT EXISTS tax_reports (
    report_id         TEXT PRIMARY KEY,
    period_start      TEXT NOT NULL,
    period_end        TEXT NOT NULL,
    generated_at      TEXT NOT NULL,
    checksum          TEXT NOT NULL,
    report_json       TEXT NOT NULL,
    audit_event_id    INTEGER NOT NULL
);
";

/// `(table, abort message)` for every table whose rows are sealed.
pub const GUARDED_TABLES: [(&str, &str); 5] = [
    ("audit_events", "audit events are sealed and can never change"),
    ("journal_entries", "journal entries are immutable; post a reversing entry"),
    ("journal_lines", "journal entries are immutable; post a reversing entry"),
    ("tax_transactions", "tax transactions are immutable; record an adjustment"),
    ("tax_reports", "persisted tax reports are immutable"),
];

/// Create every table and install the guards.  Idempotent.
pub fn apply(conn: &Connection) -> SealResult<()> {
    conn.execute_batch(TABLES_SQL).storage()?;
    install_guards(conn)
}

pub fn install_guards(conn: &Connection) -> SealResult<()> {
    for (table, message) in GUARDED_TABLES {
        let sql = format!(
            "CREATE TRIGGER IF NOT EXISTS {table}_no_update BEFORE UPDATE ON {table}
             BEGIN SELECT RAISE(ABORT, '{APPEND_ONLY_MARKER} {message}'); END;
             CREATE TRIGGER IF NOT EXISTS {table}_no_delete BEFORE DELETE ON {table}
             BEGIN SELECT RAISE(ABORT, '{APPEND_ONLY_MARKER} {message}'); END;"
        );
        conn.execute_batch(&sql).storage()?;
    }
    Ok(())
}

/// Drop the guards.  Only ever called inside a restore transaction.
pub fn drop_guards(conn: &Connection) -> SealResult<()> {
    for (table, _) in GUARDED_TABLES {
        let sql = format!(
            "DROP TRIGGER IF EXISTS {table}_no_update;
             DROP TRIGGER IF EXISTS {table}_no_delete;"
        );
        conn.execute_batch(&sql).storage()?;
    }
    Ok(())
}

/// Number of guard triggers currently installed.
pub fn guard_count(conn: &Connection) -> SealResult<usize> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'trigger' AND (name LIKE '%_no_update' OR name LIKE '%_no_delete')",
            [],
            |row| row.get(0),
        )
        .storage()?;
    Ok(count as usize)
}
