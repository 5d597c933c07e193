//! The journal service: posting, reversal, lookup, and per-entry
//! verification.
//!
//! Posting is one write transaction: the entry number is allocated, the
//! `entry-posted` event is sealed, and the header and lines are inserted
//! referencing that event.  Either all of it commits or none of it does.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use sealbook_audit::{
    hash_event,
    ledger::{self, find_event, predecessor_hash},
};
use sealbook_contracts::{
    error::{SealError, SealResult},
    event::{EntryPosted, EntryUpdateBlocked, EventPayload, EventType},
    journal::{CanonicalForm, EntryVerification, JournalDraft, JournalEntry, JournalLine},
    money::Cents,
    time::{format_timestamp, now_millis, parse_timestamp},
};
use sealbook_core::{StorageResultExt, Store};

use crate::{
    canonical::{data_hash, matching_form, EntryContent},
    validation::validate_lines,
};

/// A change someone tried to make to a posted entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Amendment {
    Description(String),
    TransactionDate(DateTime<Utc>),
    Delete,
}

impl Amendment {
    fn describe(&self) -> String {
        match self {
            Amendment::Description(text) => format!("description -> '{text}'"),
            Amendment::TransactionDate(date) => {
                format!("transaction_date -> {}", format_timestamp(date))
            }
            Amendment::Delete => "delete".to_string(),
        }
    }
}

// ── Row mapping ───────────────────────────────────────────────────────────────

struct EntryRow {
    id: i64,
    entry_number: String,
    description: String,
    transaction_date: String,
    total_debit: i64,
    total_credit: i64,
    created_by: String,
    data_hash: String,
    audit_event_id: i64,
    canonical_form: String,
}

impl EntryRow {
    fn content(&self, lines: Vec<JournalLine>) -> EntryContent {
        EntryContent {
            entry_number: self.entry_number.clone(),
            description: self.description.clone(),
            transaction_date: self.transaction_date.clone(),
            total_debit: Cents(self.total_debit),
            total_credit: Cents(self.total_credit),
            created_by: self.created_by.clone(),
            lines,
        }
    }

    fn into_entry(self, lines: Vec<JournalLine>) -> SealResult<JournalEntry> {
        Ok(JournalEntry {
            transaction_date: parse_timestamp(&self.transaction_date)?,
            canonical_form: self.canonical_form.parse()?,
            id: self.id,
            entry_number: self.entry_number,
            description: self.description,
            total_debit: Cents(self.total_debit),
            total_credit: Cents(self.total_credit),
            created_by: self.created_by,
            data_hash: self.data_hash,
            audit_event_id: self.audit_event_id,
            lines,
        })
    }
}

const ENTRY_COLUMNS: &str = "id, entry_number, description, transaction_date, total_debit, \
     total_credit, created_by, data_hash, audit_event_id, canonical_form";

fn load_row(conn: &Connection, entry_number: &str) -> SealResult<EntryRow> {
    conn.query_row(
        &format!("SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE entry_number = ?1"),
        params![entry_number],
        |row| {
            Ok(EntryRow {
                id: row.get(0)?,
                entry_number: row.get(1)?,
                description: row.get(2)?,
                transaction_date: row.get(3)?,
                total_debit: row.get(4)?,
                total_credit: row.get(5)?,
                created_by: row.get(6)?,
                data_hash: row.get(7)?,
                audit_event_id: row.get(8)?,
                canonical_form: row.get(9)?,
            })
        },
    )
    .optional()
    .storage()?
    .ok_or_else(|| SealError::NotFound {
        kind: "journal entry",
        id: entry_number.to_string(),
    })
}

fn load_lines(conn: &Connection, entry_id: i64) -> SealResult<Vec<JournalLine>> {
    let mut stmt = conn
        .prepare(
            "SELECT account_code, debit, credit, line_description
             FROM journal_lines WHERE entry_id = ?1 ORDER BY line_no",
        )
        .storage()?;
    let lines = stmt
        .query_map(params![entry_id], |row| {
            Ok(JournalLine {
                account_code: row.get(0)?,
                debit: Cents(row.get(1)?),
                credit: Cents(row.get(2)?),
                line_description: row.get(3)?,
            })
        })
        .storage()?
        .collect::<Result<Vec<_>, _>>()
        .storage()?;
    Ok(lines)
}

/// Load one entry with its lines.
pub fn load_entry(conn: &Connection, entry_number: &str) -> SealResult<JournalEntry> {
    let row = load_row(conn, entry_number)?;
    let lines = load_lines(conn, row.id)?;
    row.into_entry(lines)
}

/// Next sequential id and its `JE-NNNNNN` number.
fn next_entry(conn: &Connection) -> SealResult<(i64, String)> {
    let id: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(id), 0) + 1 FROM journal_entries",
            [],
            |row| row.get(0),
        )
        .storage()?;
    Ok((id, format!("JE-{id:06}")))
}

/// Validate, seal, and insert one entry inside the caller's transaction.
pub fn post_in(
    conn: &Connection,
    draft: &JournalDraft,
    actor_id: &str,
    form: CanonicalForm,
) -> SealResult<JournalEntry> {
    let (total_debit, total_credit) = validate_lines(&draft.lines)?;
    if draft.description.trim().is_empty() {
        return Err(SealError::InvalidInput {
            reason: "journal entry description is empty".to_string(),
        });
    }

    let (id, entry_number) = next_entry(conn)?;
    let transaction_date = format_timestamp(&draft.transaction_date.unwrap_or_else(now_millis));

    let content = EntryContent {
        entry_number: entry_number.clone(),
        description: draft.description.clone(),
        transaction_date: transaction_date.clone(),
        total_debit,
        total_credit,
        created_by: actor_id.to_string(),
        lines: draft.lines.clone(),
    };
    let hash = data_hash(form, &content)?;

    let event = ledger::append(
        conn,
        &EventPayload::EntryPosted(EntryPosted {
            entry_number: entry_number.clone(),
            data_hash: hash.clone(),
            transaction_date: transaction_date.clone(),
        }),
        actor_id,
    )?;

    conn.execute(
        &format!("INSERT INTO journal_entries ({ENTRY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
        params![
            id,
            entry_number,
            content.description,
            transaction_date,
            total_debit.value(),
            total_credit.value(),
            actor_id,
            hash,
            event.id,
            form.as_str()
        ],
    )
    .storage()?;

    for (idx, line) in draft.lines.iter().enumerate() {
        conn.execute(
            "INSERT INTO journal_lines
             (entry_id, line_no, account_code, debit, credit, line_description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                (idx + 1) as i64,
                line.account_code,
                line.debit.value(),
                line.credit.value(),
                line.line_description
            ],
        )
        .storage()?;
    }

    debug!(
        entry_number = %entry_number,
        audit_event_id = event.id,
        lines = draft.lines.len(),
        "journal entry inserted"
    );

    Ok(JournalEntry {
        id,
        entry_number,
        description: content.description,
        transaction_date: parse_timestamp(&transaction_date)?,
        total_debit,
        total_credit,
        created_by: content.created_by,
        data_hash: hash,
        audit_event_id: event.id,
        canonical_form: form,
        lines: content.lines,
    })
}

/// Re-derive an entry's seal from what is stored today.
pub fn verify_in(conn: &Connection, entry_number: &str) -> SealResult<EntryVerification> {
    let row = load_row(conn, entry_number)?;
    let lines = load_lines(conn, row.id)?;
    let content = row.content(lines);

    let invalid = |matched_form: Option<CanonicalForm>, reason: String| EntryVerification {
        entry_number: entry_number.to_string(),
        valid: false,
        matched_form,
        reason: Some(reason),
    };

    let event = find_event(conn, row.audit_event_id)?.ok_or_else(|| SealError::MissingSource {
        reason: format!(
            "entry {entry_number} references ledger event {} which does not exist",
            row.audit_event_id
        ),
    })?;

    let sealed = match event.payload() {
        Ok(EventPayload::EntryPosted(posted)) if posted.entry_number == entry_number => posted,
        Ok(_) => {
            return Ok(invalid(
                None,
                format!("ledger event {} does not seal this entry", event.id),
            ))
        }
        Err(e) => return Ok(invalid(None, format!("ledger event {} unreadable: {e}", event.id))),
    };

    let Some(form) = matching_form(&content, &sealed.data_hash)? else {
        return Ok(invalid(
            None,
            "stored content does not reproduce the sealed data hash".to_string(),
        ));
    };

    if row.data_hash != sealed.data_hash {
        return Ok(invalid(
            Some(form),
            "stored data_hash differs from the sealed one".to_string(),
        ));
    }

    // The seal is recomputed with the date as stored today, so a back-dated
    // transaction_date fails here even for forms that do not hash the date.
    let rebuilt = EventPayload::EntryPosted(EntryPosted {
        entry_number: row.entry_number.clone(),
        data_hash: sealed.data_hash.clone(),
        transaction_date: row.transaction_date.clone(),
    })
    .canonical()?;
    let previous = predecessor_hash(conn, event.id)?;
    let recomputed = hash_event(
        &previous,
        EventType::EntryPosted.as_str(),
        &rebuilt,
        &event.timestamp,
        &event.actor_id,
        &event.nonce,
    );
    if recomputed != event.current_hash {
        return Ok(invalid(
            Some(form),
            "transaction date or ledger seal does not match".to_string(),
        ));
    }

    Ok(EntryVerification {
        entry_number: entry_number.to_string(),
        valid: true,
        matched_form: Some(form),
        reason: None,
    })
}

// ── Service ───────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Journal {
    store: Arc<Store>,
}

impl Journal {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Validate and post a new entry.  An invalid or unbalanced draft is
    /// rejected before anything is written.
    pub fn post(&self, draft: &JournalDraft, actor_id: &str) -> SealResult<JournalEntry> {
        self.post_as(draft, actor_id, CanonicalForm::Current)
    }

    /// Post an entry migrated from the v1 books, sealed over the legacy
    /// canonical text.
    pub fn import_legacy(&self, draft: &JournalDraft, actor_id: &str) -> SealResult<JournalEntry> {
        self.post_as(draft, actor_id, CanonicalForm::Legacy)
    }

    fn post_as(
        &self,
        draft: &JournalDraft,
        actor_id: &str,
        form: CanonicalForm,
    ) -> SealResult<JournalEntry> {
        // Fail fast without taking the write lock.
        validate_lines(&draft.lines)?;

        let entry = self
            .store
            .write(|tx| post_in(tx, draft, actor_id, form))
            .inspect_err(|e| warn!(error = %e, "journal posting rejected"))?;

        info!(
            entry_number = %entry.entry_number,
            total = %entry.total_debit,
            canonical_form = %form,
            "journal entry posted"
        );
        Ok(entry)
    }

    /// Post the mirror image of `entry_number`: every debit becomes a credit
    /// and vice versa.  The original stays untouched.
    pub fn reverse(&self, entry_number: &str, actor_id: &str) -> SealResult<JournalEntry> {
        let entry = self
            .store
            .write(|tx| {
                let original = load_entry(tx, entry_number)?;
                let lines = original
                    .lines
                    .iter()
                    .map(|line| JournalLine {
                        account_code: line.account_code.clone(),
                        debit: line.credit,
                        credit: line.debit,
                        line_description: line.line_description.clone(),
                    })
                    .collect();
                let draft = JournalDraft::new(
                    format!("Reversal of {}: {}", original.entry_number, original.description),
                    lines,
                );
                post_in(tx, &draft, actor_id, CanonicalForm::Current)
            })?;

        info!(
            reversed = %entry_number,
            entry_number = %entry.entry_number,
            "journal entry reversed"
        );
        Ok(entry)
    }

    pub fn get(&self, entry_number: &str) -> SealResult<JournalEntry> {
        self.store.read(|conn| load_entry(conn, entry_number))
    }

    /// All entries in posting order.
    pub fn entries(&self) -> SealResult<Vec<JournalEntry>> {
        self.store.read(|conn| {
            let mut stmt = conn
                .prepare("SELECT entry_number FROM journal_entries ORDER BY id")
                .storage()?;
            let numbers = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .storage()?
                .collect::<Result<Vec<_>, _>>()
                .storage()?;
            numbers
                .iter()
                .map(|number| load_entry(conn, number))
                .collect()
        })
    }

    pub fn verify_entry(&self, entry_number: &str) -> SealResult<EntryVerification> {
        let outcome = self.store.read(|conn| verify_in(conn, entry_number))?;
        if outcome.valid {
            debug!(entry_number, matched_form = ?outcome.matched_form, "entry verified");
        } else {
            warn!(
                entry_number,
                reason = outcome.reason.as_deref().unwrap_or(""),
                "entry verification FAILED"
            );
        }
        Ok(outcome)
    }

    /// Try to change a posted entry.
    ///
    /// The storage guard rejects the statement.  The rejection is sealed as an
    /// `entry-updated-attempt-blocked` event and `AppendOnly` is returned.
    /// This never succeeds: if the guard is missing the change is rolled back
    /// and `IntegrityViolation` is returned instead.
    pub fn attempt_amend(
        &self,
        entry_number: &str,
        amendment: &Amendment,
        actor_id: &str,
    ) -> SealResult<()> {
        let reason = self.store.write(|tx| {
            let row = load_row(tx, entry_number)?;
            let attempt = match amendment {
                Amendment::Description(text) => tx.execute(
                    "UPDATE journal_entries SET description = ?1 WHERE id = ?2",
                    params![text, row.id],
                ),
                Amendment::TransactionDate(date) => tx.execute(
                    "UPDATE journal_entries SET transaction_date = ?1 WHERE id = ?2",
                    params![format_timestamp(date), row.id],
                ),
                Amendment::Delete => tx.execute(
                    "DELETE FROM journal_entries WHERE id = ?1",
                    params![row.id],
                ),
            };

            // A trigger abort only undoes the statement; the transaction is
            // still usable for sealing the blocked attempt.
            match attempt.storage() {
                Err(SealError::AppendOnly { reason }) => {
                    ledger::append(
                        tx,
                        &EventPayload::EntryUpdatedAttemptBlocked(EntryUpdateBlocked {
                            entry_number: entry_number.to_string(),
                            attempted_change: amendment.describe(),
                            reason: reason.clone(),
                        }),
                        actor_id,
                    )?;
                    Ok(reason)
                }
                Err(e) => Err(e),
                Ok(_) => Err(SealError::IntegrityViolation {
                    reason: format!(
                        "immutability guard missing on journal_entries; change to {entry_number} rolled back"
                    ),
                }),
            }
        })?;

        warn!(
            entry_number,
            attempted = %amendment.describe(),
            actor_id,
            "blocked attempt to amend a posted entry"
        );
        Err(SealError::AppendOnly { reason })
    }
}
