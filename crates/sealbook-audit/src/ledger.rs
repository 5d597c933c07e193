//! The persistent ledger: append, head lookup, loading, and verification
//! against the `audit_events` table.
//!
//! The free functions take a `&Connection` so other components can append
//! inside their own write transaction, binding the event and the business
//! record it seals into one commit.  `Ledger` wraps them for callers that
//! only need the ledger itself.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use sealbook_contracts::{
    error::{SealError, SealResult},
    event::{EventPayload, VerificationRun},
    time::{format_timestamp, now_millis, parse_timestamp},
};
use sealbook_core::{crypto, StorageResultExt, Store};

use crate::{
    chain::{hash_event, verify_segment, ChainReport},
    event::{AuditEvent, ChainHead},
};

const NONCE_LEN: usize = 16;

const EVENT_COLUMNS: &str =
    "id, previous_hash, current_hash, event_type, event_payload, actor_id, timestamp, nonce";

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<AuditEvent> {
    Ok(AuditEvent {
        id: row.get(0)?,
        previous_hash: row.get(1)?,
        current_hash: row.get(2)?,
        event_type: row.get(3)?,
        event_payload: row.get(4)?,
        actor_id: row.get(5)?,
        timestamp: row.get(6)?,
        nonce: row.get(7)?,
    })
}

/// Read the current chain head.
pub fn head(conn: &Connection) -> SealResult<ChainHead> {
    let row = conn
        .query_row(
            "SELECT id, current_hash, timestamp FROM audit_events ORDER BY id DESC LIMIT 1",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()
        .storage()?;

    Ok(match row {
        Some((id, hash, timestamp)) => ChainHead {
            hash,
            event_id: Some(id),
            timestamp: Some(timestamp),
        },
        None => ChainHead::genesis(),
    })
}

/// Timestamp for the next event: now, but never earlier than the head.
fn next_timestamp(head: &ChainHead) -> SealResult<DateTime<Utc>> {
    let now = now_millis();
    match &head.timestamp {
        Some(ts) => Ok(now.max(parse_timestamp(ts)?)),
        None => Ok(now),
    }
}

/// Seal `payload` onto the chain.
///
/// Must be called inside a write transaction (`Store::write`): the head read
/// and the insert then form one critical section.
pub fn append(conn: &Connection, payload: &EventPayload, actor_id: &str) -> SealResult<AuditEvent> {
    let head = head(conn)?;
    let event_type = payload.event_type();
    let event_payload = payload.canonical()?;
    let timestamp = format_timestamp(&next_timestamp(&head)?);
    let nonce = hex::encode(crypto::random_bytes(NONCE_LEN));

    let current_hash = hash_event(
        &head.hash,
        event_type.as_str(),
        &event_payload,
        &timestamp,
        actor_id,
        &nonce,
    );

    conn.execute(
        "INSERT INTO audit_events
         (previous_hash, current_hash, event_type, event_payload, actor_id, timestamp, nonce)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            head.hash,
            current_hash,
            event_type.as_str(),
            event_payload,
            actor_id,
            timestamp,
            nonce
        ],
    )
    .storage()?;

    let event = AuditEvent {
        id: conn.last_insert_rowid(),
        previous_hash: head.hash,
        current_hash,
        event_type: event_type.as_str().to_string(),
        event_payload,
        actor_id: actor_id.to_string(),
        timestamp,
        nonce,
    };

    debug!(
        event_id = event.id,
        event_type = %event.event_type,
        current_hash = %event.current_hash,
        "ledger event sealed"
    );

    Ok(event)
}

/// Load events with `id > after_id` (all events when `None`) in chain order.
pub fn load_events(conn: &Connection, after_id: Option<i64>) -> SealResult<Vec<AuditEvent>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM audit_events WHERE id > ?1 ORDER BY id"
        ))
        .storage()?;
    let events = stmt
        .query_map(params![after_id.unwrap_or(0)], event_from_row)
        .storage()?
        .collect::<Result<Vec<_>, _>>()
        .storage()?;
    Ok(events)
}

pub fn find_event(conn: &Connection, id: i64) -> SealResult<Option<AuditEvent>> {
    conn.query_row(
        &format!("SELECT {EVENT_COLUMNS} FROM audit_events WHERE id = ?1"),
        params![id],
        event_from_row,
    )
    .optional()
    .storage()
}

/// The event immediately before `id`, used to recompute a single seal.
pub fn predecessor_hash(conn: &Connection, id: i64) -> SealResult<String> {
    let prev: Option<String> = conn
        .query_row(
            "SELECT current_hash FROM audit_events WHERE id < ?1 ORDER BY id DESC LIMIT 1",
            params![id],
            |row| row.get(0),
        )
        .optional()
        .storage()?;
    Ok(prev.unwrap_or_else(|| AuditEvent::GENESIS_HASH.to_string()))
}

/// How much of the chain to verify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerifyScope {
    /// From genesis to head.
    Full,
    /// Every event after the one whose `current_hash` is `anchor_hash`.
    Since { anchor_hash: String },
}

impl VerifyScope {
    pub fn label(&self) -> String {
        match self {
            VerifyScope::Full => "full".to_string(),
            VerifyScope::Since { anchor_hash } => format!("since:{anchor_hash}"),
        }
    }
}

/// Load the events covered by `scope` and walk them.
pub fn verify(conn: &Connection, scope: &VerifyScope) -> SealResult<ChainReport> {
    let report = match scope {
        VerifyScope::Full => {
            let events = load_events(conn, None)?;
            verify_segment(&events, AuditEvent::GENESIS_HASH)
        }
        VerifyScope::Since { anchor_hash } => {
            let anchor_id: Option<i64> = conn
                .query_row(
                    "SELECT id FROM audit_events WHERE current_hash = ?1",
                    params![anchor_hash],
                    |row| row.get(0),
                )
                .optional()
                .storage()?;
            let anchor_id = anchor_id.ok_or_else(|| SealError::NotFound {
                kind: "ledger anchor",
                id: anchor_hash.clone(),
            })?;
            let events = load_events(conn, Some(anchor_id))?;
            verify_segment(&events, anchor_hash)
        }
    };
    Ok(report)
}

// ── Service ───────────────────────────────────────────────────────────────────

/// Ledger operations that run in their own transaction.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<Store>,
}

impl Ledger {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn append(&self, payload: &EventPayload, actor_id: &str) -> SealResult<AuditEvent> {
        self.store.write(|tx| append(tx, payload, actor_id))
    }

    pub fn head(&self) -> SealResult<ChainHead> {
        self.store.read(head)
    }

    pub fn events(&self) -> SealResult<Vec<AuditEvent>> {
        self.store.read(|conn| load_events(conn, None))
    }

    /// Verify without writing anything.
    pub fn verify(&self, scope: &VerifyScope) -> SealResult<ChainReport> {
        let report = self.store.read(|conn| verify(conn, scope))?;
        log_report(scope, &report);
        Ok(report)
    }

    /// Verify and seal the outcome as a `verification-run` event, in one
    /// transaction.  A failed verification is still recorded; the report is
    /// returned either way.
    pub fn audit(&self, scope: &VerifyScope, actor_id: &str) -> SealResult<ChainReport> {
        let report = self.store.write(|tx| {
            let report = verify(tx, scope)?;
            let payload = EventPayload::VerificationRun(VerificationRun {
                scope: scope.label(),
                valid: report.valid,
                events_checked: report.events_checked,
                broken_at: report.broken_at,
            });
            append(tx, &payload, actor_id)?;
            Ok(report)
        })?;
        log_report(scope, &report);
        Ok(report)
    }
}

fn log_report(scope: &VerifyScope, report: &ChainReport) {
    if report.valid {
        info!(
            scope = %scope.label(),
            events_checked = report.events_checked,
            "ledger verification passed"
        );
    } else {
        warn!(
            scope = %scope.label(),
            broken_at = ?report.broken_at,
            fault = ?report.fault,
            unverified = report.unverified,
            "ledger verification FAILED"
        );
    }
}
