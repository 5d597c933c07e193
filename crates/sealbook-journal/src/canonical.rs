//! Canonical serializations of a journal entry.
//!
//! The `data_hash` sealed into the ledger is the SHA-256 of one of these
//! byte forms.  New entries use `CanonicalForm::Current`.  Entries migrated
//! from the v1 schema were sealed over the `Legacy` pipe-delimited text, which
//! did not include the transaction date.  Verification tries each form in
//! `CanonicalForm::ALL` order.

use serde::Serialize;

use sealbook_contracts::{
    error::SealResult,
    journal::{CanonicalForm, JournalLine},
    money::Cents,
};
use sealbook_core::crypto::sha256_hex;

/// The sealed fields of an entry, independent of where they came from
/// (a fresh draft or stored rows).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryContent {
    pub entry_number: String,
    pub description: String,
    /// Already formatted with `time::format_timestamp`.
    pub transaction_date: String,
    pub total_debit: Cents,
    pub total_credit: Cents,
    pub created_by: String,
    /// In posting order.
    pub lines: Vec<JournalLine>,
}

#[derive(Serialize)]
struct CurrentHeader<'a> {
    entry_number: &'a str,
    description: &'a str,
    transaction_date: &'a str,
    total_debit: i64,
    total_credit: i64,
    created_by: &'a str,
    lines: Vec<CurrentLine<'a>>,
}

#[derive(Serialize)]
struct CurrentLine<'a> {
    line_no: usize,
    account_code: &'a str,
    debit: i64,
    credit: i64,
    line_description: &'a str,
}

fn current_form(content: &EntryContent) -> SealResult<Vec<u8>> {
    let header = CurrentHeader {
        entry_number: &content.entry_number,
        description: &content.description,
        transaction_date: &content.transaction_date,
        total_debit: content.total_debit.value(),
        total_credit: content.total_credit.value(),
        created_by: &content.created_by,
        lines: content
            .lines
            .iter()
            .enumerate()
            .map(|(idx, line)| CurrentLine {
                line_no: idx + 1,
                account_code: &line.account_code,
                debit: line.debit.value(),
                credit: line.credit.value(),
                line_description: &line.line_description,
            })
            .collect(),
    };
    Ok(serde_json::to_vec(&header)?)
}

/// `number|description|debit|credit|created_by`, then one
/// `\naccount|debit|credit|description` per line.
fn legacy_form(content: &EntryContent) -> Vec<u8> {
    let mut text = format!(
        "{}|{}|{}|{}|{}",
        content.entry_number,
        content.description,
        content.total_debit.value(),
        content.total_credit.value(),
        content.created_by
    );
    for line in &content.lines {
        text.push_str(&format!(
            "\n{}|{}|{}|{}",
            line.account_code,
            line.debit.value(),
            line.credit.value(),
            line.line_description
        ));
    }
    text.into_bytes()
}

pub fn canonicalize(form: CanonicalForm, content: &EntryContent) -> SealResult<Vec<u8>> {
    match form {
        CanonicalForm::Current => current_form(content),
        CanonicalForm::Legacy => Ok(legacy_form(content)),
    }
}

pub fn data_hash(form: CanonicalForm, content: &EntryContent) -> SealResult<String> {
    Ok(sha256_hex(&canonicalize(form, content)?))
}

/// First form, in `CanonicalForm::ALL` order, whose hash equals `sealed`.
pub fn matching_form(content: &EntryContent, sealed: &str) -> SealResult<Option<CanonicalForm>> {
    for form in CanonicalForm::ALL {
        if data_hash(form, content)? == sealed {
            return Ok(Some(form));
        }
    }
    Ok(None)
}
