//! Double-entry validation, run before any write is attempted.

use sealbook_contracts::{
    error::{SealError, SealResult},
    journal::JournalLine,
    money::Cents,
};

/// Validate `lines` and return `(total_debit, total_credit)`.
///
/// Rules, checked in order:
///
/// 1. At least two lines.
/// 2. Every line names an account.
/// 3. No negative amounts.
/// 4. Exactly one of debit/credit is non-zero on every line.
/// 5. Total debits equal total credits, in exact cents.
pub fn validate_lines(lines: &[JournalLine]) -> SealResult<(Cents, Cents)> {
    if lines.len() < 2 {
        return Err(SealError::InvalidInput {
            reason: format!(
                "a journal entry needs at least two lines, got {}",
                lines.len()
            ),
        });
    }

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        let invalid = |reason: &str| SealError::InvalidLine {
            line: line_no,
            reason: reason.to_string(),
        };

        if line.account_code.trim().is_empty() {
            return Err(invalid("account code is empty"));
        }
        if line.debit.is_negative() || line.credit.is_negative() {
            return Err(invalid("amounts must not be negative"));
        }
        match (line.debit.is_zero(), line.credit.is_zero()) {
            (true, true) => return Err(invalid("line has neither a debit nor a credit")),
            (false, false) => return Err(invalid("line has both a debit and a credit")),
            _ => {}
        }
    }

    let total_debit = Cents::checked_sum(lines.iter().map(|l| l.debit))?;
    let total_credit = Cents::checked_sum(lines.iter().map(|l| l.credit))?;

    if total_debit != total_credit {
        return Err(SealError::UnbalancedEntry {
            total_debit,
            total_credit,
        });
    }

    Ok((total_debit, total_credit))
}
