//! Exact integer-cents money.
//!
//! Every amount in the ledger is a whole number of cents held in an `i64`.
//! There is no floating point anywhere in the money path.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SealError, SealResult};

/// A monetary amount in integer cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cents(pub i64);

impl Cents {
    pub const ZERO: Cents = Cents(0);

    pub const fn new(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn value(self) -> i64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Cents) -> Option<Cents> {
        self.0.checked_add(other.0).map(Cents)
    }

    /// Sum an iterator of amounts, failing instead of wrapping on overflow.
    pub fn checked_sum<I: IntoIterator<Item = Cents>>(amounts: I) -> SealResult<Cents> {
        amounts
            .into_iter()
            .try_fold(Cents::ZERO, |acc, c| acc.checked_add(c))
            .ok_or_else(|| SealError::InvalidAmount {
                reason: "sum of amounts overflows 64-bit cents".to_string(),
            })
    }
}

impl From<i64> for Cents {
    fn from(v: i64) -> Self {
        Cents(v)
    }
}

/// Formats as a decimal major-unit string, e.g. `1234` → `"12.34"`.
impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

/// Parses `"12"`, `"12.3"`, `"12.34"` or `"-0.05"`.  More than two decimal
/// places is rejected rather than rounded.
impl FromStr for Cents {
    type Err = SealError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| SealError::InvalidAmount {
            reason: format!("'{s}': {reason}"),
        };

        let trimmed = s.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        if body.is_empty() {
            return Err(invalid("empty amount"));
        }

        let (major, minor) = match body.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (body, ""),
        };
        if minor.len() > 2 {
            return Err(invalid("amounts must be whole cents"));
        }
        if major.is_empty() || !major.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("not a decimal number"));
        }
        if !minor.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("not a decimal number"));
        }

        let major: i64 = major.parse().map_err(|_| invalid("too large"))?;
        let minor: i64 = match minor.len() {
            0 => 0,
            1 => minor.parse::<i64>().map_err(|_| invalid("not a decimal number"))? * 10,
            _ => minor.parse().map_err(|_| invalid("not a decimal number"))?,
        };

        let cents = major
            .checked_mul(100)
            .and_then(|v| v.checked_add(minor))
            .ok_or_else(|| invalid("too large"))?;

        Ok(Cents(if negative { -cents } else { cents }))
    }
}
