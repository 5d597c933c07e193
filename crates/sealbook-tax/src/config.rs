//! Jurisdiction seed tables loaded from TOML.
//!
//! ```toml
//! [[jurisdictions]]
//! code = "CA-ON"
//! display_name = "Ontario HST"
//! base_rate_bps = 500
//! surtax_rate_bps = 800
//! effective_date = "2024-01-01"
//! ```
//!
//! Rates are unsigned, so a negative rate fails at parse time.

use std::path::Path;

use serde::{Deserialize, Serialize};

use sealbook_contracts::{
    error::{SealError, SealResult},
    tax::TaxJurisdiction,
};

/// Lookup key form: trimmed and upper-cased.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Check one jurisdiction and return it with its code normalized.
pub fn validate_jurisdiction(mut jurisdiction: TaxJurisdiction) -> SealResult<TaxJurisdiction> {
    jurisdiction.code = normalize_code(&jurisdiction.code);

    if jurisdiction.code.is_empty() {
        return Err(SealError::InvalidInput {
            reason: "jurisdiction code is empty".to_string(),
        });
    }
    if jurisdiction.display_name.trim().is_empty() {
        return Err(SealError::InvalidInput {
            reason: format!("jurisdiction '{}' has no display name", jurisdiction.code),
        });
    }
    if let Some(expiry) = jurisdiction.expiry_date {
        if expiry < jurisdiction.effective_date {
            return Err(SealError::InvalidInput {
                reason: format!(
                    "jurisdiction '{}' expires ({expiry}) before it takes effect ({})",
                    jurisdiction.code, jurisdiction.effective_date
                ),
            });
        }
    }
    Ok(jurisdiction)
}

/// A `[[jurisdictions]]` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JurisdictionTable {
    #[serde(default)]
    pub jurisdictions: Vec<TaxJurisdiction>,
}

impl JurisdictionTable {
    /// Parse and validate.  Any problem is a `ConfigError`.
    pub fn from_toml_str(s: &str) -> SealResult<Self> {
        let table: JurisdictionTable = toml::from_str(s).map_err(|e| SealError::ConfigError {
            reason: format!("failed to parse jurisdiction TOML: {}", e),
        })?;
        table.validated()
    }

    pub fn from_file(path: &Path) -> SealResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| SealError::ConfigError {
            reason: format!("failed to read jurisdiction file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Normalize every code and reject invalid or duplicate rows.
    pub fn validated(self) -> SealResult<Self> {
        let mut jurisdictions: Vec<TaxJurisdiction> = Vec::with_capacity(self.jurisdictions.len());
        for row in self.jurisdictions {
            let row = validate_jurisdiction(row).map_err(|e| SealError::ConfigError {
                reason: e.to_string(),
            })?;
            if jurisdictions.iter().any(|j| j.code == row.code) {
                return Err(SealError::ConfigError {
                    reason: format!("jurisdiction '{}' is defined twice", row.code),
                });
            }
            jurisdictions.push(row);
        }
        Ok(Self { jurisdictions })
    }
}
