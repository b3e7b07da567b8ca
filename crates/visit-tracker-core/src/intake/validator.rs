//! Visit record validation.
//!
//! Handles:
//! - Identifier normalization (strip everything that is not a digit)
//! - Required field checks (identifier, name, department)
//! - Trimming of free-text fields before they reach the store

use serde::Serialize;

use crate::models::VisitRecord;

/// Required identifier length, in digits.
pub const IDENTIFIER_LEN: usize = 12;

/// Outcome of validating a single record.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Validation {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Strip all non-digit characters from a raw identifier.
pub fn normalize_identifier(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Check that an identifier is exactly [`IDENTIFIER_LEN`] ASCII digits.
pub fn is_valid_identifier(identifier: &str) -> bool {
    identifier.len() == IDENTIFIER_LEN && identifier.bytes().all(|b| b.is_ascii_digit())
}

/// Validate required fields. Optional fields are not checked.
pub fn validate(record: &VisitRecord) -> Validation {
    let mut errors = Vec::new();

    if !is_valid_identifier(&record.identifier) {
        errors.push(format!(
            "Aadhar number must be exactly {IDENTIFIER_LEN} digits"
        ));
    }
    if record.name.trim().is_empty() {
        errors.push("Name is required".to_string());
    }
    if record.department.trim().is_empty() {
        errors.push("Department is required".to_string());
    }

    Validation {
        valid: errors.is_empty(),
        errors,
    }
}

/// Normalize a record and validate it.
///
/// Every entry path (upload, single add, bulk add) goes through here, so the
/// same person always reaches the store under the same identifier.
pub fn prepare(record: VisitRecord) -> Result<VisitRecord, Vec<String>> {
    let record = VisitRecord {
        identifier: normalize_identifier(&record.identifier),
        name: record.name.trim().to_string(),
        age: record.age,
        gender: clean_optional(record.gender),
        address: clean_optional(record.address),
        phone: clean_optional(record.phone),
        department: record.department.trim().to_string(),
    };

    let validation = validate(&record);
    if validation.valid {
        Ok(record)
    } else {
        Err(validation.errors)
    }
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
