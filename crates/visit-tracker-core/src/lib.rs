//! Visit Tracker Core Library
//!
//! Hospital visit tracking with one patient row per national identifier.
//!
//! # Architecture
//!
//! ```text
//!   CSV/TXT upload        Manual entry         Bulk entry
//!         │                    │                    │
//!     [parser]                 │                    │
//!         │                    ▼                    ▼
//!         └──────────► validator::prepare ◄─────────┘
//!                              │
//!                      [batch, in order]
//!                              │
//!              ┌───────────────▼───────────────┐
//!              │   Database::upsert_visit      │
//!              │   one IMMEDIATE transaction:  │
//!              │   create, or append dept      │
//!              │   if not already listed       │
//!              └───────────────┬───────────────┘
//!                              │
//!              lookups · listings · stats · CSV export
//! ```
//!
//! # Core Principle
//!
//! **A patient is created once and only ever gains departments.** Repeat
//! sightings never duplicate a row, never duplicate a department and never
//! overwrite demographics.
//!
//! # Modules
//!
//! - [`db`]: SQLite patient store
//! - [`models`]: Domain types (Patient, VisitRecord, VisitInput)
//! - [`intake`]: Validation, file parsing and batch upsert
//! - [`export`]: CSV export

pub mod db;
pub mod export;
pub mod intake;
pub mod models;

// Re-export commonly used types
pub use db::{Database, DbError, UpsertOutcome};
pub use intake::{BatchOutcome, FileFormat, LineError, ParseSummary, RecordError};
pub use models::{Patient, VisitInput, VisitRecord};

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use serde::Serialize;

// =========================================================================
// Error Type
// =========================================================================

#[derive(Debug, thiserror::Error)]
pub enum VisitTrackerError {
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No valid patient records found")]
    NoValidRecords(Vec<BulkValidationError>),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Parse error: {0}")]
    Parse(#[from] intake::ParseError),

    #[error("Patient not found: {0}")]
    NotFound(String),

    #[error("Patient already exists: {0}")]
    Conflict(String),

    #[error("Invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Export error: {0}")]
    Export(#[from] export::ExportError),

    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl From<DbError> for VisitTrackerError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(id) => VisitTrackerError::NotFound(id),
            DbError::Conflict(id) => VisitTrackerError::Conflict(id),
            DbError::InvalidRange { start, end } => VisitTrackerError::InvalidRange { start, end },
            other => VisitTrackerError::Storage(other.to_string()),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for VisitTrackerError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        VisitTrackerError::LockPoisoned
    }
}

pub type VisitTrackerResult<T> = Result<T, VisitTrackerError>;

// =========================================================================
// Outcome Types
// =========================================================================

/// Result of a single manual entry.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AddVisitOutcome {
    pub is_new: bool,
    pub patient: Patient,
}

/// A rejected entry in a bulk submission.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BulkValidationError {
    /// Position in the submitted list
    pub index: usize,
    /// Identifier after normalization
    pub identifier: String,
    pub errors: Vec<String>,
}

/// Result of a bulk manual entry.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BulkOutcome {
    pub total_received: usize,
    pub valid_records: usize,
    pub invalid_records: usize,
    pub validation_errors: Vec<BulkValidationError>,
    pub batch: BatchOutcome,
}

/// Result of a file upload.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImportOutcome {
    pub file_name: String,
    pub summary: ParseSummary,
    pub line_errors: Vec<LineError>,
    pub batch: BatchOutcome,
}

/// Aggregate statistics.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Stats {
    pub total_patients: u64,
}

/// Row order for listings and exports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PatientOrder {
    #[default]
    Identifier,
    VisitCount,
}

impl FromStr for PatientOrder {
    type Err = VisitTrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "identifier" | "aadhar" => Ok(PatientOrder::Identifier),
            "visits" | "visit_count" => Ok(PatientOrder::VisitCount),
            other => Err(VisitTrackerError::InvalidInput(format!(
                "Unknown sort order: {other}"
            ))),
        }
    }
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe handle over the patient store.
///
/// Cloning shares the same connection. Every operation holds the lock for its
/// whole duration, so batches never interleave their store operations.
#[derive(Clone)]
pub struct VisitTracker {
    db: Arc<Mutex<Database>>,
}

impl VisitTracker {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> VisitTrackerResult<Self> {
        Ok(Self::from_database(Database::open(path)?))
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory() -> VisitTrackerResult<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    /// Wrap an already-open database.
    pub fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    // =========================================================================
    // Intake Operations
    // =========================================================================

    /// Record a single visit: create the patient or append the department.
    ///
    /// Validation failures leave the store untouched.
    pub fn add_visit(&self, input: VisitInput) -> VisitTrackerResult<AddVisitOutcome> {
        let record = intake::prepare(input.into()).map_err(VisitTrackerError::Validation)?;

        let mut db = self.db.lock()?;
        let outcome = db.upsert_visit(&record)?;

        if outcome.created {
            tracing::info!(identifier = %record.identifier, "Created new patient");
        } else {
            tracing::info!(identifier = %record.identifier, "Updated visit for existing patient");
        }

        Ok(AddVisitOutcome {
            is_new: outcome.created,
            patient: outcome.patient,
        })
    }

    /// Record several visits. Invalid entries are reported, valid ones are
    /// processed in submission order.
    pub fn add_bulk_visits(&self, inputs: Vec<VisitInput>) -> VisitTrackerResult<BulkOutcome> {
        if inputs.is_empty() {
            return Err(VisitTrackerError::InvalidInput(
                "Expected a non-empty array of patients".into(),
            ));
        }

        let total_received = inputs.len();
        let mut records = Vec::with_capacity(total_received);
        let mut validation_errors = Vec::new();

        for (index, input) in inputs.into_iter().enumerate() {
            let record: VisitRecord = input.into();
            let identifier = intake::normalize_identifier(&record.identifier);
            match intake::prepare(record) {
                Ok(record) => records.push(record),
                Err(errors) => validation_errors.push(BulkValidationError {
                    index,
                    identifier,
                    errors,
                }),
            }
        }

        if records.is_empty() {
            return Err(VisitTrackerError::NoValidRecords(validation_errors));
        }

        tracing::info!(
            received = total_received,
            valid = records.len(),
            "Processing bulk manual entry"
        );

        let batch = {
            let mut db = self.db.lock()?;
            intake::process_batch(&mut db, &records)
        };

        Ok(BulkOutcome {
            total_received,
            valid_records: records.len(),
            invalid_records: validation_errors.len(),
            validation_errors,
            batch,
        })
    }

    /// Parse an uploaded `.csv`/`.txt` file and process its valid rows.
    pub fn import_file(&self, file_name: &str, bytes: &[u8]) -> VisitTrackerResult<ImportOutcome> {
        let format = FileFormat::from_file_name(file_name)
            .ok_or_else(|| VisitTrackerError::UnsupportedFormat(file_name.to_string()))?;

        tracing::info!(file_name, ?format, bytes = bytes.len(), "Processing uploaded file");

        let parsed = intake::parser::parse_bytes(bytes, format)?;
        let records = parsed.visit_records();

        let batch = {
            let mut db = self.db.lock()?;
            intake::process_batch(&mut db, &records)
        };

        Ok(ImportOutcome {
            file_name: file_name.to_string(),
            summary: parsed.summary,
            line_errors: parsed.errors,
            batch,
        })
    }

    // =========================================================================
    // Query Operations
    // =========================================================================

    /// Get a patient by identifier. Separators in `raw` are ignored.
    pub fn get_patient(&self, raw: &str) -> VisitTrackerResult<Patient> {
        let identifier = Self::parse_identifier(raw)?;
        let db = self.db.lock()?;
        db.find_by_identifier(&identifier)?
            .ok_or(VisitTrackerError::NotFound(identifier))
    }

    /// List all patients ordered by identifier.
    pub fn list_all(&self) -> VisitTrackerResult<Vec<Patient>> {
        Ok(self.db.lock()?.list_all()?)
    }

    /// List patients with the most department visits first.
    pub fn list_by_visit_count(&self) -> VisitTrackerResult<Vec<Patient>> {
        Ok(self.db.lock()?.list_by_visit_count()?)
    }

    /// List patients created today (UTC).
    pub fn list_today(&self) -> VisitTrackerResult<Vec<Patient>> {
        self.list_created_on(Utc::now().date_naive())
    }

    /// List patients created on a given UTC day.
    pub fn list_created_on(&self, date: NaiveDate) -> VisitTrackerResult<Vec<Patient>> {
        Ok(self.db.lock()?.list_created_on(date)?)
    }

    /// List patients created between two UTC days, inclusive.
    pub fn list_created_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> VisitTrackerResult<Vec<Patient>> {
        Ok(self.db.lock()?.list_created_between(start, end)?)
    }

    /// Aggregate statistics.
    pub fn stats(&self) -> VisitTrackerResult<Stats> {
        Ok(Stats {
            total_patients: self.db.lock()?.count_patients()?,
        })
    }

    // =========================================================================
    // Export / Admin Operations
    // =========================================================================

    /// Export all patients as CSV.
    pub fn export_csv(&self, order: PatientOrder) -> VisitTrackerResult<String> {
        let patients = match order {
            PatientOrder::Identifier => self.list_all()?,
            PatientOrder::VisitCount => self.list_by_visit_count()?,
        };
        Ok(export::to_csv(&patients)?)
    }

    /// Delete a patient. Administrative escape hatch, not part of normal flow.
    pub fn delete_patient(&self, raw: &str) -> VisitTrackerResult<()> {
        let identifier = Self::parse_identifier(raw)?;
        let deleted = self.db.lock()?.delete_patient(&identifier)?;
        if !deleted {
            return Err(VisitTrackerError::NotFound(identifier));
        }
        tracing::warn!(identifier = %identifier, "Deleted patient");
        Ok(())
    }

    fn parse_identifier(raw: &str) -> VisitTrackerResult<String> {
        let identifier = intake::normalize_identifier(raw);
        if intake::validator::is_valid_identifier(&identifier) {
            Ok(identifier)
        } else {
            Err(VisitTrackerError::InvalidInput(format!(
                "Aadhar number must be exactly {} digits",
                intake::validator::IDENTIFIER_LEN
            )))
        }
    }
}
