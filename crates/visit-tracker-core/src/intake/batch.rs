//! Batch upsert of visit records.

use serde::Serialize;

use crate::db::{Database, UpsertOutcome};
use crate::models::VisitRecord;

/// Per-record failure inside a batch.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecordError {
    pub identifier: String,
    pub message: String,
}

/// Counts and failures for one batch.
///
/// `new_count + updated_count + errors.len()` always equals the batch size.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BatchOutcome {
    pub new_count: usize,
    pub updated_count: usize,
    pub errors: Vec<RecordError>,
}

impl BatchOutcome {
    /// Number of records the batch accounted for.
    pub fn processed(&self) -> usize {
        self.new_count + self.updated_count + self.errors.len()
    }
}

/// Upsert each record in input order.
///
/// Records are processed one at a time so each sees the department list left
/// by the previous one. A failing record is logged and recorded; it never
/// stops the batch.
pub fn process_batch(db: &mut Database, records: &[VisitRecord]) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();

    for record in records {
        match db.upsert_visit(record) {
            Ok(UpsertOutcome { created: true, .. }) => outcome.new_count += 1,
            Ok(UpsertOutcome { created: false, .. }) => outcome.updated_count += 1,
            Err(e) => {
                tracing::warn!(
                    identifier = %record.identifier,
                    error = %e,
                    "Failed to process visit record"
                );
                outcome.errors.push(RecordError {
                    identifier: record.identifier.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        new = outcome.new_count,
        updated = outcome.updated_count,
        failed = outcome.errors.len(),
        "Batch processed"
    );
    outcome
}
