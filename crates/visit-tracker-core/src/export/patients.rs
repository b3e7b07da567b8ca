//! Patient list export.

use csv::Writer;
use thiserror::Error;

use crate::models::Patient;

/// Export errors.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV buffer error: {0}")]
    Buffer(String),
}

pub type ExportResult<T> = Result<T, ExportError>;

/// Column header of the CSV export.
pub const EXPORT_HEADER: [&str; 10] = [
    "PATIENT_ID",
    "AADHAR_NO",
    "NAME",
    "AGE",
    "GENDER",
    "ADDRESS",
    "PHONE",
    "VISIT_COUNT",
    "CREATED_AT",
    "DEPARTMENT_VISITED",
];

/// Render patients as CSV, one row per patient.
pub fn to_csv(patients: &[Patient]) -> ExportResult<String> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(EXPORT_HEADER)?;

    for patient in patients {
        writer.write_record([
            format!("{:05}", patient.patient_id),
            patient.identifier.clone(),
            patient.name.clone(),
            patient.age.map(|a| a.to_string()).unwrap_or_default(),
            patient.gender.clone().unwrap_or_default(),
            patient.address.clone().unwrap_or_default(),
            patient.phone.clone().unwrap_or_default(),
            patient.visit_count().to_string(),
            patient.created_at.clone(),
            patient.departments_joined(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Buffer(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ExportError::Buffer(e.to_string()))
}
