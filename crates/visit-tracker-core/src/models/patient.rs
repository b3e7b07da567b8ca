//! Patient models.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A patient record, one row per unique identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    /// Store-assigned serial number
    pub patient_id: i64,
    /// 12-digit national ID, the deduplication key
    pub identifier: String,
    /// Patient name
    pub name: String,
    /// Age in years
    pub age: Option<u32>,
    /// Gender as entered (M/F/O in practice)
    pub gender: Option<String>,
    /// Postal address
    pub address: Option<String>,
    /// Contact number
    pub phone: Option<String>,
    /// Distinct departments in order of first visit
    pub departments_visited: Vec<String>,
    /// Creation timestamp (RFC 3339, UTC)
    pub created_at: String,
    /// Last department append (RFC 3339, UTC)
    pub updated_at: String,
}

impl Patient {
    /// Number of distinct departments visited.
    ///
    /// This is the only definition of a visit count; nothing else is stored.
    pub fn visit_count(&self) -> usize {
        self.departments_visited.len()
    }

    /// Check whether a department is already on the visit list.
    pub fn has_department(&self, department: &str) -> bool {
        contains_department(&self.departments_visited, department)
    }

    /// Department list joined the way the upload format writes it.
    pub fn departments_joined(&self) -> String {
        self.departments_visited.join(", ")
    }
}

/// A candidate visit, shaped but not yet checked against the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VisitRecord {
    pub identifier: String,
    pub name: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    /// Department seen on this visit
    pub department: String,
}

impl VisitRecord {
    /// Create a record with the required fields only.
    pub fn new(
        identifier: impl Into<String>,
        name: impl Into<String>,
        department: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            department: department.into(),
            ..Self::default()
        }
    }
}

/// Comparison key for department deduplication.
pub fn department_key(department: &str) -> String {
    department.trim().to_lowercase()
}

/// Check a department list for an entry equal to `department` after trimming,
/// ignoring case.
pub fn contains_department(departments: &[String], department: &str) -> bool {
    let key = department_key(department);
    departments.iter().any(|d| department_key(d) == key)
}

/// Format a timestamp the way the store persists it.
///
/// Second precision with a `Z` suffix keeps string order equal to time order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_patient(departments: &[&str]) -> Patient {
        Patient {
            patient_id: 1,
            identifier: "123456789012".into(),
            name: "John Doe".into(),
            age: Some(45),
            gender: Some("M".into()),
            address: None,
            phone: None,
            departments_visited: departments.iter().map(|d| d.to_string()).collect(),
            created_at: "2024-01-15T10:00:00Z".into(),
            updated_at: "2024-01-15T10:00:00Z".into(),
        }
    }

    #[test]
    fn test_visit_count_is_department_count() {
        assert_eq!(make_patient(&["Heart"]).visit_count(), 1);
        assert_eq!(make_patient(&["Heart", "ENT", "Fracture"]).visit_count(), 3);
    }

    #[test]
    fn test_has_department_ignores_case_and_whitespace() {
        let patient = make_patient(&["Heart", "ENT"]);
        assert!(patient.has_department("heart"));
        assert!(patient.has_department("  ENT "));
        assert!(!patient.has_department("Ortho"));
    }

    #[test]
    fn test_departments_joined() {
        let patient = make_patient(&["Heart", "ENT"]);
        assert_eq!(patient.departments_joined(), "Heart, ENT");
    }

    #[test]
    fn test_format_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 9, 5, 0).unwrap();
        assert_eq!(format_timestamp(at), "2024-01-15T09:05:00Z");
    }
}
