//! Patient database operations.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use super::{Database, DbError, DbResult};
use crate::models::{contains_department, format_timestamp, Patient, VisitRecord};

const PATIENT_COLUMNS: &str = "patient_id, identifier, name, age, gender, address, phone, \
                               departments_visited, created_at, updated_at";

/// Result of an atomic create-or-append.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    /// Patient state after the operation
    pub patient: Patient,
    /// True if this call created the patient
    pub created: bool,
}

impl Database {
    /// Get a patient by identifier.
    pub fn find_by_identifier(&self, identifier: &str) -> DbResult<Option<Patient>> {
        find_patient(&self.conn, identifier)
    }

    /// Insert a new patient from a validated visit record.
    ///
    /// Fails with [`DbError::Conflict`] if the identifier already exists.
    pub fn create_patient(&self, record: &VisitRecord) -> DbResult<Patient> {
        self.create_patient_at(record, Utc::now())
    }

    /// Insert a new patient with an explicit creation time.
    pub fn create_patient_at(&self, record: &VisitRecord, at: DateTime<Utc>) -> DbResult<Patient> {
        insert_patient(&self.conn, record, at)
    }

    /// Add a department to a patient's visit history unless already present.
    pub fn append_department_visit(
        &mut self,
        identifier: &str,
        department: &str,
    ) -> DbResult<Patient> {
        self.append_department_visit_at(identifier, department, Utc::now())
    }

    /// Append a department visit with an explicit update time.
    ///
    /// Runs as one IMMEDIATE transaction so concurrent writers cannot lose
    /// an append between the read and the write.
    pub fn append_department_visit_at(
        &mut self,
        identifier: &str,
        department: &str,
        at: DateTime<Utc>,
    ) -> DbResult<Patient> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let patient = find_patient(&tx, identifier)?
            .ok_or_else(|| DbError::NotFound(identifier.to_string()))?;
        let patient = append_department(&tx, patient, department, at)?;
        tx.commit()?;
        Ok(patient)
    }

    /// Create the patient or append the visit's department, atomically.
    pub fn upsert_visit(&mut self, record: &VisitRecord) -> DbResult<UpsertOutcome> {
        self.upsert_visit_at(record, Utc::now())
    }

    /// Create-or-append with an explicit timestamp.
    ///
    /// Lookup and write share one IMMEDIATE transaction keyed on the
    /// identifier. Demographics are only taken from `record` on creation.
    pub fn upsert_visit_at(
        &mut self,
        record: &VisitRecord,
        at: DateTime<Utc>,
    ) -> DbResult<UpsertOutcome> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let outcome = match find_patient(&tx, &record.identifier)? {
            Some(existing) => UpsertOutcome {
                patient: append_department(&tx, existing, &record.department, at)?,
                created: false,
            },
            None => UpsertOutcome {
                patient: insert_patient(&tx, record, at)?,
                created: true,
            },
        };

        tx.commit()?;
        Ok(outcome)
    }

    /// List all patients ordered by identifier.
    pub fn list_all(&self) -> DbResult<Vec<Patient>> {
        self.query_patients("ORDER BY identifier", [])
    }

    /// List patients with the most department visits first.
    pub fn list_by_visit_count(&self) -> DbResult<Vec<Patient>> {
        self.query_patients(
            "ORDER BY json_array_length(departments_visited) DESC, identifier",
            [],
        )
    }

    /// List patients created on a UTC calendar day, newest first.
    pub fn list_created_on(&self, date: NaiveDate) -> DbResult<Vec<Patient>> {
        self.list_created_between(date, date)
    }

    /// List patients created between two UTC days (inclusive), newest first.
    pub fn list_created_between(&self, start: NaiveDate, end: NaiveDate) -> DbResult<Vec<Patient>> {
        if start > end {
            return Err(DbError::InvalidRange { start, end });
        }

        let lower = format!("{}T00:00:00Z", start.format("%Y-%m-%d"));
        let upper = format!("{}T23:59:59Z", end.format("%Y-%m-%d"));

        self.query_patients(
            "WHERE created_at >= ?1 AND created_at <= ?2 ORDER BY created_at DESC, patient_id DESC",
            params![lower, upper],
        )
    }

    /// Total number of patients.
    pub fn count_patients(&self) -> DbResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Delete a patient. Administrative use only.
    pub fn delete_patient(&self, identifier: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM patients WHERE identifier = ?", [identifier])?;
        Ok(rows_affected > 0)
    }

    fn query_patients<P: rusqlite::Params>(&self, tail: &str, params: P) -> DbResult<Vec<Patient>> {
        let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients {tail}");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params, PatientRow::from_row)?;

        let mut patients = Vec::new();
        for row in rows {
            patients.push(row?.try_into()?);
        }
        Ok(patients)
    }
}

fn find_patient(conn: &Connection, identifier: &str) -> DbResult<Option<Patient>> {
    conn.query_row(
        &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE identifier = ?"),
        [identifier],
        PatientRow::from_row,
    )
    .optional()?
    .map(|row| row.try_into())
    .transpose()
}

fn insert_patient(conn: &Connection, record: &VisitRecord, at: DateTime<Utc>) -> DbResult<Patient> {
    let departments = vec![record.department.trim().to_string()];
    let departments_json = serde_json::to_string(&departments)?;
    let timestamp = format_timestamp(at);

    conn.execute(
        r#"
        INSERT INTO patients (
            identifier, name, age, gender, address, phone,
            departments_visited, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            record.identifier,
            record.name,
            record.age,
            record.gender,
            record.address,
            record.phone,
            departments_json,
            timestamp,
            timestamp,
        ],
    )
    .map_err(|e| DbError::from_insert(e, &record.identifier))?;

    Ok(Patient {
        patient_id: conn.last_insert_rowid(),
        identifier: record.identifier.clone(),
        name: record.name.clone(),
        age: record.age,
        gender: record.gender.clone(),
        address: record.address.clone(),
        phone: record.phone.clone(),
        departments_visited: departments,
        created_at: timestamp.clone(),
        updated_at: timestamp,
    })
}

fn append_department(
    conn: &Connection,
    mut patient: Patient,
    department: &str,
    at: DateTime<Utc>,
) -> DbResult<Patient> {
    let department = department.trim();
    if contains_department(&patient.departments_visited, department) {
        tracing::debug!(
            identifier = %patient.identifier,
            department,
            "Department already recorded, skipping"
        );
        return Ok(patient);
    }

    patient.departments_visited.push(department.to_string());
    patient.updated_at = format_timestamp(at);

    conn.execute(
        "UPDATE patients SET departments_visited = ?2, updated_at = ?3 WHERE identifier = ?1",
        params![
            patient.identifier,
            serde_json::to_string(&patient.departments_visited)?,
            patient.updated_at,
        ],
    )?;

    tracing::debug!(
        identifier = %patient.identifier,
        department,
        "Department visit appended"
    );
    Ok(patient)
}

/// Raw row before the department list is decoded.
struct PatientRow {
    patient_id: i64,
    identifier: String,
    name: String,
    age: Option<u32>,
    gender: Option<String>,
    address: Option<String>,
    phone: Option<String>,
    departments_visited: String,
    created_at: String,
    updated_at: String,
}

impl PatientRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            patient_id: row.get(0)?,
            identifier: row.get(1)?,
            name: row.get(2)?,
            age: row.get(3)?,
            gender: row.get(4)?,
            address: row.get(5)?,
            phone: row.get(6)?,
            departments_visited: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

impl TryFrom<PatientRow> for Patient {
    type Error = DbError;

    fn try_from(row: PatientRow) -> Result<Self, Self::Error> {
        Ok(Patient {
            patient_id: row.patient_id,
            identifier: row.identifier,
            name: row.name,
            age: row.age,
            gender: row.gender,
            address: row.address,
            phone: row.phone,
            departments_visited: serde_json::from_str(&row.departments_visited)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 10, 30, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_create_and_find() {
        let db = setup_db();

        let mut record = VisitRecord::new("123456789012", "John Doe", "Heart");
        record.age = Some(45);
        record.gender = Some("M".into());

        let created = db.create_patient(&record).unwrap();
        assert!(created.patient_id > 0);

        let found = db.find_by_identifier("123456789012").unwrap().unwrap();
        assert_eq!(found, created);
        assert_eq!(found.age, Some(45));
        assert_eq!(found.departments_visited, vec!["Heart".to_string()]);
        assert_eq!(found.visit_count(), 1);
    }

    #[test]
    fn test_find_missing() {
        let db = setup_db();
        assert!(db.find_by_identifier("123456789012").unwrap().is_none());
    }

    #[test]
    fn test_create_duplicate_is_conflict() {
        let db = setup_db();
        let record = VisitRecord::new("123456789012", "John Doe", "Heart");

        db.create_patient(&record).unwrap();
        let err = db.create_patient(&record).unwrap_err();
        assert!(matches!(err, DbError::Conflict(id) if id == "123456789012"));
    }

    #[test]
    fn test_append_department() {
        let mut db = setup_db();
        db.create_patient(&VisitRecord::new("123456789012", "John Doe", "Heart"))
            .unwrap();

        let updated = db.append_department_visit("123456789012", "ENT").unwrap();
        assert_eq!(updated.departments_visited, vec!["Heart", "ENT"]);

        let stored = db.find_by_identifier("123456789012").unwrap().unwrap();
        assert_eq!(stored.departments_visited, vec!["Heart", "ENT"]);
    }

    #[test]
    fn test_append_department_is_idempotent() {
        let mut db = setup_db();
        db.create_patient_at(&VisitRecord::new("123456789012", "John Doe", "Heart"), day(2024, 1, 15))
            .unwrap();

        let first = db
            .append_department_visit_at("123456789012", "ENT", day(2024, 1, 16))
            .unwrap();
        let second = db
            .append_department_visit_at("123456789012", " ent ", day(2024, 1, 17))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(second.departments_visited, vec!["Heart", "ENT"]);
        assert_eq!(second.updated_at, "2024-01-16T10:30:00Z");
    }

    #[test]
    fn test_append_department_not_found() {
        let mut db = setup_db();
        let err = db.append_department_visit("123456789012", "ENT").unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[test]
    fn test_upsert_creates_then_appends() {
        let mut db = setup_db();

        let first = db
            .upsert_visit(&VisitRecord::new("123456789012", "John Doe", "Heart"))
            .unwrap();
        assert!(first.created);

        let mut repeat = VisitRecord::new("123456789012", "Johnny", "Fracture");
        repeat.age = Some(99);
        let second = db.upsert_visit(&repeat).unwrap();
        assert!(!second.created);
        assert_eq!(second.patient.patient_id, first.patient.patient_id);
        assert_eq!(second.patient.departments_visited, vec!["Heart", "Fracture"]);

        // Demographics are fixed at creation
        assert_eq!(second.patient.name, "John Doe");
        assert_eq!(second.patient.age, None);
    }

    #[test]
    fn test_list_all_ordered_by_identifier() {
        let db = setup_db();
        db.create_patient(&VisitRecord::new("300000000000", "C", "Heart")).unwrap();
        db.create_patient(&VisitRecord::new("100000000000", "A", "Heart")).unwrap();
        db.create_patient(&VisitRecord::new("200000000000", "B", "Heart")).unwrap();

        let ids: Vec<String> = db.list_all().unwrap().into_iter().map(|p| p.identifier).collect();
        assert_eq!(ids, vec!["100000000000", "200000000000", "300000000000"]);
    }

    #[test]
    fn test_list_by_visit_count() {
        let mut db = setup_db();
        db.upsert_visit(&VisitRecord::new("100000000000", "A", "Heart")).unwrap();
        db.upsert_visit(&VisitRecord::new("200000000000", "B", "Heart")).unwrap();
        db.upsert_visit(&VisitRecord::new("200000000000", "B", "ENT")).unwrap();
        db.upsert_visit(&VisitRecord::new("200000000000", "B", "Ortho")).unwrap();
        db.upsert_visit(&VisitRecord::new("300000000000", "C", "Heart")).unwrap();
        db.upsert_visit(&VisitRecord::new("300000000000", "C", "ENT")).unwrap();

        let patients = db.list_by_visit_count().unwrap();
        let counts: Vec<(String, usize)> = patients
            .iter()
            .map(|p| (p.identifier.clone(), p.visit_count()))
            .collect();
        assert_eq!(
            counts,
            vec![
                ("200000000000".to_string(), 3),
                ("300000000000".to_string(), 2),
                ("100000000000".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_list_created_on_and_between() {
        let db = setup_db();
        db.create_patient_at(&VisitRecord::new("100000000000", "A", "Heart"), day(2024, 1, 14))
            .unwrap();
        db.create_patient_at(&VisitRecord::new("200000000000", "B", "Heart"), day(2024, 1, 15))
            .unwrap();
        db.create_patient_at(&VisitRecord::new("300000000000", "C", "Heart"), day(2024, 1, 16))
            .unwrap();

        let on_15 = db.list_created_on(date(2024, 1, 15)).unwrap();
        assert_eq!(on_15.len(), 1);
        assert_eq!(on_15[0].identifier, "200000000000");

        let range = db
            .list_created_between(date(2024, 1, 15), date(2024, 1, 16))
            .unwrap();
        let ids: Vec<&str> = range.iter().map(|p| p.identifier.as_str()).collect();
        assert_eq!(ids, vec!["300000000000", "200000000000"]);
    }

    #[test]
    fn test_list_created_between_empty_day() {
        let db = setup_db();
        db.create_patient_at(&VisitRecord::new("100000000000", "A", "Heart"), day(2024, 1, 14))
            .unwrap();

        let result = db
            .list_created_between(date(2024, 2, 1), date(2024, 2, 1))
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_list_created_between_inverted_range() {
        let db = setup_db();
        let err = db
            .list_created_between(date(2024, 2, 2), date(2024, 2, 1))
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidRange { .. }));
    }

    #[test]
    fn test_count_and_delete() {
        let db = setup_db();
        db.create_patient(&VisitRecord::new("100000000000", "A", "Heart")).unwrap();
        db.create_patient(&VisitRecord::new("200000000000", "B", "Heart")).unwrap();
        assert_eq!(db.count_patients().unwrap(), 2);

        assert!(db.delete_patient("100000000000").unwrap());
        assert!(!db.delete_patient("100000000000").unwrap());
        assert_eq!(db.count_patients().unwrap(), 1);
    }
}
