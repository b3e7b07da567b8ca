//! Intake integration tests.
//!
//! These tests drive uploads and manual entry end to end against a real
//! SQLite store.

use chrono::NaiveDate;
use proptest::prelude::*;

use visit_tracker_core::db::{Database, DbError};
use visit_tracker_core::intake::{normalize_identifier, prepare, process_batch, validate};
use visit_tracker_core::models::{VisitInput, VisitRecord};
use visit_tracker_core::{VisitTracker, VisitTrackerError};

const UPLOAD: &str = "\
AADHAR_NO,NAME,AGE,GENDER,ADDRESS,PHONE,DEPARTMENT_VISITED
123456789012,John Doe,45,M,123 Main St,9876543210,Heart
234567890123,Jane Smith,32,F,456 Park Ave,9876543211,Fracture
123456789012,John Doe,45,M,123 Main St,9876543210,ENT
12345,Broken Id,,,,,Heart
123456789012,John Doe,45,M,123 Main St,9876543210,heart
";

fn input(identifier: &str, name: &str, department: &str) -> VisitInput {
    VisitInput {
        identifier: Some(identifier.into()),
        name: Some(name.into()),
        department: Some(department.into()),
        ..VisitInput::default()
    }
}

#[test]
fn test_upload_end_to_end() {
    let tracker = VisitTracker::open_in_memory().unwrap();

    let outcome = tracker.import_file("daily.csv", UPLOAD.as_bytes()).unwrap();

    assert_eq!(outcome.summary.total_lines, 5);
    assert_eq!(outcome.summary.valid_lines, 4);
    assert_eq!(outcome.summary.invalid_lines, 1);
    assert_eq!(outcome.line_errors[0].line, 5);
    assert_eq!(outcome.batch.new_count, 2);
    assert_eq!(outcome.batch.updated_count, 2);
    assert!(outcome.batch.errors.is_empty());

    let john = tracker.get_patient("123456789012").unwrap();
    assert_eq!(john.departments_visited, vec!["Heart", "ENT"]);
    assert_eq!(john.visit_count(), 2);
}

#[test]
fn test_reupload_only_updates() {
    let tracker = VisitTracker::open_in_memory().unwrap();
    tracker.import_file("day1.csv", UPLOAD.as_bytes()).unwrap();

    let outcome = tracker.import_file("day2.csv", UPLOAD.as_bytes()).unwrap();
    assert_eq!(outcome.batch.new_count, 0);
    assert_eq!(outcome.batch.updated_count, 4);
    assert_eq!(tracker.stats().unwrap().total_patients, 2);

    let john = tracker.get_patient("123456789012").unwrap();
    assert_eq!(john.departments_visited, vec!["Heart", "ENT"]);
}

#[test]
fn test_upload_persists_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("visits.db");

    {
        let tracker = VisitTracker::open(&path).unwrap();
        tracker.import_file("daily.txt", UPLOAD.as_bytes()).unwrap();
    }

    let tracker = VisitTracker::open(&path).unwrap();
    assert_eq!(tracker.list_all().unwrap().len(), 2);
}

#[test]
fn test_scenario_same_identifier_and_department_twice() {
    let mut db = Database::open_in_memory().unwrap();
    let records = vec![
        VisitRecord::new("123456789012", "A", "ENT"),
        VisitRecord::new("123456789012", "A", "ENT"),
    ];

    let outcome = process_batch(&mut db, &records);
    assert_eq!(outcome.new_count, 1);
    assert_eq!(outcome.updated_count, 1);

    let patient = db.find_by_identifier("123456789012").unwrap().unwrap();
    assert_eq!(patient.departments_visited, vec!["ENT"]);
}

#[test]
fn test_scenario_single_add_missing_name() {
    let tracker = VisitTracker::open_in_memory().unwrap();

    let mut visit = input("123456789012", "", "Heart");
    visit.name = None;
    let err = tracker.add_visit(visit).unwrap_err();

    match err {
        VisitTrackerError::Validation(errors) => {
            assert!(errors.iter().any(|e| e.to_lowercase().contains("name")))
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(tracker.list_all().unwrap().is_empty());
}

#[test]
fn test_scenario_bulk_with_empty_identifier() {
    let tracker = VisitTracker::open_in_memory().unwrap();

    let outcome = tracker
        .add_bulk_visits(vec![
            input("123456789012", "A", "Heart"),
            input("", "B", "ENT"),
            input("345678901234", "C", "Ortho"),
        ])
        .unwrap();

    assert_eq!(outcome.valid_records, 2);
    assert_eq!(outcome.validation_errors.len(), 1);
    assert_eq!(outcome.validation_errors[0].identifier, "");
}

#[test]
fn test_scenario_date_range_edges() {
    let tracker = VisitTracker::open_in_memory().unwrap();
    tracker.add_visit(input("123456789012", "A", "Heart")).unwrap();

    let empty_day = NaiveDate::from_ymd_opt(2001, 1, 1).unwrap();
    assert!(tracker
        .list_created_between(empty_day, empty_day)
        .unwrap()
        .is_empty());

    let later = NaiveDate::from_ymd_opt(2001, 1, 2).unwrap();
    assert!(matches!(
        tracker.list_created_between(later, empty_day),
        Err(VisitTrackerError::InvalidRange { .. })
    ));

    assert_eq!(tracker.list_today().unwrap().len(), 1);
}

#[test]
fn test_conflict_surfaces_from_direct_create() {
    let db = Database::open_in_memory().unwrap();
    let record = VisitRecord::new("123456789012", "A", "Heart");
    db.create_patient(&record).unwrap();
    assert!(matches!(db.create_patient(&record), Err(DbError::Conflict(_))));
}

#[test]
fn test_export_follows_visit_order() {
    let tracker = VisitTracker::open_in_memory().unwrap();
    tracker.import_file("daily.csv", UPLOAD.as_bytes()).unwrap();

    let csv = tracker
        .export_csv(visit_tracker_core::PatientOrder::VisitCount)
        .unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].contains("123456789012"));
    assert!(lines[1].contains("\"Heart, ENT\""));
}

#[test]
fn test_concurrent_upserts_share_one_patient() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("visits.db");
    let db = Database::open(&path).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let path = path.clone();
            std::thread::spawn(move || {
                let mut db = Database::open(&path).unwrap();
                let mut created = 0;
                let mut failures = 0;
                for i in 0..25 {
                    for department in [format!("Dept-{worker}-{i}"), "ENT".to_string()] {
                        let record = VisitRecord::new("123456789012", "Shared", department);
                        match db.upsert_visit(&record) {
                            Ok(outcome) if outcome.created => created += 1,
                            Ok(_) => {}
                            Err(_) => failures += 1,
                        }
                    }
                }
                (created, failures)
            })
        })
        .collect();

    let (created, failures) = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .fold((0, 0), |acc, r| (acc.0 + r.0, acc.1 + r.1));

    assert_eq!(failures, 0);
    assert_eq!(created, 1);
    assert_eq!(db.count_patients().unwrap(), 1);

    let patient = db.find_by_identifier("123456789012").unwrap().unwrap();
    assert_eq!(patient.visit_count(), 101);
    assert_eq!(
        patient.departments_visited.iter().filter(|d| *d == "ENT").count(),
        1
    );
}

fn digits12() -> impl Strategy<Value = String> {
    proptest::collection::vec(0u8..10, 12)
        .prop_map(|ds| ds.into_iter().map(|d| char::from(b'0' + d)).collect())
}

proptest! {
    #[test]
    fn prop_interleaved_separators_normalize(
        id in digits12(),
        seps in proptest::collection::vec("[ a-zA-Z/.-]{0,2}", 13),
    ) {
        let mut raw = String::new();
        for (i, d) in id.chars().enumerate() {
            raw.push_str(&seps[i]);
            raw.push(d);
        }
        raw.push_str(&seps[12]);

        prop_assert_eq!(normalize_identifier(&raw), id.clone());

        let prepared = prepare(VisitRecord::new(raw, "A", "ENT")).unwrap();
        prop_assert_eq!(&prepared.identifier, &id);
        prop_assert!(validate(&prepared).valid);
    }

    #[test]
    fn prop_batch_accounts_for_every_record(
        rows in proptest::collection::vec(
            (0usize..4, prop_oneof![Just("ENT"), Just("Heart"), Just("ent "), Just("")], any::<bool>()),
            0..20,
        )
    ) {
        let ids = ["123456789012", "234567890123", "345678901234", "456789012345"];
        let records: Vec<VisitRecord> = rows
            .iter()
            .map(|(i, dept, broken)| {
                let id = if *broken { "999" } else { ids[*i] };
                VisitRecord::new(id, "Name", *dept)
            })
            .collect();

        let mut db = Database::open_in_memory().unwrap();
        let outcome = process_batch(&mut db, &records);

        prop_assert_eq!(
            outcome.new_count + outcome.updated_count + outcome.errors.len(),
            records.len()
        );

        for patient in db.list_all().unwrap() {
            let mut keys: Vec<String> = patient
                .departments_visited
                .iter()
                .map(|d| d.trim().to_lowercase())
                .collect();
            let before = keys.len();
            keys.sort();
            keys.dedup();
            prop_assert_eq!(keys.len(), before);
        }
    }
}
