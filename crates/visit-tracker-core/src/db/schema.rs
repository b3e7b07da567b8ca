//! SQLite schema definition.

/// Complete database schema for the visit tracker.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- Patients (one row per identifier; only departments_visited changes)
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    patient_id INTEGER PRIMARY KEY AUTOINCREMENT,
    identifier TEXT NOT NULL UNIQUE
        CHECK (length(identifier) = 12 AND identifier NOT GLOB '*[^0-9]*'),
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    age INTEGER CHECK (age IS NULL OR age >= 0),
    gender TEXT,
    address TEXT,
    phone TEXT,
    departments_visited TEXT NOT NULL DEFAULT '[]'  -- JSON array of strings
        CHECK (json_valid(departments_visited)),
    created_at TEXT NOT NULL,                       -- RFC 3339, UTC, second precision
    updated_at TEXT NOT NULL
);

-- Day and range listings scan by creation time
CREATE INDEX IF NOT EXISTS idx_patients_created_at ON patients(created_at);
"#;
