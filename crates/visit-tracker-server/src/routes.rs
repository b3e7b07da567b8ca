//! Route handlers. Each one is a thin adapter from HTTP to [`VisitTracker`].
//!
//! [`VisitTracker`]: visit_tracker_core::VisitTracker

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use visit_tracker_core::{
    BulkValidationError, LineError, Patient, PatientOrder, RecordError, VisitInput,
};

use super::error::ApiError;
use super::state::AppState;

// =========================================================================
// Response Types
// =========================================================================

/// Patient as returned by the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientView {
    pub patient_id: i64,
    pub identifier: String,
    pub name: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub departments_visited: Vec<String>,
    pub visit_count: usize,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Patient> for PatientView {
    fn from(patient: Patient) -> Self {
        Self {
            visit_count: patient.visit_count(),
            patient_id: patient.patient_id,
            identifier: patient.identifier,
            name: patient.name,
            age: patient.age,
            gender: patient.gender,
            address: patient.address,
            phone: patient.phone,
            departments_visited: patient.departments_visited,
            created_at: patient.created_at,
            updated_at: patient.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct ListResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<PatientView>,
}

impl From<Vec<Patient>> for ListResponse {
    fn from(patients: Vec<Patient>) -> Self {
        Self {
            success: true,
            count: patients.len(),
            data: patients.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize)]
pub struct PatientResponse {
    pub success: bool,
    pub data: PatientView,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddVisitResponse {
    pub success: bool,
    pub message: &'static str,
    pub is_new: bool,
    pub data: PatientView,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub total_records: usize,
    pub valid_records: usize,
    pub invalid_records: usize,
    pub new_patients: usize,
    pub updated_patients: usize,
    pub processing_errors: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub message: &'static str,
    pub summary: UploadSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<LineError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub processing_errors: Vec<RecordError>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSummary {
    pub total_received: usize,
    pub valid_records: usize,
    pub invalid_records: usize,
    pub new_patients: usize,
    pub updated_patients: usize,
    pub processing_errors: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResponse {
    pub success: bool,
    pub message: &'static str,
    pub summary: BulkSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<BulkValidationError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub processing_errors: Vec<RecordError>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    pub total_patients: u64,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: StatsView,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

// =========================================================================
// Request Types
// =========================================================================

#[derive(Deserialize)]
pub struct BulkRequest {
    pub patients: Vec<VisitInput>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Deserialize)]
pub struct ExportParams {
    pub sort: Option<String>,
}

// =========================================================================
// Handlers
// =========================================================================

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `POST /api/uploadFile`: multipart field `file`, `.csv` or `.txt`.
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((file_name, bytes.to_vec()));
        break;
    }

    let (file_name, bytes) = upload.ok_or_else(|| ApiError::BadRequest("No file uploaded".into()))?;

    let outcome = state
        .run(move |tracker| tracker.import_file(&file_name, &bytes))
        .await?;

    Ok(Json(UploadResponse {
        success: true,
        message: "File processed successfully",
        summary: UploadSummary {
            total_records: outcome.summary.total_lines,
            valid_records: outcome.summary.valid_lines,
            invalid_records: outcome.summary.invalid_lines,
            new_patients: outcome.batch.new_count,
            updated_patients: outcome.batch.updated_count,
            processing_errors: outcome.batch.errors.len(),
        },
        errors: outcome.line_errors,
        processing_errors: outcome.batch.errors,
    }))
}

/// `POST /api/addVisit`: 201 when a patient is created, 200 when updated.
pub async fn add_visit(
    State(state): State<AppState>,
    payload: Result<Json<VisitInput>, JsonRejection>,
) -> Result<(StatusCode, Json<AddVisitResponse>), ApiError> {
    let Json(input) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let outcome = state.run(move |tracker| tracker.add_visit(input)).await?;

    let (status, message) = if outcome.is_new {
        (StatusCode::CREATED, "New patient record created")
    } else {
        (StatusCode::OK, "Patient visit updated")
    };

    Ok((
        status,
        Json(AddVisitResponse {
            success: true,
            message,
            is_new: outcome.is_new,
            data: outcome.patient.into(),
        }),
    ))
}

/// `POST /api/addBulkVisits`: `{ "patients": [...] }`.
pub async fn add_bulk_visits(
    State(state): State<AppState>,
    payload: Result<Json<BulkRequest>, JsonRejection>,
) -> Result<Json<BulkResponse>, ApiError> {
    let Json(request) = payload.map_err(|_| {
        ApiError::BadRequest("Invalid data. Expected an array of patients.".into())
    })?;

    let outcome = state
        .run(move |tracker| tracker.add_bulk_visits(request.patients))
        .await?;

    Ok(Json(BulkResponse {
        success: true,
        message: "Bulk records processed successfully",
        summary: BulkSummary {
            total_received: outcome.total_received,
            valid_records: outcome.valid_records,
            invalid_records: outcome.invalid_records,
            new_patients: outcome.batch.new_count,
            updated_patients: outcome.batch.updated_count,
            processing_errors: outcome.batch.errors.len(),
        },
        validation_errors: outcome.validation_errors,
        processing_errors: outcome.batch.errors,
    }))
}

/// `GET /api/patient/:identifier`
pub async fn get_patient(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<PatientResponse>, ApiError> {
    let patient = state
        .run(move |tracker| tracker.get_patient(&identifier))
        .await?;

    Ok(Json(PatientResponse {
        success: true,
        data: patient.into(),
    }))
}

/// `DELETE /api/patient/:identifier`, mounted only when admin routes are enabled.
pub async fn delete_patient(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let message = format!("Deleted patient with Aadhar number {identifier}");
    state
        .run(move |tracker| tracker.delete_patient(&identifier))
        .await?;

    Ok(Json(MessageResponse {
        success: true,
        message,
    }))
}

/// `GET /api/allPatients`
pub async fn all_patients(State(state): State<AppState>) -> Result<Json<ListResponse>, ApiError> {
    let patients = state.run(|tracker| tracker.list_all()).await?;
    Ok(Json(patients.into()))
}

/// `GET /api/patients/sort/by-visits`
pub async fn patients_by_visits(
    State(state): State<AppState>,
) -> Result<Json<ListResponse>, ApiError> {
    let patients = state.run(|tracker| tracker.list_by_visit_count()).await?;
    Ok(Json(patients.into()))
}

/// `GET /api/patients/today`
pub async fn todays_patients(State(state): State<AppState>) -> Result<Json<ListResponse>, ApiError> {
    let patients = state.run(|tracker| tracker.list_today()).await?;
    Ok(Json(patients.into()))
}

/// `GET /api/patients/date-range?startDate=YYYY-MM-DD&endDate=YYYY-MM-DD`
pub async fn patients_by_date_range(
    State(state): State<AppState>,
    Query(params): Query<DateRangeParams>,
) -> Result<Json<ListResponse>, ApiError> {
    let (Some(start), Some(end)) = (params.start_date, params.end_date) else {
        return Err(ApiError::BadRequest(
            "Both startDate and endDate are required".into(),
        ));
    };
    let start = parse_date("startDate", &start)?;
    let end = parse_date("endDate", &end)?;

    let patients = state
        .run(move |tracker| tracker.list_created_between(start, end))
        .await?;
    Ok(Json(patients.into()))
}

/// `GET /api/stats`
pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let stats = state.run(|tracker| tracker.stats()).await?;
    Ok(Json(StatsResponse {
        success: true,
        stats: StatsView {
            total_patients: stats.total_patients,
        },
    }))
}

/// `GET /api/patients/export?sort=identifier|visits` as a CSV attachment.
pub async fn export_patients(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
) -> Result<impl IntoResponse, ApiError> {
    let order = match params.sort.as_deref() {
        Some(sort) => sort.parse::<PatientOrder>()?,
        None => PatientOrder::default(),
    };

    let csv = state.run(move |tracker| tracker.export_csv(order)).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"patients.csv\"",
            ),
        ],
        csv,
    ))
}

fn parse_date(param: &str, value: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        ApiError::BadRequest(format!("{param} must be a date in YYYY-MM-DD format"))
    })
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}
