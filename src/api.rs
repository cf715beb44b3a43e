//! REST surface over the registration orchestrator.

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use chrono::NaiveDate;
use intake_core::{
    CoverageRecord, EligibilityCheck, EncounterRecord, MatchFactors, MatchResult, NonEmptyText,
    Orchestrator, RawDemographics, RegistrationError, RegistrationOutcome, RegistrationReport,
    RegistrationRequest, RegistryClient, RegistryError, ResourceId, WorkflowFailure,
    WorkflowProgress,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator<dyn RegistryClient>>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator<dyn RegistryClient>>) -> Self {
        Self { orchestrator }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// A registration, optionally resuming from the progress of a failed attempt.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegistrationReq {
    /// family_name, given_name, birth_date, gender, address_line, city, region, postal_code,
    /// phone_home, phone_work, payer_id
    #[schema(value_type = Object)]
    pub demographics: RawDemographics,
    #[schema(value_type = String, example = "dr-sarah-chen")]
    pub provider_id: ResourceId,
    #[schema(value_type = String)]
    pub reason: NonEmptyText,
    #[serde(default)]
    pub service_date: Option<NaiveDate>,
    /// `progress` from a previous failure response.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub progress: Option<WorkflowProgress>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegistrationRes {
    pub workflow_id: Uuid,
    /// `resolved` or `created`
    pub outcome: String,
    #[schema(value_type = String)]
    pub patient_id: ResourceId,
    #[schema(value_type = Option<Object>)]
    pub coverage: Option<CoverageRecord>,
    #[schema(value_type = Option<Object>)]
    pub eligibility: Option<EligibilityCheck>,
    #[schema(value_type = Object)]
    pub encounter: EncounterRecord,
}

impl From<RegistrationReport> for RegistrationRes {
    fn from(report: RegistrationReport) -> Self {
        let (outcome, patient_id) = match report.outcome {
            RegistrationOutcome::Resolved(id) => ("resolved", id),
            RegistrationOutcome::Created(id) => ("created", id),
        };
        Self {
            workflow_id: report.workflow_id,
            outcome: outcome.into(),
            patient_id,
            coverage: report.coverage,
            eligibility: report.eligibility,
            encounter: report.encounter,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FailureRes {
    pub workflow_id: Uuid,
    /// Workflow step that failed, e.g. `createPatient`
    pub step: String,
    pub error: String,
    /// True when resubmitting with `progress` may succeed unchanged
    pub retryable: bool,
    #[schema(value_type = Option<String>)]
    pub established_patient_id: Option<ResourceId>,
    #[schema(value_type = Object)]
    pub progress: WorkflowProgress,
}

impl From<WorkflowFailure> for FailureRes {
    fn from(failure: WorkflowFailure) -> Self {
        Self {
            workflow_id: failure.workflow_id,
            step: failure.step.to_string(),
            error: failure.cause.to_string(),
            retryable: failure.is_retryable(),
            established_patient_id: failure.established_patient().cloned(),
            progress: failure.progress,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchReq {
    pub family_name: String,
    pub given_name: Option<String>,
    /// YYYY-MM-DD
    pub birth_date: String,
    pub gender: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CandidateRes {
    #[schema(value_type = String)]
    pub patient_id: ResourceId,
    pub display_name: String,
    pub score: f64,
    pub mrn: Option<String>,
    pub birth_date: Option<NaiveDate>,
    #[schema(value_type = Object)]
    pub factors: MatchFactors,
}

impl From<MatchResult> for CandidateRes {
    fn from(result: MatchResult) -> Self {
        Self {
            mrn: result.candidate.mrn().map(str::to_string),
            patient_id: result.candidate.id,
            display_name: result.candidate.display_name,
            birth_date: result.candidate.birth_date,
            score: result.score,
            factors: result.factors,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchRes {
    pub candidates: Vec<CandidateRes>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
}

#[derive(OpenApi)]
#[openapi(
    paths(health, register, search_patients),
    components(schemas(
        HealthRes,
        RegistrationReq,
        RegistrationRes,
        FailureRes,
        SearchReq,
        SearchRes,
        CandidateRes,
        ErrorRes
    ))
)]
pub struct ApiDoc;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/registrations", post(register))
        .route("/patients/search", post(search_patients))
        .route("/api-docs/openapi.json", get(openapi))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn error_status(cause: &RegistrationError) -> StatusCode {
    match cause {
        RegistrationError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RegistrationError::AmbiguousMatch { .. } => StatusCode::CONFLICT,
        RegistrationError::Registry(RegistryError::Unavailable { .. }) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        RegistrationError::Registry(RegistryError::Rejected { .. }) => StatusCode::BAD_GATEWAY,
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
async fn health() -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Intake is alive".into(),
    })
}

#[utoipa::path(
    post,
    path = "/registrations",
    request_body = RegistrationReq,
    responses(
        (status = 201, description = "Patient registered for the visit", body = RegistrationRes),
        (status = 409, description = "Ambiguous match; manual adjudication required", body = FailureRes),
        (status = 422, description = "Invalid demographics", body = FailureRes),
        (status = 502, description = "Registry rejected a write", body = FailureRes),
        (status = 503, description = "Registry unavailable; resubmit with progress", body = FailureRes)
    )
)]
/// Resolve or create the patient, attach coverage, verify eligibility and open an encounter.
///
/// A failure body carries `progress`; resubmitting the same request with it continues from the
/// failed step.
async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegistrationReq>,
) -> Result<(StatusCode, Json<RegistrationRes>), (StatusCode, Json<FailureRes>)> {
    let request = RegistrationRequest {
        demographics: req.demographics,
        provider_id: req.provider_id,
        reason: req.reason,
        service_date: req.service_date,
    };
    let progress = req.progress.unwrap_or_default();

    match state.orchestrator.resume(&request, progress).await {
        Ok(report) => Ok((StatusCode::CREATED, Json(report.into()))),
        Err(failure) => {
            let status = error_status(&failure.cause);
            Err((status, Json(failure.into())))
        }
    }
}

#[utoipa::path(
    post,
    path = "/patients/search",
    request_body = SearchReq,
    responses(
        (status = 200, description = "Scored candidates, best first", body = SearchRes),
        (status = 422, description = "Invalid demographics", body = ErrorRes),
        (status = 503, description = "Registry unavailable", body = ErrorRes)
    )
)]
async fn search_patients(
    State(state): State<AppState>,
    Json(req): Json<SearchReq>,
) -> Result<Json<SearchRes>, (StatusCode, Json<ErrorRes>)> {
    let raw = RawDemographics {
        family_name: req.family_name,
        given_name: req.given_name,
        birth_date: req.birth_date,
        gender: req.gender,
        ..RawDemographics::default()
    };

    match state.orchestrator.search(&raw).await {
        Ok(ranked) => Ok(Json(SearchRes {
            candidates: ranked.into_iter().map(CandidateRes::from).collect(),
        })),
        Err(e) => {
            tracing::warn!("patient search failed: {e}");
            Err((error_status(&e), Json(ErrorRes { error: e.to_string() })))
        }
    }
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
