//! # API REST
//!
//! REST API for the HIE document service.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, multipart upload, CORS, status mapping)
//!
//! The pipeline itself is synchronous, so each request runs it on the blocking pool.

#![warn(rust_2018_idioms)]

use axum::{
    extract::{Multipart, Path as AxumPath, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use hie_core::{AggregateResult, HealthInformationService, HieError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

/// Multipart field carrying the uploaded document.
pub const PUBLISH_FIELD_NAME: &str = "file";

/// Health check response.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Error body returned with every non-2xx response.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub message: String,
}

/// Multipart upload of a clinical document (documentation only).
#[derive(ToSchema)]
#[allow(dead_code)]
struct PublishDocumentReq {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

type ApiError = (StatusCode, Json<ErrorRes>);

/// Application state shared across REST API handlers.
#[derive(Clone)]
pub struct AppState {
    service: Arc<HealthInformationService>,
}

impl AppState {
    pub fn new(service: Arc<HealthInformationService>) -> Self {
        Self { service }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(health, get_health_data, publish_document),
    components(schemas(HealthRes, ErrorRes, PublishDocumentReq))
)]
struct ApiDoc;

/// Build the REST router, including Swagger UI at `/swagger-ui`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/patients/:patient_id/health-data", get(get_health_data))
        .route("/documents", post(publish_document))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Map a pipeline outcome to an HTTP status.
///
/// "Nothing found" outcomes are 404s, collaborator failures are 502s, and corrupt documents
/// or failed transforms are 500s.
pub fn status_for(err: &HieError) -> StatusCode {
    match err {
        HieError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        HieError::PatientNotFound(_)
        | HieError::NoCandidateDocuments
        | HieError::NoMatchingEntries
        | HieError::NoDocumentsReturned
        | HieError::NoMatchingDocuments => StatusCode::NOT_FOUND,
        HieError::IdentifierResolutionFailed(_)
        | HieError::RegistryQueryFailed { .. }
        | HieError::RegistryUnavailable(_)
        | HieError::RetrievalFailed(_) => StatusCode::BAD_GATEWAY,
        HieError::DocumentParseFailed { .. }
        | HieError::PathEvaluationFailed(_)
        | HieError::TransformFailed { .. }
        | HieError::PublishFailed(_)
        | HieError::Io(_)
        | HieError::YamlSerialization(_)
        | HieError::YamlDeserialization(_)
        | HieError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(err: HieError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!("request failed: {:?}", err);
    } else {
        tracing::info!("request ended without result: {}", err);
    }
    (
        status,
        Json(ErrorRes {
            message: err.to_string(),
        }),
    )
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorRes {
            message: message.into(),
        }),
    )
}

fn join_error(err: tokio::task::JoinError) -> ApiError {
    tracing::error!("pipeline task failed: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorRes {
            message: "Internal error".into(),
        }),
    )
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "HIE REST API is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/patients/{patient_id}/health-data",
    params(
        ("patient_id" = String, Path, description = "Patient MRN")
    ),
    responses(
        (status = 200, description = "Aggregated clinical documents as {\"Documents\":[...]}"),
        (status = 404, description = "Patient or matching documents not found", body = ErrorRes),
        (status = 502, description = "Exchange collaborator failed", body = ErrorRes),
        (status = 500, description = "Document could not be parsed or transformed", body = ErrorRes)
    )
)]
/// Retrieve a patient's clinical documents from the exchange
///
/// Queries the registry for the patient's documents, retrieves them from the repository and
/// returns every Continuity of Care Document rendered to JSON.
///
/// # Errors
/// Returns `404 Not Found` if the patient is unknown or nothing matched, `502 Bad Gateway`
/// if the exchange failed, and `500 Internal Server Error` for corrupt documents.
#[axum::debug_handler]
async fn get_health_data(
    State(state): State<AppState>,
    AxumPath(patient_id): AxumPath<String>,
) -> Result<Json<AggregateResult>, ApiError> {
    let service = state.service.clone();
    let result =
        tokio::task::spawn_blocking(move || service.get_patient_health_data(&patient_id))
            .await
            .map_err(join_error)?;

    result.map(Json).map_err(api_error)
}

#[utoipa::path(
    post,
    path = "/documents",
    request_body(content = PublishDocumentReq, content_type = "multipart/form-data"),
    responses(
        (status = 204, description = "Document published"),
        (status = 400, description = "Missing or unreadable upload", body = ErrorRes),
        (status = 500, description = "Document could not be published", body = ErrorRes)
    )
)]
/// Publish a clinical document to the exchange
///
/// Expects a multipart form with the document in the `file` field.
#[axum::debug_handler]
async fn publish_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<StatusCode, ApiError> {
    let mut document = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.to_string()))?
    {
        if field.name() == Some(PUBLISH_FIELD_NAME) {
            document = Some(field.bytes().await.map_err(|e| bad_request(e.to_string()))?);
            break;
        }
    }

    let Some(document) = document else {
        return Err(bad_request(format!(
            "missing multipart field '{PUBLISH_FIELD_NAME}'"
        )));
    };
    tracing::info!("received document upload of {} bytes", document.len());

    let service = state.service.clone();
    tokio::task::spawn_blocking(move || service.publish_patient_health_data(&document))
        .await
        .map_err(join_error)?
        .map_err(api_error)?;

    Ok(StatusCode::NO_CONTENT)
}
