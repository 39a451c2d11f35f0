//! HTTP API handlers for the dispatch engine.
//!
//! Transport-thin: handlers deserialize, delegate to `coordinator` /
//! `lifecycle`, and let [`DispatchError`]'s `IntoResponse` impl map the
//! typed failure taxonomy onto status codes. Authentication happens
//! upstream; reporter and rescuer ids arrive pre-verified in the payload.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, instrument};

use crate::config::DispatchConfig;
use crate::coordinator;
use crate::error::DispatchError;
use crate::lifecycle;
use crate::model::{
    CancelIncidentRequest, CreateIncidentRequest, IncidentCreatedResponse,
    IncidentDetailResponse, RescuerProfile, RescuerUpsertRequest, RespondRequest,
    RespondResponse, SessionSummary, SeverityResponse, SymptomReportRequest,
};
use crate::notify::SharedNotifier;
use crate::storage::Storage;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub config: Arc<DispatchConfig>,
    pub notifier: SharedNotifier,
}

/// POST /incidents - Report a snakebite and start dispatch.
///
/// Opens the first session immediately; the response carries how many
/// rescuers were pinged.
///
/// # Request Body
///
/// ```json
/// {
///     "reporter_id": "acct-17",
///     "latitude": 10.762622,
///     "longitude": 106.660172,
///     "location_label": "riverbank, east trail",
///     "symptoms": ["local_swelling"]
/// }
/// ```
///
/// Returns `201 Created`, or `400` on out-of-range coordinates.
#[instrument(skip(state, request))]
pub async fn post_incident(
    State(state): State<AppState>,
    Json(request): Json<CreateIncidentRequest>,
) -> Result<(StatusCode, Json<IncidentCreatedResponse>), DispatchError> {
    let response = coordinator::create_incident(
        &state.storage,
        &state.config,
        state.notifier.as_ref(),
        &request,
    )
    .await?;

    info!(
        incident_id = response.incident_id,
        pinged = response.rescuers_pinged,
        "incident reported"
    );

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /incidents/:id - Incident detail with its latest session and requests.
#[instrument(skip(state))]
pub async fn get_incident(
    State(state): State<AppState>,
    Path(incident_id): Path<i64>,
) -> Result<Json<IncidentDetailResponse>, DispatchError> {
    let detail = coordinator::get_incident_detail(&state.storage, incident_id).await?;
    Ok(Json(detail))
}

/// POST /incidents/:id/raise-range - Escalate a failed session.
///
/// Fails with `404` (unknown incident), `409` (current session is not
/// failed / incident not awaiting rescue) or `422` (session ceiling).
#[instrument(skip(state))]
pub async fn post_raise_range(
    State(state): State<AppState>,
    Path(incident_id): Path<i64>,
) -> Result<Json<SessionSummary>, DispatchError> {
    let summary = coordinator::raise_range(
        &state.storage,
        &state.config,
        state.notifier.as_ref(),
        incident_id,
    )
    .await?;

    info!(
        incident_id,
        session_number = summary.session_number,
        radius_km = summary.radius_km,
        "range raised"
    );

    Ok(Json(summary))
}

/// PUT /incidents/:id/symptoms - Merge symptom selections and re-score.
#[instrument(skip(state, request))]
pub async fn put_symptoms(
    State(state): State<AppState>,
    Path(incident_id): Path<i64>,
    Json(request): Json<SymptomReportRequest>,
) -> Result<Json<SeverityResponse>, DispatchError> {
    let response = coordinator::update_symptom_report(
        &state.storage,
        &state.config,
        incident_id,
        &request.symptoms,
    )
    .await?;

    Ok(Json(response))
}

/// POST /incidents/:id/cancel - Reporter aborts the incident. Terminal.
#[instrument(skip(state, request))]
pub async fn post_cancel_incident(
    State(state): State<AppState>,
    Path(incident_id): Path<i64>,
    Json(request): Json<CancelIncidentRequest>,
) -> Result<StatusCode, DispatchError> {
    coordinator::cancel_incident(&state.storage, incident_id, &request.reporter_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /requests/:id/respond - A rescuer accepts or rejects a ping.
///
/// Fails with `404`, `403` (actor mismatch) or `409` (request already
/// resolved - including losing the first-accept race).
#[instrument(skip(state, request))]
pub async fn post_respond(
    State(state): State<AppState>,
    Path(request_id): Path<i64>,
    Json(request): Json<RespondRequest>,
) -> Result<Json<RespondResponse>, DispatchError> {
    let response = lifecycle::respond(
        &state.storage,
        &state.config,
        state.notifier.as_ref(),
        request_id,
        &request.rescuer_id,
        request.accept,
    )
    .await?;

    Ok(Json(response))
}

/// POST /missions/:id/cancel - An assigned mission fell through; re-open
/// dispatch at the same slot.
#[instrument(skip(state))]
pub async fn post_cancel_mission(
    State(state): State<AppState>,
    Path(mission_id): Path<i64>,
) -> Result<Json<SessionSummary>, DispatchError> {
    let summary = coordinator::cancel_mission(
        &state.storage,
        &state.config,
        state.notifier.as_ref(),
        mission_id,
    )
    .await?;

    Ok(Json(summary))
}

/// PUT /rescuers/:id - Upsert a rescuer's profile, position and
/// availability. This feed is what the matcher searches.
#[instrument(skip(state, request))]
pub async fn put_rescuer(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Json(request): Json<RescuerUpsertRequest>,
) -> Result<StatusCode, DispatchError> {
    if !(-90.0..=90.0).contains(&request.latitude)
        || !(-180.0..=180.0).contains(&request.longitude)
    {
        return Err(DispatchError::Validation(
            "rescuer position is outside valid coordinate ranges".into(),
        ));
    }

    let profile = RescuerProfile {
        account_id: account_id.clone(),
        name: request.name,
        latitude: request.latitude,
        longitude: request.longitude,
        rating: request.rating,
        available: request.available,
    };

    state.storage.upsert_rescuer(&profile).await?;

    info!(
        account_id = %account_id,
        available = profile.available,
        "rescuer profile updated"
    );

    Ok(StatusCode::NO_CONTENT)
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
