//! Top-level incident operations.
//!
//! Thin entry points that validate, load, and delegate to the session and
//! severity machinery: incident intake, explicit range raising, symptom
//! re-scoring, and the two cancellation paths (reporter aborts the incident,
//! assigned mission falls through).

use chrono::Utc;
use tracing::info;

use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::model::{
    CreateIncidentRequest, IncidentCreatedResponse, IncidentDetailResponse, IncidentStatus,
    MissionStatus, SessionStatus, SessionSummary, SessionTrigger, SeverityBand, SeverityResponse,
    VenomSummary,
};
use crate::notify::Notifier;
use crate::session;
use crate::severity;
use crate::storage::Storage;

/// Register a new incident and open its first dispatch session.
pub async fn create_incident(
    storage: &Storage,
    config: &DispatchConfig,
    notifier: &dyn Notifier,
    request: &CreateIncidentRequest,
) -> Result<IncidentCreatedResponse, DispatchError> {
    if !(-90.0..=90.0).contains(&request.latitude) {
        return Err(DispatchError::Validation(format!(
            "latitude {} is outside [-90, 90]",
            request.latitude
        )));
    }
    if !(-180.0..=180.0).contains(&request.longitude) {
        return Err(DispatchError::Validation(format!(
            "longitude {} is outside [-180, 180]",
            request.longitude
        )));
    }
    if request.reporter_id.trim().is_empty() {
        return Err(DispatchError::Validation("reporter_id is empty".into()));
    }

    if !request.symptoms.is_empty() {
        let configs = storage.list_active_symptom_configs().await?;
        validate_symptom_keys(&request.symptoms, &configs)?;
    }

    let occurred_at = Utc::now();
    let incident_id = storage
        .insert_incident(
            &request.reporter_id,
            request.latitude,
            request.longitude,
            request.location_label.as_deref(),
            &request.symptoms,
            occurred_at,
        )
        .await?;

    let incident = storage
        .get_incident(incident_id)
        .await?
        .ok_or_else(|| DispatchError::NotFound(format!("incident {incident_id}")))?;

    let first = session::open_session(
        storage,
        config,
        notifier,
        &incident,
        SessionTrigger::Initial,
        None,
    )
    .await?;

    if !request.symptoms.is_empty() {
        let configs = storage.list_active_symptom_configs().await?;
        let score = severity::score(0, &request.symptoms, &configs, config.severity_ceiling);
        storage
            .update_symptom_report(incident_id, &request.symptoms, score)
            .await?;
    }

    info!(
        incident_id,
        reporter_id = %request.reporter_id,
        pinged = first.rescuers_pinged,
        "incident created"
    );

    Ok(IncidentCreatedResponse {
        incident_id,
        status: IncidentStatus::AwaitingRescue,
        current_session_number: first.session_number,
        current_radius_km: first.radius_km,
        rescuers_pinged: first.rescuers_pinged,
    })
}

/// Explicitly escalate a failed session to the next slot.
///
/// The ceiling check comes before the state check so a caller probing after
/// terminal dispatch failure still learns the ceiling is the reason.
pub async fn raise_range(
    storage: &Storage,
    config: &DispatchConfig,
    notifier: &dyn Notifier,
    incident_id: i64,
) -> Result<SessionSummary, DispatchError> {
    let incident = storage
        .get_incident(incident_id)
        .await?
        .ok_or_else(|| DispatchError::NotFound(format!("incident {incident_id}")))?;

    if incident.current_session_number >= config.max_sessions {
        return Err(DispatchError::LimitExceeded(format!(
            "incident {incident_id} already used all {} sessions",
            config.max_sessions
        )));
    }

    if incident.status != IncidentStatus::AwaitingRescue {
        return Err(DispatchError::InvalidState(format!(
            "incident {incident_id} is {}, not awaiting rescue",
            incident.status.as_str()
        )));
    }

    let current = storage.latest_session(incident_id).await?;
    match &current {
        Some(session) if session.status == SessionStatus::Failed => {}
        Some(session) => {
            return Err(DispatchError::InvalidState(format!(
                "session {} is {}, only a failed session can be escalated",
                session.id,
                session.status.as_str()
            )));
        }
        None => {
            return Err(DispatchError::InvalidState(format!(
                "incident {incident_id} has no session to escalate"
            )));
        }
    }

    let session = session::open_session(
        storage,
        config,
        notifier,
        &incident,
        SessionTrigger::RadiusExpanded,
        None,
    )
    .await?;

    Ok(SessionSummary::from_session(&session))
}

/// Merge new symptom selections and re-score severity at the current elapsed
/// time.
pub async fn update_symptom_report(
    storage: &Storage,
    config: &DispatchConfig,
    incident_id: i64,
    symptoms: &[String],
) -> Result<SeverityResponse, DispatchError> {
    let incident = storage
        .get_incident(incident_id)
        .await?
        .ok_or_else(|| DispatchError::NotFound(format!("incident {incident_id}")))?;

    let configs = storage.list_active_symptom_configs().await?;
    validate_symptom_keys(symptoms, &configs)?;

    // Union with the previous report; symptoms do not un-happen
    let mut merged = incident.symptom_report.clone();
    for key in symptoms {
        if !merged.contains(key) {
            merged.push(key.clone());
        }
    }

    let elapsed_minutes = (Utc::now() - incident.occurred_at).num_minutes().max(0);
    let score = severity::score(elapsed_minutes, &merged, &configs, config.severity_ceiling);

    storage
        .update_symptom_report(incident_id, &merged, score)
        .await?;

    let venoms = storage.list_venom_types().await?;
    let likely_venom =
        severity::likely_venom(&merged, &configs, &venoms).map(|v| VenomSummary {
            name: v.name.clone(),
            severity_index: v.severity_index,
            first_aid: v.first_aid.clone(),
        });

    info!(
        incident_id,
        elapsed_minutes,
        severity = score,
        symptoms = merged.len(),
        "symptom report updated"
    );

    Ok(SeverityResponse {
        severity: score,
        band: SeverityBand::from_score(score, config.severity_ceiling),
        elapsed_minutes,
        likely_venom,
    })
}

/// Reporter aborts the incident. Terminal; cancels the active session, its
/// pending requests, and any active mission in one transaction.
pub async fn cancel_incident(
    storage: &Storage,
    incident_id: i64,
    reporter_id: &str,
) -> Result<(), DispatchError> {
    let incident = storage
        .get_incident(incident_id)
        .await?
        .ok_or_else(|| DispatchError::NotFound(format!("incident {incident_id}")))?;

    if incident.reporter_id != reporter_id {
        return Err(DispatchError::Forbidden(format!(
            "incident {incident_id} does not belong to this reporter"
        )));
    }

    if !storage.cancel_dispatch(incident_id).await? {
        return Err(DispatchError::InvalidState(format!(
            "incident {incident_id} is already {}",
            incident.status.as_str()
        )));
    }

    info!(incident_id, "incident cancelled by reporter");

    Ok(())
}

/// An assigned mission fell through. Re-opens dispatch at the same
/// escalation slot, linked to the cancelled mission.
pub async fn cancel_mission(
    storage: &Storage,
    config: &DispatchConfig,
    notifier: &dyn Notifier,
    mission_id: i64,
) -> Result<SessionSummary, DispatchError> {
    let mission = storage
        .get_mission(mission_id)
        .await?
        .ok_or_else(|| DispatchError::NotFound(format!("mission {mission_id}")))?;

    let cancelled = storage
        .transition_mission(mission_id, MissionStatus::Active, MissionStatus::Cancelled)
        .await?;
    if !cancelled {
        return Err(DispatchError::InvalidState(format!(
            "mission {mission_id} is {}, only an active mission can be cancelled",
            mission.status.as_str()
        )));
    }

    notifier.mission_cancelled(mission.incident_id, mission_id);

    let reopened = storage
        .transition_incident(
            mission.incident_id,
            IncidentStatus::RescuerAssigned,
            IncidentStatus::AwaitingRescue,
        )
        .await?;
    if !reopened {
        return Err(DispatchError::InvalidState(format!(
            "incident {} is no longer assigned",
            mission.incident_id
        )));
    }

    let incident = storage
        .get_incident(mission.incident_id)
        .await?
        .ok_or_else(|| DispatchError::NotFound(format!("incident {}", mission.incident_id)))?;

    let result = session::open_session(
        storage,
        config,
        notifier,
        &incident,
        SessionTrigger::MissionCancelled,
        Some(mission_id),
    )
    .await;

    match result {
        Ok(session) => Ok(SessionSummary::from_session(&session)),
        Err(DispatchError::LimitExceeded(msg)) => {
            // No slot left to retry in; the incident is out of options
            let marked = storage
                .transition_incident(
                    mission.incident_id,
                    IncidentStatus::AwaitingRescue,
                    IncidentStatus::DispatchFailed,
                )
                .await?;
            if marked {
                notifier.dispatch_failed(mission.incident_id);
            }
            Err(DispatchError::LimitExceeded(msg))
        }
        Err(e) => Err(e),
    }
}

/// Incident summary plus its latest session and that session's requests.
pub async fn get_incident_detail(
    storage: &Storage,
    incident_id: i64,
) -> Result<IncidentDetailResponse, DispatchError> {
    let incident = storage
        .get_incident(incident_id)
        .await?
        .ok_or_else(|| DispatchError::NotFound(format!("incident {incident_id}")))?;

    let session = storage.latest_session(incident_id).await?;
    let requests = match &session {
        Some(s) => storage.requests_for_session(s.id).await?,
        None => Vec::new(),
    };

    Ok(IncidentDetailResponse {
        incident,
        session,
        requests,
    })
}

fn validate_symptom_keys(
    symptoms: &[String],
    configs: &[crate::model::SymptomConfig],
) -> Result<(), DispatchError> {
    let unknown: Vec<&str> = symptoms
        .iter()
        .filter(|key| !configs.iter().any(|c| c.key == **key))
        .map(|key| key.as_str())
        .collect();

    if !unknown.is_empty() {
        return Err(DispatchError::Validation(format!(
            "unknown symptom keys: {}",
            unknown.join(", ")
        )));
    }

    Ok(())
}
