//! Session management and the escalation policy.
//!
//! A session is one round of rescuer solicitation at a fixed radius. The
//! escalation policy walks the configured radius tiers, spending
//! `attempts_per_tier` sessions at each before growing the radius; a
//! mission cancellation re-runs the current slot instead of consuming the
//! next one. Sessions end `Completed` (one acceptance), `Failed` (everything
//! terminal, nothing accepted) or `Cancelled` (incident aborted).

use chrono::{Duration, Utc};
use tracing::info;

use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::matcher;
use crate::model::{
    Incident, IncidentStatus, RescuerRequest, Session, SessionStatus, SessionTrigger,
};
use crate::notify::Notifier;
use crate::storage::Storage;

/// One position in the escalation ladder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    pub radius_km: f64,
    pub attempt: u32,
}

/// Where the next session should search.
///
/// `prev` is the previous session's (radius, attempt), or `None` for the
/// first session. Returns `None` once the final tier's last attempt has been
/// spent. A `MissionCancelled` trigger repeats the previous slot: coverage
/// did not fail, the assigned rescuer did.
pub fn next_slot(
    config: &DispatchConfig,
    prev: Option<(f64, u32)>,
    trigger: SessionTrigger,
) -> Option<Slot> {
    let tiers = &config.radius_tiers_km;
    let first = *tiers.first()?;

    let Some((prev_radius, prev_attempt)) = prev else {
        return Some(Slot {
            radius_km: first,
            attempt: 1,
        });
    };

    if trigger == SessionTrigger::MissionCancelled {
        return Some(Slot {
            radius_km: prev_radius,
            attempt: prev_attempt,
        });
    }

    if prev_attempt < config.attempts_per_tier {
        return Some(Slot {
            radius_km: prev_radius,
            attempt: prev_attempt + 1,
        });
    }

    tiers
        .iter()
        .copied()
        .find(|&t| t > prev_radius)
        .map(|radius_km| Slot {
            radius_km,
            attempt: 1,
        })
}

/// Open the incident's next session.
///
/// Determines the slot, runs the matcher, then writes the session and its
/// whole request batch in one transaction (failing any lingering active
/// session first). Opening with zero candidates is legal; the sweeper fails
/// such a session on its next pass.
pub async fn open_session(
    storage: &Storage,
    config: &DispatchConfig,
    notifier: &dyn Notifier,
    incident: &Incident,
    trigger: SessionTrigger,
    cancelled_mission_id: Option<i64>,
) -> Result<Session, DispatchError> {
    let prev = storage.latest_session(incident.id).await?;

    let session_number = prev.as_ref().map(|s| s.session_number + 1).unwrap_or(1);
    if session_number > config.max_sessions {
        return Err(DispatchError::LimitExceeded(format!(
            "incident {} already reached the session ceiling of {}",
            incident.id, config.max_sessions
        )));
    }

    let slot = next_slot(
        config,
        prev.as_ref().map(|s| (s.radius_km, s.attempt_in_radius)),
        trigger,
    )
    .ok_or_else(|| {
        DispatchError::LimitExceeded(format!(
            "incident {} has exhausted every radius tier",
            incident.id
        ))
    })?;

    let candidates = matcher::find_candidates(
        storage,
        incident.id,
        incident.latitude,
        incident.longitude,
        slot.radius_km,
    )
    .await?;

    let now = Utc::now();
    let expires_at = now + Duration::seconds(config.response_deadline.as_secs() as i64);

    let session = storage
        .create_session_with_requests(
            incident.id,
            session_number,
            slot.radius_km,
            slot.attempt,
            trigger,
            cancelled_mission_id,
            &candidates,
            now,
            expires_at,
        )
        .await?;

    info!(
        incident_id = incident.id,
        session_number,
        radius_km = slot.radius_km,
        attempt = slot.attempt,
        pinged = candidates.len(),
        trigger = trigger.as_str(),
        "opened dispatch session"
    );

    notifier.session_opened(&session);
    for request in storage.requests_for_session(session.id).await? {
        notifier.request_sent(&request);
    }

    Ok(session)
}

/// Terminal-success path: a rescuer accepted `request`.
///
/// Runs the transactional accept (request, session, siblings, incident,
/// mission all in one write). Returns the new mission id, or `Conflict` when
/// some concurrent writer got there first.
pub async fn on_request_accepted(
    storage: &Storage,
    notifier: &dyn Notifier,
    request: &RescuerRequest,
) -> Result<i64, DispatchError> {
    let mission_id = storage
        .accept_request_and_open_mission(
            request.id,
            request.session_id,
            request.incident_id,
            &request.rescuer_id,
            Utc::now(),
        )
        .await?
        .ok_or_else(|| {
            DispatchError::Conflict(format!("request {} is already resolved", request.id))
        })?;

    notifier.mission_assigned(request.incident_id, mission_id, &request.rescuer_id);

    Ok(mission_id)
}

/// Every request of an active session reached a terminal non-accepted state.
///
/// Marks the session failed and, when the escalation ladder is spent, the
/// incident dispatch-failed. Escalation itself stays explicit: the caller
/// has to raise the range. Returns false when the session had already left
/// `Active` (idempotent under sweep/respond races).
pub async fn on_session_exhausted(
    storage: &Storage,
    config: &DispatchConfig,
    notifier: &dyn Notifier,
    session: &Session,
) -> Result<bool, DispatchError> {
    let failed = storage
        .transition_session(session.id, SessionStatus::Active, SessionStatus::Failed)
        .await?;

    if !failed {
        return Ok(false);
    }

    let ladder_spent = next_slot(
        config,
        Some((session.radius_km, session.attempt_in_radius)),
        SessionTrigger::RadiusExpanded,
    )
    .is_none()
        || session.session_number >= config.max_sessions;

    if ladder_spent {
        let marked = storage
            .transition_incident(
                session.incident_id,
                IncidentStatus::AwaitingRescue,
                IncidentStatus::DispatchFailed,
            )
            .await?;
        if marked {
            notifier.dispatch_failed(session.incident_id);
        }
    } else {
        notifier.session_exhausted(session);
    }

    info!(
        incident_id = session.incident_id,
        session_id = session.id,
        session_number = session.session_number,
        ladder_spent,
        "session failed with no acceptance"
    );

    Ok(true)
}
