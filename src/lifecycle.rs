//! Per-request response handling.
//!
//! A rescuer answers a ping with accept or reject. Accepting runs the
//! first-accept arbitration (see `Storage::accept_request_and_open_mission`);
//! rejecting may leave the session with nothing pending, in which case it is
//! exhausted on the spot rather than waiting for the sweeper.

use chrono::Utc;
use tracing::info;

use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::model::{RequestStatus, RespondResponse, SessionStatus};
use crate::notify::Notifier;
use crate::session;
use crate::storage::Storage;

/// Record a rescuer's answer to a request.
///
/// Fails with `NotFound` for an unknown request id, `Forbidden` when
/// `rescuer_id` is not the request's addressee, and `Conflict` when the
/// request already left `Pending` (a sibling acceptance, the sweeper, or a
/// duplicate submission got there first). An overdue request that the
/// sweeper has not yet observed is still answerable; expiry is the sweeper's
/// call alone.
pub async fn respond(
    storage: &Storage,
    config: &DispatchConfig,
    notifier: &dyn Notifier,
    request_id: i64,
    rescuer_id: &str,
    accept: bool,
) -> Result<RespondResponse, DispatchError> {
    let request = storage
        .get_request(request_id)
        .await?
        .ok_or_else(|| DispatchError::NotFound(format!("request {request_id}")))?;

    if request.rescuer_id != rescuer_id {
        return Err(DispatchError::Forbidden(format!(
            "request {request_id} is not addressed to this rescuer"
        )));
    }

    if request.status != RequestStatus::Pending {
        return Err(DispatchError::Conflict(format!(
            "request {request_id} is already {}",
            request.status.as_str()
        )));
    }

    if accept {
        let mission_id = session::on_request_accepted(storage, notifier, &request).await?;

        info!(
            request_id,
            incident_id = request.incident_id,
            rescuer_id = %rescuer_id,
            mission_id,
            "request accepted"
        );

        return Ok(RespondResponse {
            status: RequestStatus::Accepted,
            mission_id: Some(mission_id),
        });
    }

    let rejected = storage
        .transition_request(
            request_id,
            RequestStatus::Pending,
            RequestStatus::Rejected,
            Some(Utc::now()),
        )
        .await?;

    if !rejected {
        return Err(DispatchError::Conflict(format!(
            "request {request_id} is already resolved"
        )));
    }

    info!(
        request_id,
        incident_id = request.incident_id,
        rescuer_id = %rescuer_id,
        "request rejected"
    );

    // Last pending request gone: exhaust the session now instead of waiting
    // a sweep cycle. The conditional transition inside keeps this safe
    // against a concurrent sibling acceptance.
    if storage.count_pending_requests(request.session_id).await? == 0 {
        if let Some(session) = storage.get_session(request.session_id).await? {
            if session.status == SessionStatus::Active {
                session::on_session_exhausted(storage, config, notifier, &session).await?;
            }
        }
    }

    Ok(RespondResponse {
        status: RequestStatus::Rejected,
        mission_id: None,
    })
}
