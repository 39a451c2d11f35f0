//! Outbound dispatch events.
//!
//! Push delivery to rescuer devices is an external concern; the engine only
//! emits events at the moments something downstream would care about. The
//! default sink logs them, and a webhook sink forwards them as JSON when
//! `NAJA_WEBHOOK_URL` is configured. Delivery is fire-and-forget: a lost
//! event never blocks or fails dispatch.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::model::{RescuerRequest, Session};

/// Sink for dispatch events.
pub trait Notifier: Send + Sync {
    /// A rescuer was pinged with a new request.
    fn request_sent(&self, request: &RescuerRequest);

    /// A session opened (with however many pings the matcher produced).
    fn session_opened(&self, session: &Session);

    /// A session failed with no acceptance; escalation is available.
    fn session_exhausted(&self, session: &Session);

    /// Every escalation slot is spent. The incident needs human attention.
    fn dispatch_failed(&self, incident_id: i64);

    /// A rescuer accepted and a mission was created.
    fn mission_assigned(&self, incident_id: i64, mission_id: i64, rescuer_id: &str);

    /// An assigned mission was called off.
    fn mission_cancelled(&self, incident_id: i64, mission_id: i64);
}

pub type SharedNotifier = Arc<dyn Notifier>;

/// Default sink: structured log lines only.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn request_sent(&self, request: &RescuerRequest) {
        info!(
            request_id = request.id,
            incident_id = request.incident_id,
            rescuer_id = %request.rescuer_id,
            expires_at = %request.expires_at,
            "rescuer request sent"
        );
    }

    fn session_opened(&self, session: &Session) {
        info!(
            incident_id = session.incident_id,
            session_id = session.id,
            session_number = session.session_number,
            radius_km = session.radius_km,
            attempt = session.attempt_in_radius,
            pinged = session.rescuers_pinged,
            "session opened"
        );
    }

    fn session_exhausted(&self, session: &Session) {
        info!(
            incident_id = session.incident_id,
            session_id = session.id,
            session_number = session.session_number,
            radius_km = session.radius_km,
            "session exhausted with no acceptance"
        );
    }

    fn dispatch_failed(&self, incident_id: i64) {
        warn!(incident_id, "dispatch failed: all escalation slots spent");
    }

    fn mission_assigned(&self, incident_id: i64, mission_id: i64, rescuer_id: &str) {
        info!(incident_id, mission_id, rescuer_id = %rescuer_id, "mission assigned");
    }

    fn mission_cancelled(&self, incident_id: i64, mission_id: i64) {
        info!(incident_id, mission_id, "mission cancelled");
    }
}

/// Forwards events to an HTTP endpoint as JSON.
///
/// Sends happen on spawned tasks; failures are logged and dropped.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }

    fn post(&self, payload: serde_json::Value) {
        let client = self.client.clone();
        let url = self.url.clone();

        tokio::spawn(async move {
            if let Err(e) = client.post(&url).json(&payload).send().await {
                warn!(error = %e, "webhook delivery failed");
            }
        });
    }
}

impl Notifier for WebhookNotifier {
    fn request_sent(&self, request: &RescuerRequest) {
        self.post(json!({
            "event": "request_sent",
            "request_id": request.id,
            "incident_id": request.incident_id,
            "rescuer_id": request.rescuer_id,
            "expires_at": request.expires_at,
        }));
    }

    fn session_opened(&self, session: &Session) {
        self.post(json!({
            "event": "session_opened",
            "incident_id": session.incident_id,
            "session_id": session.id,
            "session_number": session.session_number,
            "radius_km": session.radius_km,
            "attempt_in_radius": session.attempt_in_radius,
            "rescuers_pinged": session.rescuers_pinged,
        }));
    }

    fn session_exhausted(&self, session: &Session) {
        self.post(json!({
            "event": "session_exhausted",
            "incident_id": session.incident_id,
            "session_id": session.id,
            "session_number": session.session_number,
        }));
    }

    fn dispatch_failed(&self, incident_id: i64) {
        self.post(json!({
            "event": "dispatch_failed",
            "incident_id": incident_id,
        }));
    }

    fn mission_assigned(&self, incident_id: i64, mission_id: i64, rescuer_id: &str) {
        self.post(json!({
            "event": "mission_assigned",
            "incident_id": incident_id,
            "mission_id": mission_id,
            "rescuer_id": rescuer_id,
        }));
    }

    fn mission_cancelled(&self, incident_id: i64, mission_id: i64) {
        self.post(json!({
            "event": "mission_cancelled",
            "incident_id": incident_id,
            "mission_id": mission_id,
        }));
    }
}
