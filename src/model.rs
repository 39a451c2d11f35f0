//! Domain types for the rescue dispatch engine.
//!
//! The core entities form an ownership chain: an [`Incident`] owns its
//! [`Session`]s (one round of rescuer solicitation at a fixed radius each),
//! and every session owns the [`RescuerRequest`]s it fanned out. Reference
//! data ([`SymptomConfig`], [`VenomType`]) is read-only from the engine's
//! perspective.
//!
//! Status enums are stored as TEXT in SQLite; each carries an
//! `as_str`/`parse` pair so the column values stay greppable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Status enums
// ============================================================================

/// Lifecycle of a reported incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    /// Dispatch is running (or waiting on an explicit range raise).
    AwaitingRescue,
    /// A rescuer accepted; a mission is underway.
    RescuerAssigned,
    /// The mission completed.
    Resolved,
    /// The reporter cancelled the incident. Terminal.
    Aborted,
    /// Every escalation slot was exhausted with no acceptance. Terminal.
    DispatchFailed,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::AwaitingRescue => "awaiting_rescue",
            IncidentStatus::RescuerAssigned => "rescuer_assigned",
            IncidentStatus::Resolved => "resolved",
            IncidentStatus::Aborted => "aborted",
            IncidentStatus::DispatchFailed => "dispatch_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "awaiting_rescue" => Some(IncidentStatus::AwaitingRescue),
            "rescuer_assigned" => Some(IncidentStatus::RescuerAssigned),
            "resolved" => Some(IncidentStatus::Resolved),
            "aborted" => Some(IncidentStatus::Aborted),
            "dispatch_failed" => Some(IncidentStatus::DispatchFailed),
            _ => None,
        }
    }
}

/// Lifecycle of one solicitation session.
///
/// `Active` is the only non-terminal state; at most one session per incident
/// is ever `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    /// One request was accepted. The sole success path.
    Completed,
    /// Every request ended without an acceptance.
    Failed,
    /// The incident was cancelled while this session ran.
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            "failed" => Some(SessionStatus::Failed),
            "cancelled" => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }
}

/// Why a session was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionTrigger {
    /// First session, opened on incident intake.
    Initial,
    /// Opened by an explicit raise-range call after a failed session.
    RadiusExpanded,
    /// Re-opened because an assigned mission was cancelled.
    MissionCancelled,
}

impl SessionTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionTrigger::Initial => "initial",
            SessionTrigger::RadiusExpanded => "radius_expanded",
            SessionTrigger::MissionCancelled => "mission_cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "initial" => Some(SessionTrigger::Initial),
            "radius_expanded" => Some(SessionTrigger::RadiusExpanded),
            "mission_cancelled" => Some(SessionTrigger::MissionCancelled),
            _ => None,
        }
    }
}

/// Lifecycle of a single ping to a single rescuer.
///
/// `Pending` is the only non-terminal state. A terminal status is set exactly
/// once; every transition out of `Pending` is conditional on the row still
/// being `Pending`, which is what arbitrates the first-accept race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    /// This rescuer won the session.
    Accepted,
    /// The rescuer declined.
    Rejected,
    /// A sibling request was accepted first.
    Taken,
    /// The incident was cancelled before the rescuer answered.
    Cancelled,
    /// The response deadline passed; set by the sweeper, never by a rescuer.
    Expired,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Taken => "taken",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RequestStatus::Pending),
            "accepted" => Some(RequestStatus::Accepted),
            "rejected" => Some(RequestStatus::Rejected),
            "taken" => Some(RequestStatus::Taken),
            "cancelled" => Some(RequestStatus::Cancelled),
            "expired" => Some(RequestStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

/// Lifecycle of a mission created when a rescuer accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Active,
    Completed,
    Cancelled,
}

impl MissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissionStatus::Active => "active",
            MissionStatus::Completed => "completed",
            MissionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(MissionStatus::Active),
            "completed" => Some(MissionStatus::Completed),
            "cancelled" => Some(MissionStatus::Cancelled),
            _ => None,
        }
    }
}

/// How a symptom attribute contributes to the aggregate severity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymptomCategory {
    /// Core attributes contribute via maximum across selected attributes.
    Core,
    /// Modifier attributes contribute via sum.
    Modifier,
}

impl SymptomCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymptomCategory::Core => "core",
            SymptomCategory::Modifier => "modifier",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "core" => Some(SymptomCategory::Core),
            "modifier" => Some(SymptomCategory::Modifier),
            _ => None,
        }
    }
}

// ============================================================================
// Core entities
// ============================================================================

/// A reported snakebite incident.
///
/// Created on intake and never deleted; terminal outcomes are recorded in
/// `status`. `current_session_number` and `current_radius_km` mirror the
/// latest session for cheap summary reads.
#[derive(Debug, Clone, Serialize)]
pub struct Incident {
    pub id: i64,

    /// Authenticated account id of the reporter, issued upstream.
    pub reporter_id: String,

    pub latitude: f64,
    pub longitude: f64,

    /// Free-text location hint ("behind the pump house"), if any.
    pub location_label: Option<String>,

    pub status: IncidentStatus,
    pub current_session_number: u32,
    pub current_radius_km: f64,

    /// When the bite occurred. Severity scoring measures elapsed time from
    /// this instant, not from report submission.
    pub occurred_at: DateTime<Utc>,

    /// Selected symptom attribute keys, merged across report updates.
    pub symptom_report: Vec<String>,

    /// Last computed severity score, if symptoms have been reported.
    pub severity: Option<f64>,
}

/// One round of rescuer solicitation at a fixed radius.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: i64,
    pub incident_id: i64,

    /// Ordinal per incident, 1-based, monotonically increasing.
    pub session_number: u32,

    /// Search radius. Non-decreasing across an incident's sessions.
    pub radius_km: f64,

    /// Which try at this radius tier this is (1-based).
    pub attempt_in_radius: u32,

    pub status: SessionStatus,
    pub trigger: SessionTrigger,

    /// Number of rescuers pinged when the session opened.
    pub rescuers_pinged: u32,

    /// The mission whose cancellation triggered this session, if any.
    pub cancelled_mission_id: Option<i64>,

    pub created_at: DateTime<Utc>,
}

/// A single ping to a single candidate rescuer.
#[derive(Debug, Clone, Serialize)]
pub struct RescuerRequest {
    pub id: i64,
    pub session_id: i64,

    /// Denormalized for fast per-incident lookups.
    pub incident_id: i64,

    pub rescuer_id: String,
    pub status: RequestStatus,
    pub sent_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,

    /// Hard deadline after which the sweeper expires the request.
    pub expires_at: DateTime<Utc>,
}

/// A rescue mission, created when a request is accepted.
#[derive(Debug, Clone, Serialize)]
pub struct Mission {
    pub id: i64,
    pub incident_id: i64,
    pub session_id: i64,
    pub rescuer_id: String,
    pub status: MissionStatus,
    pub created_at: DateTime<Utc>,
}

/// A rescuer's profile and last known position.
///
/// Rescuers are ordinary accounts upstream; this record is the
/// dispatch-relevant projection, joined by account id rather than modeled as
/// a specialized account type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescuerProfile {
    pub account_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,

    /// Community rating, used to break distance ties.
    pub rating: f64,

    /// Whether the rescuer is currently accepting requests.
    pub available: bool,
}

// ============================================================================
// Reference data
// ============================================================================

/// One (elapsed-minutes, score) breakpoint in a symptom's time curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeScorePoint {
    /// Minutes elapsed since the bite at which this score applies.
    pub minutes: i64,
    pub score: f64,
}

/// Configuration for one reportable symptom attribute.
///
/// Breakpoints in `time_scores` are strictly increasing in `minutes`; the
/// scorer selects the breakpoint at or before the elapsed time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymptomConfig {
    /// Stable attribute key, e.g. "ptosis" or "local_swelling".
    pub key: String,
    pub name: String,

    /// UI input type hint ("checkbox", "scale", ...). Opaque to the engine.
    pub input_type: String,

    pub display_order: i64,
    pub active: bool,
    pub category: SymptomCategory,
    pub time_scores: Vec<TimeScorePoint>,

    /// Venom type this symptom is characteristic of, if any.
    pub venom_type_id: Option<i64>,
}

/// Read-only venom reference data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenomType {
    pub id: i64,
    pub name: String,

    /// Relative danger on a 1-10 scale.
    pub severity_index: i64,

    /// Linked first-aid guideline text.
    pub first_aid: String,
}

/// Coarse severity band derived from the numeric score.
///
/// Bands are a presentation aid; the score itself is the authoritative
/// severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityBand {
    /// Score below 25% of the ceiling.
    Mild,
    /// 25% to 50% of the ceiling.
    Moderate,
    /// 50% to 80% of the ceiling.
    Severe,
    /// 80% of the ceiling and above.
    Critical,
}

impl SeverityBand {
    /// Band for a score relative to the configured ceiling.
    pub fn from_score(score: f64, ceiling: f64) -> Self {
        if ceiling <= 0.0 {
            return SeverityBand::Critical;
        }

        let ratio = score / ceiling;

        if ratio < 0.25 {
            SeverityBand::Mild
        } else if ratio < 0.5 {
            SeverityBand::Moderate
        } else if ratio < 0.8 {
            SeverityBand::Severe
        } else {
            SeverityBand::Critical
        }
    }
}

// ============================================================================
// Request / response bodies
// ============================================================================

/// Request body for POST /incidents.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateIncidentRequest {
    /// Authenticated reporter account id, supplied by the gateway.
    pub reporter_id: String,

    pub latitude: f64,
    pub longitude: f64,

    #[serde(default)]
    pub location_label: Option<String>,

    /// Initial symptom selections, if any were captured at intake.
    #[serde(default)]
    pub symptoms: Vec<String>,
}

/// Response for POST /incidents.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentCreatedResponse {
    pub incident_id: i64,
    pub status: IncidentStatus,
    pub current_session_number: u32,
    pub current_radius_km: f64,
    pub rescuers_pinged: u32,
}

/// Summary of a newly opened session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: i64,
    pub session_number: u32,
    pub radius_km: f64,
    pub attempt_in_radius: u32,
    pub rescuers_pinged: u32,
}

impl SessionSummary {
    pub fn from_session(session: &Session) -> Self {
        Self {
            session_id: session.id,
            session_number: session.session_number,
            radius_km: session.radius_km,
            attempt_in_radius: session.attempt_in_radius,
            rescuers_pinged: session.rescuers_pinged,
        }
    }
}

/// Request body for PUT /incidents/:id/symptoms.
#[derive(Debug, Clone, Deserialize)]
pub struct SymptomReportRequest {
    /// Symptom attribute keys selected by the reporter.
    pub symptoms: Vec<String>,
}

/// Response for PUT /incidents/:id/symptoms.
#[derive(Debug, Clone, Serialize)]
pub struct SeverityResponse {
    /// Clamped aggregate severity score.
    pub severity: f64,
    pub band: SeverityBand,

    /// Elapsed minutes since the bite used for this scoring pass.
    pub elapsed_minutes: i64,

    /// Most dangerous venom type suggested by the selected symptoms.
    pub likely_venom: Option<VenomSummary>,
}

/// Venom details surfaced with a severity response.
#[derive(Debug, Clone, Serialize)]
pub struct VenomSummary {
    pub name: String,
    pub severity_index: i64,
    pub first_aid: String,
}

/// Request body for POST /requests/:id/respond.
#[derive(Debug, Clone, Deserialize)]
pub struct RespondRequest {
    /// Authenticated rescuer account id.
    pub rescuer_id: String,
    pub accept: bool,
}

/// Response for POST /requests/:id/respond.
#[derive(Debug, Clone, Serialize)]
pub struct RespondResponse {
    pub status: RequestStatus,

    /// Set when the acceptance created a mission.
    pub mission_id: Option<i64>,
}

/// Request body for POST /incidents/:id/cancel.
#[derive(Debug, Clone, Deserialize)]
pub struct CancelIncidentRequest {
    /// Must match the incident's reporter.
    pub reporter_id: String,
}

/// Request body for PUT /rescuers/:id.
#[derive(Debug, Clone, Deserialize)]
pub struct RescuerUpsertRequest {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,

    #[serde(default)]
    pub rating: f64,

    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

/// Response for GET /incidents/:id.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentDetailResponse {
    pub incident: Incident,

    /// The incident's latest session, if any.
    pub session: Option<Session>,

    /// Requests belonging to the latest session.
    pub requests: Vec<RescuerRequest>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip() {
        for status in [
            IncidentStatus::AwaitingRescue,
            IncidentStatus::RescuerAssigned,
            IncidentStatus::Resolved,
            IncidentStatus::Aborted,
            IncidentStatus::DispatchFailed,
        ] {
            assert_eq!(IncidentStatus::parse(status.as_str()), Some(status));
        }

        for status in [
            RequestStatus::Pending,
            RequestStatus::Accepted,
            RequestStatus::Rejected,
            RequestStatus::Taken,
            RequestStatus::Cancelled,
            RequestStatus::Expired,
        ] {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }

        assert_eq!(IncidentStatus::parse("unknown"), None);
        assert_eq!(RequestStatus::parse(""), None);
    }

    #[test]
    fn pending_is_the_only_non_terminal_request_state() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Accepted.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
        assert!(RequestStatus::Taken.is_terminal());
        assert!(RequestStatus::Cancelled.is_terminal());
        assert!(RequestStatus::Expired.is_terminal());
    }

    #[test]
    fn severity_bands_follow_ceiling_ratio() {
        assert_eq!(SeverityBand::from_score(0.0, 100.0), SeverityBand::Mild);
        assert_eq!(SeverityBand::from_score(24.9, 100.0), SeverityBand::Mild);
        assert_eq!(SeverityBand::from_score(25.0, 100.0), SeverityBand::Moderate);
        assert_eq!(SeverityBand::from_score(55.0, 100.0), SeverityBand::Severe);
        assert_eq!(SeverityBand::from_score(80.0, 100.0), SeverityBand::Critical);
        assert_eq!(SeverityBand::from_score(100.0, 100.0), SeverityBand::Critical);
    }

    #[test]
    fn severity_band_degenerate_ceiling() {
        assert_eq!(SeverityBand::from_score(1.0, 0.0), SeverityBand::Critical);
    }
}
