//! SQLite storage layer for the dispatch engine.
//!
//! All SQL lives here. The state machines in `session` and `lifecycle` ride
//! on two primitives this module provides:
//!
//! - **Conditional transitions**: `UPDATE ... SET status = ? WHERE id = ?
//!   AND status = ?`, reporting success via `rows_affected`. Exactly one
//!   concurrent caller can win a transition out of a given state.
//! - **Transactional session opening**: the session row and its whole batch
//!   of rescuer requests become visible atomically, so a response can never
//!   observe a half-created session.
//!
//! Timestamps are stored as Unix seconds; list-valued columns
//! (symptom selections, time-score curves) are JSON TEXT.

use chrono::{DateTime, TimeZone, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};

use crate::model::{
    Incident, IncidentStatus, Mission, MissionStatus, RequestStatus, RescuerProfile,
    RescuerRequest, Session, SessionStatus, SessionTrigger, SymptomCategory, SymptomConfig,
    TimeScorePoint, VenomType,
};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

fn decode_err(msg: String) -> sqlx::Error {
    sqlx::Error::Decode(msg.into())
}

fn ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_ts(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).single().unwrap_or_default()
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:naja.db?mode=rwc")
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    /// Create the schema if it doesn't exist.
    ///
    /// The FK chain incident -> session -> request (and incident -> mission)
    /// cascades deletes within that chain only; reference tables stand alone.
    async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS incidents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                reporter_id TEXT NOT NULL,
                lat REAL NOT NULL,
                lng REAL NOT NULL,
                location_label TEXT,
                status TEXT NOT NULL,
                current_session_number INTEGER NOT NULL DEFAULT 0,
                current_radius_km REAL NOT NULL DEFAULT 0,
                occurred_at INTEGER NOT NULL,
                symptom_report TEXT NOT NULL DEFAULT '[]',
                severity REAL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                incident_id INTEGER NOT NULL REFERENCES incidents(id) ON DELETE CASCADE,
                session_number INTEGER NOT NULL,
                radius_km REAL NOT NULL,
                attempt_in_radius INTEGER NOT NULL,
                status TEXT NOT NULL,
                trigger TEXT NOT NULL,
                rescuers_pinged INTEGER NOT NULL DEFAULT 0,
                cancelled_mission_id INTEGER,
                created_at INTEGER NOT NULL,
                UNIQUE (incident_id, session_number)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS rescuer_requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                incident_id INTEGER NOT NULL,
                rescuer_id TEXT NOT NULL,
                status TEXT NOT NULL,
                sent_at INTEGER NOT NULL,
                responded_at INTEGER,
                expires_at INTEGER NOT NULL,
                UNIQUE (session_id, rescuer_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS missions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                incident_id INTEGER NOT NULL REFERENCES incidents(id) ON DELETE CASCADE,
                session_id INTEGER NOT NULL,
                rescuer_id TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS rescuer_profiles (
                account_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                lat REAL NOT NULL,
                lng REAL NOT NULL,
                rating REAL NOT NULL DEFAULT 0,
                available INTEGER NOT NULL DEFAULT 1
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS symptom_configs (
                key TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                input_type TEXT NOT NULL,
                display_order INTEGER NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 1,
                category TEXT NOT NULL,
                time_scores TEXT NOT NULL,
                venom_type_id INTEGER
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS venom_types (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                severity_index INTEGER NOT NULL,
                first_aid TEXT NOT NULL
            )
            "#,
            // Sweep scans pending requests by deadline
            r#"
            CREATE INDEX IF NOT EXISTS idx_requests_status_expiry
            ON rescuer_requests(status, expires_at)
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_requests_session
            ON rescuer_requests(session_id)
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_sessions_incident
            ON sessions(incident_id, session_number)
            "#,
        ];

        for stmt in statements {
            sqlx::query(stmt).execute(&self.pool).await?;
        }

        Ok(())
    }

    // ========================================================================
    // Incidents
    // ========================================================================

    /// Insert a new incident in `awaiting_rescue` status. Returns its id.
    pub async fn insert_incident(
        &self,
        reporter_id: &str,
        latitude: f64,
        longitude: f64,
        location_label: Option<&str>,
        symptoms: &[String],
        occurred_at: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let symptoms_json =
            serde_json::to_string(symptoms).map_err(|e| decode_err(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO incidents
                (reporter_id, lat, lng, location_label, status, occurred_at, symptom_report)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(reporter_id)
        .bind(latitude)
        .bind(longitude)
        .bind(location_label)
        .bind(IncidentStatus::AwaitingRescue.as_str())
        .bind(ts(occurred_at))
        .bind(symptoms_json)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_incident(&self, id: i64) -> Result<Option<Incident>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM incidents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_incident(&r)).transpose()
    }

    /// Conditionally move an incident between statuses.
    ///
    /// Returns false when the incident was not in `from` (someone else got
    /// there first, or the id is unknown).
    pub async fn transition_incident(
        &self,
        id: i64,
        from: IncidentStatus,
        to: IncidentStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE incidents SET status = ? WHERE id = ? AND status = ?")
            .bind(to.as_str())
            .bind(id)
            .bind(from.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Persist a merged symptom report and its computed severity.
    pub async fn update_symptom_report(
        &self,
        id: i64,
        symptoms: &[String],
        severity: f64,
    ) -> Result<(), sqlx::Error> {
        let symptoms_json =
            serde_json::to_string(symptoms).map_err(|e| decode_err(e.to_string()))?;

        sqlx::query("UPDATE incidents SET symptom_report = ?, severity = ? WHERE id = ?")
            .bind(symptoms_json)
            .bind(severity)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Open a session together with its whole request batch, atomically.
    ///
    /// Inside one transaction: any lingering active session of the incident
    /// is marked failed, the new session row is inserted as `active`, one
    /// pending request per candidate is created, and the incident's
    /// session-number/radius cursor advances. A concurrent reader sees either
    /// none of it or all of it, which is what lets a response racing the
    /// batch be answered with "unknown request".
    #[allow(clippy::too_many_arguments)]
    pub async fn create_session_with_requests(
        &self,
        incident_id: i64,
        session_number: u32,
        radius_km: f64,
        attempt_in_radius: u32,
        trigger: SessionTrigger,
        cancelled_mission_id: Option<i64>,
        candidate_ids: &[String],
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE sessions SET status = ? WHERE incident_id = ? AND status = ?")
            .bind(SessionStatus::Failed.as_str())
            .bind(incident_id)
            .bind(SessionStatus::Active.as_str())
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO sessions
                (incident_id, session_number, radius_km, attempt_in_radius,
                 status, trigger, rescuers_pinged, cancelled_mission_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(incident_id)
        .bind(session_number as i64)
        .bind(radius_km)
        .bind(attempt_in_radius as i64)
        .bind(SessionStatus::Active.as_str())
        .bind(trigger.as_str())
        .bind(candidate_ids.len() as i64)
        .bind(cancelled_mission_id)
        .bind(ts(now))
        .execute(&mut *tx)
        .await?;

        let session_id = result.last_insert_rowid();

        for rescuer_id in candidate_ids {
            sqlx::query(
                r#"
                INSERT INTO rescuer_requests
                    (session_id, incident_id, rescuer_id, status, sent_at, expires_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(session_id)
            .bind(incident_id)
            .bind(rescuer_id)
            .bind(RequestStatus::Pending.as_str())
            .bind(ts(now))
            .bind(ts(expires_at))
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "UPDATE incidents SET current_session_number = ?, current_radius_km = ? WHERE id = ?",
        )
        .bind(session_number as i64)
        .bind(radius_km)
        .bind(incident_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Session {
            id: session_id,
            incident_id,
            session_number,
            radius_km,
            attempt_in_radius,
            status: SessionStatus::Active,
            trigger,
            rescuers_pinged: candidate_ids.len() as u32,
            cancelled_mission_id,
            created_at: now,
        })
    }

    pub async fn get_session(&self, id: i64) -> Result<Option<Session>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_session(&r)).transpose()
    }

    /// The incident's most recent session, if any.
    pub async fn latest_session(&self, incident_id: i64) -> Result<Option<Session>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT * FROM sessions WHERE incident_id = ? ORDER BY session_number DESC LIMIT 1",
        )
        .bind(incident_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_session(&r)).transpose()
    }

    /// Conditionally move a session between statuses. The session-level half
    /// of the first-accept arbitration.
    pub async fn transition_session(
        &self,
        id: i64,
        from: SessionStatus,
        to: SessionStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE sessions SET status = ? WHERE id = ? AND status = ?")
            .bind(to.as_str())
            .bind(id)
            .bind(from.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Active sessions in which no request is pending or accepted any more.
    ///
    /// Sessions opened with zero candidates qualify immediately.
    pub async fn exhausted_active_sessions(&self) -> Result<Vec<Session>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT s.* FROM sessions s
            WHERE s.status = 'active'
              AND NOT EXISTS (
                  SELECT 1 FROM rescuer_requests r
                  WHERE r.session_id = s.id AND r.status IN ('pending', 'accepted')
              )
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_session).collect()
    }

    // ========================================================================
    // Rescuer requests
    // ========================================================================

    pub async fn get_request(&self, id: i64) -> Result<Option<RescuerRequest>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM rescuer_requests WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_request(&r)).transpose()
    }

    pub async fn requests_for_session(
        &self,
        session_id: i64,
    ) -> Result<Vec<RescuerRequest>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM rescuer_requests WHERE session_id = ? ORDER BY id")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_request).collect()
    }

    /// Conditionally move a request between statuses, stamping the response
    /// time when one is given. The request-level half of the first-accept
    /// arbitration; also what keeps sweep and respond from double-writing.
    pub async fn transition_request(
        &self,
        id: i64,
        from: RequestStatus,
        to: RequestStatus,
        responded_at: Option<DateTime<Utc>>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE rescuer_requests
            SET status = ?, responded_at = COALESCE(?, responded_at)
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(to.as_str())
        .bind(responded_at.map(ts))
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Move every other pending request of the session to `taken`.
    /// Returns how many siblings were taken.
    pub async fn take_pending_siblings(
        &self,
        session_id: i64,
        winning_request_id: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE rescuer_requests SET status = 'taken'
            WHERE session_id = ? AND id != ? AND status = 'pending'
            "#,
        )
        .bind(session_id)
        .bind(winning_request_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Expire every pending request whose deadline has passed. Idempotent;
    /// already-terminal rows are untouched.
    pub async fn expire_overdue_requests(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE rescuer_requests SET status = 'expired' WHERE status = 'pending' AND expires_at <= ?",
        )
        .bind(ts(now))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Number of still-pending requests in a session.
    pub async fn count_pending_requests(&self, session_id: i64) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            "SELECT COUNT(*) as n FROM rescuer_requests WHERE session_id = ? AND status = 'pending'",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("n"))
    }

    /// Rescuers already contacted for this incident at a session radius
    /// greater than or equal to `radius_km`. These must not be re-pinged
    /// until the radius strictly grows.
    pub async fn contacted_rescuers_at_radius(
        &self,
        incident_id: i64,
        radius_km: f64,
    ) -> Result<Vec<String>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT r.rescuer_id
            FROM rescuer_requests r
            JOIN sessions s ON s.id = r.session_id
            WHERE r.incident_id = ? AND s.radius_km >= ?
            "#,
        )
        .bind(incident_id)
        .bind(radius_km)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("rescuer_id")).collect())
    }

    /// The whole accept path as one transaction: request `pending ->
    /// accepted`, session `active -> completed`, pending siblings `-> taken`,
    /// incident `awaiting_rescue -> rescuer_assigned`, mission inserted.
    ///
    /// Any step finding its row already moved rolls the whole thing back and
    /// returns `None` - the caller lost the race. SQLite serializes writing
    /// transactions, so exactly one concurrent acceptance per session can
    /// come back `Some(mission_id)`.
    pub async fn accept_request_and_open_mission(
        &self,
        request_id: i64,
        session_id: i64,
        incident_id: i64,
        rescuer_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let won = sqlx::query(
            r#"
            UPDATE rescuer_requests SET status = 'accepted', responded_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(ts(now))
        .bind(request_id)
        .execute(&mut *tx)
        .await?;

        if won.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(None);
        }

        let session_won =
            sqlx::query("UPDATE sessions SET status = 'completed' WHERE id = ? AND status = 'active'")
                .bind(session_id)
                .execute(&mut *tx)
                .await?;

        if session_won.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query(
            r#"
            UPDATE rescuer_requests SET status = 'taken'
            WHERE session_id = ? AND id != ? AND status = 'pending'
            "#,
        )
        .bind(session_id)
        .bind(request_id)
        .execute(&mut *tx)
        .await?;

        let incident_won = sqlx::query(
            r#"
            UPDATE incidents SET status = 'rescuer_assigned'
            WHERE id = ? AND status = 'awaiting_rescue'
            "#,
        )
        .bind(incident_id)
        .execute(&mut *tx)
        .await?;

        if incident_won.rows_affected() != 1 {
            // Incident was aborted under us; the acceptance must not stand
            tx.rollback().await?;
            return Ok(None);
        }

        let mission = sqlx::query(
            r#"
            INSERT INTO missions (incident_id, session_id, rescuer_id, status, created_at)
            VALUES (?, ?, ?, 'active', ?)
            "#,
        )
        .bind(incident_id)
        .bind(session_id)
        .bind(rescuer_id)
        .bind(ts(now))
        .execute(&mut *tx)
        .await?;

        let mission_id = mission.last_insert_rowid();
        tx.commit().await?;

        Ok(Some(mission_id))
    }

    // ========================================================================
    // Missions
    // ========================================================================

    pub async fn get_mission(&self, id: i64) -> Result<Option<Mission>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM missions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_mission(&r)).transpose()
    }

    pub async fn transition_mission(
        &self,
        id: i64,
        from: MissionStatus,
        to: MissionStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE missions SET status = ? WHERE id = ? AND status = ?")
            .bind(to.as_str())
            .bind(id)
            .bind(from.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Abort an incident and everything still open under it, atomically:
    /// incident to `aborted`, active session to `cancelled`, pending requests
    /// to `cancelled`, active missions to `cancelled`.
    ///
    /// Returns false when the incident was already terminal.
    pub async fn cancel_dispatch(&self, incident_id: i64) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE incidents SET status = 'aborted'
            WHERE id = ? AND status IN ('awaiting_rescue', 'rescuer_assigned')
            "#,
        )
        .bind(incident_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("UPDATE sessions SET status = 'cancelled' WHERE incident_id = ? AND status = 'active'")
            .bind(incident_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE rescuer_requests SET status = 'cancelled' WHERE incident_id = ? AND status = 'pending'",
        )
        .bind(incident_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE missions SET status = 'cancelled' WHERE incident_id = ? AND status = 'active'")
            .bind(incident_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(true)
    }

    // ========================================================================
    // Rescuer profiles
    // ========================================================================

    pub async fn upsert_rescuer(&self, profile: &RescuerProfile) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO rescuer_profiles (account_id, name, lat, lng, rating, available)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(account_id) DO UPDATE SET
                name = excluded.name,
                lat = excluded.lat,
                lng = excluded.lng,
                rating = excluded.rating,
                available = excluded.available
            "#,
        )
        .bind(&profile.account_id)
        .bind(&profile.name)
        .bind(profile.latitude)
        .bind(profile.longitude)
        .bind(profile.rating)
        .bind(profile.available)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All rescuers currently flagged available. Distance filtering happens
    /// in the matcher.
    pub async fn available_rescuers(&self) -> Result<Vec<RescuerProfile>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM rescuer_profiles WHERE available = 1")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_rescuer).collect()
    }

    // ========================================================================
    // Reference data
    // ========================================================================

    pub async fn insert_symptom_config(&self, config: &SymptomConfig) -> Result<(), sqlx::Error> {
        let time_scores =
            serde_json::to_string(&config.time_scores).map_err(|e| decode_err(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO symptom_configs
                (key, name, input_type, display_order, active, category, time_scores, venom_type_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&config.key)
        .bind(&config.name)
        .bind(&config.input_type)
        .bind(config.display_order)
        .bind(config.active)
        .bind(config.category.as_str())
        .bind(time_scores)
        .bind(config.venom_type_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Active symptom configs, in display order.
    pub async fn list_active_symptom_configs(&self) -> Result<Vec<SymptomConfig>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM symptom_configs WHERE active = 1 ORDER BY display_order, key",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_symptom_config).collect()
    }

    pub async fn insert_venom_type(
        &self,
        name: &str,
        severity_index: i64,
        first_aid: &str,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO venom_types (name, severity_index, first_aid) VALUES (?, ?, ?)",
        )
        .bind(name)
        .bind(severity_index)
        .bind(first_aid)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn list_venom_types(&self) -> Result<Vec<VenomType>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM venom_types ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_venom).collect()
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn row_to_incident(row: &SqliteRow) -> Result<Incident, sqlx::Error> {
    let status_raw: String = row.try_get("status")?;
    let status = IncidentStatus::parse(&status_raw)
        .ok_or_else(|| decode_err(format!("unknown incident status '{status_raw}'")))?;

    let symptoms_raw: String = row.try_get("symptom_report")?;
    let symptom_report: Vec<String> =
        serde_json::from_str(&symptoms_raw).map_err(|e| decode_err(e.to_string()))?;

    Ok(Incident {
        id: row.try_get("id")?,
        reporter_id: row.try_get("reporter_id")?,
        latitude: row.try_get("lat")?,
        longitude: row.try_get("lng")?,
        location_label: row.try_get("location_label")?,
        status,
        current_session_number: row.try_get::<i64, _>("current_session_number")? as u32,
        current_radius_km: row.try_get("current_radius_km")?,
        occurred_at: from_ts(row.try_get("occurred_at")?),
        symptom_report,
        severity: row.try_get("severity")?,
    })
}

fn row_to_session(row: &SqliteRow) -> Result<Session, sqlx::Error> {
    let status_raw: String = row.try_get("status")?;
    let status = SessionStatus::parse(&status_raw)
        .ok_or_else(|| decode_err(format!("unknown session status '{status_raw}'")))?;

    let trigger_raw: String = row.try_get("trigger")?;
    let trigger = SessionTrigger::parse(&trigger_raw)
        .ok_or_else(|| decode_err(format!("unknown session trigger '{trigger_raw}'")))?;

    Ok(Session {
        id: row.try_get("id")?,
        incident_id: row.try_get("incident_id")?,
        session_number: row.try_get::<i64, _>("session_number")? as u32,
        radius_km: row.try_get("radius_km")?,
        attempt_in_radius: row.try_get::<i64, _>("attempt_in_radius")? as u32,
        status,
        trigger,
        rescuers_pinged: row.try_get::<i64, _>("rescuers_pinged")? as u32,
        cancelled_mission_id: row.try_get("cancelled_mission_id")?,
        created_at: from_ts(row.try_get("created_at")?),
    })
}

fn row_to_request(row: &SqliteRow) -> Result<RescuerRequest, sqlx::Error> {
    let status_raw: String = row.try_get("status")?;
    let status = RequestStatus::parse(&status_raw)
        .ok_or_else(|| decode_err(format!("unknown request status '{status_raw}'")))?;

    let responded_at: Option<i64> = row.try_get("responded_at")?;

    Ok(RescuerRequest {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        incident_id: row.try_get("incident_id")?,
        rescuer_id: row.try_get("rescuer_id")?,
        status,
        sent_at: from_ts(row.try_get("sent_at")?),
        responded_at: responded_at.map(from_ts),
        expires_at: from_ts(row.try_get("expires_at")?),
    })
}

fn row_to_mission(row: &SqliteRow) -> Result<Mission, sqlx::Error> {
    let status_raw: String = row.try_get("status")?;
    let status = MissionStatus::parse(&status_raw)
        .ok_or_else(|| decode_err(format!("unknown mission status '{status_raw}'")))?;

    Ok(Mission {
        id: row.try_get("id")?,
        incident_id: row.try_get("incident_id")?,
        session_id: row.try_get("session_id")?,
        rescuer_id: row.try_get("rescuer_id")?,
        status,
        created_at: from_ts(row.try_get("created_at")?),
    })
}

fn row_to_rescuer(row: &SqliteRow) -> Result<RescuerProfile, sqlx::Error> {
    Ok(RescuerProfile {
        account_id: row.try_get("account_id")?,
        name: row.try_get("name")?,
        latitude: row.try_get("lat")?,
        longitude: row.try_get("lng")?,
        rating: row.try_get("rating")?,
        available: row.try_get("available")?,
    })
}

fn row_to_symptom_config(row: &SqliteRow) -> Result<SymptomConfig, sqlx::Error> {
    let category_raw: String = row.try_get("category")?;
    let category = SymptomCategory::parse(&category_raw)
        .ok_or_else(|| decode_err(format!("unknown symptom category '{category_raw}'")))?;

    let scores_raw: String = row.try_get("time_scores")?;
    let time_scores: Vec<TimeScorePoint> =
        serde_json::from_str(&scores_raw).map_err(|e| decode_err(e.to_string()))?;

    Ok(SymptomConfig {
        key: row.try_get("key")?,
        name: row.try_get("name")?,
        input_type: row.try_get("input_type")?,
        display_order: row.try_get("display_order")?,
        active: row.try_get("active")?,
        category,
        time_scores,
        venom_type_id: row.try_get("venom_type_id")?,
    })
}

fn row_to_venom(row: &SqliteRow) -> Result<VenomType, sqlx::Error> {
    Ok(VenomType {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        severity_index: row.try_get("severity_index")?,
        first_aid: row.try_get("first_aid")?,
    })
}
