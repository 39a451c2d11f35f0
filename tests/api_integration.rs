//! Integration tests for the dispatch API.
//!
//! These drive the full request/response cycle through HTTP, with the
//! expiry sweeper invoked directly (against an explicit clock instant) where
//! a scenario needs deadlines to pass without sleeping.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};
use axum_test::TestServer;
use chrono::{Duration, Utc};
use serde_json::json;

use naja::api::{
    AppState, get_incident, health_check, post_cancel_incident, post_cancel_mission,
    post_incident, post_raise_range, post_respond, put_rescuer, put_symptoms,
};
use naja::config::DispatchConfig;
use naja::model::{SymptomCategory, SymptomConfig, TimeScorePoint};
use naja::notify::{LogNotifier, SharedNotifier};
use naja::storage::Storage;
use naja::sweeper::Sweeper;

/// Ho Chi Minh City center; the worked examples use this spot.
const INCIDENT_LAT: f64 = 10.762622;
const INCIDENT_LNG: f64 = 106.660172;

struct TestContext {
    server: TestServer,
    storage: Storage,
    sweeper: Sweeper,
}

async fn test_context(name: &str) -> TestContext {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let storage = Storage::new(&url).await.unwrap();
    let config = DispatchConfig::default();
    let notifier: SharedNotifier = Arc::new(LogNotifier);

    let sweeper = Sweeper::new(storage.clone(), config.clone(), notifier.clone());

    let state = AppState {
        storage: storage.clone(),
        config: Arc::new(config),
        notifier,
    };

    let app = Router::new()
        .route("/incidents", post(post_incident))
        .route("/incidents/:id", get(get_incident))
        .route("/incidents/:id/raise-range", post(post_raise_range))
        .route("/incidents/:id/symptoms", put(put_symptoms))
        .route("/incidents/:id/cancel", post(post_cancel_incident))
        .route("/requests/:id/respond", post(post_respond))
        .route("/missions/:id/cancel", post(post_cancel_mission))
        .route("/rescuers/:id", put(put_rescuer))
        .route("/health", get(health_check))
        .with_state(state);

    TestContext {
        server: TestServer::new(app).unwrap(),
        storage,
        sweeper,
    }
}

async fn register_rescuer(server: &TestServer, id: &str, latitude: f64, longitude: f64) {
    server
        .put(&format!("/rescuers/{id}"))
        .json(&json!({
            "name": id,
            "latitude": latitude,
            "longitude": longitude,
            "rating": 4.0
        }))
        .await
        .assert_status(axum::http::StatusCode::NO_CONTENT);
}

async fn report_incident(server: &TestServer) -> i64 {
    let response = server
        .post("/incidents")
        .json(&json!({
            "reporter_id": "acct-1",
            "latitude": INCIDENT_LAT,
            "longitude": INCIDENT_LNG
        }))
        .await;

    response.assert_status(axum::http::StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    body["incident_id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let ctx = test_context("api_health").await;

    ctx.server.get("/health").await.assert_status_ok();
}

#[tokio::test]
async fn test_create_incident_opens_first_session() {
    let ctx = test_context("api_create").await;

    register_rescuer(&ctx.server, "r1", INCIDENT_LAT + 0.01, INCIDENT_LNG).await;

    let response = ctx
        .server
        .post("/incidents")
        .json(&json!({
            "reporter_id": "acct-1",
            "latitude": INCIDENT_LAT,
            "longitude": INCIDENT_LNG,
            "location_label": "east trail"
        }))
        .await;

    response.assert_status(axum::http::StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "awaiting_rescue");
    assert_eq!(body["current_session_number"], 1);
    assert_eq!(body["current_radius_km"], 5.0);
    assert_eq!(body["rescuers_pinged"], 1);
}

#[tokio::test]
async fn test_create_incident_rejects_bad_coordinates() {
    let ctx = test_context("api_bad_coords").await;

    let response = ctx
        .server
        .post("/incidents")
        .json(&json!({
            "reporter_id": "acct-1",
            "latitude": 123.0,
            "longitude": 106.0
        }))
        .await;

    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "validation");
}

#[tokio::test]
async fn test_unknown_incident_is_404() {
    let ctx = test_context("api_unknown_incident").await;

    ctx.server
        .get("/incidents/9999")
        .await
        .assert_status(axum::http::StatusCode::NOT_FOUND);

    ctx.server
        .post("/incidents/9999/raise-range")
        .await
        .assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_scenario_no_response_then_session_fails() {
    // Scenario A: nobody answers before the deadline; the sweep expires the
    // batch and the session fails.
    let ctx = test_context("api_scenario_a").await;

    register_rescuer(&ctx.server, "r1", INCIDENT_LAT + 0.01, INCIDENT_LNG).await;
    let incident_id = report_incident(&ctx.server).await;

    let outcome = ctx
        .sweeper
        .sweep_once(Utc::now() + Duration::seconds(121))
        .await
        .unwrap();
    assert_eq!(outcome.requests_expired, 1);
    assert_eq!(outcome.sessions_failed, 1);

    let response = ctx.server.get(&format!("/incidents/{incident_id}")).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["incident"]["status"], "awaiting_rescue");
    assert_eq!(body["session"]["status"], "failed");
    assert_eq!(body["requests"][0]["status"], "expired");
}

#[tokio::test]
async fn test_scenario_raise_range_walks_tiers() {
    // Scenario B: second attempt at the same tier, then the next tier.
    let ctx = test_context("api_scenario_b").await;

    register_rescuer(&ctx.server, "r1", INCIDENT_LAT + 0.01, INCIDENT_LNG).await;
    let incident_id = report_incident(&ctx.server).await;

    // Raising while session 1 is still active is a conflict
    ctx.server
        .post(&format!("/incidents/{incident_id}/raise-range"))
        .await
        .assert_status(axum::http::StatusCode::CONFLICT);

    ctx.sweeper
        .sweep_once(Utc::now() + Duration::seconds(121))
        .await
        .unwrap();

    let response = ctx
        .server
        .post(&format!("/incidents/{incident_id}/raise-range"))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["session_number"], 2);
    assert_eq!(body["radius_km"], 5.0);
    assert_eq!(body["attempt_in_radius"], 2);

    // Session 2 has no candidates (r1 was already pinged at 5 km), so the
    // next sweep fails it immediately
    ctx.sweeper.sweep_once(Utc::now()).await.unwrap();

    let response = ctx
        .server
        .post(&format!("/incidents/{incident_id}/raise-range"))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["session_number"], 3);
    assert_eq!(body["radius_km"], 10.0);
    assert_eq!(body["attempt_in_radius"], 1);
}

#[tokio::test]
async fn test_session_ceiling_returns_limit_exceeded() {
    let ctx = test_context("api_ceiling").await;

    let incident_id = report_incident(&ctx.server).await;

    // Sessions open with zero candidates here, so each sweep fails the
    // current one and each raise opens the next
    for _ in 1..6 {
        ctx.sweeper.sweep_once(Utc::now()).await.unwrap();
        ctx.server
            .post(&format!("/incidents/{incident_id}/raise-range"))
            .await
            .assert_status_ok();
    }

    ctx.sweeper.sweep_once(Utc::now()).await.unwrap();

    let response = ctx
        .server
        .post(&format!("/incidents/{incident_id}/raise-range"))
        .await;
    response.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "limit_exceeded");

    // Exhausting the final slot marked dispatch as failed
    let response = ctx.server.get(&format!("/incidents/{incident_id}")).await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["incident"]["status"], "dispatch_failed");
}

#[tokio::test]
async fn test_accept_flow_creates_mission_and_takes_siblings() {
    let ctx = test_context("api_accept").await;

    register_rescuer(&ctx.server, "r1", INCIDENT_LAT + 0.01, INCIDENT_LNG).await;
    register_rescuer(&ctx.server, "r2", INCIDENT_LAT + 0.02, INCIDENT_LNG).await;
    let incident_id = report_incident(&ctx.server).await;

    let response = ctx.server.get(&format!("/incidents/{incident_id}")).await;
    let body: serde_json::Value = response.json();
    let requests = body["requests"].as_array().unwrap();
    assert_eq!(requests.len(), 2);

    // Nearest-first: r1 holds the first request
    assert_eq!(requests[0]["rescuer_id"], "r1");
    let first_id = requests[0]["id"].as_i64().unwrap();
    let second_id = requests[1]["id"].as_i64().unwrap();

    let response = ctx
        .server
        .post(&format!("/requests/{first_id}/respond"))
        .json(&json!({ "rescuer_id": "r1", "accept": true }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "accepted");
    assert!(body["mission_id"].is_i64());

    // The loser of the race sees a conflict
    let response = ctx
        .server
        .post(&format!("/requests/{second_id}/respond"))
        .json(&json!({ "rescuer_id": "r2", "accept": true }))
        .await;
    response.assert_status(axum::http::StatusCode::CONFLICT);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "conflict");

    let response = ctx.server.get(&format!("/incidents/{incident_id}")).await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["incident"]["status"], "rescuer_assigned");
    assert_eq!(body["session"]["status"], "completed");
    assert_eq!(body["requests"][0]["status"], "accepted");
    assert_eq!(body["requests"][1]["status"], "taken");
}

#[tokio::test]
async fn test_respond_actor_mismatch_is_forbidden() {
    let ctx = test_context("api_forbidden").await;

    register_rescuer(&ctx.server, "r1", INCIDENT_LAT + 0.01, INCIDENT_LNG).await;
    let incident_id = report_incident(&ctx.server).await;

    let response = ctx.server.get(&format!("/incidents/{incident_id}")).await;
    let body: serde_json::Value = response.json();
    let request_id = body["requests"][0]["id"].as_i64().unwrap();

    ctx.server
        .post(&format!("/requests/{request_id}/respond"))
        .json(&json!({ "rescuer_id": "impostor", "accept": true }))
        .await
        .assert_status(axum::http::StatusCode::FORBIDDEN);

    ctx.server
        .post("/requests/424242/respond")
        .json(&json!({ "rescuer_id": "r1", "accept": true }))
        .await
        .assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_symptom_update_scores_with_elapsed_time() {
    // Scenario C: one Core attribute at 40 and one Modifier at 15 by the
    // 10-minute breakpoint, scored 12 minutes after the bite.
    let ctx = test_context("api_scenario_c").await;

    ctx.storage
        .insert_symptom_config(&SymptomConfig {
            key: "ptosis".to_string(),
            name: "Drooping eyelids".to_string(),
            input_type: "checkbox".to_string(),
            display_order: 1,
            active: true,
            category: SymptomCategory::Core,
            time_scores: vec![
                TimeScorePoint { minutes: 0, score: 10.0 },
                TimeScorePoint { minutes: 10, score: 40.0 },
                TimeScorePoint { minutes: 60, score: 80.0 },
            ],
            venom_type_id: None,
        })
        .await
        .unwrap();
    ctx.storage
        .insert_symptom_config(&SymptomConfig {
            key: "swelling".to_string(),
            name: "Local swelling".to_string(),
            input_type: "checkbox".to_string(),
            display_order: 2,
            active: true,
            category: SymptomCategory::Modifier,
            time_scores: vec![
                TimeScorePoint { minutes: 0, score: 5.0 },
                TimeScorePoint { minutes: 10, score: 15.0 },
            ],
            venom_type_id: None,
        })
        .await
        .unwrap();

    // The bite happened 12 minutes ago (inserted directly; the API stamps
    // occurrence at report time)
    let occurred_at = Utc::now() - Duration::minutes(12);
    let incident_id = ctx
        .storage
        .insert_incident("acct-1", INCIDENT_LAT, INCIDENT_LNG, None, &[], occurred_at)
        .await
        .unwrap();

    let response = ctx
        .server
        .put(&format!("/incidents/{incident_id}/symptoms"))
        .json(&json!({ "symptoms": ["ptosis", "swelling"] }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["severity"], 55.0);
    assert_eq!(body["band"], "severe");
    assert_eq!(body["elapsed_minutes"], 12);

    // Unknown keys are a validation failure
    let response = ctx
        .server
        .put(&format!("/incidents/{incident_id}/symptoms"))
        .json(&json!({ "symptoms": ["third_eye"] }))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_incident_is_terminal() {
    let ctx = test_context("api_cancel").await;

    register_rescuer(&ctx.server, "r1", INCIDENT_LAT + 0.01, INCIDENT_LNG).await;
    let incident_id = report_incident(&ctx.server).await;

    // Only the reporter may cancel
    ctx.server
        .post(&format!("/incidents/{incident_id}/cancel"))
        .json(&json!({ "reporter_id": "somebody-else" }))
        .await
        .assert_status(axum::http::StatusCode::FORBIDDEN);

    ctx.server
        .post(&format!("/incidents/{incident_id}/cancel"))
        .json(&json!({ "reporter_id": "acct-1" }))
        .await
        .assert_status(axum::http::StatusCode::NO_CONTENT);

    let response = ctx.server.get(&format!("/incidents/{incident_id}")).await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["incident"]["status"], "aborted");
    assert_eq!(body["session"]["status"], "cancelled");
    let request_id = body["requests"][0]["id"].as_i64().unwrap();
    assert_eq!(body["requests"][0]["status"], "cancelled");

    // A cancelled request can no longer be answered
    ctx.server
        .post(&format!("/requests/{request_id}/respond"))
        .json(&json!({ "rescuer_id": "r1", "accept": true }))
        .await
        .assert_status(axum::http::StatusCode::CONFLICT);

    // No escalation after a terminal cancel
    ctx.server
        .post(&format!("/incidents/{incident_id}/raise-range"))
        .await
        .assert_status(axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_mission_cancellation_reopens_dispatch() {
    let ctx = test_context("api_mission_cancel").await;

    register_rescuer(&ctx.server, "r1", INCIDENT_LAT + 0.01, INCIDENT_LNG).await;
    let incident_id = report_incident(&ctx.server).await;

    let response = ctx.server.get(&format!("/incidents/{incident_id}")).await;
    let body: serde_json::Value = response.json();
    let request_id = body["requests"][0]["id"].as_i64().unwrap();

    let response = ctx
        .server
        .post(&format!("/requests/{request_id}/respond"))
        .json(&json!({ "rescuer_id": "r1", "accept": true }))
        .await;
    let body: serde_json::Value = response.json();
    let mission_id = body["mission_id"].as_i64().unwrap();

    let response = ctx
        .server
        .post(&format!("/missions/{mission_id}/cancel"))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    // Same slot again, next session number
    assert_eq!(body["session_number"], 2);
    assert_eq!(body["radius_km"], 5.0);
    assert_eq!(body["attempt_in_radius"], 1);

    let response = ctx.server.get(&format!("/incidents/{incident_id}")).await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["incident"]["status"], "awaiting_rescue");
    assert_eq!(body["session"]["trigger"], "mission_cancelled");
}

#[tokio::test]
async fn test_full_workflow() {
    let ctx = test_context("api_full_workflow").await;

    // 1. Health check
    ctx.server.get("/health").await.assert_status_ok();

    // 2. Two rescuers come online
    register_rescuer(&ctx.server, "r1", INCIDENT_LAT + 0.01, INCIDENT_LNG).await;
    register_rescuer(&ctx.server, "r2", INCIDENT_LAT + 0.02, INCIDENT_LNG).await;

    // 3. A bite is reported; both get pinged
    let incident_id = report_incident(&ctx.server).await;

    // 4. r2 declines, r1 accepts
    let response = ctx.server.get(&format!("/incidents/{incident_id}")).await;
    let body: serde_json::Value = response.json();
    let requests = body["requests"].as_array().unwrap().clone();
    let by_rescuer = |id: &str| {
        requests
            .iter()
            .find(|r| r["rescuer_id"] == id)
            .unwrap()["id"]
            .as_i64()
            .unwrap()
    };

    ctx.server
        .post(&format!("/requests/{}/respond", by_rescuer("r2")))
        .json(&json!({ "rescuer_id": "r2", "accept": false }))
        .await
        .assert_status_ok();

    ctx.server
        .post(&format!("/requests/{}/respond", by_rescuer("r1")))
        .json(&json!({ "rescuer_id": "r1", "accept": true }))
        .await
        .assert_status_ok();

    // 5. The incident is assigned; a later sweep changes nothing
    ctx.sweeper
        .sweep_once(Utc::now() + Duration::seconds(300))
        .await
        .unwrap();

    let response = ctx.server.get(&format!("/incidents/{incident_id}")).await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["incident"]["status"], "rescuer_assigned");
    assert_eq!(body["session"]["status"], "completed");
}
