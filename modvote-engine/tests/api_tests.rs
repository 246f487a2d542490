//! Integration tests for modvote-engine HTTP endpoints

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use helpers::*;
use serde_json::{json, Value};
use modvote_engine::build_router;
use tower::util::ServiceExt; // for `oneshot` method

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

fn create_body(id: &str) -> Value {
    json!({
        "id": id,
        "guild_id": GUILD,
        "thread_id": THREAD,
        "vote_message_id": VOTE_MESSAGE,
        "reported_user_id": REPORTED,
        "initiator_id": "m1",
    })
}

// =============================================================================
// Health / build info
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let harness = setup().await;
    let app = build_router(harness.state.clone());

    let response = app.oneshot(empty_request("GET", "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "modvote-engine");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_buildinfo_endpoint() {
    let harness = setup().await;
    let app = build_router(harness.state.clone());

    let response = app.oneshot(empty_request("GET", "/api/buildinfo")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert!(body["git_hash"].is_string());
    assert!(body["build_profile"].is_string());
}

// =============================================================================
// Escalations
// =============================================================================

#[tokio::test]
async fn test_create_uses_guild_quorum() {
    let harness = setup().await;
    let app = build_router(harness.state.clone());

    let response = app
        .oneshot(json_request("POST", "/api/escalations", create_body("e1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["id"], "e1");
    assert_eq!(body["flags"]["quorum"], 3);
    assert_eq!(body["voting_strategy"], "simple");

    // The vote message was rendered with live buttons
    let message = harness.gateway.last_edit(VOTE_MESSAGE).unwrap();
    assert!(message.buttons.iter().any(|b| b.custom_id == "vote|e1|ban"));
}

#[tokio::test]
async fn test_create_generates_id_when_missing() {
    let harness = setup().await;
    let app = build_router(harness.state.clone());

    let mut body = create_body("unused");
    body.as_object_mut().unwrap().remove("id");
    body["quorum"] = json!(5);

    let response = app
        .oneshot(json_request("POST", "/api/escalations", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = extract_json(response.into_body()).await;
    assert!(!body["id"].as_str().unwrap().is_empty());
    assert_eq!(body["flags"]["quorum"], 5);
}

#[tokio::test]
async fn test_get_escalation_includes_tally() {
    let harness = setup().await;
    harness.open("e1", 3).await;
    harness.click("vote|e1|kick", "m1").await.unwrap();

    let app = build_router(harness.state.clone());
    let response = app
        .oneshot(empty_request("GET", "/api/escalations/e1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["escalation"]["id"], "e1");
    assert_eq!(body["tally"]["total_votes"], 1);
    assert_eq!(body["tally"]["leader"], "kick");
}

#[tokio::test]
async fn test_get_missing_escalation_is_404() {
    let harness = setup().await;
    let app = build_router(harness.state.clone());

    let response = app
        .oneshot(empty_request("GET", "/api/escalations/nope"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"], "not_found");
}

// =============================================================================
// Interactions
// =============================================================================

async fn post_interaction(harness: &Harness, custom_id: &str, user_id: &str) -> (StatusCode, Value) {
    let app = build_router(harness.state.clone());
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/interactions",
            json!({ "custom_id": custom_id, "guild_id": GUILD, "user_id": user_id }),
        ))
        .await
        .unwrap();

    let status = response.status();
    (status, extract_json(response.into_body()).await)
}

#[tokio::test]
async fn test_interaction_vote_reply() {
    let harness = setup().await;
    harness.open("e1", 3).await;

    let (status, body) = post_interaction(&harness, "vote|e1|ban", "m1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "Vote recorded for ban");
}

#[tokio::test]
async fn test_interaction_error_statuses() {
    let harness = setup().await;
    harness.open("e1", 3).await;

    let (status, body) = post_interaction(&harness, "expedite|e1", "bystander").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "not_authorized");

    let (status, body) = post_interaction(&harness, "expedite|e1", "m1").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "no_leader");

    let (status, _) = post_interaction(&harness, "escalate|e1|0", "m1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post_interaction(&harness, "vote|missing|ban", "m1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_interaction_on_resolved_is_conflict() {
    let harness = setup().await;
    harness.open("e1", 1).await;
    harness.click("vote|e1|track", "m1").await.unwrap();

    let (status, body) = post_interaction(&harness, "vote|e1|ban", "m2").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already_resolved");
}

// =============================================================================
// Guild settings / sweep
// =============================================================================

#[tokio::test]
async fn test_put_guild_settings_invalidates_cache() {
    let harness = setup().await;
    // Prime the cache with the original quorum
    assert_eq!(harness.state.authority.quorum(GUILD).await.unwrap(), 3);

    let app = build_router(harness.state.clone());
    let response = app
        .oneshot(json_request(
            "PUT",
            "/api/guilds/g1/settings",
            json!({ "quorum": 4, "moderator_role_ids": ["mods"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(harness.state.authority.quorum(GUILD).await.unwrap(), 4);
}

#[tokio::test]
async fn test_put_guild_settings_rejects_zero_quorum() {
    let harness = setup().await;
    let app = build_router(harness.state.clone());

    let response = app
        .oneshot(json_request("PUT", "/api/guilds/g1/settings", json!({ "quorum": 0 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_manual_sweep_reports_counts() {
    let harness = setup().await;
    harness.open("e1", 3).await;
    harness.clock.advance(chrono::Duration::hours(24));

    let app = build_router(harness.state.clone());
    let response = app.oneshot(empty_request("POST", "/api/sweep")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["processed"], 1);
    assert_eq!(body["succeeded"], 1);
    assert_eq!(body["failed"], 0);
}

#[tokio::test]
async fn test_manual_sweep_conflicts_with_running_sweep() {
    let harness = setup().await;
    harness.open("e1", 3).await;
    harness.click("vote|e1|ban", "m1").await.unwrap();
    harness.clock.advance(chrono::Duration::hours(16));

    let sweep = harness.start_held_sweep().await;

    let app = build_router(harness.state.clone());
    let response = app.oneshot(empty_request("POST", "/api/sweep")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"], "sweep_busy");

    harness.gateway.release_actions();
    let report = sweep.await.unwrap().unwrap().unwrap();
    assert_eq!(report.succeeded, 1);
}
