use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use rusqlite::Connection;
use serde_json::Value;
use tower::ServiceExt;

use super::common::*;
use crate::membership::eligibility::RoleEligibilityPolicy;
use crate::membership::engine::ReconciliationEngine;
use crate::membership::router::membership_router;
use crate::membership::sqlite::SqliteMembershipStore;

async fn read_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}

fn reconcile_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

#[tokio::test]
async fn reconcile_route_returns_tally() {
    let store = MemoryStore::with_users(scenario_users());
    store.seed_application(1);
    let engine = Arc::new(ReconciliationEngine::new(
        Arc::new(store.clone()),
        Arc::new(RoleEligibilityPolicy::default()),
    ));

    let response = membership_router(engine)
        .oneshot(reconcile_request("/api/v1/memberships/reconcile"))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["dry_run"], false);
    assert_eq!(body["tally"]["created"], 1);
    assert_eq!(body["tally"]["already_existing"], 1);
    assert_eq!(body["tally"]["ineligible"], 1);
    assert_eq!(body["tally"]["failed"], 0);
    assert_eq!(store.applications().len(), 2);
}

#[tokio::test]
async fn dry_run_returns_plan_without_writes() {
    let store = MemoryStore::with_users(scenario_users());
    let engine = Arc::new(ReconciliationEngine::new(
        Arc::new(store.clone()),
        Arc::new(RoleEligibilityPolicy::default()),
    ));

    let response = membership_router(engine)
        .oneshot(reconcile_request(
            "/api/v1/memberships/reconcile?dry_run=true",
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["dry_run"], true);
    assert_eq!(body["plan"]["to_create"], serde_json::json!([1, 3]));
    assert!(store.applications().is_empty());
}

#[tokio::test]
async fn setup_failure_maps_to_service_unavailable() {
    let store = Arc::new(SqliteMembershipStore::from_connection(
        Connection::open_in_memory().expect("in-memory database"),
    ));
    let engine = Arc::new(ReconciliationEngine::new(
        store,
        Arc::new(RoleEligibilityPolicy::default()),
    ));

    let response = membership_router(engine)
        .oneshot(reconcile_request("/api/v1/memberships/reconcile"))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = read_json(response).await;
    assert!(body["error"]
        .as_str()
        .expect("error message")
        .contains("failed to load users"));
}
