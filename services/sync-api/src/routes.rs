use crate::infra::{AppState, SqliteEngine};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use chrono::Utc;
use membership_sync::membership::membership_router;
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_service_routes(engine: Arc<SqliteEngine>) -> axum::Router {
    membership_router(engine)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck(Extension(state): Extension<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "service": state.service_name.as_ref(),
    }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use membership_sync::membership::{
        ReconciliationEngine, RoleEligibilityPolicy, SqliteMembershipStore, User,
    };
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn state(ready: bool) -> AppState {
        let recorder = PrometheusBuilder::new().build_recorder();
        AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(recorder.handle()),
            service_name: Arc::from("membership-sync-test"),
        }
    }

    fn app(ready: bool) -> axum::Router {
        let store = SqliteMembershipStore::in_memory().expect("in-memory store");
        store
            .insert_user(&User::new(1).with_role("teacher"))
            .expect("user seeded");
        let engine = Arc::new(ReconciliationEngine::new(
            Arc::new(store),
            Arc::new(RoleEligibilityPolicy::default()),
        ));
        with_service_routes(engine).layer(Extension(state(ready)))
    }

    async fn get_json(
        app: axum::Router,
        method: &str,
        uri: &str,
    ) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("router responds");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn health_reports_service_and_timestamp() {
        let (status, body) = get_json(app(true), "GET", "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "membership-sync-test");
        let timestamp = body["timestamp"].as_str().expect("timestamp string");
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[tokio::test]
    async fn readiness_tracks_flag() {
        let (status, body) = get_json(app(false), "GET", "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "initializing");

        let (status, body) = get_json(app(true), "GET", "/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
    }

    #[tokio::test]
    async fn reconcile_route_is_mounted() {
        let (status, body) = get_json(app(true), "POST", "/api/v1/memberships/reconcile").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tally"]["created"], 1);
    }
}
