use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::eligibility::EligibilityPolicy;
use super::engine::{ReconcileError, ReconciliationEngine};
use super::repository::MembershipStore;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ReconcileParams {
    #[serde(default)]
    dry_run: bool,
}

/// Router builder exposing the reconciliation pass over HTTP.
pub fn membership_router<S, P>(engine: Arc<ReconciliationEngine<S, P>>) -> Router
where
    S: MembershipStore + ?Sized + 'static,
    P: EligibilityPolicy + ?Sized + 'static,
{
    Router::new()
        .route(
            "/api/v1/memberships/reconcile",
            post(reconcile_handler::<S, P>),
        )
        .with_state(engine)
}

pub(crate) async fn reconcile_handler<S, P>(
    State(engine): State<Arc<ReconciliationEngine<S, P>>>,
    Query(params): Query<ReconcileParams>,
) -> Response
where
    S: MembershipStore + ?Sized + 'static,
    P: EligibilityPolicy + ?Sized + 'static,
{
    let dry_run = params.dry_run;
    let joined = tokio::task::spawn_blocking(move || {
        if dry_run {
            engine.plan().map(|plan| json!({ "dry_run": true, "plan": plan }))
        } else {
            engine.run().map(|tally| json!({ "dry_run": false, "tally": tally }))
        }
    })
    .await;

    match joined {
        Ok(Ok(body)) => (StatusCode::OK, axum::Json(body)).into_response(),
        Ok(Err(err)) => setup_failure(err),
        Err(join_error) => {
            error!(error = %join_error, "reconciliation task aborted");
            let payload = json!({ "error": "reconciliation task aborted" });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

fn setup_failure(err: ReconcileError) -> Response {
    error!(error = %err, "reconciliation could not start");
    let payload = json!({ "error": err.to_string() });
    (StatusCode::SERVICE_UNAVAILABLE, axum::Json(payload)).into_response()
}
