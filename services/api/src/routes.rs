use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use kantama::workflows::leasing::{
    leasing_router, ApiState, Mailer, NotificationSink, WorkflowStore,
};
use serde_json::json;

pub(crate) fn with_service_routes<S, N, M>(state: ApiState<S, N, M>) -> Router
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    leasing_router(state).merge(operational_routes())
}

pub(crate) fn operational_routes() -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
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
    use crate::infra::{build_workflow, SeedDirectory};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use kantama::workflows::leasing::{MemoryBlobStore, TokenIssuer, WorkflowSettings};
    use kantama::workflows::leasing::{CompanyRegistry, PrhRegistryClient};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app_state(ready: bool) -> AppState {
        AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        }
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let Json(payload) = healthcheck().await;
        assert_eq!(payload, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn readiness_follows_the_flag() {
        let state = app_state(false);
        let app = operational_routes().layer(Extension(state.clone()));

        let response = app
            .clone()
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["status"], "initializing");

        state.readiness.store(true, Ordering::Release);
        let response = app
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ready");
    }

    #[tokio::test]
    async fn metrics_are_plain_text() {
        let response = operational_routes()
            .layer(Extension(app_state(true)))
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
            Some("text/plain; version=0.0.4")
        );
    }

    #[tokio::test]
    async fn service_routes_serve_the_leasing_api() {
        let seed = SeedDirectory::standard("myynti@kantama.fi");
        let workflow = build_workflow(
            WorkflowSettings::default(),
            &seed,
            Arc::new(MemoryBlobStore::new()),
        )
        .expect("workflow builds");
        let tokens = TokenIssuer::new(
            "service-routes-test-secret-0123456789",
            chrono::Duration::minutes(5),
        );
        let registry: Arc<dyn CompanyRegistry> = Arc::new(
            PrhRegistryClient::new("http://127.0.0.1:9", Duration::from_millis(200))
                .expect("client builds"),
        );
        let customer = seed
            .user_by_email("anna@konepaja.fi")
            .expect("customer seeded");
        let bearer = format!("Bearer {}", tokens.issue(customer).expect("token issued"));

        let app = with_service_routes(ApiState {
            workflow: Arc::new(workflow),
            tokens,
            registry,
        })
        .layer(Extension(app_state(true)));

        let response = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::get("/api/v1/me")
                    .header(header::AUTHORIZATION, bearer)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["email"], "anna@konepaja.fi");
    }
}
