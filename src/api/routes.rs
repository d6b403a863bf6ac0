//! Management API route definitions.

use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{change, history_status, ping, shutdown, trigger_history, AppState};

/// Common prefix of every management route.
pub const API_PREFIX: &str = "/fledge";

/// CORS policy applied to every route.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
        .expose_headers(Any)
}

/// Create the management API router.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Basic api common to all microservices
        .route("/service/ping", get(ping))
        .route("/service/shutdown", post(shutdown))
        .route("/change", post(change))
        // Statistics history
        .route(
            "/statistics/history",
            get(history_status).post(trigger_history),
        );

    Router::new()
        .nest(API_PREFIX, api)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::history::{HistoryScheduler, StatisticsHistoryRoller};
    use crate::storage::{Counter, FailurePoint, MemoryStorage};

    fn app(storage: &MemoryStorage) -> (Router, AppState) {
        let scheduler = HistoryScheduler::new(
            StatisticsHistoryRoller::new(Arc::new(storage.clone())),
            Duration::from_secs(15),
        );
        let state = AppState::new(scheduler);
        (create_router(state.clone()), state)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn ping_returns_uptime() {
        let (app, _) = app(&MemoryStorage::new());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/fledge/service/ping")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_json(response).await["uptime"].is_u64());
    }

    #[tokio::test]
    async fn shutdown_flips_state() {
        let (app, state) = app(&MemoryStorage::new());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/fledge/service/shutdown")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.is_shutting_down());
    }

    #[tokio::test]
    async fn history_status_before_and_after_trigger() {
        let storage = MemoryStorage::with_counters([Counter::new("READINGS", 100, 80)]);
        let (app, _) = app(&storage);

        let before = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/fledge/statistics/history")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_json(before).await["status"], "never_run");

        let triggered = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/fledge/statistics/history")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(triggered.status(), StatusCode::OK);
        assert_eq!(body_json(triggered).await["advanced"], 1);

        let after = app
            .oneshot(
                Request::builder()
                    .uri("/fledge/statistics/history")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(after).await;
        assert_eq!(body["status"], "succeeded");
        assert_eq!(body["report"]["snapshots_written"], 1);
    }

    #[tokio::test]
    async fn trigger_reports_storage_failure() {
        let storage = MemoryStorage::new();
        storage.set_failure(FailurePoint::Fetch, true);
        let (app, _) = app(&storage);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/fledge/statistics/history")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn cors_headers_are_present() {
        let (app, _) = app(&MemoryStorage::new());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/fledge/service/ping")
                    .header(header::ORIGIN, "http://gui.local")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }

    #[tokio::test]
    async fn change_notification_is_acknowledged() {
        let (app, state) = app(&MemoryStorage::new());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/fledge/change")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"category": "STATS_HISTORY", "items": {"interval": "30"}}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await["message"],
            "Change for category STATS_HISTORY received"
        );
        assert!(!state.is_shutting_down());
    }

    #[tokio::test]
    async fn change_without_category_is_rejected() {
        let (app, _) = app(&MemoryStorage::new());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/fledge/change")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"items": {}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn cors_preflight_lists_allowed_methods() {
        let (app, _) = app(&MemoryStorage::new());

        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/fledge/service/ping")
                    .header(header::ORIGIN, "http://gui.local")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PUT")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
        let methods = response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS]
            .to_str()
            .unwrap();
        for method in ["GET", "POST", "PUT", "DELETE"] {
            assert!(methods.contains(method), "{method} missing from {methods}");
        }
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (app, _) = app(&MemoryStorage::new());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/fledge/service/unknown")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
