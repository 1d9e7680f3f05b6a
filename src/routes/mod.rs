pub mod attendance;
pub mod caller;
pub mod events;
pub mod health;
pub mod schedules;
pub mod templates;

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::AppState;

/// Health check plus every roster endpoint under `/api`.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .nest(
            "/api",
            Router::new()
                .merge(events::router())
                .merge(templates::router())
                .merge(schedules::router())
                .merge(attendance::router()),
        )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::services::messaging::testing::RecordingMessenger;
    use crate::services::testing::state_with;

    async fn app() -> Router {
        let state = state_with(Arc::new(RecordingMessenger::default())).await;
        api_router().with_state(state)
    }

    fn json_request(method: &str, uri: &str, user: Option<i64>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(http::header::CONTENT_TYPE, "application/json");
        if let Some(user) = user {
            builder = builder.header(caller::USER_ID_HEADER, user.to_string());
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn raid() -> serde_json::Value {
        serde_json::json!({
            "channel_id": 55,
            "name": "Friday raid",
            "max_participants": 3,
            "roles": "tank:1, healer:1, dps:1"
        })
    }

    #[tokio::test]
    async fn health_is_ok() {
        let response = app()
            .await
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn mutating_without_user_header_is_unauthorized() {
        let response = app()
            .await
            .oneshot(json_request("POST", "/api/groups/1/events", None, raid()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_then_signup() {
        let app = app().await;

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/groups/1/events", Some(7), raid()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        let event_id = created["event"]["id"].as_i64().unwrap();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/events/{}/signup", event_id),
                Some(8),
                serde_json::json!({ "role": "tank" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let result = body_json(response).await;
        assert_eq!(result["outcome"], "joined");
        assert_eq!(result["role"], "tank");

        let response = app
            .oneshot(
                Request::get(format!("/api/events/{}", event_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn stranger_cannot_edit() {
        let app = app().await;
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/groups/1/events", Some(7), raid()))
            .await
            .unwrap();
        let event_id = body_json(response).await["event"]["id"].as_i64().unwrap();

        let response = app
            .oneshot(json_request(
                "PATCH",
                &format!("/api/events/{}", event_id),
                Some(99),
                serde_json::json!({ "name": "Hijacked" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["error"]["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn unknown_event_is_not_found() {
        let response = app()
            .await
            .oneshot(Request::get("/api/events/4242").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
