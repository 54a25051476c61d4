use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::AppState;

/// Stable owner identity attached to every authenticated request.
#[derive(Debug, Clone)]
pub(crate) struct OwnerId(pub(crate) String);

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "ok": false, "message": message })),
    )
        .into_response()
}

/// Bearer key in, owner id out. Handlers never see the raw credential.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let raw_key = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::to_string);

    if let Some(raw_key) = raw_key {
        return match state.store.resolve_api_key(&raw_key).await {
            Ok(Some(owner)) => {
                req.extensions_mut().insert(OwnerId(owner));
                next.run(req).await
            }
            Ok(None) => unauthorized("Invalid or unauthorized API key"),
            Err(e) => {
                tracing::warn!("api key lookup failed: {}", e);
                unauthorized("Invalid or unauthorized API key")
            }
        };
    }

    // No keys minted yet: allow open access on loopback only, so local
    // setups work before the admin surface has been touched.
    let is_loopback = state.api_host == "127.0.0.1"
        || state.api_host == "::1"
        || state.api_host == "localhost";
    if is_loopback && !state.store.has_any_api_keys().await.unwrap_or(true) {
        req.extensions_mut().insert(OwnerId("local".to_string()));
        return next.run(req).await;
    }

    unauthorized("Missing or invalid Authorization header. Use: Bearer <key>")
}

/// Shared-secret gate for the user and key management surface.
pub async fn require_admin(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let presented = req
        .headers()
        .get("x-prismgen-admin-token")
        .and_then(|v| v.to_str().ok());
    if presented == Some(state.admin_token.as_str()) {
        next.run(req).await
    } else {
        unauthorized("Invalid admin token")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::web::handlers::test_support::test_state;
    use axum::{Extension, Router, middleware, routing::get};
    use serde_json::json;
    use tower::util::ServiceExt;

    fn protected_app(state: AppState) -> Router {
        Router::new()
            .route(
                "/api/whoami",
                get(|Extension(owner): Extension<OwnerId>| async move {
                    Json(json!({ "ok": true, "owner": owner.0 }))
                }),
            )
            .layer(middleware::from_fn_with_state(
                state.clone(),
                super::require_auth,
            ))
            .with_state(state)
    }

    async fn whoami(app: Router, headers: Vec<(&str, String)>) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().uri("/api/whoami");
        for (k, v) in headers {
            builder = builder.header(k, v);
        }
        let resp = app
            .oneshot(builder.body(Body::empty()).expect("request should build"))
            .await
            .expect("oneshot should succeed");
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("body should read");
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn no_keys_on_loopback_allows_local_owner() {
        let state = test_state().await;
        let (status, body) = whoami(protected_app(state), vec![]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["owner"], "local");
    }

    #[tokio::test]
    async fn no_keys_on_non_loopback_rejects_request() {
        let mut state = test_state().await;
        state.api_host = "0.0.0.0".to_string();
        let (status, _) = whoami(protected_app(state), vec![]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn first_minted_key_closes_open_access() {
        let state = test_state().await;
        state.store.create_api_key("u1", "default").await.unwrap();
        let (status, _) = whoami(protected_app(state), vec![]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_bearer_key_resolves_owner() {
        let state = test_state().await;
        let (raw, _) = state.store.create_api_key("u7", "default").await.unwrap();
        let (status, body) = whoami(
            protected_app(state),
            vec![("authorization", format!("Bearer {}", raw))],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["owner"], "u7");
    }

    #[tokio::test]
    async fn bogus_bearer_key_is_rejected() {
        let state = test_state().await;
        state.store.create_api_key("u7", "default").await.unwrap();
        let (status, _) = whoami(
            protected_app(state),
            vec![("authorization", "Bearer pgk_bogus".to_string())],
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_gate_requires_exact_token() {
        let state = test_state().await;
        let app = Router::new()
            .route("/api/admin/ping", get(|| async { Json(json!({ "ok": true })) }))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                super::require_admin,
            ))
            .with_state(state);

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/admin/ping")
                    .header("x-prismgen-admin-token", "admin-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/admin/ping")
                    .header("x-prismgen-admin-token", "wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
