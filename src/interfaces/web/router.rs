use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, header},
    middleware,
    middleware::Next,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::auth;
use super::handlers::{admin, callbacks, generate, library, status};

fn build_localhost_cors(api_port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", api_port),
        format!("http://localhost:{}", api_port),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

pub fn build_api_router(state: AppState) -> Router {
    // Engines authenticate through payload correlation, not bearer keys;
    // their callbacks must land without credentials.
    let public_routes = Router::new()
        .route("/api/webhook/{kind}", post(callbacks::webhook_endpoint))
        .layer(middleware::from_fn(security_headers))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/api/admin/users", post(admin::upsert_user_endpoint))
        .route("/api/admin/keys", post(admin::create_key_endpoint))
        .route(
            "/api/admin/users/{owner_id}/keys",
            get(admin::list_keys_endpoint),
        )
        .route(
            "/api/admin/keys/{id}",
            axum::routing::delete(admin::delete_key_endpoint),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ))
        .layer(middleware::from_fn(security_headers))
        .with_state(state.clone());

    let authed_routes = Router::new()
        .route("/api/generate/{kind}", post(generate::generate_endpoint))
        .route("/api/status/{task_id}", get(status::status_endpoint))
        .route("/api/library/tracks", get(library::list_tracks_endpoint))
        .route(
            "/api/library/{collection}",
            get(library::list_media_endpoint).post(library::save_media_endpoint),
        )
        .route(
            "/api/library/{collection}/{id}",
            axum::routing::delete(library::delete_asset_endpoint),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ))
        .layer(middleware::from_fn(security_headers))
        .layer(build_localhost_cors(state.api_port))
        .with_state(state.clone());

    public_routes.merge(admin_routes).merge(authed_routes)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    response
}
