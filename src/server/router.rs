use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tower_sessions::SessionManagerLayer;
use tower_sessions_sqlx_store::SqliteStore;

use crate::app_state::AppState;
use crate::server::constants::MAX_FORM_BODY_BYTES;
use crate::server::handlers;
use crate::server::middleware::{require_authentication, verify_csrf};

const CONTENT_SECURITY_POLICY: &str =
    "default-src 'self'; style-src 'self' fonts.googleapis.com; font-src fonts.gstatic.com";

/// Construct the application's HTTP router with all routes and middleware configured.
///
/// Layer order, outermost first: tracing, security headers, session, CSRF
/// guard, then the authentication guard on protected routes only.
pub fn build_router(state: AppState, session_layer: SessionManagerLayer<SqliteStore>) -> Router {
    let protected_routes = Router::new()
        .route(
            "/snippet/create",
            get(handlers::snippets::snippet_create_form_handler)
                .post(handlers::snippets::snippet_create_submit_handler),
        )
        .route("/user/logout", post(handlers::auth::logout_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_authentication,
        ));

    Router::new()
        .route("/", get(handlers::home::home_handler))
        .route("/ping", get(handlers::home::ping_handler))
        .route(
            "/snippet/view/:id",
            get(handlers::snippets::snippet_view_handler),
        )
        .route(
            "/user/signup",
            get(handlers::auth::signup_form_handler).post(handlers::auth::signup_submit_handler),
        )
        .route(
            "/user/login",
            get(handlers::auth::login_form_handler).post(handlers::auth::login_submit_handler),
        )
        .merge(protected_routes)
        .route_layer(middleware::from_fn(verify_csrf))
        .fallback(handlers::home::fallback_handler)
        .layer(DefaultBodyLimit::max(MAX_FORM_BODY_BYTES))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(SetResponseHeaderLayer::overriding(
                    header::CONTENT_SECURITY_POLICY,
                    HeaderValue::from_static(CONTENT_SECURITY_POLICY),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::REFERRER_POLICY,
                    HeaderValue::from_static("origin-when-cross-origin"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("deny"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    HeaderName::from_static("x-xss-protection"),
                    HeaderValue::from_static("0"),
                ))
                .layer(session_layer),
        )
        .with_state(state)
}
