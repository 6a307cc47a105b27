use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::Request;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::cache::CacheService;
use crate::config::AppConfig;
use crate::store::RecordStore;

use super::rate_limit::{self, RateLimiter};
use super::{cache_admin, health, hotel, profile, schedule, shops, users};

const REGISTER_LIMIT: u32 = 5;
const REGISTER_WINDOW: Duration = Duration::from_secs(60 * 60);
const LOGIN_LIMIT: u32 = 10;
const LOGIN_WINDOW: Duration = Duration::from_secs(15 * 60);

pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub cache: Arc<CacheService>,
    pub config: AppConfig,
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );
    if latency.as_millis() > 1000 {
        tracing::warn!("slow request: {} {} took {}ms", method, uri.path(), latency.as_millis());
    }

    response
}

// CorsLayer only answers real preflights; a bare OPTIONS still gets a 200
// here instead of falling through to the method router's 405.
async fn answer_options(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    next.run(request).await
}

/// Browser clients come from a configured origin list; an empty list means
/// local development and allows anything.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    layer.allow_origin(origins)
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);
    let register_limiter = Arc::new(RateLimiter::new(REGISTER_LIMIT, REGISTER_WINDOW));
    let login_limiter = Arc::new(RateLimiter::new(LOGIN_LIMIT, LOGIN_WINDOW));

    Router::new()
        .route("/api/health", get(health::health))
        .route(
            "/api/register",
            post(users::register).layer(middleware::from_fn_with_state(
                register_limiter,
                rate_limit::limit,
            )),
        )
        .route(
            "/api/login",
            post(users::login).layer(middleware::from_fn_with_state(
                login_limiter.clone(),
                rate_limit::limit,
            )),
        )
        // Kept for clients built against the older route name. Shares the
        // login limiter so the alias is not a way around it.
        .route(
            "/api/users/validate",
            post(users::login).layer(middleware::from_fn_with_state(
                login_limiter,
                rate_limit::limit,
            )),
        )
        .route("/api/users/check/{username}", get(users::check_user))
        .route(
            "/api/schedule",
            get(schedule::list_schedules).post(schedule::create_schedule),
        )
        .route(
            "/api/schedule/{id}",
            put(schedule::update_schedule).delete(schedule::delete_schedule),
        )
        .route("/api/shops", get(shops::list_shops).post(shops::create_shop))
        .route(
            "/api/shops/{id}",
            get(shops::get_shop)
                .put(shops::update_shop)
                .delete(shops::delete_shop),
        )
        .route(
            "/api/profile/{username}",
            get(profile::get_profile).put(profile::update_profile),
        )
        .route(
            "/api/hotel/{username}",
            get(hotel::get_hotel).put(hotel::update_hotel),
        )
        .route("/api/cache/stats", get(cache_admin::stats))
        .route("/api/cache/clear", post(cache_admin::clear))
        .layer(
            ServiceBuilder::new()
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("DENY"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::REFERRER_POLICY,
                    HeaderValue::from_static("no-referrer"),
                ))
                .layer(cors)
                .layer(middleware::from_fn(log_request))
                .layer(middleware::from_fn(answer_options)),
        )
        .with_state(state)
}
