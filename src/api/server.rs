//! HTTP API server

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Extension, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{require_admin, require_auth, SessionService, TrustedProxies};
use crate::config::{Config, CorsConfig};
use crate::error::{Error, Result};
use crate::store::{Backend, FruitStore};

use super::rate_limit::{rate_limit, RateLimiter};
use super::{auth_routes, routes};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionService,
    pub fruits: Arc<dyn FruitStore>,
    pub limiter: RateLimiter,
    pub proxies: TrustedProxies,
}

impl AppState {
    pub fn new(config: &Config, backend: Backend) -> Result<Self> {
        let sessions = SessionService::from_settings(backend.credentials, &config.auth)?;
        Ok(Self {
            sessions,
            fruits: backend.fruits,
            limiter: RateLimiter::new(&config.rate_limit),
            proxies: TrustedProxies::new(config.trusted_proxy_addrs()?),
        })
    }
}

/// Run the HTTP API server
pub async fn run_server(config: Config, host: &str, port: u16) -> Result<()> {
    config.validate()?;
    for warning in config.warnings() {
        tracing::warn!("{}", warning);
    }

    let backend = Backend::from_config(&config.database).await?;
    let app = build_app(&config, backend)?;

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Assemble state and router from configuration and an opened backend
pub fn build_app(config: &Config, backend: Backend) -> Result<Router> {
    let state = AppState::new(config, backend)?;
    create_router(state, &config.cors)
}

/// Create the router with all routes
pub fn create_router(state: AppState, cors: &CorsConfig) -> Result<Router> {
    let auth_layer = middleware::from_fn_with_state(state.sessions.clone(), require_auth);

    // Only the credential-taking routes are rate limited
    let public_auth = Router::new()
        .route("/auth/register", post(auth_routes::register))
        .route("/auth/login", post(auth_routes::login))
        .route("/auth/refresh-token", post(auth_routes::refresh_token))
        .route_layer(middleware::from_fn_with_state(
            state.limiter.clone(),
            rate_limit,
        ));

    let session_auth = Router::new()
        .route("/auth/logout", post(auth_routes::logout))
        .route("/auth/profile", get(auth_routes::profile))
        .route("/auth/change-password", post(auth_routes::change_password))
        .route_layer(auth_layer.clone());

    // Reads need any signed-in user, writes need an admin
    let fruits = Router::new()
        .route(
            "/fruits",
            get(routes::list_fruits)
                .merge(post(routes::create_fruit).route_layer(middleware::from_fn(require_admin))),
        )
        .route(
            "/fruits/{id}",
            get(routes::get_fruit).merge(
                put(routes::update_fruit)
                    .delete(routes::delete_fruit)
                    .route_layer(middleware::from_fn(require_admin)),
            ),
        )
        .route_layer(auth_layer);

    Ok(Router::new()
        .route("/health", get(routes::health))
        .merge(public_auth)
        .merge(session_auth)
        .merge(fruits)
        .layer(Extension(state.proxies.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors)?)
        .with_state(state))
}

fn cors_layer(config: &CorsConfig) -> Result<CorsLayer> {
    if config.allowed_origins.is_empty() {
        return Ok(CorsLayer::permissive());
    }

    let origins = config
        .allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|_| Error::Config(format!("Invalid CORS origin: {}", origin)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_rejects_bad_origin() {
        let config = CorsConfig {
            allowed_origins: vec!["bad\norigin".to_string()],
        };
        assert!(matches!(cors_layer(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_cors_accepts_listed_origins() {
        let config = CorsConfig {
            allowed_origins: vec!["http://localhost:5173".to_string()],
        };
        assert!(cors_layer(&config).is_ok());
    }
}
