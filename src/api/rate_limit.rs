//! Fixed-window request limiter keyed by client IP

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::auth::ClientInfo;
use crate::config::RateLimitConfig;
use crate::error::{Error, Result};

/// Windows kept before expired entries are swept
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    max_requests: u32,
    window: Duration,
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_requests: config.auth_max_requests,
            window: Duration::from_secs(config.auth_window_secs),
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn disabled() -> Self {
        Self::new(&RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        })
    }

    /// Count one request for `key`, failing once the window is full
    pub fn check(&self, key: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let now = Instant::now();
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if windows.len() > SWEEP_THRESHOLD {
            let span = self.window;
            windows.retain(|_, w| now.duration_since(w.started) < span);
        }

        let window = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(window.started) >= self.window {
            *window = Window {
                started: now,
                count: 0,
            };
        }

        if window.count >= self.max_requests {
            let elapsed = now.duration_since(window.started);
            let retry_after_secs = self.window.saturating_sub(elapsed).as_secs().max(1);
            tracing::warn!(client = %key, "rate limit exceeded");
            return Err(Error::RateLimited { retry_after_secs });
        }

        window.count += 1;
        Ok(())
    }
}

/// Middleware applying the limiter to every request it wraps
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    client: ClientInfo,
    req: Request,
    next: Next,
) -> std::result::Result<Response, Error> {
    limiter.check(&client.ip)?;
    Ok(next.run(req).await)
}
