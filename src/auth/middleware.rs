//! Authentication middleware and extractors

use crate::auth::jwt::{extract_bearer, TokenService};
use crate::auth::models::{AuthContext, ClientInfo};
use crate::auth::session::SessionService;
use crate::error::{Error, Result};
use crate::store::CredentialStore;
use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Resolve an `Authorization` header to a live identity.
///
/// Steps: extract bearer, verify token, load an active user, reject tokens
/// issued before the user's last password change.
pub async fn authenticate(
    tokens: &dyn TokenService,
    store: &dyn CredentialStore,
    authorization: Option<&str>,
) -> Result<AuthContext> {
    let token = extract_bearer(authorization).ok_or(Error::MissingToken)?;

    let claims = tokens.verify_access_token(token)?;

    let user = match store.find_user_by_id(claims.user_id).await? {
        Some(user) if user.is_active => user,
        _ => {
            tracing::debug!(user_id = claims.user_id, "token owner missing or inactive");
            return Err(Error::UserUnavailable);
        }
    };

    if user.password_changed_after(claims.iat) {
        tracing::debug!(user_id = user.id, "token predates password change");
        return Err(Error::StaleToken);
    }

    Ok(AuthContext {
        user_id: user.id,
        username: user.username,
        role: user.role,
    })
}

/// Middleware for requiring authentication
pub async fn require_auth(
    State(sessions): State<SessionService>,
    mut req: Request,
    next: Next,
) -> std::result::Result<Response, Error> {
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let context = sessions.authenticate(authorization.as_deref()).await?;
    req.extensions_mut().insert(context);
    Ok(next.run(req).await)
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(Error::Unauthenticated)
    }
}

/// Peers allowed to report the client address through `X-Forwarded-For`.
///
/// Installed as a request extension; when absent no peer is trusted.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies(Arc<Vec<IpAddr>>);

impl TrustedProxies {
    pub fn new(addrs: Vec<IpAddr>) -> Self {
        Self(Arc::new(addrs))
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.0.contains(&ip)
    }
}

/// Caller address: the socket peer, or the first forwarded entry when the
/// peer is a trusted proxy
pub fn client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    proxies: &TrustedProxies,
) -> String {
    let Some(peer) = peer else {
        return "unknown".to_string();
    };
    if !proxies.contains(peer.ip()) {
        return peer.ip().to_string();
    }

    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .and_then(|ip| ip.parse::<IpAddr>().ok())
        .unwrap_or(peer.ip())
        .to_string()
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);
        let proxies = parts
            .extensions
            .get::<TrustedProxies>()
            .cloned()
            .unwrap_or_default();
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("unknown");

        Ok(ClientInfo::new(
            client_ip(&parts.headers, peer, &proxies),
            user_agent,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{Claims, JwtTokenService};
    use crate::auth::models::{NewUser, UserRole};
    use crate::config::AuthSettings;
    use crate::store::MemoryStore;
    use axum::http::HeaderValue;
    use chrono::{Duration, Utc};

    async fn setup() -> (JwtTokenService, MemoryStore, i64) {
        let tokens = JwtTokenService::new(&AuthSettings::with_secret("middleware-secret")).unwrap();
        let store = MemoryStore::new();
        let user = store
            .create_user(NewUser {
                username: "alice".to_string(),
                email: "alice@x.com".to_string(),
                password_hash: "hash".to_string(),
                role: UserRole::User,
            })
            .await
            .unwrap();
        (tokens, store, user.id)
    }

    #[tokio::test]
    async fn test_missing_header() {
        let (tokens, store, _) = setup().await;
        let result = authenticate(&tokens, &store, None).await;
        assert!(matches!(result, Err(Error::MissingToken)));

        let result = authenticate(&tokens, &store, Some("Token abc")).await;
        assert!(matches!(result, Err(Error::MissingToken)));
    }

    #[tokio::test]
    async fn test_invalid_token() {
        let (tokens, store, _) = setup().await;
        let result = authenticate(&tokens, &store, Some("Bearer not.a.jwt")).await;
        assert!(matches!(result, Err(Error::InvalidToken)));
    }

    #[tokio::test]
    async fn test_valid_token_yields_context() {
        let (tokens, store, id) = setup().await;
        let token = tokens.issue_access_token(id, "alice", UserRole::User).unwrap();
        let header = format!("Bearer {}", token);

        let context = authenticate(&tokens, &store, Some(&header)).await.unwrap();
        assert_eq!(
            context,
            AuthContext {
                user_id: id,
                username: "alice".to_string(),
                role: UserRole::User,
            }
        );
    }

    #[tokio::test]
    async fn test_context_reflects_current_role() {
        let (tokens, store, id) = setup().await;
        let token = tokens.issue_access_token(id, "alice", UserRole::User).unwrap();
        store.modify_user(id, |u| u.role = UserRole::Admin).await;

        let header = format!("Bearer {}", token);
        let context = authenticate(&tokens, &store, Some(&header)).await.unwrap();
        assert_eq!(context.role, UserRole::Admin);
    }

    #[tokio::test]
    async fn test_inactive_or_missing_user() {
        let (tokens, store, id) = setup().await;
        let token = tokens.issue_access_token(id, "alice", UserRole::User).unwrap();
        let header = format!("Bearer {}", token);

        store.modify_user(id, |u| u.is_active = false).await;
        let result = authenticate(&tokens, &store, Some(&header)).await;
        assert!(matches!(result, Err(Error::UserUnavailable)));

        let ghost = tokens.issue_access_token(999, "ghost", UserRole::User).unwrap();
        let header = format!("Bearer {}", ghost);
        let result = authenticate(&tokens, &store, Some(&header)).await;
        assert!(matches!(result, Err(Error::UserUnavailable)));
    }

    #[tokio::test]
    async fn test_token_issued_before_password_change_is_stale() {
        let (tokens, store, id) = setup().await;
        let issued = Utc::now() - Duration::minutes(1);
        let claims = Claims::new(id, "alice", UserRole::User, tokens.settings(), issued);
        let token = tokens.sign(&claims).unwrap();
        let header = format!("Bearer {}", token);

        assert!(authenticate(&tokens, &store, Some(&header)).await.is_ok());

        store
            .modify_user(id, |u| u.password_changed_at = Some(Utc::now()))
            .await;
        let result = authenticate(&tokens, &store, Some(&header)).await;
        assert!(matches!(result, Err(Error::StaleToken)));
    }

    #[test]
    fn test_forwarded_header_ignored_without_trusted_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        let peer: SocketAddr = "192.168.1.9:5000".parse().unwrap();
        let none = TrustedProxies::default();

        assert_eq!(client_ip(&headers, Some(peer), &none), "192.168.1.9");
        assert_eq!(client_ip(&headers, None, &none), "unknown");
    }

    #[test]
    fn test_forwarded_header_used_behind_trusted_proxy() {
        let mut headers = HeaderMap::new();
        let proxy: SocketAddr = "10.0.0.1:443".parse().unwrap();
        let proxies = TrustedProxies::new(vec![proxy.ip()]);

        assert_eq!(client_ip(&headers, Some(proxy), &proxies), "10.0.0.1");

        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip"));
        assert_eq!(client_ip(&headers, Some(proxy), &proxies), "10.0.0.1");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, Some(proxy), &proxies), "203.0.113.7");
    }
}
