//! Session lifecycle endpoints under /auth

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Duration;
use regex::Regex;
use std::sync::LazyLock;

use super::extract::ApiJson;
use super::routes::ApiResponse;
use super::server::AppState;
use crate::auth::cookie::{clear_refresh_cookie, read_cookie, refresh_cookie, REFRESH_COOKIE_NAME};
use crate::auth::models::{
    AccessTokenResponse, AuthContext, ChangePasswordRequest, ClientInfo, LoginRequest,
    LoginResponse, RegisterRequest, UserEnvelope,
};
use crate::auth::session::REFRESH_TOKEN_TTL_DAYS;
use crate::error::{Error, Result};

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]{3,30}$").expect("valid username pattern"));

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"));

const MAX_EMAIL_LEN: usize = 254;

fn validate_email(email: &str) -> Result<()> {
    if email.len() > MAX_EMAIL_LEN || !EMAIL_RE.is_match(email) {
        return Err(Error::Validation("A valid email address is required".to_string()));
    }
    Ok(())
}

/// Shape checks on a registration body; strength is checked by the session flow
pub fn validate_registration(request: &RegisterRequest) -> Result<()> {
    if !USERNAME_RE.is_match(request.username.trim()) {
        return Err(Error::Validation(
            "Username must be 3-30 characters of letters, digits or underscores".to_string(),
        ));
    }
    validate_email(&request.email)?;
    if request.password.is_empty() {
        return Err(Error::Validation("Password is required".to_string()));
    }
    Ok(())
}

pub fn validate_login(request: &LoginRequest) -> Result<()> {
    validate_email(&request.email)?;
    if request.password.is_empty() {
        return Err(Error::Validation("Password is required".to_string()));
    }
    Ok(())
}

pub async fn register(
    State(state): State<AppState>,
    client: ClientInfo,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse> {
    validate_registration(&request)?;
    let user = state.sessions.register(request, &client).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(UserEnvelope { user }))))
}

pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Response> {
    validate_login(&request)?;
    let outcome = state
        .sessions
        .login(&request.email, &request.password, &client)
        .await?;

    let max_age = Duration::days(REFRESH_TOKEN_TTL_DAYS).num_seconds();
    let cookie = refresh_cookie(&outcome.refresh_token, max_age);
    let body = ApiResponse::ok(LoginResponse {
        access_token: outcome.access_token,
        user: outcome.user,
    });

    Ok(([(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<AccessTokenResponse>>> {
    let token = read_cookie(&headers, REFRESH_COOKIE_NAME);
    let access_token = state.sessions.refresh(token).await?;
    Ok(Json(ApiResponse::ok(AccessTokenResponse { access_token })))
}

pub async fn logout(
    State(state): State<AppState>,
    context: AuthContext,
    headers: HeaderMap,
) -> Result<Response> {
    let token = read_cookie(&headers, REFRESH_COOKIE_NAME);
    state.sessions.logout(context.user_id, token).await?;

    Ok((
        [(header::SET_COOKIE, clear_refresh_cookie())],
        Json(ApiResponse::ok("Logged out successfully".to_string())),
    )
        .into_response())
}

pub async fn profile(
    State(state): State<AppState>,
    context: AuthContext,
) -> Result<Json<ApiResponse<UserEnvelope>>> {
    let user = state.sessions.profile(context.user_id).await?;
    Ok(Json(ApiResponse::ok(UserEnvelope { user })))
}

pub async fn change_password(
    State(state): State<AppState>,
    context: AuthContext,
    ApiJson(request): ApiJson<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<String>>> {
    if request.current_password.is_empty() || request.new_password.is_empty() {
        return Err(Error::Validation(
            "Current and new password are required".to_string(),
        ));
    }
    state
        .sessions
        .change_password(
            context.user_id,
            &request.current_password,
            &request.new_password,
        )
        .await?;
    Ok(Json(ApiResponse::ok(
        "Password changed, please log in again".to_string(),
    )))
}
