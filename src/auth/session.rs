//! Session lifecycle: register, login, refresh, logout, profile, password change

use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::auth::audit::{AuditLog, StoreAuditLog};
use crate::auth::jwt::{issue_refresh_token, JwtTokenService, TokenService};
use crate::auth::middleware::authenticate;
use crate::auth::models::{
    AuthContext, ClientInfo, LoginEvent, LoginOutcome, NewRefreshToken, NewUser,
    RegisterRequest, UserInfo, UserRole,
};
use crate::auth::password::{check_strength, PasswordService};
use crate::config::AuthSettings;
use crate::error::{Error, Result};
use crate::store::CredentialStore;

/// Failed attempts that trigger a lockout
pub const MAX_FAILED_ATTEMPTS: i32 = 5;
pub const LOCKOUT_DURATION_MINUTES: i64 = 30;
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 7;

/// Orchestrates the credential store, token and password services and the audit log
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn CredentialStore>,
    audit: Arc<dyn AuditLog>,
    tokens: Arc<dyn TokenService>,
    passwords: PasswordService,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        audit: Arc<dyn AuditLog>,
        tokens: Arc<dyn TokenService>,
        passwords: PasswordService,
    ) -> Self {
        Self {
            store,
            audit,
            tokens,
            passwords,
        }
    }

    /// Wire the default JWT signer, bcrypt hasher and store-backed audit log
    pub fn from_settings(store: Arc<dyn CredentialStore>, settings: &AuthSettings) -> Result<Self> {
        let tokens = Arc::new(JwtTokenService::new(settings)?);
        let audit = Arc::new(StoreAuditLog::new(store.clone()));
        Ok(Self::new(
            store,
            audit,
            tokens,
            PasswordService::new(settings.bcrypt_cost),
        ))
    }

    pub fn store(&self) -> &dyn CredentialStore {
        self.store.as_ref()
    }

    pub fn tokens(&self) -> &dyn TokenService {
        self.tokens.as_ref()
    }

    /// Run the per-request authentication gate
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<AuthContext> {
        authenticate(self.tokens(), self.store(), authorization).await
    }

    /// Register a regular account
    pub async fn register(&self, request: RegisterRequest, client: &ClientInfo) -> Result<UserInfo> {
        self.create_account(request, UserRole::default(), client)
            .await
    }

    /// Register an account with an explicit role
    pub async fn create_account(
        &self,
        request: RegisterRequest,
        role: UserRole,
        client: &ClientInfo,
    ) -> Result<UserInfo> {
        let username = request.username.trim().to_lowercase();
        let email = request.email;

        if let Some(existing) = self
            .store
            .find_user_by_email_or_username(&email, &username)
            .await?
        {
            let message = if existing.email == email {
                "Email already registered"
            } else {
                "Username already taken"
            };
            self.audit(None, &email, client, false, message).await;
            return Err(Error::Conflict(message.to_string()));
        }

        let report = check_strength(&request.password);
        if !report.valid {
            self.audit(None, &email, client, false, "Weak password").await;
            return Err(Error::WeakPassword(report.violations));
        }

        let password_hash = self.passwords.hash(&request.password).await?;
        let user = match self
            .store
            .create_user(NewUser {
                username,
                email: email.clone(),
                password_hash,
                role,
            })
            .await
        {
            Ok(user) => user,
            Err(Error::Conflict(message)) => {
                self.audit(None, &email, client, false, message.as_str()).await;
                return Err(Error::Conflict(message));
            }
            Err(e) => return Err(e),
        };

        self.audit(Some(user.id), &email, client, true, "Registration successful")
            .await;
        tracing::info!(user_id = user.id, username = %user.username, "registered user");

        Ok(UserInfo::from(&user))
    }

    /// Check credentials, apply lockout bookkeeping and open a session
    pub async fn login(&self, email: &str, password: &str, client: &ClientInfo) -> Result<LoginOutcome> {
        let now = Utc::now();

        let Some(mut user) = self.store.find_user_by_email(email).await? else {
            self.audit(None, email, client, false, "User not found").await;
            return Err(Error::InvalidCredentials);
        };

        if !user.is_active {
            self.audit(Some(user.id), email, client, false, "Account deactivated")
                .await;
            return Err(Error::AccountDeactivated);
        }

        if user.is_locked(now) {
            self.audit(Some(user.id), email, client, false, "Account locked")
                .await;
            return Err(Error::AccountLocked);
        }

        if !self.passwords.verify(password, &user.password_hash).await? {
            let attempts = user.failed_login_attempts + 1;
            let lockout_until = (attempts >= MAX_FAILED_ATTEMPTS)
                .then(|| now + Duration::minutes(LOCKOUT_DURATION_MINUTES));
            self.store
                .record_failed_login(user.id, attempts, lockout_until)
                .await?;

            if lockout_until.is_some() {
                tracing::warn!(user_id = user.id, attempts, "account locked after failed logins");
            }
            self.audit(
                Some(user.id),
                email,
                client,
                false,
                format!("Invalid password (attempt {})", attempts),
            )
            .await;
            return Err(Error::InvalidCredentials);
        }

        self.store
            .record_successful_login(user.id, &client.ip, now)
            .await?;
        user.failed_login_attempts = 0;
        user.lockout_until = None;
        user.last_login_at = Some(now);
        user.last_login_ip = Some(client.ip.clone());

        let access_token = self
            .tokens
            .issue_access_token(user.id, &user.username, user.role)?;
        let refresh_token = issue_refresh_token();
        let refresh_expires_at = now + Duration::days(REFRESH_TOKEN_TTL_DAYS);
        self.store
            .insert_refresh_token(NewRefreshToken {
                token: refresh_token.clone(),
                user_id: user.id,
                expires_at: refresh_expires_at,
            })
            .await?;

        self.audit(Some(user.id), email, client, true, "Login successful")
            .await;
        tracing::info!(user_id = user.id, "user logged in");

        Ok(LoginOutcome {
            access_token,
            refresh_token,
            refresh_expires_at,
            user: UserInfo::from(&user),
        })
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// The refresh token itself is not rotated.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> Result<String> {
        let token = refresh_token
            .filter(|t| !t.is_empty())
            .ok_or(Error::MissingToken)?;

        let Some(row) = self
            .store
            .find_active_refresh_token(token, Utc::now())
            .await?
        else {
            tracing::debug!("refresh token unknown, revoked or expired");
            return Err(Error::InvalidToken);
        };

        let user = self
            .store
            .find_user_by_id(row.user_id)
            .await?
            .filter(|user| user.is_active)
            .ok_or_else(|| {
                tracing::debug!(user_id = row.user_id, "refresh token owner unavailable");
                Error::InvalidToken
            })?;

        self.tokens
            .issue_access_token(user.id, &user.username, user.role)
    }

    /// Revoke the presented refresh token if it belongs to the caller
    pub async fn logout(&self, user_id: i64, refresh_token: Option<&str>) -> Result<()> {
        if let Some(token) = refresh_token.filter(|t| !t.is_empty()) {
            let revoked = self.store.revoke_refresh_token(token, user_id).await?;
            if !revoked {
                tracing::debug!(user_id, "logout presented no refresh token owned by caller");
            }
        }
        tracing::info!(user_id, "user logged out");
        Ok(())
    }

    pub async fn profile(&self, user_id: i64) -> Result<UserInfo> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .map(UserInfo::from)
            .ok_or_else(|| Error::NotFound("User".to_string()))
    }

    /// Replace the password and stamp the change time, which makes every
    /// access token issued earlier stale
    pub async fn change_password(
        &self,
        user_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| Error::NotFound("User".to_string()))?;

        if !self
            .passwords
            .verify(current_password, &user.password_hash)
            .await?
        {
            return Err(Error::InvalidCredentials);
        }
        if current_password == new_password {
            return Err(Error::Validation(
                "New password must differ from the current password".to_string(),
            ));
        }

        let report = check_strength(new_password);
        if !report.valid {
            return Err(Error::WeakPassword(report.violations));
        }

        let password_hash = self.passwords.hash(new_password).await?;
        self.store
            .update_password(user.id, &password_hash, Utc::now())
            .await?;
        tracing::info!(user_id = user.id, "password changed");
        Ok(())
    }

    async fn audit(
        &self,
        user_id: Option<i64>,
        email: &str,
        client: &ClientInfo,
        success: bool,
        reason: impl Into<String>,
    ) {
        self.audit
            .record(LoginEvent {
                user_id,
                email: email.to_string(),
                ip_address: client.ip.clone(),
                user_agent: client.user_agent.clone(),
                success,
                reason: reason.into(),
            })
            .await;
    }
}
