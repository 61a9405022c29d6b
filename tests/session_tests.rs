//! Session flow tests against the in-memory store

use chrono::{Duration, Utc};
use fruitstand::auth::models::{ClientInfo, RegisterRequest};
use fruitstand::auth::session::{LOCKOUT_DURATION_MINUTES, MAX_FAILED_ATTEMPTS};
use fruitstand::auth::{
    Claims, JwtTokenService, PasswordService, SessionService, StoreAuditLog, TokenService,
    UserRole,
};
use fruitstand::config::AuthSettings;
use fruitstand::error::Error;
use fruitstand::store::{CredentialStore, MemoryStore};
use std::sync::Arc;

const PASSWORD: &str = "Str0ng!Pass";

struct Harness {
    sessions: SessionService,
    store: MemoryStore,
    tokens: Arc<JwtTokenService>,
}

fn harness() -> Harness {
    let store = MemoryStore::new();
    let settings = AuthSettings::with_secret("session-integration-test-secret");
    let tokens = Arc::new(JwtTokenService::new(&settings).expect("token service"));
    let shared: Arc<dyn CredentialStore> = Arc::new(store.clone());
    let sessions = SessionService::new(
        shared.clone(),
        Arc::new(StoreAuditLog::new(shared)),
        tokens.clone(),
        PasswordService::new(4),
    );
    Harness {
        sessions,
        store,
        tokens,
    }
}

fn client() -> ClientInfo {
    ClientInfo::new("198.51.100.4", "session-tests")
}

fn request(username: &str, email: &str, password: &str) -> RegisterRequest {
    RegisterRequest {
        username: username.to_string(),
        email: email.to_string(),
        password: password.to_string(),
    }
}

async fn register_alice(h: &Harness) -> i64 {
    h.sessions
        .register(request("alice", "alice@x.com", PASSWORD), &client())
        .await
        .expect("register alice")
        .id
}

fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

#[tokio::test]
async fn test_register_then_login_then_profile() {
    let h = harness();
    let id = register_alice(&h).await;

    let outcome = h
        .sessions
        .login("alice@x.com", PASSWORD, &client())
        .await
        .unwrap();
    assert_eq!(outcome.user.id, id);
    assert_eq!(outcome.refresh_token.len(), 128);
    assert!(outcome.refresh_expires_at > Utc::now() + Duration::days(6));

    let context = h
        .sessions
        .authenticate(Some(&bearer(&outcome.access_token)))
        .await
        .unwrap();
    assert_eq!(context.user_id, id);
    assert_eq!(context.username, "alice");

    let profile = h.sessions.profile(id).await.unwrap();
    assert_eq!(profile.email, "alice@x.com");
    assert!(profile.last_login_at.is_some());

    let stored = h.store.find_user_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.last_login_ip.as_deref(), Some("198.51.100.4"));
}

#[tokio::test]
async fn test_duplicate_email_and_username() {
    let h = harness();
    register_alice(&h).await;

    let result = h
        .sessions
        .register(request("alice2", "alice@x.com", PASSWORD), &client())
        .await;
    assert!(matches!(result, Err(Error::Conflict(ref m)) if m == "Email already registered"));

    let result = h
        .sessions
        .register(request("ALICE", "other@x.com", PASSWORD), &client())
        .await;
    assert!(matches!(result, Err(Error::Conflict(ref m)) if m == "Username already taken"));
}

#[tokio::test]
async fn test_weak_password_lists_every_violation() {
    let h = harness();
    let result = h
        .sessions
        .register(request("bob", "bob@x.com", "password"), &client())
        .await;

    match result {
        Err(Error::WeakPassword(violations)) => {
            assert!(violations.iter().any(|v| v.contains("uppercase")));
            assert!(violations.iter().any(|v| v.contains("number")));
            assert!(violations.iter().any(|v| v.contains("special")));
            assert!(violations.contains(&"Password is too common".to_string()));
        }
        other => panic!("expected weak password, got {:?}", other),
    }
    assert!(h.store.find_user_by_email("bob@x.com").await.unwrap().is_none());
}

#[tokio::test]
async fn test_lockout_after_repeated_failures() {
    let h = harness();
    let id = register_alice(&h).await;

    for attempt in 1..=MAX_FAILED_ATTEMPTS {
        let result = h.sessions.login("alice@x.com", "Wr0ng!Pass", &client()).await;
        assert!(matches!(result, Err(Error::InvalidCredentials)), "attempt {}", attempt);
    }

    let user = h.store.find_user_by_id(id).await.unwrap().unwrap();
    assert_eq!(user.failed_login_attempts, MAX_FAILED_ATTEMPTS);
    let until = user.lockout_until.expect("lockout set");
    assert!(until > Utc::now() + Duration::minutes(LOCKOUT_DURATION_MINUTES - 1));

    // Even the right password is refused while locked
    let result = h.sessions.login("alice@x.com", PASSWORD, &client()).await;
    assert!(matches!(result, Err(Error::AccountLocked)));

    h.store
        .modify_user(id, |u| u.lockout_until = Some(Utc::now() - Duration::seconds(1)))
        .await;

    h.sessions
        .login("alice@x.com", PASSWORD, &client())
        .await
        .expect("login after lockout elapsed");
    let user = h.store.find_user_by_id(id).await.unwrap().unwrap();
    assert_eq!(user.failed_login_attempts, 0);
    assert!(user.lockout_until.is_none());

    // The counter starts over
    let _ = h.sessions.login("alice@x.com", "Wr0ng!Pass", &client()).await;
    let last = h.store.login_logs().await.pop().unwrap();
    assert_eq!(last.reason, "Invalid password (attempt 1)");
}

#[tokio::test]
async fn test_deactivated_account_cannot_log_in() {
    let h = harness();
    let id = register_alice(&h).await;
    h.store.set_user_active(id, false).await.unwrap();

    let result = h.sessions.login("alice@x.com", PASSWORD, &client()).await;
    assert!(matches!(result, Err(Error::AccountDeactivated)));

    // Deactivation wins over a wrong password and leaves the counter alone
    let result = h.sessions.login("alice@x.com", "nope", &client()).await;
    assert!(matches!(result, Err(Error::AccountDeactivated)));
    let user = h.store.find_user_by_id(id).await.unwrap().unwrap();
    assert_eq!(user.failed_login_attempts, 0);
}

#[tokio::test]
async fn test_unknown_email_matches_wrong_password() {
    let h = harness();
    register_alice(&h).await;

    let unknown = h
        .sessions
        .login("nobody@x.com", PASSWORD, &client())
        .await
        .unwrap_err();
    let wrong = h
        .sessions
        .login("alice@x.com", "Wr0ng!Pass", &client())
        .await
        .unwrap_err();
    assert_eq!(unknown.to_string(), wrong.to_string());
    assert_eq!(unknown.status_code(), wrong.status_code());
}

#[tokio::test]
async fn test_audit_trail_reasons() {
    let h = harness();
    register_alice(&h).await;
    let _ = h
        .sessions
        .register(request("alice", "alice@x.com", PASSWORD), &client())
        .await;
    let _ = h.sessions.login("ghost@x.com", PASSWORD, &client()).await;
    let _ = h.sessions.login("alice@x.com", "Wr0ng!Pass", &client()).await;
    let _ = h.sessions.login("alice@x.com", PASSWORD, &client()).await;

    let logs = h.store.login_logs().await;
    let reasons: Vec<&str> = logs.iter().map(|l| l.reason.as_str()).collect();
    assert_eq!(
        reasons,
        vec![
            "Registration successful",
            "Email already registered",
            "User not found",
            "Invalid password (attempt 1)",
            "Login successful",
        ]
    );
    assert!(logs[0].success && logs[4].success);
    assert!(logs[2].user_id.is_none());
    assert!(logs.iter().all(|l| l.ip_address == "198.51.100.4"));
    assert!(logs.iter().all(|l| l.user_agent == "session-tests"));
}

#[tokio::test]
async fn test_refresh_issues_token_with_current_role() {
    let h = harness();
    let id = register_alice(&h).await;
    let outcome = h
        .sessions
        .login("alice@x.com", PASSWORD, &client())
        .await
        .unwrap();

    h.store.set_user_role(id, UserRole::Admin).await.unwrap();

    let access = h
        .sessions
        .refresh(Some(&outcome.refresh_token))
        .await
        .unwrap();
    let claims = h.tokens.verify_access_token(&access).unwrap();
    assert_eq!(claims.user_id, id);
    assert_eq!(claims.get_role().unwrap(), UserRole::Admin);

    // Not rotated: the same refresh token still works
    assert!(h
        .sessions
        .refresh(Some(&outcome.refresh_token))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_refresh_rejects_unknown_expired_and_inactive() {
    let h = harness();
    let id = register_alice(&h).await;
    let outcome = h
        .sessions
        .login("alice@x.com", PASSWORD, &client())
        .await
        .unwrap();

    let result = h.sessions.refresh(Some("deadbeef")).await;
    assert!(matches!(result, Err(Error::InvalidToken)));

    h.store.set_user_active(id, false).await.unwrap();
    let result = h.sessions.refresh(Some(&outcome.refresh_token)).await;
    assert!(matches!(result, Err(Error::InvalidToken)));
    h.store.set_user_active(id, true).await.unwrap();

    let result = h
        .sessions
        .refresh(Some(&outcome.refresh_token))
        .await;
    assert!(result.is_ok());

    let found = h
        .store
        .find_active_refresh_token(&outcome.refresh_token, Utc::now() + Duration::days(8))
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_logout_only_revokes_own_token() {
    let h = harness();
    let alice = register_alice(&h).await;
    let bob = h
        .sessions
        .register(request("bob", "bob@x.com", PASSWORD), &client())
        .await
        .unwrap()
        .id;

    let alice_session = h
        .sessions
        .login("alice@x.com", PASSWORD, &client())
        .await
        .unwrap();

    // Bob presenting Alice's token revokes nothing
    h.sessions
        .logout(bob, Some(&alice_session.refresh_token))
        .await
        .unwrap();
    assert!(h
        .sessions
        .refresh(Some(&alice_session.refresh_token))
        .await
        .is_ok());

    h.sessions
        .logout(alice, Some(&alice_session.refresh_token))
        .await
        .unwrap();
    let result = h
        .sessions
        .refresh(Some(&alice_session.refresh_token))
        .await;
    assert!(matches!(result, Err(Error::InvalidToken)));

    let rows = h.store.refresh_tokens().await;
    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_revoked);

    // Logging out without a cookie still succeeds
    assert!(h.sessions.logout(alice, None).await.is_ok());
}

#[tokio::test]
async fn test_change_password_makes_older_tokens_stale() {
    let h = harness();
    let id = register_alice(&h).await;

    let settings = AuthSettings::with_secret("session-integration-test-secret");
    let earlier = Claims::new(
        id,
        "alice",
        UserRole::User,
        &settings,
        Utc::now() - Duration::minutes(5),
    );
    let old_token = h.tokens.sign(&earlier).unwrap();
    assert!(h.sessions.authenticate(Some(&bearer(&old_token))).await.is_ok());

    let result = h.sessions.change_password(id, "Wr0ng!Pass", "N3w!Passw0rd").await;
    assert!(matches!(result, Err(Error::InvalidCredentials)));
    let result = h.sessions.change_password(id, PASSWORD, PASSWORD).await;
    assert!(matches!(result, Err(Error::Validation(_))));
    let result = h.sessions.change_password(id, PASSWORD, "short").await;
    assert!(matches!(result, Err(Error::WeakPassword(_))));

    h.sessions
        .change_password(id, PASSWORD, "N3w!Passw0rd")
        .await
        .unwrap();

    let result = h.sessions.authenticate(Some(&bearer(&old_token))).await;
    assert!(matches!(result, Err(Error::StaleToken)));

    let result = h.sessions.login("alice@x.com", PASSWORD, &client()).await;
    assert!(matches!(result, Err(Error::InvalidCredentials)));
    let fresh = h
        .sessions
        .login("alice@x.com", "N3w!Passw0rd", &client())
        .await
        .unwrap();
    assert!(h
        .sessions
        .authenticate(Some(&bearer(&fresh.access_token)))
        .await
        .is_ok());
}
