//! Authentication audit trail

use async_trait::async_trait;
use std::sync::Arc;

use crate::auth::models::LoginEvent;
use crate::store::CredentialStore;

/// Sink for register/login attempts.
///
/// Recording is best-effort: implementations swallow their own failures so an
/// unavailable audit table never blocks a login.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, event: LoginEvent);
}

/// Writes events to the `login_logs` table through the credential store
pub struct StoreAuditLog {
    store: Arc<dyn CredentialStore>,
}

impl StoreAuditLog {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuditLog for StoreAuditLog {
    async fn record(&self, event: LoginEvent) {
        let email = event.email.clone();
        let reason = event.reason.clone();
        if let Err(e) = self.store.insert_login_log(event).await {
            tracing::warn!(
                error = %e,
                email = %email,
                reason = %reason,
                "failed to write login audit record"
            );
        }
    }
}
