use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{trace, warn};

use crate::{AuthProvider, Clock, CoreError, Credentials, Session, SessionInfo, UserEmail};

/// Lifetime of a dev session.
pub const DEV_SESSION_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Development auth provider: any well-formed email with a non-empty password
/// signs in. With `allowed_domain` set, only that email domain is accepted.
/// DO NOT USE IN PRODUCTION.
#[derive(Clone)]
pub struct DevAuth {
    allowed_domain: Option<String>,
    clock: Arc<dyn Clock>,
}

impl DevAuth {
    pub fn new(allowed_domain: Option<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            allowed_domain,
            clock,
        }
    }
}

#[async_trait]
impl AuthProvider for DevAuth {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, CoreError> {
        let email =
            UserEmail::new(credentials.email.trim()).map_err(|_| CoreError::NotAuthenticated)?;
        if credentials.password.is_empty() {
            return Err(CoreError::NotAuthenticated);
        }
        if let Some(dom) = &self.allowed_domain {
            if !email.domain().eq_ignore_ascii_case(dom) {
                warn!(email = %email.as_str(), "dev auth: domain not allowed");
                return Err(CoreError::NotAuthenticated);
            }
        }
        trace!(email = %email.as_str(), "dev auth: sign in");
        let now = self.clock.now();
        let info = SessionInfo {
            uid: format!("dev:{}", email.as_str()),
            email,
            token: None,
            expires_at: Some(now + DEV_SESSION_TTL),
        };
        Ok(Session::start(info, now))
    }

    async fn logout(&self, session: &Session) -> Result<(), CoreError> {
        session.close();
        trace!(session = %session.id().as_str(), "dev auth: logout");
        Ok(())
    }
}
