//! Explicit session context.
//!
//! A [`Session`] is created by an `AuthProvider` on sign-in and handed to the
//! store connector and the board at construction. Logout closes it; every
//! clone observes the close.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::{CoreError, UserEmail};

/// Server-generated opaque session identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn parse<S: Into<String>>(s: S) -> Option<Self> {
        let val = s.into();
        if val.is_empty() {
            None
        } else {
            Some(Self(val))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// What the auth provider knows about the signed-in user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub uid: String,
    pub email: UserEmail,
    /// Bearer token for the remote store, when the provider issues one.
    pub token: Option<String>,
    pub expires_at: Option<SystemTime>,
}

#[derive(Clone, Debug)]
pub struct Session {
    id: SessionId,
    info: Arc<SessionInfo>,
    started_at: SystemTime,
    open: Arc<AtomicBool>,
}

impl Session {
    pub fn start(info: SessionInfo, started_at: SystemTime) -> Self {
        Self {
            id: SessionId::generate(),
            info: Arc::new(info),
            started_at,
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn email(&self) -> &UserEmail {
        &self.info.email
    }

    pub fn token(&self) -> Option<&str> {
        self.info.token.as_deref()
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    pub fn is_open(&self, now: SystemTime) -> bool {
        self.open.load(Ordering::Acquire) && !self.info.expires_at.is_some_and(|exp| now >= exp)
    }

    /// `Ok` while the session is open and unexpired.
    pub fn ensure_open(&self, now: SystemTime) -> Result<(), CoreError> {
        if self.is_open(now) {
            Ok(())
        } else {
            Err(CoreError::SessionClosed)
        }
    }

    /// Teardown. Idempotent.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}
