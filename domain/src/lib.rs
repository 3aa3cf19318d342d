//! Domain library for the client records service.
//!
//! Holds the record types, ports (traits), and error definitions, plus the
//! session context, the search filter, and the per-session board that keeps
//! the snapshot shown to the user. Keep adapters and IO concerns out of this
//! crate.

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque identity of a client record, assigned by the backing store.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, CoreError> {
        let val = s.into();
        if val.trim().is_empty() {
            return Err(CoreError::InvalidClientId);
        }
        Ok(Self(val))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ClientId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Email address of the signed-in user.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct UserEmail(String);

impl UserEmail {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, CoreError> {
        let val = s.into();
        // Lightweight check; full RFC compliance not required here
        if val.is_empty() || !val.contains('@') {
            return Err(CoreError::InvalidUserEmail);
        }
        Ok(Self(val))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Domain part after the last `@`.
    pub fn domain(&self) -> &str {
        self.0.rsplit_once('@').map(|(_, d)| d).unwrap_or("")
    }
}

/// The four editable attributes of a client; payload of create and update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFields {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
}

/// A stored client record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClientRecord {
    pub id: ClientId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
}

impl ClientRecord {
    pub fn new(id: ClientId, fields: ClientFields) -> Self {
        Self {
            id,
            name: fields.name,
            email: fields.email,
            phone: fields.phone,
            address: fields.address,
        }
    }

    /// Copy of the non-id attributes.
    pub fn fields(&self) -> ClientFields {
        ClientFields {
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            address: self.address.clone(),
        }
    }
}

/// Login credentials handed to an [`AuthProvider`].
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Time source abstraction to make code testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Repository port over the external document collection of clients.
///
/// Every failure of the backing store (network, permission, service error or
/// a missing document) is reported as [`CoreError::StoreUnavailable`].
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Fetch every document in the collection.
    async fn list_all(&self) -> Result<Vec<ClientRecord>, CoreError>;
    /// Add a document; the store assigns its id.
    async fn create(&self, fields: ClientFields) -> Result<ClientRecord, CoreError>;
    /// Overwrite the four fields of an existing document.
    async fn update(&self, id: &ClientId, fields: ClientFields) -> Result<(), CoreError>;
    async fn delete(&self, id: &ClientId) -> Result<(), CoreError>;
}

/// Builds the store a session talks to.
pub trait StoreConnector: Send + Sync {
    fn connect(&self, session: &Session) -> Result<Arc<dyn ClientStore>, CoreError>;
}

/// Authentication/session provider port.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Start a session for the given credentials.
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, CoreError>;
    /// End the session. Implementations must leave `session` closed.
    async fn logout(&self, session: &Session) -> Result<(), CoreError>;
}

/// Yes/no gate in front of destructive actions.
pub trait Confirmation {
    fn confirm(&self, prompt: &str) -> bool;
}

impl Confirmation for bool {
    fn confirm(&self, _prompt: &str) -> bool {
        *self
    }
}

impl<F: Fn(&str) -> bool> Confirmation for F {
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Core domain errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CoreError {
    /// Any failure of the backing store. The detail is for logs only.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid client id")]
    InvalidClientId,
    #[error("invalid user email")]
    InvalidUserEmail,
    #[error("not authenticated")]
    NotAuthenticated,
    /// The auth provider could not be reached or answered unexpectedly.
    #[error("auth provider unavailable: {0}")]
    AuthUnavailable(String),
    #[error("session closed")]
    SessionClosed,
}

pub mod adapters;
pub mod board;
pub mod filter;
pub mod notify;
pub mod service;
pub mod session;
pub mod validate;

pub use session::{Session, SessionId, SessionInfo};
