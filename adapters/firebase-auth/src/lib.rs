//! firebase-auth: Firebase Authentication adapter (email/password sessions).
//!
//! Purpose
//! - Implement the domain `AuthProvider` port against the Identity Toolkit
//!   REST API (`accounts:signInWithPassword`).
//! - The returned ID token becomes the session's bearer token for the
//!   Firestore adapter; its `exp` claim bounds the session lifetime.
//!
//! API
//! - `FirebaseAuth::new(api_key, clock)` → `AuthProvider`
//!
//! Notes
//! - Firebase client sessions have no server-side revocation, so logout is a
//!   local teardown of the session context.
//! - The ID token is issued to us over TLS by the provider itself; claims are
//!   decoded without signature verification only to read `sub` and `exp`.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::Engine;
use domain::{AuthProvider, Clock, CoreError, Credentials, Session, SessionInfo, UserEmail};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

const DEFAULT_ENDPOINT: &str = "https://identitytoolkit.googleapis.com";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
    #[error("missing or malformed token")]
    Malformed,
    #[error("invalid token payload: {0}")]
    InvalidPayload(&'static str),
    #[error("provider returned an unusable email")]
    InvalidEmail,
    #[error("network or provider error: {0}")]
    Network(String),
}

impl From<AuthError> for CoreError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials(_) => CoreError::NotAuthenticated,
            AuthError::InvalidEmail => CoreError::InvalidUserEmail,
            other => CoreError::AuthUnavailable(other.to_string()),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    email: String,
    local_id: String,
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    exp: Option<u64>,
}

/// Email/password auth against Firebase.
#[derive(Clone)]
pub struct FirebaseAuth {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    clock: Arc<dyn Clock>,
}

impl FirebaseAuth {
    pub fn new(api_key: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: DEFAULT_ENDPOINT.into(),
            api_key: api_key.into(),
            clock,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn sign_in_with_password(
        &self,
        credentials: &Credentials,
    ) -> Result<SignInResponse, AuthError> {
        let url = format!(
            "{}/v1/accounts:signInWithPassword",
            self.endpoint.trim_end_matches('/')
        );
        let resp = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&SignInRequest {
                email: credentials.email.trim(),
                password: &credentials.password,
                return_secure_token: true,
            })
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<SignInResponse>()
                .await
                .map_err(|_| AuthError::InvalidPayload("sign-in response"));
        }
        // Identity Toolkit reports bad credentials as 400 with a code in `message`.
        if status == reqwest::StatusCode::BAD_REQUEST {
            let code = resp
                .json::<ErrorBody>()
                .await
                .map(|b| b.error.message)
                .unwrap_or_else(|_| "unknown".into());
            return Err(AuthError::InvalidCredentials(code));
        }
        Err(AuthError::Network(format!("status {status}")))
    }

    fn session_from_response(&self, resp: SignInResponse) -> Result<Session, AuthError> {
        let now = self.clock.now();
        let claims = decode_claims(&resp.id_token)?;
        if claims.sub != resp.local_id {
            return Err(AuthError::InvalidPayload("sub"));
        }
        // Prefer the token's own exp; fall back to the relative expiresIn.
        let expires_at = claims
            .exp
            .map(|exp| UNIX_EPOCH + Duration::from_secs(exp))
            .or_else(|| {
                resp.expires_in
                    .as_deref()
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(|secs| now + Duration::from_secs(secs))
            });
        let email = UserEmail::new(resp.email).map_err(|_| AuthError::InvalidEmail)?;
        let info = SessionInfo {
            uid: resp.local_id,
            email,
            token: Some(resp.id_token),
            expires_at,
        };
        Ok(Session::start(info, now))
    }
}

#[async_trait]
impl AuthProvider for FirebaseAuth {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, CoreError> {
        let resp = self.sign_in_with_password(credentials).await.map_err(|e| {
            warn!(err = ?e, email = %credentials.email, "firebase sign-in failed");
            e
        })?;
        let session = self.session_from_response(resp)?;
        trace!(uid = %session.info().uid, "firebase-auth: signed in");
        Ok(session)
    }

    async fn logout(&self, session: &Session) -> Result<(), CoreError> {
        session.close();
        trace!(uid = %session.info().uid, "firebase-auth: session closed");
        Ok(())
    }
}

fn decode_claims(id_token: &str) -> Result<Claims, AuthError> {
    let parts: Vec<&str> = id_token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::Malformed);
    }
    let payload_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1].as_bytes())
        .map_err(|_| AuthError::Malformed)?;
    serde_json::from_slice(&payload_bytes).map_err(|_| AuthError::InvalidPayload("json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::SystemClock;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token_with_payload(payload: &serde_json::Value) -> String {
        let header = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"{\"alg\":\"none\"}");
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{payload}.") // empty signature for tests
    }

    fn creds(password: &str) -> Credentials {
        Credentials {
            email: "user@acme.com".into(),
            password: password.into(),
        }
    }

    fn auth_for(server: &MockServer) -> FirebaseAuth {
        FirebaseAuth::new("k1", Arc::new(SystemClock)).with_endpoint(server.uri())
    }

    fn now_secs() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
    }

    #[test]
    fn decode_claims_reads_sub_and_exp() {
        let tok = token_with_payload(&serde_json::json!({"sub": "uid1", "exp": 42}));
        let c = decode_claims(&tok).unwrap();
        assert_eq!(c.sub, "uid1");
        assert_eq!(c.exp, Some(42));
        assert_eq!(decode_claims("nope").unwrap_err(), AuthError::Malformed);
    }

    #[test]
    fn errors_map_to_core() {
        assert_eq!(
            CoreError::from(AuthError::InvalidCredentials("INVALID_PASSWORD".into())),
            CoreError::NotAuthenticated
        );
        assert!(matches!(
            CoreError::from(AuthError::Network("x".into())),
            CoreError::AuthUnavailable(_)
        ));
    }

    #[tokio::test]
    async fn sign_in_builds_session_with_token_and_expiry() {
        let server = MockServer::start().await;
        let exp = now_secs() + 3600;
        let id_token = token_with_payload(&serde_json::json!({"sub": "uid1", "exp": exp}));
        Mock::given(method("POST"))
            .and(path("/v1/accounts:signInWithPassword"))
            .and(query_param("key", "k1"))
            .and(body_json(serde_json::json!({
                "email": "user@acme.com",
                "password": "pw",
                "returnSecureToken": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "idToken": id_token,
                "email": "user@acme.com",
                "localId": "uid1",
                "refreshToken": "r",
                "expiresIn": "3600"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let auth = auth_for(&server);
        let session = auth.sign_in(&creds("pw")).await.unwrap();
        assert_eq!(session.email().as_str(), "user@acme.com");
        assert_eq!(session.token(), Some(id_token.as_str()));
        assert_eq!(
            session.info().expires_at,
            Some(UNIX_EPOCH + Duration::from_secs(exp))
        );
        assert!(session.is_open(SystemTime::now()));

        auth.logout(&session).await.unwrap();
        assert!(!session.is_open(SystemTime::now()));
    }

    #[tokio::test]
    async fn bad_password_is_not_authenticated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts:signInWithPassword"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": { "code": 400, "message": "INVALID_LOGIN_CREDENTIALS" }
            })))
            .mount(&server)
            .await;

        let err = auth_for(&server).sign_in(&creds("wrong")).await.unwrap_err();
        assert_eq!(err, CoreError::NotAuthenticated);
    }

    #[tokio::test]
    async fn provider_outage_is_auth_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = auth_for(&server).sign_in(&creds("pw")).await.unwrap_err();
        assert!(matches!(err, CoreError::AuthUnavailable(_)));
    }

    #[tokio::test]
    async fn unusable_account_email_is_invalid_user_email() {
        let server = MockServer::start().await;
        let id_token = token_with_payload(&serde_json::json!({"sub": "uid1"}));
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "idToken": id_token,
                "email": "not-an-email",
                "localId": "uid1"
            })))
            .mount(&server)
            .await;

        let err = auth_for(&server).sign_in(&creds("pw")).await.unwrap_err();
        assert_eq!(err, CoreError::InvalidUserEmail);
    }

    #[tokio::test]
    async fn mismatched_subject_is_rejected() {
        let server = MockServer::start().await;
        let id_token = token_with_payload(&serde_json::json!({"sub": "someone-else"}));
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "idToken": id_token,
                "email": "user@acme.com",
                "localId": "uid1"
            })))
            .mount(&server)
            .await;

        let err = auth_for(&server).sign_in(&creds("pw")).await.unwrap_err();
        assert!(matches!(err, CoreError::AuthUnavailable(_)));
    }
}
