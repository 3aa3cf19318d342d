//! api-server: HTTP API for the client records workspace.
//!
//! Serves the signed-in user's client list with search, create, update and
//! confirmed delete, plus sign-in and logout. Supports local dev with:
//! - Auth: Firebase email/password or dev mode (any email + non-empty password).
//! - Storage: In-memory, SQLite (file) with the `sqlite` feature, or Firestore
//!   with the `firestore` feature.
//! - CORS: Configurable via CORS_ALLOW_ORIGIN (origin string) for the frontend.
//!
//! Run:
//! ```bash
//! # pretty logs (default); PORT optional
//! cargo run -p api-server
//!
//! # with the Firestore adapter enabled (requires env vars)
//! AUTH_PROVIDER=firebase FIREBASE_API_KEY=... \
//! STORAGE_PROVIDER=firestore FIRESTORE_PROJECT_ID=my-project \
//!   cargo run -p api-server --features firestore
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod config;
mod sessions;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use axum::http::HeaderValue;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{post, put},
    Json, Router,
};
use domain::adapters::dev_auth::DevAuth;
use domain::adapters::memory_store::MemoryConnector;
use domain::board::ClientBoard;
use domain::notify::{Notification, Operation};
use domain::service::ClientService;
use domain::{
    AuthProvider, ClientFields, ClientId, ClientRecord, Clock, CoreError, Credentials,
    SessionId, StoreConnector, SystemClock,
};
use firebase_auth::FirebaseAuth;
use serde::{Deserialize, Serialize};
use sessions::SessionRegistry;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Clone)]
struct AppState {
    auth: Arc<dyn AuthProvider>,
    connector: Arc<dyn StoreConnector>,
    sessions: SessionRegistry,
    clock: Arc<dyn Clock>,
}

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    cfg.warn_if_insecure();

    let connector = match build_connector(&cfg) {
        Ok(c) => c,
        Err(e) => {
            error!(err = ?e, provider = ?cfg.storage_provider, "storage init failed");
            std::process::exit(1);
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = AppState {
        auth: build_auth(&cfg, clock.clone()),
        connector,
        sessions: SessionRegistry::default(),
        clock,
    };

    // CORS - already validated in Config::from_env()
    let cors = if cfg.cors_allow_origin == HeaderValue::from_static("*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([cfg.cors_allow_origin.clone()]))
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PUT,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
    };
    let app = router(state).layer(cors);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, err = %e, "bind failed");
            std::process::exit(1);
        }
    };
    info!(%addr, "api-server listening");
    if let Err(e) = axum::serve(listener, app).await {
        error!(err = %e, "server error");
        std::process::exit(1);
    }
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

fn router(state: AppState) -> Router {
    // Request ID header name
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    Router::new()
        .route("/api/session", post(login).delete(logout))
        .route("/api/clients", post(create_client).get(list_clients))
        .route("/api/clients/:id", put(update_client).delete(delete_client))
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .with_state(state)
}

fn build_auth(cfg: &config::Config, clock: Arc<dyn Clock>) -> Arc<dyn AuthProvider> {
    match (&cfg.auth_provider, &cfg.firebase_api_key) {
        (config::AuthProvider::Firebase, Some(key)) => {
            let mut auth = FirebaseAuth::new(key.clone(), clock);
            if let Some(ep) = &cfg.firebase_auth_endpoint {
                auth = auth.with_endpoint(ep.clone());
            }
            Arc::new(auth)
        }
        _ => Arc::new(DevAuth::new(cfg.allowed_domain.clone(), clock)),
    }
}

// Construct the store connector based on config and feature flags.
fn build_connector(cfg: &config::Config) -> Result<Arc<dyn StoreConnector>, CoreError> {
    match cfg.storage_provider {
        config::StorageProvider::Memory => Ok(Arc::new(MemoryConnector::default())),
        #[cfg(feature = "sqlite")]
        config::StorageProvider::Sqlite => {
            let store = sqlite_adapter::SqliteStore::open_creating_dirs(&cfg.db_path)?;
            info!(path = %cfg.db_path.display(), "sqlite store opened");
            Ok(Arc::new(sqlite_adapter::SqliteConnector::new(store)))
        }
        #[cfg(feature = "firestore")]
        config::StorageProvider::Firestore => {
            let fs = cfg.firestore.as_ref().ok_or_else(|| {
                CoreError::StoreUnavailable("firestore settings missing".into())
            })?;
            let mut fc = firestore::FirestoreConfig::new(&fs.project_id, &fs.collection)
                .with_timeout(fs.timeout);
            if let Some(ep) = &fs.endpoint {
                fc = fc.with_endpoint(ep);
            }
            Ok(Arc::new(firestore::FirestoreConnector::new(&fc)?))
        }
        #[allow(unreachable_patterns)]
        _ => Err(CoreError::StoreUnavailable(format!(
            "storage provider {:?} not compiled in",
            cfg.storage_provider
        ))),
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ClientReq {
    name: String,
    email: String,
    phone: String,
    address: String,
}

impl From<ClientReq> for ClientFields {
    fn from(r: ClientReq) -> Self {
        ClientFields {
            name: r.name,
            email: r.email,
            phone: r.phone,
            address: r.address,
        }
    }
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default)]
    q: String,
    refresh: Option<String>,
}

#[derive(Deserialize)]
struct DeleteQuery {
    confirm: Option<String>,
}

#[derive(Serialize)]
struct SessionOut {
    session_id: String,
    email: String,
    started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<String>,
}

#[derive(Serialize)]
struct ListOut {
    clients: Vec<ClientRecord>,
    total: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    notifications: Vec<Notification>,
}

#[derive(Serialize)]
struct MutationOut {
    #[serde(skip_serializing_if = "Option::is_none")]
    client: Option<ClientRecord>,
    clients: Vec<ClientRecord>,
    notifications: Vec<Notification>,
}

#[derive(Serialize)]
struct LogoutOut {
    notifications: Vec<Notification>,
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(http_common::json_error_with_message("unauthorized", message)),
    )
        .into_response()
}

fn error_status(err: &CoreError) -> (StatusCode, &'static str) {
    match err {
        CoreError::MissingField(_) | CoreError::InvalidUserEmail => {
            (StatusCode::BAD_REQUEST, "bad_request")
        }
        CoreError::InvalidClientId => (StatusCode::BAD_REQUEST, "invalid_id"),
        CoreError::NotAuthenticated | CoreError::SessionClosed => {
            (StatusCode::UNAUTHORIZED, "unauthorized")
        }
        CoreError::StoreUnavailable(_) | CoreError::AuthUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    }
}

/// Error envelope; store details stay in the logs.
fn error_response(err: &CoreError, notifications: Vec<Notification>) -> Response {
    let (status, code) = error_status(err);
    let mut body = match err {
        CoreError::MissingField(field) => {
            http_common::json_error_with_message(code, &format!("{field} is required"))
        }
        _ => http_common::json_err(code),
    };
    if !notifications.is_empty() {
        body["notifications"] = serde_json::json!(notifications);
    }
    (status, Json(body)).into_response()
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Arc<ClientBoard>, Response> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(http_common::bearer_token)
        .and_then(SessionId::parse)
        .and_then(|id| state.sessions.get(&id, state.clock.now()))
        .ok_or_else(|| {
            warn!("auth failed: missing or unknown session");
            unauthorized("missing or invalid session")
        })
}

async fn login(State(state): State<AppState>, Json(creds): Json<Credentials>) -> Response {
    let session = match state.auth.sign_in(&creds).await {
        Ok(s) => s,
        Err(CoreError::NotAuthenticated) => {
            warn!(email = %creds.email, "sign-in rejected");
            return unauthorized("invalid credentials");
        }
        Err(e) => {
            error!(err = ?e, "sign-in error");
            return error_response(&e, Vec::new());
        }
    };

    let store = match state.connector.connect(&session) {
        Ok(s) => s,
        Err(e) => {
            error!(err = ?e, "store connect error");
            if let Err(e) = state.auth.logout(&session).await {
                warn!(err = ?e, "logout after failed connect");
            }
            session.close();
            return error_response(&e, Vec::new());
        }
    };

    let service = ClientService::new(store, session.clone(), state.clock.clone());
    state
        .sessions
        .insert(ClientBoard::new(service), state.clock.now());
    info!(
        email = %session.email().as_str(),
        active = state.sessions.len(),
        "sign-in ok"
    );
    (
        StatusCode::CREATED,
        Json(SessionOut {
            session_id: session.id().as_str().to_string(),
            email: session.email().as_str().to_string(),
            started_at: http_common::system_time_to_rfc3339(session.started_at()),
            expires_at: session
                .info()
                .expires_at
                .map(http_common::system_time_to_rfc3339),
        }),
    )
        .into_response()
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let board = match authenticate(&state, &headers) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let session = board.session().clone();
    state.sessions.remove(session.id());

    let notification = match state.auth.logout(&session).await {
        Ok(()) => {
            info!(email = %session.email().as_str(), "logout ok");
            Notification::success(Operation::Logout)
        }
        Err(e) => {
            // The local session is torn down either way.
            session.close();
            error!(err = ?e, "logout error");
            Notification::failure(Operation::Logout)
        }
    };
    (
        StatusCode::OK,
        Json(LogoutOut {
            notifications: vec![notification],
        }),
    )
        .into_response()
}

async fn list_clients(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<ListQuery>,
) -> Response {
    let board = match authenticate(&state, &headers) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    // Search runs over the held snapshot; the store is hit on first load or on request.
    // A failed reload keeps the previous snapshot and reports it as a notice.
    let refresh = q.refresh.as_deref().is_some_and(http_common::is_truthy);
    let notification = if refresh || !board.has_loaded() {
        board.reload().await
    } else {
        None
    };
    let total = board.snapshot().len();
    let clients = board.visible(&q.q);
    info!(total, shown = clients.len(), "list ok");
    (
        StatusCode::OK,
        Json(ListOut {
            clients,
            total,
            notifications: notification.into_iter().collect(),
        }),
    )
        .into_response()
}

async fn create_client(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ClientReq>,
) -> Response {
    let board = match authenticate(&state, &headers) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let report = board.create(body.into()).await;
    match report.outcome {
        Ok(client) => {
            info!(id = %client.id, "create ok");
            (
                StatusCode::CREATED,
                Json(MutationOut {
                    client: Some(client),
                    clients: board.visible(""),
                    notifications: report.notifications,
                }),
            )
                .into_response()
        }
        Err(e) => error_response(&e, report.notifications),
    }
}

async fn update_client(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ClientReq>,
) -> Response {
    let board = match authenticate(&state, &headers) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let id = match ClientId::new(id) {
        Ok(id) => id,
        Err(e) => return error_response(&e, Vec::new()),
    };

    let report = board.update(&id, body.into()).await;
    match report.outcome {
        Ok(()) => {
            info!(id = %id, "update ok");
            (
                StatusCode::OK,
                Json(MutationOut {
                    client: None,
                    clients: board.visible(""),
                    notifications: report.notifications,
                }),
            )
                .into_response()
        }
        Err(e) => error_response(&e, report.notifications),
    }
}

async fn delete_client(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(q): Query<DeleteQuery>,
) -> Response {
    let board = match authenticate(&state, &headers) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let id = match ClientId::new(id) {
        Ok(id) => id,
        Err(e) => return error_response(&e, Vec::new()),
    };

    let confirmed = q.confirm.as_deref().is_some_and(http_common::is_truthy);
    let prompt = Mutex::new(None);
    let confirmation = |p: &str| {
        *prompt.lock().unwrap_or_else(PoisonError::into_inner) = Some(p.to_string());
        confirmed
    };

    let report = board.delete(&id, &confirmation).await;
    match report.outcome {
        Ok(true) => {
            info!(id = %id, "delete ok");
            (
                StatusCode::OK,
                Json(MutationOut {
                    client: None,
                    clients: board.visible(""),
                    notifications: report.notifications,
                }),
            )
                .into_response()
        }
        Ok(false) => {
            let message = prompt
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner)
                .unwrap_or_else(|| "Deletion must be confirmed".to_string());
            (
                StatusCode::CONFLICT,
                Json(http_common::json_error_with_message(
                    "confirmation_required",
                    &message,
                )),
            )
                .into_response()
        }
        Err(e) => error_response(&e, report.notifications),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use async_trait::async_trait;
    use domain::adapters::memory_store::InMemoryStore;
    use domain::{ClientStore, Session};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::SystemTime;
    use tower::util::ServiceExt;

    fn app_with(
        auth: Arc<dyn AuthProvider>,
        connector: Arc<dyn StoreConnector>,
    ) -> (Router, SessionRegistry) {
        let sessions = SessionRegistry::default();
        let state = AppState {
            auth,
            connector,
            sessions: sessions.clone(),
            clock: Arc::new(SystemClock),
        };
        (router(state), sessions)
    }

    fn dev_auth() -> Arc<dyn AuthProvider> {
        Arc::new(DevAuth::new(None, Arc::new(SystemClock)))
    }

    fn app_with_store(store: Arc<InMemoryStore>) -> Router {
        app_with(dev_auth(), Arc::new(MemoryConnector::new(store))).0
    }

    /// Counts `list_all` round-trips.
    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryStore,
        lists: AtomicUsize,
    }

    #[async_trait]
    impl ClientStore for CountingStore {
        async fn list_all(&self) -> Result<Vec<ClientRecord>, CoreError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            self.inner.list_all().await
        }
        async fn create(&self, fields: ClientFields) -> Result<ClientRecord, CoreError> {
            self.inner.create(fields).await
        }
        async fn update(&self, id: &ClientId, fields: ClientFields) -> Result<(), CoreError> {
            self.inner.update(id, fields).await
        }
        async fn delete(&self, id: &ClientId) -> Result<(), CoreError> {
            self.inner.delete(id).await
        }
    }

    struct SharedConnector(Arc<CountingStore>);

    impl StoreConnector for SharedConnector {
        fn connect(&self, _session: &Session) -> Result<Arc<dyn ClientStore>, CoreError> {
            Ok(self.0.clone())
        }
    }

    struct RefusingConnector;

    impl StoreConnector for RefusingConnector {
        fn connect(&self, _session: &Session) -> Result<Arc<dyn ClientStore>, CoreError> {
            Err(CoreError::NotAuthenticated)
        }
    }

    /// Dev auth that remembers the last session and can fail on logout.
    struct RecordingAuth {
        inner: DevAuth,
        fail_logout: bool,
        last: Mutex<Option<Session>>,
    }

    impl RecordingAuth {
        fn new(fail_logout: bool) -> Arc<Self> {
            Arc::new(Self {
                inner: DevAuth::new(None, Arc::new(SystemClock)),
                fail_logout,
                last: Mutex::new(None),
            })
        }

        fn last(&self) -> Session {
            self.last.lock().unwrap().clone().unwrap()
        }
    }

    #[async_trait]
    impl AuthProvider for RecordingAuth {
        async fn sign_in(&self, credentials: &Credentials) -> Result<Session, CoreError> {
            let session = self.inner.sign_in(credentials).await?;
            *self.last.lock().unwrap() = Some(session.clone());
            Ok(session)
        }

        async fn logout(&self, session: &Session) -> Result<(), CoreError> {
            if self.fail_logout {
                return Err(CoreError::AuthUnavailable("provider down".into()));
            }
            self.inner.logout(session).await
        }
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        let req = match body {
            Some(b) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn sign_in(app: &Router) -> String {
        let (status, body) = call(
            app,
            "POST",
            "/api/session",
            None,
            Some(json!({"email": "u@acme.com", "password": "pw"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["email"], "u@acme.com");
        body["session_id"].as_str().unwrap().to_string()
    }

    fn client(name: &str, phone: &str, address: &str) -> Value {
        json!({
            "name": name,
            "email": format!("{}@x.com", name.to_lowercase().replace(' ', ".")),
            "phone": phone,
            "address": address,
        })
    }

    #[tokio::test]
    async fn crud_search_and_logout_flow() {
        let app = app_with_store(Arc::new(InMemoryStore::new()));
        let token = sign_in(&app).await;
        let t = Some(token.as_str());

        let (status, body) = call(&app, "POST", "/api/clients", t, Some(client("Ana Silva", "111", "Rua A"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["client"]["name"], "Ana Silva");
        assert_eq!(body["notifications"][0]["message"], "Client created successfully");
        assert_eq!(body["clients"].as_array().unwrap().len(), 1);
        let ana_id = body["client"]["id"].as_str().unwrap().to_string();

        let (status, _) = call(&app, "POST", "/api/clients", t, Some(client("Bruno Costa", "222", "Av B"))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(&app, "GET", "/api/clients?q=ANA", t, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["clients"].as_array().unwrap().len(), 1);
        assert_eq!(body["clients"][0]["name"], "Ana Silva");
        assert!(body.get("notifications").is_none());

        let (_, body) = call(&app, "GET", "/api/clients?q=222", t, None).await;
        assert_eq!(body["clients"][0]["name"], "Bruno Costa");

        let (status, body) = call(
            &app,
            "PUT",
            &format!("/api/clients/{ana_id}"),
            t,
            Some(client("Ana Silva", "999", "Rua A")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["notifications"][0]["message"], "Client updated successfully");
        let ana = body["clients"]
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["id"] == ana_id.as_str())
            .unwrap();
        assert_eq!(ana["phone"], "999");

        // Unconfirmed delete asks and changes nothing.
        let (status, body) = call(&app, "DELETE", &format!("/api/clients/{ana_id}"), t, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "confirmation_required");
        assert_eq!(
            body["error"]["message"],
            "Are you sure you want to delete Ana Silva?"
        );

        let (status, body) = call(
            &app,
            "DELETE",
            &format!("/api/clients/{ana_id}?confirm=true"),
            t,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["notifications"][0]["message"], "Client deleted successfully");
        assert_eq!(body["clients"].as_array().unwrap().len(), 1);

        let (status, body) = call(&app, "DELETE", "/api/session", t, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["notifications"][0]["message"], "Signed out");

        let (status, _) = call(&app, "GET", "/api/clients", t, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rejects_missing_or_unknown_session() {
        let app = app_with_store(Arc::new(InMemoryStore::new()));
        let (status, body) = call(&app, "GET", "/api/clients", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unauthorized");

        let (status, _) = call(&app, "GET", "/api/clients", Some("not-a-session"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn bad_credentials_are_unauthorized() {
        let app = app_with_store(Arc::new(InMemoryStore::new()));
        let (status, body) = call(
            &app,
            "POST",
            "/api/session",
            None,
            Some(json!({"email": "u@acme.com", "password": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["message"], "invalid credentials");
    }

    #[tokio::test]
    async fn blank_field_is_rejected_without_store_call() {
        let store = Arc::new(InMemoryStore::new());
        let app = app_with_store(store.clone());
        let token = sign_in(&app).await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/clients",
            Some(&token),
            Some(json!({"name": "Ana", "email": "a@x.com", "phone": "  ", "address": "Rua A"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "phone is required");
        assert!(body.get("notifications").is_none());

        // Omitted fields count as blank.
        let (status, body) = call(&app, "POST", "/api/clients", Some(&token), Some(json!({"name": "Ana"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "email is required");

        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_id_in_path_is_invalid() {
        let app = app_with_store(Arc::new(InMemoryStore::new()));
        let token = sign_in(&app).await;
        let (status, body) = call(
            &app,
            "PUT",
            "/api/clients/%20",
            Some(&token),
            Some(client("Ana Silva", "111", "Rua A")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_id");
    }

    #[tokio::test]
    async fn store_outage_keeps_snapshot_and_reports_generic_errors() {
        let store = Arc::new(InMemoryStore::new());
        let app = app_with_store(store.clone());
        let token = sign_in(&app).await;
        let t = Some(token.as_str());

        let (status, _) = call(&app, "POST", "/api/clients", t, Some(client("Ana Silva", "111", "Rua A"))).await;
        assert_eq!(status, StatusCode::CREATED);

        store.set_available(false);

        let (status, body) = call(&app, "GET", "/api/clients?refresh=true", t, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["clients"][0]["name"], "Ana Silva");
        assert_eq!(body["notifications"][0]["kind"], "error");
        assert_eq!(body["notifications"][0]["message"], "Error loading clients");

        let (status, body) = call(&app, "POST", "/api/clients", t, Some(client("Bruno Costa", "222", "Av B"))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "unavailable");
        assert_eq!(body["notifications"][0]["message"], "Error creating client");
        assert!(!body.to_string().contains("offline"));
    }

    #[tokio::test]
    async fn search_keystrokes_filter_the_held_snapshot() {
        let store = Arc::new(CountingStore::default());
        store.inner.create(serde_json::from_value(client("Ana Silva", "111", "Rua A")).unwrap()).await.unwrap();
        store.inner.create(serde_json::from_value(client("Bruno Costa", "222", "Av B")).unwrap()).await.unwrap();
        let (app, _) = app_with(dev_auth(), Arc::new(SharedConnector(store.clone())));
        let token = sign_in(&app).await;
        let t = Some(token.as_str());

        for q in ["a", "an", "ana"] {
            let (status, body) = call(&app, "GET", &format!("/api/clients?q={q}"), t, None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["total"], 2);
        }
        let (_, body) = call(&app, "GET", "/api/clients?q=ana", t, None).await;
        assert_eq!(body["clients"].as_array().unwrap().len(), 1);
        // Only the first request loaded the collection.
        assert_eq!(store.lists.load(Ordering::SeqCst), 1);

        store.inner.create(serde_json::from_value(client("Carla Dias", "333", "Rua C")).unwrap()).await.unwrap();
        let (_, body) = call(&app, "GET", "/api/clients", t, None).await;
        assert_eq!(body["total"], 2);

        let (_, body) = call(&app, "GET", "/api/clients?refresh=1", t, None).await;
        assert_eq!(body["total"], 3);
        assert_eq!(store.lists.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_connect_at_login_tears_the_session_down() {
        let auth = RecordingAuth::new(false);
        let (app, sessions) = app_with(auth.clone(), Arc::new(RefusingConnector));

        let (status, body) = call(
            &app,
            "POST",
            "/api/session",
            None,
            Some(json!({"email": "u@acme.com", "password": "pw"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unauthorized");
        assert_eq!(sessions.len(), 0);
        assert!(!auth.last().is_open(SystemTime::now()));
    }

    #[tokio::test]
    async fn logout_removes_session_even_when_provider_fails() {
        let auth = RecordingAuth::new(true);
        let (app, sessions) = app_with(auth.clone(), Arc::new(MemoryConnector::default()));
        let token = sign_in(&app).await;
        assert_eq!(sessions.len(), 1);

        let (status, body) = call(&app, "DELETE", "/api/session", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["notifications"][0]["kind"], "error");
        assert_eq!(body["notifications"][0]["message"], "Error signing out");
        assert_eq!(sessions.len(), 0);
        assert!(!auth.last().is_open(SystemTime::now()));

        let (status, _) = call(&app, "GET", "/api/clients", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn error_statuses() {
        assert_eq!(error_status(&CoreError::MissingField("name")).0, StatusCode::BAD_REQUEST);
        assert_eq!(error_status(&CoreError::InvalidUserEmail).0, StatusCode::BAD_REQUEST);
        assert_eq!(error_status(&CoreError::SessionClosed).0, StatusCode::UNAUTHORIZED);
        assert_eq!(
            error_status(&CoreError::AuthUnavailable("x".into())).0,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    fn config_from(pairs: &[(&str, String)]) -> config::Config {
        config::Config::from_lookup(|k| {
            pairs.iter().find(|(key, _)| *key == k).map(|(_, v)| v.clone())
        })
        .unwrap()
    }

    #[test]
    fn memory_storage_builds() {
        let cfg = config_from(&[("STORAGE_PROVIDER", "memory".to_string())]);
        assert!(build_connector(&cfg).is_ok());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn unopenable_sqlite_path_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let cfg = config_from(&[
            ("STORAGE_PROVIDER", "sqlite".to_string()),
            ("DB_PATH", blocker.join("clients.db").display().to_string()),
        ]);
        assert!(matches!(
            build_connector(&cfg),
            Err(CoreError::StoreUnavailable(_))
        ));
    }

    #[cfg(not(feature = "firestore"))]
    #[test]
    fn storage_not_compiled_in_fails_startup() {
        let cfg = config_from(&[
            ("STORAGE_PROVIDER", "firestore".to_string()),
            ("FIRESTORE_PROJECT_ID", "demo".to_string()),
            ("AUTH_PROVIDER", "firebase".to_string()),
            ("FIREBASE_API_KEY", "k".to_string()),
        ]);
        assert!(build_connector(&cfg).is_err());
    }
}
