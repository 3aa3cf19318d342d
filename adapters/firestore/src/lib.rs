//! Cloud Firestore adapter implementing the `ClientStore` port over the REST API.
//!
//! - Documents live in `projects/{project}/databases/(default)/documents/{collection}`
//!   and are flat maps of `stringValue` fields (`name`, `email`, `phone`, `address`).
//! - Every request carries the session's ID token as a bearer token, so the
//!   store is built per session by `FirestoreConnector`.
//! - `list_all` follows `nextPageToken` until the collection is exhausted and
//!   returns one snapshot.
//! - Any non-2xx response, transport error, or undecodable body maps to
//!   `CoreError::StoreUnavailable`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{
    ClientFields, ClientId, ClientRecord, ClientStore, CoreError, Session, StoreConnector,
};
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::trace;

const DEFAULT_ENDPOINT: &str = "https://firestore.googleapis.com";
const PAGE_SIZE: u32 = 300;
const FIELD_PATHS: [&str; 4] = ["name", "email", "phone", "address"];

/// Where the collection lives.
#[derive(Clone, Debug)]
pub struct FirestoreConfig {
    pub endpoint: String,
    pub project_id: String,
    pub collection: String,
    pub timeout: Duration,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            project_id: project_id.into(),
            collection: collection.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// URL of the collection resource.
    pub fn collection_url(&self) -> Result<Url, CoreError> {
        let raw = format!(
            "{}/v1/projects/{}/databases/(default)/documents/{}",
            self.endpoint.trim_end_matches('/'),
            self.project_id,
            self.collection
        );
        Url::parse(&raw).map_err(|e| CoreError::StoreUnavailable(format!("bad firestore url: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct Document {
    name: Option<String>,
    #[serde(default)]
    fields: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

/// Store bound to one session's bearer token.
#[derive(Clone)]
pub struct FirestoreStore {
    http: reqwest::Client,
    collection_url: Url,
    token: String,
}

impl FirestoreStore {
    pub fn new(http: reqwest::Client, collection_url: Url, token: impl Into<String>) -> Self {
        Self {
            http,
            collection_url,
            token: token.into(),
        }
    }

    fn doc_url(&self, id: &ClientId) -> Result<Url, CoreError> {
        let mut url = self.collection_url.clone();
        url.path_segments_mut()
            .map_err(|_| CoreError::StoreUnavailable("firestore url cannot be a base".into()))?
            .push(id.as_str());
        Ok(url)
    }
}

#[async_trait]
impl ClientStore for FirestoreStore {
    async fn list_all(&self) -> Result<Vec<ClientRecord>, CoreError> {
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut req = self
                .http
                .get(self.collection_url.clone())
                .bearer_auth(&self.token)
                .query(&[("pageSize", PAGE_SIZE)]);
            if let Some(t) = &page_token {
                req = req.query(&[("pageToken", t.as_str())]);
            }
            let page: ListResponse = send_json(req).await?;
            for doc in page.documents {
                out.push(document_to_record(doc)?);
            }
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(t) => page_token = Some(t),
                None => break,
            }
        }
        trace!(count = out.len(), "firestore list");
        Ok(out)
    }

    async fn create(&self, fields: ClientFields) -> Result<ClientRecord, CoreError> {
        let req = self
            .http
            .post(self.collection_url.clone())
            .bearer_auth(&self.token)
            .json(&fields_to_document(&fields));
        let doc: Document = send_json(req).await?;
        let record = document_to_record(doc)?;
        trace!(id = %record.id, "firestore create");
        Ok(record)
    }

    async fn update(&self, id: &ClientId, fields: ClientFields) -> Result<(), CoreError> {
        let mut query: Vec<(&str, &str)> =
            FIELD_PATHS.iter().map(|p| ("updateMask.fieldPaths", *p)).collect();
        // Fail instead of upserting when the document is gone.
        query.push(("currentDocument.exists", "true"));
        let req = self
            .http
            .patch(self.doc_url(id)?)
            .bearer_auth(&self.token)
            .query(&query)
            .json(&fields_to_document(&fields));
        let _: serde_json::Value = send_json(req).await?;
        Ok(())
    }

    async fn delete(&self, id: &ClientId) -> Result<(), CoreError> {
        let req = self.http.delete(self.doc_url(id)?).bearer_auth(&self.token);
        let _: serde_json::Value = send_json(req).await?;
        Ok(())
    }
}

async fn send_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, CoreError> {
    let resp = req
        .send()
        .await
        .map_err(|e| CoreError::StoreUnavailable(format!("firestore request: {e}")))?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(CoreError::StoreUnavailable(format!("firestore {status}: {body}")));
    }
    resp.json::<T>()
        .await
        .map_err(|e| CoreError::StoreUnavailable(format!("firestore decode: {e}")))
}

fn fields_to_document(fields: &ClientFields) -> serde_json::Value {
    serde_json::json!({
        "fields": {
            "name": { "stringValue": fields.name },
            "email": { "stringValue": fields.email },
            "phone": { "stringValue": fields.phone },
            "address": { "stringValue": fields.address },
        }
    })
}

fn document_to_record(doc: Document) -> Result<ClientRecord, CoreError> {
    let name = doc
        .name
        .ok_or_else(|| CoreError::StoreUnavailable("document without name".into()))?;
    let id = name.rsplit('/').next().unwrap_or_default();
    let id = ClientId::new(id)
        .map_err(|_| CoreError::StoreUnavailable(format!("bad document name {name}")))?;
    let fields = ClientFields {
        name: string_field(&doc.fields, "name"),
        email: string_field(&doc.fields, "email"),
        phone: string_field(&doc.fields, "phone"),
        address: string_field(&doc.fields, "address"),
    };
    Ok(ClientRecord::new(id, fields))
}

// Phones written by other clients may be stored as integers; those arrive as strings too.
fn string_field(fields: &HashMap<String, serde_json::Value>, key: &str) -> String {
    fields
        .get(key)
        .and_then(|v| v.get("stringValue").or_else(|| v.get("integerValue")))
        .and_then(|s| s.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Builds a `FirestoreStore` for each session from its ID token.
#[derive(Clone)]
pub struct FirestoreConnector {
    http: reqwest::Client,
    collection_url: Url,
}

impl FirestoreConnector {
    pub fn new(config: &FirestoreConfig) -> Result<Self, CoreError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CoreError::StoreUnavailable(format!("http client init: {e}")))?;
        Ok(Self {
            http,
            collection_url: config.collection_url()?,
        })
    }
}

impl StoreConnector for FirestoreConnector {
    fn connect(&self, session: &Session) -> Result<Arc<dyn ClientStore>, CoreError> {
        let token = session.token().ok_or(CoreError::NotAuthenticated)?;
        Ok(Arc::new(FirestoreStore::new(
            self.http.clone(),
            self.collection_url.clone(),
            token,
        )))
    }
}
