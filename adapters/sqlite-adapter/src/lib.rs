//! sqlite-adapter: SQLite implementation of the ClientStore port for local/dev.
//!
//! Purpose
//! - Provide a lightweight, file-based store to run the system locally
//!   without the remote document database.
//! - Implements the `ClientStore` trait from the `domain` crate and a
//!   `StoreConnector` that shares one database across sessions.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - Ids are UUID v4 strings, generated here the way the remote store would.
//! - Calls are short and synchronous under a mutex; no lock is held across an
//!   `.await`.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use domain::{
    ClientFields, ClientId, ClientRecord, ClientStore, CoreError, Session, StoreConnector,
};
use rusqlite::{params, Connection};
use tracing::trace;

/// SQLite-backed client store for local development.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at the given path and ensure schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(map_sqerr)?;
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Like `new`, creating the parent directory first.
    pub fn open_creating_dirs<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        if let Some(dir) = path.as_ref().parent() { let _ = std::fs::create_dir_all(dir); }
        Self::new(path)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CoreError> {
        self.conn.lock().map_err(|_| CoreError::StoreUnavailable("mutex poisoned".into()))
    }
}

fn init_schema(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS clients (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT NOT NULL,
            address TEXT NOT NULL
        );
        "#,
    )
    .map_err(map_sqerr)
}

fn map_sqerr(e: rusqlite::Error) -> CoreError {
    CoreError::StoreUnavailable(format!("sqlite: {e}"))
}

fn row_to_record(row: &rusqlite::Row) -> Result<ClientRecord, CoreError> {
    let id: String = row.get(0).map_err(map_sqerr)?;
    let name: String = row.get(1).map_err(map_sqerr)?;
    let email: String = row.get(2).map_err(map_sqerr)?;
    let phone: String = row.get(3).map_err(map_sqerr)?;
    let address: String = row.get(4).map_err(map_sqerr)?;
    let id = ClientId::new(id).map_err(|_| CoreError::StoreUnavailable("bad id in row".into()))?;
    Ok(ClientRecord::new(id, ClientFields { name, email, phone, address }))
}

#[async_trait]
impl ClientStore for SqliteStore {
    async fn list_all(&self) -> Result<Vec<ClientRecord>, CoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, name, email, phone, address FROM clients")
            .map_err(map_sqerr)?;
        let mut rows = stmt.query([]).map_err(map_sqerr)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqerr)? {
            out.push(row_to_record(row)?);
        }
        trace!(count = out.len(), "sqlite list");
        Ok(out)
    }

    async fn create(&self, fields: ClientFields) -> Result<ClientRecord, CoreError> {
        let conn = self.conn()?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        conn.execute(
            "INSERT INTO clients(id, name, email, phone, address) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, fields.name, fields.email, fields.phone, fields.address],
        ).map_err(map_sqerr)?;
        Ok(ClientRecord::new(ClientId::new(id)?, fields))
    }

    async fn update(&self, id: &ClientId, fields: ClientFields) -> Result<(), CoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE clients SET name = ?1, email = ?2, phone = ?3, address = ?4 WHERE id = ?5",
            params![fields.name, fields.email, fields.phone, fields.address, id.as_str()],
        ).map_err(map_sqerr)?;
        if changed == 0 {
            // Missing documents are not distinguished from other store failures.
            return Err(CoreError::StoreUnavailable(format!("no client {id}")));
        }
        Ok(())
    }

    async fn delete(&self, id: &ClientId) -> Result<(), CoreError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM clients WHERE id = ?1", params![id.as_str()]).map_err(map_sqerr)?;
        Ok(())
    }
}

/// Shares one `SqliteStore` across all sessions.
#[derive(Clone)]
pub struct SqliteConnector {
    store: Arc<SqliteStore>,
}

impl SqliteConnector {
    pub fn new(store: SqliteStore) -> Self {
        Self { store: Arc::new(store) }
    }
}

impl StoreConnector for SqliteConnector {
    fn connect(&self, _session: &Session) -> Result<Arc<dyn ClientStore>, CoreError> {
        Ok(self.store.clone())
    }
}
