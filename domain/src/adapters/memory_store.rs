use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{
    ClientFields, ClientId, ClientRecord, ClientStore, CoreError, Session, StoreConnector,
};

/// Simple in-memory client store for tests and local runs. Ids are UUID v4.
///
/// `set_available(false)` makes every call fail with `StoreUnavailable`,
/// standing in for a network outage.
pub struct InMemoryStore {
    inner: Mutex<BTreeMap<String, ClientFields>>,
    available: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), CoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoreError::StoreUnavailable("memory store offline".into()))
        }
    }

    fn map(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, ClientFields>>, CoreError> {
        self.check()?;
        self.inner
            .lock()
            .map_err(|_| CoreError::StoreUnavailable("mutex poisoned".into()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClientStore for InMemoryStore {
    async fn list_all(&self) -> Result<Vec<ClientRecord>, CoreError> {
        let map = self.map()?;
        map.iter()
            .map(|(id, f)| Ok(ClientRecord::new(ClientId::new(id.clone())?, f.clone())))
            .collect()
    }

    async fn create(&self, fields: ClientFields) -> Result<ClientRecord, CoreError> {
        let mut map = self.map()?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        map.insert(id.clone(), fields.clone());
        Ok(ClientRecord::new(ClientId::new(id)?, fields))
    }

    async fn update(&self, id: &ClientId, fields: ClientFields) -> Result<(), CoreError> {
        let mut map = self.map()?;
        match map.get_mut(id.as_str()) {
            Some(slot) => {
                *slot = fields;
                Ok(())
            }
            None => Err(CoreError::StoreUnavailable(format!("no document {id}"))),
        }
    }

    async fn delete(&self, id: &ClientId) -> Result<(), CoreError> {
        let mut map = self.map()?;
        map.remove(id.as_str());
        Ok(())
    }
}

/// Hands every session the same shared in-memory store.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    store: Arc<InMemoryStore>,
}

impl MemoryConnector {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }
}

impl StoreConnector for MemoryConnector {
    fn connect(&self, _session: &Session) -> Result<Arc<dyn ClientStore>, CoreError> {
        Ok(self.store.clone())
    }
}
