use std::sync::Arc;

use tracing::{debug, info};

use crate::validate::validate_fields;
use crate::{Clock, ClientFields, ClientId, ClientRecord, ClientStore, CoreError, Session};

/// Record store façade for one session.
///
/// Owns no record state: every call is a round-trip to the store. Fields are
/// validated before any remote call, and nothing reaches the store once the
/// session is closed.
#[derive(Clone)]
pub struct ClientService {
    store: Arc<dyn ClientStore>,
    session: Session,
    clock: Arc<dyn Clock>,
}

impl ClientService {
    pub fn new(store: Arc<dyn ClientStore>, session: Session, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            session,
            clock,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn ensure_open(&self) -> Result<(), CoreError> {
        self.session.ensure_open(self.clock.now())
    }

    /// Fetch the full collection.
    pub async fn list_all(&self) -> Result<Vec<ClientRecord>, CoreError> {
        self.ensure_open()?;
        let records = self.store.list_all().await?;
        debug!(count = records.len(), user = %self.session.email().as_str(), "list ok");
        Ok(records)
    }

    /// Create a new client; the store assigns the id.
    pub async fn create(&self, fields: ClientFields) -> Result<ClientRecord, CoreError> {
        validate_fields(&fields)?;
        self.ensure_open()?;
        let record = self.store.create(fields).await?;
        info!(id = %record.id, user = %self.session.email().as_str(), "create ok");
        Ok(record)
    }

    /// Overwrite an existing client's fields.
    pub async fn update(&self, id: &ClientId, fields: ClientFields) -> Result<(), CoreError> {
        validate_fields(&fields)?;
        self.ensure_open()?;
        self.store.update(id, fields).await?;
        info!(id = %id, user = %self.session.email().as_str(), "update ok");
        Ok(())
    }

    pub async fn delete(&self, id: &ClientId) -> Result<(), CoreError> {
        self.ensure_open()?;
        self.store.delete(id).await?;
        info!(id = %id, user = %self.session.email().as_str(), "delete ok");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_store::InMemoryStore;
    use crate::{SessionInfo, SystemClock, UserEmail};
    use std::time::SystemTime;

    fn session() -> Session {
        Session::start(
            SessionInfo {
                uid: "u1".into(),
                email: UserEmail::new("u@acme.com").unwrap(),
                token: None,
                expires_at: None,
            },
            SystemTime::now(),
        )
    }

    fn fields(name: &str) -> ClientFields {
        ClientFields {
            name: name.into(),
            email: format!("{}@x.com", name.to_lowercase()),
            phone: "111".into(),
            address: "Rua A".into(),
        }
    }

    fn svc() -> (ClientService, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let svc = ClientService::new(store.clone(), session(), Arc::new(SystemClock));
        (svc, store)
    }

    #[tokio::test]
    async fn create_then_list_contains_exactly_one_match() {
        let (svc, _) = svc();
        svc.create(fields("Bruno")).await.unwrap();
        let created = svc.create(fields("Ana")).await.unwrap();
        let all = svc.list_all().await.unwrap();
        let hits: Vec<_> = all.iter().filter(|r| r.fields() == fields("Ana")).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, created.id);
    }

    #[tokio::test]
    async fn consecutive_lists_are_equal() {
        let (svc, _) = svc();
        for n in ["Ana", "Bruno", "Carla"] {
            svc.create(fields(n)).await.unwrap();
        }
        let a = svc.list_all().await.unwrap();
        let b = svc.list_all().await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn update_changes_only_target() {
        let (svc, _) = svc();
        let a = svc.create(fields("Ana")).await.unwrap();
        let b = svc.create(fields("Bruno")).await.unwrap();
        svc.update(&a.id, fields("Ana Maria")).await.unwrap();

        let all = svc.list_all().await.unwrap();
        let got_a = all.iter().find(|r| r.id == a.id).unwrap();
        let got_b = all.iter().find(|r| r.id == b.id).unwrap();
        assert_eq!(got_a.fields(), fields("Ana Maria"));
        assert_eq!(got_b, &b);
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn delete_removes_only_target() {
        let (svc, _) = svc();
        let a = svc.create(fields("Ana")).await.unwrap();
        let b = svc.create(fields("Bruno")).await.unwrap();
        svc.delete(&a.id).await.unwrap();
        let all = svc.list_all().await.unwrap();
        assert!(all.iter().all(|r| r.id != a.id));
        assert_eq!(all, vec![b]);
    }

    #[tokio::test]
    async fn update_of_missing_id_is_store_unavailable() {
        let (svc, _) = svc();
        let err = svc
            .update(&ClientId::new("gone").unwrap(), fields("Ana"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn empty_field_never_reaches_store() {
        let (svc, store) = svc();
        store.set_available(false);
        let mut f = fields("Ana");
        f.address = String::new();
        let err = svc.create(f).await.unwrap_err();
        assert_eq!(err, CoreError::MissingField("address"));
    }

    #[tokio::test]
    async fn closed_session_rejects_calls() {
        let (svc, _) = svc();
        svc.session().close();
        assert!(matches!(
            svc.list_all().await,
            Err(CoreError::SessionClosed)
        ));
        assert!(matches!(
            svc.create(fields("Ana")).await,
            Err(CoreError::SessionClosed)
        ));
    }
}
