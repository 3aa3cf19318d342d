//! Per-session view state: the snapshot, the reload policy, and the
//! notifications each action produces.
//!
//! After every successful mutation the snapshot is discarded and rebuilt from
//! a full `list_all()`. Overlapping reloads are sequenced by a ticket taken
//! when the reload is issued; a response older than the last applied one is
//! dropped, so the newest request wins rather than the slowest response.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, warn};

use crate::notify::{Notification, Operation};
use crate::service::ClientService;
use crate::{ClientFields, ClientId, ClientRecord, Confirmation, CoreError, Session};

/// Result of a user action together with the notifications to show.
#[derive(Debug)]
pub struct Report<T> {
    pub outcome: Result<T, CoreError>,
    pub notifications: Vec<Notification>,
}

impl<T> Report<T> {
    fn rejected(err: CoreError) -> Self {
        Self {
            outcome: Err(err),
            notifications: Vec::new(),
        }
    }

    fn failed(err: CoreError, op: Operation) -> Self {
        Self {
            outcome: Err(err),
            notifications: vec![Notification::failure(op)],
        }
    }
}

struct BoardState {
    snapshot: Arc<Vec<ClientRecord>>,
    applied: u64,
}

pub struct ClientBoard {
    service: ClientService,
    state: Mutex<BoardState>,
    issued: AtomicU64,
}

impl ClientBoard {
    pub fn new(service: ClientService) -> Self {
        Self {
            service,
            state: Mutex::new(BoardState {
                snapshot: Arc::new(Vec::new()),
                applied: 0,
            }),
            issued: AtomicU64::new(0),
        }
    }

    pub fn session(&self) -> &Session {
        self.service.session()
    }

    fn state(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The snapshot as of the last applied reload.
    pub fn snapshot(&self) -> Arc<Vec<ClientRecord>> {
        self.state().snapshot.clone()
    }

    /// Whether any reload has been applied since the board was built.
    pub fn has_loaded(&self) -> bool {
        self.state().applied > 0
    }

    /// Records of the current snapshot matching `query`.
    pub fn visible(&self, query: &str) -> Vec<ClientRecord> {
        let snapshot = self.snapshot();
        crate::filter::filter_cloned(&snapshot, query)
    }

    /// Re-fetch the collection. On failure the previous snapshot stays and an
    /// error notification is returned.
    pub async fn reload(&self) -> Option<Notification> {
        let ticket = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        match self.service.list_all().await {
            Ok(records) => {
                let mut st = self.state();
                if ticket > st.applied {
                    st.snapshot = Arc::new(records);
                    st.applied = ticket;
                } else {
                    debug!(ticket, applied = st.applied, "stale reload dropped");
                }
                None
            }
            Err(e) => {
                warn!(err = ?e, "reload failed; keeping previous snapshot");
                Some(Notification::failure(Operation::List))
            }
        }
    }

    pub async fn create(&self, fields: ClientFields) -> Report<ClientRecord> {
        match self.service.create(fields).await {
            Ok(record) => Report {
                outcome: Ok(record),
                notifications: self.after_mutation(Operation::Create).await,
            },
            Err(e @ CoreError::MissingField(_)) => Report::rejected(e),
            Err(e) => {
                error!(err = ?e, "create error");
                Report::failed(e, Operation::Create)
            }
        }
    }

    pub async fn update(&self, id: &ClientId, fields: ClientFields) -> Report<()> {
        match self.service.update(id, fields).await {
            Ok(()) => Report {
                outcome: Ok(()),
                notifications: self.after_mutation(Operation::Update).await,
            },
            Err(e @ CoreError::MissingField(_)) => Report::rejected(e),
            Err(e) => {
                error!(id = %id, err = ?e, "update error");
                Report::failed(e, Operation::Update)
            }
        }
    }

    /// Delete after asking `confirmation`. A "no" makes no store call and
    /// reports `Ok(false)` with no notification.
    pub async fn delete<C>(&self, id: &ClientId, confirmation: &C) -> Report<bool>
    where
        C: Confirmation + ?Sized,
    {
        let prompt = self.delete_prompt(id);
        if !confirmation.confirm(&prompt) {
            debug!(id = %id, "delete declined");
            return Report {
                outcome: Ok(false),
                notifications: Vec::new(),
            };
        }
        match self.service.delete(id).await {
            Ok(()) => Report {
                outcome: Ok(true),
                notifications: self.after_mutation(Operation::Delete).await,
            },
            Err(e) => {
                error!(id = %id, err = ?e, "delete error");
                Report::failed(e, Operation::Delete)
            }
        }
    }

    fn delete_prompt(&self, id: &ClientId) -> String {
        let snapshot = self.snapshot();
        match snapshot.iter().find(|r| &r.id == id) {
            Some(r) => format!("Are you sure you want to delete {}?", r.name),
            None => "Are you sure you want to delete this client?".to_string(),
        }
    }

    async fn after_mutation(&self, op: Operation) -> Vec<Notification> {
        let mut out = vec![Notification::success(op)];
        out.extend(self.reload().await);
        out
    }
}
