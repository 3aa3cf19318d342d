//! Server-side registry of signed-in sessions, keyed by session id.
//!
//! Each entry owns the board (snapshot + service) for that session. Closed or
//! expired sessions are evicted on lookup and swept on every insert.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use domain::board::ClientBoard;
use domain::SessionId;

#[derive(Clone, Default)]
pub struct SessionRegistry {
    boards: Arc<RwLock<HashMap<SessionId, Arc<ClientBoard>>>>,
}

impl SessionRegistry {
    pub fn insert(&self, board: ClientBoard, now: SystemTime) -> Arc<ClientBoard> {
        let board = Arc::new(board);
        let id = board.session().id().clone();
        let mut boards = self.boards.write().unwrap_or_else(PoisonError::into_inner);
        boards.retain(|_, b| b.session().is_open(now));
        boards.insert(id, board.clone());
        board
    }

    /// Board of an open session.
    pub fn get(&self, id: &SessionId, now: SystemTime) -> Option<Arc<ClientBoard>> {
        let board = self
            .boards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()?;
        if board.session().is_open(now) {
            Some(board)
        } else {
            self.remove(id);
            None
        }
    }

    pub fn remove(&self, id: &SessionId) -> Option<Arc<ClientBoard>> {
        self.boards
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub fn len(&self) -> usize {
        self.boards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
