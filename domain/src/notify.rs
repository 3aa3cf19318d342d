//! Transient user notifications. Failures carry one generic message per
//! operation kind and never any error detail.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    List,
    Create,
    Update,
    Delete,
    Logout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub operation: Operation,
    pub kind: NoticeKind,
    pub message: &'static str,
}

impl Notification {
    pub fn success(operation: Operation) -> Self {
        let message = match operation {
            Operation::List => "Clients loaded",
            Operation::Create => "Client created successfully",
            Operation::Update => "Client updated successfully",
            Operation::Delete => "Client deleted successfully",
            Operation::Logout => "Signed out",
        };
        Self {
            operation,
            kind: NoticeKind::Success,
            message,
        }
    }

    pub fn failure(operation: Operation) -> Self {
        let message = match operation {
            Operation::List => "Error loading clients",
            Operation::Create => "Error creating client",
            Operation::Update => "Error updating client",
            Operation::Delete => "Error deleting client",
            Operation::Logout => "Error signing out",
        };
        Self {
            operation,
            kind: NoticeKind::Error,
            message,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == NoticeKind::Error
    }
}
