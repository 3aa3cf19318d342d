//! Adapters that live inside the domain crate for convenience.
//!
//! Intended for unit tests and local runs. Real adapters (SQLite, Firestore,
//! Firebase Auth) live in separate crates.

pub mod dev_auth;
pub mod memory_store;
