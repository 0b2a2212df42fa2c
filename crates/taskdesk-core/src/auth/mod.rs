//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `SessionStore`: the logged-in/anonymous state machine
//! - `SessionStorage`: tokens and user snapshot persisted across restarts
//! - Storage backends: in-memory, encrypted file, and OS keychain

pub mod credentials;
pub mod encrypted;
pub mod session;
pub mod storage;

pub use credentials::KeyringStore;
pub use encrypted::EncryptedFileStore;
pub use session::{AuthStatus, SessionState, SessionStore};
pub use storage::{KeyValueStore, MemoryStore, SessionStorage};
