//! Core library for taskdesk.
//!
//! The session store and API client for the task service, with the task
//! models, session persistence, the local task snapshot and configuration.
//! Front ends drive a `SessionStore` and render the `ClientEvent`s it emits.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod events;
pub mod models;
pub mod utils;

pub use api::{ApiClient, ApiError, ApiResult};
pub use auth::{AuthStatus, SessionState, SessionStorage, SessionStore};
pub use cache::CacheManager;
pub use config::{Config, StorageBackend};
pub use events::{ClientEvent, EventBus, NoticeLevel};
