//! Data models for the task service.
//!
//! This module contains the data structures exchanged with the remote API:
//!
//! - `User`, `Credentials`, `Registration`: account data and auth payloads
//! - `Task`, `TaskDraft`, `TaskPatch`: task records and their write shapes
//! - `TaskFilter`, `TaskSortColumn`, `StatusFilter`: local list view logic
//! - `TaskStats`: per-user usage statistics
//! - `FieldError`: client-side form validation results

pub mod forms;
pub mod stats;
pub mod task;
pub mod user;

pub use forms::FieldError;
pub use stats::{CompletionBand, TaskStats};
pub use task::{
    StatusFilter, Task, TaskDraft, TaskEnvelope, TaskFilter, TaskList, TaskPatch, TaskQuery,
    TaskSortColumn, TaskStatus,
};
pub use user::{
    AuthResponse, Credentials, MessageResponse, RefreshedToken, Registration, TokenPair, User,
};
