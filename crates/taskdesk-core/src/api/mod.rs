//! REST API client module for the task service.
//!
//! This module provides the `ApiClient` for communicating with the
//! task service API: account registration/login, profile, and task CRUD.
//!
//! Requests carry a JWT bearer access token. An expired access token is
//! renewed once per request through the refresh endpoint.

pub mod client;
pub mod error;
pub mod middleware;

pub use client::{ApiClient, Transport, DEFAULT_TIMEOUT_SECS};
pub use error::{ApiError, ApiResult, ErrorDetail};
pub use middleware::{
    ApiRequest, BearerAuth, Flow, NotifyOnError, RequestMiddleware, ResponseMiddleware,
    TokenRefresh,
};
