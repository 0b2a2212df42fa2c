//! Request/response middleware for the API client.
//!
//! Every call runs the request chain before each attempt. When an attempt
//! fails, the response chain decides in order whether to pass the error on,
//! retry the request, or stop.

use std::fmt;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::client::Transport;
use super::error::{ApiError, ApiResult};
use crate::auth::SessionStorage;
use crate::events::{ClientEvent, EventBus, NoticeLevel};

/// An outgoing call, kept so it can be re-issued.
#[derive(Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base URL
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub headers: HeaderMap,
    bearer: Option<String>,
    retried: bool,
}

impl fmt::Debug for ApiRequest {
    // Headers and bearer are left out so tokens never reach the logs
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("retried", &self.retried)
            .finish()
    }
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: HeaderMap::new(),
            bearer: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> ApiResult<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to encode body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn query(mut self, params: Vec<(String, String)>) -> Self {
        self.query = params;
        self
    }

    /// Token the request was last prepared with
    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    /// Set or remove the `Authorization: Bearer` header
    pub fn set_bearer(&mut self, token: Option<&str>) -> ApiResult<()> {
        match token {
            Some(token) => {
                let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                    ApiError::InvalidRequest("Access token is not a valid header value".into())
                })?;
                self.headers.insert(AUTHORIZATION, value);
                self.bearer = Some(token.to_string());
            }
            None => {
                self.headers.remove(AUTHORIZATION);
                self.bearer = None;
            }
        }
        Ok(())
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }

    pub fn mark_retried(&mut self) {
        self.retried = true;
    }
}

/// Decorates a request before each attempt.
#[async_trait]
pub trait RequestMiddleware: Send + Sync {
    async fn on_request(&self, request: &mut ApiRequest) -> ApiResult<()>;
}

/// What a response handler wants done with a failed attempt.
#[derive(Debug)]
pub enum Flow {
    /// Hand the (possibly replaced) error to the next handler
    Continue(ApiError),
    /// Re-issue the request
    Retry,
    /// Fail the call now, skipping later handlers
    Abort(ApiError),
}

/// Inspects a failed attempt.
#[async_trait]
pub trait ResponseMiddleware: Send + Sync {
    async fn on_error(
        &self,
        transport: &Transport,
        request: &mut ApiRequest,
        error: ApiError,
    ) -> Flow;
}

/// Attaches the persisted access token, read fresh on every attempt.
pub struct BearerAuth {
    storage: SessionStorage,
}

impl BearerAuth {
    pub fn new(storage: SessionStorage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl RequestMiddleware for BearerAuth {
    async fn on_request(&self, request: &mut ApiRequest) -> ApiResult<()> {
        let token = self.storage.access_token()?;
        request.set_bearer(token.as_deref())
    }
}

/// On a 401, renews the access token once and retries the request.
///
/// Refreshes are serialized: a request that waited on another refresh and
/// finds a newer token in storage retries with it instead of refreshing again.
/// If the refresh exchange fails, the persisted session is cleared and
/// `ClientEvent::LoginRequired` is emitted.
pub struct TokenRefresh {
    storage: SessionStorage,
    events: EventBus,
    refresh_lock: Mutex<()>,
}

impl TokenRefresh {
    pub fn new(storage: SessionStorage, events: EventBus) -> Self {
        Self {
            storage,
            events,
            refresh_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl ResponseMiddleware for TokenRefresh {
    async fn on_error(
        &self,
        transport: &Transport,
        request: &mut ApiRequest,
        error: ApiError,
    ) -> Flow {
        if !error.is_unauthorized() || request.is_retried() {
            return Flow::Continue(error);
        }
        request.mark_retried();

        let _guard = self.refresh_lock.lock().await;

        let current = self.storage.access_token().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read access token");
            None
        });
        if current.is_some() && current.as_deref() != request.bearer() {
            debug!(path = %request.path, "Access token already renewed, retrying");
            return Flow::Retry;
        }

        let refresh_token = match self.storage.refresh_token() {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!(path = %request.path, "No refresh token stored");
                return Flow::Continue(error);
            }
            Err(e) => {
                warn!(error = %e, "Failed to read refresh token");
                return Flow::Continue(error);
            }
        };

        match transport.refresh_access(&refresh_token).await {
            Ok(renewed) => {
                if let Err(e) = self
                    .storage
                    .update_access_token(&renewed.access, renewed.refresh.as_deref())
                {
                    return Flow::Abort(e.into());
                }
                info!(path = %request.path, "Access token refreshed");
                Flow::Retry
            }
            Err(refresh_error) => {
                warn!(error = %refresh_error, "Token refresh failed, clearing session");
                if let Err(e) = self.storage.clear() {
                    warn!(error = %e, "Failed to clear session storage");
                }
                self.events.emit(ClientEvent::LoginRequired);
                Flow::Abort(ApiError::RefreshFailed(Box::new(refresh_error)))
            }
        }
    }
}

/// Emits an error notice for every failure that reaches it.
pub struct NotifyOnError {
    events: EventBus,
}

impl NotifyOnError {
    pub fn new(events: EventBus) -> Self {
        Self { events }
    }
}

#[async_trait]
impl ResponseMiddleware for NotifyOnError {
    async fn on_error(
        &self,
        _transport: &Transport,
        _request: &mut ApiRequest,
        error: ApiError,
    ) -> Flow {
        self.events.notice(NoticeLevel::Error, error.user_message());
        Flow::Continue(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TokenPair, User};

    fn user() -> User {
        serde_json::from_str(r#"{"id": 1, "username": "alice"}"#).expect("user JSON")
    }

    #[tokio::test]
    async fn test_bearer_auth_sets_and_removes_header() {
        let storage = SessionStorage::in_memory();
        let auth = BearerAuth::new(storage.clone());

        let mut request = ApiRequest::get("tasks/");
        auth.on_request(&mut request).await.expect("decorate");
        assert!(request.headers.get(AUTHORIZATION).is_none());
        assert_eq!(request.bearer(), None);

        let tokens = TokenPair {
            access: "A1".to_string(),
            refresh: "R1".to_string(),
        };
        storage.save_session(&tokens, &user()).expect("save");
        auth.on_request(&mut request).await.expect("decorate");
        assert_eq!(request.headers[AUTHORIZATION], "Bearer A1");
        assert_eq!(request.bearer(), Some("A1"));

        storage.clear().expect("clear");
        auth.on_request(&mut request).await.expect("decorate");
        assert!(request.headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_debug_hides_token() {
        let mut request = ApiRequest::get("auth/profile/");
        request.set_bearer(Some("secret-token")).expect("bearer");
        let debug = format!("{:?}", request);
        assert!(debug.contains("auth/profile/"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn test_invalid_token_rejected() {
        let mut request = ApiRequest::get("tasks/");
        let result = request.set_bearer(Some("bad\ntoken"));
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
    }

    #[test]
    fn test_retry_flag() {
        let mut request = ApiRequest::post("tasks/")
            .json(&serde_json::json!({"title": "x"}))
            .expect("json");
        assert!(!request.is_retried());
        request.mark_retried();
        assert!(request.is_retried());
        assert_eq!(request.body, Some(serde_json::json!({"title": "x"})));
    }
}
