//! API client for the task service REST API.
//!
//! `Transport` performs single raw HTTP exchanges. `ApiClient` runs every
//! call through the middleware chain (bearer auth, one-shot token refresh,
//! error notices) and exposes the auth and task endpoints.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::error::{ApiError, ApiResult};
use super::middleware::{
    ApiRequest, BearerAuth, Flow, NotifyOnError, RequestMiddleware, ResponseMiddleware,
    TokenRefresh,
};
use crate::auth::SessionStorage;
use crate::events::EventBus;
use crate::models::{
    AuthResponse, Credentials, MessageResponse, RefreshedToken, Registration, Task, TaskDraft,
    TaskEnvelope, TaskList, TaskPatch, TaskQuery, TaskStats, User,
};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Attempts per call, counting the first one.
const MAX_ATTEMPTS: u32 = 2;

const REFRESH_PATH: &str = "auth/refresh/";

/// Raw HTTP access to the API base URL, with no middleware.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct Transport {
    client: Client,
    base_url: String,
}

impl Transport {
    pub fn new(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> ApiResult<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Send one attempt of a request as-is
    pub async fn send(&self, request: &ApiRequest) -> ApiResult<Response> {
        let mut builder = self
            .client
            .request(request.method.clone(), self.url(&request.path))
            .headers(request.headers.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        debug!(
            method = %request.method,
            path = %request.path,
            retried = request.is_retried(),
            "Sending request"
        );
        let response = builder.send().await?;
        Self::check_response(response).await
    }

    /// Exchange a refresh token for a new access token
    pub async fn refresh_access(&self, refresh_token: &str) -> ApiResult<RefreshedToken> {
        let request = ApiRequest::post(REFRESH_PATH)
            .json(&serde_json::json!({ "refresh": refresh_token }))?;
        let response = self.send(&request).await?;
        parse_json(response, &request).await
    }
}

async fn parse_json<T: DeserializeOwned>(
    response: Response,
    request: &ApiRequest,
) -> ApiResult<T> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        ApiError::InvalidResponse(format!(
            "Failed to parse {} {} response: {}",
            request.method, request.path, e
        ))
    })
}

/// API client with an ordered middleware chain.
/// Clone is cheap; clones share the connection pool and middleware.
#[derive(Clone)]
pub struct ApiClient {
    transport: Transport,
    request_chain: Vec<Arc<dyn RequestMiddleware>>,
    response_chain: Vec<Arc<dyn ResponseMiddleware>>,
}

impl ApiClient {
    /// Create a client with the default chain:
    /// `BearerAuth` on requests, then `TokenRefresh` and `NotifyOnError` on failures.
    pub fn new(base_url: &str, storage: SessionStorage, events: EventBus) -> ApiResult<Self> {
        Self::with_timeout(
            base_url,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            storage,
            events,
        )
    }

    pub fn with_timeout(
        base_url: &str,
        timeout: Duration,
        storage: SessionStorage,
        events: EventBus,
    ) -> ApiResult<Self> {
        let mut client = Self::bare(Transport::new(base_url, timeout)?);
        client.push_request_middleware(Arc::new(BearerAuth::new(storage.clone())));
        client.push_response_middleware(Arc::new(TokenRefresh::new(storage, events.clone())));
        client.push_response_middleware(Arc::new(NotifyOnError::new(events)));
        Ok(client)
    }

    /// A client with no middleware at all
    pub fn bare(transport: Transport) -> Self {
        Self {
            transport,
            request_chain: Vec::new(),
            response_chain: Vec::new(),
        }
    }

    pub fn push_request_middleware(&mut self, middleware: Arc<dyn RequestMiddleware>) {
        self.request_chain.push(middleware);
    }

    pub fn push_response_middleware(&mut self, middleware: Arc<dyn ResponseMiddleware>) {
        self.response_chain.push(middleware);
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Run the response chain over a failed attempt.
    /// Returns `None` when a handler asked for a retry.
    async fn handle_failure(
        &self,
        request: &mut ApiRequest,
        mut error: ApiError,
    ) -> Option<ApiError> {
        for handler in &self.response_chain {
            match handler.on_error(&self.transport, request, error).await {
                Flow::Continue(next) => error = next,
                Flow::Retry => return None,
                Flow::Abort(final_error) => return Some(final_error),
            }
        }
        Some(error)
    }

    /// Report a failure that happened outside the HTTP exchange.
    /// The request is marked retried first, so nothing in the chain retries it.
    async fn report(&self, request: &mut ApiRequest, error: ApiError) -> ApiError {
        request.mark_retried();
        let message = error.to_string();
        self.handle_failure(request, error)
            .await
            .unwrap_or(ApiError::InvalidRequest(message))
    }

    /// Send a request through the middleware chain
    pub async fn execute(&self, mut request: ApiRequest) -> ApiResult<Response> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            for middleware in &self.request_chain {
                if let Err(error) = middleware.on_request(&mut request).await {
                    return Err(self.report(&mut request, error).await);
                }
            }

            let error = match self.transport.send(&request).await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };

            if attempts >= MAX_ATTEMPTS {
                request.mark_retried();
            }
            match self.handle_failure(&mut request, error).await {
                Some(error) => return Err(error),
                None if attempts >= MAX_ATTEMPTS => {
                    warn!(path = %request.path, attempts, "Retry requested past attempt limit");
                    return Err(ApiError::InvalidRequest(format!(
                        "{} {} exceeded {} attempts",
                        request.method, request.path, MAX_ATTEMPTS
                    )));
                }
                None => debug!(path = %request.path, "Retrying request"),
            }
        }
    }

    async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> ApiResult<T> {
        let mut template = request.clone();
        let response = self.execute(request).await?;
        match parse_json(response, &template).await {
            Ok(value) => Ok(value),
            Err(error) => Err(self.report(&mut template, error).await),
        }
    }

    // ===== Auth =====

    pub async fn register(&self, registration: &Registration) -> ApiResult<AuthResponse> {
        self.call(ApiRequest::post("auth/register/").json(registration)?).await
    }

    pub async fn login(&self, credentials: &Credentials) -> ApiResult<AuthResponse> {
        self.call(ApiRequest::post("auth/login/").json(credentials)?).await
    }

    /// Revoke a refresh token on the server
    pub async fn logout(&self, refresh_token: &str) -> ApiResult<MessageResponse> {
        let body = serde_json::json!({ "refresh": refresh_token });
        self.call(ApiRequest::post("auth/logout/").json(&body)?).await
    }

    pub async fn profile(&self) -> ApiResult<User> {
        self.call(ApiRequest::get("auth/profile/")).await
    }

    /// Explicit refresh exchange; `TokenRefresh` does this on its own after a 401
    pub async fn refresh_token(&self, refresh_token: &str) -> ApiResult<RefreshedToken> {
        let body = serde_json::json!({ "refresh": refresh_token });
        self.call(ApiRequest::post(REFRESH_PATH).json(&body)?).await
    }

    // ===== Tasks =====

    pub async fn list_tasks(&self, query: &TaskQuery) -> ApiResult<Vec<Task>> {
        let list: TaskList = self
            .call(ApiRequest::get("tasks/").query(query.to_params()))
            .await?;
        let tasks = list.into_tasks();
        debug!(count = tasks.len(), "Fetched tasks");
        Ok(tasks)
    }

    pub async fn create_task(&self, draft: &TaskDraft) -> ApiResult<TaskEnvelope> {
        self.call(ApiRequest::post("tasks/").json(&draft.normalized())?).await
    }

    pub async fn get_task(&self, task_id: i64) -> ApiResult<Task> {
        self.call(ApiRequest::get(format!("tasks/{}/", task_id))).await
    }

    pub async fn update_task(&self, task_id: i64, patch: &TaskPatch) -> ApiResult<TaskEnvelope> {
        self.call(ApiRequest::patch(format!("tasks/{}/", task_id)).json(patch)?).await
    }

    pub async fn delete_task(&self, task_id: i64) -> ApiResult<()> {
        self.execute(ApiRequest::delete(format!("tasks/{}/", task_id))).await?;
        Ok(())
    }

    pub async fn toggle_task_status(&self, task_id: i64) -> ApiResult<TaskEnvelope> {
        self.call(ApiRequest::patch(format!("tasks/{}/toggle/", task_id))).await
    }

    pub async fn task_stats(&self) -> ApiResult<TaskStats> {
        self.call(ApiRequest::get("tasks/stats/")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::storage::{
        Entries, MemoryStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY,
    };
    use crate::events::{drain, ClientEvent, NoticeLevel};
    use crate::models::TaskStatus;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn task_json(id: i64, title: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "title": title,
            "description": null,
            "status": "pending",
            "created_at": "2024-05-01T12:00:00Z",
            "updated_at": "2024-05-01T12:00:00Z",
            "user": "alice",
            "is_completed": false
        })
    }

    fn logged_in_storage(access: &str, refresh: Option<&str>) -> SessionStorage {
        let mut entries = Entries::new();
        entries.insert(ACCESS_TOKEN_KEY.to_string(), access.to_string());
        if let Some(refresh) = refresh {
            entries.insert(REFRESH_TOKEN_KEY.to_string(), refresh.to_string());
        }
        entries.insert(
            USER_KEY.to_string(),
            r#"{"id": 1, "username": "alice"}"#.to_string(),
        );
        SessionStorage::new(MemoryStore::from_entries(entries))
    }

    fn client_for(server: &MockServer, storage: &SessionStorage, events: &EventBus) -> ApiClient {
        ApiClient::new(
            &format!("{}/api/v1", server.uri()),
            storage.clone(),
            events.clone(),
        )
        .expect("build client")
    }

    #[tokio::test]
    async fn test_bearer_token_attached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tasks/"))
            .and(header("Authorization", "Bearer A1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let storage = logged_in_storage("A1", Some("R1"));
        let client = client_for(&server, &storage, &EventBus::new());
        let tasks = client.list_tasks(&TaskQuery::default()).await.expect("list");
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_unauthenticated_request_has_no_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/login/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "user": {"id": 1, "username": "alice"},
                "tokens": {"access": "A1", "refresh": "R1"},
                "message": "ok"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, &SessionStorage::in_memory(), &EventBus::new());
        let resp = client
            .login(&Credentials::new("alice", "secret123"))
            .await
            .expect("login");
        assert_eq!(resp.tokens.access, "A1");

        let received = server.received_requests().await.expect("recording enabled");
        assert_eq!(received.len(), 1);
        assert!(received[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_expired_token_refreshed_and_retried_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tasks/"))
            .and(header("Authorization", "Bearer A1"))
            .respond_with(ResponseTemplate::new(401).set_body_json(
                serde_json::json!({"detail": "Given token not valid for any token type"}),
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/refresh/"))
            .and(body_json(serde_json::json!({"refresh": "R1"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access": "A2"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tasks/"))
            .and(header("Authorization", "Bearer A2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 1,
                "results": [task_json(5, "Water plants")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let storage = logged_in_storage("A1", Some("R1"));
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let client = client_for(&server, &storage, &events);

        let tasks = client.list_tasks(&TaskQuery::default()).await.expect("list after refresh");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Water plants");
        assert_eq!(storage.access_token().expect("read").as_deref(), Some("A2"));
        assert_eq!(storage.refresh_token().expect("read").as_deref(), Some("R1"));
        // A recovered call is not a failure
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_persisted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/auth/profile/"))
            .and(header("Authorization", "Bearer A1"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/refresh/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access": "A2", "refresh": "R2"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/auth/profile/"))
            .and(header("Authorization", "Bearer A2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": 1, "username": "alice"})),
            )
            .mount(&server)
            .await;

        let storage = logged_in_storage("A1", Some("R1"));
        let client = client_for(&server, &storage, &EventBus::new());
        let user = client.profile().await.expect("profile");
        assert_eq!(user.username, "alice");
        assert_eq!(storage.refresh_token().expect("read").as_deref(), Some("R2"));
    }

    #[tokio::test]
    async fn test_no_refresh_token_fails_with_original_401() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tasks/stats/"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(serde_json::json!({"detail": "expired"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/refresh/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access": "A2"})),
            )
            .expect(0)
            .mount(&server)
            .await;

        let storage = logged_in_storage("A1", None);
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let client = client_for(&server, &storage, &events);

        let err = client.task_stats().await.expect_err("should fail");
        assert!(err.is_unauthorized());
        assert_eq!(
            drain(&mut rx),
            vec![ClientEvent::Notice {
                level: NoticeLevel::Error,
                message: "expired".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_other_error_statuses_propagate_without_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tasks/7/"))
            .respond_with(ResponseTemplate::new(403).set_body_json(
                serde_json::json!({"detail": "You do not have permission"}),
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tasks/stats/"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/refresh/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access": "A2"})),
            )
            .expect(0)
            .mount(&server)
            .await;

        let storage = logged_in_storage("A1", Some("R1"));
        let client = client_for(&server, &storage, &EventBus::new());

        let forbidden = client.get_task(7).await.expect_err("403");
        assert_eq!(forbidden.status(), Some(403));
        assert_eq!(forbidden.server_message(), Some("You do not have permission"));

        let server_error = client.task_stats().await.expect_err("500");
        assert_eq!(server_error.status(), Some(500));

        assert_eq!(storage.access_token().expect("read").as_deref(), Some("A1"));
        assert_eq!(storage.refresh_token().expect("read").as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn test_second_401_is_not_retried_again() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tasks/"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/refresh/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access": "A2"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let storage = logged_in_storage("A1", Some("R1"));
        let client = client_for(&server, &storage, &EventBus::new());

        let err = client
            .list_tasks(&TaskQuery::default())
            .await
            .expect_err("second 401 propagates");
        assert!(err.is_unauthorized());
        // The refreshed token is kept; only a failed refresh clears the session
        assert_eq!(storage.access_token().expect("read").as_deref(), Some("A2"));
    }

    #[tokio::test]
    async fn test_refresh_failure_clears_session_and_requires_login() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tasks/"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/refresh/"))
            .respond_with(ResponseTemplate::new(401).set_body_json(
                serde_json::json!({"detail": "Token is blacklisted", "code": "token_not_valid"}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let storage = logged_in_storage("A1", Some("R1"));
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let client = client_for(&server, &storage, &events);

        let err = client
            .list_tasks(&TaskQuery::default())
            .await
            .expect_err("refresh failure propagates");
        match err {
            ApiError::RefreshFailed(inner) => {
                assert_eq!(inner.server_message(), Some("Token is blacklisted"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(storage.access_token().expect("read"), None);
        assert_eq!(storage.refresh_token().expect("read"), None);
        assert_eq!(storage.user().expect("read"), None);
        assert_eq!(drain(&mut rx), vec![ClientEvent::LoginRequired]);
    }

    #[tokio::test]
    async fn test_concurrent_401s_share_one_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("Authorization", "Bearer A1"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/refresh/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access": "A2"}))
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tasks/"))
            .and(header("Authorization", "Bearer A2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tasks/stats/"))
            .and(header("Authorization", "Bearer A2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "total_tasks": 0, "completed_tasks": 0, "pending_tasks": 0, "completion_rate": 0
            })))
            .mount(&server)
            .await;

        let storage = logged_in_storage("A1", Some("R1"));
        let client = client_for(&server, &storage, &EventBus::new());

        let query = TaskQuery::default();
        let (tasks, stats) = futures::join!(client.list_tasks(&query), client.task_stats());
        assert!(tasks.expect("tasks").is_empty());
        assert_eq!(stats.expect("stats").total_tasks, 0);
    }

    #[tokio::test]
    async fn test_validation_error_notifies_with_server_error_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/login/"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "Username and password required"})),
            )
            .mount(&server)
            .await;

        let events = EventBus::new();
        let mut rx = events.subscribe();
        let client = client_for(&server, &SessionStorage::in_memory(), &events);

        let err = client
            .login(&Credentials::new("", ""))
            .await
            .expect_err("400");
        assert_eq!(err.status(), Some(400));
        assert_eq!(
            drain(&mut rx),
            vec![ClientEvent::Notice {
                level: NoticeLevel::Error,
                message: "Username and password required".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_transport_failure_notifies_with_transport_message() {
        // Bind then drop a listener so the port refuses connections
        let uri = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
            format!("http://{}", listener.local_addr().expect("addr"))
        };
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let client = ApiClient::new(&uri, SessionStorage::in_memory(), events.clone())
            .expect("build client");

        let err = client.profile().await.expect_err("connection refused");
        assert!(matches!(err, ApiError::NetworkError(_)));
        match drain(&mut rx).as_slice() {
            [ClientEvent::Notice { level: NoticeLevel::Error, message }] => {
                assert!(!message.is_empty());
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_task_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tasks/"))
            .and(query_param("status", "pending"))
            .and(query_param("search", "milk"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([task_json(1, "Buy milk")])),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/tasks/"))
            .and(body_json(serde_json::json!({"title": "Buy milk", "description": "2 liters"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "task": task_json(1, "Buy milk"),
                "message": "created"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tasks/1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(task_json(1, "Buy milk")))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/api/v1/tasks/1/"))
            .and(body_json(serde_json::json!({"title": "Buy oat milk"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "task": task_json(1, "Buy oat milk"),
                "message": "updated"
            })))
            .mount(&server)
            .await;
        let mut toggled = task_json(1, "Buy oat milk");
        toggled["status"] = serde_json::json!("completed");
        Mock::given(method("PATCH"))
            .and(path("/api/v1/tasks/1/toggle/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "task": toggled,
                "message": "toggled"
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/tasks/1/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"message": "deleted"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let storage = logged_in_storage("A1", Some("R1"));
        let client = client_for(&server, &storage, &EventBus::new());

        let query = TaskQuery {
            search: Some("milk".to_string()),
            status: Some(TaskStatus::Pending),
            ordering: None,
        };
        assert_eq!(client.list_tasks(&query).await.expect("list").len(), 1);

        let draft = TaskDraft::new("  Buy milk ").with_description("2 liters");
        let created = client.create_task(&draft).await.expect("create");
        assert_eq!(created.message.as_deref(), Some("created"));

        assert_eq!(client.get_task(1).await.expect("get").title, "Buy milk");

        let patch = TaskPatch {
            title: Some("Buy oat milk".to_string()),
            ..Default::default()
        };
        let updated = client.update_task(1, &patch).await.expect("update");
        assert_eq!(updated.task.title, "Buy oat milk");

        let toggled = client.toggle_task_status(1).await.expect("toggle");
        assert!(toggled.task.is_completed());

        client.delete_task(1).await.expect("delete");
    }

    #[tokio::test]
    async fn test_unparseable_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tasks/stats/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let events = EventBus::new();
        let mut rx = events.subscribe();
        let client = client_for(&server, &SessionStorage::in_memory(), &events);
        let err = client.task_stats().await.expect_err("bad body");
        assert!(matches!(err, ApiError::InvalidResponse(_)));
        match drain(&mut rx).as_slice() {
            [ClientEvent::Notice { level: NoticeLevel::Error, message }] => {
                assert!(message.contains("tasks/stats/"));
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    struct FailingRequest;

    #[async_trait::async_trait]
    impl RequestMiddleware for FailingRequest {
        async fn on_request(&self, _request: &mut ApiRequest) -> ApiResult<()> {
            Err(ApiError::InvalidRequest("header rejected".to_string()))
        }
    }

    #[tokio::test]
    async fn test_request_middleware_failure_notifies() {
        let server = MockServer::start().await;
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let mut client = client_for(&server, &SessionStorage::in_memory(), &events);
        client.request_chain.insert(0, Arc::new(FailingRequest));

        let err = client.profile().await.expect_err("request rejected");
        assert!(matches!(err, ApiError::InvalidRequest(_)));
        assert_eq!(drain(&mut rx).len(), 1);

        let received = server.received_requests().await.expect("recording enabled");
        assert!(received.is_empty());
    }
}
