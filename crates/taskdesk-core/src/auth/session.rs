//! The session state machine: Loading, Authenticated or Anonymous.
//!
//! `SessionStore` owns the in-memory state and drives it through the four
//! session operations. Tokens and the user snapshot are mirrored into
//! `SessionStorage` so a restart can restore them via `initialize`.

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::storage::SessionStorage;
use crate::api::{ApiClient, ApiError, ApiResult};
use crate::events::{drain, ClientEvent, EventBus, NoticeLevel};
use crate::models::{AuthResponse, Credentials, Registration, User};

const LOGIN_FAILED: &str = "Login failed";
const REGISTRATION_FAILED: &str = "Registration failed";
const LOGIN_SUCCEEDED: &str = "Signed in successfully";
const REGISTRATION_SUCCEEDED: &str = "Registration successful";
const SIGNED_OUT: &str = "Signed out";

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub user: Option<User>,
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for SessionState {
    /// Process start: nothing known yet
    fn default() -> Self {
        Self {
            user: None,
            loading: true,
            error: None,
        }
    }
}

/// Read-only view of `SessionState` as one of the three session states.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AuthStatus<'a> {
    Loading,
    Authenticated(&'a User),
    Anonymous { error: Option<&'a str> },
}

pub struct SessionStore {
    api: ApiClient,
    storage: SessionStorage,
    events: EventBus,
    receiver: broadcast::Receiver<ClientEvent>,
    state: SessionState,
}

impl SessionStore {
    /// `storage` and `events` should be the same handles the client was built with
    pub fn new(api: ApiClient, storage: SessionStorage, events: EventBus) -> Self {
        let receiver = events.subscribe();
        Self {
            api,
            storage,
            events,
            receiver,
            state: SessionState::default(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn status(&self) -> AuthStatus<'_> {
        match (&self.state.user, self.state.loading) {
            (_, true) => AuthStatus::Loading,
            (Some(user), false) => AuthStatus::Authenticated(user),
            (None, false) => AuthStatus::Anonymous {
                error: self.state.error.as_deref(),
            },
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.state.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.status(), AuthStatus::Authenticated(_))
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Restore a persisted session, trusting it only once the server accepts it
    pub async fn initialize(&mut self) {
        let persisted = match self.storage.has_session() {
            Ok(persisted) => persisted,
            Err(e) => {
                warn!(error = %e, "Stored session unreadable");
                self.discard_persisted();
                self.become_anonymous();
                return;
            }
        };

        if !persisted {
            debug!("No stored session");
            self.state.loading = false;
            return;
        }

        match self.api.profile().await {
            Ok(user) => {
                info!(username = %user.username, "Session restored");
                self.state.user = Some(user);
                self.state.loading = false;
            }
            Err(e) => {
                info!(error = %e, "Stored session rejected, signing out locally");
                self.discard_persisted();
                self.become_anonymous();
            }
        }
    }

    pub async fn login(&mut self, credentials: &Credentials) -> ApiResult<User> {
        self.begin();
        let result = self.api.login(credentials).await;
        self.complete(result, LOGIN_SUCCEEDED, LOGIN_FAILED)
    }

    pub async fn register(&mut self, registration: &Registration) -> ApiResult<User> {
        self.begin();
        let result = self.api.register(registration).await;
        self.complete(result, REGISTRATION_SUCCEEDED, REGISTRATION_FAILED)
    }

    /// Always ends Anonymous; the server call is best effort
    pub async fn logout(&mut self) {
        match self.storage.refresh_token() {
            Ok(Some(refresh)) => {
                if let Err(e) = self.api.logout(&refresh).await {
                    warn!(error = %e, "Server logout failed");
                }
            }
            Ok(None) => debug!("No refresh token to revoke"),
            Err(e) => warn!(error = %e, "Failed to read refresh token"),
        }

        self.discard_persisted();
        self.become_anonymous();
        info!("Signed out");
        self.events.notice(NoticeLevel::Info, SIGNED_OUT);
    }

    pub fn clear_error(&mut self) {
        self.state.error = None;
    }

    /// Apply pending client events. Returns true if the session was ended
    /// because the client could not renew it.
    pub fn process_events(&mut self) -> bool {
        let ended = drain(&mut self.receiver)
            .iter()
            .any(|event| *event == ClientEvent::LoginRequired);
        if ended {
            info!("Session could not be renewed, login required");
            self.become_anonymous();
        }
        ended
    }

    fn begin(&mut self) {
        self.state.loading = true;
        self.state.error = None;
    }

    fn complete(
        &mut self,
        result: ApiResult<AuthResponse>,
        success_notice: &str,
        failure_message: &str,
    ) -> ApiResult<User> {
        let response = match result {
            Ok(response) => response,
            Err(e) => return Err(self.fail(e, failure_message)),
        };

        if let Err(e) = self.storage.save_session(&response.tokens, &response.user) {
            return Err(self.fail(e.into(), failure_message));
        }

        info!(username = %response.user.username, "Authenticated");
        self.state.user = Some(response.user.clone());
        self.state.loading = false;
        self.state.error = None;
        self.events.notice(
            NoticeLevel::Success,
            response.message.as_deref().unwrap_or(success_notice),
        );
        Ok(response.user)
    }

    fn fail(&mut self, error: ApiError, fallback: &str) -> ApiError {
        warn!(error = %error, "{}", fallback);
        let server_message = match error {
            // That message belongs to the refresh exchange, not this call
            ApiError::RefreshFailed(_) => None,
            ref other => other.server_message(),
        };
        self.state.error = Some(server_message.unwrap_or(fallback).to_string());
        self.state.loading = false;
        error
    }

    fn discard_persisted(&self) {
        if let Err(e) = self.storage.clear() {
            warn!(error = %e, "Failed to clear stored session");
        }
    }

    fn become_anonymous(&mut self) {
        self.state = SessionState {
            user: None,
            loading: false,
            error: None,
        };
    }
}
