//! Account models and authentication payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The authenticated account as returned by the profile endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub date_joined: Option<DateTime<Utc>>,
}

impl User {
    /// Full name if one is set, otherwise the username
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string();
        if full.is_empty() {
            self.username.clone()
        } else {
            full
        }
    }
}

/// Username/password pair sent to the login endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Fields sent to the registration endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub first_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub last_name: String,
}

/// Access/refresh bearer token pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Success shape shared by login and registration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub tokens: TokenPair,
    #[serde(default)]
    pub message: Option<String>,
}

/// Refresh endpoint response; `refresh` is present when the server rotates it.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshedToken {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Body of endpoints that only acknowledge with a message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_user() {
        let user: User = serde_json::from_str(r#"{"id": 1, "username": "alice"}"#)
            .expect("Failed to parse user JSON");
        assert_eq!(user.id, 1);
        assert_eq!(user.username, "alice");
        assert!(user.email.is_empty());
        assert!(user.date_joined.is_none());
    }

    #[test]
    fn test_parse_auth_response() {
        let json = r#"{
            "user": {"id": 7, "username": "bob", "email": "bob@example.com",
                     "first_name": "Bob", "last_name": "Stone",
                     "date_joined": "2024-01-15T09:30:00.123456Z"},
            "tokens": {"access": "A1", "refresh": "R1"},
            "message": "ok"
        }"#;
        let resp: AuthResponse = serde_json::from_str(json).expect("Failed to parse auth JSON");
        assert_eq!(resp.tokens.access, "A1");
        assert_eq!(resp.tokens.refresh, "R1");
        assert_eq!(resp.message.as_deref(), Some("ok"));
        assert_eq!(resp.user.display_name(), "Bob Stone");
        assert!(resp.user.date_joined.is_some());
    }

    #[test]
    fn test_display_name_falls_back_to_username() {
        let user = User {
            id: 1,
            username: "alice".to_string(),
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            date_joined: None,
        };
        assert_eq!(user.display_name(), "alice");
    }

    #[test]
    fn test_registration_omits_empty_names() {
        let reg = Registration {
            username: "carol".to_string(),
            email: "carol@example.com".to_string(),
            password: "longpassword".to_string(),
            password_confirm: "longpassword".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&reg).expect("serialize registration");
        assert!(value.get("first_name").is_none());
        assert_eq!(value["password_confirm"], "longpassword");
    }
}
