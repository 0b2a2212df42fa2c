//! Client-side validation run before a form is submitted.

use std::fmt;

use super::task::{TaskDraft, TaskPatch};
use super::user::Registration;

const MIN_USERNAME_LENGTH: usize = 3;
const MIN_PASSWORD_LENGTH: usize = 8;
const MIN_TITLE_LENGTH: usize = 3;
const MAX_DESCRIPTION_LENGTH: usize = 500;

/// A rejected form field and the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// `local@domain.tld` with no whitespace anywhere
fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

impl Registration {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if self.username.chars().count() < MIN_USERNAME_LENGTH {
            errors.push(FieldError::new(
                "username",
                format!("must be at least {} characters", MIN_USERNAME_LENGTH),
            ));
        }
        if !is_plausible_email(&self.email) {
            errors.push(FieldError::new("email", "enter a valid email address"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            errors.push(FieldError::new(
                "password",
                format!("must be at least {} characters", MIN_PASSWORD_LENGTH),
            ));
        }
        if self.password != self.password_confirm {
            errors.push(FieldError::new("password_confirm", "passwords do not match"));
        }

        errors
    }
}

fn check_title(title: &str, errors: &mut Vec<FieldError>) {
    let title = title.trim();
    if title.is_empty() {
        errors.push(FieldError::new("title", "is required"));
    } else if title.chars().count() < MIN_TITLE_LENGTH {
        errors.push(FieldError::new(
            "title",
            format!("must be at least {} characters", MIN_TITLE_LENGTH),
        ));
    }
}

fn check_description(description: &str, errors: &mut Vec<FieldError>) {
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        errors.push(FieldError::new(
            "description",
            format!("must not exceed {} characters", MAX_DESCRIPTION_LENGTH),
        ));
    }
}

impl TaskDraft {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        check_title(&self.title, &mut errors);
        check_description(&self.description, &mut errors);
        errors
    }
}

impl TaskPatch {
    /// Same rules as `TaskDraft`, for the fields being changed
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if let Some(ref title) = self.title {
            check_title(title, &mut errors);
        }
        if let Some(ref description) = self.description {
            check_description(description, &mut errors);
        }
        errors
    }
}
