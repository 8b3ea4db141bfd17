use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use sea_orm::{DbErr, SqlErr};
use serde::Serialize;
use serde_json::json;

/// Validation messages keyed by form field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// `Ok(())` when nothing was recorded, otherwise a validation error.
    pub fn into_result(self) -> Result<(), AppError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self))
        }
    }

    pub fn single(field: &str, message: impl Into<String>) -> AppError {
        let mut errors = Self::new();
        errors.add(field, message);
        AppError::Validation(errors)
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("authentication required")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid input: {0}")]
    Validation(FieldErrors),

    #[error("{0}")]
    Conflict(String),

    #[error("cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error(transparent)]
    Database(DbErr),

    #[error(transparent)]
    Template(#[from] minijinja::Error),

    #[error("export failed: {0}")]
    Export(String),

    #[error("mail delivery failed: {0}")]
    Mail(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn transition<F: std::fmt::Debug, T: std::fmt::Debug>(from: F, to: T) -> Self {
        Self::InvalidTransition {
            from: format!("{:?}", from),
            to: format!("{:?}", to),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) | Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::Database(_)
            | Self::Template(_)
            | Self::Export(_)
            | Self::Mail(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Database(_) => "database",
            Self::Template(_) => "template",
            Self::Export(_) => "export",
            Self::Mail(_) => "mail",
            Self::Internal(_) => "internal",
        }
    }

    /// Message safe to show a client; server-side failures are logged instead.
    fn public_message(&self) -> String {
        if self.status_code().is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
            "Something went wrong, please try again later".to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => {
                tracing::debug!(%detail, "unique constraint violated");
                Self::Conflict("a record with these details already exists".to_string())
            }
            Some(SqlErr::ForeignKeyConstraintViolation(detail)) => {
                tracing::debug!(%detail, "foreign key constraint violated");
                Self::Conflict("a referenced record does not exist".to_string())
            }
            _ => Self::Database(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::Validation(fields) => json!({
                "error": self.code(),
                "message": "invalid input",
                "fields": fields,
            }),
            other => json!({
                "error": other.code(),
                "message": other.public_message(),
            }),
        };
        (status, Json(body)).into_response()
    }
}

/// Error wrapper for server-rendered pages: unauthenticated visitors are sent
/// to the login form, everything else gets a plain-text status page.
#[derive(Debug)]
pub struct PageError {
    pub error: AppError,
    pub path: Option<String>,
}

impl From<AppError> for PageError {
    fn from(error: AppError) -> Self {
        Self { error, path: None }
    }
}

impl From<DbErr> for PageError {
    fn from(err: DbErr) -> Self {
        AppError::from(err).into()
    }
}

impl From<minijinja::Error> for PageError {
    fn from(err: minijinja::Error) -> Self {
        AppError::from(err).into()
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        match self.error {
            AppError::Unauthorized => {
                let target = match self.path {
                    Some(path) => format!(
                        "/login?next={}",
                        percent_encoding::utf8_percent_encode(
                            &path,
                            percent_encoding::NON_ALPHANUMERIC
                        )
                    ),
                    None => "/login".to_string(),
                };
                Redirect::to(&target).into_response()
            }
            error => {
                let status = error.status_code();
                (status, error.public_message()).into_response()
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(AppError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::forbidden("nope").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::NotFound("member").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            FieldErrors::single("email", "required").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::transition("visitor", "active").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn field_errors_collect_per_field() {
        let mut errors = FieldErrors::new();
        errors.add("email", "is required");
        errors.add("email", "must contain @");
        errors.add("first_name", "is required");

        assert_eq!(errors.get("email").map(|m| m.len()), Some(2));
        assert!(errors.clone().into_result().is_err());
        assert!(FieldErrors::new().into_result().is_ok());
        assert_eq!(
            errors.to_string(),
            "email: is required, must contain @; first_name: is required"
        );
    }

    #[test]
    fn page_error_redirects_to_login_with_next() {
        let response = PageError {
            error: AppError::Unauthorized,
            path: Some("/members/3".to_string()),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()["location"].to_str().unwrap();
        assert_eq!(location, "/login?next=%2Fmembers%2F3");
    }
}
