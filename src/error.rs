use crate::forms::validation_messages;
use crate::pages;
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use axum_valid::{ValidRejection, ValidationRejection};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ClubError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("login required")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("database error: {0}")]
    Database(#[source] DieselError),

    #[error("prompt failed: {0}")]
    Prompt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<DieselError> for ClubError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => ClubError::NotFound("record"),
            DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _) => {
                ClubError::Conflict("Concurrent update detected, please try again".into())
            }
            err => ClubError::Database(err),
        }
    }
}

impl ClubError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ClubError::NotFound(_) => StatusCode::NOT_FOUND,
            ClubError::Conflict(_) => StatusCode::CONFLICT,
            ClubError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ClubError::InvalidCredentials | ClubError::Unauthorized => StatusCode::UNAUTHORIZED,
            ClubError::Forbidden(_) => StatusCode::FORBIDDEN,
            ClubError::Configuration(_)
            | ClubError::Connection(_)
            | ClubError::Migration(_)
            | ClubError::Database(_)
            | ClubError::Prompt(_)
            | ClubError::Io(_)
            | ClubError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message that is safe to show to a client.
    pub fn public_message(&self) -> String {
        if self.status_code() == StatusCode::INTERNAL_SERVER_ERROR {
            error!(err = %self, "Request failed");
            "Internal server error".into()
        } else {
            self.to_string()
        }
    }
}

impl IntoResponse for ClubError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.public_message();
        (status, Html(pages::error_page(status, &message))).into_response()
    }
}

/// JSON flavour of [`ClubError`] for the `/api` routes.
#[derive(Debug)]
pub struct ApiError(pub ClubError);

impl From<ClubError> for ApiError {
    fn from(err: ClubError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(ClubError::InvalidInput(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(ClubError::InvalidInput(rejection.body_text()))
    }
}

impl From<ValidRejection<JsonRejection>> for ApiError {
    fn from(rejection: ValidRejection<JsonRejection>) -> Self {
        match rejection {
            ValidationRejection::Valid(errors) => Self(ClubError::InvalidInput(
                validation_messages(&errors).join("; "),
            )),
            ValidationRejection::Inner(rejection) => rejection.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let body = json!({ "error": self.0.public_message() });
        (status, Json(body)).into_response()
    }
}
