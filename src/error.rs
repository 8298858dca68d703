// Error type shared by the library, the CLI and the API server

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Input failed validation (empty name, negative amount, ...)
    #[error("{0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Reserved names (the `admin` account)
    #[error("'{0}' is reserved")]
    Reserved(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Could not validate credentials")]
    Unauthorized,

    /// Login rejected (unknown user or wrong password)
    #[error("{0}")]
    Login(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }
}

#[cfg(feature = "server")]
mod http {
    use super::Error;
    use axum::{
        http::{header, StatusCode},
        response::{IntoResponse, Response},
        Json,
    };

    impl Error {
        pub fn status(&self) -> StatusCode {
            match self {
                Error::Validation(_) | Error::Reserved(_) => StatusCode::BAD_REQUEST,
                Error::Unauthorized => StatusCode::UNAUTHORIZED,
                Error::NotFound { .. } => StatusCode::NOT_FOUND,
                Error::Login(_) => StatusCode::NOT_ACCEPTABLE,
                Error::Conflict(_) => StatusCode::CONFLICT,
                Error::Storage(_) | Error::Serialization(_) | Error::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
        }
    }

    impl IntoResponse for Error {
        fn into_response(self) -> Response {
            let status = self.status();
            if status.is_server_error() {
                tracing::error!("request failed: {self}");
            }

            let body = Json(serde_json::json!({ "detail": self.to_string() }));

            if let Error::Unauthorized = self {
                return (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response();
            }

            (status, body).into_response()
        }
    }
}
