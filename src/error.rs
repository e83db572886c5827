use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Self::Internal(err) => {
                error!(error = %err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_owned(),
                )
            }
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

macro_rules! internal_impl {
    ($E:ty) => {
        impl From<$E> for ApiError {
            fn from(err: $E) -> Self {
                Self::Internal(anyhow::Error::from(err))
            }
        }
    };
}

internal_impl!(anyhow::Error);
internal_impl!(sqlx::Error);
internal_impl!(serde_json::Error);
internal_impl!(axum::Error);
internal_impl!(std::io::Error);
