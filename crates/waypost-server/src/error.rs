use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use uuid::Uuid;
use waypost_social::SocialError;
use waypost_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Social(#[from] SocialError),

    #[error("Blob not found: {0}")]
    BlobNotFound(Uuid),

    #[error("Blob storage error: {0}")]
    BlobStorage(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::BlobNotFound(id) => ServerError::BlobNotFound(id),
            other => ServerError::BlobStorage(other.to_string()),
        }
    }
}

fn social_status(e: &SocialError) -> StatusCode {
    match e {
        SocialError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        SocialError::Forbidden(_) => StatusCode::FORBIDDEN,
        SocialError::RequestNotFound(_) | SocialError::UserNotFound(_) => StatusCode::NOT_FOUND,
        SocialError::AlreadyBlocked(_)
        | SocialError::AlreadyFriends(_)
        | SocialError::UserExists(_)
        | SocialError::TransactionAborted(_) => StatusCode::CONFLICT,
        SocialError::SelfRelation | SocialError::InvalidInput(_) | SocialError::InvalidId(_) => {
            StatusCode::BAD_REQUEST
        }
        SocialError::RemoteReadFailed(_) | SocialError::RemoteWriteFailed(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Social(e) => {
                let status = social_status(e);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(error = %e, "Storage failure");
                    (status, "Storage error".to_string())
                } else {
                    (status, self.to_string())
                }
            }
            ServerError::BlobNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::BlobStorage(e) => {
                tracing::error!(error = %e, "Blob storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Blob storage error".to_string())
            }
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
