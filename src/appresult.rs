use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

/// Rejections a caller can act on. Anything else is a 500.
#[derive(Debug, thiserror::Error)]
pub enum NexusError {
    #[error("not signed in")]
    Unauthorized,
    #[error("this account is banned")]
    Banned,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("seat is locked")]
    SeatLocked,
    #[error("seat is taken")]
    SeatTaken,
    #[error("message limit reached, follow each other to keep chatting")]
    ChatLimited,
    #[error("not enough nexus coins")]
    InsufficientCoins,
    #[error("users can only own one room")]
    AlreadyOwnsRoom,
    #[error("already claimed today")]
    AlreadyClaimed,
    #[error("{0}")]
    Conflict(&'static str),
    #[error("{0}")]
    Invalid(&'static str),
}

impl NexusError {
    pub fn status(&self) -> StatusCode {
        use NexusError::*;
        match self {
            Unauthorized => StatusCode::UNAUTHORIZED,
            Banned | Forbidden(_) | ChatLimited => StatusCode::FORBIDDEN,
            NotFound(_) => StatusCode::NOT_FOUND,
            SeatLocked | SeatTaken | AlreadyOwnsRoom | AlreadyClaimed | Conflict(_) => StatusCode::CONFLICT,
            InsufficientCoins => StatusCode::PAYMENT_REQUIRED,
            Invalid(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl AppError {
    pub fn nexus(&self) -> Option<&NexusError> {
        self.0.downcast_ref::<NexusError>()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(err) = self.nexus() {
            return (err.status(), Json(json!({ "error": err.to_string() }))).into_response();
        }

        tracing::error!(error = ?self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "something went wrong" })),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_keep_their_status() {
        let err: AppError = NexusError::SeatLocked.into();
        assert_eq!(err.nexus().map(NexusError::status), Some(StatusCode::CONFLICT));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn other_errors_are_internal() {
        let err: AppError = anyhow::anyhow!("disk on fire").into();
        assert!(err.nexus().is_none());
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
