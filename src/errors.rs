use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use thiserror::Error;

use crate::domain::errors::DomainError;
use crate::domain::validation::RejectionReason;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Malformed scan: {0}")]
    MalformedScan(String),

    #[error("Order rejected: {0}")]
    Rejected(RejectionReason),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::OrderNotFound(_) => AppError::NotFound,
            DomainError::MalformedInput(msg) => AppError::MalformedScan(msg),
            DomainError::ValidationRejection(reason) => AppError::Rejected(reason),
            DomainError::CatalogUnavailable | DomainError::ShuttingDown => {
                AppError::Unavailable(e.to_string())
            }
            DomainError::TransientNetworkFailure(msg) => AppError::Unavailable(msg),
            DomainError::PersistenceFailure(msg) => AppError::Internal(msg),
        }
    }
}

impl actix_web::ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::MalformedScan(_) => StatusCode::BAD_REQUEST,
            AppError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AppError::Rejected(reason) => serde_json::json!({
                "error": self.to_string(),
                "rejection": reason,
            }),
            AppError::Internal(_) => serde_json::json!({
                "error": "Internal server error"
            }),
            _ => serde_json::json!({
                "error": self.to_string()
            }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}
