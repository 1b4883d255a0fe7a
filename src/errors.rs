use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Conflict",
    "message": "Insufficient stock for product 550e8400-e29b-41d4-a716-446655440000",
    "request_id": "req-abc123xyz",
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp of the failure
    pub timestamp: String,
}

/// Why a promo code was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PromotionRejection {
    NotFound,
    NotStarted,
    Expired,
    Inactive,
}

impl PromotionRejection {
    pub fn message(&self) -> &'static str {
        match self {
            Self::NotFound => "Invalid promo code",
            Self::NotStarted => "This promotion has not started yet",
            Self::Expired => "This promotion has expired",
            Self::Inactive => "This promotion is not active",
        }
    }
}

impl std::fmt::Display for PromotionRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient stock: {0}")]
    OutOfStock(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Stock conflict: {0}")]
    StockConflict(String),

    #[error("{0}")]
    PromotionInvalid(PromotionRejection),

    #[error("Invalid status transition: {0}")]
    InvalidStatusTransition(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment not confirmed: {0}")]
    PaymentNotConfirmed(String),

    #[error("Payment gateway error: {0}")]
    PaymentGateway(String),

    #[error("Order transaction failed: {0}")]
    TransactionFailure(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_)
            | Self::ValidationError(_)
            | Self::OutOfStock(_)
            | Self::InvalidQuantity(_)
            | Self::InvalidStatusTransition(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PromotionInvalid(PromotionRejection::NotFound) => StatusCode::NOT_FOUND,
            Self::PromotionInvalid(_) => StatusCode::BAD_REQUEST,
            Self::StockConflict(_) | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PaymentNotConfirmed(_) => StatusCode::PAYMENT_REQUIRED,
            Self::PaymentGateway(_) => StatusCode::BAD_GATEWAY,
            Self::DatabaseError(_)
            | Self::TransactionFailure(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message suitable for HTTP responses.
    /// Storage and internal failures are reduced to generic text.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::TransactionFailure(_) => "Failed to create order".to_string(),
            Self::InternalError(_) | Self::Other(_) => "Internal server error".to_string(),
            Self::PromotionInvalid(reason) => reason.message().to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: None,
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use rstest::rstest;

    #[tokio::test]
    async fn error_response_includes_request_id() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("req-123"), async {
                ServiceError::NotFound("Order not found".into()).into_response()
            })
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
        assert_eq!(payload.error, "Not Found");
    }

    #[rstest]
    #[case(ServiceError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST)]
    #[case(ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND)]
    #[case(ServiceError::OutOfStock("x".into()), StatusCode::BAD_REQUEST)]
    #[case(ServiceError::InvalidQuantity("x".into()), StatusCode::BAD_REQUEST)]
    #[case(ServiceError::StockConflict("x".into()), StatusCode::CONFLICT)]
    #[case(ServiceError::PromotionInvalid(PromotionRejection::NotFound), StatusCode::NOT_FOUND)]
    #[case(ServiceError::PromotionInvalid(PromotionRejection::Expired), StatusCode::BAD_REQUEST)]
    #[case(ServiceError::PaymentNotConfirmed("x".into()), StatusCode::PAYMENT_REQUIRED)]
    #[case(ServiceError::PaymentGateway("x".into()), StatusCode::BAD_GATEWAY)]
    #[case(ServiceError::TransactionFailure("x".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn status_code_mapping(#[case] error: ServiceError, #[case] expected: StatusCode) {
        assert_eq!(error.status_code(), expected);
    }

    #[test]
    fn internal_failures_hide_details() {
        assert_eq!(
            ServiceError::TransactionFailure("disk I/O error".into()).response_message(),
            "Failed to create order"
        );
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("boom".into())).response_message(),
            "Database error"
        );
        assert_eq!(
            ServiceError::PromotionInvalid(PromotionRejection::NotStarted).response_message(),
            "This promotion has not started yet"
        );
    }
}
