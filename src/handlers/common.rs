use crate::errors::ServiceError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

/// Standard no content response
pub fn no_content_response() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// 201 when something new was stored, 200 when an existing record was returned
pub fn upsert_response<T: Serialize>(data: T, created: bool) -> Response {
    if created {
        created_response(data)
    } else {
        success_response(data)
    }
}

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input
        .validate()
        .map_err(|e| ServiceError::ValidationError(format!("Validation failed: {}", e)))
}

/// `?userId=` selector shared by the cart endpoints
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct UserQuery {
    pub user_id: Option<Uuid>,
}

impl UserQuery {
    pub fn require(&self) -> Result<Uuid, ServiceError> {
        self.user_id
            .ok_or_else(|| ServiceError::InvalidRequest("User ID required".to_string()))
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeletedCount {
    pub removed: u64,
}
