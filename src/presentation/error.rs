use crate::domain::error::AggregationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Aggregation(e) => match e {
                AggregationError::UnknownMetric(_) | AggregationError::InvalidRequest(_) => {
                    StatusCode::BAD_REQUEST
                }
                AggregationError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                AggregationError::EntityFailures(_) | AggregationError::Fetch(_) => StatusCode::BAD_GATEWAY,
            },
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!("Request failed: {}", self);
        }

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::FetchError;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (AggregationError::UnknownMetric("steam".into()).into(), StatusCode::BAD_REQUEST),
            (AggregationError::Timeout(Duration::from_secs(1)).into(), StatusCode::GATEWAY_TIMEOUT),
            (
                AggregationError::Fetch(FetchError::Transport("down".into())).into(),
                StatusCode::BAD_GATEWAY,
            ),
            (ApiError::NotFound("selection".into()), StatusCode::NOT_FOUND),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
