use std::time::Duration;

use thiserror::Error;
use warp::{reject::Reject, Rejection, Reply};

/// Failures inside the planning core.
///
/// Only `InvalidRequest` is meant to reach a caller as fatal; everything else
/// is absorbed by the component that owns it (adapter, pipeline, ranking or
/// coordinator).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("capability timed out after {0:?}")]
    CapabilityTimeout(Duration),

    #[error("capability call failed: {0}")]
    Capability(String),

    #[error("malformed response from {role}: {reason}")]
    MalformedResponse { role: String, reason: String },

    #[error("tool {tool} unavailable: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error("insufficient weather data for {0}")]
    InsufficientData(String),

    #[error("batch cancelled")]
    Cancelled,

    #[error("invalid trip request: {0}")]
    InvalidRequest(String),
}

impl PlanError {
    pub fn malformed(role: impl Into<String>, reason: impl Into<String>) -> Self {
        PlanError::MalformedResponse {
            role: role.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl Reject for ApiError {}

impl From<PlanError> for ApiError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Rejection> {
    if let Some(api_err) = err.find::<ApiError>() {
        let code = match api_err {
            ApiError::BadRequest(_) => warp::http::StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => warp::http::StatusCode::NOT_FOUND,
            _ => warp::http::StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match api_err {
            ApiError::BadRequest(_) => "Bad request",
            ApiError::NotFound(_) => "Resource not found",
            _ => "Internal server error",
        };

        let json = warp::reply::json(&serde_json::json!({
            "error": message,
            "details": api_err.to_string(),
        }));

        Ok(warp::reply::with_status(json, code))
    } else {
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_request_maps_to_bad_request() {
        let api: ApiError = PlanError::InvalidRequest("end date before start date".into()).into();
        assert!(matches!(api, ApiError::BadRequest(ref msg) if msg.contains("end date")));
    }

    #[test]
    fn other_plan_errors_map_to_internal() {
        let api: ApiError = PlanError::Cancelled.into();
        assert!(matches!(api, ApiError::InternalError(_)));
    }

    #[tokio::test]
    async fn internal_errors_render_as_500() {
        let rejection = warp::reject::custom(ApiError::InternalError("redis down".into()));
        let reply = handle_rejection(rejection).await.unwrap();
        let resp = reply.into_response();

        assert_eq!(resp.status(), warp::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn malformed_message_names_role() {
        let err = PlanError::malformed("travel_concierge", "no day headings");
        assert_eq!(
            err.to_string(),
            "malformed response from travel_concierge: no day headings"
        );
    }
}
