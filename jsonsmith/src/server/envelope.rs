use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

/// Body shared by every task endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub msg: String,
    pub data: Option<Value>,
    pub elapsed_time: Option<f64>,
}

impl ApiResponse {
    pub fn success(data: Value, elapsed_time: f64) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            msg: STATUS_SUCCESS.to_string(),
            data: Some(data),
            elapsed_time: Some(elapsed_time),
        }
    }

    pub fn error(msg: impl Into<String>, elapsed_time: f64) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            msg: msg.into(),
            data: None,
            elapsed_time: Some(elapsed_time),
        }
    }

    pub fn health() -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            msg: "OK".to_string(),
            data: None,
            elapsed_time: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

/// An envelope paired with the HTTP status it is sent with.
#[derive(Debug)]
pub struct Reply(pub StatusCode, pub ApiResponse);

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (self.0, Json(self.1)).into_response()
    }
}
