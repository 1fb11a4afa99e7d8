use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

pub mod health_check;
pub mod subscriber_count;
pub mod subscriptions;
pub mod test_email;

#[derive(Serialize)]
struct FailureBody {
    success: bool,
    error: String,
}

pub(crate) fn failure(status: StatusCode, error: impl Into<String>) -> Response {
    let body = FailureBody {
        success: false,
        error: error.into(),
    };

    (status, Json(body)).into_response()
}
