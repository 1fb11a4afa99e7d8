use crate::{app_state::AppState, domain::SubscriberEmail, routes::failure};
use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

const TEST_EMAIL_SUBJECT: &str = "Test Email from Mzansi Insights";

pub fn router() -> Router<AppState> {
    Router::new().route("/send-test-email", post(send_test_email))
}

#[tracing::instrument(name = "Sending a test email", skip(app_state, body))]
async fn send_test_email(
    State(app_state): State<AppState>,
    Json(body): Json<TestEmailBody>,
) -> Result<Json<TestEmailResponse>, TestEmailError> {
    // Falls back to the configured sender identity when no recipient is given.
    let recipient = match body.to {
        Some(to) => SubscriberEmail::parse(to)
            .map_err(|e| TestEmailError::UnexpectedError(anyhow::anyhow!(e)))?,
        None => app_state.email_client.sender().clone(),
    };

    let html_body = test_email_html(body.name.as_deref());

    app_state
        .email_client
        .send_email(&recipient, TEST_EMAIL_SUBJECT, &html_body)
        .await
        .context("Failed to send the test email")?;

    Ok(Json(TestEmailResponse {
        success: true,
        message: "Test email sent successfully".into(),
    }))
}

fn test_email_html(name: Option<&str>) -> String {
    let greeting = match name {
        Some(name) => format!("Hello {name},"),
        None => "Hello,".to_string(),
    };

    format!(
        "<h2>Test Email Successful!</h2>\
        <p>{greeting}</p>\
        <p>This is a test email from Mzansi Insights.</p>\
        <p>If you are receiving this, your email setup is working correctly.</p>"
    )
}

#[derive(Deserialize)]
struct TestEmailBody {
    to: Option<String>,
    name: Option<String>,
}

#[derive(Serialize)]
struct TestEmailResponse {
    success: bool,
    message: String,
}

#[derive(Debug, thiserror::Error)]
enum TestEmailError {
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl IntoResponse for TestEmailError {
    fn into_response(self) -> Response {
        tracing::error!("{:#?}", self);

        match self {
            Self::UnexpectedError(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }
}
