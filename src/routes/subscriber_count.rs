use crate::{app_state::AppState, routes::failure};
use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use sqlx::PgPool;

pub fn router() -> Router<AppState> {
    Router::new().route("/subscriber-count", get(subscriber_count))
}

#[tracing::instrument(name = "Counting subscribers", skip(app_state))]
async fn subscriber_count(
    State(app_state): State<AppState>,
) -> Result<Json<SubscriberCountResponse>, SubscriberCountError> {
    let count = count_subscribers(&app_state.db_pool).await?;

    Ok(Json(SubscriberCountResponse {
        success: true,
        count,
    }))
}

// An aggregate, not a full-collection read; the store does the counting.
#[tracing::instrument(skip_all)]
async fn count_subscribers(db_pool: &PgPool) -> Result<i64, anyhow::Error> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM subscribers
        "#,
    )
    .fetch_one(db_pool)
    .await
    .context("Failed to count subscribers")?;

    Ok(count)
}

#[derive(Serialize)]
struct SubscriberCountResponse {
    success: bool,
    count: i64,
}

#[derive(Debug, thiserror::Error)]
enum SubscriberCountError {
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl IntoResponse for SubscriberCountError {
    fn into_response(self) -> Response {
        tracing::error!("{:#?}", self);

        match self {
            Self::UnexpectedError(_) => {
                failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}
