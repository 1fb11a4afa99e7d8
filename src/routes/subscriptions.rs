use crate::{
    app_state::AppState,
    domain::{SubscriberEmail, SubscriptionStatus},
    routes::failure,
};
use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

/// Provenance tag stored on every record created through the public form.
const SUBSCRIPTION_SOURCE: &str = "website_form";

pub fn router() -> Router<AppState> {
    Router::new().route("/subscribe", post(subscribe))
}

#[tracing::instrument(
    name = "Adding a new subscriber",
    skip(app_state, body),
    fields(subscriber_email = tracing::field::Empty)
)]
async fn subscribe(
    State(app_state): State<AppState>,
    Json(body): Json<SubscribeBody>,
) -> Result<Json<SubscribeResponse>, SubscribeError> {
    let email = match body.email {
        Some(email) if !email.is_empty() => email,
        _ => return Err(SubscribeError::MissingEmail),
    };
    tracing::Span::current().record("subscriber_email", email.as_str());

    let email = SubscriberEmail::parse(email).map_err(SubscribeError::InvalidEmail)?;

    let mut transaction = app_state
        .db_pool
        .begin()
        .await
        .context("Failed to begin transaction")?;

    if subscriber_exists(&mut transaction, &email).await? {
        return Err(SubscribeError::AlreadySubscribed);
    }

    let subscriber_id = insert_subscriber(&mut transaction, &email)
        .await
        .map_err(|e| {
            // The unique index closes the race the existence check leaves open;
            // a concurrent insert of the same address surfaces here.
            if e.as_database_error()
                .is_some_and(|e| e.is_unique_violation())
            {
                SubscribeError::AlreadySubscribed
            } else {
                SubscribeError::UnexpectedError(
                    anyhow::Error::from(e).context("Failed to insert new subscriber"),
                )
            }
        })?;

    enqueue_welcome_email(&mut transaction, subscriber_id).await?;

    transaction
        .commit()
        .await
        .context("Failed to commit transaction")?;

    // The welcome email is dispatched by the worker; the caller never waits
    // for delivery.
    Ok(Json(SubscribeResponse {
        success: true,
        message: "Subscription successful. Welcome email will be sent shortly.".into(),
        subscriber_id,
    }))
}

#[tracing::instrument(
    name = "Checking if the email is already subscribed",
    skip(transaction, email)
)]
async fn subscriber_exists(
    transaction: &mut Transaction<'_, Postgres>,
    email: &SubscriberEmail,
) -> Result<bool, anyhow::Error> {
    let query = sqlx::query(
        r#"
        SELECT id FROM subscribers
        WHERE email = $1
        "#,
    )
    .bind(email.as_ref());

    let existing = transaction
        .fetch_optional(query)
        .await
        .context("Failed to query for an existing subscriber")?;

    Ok(existing.is_some())
}

#[tracing::instrument(name = "Inserting a new subscriber", skip(transaction, email))]
async fn insert_subscriber(
    transaction: &mut Transaction<'_, Postgres>,
    email: &SubscriberEmail,
) -> Result<Uuid, sqlx::Error> {
    let subscriber_id = Uuid::new_v4();
    let query = sqlx::query(
        r#"
        INSERT INTO subscribers (id, email, subscribed_at, status, source, email_sent)
        VALUES ($1, $2, $3, $4, $5, FALSE)
        "#,
    )
    .bind(subscriber_id)
    .bind(email.as_ref())
    .bind(OffsetDateTime::now_utc())
    .bind(SubscriptionStatus::Pending.as_ref())
    .bind(SUBSCRIPTION_SOURCE);

    transaction.execute(query).await?;

    Ok(subscriber_id)
}

// Same transaction as the insert: the creation event exists if and only if
// the subscriber record does, and the worker observes it exactly once per
// created record.
#[tracing::instrument(name = "Enqueuing the welcome email", skip(transaction))]
async fn enqueue_welcome_email(
    transaction: &mut Transaction<'_, Postgres>,
    subscriber_id: Uuid,
) -> Result<(), anyhow::Error> {
    let query = sqlx::query(
        r#"
        INSERT INTO welcome_email_queue (subscriber_id)
        VALUES ($1)
        "#,
    )
    .bind(subscriber_id);

    transaction
        .execute(query)
        .await
        .context("Failed to enqueue the welcome email")?;

    Ok(())
}

#[derive(Deserialize)]
struct SubscribeBody {
    email: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeResponse {
    success: bool,
    message: String,
    subscriber_id: Uuid,
}

#[derive(Debug, thiserror::Error)]
enum SubscribeError {
    #[error("Email is required")]
    MissingEmail,
    #[error("Invalid email format")]
    InvalidEmail(String),
    #[error("Email already subscribed")]
    AlreadySubscribed,
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl IntoResponse for SubscribeError {
    fn into_response(self) -> Response {
        tracing::error!("{:#?}", self);

        match self {
            Self::MissingEmail | Self::InvalidEmail(_) => {
                failure(StatusCode::BAD_REQUEST, self.to_string())
            }
            Self::AlreadySubscribed => failure(StatusCode::CONFLICT, self.to_string()),
            Self::UnexpectedError(_) => {
                failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}
