use crate::{
    configuration::Settings,
    domain::{Subscriber, SubscriberEmail, SubscriptionStatus},
    email_client::EmailClient,
    startup::get_pg_connection_pool,
};
use sqlx::{Executor, PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::Span;
use uuid::Uuid;

pub const WELCOME_EMAIL_SUBJECT: &str = "Welcome to Mzansi Insights!";

const FAILED_EMAIL_STATUS: &str = "failed";

pub async fn run_worker_until_stopped(config: Settings) -> Result<(), anyhow::Error> {
    let connection_pool = get_pg_connection_pool(&config.database);
    let email_client = config.email_client.client();
    worker_loop(&connection_pool, &email_client).await
}

async fn worker_loop(db_pool: &PgPool, email_client: &EmailClient) -> Result<(), anyhow::Error> {
    loop {
        match try_execute_task(db_pool, email_client).await {
            Ok(ExecutionOutcome::TaskCompleted) => {}
            Ok(ExecutionOutcome::EmptyQueue) => tokio::time::sleep(Duration::from_secs(10)).await,
            // The failed event stays queued and is redelivered; pause first.
            Err(_) => tokio::time::sleep(Duration::from_secs(1)).await,
        }
    }
}

#[tracing::instrument(
    skip_all,
    fields(
        subscriber_id=tracing::field::Empty,
        subscriber_email=tracing::field::Empty),
    err
)]
pub async fn try_execute_task(
    db_pool: &PgPool,
    email_client: &EmailClient,
) -> Result<ExecutionOutcome, anyhow::Error> {
    let Some((transaction, subscriber_id)) = dequeue_task(db_pool).await? else {
        return Ok(ExecutionOutcome::EmptyQueue);
    };
    Span::current().record("subscriber_id", subscriber_id.to_string());

    let Some(subscriber) = get_subscriber(db_pool, subscriber_id).await? else {
        tracing::warn!("Subscriber record is gone. Dropping the event.");
        complete_task(transaction, subscriber_id).await?;
        return Ok(ExecutionOutcome::TaskCompleted);
    };
    Span::current().record("subscriber_email", subscriber.email.clone());

    // The queue delivers at least once; the flag on the record decides.
    if subscriber.email_sent {
        tracing::info!("Welcome email already sent. Skipping.");
        complete_task(transaction, subscriber_id).await?;
        return Ok(ExecutionOutcome::TaskCompleted);
    }

    match SubscriberEmail::parse(subscriber.email.clone()) {
        Ok(email) => {
            if let Err(e) = email_client
                .send_email(&email, WELCOME_EMAIL_SUBJECT, &welcome_email_html(&email))
                .await
            {
                record_delivery_failure(db_pool, subscriber_id, &e.to_string()).await?;
                // Dropping the dequeue transaction keeps the event queued, so
                // the host loop gets to retry the delivery.
                return Err(
                    anyhow::Error::from(e).context("Failed to deliver the welcome email")
                );
            }

            mark_welcome_email_sent(db_pool, subscriber_id).await?;
        }
        Err(e) => {
            // The record is left untouched: a subscriber without a usable
            // address has no delivery outcome to store. It stays pending.
            tracing::error!(
                error.message = %e,
                "Subscriber has no usable email address. Dropping the event."
            );
        }
    }

    complete_task(transaction, subscriber_id).await?;

    Ok(ExecutionOutcome::TaskCompleted)
}

type PgTransaction = Transaction<'static, Postgres>;

#[tracing::instrument(skip_all)]
async fn dequeue_task(db_pool: &PgPool) -> Result<Option<(PgTransaction, Uuid)>, anyhow::Error> {
    let mut transaction = db_pool.begin().await?;
    let query = sqlx::query(
        r#"
        SELECT subscriber_id
        FROM welcome_email_queue
        FOR UPDATE
        SKIP LOCKED
        LIMIT 1
        "#,
    );

    match transaction.fetch_optional(query).await? {
        Some(row) => Ok(Some((transaction, row.try_get("subscriber_id")?))),
        None => Ok(None),
    }
}

#[tracing::instrument(skip_all)]
async fn complete_task(
    mut transaction: PgTransaction,
    subscriber_id: Uuid,
) -> Result<(), anyhow::Error> {
    let query = sqlx::query(
        r#"
        DELETE FROM welcome_email_queue
        WHERE subscriber_id = $1
        "#,
    )
    .bind(subscriber_id);

    transaction.execute(query).await?;
    transaction.commit().await?;

    Ok(())
}

#[tracing::instrument(skip_all)]
async fn get_subscriber(
    db_pool: &PgPool,
    subscriber_id: Uuid,
) -> Result<Option<Subscriber>, anyhow::Error> {
    let subscriber = sqlx::query_as::<_, Subscriber>(
        r#"
        SELECT id, email, subscribed_at, status, source,
               email_sent, email_sent_at, email_error, email_status
        FROM subscribers
        WHERE id = $1
        "#,
    )
    .bind(subscriber_id)
    .fetch_optional(db_pool)
    .await?;

    Ok(subscriber)
}

// Guarded on email_sent so a concurrent invocation cannot move the timestamp.
#[tracing::instrument(skip_all)]
async fn mark_welcome_email_sent(db_pool: &PgPool, subscriber_id: Uuid) -> Result<(), anyhow::Error> {
    let query = sqlx::query(
        r#"
        UPDATE subscribers
        SET email_sent = TRUE, email_sent_at = $1, status = $2
        WHERE id = $3 AND email_sent = FALSE
        "#,
    )
    .bind(OffsetDateTime::now_utc())
    .bind(SubscriptionStatus::Confirmed.as_ref())
    .bind(subscriber_id);

    db_pool.execute(query).await?;

    Ok(())
}

// `status` stays pending; only the delivery fields say what happened.
#[tracing::instrument(skip_all)]
async fn record_delivery_failure(
    db_pool: &PgPool,
    subscriber_id: Uuid,
    reason: &str,
) -> Result<(), anyhow::Error> {
    let query = sqlx::query(
        r#"
        UPDATE subscribers
        SET email_error = $1, email_status = $2
        WHERE id = $3
        "#,
    )
    .bind(reason)
    .bind(FAILED_EMAIL_STATUS)
    .bind(subscriber_id);

    db_pool.execute(query).await?;

    Ok(())
}

fn welcome_email_html(recipient: &SubscriberEmail) -> String {
    let year = OffsetDateTime::now_utc().year();

    format!(
        "<!DOCTYPE html>\
        <html>\
        <body>\
        <div class=\"header\">\
        <h1>Mzansi Insights</h1>\
        <p>Your trusted source for South African news &amp; opportunities</p>\
        </div>\
        <div class=\"content\">\
        <h2>Welcome Aboard!</h2>\
        <p>Hello,</p>\
        <p>Thank you for subscribing to <strong>Mzansi Insights</strong>! \
        We're excited to have you join our community of informed South Africans.</p>\
        <p><strong>What you'll receive:</strong></p>\
        <ul>\
        <li>Latest South African news updates</li>\
        <li>Job opportunities and career tips</li>\
        <li>Grant and SASSA information</li>\
        <li>Business and investment news</li>\
        </ul>\
        <p>Best regards,<br><strong>The Mzansi Insights Team</strong></p>\
        </div>\
        <div class=\"footer\">\
        <p>&copy; {year} Mzansi Insights. All rights reserved.</p>\
        <p><small>This email was sent to {email}</small></p>\
        </div>\
        </body>\
        </html>",
        email = recipient.as_ref(),
    )
}

#[derive(Debug)]
pub enum ExecutionOutcome {
    TaskCompleted,
    EmptyQueue,
}
