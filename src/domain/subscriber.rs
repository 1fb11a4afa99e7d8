use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// The full persisted subscriber record.
///
/// `email` is kept as the raw stored string: storage is not trusted to hold a
/// well-formed address, so consumers re-parse before dispatching anything.
#[derive(Debug, FromRow)]
pub struct Subscriber {
    pub id: Uuid,
    pub email: String,
    pub subscribed_at: OffsetDateTime,
    pub status: String,
    pub source: String,
    pub email_sent: bool,
    pub email_sent_at: Option<OffsetDateTime>,
    pub email_error: Option<String>,
    pub email_status: Option<String>,
}
