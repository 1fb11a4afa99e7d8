use crate::helpers::TestApp;
use serde_json::{json, Value};
use sqlx::Row;
use time::OffsetDateTime;

#[tokio::test]
async fn subscribe_returns_200_and_creates_a_pending_subscriber() {
    // given
    let app = TestApp::spawn().await;
    let before = OffsetDateTime::now_utc();

    // when
    let response = app
        .post_subscribe(&json!({ "email": "lindiwe@example.com" }))
        .await;

    // then
    assert_eq!(response.status(), 200);
    let body = response.json::<Value>().await.expect("Failed to read body");
    assert_eq!(body["success"], json!(true));
    assert!(body["subscriberId"].is_string());
    assert!(body["message"]
        .as_str()
        .expect("Missing message")
        .contains("Subscription successful"));

    let saved = sqlx::query(
        "SELECT email, status, source, email_sent, subscribed_at, email_sent_at \
        FROM subscribers",
    )
    .fetch_one(&app.db_pool)
    .await
    .expect("Failed to fetch saved subscriber");
    assert_eq!(saved.get::<String, _>("email"), "lindiwe@example.com");
    assert_eq!(saved.get::<String, _>("status"), "pending");
    assert_eq!(saved.get::<String, _>("source"), "website_form");
    assert!(!saved.get::<bool, _>("email_sent"));
    assert!(saved.get::<OffsetDateTime, _>("subscribed_at") >= before);
    assert!(saved
        .get::<Option<OffsetDateTime>, _>("email_sent_at")
        .is_none());
}

#[tokio::test]
async fn subscribe_responds_before_any_email_is_sent() {
    // given
    let app = TestApp::spawn().await;

    // when
    let response = app
        .post_subscribe(&json!({ "email": "lindiwe@example.com" }))
        .await;

    // then
    assert_eq!(response.status(), 200);
    assert!(app.email_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn subscribe_returns_400_when_the_email_is_missing() {
    // given
    let app = TestApp::spawn().await;
    let test_cases = vec![
        (json!({}), "no email field"),
        (json!({ "email": null }), "null email"),
        (json!({ "email": "" }), "empty email"),
    ];

    for (body, description) in test_cases {
        // when
        let response = app.post_subscribe(&body).await;

        // then
        assert_eq!(
            response.status(),
            400,
            "The API did not return a 400 BAD_REQUEST when the payload had {}",
            description
        );
        let body = response.json::<Value>().await.expect("Failed to read body");
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"], json!("Email is required"));
    }

    let saved = sqlx::query("SELECT id FROM subscribers")
        .fetch_optional(&app.db_pool)
        .await
        .expect("Failed to fetch unsaved subscriber");
    assert!(saved.is_none());
}

#[tokio::test]
async fn subscribe_returns_400_when_the_email_format_is_invalid() {
    // given
    let app = TestApp::spawn().await;
    let test_cases = vec![
        ("not-an-email", "no @ and no dot"),
        ("missing-at.example.com", "missing @"),
        ("missing-dot@example", "missing dot in the domain"),
        ("spaces in@example.com", "whitespace in the address"),
    ];

    for (email, description) in test_cases {
        // when
        let response = app.post_subscribe(&json!({ "email": email })).await;

        // then
        assert_eq!(
            response.status(),
            400,
            "The API did not return a 400 BAD_REQUEST when the email had {}",
            description
        );
        let body = response.json::<Value>().await.expect("Failed to read body");
        assert_eq!(body["error"], json!("Invalid email format"));
    }

    let saved = sqlx::query("SELECT id FROM subscribers")
        .fetch_optional(&app.db_pool)
        .await
        .expect("Failed to fetch unsaved subscriber");
    assert!(saved.is_none());
}

#[tokio::test]
async fn subscribe_returns_409_when_the_email_is_already_subscribed() {
    // given
    let app = TestApp::spawn().await;
    let body = json!({ "email": "lindiwe@example.com" });
    app.post_subscribe(&body).await;

    // when
    let response = app.post_subscribe(&body).await;

    // then
    assert_eq!(response.status(), 409);
    let body = response.json::<Value>().await.expect("Failed to read body");
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], json!("Email already subscribed"));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscribers")
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to count subscribers");
    assert_eq!(count, 1);
}

#[tokio::test]
async fn subscribe_rejects_non_post_requests() {
    // given
    let app = TestApp::spawn().await;
    let client = reqwest::Client::new();

    // when
    let response = client
        .get(app.url("/subscribe"))
        .send()
        .await
        .expect("Failed to execute request");

    // then
    assert_eq!(response.status(), 405);
}
