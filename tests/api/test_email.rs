use crate::helpers::TestApp;
use serde_json::{json, Value};
use wiremock::{
    matchers::{method, path},
    Mock, ResponseTemplate,
};

#[tokio::test]
async fn test_email_is_sent_to_the_given_recipient() {
    // given
    let app = TestApp::spawn().await;
    Mock::given(path("/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&app.email_server)
        .await;

    // when
    let response = app
        .post_send_test_email(&json!({ "to": "ops@example.com", "name": "Lindiwe" }))
        .await;

    // then
    assert_eq!(response.status(), 200);
    let body = response.json::<Value>().await.expect("Failed to read body");
    assert_eq!(body["success"], json!(true));

    let request = &app.email_server.received_requests().await.unwrap()[0];
    let sent: Value = serde_json::from_slice(&request.body).expect("Failed to parse request body");
    assert_eq!(sent["To"], json!("ops@example.com"));
    assert!(sent["HtmlBody"]
        .as_str()
        .expect("Missing HtmlBody")
        .contains("Lindiwe"));
}

#[tokio::test]
async fn test_email_falls_back_to_the_sender_address() {
    // given
    let app = TestApp::spawn().await;
    Mock::given(path("/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&app.email_server)
        .await;

    // when
    let response = app.post_send_test_email(&json!({})).await;

    // then
    assert_eq!(response.status(), 200);

    let request = &app.email_server.received_requests().await.unwrap()[0];
    let sent: Value = serde_json::from_slice(&request.body).expect("Failed to parse request body");
    assert_eq!(sent["To"], json!(app.email_client.sender().as_ref()));
    assert_eq!(sent["To"], sent["From"]);
}

#[tokio::test]
async fn test_email_returns_500_when_the_relay_rejects() {
    // given
    let app = TestApp::spawn().await;
    Mock::given(path("/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&app.email_server)
        .await;

    // when
    let response = app.post_send_test_email(&json!({})).await;

    // then
    assert_eq!(response.status(), 500);
    let body = response.json::<Value>().await.expect("Failed to read body");
    assert_eq!(body["success"], json!(false));
    assert!(!body["error"]
        .as_str()
        .expect("Missing error")
        .is_empty());
}
