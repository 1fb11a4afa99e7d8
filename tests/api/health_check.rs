use crate::helpers::TestApp;

#[tokio::test]
async fn health_check_works() {
    // given
    let app = TestApp::spawn().await;

    // when
    let response = app.get_health_check().await;

    // then
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn endpoints_accept_cross_origin_requests() {
    // given
    let app = TestApp::spawn().await;
    let client = reqwest::Client::new();

    // when
    let response = client
        .get(app.url("/health_check"))
        .header("Origin", "http://mzansi-insights.example")
        .send()
        .await
        .expect("Failed to execute request");

    // then
    let allow_origin = response
        .headers()
        .get("access-control-allow-origin")
        .expect("Missing access-control-allow-origin header");
    assert_eq!(allow_origin, "*");
}
