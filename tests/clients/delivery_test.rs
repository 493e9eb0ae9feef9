/*!
 * Delivery Client Tests
 * Both envelope variants and token invalidation
 */

use dose_kernel::config::{DeliveryConfig, DeliveryVariant};
use dose_kernel::dispatch::{ArtifactSink, DeliveryClient, DeliveryError};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer, variant: DeliveryVariant) -> DeliveryConfig {
    DeliveryConfig {
        endpoint: format!("{}/orders", server.uri()),
        login_url: format!("{}/login", server.uri()),
        username: "lab@example.org".to_string(),
        password: "pw".to_string(),
        variant,
        filename_prefix: "dose_report_".to_string(),
        token_expiry_threshold: Duration::from_secs(10),
        timeout: Duration::from_secs(5),
    }
}

fn jsend_login() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "status": "success",
        "data": {"token": "j1", "expires_in": 3600},
    }))
}

fn jsend_success() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"status": "success", "data": null}))
}

#[tokio::test]
async fn test_jsend_upload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_partial_json(json!({"email": "lab@example.org"})))
        .respond_with(jsend_login())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/orders/ord-1"))
        .and(header("authorization", "Bearer j1"))
        .and(body_string_contains("dose_report_ord-1.pdf"))
        .and(body_string_contains("name=\"order_id\""))
        .and(body_string_contains("%PDF-1.4"))
        .respond_with(jsend_success())
        .expect(1)
        .mount(&server)
        .await;

    let client = DeliveryClient::new(&config(&server, DeliveryVariant::Jsend)).unwrap();
    client.upload("ord-1", b"%PDF-1.4 report".to_vec()).await.unwrap();
}

#[tokio::test]
async fn test_jsend_login_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "fail", "message": "bad password"})),
        )
        .mount(&server)
        .await;

    let client = DeliveryClient::new(&config(&server, DeliveryVariant::Jsend)).unwrap();
    let err = client.upload("ord-1", vec![1, 2, 3]).await.unwrap_err();
    assert_eq!(err, DeliveryError::Unauthorized("bad password".to_string()));
}

#[tokio::test]
async fn test_vendor_rejection_reports_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_partial_json(json!({"username": "lab@example.org", "grant_type": "password"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "result": {"access_token": "v1", "expires_in": 3600},
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/orders/ord-2"))
        .and(header("authorization", "Bearer v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "errors": ["duplicate order", "quota exceeded"],
        })))
        .mount(&server)
        .await;

    let client = DeliveryClient::new(&config(&server, DeliveryVariant::Vendor)).unwrap();
    let err = client.upload("ord-2", vec![1]).await.unwrap_err();
    assert_eq!(
        err,
        DeliveryError::Rejected("duplicate order; quota exceeded".to_string())
    );
}

#[tokio::test]
async fn test_rejected_token_forces_new_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(jsend_login())
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/orders/ord-3"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token revoked"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/orders/ord-3"))
        .respond_with(jsend_success())
        .mount(&server)
        .await;

    let client = DeliveryClient::new(&config(&server, DeliveryVariant::Jsend)).unwrap();
    let err = client.upload("ord-3", vec![1]).await.unwrap_err();
    assert_eq!(err, DeliveryError::Unauthorized("token revoked".to_string()));

    client.upload("ord-3", vec![1]).await.unwrap();
}

#[tokio::test]
async fn test_server_error_is_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(jsend_login())
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/orders/ord-4"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let client = DeliveryClient::new(&config(&server, DeliveryVariant::Jsend)).unwrap();
    let err = client.upload("ord-4", vec![1]).await.unwrap_err();
    assert_eq!(
        err,
        DeliveryError::Status {
            status: 502,
            body: "bad gateway".to_string()
        }
    );
}
