mod common;

use common::{membership_link, payer, spawn_app, TestApp, WEBHOOK_SECRET};
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use serde_json::{json, Value};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn sign(body: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

async fn start_bank_transfer(app: &TestApp, short_code: &Value) -> Value {
    let res = app
        .client
        .post(app.url("/payments/rails"))
        .json(&json!({
            "short_code": short_code,
            "payment_method": "bank",
            "payer": payer()
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    res.json().await.unwrap()
}

async fn post_webhook(app: &TestApp, body: &str, signature: &str) -> reqwest::Response {
    app.client
        .post(app.url("/webhooks/rails"))
        .header("content-type", "application/json")
        .header("X-Rail-Signature", signature)
        .body(body.to_string())
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_bank_transfer_returns_instructions() {
    let app = spawn_app("http://127.0.0.1:9".to_string()).await;
    let link = app.create_link(membership_link(None)).await;

    let started = start_bank_transfer(&app, &link["short_code"]).await;

    assert_eq!(started["state"], "async_pending");
    assert_eq!(started["instructions"]["rail"], "bank");
    assert_eq!(started["instructions"]["account_number"], "0123456789");
    let reference = started["reference"].as_str().unwrap();
    assert!(reference.starts_with("rail_bank_"));
    assert_eq!(started["instructions"]["reference"], reference);
}

#[tokio::test]
async fn test_unconfigured_rail_is_rejected() {
    let app = spawn_app("http://127.0.0.1:9".to_string()).await;
    let link = app.create_link(membership_link(None)).await;

    let res = app
        .client
        .post(app.url("/payments/rails"))
        .json(&json!({
            "short_code": link["short_code"],
            "payment_method": "crypto",
            "payer": payer()
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_signed_webhook_credits_link_once() {
    let app = spawn_app("http://127.0.0.1:9".to_string()).await;
    let link = app.create_link(membership_link(Some(2))).await;
    let started = start_bank_transfer(&app, &link["short_code"]).await;

    let body = json!({
        "reference": started["reference"],
        "short_code": link["short_code"],
        "status": "succeeded",
        "amount": "15000.00",
        "currency": "NGN",
        "payer": payer()
    })
    .to_string();
    let signature = sign(&body);

    for _ in 0..2 {
        let res = post_webhook(&app, &body, &signature).await;
        assert_eq!(res.status(), StatusCode::OK);
        let response: Value = res.json().await.unwrap();
        assert_eq!(response["success"], true);
        assert_eq!(response["provider_reference"], started["reference"]);
    }

    let fetched = app.get_link(link["id"].as_str().unwrap()).await;
    assert_eq!(fetched["current_uses"], 1);
    assert_eq!(fetched["successful_payments"], 1);
}

#[tokio::test]
async fn test_webhook_with_bad_signature_is_rejected() {
    let app = spawn_app("http://127.0.0.1:9".to_string()).await;
    let link = app.create_link(membership_link(None)).await;
    let started = start_bank_transfer(&app, &link["short_code"]).await;

    let body = json!({
        "reference": started["reference"],
        "short_code": link["short_code"],
        "status": "succeeded",
        "amount": "15000.00",
        "currency": "NGN"
    })
    .to_string();
    let tampered = body.replace("15000.00", "15.00");

    let res = post_webhook(&app, &tampered, &sign(&body)).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app
        .client
        .post(app.url("/webhooks/rails"))
        .header("content-type", "application/json")
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let fetched = app.get_link(link["id"].as_str().unwrap()).await;
    assert_eq!(fetched["current_uses"], 0);
}

#[tokio::test]
async fn test_webhook_amount_mismatch_is_not_credited() {
    let app = spawn_app("http://127.0.0.1:9".to_string()).await;
    let link = app.create_link(membership_link(None)).await;
    let started = start_bank_transfer(&app, &link["short_code"]).await;

    let body = json!({
        "reference": started["reference"],
        "short_code": link["short_code"],
        "status": "succeeded",
        "amount": "150.00",
        "currency": "NGN"
    })
    .to_string();

    let res = post_webhook(&app, &body, &sign(&body)).await;
    assert_eq!(res.status(), StatusCode::PAYMENT_REQUIRED);

    let fetched = app.get_link(link["id"].as_str().unwrap()).await;
    assert_eq!(fetched["current_uses"], 0);
}

#[tokio::test]
async fn test_failed_rail_signal_counts_failure() {
    let app = spawn_app("http://127.0.0.1:9".to_string()).await;
    let link = app.create_link(membership_link(None)).await;
    let started = start_bank_transfer(&app, &link["short_code"]).await;

    let body = json!({
        "reference": started["reference"],
        "short_code": link["short_code"],
        "status": "failed",
        "amount": "15000.00",
        "currency": "NGN"
    })
    .to_string();

    let res = post_webhook(&app, &body, &sign(&body)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let response: Value = res.json().await.unwrap();
    assert_eq!(response["success"], false);
    assert_eq!(response["state"], "failed");

    let fetched = app.get_link(link["id"].as_str().unwrap()).await;
    assert_eq!(fetched["failed_payments"], 1);
}
