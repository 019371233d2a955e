mod common;

use common::{membership_link, spawn_app, MERCHANT_KEY};
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn test_merchant_routes_require_bearer_token() {
    let app = spawn_app("http://127.0.0.1:9".to_string()).await;

    let res = app
        .client
        .get(app.url("/payment-links"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app
        .client
        .post(app.url("/payment-links"))
        .bearer_auth("wrong-key")
        .json(&membership_link(None))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn test_create_and_fetch_link() {
    let app = spawn_app("http://127.0.0.1:9".to_string()).await;

    let created = app.create_link(membership_link(Some(3))).await;
    let id = created["id"].as_str().unwrap();
    let short_code = created["short_code"].as_str().unwrap();

    assert_eq!(created["currency"], "NGN");
    assert_eq!(created["status"], "active");
    assert_eq!(created["uses_remaining"], 3);
    assert_eq!(created["availability"]["payable"], true);
    assert_eq!(
        created["url"],
        format!("https://pay.example.com/pay/{}", short_code)
    );

    let fetched = app.get_link(id).await;
    assert_eq!(fetched["id"], id);
    assert_eq!(fetched["title"], "Annual membership");

    let res = app
        .client
        .get(app.url("/payment-links?limit=500"))
        .bearer_auth(MERCHANT_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let listed: Vec<Value> = res.json().await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_invalid_link_is_rejected() {
    let app = spawn_app("http://127.0.0.1:9".to_string()).await;

    let res = app
        .client
        .post(app.url("/payment-links"))
        .bearer_auth(MERCHANT_KEY)
        .json(&json!({ "title": "  ", "amount": "10.00", "currency": "NGN" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "validation_error");
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn test_public_view_counts_and_hides_stats() {
    let app = spawn_app("http://127.0.0.1:9".to_string()).await;
    let created = app.create_link(membership_link(None)).await;
    let short_code = created["short_code"].as_str().unwrap();

    for _ in 0..2 {
        let res = app
            .client
            .get(app.url(&format!("/payment-links/public/{}", short_code)))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let public: Value = res.json().await.unwrap();
        assert_eq!(public["title"], "Annual membership");
        assert!(public.get("total_revenue").is_none());
        assert!(public.get("views").is_none());
    }

    let fetched = app.get_link(created["id"].as_str().unwrap()).await;
    assert_eq!(fetched["views"], 2);
}

#[tokio::test]
async fn test_disable_enable_and_delete() {
    let app = spawn_app("http://127.0.0.1:9".to_string()).await;
    let created = app.create_link(membership_link(None)).await;
    let id = created["id"].as_str().unwrap();
    let short_code = created["short_code"].as_str().unwrap();

    let res = app
        .client
        .post(app.url(&format!("/payment-links/{}/disable", id)))
        .bearer_auth(MERCHANT_KEY)
        .send()
        .await
        .unwrap();
    let disabled: Value = res.json().await.unwrap();
    assert_eq!(disabled["status"], "disabled");

    let public: Value = app
        .client
        .get(app.url(&format!("/payment-links/public/{}", short_code)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(public["availability"]["payable"], false);
    assert_eq!(public["availability"]["reason"], "disabled");

    let res = app
        .client
        .post(app.url(&format!("/payment-links/{}/enable", id)))
        .bearer_auth(MERCHANT_KEY)
        .send()
        .await
        .unwrap();
    let enabled: Value = res.json().await.unwrap();
    assert_eq!(enabled["status"], "active");

    let res = app
        .client
        .delete(app.url(&format!("/payment-links/{}", id)))
        .bearer_auth(MERCHANT_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = app
        .client
        .get(app.url(&format!("/payment-links/public/{}", short_code)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = app
        .client
        .get(app.url(&format!("/payment-links/{}", id)))
        .bearer_auth(MERCHANT_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_reports_memory_backend() {
    let app = spawn_app("http://127.0.0.1:9".to_string()).await;

    let res = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "connected");
    assert_eq!(body["store_backend"], "memory");
    assert_eq!(body["card_provider"], "closed");
}
