mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{amount, form_data, gateway_config};
use formpay::application::holding::SubmissionHoldingArea;
use formpay::application::token::{TOKEN_CACHE_KEY, TokenLifecycleManager};
use formpay::config::{GatewayConfig, RefreshFallback, TOKEN_STORE_CAPACITY};
use formpay::domain::ports::{KeyValueStore, KeyValueStoreRef, PaymentGateway};
use formpay::domain::provider::ProviderOutcome;
use formpay::domain::token::BearerToken;
use formpay::error::PaymentError;
use formpay::infrastructure::bkash::{BkashClient, BkashGateway};
use formpay::infrastructure::ttl_cache::MokaKeyValueStore;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn granted(id_token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "statusCode": "0000",
        "statusMessage": "Successful",
        "id_token": id_token,
        "token_type": "Bearer",
        "expires_in": 3600,
        "refresh_token": format!("{id_token}-refresh"),
    }))
}

struct Harness {
    cache: KeyValueStoreRef,
    tokens: Arc<TokenLifecycleManager>,
    gateway: BkashGateway,
}

fn harness(config: GatewayConfig) -> Harness {
    let config = Arc::new(config);
    let cache: KeyValueStoreRef = Arc::new(MokaKeyValueStore::with_capacity(TOKEN_STORE_CAPACITY));
    let tokens = Arc::new(TokenLifecycleManager::new(
        Arc::new(BkashClient::new(config.clone())),
        cache.clone(),
        config.token_expiry_margin,
        config.token_cache_ttl,
        config.refresh_fallback,
    ));
    let gateway = BkashGateway::new(BkashClient::new(config), tokens.clone());
    Harness {
        cache,
        tokens,
        gateway,
    }
}

async fn seed_token(cache: &dyn KeyValueStore, token: BearerToken) {
    cache
        .put(
            TOKEN_CACHE_KEY,
            serde_json::to_value(token).unwrap(),
            Duration::from_secs(86_400),
        )
        .await
        .unwrap();
}

fn stale_token() -> BearerToken {
    BearerToken {
        id_token: "old-id".to_string(),
        refresh_token: "old-refresh".to_string(),
        expires_at: Utc::now() - ChronoDuration::seconds(5),
    }
}

#[tokio::test]
async fn test_grant_sends_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token/grant"))
        .and(header("username", "merchant"))
        .and(header("password", "merchant-pass"))
        .and(header("accept", "application/json"))
        .and(body_json(json!({"app_key": "app-key", "app_secret": "app-secret"})))
        .respond_with(granted("tok-1"))
        .expect(1)
        .mount(&server)
        .await;

    let harness = harness(gateway_config(&server.uri()));
    let token = harness.tokens.get_valid_token().await.unwrap();

    assert_eq!(token.id_token, "tok-1");
    assert_eq!(token.refresh_token, "tok-1-refresh");
    let remaining = token.expires_at - Utc::now();
    assert!(remaining <= ChronoDuration::seconds(3_540));
    assert!(remaining > ChronoDuration::seconds(3_500));
}

#[tokio::test]
async fn test_valid_cached_token_skips_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(granted("unused"))
        .expect(0)
        .mount(&server)
        .await;

    let harness = harness(gateway_config(&server.uri()));
    seed_token(
        harness.cache.as_ref(),
        BearerToken {
            id_token: "cached".to_string(),
            refresh_token: "cached-refresh".to_string(),
            expires_at: Utc::now() + ChronoDuration::minutes(30),
        },
    )
    .await;

    let token = harness.tokens.get_valid_token().await.unwrap();
    assert_eq!(token.id_token, "cached");
}

#[tokio::test]
async fn test_stale_token_is_refreshed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token/refresh"))
        .and(body_json(json!({"refresh_token": "old-refresh"})))
        .respond_with(granted("tok-2"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token/grant"))
        .respond_with(granted("unused"))
        .expect(0)
        .mount(&server)
        .await;

    let harness = harness(gateway_config(&server.uri()));
    seed_token(harness.cache.as_ref(), stale_token()).await;

    let token = harness.tokens.get_valid_token().await.unwrap();
    assert_eq!(token.id_token, "tok-2");
    assert_eq!(harness.tokens.cached().await.unwrap(), Some(token));
}

#[tokio::test]
async fn test_rejected_refresh_falls_back_to_grant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "statusCode": "2079",
            "statusMessage": "Invalid refresh token",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token/grant"))
        .respond_with(granted("tok-3"))
        .expect(1)
        .mount(&server)
        .await;

    let harness = harness(gateway_config(&server.uri()));
    seed_token(harness.cache.as_ref(), stale_token()).await;

    let token = harness.tokens.get_valid_token().await.unwrap();
    assert_eq!(token.id_token, "tok-3");
}

#[tokio::test]
async fn test_refresh_transport_failure_under_strict_policy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token/refresh"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token/grant"))
        .respond_with(granted("unused"))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = gateway_config(&server.uri());
    config.refresh_fallback = RefreshFallback::ProviderRejectionOnly;
    let harness = harness(config);
    seed_token(harness.cache.as_ref(), stale_token()).await;

    let result = harness.tokens.get_valid_token().await;
    assert!(matches!(result, Err(PaymentError::GatewayError(_))));
}

#[tokio::test]
async fn test_rejected_grant_is_token_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token/grant"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "statusCode": "2002",
            "statusMessage": "Invalid App Secret",
        })))
        .mount(&server)
        .await;

    let harness = harness(gateway_config(&server.uri()));
    let err = harness.tokens.get_valid_token().await.unwrap_err();

    assert!(matches!(err, PaymentError::TokenAcquisitionError(_)));
    assert!(err.to_string().contains("Invalid App Secret"));
}

#[tokio::test]
async fn test_create_payment_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token/grant"))
        .respond_with(granted("tok-1"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/create"))
        .and(header("authorization", "tok-1"))
        .and(header("x-app-key", "app-key"))
        .and(body_json(json!({
            "mode": "0011",
            "payerReference": "1",
            "callbackURL": "https://example.com/callback",
            "amount": "500.50",
            "currency": "BDT",
            "intent": "sale",
            "agreementID": "1",
            "merchantInvoiceNumber": "INV1700000000",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "statusCode": "0000",
            "statusMessage": "Successful",
            "paymentID": "TR0011ON1565154754797",
            "bkashURL": "https://sandbox.payment.bkash.com/?paymentId=TR0011ON1565154754797",
            "transactionStatus": "Initiated",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let harness = harness(gateway_config(&server.uri()));
    let outcome = harness
        .gateway
        .create_payment(
            amount(dec!(500.50)),
            "INV1700000000",
            "https://example.com/callback",
        )
        .await
        .unwrap();

    let ProviderOutcome::Success(created) = outcome else {
        panic!("expected success, got {outcome:?}");
    };
    assert_eq!(created.payment_id, "TR0011ON1565154754797");
}

#[tokio::test]
async fn test_execute_rejection_with_success_transport_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token/grant"))
        .respond_with(granted("tok-1"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/execute"))
        .and(body_json(json!({"paymentID": "TR123"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "statusCode": "2001",
            "statusMessage": "Invalid App Key",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let harness = harness(gateway_config(&server.uri()));
    let outcome = harness.gateway.execute_payment("TR123").await.unwrap();

    let ProviderOutcome::Rejected(rejection) = outcome else {
        panic!("expected rejection, got {outcome:?}");
    };
    assert_eq!(rejection.status_code, "2001");
    assert_eq!(rejection.status_message, "Invalid App Key");
}

#[tokio::test]
async fn test_error_code_alias_is_a_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token/grant"))
        .respond_with(granted("tok-1"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/execute"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorCode": "2056",
            "errorMessage": "Invalid Payment State",
        })))
        .mount(&server)
        .await;

    let harness = harness(gateway_config(&server.uri()));
    let outcome = harness.gateway.execute_payment("TR123").await.unwrap();

    assert!(matches!(
        outcome,
        ProviderOutcome::Rejected(rejection) if rejection.status_code == "2056"
    ));
}

#[tokio::test]
async fn test_non_json_reply_is_gateway_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token/grant"))
        .respond_with(granted("tok-1"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/execute"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&server)
        .await;

    let harness = harness(gateway_config(&server.uri()));
    let result = harness.gateway.execute_payment("TR123").await;

    assert!(matches!(result, Err(PaymentError::GatewayError(_))));
}

#[tokio::test]
async fn test_refund_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token/grant"))
        .respond_with(granted("tok-1"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/payment/refund"))
        .and(body_json(json!({
            "paymentID": "TR123",
            "trxID": "TRX9",
            "amount": "200",
            "reason": "duplicate registration",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "statusCode": "0000",
            "statusMessage": "Successful",
            "originalTrxID": "TRX9",
            "refundTrxID": "RFD1",
            "transactionStatus": "Completed",
            "amount": "200",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let harness = harness(gateway_config(&server.uri()));
    let outcome = harness
        .gateway
        .refund_payment("TR123", "TRX9", amount(dec!(200)), "duplicate registration")
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        ProviderOutcome::Success(refunded) if refunded.refund_trx_id == "RFD1"
    ));
}

#[tokio::test]
async fn test_concurrent_callers_share_one_grant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token/grant"))
        .respond_with(granted("tok-1").set_delay(Duration::from_millis(100)))
        .expect(1)
        .mount(&server)
        .await;

    let harness = harness(gateway_config(&server.uri()));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let tokens = harness.tokens.clone();
        handles.push(tokio::spawn(async move { tokens.get_valid_token().await }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().id_token, "tok-1");
    }
}

#[tokio::test]
async fn test_token_survives_full_holding_store() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token/grant"))
        .respond_with(granted("tok-1"))
        .expect(1)
        .mount(&server)
        .await;

    let harness = harness(gateway_config(&server.uri()));
    let holding = SubmissionHoldingArea::new(
        Arc::new(MokaKeyValueStore::with_capacity(2)),
        Duration::from_secs(60),
    );

    assert_eq!(harness.tokens.get_valid_token().await.unwrap().id_token, "tok-1");
    for i in 0..200 {
        holding
            .put(&format!("TR{i}"), None, form_data(), Duration::from_secs(60))
            .await
            .unwrap();
    }

    assert!(harness.cache.get(TOKEN_CACHE_KEY).await.unwrap().is_some());
    assert_eq!(harness.tokens.get_valid_token().await.unwrap().id_token, "tok-1");
}
