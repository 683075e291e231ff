mod common;

use std::time::Duration;

use axum::body::{ to_bytes, Body };
use axum::http::{ Method, Request, StatusCode };
use axum::Router;
use common::*;
use serde_json::{ json, Value };
use tower::ServiceExt;
use unifarm::api::{ router, AppState };
use unifarm::enums::Currency;
use unifarm::test_utils::{ create_referred_user, create_test_user, TestLedger };

fn app(ledger: &TestLedger) -> Router {
    let state = AppState::new(
        ledger.accounts.clone(),
        ledger.wallet.clone(),
        ledger.balances.clone(),
        ledger.transactions.clone(),
        ledger.reconciliation.clone(),
        ledger.referrals.clone()
    );
    router(state, Duration::from_secs(5))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(body) => Body::from(body.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn decimal_field(value: &Value) -> rust_decimal::Decimal {
    dec(value.as_str().expect("decimal serialized as a string"))
}

#[tokio::test]
async fn health_check_responds() {
    let ledger = setup().await;
    let app = app(&ledger);

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn register_then_register_again() {
    let ledger = setup().await;
    let app = app(&ledger);

    let (status, first) = send(
        &app,
        Method::POST,
        "/api/users/register",
        Some(json!({ "telegram_id": 555, "username": "farmer" }))
    ).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["balance_uni"], "0");

    let (status, second) = send(
        &app,
        Method::POST,
        "/api/users/register",
        Some(json!({ "telegram_id": 555 }))
    ).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["id"], first["id"]);
}

#[tokio::test]
async fn deposit_and_read_balance() {
    let ledger = setup().await;
    let user = funded_user(&ledger, 1, "0", "0").await;
    let app = app(&ledger);
    let uri = format!("/api/users/{}/deposit", user.id);
    let body = json!({ "amount": "12.5", "currency": "ton", "tx_hash": "0xfeed" });

    let (status, first) = send(&app, Method::POST, &uri, Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["duplicate"], false);

    let (status, replay) = send(&app, Method::POST, &uri, Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["duplicate"], true);
    assert_eq!(replay["transaction_id"], first["transaction_id"]);

    let (status, balance) = send(&app, Method::GET, &format!("/api/users/{}/balance", user.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal_field(&balance["ton"]), dec("12.5"));
    assert_eq!(decimal_field(&balance["uni"]), dec("0"));
}

#[tokio::test]
async fn overdrawn_withdrawal_is_a_bad_request() {
    let ledger = setup().await;
    let user = funded_user(&ledger, 1, "0", "30").await;
    let app = app(&ledger);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/users/{}/withdraw", user.id),
        Some(json!({ "amount": "50", "currency": "TON" }))
    ).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_BALANCE");
    assert_eq!(balances(&ledger, user.id).await.ton, dec("30"));
}

#[tokio::test]
async fn malformed_amount_is_rejected() {
    let ledger = setup().await;
    let user = funded_user(&ledger, 1, "10", "0").await;
    let app = app(&ledger);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/users/{}/farming/deposit", user.id),
        Some(json!({ "amount": "-1" }))
    ).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn unknown_user_is_not_found() {
    let ledger = setup().await;
    let app = app(&ledger);

    let (status, body) = send(&app, Method::GET, "/api/users/9999/balance", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "USER_NOT_FOUND");
}

#[tokio::test]
async fn boost_purchase_and_history() {
    let ledger = setup().await;
    let user = funded_user(&ledger, 1, "0", "2").await;
    let app = app(&ledger);

    let (status, packages) = send(&app, Method::GET, "/api/boost/packages", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(packages.as_array().map(Vec::len), Some(4));

    let (status, receipt) = send(
        &app,
        Method::POST,
        &format!("/api/users/{}/boost", user.id),
        Some(json!({ "package_id": 1 }))
    ).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal_field(&receipt["balances"]["ton"]), dec("1"));

    let (status, page) = send(
        &app,
        Method::GET,
        &format!("/api/users/{}/transactions?currency=UNI", user.id),
        None
    ).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["type"], "BOOST_BONUS");

    let (status, report) = send(
        &app,
        Method::GET,
        &format!("/api/users/{}/reconciliation", user.id),
        None
    ).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["transactions"], 3);
}

#[tokio::test]
async fn huge_history_page_is_a_bad_request() {
    let ledger = setup().await;
    let user = funded_user(&ledger, 1, "1", "0").await;
    let app = app(&ledger);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/users/{}/transactions?page=18446744073709551615", user.id),
        None
    ).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn referral_income_by_level() {
    let ledger = setup().await;
    let parent = create_test_user(&ledger.db, 1).await.unwrap();
    let child = create_referred_user(&ledger.db, 2, parent.id).await.unwrap();
    ledger.referrals.propagate(child.id, dec("10"), Currency::Uni, Some(1)).await.unwrap();
    let app = app(&ledger);

    let (status, income) = send(
        &app,
        Method::GET,
        &format!("/api/users/{}/referrals/income", parent.id),
        None
    ).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(income["direct_referrals"], 1);
    assert_eq!(income["levels"][0]["level"], 1);
    assert_eq!(decimal_field(&income["levels"][0]["uni"]), dec("0.5"));
    assert_eq!(decimal_field(&income["total_ton"]), dec("0"));
}
