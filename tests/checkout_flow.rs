use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use opensase_checkout::api::{self, AppState};
use opensase_checkout::domain::aggregates::{Product, ShippingCity, ShippingZone};
use opensase_checkout::infrastructure::{EventBus, MemoryCatalog, MemoryStore, UnconfiguredGateway};
use opensase_checkout::services::{Backends, Engine, EngineSettings};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct Harness {
    app: Router,
    catalog: Arc<MemoryCatalog>,
    engine: Engine,
}

fn harness() -> Harness {
    let catalog = Arc::new(MemoryCatalog::new());
    let store = Arc::new(MemoryStore::new());
    store.put_zone(ShippingZone {
        region: "Nairobi".into(),
        cities: vec![ShippingCity { locality: "Westlands".into(), standard_price: dec!(270), express_price: dec!(450) }],
    }).unwrap();
    catalog.put_product(Product::active("X", "Product X", dec!(1000), 5)).unwrap();

    let engine = Engine::new(
        EngineSettings::default(),
        Backends::memory(catalog.clone(), store),
        Arc::new(UnconfiguredGateway),
        EventBus::disabled(),
    );
    let app = api::router(AppState::new(engine.clone()), Duration::from_secs(5));
    Harness { app, catalog, engine }
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

fn money(v: &Value) -> Decimal {
    v.as_str().unwrap().parse().unwrap()
}

fn checkout_body(owner: &str) -> Value {
    json!({
        "owner": owner,
        "destination": { "region": "Nairobi", "locality": "Westlands" },
        "contactEmail": "buyer@example.com",
        "shippingAddress": {
            "name": "Wanjiru", "street1": "1 Parklands Rd", "city": "Nairobi", "region": "Nairobi", "country": "KE"
        }
    })
}

#[tokio::test]
async fn test_guest_checkout_to_settled_payment() {
    let h = harness();
    let owner = "guest:flow-1";

    let (status, cart) = call(&h.app, "POST", &format!("/api/v1/cart/{owner}/lines"), Some(json!({"productId": "X"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(cart["lines"][0]["quantity"], 1);

    let (status, quote) = call(&h.app, "POST", "/api/v1/checkout/validate", Some(checkout_body(owner))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(money(&quote["totals"]["total"]), dec!(1430));
    assert_eq!(money(&quote["totals"]["tax"]), dec!(160));

    let (status, placed) = call(&h.app, "POST", "/api/v1/checkout", Some(checkout_body(owner))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(placed["order"]["state"], "CREATED");
    let order_id = placed["order"]["id"].as_str().unwrap().to_string();

    let (_, cart) = call(&h.app, "GET", &format!("/api/v1/cart/{owner}"), None).await;
    assert_eq!(cart["lines"].as_array().unwrap().len(), 0);

    let (status, payment) = call(&h.app, "POST", &format!("/api/v1/orders/{order_id}/payments"), Some(json!({"method": "mpesa"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let gateway_ref = payment["gateway_ref"].as_str().unwrap().to_string();

    let (status, body) = call(&h.app, "POST", "/api/v1/payments/verify", Some(json!({"orderId": order_id, "gatewayRef": gateway_ref}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["message"], "payment could not be verified");

    let webhook = json!({"orderId": order_id, "gatewayRef": gateway_ref, "status": "success", "amount": "1430.00", "transactionId": "MP-77"});
    let (status, first) = call(&h.app, "POST", "/api/v1/payments/webhook", Some(webhook.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["disposition"], "applied");
    assert_eq!(first["order_state"], "PAYMENT_SETTLED");

    let (status, second) = call(&h.app, "POST", "/api/v1/payments/webhook", Some(webhook)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["disposition"], "duplicate");

    let payment_id = first["payment"]["id"].as_str().unwrap().parse().unwrap();
    assert_eq!(h.engine.ledger.audits(payment_id).await.unwrap().len(), 1);
    assert_eq!(h.engine.ledger.revenue(Some("KES")).await.unwrap(), dec!(1430));

    h.catalog.set_price("X", dec!(1)).unwrap();
    let (_, order) = call(&h.app, "GET", &format!("/api/v1/orders/{order_id}"), None).await;
    assert_eq!(money(&order["lines"][0]["line_price_at_purchase"]), dec!(1000));
    assert_eq!(money(&order["order"]["totals"]["total"]), dec!(1430));

    let (status, _) = call(&h.app, "POST", &format!("/api/v1/orders/{order_id}/ship"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&h.app, "POST", &format!("/api/v1/orders/{order_id}/deliver"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(&h.app, "POST", &format!("/api/v1/orders/{order_id}/cancel"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "illegal_state_transition");
}

#[tokio::test]
async fn test_stale_stock_is_itemised() {
    let h = harness();
    let owner = "guest:flow-2";
    call(&h.app, "POST", &format!("/api/v1/cart/{owner}/lines"), Some(json!({"productId": "X", "quantity": 3}))).await;
    h.catalog.set_stock("X", 2).unwrap();

    let (status, body) = call(&h.app, "POST", "/api/v1/checkout", Some(checkout_body(owner))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "checkout_rejected");
    assert_eq!(body["invalid_lines"][0]["reason"]["code"], "insufficient_stock");
    assert_eq!(body["invalid_lines"][0]["reason"]["available"], 2);
    assert!(h.engine.ledger.revenue(None).await.unwrap().is_zero());
}

#[tokio::test]
async fn test_merge_on_sign_in() {
    let h = harness();
    h.catalog.put_product(Product::active("B", "Product B", dec!(10), 50)).unwrap();
    let account = uuid::Uuid::new_v4();
    let guest = "guest:flow-3";
    call(&h.app, "POST", &format!("/api/v1/cart/{guest}/lines"), Some(json!({"productId": "X", "quantity": 2}))).await;
    call(&h.app, "POST", &format!("/api/v1/cart/{guest}/lines"), Some(json!({"productId": "B"}))).await;
    call(&h.app, "POST", &format!("/api/v1/cart/account:{account}/lines"), Some(json!({"productId": "X"}))).await;

    let (status, merged) = call(&h.app, "POST", &format!("/api/v1/cart/{guest}/merge"), Some(json!({"accountId": account}))).await;
    assert_eq!(status, StatusCode::OK);
    let lines = merged["lines"].as_array().unwrap();
    assert_eq!(lines.len(), 2);
    let quantity_of = |product: &str| lines.iter().find(|l| l["product_id"] == product).map(|l| l["quantity"].clone());
    assert_eq!(quantity_of("X"), Some(json!(3)));
    assert_eq!(quantity_of("B"), Some(json!(1)));

    let (_, stale) = call(&h.app, "GET", &format!("/api/v1/cart/{guest}"), None).await;
    assert!(stale["lines"].as_array().unwrap().is_empty());
    let (status, _) = call(&h.app, "POST", &format!("/api/v1/cart/{guest}/lines"), Some(json!({"productId": "X"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_bad_requests() {
    let h = harness();
    let (status, _) = call(&h.app, "GET", "/api/v1/cart/nobody", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(&h.app, "POST", "/api/v1/cart/guest:x/lines", Some(json!({"productId": "X", "variantId": "X"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(&h.app, "POST", "/api/v1/payments/webhook", Some(json!({"orderId": uuid::Uuid::new_v4(), "gatewayRef": "PAY-1", "status": "???"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(&h.app, "GET", &format!("/api/v1/orders/{}", uuid::Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = call(&h.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

async fn pending_payment(h: &Harness, owner: &str) -> (String, String) {
    call(&h.app, "POST", &format!("/api/v1/cart/{owner}/lines"), Some(json!({"productId": "X"}))).await;
    let (status, placed) = call(&h.app, "POST", "/api/v1/checkout", Some(checkout_body(owner))).await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = placed["order"]["id"].as_str().unwrap().to_string();
    let (_, payment) = call(&h.app, "POST", &format!("/api/v1/orders/{order_id}/payments"), Some(json!({"method": "card"}))).await;
    (order_id, payment["gateway_ref"].as_str().unwrap().to_string())
}

#[tokio::test]
async fn test_declined_payment_keeps_gateway_detail_out_of_responses() {
    let h = harness();
    let (order_id, gateway_ref) = pending_payment(&h, "guest:flow-5").await;

    let webhook = json!({
        "orderId": order_id, "gatewayRef": gateway_ref, "status": "declined",
        "gateway_response": "Insufficient funds on card ****4242", "processor_code": "51"
    });
    let (status, body) = call(&h.app, "POST", "/api/v1/payments/webhook", Some(webhook)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["disposition"], "applied");
    assert_eq!(body["payment"]["state"], "FAILED");
    assert_eq!(body["message"], "payment could not be verified");
    assert!(body["payment"].get("metadata").is_none());
    assert!(body["payment"].get("error_message").is_none());
    assert!(!body.to_string().contains("Insufficient funds"));

    let (_, order) = call(&h.app, "GET", &format!("/api/v1/orders/{order_id}"), None).await;
    assert_eq!(order["payments"][0]["state"], "FAILED");
    assert!(!order.to_string().contains("Insufficient funds"));

    let payment_id = body["payment"]["id"].as_str().unwrap().parse().unwrap();
    let audits = h.engine.ledger.audits(payment_id).await.unwrap();
    assert_eq!(audits[0].raw_payload["gateway_response"], "Insufficient funds on card ****4242");
}

#[tokio::test]
async fn test_late_settlement_on_cancelled_order_is_acknowledged() {
    let h = harness();
    let (order_id, gateway_ref) = pending_payment(&h, "guest:flow-6").await;
    let (status, _) = call(&h.app, "POST", &format!("/api/v1/orders/{order_id}/cancel"), None).await;
    assert_eq!(status, StatusCode::OK);

    let webhook = json!({"orderId": order_id, "gatewayRef": gateway_ref, "status": "success", "amount": "1430.00"});
    let (status, body) = call(&h.app, "POST", "/api/v1/payments/webhook", Some(webhook.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["disposition"], "refund_due");
    assert_eq!(body["order_state"], "CANCELLED");
    assert_eq!(body["payment"]["state"], "SETTLED");

    let (status, again) = call(&h.app, "POST", "/api/v1/payments/webhook", Some(webhook)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["disposition"], "duplicate");
    assert!(h.engine.ledger.revenue(None).await.unwrap().is_zero());
}
