//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use checkout::{
    CheckoutService, GatewayError, InMemoryPaymentGateway, ProviderPaymentState,
    RecordingNotifier,
};
use domain::{Money, Product, ProductId};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{InMemoryOrderStore, InMemoryProductCatalog};
use serde_json::{Value, json};
use tower::ServiceExt;

const WEBHOOK_SECRET: &str = "whsec_api_test";
const ADMIN_EMAIL: &str = "owner@shop.example";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    router: axum::Router,
    store: InMemoryOrderStore,
    gateway: InMemoryPaymentGateway,
    notifier: RecordingNotifier,
}

fn setup() -> TestApp {
    let store = InMemoryOrderStore::new();
    let catalog = InMemoryProductCatalog::with_products([
        Product {
            id: ProductId::new("clx0radiance0serum000001"),
            slug: "radiance-serum".to_string(),
            name: "Radiance Serum".to_string(),
            price: Money::from_dollars(68),
            sizes: vec![],
        },
        Product {
            id: ProductId::new("clx0gentle0cleanser00002"),
            slug: "gentle-cleanser".to_string(),
            name: "Gentle Cleanser".to_string(),
            price: Money::from_dollars(24),
            sizes: vec![],
        },
    ]);
    let gateway = InMemoryPaymentGateway::new();
    let notifier = RecordingNotifier::new();
    let checkout = CheckoutService::new(
        Arc::new(store.clone()),
        Arc::new(catalog),
        Arc::new(gateway.clone()),
        Arc::new(notifier.clone()),
    );
    let state = Arc::new(api::AppState::new(
        checkout,
        WEBHOOK_SECRET,
        [ADMIN_EMAIL.to_string()],
    ));
    TestApp {
        router: api::create_app(state, get_metrics_handle()),
        store,
        gateway,
        notifier,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, json)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(json_request("POST", uri, &body)).await
    }

    async fn create_order(&self) -> String {
        let (status, json) = self.post("/orders", order_body(json!([
            { "id": "radiance-serum", "name": "Radiance Serum", "price": 1, "quantity": 1 }
        ])))
        .await;
        assert_eq!(status, StatusCode::OK, "{json}");
        json["order"]["id"].as_str().unwrap().to_string()
    }

    async fn initiate(&self, order_id: &str) -> String {
        let (status, json) = self
            .post(
                "/payment/initiate",
                json!({ "orderId": order_id, "phone": "0712345678", "amount": 68 }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{json}");
        json["reference"].as_str().unwrap().to_string()
    }

    async fn webhook(&self, secret: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/payment/webhook")
            .header("content-type", "application/json")
            .header("authorization", secret)
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn order_body(items: Value) -> Value {
    json!({
        "items": items,
        "customerName": "Njeri Kamau",
        "customerEmail": "njeri@example.com",
        "customerPhone": "0712345678",
        "shippingAddress": "Kenyatta Avenue 4, Nairobi",
        "total": 1
    })
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();
    let (status, json) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_create_order_uses_catalog_prices() {
    let app = setup();
    let (status, json) = app
        .post(
            "/orders",
            order_body(json!([
                { "id": "radiance-serum", "price": 1, "quantity": 1 }
            ])),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    let order = &json["order"];
    assert_eq!(order["status"], "PENDING");
    assert_eq!(order["total"], 68.0);
    assert_eq!(order["shipping"], 0.0);
    assert_eq!(order["totalKes"], 10_200);
    assert_eq!(order["items"][0]["productId"], "clx0radiance0serum000001");
    assert_eq!(order["items"][0]["price"], 68.0);
}

#[tokio::test]
async fn test_create_order_adds_shipping_below_threshold() {
    let app = setup();
    let (status, json) = app
        .post(
            "/orders",
            order_body(json!([{ "productId": "gentle-cleanser", "quantity": 1 }])),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["order"]["subtotal"], 24.0);
    assert_eq!(json["order"]["shipping"], 5.0);
    assert_eq!(json["order"]["total"], 29.0);
}

#[tokio::test]
async fn test_create_order_with_unknown_slug_is_rejected() {
    let app = setup();
    let (status, json) = app
        .post(
            "/orders",
            order_body(json!([
                { "id": "radiance-serum", "quantity": 1 },
                { "id": "vitamin-c-toner", "quantity": 1 }
            ])),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("vitamin-c-toner"));
    assert_eq!(app.store.order_count().await, 0);
}

#[tokio::test]
async fn test_create_order_with_empty_cart_is_rejected() {
    let app = setup();
    let (status, json) = app.post("/orders", order_body(json!([]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_create_order_with_oversized_quantity_is_rejected() {
    let app = setup();
    let (status, json) = app
        .post(
            "/orders",
            order_body(json!([{ "id": "radiance-serum", "quantity": 3_000_000_000u64 }])),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("Invalid quantity"));
    assert_eq!(app.store.order_count().await, 0);
}

#[tokio::test]
async fn test_malformed_json_is_a_bad_request() {
    let app = setup();
    let request = Request::builder()
        .method("POST")
        .uri("/orders")
        .header("content-type", "application/json")
        .body(Body::from("{\"items\": "))
        .unwrap();
    let (status, json) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_list_orders_requires_user_id() {
    let app = setup();
    let (status, json) = app.get("/orders").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "userId required");
}

#[tokio::test]
async fn test_orders_are_listed_per_user() {
    let app = setup();
    let mut body = order_body(json!([{ "id": "radiance-serum", "quantity": 1 }]));
    body["userId"] = json!("user_7");
    app.post("/orders", body).await;

    // Owner taken from the identity headers when the body has none.
    let request = Request::builder()
        .method("POST")
        .uri("/orders")
        .header("content-type", "application/json")
        .header("x-user-id", "user_7")
        .body(Body::from(
            order_body(json!([{ "id": "gentle-cleanser", "quantity": 2 }])).to_string(),
        ))
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);

    app.create_order().await;

    let (status, json) = app.get("/orders?userId=user_7").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["orders"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_get_order() {
    let app = setup();
    let order_id = app.create_order().await;

    let (status, json) = app.get(&format!("/orders/{order_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["order"]["id"], order_id.as_str());

    let (status, _) = app.get(&format!("/orders/{}", common::OrderId::new())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get("/orders/not-an-id").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_initiate_payment_sends_kes_and_normalized_phone() {
    let app = setup();
    let order_id = app.create_order().await;

    let (status, json) = app
        .post(
            "/payment/initiate",
            json!({
                "orderId": order_id,
                "phone": "0712345678",
                "amount": 68,
                "customerName": "Njeri Kamau"
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert!(json["reference"].is_string());
    assert!(json["message"].is_string());

    let requests = app.gateway.requests();
    assert_eq!(requests[0].amount_kes, 10_200);
    assert_eq!(requests[0].phone, "254712345678");

    let (_, order) = app.get(&format!("/orders/{order_id}")).await;
    assert_eq!(order["order"]["status"], "PROCESSING");
}

#[tokio::test]
async fn test_initiate_payment_validation() {
    let app = setup();
    let order_id = app.create_order().await;

    let (status, json) = app
        .post("/payment/initiate", json!({ "orderId": order_id }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Missing required fields: orderId, phone");

    let (status, _) = app
        .post(
            "/payment/initiate",
            json!({ "orderId": order_id, "phone": "0712345678", "amount": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/payment/initiate",
            json!({ "orderId": order_id, "phone": "12" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.gateway.requests().is_empty());
}

#[tokio::test]
async fn test_gateway_outage_keeps_order_pending() {
    let app = setup();
    let order_id = app.create_order().await;
    app.gateway
        .set_initiate_failure(Some(GatewayError::Transient("upstream 502".to_string())));

    let (status, json) = app
        .post(
            "/payment/initiate",
            json!({ "orderId": order_id, "phone": "0712345678" }),
        )
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(!json["error"].as_str().unwrap().contains("502"));
    let (_, order) = app.get(&format!("/orders/{order_id}")).await;
    assert_eq!(order["order"]["status"], "PENDING");
    assert!(order["order"]["providerReference"].is_null());
}

#[tokio::test]
async fn test_payment_status_poll_applies_provider_result() {
    let app = setup();
    let order_id = app.create_order().await;
    let reference = app.initiate(&order_id).await;

    let (status, json) = app
        .get(&format!("/payment/status?reference={reference}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "pending");

    app.gateway.set_status(&reference, ProviderPaymentState::Success);
    let (_, json) = app
        .get(&format!("/payment/status?reference={reference}&orderId={order_id}"))
        .await;
    assert_eq!(json["status"], "paid");
    assert_eq!(json["orderStatus"], "PAID");

    let (status, _) = app.get("/payment/status").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_payment_status_ignores_another_orders_reference() {
    let app = setup();
    let cheap = app.create_order().await;
    let cheap_reference = app.initiate(&cheap).await;
    let dear = app.create_order().await;
    app.initiate(&dear).await;
    app.gateway
        .set_status(&cheap_reference, ProviderPaymentState::Success);

    let (status, json) = app
        .get(&format!(
            "/payment/status?reference={cheap_reference}&orderId={dear}"
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "pending");
    assert_eq!(json["orderStatus"], "PROCESSING");
}

#[tokio::test]
async fn test_webhook_confirms_payment_once() {
    let app = setup();
    let order_id = app.create_order().await;
    let reference = app.initiate(&order_id).await;

    let callback = json!({
        "external_reference": order_id,
        "status": "SUCCESS",
        "reference": reference,
        "amount": 10200
    });
    let (status, json) = app.webhook(WEBHOOK_SECRET, callback.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["result"], "applied");

    let (status, json) = app.webhook(WEBHOOK_SECRET, callback).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"], "already_resolved");

    let (_, order) = app.get(&format!("/orders/{order_id}")).await;
    assert_eq!(order["order"]["status"], "PAID");
    assert_eq!(order["order"]["paymentRef"], reference.as_str());
    assert_eq!(app.notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_webhook_rejections() {
    let app = setup();
    let order_id = app.create_order().await;

    let (status, json) = app
        .webhook(
            "wrong",
            json!({ "external_reference": order_id, "status": "SUCCESS" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "Unauthorized");

    let (status, json) = app
        .webhook(WEBHOOK_SECRET, json!({ "status": "SUCCESS" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Missing reference");

    let (status, _) = app
        .webhook(
            &format!("Bearer {WEBHOOK_SECRET}"),
            json!({ "external_reference": common::OrderId::new(), "status": "SUCCESS" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, order) = app.get(&format!("/orders/{order_id}")).await;
    assert_eq!(order["order"]["status"], "PENDING");
}

#[tokio::test]
async fn test_google_pay_confirmation() {
    let app = setup();
    let order_id = app.create_order().await;

    let (status, json) = app
        .post("/payments/google-pay", json!({ "orderId": order_id }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Missing required fields: orderId, paymentToken");

    let (status, json) = app
        .post(
            "/payments/google-pay",
            json!({
                "orderId": order_id,
                "paymentToken": { "signature": "MEUCIQ", "protocolVersion": "ECv2" },
                "paymentData": { "apiVersion": 2 }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["order"]["status"], "PAID");
    assert_eq!(json["order"]["paymentMethod"], "google_pay");
    assert!(
        json["order"]["paymentRef"]
            .as_str()
            .unwrap()
            .starts_with("gpay_")
    );
}

#[tokio::test]
async fn test_google_pay_refused_after_mpesa_attempt() {
    let app = setup();
    let order_id = app.create_order().await;
    app.initiate(&order_id).await;

    let (status, _) = app
        .post(
            "/payments/google-pay",
            json!({ "orderId": order_id, "paymentToken": { "signature": "x" } }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_admin_routes_require_admin() {
    let app = setup();

    let (status, _) = app.get("/admin/orders").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/admin/orders")
        .header("x-user-id", "user_1")
        .header("x-user-email", "buyer@example.com")
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_lists_and_fulfils_orders() {
    let app = setup();
    let paid = app.create_order().await;
    app.create_order().await;
    app.post(
        "/payments/google-pay",
        json!({ "orderId": paid, "paymentToken": { "signature": "x" } }),
    )
    .await;

    let request = Request::builder()
        .uri("/admin/orders?status=PAID&limit=5")
        .header("x-user-email", ADMIN_EMAIL)
        .body(Body::empty())
        .unwrap();
    let (status, json) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 1);
    assert_eq!(json["pages"], 1);
    assert_eq!(json["page"], 1);
    assert_eq!(json["orders"][0]["id"], paid.as_str());

    let mut ship = json_request(
        "PUT",
        "/admin/orders",
        &json!({ "orderId": paid, "status": "SHIPPED" }),
    );
    ship.headers_mut()
        .insert("x-user-role", "ADMIN".parse().unwrap());
    let (status, json) = app.send(ship).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["order"]["status"], "SHIPPED");

    let mut back = json_request(
        "PUT",
        "/admin/orders",
        &json!({ "orderId": paid, "status": "PENDING" }),
    );
    back.headers_mut()
        .insert("x-user-role", "ADMIN".parse().unwrap());
    let (status, _) = app.send(back).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let unpaid = app.create_order().await;
    let mut mark_paid = json_request(
        "PUT",
        "/admin/orders",
        &json!({ "orderId": unpaid, "status": "PAID" }),
    );
    mark_paid
        .headers_mut()
        .insert("x-user-role", "ADMIN".parse().unwrap());
    let (status, _) = app.send(mark_paid).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();
    app.create_order().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
}
