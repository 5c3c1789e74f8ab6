use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;

use shopfloor_api::app::services::AppServices;
use shopfloor_core::{AggregateId, Money, StockLevel};
use shopfloor_infra::storage::InMemoryStorage;
use shopfloor_parties::{Customer, CustomerId};
use shopfloor_products::{CategoryId, Product, ProductId};

struct TestServer {
    base_url: String,
    storage: InMemoryStorage,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory storage, ephemeral port.
        let services = AppServices::in_memory(InMemoryStorage::new(), Duration::from_secs(5));
        assert_eq!(services.backend_name(), "in_memory");
        let storage = services
            .in_memory_storage()
            .cloned()
            .expect("in-memory services expose their store");
        let app = shopfloor_api::app::build_app(services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            storage,
            handle,
        }
    }

    fn customer(&self) -> CustomerId {
        let id = CustomerId::new(AggregateId::new());
        self.storage
            .insert_customer(Customer::new(id, "Ada", "Lovelace", Some("ada@example.com".into())).unwrap())
            .unwrap();
        id
    }

    fn product(&self, units: i64, price_cents: u64) -> ProductId {
        let id = ProductId::new(AggregateId::new());
        self.storage
            .insert_product(
                Product::new(
                    id,
                    "Widget",
                    CategoryId(1),
                    Money::from_cents(price_cents),
                    StockLevel::new(units).unwrap(),
                )
                .unwrap(),
            )
            .unwrap();
        id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn health_and_ready() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.url("/ready")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["backend"], "in_memory");
}

#[tokio::test]
async fn place_add_finalize_lifecycle() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let customer_id = srv.customer();
    let p = srv.product(5, 1000);
    let unknown = ProductId::new(AggregateId::new());

    let res = client
        .post(srv.url("/orders"))
        .json(&json!({
            "customer_id": customer_id.to_string(),
            "shipping_address": "1 Main St",
            "payment_method": "card",
            "items": [
                { "product_id": p.to_string(), "quantity": 3 },
                { "product_id": unknown.to_string(), "quantity": 1 }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    let order_id = body["order_id"].as_str().unwrap().to_string();
    assert_eq!(body["total"], 3000);
    assert_eq!(body["items"][0]["outcome"]["status"], "added");
    assert_eq!(body["items"][0]["outcome"]["subtotal"], 3000);
    assert_eq!(body["items"][1]["outcome"]["status"], "rejected");
    assert_eq!(body["items"][1]["outcome"]["reason"], "product_not_found");

    // Only 2 left: asking for 3 more is a conflict.
    let res = client
        .post(srv.url(&format!("/orders/{order_id}/items")))
        .json(&json!({ "product_id": p.to_string(), "quantity": 3 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_stock");

    let res = client
        .post(srv.url(&format!("/orders/{order_id}/items")))
        .json(&json!({ "product_id": p.to_string(), "quantity": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let line: serde_json::Value = res.json().await.unwrap();
    assert_eq!(line["line_no"], 2);

    let res = client
        .get(srv.url(&format!("/orders/{order_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let order: serde_json::Value = res.json().await.unwrap();
    assert_eq!(order["status"], "open");
    assert_eq!(order["total"], "50.00");
    assert_eq!(order["lines"].as_array().unwrap().len(), 2);

    let res = client
        .post(srv.url(&format!("/orders/{order_id}/finalize")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "closed");
    assert_eq!(body["total_cents"], 5000);

    let res = client
        .post(srv.url(&format!("/orders/{order_id}/items")))
        .json(&json!({ "product_id": p.to_string(), "quantity": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "order_not_open");
}

#[tokio::test]
async fn unknown_customer_and_bad_ids() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/orders"))
        .json(&json!({
            "customer_id": CustomerId::new(AggregateId::new()).to_string(),
            "shipping_address": "1 Main St",
            "payment_method": "card"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "customer_not_found");

    let res = client.get(srv.url("/orders/not-a-uuid")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(srv.url(&format!("/orders/{}", AggregateId::new())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn availability_and_listing() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let customer_id = srv.customer();
    let p = srv.product(2, 500);

    let res = client
        .get(srv.url(&format!("/products/{p}/availability?quantity=2")))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["available"], true);

    let res = client
        .get(srv.url(&format!("/products/{p}/availability?quantity=3")))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["available"], false);

    let res = client
        .get(srv.url(&format!("/products/{p}/availability?quantity=0")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    client
        .post(srv.url("/orders"))
        .json(&json!({
            "customer_id": customer_id.to_string(),
            "shipping_address": "1 Main St",
            "payment_method": "card"
        }))
        .send()
        .await
        .unwrap();

    let res = client
        .get(srv.url(&format!("/orders?customer_id={customer_id}")))
        .send()
        .await
        .unwrap();
    let orders: serde_json::Value = res.json().await.unwrap();
    assert_eq!(orders.as_array().unwrap().len(), 1);
    assert_eq!(orders[0]["total"], "0.00");

    let res = client
        .get(srv.url(&format!("/orders?customer_id={}", AggregateId::new())))
        .send()
        .await
        .unwrap();
    let orders: serde_json::Value = res.json().await.unwrap();
    assert!(orders.as_array().unwrap().is_empty());
}
