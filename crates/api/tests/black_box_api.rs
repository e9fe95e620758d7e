use std::sync::Arc;

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};

use retailops_api::app::{build_app, services::AppServices};
use retailops_auth::{JwtClaims, PrincipalId, Role};
use retailops_core::{AggregateId, TenantId};

const SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, bound to an ephemeral port.
        let services = Arc::new(AppServices::in_memory().expect("in-memory services"));
        let app = build_app(services, SECRET);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    async fn get(&self, path: &str, token: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(tenant_id: TenantId, role: &'static str, locations: Vec<AggregateId>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: PrincipalId::new(),
        tenant_id,
        roles: vec![Role::new(role)],
        locations,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn id_of(body: &Value) -> String {
    body["id"].as_str().expect("response carries an id").to_string()
}

/// A shop and a warehouse, one active product, and ten units received into
/// the warehouse at 200 each.
struct Store {
    shop: String,
    warehouse: String,
    product: String,
}

async fn stocked_store(srv: &TestServer, admin: &str) -> Store {
    let (status, body) = srv
        .post("/locations/shops", admin, json!({"code": "s1", "name": "High Street"}))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let shop = id_of(&body);

    let (status, body) = srv
        .post("/locations/warehouses", admin, json!({"code": "w1", "name": "Depot"}))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let warehouse = id_of(&body);

    let (status, body) = srv
        .post("/products", admin, json!({"sku": "TEA-01", "name": "Green tea", "price": 500}))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let product = id_of(&body);

    let (status, _) = srv.post(&format!("/products/{product}/activate"), admin, json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = srv
        .post(
            "/invoices",
            admin,
            json!({
                "warehouse_id": warehouse,
                "supplier": "Leaf & Co",
                "reference": "INV-1",
                "lines": [{"product_id": product, "quantity": 10, "unit_cost": 200}]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    Store { shop, warehouse, product }
}

async fn on_hand(srv: &TestServer, token: &str, location: &str, product: &str) -> i64 {
    let (status, body) = srv
        .get(&format!("/inventory/locations/{location}/products/{product}"), token)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["on_hand"].as_i64().unwrap()
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(format!("{}/whoami", srv.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthorized");

    let res = srv.client.get(format!("{}/health", srv.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn token_signed_with_another_secret_is_rejected() {
    let srv = TestServer::spawn().await;
    let now = Utc::now();
    let claims = JwtClaims {
        sub: PrincipalId::new(),
        tenant_id: TenantId::new(),
        roles: vec![Role::new("admin")],
        locations: vec![],
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };
    let forged = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(b"other-secret"),
    )
    .unwrap();

    let (status, _) = srv.get("/whoami", &forged).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn whoami_reflects_the_token() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let shop = AggregateId::new();
    let token = mint_jwt(tenant_id, "shopkeeper", vec![shop]);

    let (status, body) = srv.get("/whoami", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenant_id"].as_str().unwrap(), tenant_id.to_string());
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "shopkeeper"));
    assert!(body["permissions"].as_array().unwrap().iter().any(|p| p == "sales.create"));
    assert_eq!(body["locations"][0].as_str().unwrap(), shop.to_string());
}

#[tokio::test]
async fn stock_flows_from_invoice_through_transfer_to_sale_and_back() {
    let srv = TestServer::spawn().await;
    let admin = mint_jwt(TenantId::new(), "admin", vec![]);
    let store = stocked_store(&srv, &admin).await;

    assert_eq!(on_hand(&srv, &admin, &store.warehouse, &store.product).await, 10);
    let (_, product) = srv.get(&format!("/products/{}", store.product), &admin).await;
    assert_eq!(product["unit_cost"], 200);

    let (status, body) = srv
        .post(
            "/transfers",
            &admin,
            json!({
                "from": store.warehouse,
                "to": store.shop,
                "lines": [{"product_id": store.product, "quantity": 4}]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["transfer"]["status"], "in_transit");
    let transfer = id_of(&body);
    assert_eq!(on_hand(&srv, &admin, &store.warehouse, &store.product).await, 6);

    let (status, body) = srv.post(&format!("/transfers/{transfer}/receive"), &admin, json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(on_hand(&srv, &admin, &store.shop, &store.product).await, 4);

    let (status, body) = srv
        .post(
            "/sales",
            &admin,
            json!({
                "shop_id": store.shop,
                "payment": "card",
                "lines": [{"product_id": store.product, "quantity": 3}]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["sale"]["total"], 1500);
    let sale = id_of(&body);
    assert_eq!(on_hand(&srv, &admin, &store.shop, &store.product).await, 1);

    let (status, body) = srv
        .post(&format!("/sales/{sale}/void"), &admin, json!({"reason": "customer changed mind"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["sale"]["status"], "voided");
    assert_eq!(on_hand(&srv, &admin, &store.shop, &store.product).await, 4);

    let (status, body) = srv.post(&format!("/sales/{sale}/void"), &admin, json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
}

#[tokio::test]
async fn overselling_is_rejected_without_side_effects() {
    let srv = TestServer::spawn().await;
    let admin = mint_jwt(TenantId::new(), "admin", vec![]);
    let store = stocked_store(&srv, &admin).await;

    let (status, body) = srv
        .post(
            "/sales",
            &admin,
            json!({"shop_id": store.shop, "lines": [{"product_id": store.product, "quantity": 1}]}),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
    assert_eq!(body["error"], "invariant_violation");

    let (_, sales) = srv.get("/sales", &admin).await;
    assert!(sales.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn ids_of_the_wrong_kind_are_not_found() {
    let srv = TestServer::spawn().await;
    let admin = mint_jwt(TenantId::new(), "admin", vec![]);
    let store = stocked_store(&srv, &admin).await;

    let (status, body) = srv
        .post(
            "/sales",
            &admin,
            json!({"shop_id": store.product, "lines": [{"product_id": store.product, "quantity": 1}]}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");
    assert_eq!(body["error"], "not_found");

    let (status, body) = srv
        .post(
            "/transfers",
            &admin,
            json!({"from": store.warehouse, "to": store.product, "lines": [{"product_id": store.product, "quantity": 1}]}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");

    let (status, body) = srv.post(&format!("/locations/{}/close", store.product), &admin, json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");

    assert_eq!(on_hand(&srv, &admin, &store.warehouse, &store.product).await, 10);
}

#[tokio::test]
async fn duplicate_codes_skus_and_invoices_conflict() {
    let srv = TestServer::spawn().await;
    let admin = mint_jwt(TenantId::new(), "admin", vec![]);
    let store = stocked_store(&srv, &admin).await;

    let (status, _) = srv
        .post("/locations/shops", &admin, json!({"code": "S1", "name": "Another"}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = srv
        .post("/products", &admin, json!({"sku": "tea-01", "name": "Dup", "price": 1}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = srv
        .post(
            "/invoices",
            &admin,
            json!({
                "warehouse_id": store.warehouse,
                "supplier": "leaf & co",
                "reference": " inv-1 ",
                "lines": [{"product_id": store.product, "quantity": 1, "unit_cost": 1}]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
}

#[tokio::test]
async fn roles_gate_endpoints() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let admin = mint_jwt(tenant_id, "admin", vec![]);
    let store = stocked_store(&srv, &admin).await;
    let shop: AggregateId = store.shop.parse().unwrap();
    let warehouse: AggregateId = store.warehouse.parse().unwrap();

    let shopkeeper = mint_jwt(tenant_id, "shopkeeper", vec![shop]);
    let (status, body) = srv
        .post(
            "/invoices",
            &shopkeeper,
            json!({
                "warehouse_id": store.warehouse,
                "supplier": "Other",
                "reference": "X",
                "lines": [{"product_id": store.product, "quantity": 1, "unit_cost": 1}]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let clerk = mint_jwt(tenant_id, "warehouse", vec![warehouse]);
    let (status, _) = srv
        .post(
            "/sales",
            &clerk,
            json!({"shop_id": store.shop, "lines": [{"product_id": store.product, "quantity": 1}]}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = srv.post("/products", &clerk, json!({"sku": "N", "name": "N", "price": 1})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn shopkeepers_are_bound_to_their_shops() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let admin = mint_jwt(tenant_id, "admin", vec![]);
    let store = stocked_store(&srv, &admin).await;

    let elsewhere = mint_jwt(tenant_id, "shopkeeper", vec![AggregateId::new()]);
    let (status, _) = srv
        .post(
            "/sales",
            &elsewhere,
            json!({"shop_id": store.shop, "lines": [{"product_id": store.product, "quantity": 1}]}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = srv.get(&format!("/inventory/locations/{}", store.shop), &elsewhere).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, locations) = srv.get("/locations", &elsewhere).await;
    assert_eq!(status, StatusCode::OK);
    assert!(locations.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn tenants_do_not_see_each_other() {
    let srv = TestServer::spawn().await;
    let admin_a = mint_jwt(TenantId::new(), "admin", vec![]);
    let admin_b = mint_jwt(TenantId::new(), "admin", vec![]);
    let store = stocked_store(&srv, &admin_a).await;

    let (status, _) = srv.get(&format!("/products/{}", store.product), &admin_b).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, products) = srv.get("/products", &admin_b).await;
    assert!(products.as_array().unwrap().is_empty());

    let (status, _) = srv
        .post(
            "/sales",
            &admin_b,
            json!({"shop_id": store.shop, "lines": [{"product_id": store.product, "quantity": 1}]}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dashboard_follows_the_role() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let admin = mint_jwt(tenant_id, "admin", vec![]);
    let store = stocked_store(&srv, &admin).await;

    let (status, body) = srv
        .post(
            &format!("/inventory/locations/{}/products/{}/adjust", store.shop, store.product),
            &admin,
            json!({"delta": 5, "note": "opening count"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = srv
        .post(
            "/sales",
            &admin,
            json!({"shop_id": store.shop, "lines": [{"product_id": store.product, "quantity": 2}]}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, body) = srv.get("/dashboard", &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scope"], "global");
    assert_eq!(body["overview"]["totals"]["revenue"], 1000);
    assert_eq!(body["overview"]["totals"]["sales"], 1);

    let shop: AggregateId = store.shop.parse().unwrap();
    let shopkeeper = mint_jwt(tenant_id, "shopkeeper", vec![shop]);
    let (status, body) = srv.get("/dashboard", &shopkeeper).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scope"], "shop");
    assert_eq!(body["overview"]["totals"]["units"], 2);

    let warehouse: AggregateId = store.warehouse.parse().unwrap();
    let clerk = mint_jwt(tenant_id, "warehouse", vec![warehouse]);
    let (status, body) = srv.get("/dashboard", &clerk).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scope"], "warehouse");
    assert_eq!(body["warehouses"][0]["units_on_hand"], 10);

    let nobody = mint_jwt(tenant_id, "guest", vec![]);
    let (status, _) = srv.get("/dashboard", &nobody).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = srv.get(&format!("/dashboard/velocity?location={}", store.shop), &shopkeeper).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["items"][0]["on_hand"], 3);
}

#[tokio::test]
async fn dates_at_the_calendar_limits_are_handled() {
    let srv = TestServer::spawn().await;
    let admin = mint_jwt(TenantId::new(), "admin", vec![]);
    let first_day = NaiveDate::MIN.to_string();
    let last_day = NaiveDate::MAX.to_string().replace('+', "%2B");

    let (status, body) = srv.get(&format!("/dashboard?to={first_day}"), &admin).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["error"], "invalid_range");

    let (status, body) = srv.get(&format!("/dashboard/velocity?as_of={first_day}"), &admin).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["error"], "invalid_range");

    let (status, body) = srv.get(&format!("/dashboard?to={last_day}"), &admin).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["overview"]["daily"].as_array().unwrap().len(), 30);
}
