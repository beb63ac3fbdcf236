use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use rexagon_market::api::{AppState, auth, router};
use rexagon_market::engine::RetryPolicy;
use rexagon_market::model::{MarketItem, Role, User, UserId};
use rexagon_market::store::{LedgerStore, MemoryStore};
use rexagon_market::{Amount, Discount, ItemId, Orchestrator};
use serde_json::{Value, json};
use tower::ServiceExt;

const SECRET: &str = "test-secret-test-secret-test-secret";

struct TestApp {
    app: Router,
    store: Arc<MemoryStore>,
}

impl TestApp {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let policy = RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(1),
            call_timeout: Duration::from_secs(1),
        };
        let orchestrator = Orchestrator::new(store.clone(), policy);
        let app = router(Arc::new(AppState::new(orchestrator, SECRET)));
        Self { app, store }
    }

    async fn user(&self, name: &str, balance: i64, role: Role) -> (UserId, String) {
        let mut user = User::new(name, Amount::from_whole(balance));
        user.role = role;
        let id = user.id;
        self.store.insert_user(user).await.unwrap();
        let token = auth::issue_token(SECRET, id, chrono::Duration::minutes(10)).unwrap();
        (id, token)
    }

    async fn item(&self, name: &str, category: &str, price: i64, stock: u32, discount: f64) -> ItemId {
        let item = MarketItem::new(name, category, Amount::from_whole(price), stock)
            .with_discount(Discount::from_percent(discount).unwrap());
        let id = item.id;
        self.store.insert_item(item).await.unwrap();
        id
    }

    async fn balance(&self, user: UserId) -> Amount {
        self.store.find_user(user).await.unwrap().unwrap().credit_balance
    }

    async fn stock(&self, item: ItemId) -> u32 {
        self.store.find_item(item).await.unwrap().unwrap().stock
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        send(self.app.clone(), method, uri, token, body).await
    }
}

async fn send(
    app: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn purchase_uri(item: ItemId) -> String {
    format!("/api/market/purchase/{item}")
}

// Purchase contract

#[tokio::test]
async fn discounted_purchase_returns_receipt() {
    let t = TestApp::new();
    let (user, token) = t.user("steve", 100, Role::Member).await;
    let item = t.item("Elytra", "Özel Eşyalar", 80, 5, 25.0).await;

    let (status, body) = t.send(Method::POST, &purchase_uri(item), Some(&token), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Satın alma başarılı");
    assert_eq!(body["new_balance"], json!(40.0));
    assert_eq!(body["confirmation"]["price_paid"], json!(60.0));
    assert_eq!(body["confirmation"]["item_name"], "Elytra");
    assert_eq!(body["confirmation"]["item_id"], item.to_string());

    assert_eq!(t.balance(user).await, Amount::from_whole(40));
    assert_eq!(t.stock(item).await, 4);
}

#[tokio::test]
async fn insufficient_credit_is_400() {
    let t = TestApp::new();
    let (user, token) = t.user("alex", 50, Role::Member).await;
    let item = t.item("Beacon", "Özel Eşyalar", 80, 5, 0.0).await;

    let (status, body) = t.send(Method::POST, &purchase_uri(item), Some(&token), None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "detail": "Yetersiz kredi" }));
    assert_eq!(t.balance(user).await, Amount::from_whole(50));
    assert_eq!(t.stock(item).await, 5);
}

#[tokio::test]
async fn out_of_stock_is_400() {
    let t = TestApp::new();
    let (user, token) = t.user("alex", 500, Role::Member).await;
    let item = t.item("Dragon Egg", "Özel Eşyalar", 80, 0, 0.0).await;

    let (status, body) = t.send(Method::POST, &purchase_uri(item), Some(&token), None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "detail": "Stok tükendi" }));
    assert_eq!(t.balance(user).await, Amount::from_whole(500));
}

#[tokio::test]
async fn unknown_item_is_404() {
    let t = TestApp::new();
    let (_, token) = t.user("alex", 500, Role::Member).await;

    let (status, body) = t
        .send(Method::POST, &purchase_uri(uuid::Uuid::new_v4()), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "detail": "Ürün bulunamadı" }));

    let (status, _) = t
        .send(Method::POST, "/api/market/purchase/not-a-uuid", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// Authentication

#[tokio::test]
async fn purchase_requires_a_valid_token() {
    let t = TestApp::new();
    let item = t.item("Beacon", "Özel Eşyalar", 1, 5, 0.0).await;
    let unauthenticated = json!({ "detail": "Kimlik doğrulanamadı" });

    let (status, body) = t.send(Method::POST, &purchase_uri(item), None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, unauthenticated);

    let (status, _) = t
        .send(Method::POST, &purchase_uri(item), Some("garbage"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let ghost = auth::issue_token(SECRET, uuid::Uuid::new_v4(), chrono::Duration::minutes(5)).unwrap();
    let (status, body) = t.send(Method::POST, &purchase_uri(item), Some(&ghost), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, unauthenticated);

    assert_eq!(t.stock(item).await, 5);
}

#[tokio::test]
async fn admin_routes_reject_members() {
    let t = TestApp::new();
    let (user, token) = t.user("alex", 0, Role::Member).await;

    let (status, body) = t
        .send(
            Method::POST,
            &format!("/api/admin/wallet/{user}/credit"),
            Some(&token),
            Some(json!({ "amount": 1000 })),
        )
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({ "detail": "Yönetici yetkisi gerekli" }));
    assert_eq!(t.balance(user).await, Amount::ZERO);
}

// Wallet

#[tokio::test]
async fn history_is_newest_first() {
    let t = TestApp::new();
    let (user, token) = t.user("steve", 100, Role::Member).await;
    let (_, admin) = t.user("op", 0, Role::Admin).await;
    let item = t.item("Kit", "Paketler", 30, 5, 0.0).await;

    t.send(Method::POST, &purchase_uri(item), Some(&token), None).await;
    let (status, body) = t
        .send(
            Method::POST,
            &format!("/api/admin/wallet/{user}/credit"),
            Some(&admin),
            Some(json!({ "amount": 12.5 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["new_balance"], json!(82.5));

    let (status, body) = t.send(Method::GET, "/api/wallet/history", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["kind"], "adjustment");
    assert_eq!(entries[0]["amount"], json!(12.5));
    assert_eq!(entries[1]["kind"], "purchase-debit");
    assert_eq!(entries[1]["amount"], json!(-30.0));
    assert_eq!(entries[1]["status"], "completed");
}

#[tokio::test]
async fn history_is_capped() {
    let t = TestApp::new();
    let (user, token) = t.user("steve", 0, Role::Member).await;
    for _ in 0..105 {
        t.send(
            Method::POST,
            "/api/wallet/load",
            Some(&token),
            Some(json!({ "amount": 5 })),
        )
        .await;
    }

    let (_, body) = t.send(Method::GET, "/api/wallet/history", Some(&token), None).await;
    assert_eq!(body.as_array().unwrap().len(), 100);
    assert_eq!(t.balance(user).await, Amount::ZERO);
}

#[tokio::test]
async fn load_opens_pending_transaction() {
    let t = TestApp::new();
    let (user, token) = t.user("steve", 10, Role::Member).await;

    let (status, body) = t
        .send(
            Method::POST,
            "/api/wallet/load",
            Some(&token),
            Some(json!({ "amount": 25 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Ödeme başlatıldı");
    assert!(body["transaction_id"].is_string());
    assert_eq!(t.balance(user).await, Amount::from_whole(10));

    let (_, history) = t.send(Method::GET, "/api/wallet/history", Some(&token), None).await;
    assert_eq!(history[0]["status"], "pending");
    assert_eq!(history[0]["kind"], "load");

    let (status, _) = t
        .send(
            Method::POST,
            "/api/wallet/load",
            Some(&token),
            Some(json!({ "amount": -3 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // sub-cent amounts are refused, not rounded
    let (status, _) = t
        .send(
            Method::POST,
            "/api/wallet/load",
            Some(&token),
            Some(json!({ "amount": 10.129 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, history) = t.send(Method::GET, "/api/wallet/history", Some(&token), None).await;
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert!(history[0]["timestamp"].is_string());
}

// Catalog

#[tokio::test]
async fn admin_creates_items_and_members_can_browse() {
    let t = TestApp::new();
    let (_, admin) = t.user("op", 0, Role::Admin).await;
    t.item("Starter Kit", "Paketler", 15, 10, 0.0).await;

    let (status, body) = t
        .send(
            Method::POST,
            "/api/admin/market/items",
            Some(&admin),
            Some(json!({
                "name": "VIP+",
                "price": 120,
                "stock": 50,
                "discount": 10,
                "category": "VIP"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Ürün oluşturuldu");
    let id = body["id"].as_str().unwrap().to_string();

    let (status, item) = t
        .send(Method::GET, &format!("/api/market/items/{id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(item["name"], "VIP+");
    assert_eq!(item["discount"], json!(10.0));

    let (_, categories) = t.send(Method::GET, "/api/market/categories", None, None).await;
    assert_eq!(categories, json!(["Paketler", "VIP"]));

    let (_, all) = t.send(Method::GET, "/api/market/items", None, None).await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (_, vip) = t
        .send(Method::GET, "/api/market/items?category=VIP", None, None)
        .await;
    assert_eq!(vip.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_item_is_400() {
    let t = TestApp::new();
    let (_, admin) = t.user("op", 0, Role::Admin).await;

    let (status, body) = t
        .send(
            Method::POST,
            "/api/admin/market/items",
            Some(&admin),
            Some(json!({ "name": "Kit", "price": -1, "stock": 1, "category": "Paketler" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());

    let (status, _) = t
        .send(
            Method::POST,
            "/api/admin/market/items",
            Some(&admin),
            Some(json!({ "name": "Kit" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_item_lookup_is_404() {
    let t = TestApp::new();
    let (status, body) = t
        .send(
            Method::GET,
            &format!("/api/market/items/{}", uuid::Uuid::new_v4()),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "detail": "Ürün bulunamadı" }));
}

// Leaderboards

#[tokio::test]
async fn boards_reflect_sales() {
    let t = TestApp::new();
    let (_, steve) = t.user("steve", 100, Role::Member).await;
    let (_, alex) = t.user("alex", 100, Role::Member).await;
    let popular = t.item("Popular", "Paketler", 5, 10, 0.0).await;
    let niche = t.item("Niche", "Paketler", 5, 10, 0.0).await;

    t.send(Method::POST, &purchase_uri(niche), Some(&steve), None).await;
    t.send(Method::POST, &purchase_uri(popular), Some(&steve), None).await;
    t.send(Method::POST, &purchase_uri(popular), Some(&alex), None).await;

    let (_, best) = t.send(Method::GET, "/api/market/best-sellers", None, None).await;
    assert_eq!(best[0]["name"], "Popular");
    assert_eq!(best[1]["name"], "Niche");

    let (_, latest) = t
        .send(Method::GET, "/api/leaderboard/latest-purchases", None, None)
        .await;
    let latest = latest.as_array().unwrap();
    assert_eq!(latest.len(), 3);
    assert_eq!(latest[0]["username"], "alex");
    assert_eq!(latest[0]["item_name"], "Popular");
    assert_eq!(latest[0]["price_paid"], json!(5.0));
}

#[tokio::test]
async fn credit_board_ranks_balances() {
    let t = TestApp::new();
    t.user("steve", 15, Role::Member).await;
    t.user("alex", 250, Role::Member).await;
    for i in 0..11 {
        t.user(&format!("player{i}"), i, Role::Member).await;
    }

    let (status, board) = t.send(Method::GET, "/api/leaderboard/credits", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let board = board.as_array().unwrap();
    assert_eq!(board.len(), 10);
    assert_eq!(board[0]["username"], "alex");
    assert_eq!(board[0]["credit_balance"], json!(250.0));
    assert_eq!(board[1]["username"], "steve");
    assert!(board[0].get("id").is_none());
}

#[tokio::test]
async fn load_board_lists_newest_loads() {
    let t = TestApp::new();
    let (_, steve) = t.user("steve", 100, Role::Member).await;
    let (_, alex) = t.user("alex", 0, Role::Member).await;
    let item = t.item("Key", "Paketler", 5, 10, 0.0).await;

    for (token, amount) in [(&steve, 10), (&alex, 20)] {
        t.send(
            Method::POST,
            "/api/wallet/load",
            Some(token),
            Some(json!({ "amount": amount })),
        )
        .await;
    }
    // purchases are not loads
    t.send(Method::POST, &purchase_uri(item), Some(&steve), None).await;

    let (status, board) = t
        .send(Method::GET, "/api/leaderboard/latest-loads", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let board = board.as_array().unwrap();
    assert_eq!(board.len(), 2);
    assert_eq!(board[0]["username"], "alex");
    assert_eq!(board[0]["amount"], json!(20.0));
    assert_eq!(board[0]["status"], "pending");
    assert!(board[0]["timestamp"].is_string());
    assert_eq!(board[1]["username"], "steve");
}

// Concurrency

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_buyers_cannot_oversell() {
    let t = TestApp::new();
    let item = t.item("Dragon Egg", "Özel Eşyalar", 30, 1, 0.0).await;

    let mut buyers = Vec::new();
    for i in 0..20 {
        buyers.push(t.user(&format!("player{i}"), 100, Role::Member).await);
    }

    let handles: Vec<_> = buyers
        .iter()
        .map(|(_, token)| {
            let app = t.app.clone();
            let token = token.clone();
            tokio::spawn(async move {
                send(app, Method::POST, &purchase_uri(item), Some(&token), None).await
            })
        })
        .collect();

    let mut sold = 0;
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        match status {
            StatusCode::OK => sold += 1,
            StatusCode::BAD_REQUEST => assert_eq!(body["detail"], "Stok tükendi"),
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(sold, 1);
    assert_eq!(t.stock(item).await, 0);

    let mut total = Amount::ZERO;
    for (user, _) in &buyers {
        total += t.balance(*user).await;
    }
    assert_eq!(total, Amount::from_whole(20 * 100 - 30));
}
