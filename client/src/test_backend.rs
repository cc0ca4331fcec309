//! In-process stub of the UrbanCart REST backend, used by the store and
//! pipeline tests. Session validity is a server-side toggle (cookie
//! contents are ignored) so tests can expire a session at will, and the
//! refresh endpoint counts its calls for single-flight assertions.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};

use axum::Router;
use axum::extract::{Json, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use serde_json::{Value, json};

pub const VALID_PASSWORD: &str = "hunter2";

#[derive(Clone)]
pub struct StubItem {
    pub id: i64,
    pub product_id: i64,
    pub name: String,
    pub selected_size: Option<String>,
    pub quantity: u32,
    pub original_price: f64,
    pub discount_price: f64,
}

pub struct BackendState {
    /// Whether the access credential currently authenticates requests.
    pub session_valid: AtomicBool,
    /// Whether `POST /auth/refresh/` succeeds at all.
    pub refresh_ok: AtomicBool,
    /// Whether a successful refresh restores `session_valid`. Turned off
    /// to simulate a backend that accepts the refresh but still rejects
    /// the replayed request.
    pub refresh_restores: AtomicBool,
    pub refresh_calls: AtomicUsize,
    pub refresh_delay_ms: AtomicU64,
    pub update_calls: AtomicUsize,
    pub logout_fails: AtomicBool,
    pub whoami_fails: AtomicBool,
    pub verify_ok: AtomicBool,
    /// CSRF header observed on the last cart mutation.
    pub last_csrf: Mutex<Option<String>>,
    items: Mutex<Vec<StubItem>>,
    next_item_id: AtomicI64,
    profile: Mutex<Value>,
}

impl BackendState {
    fn new() -> Self {
        Self {
            session_valid: AtomicBool::new(false),
            refresh_ok: AtomicBool::new(true),
            refresh_restores: AtomicBool::new(true),
            refresh_calls: AtomicUsize::new(0),
            refresh_delay_ms: AtomicU64::new(0),
            update_calls: AtomicUsize::new(0),
            logout_fails: AtomicBool::new(false),
            whoami_fails: AtomicBool::new(false),
            verify_ok: AtomicBool::new(true),
            last_csrf: Mutex::new(None),
            items: Mutex::new(Vec::new()),
            next_item_id: AtomicI64::new(1),
            profile: Mutex::new(json!({
                "id": 1,
                "username": "asha",
                "email": "asha@example.com",
                "phone": "9999999999",
                "city": "Pune",
                "state": "MH",
                "address": "12 MG Road",
                "is_seller": false,
            })),
        }
    }

    pub fn seed_item(&self, product_id: i64, name: &str, size: Option<&str>, quantity: u32) -> i64 {
        let id = self.next_item_id.fetch_add(1, Ordering::SeqCst);
        self.items.lock().unwrap().push(StubItem {
            id,
            product_id,
            name: name.to_owned(),
            selected_size: size.map(ToOwned::to_owned),
            quantity,
            original_price: 1499.0,
            discount_price: 819.0,
        });
        id
    }

    pub fn item_quantity(&self, item_id: i64) -> Option<u32> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .find(|item| item.id == item_id)
            .map(|item| item.quantity)
    }

    pub fn cart_body(&self) -> Value {
        let items = self.items.lock().unwrap();
        cart_json(&items)
    }

    fn session_guard(&self) -> Result<(), Response> {
        if self.session_valid.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({ "detail": "Authentication credentials were not provided." })),
            )
                .into_response())
        }
    }
}

/// Bind the stub on an ephemeral port; returns the shared state and the
/// client base URL (including the `/api` prefix).
pub async fn spawn() -> (Arc<BackendState>, String) {
    let state = Arc::new(BackendState::new());
    let app = router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (state, format!("http://{addr}/api"))
}

fn router(state: Arc<BackendState>) -> Router {
    let api = Router::new()
        .route("/auth/csrf/", get(csrf))
        .route("/auth/login/", post(login))
        .route("/auth/refresh/", post(refresh))
        .route("/auth/logout/", post(logout))
        .route("/auth/user/", post(who_am_i))
        .route("/auth/register/", post(register))
        .route("/auth/editUserProfile/", patch(edit_profile))
        .route("/auth/delete-account/", delete(delete_account))
        .route("/auth/reset-password/", post(reset_password))
        .route("/auth/reset-password/confirm/", post(reset_password_confirm))
        .route("/cart/", get(view_cart))
        .route("/cart/add/", post(add_to_cart))
        .route("/cart/update/{item_id}/", post(update_quantity))
        .route("/cart/remove/{item_id}/", delete(remove_item))
        .route("/cart/clear/", delete(clear_cart))
        .route("/order/place/", post(place_order))
        .route("/payment/create-order/", post(create_payment_order))
        .route("/payment/verify/", post(verify_payment));

    Router::new().nest("/api", api).with_state(state)
}

fn cart_json(items: &[StubItem]) -> Value {
    let total_items: u32 = items.iter().map(|i| i.quantity).sum();
    let total_mrp: f64 = items.iter().map(|i| i.original_price * f64::from(i.quantity)).sum();
    let total_price: f64 = items.iter().map(|i| i.discount_price * f64::from(i.quantity)).sum();
    json!({
        "id": 1,
        "items": items.iter().map(|i| json!({
            "id": i.id,
            "product": {
                "id": i.product_id,
                "name": i.name,
                "slug": format!("product-{}", i.product_id),
                "thumbnail": null,
                "original_price": i.original_price,
                "discount_price": i.discount_price,
                "discount_percentage": 45.0,
                "discount_amount": i.original_price - i.discount_price,
            },
            "selected_size": i.selected_size,
            "quantity": i.quantity,
        })).collect::<Vec<_>>(),
        "total_items": total_items,
        "total_mrp": total_mrp,
        "total_discount": total_mrp - total_price,
        "total_price": total_price,
    })
}

async fn csrf() -> impl IntoResponse {
    (
        [(header::SET_COOKIE, "csrftoken=stub-csrf; Path=/")],
        Json(json!({ "detail": "CSRF cookie set" })),
    )
}

async fn login(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Response {
    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();
    if email.ends_with("@nowhere.com") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "No active account found with the given credentials" })),
        )
            .into_response();
    }
    let password = body.get("password").and_then(Value::as_str).unwrap_or_default();
    if password != VALID_PASSWORD {
        return (StatusCode::BAD_REQUEST, Json(json!({ "detail": "Invalid credentials" })))
            .into_response();
    }
    state.session_valid.store(true, Ordering::SeqCst);
    (
        [(header::SET_COOKIE, "sessionid=stub-session; Path=/; HttpOnly")],
        Json(json!({ "detail": "Login successful" })),
    )
        .into_response()
}

async fn refresh(State(state): State<Arc<BackendState>>) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let delay = state.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
    }
    if !state.refresh_ok.load(Ordering::SeqCst) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Token is invalid or expired" })),
        )
            .into_response();
    }
    if state.refresh_restores.load(Ordering::SeqCst) {
        state.session_valid.store(true, Ordering::SeqCst);
    }
    Json(json!({ "detail": "refreshed" })).into_response()
}

async fn logout(State(state): State<Arc<BackendState>>) -> Response {
    if state.logout_fails.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "logout failed" })))
            .into_response();
    }
    state.session_valid.store(false, Ordering::SeqCst);
    Json(json!({ "detail": "Logged out" })).into_response()
}

async fn who_am_i(State(state): State<Arc<BackendState>>) -> Response {
    if let Err(denied) = state.session_guard() {
        return denied;
    }
    if state.whoami_fails.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "profile unavailable" })))
            .into_response();
    }
    let mut user = state.profile.lock().unwrap().clone();
    user["orders"] = json!([
        { "id": 1, "status": "DELIVERED", "total_price": 1499.0, "created_at": "2025-11-02T10:00:00Z" }
    ]);
    Json(user).into_response()
}

async fn register(Json(body): Json<Value>) -> Response {
    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();
    if email.ends_with("@taken.com") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "email": ["user with this email already exists.", "second email error"],
                "phone": ["invalid phone number"],
            })),
        )
            .into_response();
    }
    (StatusCode::CREATED, Json(json!({ "message": "User registered successfully." }))).into_response()
}

async fn edit_profile(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Response {
    if let Err(denied) = state.session_guard() {
        return denied;
    }
    if let Value::Object(updates) = body {
        let mut profile = state.profile.lock().unwrap();
        for (key, value) in updates {
            profile[key] = value;
        }
    }
    Json(json!({ "message": "profile updated" })).into_response()
}

async fn delete_account(State(state): State<Arc<BackendState>>) -> Response {
    if let Err(denied) = state.session_guard() {
        return denied;
    }
    state.session_valid.store(false, Ordering::SeqCst);
    Json(json!({ "message": "account deleted" })).into_response()
}

async fn reset_password() -> impl IntoResponse {
    Json(json!({ "message": "reset link sent" }))
}

async fn reset_password_confirm() -> impl IntoResponse {
    Json(json!({ "message": "password reset" }))
}

async fn view_cart(State(state): State<Arc<BackendState>>) -> Response {
    if let Err(denied) = state.session_guard() {
        return denied;
    }
    Json(state.cart_body()).into_response()
}

async fn add_to_cart(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(denied) = state.session_guard() {
        return denied;
    }
    *state.last_csrf.lock().unwrap() = headers
        .get("X-CSRFToken")
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned);

    let Some(product_id) = body.get("product_id").and_then(Value::as_i64) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "product_id is required" })))
            .into_response();
    };
    let selected_size = body
        .get("selected_size")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned);

    let mut items = state.items.lock().unwrap();
    if let Some(existing) = items
        .iter_mut()
        .find(|i| i.product_id == product_id && i.selected_size == selected_size)
    {
        existing.quantity += 1;
    } else {
        let id = state.next_item_id.fetch_add(1, Ordering::SeqCst);
        items.push(StubItem {
            id,
            product_id,
            name: format!("Product {product_id}"),
            selected_size,
            quantity: 1,
            original_price: 1499.0,
            discount_price: 819.0,
        });
    }
    Json(json!({ "message": "Added to cart" })).into_response()
}

async fn update_quantity(
    State(state): State<Arc<BackendState>>,
    Path(item_id): Path<i64>,
    Json(body): Json<Value>,
) -> Response {
    state.update_calls.fetch_add(1, Ordering::SeqCst);
    if let Err(denied) = state.session_guard() {
        return denied;
    }
    let quantity = body.get("quantity").and_then(Value::as_u64).unwrap_or(0);
    let mut items = state.items.lock().unwrap();
    let Some(item) = items.iter_mut().find(|i| i.id == item_id) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not found." }))).into_response();
    };
    item.quantity = u32::try_from(quantity).unwrap_or(item.quantity);
    Json(json!({ "message": "quantity updated" })).into_response()
}

async fn remove_item(State(state): State<Arc<BackendState>>, Path(item_id): Path<i64>) -> Response {
    if let Err(denied) = state.session_guard() {
        return denied;
    }
    state.items.lock().unwrap().retain(|i| i.id != item_id);
    Json(json!({ "message": "Product removed" })).into_response()
}

async fn clear_cart(State(state): State<Arc<BackendState>>) -> Response {
    if let Err(denied) = state.session_guard() {
        return denied;
    }
    state.items.lock().unwrap().clear();
    Json(json!({ "message": "Cart cleared" })).into_response()
}

async fn place_order(State(state): State<Arc<BackendState>>) -> Response {
    if let Err(denied) = state.session_guard() {
        return denied;
    }
    let mut items = state.items.lock().unwrap();
    if items.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Cart is empty" }))).into_response();
    }
    items.clear();
    Json(json!({ "order_id": "ORD-1001", "message": "Order placed" })).into_response()
}

async fn create_payment_order(State(state): State<Arc<BackendState>>) -> Response {
    if let Err(denied) = state.session_guard() {
        return denied;
    }
    let total: f64 = state
        .items
        .lock()
        .unwrap()
        .iter()
        .map(|i| i.discount_price * f64::from(i.quantity))
        .sum();
    Json(json!({
        "key": "rzp_test_key",
        "amount": total,
        "razorpay_order_id": "order_stub_1",
        "callback_url": "https://example.com/payment/callback/",
    }))
    .into_response()
}

async fn verify_payment(State(state): State<Arc<BackendState>>) -> Response {
    if let Err(denied) = state.session_guard() {
        return denied;
    }
    if !state.verify_ok.load(Ordering::SeqCst) {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Payment verification failed" })))
            .into_response();
    }
    state.items.lock().unwrap().clear();
    Json(json!({ "message": "Payment verified" })).into_response()
}
