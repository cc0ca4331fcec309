//! Cart synchronizer.
//!
//! DESIGN
//! ======
//! The server owns the cart. Every mutation follows the same contract:
//! issue the request, and on success refetch the whole cart and replace
//! the local snapshot; on failure leave the snapshot untouched. No totals
//! are ever derived locally.
//!
//! Mutations are serialized through a per-store lock so two overlapping
//! operations cannot interleave their mutate/refetch pairs and land a
//! stale snapshot on top of a newer one. This is deliberately stronger
//! than the fire-and-refetch original, which accepted last-refetch-wins.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock};

use crate::error::ApiError;
use crate::http::{ApiClient, ApiRequest};
use crate::types::{Cart, PaymentOrder, PaymentVerification, ShippingDetails};

/// Process-wide cart state. Construct once and share.
pub struct CartStore {
    api: Arc<ApiClient>,
    /// Snapshot of the server cart after the last successful fetch.
    /// `None` until a user session exists.
    cart: RwLock<Option<Cart>>,
    /// Serializes mutate-then-refetch sequences.
    mutation: Mutex<()>,
}

impl CartStore {
    #[must_use]
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api, cart: RwLock::new(None), mutation: Mutex::new(()) }
    }

    /// The locally held snapshot, if any.
    pub async fn snapshot(&self) -> Option<Cart> {
        self.cart.read().await.clone()
    }

    /// Drop the cached snapshot. Called on logout.
    pub async fn reset(&self) {
        *self.cart.write().await = None;
    }

    /// Fetch the authoritative cart. Intended to run once a user session
    /// is established; a 401 here is not a cart error — the refresh
    /// pipeline either repaired the session already or signalled
    /// login-required, so it is silently ignored.
    pub async fn fetch(&self) -> Result<(), ApiError> {
        match self.api.get_json::<Cart>("/cart/").await {
            Ok(cart) => {
                *self.cart.write().await = Some(cart);
                Ok(())
            }
            Err(ApiError::Unauthorized | ApiError::LoginRequired(_)) => {
                tracing::debug!("cart fetch skipped, no authenticated session");
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    /// Add a product to the cart. A size must already be chosen; products
    /// without sizes pass `None`.
    pub async fn add_item(&self, product_id: i64, selected_size: Option<&str>) -> Result<(), ApiError> {
        let _guard = self.mutation.lock().await;
        self.api
            .execute(ApiRequest::post(
                "/cart/add/",
                json!({ "product_id": product_id, "selected_size": selected_size }),
            ))
            .await?;
        self.refetch().await
    }

    /// Raise an item's quantity by one. Posts the absolute target value.
    pub async fn increment(&self, item_id: i64, current_qty: u32) -> Result<(), ApiError> {
        self.update_quantity(item_id, current_qty + 1).await
    }

    /// Lower an item's quantity by one. A no-op at quantity 1 or below:
    /// no request is issued, so the server can never see a non-positive
    /// quantity.
    pub async fn decrement(&self, item_id: i64, current_qty: u32) -> Result<(), ApiError> {
        if current_qty <= 1 {
            return Ok(());
        }
        self.update_quantity(item_id, current_qty - 1).await
    }

    /// Remove a line item entirely.
    pub async fn remove_item(&self, item_id: i64) -> Result<(), ApiError> {
        let _guard = self.mutation.lock().await;
        self.api.execute(ApiRequest::delete(&format!("/cart/remove/{item_id}/"))).await?;
        self.refetch().await
    }

    /// Delete every item. The local snapshot flips to the empty shape
    /// immediately, then the refetch confirms it against the server.
    pub async fn clear(&self) -> Result<(), ApiError> {
        let _guard = self.mutation.lock().await;
        self.api.execute(ApiRequest::delete("/cart/clear/")).await?;
        *self.cart.write().await = Some(Cart::empty());
        self.refetch().await
    }

    /// Place a cash-on-delivery order. On success the cart is cleared and
    /// refetched, and the server's order identifier is returned for the
    /// caller to navigate with.
    ///
    /// # Errors
    ///
    /// Business rejections (e.g. insufficient stock) surface with the
    /// server's message; the snapshot is left unchanged.
    pub async fn place_order(&self, shipping: &ShippingDetails) -> Result<String, ApiError> {
        let _guard = self.mutation.lock().await;
        let body = self
            .api
            .execute(ApiRequest::post_multipart("/order/place/", shipping.as_form()))
            .await?;
        let order_id = order_id_from(&body).ok_or(ApiError::MissingField("order_id"))?;
        tracing::info!(%order_id, "order placed");
        *self.cart.write().await = Some(Cart::empty());
        self.refetch().await?;
        Ok(order_id)
    }

    /// Open a payment-gateway order for the current cart. A boundary
    /// call: the returned configuration drives the external widget and no
    /// local state changes.
    pub async fn create_payment_order(
        &self,
        shipping: &ShippingDetails,
    ) -> Result<PaymentOrder, ApiError> {
        let body = self
            .api
            .execute(ApiRequest::post_multipart("/payment/create-order/", shipping.as_form()))
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    /// Post the gateway's signed callback fields. On success the cart is
    /// cleared and refetched; on failure the error is returned so the
    /// caller can keep the checkout retryable.
    pub async fn verify_payment(&self, verification: &PaymentVerification) -> Result<(), ApiError> {
        let _guard = self.mutation.lock().await;
        self.api
            .execute(ApiRequest::post_multipart("/payment/verify/", verification.as_form()))
            .await?;
        *self.cart.write().await = Some(Cart::empty());
        self.refetch().await
    }

    async fn update_quantity(&self, item_id: i64, quantity: u32) -> Result<(), ApiError> {
        let _guard = self.mutation.lock().await;
        self.api
            .execute(ApiRequest::post(
                &format!("/cart/update/{item_id}/"),
                json!({ "quantity": quantity }),
            ))
            .await?;
        tracing::info!(item_id, quantity, "cart quantity updated");
        self.refetch().await
    }

    /// Replace the snapshot with the server's current cart.
    async fn refetch(&self) -> Result<(), ApiError> {
        let cart = self.api.get_json::<Cart>("/cart/").await?;
        *self.cart.write().await = Some(cart);
        Ok(())
    }
}

/// Order identifiers arrive as a string or a number depending on the
/// endpoint; normalize to a string for navigation.
fn order_id_from(body: &Value) -> Option<String> {
    match body.get("order_id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[path = "cart_test.rs"]
mod tests;
