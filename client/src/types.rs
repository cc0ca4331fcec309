//! Wire types for the UrbanCart REST API.
//!
//! DESIGN
//! ======
//! Every aggregate here is a deserialized snapshot of a server response.
//! The client performs no arithmetic on cart totals; they arrive
//! server-computed and are replaced wholesale on every refetch.

use serde::{Deserialize, Serialize};

// =============================================================================
// USER & ORDERS
// =============================================================================

/// The authenticated user, as returned by `POST /auth/user/`.
/// Owned exclusively by the auth store; cleared on logout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub is_seller: bool,
    /// Order history embedded in the who-am-I response.
    #[serde(default)]
    pub orders: Vec<Order>,
}

/// A past order summary embedded in the user payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub total_price: Option<f64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

// =============================================================================
// CART
// =============================================================================

/// Server-authoritative cart aggregate. Totals are computed server-side;
/// the locally held value is always the snapshot from the last successful
/// `GET /cart/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub items: Vec<CartItem>,
    #[serde(default)]
    pub total_items: u32,
    #[serde(default)]
    pub total_mrp: f64,
    #[serde(default)]
    pub total_discount: f64,
    #[serde(default)]
    pub total_price: f64,
}

impl Cart {
    /// The shape shown immediately after a successful clear, before the
    /// confirming refetch resolves.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            id: 0,
            items: Vec::new(),
            total_items: 0,
            total_mrp: 0.0,
            total_discount: 0.0,
            total_price: 0.0,
        }
    }
}

/// One line item in the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: i64,
    pub product: ProductSummary,
    #[serde(default)]
    pub selected_size: Option<String>,
    pub quantity: u32,
}

/// Product fields embedded in a cart line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub original_price: Option<f64>,
    #[serde(default)]
    pub discount_price: Option<f64>,
    #[serde(default)]
    pub discount_percentage: Option<f64>,
    #[serde(default)]
    pub discount_amount: Option<f64>,
}

// =============================================================================
// AUTH REQUESTS
// =============================================================================

/// Login request body for `POST /auth/login/`.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Registration request body for `POST /auth/register/`.
#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub password: String,
}

/// Partial profile update for `PATCH /auth/editUserProfile/`.
/// Only set fields are sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

// =============================================================================
// CHECKOUT & PAYMENT
// =============================================================================

/// Shipping fields posted (multipart) to the order and payment endpoints.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShippingDetails {
    pub shipping_name: String,
    pub shipping_phone: String,
    pub shipping_street: String,
    pub shipping_city: String,
    pub shipping_state: String,
    pub shipping_pincode: String,
}

impl ShippingDetails {
    /// Flatten into multipart text fields.
    #[must_use]
    pub fn as_form(&self) -> Vec<(String, String)> {
        vec![
            ("shipping_name".to_owned(), self.shipping_name.clone()),
            ("shipping_phone".to_owned(), self.shipping_phone.clone()),
            ("shipping_street".to_owned(), self.shipping_street.clone()),
            ("shipping_city".to_owned(), self.shipping_city.clone()),
            ("shipping_state".to_owned(), self.shipping_state.clone()),
            ("shipping_pincode".to_owned(), self.shipping_pincode.clone()),
        ]
    }
}

/// Gateway configuration returned by `POST /payment/create-order/`.
/// Drives the external checkout widget; creating it changes no local state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOrder {
    pub key: String,
    pub amount: f64,
    pub razorpay_order_id: String,
    #[serde(default)]
    pub callback_url: Option<String>,
}

/// Signed callback fields posted back by the payment widget.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentVerification {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

impl PaymentVerification {
    /// Flatten into multipart text fields.
    #[must_use]
    pub fn as_form(&self) -> Vec<(String, String)> {
        vec![
            ("razorpay_order_id".to_owned(), self.razorpay_order_id.clone()),
            ("razorpay_payment_id".to_owned(), self.razorpay_payment_id.clone()),
            ("razorpay_signature".to_owned(), self.razorpay_signature.clone()),
        ]
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
