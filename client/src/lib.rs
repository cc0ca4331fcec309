//! Headless client for the UrbanCart storefront backend.
//!
//! This crate owns the session/auth-refresh and cart-synchronization
//! subsystems: a shared HTTP client whose refresh pipeline makes transient
//! session expiry invisible to callers, an auth store holding the current
//! user, and a cart store that mirrors the server-authoritative cart.
//! Presentation layers (the CLI here, a web frontend elsewhere) sit on top
//! and only dispatch operations and read snapshots.

pub mod auth;
pub mod cart;
pub mod config;
pub mod error;
pub mod http;
pub mod types;

#[cfg(test)]
pub(crate) mod test_backend;

pub use auth::{AuthStore, SessionState};
pub use cart::CartStore;
pub use config::ClientConfig;
pub use error::{ApiError, ValidationErrors};
pub use http::ApiClient;
pub use types::{
    Cart, CartItem, Credentials, Order, PaymentOrder, PaymentVerification, ProductSummary,
    ProfileUpdate, ShippingDetails, SignupRequest, User,
};

use std::sync::Arc;

/// One wired-up storefront client: a single shared [`ApiClient`] feeding a
/// single [`AuthStore`] and [`CartStore`], so every consumer observes the
/// same session and the same cart snapshot.
pub struct Storefront {
    pub api: Arc<ApiClient>,
    pub auth: AuthStore,
    pub cart: CartStore,
}

impl Storefront {
    /// Build the client and both stores from one configuration.
    ///
    /// # Errors
    ///
    /// Fails only if the HTTP client cannot be constructed; see
    /// [`ApiClient::new`].
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let api = Arc::new(ApiClient::new(config)?);
        let auth = AuthStore::new(api.clone());
        let cart = CartStore::new(api.clone());
        Ok(Self { api, auth, cart })
    }

    /// Application-start sequence: prime CSRF, restore any existing
    /// session, and fetch the cart once a user is available.
    pub async fn start(&self) {
        self.api.bootstrap_csrf().await;
        self.auth.bootstrap().await;
        if self.auth.is_authenticated().await {
            if let Err(error) = self.cart.fetch().await {
                tracing::warn!(error = %error, "initial cart fetch failed");
            }
        }
    }

    /// Log out and reset the cart snapshot together, so no consumer can
    /// observe a logged-out session still holding a cart.
    pub async fn logout(&self) {
        self.auth.logout().await;
        self.cart.reset().await;
    }
}

#[cfg(test)]
#[path = "storefront_test.rs"]
mod tests;
