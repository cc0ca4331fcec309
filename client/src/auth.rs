//! Auth session store.
//!
//! DESIGN
//! ======
//! The session credential lives in an HTTP-only cookie the client never
//! sees; the only client-side representation of "logged in" is a `User`
//! obtained from the backend. `is_authenticated` is therefore derived from
//! the held `User`, never tracked as a separate boolean that could drift.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::json;
use tokio::sync::RwLock;

use crate::error::ApiError;
use crate::http::{ApiClient, ApiRequest};
use crate::types::{Credentials, ProfileUpdate, SignupRequest, User};

/// Session lifecycle. `Unknown` means the start-up who-am-I check has not
/// run yet; `Checking` that it is in flight.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SessionState {
    #[default]
    Unknown,
    Checking,
    Authenticated(User),
    Anonymous,
}

/// Process-wide auth state. Construct once and share.
pub struct AuthStore {
    api: Arc<ApiClient>,
    state: RwLock<SessionState>,
    /// Set for the lifetime of a logout so the start-up session check
    /// cannot race it and re-authenticate the user it just cleared.
    logging_out: AtomicBool,
}

impl AuthStore {
    #[must_use]
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api, state: RwLock::new(SessionState::Unknown), logging_out: AtomicBool::new(false) }
    }

    /// Current state snapshot.
    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    /// The held user, if authenticated.
    pub async fn current_user(&self) -> Option<User> {
        match &*self.state.read().await {
            SessionState::Authenticated(user) => Some(user.clone()),
            _ => None,
        }
    }

    /// Derived predicate: authenticated exactly when a `User` is held.
    pub async fn is_authenticated(&self) -> bool {
        matches!(&*self.state.read().await, SessionState::Authenticated(_))
    }

    /// Start-up session restore: ask the backend who we are. A session
    /// cookie may or may not exist; an expired one is repaired by the
    /// refresh pipeline before this resolves. Suppressed mid-logout.
    pub async fn bootstrap(&self) {
        if self.logging_out.load(Ordering::SeqCst) {
            return;
        }
        *self.state.write().await = SessionState::Checking;
        match self.who_am_i().await {
            Ok(user) => {
                tracing::info!(username = %user.username, "session restored");
                *self.state.write().await = SessionState::Authenticated(user);
            }
            Err(error) => {
                tracing::debug!(error = %error, "no restorable session");
                *self.state.write().await = SessionState::Anonymous;
            }
        }
    }

    /// Log in, then immediately fetch the full user to populate the store.
    ///
    /// # Errors
    ///
    /// Surfaces the server's rejection (`detail` message or field errors)
    /// without retrying; the state remains `Anonymous`.
    pub async fn login(&self, credentials: &Credentials) -> Result<User, ApiError> {
        let login = self
            .api
            .execute(ApiRequest::post(
                "/auth/login/",
                json!({ "email": credentials.email, "password": credentials.password }),
            ))
            .await;
        if let Err(error) = login {
            *self.state.write().await = SessionState::Anonymous;
            return Err(error);
        }

        // A half-established session (login ok, who-am-I failed) must not
        // leave a previously held user visible over the new cookies.
        let user = match self.who_am_i().await {
            Ok(user) => user,
            Err(error) => {
                *self.state.write().await = SessionState::Anonymous;
                return Err(error);
            }
        };
        *self.state.write().await = SessionState::Authenticated(user.clone());
        tracing::info!(username = %user.username, "logged in");
        Ok(user)
    }

    /// Register a new account. Does not authenticate; the caller is
    /// expected to log in afterwards. Field-level validation errors come
    /// back as [`ApiError::Validation`].
    pub async fn signup(&self, request: &SignupRequest) -> Result<(), ApiError> {
        self.api
            .execute(ApiRequest::post("/auth/register/", serde_json::to_value(request)?))
            .await?;
        Ok(())
    }

    /// Log out. The server call is best-effort: the local session is
    /// cleared unconditionally so the caller can never be left looking
    /// authenticated after requesting a logout.
    pub async fn logout(&self) {
        self.logging_out.store(true, Ordering::SeqCst);
        if let Err(error) = self.api.execute(ApiRequest::post("/auth/logout/", json!({}))).await {
            tracing::warn!(error = %error, "server logout failed, clearing local session anyway");
        }
        *self.state.write().await = SessionState::Anonymous;
    }

    /// Partial profile update, then a full refetch so the held `User`
    /// matches the server exactly.
    ///
    /// # Errors
    ///
    /// Field errors surface per-field; the held user is left unchanged.
    pub async fn edit_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        self.api
            .execute(ApiRequest::patch("/auth/editUserProfile/", serde_json::to_value(update)?))
            .await?;
        let user = self.who_am_i().await?;
        *self.state.write().await = SessionState::Authenticated(user.clone());
        Ok(user)
    }

    /// Delete the account. Requires an authenticated session; returns
    /// `false` (state untouched) on rejection, and logs out on success.
    pub async fn delete_account(&self) -> bool {
        if !self.is_authenticated().await {
            return false;
        }
        match self.api.execute(ApiRequest::delete("/auth/delete-account/")).await {
            Ok(_) => {
                self.logout().await;
                true
            }
            Err(error) => {
                tracing::warn!(error = %error, "account deletion failed");
                false
            }
        }
    }

    /// Ask the backend to mail a password-reset link. Stateless.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), ApiError> {
        self.api
            .execute(ApiRequest::post("/auth/reset-password/", json!({ "email": email })))
            .await?;
        Ok(())
    }

    /// Complete a password reset with the mailed uid and token. Stateless.
    pub async fn confirm_password_reset(
        &self,
        uid: &str,
        token: &str,
        new_password: &str,
        confirm_new_password: &str,
    ) -> Result<(), ApiError> {
        self.api
            .execute(ApiRequest::post(
                "/auth/reset-password/confirm/",
                json!({
                    "uid": uid,
                    "token": token,
                    "new_password": new_password,
                    "confirm_new_password": confirm_new_password,
                }),
            ))
            .await?;
        Ok(())
    }

    async fn who_am_i(&self) -> Result<User, ApiError> {
        self.api.post_json("/auth/user/", json!({})).await
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
