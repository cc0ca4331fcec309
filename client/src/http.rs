//! HTTP client with transparent session refresh.
//!
//! ARCHITECTURE
//! ============
//! All API traffic flows through one [`ApiClient`] holding a shared cookie
//! jar (the session credential is an HTTP-only cookie the client never
//! reads). A 401 on a non-exempt endpoint triggers a single-flight refresh:
//! the first failure performs `POST /auth/refresh/` on a bare twin client
//! while concurrent failures park on a waiter queue and share the outcome.
//! Each logical request carries an explicit attempt counter, so a request
//! is retried at most once after a refresh and never mutated in place.
//!
//! TRADE-OFFS
//! ==========
//! A failed refresh rejects the whole parked wave and broadcasts exactly
//! one login-required signal; callers re-authenticate rather than retry.

use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Mutex, broadcast, oneshot};

use crate::config::ClientConfig;
use crate::error::{ApiError, ValidationErrors};

/// Header carrying the CSRF token mirrored from the `csrftoken` cookie.
const CSRF_HEADER: &str = "X-CSRFToken";

/// A request gets one initial attempt plus at most one post-refresh retry.
const MAX_ATTEMPTS: u32 = 2;

/// Endpoints whose failures are never intercepted: their 401/400 responses
/// are authentication rejections, not expiry, and routing them through the
/// refresh path would recurse.
const REFRESH_EXEMPT_PATHS: [&str; 4] = ["/login", "/signup", "/refresh", "/auth/register/"];

// =============================================================================
// REQUEST MODEL
// =============================================================================

/// Re-issuable request body. Multipart forms are rebuilt per attempt since
/// a sent form cannot be replayed.
#[derive(Debug, Clone)]
pub enum Body {
    Empty,
    Json(Value),
    Multipart(Vec<(String, String)>),
}

/// A logical API request, buildable any number of times.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Body,
}

impl ApiRequest {
    #[must_use]
    pub fn get(path: &str) -> Self {
        Self { method: Method::GET, path: path.to_owned(), body: Body::Empty }
    }

    #[must_use]
    pub fn post(path: &str, body: Value) -> Self {
        Self { method: Method::POST, path: path.to_owned(), body: Body::Json(body) }
    }

    #[must_use]
    pub fn patch(path: &str, body: Value) -> Self {
        Self { method: Method::PATCH, path: path.to_owned(), body: Body::Json(body) }
    }

    #[must_use]
    pub fn delete(path: &str) -> Self {
        Self { method: Method::DELETE, path: path.to_owned(), body: Body::Empty }
    }

    #[must_use]
    pub fn post_multipart(path: &str, fields: Vec<(String, String)>) -> Self {
        Self { method: Method::POST, path: path.to_owned(), body: Body::Multipart(fields) }
    }

    /// Whether a 401 from this path propagates immediately instead of
    /// entering the refresh pipeline.
    #[must_use]
    pub fn is_refresh_exempt(&self) -> bool {
        REFRESH_EXEMPT_PATHS.iter().any(|exempt| self.path.contains(exempt))
    }
}

/// Explicit retry wrapper: the request plus how many attempts it has used.
/// Replaces the original design's hidden per-request retry flag.
#[derive(Debug)]
struct RequestAttempt {
    request: ApiRequest,
    attempt: u32,
    max_attempts: u32,
}

impl RequestAttempt {
    fn new(request: ApiRequest) -> Self {
        Self { request, attempt: 0, max_attempts: MAX_ATTEMPTS }
    }

    fn can_retry(&self) -> bool {
        self.attempt + 1 < self.max_attempts
    }

    fn record_retry(&mut self) {
        self.attempt += 1;
    }
}

// =============================================================================
// REFRESH GATE
// =============================================================================

/// Private single-flight state: whether a refresh is in flight, and the
/// requests parked behind it. Waiters receive the refresh outcome; a
/// failure reason is fanned out verbatim to every parked request.
#[derive(Default)]
struct RefreshGate {
    in_flight: bool,
    waiters: Vec<oneshot::Sender<Result<(), String>>>,
}

// =============================================================================
// API CLIENT
// =============================================================================

/// Shared HTTP client for the UrbanCart backend.
///
/// Construct once and share via `Arc`; the refresh gate and cookie jar are
/// process-wide by virtue of that sharing, not by global statics.
pub struct ApiClient {
    http: reqwest::Client,
    /// Twin client with identical configuration but no part in the retry
    /// pipeline; used only for the refresh call and CSRF priming so their
    /// own failures cannot recurse.
    bare: reqwest::Client,
    jar: Arc<Jar>,
    base_url: String,
    origin: Url,
    refresh: Mutex<RefreshGate>,
    login_required_tx: broadcast::Sender<()>,
}

impl ApiClient {
    /// Build a client for the configured base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidBaseUrl`] for an unparseable base URL and
    /// [`ApiError::Network`] if the underlying client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let origin = Url::parse(&config.base_url)
            .map_err(|_| ApiError::InvalidBaseUrl(config.base_url.clone()))?;
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder().cookie_provider(jar.clone()).build()?;
        let bare = reqwest::Client::builder().cookie_provider(jar.clone()).build()?;
        let (login_required_tx, _) = broadcast::channel(16);

        Ok(Self {
            http,
            bare,
            jar,
            base_url: config.base_url.clone(),
            origin,
            refresh: Mutex::new(RefreshGate::default()),
            login_required_tx,
        })
    }

    /// Subscribe to the login-required signal, emitted once per wave of
    /// failures whose refresh could not recover the session.
    #[must_use]
    pub fn login_required(&self) -> broadcast::Receiver<()> {
        self.login_required_tx.subscribe()
    }

    /// Prime the CSRF cookie. Fire-and-forget on application start;
    /// failures only mean mutating requests lack the header until login.
    pub async fn bootstrap_csrf(&self) {
        match self.bare.get(self.url("/auth/csrf/")).send().await {
            Ok(_) => tracing::debug!("csrf cookie primed"),
            Err(error) => tracing::debug!(error = %error, "csrf priming failed"),
        }
    }

    /// Execute a request through the refresh pipeline, returning the
    /// decoded JSON body of a successful response.
    ///
    /// # Errors
    ///
    /// See [`ApiError`]; a 401 on an exempt endpoint keeps any server
    /// message as [`ApiError::Server`], a 401 after the single retry
    /// surfaces as [`ApiError::Unauthorized`], and an unrecoverable
    /// refresh as [`ApiError::LoginRequired`].
    pub async fn execute(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let mut attempt = RequestAttempt::new(request);
        loop {
            let (status, body) = self.dispatch(&attempt.request).await?;
            if status.is_success() {
                return Ok(body);
            }
            if status != StatusCode::UNAUTHORIZED || attempt.request.is_refresh_exempt() {
                return Err(classify_failure(status, &body));
            }
            if !attempt.can_retry() {
                tracing::debug!(path = %attempt.request.path, "401 after retry, giving up");
                return Err(ApiError::Unauthorized);
            }
            self.refresh_session().await?;
            attempt.record_retry();
        }
    }

    /// `GET` returning a typed body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let body = self.execute(ApiRequest::get(path)).await?;
        Ok(serde_json::from_value(body)?)
    }

    /// `POST` with a JSON body, returning a typed body.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Value,
    ) -> Result<T, ApiError> {
        let body = self.execute(ApiRequest::post(path, body)).await?;
        Ok(serde_json::from_value(body)?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Mirror the `csrftoken` cookie into its header, if present in the jar.
    fn csrf_token(&self) -> Option<String> {
        let header = self.jar.cookies(&self.origin)?;
        let raw = header.to_str().ok()?;
        raw.split(';')
            .map(str::trim)
            .find_map(|pair| pair.strip_prefix("csrftoken="))
            .map(ToOwned::to_owned)
    }

    /// Send one attempt and read its status and JSON body. Network errors
    /// (no response at all) surface as `ApiError::Network`.
    async fn dispatch(&self, request: &ApiRequest) -> Result<(StatusCode, Value), ApiError> {
        let mut builder = self.http.request(request.method.clone(), self.url(&request.path));
        if requires_csrf(&request.method) {
            if let Some(token) = self.csrf_token() {
                builder = builder.header(CSRF_HEADER, token);
            }
        }
        builder = match &request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(value),
            Body::Multipart(fields) => {
                let mut form = reqwest::multipart::Form::new();
                for (name, value) in fields {
                    form = form.text(name.clone(), value.clone());
                }
                builder.multipart(form)
            }
        };

        let response = builder.send().await?;
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or_else(|_| Value::Null);
        Ok((status, body))
    }

    /// Refresh the session exactly once per wave of failures.
    ///
    /// The first caller becomes the leader and performs the refresh; every
    /// concurrent caller parks a waiter and adopts the leader's outcome.
    async fn refresh_session(&self) -> Result<(), ApiError> {
        let parked = {
            let mut gate = self.refresh.lock().await;
            if gate.in_flight {
                let (tx, rx) = oneshot::channel();
                gate.waiters.push(tx);
                Some(rx)
            } else {
                gate.in_flight = true;
                None
            }
        };

        if let Some(rx) = parked {
            return match rx.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(reason)) => Err(ApiError::LoginRequired(reason)),
                Err(_) => Err(ApiError::LoginRequired("refresh abandoned".to_owned())),
            };
        }

        let outcome = self.call_refresh().await;
        let waiters = {
            let mut gate = self.refresh.lock().await;
            gate.in_flight = false;
            std::mem::take(&mut gate.waiters)
        };

        match outcome {
            Ok(()) => {
                tracing::debug!(released = waiters.len(), "session refreshed");
                for waiter in waiters {
                    let _ = waiter.send(Ok(()));
                }
                Ok(())
            }
            Err(reason) => {
                tracing::warn!(error = %reason, parked = waiters.len(), "session refresh failed");
                for waiter in waiters {
                    let _ = waiter.send(Err(reason.clone()));
                }
                // One signal per failed wave, not one per parked request.
                let _ = self.login_required_tx.send(());
                Err(ApiError::LoginRequired(reason))
            }
        }
    }

    /// The refresh call itself, on the bare client. Network errors and
    /// rejections collapse into one failure reason: either way the session
    /// is unrecoverable without a fresh login.
    async fn call_refresh(&self) -> Result<(), String> {
        let mut builder = self.bare.post(self.url("/auth/refresh/"));
        if let Some(token) = self.csrf_token() {
            builder = builder.header(CSRF_HEADER, token);
        }
        let response = builder
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|error| error.to_string())?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.json::<Value>().await.unwrap_or_else(|_| Value::Null);
        Err(server_message(&body)
            .unwrap_or_else(|| format!("refresh rejected with status {}", status.as_u16())))
    }
}

// =============================================================================
// RESPONSE CLASSIFICATION
// =============================================================================

fn requires_csrf(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Pull a generic server message out of an error body, preferring the
/// conventional `error`/`detail`/`message` fields in that order.
fn server_message(body: &Value) -> Option<String> {
    ["error", "detail", "message"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str))
        .map(ToOwned::to_owned)
}

/// Map a non-success response onto the error taxonomy. A server-provided
/// message wins even on 401, so credential rejections from the exempt
/// auth endpoints keep their detail text instead of collapsing into the
/// generic unauthorized case.
fn classify_failure(status: StatusCode, body: &Value) -> ApiError {
    if let Some(message) = server_message(body) {
        return ApiError::Server { status: status.as_u16(), message };
    }
    if status == StatusCode::UNAUTHORIZED {
        return ApiError::Unauthorized;
    }
    if status == StatusCode::BAD_REQUEST {
        if let Some(errors) = ValidationErrors::from_body(body) {
            return ApiError::Validation(errors);
        }
    }
    ApiError::Server {
        status: status.as_u16(),
        message: status.canonical_reason().unwrap_or("request failed").to_owned(),
    }
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
