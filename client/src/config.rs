//! Client configuration.

/// Default backend address for local development.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api";

/// Connection settings for [`crate::http::ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base URL, without a trailing slash. Paths are appended as-is.
    pub base_url: String,
}

impl ClientConfig {
    /// Build a config for the given base URL, normalizing trailing slashes.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self { base_url: base_url.trim_end_matches('/').to_owned() }
    }

    /// Read `URBANCART_API_URL`, falling back to [`DEFAULT_BASE_URL`].
    #[must_use]
    pub fn from_env() -> Self {
        let raw = std::env::var("URBANCART_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned());
        Self::new(&raw)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
