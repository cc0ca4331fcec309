//! Error taxonomy for API calls.
//!
//! ERROR HANDLING
//! ==============
//! Transport-level session expiry is repaired inside the request pipeline
//! and only surfaces here when recovery is impossible (`LoginRequired`).
//! Everything else maps onto the categories the UI needs: field-level
//! validation, business errors with a server message, and connectivity.

use std::fmt;

use serde_json::Value;

/// Error returned by every API operation.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No response was received at all. Never auto-retried.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A 401 the refresh pipeline did not repair and the server gave no
    /// message for: either the endpoint is exempt from interception, or
    /// the request already used its retry.
    #[error("authentication required")]
    Unauthorized,

    /// The session refresh itself failed; the caller must re-authenticate.
    /// Carries the refresh failure description.
    #[error("session refresh failed: {0}")]
    LoginRequired(String),

    /// A 400 with a field-to-messages map from the server.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// Business error with a server-provided message.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The response body did not match the expected shape.
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// A response field the operation depends on was absent.
    #[error("missing expected field `{0}`")]
    MissingField(&'static str),

    /// The configured base URL could not be parsed.
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

impl ApiError {
    /// User-displayable message, preferring server-provided text.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => "Network error. Please check your connection.".to_owned(),
            Self::Unauthorized => "Please log in to continue.".to_owned(),
            Self::LoginRequired(_) => "Session expired. Please log in again.".to_owned(),
            Self::Validation(errors) => errors
                .first()
                .map_or_else(|| "Please check the submitted fields.".to_owned(), ToOwned::to_owned),
            Self::Server { message, .. } => message.clone(),
            Self::Decode(_) | Self::MissingField(_) => {
                "Something went wrong. Please try again.".to_owned()
            }
            Self::InvalidBaseUrl(url) => format!("Invalid API address: {url}"),
        }
    }
}

/// Server validation errors: field name to the list of messages for it,
/// in response order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: Vec<(String, Vec<String>)>,
}

impl ValidationErrors {
    /// Parse a 400 response body of the `{"field": ["msg", ...]}` shape.
    /// Returns `None` when the body is not a field map (e.g. a plain
    /// `{"detail": "..."}` rejection).
    #[must_use]
    pub fn from_body(body: &Value) -> Option<Self> {
        let map = body.as_object()?;
        let mut fields = Vec::new();
        for (name, value) in map {
            // Generic-message keys are business errors, not field errors.
            if matches!(name.as_str(), "error" | "detail" | "message") {
                continue;
            }
            let messages: Vec<String> = match value {
                Value::String(s) => vec![s.clone()],
                Value::Array(items) => items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToOwned::to_owned)
                    .collect(),
                _ => continue,
            };
            if !messages.is_empty() {
                fields.push((name.clone(), messages));
            }
        }
        if fields.is_empty() { None } else { Some(Self { fields }) }
    }

    /// First message for the first offending field, the string the
    /// presentation layer shows.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.fields
            .first()
            .and_then(|(_, messages)| messages.first())
            .map(String::as_str)
    }

    /// First message recorded for a specific field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .and_then(|(_, messages)| messages.first())
            .map(String::as_str)
    }

    /// All `(field, messages)` pairs in response order.
    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields
            .iter()
            .map(|(field, messages)| (field.as_str(), messages.as_slice()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fields.first() {
            Some((field, messages)) => {
                write!(f, "{field}: {}", messages.first().map_or("invalid", String::as_str))
            }
            None => write!(f, "invalid input"),
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
