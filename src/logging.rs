//! Tracing setup and log sanitizing helpers.
//!
//! Provider API keys and bearer tokens must never reach the logs in full.

use std::fmt;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter};

/// Redacted view of a credential: the first 8 characters followed by `***`
#[derive(Clone, Debug)]
pub struct SensitiveApiKey<'a> {
    inner: &'a str,
}

impl<'a> SensitiveApiKey<'a> {
    /// ```
    /// use funnel_analyzer::logging::SensitiveApiKey;
    ///
    /// let key = "sk-ant-api123-abcdef123456";
    /// assert_eq!(format!("{}", SensitiveApiKey::new(key)), "sk-ant-a***");
    /// ```
    pub fn new(key: &'a str) -> Self {
        Self { inner: key }
    }
}

impl<'a> fmt::Display for SensitiveApiKey<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Count chars so a multi-byte key never splits mid-character
        let visible: String = self.inner.chars().take(8).collect();
        if visible.len() >= self.inner.len() {
            write!(f, "***")
        } else {
            write!(f, "{}***", visible)
        }
    }
}

/// Looks like a credential (`sk-`, `pk-`, a bearer header value, ...)
pub fn is_sensitive_key(value: &str) -> bool {
    const SENSITIVE_PREFIXES: &[&str] = &["sk-ant-", "sk-", "pk-", "sess-", "Bearer "];

    SENSITIVE_PREFIXES
        .iter()
        .any(|prefix| value.starts_with(prefix))
}

/// Mask every credential-looking word in free text (e.g. a provider error body)
pub fn redact_secrets(text: &str) -> String {
    let is_token_char = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';

    text.split_inclusive(char::is_whitespace)
        .map(|chunk| {
            let start = chunk.find(is_token_char).unwrap_or(chunk.len());
            let end = chunk.rfind(is_token_char).map_or(start, |i| i + 1).max(start);
            let token = &chunk[start..end];
            if is_sensitive_key(token) {
                format!(
                    "{}{}{}",
                    &chunk[..start],
                    SensitiveApiKey::new(token),
                    &chunk[end..]
                )
            } else {
                chunk.to_string()
            }
        })
        .collect()
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `level`. `format` is `text` or `json`.
pub fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if format == "json" {
        registry
            .with(subscriber_fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(subscriber_fmt::layer().with_target(true))
            .try_init()
    };

    if let Err(e) = result {
        eprintln!("Tracing already initialized: {}", e);
    }
}
