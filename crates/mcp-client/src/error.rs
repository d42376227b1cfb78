//! Failure taxonomy for provider operations.
//!
//! Every failure that leaves this crate is a [`ClassifiedError`]: one of four
//! [`ErrorKind`]s plus a retryability flag. Foreign errors are mapped in by
//! [`classify`], which matches the lower-cased message against fixed keyword
//! sets.

use std::fmt;
use std::time::Duration;

/// Boxed error accepted by [`classify`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Keyword sets
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Checked first. Refusals, resets, unreachable hosts, broken pipes, rate
/// limiting and anything that just says "connection".
const CONNECTION_KEYWORDS: &[&str] = &[
    "econnrefused",
    "econnreset",
    "enotfound",
    "enetunreach",
    "ehostunreach",
    "epipe",
    "refused",
    "reset by peer",
    "unreachable",
    "broken pipe",
    "rate limit",
    "too many requests",
    "connection",
];

const TIMEOUT_KEYWORDS: &[&str] = &["etimedout", "timeout", "timed out", "deadline exceeded"];

const CONFIGURATION_KEYWORDS: &[&str] = &[
    "configuration",
    "config",
    "not configured",
    "no such file",
    "enoent",
];

const PROTOCOL_KEYWORDS: &[&str] = &[
    "protocol",
    "invalid",
    "malformed",
    "unexpected",
    "parse",
    "json-rpc",
];

/// Substrings that make an otherwise unflagged error retryable.
const RETRYABLE_MARKERS: &[&str] = &[
    "econnrefused",
    "econnreset",
    "etimedout",
    "enotfound",
    "enetunreach",
    "ehostunreach",
    "epipe",
    "timeout",
    "connection",
];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ErrorKind
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Closed failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Provider unreachable, refused or reset.
    Connection,
    /// Malformed request/response, unknown tool, missing handler.
    /// Also the bucket for anything unrecognised.
    Protocol,
    /// Operation exceeded its bound.
    Timeout,
    /// Malformed or missing descriptor.
    Configuration,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Configuration => "configuration",
        }
    }

    /// Match a message against the keyword sets, first hit wins.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        let hit = |set: &[&str]| set.iter().any(|k| lower.contains(k));

        if hit(CONNECTION_KEYWORDS) {
            ErrorKind::Connection
        } else if hit(TIMEOUT_KEYWORDS) {
            ErrorKind::Timeout
        } else if hit(CONFIGURATION_KEYWORDS) {
            ErrorKind::Configuration
        } else if hit(PROTOCOL_KEYWORDS) {
            ErrorKind::Protocol
        } else {
            ErrorKind::Protocol
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a message carries one of the network-style retryable markers.
pub fn is_retryable_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_MARKERS.iter().any(|m| lower.contains(m))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ClassifiedError
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where a failure happened, attached during classification.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub provider: Option<String>,
    pub tool: Option<String>,
}

impl ErrorContext {
    pub fn provider(name: impl Into<String>) -> Self {
        Self {
            provider: Some(name.into()),
            tool: None,
        }
    }

    pub fn tool(name: impl Into<String>) -> Self {
        Self {
            provider: None,
            tool: Some(name.into()),
        }
    }
}

/// A failure mapped onto the [`ErrorKind`] taxonomy.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub retryable: bool,
    /// Provider the failure originated from, when known.
    pub provider: Option<String>,
    /// Tool being resolved or invoked, when known.
    pub tool: Option<String>,
    /// Suggested wait before retrying.
    pub retry_after: Option<Duration>,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, retryable: bool, message: impl Into<String>) -> Self {
        Self {
            kind,
            retryable,
            provider: None,
            tool: None,
            retry_after: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, true, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, false, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, false, message)
    }

    /// An operation exceeded `bound`.
    pub fn timeout(operation: &str, bound: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            true,
            format!("{operation} timed out after {}ms", bound.as_millis()),
        )
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Prefix the message, keeping kind and flags.
    pub fn context(mut self, prefix: impl fmt::Display) -> Self {
        self.message = format!("{prefix}: {}", self.message);
        self
    }

    /// Re-label the failure as `kind`, keeping message and context.
    pub fn reclassify(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    fn fill_context(mut self, ctx: ErrorContext) -> Self {
        if self.provider.is_none() {
            self.provider = ctx.provider;
        }
        if self.tool.is_none() {
            self.tool = ctx.tool;
        }
        self
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// classify
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Map an arbitrary failure onto the taxonomy.
///
/// An error that is already a [`ClassifiedError`] keeps its kind and its
/// explicit retryable flag; only missing context is filled in. Anything
/// else is classified from its message.
pub fn classify(error: impl Into<BoxError>, ctx: ErrorContext) -> ClassifiedError {
    let error: BoxError = error.into();
    match error.downcast::<ClassifiedError>() {
        Ok(classified) => (*classified).fill_context(ctx),
        Err(other) => {
            let message = other.to_string();
            ClassifiedError {
                kind: ErrorKind::from_message(&message),
                retryable: is_retryable_message(&message),
                provider: None,
                tool: None,
                retry_after: None,
                message,
                source: Some(other),
            }
            .fill_context(ctx)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn econnrefused_is_retryable_connection() {
        let err = classify(io::Error::other("ECONNREFUSED"), ErrorContext::default());
        assert_eq!(err.kind, ErrorKind::Connection);
        assert!(err.retryable);
    }

    #[test]
    fn invalid_configuration_is_fatal_configuration() {
        let err = classify(
            io::Error::other("Invalid configuration"),
            ErrorContext::default(),
        );
        assert_eq!(err.kind, ErrorKind::Configuration);
        assert!(!err.retryable);
    }

    #[test]
    fn timeout_keywords() {
        assert_eq!(ErrorKind::from_message("request timed out"), ErrorKind::Timeout);
        assert_eq!(ErrorKind::from_message("ETIMEDOUT"), ErrorKind::Timeout);
        assert!(is_retryable_message("ETIMEDOUT"));
    }

    #[test]
    fn connection_takes_precedence_over_timeout() {
        assert_eq!(
            ErrorKind::from_message("connection timeout"),
            ErrorKind::Connection
        );
    }

    #[test]
    fn protocol_keywords_and_default_bucket() {
        assert_eq!(ErrorKind::from_message("malformed frame"), ErrorKind::Protocol);
        assert_eq!(ErrorKind::from_message("something odd"), ErrorKind::Protocol);
        assert!(!is_retryable_message("something odd"));
    }

    #[test]
    fn broken_pipe_is_connection() {
        let err = classify(
            io::Error::new(io::ErrorKind::BrokenPipe, "Broken pipe"),
            ErrorContext::provider("fs"),
        );
        assert_eq!(err.kind, ErrorKind::Connection);
        assert_eq!(err.provider.as_deref(), Some("fs"));
        // "broken pipe" is a connection keyword but not a retry marker.
        assert!(!err.retryable);
    }

    #[test]
    fn explicit_retryable_flag_wins() {
        let original = ClassifiedError::protocol("connection bookkeeping invalid");
        let err = classify(original, ErrorContext::tool("search"));
        assert_eq!(err.kind, ErrorKind::Protocol);
        assert!(!err.retryable);
        assert_eq!(err.tool.as_deref(), Some("search"));
    }

    #[test]
    fn existing_context_is_not_overwritten() {
        let original = ClassifiedError::connection("reset").with_provider("a");
        let err = classify(original, ErrorContext::provider("b"));
        assert_eq!(err.provider.as_deref(), Some("a"));
    }

    #[test]
    fn context_prefixes_message() {
        let err = ClassifiedError::configuration("bad url").context("failed to initialize");
        assert_eq!(err.to_string(), "failed to initialize: bad url");
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[test]
    fn timeout_constructor_names_operation_and_bound() {
        let err = ClassifiedError::timeout("tools/list", Duration::from_millis(250));
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.retryable);
        assert!(err.to_string().contains("tools/list"));
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn foreign_source_is_kept() {
        use std::error::Error as _;
        let err = classify(io::Error::other("ECONNRESET"), ErrorContext::default());
        assert!(err.source().is_some());
    }

    #[test]
    fn attached_source_is_exposed_through_error_chain() {
        use std::error::Error as _;
        let err = ClassifiedError::connection("provider 'fs' unreachable")
            .with_source(io::Error::other("connection refused"));
        assert_eq!(err.to_string(), "provider 'fs' unreachable");
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("connection refused"));
        assert!(ClassifiedError::protocol("bad frame").source().is_none());
    }
}
