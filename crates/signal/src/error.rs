//! Normalized error classification for provider failures.
//!
//! Providers never leak raw upstream errors past their boundary; every
//! failure is classified once, here, into an [`ErrorClass`]. Downstream
//! consumers (the send router, the supervisor) branch on the class alone
//! and never re-inspect a raw error code.

use serde::{Deserialize, Serialize};

/// Normalized failure category for a provider operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    RateLimit,
    TemplateError,
    ServerError,
    Timeout,
    InvalidPhone,
    AuthError,
    TemplateNotSupported,
    Other,
}

impl ErrorClass {
    /// Whether retrying the *same* provider makes sense at all.
    ///
    /// This is intrinsic to the class, independent of fallback configuration.
    pub fn retryable(&self) -> bool {
        matches!(self, Self::RateLimit | Self::ServerError | Self::Timeout)
    }

    /// Whether this class should cause the send router to move to the next
    /// candidate provider, given the configured trigger flags.
    ///
    /// `invalid_phone` and `auth_error` are never retried or failed over;
    /// `template_not_supported` is rejected synchronously before any
    /// provider is attempted, so it never reaches this decision either.
    pub fn triggers_fallback(&self, triggers: FallbackTriggers) -> bool {
        match self {
            Self::Timeout => triggers.timeout,
            Self::RateLimit => triggers.rate_limit,
            Self::TemplateError => triggers.template_error,
            Self::ServerError => triggers.server_error,
            Self::InvalidPhone
            | Self::AuthError
            | Self::TemplateNotSupported
            | Self::Other => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::TemplateError => "template_error",
            Self::ServerError => "server_error",
            Self::Timeout => "timeout",
            Self::InvalidPhone => "invalid_phone",
            Self::AuthError => "auth_error",
            Self::TemplateNotSupported => "template_not_supported",
            Self::Other => "other",
        }
    }

    /// Classify an HTTP status code from a provider response.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimit,
            401 | 403 => Self::AuthError,
            500..=599 => Self::ServerError,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which error classes currently trigger provider fallback.
///
/// Mirrors the `fallback.triggers.*` configuration options; constructed by
/// the `gateway` crate from `patch::FallbackConfig` so this crate stays
/// independent of the config-loading stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackTriggers {
    pub timeout: bool,
    pub rate_limit: bool,
    pub template_error: bool,
    pub server_error: bool,
}

impl Default for FallbackTriggers {
    fn default() -> Self {
        Self {
            timeout: true,
            rate_limit: true,
            template_error: true,
            server_error: true,
        }
    }
}

/// A classified send failure, carrying the class plus a human-readable
/// message for logging/surfacing to the admin API.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{class}: {message}")]
pub struct SendError {
    pub class: ErrorClass,
    pub message: String,
}

impl SendError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Timeout, message)
    }

    pub fn template_not_supported(provider: &str) -> Self {
        Self::new(
            ErrorClass::TemplateNotSupported,
            format!("{provider} does not support template sends"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classes() {
        assert!(ErrorClass::Timeout.retryable());
        assert!(ErrorClass::RateLimit.retryable());
        assert!(ErrorClass::ServerError.retryable());
        assert!(!ErrorClass::TemplateError.retryable());
        assert!(!ErrorClass::InvalidPhone.retryable());
        assert!(!ErrorClass::AuthError.retryable());
        assert!(!ErrorClass::TemplateNotSupported.retryable());
        assert!(!ErrorClass::Other.retryable());
    }

    #[test]
    fn invalid_phone_and_auth_never_fall_over() {
        let triggers = FallbackTriggers::default();
        assert!(!ErrorClass::InvalidPhone.triggers_fallback(triggers));
        assert!(!ErrorClass::AuthError.triggers_fallback(triggers));
        assert!(!ErrorClass::TemplateNotSupported.triggers_fallback(triggers));
    }

    #[test]
    fn default_triggers_are_all_on() {
        let triggers = FallbackTriggers::default();
        assert!(ErrorClass::Timeout.triggers_fallback(triggers));
        assert!(ErrorClass::RateLimit.triggers_fallback(triggers));
        assert!(ErrorClass::TemplateError.triggers_fallback(triggers));
        assert!(ErrorClass::ServerError.triggers_fallback(triggers));
    }

    #[test]
    fn trigger_flags_can_be_disabled() {
        let triggers = FallbackTriggers {
            server_error: false,
            ..FallbackTriggers::default()
        };
        assert!(!ErrorClass::ServerError.triggers_fallback(triggers));
        assert!(ErrorClass::Timeout.triggers_fallback(triggers));
    }

    #[test]
    fn http_status_classification() {
        assert_eq!(ErrorClass::from_http_status(429), ErrorClass::RateLimit);
        assert_eq!(ErrorClass::from_http_status(401), ErrorClass::AuthError);
        assert_eq!(ErrorClass::from_http_status(503), ErrorClass::ServerError);
        assert_eq!(ErrorClass::from_http_status(418), ErrorClass::Other);
    }
}
