//! Errors raised while authorizing gateway requests and redeeming tokens.

use thiserror::Error;

/// Authentication and token errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The credential header was not sent.
    #[error("Gateway token was not provided")]
    TokenMissing,

    /// The token is well formed but not in the current whitelist.
    #[error("Access denied for the provided gateway token")]
    AccessDenied,

    /// Activation or access token not found, expired or already consumed.
    #[error("Invalid or expired token: {0}")]
    InvalidOrExpiredToken(String),
}

impl AuthError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::TokenMissing => "TOKEN_MISSING",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::InvalidOrExpiredToken(_) => "INVALID_TOKEN",
        }
    }
}
