//! The unified error handling system for the gateway.

pub use auth::AuthError;
pub use types::ProxyError;

/// A unified `Result` type for the entire application.
pub type Result<T> = std::result::Result<T, ProxyError>;

pub mod auth;
pub mod macros;
pub mod types;

/// Attach a human readable context message to any error convertible into `ProxyError`.
pub trait Context<T, E> {
    #[track_caller]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display;

    #[track_caller]
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: std::fmt::Display;
}

impl<T, E> Context<T, E> for std::result::Result<T, E>
where
    E: Into<ProxyError>,
{
    #[track_caller]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display,
    {
        self.with_context(|| context)
    }

    #[track_caller]
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: std::fmt::Display,
    {
        match self {
            Ok(value) => Ok(value),
            Err(error) => Err(ProxyError::Context {
                context: context().to_string(),
                source: Box::new(error.into()),
            }),
        }
    }
}

/// Error category for logging and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Errors caused by the client (bad input, invalid credentials). 4xx.
    Client,
    /// Errors caused by the gateway or its dependencies. 5xx.
    Server,
}
