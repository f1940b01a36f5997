// Error types for the Chassis framework

use crate::HttpStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Injection engine errors. All four are caller configuration errors:
    // they are surfaced as-is and never retried or downgraded.
    #[error("no producer registered for binding: {0}")]
    UndefinedBinding(String),

    #[error("producer stack underflow for binding: {0}")]
    StackUnderflow(String),

    #[error("binding mismatch for {0}")]
    BindingMismatch(String),

    #[error("invalid registration: {0}")]
    InvalidRegistration(String),

    // Routing errors
    #[error("invalid route: {0}")]
    InvalidRoute(String),

    #[error("route not found: {0}")]
    RouteNotFound(String),

    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    // HTTP client errors
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    // HTTP server errors
    #[error("internal server error: {0}")]
    Internal(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::RouteNotFound(_) | Error::NotFound(_) => HttpStatus::NotFound.code(),
            Error::MethodNotAllowed(_) => HttpStatus::MethodNotAllowed.code(),
            Error::BadRequest(_) | Error::Deserialization(_) => HttpStatus::BadRequest.code(),
            Error::Unauthorized(_) => HttpStatus::Unauthorized.code(),
            Error::Forbidden(_) => HttpStatus::Forbidden.code(),
            Error::Conflict(_) => HttpStatus::Conflict.code(),
            Error::PayloadTooLarge(_) => HttpStatus::PayloadTooLarge.code(),
            Error::UnsupportedMediaType(_) => HttpStatus::UnsupportedMediaType.code(),
            Error::NotImplemented(_) => HttpStatus::NotImplemented.code(),
            Error::ServiceUnavailable(_) => HttpStatus::ServiceUnavailable.code(),

            // Engine and infrastructure errors are server-side bugs.
            _ => HttpStatus::InternalServerError.code(),
        }
    }

    /// Get the HttpStatus enum for this error
    pub fn http_status(&self) -> HttpStatus {
        HttpStatus::from_code(self.status_code()).unwrap_or(HttpStatus::InternalServerError)
    }

    /// Response headers implied by this error.
    ///
    /// A 401 challenges the client for basic credentials.
    pub fn headers(&self) -> Vec<(&'static str, &'static str)> {
        match self {
            Error::Unauthorized(_) => vec![("WWW-Authenticate", "Basic realm=Restricted")],
            _ => vec![],
        }
    }

    /// The JSON body a dispatcher should render for this error, if any.
    ///
    /// Client errors carry their reason back to the caller; server-side
    /// errors surface only a status code so internals do not leak.
    pub fn response_body(&self) -> Option<serde_json::Value> {
        if !self.is_client_error() {
            return None;
        }
        let reason = match self {
            Error::BadRequest(msg)
            | Error::Unauthorized(msg)
            | Error::Forbidden(msg)
            | Error::NotFound(msg)
            | Error::Conflict(msg)
            | Error::PayloadTooLarge(msg)
            | Error::UnsupportedMediaType(msg)
            | Error::Deserialization(msg) => msg.clone(),
            other => other.to_string(),
        };
        if reason.is_empty() {
            return None;
        }
        Some(serde_json::json!({
            "result": "failure",
            "reason": reason,
        }))
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.http_status().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.http_status().is_server_error()
    }
}
