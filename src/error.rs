use crate::api;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the client.
///
/// Server-reported failures keep their problem document so callers can
/// match on the `type` urn (`badNonce`, `accountDoesNotExist`,
/// `agreementRequired`, ...).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The server answered with an `application/problem+json` document.
    #[error("ACME problem: {0}")]
    Problem(api::Problem),

    /// Non-2xx response without any usable body.
    #[error("HTTP error status {status}")]
    Http {
        /// Status code of the response.
        status: u16,
    },

    /// Non-2xx response carrying a parseable `Retry-After` header.
    ///
    /// The delay is advisory. The client never sleeps on it; polling is
    /// the caller's responsibility.
    #[error("server asked to retry after {seconds} seconds")]
    RetryAfter {
        /// Whole seconds until the server wants to see the next attempt.
        seconds: u64,
    },

    /// Failure inside the HTTP transport (connect, TLS, timeout,
    /// cancellation). The nonce consumed by the failed request is lost;
    /// the next call fetches a fresh one.
    #[error("transport error")]
    Transport(#[from] reqwest::Error),

    /// `HEAD newNonce` failed or its response lacked a `Replay-Nonce`
    /// header.
    #[error("could not obtain a replay nonce")]
    NonceUnavailable,

    /// An order was submitted without any identifiers.
    #[error("order contains no identifiers")]
    NoIdentifiers,

    /// Revocation reason code outside the RFC 5280 registry.
    #[error("invalid revocation reason code {0}")]
    InvalidReasonCode(usize),

    /// Certificate input that should be PEM did not parse.
    #[error("invalid PEM: {0}")]
    InvalidPem(String),

    /// A server timestamp did not parse as RFC 3339.
    #[error("{0}")]
    InvalidTimestamp(String),

    /// Malformed JSON in a server response, or a payload that failed to
    /// encode.
    #[error("JSON error")]
    Json(#[from] serde_json::Error),

    /// The server omitted a response header the protocol requires.
    #[error("missing response header: {0}")]
    MissingHeader(&'static str),

    /// A refreshed order listed different identifiers than the one it
    /// was created with.
    #[error("order identifier mismatch: {0}")]
    IdentifierMismatch(String),

    /// The operation needs server-side progress that has not happened
    /// yet (e.g. downloading a certificate from a non-`valid` order).
    #[error("not ready: {0}")]
    NotReady(&'static str),

    /// Key generation, decoding, or signing failure.
    #[error("key error: {0}")]
    Key(String),
}

impl From<api::Problem> for Error {
    fn from(problem: api::Problem) -> Error {
        Error::Problem(problem)
    }
}

impl Error {
    /// Problem document carried by this error, if it is a protocol
    /// error.
    pub fn problem(&self) -> Option<&api::Problem> {
        match self {
            Error::Problem(problem) => Some(problem),
            _ => None,
        }
    }

    /// Polling delay hint in seconds, if the server provided one.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Error::RetryAfter { seconds } => Some(*seconds),
            _ => None,
        }
    }
}
