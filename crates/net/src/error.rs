use thiserror::Error;

/// Failure taxonomy for every network-bound operation in the pipeline.
///
/// | Variant             | Transient | Typical cause                          |
/// |---------------------|-----------|----------------------------------------|
/// | `NoNetwork`         | yes       | connection refused / reset, DNS        |
/// | `Timeout`           | yes       | request deadline elapsed               |
/// | `ServerRejected`    | 5xx only  | non-2xx status from backend            |
/// | `MalformedResponse` | no        | undecodable body after fallbacks       |
/// | `Unauthorized`      | no        | 401 / 403                              |
/// | `NotConfigured`     | no        | operation needs absent configuration   |
/// | `LocalPersistence`  | no        | local read/write feeding a network op  |
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("no network connection")]
    NoNetwork,
    #[error("request timed out")]
    Timeout,
    #[error("server rejected request ({status}): {message}")]
    ServerRejected { status: u16, message: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("not configured: {0}")]
    NotConfigured(&'static str),
    #[error("local persistence failure: {0}")]
    LocalPersistence(String),
}

impl ApiError {
    /// Whether a retry could plausibly succeed.  4xx, auth, and decode
    /// failures short-circuit the attempt budget.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NoNetwork | Self::Timeout => true,
            Self::ServerRejected { status, .. } => *status >= 500,
            Self::MalformedResponse(_)
            | Self::Unauthorized
            | Self::NotConfigured(_)
            | Self::LocalPersistence(_) => false,
        }
    }

    /// Classify a non-2xx HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            401 | 403 => Self::Unauthorized,
            _ => Self::ServerRejected {
                status,
                message: message.into(),
            },
        }
    }

    /// Classify a reqwest transport failure.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::NoNetwork
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), err.to_string())
        } else {
            Self::NoNetwork
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
