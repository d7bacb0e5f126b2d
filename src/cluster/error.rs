use std::fmt;

use thiserror::Error;

/// User-facing category of a remote failure.
///
/// The host picks its wording from this instead of re-deriving it from raw
/// status codes or transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 401/403: credentials cannot be fixed by retrying.
    Permission,
    /// DNS, refused connections, TLS and similar.
    Connectivity,
    Timeout,
    Other,
}

impl FailureKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => FailureKind::Permission,
            408 | 504 => FailureKind::Timeout,
            502 | 503 => FailureKind::Connectivity,
            _ => FailureKind::Other,
        }
    }

    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16());
        }
        if err.is_timeout() {
            return FailureKind::Timeout;
        }
        if err.is_connect() {
            return FailureKind::Connectivity;
        }
        Self::from_message(&err.to_string())
    }

    /// Best-effort classification of an opaque transport error message.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("unauthorized") || lower.contains("forbidden") {
            FailureKind::Permission
        } else if lower.contains("timed out") || lower.contains("timeout") {
            FailureKind::Timeout
        } else if lower.contains("dns")
            || lower.contains("connection refused")
            || lower.contains("connection reset")
            || lower.contains("no route to host")
            || lower.contains("failed to lookup address")
            || lower.contains("econnrefused")
            || lower.contains("enotfound")
        {
            FailureKind::Connectivity
        } else {
            FailureKind::Other
        }
    }

    /// Message suitable for a status bar or an inline error node.
    pub fn describe(self, detail: &dyn fmt::Display) -> String {
        match self {
            FailureKind::Permission => {
                "Permission denied: your credentials are not allowed to access this resource"
                    .to_string()
            }
            FailureKind::Connectivity => {
                "Cannot reach the cluster: check the server address and your network".to_string()
            }
            FailureKind::Timeout => {
                "Connection to the cluster timed out; will auto-reconnect".to_string()
            }
            FailureKind::Other => format!("Cluster request failed: {}", detail),
        }
    }
}

/// Failure of a change-feed subscription.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Network-level error (DNS, connection, TLS, body read)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Server answered the watch request with a non-2xx status
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// The watch request did not get a response in time
    #[error("Watch request timed out")]
    Timeout,
    /// A line of the event stream could not be decoded
    #[error("Malformed watch event: {0}")]
    Decode(String),
    /// A single event exceeded the size limit
    #[error("Watch event too large")]
    EventTooLarge,
    /// Any other transport failure, carried as text
    #[error("Transport error: {0}")]
    Transport(String),
}

impl WatchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            WatchError::HttpStatus(status) => Some(*status),
            WatchError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Authentication/authorization failures are never retried.
    ///
    /// Follows [`kind`](Self::kind), so a transport that only reports
    /// "Forbidden" as text is treated like a 403.
    pub fn is_auth_failure(&self) -> bool {
        self.kind() == FailureKind::Permission
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            WatchError::Network(e) => FailureKind::from_reqwest(e),
            WatchError::HttpStatus(status) => FailureKind::from_status(*status),
            WatchError::Timeout => FailureKind::Timeout,
            WatchError::Decode(_) | WatchError::EventTooLarge => FailureKind::Other,
            WatchError::Transport(msg) => FailureKind::from_message(msg),
        }
    }

    pub fn user_message(&self) -> String {
        self.kind().describe(self)
    }
}

/// Failure of a one-shot resource listing.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    #[error("Invalid response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Response too large")]
    ResponseTooLarge,
    #[error("Invalid server address: {0}")]
    InvalidServer(String),
}

impl ClientError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ClientError::Network(e) => FailureKind::from_reqwest(e),
            ClientError::HttpStatus(status) => FailureKind::from_status(*status),
            ClientError::Timeout => FailureKind::Timeout,
            ClientError::Decode(_) | ClientError::ResponseTooLarge => FailureKind::Other,
            ClientError::InvalidServer(_) => FailureKind::Connectivity,
        }
    }

    /// A list call is one-shot, so timeouts point at a manual retry.
    pub fn user_message(&self) -> String {
        match self.kind() {
            FailureKind::Timeout => {
                "Request to the cluster timed out; press r to retry".to_string()
            }
            kind => kind.describe(self),
        }
    }
}
