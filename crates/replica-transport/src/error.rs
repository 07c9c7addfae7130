//! Transport error type.

use std::io;

/// Longest response body kept in an [`TransportError::Http`] error.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request (or reading its body) exceeded the configured timeout.
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("{url} returned HTTP {status}: {body}")]
    Http {
        url: String,
        status: u16,
        body: String,
    },

    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    #[error("malformed response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("GraphQL error from {url}: {message}")]
    GraphQL { url: String, message: String },
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }

    pub fn url(&self) -> &str {
        match self {
            TransportError::Timeout { url }
            | TransportError::Http { url, .. }
            | TransportError::Network { url, .. }
            | TransportError::Decode { url, .. }
            | TransportError::GraphQL { url, .. } => url,
        }
    }

    pub fn decode(url: &str, reason: impl ToString) -> Self {
        TransportError::Decode {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn from_ureq(url: &str, err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => {
                let mut body = response.into_string().unwrap_or_default();
                truncate_on_char_boundary(&mut body, MAX_ERROR_BODY);
                TransportError::Http {
                    url: url.to_string(),
                    status,
                    body,
                }
            }
            ureq::Error::Transport(transport) => {
                if transport_timed_out(&transport) {
                    TransportError::Timeout {
                        url: url.to_string(),
                    }
                } else {
                    TransportError::Network {
                        url: url.to_string(),
                        reason: transport.to_string(),
                    }
                }
            }
        }
    }

    pub(crate) fn from_io(url: &str, err: io::Error) -> Self {
        if is_timeout_kind(err.kind()) {
            TransportError::Timeout {
                url: url.to_string(),
            }
        } else {
            TransportError::Network {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

fn is_timeout_kind(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

fn transport_timed_out(transport: &ureq::Transport) -> bool {
    let mut source = std::error::Error::source(transport);
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            if is_timeout_kind(io_err.kind()) {
                return true;
            }
        }
        source = err.source();
    }
    transport.to_string().contains("timed out")
}

fn truncate_on_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}
