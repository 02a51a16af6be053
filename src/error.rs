use thiserror::Error;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the library
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection refused, reset, broken body and similar network failures.
    #[error("Transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Request timed out: {url}")]
    Timeout { url: String },

    /// The server answered with a non-success status.
    #[error("API returned {status} for {url}")]
    Api { status: u16, url: String },

    #[error("Unexpected response shape: {0}")]
    Validation(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid timestamp format: {0}")]
    InvalidTimestamp(String),
}

impl Error {
    /// Whether a request that failed with this error may succeed if repeated.
    ///
    /// Only transport and timeout failures qualify; an HTTP error status is
    /// an answer from the server and is surfaced immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Timeout { .. })
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            let url = err
                .url()
                .map(|u| u.to_string())
                .unwrap_or_else(|| "<unknown>".to_string());
            return Error::Timeout { url };
        }
        if let Some(status) = err.status() {
            let url = err.url().map(|u| u.to_string()).unwrap_or_default();
            return Error::Api {
                status: status.as_u16(),
                url,
            };
        }
        if err.is_decode() {
            return Error::Validation(err.to_string());
        }
        Error::Transport(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_failures_are_transient() {
        let timeout = Error::Timeout {
            url: "http://localhost/x".to_string(),
        };
        assert!(timeout.is_transient());

        let api = Error::Api {
            status: 500,
            url: "http://localhost/x".to_string(),
        };
        assert!(!api.is_transient());
        assert!(!Error::Validation("missing dados".to_string()).is_transient());
        assert!(!Error::Config("bad".to_string()).is_transient());
    }

    #[test]
    fn test_api_error_message_names_status_and_url() {
        let err = Error::Api {
            status: 404,
            url: "https://example.org/proposicoes/1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "API returned 404 for https://example.org/proposicoes/1"
        );
    }
}
