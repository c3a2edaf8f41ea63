use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Production ingest endpoint used by [`crate::Client::new`].
pub const DEFAULT_ENDPOINT: &str = "https://ingest.waypulse.io/v1/write";

/// Default buffer capacity (measurements per batch).
pub const DEFAULT_CAPACITY: usize = 10;

/// Default interval between automatic flush attempts.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Default per-request transport timeout.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("endpoint address is required but empty")]
    EndpointMissing,

    #[error("endpoint is not a valid URL: {0}")]
    EndpointInvalidUrl(String),
}

/// Validated construction parameters for a client and its HTTP sink.
///
/// The credential pair and the TLS flag are forwarded to the sink untouched;
/// the dispatch core itself only reads `capacity` and `flush_interval`.
#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: Url,
    pub api_key: String,
    pub api_secret: String,
    pub capacity: usize,
    pub flush_interval: Duration,
    pub write_timeout: Duration,
    pub accept_invalid_certs: bool,
}

pub(crate) fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::EndpointMissing);
    }
    Url::parse(raw).map_err(|_| ConfigError::EndpointInvalidUrl(raw.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_endpoint_is_rejected() {
        let err = parse_endpoint("").unwrap_err();
        assert!(matches!(err, ConfigError::EndpointMissing));
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let err = parse_endpoint("not a url").unwrap_err();
        assert!(matches!(err, ConfigError::EndpointInvalidUrl(raw) if raw == "not a url"));
    }

    #[test]
    fn valid_endpoint_parses() {
        let url = parse_endpoint("http://localhost:8100/v1/write").unwrap();
        assert_eq!(url.path(), "/v1/write");
    }

    #[test]
    fn default_endpoint_is_valid() {
        parse_endpoint(DEFAULT_ENDPOINT).unwrap();
    }
}
