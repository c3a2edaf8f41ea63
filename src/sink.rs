use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::Config;

pub const HEADER_API_KEY: &str = "x-waypulse-api-key";
pub const HEADER_API_SECRET: &str = "x-waypulse-api-secret";

/// Transport consumed by the dispatch core.
///
/// One `send` call is one write attempt: the sink never retries, and the
/// core never resends a batch it has handed over.
pub trait MetricSink: Send + Sync + 'static {
    fn send(&self, payload: Bytes) -> impl Future<Output = Result<(), SinkError>> + Send + '_;

    /// Adjust the per-write timeout. Sinks without a tunable timeout accept
    /// the call and ignore it.
    fn set_write_timeout(&mut self, timeout: Duration) -> Result<(), SinkError> {
        let _ = timeout;
        Ok(())
    }

    /// Release any resources held by the sink.
    fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{result} with code {code}")]
    Rejected { code: i64, result: String },

    #[error("bad code {status} response: {body}")]
    MalformedResponse { status: u16, body: String },
}

/// Response envelope returned by the collection endpoint.
#[derive(Debug, Deserialize)]
struct WriteAck {
    code: i64,
    result: String,
}

/// HTTP transport: a single POST per batch, credentials in two custom
/// headers, and a JSON `{code, result}` acknowledgement body.
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
    api_secret: String,
}

impl HttpSink {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.write_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        }
    }
}

impl MetricSink for HttpSink {
    async fn send(&self, payload: Bytes) -> Result<(), SinkError> {
        let resp = self
            .client
            .post(self.endpoint.clone())
            .header("content-type", "application/json")
            .header(HEADER_API_KEY, &self.api_key)
            .header(HEADER_API_SECRET, &self.api_secret)
            .body(payload)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body = resp.text().await?;
        debug!(status, bytes = body.len(), "collector responded");
        parse_ack(status, &body)
    }
}

/// The collector acknowledges every write with a JSON envelope, success or
/// not. A body that does not parse as the envelope is an error even on
/// HTTP 200; a non-200 status surfaces the envelope's own code and message.
fn parse_ack(status: u16, body: &str) -> Result<(), SinkError> {
    let ack: WriteAck =
        serde_json::from_str(body).map_err(|_| SinkError::MalformedResponse {
            status,
            body: body.to_owned(),
        })?;

    if status == 200 {
        Ok(())
    } else {
        Err(SinkError::Rejected {
            code: ack.code,
            result: ack.result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_ok() {
        parse_ack(200, r#"{"code":200,"result":"ok"}"#).unwrap();
    }

    #[test]
    fn ack_rejection_composes_envelope_fields() {
        let err = parse_ack(400, r#"{"code":400,"result":"batch too large"}"#).unwrap_err();
        assert!(
            matches!(&err, SinkError::Rejected { code: 400, result } if result == "batch too large")
        );
        assert_eq!(err.to_string(), "batch too large with code 400");
    }

    #[test]
    fn ack_malformed_body_on_success_status() {
        let err = parse_ack(200, "<html>gateway</html>").unwrap_err();
        assert!(matches!(err, SinkError::MalformedResponse { status: 200, .. }));
    }

    #[test]
    fn ack_malformed_body_on_error_status() {
        let err = parse_ack(502, "").unwrap_err();
        assert!(
            matches!(&err, SinkError::MalformedResponse { status: 502, body } if body.is_empty())
        );
    }

    #[test]
    fn ack_extra_fields_are_ignored() {
        parse_ack(200, r#"{"code":200,"result":"ok","accepted":12}"#).unwrap();
    }
}
