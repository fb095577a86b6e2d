//! HTTP transport for JSON candle endpoints.

use std::time::Duration;

use candles_core::SourceError;
use serde_json::Value;
use tracing::debug;

/// Performs one GET request and decodes the JSON body.
pub trait KlineTransport {
    fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, SourceError>;
}

/// Blocking `reqwest` transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Build a client with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("local-candles/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Request(e.to_string()))?;

        Ok(Self { client })
    }
}

impl KlineTransport for HttpTransport {
    fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, SourceError> {
        debug!(url, ?query, "GET");

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(|e| SourceError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .map_err(|e| SourceError::Decode(e.to_string()))
    }
}
