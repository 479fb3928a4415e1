//! Downstream receivers of offloaded batches.
//!
//! A [`Receiver`] takes one batch for one category. The worker passes a route
//! index that grows by one per flush, so receivers with several addresses can
//! round-robin with `route_index % addresses.len()`.

use crate::point::Point;
use crate::types::Category;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a receiver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReceiverError {
    #[error("receiver answered HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to encode batch: {0}")]
    Encode(String),

    #[error("no receiver address configured")]
    NoAddress,
}

impl ReceiverError {
    /// 5xx answers and transport failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            ReceiverError::Status { status, .. } => (500..600).contains(status),
            ReceiverError::Transport(_) => true,
            ReceiverError::Encode(_) | ReceiverError::NoAddress => false,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Receiver: Send + Sync {
    /// Deliver one batch
    async fn send(
        &self,
        route_index: usize,
        category: Category,
        points: &[Point],
    ) -> Result<(), ReceiverError>;
}

/// Supported receiver kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiverKind {
    /// HTTP write API (`/v1/write/<category>`)
    #[default]
    Datakit,
}

impl std::str::FromStr for ReceiverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "datakit" | "http" => Ok(ReceiverKind::Datakit),
            other => Err(format!("unknown offload receiver: {}", other)),
        }
    }
}

/// Posts JSON batches to `http://{address}/v1/write/{category}`
#[derive(Debug, Clone)]
pub struct HttpReceiver {
    client: reqwest::Client,
    addresses: Vec<String>,
}

impl HttpReceiver {
    pub fn new(addresses: Vec<String>, timeout: Duration) -> Result<Self, ReceiverError> {
        if addresses.is_empty() {
            return Err(ReceiverError::NoAddress);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReceiverError::Transport(e.to_string()))?;
        Ok(Self { client, addresses })
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Write URL for a flush
    pub fn url(&self, route_index: usize, category: Category) -> String {
        let addr = &self.addresses[route_index % self.addresses.len()];
        let addr = addr
            .trim_start_matches("http://")
            .trim_start_matches("https://")
            .trim_end_matches('/');
        format!("http://{}{}", addr, category.url_path())
    }
}

#[async_trait]
impl Receiver for HttpReceiver {
    async fn send(
        &self,
        route_index: usize,
        category: Category,
        points: &[Point],
    ) -> Result<(), ReceiverError> {
        let body = serde_json::to_vec(points).map_err(|e| ReceiverError::Encode(e.to_string()))?;
        let url = self.url(route_index, category);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| ReceiverError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            tracing::trace!(url = %url, points = points.len(), "batch delivered");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ReceiverError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let server = ReceiverError::Status {
            status: 503,
            body: String::new(),
        };
        let client = ReceiverError::Status {
            status: 400,
            body: String::new(),
        };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert!(ReceiverError::Transport("reset".into()).is_retryable());
        assert!(!ReceiverError::Encode("x".into()).is_retryable());
    }

    #[test]
    fn test_route_index_round_robin() {
        let recv = HttpReceiver::new(
            vec!["10.0.0.1:9529".into(), "http://10.0.0.2:9529/".into()],
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            recv.url(0, Category::Logging),
            "http://10.0.0.1:9529/v1/write/logging"
        );
        assert_eq!(
            recv.url(1, Category::Metric),
            "http://10.0.0.2:9529/v1/write/metric"
        );
        assert_eq!(
            recv.url(2, Category::RUM),
            "http://10.0.0.1:9529/v1/write/rum"
        );
    }

    #[test]
    fn test_empty_addresses_rejected() {
        assert_eq!(
            HttpReceiver::new(Vec::new(), Duration::from_secs(1)).unwrap_err(),
            ReceiverError::NoAddress
        );
    }

    #[test]
    fn test_receiver_kind_parse() {
        assert_eq!("DataKit".parse::<ReceiverKind>(), Ok(ReceiverKind::Datakit));
        assert!("kafka".parse::<ReceiverKind>().is_err());
    }
}
