//! HTTP client for the accrual service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::api_types::AccrualReply;
use super::config::AccrualConfig;
use super::error::AccrualError;
use crate::domain::OrderNumber;

/// Port for accrual lookups, so workers can be tested without HTTP.
#[async_trait]
pub trait AccrualApi: Send + Sync {
    /// Ask the accrual service for its decision on one order.
    async fn check_order(&self, number: &OrderNumber) -> Result<AccrualReply, AccrualError>;
}

/// HTTP implementation of [`AccrualApi`].
///
/// Performs exactly one attempt per call; pacing and retry policy
/// belong to the worker pool, which owns the backoff semantics.
#[derive(Debug, Clone)]
pub struct AccrualClient {
    client: Client,
    base_url: String,
}

impl AccrualClient {
    /// Create a new client from config.
    ///
    /// # Errors
    ///
    /// Returns [`AccrualError::Transport`] if the underlying HTTP
    /// client cannot be built.
    pub fn new(config: &AccrualConfig) -> Result<Self, AccrualError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AccrualError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl AccrualApi for AccrualClient {
    async fn check_order(&self, number: &OrderNumber) -> Result<AccrualReply, AccrualError> {
        let url = format!("{}/api/orders/{}", self.base_url, number);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AccrualError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::OK => response
                .json::<AccrualReply>()
                .await
                .map_err(|e| AccrualError::Decode(e.to_string())),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(0);
                Err(AccrualError::RateLimited {
                    retry_after: Duration::from_secs(retry_after),
                })
            }
            status => Err(AccrualError::Unexpected {
                status: status.as_u16(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::accrual::api_types::AccrualStatus;

    fn number(raw: &str) -> OrderNumber {
        OrderNumber::parse(raw).unwrap()
    }

    fn client_for(server: &MockServer) -> AccrualClient {
        AccrualClient::new(&AccrualConfig::new(server.uri())).unwrap()
    }

    #[tokio::test]
    async fn ok_response_parses_decision() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/orders/9278923470"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "order": "9278923470",
                "status": "PROCESSED",
                "accrual": 500
            })))
            .mount(&server)
            .await;

        let reply = client_for(&server)
            .check_order(&number("9278923470"))
            .await
            .unwrap();

        assert_eq!(reply.order, "9278923470");
        assert_eq!(reply.status, AccrualStatus::Processed);
        assert_eq!(reply.accrual, dec!(500));
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/orders/9278923470"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .check_order(&number("9278923470"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AccrualError::RateLimited { retry_after } if retry_after == Duration::from_secs(30)
        ));
    }

    #[tokio::test]
    async fn rate_limit_without_header_suggests_zero_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/orders/9278923470"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .check_order(&number("9278923470"))
            .await
            .unwrap_err();

        assert_eq!(err.suggested_backoff(), Duration::ZERO);
        assert!(matches!(err, AccrualError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn unparseable_retry_after_suggests_zero_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/orders/9278923470"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "soon"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .check_order(&number("9278923470"))
            .await
            .unwrap_err();

        assert_eq!(err.suggested_backoff(), Duration::ZERO);
    }

    #[tokio::test]
    async fn server_error_is_unexpected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/orders/9278923470"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .check_order(&number("9278923470"))
            .await
            .unwrap_err();

        assert!(matches!(err, AccrualError::Unexpected { status: 500 }));
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/orders/9278923470"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .check_order(&number("9278923470"))
            .await
            .unwrap_err();

        assert!(matches!(err, AccrualError::Decode(_)));
    }
}
