//! Remote execution of delegated operations.
//!
//! Queries and mutations are POSTed as JSON to the endpoint url; subscriptions
//! run over graphql-transport-ws and are exposed as a [`RemoteStream`].

use crate::error::{Error, Result};
use crate::subscription::{self, BufferConfig, RemoteStream};
use crate::types::{GraphQLRequest, GraphQLResponse};
use crate::websocket;
use http::HeaderMap;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on one remote query or mutation
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait for `connection_ack` on a subscription socket
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings shared by every executor built in one reload cycle
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub request_timeout: Duration,
    pub ack_timeout: Duration,
    pub buffer: BufferConfig,
    /// Incoming request headers copied onto remote calls (lowercase names)
    pub forward_headers: Vec<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            buffer: BufferConfig::default(),
            forward_headers: Vec::new(),
        }
    }
}

impl ExecutorConfig {
    fn forwarded<'a>(
        &'a self,
        headers: Option<&'a HeaderMap>,
    ) -> impl Iterator<Item = (&'a str, &'a http::HeaderValue)> + 'a {
        headers.into_iter().flat_map(move |headers| {
            self.forward_headers
                .iter()
                .flat_map(move |name| headers.get_all(name.as_str()).iter().map(move |v| (name.as_str(), v)))
        })
    }
}

/// Sends documents to one remote endpoint.
///
/// Cheap to clone; the underlying HTTP client pools connections.
#[derive(Debug, Clone)]
pub struct RemoteExecutor {
    url: String,
    client: reqwest::Client,
    config: Arc<ExecutorConfig>,
}

impl RemoteExecutor {
    pub fn new(client: reqwest::Client, url: impl Into<String>, config: Arc<ExecutorConfig>) -> Self {
        Self {
            url: url.into(),
            client,
            config,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Execute a query or mutation document.
    ///
    /// Transport failures, timeouts and non-success statuses are errors; a
    /// response carrying GraphQL errors is returned as is.
    pub async fn execute(
        &self,
        request: &GraphQLRequest,
        headers: Option<&HeaderMap>,
    ) -> Result<GraphQLResponse> {
        let mut builder = self
            .client
            .post(&self.url)
            .timeout(self.config.request_timeout)
            .json(request);
        for (name, value) in self.config.forwarded(headers) {
            builder = builder.header(name, value.clone());
        }

        let response = builder.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Remote(format!("{} responded with {}", self.url, status)));
        }

        response
            .json::<GraphQLResponse>()
            .await
            .map_err(|e| self.transport_error(e))
    }

    /// Start a subscription document and return the pull side of it.
    pub async fn subscribe(
        &self,
        request: GraphQLRequest,
        headers: Option<&HeaderMap>,
    ) -> Result<RemoteStream<GraphQLResponse>> {
        let init_payload = {
            let forwarded: serde_json::Map<String, serde_json::Value> = self
                .config
                .forwarded(headers)
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.to_string(), serde_json::Value::String(v.to_string())))
                })
                .collect();
            (!forwarded.is_empty()).then_some(serde_json::Value::Object(forwarded))
        };

        let (sink, stream) = subscription::channel(self.config.buffer);
        websocket::subscribe(
            &self.url,
            request,
            init_payload,
            self.config.ack_timeout,
            sink,
        )
        .await?;
        Ok(stream)
    }

    fn transport_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout(self.url.clone())
        } else if err.is_connect() {
            Error::Connection(format!("{}: {}", self.url, err))
        } else {
            Error::Http(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn forwards_only_configured_headers() {
        let config = ExecutorConfig {
            forward_headers: vec!["authorization".into(), "x-request-id".into()],
            ..Default::default()
        };
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer t"));
        headers.insert("cookie", HeaderValue::from_static("secret"));

        let forwarded: Vec<_> = config
            .forwarded(Some(&headers))
            .map(|(name, value)| (name.to_string(), value.to_str().unwrap().to_string()))
            .collect();
        assert_eq!(forwarded, [("authorization".to_string(), "Bearer t".to_string())]);
        assert_eq!(config.forwarded(None).count(), 0);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_connection_error() {
        let executor = RemoteExecutor::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1/graphql",
            Arc::new(ExecutorConfig::default()),
        );
        let err = executor
            .execute(&GraphQLRequest::new("{ a }"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection(_) | Error::Http(_)), "{err:?}");
    }
}
