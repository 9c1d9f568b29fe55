//! Error types for the stitching gateway

use async_graphql::ErrorExtensions;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the gateway
///
/// Every failure the gateway can meet is one of these. None of them is allowed to
/// take the process down: discovery failures drop one endpoint for one reload,
/// execution failures become field errors, and assembly failures keep the
/// previously published schema.
#[derive(Error, Debug)]
pub enum Error {
    /// SDL parsing or schema assembly errors
    #[error("GraphQL schema error: {0}")]
    Schema(String),

    /// Schema discovery against a remote endpoint failed
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote service answered with GraphQL errors or a failure status
    #[error("Remote error: {0}")]
    Remote(String),

    /// A bounded remote call did not finish in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Invalid request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Middleware errors
    #[error("Middleware error: {0}")]
    Middleware(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// WebSocket errors
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// A subscription produced more undelivered events than its buffer holds
    #[error("Subscription buffer overflow: more than {0} undelivered events")]
    SubscriptionOverflow(usize),

    /// No schema has been published yet
    #[error("Gateway is not ready: no schema has been loaded yet")]
    NotReady,

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error("Error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(err.to_string())
    }
}

impl Error {
    /// Convert error to GraphQL error format
    pub fn to_graphql_error(&self) -> GraphQLError {
        GraphQLError {
            message: self.to_string(),
            path: None,
            extensions: self.extensions(),
        }
    }

    /// Convert into a field-level error for the async-graphql engine.
    pub fn to_field_error(&self) -> async_graphql::Error {
        let code = self.code();
        async_graphql::Error::new(self.to_string()).extend_with(|_, ext| ext.set("code", code))
    }

    /// Request-level error for responses produced without running the engine.
    pub fn to_server_error(&self) -> async_graphql::ServerError {
        let mut error = async_graphql::ServerError::new(self.to_string(), None);
        error.extensions = self.to_field_error().extensions;
        error
    }

    /// Stable error code reported in `extensions.code`
    pub fn code(&self) -> &'static str {
        match self {
            Error::Schema(_) => "SCHEMA_ERROR",
            Error::Discovery(_) => "DISCOVERY_ERROR",
            Error::Http(_) => "HTTP_ERROR",
            Error::Remote(_) => "REMOTE_ERROR",
            Error::Timeout(_) => "TIMEOUT",
            Error::InvalidRequest(_) => "INVALID_REQUEST",
            Error::Middleware(_) => "MIDDLEWARE_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Connection(_) => "CONNECTION_ERROR",
            Error::WebSocket(_) => "WEBSOCKET_ERROR",
            Error::SubscriptionOverflow(_) => "SUBSCRIPTION_OVERFLOW",
            Error::NotReady => "NOT_READY",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Other(_) => "UNKNOWN_ERROR",
        }
    }

    fn extensions(&self) -> std::collections::HashMap<String, serde_json::Value> {
        let mut map = std::collections::HashMap::new();
        map.insert("code".to_string(), serde_json::json!(self.code()));
        map
    }
}

/// GraphQL error response format
///
/// Used both for errors the gateway produces and for errors decoded from remote
/// responses, hence the optional `path`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub extensions: std::collections::HashMap<String, serde_json::Value>,
}

impl From<Error> for GraphQLError {
    fn from(err: Error) -> Self {
        err.to_graphql_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graphql_error_carries_code() {
        let err = Error::Timeout("http://a/graphql".into()).to_graphql_error();
        assert_eq!(err.extensions.get("code"), Some(&serde_json::json!("TIMEOUT")));
        assert!(err.message.contains("http://a/graphql"));
    }

    #[test]
    fn server_error_keeps_code() {
        let err = Error::NotReady.to_server_error();
        let json = serde_json::to_value(&err).expect("serializes");
        assert_eq!(json["extensions"]["code"], "NOT_READY");
    }

    #[test]
    fn remote_error_decodes_without_extensions() {
        let err: GraphQLError =
            serde_json::from_str(r#"{"message":"boom","path":["foo",0]}"#).expect("decodes");
        assert_eq!(err.message, "boom");
        assert_eq!(err.path.as_ref().map(Vec::len), Some(2));
        assert!(err.extensions.is_empty());
    }
}
