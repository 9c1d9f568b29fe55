//! Middleware support for the gateway
//!
//! Middlewares build the execution context attached to every operation. The
//! gateway trusts whatever they put there; remote calls read forwarded headers
//! from it.

use crate::error::Result;
use axum::http::{HeaderMap, Request};
use std::collections::HashMap;
use std::sync::Arc;

/// Context passed to middleware and attached to the executed operation
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Request headers and metadata
    pub headers: HeaderMap,

    /// Additional context data
    pub extensions: HashMap<String, serde_json::Value>,
}

impl Context {
    /// Create a new context from request
    pub fn from_request<B>(req: &Request<B>) -> Self {
        Self::from_headers(req.headers().clone())
    }

    /// Create a new context from headers alone
    pub fn from_headers(headers: HeaderMap) -> Self {
        Self {
            headers,
            extensions: HashMap::new(),
        }
    }

    /// Insert extension data
    pub fn insert(&mut self, key: String, value: serde_json::Value) {
        self.extensions.insert(key, value);
    }

    /// Get extension data
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.extensions.get(key)
    }
}

/// Middleware trait for processing requests
///
/// Middleware runs before an operation reaches the unified schema and can
/// reject it by returning an error.
///
/// # Example
///
/// ```rust
/// use graphql_stitching_gateway::middleware::{Middleware, Context};
/// use graphql_stitching_gateway::Result;
///
/// struct TenantMiddleware;
///
/// #[async_trait::async_trait]
/// impl Middleware for TenantMiddleware {
///     async fn call(&self, ctx: &mut Context) -> Result<()> {
///         ctx.insert("tenant".into(), serde_json::json!("acme"));
///         Ok(())
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait Middleware: Send + Sync {
    /// Process the request context
    async fn call(&self, ctx: &mut Context) -> Result<()>;
}

/// Run middlewares in order, stopping at the first error
pub async fn run_middlewares(middlewares: &[Arc<dyn Middleware>], ctx: &mut Context) -> Result<()> {
    for middleware in middlewares {
        middleware.call(ctx).await?;
    }
    Ok(())
}

/// Logging middleware
///
/// Logs incoming GraphQL requests using the `tracing` crate.
#[derive(Debug, Clone, Default)]
pub struct LoggingMiddleware;

#[async_trait::async_trait]
impl Middleware for LoggingMiddleware {
    async fn call(&self, ctx: &mut Context) -> Result<()> {
        tracing::debug!("Processing GraphQL request with headers: {:?}", ctx.headers);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct Tag(&'static str);

    #[async_trait::async_trait]
    impl Middleware for Tag {
        async fn call(&self, ctx: &mut Context) -> Result<()> {
            ctx.insert(self.0.to_string(), serde_json::json!(true));
            Ok(())
        }
    }

    struct Reject;

    #[async_trait::async_trait]
    impl Middleware for Reject {
        async fn call(&self, _ctx: &mut Context) -> Result<()> {
            Err(Error::Middleware("rejected".into()))
        }
    }

    #[tokio::test]
    async fn middlewares_run_in_order_until_one_fails() {
        let chain: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(LoggingMiddleware),
            Arc::new(Tag("first")),
            Arc::new(Reject),
            Arc::new(Tag("never")),
        ];
        let mut ctx = Context::default();

        let err = run_middlewares(&chain, &mut ctx).await.unwrap_err();
        assert!(matches!(err, Error::Middleware(_)));
        assert!(ctx.get("first").is_some());
        assert!(ctx.get("never").is_none());
    }
}
