//! Runtime support for GraphQL gateway - HTTP and WebSocket integration.

use crate::error::{GraphQLError, Result};
use crate::gateway::Gateway;
use crate::middleware::{run_middlewares, Context, Middleware};
use async_graphql::http::ALL_WEBSOCKET_PROTOCOLS;
use async_graphql::ServerError;
use async_graphql_axum::{GraphQLProtocol, GraphQLRequest, GraphQLResponse, GraphQLWebSocket};
use axum::{
    extract::{State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// ServeMux - main gateway handler
///
/// The `ServeMux` handles the routing of GraphQL requests, executing middlewares,
/// and invoking whichever schema the gateway currently publishes. It can be
/// converted into an Axum router.
pub struct ServeMux {
    gateway: Gateway,
    middlewares: Vec<Arc<dyn Middleware>>,
    error_handler: Option<Arc<dyn Fn(Vec<GraphQLError>) + Send + Sync>>,
}

impl ServeMux {
    /// Create a new ServeMux serving the gateway's published schema
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway,
            middlewares: Vec::new(),
            error_handler: None,
        }
    }

    /// Add middleware to the execution pipeline
    ///
    /// Middlewares are executed in the order they are added.
    pub fn add_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    /// Use middleware (builder pattern)
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.add_middleware(middleware);
        self
    }

    /// Set error handler from an `Arc` for cases where the caller already shares ownership.
    pub fn set_error_handler_arc(&mut self, handler: Arc<dyn Fn(Vec<GraphQLError>) + Send + Sync>) {
        self.error_handler = Some(handler);
    }

    /// Set error handler
    pub fn set_error_handler<F>(&mut self, handler: F)
    where
        F: Fn(Vec<GraphQLError>) + Send + Sync + 'static,
    {
        self.set_error_handler_arc(Arc::new(handler));
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    async fn context(&self, headers: HeaderMap) -> Result<Context> {
        let mut ctx = Context::from_headers(headers);
        run_middlewares(&self.middlewares, &mut ctx).await?;
        Ok(ctx)
    }

    async fn execute_with_middlewares(
        &self,
        headers: HeaderMap,
        request: GraphQLRequest,
    ) -> Result<async_graphql::Response> {
        let ctx = self.context(headers).await?;
        let request = request.into_inner().data(ctx);
        Ok(self.gateway.execute(request).await)
    }

    /// Handle GraphQL HTTP request
    ///
    /// This method executes the request pipeline:
    /// 1. Creates a context from headers
    /// 2. Runs all middlewares
    /// 3. Executes the request against the published schema
    /// 4. Hands any errors to the error handler
    pub async fn handle_http(
        &self,
        headers: HeaderMap,
        request: GraphQLRequest,
    ) -> GraphQLResponse {
        match self.execute_with_middlewares(headers, request).await {
            Ok(resp) => {
                if !resp.errors.is_empty() {
                    self.report(&resp.errors);
                }
                resp.into()
            }
            Err(err) => {
                let server_err = err.to_server_error();
                self.report(std::slice::from_ref(&server_err));
                async_graphql::Response::from_errors(vec![server_err]).into()
            }
        }
    }

    fn report(&self, errors: &[ServerError]) {
        let Some(handler) = &self.error_handler else {
            return;
        };
        let errors = errors
            .iter()
            .filter_map(|e| serde_json::to_value(e).ok())
            .filter_map(|e| serde_json::from_value::<GraphQLError>(e).ok())
            .collect();
        handler(errors);
    }

    /// Convert to Axum router
    pub fn into_router(self) -> Router {
        let state = Arc::new(self);

        Router::new()
            .route(
                "/graphql",
                axum::routing::post(handle_graphql_post).get(graphql_playground),
            )
            .route("/graphql/ws", get(handle_graphql_ws))
            .route("/health", get(health))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive()),
            )
            .with_state(state)
    }
}

impl Clone for ServeMux {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            middlewares: self.middlewares.clone(),
            error_handler: self.error_handler.clone(),
        }
    }
}

/// Handler for POST requests to /graphql
async fn handle_graphql_post(
    State(mux): State<Arc<ServeMux>>,
    headers: HeaderMap,
    request: GraphQLRequest,
) -> impl IntoResponse {
    mux.handle_http(headers, request).await
}

/// Upgrade to a GraphQL WebSocket session.
///
/// The session keeps the schema that was published when it opened; reloads
/// only affect sessions opened afterwards.
async fn handle_graphql_ws(
    State(mux): State<Arc<ServeMux>>,
    headers: HeaderMap,
    protocol: GraphQLProtocol,
    upgrade: WebSocketUpgrade,
) -> Response {
    let Some(schema) = mux.gateway.schema() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "no schema loaded yet").into_response();
    };
    let ctx = match mux.context(headers).await {
        Ok(ctx) => ctx,
        Err(err) => {
            tracing::debug!(error = %err, "websocket session rejected by middleware");
            return (StatusCode::FORBIDDEN, err.to_string()).into_response();
        }
    };

    let mut data = async_graphql::Data::default();
    data.insert(mux.gateway.clone());
    data.insert(ctx);

    upgrade
        .protocols(ALL_WEBSOCKET_PROTOCOLS)
        .on_upgrade(move |socket| {
            GraphQLWebSocket::new(socket, schema.executor(), protocol)
                .with_data(data)
                .serve()
        })
}

/// Serve the GraphQL Playground UI for ad-hoc exploration.
async fn graphql_playground() -> impl IntoResponse {
    Html(async_graphql::http::playground_source(
        async_graphql::http::GraphQLPlaygroundConfig::new("/graphql")
            .subscription_endpoint("/graphql/ws"),
    ))
}

async fn health() -> &'static str {
    "OK"
}
