//! # graphql-stitching-gateway
//!
//! A gateway that serves one GraphQL schema stitched together from any number of
//! remote GraphQL services, discovered and merged at runtime.
//!
//! ## Features
//!
//! - **Runtime discovery**: remote schemas are fetched by introspection or a custom discovery document
//! - **Namespacing**: an optional per-endpoint prefix renames types and root fields
//! - **Hot reload**: endpoints can be registered and removed while serving; every reload publishes a new schema atomically
//! - **Failure isolation**: unreachable endpoints are left out of a reload, remote failures become field errors
//! - **Subscriptions**: remote subscriptions over graphql-transport-ws, bridged into pull-based streams
//! - **Middleware**: request context built by a middleware chain and forwarded to remote calls
//!
//! ## Main Components
//!
//! - [`Gateway`]: registry, reload scheduler and the published schema.
//! - [`GatewayBuilder`]: configuration builder for the gateway.
//! - [`SchemaAssembler`]: merges local extensions and remote subschemas.
//! - [`RemoteExecutor`]: forwards operations to one remote endpoint.
//! - [`ServeMux`]: HTTP and WebSocket front end.
//!
//! ## Example
//!
//! ```rust,no_run
//! use graphql_stitching_gateway::{EndpointDescriptor, Gateway};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = Gateway::builder()
//!         .add_endpoint(EndpointDescriptor::new("http://localhost:4001/graphql").with_prefix("records"))
//!         .add_endpoint(EndpointDescriptor::new("http://localhost:4002/graphql"))
//!         .with_registry_api()
//!         .with_refresh_interval(Duration::from_secs(30))
//!         .start()
//!         .await?;
//!
//!     let app = gateway.into_router();
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:4000").await?;
//!     axum::serve(listener, app).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod config;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod introspection;
pub mod local;
pub mod middleware;
pub mod registry;
pub mod runtime;
pub mod schema;
pub mod subschema;
pub mod subscription;
pub mod transform;
pub mod types;
pub mod websocket;

pub use admin::RegistryExtension;
pub use config::GatewayConfig;
pub use discovery::{LoadedEndpoint, SchemaDiscovery};
pub use error::{Error, Result};
pub use executor::{ExecutorConfig, RemoteExecutor};
pub use gateway::{Gateway, GatewayBuilder};
pub use local::{LocalExtension, SchemaParts};
pub use middleware::{Context, Middleware};
pub use registry::{
    ChangeKind, EndpointDescriptor, EndpointRegistry, Registration, RegistryChange, ReloadReport,
};
pub use runtime::ServeMux;
pub use schema::{SchemaAssembler, UnifiedSchema};
pub use subscription::{BufferConfig, OverflowPolicy, RemoteStream, SubscriptionState};
pub use transform::NameTransform;
pub use types::{GraphQLRequest, GraphQLResponse, OperationKind};
