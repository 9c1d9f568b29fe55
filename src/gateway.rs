//! Gateway builder and main orchestration
//!
//! A [`Gateway`] owns the endpoint registry, the currently published
//! [`UnifiedSchema`] and the background refresh task. Reloads and registry
//! mutations are serialized behind one async lock; readers never wait on them
//! and always see either the previous or the fully assembled new schema.

use crate::admin::RegistryExtension;
use crate::config::GatewayConfig;
use crate::discovery::{LoadedEndpoint, SchemaDiscovery, DEFAULT_DISCOVERY_TIMEOUT};
use crate::error::{Error, GraphQLError, Result};
use crate::executor::ExecutorConfig;
use crate::local::LocalExtension;
use crate::middleware::Middleware;
use crate::registry::{
    ChangeKind, EndpointDescriptor, EndpointRegistry, Registration, RegistryChange, ReloadReport,
};
use crate::runtime::ServeMux;
use crate::schema::{SchemaAssembler, UnifiedSchema};
use crate::subscription::{BufferConfig, OverflowPolicy};
use axum::Router;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Capacity of the change notification topic; slower receivers skip ahead
const CHANGE_CHANNEL_CAPACITY: usize = 64;

type ErrorHandler = Arc<dyn Fn(Vec<GraphQLError>) + Send + Sync>;
type ReloadHook = Arc<dyn Fn(&ReloadReport) + Send + Sync>;

/// Main Gateway struct - entry point for the library
///
/// Cheap to clone; clones share the same registry and published schema.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    registry: tokio::sync::Mutex<EndpointRegistry>,
    /// Copy of the registry taken after every mutation, for lock-free reads
    registered: RwLock<Arc<[EndpointDescriptor]>>,
    published: RwLock<Option<Arc<Published>>>,
    /// Shared by every reload so connections to remotes are pooled
    discovery: SchemaDiscovery,
    assembler: SchemaAssembler,
    changes: broadcast::Sender<RegistryChange>,
    refresh: Mutex<Option<JoinHandle<()>>>,
    reload_hook: Option<ReloadHook>,
    middlewares: Vec<Arc<dyn Middleware>>,
    error_handler: Option<ErrorHandler>,
}

/// Everything one successful reload produced
struct Published {
    schema: UnifiedSchema,
    loaded: Vec<LoadedEndpoint>,
    reloaded_at: SystemTime,
}

impl Drop for GatewayInner {
    fn drop(&mut self) {
        let refresh = self.refresh.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = refresh.take() {
            task.abort();
        }
    }
}

impl Gateway {
    /// Create a new gateway builder
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// Rediscover every registered endpoint and publish a freshly assembled schema.
    ///
    /// Endpoints that fail discovery are left out. An assembly failure keeps the
    /// previously published schema and is returned; if nothing was published yet
    /// the local-only schema is published instead so the gateway becomes ready.
    pub async fn reload(&self) -> Result<ReloadReport> {
        let registry = self.inner.registry.lock().await;
        self.reload_locked(&registry).await
    }

    async fn reload_locked(&self, registry: &EndpointRegistry) -> Result<ReloadReport> {
        let started = Instant::now();
        let descriptors = registry.endpoints();

        let loaded = self.inner.discovery.discover_all(descriptors).await;

        let schema = match self.inner.assembler.assemble(&loaded) {
            Ok(schema) => schema,
            Err(error) => {
                tracing::error!(
                    attempted = descriptors.len(),
                    loaded = loaded.len(),
                    %error,
                    "schema assembly failed, keeping the previous schema"
                );
                if !self.is_ready() {
                    let local = self.inner.assembler.assemble(&[])?;
                    self.publish(local, Vec::new());
                    tracing::warn!("serving the local-only schema until an assembly succeeds");
                }
                return Err(error);
            }
        };

        let report = ReloadReport {
            attempted: descriptors.len(),
            loaded: loaded.len(),
            reloaded_at: self.publish(schema, loaded),
        };

        tracing::info!(
            attempted = report.attempted,
            loaded = report.loaded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "schema reloaded"
        );
        if let Some(hook) = &self.inner.reload_hook {
            hook(&report);
        }

        Ok(report)
    }

    fn publish(&self, schema: UnifiedSchema, loaded: Vec<LoadedEndpoint>) -> SystemTime {
        let reloaded_at = SystemTime::now();
        let published = Arc::new(Published {
            schema,
            loaded,
            reloaded_at,
        });
        *self
            .inner
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(published);
        reloaded_at
    }

    fn current(&self) -> Option<Arc<Published>> {
        self.inner
            .published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn snapshot(&self, registry: &EndpointRegistry) {
        *self
            .inner
            .registered
            .write()
            .unwrap_or_else(PoisonError::into_inner) = registry.endpoints().into();
    }

    fn notify(&self, kind: ChangeKind, success: bool) {
        // No receivers is not an error
        let _ = self.inner.changes.send(RegistryChange { kind, success });
    }

    /// Register an endpoint and reload.
    ///
    /// `success` is `false` for a duplicate `(url, prefix)` and when the reload
    /// did not end up serving the new endpoint. A change notification is sent in
    /// both cases. Invalid descriptors are rejected before anything changes.
    pub async fn register_endpoint(&self, descriptor: EndpointDescriptor) -> Result<Registration> {
        descriptor.validate()?;

        let mut registry = self.inner.registry.lock().await;
        if !registry.insert(descriptor.clone()) {
            drop(registry);
            tracing::info!(endpoint = %descriptor, "endpoint already registered");
            self.notify(ChangeKind::Register, false);
            return Ok(Registration {
                endpoint: descriptor,
                success: false,
            });
        }
        self.snapshot(&registry);

        let reloaded = self.reload_locked(&registry).await.is_ok();
        drop(registry);

        let success = reloaded && self.is_loaded(&descriptor);
        tracing::info!(endpoint = %descriptor, success, "endpoint registered");
        self.notify(ChangeKind::Register, success);

        Ok(Registration {
            endpoint: descriptor,
            success,
        })
    }

    /// Remove the endpoint with this exact `(url, prefix)` identity and reload.
    ///
    /// Returns `false` without reloading when no such endpoint is registered.
    pub async fn unregister_endpoint(&self, url: &str, prefix: Option<&str>) -> bool {
        let mut registry = self.inner.registry.lock().await;
        let success = match registry.remove(url, prefix) {
            Some(removed) => {
                self.snapshot(&registry);
                let reloaded = self.reload_locked(&registry).await.is_ok();
                tracing::info!(endpoint = %removed, reloaded, "endpoint unregistered");
                reloaded
            }
            None => {
                tracing::info!(url, prefix = ?prefix, "no such endpoint to unregister");
                false
            }
        };
        drop(registry);

        self.notify(ChangeKind::Unregister, success);
        success
    }

    /// Reload every endpoint, reporting whether the reload was published
    pub async fn reload_all_endpoints(&self) -> bool {
        let success = self.reload().await.is_ok();
        self.notify(ChangeKind::Reload, success);
        success
    }

    /// Reload every `interval` in the background.
    ///
    /// Each tick waits for the full reload before sleeping again, so cycles never
    /// overlap. Replaces a loop that is already running. The task does not keep
    /// the gateway alive and ends once the last handle is dropped.
    pub fn auto_refresh(&self, interval: Duration) {
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(refresh_loop(weak, interval));

        let previous = self
            .inner
            .refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
        tracing::debug!(interval_ms = interval.as_millis() as u64, "auto refresh started");
    }

    /// Cancel the refresh loop. Safe to call when none is running.
    pub fn stop_auto_refresh(&self) {
        let task = self
            .inner
            .refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
            tracing::debug!("auto refresh stopped");
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner
            .refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Tear down background work. The published schema stays usable.
    pub fn shutdown(&self) {
        self.stop_auto_refresh();
        tracing::info!("gateway shut down");
    }

    /// Execute an operation against the published schema.
    ///
    /// Any [`Context`](crate::middleware::Context) already attached to the
    /// request is visible to remote calls. Before the first reload this returns
    /// a single `NOT_READY` error.
    pub async fn execute(
        &self,
        request: impl Into<async_graphql::Request>,
    ) -> async_graphql::Response {
        match self.current() {
            Some(published) => {
                published
                    .schema
                    .execute(request.into().data(self.clone()))
                    .await
            }
            None => not_ready(),
        }
    }

    /// Execute an operation as a stream of responses; used for subscriptions.
    pub fn execute_stream(
        &self,
        request: impl Into<async_graphql::Request>,
    ) -> BoxStream<'static, async_graphql::Response> {
        match self.current() {
            Some(published) => published
                .schema
                .execute_stream(request.into().data(self.clone())),
            None => futures::stream::once(async { not_ready() }).boxed(),
        }
    }

    /// The currently published schema, if any
    pub fn schema(&self) -> Option<UnifiedSchema> {
        self.current().map(|published| published.schema.clone())
    }

    pub fn is_ready(&self) -> bool {
        self.current().is_some()
    }

    /// Registered endpoints, in registration order
    pub fn endpoints(&self) -> Arc<[EndpointDescriptor]> {
        self.inner
            .registered
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Endpoints the published schema was assembled from
    pub fn loaded(&self) -> Vec<LoadedEndpoint> {
        self.current()
            .map(|published| published.loaded.clone())
            .unwrap_or_default()
    }

    /// Whether the published schema serves this endpoint
    pub fn is_loaded(&self, descriptor: &EndpointDescriptor) -> bool {
        self.current().is_some_and(|published| {
            published
                .loaded
                .iter()
                .any(|l| l.descriptor.matches(&descriptor.url, descriptor.prefix.as_deref()))
        })
    }

    pub fn last_reload_at(&self) -> Option<SystemTime> {
        self.current().map(|published| published.reloaded_at)
    }

    /// Receive a [`RegistryChange`] for every attempted registry mutation
    pub fn subscribe_changes(&self) -> broadcast::Receiver<RegistryChange> {
        self.inner.changes.subscribe()
    }

    /// HTTP/WebSocket front end bound to this gateway
    pub fn mux(&self) -> ServeMux {
        let mut mux = ServeMux::new(self.clone());
        for middleware in &self.inner.middlewares {
            mux.add_middleware(Arc::clone(middleware));
        }
        if let Some(handler) = &self.inner.error_handler {
            mux.set_error_handler_arc(Arc::clone(handler));
        }
        mux
    }

    /// Convert gateway into Axum router
    pub fn into_router(self) -> Router {
        self.mux().into_router()
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("endpoints", &self.endpoints())
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

async fn refresh_loop(gateway: Weak<GatewayInner>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        let Some(inner) = gateway.upgrade() else {
            break;
        };
        let gateway = Gateway { inner };
        if let Err(error) = gateway.reload().await {
            tracing::warn!(%error, "scheduled reload failed");
        }
    }
}

fn not_ready() -> async_graphql::Response {
    async_graphql::Response::from_errors(vec![Error::NotReady.to_server_error()])
}

/// Builder for creating a Gateway
pub struct GatewayBuilder {
    endpoints: Vec<EndpointDescriptor>,
    extensions: Vec<Arc<dyn LocalExtension>>,
    registry_api: bool,
    discovery_timeout: Duration,
    executor: ExecutorConfig,
    refresh_interval: Option<Duration>,
    middlewares: Vec<Arc<dyn Middleware>>,
    error_handler: Option<ErrorHandler>,
    reload_hook: Option<ReloadHook>,
}

impl GatewayBuilder {
    /// Create a new gateway builder
    pub fn new() -> Self {
        Self {
            endpoints: Vec::new(),
            extensions: Vec::new(),
            registry_api: false,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            executor: ExecutorConfig::default(),
            refresh_interval: None,
            middlewares: Vec::new(),
            error_handler: None,
            reload_hook: None,
        }
    }

    /// Builder carrying every setting of a configuration file
    pub fn from_config(config: &GatewayConfig) -> Self {
        let mut builder = Self::new()
            .add_endpoints(config.endpoints.iter().cloned())
            .with_discovery_timeout(config.discovery_timeout())
            .with_request_timeout(config.request_timeout())
            .with_ack_timeout(config.ack_timeout())
            .with_subscription_buffer(config.subscription_buffer, config.subscription_overflow);
        for header in &config.forward_headers {
            builder = builder.forward_header(header);
        }
        if config.registry_api {
            builder = builder.with_registry_api();
        }
        if let Some(interval) = config.refresh_interval() {
            builder = builder.with_refresh_interval(interval);
        }
        builder
    }

    /// Seed an endpoint, registered before the first reload
    pub fn add_endpoint(mut self, descriptor: EndpointDescriptor) -> Self {
        self.endpoints.push(descriptor);
        self
    }

    /// Seed many endpoints in one shot.
    pub fn add_endpoints<I>(mut self, descriptors: I) -> Self
    where
        I: IntoIterator<Item = EndpointDescriptor>,
    {
        self.endpoints.extend(descriptors);
        self
    }

    /// Add a local schema extension
    pub fn add_local_extension<E: LocalExtension + 'static>(mut self, extension: E) -> Self {
        self.extensions.push(Arc::new(extension));
        self
    }

    /// Expose the registry operations as GraphQL fields
    pub fn with_registry_api(mut self) -> Self {
        self.registry_api = true;
        self
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Bound on forwarded queries and mutations
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.executor.request_timeout = timeout;
        self
    }

    /// Bound on waiting for a remote `connection_ack`
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.executor.ack_timeout = timeout;
        self
    }

    /// Limit undelivered subscription events per subscription
    pub fn with_subscription_buffer(mut self, capacity: usize, overflow: OverflowPolicy) -> Self {
        self.executor.buffer = BufferConfig {
            capacity: capacity.max(1),
            overflow,
        };
        self
    }

    /// Copy this request header onto remote calls
    pub fn forward_header(mut self, name: impl AsRef<str>) -> Self {
        self.executor
            .forward_headers
            .push(name.as_ref().to_ascii_lowercase());
        self
    }

    /// Reload periodically once started
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    /// Add middleware
    pub fn add_middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Provide a handler to inspect/augment GraphQL errors before they are returned.
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(Vec<GraphQLError>) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Receive the report of every published reload
    pub fn on_reload<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ReloadReport) + Send + Sync + 'static,
    {
        self.reload_hook = Some(Arc::new(hook));
        self
    }

    /// Build the gateway. Nothing is published until the first reload, and the
    /// refresh interval only takes effect through [`start`](Self::start).
    pub fn build(self) -> Result<Gateway> {
        let mut registry = EndpointRegistry::new();
        for descriptor in self.endpoints {
            descriptor.validate()?;
            if !registry.insert(descriptor.clone()) {
                tracing::warn!(endpoint = %descriptor, "duplicate seed endpoint ignored");
            }
        }

        let mut assembler = SchemaAssembler::new(self.executor);
        if self.registry_api {
            assembler = assembler.with_extension(Arc::new(RegistryExtension));
        }
        for extension in self.extensions {
            assembler = assembler.with_extension(extension);
        }

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let discovery = SchemaDiscovery::new(reqwest::Client::builder().build()?, self.discovery_timeout);

        let gateway = Gateway {
            inner: Arc::new(GatewayInner {
                registered: RwLock::new(registry.endpoints().into()),
                registry: tokio::sync::Mutex::new(registry),
                published: RwLock::new(None),
                discovery,
                assembler,
                changes,
                refresh: Mutex::new(None),
                reload_hook: self.reload_hook,
                middlewares: self.middlewares,
                error_handler: self.error_handler,
            }),
        };

        Ok(gateway)
    }

    /// Build, perform the first reload and start the refresh loop if configured
    pub async fn start(self) -> Result<Gateway> {
        let refresh_interval = self.refresh_interval;
        let gateway = self.build()?;

        if let Err(error) = gateway.reload().await {
            if !gateway.is_ready() {
                return Err(error);
            }
        }
        if let Some(interval) = refresh_interval {
            gateway.auto_refresh(interval);
        }
        Ok(gateway)
    }

    /// Build and start the gateway server
    pub async fn serve(self, addr: impl Into<String>) -> Result<()> {
        let gateway = self.start().await?;
        let addr = addr.into();
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        tracing::info!("Gateway server listening on {}", addr);

        let app = gateway.clone().into_router();
        let served = axum::serve(listener, app).await;
        gateway.shutdown();
        served?;

        Ok(())
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}
