//! Schema assembly.
//!
//! Local extensions and every loaded remote subschema are merged into one
//! `async-graphql` dynamic schema. Remote types are rebuilt under their renamed
//! names with resolvers that read the already-fetched remote payload, and every
//! remote root field gets a resolver that forwards the client's selection to the
//! owning endpoint.

use crate::discovery::LoadedEndpoint;
use crate::error::{Error, GraphQLError, Result};
use crate::executor::{ExecutorConfig, RemoteExecutor};
use crate::local::{LocalExtension, SchemaParts};
use crate::middleware::Context;
use crate::registry::EndpointDescriptor;
use crate::subschema::{
    FieldDef, InputValueDef, OutputShape, Selection, Subschema, TypeDef, TypeRefDef,
};
use crate::transform::NameTransform;
use crate::types::{GraphQLRequest, GraphQLResponse, OperationKind};
use async_graphql::dynamic::{
    Enum, EnumItem, Field, FieldFuture, FieldValue, InputObject, InputValue, Interface,
    InterfaceField, Object, ResolverContext, Scalar, Schema as AsyncSchema, Subscription,
    SubscriptionField, SubscriptionFieldFuture, Type, TypeRef, Union,
};
use async_graphql::{ErrorExtensions, Name, Value as GqlValue};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;

/// The schema served to clients
#[derive(Clone)]
pub struct UnifiedSchema {
    inner: AsyncSchema,
    endpoints: Arc<[EndpointDescriptor]>,
}

impl UnifiedSchema {
    /// Execute a GraphQL request
    pub async fn execute(&self, request: async_graphql::Request) -> async_graphql::Response {
        self.inner.execute(request).await
    }

    /// Execute a subscription (or any operation) as a stream of responses
    pub fn execute_stream(
        &self,
        request: async_graphql::Request,
    ) -> BoxStream<'static, async_graphql::Response> {
        self.inner.execute_stream(request).boxed()
    }

    /// Access the executor (used for HTTP/WS integration)
    pub fn executor(&self) -> AsyncSchema {
        self.inner.clone()
    }

    /// Schema as SDL
    pub fn sdl(&self) -> String {
        self.inner.sdl()
    }

    /// Endpoints whose subschemas this schema was assembled from
    pub fn endpoints(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }
}

impl std::fmt::Debug for UnifiedSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiedSchema")
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

/// Builds [`UnifiedSchema`]s.
///
/// Assembly is a pure function of the extensions and the loaded endpoints;
/// the only thing created fresh on every call is the HTTP client the new
/// executors share.
#[derive(Clone, Default)]
pub struct SchemaAssembler {
    extensions: Vec<Arc<dyn LocalExtension>>,
    executor: Arc<ExecutorConfig>,
}

impl SchemaAssembler {
    pub fn new(executor: ExecutorConfig) -> Self {
        Self {
            extensions: Vec::new(),
            executor: Arc::new(executor),
        }
    }

    /// Add a local extension
    pub fn with_extension(mut self, extension: Arc<dyn LocalExtension>) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn extensions(&self) -> &[Arc<dyn LocalExtension>] {
        &self.extensions
    }

    /// Merge local extensions with the given endpoints.
    pub fn assemble(&self, loaded: &[LoadedEndpoint]) -> Result<UnifiedSchema> {
        let client = reqwest::Client::builder().build()?;
        let mut parts = SchemaParts::new();

        for extension in &self.extensions {
            extension
                .contribute(&mut parts)
                .map_err(|e| in_context(e, format_args!("local extension {}", extension.name())))?;
        }

        let mut registry = TypeRegistry::default();
        for endpoint in loaded {
            let executor = RemoteExecutor::new(
                client.clone(),
                endpoint.url(),
                Arc::clone(&self.executor),
            );
            registry
                .merge(&mut parts, endpoint, executor)
                .map_err(|e| in_context(e, format_args!("endpoint {}", endpoint.descriptor)))?;
        }

        finish(
            parts,
            loaded.iter().map(|e| e.descriptor.clone()).collect(),
        )
    }
}

fn in_context(error: Error, origin: std::fmt::Arguments<'_>) -> Error {
    match error {
        Error::Schema(message) => Error::Schema(format!("{origin}: {message}")),
        other => other,
    }
}

/// Renamed definitions of every remote type merged so far, for conflict checks
#[derive(Default)]
struct TypeRegistry {
    remote: HashMap<String, TypeDef>,
}

impl TypeRegistry {
    fn merge(
        &mut self,
        parts: &mut SchemaParts,
        endpoint: &LoadedEndpoint,
        executor: RemoteExecutor,
    ) -> Result<()> {
        let origin = Arc::new(Origin {
            subschema: Arc::clone(&endpoint.subschema),
            transform: endpoint.transform.clone(),
        });

        for def in origin.subschema.exported_types() {
            let renamed = def.renamed(&origin.transform);
            let name = renamed.name().to_string();
            match self.remote.get(&name) {
                Some(existing) if *existing == renamed => continue,
                Some(_) => {
                    return Err(Error::Schema(format!(
                        "type {name} conflicts with a different definition from another endpoint"
                    )))
                }
                None if parts.has_type(&name) => {
                    return Err(Error::Schema(format!(
                        "type {name} conflicts with a local type"
                    )))
                }
                None => {}
            }
            parts.add_type(name.clone(), origin.build_type(def))?;
            self.remote.insert(name, renamed);
        }

        for def in origin.subschema.root_fields(OperationKind::Query) {
            let (name, field) = origin.root_field(OperationKind::Query, def, executor.clone());
            parts.add_query(name, field)?;
        }
        for def in origin.subschema.root_fields(OperationKind::Mutation) {
            let (name, field) = origin.root_field(OperationKind::Mutation, def, executor.clone());
            parts.add_mutation(name, field)?;
        }
        for def in origin.subschema.root_fields(OperationKind::Subscription) {
            let (name, field) = origin.subscription_field(def, executor.clone());
            parts.add_subscription(name, field)?;
        }

        Ok(())
    }
}

fn finish(parts: SchemaParts, endpoints: Vec<EndpointDescriptor>) -> Result<UnifiedSchema> {
    let SchemaParts {
        query,
        mutation,
        subscription,
        types,
    } = parts;

    let query_root = if query.is_empty() {
        placeholder_query_root()
    } else {
        query
            .into_values()
            .fold(Object::new("Query"), |root, field| root.field(field))
    };
    let mutation_root = (!mutation.is_empty()).then(|| {
        mutation
            .into_values()
            .fold(Object::new("Mutation"), |root, field| root.field(field))
    });
    let subscription_root = (!subscription.is_empty()).then(|| {
        subscription
            .into_values()
            .fold(Subscription::new("Subscription"), |root, field| {
                root.field(field)
            })
    });

    let mut schema_builder = AsyncSchema::build(
        query_root.type_name(),
        mutation_root.as_ref().map(Object::type_name),
        subscription_root.as_ref().map(Subscription::type_name),
    );

    schema_builder = schema_builder.register(query_root);
    if let Some(mutation) = mutation_root {
        schema_builder = schema_builder.register(mutation);
    }
    if let Some(subscription) = subscription_root {
        schema_builder = schema_builder.register(subscription);
    }
    for ty in types.into_values() {
        schema_builder = schema_builder.register(ty);
    }

    let schema = schema_builder
        .finish()
        .map_err(|e| Error::Schema(format!("failed to build schema: {e}")))?;

    Ok(UnifiedSchema {
        inner: schema,
        endpoints: endpoints.into(),
    })
}

fn placeholder_query_root() -> Object {
    let ty = TypeRef::named_nn(TypeRef::BOOLEAN);
    let field = Field::new("_placeholder", ty, |_| {
        FieldFuture::new(async { Ok(Some(GqlValue::Boolean(true))) })
    });
    Object::new("Query").field(field)
}

/// One endpoint's subschema together with its renaming rules
struct Origin {
    subschema: Arc<Subschema>,
    transform: NameTransform,
}

/// Where a remote root field is delegated to
struct Route {
    origin: Arc<Origin>,
    executor: RemoteExecutor,
    kind: OperationKind,
    remote_field: String,
    ty: TypeRefDef,
}

impl Origin {
    fn type_ref(&self, ty: &TypeRefDef) -> TypeRef {
        match ty {
            TypeRefDef::Named(name) => TypeRef::named(self.transform.rename_type(name)),
            TypeRefDef::List(inner) => TypeRef::List(Box::new(self.type_ref(inner))),
            TypeRefDef::NonNull(inner) => TypeRef::NonNull(Box::new(self.type_ref(inner))),
        }
    }

    fn build_type(self: &Arc<Self>, def: &TypeDef) -> Type {
        let rename = |name: &str| self.transform.rename_type(name);
        match def {
            TypeDef::Scalar(s) => {
                let mut scalar = Scalar::new(rename(&s.name));
                if let Some(description) = &s.description {
                    scalar = scalar.description(description.as_str());
                }
                scalar.into()
            }
            TypeDef::Object(o) => {
                let mut object = Object::new(rename(&o.name));
                if let Some(description) = &o.description {
                    object = object.description(description.as_str());
                }
                for iface in &o.implements {
                    object = object.implement(rename(iface));
                }
                for field in &o.fields {
                    object = object.field(self.pluck_field(field));
                }
                object.into()
            }
            TypeDef::Interface(o) => {
                let mut iface = Interface::new(rename(&o.name));
                if let Some(description) = &o.description {
                    iface = iface.description(description.as_str());
                }
                for field in &o.fields {
                    let mut f = InterfaceField::new(field.name.clone(), self.type_ref(&field.ty));
                    for arg in &field.args {
                        f = f.argument(self.input_value(arg));
                    }
                    if let Some(description) = &field.description {
                        f = f.description(description.as_str());
                    }
                    if let Some(deprecation) = &field.deprecation {
                        f = f.deprecation(deprecation.reason.as_deref());
                    }
                    iface = iface.field(f);
                }
                iface.into()
            }
            TypeDef::Union(u) => {
                let mut union = Union::new(rename(&u.name));
                if let Some(description) = &u.description {
                    union = union.description(description.as_str());
                }
                for member in &u.members {
                    union = union.possible_type(rename(member));
                }
                union.into()
            }
            TypeDef::Enum(e) => {
                let mut en = Enum::new(rename(&e.name));
                if let Some(description) = &e.description {
                    en = en.description(description.as_str());
                }
                for value in &e.values {
                    let mut item = EnumItem::new(value.name.clone());
                    if let Some(description) = &value.description {
                        item = item.description(description.as_str());
                    }
                    if let Some(deprecation) = &value.deprecation {
                        item = item.deprecation(deprecation.reason.as_deref());
                    }
                    en = en.item(item);
                }
                en.into()
            }
            TypeDef::InputObject(i) => {
                let mut input = InputObject::new(rename(&i.name));
                if let Some(description) = &i.description {
                    input = input.description(description.as_str());
                }
                for field in &i.fields {
                    input = input.field(self.input_value(field));
                }
                input.into()
            }
        }
    }

    fn input_value(&self, def: &InputValueDef) -> InputValue {
        let mut value = InputValue::new(def.name.clone(), self.type_ref(&def.ty));
        if let Some(description) = &def.description {
            value = value.description(description.as_str());
        }
        if let Some(default) = &def.default_value {
            value = value.default_value(default.clone());
        }
        value
    }

    /// Field of a remote object type: reads its value out of the parent payload.
    fn pluck_field(self: &Arc<Self>, def: &FieldDef) -> Field {
        let origin = Arc::clone(self);
        let ty = def.ty.clone();

        let mut field = Field::new(def.name.clone(), self.type_ref(&def.ty), move |ctx| {
            let origin = Arc::clone(&origin);
            let ty = ty.clone();
            FieldFuture::new(async move {
                let selection = ctx.field();
                let key = selection.alias().unwrap_or(selection.name());
                let value = match ctx.parent_value.as_value() {
                    Some(GqlValue::Object(map)) => {
                        map.get(&Name::new(key)).cloned().unwrap_or(GqlValue::Null)
                    }
                    _ => GqlValue::Null,
                };
                Ok(Some(origin.field_value(value, &ty)))
            })
        });

        for arg in &def.args {
            field = field.argument(self.input_value(arg));
        }
        if let Some(description) = &def.description {
            field = field.description(description.as_str());
        }
        if let Some(deprecation) = &def.deprecation {
            field = field.deprecation(deprecation.reason.as_deref());
        }
        field
    }

    /// Root query or mutation field delegating to the endpoint.
    fn root_field(
        self: &Arc<Self>,
        kind: OperationKind,
        def: &FieldDef,
        executor: RemoteExecutor,
    ) -> (String, Field) {
        let name = self.transform.rename_root_field(kind, &def.name);
        let route = Arc::new(Route {
            origin: Arc::clone(self),
            executor,
            kind,
            remote_field: def.name.clone(),
            ty: def.ty.clone(),
        });

        let mut field = Field::new(name.clone(), self.type_ref(&def.ty), move |ctx| {
            let route = Arc::clone(&route);
            FieldFuture::new(async move {
                match route.fetch(&ctx).await {
                    Ok((value, errors)) => {
                        for error in errors {
                            ctx.add_error(ctx.set_error_path(error.into_server_error(ctx.item.pos)));
                        }
                        Ok(Some(route.origin.field_value(value, &route.ty)))
                    }
                    // Nullable fields fail alone: null value, error at this field's path
                    Err(error) if !route.ty.is_non_null() => {
                        ctx.add_error(ctx.set_error_path(error.into_server_error(ctx.item.pos)));
                        Ok(None)
                    }
                    Err(error) => Err(error),
                }
            })
        });

        for arg in &def.args {
            field = field.argument(self.input_value(arg));
        }
        if let Some(description) = &def.description {
            field = field.description(description.as_str());
        }
        if let Some(deprecation) = &def.deprecation {
            field = field.deprecation(deprecation.reason.as_deref());
        }
        (name, field)
    }

    /// Root subscription field streaming from the endpoint.
    ///
    /// An event without a value for this field becomes an error event carrying
    /// the remote errors. An event that has a value is delivered as that value;
    /// one event holds a single result, so remote errors reported next to a
    /// value are logged and not delivered.
    fn subscription_field(
        self: &Arc<Self>,
        def: &FieldDef,
        executor: RemoteExecutor,
    ) -> (String, SubscriptionField) {
        let name = self
            .transform
            .rename_root_field(OperationKind::Subscription, &def.name);
        let route = Arc::new(Route {
            origin: Arc::clone(self),
            executor,
            kind: OperationKind::Subscription,
            remote_field: def.name.clone(),
            ty: def.ty.clone(),
        });

        let mut field = SubscriptionField::new(name.clone(), self.type_ref(&def.ty), move |ctx| {
            let route = Arc::clone(&route);
            SubscriptionFieldFuture::new(async move {
                let (document, key) = route.document(&ctx).map_err(|e| e.to_field_error())?;
                let headers = ctx.data_opt::<Context>().map(|c| c.headers.clone());

                let stream = route
                    .executor
                    .subscribe(GraphQLRequest::new(document), headers.as_ref())
                    .await
                    .map_err(|e| route.failed(e))?;

                Ok(stream.map(move |event| {
                    let response = event.map_err(|e| route.failed(e))?;
                    let (value, errors) = route.response_value(response, &key)?;
                    if !errors.is_empty() {
                        tracing::warn!(
                            url = route.executor.url(),
                            field = %route.remote_field,
                            errors = errors.len(),
                            "remote subscription event carried errors next to its value"
                        );
                    }
                    Ok(route.origin.field_value(value, &route.ty))
                }))
            })
        });

        for arg in &def.args {
            field = field.argument(self.input_value(arg));
        }
        if let Some(description) = &def.description {
            field = field.description(description.as_str());
        }
        (name, field)
    }

    /// Hand a remote value to the engine according to its declared type.
    fn field_value<'a>(&self, value: GqlValue, ty: &TypeRefDef) -> FieldValue<'a> {
        match (ty, value) {
            (_, GqlValue::Null) => FieldValue::NULL,
            (TypeRefDef::NonNull(inner), value) => self.field_value(value, inner),
            (TypeRefDef::List(inner), GqlValue::List(items)) => FieldValue::list(
                items
                    .into_iter()
                    .map(|item| self.field_value(item, inner))
                    .collect::<Vec<_>>(),
            ),
            (TypeRefDef::List(_), value) => FieldValue::value(value),
            (TypeRefDef::Named(name), value) => match self.subschema.output_shape(name) {
                OutputShape::Plain => FieldValue::value(value),
                OutputShape::Enum => match value {
                    GqlValue::String(s) => FieldValue::value(GqlValue::Enum(Name::new(s))),
                    other => FieldValue::value(other),
                },
                OutputShape::Abstract => {
                    let typename = match &value {
                        GqlValue::Object(map) => match map.get(&Name::new("__typename")) {
                            Some(GqlValue::String(t)) => Some(self.transform.rename_type(t)),
                            _ => None,
                        },
                        _ => None,
                    };
                    match typename {
                        Some(typename) => FieldValue::value(value).with_type(typename),
                        None => FieldValue::value(value),
                    }
                }
            },
        }
    }
}

impl Route {
    /// Forwarded document and the response key the result comes back under
    fn document(&self, ctx: &ResolverContext<'_>) -> Result<(String, String)> {
        let selection = Selection::from_field(&ctx.field())?;
        let document =
            self.origin
                .subschema
                .render_operation(self.kind, &self.remote_field, &selection)?;
        Ok((document, selection.response_key().to_string()))
    }

    /// Forward the client's selection and split the answer into value and
    /// remote errors
    async fn fetch(
        &self,
        ctx: &ResolverContext<'_>,
    ) -> async_graphql::Result<(GqlValue, Vec<async_graphql::Error>)> {
        let (document, key) = self.document(ctx).map_err(|e| self.failed(e))?;
        let headers = ctx.data_opt::<Context>().map(|c| &c.headers);

        let response = self
            .executor
            .execute(&GraphQLRequest::new(document), headers)
            .await
            .map_err(|e| self.failed(e))?;
        self.response_value(response, &key)
    }

    fn failed(&self, error: Error) -> async_graphql::Error {
        tracing::debug!(
            url = self.executor.url(),
            field = %self.remote_field,
            %error,
            "remote execution failed"
        );
        error.to_field_error()
    }

    /// Split a remote response into this field's value and the remote errors to
    /// report next to it. Without a value, the errors fail the field.
    fn response_value(
        &self,
        response: GraphQLResponse,
        key: &str,
    ) -> async_graphql::Result<(GqlValue, Vec<async_graphql::Error>)> {
        match response.field(key) {
            Some(value) => {
                let value = GqlValue::from_json(value.clone())?;
                Ok((value, response.errors.iter().map(remote_error).collect()))
            }
            None => match response.errors.as_slice() {
                [] => Ok((GqlValue::Null, Vec::new())),
                [single] => Err(remote_error(single)),
                _ => Err(self.failed(Error::Remote(response.error_summary()))),
            },
        }
    }
}

/// Field error for an error reported by a remote service
fn remote_error(error: &GraphQLError) -> async_graphql::Error {
    let remote_path = error
        .path
        .clone()
        .and_then(|path| GqlValue::from_json(serde_json::Value::Array(path)).ok());
    async_graphql::Error::new(error.message.clone()).extend_with(|_, ext| {
        ext.set("code", "REMOTE_ERROR");
        if let Some(path) = remote_path {
            ext.set("remotePath", path);
        }
    })
}
