//! Registry operations exposed as GraphQL fields.
//!
//! ```graphql
//! type Query { endpoints: [Endpoint!]! }
//! type Mutation {
//!   registerEndpoint(url: String!, prefix: String, discoveryQuery: String): RegisterEndpointResult!
//!   unregisterEndpoint(url: String!, prefix: String): MutationResult!
//!   reloadAllEndpoints: MutationResult!
//! }
//! type Subscription { endpointsChanged: RegistryChange! }
//! ```
//!
//! Resolvers find the [`Gateway`] in the request data, which
//! [`Gateway::execute`] and the WebSocket handler always provide.

use crate::error::Result;
use crate::gateway::Gateway;
use crate::local::{LocalExtension, SchemaParts};
use crate::registry::{ChangeKind, EndpointDescriptor, RegistryChange};
use async_graphql::dynamic::{
    Enum, Field, FieldFuture, FieldValue, InputValue, Object, ResolverContext, SubscriptionField,
    SubscriptionFieldFuture, TypeRef,
};
use async_graphql::indexmap::IndexMap;
use async_graphql::{Name, Value as GqlValue};
use futures::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

const ENDPOINT: &str = "Endpoint";
const REGISTER_RESULT: &str = "RegisterEndpointResult";
const MUTATION_RESULT: &str = "MutationResult";
const CHANGE: &str = "RegistryChange";
const CHANGE_KIND: &str = "RegistryChangeKind";

/// Local extension adding the registry API
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryExtension;

impl LocalExtension for RegistryExtension {
    fn name(&self) -> &str {
        "registry"
    }

    fn contribute(&self, parts: &mut SchemaParts) -> Result<()> {
        parts.add_type(
            ENDPOINT,
            Object::new(ENDPOINT)
                .description("A registered remote GraphQL endpoint")
                .field(plucked("url", TypeRef::named_nn(TypeRef::STRING)))
                .field(plucked("prefix", TypeRef::named(TypeRef::STRING)))
                .field(plucked("discoveryQuery", TypeRef::named(TypeRef::STRING)))
                .field(plucked("loaded", TypeRef::named_nn(TypeRef::BOOLEAN))),
        )?;
        parts.add_type(
            REGISTER_RESULT,
            Object::new(REGISTER_RESULT)
                .field(plucked("endpoint", TypeRef::named_nn(ENDPOINT)))
                .field(plucked("success", TypeRef::named_nn(TypeRef::BOOLEAN))),
        )?;
        parts.add_type(
            MUTATION_RESULT,
            Object::new(MUTATION_RESULT)
                .field(plucked("success", TypeRef::named_nn(TypeRef::BOOLEAN))),
        )?;
        parts.add_type(
            CHANGE_KIND,
            Enum::new(CHANGE_KIND)
                .item("REGISTER")
                .item("UNREGISTER")
                .item("RELOAD"),
        )?;
        parts.add_type(
            CHANGE,
            Object::new(CHANGE)
                .field(plucked("kind", TypeRef::named_nn(CHANGE_KIND)))
                .field(plucked("success", TypeRef::named_nn(TypeRef::BOOLEAN))),
        )?;

        parts.add_query("endpoints", endpoints_field())?;
        parts.add_mutation("registerEndpoint", register_field())?;
        parts.add_mutation("unregisterEndpoint", unregister_field())?;
        parts.add_mutation("reloadAllEndpoints", reload_field())?;
        parts.add_subscription("endpointsChanged", changes_field())?;
        Ok(())
    }
}

fn endpoints_field() -> Field {
    Field::new("endpoints", TypeRef::named_nn_list_nn(ENDPOINT), |ctx| {
        FieldFuture::new(async move {
            let gateway = ctx.data::<Gateway>()?;
            let endpoints = gateway
                .endpoints()
                .iter()
                .map(|descriptor| FieldValue::value(endpoint_value(gateway, descriptor)))
                .collect::<Vec<_>>();
            Ok(Some(FieldValue::list(endpoints)))
        })
    })
}

fn register_field() -> Field {
    Field::new("registerEndpoint", TypeRef::named_nn(REGISTER_RESULT), |ctx| {
        FieldFuture::new(async move {
            let gateway = ctx.data::<Gateway>()?;
            let mut descriptor = EndpointDescriptor::new(ctx.args.try_get("url")?.string()?);
            if let Some(prefix) = optional_string(&ctx, "prefix")? {
                descriptor = descriptor.with_prefix(prefix);
            }
            if let Some(query) = optional_string(&ctx, "discoveryQuery")? {
                descriptor = descriptor.with_discovery_query(query);
            }

            let registration = gateway
                .register_endpoint(descriptor)
                .await
                .map_err(|e| e.to_field_error())?;
            Ok(Some(FieldValue::value(object([
                ("endpoint", endpoint_value(gateway, &registration.endpoint)),
                ("success", GqlValue::Boolean(registration.success)),
            ]))))
        })
    })
    .argument(InputValue::new("url", TypeRef::named_nn(TypeRef::STRING)))
    .argument(InputValue::new("prefix", TypeRef::named(TypeRef::STRING)))
    .argument(InputValue::new("discoveryQuery", TypeRef::named(TypeRef::STRING)))
}

fn unregister_field() -> Field {
    Field::new("unregisterEndpoint", TypeRef::named_nn(MUTATION_RESULT), |ctx| {
        FieldFuture::new(async move {
            let gateway = ctx.data::<Gateway>()?;
            let url = ctx.args.try_get("url")?.string()?;
            let prefix = optional_string(&ctx, "prefix")?;
            let success = gateway.unregister_endpoint(url, prefix).await;
            Ok(Some(FieldValue::value(success_value(success))))
        })
    })
    .argument(InputValue::new("url", TypeRef::named_nn(TypeRef::STRING)))
    .argument(InputValue::new("prefix", TypeRef::named(TypeRef::STRING)))
}

fn reload_field() -> Field {
    Field::new("reloadAllEndpoints", TypeRef::named_nn(MUTATION_RESULT), |ctx| {
        FieldFuture::new(async move {
            let gateway = ctx.data::<Gateway>()?;
            let success = gateway.reload_all_endpoints().await;
            Ok(Some(FieldValue::value(success_value(success))))
        })
    })
}

fn changes_field() -> SubscriptionField {
    SubscriptionField::new("endpointsChanged", TypeRef::named_nn(CHANGE), |ctx| {
        SubscriptionFieldFuture::new(async move {
            let gateway = ctx.data::<Gateway>()?;
            let changes = BroadcastStream::new(gateway.subscribe_changes());
            Ok(changes.filter_map(|change| async move {
                match change {
                    Ok(change) => Some(Ok(FieldValue::value(change_value(&change)))),
                    Err(error) => {
                        tracing::debug!(%error, "registry change listener fell behind");
                        None
                    }
                }
            }))
        })
    })
}

/// Field reading the same-named key of its parent object
fn plucked(name: &'static str, ty: TypeRef) -> Field {
    Field::new(name, ty, move |ctx| {
        FieldFuture::new(async move {
            let value = match ctx.parent_value.as_value() {
                Some(GqlValue::Object(map)) => map.get(name).cloned(),
                _ => None,
            };
            Ok(value.map(FieldValue::value))
        })
    })
}

fn optional_string<'a>(ctx: &'a ResolverContext<'_>, name: &str) -> async_graphql::Result<Option<&'a str>> {
    match ctx.args.get(name) {
        Some(value) if !value.is_null() => Ok(Some(value.string()?)),
        _ => Ok(None),
    }
}

fn object<const N: usize>(fields: [(&str, GqlValue); N]) -> GqlValue {
    GqlValue::Object(
        fields
            .into_iter()
            .map(|(key, value)| (Name::new(key), value))
            .collect::<IndexMap<_, _>>(),
    )
}

fn nullable(value: Option<&str>) -> GqlValue {
    value.map_or(GqlValue::Null, |s| GqlValue::String(s.to_string()))
}

fn endpoint_value(gateway: &Gateway, descriptor: &EndpointDescriptor) -> GqlValue {
    object([
        ("url", GqlValue::String(descriptor.url.clone())),
        ("prefix", nullable(descriptor.prefix.as_deref())),
        ("discoveryQuery", nullable(descriptor.discovery_query.as_deref())),
        ("loaded", GqlValue::Boolean(gateway.is_loaded(descriptor))),
    ])
}

fn success_value(success: bool) -> GqlValue {
    object([("success", GqlValue::Boolean(success))])
}

fn change_value(change: &RegistryChange) -> GqlValue {
    let kind = match change.kind {
        ChangeKind::Register => "REGISTER",
        ChangeKind::Unregister => "UNREGISTER",
        ChangeKind::Reload => "RELOAD",
    };
    object([
        ("kind", GqlValue::Enum(Name::new(kind))),
        ("success", GqlValue::Boolean(change.success)),
    ])
}
