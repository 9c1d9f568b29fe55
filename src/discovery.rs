//! Schema discovery against registered endpoints.
//!
//! Discovery never fails a reload: an endpoint that cannot be reached, times
//! out or answers with something that is not a schema is logged and left out.

use crate::error::{Error, Result};
use crate::executor::{ExecutorConfig, RemoteExecutor};
use crate::introspection::{introspection_to_sdl, INTROSPECTION_QUERY};
use crate::registry::EndpointDescriptor;
use crate::subschema::Subschema;
use crate::transform::NameTransform;
use crate::types::GraphQLRequest;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on one discovery call
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_millis(2000);

/// An endpoint whose discovery succeeded in the current reload cycle
#[derive(Debug, Clone)]
pub struct LoadedEndpoint {
    pub descriptor: EndpointDescriptor,
    pub sdl: String,
    pub subschema: Arc<Subschema>,
    pub transform: NameTransform,
}

impl LoadedEndpoint {
    /// Build from SDL text already fetched for `descriptor`
    pub fn from_sdl(descriptor: EndpointDescriptor, sdl: impl Into<String>) -> Result<Self> {
        let sdl = sdl.into();
        let subschema = Subschema::parse(&sdl)?;
        Ok(Self {
            transform: descriptor.transform(),
            descriptor,
            sdl,
            subschema: Arc::new(subschema),
        })
    }

    pub fn url(&self) -> &str {
        &self.descriptor.url
    }
}

/// Fetches remote schemas
#[derive(Debug, Clone)]
pub struct SchemaDiscovery {
    client: reqwest::Client,
    config: Arc<ExecutorConfig>,
}

impl SchemaDiscovery {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client,
            config: Arc::new(ExecutorConfig {
                request_timeout: timeout,
                ..Default::default()
            }),
        }
    }

    /// Discover every descriptor concurrently and keep the successes, in
    /// registration order. Returns only after all calls settled.
    pub async fn discover_all(&self, descriptors: &[EndpointDescriptor]) -> Vec<LoadedEndpoint> {
        join_all(descriptors.iter().map(|d| self.discover(d)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Discover one endpoint; failures are logged and yield `None`.
    pub async fn discover(&self, descriptor: &EndpointDescriptor) -> Option<LoadedEndpoint> {
        match self.try_discover(descriptor).await {
            Ok(loaded) => {
                tracing::debug!(url = %descriptor.url, prefix = ?descriptor.prefix, "schema discovered");
                Some(loaded)
            }
            Err(error) => {
                tracing::warn!(
                    url = %descriptor.url,
                    prefix = ?descriptor.prefix,
                    %error,
                    "schema discovery failed, endpoint left out of this reload"
                );
                None
            }
        }
    }

    /// Discover one endpoint, reporting why it failed.
    pub async fn try_discover(&self, descriptor: &EndpointDescriptor) -> Result<LoadedEndpoint> {
        let document = descriptor
            .discovery_query
            .as_deref()
            .unwrap_or(INTROSPECTION_QUERY);
        let executor = RemoteExecutor::new(
            self.client.clone(),
            descriptor.url.as_str(),
            Arc::clone(&self.config),
        );

        let mut response = executor.execute(&GraphQLRequest::new(document), None).await?;
        let data = match response.data.take() {
            Some(data) if !data.is_null() => data,
            _ if !response.errors.is_empty() => {
                return Err(Error::Discovery(response.error_summary()));
            }
            _ => return Err(Error::Discovery("response carries no data".into())),
        };

        let sdl = extract_sdl(&data)?;
        LoadedEndpoint::from_sdl(descriptor.clone(), sdl)
            .map_err(|e| Error::Discovery(e.to_string()))
    }
}

/// Turn the `data` of a discovery response into SDL text.
///
/// Accepts an introspection result, a single top-level SDL string, or a single
/// top-level object carrying an `sdl` string (such as `_service { sdl }`).
pub fn extract_sdl(data: &Value) -> Result<String> {
    if data.get("__schema").is_some() {
        return introspection_to_sdl(data);
    }

    let fields = data
        .as_object()
        .ok_or_else(|| Error::Discovery("response data is not an object".into()))?;
    let mut values = fields.values();
    match (values.next(), values.next()) {
        (Some(Value::String(sdl)), None) => Ok(sdl.clone()),
        (Some(Value::Object(object)), None) => object
            .get("sdl")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Discovery("discovery result has no `sdl` string".into())),
        _ => Err(Error::Discovery(
            "discovery result is neither an introspection result nor SDL".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_service_sdl() {
        let data = json!({"_service": {"sdl": "type Query { a: Int }"}});
        assert_eq!(extract_sdl(&data).unwrap(), "type Query { a: Int }");

        let data = json!({"schemaText": "type Query { b: Int }"});
        assert_eq!(extract_sdl(&data).unwrap(), "type Query { b: Int }");
    }

    #[test]
    fn extracts_introspection_result() {
        let data = json!({"__schema": {
            "queryType": {"name": "Query"},
            "mutationType": null,
            "subscriptionType": null,
            "types": [{
                "kind": "OBJECT",
                "name": "Query",
                "description": null,
                "fields": [{
                    "name": "hello",
                    "description": null,
                    "args": [],
                    "type": {"kind": "SCALAR", "name": "String", "ofType": null},
                    "isDeprecated": false,
                    "deprecationReason": null
                }],
                "inputFields": null,
                "interfaces": [],
                "enumValues": null,
                "possibleTypes": null
            }]
        }});
        let sdl = extract_sdl(&data).unwrap();
        let subschema = Subschema::parse(&sdl).unwrap();
        let roots: Vec<_> = subschema
            .root_fields(crate::types::OperationKind::Query)
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(roots, ["hello"]);
    }

    #[test]
    fn rejects_unrecognized_results() {
        assert!(extract_sdl(&json!({"a": 1})).is_err());
        assert!(extract_sdl(&json!({"a": "x", "b": "y"})).is_err());
        assert!(extract_sdl(&json!({"_service": {"schema": "x"}})).is_err());
        assert!(extract_sdl(&json!([1])).is_err());
    }

    #[test]
    fn loaded_endpoint_derives_transform_from_prefix() {
        let descriptor = EndpointDescriptor::new("http://a/graphql").with_prefix("ns");
        let loaded = LoadedEndpoint::from_sdl(descriptor, "type Query { a: Int }").unwrap();
        assert_eq!(loaded.transform.rename_type("User"), "NsUser");
        assert_eq!(loaded.url(), "http://a/graphql");
        assert!(LoadedEndpoint::from_sdl(EndpointDescriptor::new("http://a"), "type {").is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint_yields_nothing() {
        let discovery = SchemaDiscovery::new(reqwest::Client::new(), Duration::from_millis(200));
        let descriptors = [EndpointDescriptor::new("http://127.0.0.1:1/graphql")];
        assert!(discovery.discover_all(&descriptors).await.is_empty());
    }
}
