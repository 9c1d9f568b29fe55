//! In-memory registry of remote endpoints.
//!
//! Registration identity is `(url, prefix)` for both adding and removing. The
//! registry itself is plain data; the gateway serializes access to it together
//! with reloads.

use crate::error::{Error, Result};
use crate::transform::NameTransform;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// A registered remote GraphQL service.
///
/// Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescriptor {
    /// HTTP(S) address of the remote GraphQL endpoint
    pub url: String,

    /// Optional namespace prefix applied to the endpoint's types and root fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Document used for discovery instead of the standard introspection query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_query: Option<String>,
}

impl EndpointDescriptor {
    /// Descriptor without prefix or custom discovery document
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            prefix: None,
            discovery_query: None,
        }
    }

    /// Set the namespace prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    /// Set a custom discovery document
    pub fn with_discovery_query(mut self, query: impl Into<String>) -> Self {
        self.discovery_query = Some(query.into());
        self
    }

    /// Check the descriptor can be used: an http(s) url, a prefix that keeps names
    /// valid GraphQL names, and a discovery document that parses.
    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(Error::InvalidRequest(format!(
                "endpoint url must be http(s): {}",
                self.url
            )));
        }

        if let Some(prefix) = &self.prefix {
            let mut chars = prefix.chars();
            let valid_start = chars
                .next()
                .map(|c| c.is_ascii_alphabetic() || c == '_')
                .unwrap_or(false);
            if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(Error::InvalidRequest(format!(
                    "prefix is not a valid GraphQL name: {prefix}"
                )));
            }
        }

        if let Some(query) = &self.discovery_query {
            graphql_parser::parse_query::<String>(query).map_err(|e| {
                Error::InvalidRequest(format!("discovery query does not parse: {e}"))
            })?;
        }

        Ok(())
    }

    /// Whether this descriptor has the given identity
    pub fn matches(&self, url: &str, prefix: Option<&str>) -> bool {
        self.url == url && self.prefix.as_deref() == prefix
    }

    /// Renaming rules derived from the prefix
    pub fn transform(&self) -> NameTransform {
        NameTransform::new(self.prefix.as_deref())
    }
}

impl std::fmt::Display for EndpointDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{} ({})", self.url, prefix),
            None => f.write_str(&self.url),
        }
    }
}

/// Ordered list of registered endpoints
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    endpoints: Vec<EndpointDescriptor>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a descriptor unless one with the same identity exists.
    ///
    /// Returns `false` for duplicates.
    pub fn insert(&mut self, descriptor: EndpointDescriptor) -> bool {
        if self.contains(&descriptor.url, descriptor.prefix.as_deref()) {
            return false;
        }
        self.endpoints.push(descriptor);
        true
    }

    /// Remove the descriptor with the given identity
    pub fn remove(&mut self, url: &str, prefix: Option<&str>) -> Option<EndpointDescriptor> {
        let idx = self
            .endpoints
            .iter()
            .position(|e| e.matches(url, prefix))?;
        Some(self.endpoints.remove(idx))
    }

    pub fn contains(&self, url: &str, prefix: Option<&str>) -> bool {
        self.endpoints.iter().any(|e| e.matches(url, prefix))
    }

    pub fn endpoints(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// What kind of registry mutation a change notification reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Register,
    Unregister,
    Reload,
}

/// Broadcast on every attempted registry mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryChange {
    pub kind: ChangeKind,
    pub success: bool,
}

/// Outcome of a registration call
#[derive(Debug, Clone)]
pub struct Registration {
    pub endpoint: EndpointDescriptor,
    pub success: bool,
}

/// Outcome of one reload cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadReport {
    /// Endpoints discovery was attempted against
    pub attempted: usize,
    /// Endpoints whose discovery succeeded and are now served
    pub loaded: usize,
    pub reloaded_at: SystemTime,
}

impl ReloadReport {
    pub fn failed(&self) -> usize {
        self.attempted - self.loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_identity_is_rejected() {
        let mut registry = EndpointRegistry::new();
        assert!(registry.insert(EndpointDescriptor::new("http://u").with_prefix("p")));
        assert!(!registry.insert(EndpointDescriptor::new("http://u").with_prefix("p")));
        assert!(registry.insert(EndpointDescriptor::new("http://u")));
        assert!(registry.insert(EndpointDescriptor::new("http://u").with_prefix("q")));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn removal_matches_url_and_prefix() {
        let mut registry = EndpointRegistry::new();
        registry.insert(EndpointDescriptor::new("http://u").with_prefix("p"));
        registry.insert(EndpointDescriptor::new("http://u"));

        assert!(registry.remove("http://u", Some("other")).is_none());
        let removed = registry.remove("http://u", None).expect("removes unprefixed");
        assert!(removed.prefix.is_none());
        assert!(registry.contains("http://u", Some("p")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn validation_rejects_bad_input() {
        assert!(EndpointDescriptor::new("ftp://x").validate().is_err());
        assert!(EndpointDescriptor::new("http://x")
            .with_prefix("1ns")
            .validate()
            .is_err());
        assert!(EndpointDescriptor::new("http://x")
            .with_discovery_query("{ _service { sdl ")
            .validate()
            .is_err());
        assert!(EndpointDescriptor::new("https://x/graphql")
            .with_prefix("ns_2")
            .with_discovery_query("{ _service { sdl } }")
            .validate()
            .is_ok());
    }

    #[test]
    fn empty_prefix_means_none() {
        let d = EndpointDescriptor::new("http://x").with_prefix("");
        assert!(d.prefix.is_none());
        assert_eq!(d.to_string(), "http://x");
    }
}
