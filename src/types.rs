//! Type definitions for the wire format spoken with remote GraphQL services

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// GraphQL request forwarded to a remote service
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    /// GraphQL query string
    #[serde(default)]
    pub query: String,

    /// Operation name (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,

    /// Variables for the query
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
}

impl GraphQLRequest {
    /// Request with no variables
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: HashMap::new(),
        }
    }

    /// Attach variables
    pub fn with_variables(mut self, variables: HashMap<String, serde_json::Value>) -> Self {
        self.variables = variables;
        self
    }
}

/// GraphQL response received from a remote service
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GraphQLResponse {
    /// Response data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Errors if any
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<crate::error::GraphQLError>,
}

impl GraphQLResponse {
    /// Create a successful response
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// Create an error response
    pub fn error(error: crate::error::GraphQLError) -> Self {
        Self {
            data: None,
            errors: vec![error],
        }
    }

    /// Value of one top-level response key, if present and not null
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.data
            .as_ref()
            .and_then(|data| data.get(key))
            .filter(|value| !value.is_null())
    }

    /// Joined error messages, for logging and error surfacing
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Kind of root operation a field belongs to (Query, Mutation, or Subscription)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    /// Operation keyword used in documents
    pub fn keyword(self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }

    /// Default root type name for this operation kind
    pub fn default_root_type(self) -> &'static str {
        match self {
            OperationKind::Query => "Query",
            OperationKind::Mutation => "Mutation",
            OperationKind::Subscription => "Subscription",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_fields_are_absent() {
        let resp = GraphQLResponse::success(serde_json::json!({ "a": null, "b": 1 }));
        assert!(resp.field("a").is_none());
        assert_eq!(resp.field("b"), Some(&serde_json::json!(1)));
        assert!(resp.field("c").is_none());
    }

    #[test]
    fn request_serializes_camel_case() {
        let mut req = GraphQLRequest::new("{ a }");
        req.operation_name = Some("Op".into());
        let json = serde_json::to_value(&req).expect("serializes");
        assert_eq!(json["operationName"], "Op");
        assert_eq!(json["variables"], serde_json::json!({}));
    }
}
