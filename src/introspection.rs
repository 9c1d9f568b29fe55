//! Standard introspection query and conversion of its result into SDL text.

use crate::error::{Error, Result};
use crate::transform::BUILTIN_SCALARS;
use serde::Deserialize;
use std::fmt::Write;

/// Introspection query issued when an endpoint has no custom discovery document.
pub const INTROSPECTION_QUERY: &str = r#"
query IntrospectionQuery {
  __schema {
    queryType { name }
    mutationType { name }
    subscriptionType { name }
    types { ...FullType }
  }
}

fragment FullType on __Type {
  kind
  name
  description
  fields(includeDeprecated: true) {
    name
    description
    args { ...InputValue }
    type { ...TypeRef }
    isDeprecated
    deprecationReason
  }
  inputFields { ...InputValue }
  interfaces { ...TypeRef }
  enumValues(includeDeprecated: true) {
    name
    description
    isDeprecated
    deprecationReason
  }
  possibleTypes { ...TypeRef }
}

fragment InputValue on __InputValue {
  name
  description
  type { ...TypeRef }
  defaultValue
}

fragment TypeRef on __Type {
  kind
  name
  ofType {
    kind
    name
    ofType {
      kind
      name
      ofType {
        kind
        name
        ofType {
          kind
          name
          ofType {
            kind
            name
            ofType {
              kind
              name
              ofType { kind name }
            }
          }
        }
      }
    }
  }
}
"#;

/// `data` of an introspection response
#[derive(Debug, Deserialize)]
pub struct IntrospectionData {
    #[serde(rename = "__schema")]
    pub schema: IntrospectionSchema,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntrospectionSchema {
    pub query_type: Option<NamedType>,
    #[serde(default)]
    pub mutation_type: Option<NamedType>,
    #[serde(default)]
    pub subscription_type: Option<NamedType>,
    pub types: Vec<FullType>,
}

#[derive(Debug, Deserialize)]
pub struct NamedType {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
    List,
    NonNull,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullType {
    pub kind: TypeKind,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Option<Vec<FieldInfo>>,
    #[serde(default)]
    pub input_fields: Option<Vec<InputValueInfo>>,
    #[serde(default)]
    pub interfaces: Option<Vec<TypeRefInfo>>,
    #[serde(default)]
    pub enum_values: Option<Vec<EnumValueInfo>>,
    #[serde(default)]
    pub possible_types: Option<Vec<TypeRefInfo>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeRefInfo {
    pub kind: TypeKind,
    pub name: Option<String>,
    #[serde(default)]
    pub of_type: Option<Box<TypeRefInfo>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldInfo {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub args: Vec<InputValueInfo>,
    #[serde(rename = "type")]
    pub ty: TypeRefInfo,
    #[serde(default)]
    pub is_deprecated: bool,
    pub deprecation_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputValueInfo {
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub ty: TypeRefInfo,
    pub default_value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumValueInfo {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_deprecated: bool,
    pub deprecation_reason: Option<String>,
}

/// Convert the `data` object of an introspection response into SDL.
pub fn introspection_to_sdl(data: &serde_json::Value) -> Result<String> {
    let data: IntrospectionData = serde_json::from_value(data.clone())
        .map_err(|e| Error::Discovery(format!("malformed introspection result: {e}")))?;
    data.schema.to_sdl()
}

impl IntrospectionSchema {
    /// Render the schema as SDL, skipping introspection types and built-in scalars.
    pub fn to_sdl(&self) -> Result<String> {
        let query = self
            .query_type
            .as_ref()
            .map(|t| t.name.as_str())
            .ok_or_else(|| Error::Discovery("introspection result has no query type".into()))?;
        let mutation = self.mutation_type.as_ref().map(|t| t.name.as_str());
        let subscription = self.subscription_type.as_ref().map(|t| t.name.as_str());

        let mut out = String::new();

        let custom_roots = query != "Query"
            || mutation.is_some_and(|m| m != "Mutation")
            || subscription.is_some_and(|s| s != "Subscription");
        if custom_roots {
            out.push_str("schema {\n");
            let _ = writeln!(out, "  query: {query}");
            if let Some(m) = mutation {
                let _ = writeln!(out, "  mutation: {m}");
            }
            if let Some(s) = subscription {
                let _ = writeln!(out, "  subscription: {s}");
            }
            out.push_str("}\n\n");
        }

        for ty in &self.types {
            let Some(name) = ty.name.as_deref() else {
                continue;
            };
            if name.starts_with("__") || BUILTIN_SCALARS.contains(&name) {
                continue;
            }
            write_type(&mut out, name, ty)?;
            out.push('\n');
        }

        Ok(out)
    }
}

fn write_type(out: &mut String, name: &str, ty: &FullType) -> Result<()> {
    write_description(out, ty.description.as_deref(), "");
    match ty.kind {
        TypeKind::Scalar => {
            let _ = writeln!(out, "scalar {name}");
        }
        TypeKind::Object | TypeKind::Interface => {
            let keyword = if ty.kind == TypeKind::Object {
                "type"
            } else {
                "interface"
            };
            let _ = write!(out, "{keyword} {name}");
            let interfaces = ty
                .interfaces
                .iter()
                .flatten()
                .filter_map(|i| i.name.as_deref())
                .collect::<Vec<_>>();
            if !interfaces.is_empty() {
                let _ = write!(out, " implements {}", interfaces.join(" & "));
            }
            out.push_str(" {\n");
            for field in ty.fields.iter().flatten() {
                write_description(out, field.description.as_deref(), "  ");
                let _ = write!(out, "  {}", field.name);
                if !field.args.is_empty() {
                    let args = field
                        .args
                        .iter()
                        .map(render_input_value)
                        .collect::<Result<Vec<_>>>()?;
                    let _ = write!(out, "({})", args.join(", "));
                }
                let _ = write!(out, ": {}", render_type_ref(&field.ty)?);
                write_deprecation(out, field.is_deprecated, field.deprecation_reason.as_deref());
                out.push('\n');
            }
            out.push_str("}\n");
        }
        TypeKind::Union => {
            let members = ty
                .possible_types
                .iter()
                .flatten()
                .filter_map(|t| t.name.as_deref())
                .collect::<Vec<_>>();
            let _ = writeln!(out, "union {name} = {}", members.join(" | "));
        }
        TypeKind::Enum => {
            let _ = writeln!(out, "enum {name} {{");
            for value in ty.enum_values.iter().flatten() {
                write_description(out, value.description.as_deref(), "  ");
                let _ = write!(out, "  {}", value.name);
                write_deprecation(out, value.is_deprecated, value.deprecation_reason.as_deref());
                out.push('\n');
            }
            out.push_str("}\n");
        }
        TypeKind::InputObject => {
            let _ = writeln!(out, "input {name} {{");
            for field in ty.input_fields.iter().flatten() {
                write_description(out, field.description.as_deref(), "  ");
                let _ = writeln!(out, "  {}", render_input_value(field)?);
            }
            out.push_str("}\n");
        }
        TypeKind::List | TypeKind::NonNull => {
            return Err(Error::Discovery(format!(
                "wrapper kind at top level for type {name}"
            )));
        }
    }
    Ok(())
}

fn render_input_value(value: &InputValueInfo) -> Result<String> {
    let mut rendered = format!("{}: {}", value.name, render_type_ref(&value.ty)?);
    if let Some(default) = &value.default_value {
        let _ = write!(rendered, " = {default}");
    }
    Ok(rendered)
}

fn render_type_ref(ty: &TypeRefInfo) -> Result<String> {
    match ty.kind {
        TypeKind::NonNull => Ok(format!("{}!", render_type_ref(inner(ty)?)?)),
        TypeKind::List => Ok(format!("[{}]", render_type_ref(inner(ty)?)?)),
        _ => ty
            .name
            .clone()
            .ok_or_else(|| Error::Discovery("named type reference without a name".into())),
    }
}

fn inner(ty: &TypeRefInfo) -> Result<&TypeRefInfo> {
    ty.of_type
        .as_deref()
        .ok_or_else(|| Error::Discovery("wrapper type reference without ofType".into()))
}

fn write_description(out: &mut String, description: Option<&str>, indent: &str) {
    let Some(description) = description.filter(|d| !d.is_empty()) else {
        return;
    };
    let quoted = serde_json::to_string(description).unwrap_or_else(|_| "\"\"".into());
    let _ = writeln!(out, "{indent}{quoted}");
}

fn write_deprecation(out: &mut String, deprecated: bool, reason: Option<&str>) {
    if !deprecated {
        return;
    }
    match reason {
        Some(reason) => {
            let quoted = serde_json::to_string(reason).unwrap_or_else(|_| "\"\"".into());
            let _ = write!(out, " @deprecated(reason: {quoted})");
        }
        None => out.push_str(" @deprecated"),
    }
}
