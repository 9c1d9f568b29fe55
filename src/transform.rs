//! Namespace prefixing for remote type and root-field names.
//!
//! Endpoints registered with a prefix have every type renamed to
//! `Capitalize(prefix) + name` and every root field to `prefix + Capitalize(name)`.
//! Without a prefix both renames are identities; collisions between unprefixed
//! endpoints are not resolved here (the assembler reports them).

use crate::types::OperationKind;

/// Scalars every GraphQL schema shares; these keep their names.
pub const BUILTIN_SCALARS: [&str; 5] = ["String", "Int", "Float", "Boolean", "ID"];

/// Renaming rules for one endpoint.
///
/// A pure function of `(prefix, name)`; cloning it and using it from several
/// reload cycles at once is fine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NameTransform {
    prefix: Option<String>,
}

impl NameTransform {
    /// Transform for the given prefix; an empty prefix behaves like none.
    pub fn new(prefix: Option<&str>) -> Self {
        Self {
            prefix: prefix.filter(|p| !p.is_empty()).map(str::to_string),
        }
    }

    /// Identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Rename a type. Built-in scalars and introspection types are left alone.
    pub fn rename_type(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) if !is_reserved_type(name) => format!("{}{}", capitalize(prefix), name),
            _ => name.to_string(),
        }
    }

    /// Rename a root field of the given operation kind.
    pub fn rename_root_field(&self, _kind: OperationKind, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, capitalize(name)),
            None => name.to_string(),
        }
    }
}

/// Whether a type name belongs to every schema and must not be renamed.
pub fn is_reserved_type(name: &str) -> bool {
    BUILTIN_SCALARS.contains(&name) || name.starts_with("__")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
