//! Locally defined schema extensions.
//!
//! Local extensions contribute root fields and types next to the remote
//! subschemas. They are re-run on every assembly, so they must build fresh
//! dynamic types each time they are asked.

use crate::error::{Error, Result};
use crate::types::OperationKind;
use async_graphql::dynamic::{Field, SubscriptionField, Type};
use async_graphql::indexmap::IndexMap;

/// Something that adds fields and types to the unified schema.
pub trait LocalExtension: Send + Sync {
    /// Name used in assembly error messages
    fn name(&self) -> &str;

    /// Add this extension's root fields and types.
    fn contribute(&self, parts: &mut SchemaParts) -> Result<()>;
}

/// Root fields and named types collected during one assembly.
///
/// Every root field and type name can be contributed once; a second
/// contribution under the same name is an assembly error.
#[derive(Default)]
pub struct SchemaParts {
    pub(crate) query: IndexMap<String, Field>,
    pub(crate) mutation: IndexMap<String, Field>,
    pub(crate) subscription: IndexMap<String, SubscriptionField>,
    pub(crate) types: IndexMap<String, Type>,
}

impl SchemaParts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field to the query root. `name` must be the field's name.
    pub fn add_query(&mut self, name: impl Into<String>, field: Field) -> Result<()> {
        insert_root(&mut self.query, OperationKind::Query, name.into(), field)
    }

    /// Add a field to the mutation root
    pub fn add_mutation(&mut self, name: impl Into<String>, field: Field) -> Result<()> {
        insert_root(&mut self.mutation, OperationKind::Mutation, name.into(), field)
    }

    /// Add a field to the subscription root
    pub fn add_subscription(
        &mut self,
        name: impl Into<String>,
        field: SubscriptionField,
    ) -> Result<()> {
        insert_root(
            &mut self.subscription,
            OperationKind::Subscription,
            name.into(),
            field,
        )
    }

    /// Register a named type
    pub fn add_type(&mut self, name: impl Into<String>, ty: impl Into<Type>) -> Result<()> {
        let name = name.into();
        if self.types.contains_key(&name) {
            return Err(Error::Schema(format!("type {name} is defined more than once")));
        }
        self.types.insert(name, ty.into());
        Ok(())
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn has_root_field(&self, kind: OperationKind, name: &str) -> bool {
        match kind {
            OperationKind::Query => self.query.contains_key(name),
            OperationKind::Mutation => self.mutation.contains_key(name),
            OperationKind::Subscription => self.subscription.contains_key(name),
        }
    }
}

fn insert_root<F>(
    fields: &mut IndexMap<String, F>,
    kind: OperationKind,
    name: String,
    field: F,
) -> Result<()> {
    if fields.contains_key(&name) {
        return Err(Error::Schema(format!(
            "root field {}.{} is defined more than once",
            kind.default_root_type(),
            name
        )));
    }
    fields.insert(name, field);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql::dynamic::{FieldFuture, Object, TypeRef};

    fn field(name: &str) -> Field {
        Field::new(name, TypeRef::named(TypeRef::INT), |_| {
            FieldFuture::new(async { Ok(Some(async_graphql::Value::from(1))) })
        })
    }

    #[test]
    fn duplicate_contributions_are_rejected() {
        let mut parts = SchemaParts::new();
        parts.add_query("a", field("a")).unwrap();
        assert!(parts.add_query("a", field("a")).is_err());
        parts.add_mutation("a", field("a")).unwrap();
        assert!(parts.has_root_field(OperationKind::Mutation, "a"));

        parts.add_type("Thing", Object::new("Thing").field(field("x"))).unwrap();
        let err = parts
            .add_type("Thing", Object::new("Thing").field(field("x")))
            .unwrap_err();
        assert!(err.to_string().contains("Thing"));
    }
}
