//! Owned type model of one remote schema.
//!
//! A remote endpoint's SDL is parsed once per discovery into a [`Subschema`]. The
//! assembler builds dynamic types from it (after renaming), and root-field
//! resolvers use it to re-root the client's selection on the remote's original
//! type names when rendering the forwarded operation.

use crate::error::{Error, Result};
use crate::transform::{is_reserved_type, NameTransform};
use crate::types::OperationKind;
use async_graphql::indexmap::IndexMap;
use async_graphql::{Name, SelectionField, Value as GqlValue};
use graphql_parser::schema::{self as ast, Definition, TypeDefinition, TypeExtension};
use std::collections::HashMap;
use std::fmt::Write;

/// Federation plumbing that never leaves the subschema
const FEDERATION_TYPES: [&str; 3] = ["_Service", "_Any", "_Entity"];
const FEDERATION_ROOT_FIELDS: [&str; 2] = ["_service", "_entities"];

#[derive(Debug, Clone, PartialEq)]
pub enum TypeRefDef {
    Named(String),
    List(Box<TypeRefDef>),
    NonNull(Box<TypeRefDef>),
}

impl TypeRefDef {
    /// Innermost named type
    pub fn named(&self) -> &str {
        match self {
            TypeRefDef::Named(name) => name,
            TypeRefDef::List(inner) | TypeRefDef::NonNull(inner) => inner.named(),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeRefDef::NonNull(_))
    }

    fn renamed(&self, transform: &NameTransform) -> Self {
        match self {
            TypeRefDef::Named(name) => TypeRefDef::Named(transform.rename_type(name)),
            TypeRefDef::List(inner) => TypeRefDef::List(Box::new(inner.renamed(transform))),
            TypeRefDef::NonNull(inner) => TypeRefDef::NonNull(Box::new(inner.renamed(transform))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputValueDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRefDef,
    pub default_value: Option<GqlValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub description: Option<String>,
    pub args: Vec<InputValueDef>,
    pub ty: TypeRefDef,
    pub deprecation: Option<Deprecation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Deprecation {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub implements: Vec<String>,
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionDef {
    pub name: String,
    pub description: Option<String>,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValueDef {
    pub name: String,
    pub description: Option<String>,
    pub deprecation: Option<Deprecation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub name: String,
    pub description: Option<String>,
    pub values: Vec<EnumValueDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: Vec<InputValueDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalarDef {
    pub name: String,
    pub description: Option<String>,
}

/// One named type of a remote schema
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDef {
    Scalar(ScalarDef),
    Object(ObjectDef),
    Interface(ObjectDef),
    Union(UnionDef),
    Enum(EnumDef),
    InputObject(InputObjectDef),
}

impl TypeDef {
    pub fn name(&self) -> &str {
        match self {
            TypeDef::Scalar(t) => &t.name,
            TypeDef::Object(t) | TypeDef::Interface(t) => &t.name,
            TypeDef::Union(t) => &t.name,
            TypeDef::Enum(t) => &t.name,
            TypeDef::InputObject(t) => &t.name,
        }
    }

    /// Same definition with every type name (its own and referenced ones) renamed.
    pub fn renamed(&self, transform: &NameTransform) -> TypeDef {
        let rename_fields = |fields: &[FieldDef]| -> Vec<FieldDef> {
            fields
                .iter()
                .map(|f| FieldDef {
                    ty: f.ty.renamed(transform),
                    args: f.args.iter().map(|a| rename_input(a, transform)).collect(),
                    ..f.clone()
                })
                .collect()
        };
        let rename_object = |o: &ObjectDef| ObjectDef {
            name: transform.rename_type(&o.name),
            description: o.description.clone(),
            implements: o.implements.iter().map(|i| transform.rename_type(i)).collect(),
            fields: rename_fields(&o.fields),
        };

        match self {
            TypeDef::Scalar(s) => TypeDef::Scalar(ScalarDef {
                name: transform.rename_type(&s.name),
                description: s.description.clone(),
            }),
            TypeDef::Object(o) => TypeDef::Object(rename_object(o)),
            TypeDef::Interface(o) => TypeDef::Interface(rename_object(o)),
            TypeDef::Union(u) => TypeDef::Union(UnionDef {
                name: transform.rename_type(&u.name),
                description: u.description.clone(),
                members: u.members.iter().map(|m| transform.rename_type(m)).collect(),
            }),
            TypeDef::Enum(e) => TypeDef::Enum(EnumDef {
                name: transform.rename_type(&e.name),
                ..e.clone()
            }),
            TypeDef::InputObject(i) => TypeDef::InputObject(InputObjectDef {
                name: transform.rename_type(&i.name),
                description: i.description.clone(),
                fields: i.fields.iter().map(|f| rename_input(f, transform)).collect(),
            }),
        }
    }

    fn fields(&self) -> &[FieldDef] {
        match self {
            TypeDef::Object(o) | TypeDef::Interface(o) => &o.fields,
            _ => &[],
        }
    }
}

fn rename_input(value: &InputValueDef, transform: &NameTransform) -> InputValueDef {
    InputValueDef {
        ty: value.ty.renamed(transform),
        ..value.clone()
    }
}

/// How values of a type come back from the remote and must be handed to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    /// Scalars and concrete objects pass through
    Plain,
    /// Enum values arrive as JSON strings
    Enum,
    /// Interfaces and unions need their `__typename` resolved
    Abstract,
}

/// Parsed schema of one remote endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Subschema {
    query_type: String,
    mutation_type: Option<String>,
    subscription_type: Option<String>,
    types: Vec<TypeDef>,
    index: HashMap<String, usize>,
    possible: HashMap<String, Vec<String>>,
}

impl Subschema {
    /// Parse SDL text.
    pub fn parse(sdl: &str) -> Result<Self> {
        let document = ast::parse_schema::<String>(sdl)
            .map_err(|e| Error::Schema(format!("invalid SDL: {e}")))?;

        let mut roots: [Option<String>; 3] = [None, None, None];
        let mut types: Vec<TypeDef> = Vec::new();
        let mut extensions = Vec::new();

        for definition in document.definitions {
            match definition {
                Definition::SchemaDefinition(schema) => {
                    roots = [schema.query, schema.mutation, schema.subscription];
                }
                Definition::TypeDefinition(def) => types.push(convert_type(def)?),
                Definition::TypeExtension(TypeExtension::Object(ext)) => extensions.push(ext),
                Definition::TypeExtension(_) | Definition::DirectiveDefinition(_) => {}
            }
        }

        for ext in extensions {
            let fields = ext
                .fields
                .into_iter()
                .map(convert_field)
                .collect::<Result<Vec<_>>>()?;
            match types.iter_mut().find(|t| t.name() == ext.name) {
                Some(TypeDef::Object(obj)) => {
                    obj.implements.extend(ext.implements_interfaces);
                    obj.fields.extend(fields);
                }
                Some(_) => {
                    return Err(Error::Schema(format!(
                        "type extension of non-object type {}",
                        ext.name
                    )))
                }
                None => types.push(TypeDef::Object(ObjectDef {
                    name: ext.name,
                    description: None,
                    implements: ext.implements_interfaces,
                    fields,
                })),
            }
        }

        let index: HashMap<String, usize> = types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name().to_string(), i))
            .collect();

        let [query, mutation, subscription] = roots;
        let defaulted = |explicit: Option<String>, kind: OperationKind| {
            explicit.or_else(|| {
                let name = kind.default_root_type();
                index.contains_key(name).then(|| name.to_string())
            })
        };
        let query_type = defaulted(query, OperationKind::Query)
            .unwrap_or_else(|| OperationKind::Query.default_root_type().to_string());
        let mutation_type = defaulted(mutation, OperationKind::Mutation);
        let subscription_type = defaulted(subscription, OperationKind::Subscription);

        let mut possible: HashMap<String, Vec<String>> = HashMap::new();
        for ty in &types {
            match ty {
                TypeDef::Union(u) => {
                    possible
                        .entry(u.name.clone())
                        .or_default()
                        .extend(u.members.iter().cloned());
                }
                TypeDef::Object(o) => {
                    for iface in &o.implements {
                        possible.entry(iface.clone()).or_default().push(o.name.clone());
                    }
                }
                _ => {}
            }
        }

        Ok(Self {
            query_type,
            mutation_type,
            subscription_type,
            types,
            index,
            possible,
        })
    }

    /// Name of the remote root type for an operation kind
    pub fn root_type(&self, kind: OperationKind) -> Option<&str> {
        match kind {
            OperationKind::Query => Some(self.query_type.as_str()),
            OperationKind::Mutation => self.mutation_type.as_deref(),
            OperationKind::Subscription => self.subscription_type.as_deref(),
        }
    }

    /// Fields of a root type that are exported through the gateway
    pub fn root_fields(&self, kind: OperationKind) -> impl Iterator<Item = &FieldDef> {
        self.root_type(kind)
            .and_then(|name| self.get(name))
            .map(TypeDef::fields)
            .unwrap_or(&[])
            .iter()
            .filter(|f| !FEDERATION_ROOT_FIELDS.contains(&f.name.as_str()))
    }

    /// Types contributed to the unified schema: everything except root types,
    /// built-in scalars and federation plumbing.
    pub fn exported_types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.iter().filter(move |t| {
            let name = t.name();
            !is_reserved_type(name)
                && !FEDERATION_TYPES.contains(&name)
                && !self.is_root(name)
        })
    }

    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.index.get(name).map(|&i| &self.types[i])
    }

    fn is_root(&self, name: &str) -> bool {
        name == self.query_type
            || self.mutation_type.as_deref() == Some(name)
            || self.subscription_type.as_deref() == Some(name)
    }

    fn field(&self, type_name: &str, field: &str) -> Option<&FieldDef> {
        self.get(type_name)?.fields().iter().find(|f| f.name == field)
    }

    fn is_composite(&self, type_name: &str) -> bool {
        matches!(
            self.get(type_name),
            Some(TypeDef::Object(_) | TypeDef::Interface(_) | TypeDef::Union(_))
        )
    }

    /// How values of the named type must be handed to the engine
    pub fn output_shape(&self, type_name: &str) -> OutputShape {
        match self.get(type_name) {
            Some(TypeDef::Interface(_) | TypeDef::Union(_)) => OutputShape::Abstract,
            Some(TypeDef::Enum(_)) => OutputShape::Enum,
            _ => OutputShape::Plain,
        }
    }

    fn possible_types(&self, type_name: &str) -> &[String] {
        self.possible
            .get(type_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Render the operation forwarded for one root field.
    ///
    /// `remote_field` is the field's original name on the remote root type; the
    /// selection keeps the client's response key as alias.
    pub fn render_operation(
        &self,
        kind: OperationKind,
        remote_field: &str,
        selection: &Selection,
    ) -> Result<String> {
        let root = self.root_type(kind).ok_or_else(|| {
            Error::Internal(format!("remote schema has no {} root", kind.keyword()))
        })?;
        let mut out = String::new();
        out.push_str(kind.keyword());
        out.push_str(" { ");
        self.render_field(root, remote_field, selection, &mut out);
        out.push_str(" }");
        Ok(out)
    }

    fn render_field(&self, parent: &str, name: &str, selection: &Selection, out: &mut String) {
        let key = selection.response_key();
        if key != name {
            let _ = write!(out, "{key}: ");
        }
        out.push_str(name);

        if !selection.arguments.is_empty() {
            let args = selection
                .arguments
                .iter()
                .map(|(arg, value)| format!("{arg}: {value}"))
                .collect::<Vec<_>>();
            let _ = write!(out, "({})", args.join(", "));
        }

        if let Some(field) = self.field(parent, name) {
            let ty = field.ty.named();
            if self.is_composite(ty) {
                out.push(' ');
                self.render_selection_set(ty, &selection.children, out);
            }
        }
    }

    fn render_selection_set(&self, type_name: &str, children: &[Selection], out: &mut String) {
        let is_abstract = self.output_shape(type_name) == OutputShape::Abstract;
        let mut items: Vec<String> = Vec::new();
        let mut push = |item: String| {
            if !items.contains(&item) {
                items.push(item);
            }
        };

        if is_abstract {
            push("__typename".to_string());
        }

        for child in children {
            if child.name == "__typename" || self.field(type_name, &child.name).is_some() {
                let mut rendered = String::new();
                self.render_field(type_name, &child.name, child, &mut rendered);
                push(rendered);
            } else if is_abstract {
                for possible in self.possible_types(type_name) {
                    if self.field(possible, &child.name).is_some() {
                        let mut rendered = format!("... on {possible} {{ ");
                        self.render_field(possible, &child.name, child, &mut rendered);
                        rendered.push_str(" }");
                        push(rendered);
                    }
                }
            }
        }

        if items.is_empty() {
            items.push("__typename".to_string());
        }

        out.push_str("{ ");
        out.push_str(&items.join(" "));
        out.push_str(" }");
    }
}

/// Owned copy of one selected field, with variables already substituted
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Vec<(Name, GqlValue)>,
    pub children: Vec<Selection>,
}

impl Selection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            alias: None,
            name: name.into(),
            arguments: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn argument(mut self, name: &str, value: impl Into<GqlValue>) -> Self {
        self.arguments.push((Name::new(name), value.into()));
        self
    }

    pub fn child(mut self, child: Selection) -> Self {
        self.children.push(child);
        self
    }

    /// Key the field's value is returned under
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Copy the engine's view of a selected field.
    pub fn from_field(field: &SelectionField<'_>) -> Result<Self> {
        let arguments = field
            .arguments()
            .map_err(|e| Error::InvalidRequest(e.message))?;
        let children = field
            .selection_set()
            .map(|child| Selection::from_field(&child))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            alias: field.alias().map(str::to_string),
            name: field.name().to_string(),
            arguments,
            children,
        })
    }
}

fn convert_type(def: TypeDefinition<'_, String>) -> Result<TypeDef> {
    Ok(match def {
        TypeDefinition::Scalar(s) => TypeDef::Scalar(ScalarDef {
            name: s.name,
            description: s.description,
        }),
        TypeDefinition::Object(o) => TypeDef::Object(ObjectDef {
            name: o.name,
            description: o.description,
            implements: o.implements_interfaces,
            fields: o.fields.into_iter().map(convert_field).collect::<Result<_>>()?,
        }),
        TypeDefinition::Interface(i) => TypeDef::Interface(ObjectDef {
            name: i.name,
            description: i.description,
            implements: Vec::new(),
            fields: i.fields.into_iter().map(convert_field).collect::<Result<_>>()?,
        }),
        TypeDefinition::Union(u) => TypeDef::Union(UnionDef {
            name: u.name,
            description: u.description,
            members: u.types,
        }),
        TypeDefinition::Enum(e) => TypeDef::Enum(EnumDef {
            name: e.name,
            description: e.description,
            values: e
                .values
                .into_iter()
                .map(|v| EnumValueDef {
                    deprecation: deprecation(&v.directives),
                    name: v.name,
                    description: v.description,
                })
                .collect(),
        }),
        TypeDefinition::InputObject(i) => TypeDef::InputObject(InputObjectDef {
            name: i.name,
            description: i.description,
            fields: i
                .fields
                .into_iter()
                .map(convert_input_value)
                .collect::<Result<_>>()?,
        }),
    })
}

fn convert_field(field: ast::Field<'_, String>) -> Result<FieldDef> {
    Ok(FieldDef {
        deprecation: deprecation(&field.directives),
        args: field
            .arguments
            .into_iter()
            .map(convert_input_value)
            .collect::<Result<_>>()?,
        ty: convert_type_ref(field.field_type),
        name: field.name,
        description: field.description,
    })
}

fn convert_input_value(value: ast::InputValue<'_, String>) -> Result<InputValueDef> {
    Ok(InputValueDef {
        default_value: value.default_value.map(const_value).transpose()?,
        ty: convert_type_ref(value.value_type),
        name: value.name,
        description: value.description,
    })
}

fn convert_type_ref(ty: ast::Type<'_, String>) -> TypeRefDef {
    match ty {
        ast::Type::NamedType(name) => TypeRefDef::Named(name),
        ast::Type::ListType(inner) => TypeRefDef::List(Box::new(convert_type_ref(*inner))),
        ast::Type::NonNullType(inner) => TypeRefDef::NonNull(Box::new(convert_type_ref(*inner))),
    }
}

fn deprecation(directives: &[ast::Directive<'_, String>]) -> Option<Deprecation> {
    let directive = directives.iter().find(|d| d.name == "deprecated")?;
    let reason = directive
        .arguments
        .iter()
        .find(|(name, _)| name == "reason")
        .and_then(|(_, value)| match value {
            ast::Value::String(reason) => Some(reason.clone()),
            _ => None,
        });
    Some(Deprecation { reason })
}

fn const_value(value: ast::Value<'_, String>) -> Result<GqlValue> {
    Ok(match value {
        ast::Value::Int(n) => n
            .as_i64()
            .map(GqlValue::from)
            .ok_or_else(|| Error::Schema("integer default value out of range".into()))?,
        ast::Value::Float(f) => GqlValue::from(f),
        ast::Value::String(s) => GqlValue::String(s),
        ast::Value::Boolean(b) => GqlValue::Boolean(b),
        ast::Value::Null => GqlValue::Null,
        ast::Value::Enum(e) => GqlValue::Enum(Name::new(e)),
        ast::Value::List(items) => GqlValue::List(
            items
                .into_iter()
                .map(const_value)
                .collect::<Result<Vec<_>>>()?,
        ),
        ast::Value::Object(map) => {
            let mut obj = IndexMap::new();
            for (key, value) in map {
                obj.insert(Name::new(key), const_value(value)?);
            }
            GqlValue::Object(obj)
        }
        ast::Value::Variable(name) => {
            return Err(Error::Schema(format!(
                "variable ${name} is not allowed in a default value"
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PETS: &str = r#"
        schema { query: Root mutation: Mutation }

        type Root {
          pet(id: ID!): Pet
          pets(kind: Kind = DOG, limit: Int = 10): [Pet!]!
          search(text: String!): [SearchResult!]!
          _service: _Service!
        }

        type Mutation { adopt(input: AdoptInput!): Dog }

        interface Pet { id: ID! name: String! }

        type Dog implements Pet { id: ID! name: String! barks: Boolean! owner: Owner }
        type Cat implements Pet { id: ID! name: String! lives: Int @deprecated(reason: "unknowable") }

        type Owner { name: String! }

        union SearchResult = Dog | Owner

        enum Kind { DOG CAT }

        input AdoptInput { petId: ID!, note: String = "welcome" }

        scalar DateTime

        type _Service { sdl: String }

        extend type Owner { since: DateTime }
    "#;

    #[test]
    fn parses_roots_and_exports_non_root_types() {
        let schema = Subschema::parse(PETS).expect("parses");

        assert_eq!(schema.root_type(OperationKind::Query), Some("Root"));
        assert_eq!(schema.root_type(OperationKind::Mutation), Some("Mutation"));
        assert_eq!(schema.root_type(OperationKind::Subscription), None);

        let roots: Vec<_> = schema
            .root_fields(OperationKind::Query)
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(roots, ["pet", "pets", "search"]);

        let exported: Vec<_> = schema.exported_types().map(TypeDef::name).collect();
        assert_eq!(
            exported,
            ["Pet", "Dog", "Cat", "Owner", "SearchResult", "Kind", "AdoptInput", "DateTime"]
        );
    }

    #[test]
    fn applies_object_extensions_and_directives() {
        let schema = Subschema::parse(PETS).expect("parses");

        let Some(TypeDef::Object(owner)) = schema.get("Owner") else {
            panic!("Owner is an object");
        };
        assert_eq!(owner.fields.len(), 2);
        assert_eq!(owner.fields[1].ty, TypeRefDef::Named("DateTime".into()));

        let Some(TypeDef::Object(cat)) = schema.get("Cat") else {
            panic!("Cat is an object");
        };
        let lives = cat.fields.iter().find(|f| f.name == "lives").expect("lives");
        assert_eq!(
            lives.deprecation,
            Some(Deprecation {
                reason: Some("unknowable".into())
            })
        );

        let pets = schema
            .root_fields(OperationKind::Query)
            .find(|f| f.name == "pets")
            .expect("pets");
        assert_eq!(
            pets.args[0].default_value,
            Some(GqlValue::Enum(Name::new("DOG")))
        );
        assert_eq!(pets.args[1].default_value, Some(GqlValue::from(10)));
    }

    #[test]
    fn renaming_reaches_every_reference() {
        let schema = Subschema::parse(PETS).expect("parses");
        let t = NameTransform::new(Some("zoo"));

        let Some(TypeDef::Object(dog)) = schema.get("Dog").map(|d| d.renamed(&t)) else {
            panic!("Dog is an object");
        };
        assert_eq!(dog.name, "ZooDog");
        assert_eq!(dog.implements, ["ZooPet"]);
        let owner = dog.fields.iter().find(|f| f.name == "owner").expect("owner");
        assert_eq!(owner.ty.named(), "ZooOwner");
        let id = dog.fields.iter().find(|f| f.name == "id").expect("id");
        assert_eq!(id.ty.named(), "ID");

        let Some(TypeDef::Union(search)) = schema.get("SearchResult").map(|d| d.renamed(&t))
        else {
            panic!("SearchResult is a union");
        };
        assert_eq!(search.members, ["ZooDog", "ZooOwner"]);
    }

    #[test]
    fn renders_root_field_with_alias_and_arguments() {
        let schema = Subschema::parse(PETS).expect("parses");
        let selection = Selection::new("zooPets")
            .argument("kind", GqlValue::Enum(Name::new("CAT")))
            .argument("limit", 2)
            .child(Selection::new("name"))
            .child(Selection::new("barks"))
            .child(Selection::new("lives").alias("l"));

        let doc = schema
            .render_operation(OperationKind::Query, "pets", &selection)
            .expect("renders");

        assert_eq!(
            doc,
            "query { zooPets: pets(kind: CAT, limit: 2) { __typename name \
             ... on Dog { barks } ... on Cat { l: lives } } }"
        );
        graphql_parser::parse_query::<String>(&doc).expect("forwarded document parses");
    }

    #[test]
    fn renders_union_members_and_nested_objects() {
        let schema = Subschema::parse(PETS).expect("parses");
        let selection = Selection::new("search")
            .argument("text", "rex \"the\" dog")
            .child(Selection::new("name"))
            .child(Selection::new("owner").child(Selection::new("name")));

        let doc = schema
            .render_operation(OperationKind::Query, "search", &selection)
            .expect("renders");

        assert_eq!(
            doc,
            "query { search(text: \"rex \\\"the\\\" dog\") { __typename \
             ... on Dog { name } ... on Owner { name } ... on Dog { owner { name } } } }"
        );
        graphql_parser::parse_query::<String>(&doc).expect("forwarded document parses");
    }

    #[test]
    fn renders_mutation_with_object_argument() {
        let schema = Subschema::parse(PETS).expect("parses");
        let mut input = IndexMap::new();
        input.insert(Name::new("petId"), GqlValue::from("7"));
        let selection = Selection::new("adopt")
            .argument("input", GqlValue::Object(input))
            .child(Selection::new("id"));

        let doc = schema
            .render_operation(OperationKind::Mutation, "adopt", &selection)
            .expect("renders");
        assert_eq!(doc, "mutation { adopt(input: {petId: \"7\"}) { id } }");

        let err = schema
            .render_operation(OperationKind::Subscription, "x", &selection)
            .expect_err("no subscription root");
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn output_shapes() {
        let schema = Subschema::parse(PETS).expect("parses");
        assert_eq!(schema.output_shape("Pet"), OutputShape::Abstract);
        assert_eq!(schema.output_shape("SearchResult"), OutputShape::Abstract);
        assert_eq!(schema.output_shape("Kind"), OutputShape::Enum);
        assert_eq!(schema.output_shape("Dog"), OutputShape::Plain);
        assert_eq!(schema.output_shape("String"), OutputShape::Plain);
    }

    #[test]
    fn rejects_invalid_sdl() {
        assert!(matches!(
            Subschema::parse("type Query { a: }"),
            Err(Error::Schema(_))
        ));
        assert!(Subschema::parse("input Q { a: Int = $x }").is_err());
    }
}
