//! GraphQL schema handling.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::crystal::crystal_wrap_resolve;
use crate::crystal::crystal_wrap_subscribe;
use crate::error::CrystalError;
use crate::resolver::FieldResolver;
use crate::spec::OperationKind;
use crate::spec::OutputType;

const BUILTIN_SCALARS: [&str; 5] = ["String", "Int", "Float", "Boolean", "ID"];

/// A field of an object type.
#[derive(Clone, Debug)]
pub struct FieldDefinition {
    pub name: String,
    pub ty: OutputType,
    resolver: Option<Arc<dyn FieldResolver>>,
    subscriber: Option<Arc<dyn FieldResolver>>,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, ty: OutputType) -> Self {
        Self {
            name: name.into(),
            ty,
            resolver: None,
            subscriber: None,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn FieldResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_subscriber(mut self, subscriber: Arc<dyn FieldResolver>) -> Self {
        self.subscriber = Some(subscriber);
        self
    }

    /// The resolve function; `None` means the default field resolver.
    pub fn resolver(&self) -> Option<&Arc<dyn FieldResolver>> {
        self.resolver.as_ref()
    }

    pub fn subscriber(&self) -> Option<&Arc<dyn FieldResolver>> {
        self.subscriber.as_ref()
    }
}

/// An object type and its fields, in declaration order.
#[derive(Clone, Debug)]
pub struct ObjectType {
    pub name: String,
    fields: IndexMap<String, FieldDefinition>,
}

impl ObjectType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.values()
    }
}

/// A GraphQL schema.
#[derive(Clone, Debug)]
pub struct Schema {
    query_type: String,
    mutation_type: Option<String>,
    subscription_type: Option<String>,
    object_types: IndexMap<String, ObjectType>,
    leaf_types: HashSet<String>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn query_type(&self) -> &str {
        &self.query_type
    }

    /// The root type an operation of `kind` starts from.
    pub fn root_type(&self, kind: OperationKind) -> Option<&str> {
        match kind {
            OperationKind::Query => Some(self.query_type.as_str()),
            OperationKind::Mutation => self.mutation_type.as_deref(),
            OperationKind::Subscription => self.subscription_type.as_deref(),
        }
    }

    pub fn object_type(&self, name: &str) -> Option<&ObjectType> {
        self.object_types.get(name)
    }

    /// Whether `name` is a scalar or an enum.
    pub fn is_leaf_type(&self, name: &str) -> bool {
        self.leaf_types.contains(name)
    }

    /// Returns a copy of this schema where every field resolves through plans.
    ///
    /// Fields without a resolver get the default field resolver wrapped, and
    /// subscribe functions are wrapped when present. Fails if any field has
    /// already been wrapped.
    pub fn crystallize(&self) -> Result<Schema, CrystalError> {
        let mut schema = self.clone();
        for object_type in schema.object_types.values_mut() {
            for field in object_type.fields.values_mut() {
                field.resolver = Some(crystal_wrap_resolve(field.resolver.clone())?);
                if let Some(subscriber) = field.subscriber.take() {
                    field.subscriber = Some(crystal_wrap_subscribe(subscriber)?);
                }
            }
        }
        Ok(schema)
    }
}

/// Builds a validated [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    query_type: Option<String>,
    mutation_type: Option<String>,
    subscription_type: Option<String>,
    object_types: IndexMap<String, ObjectType>,
    leaf_types: HashSet<String>,
}

impl SchemaBuilder {
    pub fn query_type(mut self, name: impl Into<String>) -> Self {
        self.query_type = Some(name.into());
        self
    }

    pub fn mutation_type(mut self, name: impl Into<String>) -> Self {
        self.mutation_type = Some(name.into());
        self
    }

    pub fn subscription_type(mut self, name: impl Into<String>) -> Self {
        self.subscription_type = Some(name.into());
        self
    }

    pub fn object_type(mut self, object_type: ObjectType) -> Self {
        self.object_types
            .insert(object_type.name.clone(), object_type);
        self
    }

    /// Registers a custom scalar.
    pub fn scalar(mut self, name: impl Into<String>) -> Self {
        self.leaf_types.insert(name.into());
        self
    }

    /// Registers an enum; enums are leaves like scalars.
    pub fn enum_type(self, name: impl Into<String>) -> Self {
        self.scalar(name)
    }

    pub fn build(self) -> Result<Schema, CrystalError> {
        let SchemaBuilder {
            query_type,
            mutation_type,
            subscription_type,
            object_types,
            mut leaf_types,
        } = self;
        leaf_types.extend(BUILTIN_SCALARS.iter().map(|name| name.to_string()));

        let query_type = query_type.ok_or_else(|| invalid_schema("no query type was set"))?;
        for root in std::iter::once(&query_type)
            .chain(mutation_type.as_ref())
            .chain(subscription_type.as_ref())
        {
            if !object_types.contains_key(root) {
                return Err(invalid_schema(format!(
                    "root type '{root}' is not an object type"
                )));
            }
        }
        for name in object_types.keys() {
            if leaf_types.contains(name) {
                return Err(invalid_schema(format!(
                    "'{name}' is defined both as an object type and a leaf type"
                )));
            }
        }
        for object_type in object_types.values() {
            for field in object_type.fields() {
                let named = field.ty.named_type();
                if !object_types.contains_key(named) && !leaf_types.contains(named) {
                    return Err(invalid_schema(format!(
                        "field {}.{} has unknown type '{named}'",
                        object_type.name, field.name
                    )));
                }
            }
        }

        Ok(Schema {
            query_type,
            mutation_type,
            subscription_type,
            object_types,
            leaf_types,
        })
    }
}

fn invalid_schema(reason: impl Into<String>) -> CrystalError {
    CrystalError::Schema {
        reason: reason.into(),
    }
}
