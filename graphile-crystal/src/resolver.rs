//! The field resolution contract between the host GraphQL engine and resolvers.

use std::fmt::Debug;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use derivative::Derivative;
use once_cell::sync::Lazy;

use crate::crystal::AetherCache;
use crate::crystal::CrystalObject;
use crate::error::CrystalError;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::json_ext::Value;
use crate::spec::Operation;
use crate::spec::OutputType;
use crate::spec::Schema;

/// The parent value a field is resolved against.
#[derive(Clone, Debug)]
pub enum FieldSource {
    /// A plain value produced by a resolver that is not backed by a plan.
    Raw(Arc<Value>),
    /// A plan-backed handle.
    Crystal(CrystalObject),
}

impl FieldSource {
    /// The underlying data, unwrapping crystal objects.
    pub fn data(&self) -> &Value {
        match self {
            FieldSource::Raw(value) => value,
            FieldSource::Crystal(crystal_object) => crystal_object.data(),
        }
    }

    /// Unwraps a crystal object to the exact data it was built from.
    pub fn into_data(self) -> Arc<Value> {
        match self {
            FieldSource::Raw(value) => value,
            FieldSource::Crystal(crystal_object) => crystal_object.data().clone(),
        }
    }
}

/// The value a resolver produces for a field.
///
/// Lists may nest arbitrarily and mix crystal objects with nulls.
#[derive(Clone, Debug)]
pub enum FieldValue {
    Null,
    Raw(Arc<Value>),
    Crystal(CrystalObject),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Raw(value) => value.is_null(),
            FieldValue::Crystal(_) | FieldValue::List(_) => false,
        }
    }

    pub fn as_crystal_object(&self) -> Option<&CrystalObject> {
        match self {
            FieldValue::Crystal(crystal_object) => Some(crystal_object),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        if value.is_null() {
            FieldValue::Null
        } else {
            FieldValue::Raw(Arc::new(value))
        }
    }
}

/// One segment of the execution path of a field, linked to its predecessor.
///
/// Field segments carry the name of the type that contains the field; list
/// index segments carry no type name.
#[derive(Debug)]
pub struct ResolvePath {
    pub prev: Option<Arc<ResolvePath>>,
    pub key: PathElement,
    pub typename: Option<String>,
}

impl ResolvePath {
    /// The path of a root field.
    pub fn root(key: impl Into<String>, typename: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            prev: None,
            key: PathElement::Key(key.into()),
            typename: Some(typename.into()),
        })
    }

    /// The path of a field selected on the object found at `prev`.
    pub fn field(
        prev: &Arc<ResolvePath>,
        key: impl Into<String>,
        typename: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            prev: Some(prev.clone()),
            key: PathElement::Key(key.into()),
            typename: Some(typename.into()),
        })
    }

    /// The path of the item at `index` of the list found at `prev`.
    pub fn index(prev: &Arc<ResolvePath>, index: usize) -> Arc<Self> {
        Arc::new(Self {
            prev: Some(prev.clone()),
            key: PathElement::Index(index),
            typename: None,
        })
    }

    /// The response path of this position, e.g. `users/2/posts`.
    pub fn to_response_path(&self) -> Path {
        let mut elements = vec![self.key.clone()];
        let mut current = self.prev.as_deref();
        while let Some(segment) = current {
            elements.push(segment.key.clone());
            current = segment.prev.as_deref();
        }
        elements.reverse();
        Path(elements)
    }

    /// The list indices locating this position within the lists returned by
    /// the nearest enclosing field, outermost first.
    pub fn trailing_indices(&self) -> Vec<usize> {
        let mut indices = Vec::new();
        let mut current = Some(self);
        while let Some(segment) = current {
            match (&segment.key, &segment.typename) {
                (PathElement::Index(index), None) => indices.push(*index),
                _ => break,
            }
            current = segment.prev.as_deref();
        }
        indices.reverse();
        indices
    }
}

/// Everything a resolver knows about the field being resolved.
#[derive(Clone, Debug)]
pub struct ResolveInfo {
    pub field_name: String,
    pub parent_type: String,
    pub return_type: OutputType,
    pub path: Arc<ResolvePath>,
    pub schema: Arc<Schema>,
    pub operation: Arc<Operation>,
    pub variables: Arc<Object>,
    pub root_value: Arc<Value>,
}

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// The per-request resolution context.
///
/// It carries the request's user data and the aether cache owned by the
/// request-handling layer.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct ResolveContext {
    id: u64,
    data: Arc<Object>,
    #[derivative(Debug = "ignore")]
    aethers: Arc<AetherCache>,
}

impl ResolveContext {
    pub fn new(data: Arc<Object>, aethers: Arc<AetherCache>) -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            data,
            aethers,
        }
    }

    /// Identifies this context within aether cache keys.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn data(&self) -> &Arc<Object> {
        &self.data
    }

    pub fn aethers(&self) -> &Arc<AetherCache> {
        &self.aethers
    }
}

/// A field's resolve (or subscribe) function.
#[async_trait]
pub trait FieldResolver: Send + Sync + Debug {
    async fn resolve(
        &self,
        source: FieldSource,
        args: &Object,
        ctx: &ResolveContext,
        info: &ResolveInfo,
    ) -> Result<FieldValue, CrystalError>;

    /// Whether this resolver already intercepts resolution through plans.
    fn is_crystal_wrapped(&self) -> bool {
        false
    }
}

/// Reads the property named after the field from the parent's data.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultFieldResolver;

#[async_trait]
impl FieldResolver for DefaultFieldResolver {
    async fn resolve(
        &self,
        source: FieldSource,
        _args: &Object,
        _ctx: &ResolveContext,
        info: &ResolveInfo,
    ) -> Result<FieldValue, CrystalError> {
        Ok(match source.data().get(&info.field_name) {
            None | Some(Value::Null) => FieldValue::Null,
            Some(value) => FieldValue::Raw(Arc::new(value.clone())),
        })
    }
}

static DEFAULT_FIELD_RESOLVER: Lazy<Arc<dyn FieldResolver>> =
    Lazy::new(|| Arc::new(DefaultFieldResolver));

/// The shared [`DefaultFieldResolver`].
pub fn default_field_resolver() -> Arc<dyn FieldResolver> {
    DEFAULT_FIELD_RESOLVER.clone()
}

type ResolveFn =
    dyn Fn(&FieldSource, &Object, &ResolveInfo) -> Result<FieldValue, CrystalError> + Send + Sync;

/// A synchronous resolver built from a closure.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct FnResolver {
    name: String,
    #[derivative(Debug = "ignore")]
    resolve: Arc<ResolveFn>,
}

impl FnResolver {
    pub fn new<F>(name: impl Into<String>, resolve: F) -> Self
    where
        F: Fn(&FieldSource, &Object, &ResolveInfo) -> Result<FieldValue, CrystalError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            resolve: Arc::new(resolve),
        }
    }
}

#[async_trait]
impl FieldResolver for FnResolver {
    async fn resolve(
        &self,
        source: FieldSource,
        args: &Object,
        _ctx: &ResolveContext,
        info: &ResolveInfo,
    ) -> Result<FieldValue, CrystalError> {
        (self.resolve)(&source, args, info)
    }
}
