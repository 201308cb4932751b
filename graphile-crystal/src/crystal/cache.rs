use std::collections::HashMap;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;

use derivative::Derivative;
use parking_lot::Mutex;

use super::Aether;
use super::OperationPlanner;
use crate::configuration::ExecutionConfig;
use crate::error::CrystalError;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::resolver::ResolveContext;
use crate::resolver::ResolveInfo;
use crate::spec::Operation;
use crate::spec::Schema;

/// Identifies one execution of one operation.
///
/// Every component is compared by identity, never by value: two requests
/// sending equal documents still get distinct aethers.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct AetherKey {
    #[derivative(Debug = "ignore")]
    schema: Arc<Schema>,
    #[derivative(Debug = "ignore")]
    operation: Arc<Operation>,
    variables: Arc<Object>,
    context_id: u64,
    root_value: Arc<Value>,
}

impl AetherKey {
    pub fn new(
        schema: Arc<Schema>,
        operation: Arc<Operation>,
        variables: Arc<Object>,
        context_id: u64,
        root_value: Arc<Value>,
    ) -> Self {
        Self {
            schema,
            operation,
            variables,
            context_id,
            root_value,
        }
    }

    pub fn from_resolve_info(info: &ResolveInfo, ctx: &ResolveContext) -> Self {
        Self::new(
            info.schema.clone(),
            info.operation.clone(),
            info.variables.clone(),
            ctx.id(),
            info.root_value.clone(),
        )
    }

    pub fn context_id(&self) -> u64 {
        self.context_id
    }

    fn addresses(&self) -> [usize; 4] {
        [
            Arc::as_ptr(&self.schema) as usize,
            Arc::as_ptr(&self.operation) as usize,
            Arc::as_ptr(&self.variables) as usize,
            Arc::as_ptr(&self.root_value) as usize,
        ]
    }
}

impl PartialEq for AetherKey {
    fn eq(&self, other: &Self) -> bool {
        self.context_id == other.context_id && self.addresses() == other.addresses()
    }
}

impl Eq for AetherKey {}

impl Hash for AetherKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addresses().hash(state);
        self.context_id.hash(state);
    }
}

/// The aethers of every operation currently executing.
///
/// An aether is planned the first time one of its fields is resolved, and is
/// shared by every later resolution with the same [`AetherKey`]. Planning
/// failures are cached too so that every field reports the same error.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct AetherCache {
    #[derivative(Debug = "ignore")]
    planner: Arc<dyn OperationPlanner>,
    config: ExecutionConfig,
    #[derivative(Debug = "ignore")]
    cached: Mutex<HashMap<AetherKey, Result<Arc<Aether>, CrystalError>>>,
}

impl AetherCache {
    pub fn new(planner: Arc<dyn OperationPlanner>, config: ExecutionConfig) -> Self {
        Self {
            planner,
            config,
            cached: Default::default(),
        }
    }

    /// Returns the aether of `key`, planning the operation if needed.
    pub fn establish(&self, key: &AetherKey) -> Result<Arc<Aether>, CrystalError> {
        self.cached
            .lock()
            .entry(key.clone())
            .or_insert_with(|| {
                tracing::debug!(
                    operation = key.operation.name.as_deref().unwrap_or_default(),
                    "planning operation"
                );
                let graph = self
                    .planner
                    .plan(&key.schema, &key.operation, &key.variables)
                    .map_err(|err| {
                        tracing::warn!("planning failed: {}", err);
                        err
                    })?;
                Ok(Arc::new(Aether::new(
                    graph,
                    key.root_value.clone(),
                    &self.config,
                )))
            })
            .clone()
    }

    /// Forgets the aether of `key`; returns whether there was one.
    pub fn release(&self, key: &AetherKey) -> bool {
        self.cached.lock().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.cached.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cached.lock().is_empty()
    }
}
