//! Plans and the per-operation plan graph.

use std::collections::HashMap;
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use derivative::Derivative;
#[cfg(test)]
use mockall::automock;

use super::CrystalContext;
use super::CrystalObject;
use super::PathIdentity;
use crate::error::BoxError;
use crate::error::CrystalError;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::spec::Operation;
use crate::spec::Schema;

static NULL: Value = Value::Null;

/// The index of a plan within its plan graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlanId(pub usize);

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A plan that can compute values for a batch of parents at once.
#[async_trait]
pub trait ExecutablePlan: Send + Sync + Debug {
    /// Returns exactly one value per parent, in the order of `parents`.
    async fn execute(
        &self,
        context: &CrystalContext,
        parents: &[CrystalObject],
    ) -> Result<Vec<Value>, BoxError>;
}

/// A node of the plan graph.
#[derive(Clone, Debug)]
pub enum Plan {
    /// Stands in for parents that were produced without a plan.
    Value(ValuePlan),
    Executable(Arc<dyn ExecutablePlan>),
}

impl Plan {
    pub fn value() -> Self {
        Plan::Value(ValuePlan)
    }

    pub fn executable(plan: impl ExecutablePlan + 'static) -> Self {
        Plan::Executable(Arc::new(plan))
    }

    pub fn is_value_plan(&self) -> bool {
        matches!(self, Plan::Value(_))
    }

    pub(crate) async fn execute(
        &self,
        plan_id: PlanId,
        context: &CrystalContext,
        parents: &[CrystalObject],
    ) -> Result<Vec<Value>, CrystalError> {
        match self {
            Plan::Value(plan) => Ok(plan.execute(parents)),
            Plan::Executable(plan) => {
                plan.execute(context, parents)
                    .await
                    .map_err(|err| CrystalError::PlanFailed {
                        plan_id: plan_id.0,
                        reason: err.to_string(),
                    })
            }
        }
    }
}

/// Represents raw (un-planned) parents so they can be treated as plan-backed.
///
/// Its crystal objects are populated with the raw values through
/// [`CrystalContext::populate_value_plan`], so executing it yields each
/// parent's own data.
#[derive(Clone, Copy, Debug, Default)]
pub struct ValuePlan;

impl ValuePlan {
    fn execute(&self, parents: &[CrystalObject]) -> Vec<Value> {
        parents
            .iter()
            .map(|parent| parent.data().as_ref().clone())
            .collect()
    }
}

/// Reads a key path out of the parent's data, or out of one of its ancestors.
#[derive(Clone, Debug)]
pub struct AccessPlan {
    ancestor: Option<PathIdentity>,
    path: Vec<String>,
}

impl AccessPlan {
    pub fn new<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ancestor: None,
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    /// Reads from the ancestor of the parent found at `ancestor`.
    pub fn from_ancestor<I, S>(ancestor: impl Into<PathIdentity>, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ancestor: Some(ancestor.into()),
            ..Self::new(path)
        }
    }
}

#[async_trait]
impl ExecutablePlan for AccessPlan {
    async fn execute(
        &self,
        context: &CrystalContext,
        parents: &[CrystalObject],
    ) -> Result<Vec<Value>, BoxError> {
        parents
            .iter()
            .map(|parent| -> Result<Value, BoxError> {
                let source = match &self.ancestor {
                    None => parent.clone(),
                    Some(ancestor) => context.ancestor(parent, ancestor).ok_or_else(|| {
                        BoxError::from(format!("{parent} has no ancestor at '{ancestor}'"))
                    })?,
                };
                let value = self
                    .path
                    .iter()
                    .fold(source.data().as_ref(), |value, key| {
                        value.get(key).unwrap_or(&NULL)
                    });
                Ok(value.clone())
            })
            .collect()
    }
}

type BatchFn = dyn Fn(&CrystalContext, &[CrystalObject]) -> Result<Vec<Value>, BoxError>
    + Send
    + Sync;

/// A plan computed by a batch callback.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct LambdaPlan {
    name: String,
    #[derivative(Debug = "ignore")]
    callback: Arc<BatchFn>,
}

impl LambdaPlan {
    pub fn new<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&CrystalContext, &[CrystalObject]) -> Result<Vec<Value>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            callback: Arc::new(callback),
        }
    }

    /// A plan applying `callback` to each parent's data independently.
    pub fn map<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self::new(name, move |_context, parents| {
            parents
                .iter()
                .map(|parent| callback(parent.data().as_ref()))
                .collect()
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl ExecutablePlan for LambdaPlan {
    async fn execute(
        &self,
        context: &CrystalContext,
        parents: &[CrystalObject],
    ) -> Result<Vec<Value>, BoxError> {
        (self.callback)(context, parents)
    }
}

/// The plans of one operation, and which path identities they govern.
#[derive(Clone, Debug, Default)]
pub struct PlanGraph {
    plans: Vec<Plan>,
    plan_id_by_path_identity: HashMap<PathIdentity, PlanId>,
    item_plan_id_by_path_identity: HashMap<PathIdentity, PlanId>,
}

impl PlanGraph {
    pub fn builder() -> PlanGraphBuilder {
        PlanGraphBuilder::default()
    }

    pub fn plan(&self, plan_id: PlanId) -> Option<&Plan> {
        self.plans.get(plan_id.0)
    }

    pub fn plan_id(&self, path_identity: &str) -> Option<PlanId> {
        self.plan_id_by_path_identity.get(path_identity).copied()
    }

    /// The plan governing a single list item of the field at `path_identity`.
    pub fn item_plan_id(&self, path_identity: &str) -> Option<PlanId> {
        self.item_plan_id_by_path_identity
            .get(path_identity)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

/// Assembles a [`PlanGraph`].
#[derive(Debug, Default)]
pub struct PlanGraphBuilder {
    graph: PlanGraph,
}

impl PlanGraphBuilder {
    pub fn add_plan(&mut self, plan: Plan) -> PlanId {
        self.graph.plans.push(plan);
        PlanId(self.graph.plans.len() - 1)
    }

    /// Makes `plan_id` the plan of the field at `path_identity`.
    pub fn bind(&mut self, path_identity: impl Into<PathIdentity>, plan_id: PlanId) -> &mut Self {
        self.graph
            .plan_id_by_path_identity
            .insert(path_identity.into(), plan_id);
        self
    }

    /// Makes `plan_id` the plan of each list item of the field at `path_identity`.
    pub fn bind_item(
        &mut self,
        path_identity: impl Into<PathIdentity>,
        plan_id: PlanId,
    ) -> &mut Self {
        self.graph
            .item_plan_id_by_path_identity
            .insert(path_identity.into(), plan_id);
        self
    }

    pub fn build(self) -> Result<PlanGraph, CrystalError> {
        let len = self.graph.plans.len();
        let dangling = self
            .graph
            .plan_id_by_path_identity
            .iter()
            .chain(self.graph.item_plan_id_by_path_identity.iter())
            .find(|(_, plan_id)| plan_id.0 >= len);
        if let Some((path_identity, plan_id)) = dangling {
            return Err(CrystalError::Planning {
                reason: format!("'{path_identity}' is bound to unknown plan {plan_id}"),
            });
        }
        Ok(self.graph)
    }
}

/// Produces the plan graph of an operation.
///
/// Planning happens before execution starts; every reachable field that
/// should execute through plans must be bound in the returned graph.
#[cfg_attr(test, automock)]
pub trait OperationPlanner: Send + Sync {
    fn plan(
        &self,
        schema: &Schema,
        operation: &Operation,
        variables: &Object,
    ) -> Result<PlanGraph, CrystalError>;
}

impl<F> OperationPlanner for F
where
    F: Fn(&Schema, &Operation, &Object) -> Result<PlanGraph, CrystalError> + Send + Sync,
{
    fn plan(
        &self,
        schema: &Schema,
        operation: &Operation,
        variables: &Object,
    ) -> Result<PlanGraph, CrystalError> {
        self(schema, operation, variables)
    }
}

/// A fixed graph plans every operation the same way.
impl OperationPlanner for PlanGraph {
    fn plan(
        &self,
        _schema: &Schema,
        _operation: &Operation,
        _variables: &Object,
    ) -> Result<PlanGraph, CrystalError> {
        Ok(self.clone())
    }
}
