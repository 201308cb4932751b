use std::future::Future;
use std::sync::Arc;

use super::BatchRef;
use super::BatchScheduler;
use super::CrystalContext;
use super::Drive;
use super::PathIdentity;
use super::Plan;
use super::PlanGraph;
use super::PlanId;
use super::ValuePlanId;
use crate::configuration::ExecutionConfig;
use crate::error::CrystalError;
use crate::json_ext::Value;
use crate::resolver::FieldSource;

/// The execution state of one operation: its plan graph, its crystal context
/// and the batches waiting on its plans.
#[derive(Debug)]
pub struct Aether {
    graph: PlanGraph,
    crystal_context: Arc<CrystalContext>,
    scheduler: BatchScheduler,
}

impl Aether {
    pub fn new(graph: PlanGraph, root_value: Arc<Value>, config: &ExecutionConfig) -> Self {
        Self {
            graph,
            crystal_context: Arc::new(CrystalContext::new(
                root_value,
                config.trace_crystal_objects,
            )),
            scheduler: BatchScheduler::new(config.max_batch_size),
        }
    }

    pub fn plans(&self) -> &PlanGraph {
        &self.graph
    }

    pub fn plan_id(&self, path_identity: &str) -> Option<PlanId> {
        self.graph.plan_id(path_identity)
    }

    pub fn item_plan_id(&self, path_identity: &str) -> Option<PlanId> {
        self.graph.item_plan_id(path_identity)
    }

    pub fn plan(&self, plan_id: PlanId) -> Option<&Plan> {
        self.graph.plan(plan_id)
    }

    pub fn crystal_context(&self) -> &Arc<CrystalContext> {
        &self.crystal_context
    }

    pub fn scheduler(&self) -> &BatchScheduler {
        &self.scheduler
    }

    /// Returns the open batch of the plan at `path_identity`, opening one if needed.
    pub fn get_batch(
        &self,
        path_identity: &PathIdentity,
        parent: &FieldSource,
    ) -> Result<BatchRef, CrystalError> {
        let missing_plan = || CrystalError::MissingPlan {
            path_identity: path_identity.to_string(),
        };
        let plan_id = self.plan_id(path_identity).ok_or_else(missing_plan)?;
        let plan = self.plan(plan_id).ok_or_else(missing_plan)?;
        if let FieldSource::Crystal(crystal_object) = parent {
            if crystal_object.context_id() != self.crystal_context.id() {
                return Err(CrystalError::ForeignCrystalObject {
                    crystal_object: crystal_object.to_string(),
                });
            }
        }
        let batch = BatchRef::new(plan_id, plan.clone(), self.crystal_context.clone());
        self.scheduler.open(&batch);
        Ok(batch)
    }

    /// Assigns the raw value `parent_object` an identity under the value plan `plan_id`.
    pub fn get_value_plan_id(
        &self,
        plan_id: PlanId,
        parent_object: &Arc<Value>,
        path_identity: &PathIdentity,
    ) -> ValuePlanId {
        let value_plan_id = self
            .crystal_context
            .get_value_plan_id(plan_id, parent_object);
        tracing::trace!(
            "value plan {} gave {} identity {} at '{}'",
            plan_id,
            if value_plan_id.existed { "known" } else { "new" },
            value_plan_id.value_id,
            path_identity
        );
        value_plan_id
    }

    /// Runs `operation`, flushing this aether's batches whenever it stalls.
    pub fn drive<F: Future>(&self, operation: F) -> Drive<'_, F> {
        self.scheduler.drive(operation)
    }
}
