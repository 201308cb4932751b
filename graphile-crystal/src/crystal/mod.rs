//! Plan-based, batched field resolution.
//!
//! Fields sharing a [`PathIdentity`] are resolved by the same plan, once per
//! batch of parents, instead of once per parent.

mod aether;
mod batch;
mod cache;
mod context;
mod crystal_object;
mod path_identity;
pub(crate) mod plan;
mod resolvers;
mod wrap;

pub use aether::Aether;
pub use batch::BatchKey;
pub use batch::BatchRef;
pub use batch::BatchScheduler;
pub use batch::Drive;
pub use batch::PendingResult;
pub use cache::AetherCache;
pub use cache::AetherKey;
pub use context::CrystalContext;
pub use context::ValuePlanId;
pub use crystal_object::uid;
pub use crystal_object::CrystalObject;
pub use crystal_object::CrystalObjectId;
pub use crystal_object::UniqueId;
pub use path_identity::path_to_path_identity;
pub use path_identity::PathIdentity;
pub use path_identity::ROOT_PATH;
pub use plan::AccessPlan;
pub use plan::ExecutablePlan;
pub use plan::LambdaPlan;
pub use plan::OperationPlanner;
pub use plan::Plan;
pub use plan::PlanGraph;
pub use plan::PlanGraphBuilder;
pub use plan::PlanId;
pub use plan::ValuePlan;
pub use resolvers::crystal_wrap_resolve;
pub use resolvers::crystal_wrap_subscribe;
pub use resolvers::CrystalResolver;
pub use wrap::ResultWrapper;
