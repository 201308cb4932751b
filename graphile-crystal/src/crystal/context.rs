use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;

use super::crystal_object::CrystalObjectArena;
use super::crystal_object::NewCrystalObject;
use super::uid;
use super::CrystalObject;
use super::CrystalObjectId;
use super::PathIdentity;
use super::PlanId;
use super::UniqueId;
use crate::json_ext::Value;

static NEXT_CRYSTAL_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// The identity a raw parent value was given under a value plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValuePlanId {
    pub value_id: UniqueId,
    /// Whether the value had been seen before under the same plan.
    pub existed: bool,
}

struct ValuePlanEntry {
    // Held so the address used as key cannot be reused while the entry lives.
    _data: Arc<Value>,
    value_id: UniqueId,
}

/// Per-operation execution state shared by every batch of an aether.
///
/// The context owns every crystal object created during the operation, and
/// the identities assigned to raw values entering value plans.
pub struct CrystalContext {
    id: u64,
    arena: CrystalObjectArena,
    root_crystal_object: CrystalObject,
    value_plan_ids: Mutex<HashMap<(PlanId, usize), ValuePlanEntry>>,
    value_plan_objects: Mutex<HashMap<(PlanId, UniqueId), CrystalObject>>,
    trace_crystal_objects: bool,
}

impl CrystalContext {
    pub fn new(root_value: Arc<Value>, trace_crystal_objects: bool) -> Self {
        let id = NEXT_CRYSTAL_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        let arena = CrystalObjectArena::default();
        let root_crystal_object = arena.alloc(
            NewCrystalObject {
                context_id: id,
                plan_id: None,
                path_identity: PathIdentity::root(),
                id: uid("root"),
                indices: Vec::new(),
                data: root_value,
            },
            &[],
        );
        Self {
            id,
            arena,
            root_crystal_object,
            value_plan_ids: Default::default(),
            value_plan_objects: Default::default(),
            trace_crystal_objects,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The crystal object representing the operation's root value.
    pub fn root_crystal_object(&self) -> &CrystalObject {
        &self.root_crystal_object
    }

    /// Creates a crystal object below `parent`, or below the root if there is none.
    pub fn new_crystal_object(
        &self,
        plan_id: Option<PlanId>,
        path_identity: PathIdentity,
        id: UniqueId,
        indices: Vec<usize>,
        data: Arc<Value>,
        parent: Option<&CrystalObject>,
    ) -> CrystalObject {
        let parent = parent.unwrap_or(&self.root_crystal_object);
        debug_assert_eq!(parent.context_id(), self.id);
        let crystal_object = self.arena.alloc(
            NewCrystalObject {
                context_id: self.id,
                plan_id,
                path_identity,
                id,
                indices,
                data,
            },
            parent.ancestry(),
        );
        if self.trace_crystal_objects {
            tracing::debug!(
                "constructed {} below {} with data {}",
                crystal_object,
                parent,
                crystal_object.data()
            );
        }
        crystal_object
    }

    pub fn crystal_object(&self, id: CrystalObjectId) -> Option<CrystalObject> {
        self.arena.get(id)
    }

    /// The nearest ancestor of `crystal_object` (itself included) at `path_identity`.
    pub fn ancestor(
        &self,
        crystal_object: &CrystalObject,
        path_identity: &str,
    ) -> Option<CrystalObject> {
        crystal_object
            .ancestry()
            .iter()
            .rev()
            .filter_map(|id| self.arena.get(*id))
            .find(|ancestor| ancestor.path_identity().as_str() == path_identity)
    }

    /// The list indices of the ancestor at `path_identity`.
    pub fn indices_at(
        &self,
        crystal_object: &CrystalObject,
        path_identity: &str,
    ) -> Option<Vec<usize>> {
        self.ancestor(crystal_object, path_identity)
            .map(|ancestor| ancestor.indices().to_vec())
    }

    /// Every ancestor of `crystal_object`, root first, itself last.
    pub fn ancestors(&self, crystal_object: &CrystalObject) -> Vec<CrystalObject> {
        crystal_object
            .ancestry()
            .iter()
            .filter_map(|id| self.arena.get(*id))
            .collect()
    }

    /// Assigns `object` a stable identity under the value plan `plan_id`.
    ///
    /// The same value (by address) always receives the same identity.
    pub fn get_value_plan_id(&self, plan_id: PlanId, object: &Arc<Value>) -> ValuePlanId {
        let key = (plan_id, Arc::as_ptr(object) as usize);
        let mut value_plan_ids = self.value_plan_ids.lock();
        if let Some(entry) = value_plan_ids.get(&key) {
            return ValuePlanId {
                value_id: entry.value_id.clone(),
                existed: true,
            };
        }
        let value_id = uid("value");
        value_plan_ids.insert(
            key,
            ValuePlanEntry {
                _data: object.clone(),
                value_id: value_id.clone(),
            },
        );
        ValuePlanId {
            value_id,
            existed: false,
        }
    }

    /// Records `crystal_object` as the value of the value plan `plan_id`.
    pub fn populate_value_plan(&self, plan_id: PlanId, crystal_object: &CrystalObject) {
        self.value_plan_objects
            .lock()
            .insert((plan_id, crystal_object.id().clone()), crystal_object.clone());
    }

    pub fn value_plan_object(&self, plan_id: PlanId, value_id: &UniqueId) -> Option<CrystalObject> {
        self.value_plan_objects
            .lock()
            .get(&(plan_id, value_id.clone()))
            .cloned()
    }

    /// The number of crystal objects created so far, the root included.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for CrystalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrystalContext")
            .field("id", &self.id)
            .field("crystal_objects", &self.arena.len())
            .finish()
    }
}
