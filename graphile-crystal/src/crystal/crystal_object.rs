use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::RwLock;

use super::PathIdentity;
use super::PlanId;
use crate::json_ext::Value;

static NEXT_UNIQUE_ID: AtomicU64 = AtomicU64::new(1);

/// An opaque identifier, unique for the lifetime of the process.
///
/// The label only helps when reading logs; equality is by serial.
#[derive(Clone, Debug)]
pub struct UniqueId {
    serial: u64,
    label: Arc<str>,
}

/// Allocates a fresh [`UniqueId`].
pub fn uid(label: &str) -> UniqueId {
    UniqueId {
        serial: NEXT_UNIQUE_ID.fetch_add(1, Ordering::Relaxed),
        label: Arc::from(label),
    }
}

impl UniqueId {
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl PartialEq for UniqueId {
    fn eq(&self, other: &Self) -> bool {
        self.serial == other.serial
    }
}

impl Eq for UniqueId {}

impl Hash for UniqueId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.serial.hash(state);
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.label, self.serial)
    }
}

/// The position of a crystal object within its context's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CrystalObjectId(pub(crate) usize);

/// A plan-aware handle standing for one resolved object.
///
/// A crystal object is immutable once created. Its ancestry lists the arena
/// ids of every crystal object between the operation root and itself, root
/// first and itself last.
#[derive(Clone)]
pub struct CrystalObject(Arc<CrystalObjectInner>);

struct CrystalObjectInner {
    arena_id: CrystalObjectId,
    context_id: u64,
    plan_id: Option<PlanId>,
    path_identity: PathIdentity,
    id: UniqueId,
    indices: Vec<usize>,
    data: Arc<Value>,
    ancestry: Arc<[CrystalObjectId]>,
}

impl CrystalObject {
    pub fn arena_id(&self) -> CrystalObjectId {
        self.0.arena_id
    }

    /// The id of the crystal context that owns this object.
    pub fn context_id(&self) -> u64 {
        self.0.context_id
    }

    /// The plan that produced this object; `None` for the operation root.
    pub fn plan_id(&self) -> Option<PlanId> {
        self.0.plan_id
    }

    pub fn path_identity(&self) -> &PathIdentity {
        &self.0.path_identity
    }

    pub fn id(&self) -> &UniqueId {
        &self.0.id
    }

    /// The position of this object within the lists returned by its field.
    pub fn indices(&self) -> &[usize] {
        &self.0.indices
    }

    pub fn data(&self) -> &Arc<Value> {
        &self.0.data
    }

    pub fn ancestry(&self) -> &[CrystalObjectId] {
        &self.0.ancestry
    }

    pub fn ptr_eq(&self, other: &CrystalObject) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for CrystalObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for CrystalObject {}

impl fmt::Display for CrystalObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CO({}/{}", self.0.path_identity, self.0.id)?;
        for index in &self.0.indices {
            write!(f, "[{index}]")?;
        }
        f.write_str(")")
    }
}

impl fmt::Debug for CrystalObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrystalObject")
            .field("path_identity", &self.0.path_identity)
            .field("id", &self.0.id)
            .field("indices", &self.0.indices)
            .field("data", &self.0.data)
            .finish()
    }
}

/// The fields of a crystal object about to be allocated.
pub(crate) struct NewCrystalObject {
    pub(crate) context_id: u64,
    pub(crate) plan_id: Option<PlanId>,
    pub(crate) path_identity: PathIdentity,
    pub(crate) id: UniqueId,
    pub(crate) indices: Vec<usize>,
    pub(crate) data: Arc<Value>,
}

/// Append-only storage of the crystal objects of one context.
#[derive(Default)]
pub(crate) struct CrystalObjectArena {
    objects: RwLock<Vec<CrystalObject>>,
}

impl CrystalObjectArena {
    /// Stores a new object whose ancestry is `parent_ancestry` followed by itself.
    pub(crate) fn alloc(
        &self,
        new: NewCrystalObject,
        parent_ancestry: &[CrystalObjectId],
    ) -> CrystalObject {
        let mut objects = self.objects.write();
        let arena_id = CrystalObjectId(objects.len());
        let ancestry: Arc<[CrystalObjectId]> = parent_ancestry
            .iter()
            .copied()
            .chain(std::iter::once(arena_id))
            .collect();
        let crystal_object = CrystalObject(Arc::new(CrystalObjectInner {
            arena_id,
            context_id: new.context_id,
            plan_id: new.plan_id,
            path_identity: new.path_identity,
            id: new.id,
            indices: new.indices,
            data: new.data,
            ancestry,
        }));
        objects.push(crystal_object.clone());
        crystal_object
    }

    pub(crate) fn get(&self, id: CrystalObjectId) -> Option<CrystalObject> {
        self.objects.read().get(id.0).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.read().len()
    }
}
