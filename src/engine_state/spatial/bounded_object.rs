//! # Bounded Objects
//!
//! Anything stored in a spatial index implements `BoundedObject`. The indices hold
//! objects through `ObjectRef`, a shared handle that compares and hashes by object id so
//! query results can be collected into a `HashSet` without duplicates.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::core::MtResource;
use crate::engine_state::interfaces::{VoxelChange, VoxelListener};

use super::bounds::BoundingBox;

/// Stable identity of a game object.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A game object with an identity and an axis-aligned bounding box.
pub trait BoundedObject: Send + Sync {
    fn id(&self) -> ObjectId;

    /// The object's current bounds. Indices sample this when the object is added or
    /// updated.
    fn bounding_box(&self) -> BoundingBox;

    /// The object as `Any`, for type filters and downcasts.
    fn as_any(&self) -> &dyn Any;

    /// The voxel listener capability, when the object has it.
    fn as_voxel_listener(&self) -> Option<&dyn VoxelListener> {
        None
    }
}

/// Shared handle to an indexed object. Equality and hashing go by `ObjectId`.
#[derive(Clone)]
pub struct ObjectRef(Arc<dyn BoundedObject>);

impl ObjectRef {
    pub fn new(object: Arc<dyn BoundedObject>) -> Self {
        Self(object)
    }

    /// Downcasts to a concrete object type.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.0.as_any().is::<T>()
    }

    pub fn inner(&self) -> &Arc<dyn BoundedObject> {
        &self.0
    }
}

impl<T: BoundedObject + 'static> From<Arc<T>> for ObjectRef {
    fn from(object: Arc<T>) -> Self {
        Self(object)
    }
}

impl Deref for ObjectRef {
    type Target = dyn BoundedObject;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.id() == other.0.id()
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id().hash(state);
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectRef").field(&self.0.id()).finish()
    }
}

/// A query filter accepting only objects of concrete type `T`.
pub fn of_type<T: 'static>() -> impl Fn(&dyn BoundedObject) -> bool {
    |object: &dyn BoundedObject| object.as_any().is::<T>()
}

/// A plain movable object, used by the demo and by tests.
///
/// When created with `listening`, it counts the voxel changes it is told about.
pub struct Body {
    id: ObjectId,
    bounds: MtResource<BoundingBox>,
    listening: bool,
    voxel_events: AtomicUsize,
}

impl Body {
    pub fn new(id: ObjectId, bounds: BoundingBox) -> Self {
        Self {
            id,
            bounds: MtResource::new(bounds),
            listening: false,
            voxel_events: AtomicUsize::new(0),
        }
    }

    pub fn listening(id: ObjectId, bounds: BoundingBox) -> Self {
        Self {
            listening: true,
            ..Self::new(id, bounds)
        }
    }

    /// Moves the body. Indices must be told through `add_update` or a move call.
    pub fn set_bounds(&self, bounds: BoundingBox) {
        *self.bounds.get_mut() = bounds;
    }

    pub fn voxel_events(&self) -> usize {
        self.voxel_events.load(Ordering::Relaxed)
    }
}

impl BoundedObject for Body {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn bounding_box(&self) -> BoundingBox {
        *self.bounds.get()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_voxel_listener(&self) -> Option<&dyn VoxelListener> {
        if self.listening {
            Some(self)
        } else {
            None
        }
    }
}

impl VoxelListener for Body {
    fn on_voxel_changed(&self, _change: &VoxelChange) {
        self.voxel_events.fetch_add(1, Ordering::Relaxed);
    }
}
