//! Arena storage for octree nodes and the structural operations on it: insertion,
//! removal, splitting, merging and a full rebuild over larger bounds.
//!
//! Nodes live in a `Vec` and refer to each other by `NodeId`. A parent link is an index,
//! never an owning pointer, so walking upwards is a plain loop.

use std::collections::HashMap;

use log::{debug, error};

use crate::engine_state::config::OctreeConfig;
use crate::engine_state::spatial::bounded_object::{ObjectId, ObjectRef};
use crate::engine_state::spatial::bounds::BoundingBox;

/// Index of a node inside the arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// An object stored in a leaf together with the bounds it was indexed with.
#[derive(Clone, Debug)]
pub struct ResidentObject {
    pub object: ObjectRef,
    pub bounds: BoundingBox,
}

#[derive(Debug)]
pub struct OctreeNode {
    /// The node's cell. Children split it into eight equal octants.
    pub bounds: BoundingBox,
    /// `bounds` grown to cover every object stored in this subtree.
    pub loose: BoundingBox,
    pub parent: Option<NodeId>,
    pub children: Option<[NodeId; 8]>,
    /// Only leaves hold objects.
    pub objects: Vec<ResidentObject>,
    pub depth: u32,
    /// Number of objects in this subtree.
    pub count: usize,
}

impl OctreeNode {
    fn new(bounds: BoundingBox, parent: Option<NodeId>, depth: u32) -> Self {
        Self {
            bounds,
            loose: bounds,
            parent,
            children: None,
            objects: Vec::new(),
            depth,
            count: 0,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }
}

/// The node arena plus the object-to-leaf lookup.
pub(crate) struct NodeArena {
    nodes: Vec<Option<OctreeNode>>,
    free: Vec<usize>,
    root: NodeId,
    placements: HashMap<ObjectId, NodeId>,
    max_objects_per_node: usize,
    min_objects_per_node: usize,
    max_depth: u32,
}

impl NodeArena {
    pub fn new(bounds: BoundingBox, config: &OctreeConfig) -> Self {
        Self {
            nodes: vec![Some(OctreeNode::new(bounds, None, 0))],
            free: Vec::new(),
            root: NodeId(0),
            placements: HashMap::new(),
            max_objects_per_node: config.max_objects_per_node.max(1),
            min_objects_per_node: config.min_objects_per_node,
            max_depth: config.max_depth,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &OctreeNode {
        // Every reachable id refers to an allocated slot.
        match &self.nodes[id.0] {
            Some(node) => node,
            None => unreachable!("octree node {:?} was freed", id),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut OctreeNode {
        match &mut self.nodes[id.0] {
            Some(node) => node,
            None => unreachable!("octree node {:?} was freed", id),
        }
    }

    fn allocate(&mut self, node: OctreeNode) -> NodeId {
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    fn release(&mut self, id: NodeId) {
        self.nodes[id.0] = None;
        self.free.push(id.0);
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.placements.contains_key(&id)
    }

    pub fn placement(&self, id: ObjectId) -> Option<NodeId> {
        self.placements.get(&id).copied()
    }

    pub fn resident(&self, id: ObjectId) -> Option<&ResidentObject> {
        let node = self.node(self.placement(id)?);
        node.objects.iter().find(|r| r.object.id() == id)
    }

    /// Stores `resident` in the leaf whose cell contains its centre.
    ///
    /// # Returns
    /// `false` if the centre lies outside the root cell; nothing is changed then.
    pub fn insert(&mut self, resident: ResidentObject) -> bool {
        let center = resident.bounds.center();
        if !self.node(self.root).bounds.contains_point(center) {
            return false;
        }

        let mut current = self.root;
        loop {
            let node = self.node_mut(current);
            node.count += 1;
            node.loose = node.loose.union(&resident.bounds);
            match node.children {
                Some(children) => current = children[node.bounds.octant_of(center)],
                None => break,
            }
        }

        self.placements.insert(resident.object.id(), current);
        let (max_objects, max_depth) = (self.max_objects_per_node, self.max_depth);
        let leaf = self.node_mut(current);
        leaf.objects.push(resident);
        if leaf.objects.len() > max_objects && leaf.depth < max_depth {
            self.split(current);
        }
        true
    }

    /// Turns a leaf into an inner node and pushes its objects down into eight children.
    /// Children that end up over capacity are split in turn, down to the depth limit.
    pub fn split(&mut self, id: NodeId) {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let (bounds, depth, residents) = {
                let node = self.node_mut(id);
                if !node.is_leaf() {
                    continue;
                }
                (node.bounds, node.depth, std::mem::take(&mut node.objects))
            };

            let octants = bounds.octants();
            let children: [NodeId; 8] = std::array::from_fn(|i| {
                self.allocate(OctreeNode::new(octants[i], Some(id), depth + 1))
            });
            self.node_mut(id).children = Some(children);

            for resident in residents {
                let child = children[bounds.octant_of(resident.bounds.center())];
                self.placements.insert(resident.object.id(), child);
                let node = self.node_mut(child);
                node.count += 1;
                node.loose = node.loose.union(&resident.bounds);
                node.objects.push(resident);
            }

            for child in children {
                let node = self.node(child);
                if node.objects.len() > self.max_objects_per_node && node.depth < self.max_depth {
                    pending.push(child);
                }
            }
            debug!("Split octree node {:?} at depth {}", id, depth);
        }
    }

    /// Removes an object from its leaf and merges the largest underfull subtree above it.
    pub fn remove(&mut self, id: ObjectId) -> Option<ResidentObject> {
        let leaf = self.placements.remove(&id)?;
        let node = self.node_mut(leaf);
        let position = node.objects.iter().position(|r| r.object.id() == id)?;
        let resident = node.objects.swap_remove(position);

        let mut merge_target = None;
        let mut current = Some(leaf);
        while let Some(node_id) = current {
            let min = self.min_objects_per_node;
            let node = self.node_mut(node_id);
            node.count -= 1;
            if !node.is_leaf() && node.count < min {
                merge_target = Some(node_id);
            }
            current = node.parent;
        }

        if let Some(target) = merge_target {
            self.merge(target);
        }
        self.tighten(merge_target.unwrap_or(leaf));
        Some(resident)
    }

    /// Recomputes the loose bounds of `from` and each of its ancestors from the objects
    /// and children they hold.
    fn tighten(&mut self, from: NodeId) {
        let mut current = Some(from);
        while let Some(node_id) = current {
            let node = self.node(node_id);
            let mut loose = node.objects.iter().fold(node.bounds, |loose, resident| {
                loose.union(&resident.bounds)
            });
            if let Some(children) = node.children {
                for child in children {
                    loose = loose.union(&self.node(child).loose);
                }
            }
            let parent = node.parent;
            self.node_mut(node_id).loose = loose;
            current = parent;
        }
    }

    /// Collapses a subtree into a single leaf holding every object below it.
    pub fn merge(&mut self, id: NodeId) {
        let Some(children) = self.node_mut(id).children.take() else {
            return;
        };

        let mut collected = Vec::new();
        let mut stack: Vec<NodeId> = children.to_vec();
        while let Some(node_id) = stack.pop() {
            if let Some(node) = self.nodes[node_id.0].take() {
                if let Some(grandchildren) = node.children {
                    stack.extend(grandchildren);
                }
                collected.extend(node.objects);
            }
            self.free.push(node_id.0);
        }

        let node = self.node_mut(id);
        let mut loose = node.bounds;
        for resident in &collected {
            loose = loose.union(&resident.bounds);
        }
        node.loose = loose;
        for resident in &collected {
            self.placements.insert(resident.object.id(), id);
        }
        debug!("Merged octree node {:?} ({} objects)", id, collected.len());
        self.node_mut(id).objects = collected;
    }

    /// Replaces the tree with an empty one over `bounds` and re-inserts every object.
    pub fn rebuild(&mut self, bounds: BoundingBox) {
        let mut residents = Vec::with_capacity(self.placements.len());
        for slot in self.nodes.iter_mut() {
            if let Some(node) = slot.take() {
                residents.extend(node.objects);
            }
        }

        self.nodes = vec![Some(OctreeNode::new(bounds, None, 0))];
        self.free.clear();
        self.root = NodeId(0);
        self.placements.clear();

        for resident in residents {
            let id = resident.object.id();
            if !self.insert(resident) {
                error!("Object {} fell outside the rebuilt octree", id);
            }
        }
    }

    /// Updates the stored bounds of an object that stays in its leaf and recomputes the
    /// loose bounds on the path to the root.
    pub fn refresh_in_place(&mut self, id: ObjectId, bounds: BoundingBox) -> bool {
        let Some(leaf) = self.placement(id) else {
            return false;
        };
        if !self.node(leaf).bounds.contains_point(bounds.center()) {
            return false;
        }

        let node = self.node_mut(leaf);
        if let Some(resident) = node.objects.iter_mut().find(|r| r.object.id() == id) {
            resident.bounds = bounds;
        }
        self.tighten(leaf);
        true
    }

    /// Checks the structural invariants, returning the first violation found.
    #[cfg(test)]
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut seen = 0usize;
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            let mut subtree = node.objects.len();
            match node.children {
                Some(children) => {
                    if !node.objects.is_empty() {
                        return Err(format!("inner node {:?} holds objects", id));
                    }
                    for child in children {
                        if self.node(child).parent != Some(id) {
                            return Err(format!("child {:?} has wrong parent", child));
                        }
                        subtree += self.node(child).count;
                        stack.push(child);
                    }
                }
                None => {
                    if node.depth > self.max_depth {
                        return Err(format!("leaf {:?} exceeds max depth", id));
                    }
                }
            }
            if subtree != node.count {
                return Err(format!(
                    "node {:?} counts {} but holds {}",
                    id, node.count, subtree
                ));
            }
            for resident in &node.objects {
                seen += 1;
                if self.placement(resident.object.id()) != Some(id) {
                    return Err(format!("object {} misplaced", resident.object.id()));
                }
                if !node.bounds.contains_point(resident.bounds.center()) {
                    return Err(format!("object {} centre outside its leaf", resident.object.id()));
                }
                if !node.loose.contains_box(&resident.bounds) {
                    return Err(format!("object {} outside loose bounds", resident.object.id()));
                }
            }
        }
        if seen != self.placements.len() {
            return Err(format!(
                "{} objects stored but {} placements recorded",
                seen,
                self.placements.len()
            ));
        }
        Ok(())
    }
}
