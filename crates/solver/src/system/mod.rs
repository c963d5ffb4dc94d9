//! Constraint-system tree for DOF-reduction solving.
//!
//! Nodes live in a [`SlotMap`] arena and refer to objects only by
//! [`ObjectIndex`], so a whole tree can be cloned into the cache and
//! remapped onto a new object table without touching the document.

mod build;
mod solve;
pub mod unions;

use std::fmt::Write as _;

use slotmap::{new_key_type, SlotMap};

use crate::dof::Dof;
use crate::variables::ObjectIndex;

pub(crate) use build::constraint_equations;
pub use build::{
    build_constraint_system, capture_constraint_features, capture_feature, select_root_object, ConstraintFeatures,
};
pub use unions::{FeatureFrame, UnionGeometry};

new_key_type! {
    pub struct SystemId;
}

/// How a node's constraint equation was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveMethod {
    /// Structural node with no equation.
    Structural,
    AlreadySatisfied,
    Analytical,
    Newton { iterations: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SystemKind {
    Empty,
    /// Anchors one object with zero freedoms.
    FixedObject { object: ObjectIndex },
    /// Adds an unconstrained object with six raw freedoms.
    AddFreeObjects { object: ObjectIndex },
    Union {
        /// Position of the originating constraint in the constraint list.
        constraint: usize,
        geometry: UnionGeometry,
    },
}

impl SystemKind {
    pub fn name(&self) -> &'static str {
        match self {
            SystemKind::Empty => "EmptySystem",
            SystemKind::FixedObject { .. } => "FixedObjectSystem",
            SystemKind::AddFreeObjects { .. } => "AddFreeObjectsUnion",
            SystemKind::Union { geometry, .. } => geometry.name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemNode {
    pub parent: Option<SystemId>,
    pub kind: SystemKind,
    /// Constraint name, or the object name for structural nodes.
    pub label: String,
    /// Resolved placement vector after this node.
    pub x: Vec<f64>,
    /// Freedoms left after this node.
    pub dofs: Vec<Dof>,
    pub contained: Vec<ObjectIndex>,
    /// Constraint error after solving.
    pub error: f64,
    pub method: SolveMethod,
}

impl SystemNode {
    pub fn contains_object(&self, object: ObjectIndex) -> bool {
        self.contained.contains(&object)
    }

    pub fn dof_count(&self) -> usize {
        self.dofs.len()
    }

    pub(crate) fn remap(&mut self, map: &impl Fn(ObjectIndex) -> ObjectIndex) {
        for o in &mut self.contained {
            *o = map(*o);
        }
        for d in &mut self.dofs {
            d.remap(map);
        }
        match &mut self.kind {
            SystemKind::Empty => {}
            SystemKind::FixedObject { object } | SystemKind::AddFreeObjects { object } => {
                *object = map(*object);
            }
            SystemKind::Union { geometry, .. } => geometry.remap(map),
        }
    }
}

/// An arena-backed chain of constraint systems from the anchor to the leaf.
#[derive(Debug, Clone)]
pub struct ConstraintSystem {
    nodes: SlotMap<SystemId, SystemNode>,
    root: SystemId,
    leaf: SystemId,
    /// Leaf after the `i`-th constraint was absorbed.
    checkpoints: Vec<SystemId>,
}

impl ConstraintSystem {
    pub fn new(root: SystemNode) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(root);
        Self {
            nodes,
            root,
            leaf: root,
            checkpoints: Vec::new(),
        }
    }

    pub fn root(&self) -> &SystemNode {
        &self.nodes[self.root]
    }

    pub fn leaf(&self) -> &SystemNode {
        &self.nodes[self.leaf]
    }

    pub fn leaf_id(&self) -> SystemId {
        self.leaf
    }

    pub fn node(&self, id: SystemId) -> Option<&SystemNode> {
        self.nodes.get(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn checkpoints(&self) -> &[SystemId] {
        &self.checkpoints
    }

    /// Resolved placement vector of the leaf.
    pub fn x(&self) -> &[f64] {
        &self.leaf().x
    }

    pub fn dof_count(&self) -> usize {
        self.leaf().dof_count()
    }

    pub fn contains_object(&self, object: ObjectIndex) -> bool {
        self.leaf().contains_object(object)
    }

    /// Append a child of the current leaf and make it the new leaf.
    pub(crate) fn push(&mut self, mut node: SystemNode) -> SystemId {
        node.parent = Some(self.leaf);
        let id = self.nodes.insert(node);
        self.leaf = id;
        id
    }

    pub(crate) fn checkpoint(&mut self) {
        self.checkpoints.push(self.leaf);
    }

    /// Nodes from the root to the leaf.
    pub fn path(&self) -> Vec<(SystemId, &SystemNode)> {
        let mut out = Vec::new();
        let mut cursor = Some(self.leaf);
        while let Some(id) = cursor {
            let node = &self.nodes[id];
            out.push((id, node));
            cursor = node.parent;
        }
        out.reverse();
        out
    }

    /// Cut the chain back to the state after `constraints` constraints.
    /// Nodes past the cut are dropped from the arena.
    pub fn truncate(&mut self, constraints: usize) {
        let keep_leaf = match constraints {
            0 => self.root,
            n => match self.checkpoints.get(n - 1) {
                Some(&id) => id,
                None => return,
            },
        };
        let keep: Vec<SystemId> = {
            let mut ids = Vec::new();
            let mut cursor = Some(keep_leaf);
            while let Some(id) = cursor {
                ids.push(id);
                cursor = self.nodes[id].parent;
            }
            ids
        };
        self.nodes.retain(|id, _| keep.contains(&id));
        self.checkpoints.truncate(constraints);
        self.leaf = keep_leaf;
    }

    pub(crate) fn remap(&mut self, map: &impl Fn(ObjectIndex) -> ObjectIndex) {
        for (_, node) in self.nodes.iter_mut() {
            node.remap(map);
        }
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut SystemNode> {
        self.nodes.values_mut()
    }

    /// Human-readable dump of the chain, one node per line.
    pub fn trace(&self, object_name: &dyn Fn(ObjectIndex) -> String) -> String {
        let mut out = String::new();
        for (depth, (_, node)) in self.path().into_iter().enumerate() {
            let objects: Vec<String> = node.contained.iter().map(|&o| object_name(o)).collect();
            let _ = write!(
                out,
                "{depth:>3} {} [{}] dofs={} error={:.3e} objects={}",
                node.kind.name(),
                node.label,
                node.dofs.len(),
                node.error,
                objects.join(",")
            );
            match node.method {
                SolveMethod::Newton { iterations } => {
                    let _ = write!(out, " newton({iterations})");
                }
                SolveMethod::Analytical => out.push_str(" analytical"),
                _ => {}
            }
            out.push('\n');
            for d in &node.dofs {
                let _ = writeln!(out, "      {d}");
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(label: &str, dofs: usize) -> SystemNode {
        SystemNode {
            parent: None,
            kind: SystemKind::Empty,
            label: label.to_string(),
            x: vec![],
            dofs: (0..dofs).map(|_| Dof::linear(0, mate_kernel::Vec3::X, None)).collect(),
            contained: vec![0],
            error: 0.0,
            method: SolveMethod::Structural,
        }
    }

    #[test]
    fn push_links_parent_and_moves_leaf() {
        let mut sys = ConstraintSystem::new(node("root", 0));
        let root = sys.leaf_id();
        let child = sys.push(node("c1", 2));
        assert_eq!(sys.leaf_id(), child);
        assert_eq!(sys.node(child).unwrap().parent, Some(root));
        assert_eq!(sys.dof_count(), 2);
        assert_eq!(sys.path().len(), 2);
    }

    #[test]
    fn truncate_restores_checkpoint() {
        let mut sys = ConstraintSystem::new(node("root", 0));
        sys.push(node("c1", 3));
        sys.checkpoint();
        sys.push(node("c2a", 2));
        sys.push(node("c2b", 1));
        sys.checkpoint();
        sys.truncate(1);
        assert_eq!(sys.leaf().label, "c1");
        assert_eq!(sys.node_count(), 2);
        assert_eq!(sys.checkpoints().len(), 1);
        sys.truncate(0);
        assert_eq!(sys.leaf().label, "root");
    }

    #[test]
    fn trace_lists_every_node() {
        let mut sys = ConstraintSystem::new(node("root", 0));
        sys.push(node("c1", 1));
        let t = sys.trace(&|o| format!("obj{o}"));
        assert_eq!(t.lines().filter(|l| l.contains("EmptySystem")).count(), 2);
        assert!(t.contains("LinearMotion"));
    }
}
