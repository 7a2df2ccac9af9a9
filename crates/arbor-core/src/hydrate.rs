//! Inheritance hydration
//!
//! Copies objects declared on abstract namespaces down into every namespace
//! below them, according to the per-kind [`HierarchyMode`]. The accumulator of
//! inherited objects is passed by value into each branch, so siblings never
//! observe each other's objects and the result does not depend on visit order.

use tracing::debug;

use crate::error::{ValidationError, ValidationErrors};
use crate::hierarchy::{HierarchyMode, HierarchyModes};
use crate::object::ObjectModel;
use crate::root::TreeRoot;
use crate::tree::{NodeKind, TreeNode};
use crate::validate::Hydrator;

/// Propagates inheritable objects from abstract namespaces into namespaces
#[derive(Debug, Clone, Default)]
pub struct InheritanceHydrator {
    /// Overrides what the snapshot's HierarchyConfigs would produce
    modes: Option<HierarchyModes>,
}

impl InheritanceHydrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed set of modes instead of reading HierarchyConfigs from the root
    pub fn with_modes(modes: HierarchyModes) -> Self {
        Self { modes: Some(modes) }
    }

    /// Rewrite the tree in place.
    ///
    /// Errors are collected across the whole tree. A node that produced an
    /// error keeps its original object list.
    pub fn hydrate(&self, root: &mut TreeRoot) -> Result<(), ValidationErrors> {
        let modes = match &self.modes {
            Some(modes) => modes.clone(),
            None => HierarchyModes::from_objects(&root.system_objects),
        };

        let mut errors = ValidationErrors::new();
        if let Some(tree) = root.tree.as_mut() {
            let mut walk = Walk {
                modes: &modes,
                errors: &mut errors,
                copied: 0,
            };
            walk.visit(tree, Vec::new());
            let copied = walk.copied;
            debug!(copied, errors = errors.len(), "hydrated namespace tree");
        }
        errors.into_result()
    }
}

impl Hydrator for InheritanceHydrator {
    fn name(&self) -> &'static str {
        "inheritance"
    }

    fn hydrate(&self, root: &mut TreeRoot) -> Vec<ValidationError> {
        match InheritanceHydrator::hydrate(self, root) {
            Ok(()) => Vec::new(),
            Err(errors) => errors.into_vec(),
        }
    }
}

struct Walk<'a> {
    modes: &'a HierarchyModes,
    errors: &'a mut ValidationErrors,
    copied: usize,
}

impl Walk<'_> {
    fn visit(&mut self, node: &mut TreeNode, inherited: Vec<ObjectModel>) {
        match node.kind {
            NodeKind::AbstractNamespace => self.visit_abstract(node, inherited),
            NodeKind::Namespace => self.visit_namespace(node, inherited),
        }
    }

    fn visit_abstract(&mut self, node: &mut TreeNode, mut inherited: Vec<ObjectModel>) {
        for object in &node.objects {
            if object.is_namespace() || object.is_selector() {
                continue;
            }
            if self.modes.mode_for(&object.group_kind()) == HierarchyMode::None {
                self.errors.push(ValidationError::IllegalAbstractNamespaceObject {
                    group_kind: object.group_kind(),
                    name: object.name.clone(),
                    directory: node.path.clone(),
                    source_path: object.source.clone(),
                });
                continue;
            }
            inherited.push(object.clone());
        }

        for child in &mut node.children {
            self.visit(child, inherited.clone());
        }
    }

    fn visit_namespace(&mut self, node: &mut TreeNode, inherited: Vec<ObjectModel>) {
        if !node.children.is_empty() {
            self.errors.push(ValidationError::IllegalNamespaceSubdirectory {
                directory: node.path.clone(),
                children: node.children.iter().map(|c| c.path.clone()).collect(),
            });
            // Still walk below so errors further down are reported too; this
            // node's own objects are not passed on.
            for child in &mut node.children {
                self.visit(child, inherited.clone());
            }
            return;
        }

        self.copied += inherited.len();
        node.objects.extend(inherited);
    }
}
