//! Namespace hierarchy tree and the flat-to-tree builder
//!
//! Directories under `namespaces/` become [`TreeNode`]s. A directory holding
//! exactly one Namespace object is a namespace; every other directory is an
//! abstract namespace that only exists to carry inheritable objects.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::error::{ValidationError, ValidationErrors};
use crate::object::{ObjectModel, base_name, normalize_path, parent_dir};
use crate::root::{FlatRoot, NAMESPACES_DIR, TreeRoot};

/// Kind of a directory in the namespace hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    /// Organizes inheritable configuration; not a live namespace
    AbstractNamespace,
    /// Maps 1:1 to a live namespace; must be a leaf
    Namespace,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::AbstractNamespace => write!(f, "abstract namespace"),
            NodeKind::Namespace => write!(f, "namespace"),
        }
    }
}

/// One directory in the namespace hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    /// Directory path relative to the repository root, e.g. `namespaces/eng/frontend`
    pub path: String,

    pub kind: NodeKind,

    /// Objects declared in this directory, in input order. Hydration appends
    /// inherited copies after them.
    pub objects: Vec<ObjectModel>,

    /// Subdirectories, ordered by path
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn new(path: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            objects: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Directory name; for a namespace node this is the namespace name
    pub fn name(&self) -> &str {
        base_name(&self.path)
    }

    pub fn is_namespace(&self) -> bool {
        self.kind == NodeKind::Namespace
    }

    /// Visit this node and all descendants, parents before children
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a TreeNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Mutable pre-order traversal
    pub fn walk_mut(&mut self, visit: &mut impl FnMut(&mut TreeNode)) {
        visit(self);
        for child in &mut self.children {
            child.walk_mut(visit);
        }
    }

    /// Find a node by its directory path
    pub fn find(&self, path: &str) -> Option<&TreeNode> {
        if self.path == path {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(path))
    }

    /// All namespace nodes in this subtree, in traversal order
    pub fn namespaces(&self) -> Vec<&TreeNode> {
        let mut found = Vec::new();
        self.walk(&mut |node| {
            if node.is_namespace() {
                found.push(node);
            }
        });
        found
    }

    pub fn has_namespace_descendant(&self) -> bool {
        self.children
            .iter()
            .any(|child| child.is_namespace() || child.has_namespace_descendant())
    }

    /// Total objects in this subtree
    pub fn object_count(&self) -> usize {
        self.objects.len()
            + self
                .children
                .iter()
                .map(TreeNode::object_count)
                .sum::<usize>()
    }
}

/// Converts a [`FlatRoot`] into a [`TreeRoot`]
#[derive(Debug, Clone)]
pub struct TreeBuilder {
    root_dir: String,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            root_dir: NAMESPACES_DIR.to_string(),
        }
    }

    /// Use a different directory as the hierarchy root
    pub fn with_root_dir(mut self, root_dir: impl Into<String>) -> Self {
        self.root_dir = normalize_path(&root_dir.into());
        self
    }

    pub fn root_dir(&self) -> &str {
        &self.root_dir
    }

    /// Build the namespace tree.
    ///
    /// Every namespace-scope object lands in exactly one node. Objects outside
    /// the root directory are reported, never dropped.
    pub fn build(&self, flat: FlatRoot) -> Result<TreeRoot, ValidationErrors> {
        let FlatRoot {
            cluster_objects,
            cluster_registry_objects,
            namespace_objects,
            system_objects,
        } = flat;

        let mut errors = ValidationErrors::new();
        let mut directories: BTreeMap<String, Vec<ObjectModel>> = BTreeMap::new();

        for object in namespace_objects {
            let dir = object.directory().to_string();
            if !self.contains(&dir) {
                errors.push(ValidationError::ObjectOutsideTree {
                    source_path: object.source.clone(),
                    root: self.root_dir.clone(),
                });
                continue;
            }
            self.insert_ancestors(&mut directories, &dir);
            directories.entry(dir).or_default().push(object);
        }
        errors.into_result()?;

        let tree = if directories.is_empty() {
            None
        } else {
            let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for dir in directories.keys().filter(|d| **d != self.root_dir) {
                children
                    .entry(parent_dir(dir).to_string())
                    .or_default()
                    .push(dir.clone());
            }
            let tree = build_node(self.root_dir.clone(), &mut directories, &children);
            debug!(
                root = %tree.path,
                namespaces = tree.namespaces().len(),
                objects = tree.object_count(),
                "built namespace tree"
            );
            Some(tree)
        };

        Ok(TreeRoot {
            cluster_objects,
            cluster_registry_objects,
            system_objects,
            tree,
        })
    }

    fn contains(&self, dir: &str) -> bool {
        dir == self.root_dir
            || dir
                .strip_prefix(self.root_dir.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Make sure every directory between the root and `dir` has an entry
    fn insert_ancestors(&self, directories: &mut BTreeMap<String, Vec<ObjectModel>>, dir: &str) {
        let mut current = dir;
        while current != self.root_dir {
            current = parent_dir(current);
            directories.entry(current.to_string()).or_default();
        }
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn build_node(
    path: String,
    directories: &mut BTreeMap<String, Vec<ObjectModel>>,
    children: &BTreeMap<String, Vec<String>>,
) -> TreeNode {
    let objects = directories.remove(&path).unwrap_or_default();
    let kind = if objects.iter().filter(|o| o.is_namespace()).count() == 1 {
        NodeKind::Namespace
    } else {
        NodeKind::AbstractNamespace
    };

    let child_nodes = children
        .get(&path)
        .map(|paths| {
            paths
                .iter()
                .map(|child| build_node(child.clone(), directories, children))
                .collect()
        })
        .unwrap_or_default();

    TreeNode {
        path,
        kind,
        objects,
        children: child_nodes,
    }
}

/// Build a tree rooted at the default `namespaces` directory
pub fn build_tree(flat: FlatRoot) -> Result<TreeRoot, ValidationErrors> {
    TreeBuilder::new().build(flat)
}
