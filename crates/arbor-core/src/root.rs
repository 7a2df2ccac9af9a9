//! Declared snapshots in flat and hierarchical form

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ValidationError, ValidationErrors};
use crate::object::{ObjectModel, kinds};
use crate::tree::TreeNode;

/// Top-level directory for each scope
pub const CLUSTER_DIR: &str = "cluster";
pub const CLUSTER_REGISTRY_DIR: &str = "clusterregistry";
pub const NAMESPACES_DIR: &str = "namespaces";
pub const SYSTEM_DIR: &str = "system";

/// Which part of the repository an object was declared in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Scope {
    Cluster,
    ClusterRegistry,
    Namespace,
    System,
}

impl Scope {
    /// Classify a source path by its top-level directory
    pub fn for_path(path: &str) -> Option<Self> {
        let top = path.split('/').next().unwrap_or_default();
        match top {
            CLUSTER_DIR => Some(Scope::Cluster),
            CLUSTER_REGISTRY_DIR => Some(Scope::ClusterRegistry),
            NAMESPACES_DIR => Some(Scope::Namespace),
            SYSTEM_DIR => Some(Scope::System),
            _ => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Cluster => write!(f, "cluster"),
            Scope::ClusterRegistry => write!(f, "clusterregistry"),
            Scope::Namespace => write!(f, "namespace"),
            Scope::System => write!(f, "system"),
        }
    }
}

/// Read access shared by both snapshot forms.
///
/// Validators that only look at individual objects are written against
/// this so they run unchanged before and after the tree is built.
pub trait Root {
    /// Visit every object in every scope
    fn visit_objects(&self, visit: &mut dyn FnMut(Scope, &ObjectModel));

    fn cluster_objects(&self) -> &[ObjectModel];

    fn cluster_registry_objects(&self) -> &[ObjectModel];

    fn system_objects(&self) -> &[ObjectModel];

    /// The Repo singleton, when exactly one is declared
    fn repo(&self) -> Option<&ObjectModel> {
        let mut repos = self.system_objects().iter().filter(|o| o.is(&kinds::repo()));
        match (repos.next(), repos.next()) {
            (Some(repo), None) => Some(repo),
            _ => None,
        }
    }

    fn object_count(&self) -> usize {
        let mut count = 0;
        self.visit_objects(&mut |_, _| count += 1);
        count
    }
}

/// A snapshot with the namespace scope stored as a flat list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatRoot {
    pub cluster_objects: Vec<ObjectModel>,
    pub cluster_registry_objects: Vec<ObjectModel>,
    pub namespace_objects: Vec<ObjectModel>,
    pub system_objects: Vec<ObjectModel>,
}

impl FlatRoot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sort objects into scopes by their top-level directory.
    ///
    /// Objects outside the four known directories are reported rather than
    /// dropped.
    pub fn from_objects(
        objects: impl IntoIterator<Item = ObjectModel>,
    ) -> Result<Self, ValidationErrors> {
        let mut root = Self::new();
        let mut errors = ValidationErrors::new();

        for object in objects {
            match Scope::for_path(&object.source) {
                Some(scope) => root.push(scope, object),
                None => errors.push(ValidationError::UnknownTopLevelDirectory {
                    source_path: object.source.clone(),
                }),
            }
        }

        errors.into_result().map(|()| root)
    }

    pub fn push(&mut self, scope: Scope, object: ObjectModel) {
        match scope {
            Scope::Cluster => self.cluster_objects.push(object),
            Scope::ClusterRegistry => self.cluster_registry_objects.push(object),
            Scope::Namespace => self.namespace_objects.push(object),
            Scope::System => self.system_objects.push(object),
        }
    }
}

impl Root for FlatRoot {
    fn visit_objects(&self, visit: &mut dyn FnMut(Scope, &ObjectModel)) {
        for object in &self.cluster_objects {
            visit(Scope::Cluster, object);
        }
        for object in &self.cluster_registry_objects {
            visit(Scope::ClusterRegistry, object);
        }
        for object in &self.namespace_objects {
            visit(Scope::Namespace, object);
        }
        for object in &self.system_objects {
            visit(Scope::System, object);
        }
    }

    fn cluster_objects(&self) -> &[ObjectModel] {
        &self.cluster_objects
    }

    fn cluster_registry_objects(&self) -> &[ObjectModel] {
        &self.cluster_registry_objects
    }

    fn system_objects(&self) -> &[ObjectModel] {
        &self.system_objects
    }
}

/// A snapshot with the namespace scope stored as a directory tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeRoot {
    pub cluster_objects: Vec<ObjectModel>,
    pub cluster_registry_objects: Vec<ObjectModel>,
    pub system_objects: Vec<ObjectModel>,
    /// `None` when nothing was declared under the namespaces directory
    pub tree: Option<TreeNode>,
}

impl Root for TreeRoot {
    fn visit_objects(&self, visit: &mut dyn FnMut(Scope, &ObjectModel)) {
        for object in &self.cluster_objects {
            visit(Scope::Cluster, object);
        }
        for object in &self.cluster_registry_objects {
            visit(Scope::ClusterRegistry, object);
        }
        if let Some(tree) = &self.tree {
            tree.walk(&mut |node| {
                for object in &node.objects {
                    visit(Scope::Namespace, object);
                }
            });
        }
        for object in &self.system_objects {
            visit(Scope::System, object);
        }
    }

    fn cluster_objects(&self) -> &[ObjectModel] {
        &self.cluster_objects
    }

    fn cluster_registry_objects(&self) -> &[ObjectModel] {
        &self.cluster_registry_objects
    }

    fn system_objects(&self) -> &[ObjectModel] {
        &self.system_objects
    }
}
