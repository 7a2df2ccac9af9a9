//! Arbor Core - declared configuration model and hierarchy hydration
//!
//! This crate turns a parsed configuration repository into per-namespace
//! object sets:
//! - `ObjectModel`: one declared resource with its source path
//! - `FlatRoot` / `TreeRoot`: the snapshot before and after the namespace tree is built
//! - `TreeBuilder`: groups namespace-scope objects by directory
//! - `InheritanceHydrator`: copies abstract-namespace objects into namespaces
//! - `Pipeline`: pre-hydration validation, hydration, post-hydration validation

pub mod error;
pub mod hierarchy;
pub mod hydrate;
pub mod object;
pub mod root;
pub mod tree;
pub mod validate;

pub use error::{CoreError, Result, ValidationError, ValidationErrors};
pub use hierarchy::{HierarchyConfigEntry, HierarchyMode, HierarchyModes};
pub use hydrate::InheritanceHydrator;
pub use object::{GroupKind, GroupVersionKind, ObjectId, ObjectModel};
pub use root::{FlatRoot, Root, Scope, TreeRoot};
pub use tree::{NodeKind, TreeBuilder, TreeNode, build_tree};
pub use validate::{Hydrator, Pipeline, Validator, validate};

/// Namespace the controller itself runs in
pub const SYSTEM_NAMESPACE: &str = "arbor-system";
