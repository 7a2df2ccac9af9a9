//! Validation phases
//!
//! A declared snapshot goes through three ordered phases:
//!
//! 1. **pre-hydration**: [`Validator<FlatRoot>`]s check individual objects and scopes
//! 2. **hydration**: [`Hydrator`]s rewrite the [`TreeRoot`] in place
//! 3. **post-hydration**: [`Validator<TreeRoot>`]s check the hydrated hierarchy
//!
//! Within a phase every validator runs and all errors are collected. A phase
//! that reports errors stops the pipeline, since later phases rely on the
//! invariants earlier ones establish.

mod scope;
mod system;
mod tree;

pub use scope::{ClusterScopeValidator, DirectoryNameValidator, MetadataNamespaceValidator};
pub use system::{HierarchyConfigValidator, RepoValidator};
pub use tree::{
    DuplicateDirectoryValidator, NameCollisionValidator, NamespaceDirectoryValidator,
    UnsyncableResourcesValidator,
};

use tracing::debug;

use crate::error::{ValidationError, ValidationErrors};
use crate::hydrate::InheritanceHydrator;
use crate::root::{FlatRoot, TreeRoot};
use crate::tree::TreeBuilder;

/// A read-only check over a snapshot
pub trait Validator<R: ?Sized>: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    fn validate(&self, root: &R) -> Vec<ValidationError>;
}

/// A hydration step that rewrites the tree and reports what it could not apply
pub trait Hydrator: Send + Sync {
    fn name(&self) -> &'static str;

    fn hydrate(&self, root: &mut TreeRoot) -> Vec<ValidationError>;
}

/// The full flat-to-hydrated-tree pipeline
pub struct Pipeline {
    builder: TreeBuilder,
    pre_hydration: Vec<Box<dyn Validator<FlatRoot>>>,
    hydration: Vec<Box<dyn Hydrator>>,
    post_hydration: Vec<Box<dyn Validator<TreeRoot>>>,
}

impl Pipeline {
    /// A pipeline with no validators; only builds the tree
    pub fn empty() -> Self {
        Self {
            builder: TreeBuilder::new(),
            pre_hydration: Vec::new(),
            hydration: Vec::new(),
            post_hydration: Vec::new(),
        }
    }

    /// Every built-in validator and the inheritance hydrator
    pub fn standard() -> Self {
        Self::empty()
            .pre_hydration(RepoValidator)
            .pre_hydration(HierarchyConfigValidator)
            .pre_hydration(ClusterScopeValidator)
            .pre_hydration(DirectoryNameValidator::new())
            .pre_hydration(MetadataNamespaceValidator)
            .hydration(InheritanceHydrator::new())
            .post_hydration(NamespaceDirectoryValidator)
            .post_hydration(DuplicateDirectoryValidator)
            .post_hydration(NameCollisionValidator)
            .post_hydration(UnsyncableResourcesValidator)
    }

    pub fn with_builder(mut self, builder: TreeBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn pre_hydration(mut self, validator: impl Validator<FlatRoot> + 'static) -> Self {
        self.pre_hydration.push(Box::new(validator));
        self
    }

    pub fn hydration(mut self, hydrator: impl Hydrator + 'static) -> Self {
        self.hydration.push(Box::new(hydrator));
        self
    }

    pub fn post_hydration(mut self, validator: impl Validator<TreeRoot> + 'static) -> Self {
        self.post_hydration.push(Box::new(validator));
        self
    }

    /// Validate, build and hydrate a snapshot
    pub fn run(&self, flat: FlatRoot) -> Result<TreeRoot, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        for validator in &self.pre_hydration {
            let found = validator.validate(&flat);
            debug!(validator = validator.name(), errors = found.len(), "pre-hydration");
            errors.extend(found);
        }
        errors.into_result()?;

        let mut root = self.builder.build(flat)?;

        let mut errors = ValidationErrors::new();
        for hydrator in &self.hydration {
            let found = hydrator.hydrate(&mut root);
            debug!(hydrator = hydrator.name(), errors = found.len(), "hydration");
            errors.extend(found);
        }
        errors.into_result()?;

        let mut errors = ValidationErrors::new();
        for validator in &self.post_hydration {
            let found = validator.validate(&root);
            debug!(validator = validator.name(), errors = found.len(), "post-hydration");
            errors.extend(found);
        }
        errors.into_result()?;

        Ok(root)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard()
    }
}

/// Run the standard pipeline
pub fn validate(flat: FlatRoot) -> Result<TreeRoot, ValidationErrors> {
    Pipeline::standard().run(flat)
}
