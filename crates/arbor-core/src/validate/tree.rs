//! Checks on the hydrated namespace tree

use indexmap::IndexMap;

use crate::error::ValidationError;
use crate::object::GroupKind;
use crate::root::TreeRoot;
use crate::tree::TreeNode;

use super::Validator;

/// Visit every node except the hierarchy root
fn walk_directories<'a>(root: &'a TreeRoot, visit: &mut impl FnMut(&'a TreeNode)) {
    if let Some(tree) = &root.tree {
        for child in &tree.children {
            child.walk(visit);
        }
    }
}

/// A directory declares at most one Namespace, named after the directory
pub struct NamespaceDirectoryValidator;

impl Validator<TreeRoot> for NamespaceDirectoryValidator {
    fn name(&self) -> &'static str {
        "namespace-directory"
    }

    fn validate(&self, root: &TreeRoot) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let Some(tree) = &root.tree else {
            return errors;
        };

        tree.walk(&mut |node| {
            let namespaces: Vec<_> = node.objects.iter().filter(|o| o.is_namespace()).collect();
            match namespaces.as_slice() {
                [] => {}
                [namespace] => {
                    if namespace.name != node.name() {
                        errors.push(ValidationError::NamespaceNameMismatch {
                            name: namespace.name.clone(),
                            directory: node.path.clone(),
                            source_path: namespace.source.clone(),
                        });
                    }
                }
                many => errors.push(ValidationError::MultipleNamespaces {
                    directory: node.path.clone(),
                    sources: many.iter().map(|o| o.source.clone()).collect(),
                }),
            }
        });
        errors
    }
}

/// Directory names map to cluster-wide namespace names and must be unique
pub struct DuplicateDirectoryValidator;

impl Validator<TreeRoot> for DuplicateDirectoryValidator {
    fn name(&self) -> &'static str {
        "duplicate-directory"
    }

    fn validate(&self, root: &TreeRoot) -> Vec<ValidationError> {
        let mut seen: IndexMap<&str, Vec<String>> = IndexMap::new();
        walk_directories(root, &mut |node| {
            seen.entry(node.name()).or_default().push(node.path.clone());
        });

        seen.into_iter()
            .filter(|(_, directories)| directories.len() > 1)
            .map(|(name, directories)| ValidationError::DuplicateDirectoryName {
                name: name.to_string(),
                directories,
            })
            .collect()
    }
}

/// After inheritance, each (kind, name) appears at most once per namespace
pub struct NameCollisionValidator;

impl Validator<TreeRoot> for NameCollisionValidator {
    fn name(&self) -> &'static str {
        "name-collision"
    }

    fn validate(&self, root: &TreeRoot) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        walk_directories(root, &mut |node| {
            if !node.is_namespace() {
                return;
            }
            let mut by_name: IndexMap<(GroupKind, &str), Vec<String>> = IndexMap::new();
            for object in &node.objects {
                by_name
                    .entry((object.group_kind(), object.name.as_str()))
                    .or_default()
                    .push(object.source.clone());
            }
            for ((group_kind, name), sources) in by_name {
                if sources.len() > 1 {
                    errors.push(ValidationError::NameCollision {
                        group_kind,
                        name: name.to_string(),
                        namespace: node.name().to_string(),
                        sources,
                    });
                }
            }
        });
        errors
    }
}

/// Objects on an abstract namespace with no namespace below it would never
/// reach the cluster
pub struct UnsyncableResourcesValidator;

impl Validator<TreeRoot> for UnsyncableResourcesValidator {
    fn name(&self) -> &'static str {
        "unsyncable-resources"
    }

    fn validate(&self, root: &TreeRoot) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let Some(tree) = &root.tree else {
            return errors;
        };

        tree.walk(&mut |node| {
            let declares = node
                .objects
                .iter()
                .any(|o| !o.is_namespace() && !o.is_selector());
            if !node.is_namespace() && declares && !node.has_namespace_descendant() {
                errors.push(ValidationError::UnsyncableResources {
                    directory: node.path.clone(),
                });
            }
        });
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::hydrate::InheritanceHydrator;
    use crate::object::ObjectModel;
    use crate::tree::build_tree;

    fn hydrated(objects: Vec<ObjectModel>) -> TreeRoot {
        let mut root = build_tree(flat(objects)).unwrap();
        InheritanceHydrator::new().hydrate(&mut root).unwrap();
        root
    }

    #[test]
    fn test_namespace_name_mismatch() {
        let mut ns = namespace("namespaces/web");
        ns.name = "frontend".to_string();

        let errors = NamespaceDirectoryValidator.validate(&hydrated(vec![ns]));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code(), "ARB1009");
    }

    #[test]
    fn test_multiple_namespaces_in_directory() {
        let mut second = namespace("namespaces/web");
        second.source = "namespaces/web/again.yaml".to_string();

        let errors = NamespaceDirectoryValidator.validate(&hydrated(vec![namespace("namespaces/web"), second]));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code(), "ARB1008");
    }

    #[test]
    fn test_duplicate_directory_names() {
        let errors = DuplicateDirectoryValidator.validate(&hydrated(vec![
            namespace("namespaces/eng/web"),
            namespace("namespaces/ops/web"),
            namespace("namespaces/ops/db"),
        ]));

        assert_eq!(
            errors,
            vec![ValidationError::DuplicateDirectoryName {
                name: "web".to_string(),
                directories: vec!["namespaces/eng/web".to_string(), "namespaces/ops/web".to_string()],
            }]
        );
    }

    #[test]
    fn test_inherited_name_collision() {
        let errors = NameCollisionValidator.validate(&hydrated(vec![
            config_map("settings", "namespaces/eng"),
            namespace("namespaces/eng/web"),
            config_map("settings", "namespaces/eng/web"),
            namespace("namespaces/eng/api"),
        ]));

        assert_eq!(errors.len(), 1);
        match &errors[0] {
            ValidationError::NameCollision { namespace, sources, .. } => {
                assert_eq!(namespace, "web");
                assert_eq!(sources.len(), 2);
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_same_name_different_kind_is_fine() {
        let mut role = config_map("settings", "namespaces/web");
        role.gvk.kind = "Role".to_string();

        let errors = NameCollisionValidator.validate(&hydrated(vec![
            namespace("namespaces/web"),
            config_map("settings", "namespaces/web"),
            role,
        ]));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_unsyncable_resources() {
        let errors = UnsyncableResourcesValidator.validate(&hydrated(vec![
            config_map("orphan", "namespaces/empty"),
            config_map("shared", "namespaces/eng"),
            namespace("namespaces/eng/web"),
        ]));

        assert_eq!(
            errors,
            vec![ValidationError::UnsyncableResources {
                directory: "namespaces/empty".to_string()
            }]
        );
    }
}
