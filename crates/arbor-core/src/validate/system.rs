//! Checks on the system directory

use indexmap::IndexMap;

use crate::error::ValidationError;
use crate::hierarchy::{HierarchyMode, is_supported_kind, parse_hierarchy_config};
use crate::object::{GroupKind, kinds};
use crate::root::FlatRoot;

use super::Validator;

/// Exactly one Repo object must be declared
pub struct RepoValidator;

impl Validator<FlatRoot> for RepoValidator {
    fn name(&self) -> &'static str {
        "repo"
    }

    fn validate(&self, root: &FlatRoot) -> Vec<ValidationError> {
        let sources: Vec<String> = root
            .system_objects
            .iter()
            .filter(|o| o.is(&kinds::repo()))
            .map(|o| o.source.clone())
            .collect();

        match sources.len() {
            0 => vec![ValidationError::MissingRepo],
            1 => Vec::new(),
            _ => vec![ValidationError::MultipleRepos { sources }],
        }
    }
}

/// HierarchyConfig declarations must parse, name configurable kinds, use
/// modes allowed for the kind, and agree with each other.
pub struct HierarchyConfigValidator;

impl Validator<FlatRoot> for HierarchyConfigValidator {
    fn name(&self) -> &'static str {
        "hierarchy-config"
    }

    fn validate(&self, root: &FlatRoot) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut declared: IndexMap<GroupKind, Vec<(HierarchyMode, String)>> = IndexMap::new();

        for object in root
            .system_objects
            .iter()
            .filter(|o| o.is(&kinds::hierarchy_config()))
        {
            let entries = match parse_hierarchy_config(object) {
                Ok(entries) => entries,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };

            for entry in entries {
                if !is_supported_kind(&entry.group_kind) {
                    errors.push(ValidationError::UnsupportedHierarchyKind {
                        group_kind: entry.group_kind,
                        source_path: entry.source,
                    });
                    continue;
                }
                if entry.mode == HierarchyMode::HierarchicalQuota
                    && entry.group_kind != kinds::resource_quota()
                {
                    errors.push(ValidationError::IllegalHierarchyMode {
                        group_kind: entry.group_kind,
                        mode: entry.mode.to_string(),
                        source_path: entry.source,
                    });
                    continue;
                }
                declared
                    .entry(entry.group_kind)
                    .or_default()
                    .push((entry.mode, entry.source));
            }
        }

        for (group_kind, declarations) in declared {
            let first = declarations[0].0.resolve();
            if declarations.iter().any(|(mode, _)| mode.resolve() != first) {
                errors.push(ValidationError::ConflictingHierarchyMode {
                    group_kind,
                    declarations: declarations
                        .iter()
                        .map(|(mode, source)| format!("{} in {}", mode, source))
                        .collect(),
                });
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::object::{CONFIG_GROUP, GroupVersionKind, ObjectModel};
    use serde_json::json;

    fn hierarchy_config(name: &str, resources: serde_json::Value) -> ObjectModel {
        ObjectModel::new(
            GroupVersionKind::new(CONFIG_GROUP, "v1", kinds::HIERARCHY_CONFIG),
            name,
            format!("system/{}.yaml", name),
        )
        .with_body(json!({ "spec": { "resources": resources } }))
    }

    #[test]
    fn test_repo_missing() {
        let errors = RepoValidator.validate(&flat(vec![]));
        assert_eq!(errors, vec![ValidationError::MissingRepo]);
    }

    #[test]
    fn test_repo_single() {
        assert!(RepoValidator.validate(&flat(vec![repo()])).is_empty());
    }

    #[test]
    fn test_repo_duplicate() {
        let mut second = repo();
        second.source = "system/repo2.yaml".to_string();

        let errors = RepoValidator.validate(&flat(vec![repo(), second]));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code(), "ARB1002");
        assert!(errors[0].to_string().contains("system/repo2.yaml"));
    }

    #[test]
    fn test_hierarchical_quota_only_for_resource_quota() {
        let root = flat(vec![hierarchy_config(
            "bad",
            json!([
                { "kinds": ["ResourceQuota"], "hierarchyMode": "hierarchicalQuota" },
                { "kinds": ["ConfigMap"], "hierarchyMode": "hierarchicalQuota" }
            ]),
        )]);

        let errors = HierarchyConfigValidator.validate(&root);
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            ValidationError::IllegalHierarchyMode { group_kind, .. } if group_kind.kind == "ConfigMap"
        ));
    }

    #[test]
    fn test_unsupported_kind() {
        let root = flat(vec![hierarchy_config("ns", json!([{ "kinds": ["Namespace"], "hierarchyMode": "none" }]))]);
        let errors = HierarchyConfigValidator.validate(&root);
        assert_eq!(errors[0].code(), "ARB1004");
    }

    #[test]
    fn test_conflicting_declarations() {
        let root = flat(vec![
            hierarchy_config("a", json!([{ "kinds": ["ConfigMap"], "hierarchyMode": "none" }])),
            hierarchy_config("b", json!([{ "kinds": ["ConfigMap"], "hierarchyMode": "inherit" }])),
        ]);

        let errors = HierarchyConfigValidator.validate(&root);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code(), "ARB1005");
        assert!(errors[0].to_string().contains("none in system/a.yaml"));
    }

    #[test]
    fn test_default_and_inherit_agree() {
        let root = flat(vec![
            hierarchy_config("a", json!([{ "kinds": ["ConfigMap"], "hierarchyMode": "default" }])),
            hierarchy_config("b", json!([{ "kinds": ["ConfigMap"], "hierarchyMode": "inherit" }])),
        ]);

        assert!(HierarchyConfigValidator.validate(&root).is_empty());
    }

    #[test]
    fn test_unparseable_config() {
        let root = flat(vec![hierarchy_config("bad", json!([{ "kinds": ["ConfigMap"], "hierarchyMode": 7 }]))]);
        let errors = HierarchyConfigValidator.validate(&root);
        assert_eq!(errors[0].code(), "ARB1017");
    }
}
