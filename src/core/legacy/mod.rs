//! Legacy policy import
//!
//! Derives a policy tree from IAM role bindings whose conditions carry an
//! eligibility marker (see [`classify`]):
//!
//! - one environment, named by [`LegacyPolicyConfig::environment_name`]
//! - one system per project, with no ACL or constraints of its own
//! - one group per eligible role, named by [`group_name_for_role`]
//!
//! A project's bindings are read when its groups are first accessed. A
//! binding that cannot be mapped is logged and skipped; it never aborts the
//! import of the remaining bindings.

mod binding;
mod config;
mod eligibility;
mod naming;

pub use binding::RoleBinding;
pub use config::{LegacyPolicyConfig, MIN_ACTIVATION_MINUTES};
pub use eligibility::{classify, Eligibility, EligibleCondition};
pub use naming::group_name_for_role;

use crate::core::acl::{AccessControlList, AllowedEntry, Permission};
use crate::core::constraint::{Constraint, ConstraintClass};
use crate::core::error::{ImportError, PolicyError};
use crate::core::events;
use crate::core::external::BindingSource;
use crate::core::policy::{
    EnvironmentPolicy, GroupLoader, IamRoleBinding, JitGroupPolicy, Policy, PolicyNode,
    SystemPolicy,
};
use crate::core::principal::ClassPrincipal;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Roles that allow reading IAM policies, and so exporting the policy
const EXPORT_ROLES: &[&str] = &[
    "roles/owner",
    "roles/editor",
    "roles/viewer",
    "roles/iam.securityReviewer",
    "roles/iam.securityAdmin",
    "roles/resourcemanager.organizationAdmin",
    "roles/resourcemanager.folderAdmin",
    "roles/resourcemanager.folderIamAdmin",
    "roles/resourcemanager.projectIamAdmin",
];

/// Roles that allow modifying IAM policies, and so reconciling the policy
const RECONCILE_ROLES: &[&str] = &[
    "roles/owner",
    "roles/iam.securityAdmin",
    "roles/resourcemanager.organizationAdmin",
    "roles/resourcemanager.folderAdmin",
    "roles/resourcemanager.folderIamAdmin",
    "roles/resourcemanager.projectIamAdmin",
];

/// Maps legacy role bindings to groups
#[derive(Debug, Clone)]
pub struct LegacyImporter {
    config: LegacyPolicyConfig,
    join_constraints: Vec<Arc<dyn Constraint>>,
}

impl LegacyImporter {
    pub fn new(config: LegacyPolicyConfig) -> Result<Self, ImportError> {
        config.validate()?;
        let join_constraints = config.join_constraints()?;
        Ok(LegacyImporter {
            config,
            join_constraints,
        })
    }

    pub fn config(&self) -> &LegacyPolicyConfig {
        &self.config
    }

    /// Map one binding to a group
    ///
    /// Returns `Ok(None)` if the binding is not eligible.
    pub fn map_binding(
        &self,
        project: &str,
        binding: &RoleBinding,
    ) -> Result<Option<JitGroupPolicy>, ImportError> {
        let Some(condition) = binding.condition() else {
            return Ok(None);
        };
        let Some(eligible) = classify(condition)? else {
            return Ok(None);
        };

        let name = group_name_for_role(&binding.role)?;
        let permissions = eligible.eligibility.permissions();
        let acl = AccessControlList::new(
            binding
                .members
                .iter()
                .map(|member| AllowedEntry::new(member.clone(), permissions))
                .collect(),
        );

        let node = PolicyNode::legacy(
            name,
            format!("Eligible for {} on project {}", binding.role, project),
        )?
        .with_acl(acl)
        .with_constraints(ConstraintClass::Join, self.join_constraints.iter().cloned());

        Ok(Some(JitGroupPolicy::new(node).with_privilege(IamRoleBinding::new(
            project,
            binding.role.clone(),
            eligible.resource_condition,
        ))))
    }

    /// Map all bindings of a project, merging groups of the same name
    pub fn import_project(&self, project: &str, bindings: &[RoleBinding]) -> Vec<JitGroupPolicy> {
        let mut groups: BTreeMap<String, JitGroupPolicy> = BTreeMap::new();

        for binding in bindings {
            let group = match self.map_binding(project, binding) {
                Ok(Some(group)) => group,
                Ok(None) => {
                    debug!(
                        event = events::LEGACY_BINDING_IGNORED,
                        project,
                        role = %binding.role,
                        "binding is not eligible"
                    );
                    continue;
                }
                Err(e) => {
                    warn!(
                        event = events::LEGACY_BINDING_SKIPPED,
                        project,
                        role = %binding.role,
                        resource = %binding.resource,
                        error = %e,
                        "skipping binding"
                    );
                    continue;
                }
            };

            match groups.entry(group.name().to_string()) {
                Entry::Vacant(entry) => {
                    entry.insert(group);
                }
                Entry::Occupied(mut entry) => match entry.get().merge(&group) {
                    Ok(merged) => {
                        debug!(
                            event = events::LEGACY_BINDING_MERGED,
                            project,
                            group = %merged.name(),
                            role = %binding.role,
                            "merged binding into existing group"
                        );
                        entry.insert(merged);
                    }
                    Err(e) => {
                        warn!(
                            event = events::LEGACY_BINDING_SKIPPED,
                            project,
                            role = %binding.role,
                            error = %e,
                            "skipping binding"
                        );
                    }
                },
            }
        }

        groups.into_values().collect()
    }

    /// ACL of the legacy environment
    ///
    /// VIEW for all authenticated users; EXPORT and RECONCILE for members of
    /// unconditional bindings on roles that can read or modify IAM policies.
    pub fn environment_acl(&self, bindings: &[RoleBinding]) -> AccessControlList {
        let mut entries = vec![AllowedEntry::new(
            ClassPrincipal::AuthenticatedUsers,
            Permission::VIEW,
        )];

        for binding in bindings.iter().filter(|b| b.is_unconditional()) {
            let mut permissions = Permission::NONE;
            if EXPORT_ROLES.contains(&binding.role.as_str()) {
                permissions |= Permission::EXPORT;
            }
            if RECONCILE_ROLES.contains(&binding.role.as_str()) {
                permissions |= Permission::RECONCILE;
            }
            if permissions.is_empty() {
                continue;
            }
            entries.extend(
                binding
                    .members
                    .iter()
                    .map(|member| AllowedEntry::new(member.clone(), permissions)),
            );
        }

        AccessControlList::new(entries)
    }

    /// Build the legacy environment
    ///
    /// Lists projects and reads environment-scope bindings now; project
    /// bindings are read when a system's groups are first accessed.
    pub fn load(self, source: Arc<dyn BindingSource>) -> Result<EnvironmentPolicy, ImportError> {
        let environment_bindings = source
            .environment_bindings()
            .map_err(|e| ImportError::Source(format!("{:#}", e)))?;
        let projects = source
            .projects()
            .map_err(|e| ImportError::Source(format!("{:#}", e)))?;

        let node = PolicyNode::legacy(
            self.config.environment_name.clone(),
            "Eligible role bindings",
        )?
        .with_acl(self.environment_acl(&environment_bindings))
        .with_min_reviewers(self.config.min_reviewers)?
        .with_approval_timeout(self.config.approval_timeout)?;

        let importer = Arc::new(self);
        let mut environment = EnvironmentPolicy::new(node);
        for project in projects {
            let description = format!("Project {}", project);
            let system_node = match PolicyNode::legacy(project.clone(), description) {
                Ok(node) => node,
                Err(e) => {
                    warn!(
                        event = events::LEGACY_BINDING_SKIPPED,
                        project = %project,
                        error = %e,
                        "skipping project"
                    );
                    continue;
                }
            };
            let loader = ProjectGroupLoader {
                project,
                source: Arc::clone(&source),
                importer: Arc::clone(&importer),
            };
            environment.add(SystemPolicy::lazy(system_node, Box::new(loader)))?;
        }

        info!(
            environment = %environment.name(),
            systems = environment.systems().count(),
            "loaded legacy policy"
        );
        Ok(environment)
    }
}

struct ProjectGroupLoader {
    project: String,
    source: Arc<dyn BindingSource>,
    importer: Arc<LegacyImporter>,
}

impl GroupLoader for ProjectGroupLoader {
    fn load(&self, system: &str) -> Result<Vec<JitGroupPolicy>, PolicyError> {
        let bindings = self
            .source
            .bindings(&self.project)
            .map_err(|e| PolicyError::Loader {
                system: system.to_string(),
                message: format!("{:#}", e),
            })?;
        Ok(self.importer.import_project(&self.project, &bindings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::Privilege;
    use crate::core::principal::PrincipalId;

    fn importer() -> LegacyImporter {
        LegacyImporter::new(LegacyPolicyConfig::default()).unwrap()
    }

    fn binding(role: &str, condition: Option<&str>, member: &str) -> RoleBinding {
        RoleBinding::new(
            "projects/project-1",
            role,
            condition,
            vec![PrincipalId::user(member)],
        )
    }

    #[test]
    fn test_jit_binding() {
        let group = importer()
            .map_binding(
                "project-1",
                &binding("roles/compute.admin", Some("has({}.jitaccessconstraint)"), "a@example.com"),
            )
            .unwrap()
            .unwrap();

        assert_eq!(group.name(), "compute-admin");
        let entry = &group.acl().unwrap().entries()[0];
        assert_eq!(entry.permissions, Permission::JOIN | Permission::APPROVE_SELF);
        assert_eq!(group.constraints(ConstraintClass::Join).len(), 2);
        assert_eq!(
            group.privileges()[0],
            Privilege::from(IamRoleBinding::new("project-1", "roles/compute.admin", None))
        );
    }

    #[test]
    fn test_ineligible_bindings() {
        let importer = importer();
        assert!(importer
            .map_binding("project-1", &binding("roles/viewer", None, "a@example.com"))
            .unwrap()
            .is_none());
        assert!(importer
            .map_binding(
                "project-1",
                &binding("roles/viewer", Some("resource.name == 'x'"), "a@example.com")
            )
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_merge_and_skip() {
        let groups = importer().import_project(
            "project-1",
            &[
                binding("roles/owner", Some("has({}.jitaccessconstraint)"), "a@example.com"),
                binding("customRoles/broken", Some("has({}.jitaccessconstraint)"), "c@example.com"),
                binding("roles/owner", Some("has({}.multipartyapprovalconstraint)"), "b@example.com"),
                binding("roles/viewer", None, "d@example.com"),
            ],
        );

        assert_eq!(groups.len(), 1);
        let owner = &groups[0];
        assert_eq!(owner.name(), "owner");
        assert_eq!(owner.acl().unwrap().entries().len(), 2);
        assert_eq!(owner.privileges().len(), 1);
    }

    #[test]
    fn test_environment_acl() {
        let acl = importer().environment_acl(&[
            RoleBinding::new(
                "organizations/1",
                "roles/iam.securityReviewer",
                None,
                vec![PrincipalId::user("auditor@example.com")],
            ),
            RoleBinding::new(
                "organizations/1",
                "roles/owner",
                None,
                vec![PrincipalId::user("admin@example.com")],
            ),
            RoleBinding::new(
                "organizations/1",
                "roles/owner",
                Some("resource.name == 'x'"),
                vec![PrincipalId::user("scoped@example.com")],
            ),
            RoleBinding::new(
                "organizations/1",
                "roles/compute.admin",
                None,
                vec![PrincipalId::user("ops@example.com")],
            ),
        ]);

        let entries = acl.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].principal, PrincipalId::from(ClassPrincipal::AuthenticatedUsers));
        assert_eq!(entries[0].permissions, Permission::VIEW);
        assert_eq!(entries[1].permissions, Permission::EXPORT);
        assert_eq!(
            entries[2].permissions,
            Permission::EXPORT | Permission::RECONCILE
        );
    }
}
