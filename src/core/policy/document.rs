//! Hand-authored policy documents
//!
//! A document describes one environment with its systems and groups, in
//! JSON or TOML:
//!
//! ```toml
//! name = "prod"
//! access = [{ principal = "class:authenticatedUsers", allow = "VIEW" }]
//!
//! [[systems]]
//! name = "billing"
//!
//! [[systems.groups]]
//! name = "db-admins"
//! access = [{ principal = "group:dba@example.com", allow = "JOIN, APPROVE_SELF" }]
//! privileges = [{ type = "iamRoleBinding", project = "billing-prod", role = "roles/cloudsql.admin" }]
//!
//! [[systems.groups.constraints.join]]
//! type = "expiry"
//! min = "PT15M"
//! max = "PT2H"
//! ```

use super::{
    EnvironmentPolicy, JitGroupPolicy, Policy, PolicyNode, PolicySource, Privilege, SystemPolicy,
};
use crate::core::acl::AccessControlList;
use crate::core::constraint::{iso_duration, ConstraintClass, ConstraintSpec};
use crate::core::error::{JitError, PolicyError, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Constraints of a node, by class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintsDocument {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub join: Vec<ConstraintSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub approve: Vec<ConstraintSpec>,
}

impl ConstraintsDocument {
    fn is_empty(&self) -> bool {
        self.join.is_empty() && self.approve.is_empty()
    }
}

/// Settings common to every level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDocument {
    pub name: String,
    /// Recorded for nodes derived from legacy bindings, whose names may be longer
    #[serde(default, skip_serializing_if = "PolicySource::is_document")]
    pub source: PolicySource,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Absent means "inherit from the parent"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<AccessControlList>,
    #[serde(default, skip_serializing_if = "ConstraintsDocument::is_empty")]
    pub constraints: ConstraintsDocument,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_reviewers: Option<u32>,
    #[serde(
        default,
        with = "iso_duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub approval_timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDocument {
    #[serde(flatten)]
    pub node: NodeDocument,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub privileges: Vec<Privilege>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemDocument {
    #[serde(flatten)]
    pub node: NodeDocument,
    #[serde(default)]
    pub groups: Vec<GroupDocument>,
}

/// An environment policy as written by its authors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(flatten)]
    pub node: NodeDocument,
    #[serde(default)]
    pub systems: Vec<SystemDocument>,
}

impl PolicyDocument {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Build and validate the policy tree
    ///
    /// Fails on invalid or duplicate names, invalid constraints, and
    /// invalid approval settings.
    pub fn to_policy(&self) -> std::result::Result<EnvironmentPolicy, PolicyError> {
        let mut environment = EnvironmentPolicy::new(self.node.to_node()?);
        for system_doc in &self.systems {
            let mut system = SystemPolicy::new(system_doc.node.to_node()?);
            for group_doc in &system_doc.groups {
                let group = group_doc
                    .privileges
                    .iter()
                    .cloned()
                    .fold(JitGroupPolicy::new(group_doc.node.to_node()?), |group, privilege| {
                        group.with_privilege(privilege)
                    });
                system.add(group)?;
            }
            environment.add(system)?;
        }
        Ok(environment)
    }

    /// Describe an existing policy tree; loads lazy systems
    pub fn from_policy(environment: &EnvironmentPolicy) -> std::result::Result<Self, PolicyError> {
        let systems = environment
            .systems()
            .map(|system| {
                let groups = system
                    .groups()?
                    .into_iter()
                    .map(|group| GroupDocument {
                        node: NodeDocument::from_node(group.node()),
                        privileges: group.privileges().to_vec(),
                    })
                    .collect();
                Ok(SystemDocument {
                    node: NodeDocument::from_node(system.node()),
                    groups,
                })
            })
            .collect::<std::result::Result<Vec<_>, PolicyError>>()?;

        Ok(PolicyDocument {
            node: NodeDocument::from_node(environment.node()),
            systems,
        })
    }
}

impl EnvironmentPolicy {
    /// Parse and build a policy from a JSON document
    pub fn from_json(text: &str) -> Result<Self> {
        PolicyDocument::from_json(text)?
            .to_policy()
            .map_err(JitError::from)
    }

    /// Parse and build a policy from a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        PolicyDocument::from_toml(text)?
            .to_policy()
            .map_err(JitError::from)
    }
}

impl NodeDocument {
    fn to_node(&self) -> std::result::Result<PolicyNode, PolicyError> {
        let mut node =
            PolicyNode::with_source(self.source, self.name.clone(), self.description.clone())?;
        if let Some(acl) = &self.access {
            node = node.with_acl(acl.clone());
        }
        for (class, specs) in [
            (ConstraintClass::Join, &self.constraints.join),
            (ConstraintClass::Approve, &self.constraints.approve),
        ] {
            let mut seen: Vec<&str> = Vec::new();
            for spec in specs {
                if seen.contains(&spec.name()) {
                    return Err(PolicyError::InvalidDocument(format!(
                        "'{}': duplicate {} constraint '{}'",
                        self.name,
                        class,
                        spec.name()
                    )));
                }
                seen.push(spec.name());
                node = node.with_constraint(class, spec.build()?);
            }
        }
        if let Some(min_reviewers) = self.min_reviewers {
            node = node.with_min_reviewers(min_reviewers)?;
        }
        if let Some(timeout) = self.approval_timeout {
            node = node.with_approval_timeout(timeout)?;
        }
        Ok(node)
    }

    fn from_node(node: &PolicyNode) -> Self {
        let specs = |class| node.constraints(class).iter().map(|c| c.to_spec()).collect();
        NodeDocument {
            name: node.name().to_string(),
            source: node.source(),
            description: node.description().to_string(),
            access: node.acl().cloned(),
            constraints: ConstraintsDocument {
                join: specs(ConstraintClass::Join),
                approve: specs(ConstraintClass::Approve),
            },
            min_reviewers: node.min_reviewers(),
            approval_timeout: node.approval_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::acl::Permission;
    use crate::core::principal::{JitGroupId, PrincipalId};

    const TOML: &str = r#"
name = "prod"
description = "Production"
access = [{ principal = "class:authenticatedUsers", allow = "VIEW" }]

[[systems]]
name = "billing"
minReviewers = 2
approvalTimeout = "PT30M"

[[systems.groups]]
name = "db-admins"
access = [{ principal = "group:dba@example.com", allow = "JOIN, APPROVE_SELF" }]
privileges = [{ type = "iamRoleBinding", project = "billing-prod", role = "roles/cloudsql.admin" }]

[[systems.groups.constraints.join]]
type = "expiry"
min = "PT15M"
max = "PT2H"

[[systems.groups.constraints.join]]
type = "expression"
name = "ticket"
displayName = "Ticket number"
expression = "input.ticket.matches('^INC-[0-9]+$')"
variables = [{ name = "ticket", max = 16 }]
"#;

    #[test]
    fn test_from_toml() {
        let env = EnvironmentPolicy::from_toml(TOML).unwrap();
        assert_eq!(env.name(), "prod");

        let system = env.system("billing").unwrap();
        assert_eq!(system.node().min_reviewers(), Some(2));
        assert_eq!(system.node().approval_timeout(), Some(Duration::minutes(30)));

        let context = env
            .resolve(&JitGroupId::new("prod", "billing", "db-admins"))
            .unwrap()
            .unwrap();
        assert_eq!(context.group().privileges().len(), 1);
        assert_eq!(context.effective_constraints(ConstraintClass::Join).len(), 2);

        let acl = context.effective_acl().unwrap();
        assert_eq!(acl.entries()[0].principal, PrincipalId::group("dba@example.com"));
        assert_eq!(
            acl.entries()[0].permissions,
            Permission::JOIN | Permission::APPROVE_SELF
        );
    }

    #[test]
    fn test_json_roundtrip() {
        let env = EnvironmentPolicy::from_toml(TOML).unwrap();
        let document = PolicyDocument::from_policy(&env).unwrap();
        let json = document.to_json().unwrap();

        let reparsed = PolicyDocument::from_json(&json).unwrap();
        assert_eq!(reparsed, document);
        assert!(reparsed.to_policy().is_ok());
    }

    #[test]
    fn test_source_recorded_only_for_legacy_nodes() {
        let env = EnvironmentPolicy::from_toml(TOML).unwrap();
        let json = PolicyDocument::from_policy(&env).unwrap().to_json().unwrap();
        assert!(!json.contains("\"source\""));

        let long_name = "a-system-name-of-thirty-chars";
        let legacy = EnvironmentPolicy::new(PolicyNode::legacy("classic", "").unwrap())
            .with_system(SystemPolicy::new(PolicyNode::legacy(long_name, "").unwrap()))
            .unwrap();
        let document = PolicyDocument::from_policy(&legacy).unwrap();
        let json = document.to_json().unwrap();
        assert!(json.contains("\"source\": \"legacy\""));

        let reimported = PolicyDocument::from_json(&json).unwrap().to_policy().unwrap();
        assert_eq!(reimported.system(long_name).unwrap().node().source(), PolicySource::Legacy);

        // The extended limit is not available to hand-authored nodes
        let authored = format!(r#"{{"name": "env", "systems": [{{"name": "{}"}}]}}"#, long_name);
        assert!(matches!(
            EnvironmentPolicy::from_json(&authored),
            Err(JitError::Policy(PolicyError::InvalidName { .. }))
        ));
    }

    #[test]
    fn test_invalid_documents() {
        let duplicate_group = r#"{
            "name": "env",
            "systems": [{"name": "s", "groups": [{"name": "g"}, {"name": "g"}]}]
        }"#;
        assert!(matches!(
            EnvironmentPolicy::from_json(duplicate_group),
            Err(JitError::Policy(PolicyError::DuplicateName(_)))
        ));

        let bad_name = r#"{"name": "bad.name"}"#;
        assert!(matches!(
            EnvironmentPolicy::from_json(bad_name),
            Err(JitError::Policy(PolicyError::InvalidName { .. }))
        ));

        let bad_constraint = r#"{
            "name": "env",
            "constraints": {"join": [{"type": "expiry", "min": "PT2H", "max": "PT1H"}]}
        }"#;
        assert!(matches!(
            EnvironmentPolicy::from_json(bad_constraint),
            Err(JitError::Policy(PolicyError::Constraint(_)))
        ));

        let duplicate_constraint = r#"{
            "name": "env",
            "constraints": {"join": [
                {"type": "expiry", "min": "PT1H", "max": "PT1H"},
                {"type": "expiry", "min": "PT2H", "max": "PT2H"}
            ]}
        }"#;
        assert!(matches!(
            EnvironmentPolicy::from_json(duplicate_constraint),
            Err(JitError::Policy(PolicyError::InvalidDocument(_)))
        ));

        let zero_reviewers = r#"{"name": "env", "minReviewers": 0}"#;
        assert!(EnvironmentPolicy::from_json(zero_reviewers).is_err());

        assert!(matches!(
            EnvironmentPolicy::from_json("{"),
            Err(JitError::Serialization(_))
        ));
    }
}
