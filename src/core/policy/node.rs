//! Settings shared by every level of the policy tree

use crate::core::acl::AccessControlList;
use crate::core::constraint::{Constraint, ConstraintClass, ConstraintMap};
use crate::core::error::PolicyError;
use crate::core::validation::{validate_name, NAME_MAX_LENGTH, NAME_MAX_LENGTH_EXTENDED};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where a policy tree came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicySource {
    /// Hand-authored policy document
    #[default]
    Document,
    /// Derived from legacy role bindings
    Legacy,
}

impl PolicySource {
    /// Maximum name length for nodes of this source
    pub fn name_limit(self) -> usize {
        match self {
            PolicySource::Document => NAME_MAX_LENGTH,
            PolicySource::Legacy => NAME_MAX_LENGTH_EXTENDED,
        }
    }

    pub fn is_document(&self) -> bool {
        *self == PolicySource::Document
    }
}

/// Data shared by environments, systems and groups
#[derive(Debug, Clone)]
pub struct PolicyNode {
    name: String,
    description: String,
    source: PolicySource,
    acl: Option<AccessControlList>,
    constraints: ConstraintMap,
    min_reviewers: Option<u32>,
    approval_timeout: Option<Duration>,
}

impl PolicyNode {
    /// Node of a hand-authored policy
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Result<Self, PolicyError> {
        Self::with_source(PolicySource::Document, name, description)
    }

    /// Node derived from legacy bindings, allowing longer names
    pub fn legacy(name: impl Into<String>, description: impl Into<String>) -> Result<Self, PolicyError> {
        Self::with_source(PolicySource::Legacy, name, description)
    }

    /// Node of the given source, validated against that source's name limit
    pub fn with_source(
        source: PolicySource,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, PolicyError> {
        let name = name.into();
        validate_name(&name, source.name_limit())?;
        Ok(PolicyNode {
            name,
            description: description.into(),
            source,
            acl: None,
            constraints: ConstraintMap::new(),
            min_reviewers: None,
            approval_timeout: None,
        })
    }

    pub fn with_acl(mut self, acl: AccessControlList) -> Self {
        self.acl = Some(acl);
        self
    }

    pub fn with_constraint(mut self, class: ConstraintClass, constraint: Arc<dyn Constraint>) -> Self {
        self.constraints.entry(class).or_default().push(constraint);
        self
    }

    pub fn with_constraints(
        mut self,
        class: ConstraintClass,
        constraints: impl IntoIterator<Item = Arc<dyn Constraint>>,
    ) -> Self {
        self.constraints.entry(class).or_default().extend(constraints);
        self
    }

    /// Number of distinct reviewers a peer-approved request needs
    pub fn with_min_reviewers(mut self, min_reviewers: u32) -> Result<Self, PolicyError> {
        if min_reviewers == 0 {
            return Err(PolicyError::InvalidDocument(format!(
                "'{}': at least one reviewer is required",
                self.name
            )));
        }
        self.min_reviewers = Some(min_reviewers);
        Ok(self)
    }

    /// How long a request waits for approval
    pub fn with_approval_timeout(mut self, timeout: Duration) -> Result<Self, PolicyError> {
        if timeout <= Duration::zero() {
            return Err(PolicyError::InvalidDocument(format!(
                "'{}': approval timeout must be positive",
                self.name
            )));
        }
        self.approval_timeout = Some(timeout);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn source(&self) -> PolicySource {
        self.source
    }

    /// The node's own ACL; `None` defers to the parent
    pub fn acl(&self) -> Option<&AccessControlList> {
        self.acl.as_ref()
    }

    pub fn constraints(&self, class: ConstraintClass) -> &[Arc<dyn Constraint>] {
        self.constraints.get(&class).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn constraint_map(&self) -> &ConstraintMap {
        &self.constraints
    }

    pub fn min_reviewers(&self) -> Option<u32> {
        self.min_reviewers
    }

    pub fn approval_timeout(&self) -> Option<Duration> {
        self.approval_timeout
    }

    /// Combine two nodes of the same name
    ///
    /// ACL entries and constraints are concatenated (identical constraints
    /// only once); settings of `self` win over `other`'s.
    pub(crate) fn merge(&self, other: &PolicyNode) -> Result<PolicyNode, PolicyError> {
        if self.name != other.name {
            return Err(PolicyError::NameMismatch {
                left: self.name.clone(),
                right: other.name.clone(),
            });
        }

        let acl = match (&self.acl, &other.acl) {
            (Some(a), Some(b)) => Some(a.merge(b)),
            (Some(a), None) => Some(a.clone()),
            (None, b) => b.clone(),
        };

        let mut constraints = self.constraints.clone();
        for (class, theirs) in &other.constraints {
            let ours = constraints.entry(*class).or_default();
            for constraint in theirs {
                let spec = constraint.to_spec();
                if !ours.iter().any(|c| c.to_spec() == spec) {
                    ours.push(Arc::clone(constraint));
                }
            }
        }

        Ok(PolicyNode {
            name: self.name.clone(),
            description: if self.description.is_empty() {
                other.description.clone()
            } else {
                self.description.clone()
            },
            source: self.source,
            acl,
            constraints,
            min_reviewers: self.min_reviewers.or(other.min_reviewers),
            approval_timeout: self.approval_timeout.or(other.approval_timeout),
        })
    }
}

/// Common accessors of environments, systems and groups
pub trait Policy {
    fn node(&self) -> &PolicyNode;

    fn name(&self) -> &str {
        self.node().name()
    }

    fn description(&self) -> &str {
        self.node().description()
    }

    fn acl(&self) -> Option<&AccessControlList> {
        self.node().acl()
    }

    fn constraints(&self, class: ConstraintClass) -> &[Arc<dyn Constraint>] {
        self.node().constraints(class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::acl::{AllowedEntry, Permission};
    use crate::core::constraint::ExpiryConstraint;
    use crate::core::principal::PrincipalId;

    fn acl(email: &str, permissions: Permission) -> AccessControlList {
        AccessControlList::new(vec![AllowedEntry::new(PrincipalId::user(email), permissions)])
    }

    #[test]
    fn test_name_limits_by_source() {
        let long = "x".repeat(30);
        assert!(PolicyNode::new(long.clone(), "").is_err());
        assert!(PolicyNode::legacy(long, "").is_ok());
        assert!(PolicyNode::new("bad name", "").is_err());
    }

    #[test]
    fn test_settings_validated() {
        let node = PolicyNode::new("g", "").unwrap();
        assert!(node.clone().with_min_reviewers(0).is_err());
        assert!(node.clone().with_approval_timeout(Duration::zero()).is_err());
        assert_eq!(node.with_min_reviewers(2).unwrap().min_reviewers(), Some(2));
    }

    #[test]
    fn test_merge_requires_same_name() {
        let a = PolicyNode::new("a", "").unwrap();
        let b = PolicyNode::new("b", "").unwrap();
        assert!(matches!(a.merge(&b), Err(PolicyError::NameMismatch { .. })));
    }

    #[test]
    fn test_merge_concatenates() {
        let expiry: Arc<dyn Constraint> = Arc::new(ExpiryConstraint::fixed(Duration::hours(1)).unwrap());
        let other_expiry: Arc<dyn Constraint> =
            Arc::new(ExpiryConstraint::fixed(Duration::hours(2)).unwrap());

        let a = PolicyNode::new("g", "first")
            .unwrap()
            .with_acl(acl("a@example.com", Permission::JOIN))
            .with_constraint(ConstraintClass::Join, Arc::clone(&expiry));
        let b = PolicyNode::new("g", "second")
            .unwrap()
            .with_acl(acl("b@example.com", Permission::JOIN))
            .with_constraint(ConstraintClass::Join, expiry)
            .with_constraint(ConstraintClass::Join, other_expiry);

        let merged = a.merge(&b).unwrap();
        assert_eq!(merged.description(), "first");
        assert_eq!(merged.acl().unwrap().entries().len(), 2);
        assert_eq!(merged.constraints(ConstraintClass::Join).len(), 2);
        assert!(merged.constraints(ConstraintClass::Approve).is_empty());
    }
}
