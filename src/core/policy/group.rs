//! JIT groups and the privileges they confer

use super::{Policy, PolicyNode, Privilege};
use crate::core::error::PolicyError;

/// A group users can join for a limited time
#[derive(Debug, Clone)]
pub struct JitGroupPolicy {
    node: PolicyNode,
    privileges: Vec<Privilege>,
}

impl JitGroupPolicy {
    pub fn new(node: PolicyNode) -> Self {
        JitGroupPolicy {
            node,
            privileges: Vec::new(),
        }
    }

    /// Add a privilege unless the group already grants it
    pub fn with_privilege(mut self, privilege: impl Into<Privilege>) -> Self {
        let privilege = privilege.into();
        if !self.privileges.contains(&privilege) {
            self.privileges.push(privilege);
        }
        self
    }

    pub fn privileges(&self) -> &[Privilege] {
        &self.privileges
    }

    /// Combine two definitions of the same group
    ///
    /// ACLs and constraints are concatenated, privileges deduplicated.
    /// Fails with [`PolicyError::NameMismatch`] if the names differ.
    pub fn merge(&self, other: &JitGroupPolicy) -> Result<JitGroupPolicy, PolicyError> {
        let merged = JitGroupPolicy {
            node: self.node.merge(&other.node)?,
            privileges: self.privileges.clone(),
        };
        Ok(other
            .privileges
            .iter()
            .cloned()
            .fold(merged, |group, privilege| group.with_privilege(privilege)))
    }
}

impl Policy for JitGroupPolicy {
    fn node(&self) -> &PolicyNode {
        &self.node
    }
}
