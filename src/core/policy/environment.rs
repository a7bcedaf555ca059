//! Root of the policy tree

use super::{JitGroupContext, Policy, PolicyNode, SystemPolicy};
use crate::core::error::PolicyError;
use crate::core::principal::JitGroupId;
use std::collections::BTreeMap;

/// Root of a policy tree
#[derive(Debug)]
pub struct EnvironmentPolicy {
    node: PolicyNode,
    systems: BTreeMap<String, SystemPolicy>,
}

impl EnvironmentPolicy {
    pub fn new(node: PolicyNode) -> Self {
        EnvironmentPolicy {
            node,
            systems: BTreeMap::new(),
        }
    }

    /// Add a system, failing if a sibling already has its name
    pub fn add(&mut self, system: SystemPolicy) -> Result<(), PolicyError> {
        if self.systems.contains_key(system.name()) {
            return Err(PolicyError::DuplicateName(system.name().to_string()));
        }
        self.systems.insert(system.name().to_string(), system);
        Ok(())
    }

    pub fn with_system(mut self, system: SystemPolicy) -> Result<Self, PolicyError> {
        self.add(system)?;
        Ok(self)
    }

    pub fn system(&self, name: &str) -> Option<&SystemPolicy> {
        self.systems.get(name)
    }

    /// All systems, ordered by name
    pub fn systems(&self) -> impl Iterator<Item = &SystemPolicy> {
        self.systems.values()
    }

    /// Find a group and its ancestors
    ///
    /// Returns `Ok(None)` if the id names another environment or no such
    /// system or group exists. Loading a lazy system may fail.
    pub fn resolve(&self, id: &JitGroupId) -> Result<Option<JitGroupContext<'_>>, PolicyError> {
        if id.environment() != self.name() {
            return Ok(None);
        }
        let Some(system) = self.system(id.system()) else {
            return Ok(None);
        };
        Ok(system
            .group(id.name())?
            .map(|group| JitGroupContext::new(self, system, group)))
    }
}

impl Policy for EnvironmentPolicy {
    fn node(&self) -> &PolicyNode {
        &self.node
    }
}
