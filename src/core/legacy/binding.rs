//! Role bindings as read from resource IAM policies

use crate::core::principal::PrincipalId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A role binding as read from a resource's IAM policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    /// Full resource name, e.g. `projects/my-project`
    pub resource: String,
    pub role: String,
    /// Condition expression, if the binding is conditional
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    pub members: Vec<PrincipalId>,
}

impl RoleBinding {
    pub fn new(
        resource: impl Into<String>,
        role: impl Into<String>,
        condition: Option<&str>,
        members: Vec<PrincipalId>,
    ) -> Self {
        RoleBinding {
            resource: resource.into(),
            role: role.into(),
            condition: condition.map(str::to_string),
            members,
        }
    }

    /// Condition text, treating a blank condition as none
    pub fn condition(&self) -> Option<&str> {
        self.condition
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    pub fn is_unconditional(&self) -> bool {
        self.condition().is_none()
    }
}

impl fmt::Display for RoleBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.role, self.resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_condition_is_unconditional() {
        let binding = RoleBinding::new("projects/p", "roles/viewer", Some("  "), vec![]);
        assert!(binding.is_unconditional());
        assert_eq!(binding.to_string(), "roles/viewer on projects/p");
    }

    #[test]
    fn test_serde() {
        let binding: RoleBinding = serde_json::from_str(
            r#"{"resource": "projects/p", "role": "roles/owner",
                "members": ["user:alice@example.com"]}"#,
        )
        .unwrap();
        assert!(binding.is_unconditional());
        assert_eq!(binding.members, vec![PrincipalId::user("alice@example.com")]);
    }
}
