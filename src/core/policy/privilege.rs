//! Privileges granted to active group members

use serde::{Deserialize, Serialize};
use std::fmt;

/// A role granted on a project while a group membership is active
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IamRoleBinding {
    pub project: String,
    pub role: String,
    /// Resource condition, in canonical expression form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl IamRoleBinding {
    pub fn new(project: impl Into<String>, role: impl Into<String>, condition: Option<String>) -> Self {
        IamRoleBinding {
            project: project.into(),
            role: role.into(),
            condition,
        }
    }
}

/// Something a group grants its members
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Privilege {
    IamRoleBinding(IamRoleBinding),
}

impl From<IamRoleBinding> for Privilege {
    fn from(binding: IamRoleBinding) -> Self {
        Privilege::IamRoleBinding(binding)
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Privilege::IamRoleBinding(binding) => {
                write!(f, "{} on projects/{}", binding.role, binding.project)?;
                if let Some(condition) = &binding.condition {
                    write!(f, " if {}", condition)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let p: Privilege = IamRoleBinding::new("p-1", "roles/viewer", None).into();
        assert_eq!(p.to_string(), "roles/viewer on projects/p-1");

        let p: Privilege =
            IamRoleBinding::new("p-1", "roles/viewer", Some("resource.name == \"x\"".into())).into();
        assert_eq!(
            p.to_string(),
            "roles/viewer on projects/p-1 if resource.name == \"x\""
        );
    }

    #[test]
    fn test_serde_tagged() {
        let p: Privilege = IamRoleBinding::new("p-1", "roles/viewer", None).into();
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["type"], "iamRoleBinding");
        assert_eq!(json["role"], "roles/viewer");
        assert!(json.get("condition").is_none());
    }
}
