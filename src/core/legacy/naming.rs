//! Deterministic group names for IAM roles

use crate::core::error::ImportError;

/// Derive a group name from a role name
///
/// - Predefined roles: `roles/compute.admin` → `compute-admin`
/// - Organization custom roles: `organizations/1/roles/CustomRole` → `o-customrole`
/// - Project custom roles: `projects/p/roles/x.y` → `p-x-y`
///
/// # Examples
///
/// ```
/// use jit_policy::legacy::group_name_for_role;
///
/// assert_eq!(group_name_for_role("roles/compute.admin").unwrap(), "compute-admin");
/// assert!(group_name_for_role("customRoles/x").is_err());
/// ```
pub fn group_name_for_role(role: &str) -> Result<String, ImportError> {
    let unrecognized = || ImportError::UnrecognizedRole(role.to_string());
    let parts: Vec<&str> = role.split('/').collect();

    let (prefix, id) = match parts.as_slice() {
        ["roles", id] => ("", *id),
        ["organizations", org, "roles", id] if !org.is_empty() => ("o-", *id),
        ["projects", project, "roles", id] if !project.is_empty() => ("p-", *id),
        _ => return Err(unrecognized()),
    };
    if id.is_empty() {
        return Err(unrecognized());
    }

    let normalized: String = id
        .chars()
        .map(|c| match c {
            '.' | '_' => '-',
            c => c.to_ascii_lowercase(),
        })
        .collect();
    Ok(format!("{}{}", prefix, normalized))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predefined_roles() {
        assert_eq!(group_name_for_role("roles/owner").unwrap(), "owner");
        assert_eq!(
            group_name_for_role("roles/cloudsql.instanceUser").unwrap(),
            "cloudsql-instanceuser"
        );
    }

    #[test]
    fn test_custom_roles() {
        assert_eq!(
            group_name_for_role("organizations/123/roles/CustomRole").unwrap(),
            "o-customrole"
        );
        assert_eq!(
            group_name_for_role("projects/my-project/roles/x.y_z").unwrap(),
            "p-x-y-z"
        );
    }

    #[test]
    fn test_unrecognized_roles() {
        for role in [
            "",
            "roles/",
            "owner",
            "folders/1/roles/x",
            "organizations//roles/x",
            "projects/p/roles/",
            "roles/a/b",
        ] {
            assert!(
                matches!(group_name_for_role(role), Err(ImportError::UnrecognizedRole(_))),
                "{}",
                role
            );
        }
    }
}
