//! Access control lists
//!
//! An ACL is an ordered list of entries, each granting a set of permissions
//! to one principal. Entries are additive: a subject's effective
//! permissions are the union of every entry whose principal it holds. An
//! empty ACL grants nothing.

use crate::core::error::PolicyError;
use crate::core::principal::{PrincipalId, Subject};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

/// Set of policy permissions, stored as a bitmask
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission(u32);

impl Permission {
    pub const NONE: Permission = Permission(0);
    /// See the policy and its groups
    pub const VIEW: Permission = Permission(1);
    /// Request to join a group
    pub const JOIN: Permission = Permission(1 << 1);
    /// Approve other users' join requests
    pub const APPROVE_OTHERS: Permission = Permission(1 << 2);
    /// Approve one's own join requests
    pub const APPROVE_SELF: Permission = Permission(1 << 3);
    /// Export the policy document
    pub const EXPORT: Permission = Permission(1 << 4);
    /// Reconcile the policy against provisioned state
    pub const RECONCILE: Permission = Permission(1 << 5);

    const NAMED: [(Permission, &'static str); 6] = [
        (Permission::VIEW, "VIEW"),
        (Permission::JOIN, "JOIN"),
        (Permission::APPROVE_OTHERS, "APPROVE_OTHERS"),
        (Permission::APPROVE_SELF, "APPROVE_SELF"),
        (Permission::EXPORT, "EXPORT"),
        (Permission::RECONCILE, "RECONCILE"),
    ];

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every permission in `other` is also in `self`
    pub fn contains(self, other: Permission) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Permission {
    type Output = Permission;

    fn bitor(self, rhs: Permission) -> Permission {
        Permission(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permission {
    fn bitor_assign(&mut self, rhs: Permission) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMED
            .iter()
            .filter(|(p, _)| self.contains(*p))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", names.join(", "))
    }
}

impl fmt::Debug for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Permission({})", self)
    }
}

/// Parses comma-separated names such as `"JOIN, APPROVE_SELF"`
impl FromStr for Permission {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mask = Permission::NONE;
        for name in s.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let permission = Self::NAMED
                .iter()
                .find(|(_, known)| known.eq_ignore_ascii_case(name))
                .map(|(p, _)| *p)
                .ok_or_else(|| PolicyError::InvalidPermission(name.to_string()))?;
            mask |= permission;
        }
        Ok(mask)
    }
}

impl TryFrom<String> for Permission {
    type Error = PolicyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Permission> for String {
    fn from(p: Permission) -> Self {
        p.to_string()
    }
}

/// Grants `permissions` to `principal`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedEntry {
    pub principal: PrincipalId,
    #[serde(rename = "allow")]
    pub permissions: Permission,
}

impl AllowedEntry {
    pub fn new(principal: impl Into<PrincipalId>, permissions: Permission) -> Self {
        AllowedEntry {
            principal: principal.into(),
            permissions,
        }
    }
}

/// Ordered, immutable list of access entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessControlList {
    entries: Vec<AllowedEntry>,
}

impl AccessControlList {
    pub fn new(entries: Vec<AllowedEntry>) -> Self {
        AccessControlList { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[AllowedEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Union of the permissions of all entries matching a principal the
    /// subject holds now
    pub fn effective_permissions(&self, subject: &Subject) -> Permission {
        self.effective_permissions_at(subject, Utc::now())
    }

    /// Union of the permissions of all entries matching a principal the
    /// subject holds at `now`; lapsed temporary principals grant nothing
    pub fn effective_permissions_at(&self, subject: &Subject, now: DateTime<Utc>) -> Permission {
        self.entries
            .iter()
            .filter(|entry| subject.holds_at(&entry.principal, now))
            .fold(Permission::NONE, |mask, entry| mask | entry.permissions)
    }

    /// Check whether the subject holds all of `required`
    ///
    /// # Examples
    ///
    /// ```
    /// use jit_policy::acl::{AccessControlList, AllowedEntry, Permission};
    /// use jit_policy::principal::{PrincipalId, Subject, UserId};
    ///
    /// let acl = AccessControlList::new(vec![AllowedEntry::new(
    ///     PrincipalId::user("alice@example.com"),
    ///     Permission::JOIN | Permission::APPROVE_SELF,
    /// )]);
    /// let alice = Subject::new(UserId::new("alice@example.com"), vec![]);
    ///
    /// assert!(acl.is_allowed(&alice, Permission::JOIN));
    /// assert!(!acl.is_allowed(&alice, Permission::APPROVE_OTHERS));
    /// ```
    pub fn is_allowed(&self, subject: &Subject, required: Permission) -> bool {
        self.is_allowed_at(subject, required, Utc::now())
    }

    pub fn is_allowed_at(&self, subject: &Subject, required: Permission, now: DateTime<Utc>) -> bool {
        !required.is_empty() && self.effective_permissions_at(subject, now).contains(required)
    }

    /// Principals that are granted all of `required` by some entry
    pub fn principals_with(&self, required: Permission) -> impl Iterator<Item = &PrincipalId> {
        self.entries
            .iter()
            .filter(move |entry| !required.is_empty() && entry.permissions.contains(required))
            .map(|entry| &entry.principal)
    }

    /// New list holding this list's entries followed by `other`'s
    pub fn merge(&self, other: &AccessControlList) -> AccessControlList {
        let mut entries = self.entries.clone();
        entries.extend(other.entries.iter().cloned());
        AccessControlList { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::principal::{ClassPrincipal, Principal, UserId};

    fn subject(email: &str, groups: &[&str]) -> Subject {
        Subject::new(
            UserId::new(email),
            groups
                .iter()
                .map(|g| Principal::permanent(PrincipalId::group(*g))),
        )
    }

    #[test]
    fn test_permission_parse_and_display() {
        let p: Permission = "join, Approve_Self".parse().unwrap();
        assert_eq!(p, Permission::JOIN | Permission::APPROVE_SELF);
        assert_eq!(p.to_string(), "JOIN, APPROVE_SELF");
        assert!("JOIN, FLY".parse::<Permission>().is_err());
        assert_eq!("".parse::<Permission>().unwrap(), Permission::NONE);
    }

    #[test]
    fn test_empty_acl_denies_everything() {
        let acl = AccessControlList::empty();
        let alice = subject("alice@example.com", &[]);
        assert!(!acl.is_allowed(&alice, Permission::VIEW));
        assert!(!acl.is_allowed(&alice, Permission::NONE));
    }

    #[test]
    fn test_entries_are_additive() {
        let acl = AccessControlList::new(vec![
            AllowedEntry::new(PrincipalId::user("alice@example.com"), Permission::JOIN),
            AllowedEntry::new(PrincipalId::group("ops@example.com"), Permission::APPROVE_SELF),
        ]);
        let alice = subject("alice@example.com", &["ops@example.com"]);

        assert!(acl.is_allowed(&alice, Permission::JOIN | Permission::APPROVE_SELF));
        assert_eq!(
            acl.effective_permissions(&alice),
            Permission::JOIN | Permission::APPROVE_SELF
        );

        let bob = subject("bob@example.com", &[]);
        assert!(!acl.is_allowed(&bob, Permission::JOIN));
    }

    #[test]
    fn test_groups_are_not_expanded() {
        let acl = AccessControlList::new(vec![AllowedEntry::new(
            PrincipalId::group("ops@example.com"),
            Permission::JOIN,
        )]);

        // Membership has to be resolved before the subject is built
        let alice = subject("alice@example.com", &[]);
        assert!(!acl.is_allowed(&alice, Permission::JOIN));
    }

    #[test]
    fn test_class_principal() {
        let acl = AccessControlList::new(vec![AllowedEntry::new(
            ClassPrincipal::AuthenticatedUsers,
            Permission::VIEW,
        )]);
        let alice = Subject::new(
            UserId::new("alice@example.com"),
            vec![Principal::permanent(ClassPrincipal::AuthenticatedUsers)],
        );
        assert!(acl.is_allowed(&alice, Permission::VIEW));
    }

    #[test]
    fn test_lapsed_temporary_principal_grants_nothing() {
        let now = Utc::now();
        let acl = AccessControlList::new(vec![AllowedEntry::new(
            PrincipalId::group("oncall@example.com"),
            Permission::JOIN | Permission::APPROVE_SELF,
        )]);
        let alice = Subject::new(
            UserId::new("alice@example.com"),
            vec![Principal::temporary(
                PrincipalId::group("oncall@example.com"),
                now + chrono::Duration::hours(1),
            )],
        );

        assert!(acl.is_allowed_at(&alice, Permission::JOIN, now));
        assert!(!acl.is_allowed_at(&alice, Permission::JOIN, now + chrono::Duration::hours(1)));
        assert_eq!(
            acl.effective_permissions_at(&alice, now + chrono::Duration::hours(2)),
            Permission::NONE
        );
    }

    #[test]
    fn test_merge_concatenates() {
        let a = AccessControlList::new(vec![AllowedEntry::new(
            PrincipalId::user("a@example.com"),
            Permission::JOIN,
        )]);
        let merged = a.merge(&a);
        assert_eq!(merged.entries().len(), 2);
        assert_eq!(a.entries().len(), 1);
    }

    #[test]
    fn test_principals_with() {
        let acl = AccessControlList::new(vec![
            AllowedEntry::new(
                PrincipalId::user("a@example.com"),
                Permission::JOIN | Permission::APPROVE_OTHERS,
            ),
            AllowedEntry::new(PrincipalId::user("b@example.com"), Permission::JOIN),
        ]);
        let approvers: Vec<_> = acl.principals_with(Permission::APPROVE_OTHERS).collect();
        assert_eq!(approvers, vec![&PrincipalId::user("a@example.com")]);
    }

    #[test]
    fn test_acl_serde() {
        let json = r#"[{"principal": "user:a@example.com", "allow": "JOIN, APPROVE_SELF"}]"#;
        let acl: AccessControlList = serde_json::from_str(json).unwrap();
        assert_eq!(
            acl.entries()[0].permissions,
            Permission::JOIN | Permission::APPROVE_SELF
        );
    }
}
