//! Principals and subjects
//!
//! Textual forms:
//! - `user:alice@example.com`
//! - `group:admins@example.com`
//! - `class:authenticatedUsers`, `class:internalUsers`, `class:externalUsers`
//! - `jit-group:<environment>.<system>.<group>`

use crate::core::error::PolicyError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// A user, identified by email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(email: impl Into<String>) -> Self {
        UserId(email.into())
    }

    pub fn email(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user:{}", self.0)
    }
}

/// A directory group, identified by email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    pub fn new(email: impl Into<String>) -> Self {
        GroupId(email.into())
    }

    pub fn email(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group:{}", self.0)
    }
}

/// Pseudo-principals that stand for a class of users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClassPrincipal {
    AuthenticatedUsers,
    InternalUsers,
    ExternalUsers,
}

impl ClassPrincipal {
    fn name(self) -> &'static str {
        match self {
            ClassPrincipal::AuthenticatedUsers => "authenticatedUsers",
            ClassPrincipal::InternalUsers => "internalUsers",
            ClassPrincipal::ExternalUsers => "externalUsers",
        }
    }
}

impl fmt::Display for ClassPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class:{}", self.name())
    }
}

/// Fully qualified name of a JIT group: `environment.system.group`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JitGroupId {
    environment: String,
    system: String,
    name: String,
}

impl JitGroupId {
    pub fn new(
        environment: impl Into<String>,
        system: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        JitGroupId {
            environment: environment.into(),
            system: system.into(),
            name: name.into(),
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for JitGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.environment, self.system, self.name)
    }
}

impl FromStr for JitGroupId {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        match parts.as_slice() {
            [env, system, name] if !env.is_empty() && !system.is_empty() && !name.is_empty() => {
                Ok(JitGroupId::new(*env, *system, *name))
            }
            _ => Err(PolicyError::InvalidPrincipal(s.to_string())),
        }
    }
}

/// Anything that can appear in an access control list
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PrincipalId {
    User(UserId),
    Group(GroupId),
    Class(ClassPrincipal),
    JitGroup(JitGroupId),
}

impl PrincipalId {
    pub fn user(email: impl Into<String>) -> Self {
        PrincipalId::User(UserId::new(email))
    }

    pub fn group(email: impl Into<String>) -> Self {
        PrincipalId::Group(GroupId::new(email))
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrincipalId::User(user) => write!(f, "{}", user),
            PrincipalId::Group(group) => write!(f, "{}", group),
            PrincipalId::Class(class) => write!(f, "{}", class),
            PrincipalId::JitGroup(group) => write!(f, "jit-group:{}", group),
        }
    }
}

impl FromStr for PrincipalId {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PolicyError::InvalidPrincipal(s.to_string());
        let (kind, value) = s.trim().split_once(':').ok_or_else(invalid)?;
        if value.is_empty() {
            return Err(invalid());
        }

        match kind.to_ascii_lowercase().as_str() {
            "user" => Ok(PrincipalId::user(value)),
            "group" => Ok(PrincipalId::group(value)),
            "class" => match value {
                "authenticatedUsers" => Ok(PrincipalId::Class(ClassPrincipal::AuthenticatedUsers)),
                "internalUsers" => Ok(PrincipalId::Class(ClassPrincipal::InternalUsers)),
                "externalUsers" => Ok(PrincipalId::Class(ClassPrincipal::ExternalUsers)),
                _ => Err(invalid()),
            },
            "jit-group" => value
                .parse()
                .map(PrincipalId::JitGroup)
                .map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for PrincipalId {
    type Error = PolicyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PrincipalId> for String {
    fn from(id: PrincipalId) -> Self {
        id.to_string()
    }
}

impl From<UserId> for PrincipalId {
    fn from(user: UserId) -> Self {
        PrincipalId::User(user)
    }
}

impl From<GroupId> for PrincipalId {
    fn from(group: GroupId) -> Self {
        PrincipalId::Group(group)
    }
}

impl From<ClassPrincipal> for PrincipalId {
    fn from(class: ClassPrincipal) -> Self {
        PrincipalId::Class(class)
    }
}

/// A principal held by a subject, optionally only until `expiry`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: PrincipalId,
    pub expiry: Option<DateTime<Utc>>,
}

impl Principal {
    pub fn permanent(id: impl Into<PrincipalId>) -> Self {
        Principal {
            id: id.into(),
            expiry: None,
        }
    }

    pub fn temporary(id: impl Into<PrincipalId>, expiry: DateTime<Utc>) -> Self {
        Principal {
            id: id.into(),
            expiry: Some(expiry),
        }
    }
}

/// An authenticated user together with every principal it maps to
///
/// The principal set must already be fully expanded (group memberships,
/// pseudo-classes); access checks never expand it further.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    user: UserId,
    principals: HashMap<PrincipalId, Option<DateTime<Utc>>>,
}

impl Subject {
    /// Build a subject; the user's own principal is always included and
    /// duplicate principals keep the longest-lived expiry
    pub fn new(user: UserId, principals: impl IntoIterator<Item = Principal>) -> Self {
        let mut map: HashMap<PrincipalId, Option<DateTime<Utc>>> = HashMap::new();
        map.insert(PrincipalId::User(user.clone()), None);

        for principal in principals {
            map.entry(principal.id)
                .and_modify(|existing| {
                    *existing = match (*existing, principal.expiry) {
                        (None, _) | (_, None) => None,
                        (Some(a), Some(b)) => Some(a.max(b)),
                    }
                })
                .or_insert(principal.expiry);
        }

        Subject {
            user,
            principals: map,
        }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn principals(&self) -> impl Iterator<Item = &PrincipalId> {
        self.principals.keys()
    }

    /// Whether `id` is among the principals, regardless of expiry
    pub fn has_principal(&self, id: &PrincipalId) -> bool {
        self.principals.contains_key(id)
    }

    /// Whether the subject holds `id` at `now`; a temporary principal
    /// lapses at its expiry
    pub fn holds_at(&self, id: &PrincipalId, now: DateTime<Utc>) -> bool {
        match self.principals.get(id) {
            Some(Some(expiry)) => now < *expiry,
            Some(None) => true,
            None => false,
        }
    }

    /// Principals held at `now`
    pub fn principals_at(&self, now: DateTime<Utc>) -> impl Iterator<Item = &PrincipalId> {
        self.principals
            .iter()
            .filter(move |(_, expiry)| expiry.map_or(true, |expiry| now < expiry))
            .map(|(id, _)| id)
    }

    /// Expiry of the subject's membership in `group`, if still active at `now`
    pub fn active_membership(
        &self,
        group: &JitGroupId,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self.principals.get(&PrincipalId::JitGroup(group.clone())) {
            Some(Some(expiry)) if now < *expiry => Some(*expiry),
            _ => None,
        }
    }
}
