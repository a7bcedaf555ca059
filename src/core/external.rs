//! Seams to the outside world
//!
//! The policy core does not talk to a directory, an IAM API or a group
//! provisioning backend itself. Callers supply these traits; failures are
//! reported as [`anyhow::Error`] and surface as loader or source errors.

use crate::core::activation::Grant;
use crate::core::legacy::RoleBinding;
use crate::core::principal::{Subject, UserId};

/// Resolves a user to the principals they currently hold
pub trait SubjectResolver {
    fn resolve(&self, user: &UserId) -> anyhow::Result<Subject>;
}

/// Reads role bindings for the legacy importer
///
/// `bindings` is called at most once per project and may be called from
/// several threads.
pub trait BindingSource: Send + Sync {
    /// Projects to import, by project ID
    fn projects(&self) -> anyhow::Result<Vec<String>>;

    /// Role bindings of one project's IAM policy
    fn bindings(&self, project: &str) -> anyhow::Result<Vec<RoleBinding>>;

    /// Role bindings above project level, used for the environment ACL
    fn environment_bindings(&self) -> anyhow::Result<Vec<RoleBinding>>;
}

/// Applies a grant, e.g. by adding a time-bound group membership
pub trait Provisioner {
    fn provision(&self, grant: &Grant) -> anyhow::Result<()>;
}
