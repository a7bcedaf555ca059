//! Policy hierarchy: environment → system → group
//!
//! Every level carries a [`PolicyNode`]:
//! - a name, unique among siblings
//! - an optional ACL; a node without one defers to its parent
//! - constraints by [`ConstraintClass`](crate::core::constraint::ConstraintClass)
//! - optional approval settings
//!
//! Trees are built once, from a [`PolicyDocument`] or by the legacy importer,
//! and are read-only afterwards. The only exception are lazily loaded
//! systems, which produce their groups on first access.
//!
//! Inherited settings are resolved through a [`JitGroupContext`], obtained
//! with [`EnvironmentPolicy::resolve`].

mod analysis;
mod document;
mod environment;
mod group;
mod node;
mod privilege;
mod system;

pub use analysis::{
    ConstraintReport, Inputs, JitGroupContext, JoinAnalysis, JoinDecision,
    DEFAULT_ACTIVATION_MINUTES, DEFAULT_APPROVAL_TIMEOUT_MINUTES,
};
pub use document::{ConstraintsDocument, GroupDocument, NodeDocument, PolicyDocument, SystemDocument};
pub use environment::EnvironmentPolicy;
pub use group::JitGroupPolicy;
pub use node::{Policy, PolicyNode, PolicySource};
pub use privilege::{IamRoleBinding, Privilege};
pub use system::{GroupLoader, SystemPolicy};
