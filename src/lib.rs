//! # jit-policy - Just-in-Time Group Access Policies
//!
//! `jit-policy` models who may temporarily join which privileged group, under
//! which conditions, and with whose approval:
//!
//! - **Policy tree**: environment → system → group, with ACLs and constraints
//!   inherited from the nearest ancestor
//! - **Constraints**: activation expiry bounds and CEL-style expressions over
//!   user input and request context
//! - **Temporary conditions**: time windows encoded as IAM condition text
//! - **Legacy import**: policies derived from annotated IAM role bindings
//! - **Activation**: self-approved grants and multi-party approval proposals
//!
//! ## Quick Start
//!
//! ```rust
//! use jit_policy::{EnvironmentPolicy, JitGroupId, Principal, Subject, UserId, Result};
//! use chrono::Utc;
//! use std::collections::BTreeMap;
//!
//! # fn main() -> Result<()> {
//! let environment = EnvironmentPolicy::from_toml(r#"
//!     name = "prod"
//!
//!     [[systems]]
//!     name = "db"
//!
//!     [[systems.groups]]
//!     name = "admins"
//!     access = [{ principal = "user:alice@example.com", allow = "JOIN, APPROVE_SELF" }]
//!
//!     [[systems.groups.constraints.join]]
//!     type = "expiry"
//!     min = "PT15M"
//!     max = "PT2H"
//! "#)?;
//!
//! let group = environment
//!     .resolve(&"prod.db.admins".parse::<JitGroupId>()?)?
//!     .expect("group exists");
//!
//! let alice = Subject::new(UserId::new("alice@example.com"), Vec::<Principal>::new());
//! let mut inputs = BTreeMap::new();
//! inputs.insert("expiry".to_string(), "PT1H".to_string());
//!
//! let analysis = group.analyze_join(&alice, &inputs, Utc::now());
//! assert!(analysis.is_allowed());
//! assert!(!analysis.requires_approval());
//! # Ok(())
//! # }
//! ```

pub mod core;

pub use crate::core::{
    acl, activation, constraint, error, events, expression, external, legacy, policy, principal,
    temporary, validation,
};

pub use crate::core::{
    acl::{AccessControlList, AllowedEntry, Permission},
    activation::{Grant, JoinOutcome, Proposal, ProposalState},
    constraint::{Constraint, ConstraintClass, ConstraintSpec, ExpiryConstraint, ExpressionConstraint},
    error::{
        ActivationError, ConstraintError, ExpressionError, ImportError, JitError, PolicyError,
        Result, TemporaryConditionError,
    },
    expression::{reformat, split_and, Expression, Variables},
    external::{BindingSource, Provisioner, SubjectResolver},
    legacy::{LegacyImporter, LegacyPolicyConfig, RoleBinding},
    policy::{
        EnvironmentPolicy, JitGroupContext, JitGroupPolicy, JoinAnalysis, JoinDecision,
        PolicyDocument, SystemPolicy,
    },
    principal::{JitGroupId, Principal, PrincipalId, Subject, UserId},
    temporary::{TemporaryCondition, TimeSpan},
};
