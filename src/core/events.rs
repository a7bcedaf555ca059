//! Event ids attached to structured log records as the `event` field
//!
//! ```text
//! WARN jit_policy::core::legacy: skipping binding event="legacy.binding.skipped" ...
//! ```

/// A binding could not be mapped to a group and was left out of the import
pub const LEGACY_BINDING_SKIPPED: &str = "legacy.binding.skipped";

/// Two bindings mapped to the same group and were merged
pub const LEGACY_BINDING_MERGED: &str = "legacy.binding.merged";

/// A binding carries no eligibility marker
pub const LEGACY_BINDING_IGNORED: &str = "legacy.binding.ignored";

/// A legacy system scanned its project's bindings
pub const POLICY_LAZY_LOAD: &str = "policy.lazy_load";

/// A constraint could not be evaluated (as opposed to being unsatisfied)
pub const CONSTRAINT_EVALUATION_FAILED: &str = "constraint.evaluation_failed";

/// A join request was decided
pub const JOIN_ANALYZED: &str = "join.analyzed";

/// A proposal changed state
pub const PROPOSAL_TRANSITION: &str = "proposal.transition";

/// A grant was produced, by self-approval or by the final peer approval
pub const ACTIVATION_GRANTED: &str = "activation.granted";
