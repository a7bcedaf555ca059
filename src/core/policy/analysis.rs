//! Join analysis: the decision whether, and how, a subject may join a group

use super::{EnvironmentPolicy, JitGroupPolicy, Policy, PolicyNode, SystemPolicy};
use crate::core::acl::{AccessControlList, Permission};
use crate::core::constraint::{Constraint, ConstraintClass, Property};
use crate::core::error::ConstraintError;
use crate::core::events;
use crate::core::expression::Value;
use crate::core::principal::{JitGroupId, PrincipalId, Subject};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// User-supplied input values, keyed by property name
pub type Inputs = BTreeMap<String, String>;

/// Activation duration used when no expiry constraint applies
pub const DEFAULT_ACTIVATION_MINUTES: i64 = 60;

/// Approval timeout used when no node sets one
pub const DEFAULT_APPROVAL_TIMEOUT_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinDecision {
    /// The subject is already an active member
    AlreadyJoined,
    /// The ACL does not grant JOIN, or approval is needed and no other
    /// principal may approve
    Disallowed,
    /// Constraints are unsatisfied only because input is missing or invalid
    InputRequired,
    /// Constraints are unsatisfied despite complete input, or broken
    ConstraintsFailed,
    /// Joining needs approval by other users
    AllowedWithApproval,
    /// The subject may approve its own join
    AllowedWithoutApproval,
}

impl fmt::Display for JoinDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            JoinDecision::AlreadyJoined => "already joined",
            JoinDecision::Disallowed => "join disallowed",
            JoinDecision::InputRequired => "input required",
            JoinDecision::ConstraintsFailed => "constraints failed",
            JoinDecision::AllowedWithApproval => "join allowed with approval",
            JoinDecision::AllowedWithoutApproval => "join allowed without approval",
        };
        f.write_str(text)
    }
}

/// Outcome of evaluating one class of constraints
#[derive(Debug, Clone, Default)]
pub struct ConstraintReport {
    /// Names of satisfied constraints
    pub satisfied: Vec<String>,
    /// Names of unsatisfied constraints
    pub unsatisfied: Vec<String>,
    /// Constraints that could not be evaluated
    pub failed: Vec<(String, ConstraintError)>,
    /// Required properties without a value
    pub missing_input: Vec<String>,
    /// Properties whose supplied text could not be parsed
    pub invalid_input: Vec<(String, ConstraintError)>,
    /// Every declared property, with the values that were applied
    pub input: Vec<Property>,
    /// Activation duration, if it could be determined
    pub expiry: Option<Duration>,
    awaiting_input: Vec<String>,
}

impl ConstraintReport {
    pub fn is_satisfied(&self) -> bool {
        self.unsatisfied.is_empty() && self.failed.is_empty()
    }

    /// Whether supplying more input could still satisfy every constraint
    pub fn needs_input(&self) -> bool {
        self.failed.is_empty()
            && !self.unsatisfied.is_empty()
            && self
                .unsatisfied
                .iter()
                .all(|name| self.awaiting_input.contains(name))
    }
}

/// Result of [`JitGroupContext::analyze_join`]
#[derive(Debug, Clone)]
pub struct JoinAnalysis {
    pub group: JitGroupId,
    pub decision: JoinDecision,
    /// Effective permissions of the subject on the group
    pub permissions: Permission,
    /// End of the subject's current membership, if already joined
    pub active_until: Option<DateTime<Utc>>,
    pub constraints: ConstraintReport,
}

impl JoinAnalysis {
    pub fn is_allowed(&self) -> bool {
        matches!(
            self.decision,
            JoinDecision::AllowedWithApproval | JoinDecision::AllowedWithoutApproval
        )
    }

    pub fn requires_approval(&self) -> bool {
        self.decision == JoinDecision::AllowedWithApproval
    }
}

/// A group together with its ancestors
///
/// Resolves inherited settings: the ACL of the nearest node that has one,
/// constraints merged from environment to group, and approval settings.
#[derive(Debug, Clone, Copy)]
pub struct JitGroupContext<'a> {
    environment: &'a EnvironmentPolicy,
    system: &'a SystemPolicy,
    group: &'a JitGroupPolicy,
}

impl<'a> JitGroupContext<'a> {
    pub(crate) fn new(
        environment: &'a EnvironmentPolicy,
        system: &'a SystemPolicy,
        group: &'a JitGroupPolicy,
    ) -> Self {
        JitGroupContext {
            environment,
            system,
            group,
        }
    }

    pub fn id(&self) -> JitGroupId {
        JitGroupId::new(self.environment.name(), self.system.name(), self.group.name())
    }

    pub fn environment(&self) -> &'a EnvironmentPolicy {
        self.environment
    }

    pub fn system(&self) -> &'a SystemPolicy {
        self.system
    }

    pub fn group(&self) -> &'a JitGroupPolicy {
        self.group
    }

    /// Nodes from the environment down to the group
    fn lineage(&self) -> [&'a PolicyNode; 3] {
        [self.environment.node(), self.system.node(), self.group.node()]
    }

    /// ACL of the nearest node that has one
    pub fn effective_acl(&self) -> Option<&'a AccessControlList> {
        self.lineage().into_iter().rev().find_map(|node| node.acl())
    }

    /// Permissions the effective ACL grants `subject` at `now`
    pub fn effective_permissions(&self, subject: &Subject, now: DateTime<Utc>) -> Permission {
        self.effective_acl()
            .map(|acl| acl.effective_permissions_at(subject, now))
            .unwrap_or(Permission::NONE)
    }

    pub fn is_allowed(&self, subject: &Subject, required: Permission, now: DateTime<Utc>) -> bool {
        self.effective_acl()
            .map_or(false, |acl| acl.is_allowed_at(subject, required, now))
    }

    /// Constraints of a class from all levels; a nearer node's constraint
    /// replaces an ancestor's constraint of the same name
    pub fn effective_constraints(&self, class: ConstraintClass) -> Vec<Arc<dyn Constraint>> {
        let mut effective: Vec<Arc<dyn Constraint>> = Vec::new();
        for node in self.lineage() {
            let own = node.constraints(class);
            effective.retain(|inherited| own.iter().all(|c| c.name() != inherited.name()));
            effective.extend(own.iter().cloned());
        }
        effective
    }

    /// Distinct reviewers a peer-approved join needs
    pub fn min_reviewers(&self) -> u32 {
        self.lineage()
            .iter()
            .rev()
            .find_map(|node| node.min_reviewers())
            .unwrap_or(1)
    }

    pub fn approval_timeout(&self) -> Duration {
        self.lineage()
            .iter()
            .rev()
            .find_map(|node| node.approval_timeout())
            .unwrap_or_else(|| Duration::minutes(DEFAULT_APPROVAL_TIMEOUT_MINUTES))
    }

    /// Evaluate every constraint of `class` for `subject`
    ///
    /// Inputs are matched to properties by name. Each constraint gets a
    /// fresh check with `subject`, `group` and `request` bound as context.
    pub fn evaluate_constraints(
        &self,
        class: ConstraintClass,
        subject: &Subject,
        inputs: &Inputs,
        now: DateTime<Utc>,
    ) -> ConstraintReport {
        let mut report = ConstraintReport::default();
        let mut has_expiry = false;

        for constraint in self.effective_constraints(class) {
            let mut check = constraint.create_check();
            check.add_context("subject", subject_value(subject, now));
            check.add_context("group", group_value(&self.id()));
            check.add_context("request", Value::map([("time", Value::Timestamp(now))]));

            let mut awaiting = false;
            for property in check.input_mut() {
                if let Some(text) = inputs.get(property.name()) {
                    if let Err(e) = property.set_text(text) {
                        report.invalid_input.push((property.name().to_string(), e));
                        awaiting = true;
                    }
                }
            }
            let missing = check.missing_input();
            awaiting |= !missing.is_empty();
            report.missing_input.extend(missing);
            report.input.extend(check.input().iter().cloned());

            if let Some(expiry) = constraint.as_expiry() {
                if !has_expiry {
                    has_expiry = true;
                    report.expiry = expiry.extract_expiry(check.input());
                }
            }

            let name = constraint.name().to_string();
            match check.evaluate() {
                Ok(true) => report.satisfied.push(name),
                Ok(false) => {
                    if awaiting {
                        report.awaiting_input.push(name.clone());
                    }
                    report.unsatisfied.push(name);
                }
                Err(e) => {
                    warn!(
                        event = events::CONSTRAINT_EVALUATION_FAILED,
                        group = %self.id(),
                        constraint = %name,
                        error = %e,
                        "constraint could not be evaluated"
                    );
                    report.failed.push((name, e));
                }
            }
        }

        if !has_expiry {
            report.expiry = Some(Duration::minutes(DEFAULT_ACTIVATION_MINUTES));
        }
        report
    }

    /// Whether some principal other than `subject`'s own user principal
    /// holds APPROVE_OTHERS on the effective ACL
    fn has_reviewers_for(&self, subject: &Subject) -> bool {
        let requester = PrincipalId::User(subject.user().clone());
        self.effective_acl().map_or(false, |acl| {
            acl.principals_with(Permission::APPROVE_OTHERS)
                .any(|principal| *principal != requester)
        })
    }

    /// Decide whether `subject` may join this group
    ///
    /// 1. An active membership short-circuits to `AlreadyJoined`
    /// 2. Without JOIN permission the decision is `Disallowed` and no
    ///    constraint is evaluated
    /// 3. JOIN constraints are evaluated and partitioned
    /// 4. If all pass, APPROVE_SELF decides whether approval is needed;
    ///    a join needing approval that nobody else could give is `Disallowed`
    pub fn analyze_join(&self, subject: &Subject, inputs: &Inputs, now: DateTime<Utc>) -> JoinAnalysis {
        let id = self.id();
        let permissions = self.effective_permissions(subject, now);

        let (decision, active_until, constraints) =
            if let Some(expiry) = subject.active_membership(&id, now) {
                (JoinDecision::AlreadyJoined, Some(expiry), ConstraintReport::default())
            } else if !permissions.contains(Permission::JOIN) {
                (JoinDecision::Disallowed, None, ConstraintReport::default())
            } else {
                let report = self.evaluate_constraints(ConstraintClass::Join, subject, inputs, now);
                let decision = if report.is_satisfied() {
                    if permissions.contains(Permission::APPROVE_SELF) {
                        JoinDecision::AllowedWithoutApproval
                    } else if self.has_reviewers_for(subject) {
                        JoinDecision::AllowedWithApproval
                    } else {
                        JoinDecision::Disallowed
                    }
                } else if report.needs_input() {
                    JoinDecision::InputRequired
                } else {
                    JoinDecision::ConstraintsFailed
                };
                (decision, None, report)
            };

        debug!(
            event = events::JOIN_ANALYZED,
            group = %id,
            user = %subject.user(),
            decision = %decision,
            "analyzed join"
        );

        JoinAnalysis {
            group: id,
            decision,
            permissions,
            active_until,
            constraints,
        }
    }
}

fn subject_value(subject: &Subject, now: DateTime<Utc>) -> Value {
    let mut principals: Vec<String> = subject.principals_at(now).map(ToString::to_string).collect();
    principals.sort();
    Value::map([
        ("email", Value::from(subject.user().email())),
        (
            "principals",
            Value::List(principals.into_iter().map(Value::String).collect()),
        ),
    ])
}

fn group_value(id: &JitGroupId) -> Value {
    Value::map([
        ("environment", Value::from(id.environment())),
        ("system", Value::from(id.system())),
        ("name", Value::from(id.name())),
    ])
}
