//! Activation: turning an allowed join into a grant
//!
//! A subject holding APPROVE_SELF is activated immediately. Otherwise the
//! join becomes a [`Proposal`] that qualified reviewers approve:
//!
//! ```text
//! Pending ──approve × min_reviewers──▶ Approved
//!    │ ──reject──────────────────────▶ Rejected
//!    └ ──timeout─────────────────────▶ Expired
//! ```
//!
//! The requester never counts as a reviewer, and each reviewer counts once.

use crate::core::acl::Permission;
use crate::core::constraint::ConstraintClass;
use crate::core::error::ActivationError;
use crate::core::events;
use crate::core::policy::{Inputs, JitGroupContext, JoinAnalysis, JoinDecision, Privilege};
use crate::core::principal::{JitGroupId, PrincipalId, Subject, UserId};
use crate::core::temporary::{TemporaryCondition, TimeSpan};
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use tracing::{debug, info};

/// A time-bounded membership, ready to be provisioned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub user: UserId,
    pub group: JitGroupId,
    pub privileges: Vec<Privilege>,
    pub validity: TimeSpan,
    /// `validity` encoded as a temporary condition
    pub condition: String,
}

impl Grant {
    pub fn new(user: UserId, group: JitGroupId, privileges: Vec<Privilege>, validity: TimeSpan) -> Self {
        Grant {
            user,
            group,
            privileges,
            condition: TemporaryCondition::encode_span(&validity),
            validity,
        }
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.validity.contains(now)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    /// Self-approved; the grant can be provisioned right away
    Activated(Grant),
    /// Awaiting approval by other users
    Proposed(Proposal),
}

impl<'a> JitGroupContext<'a> {
    /// Join the group, or propose joining it
    ///
    /// Fails with [`ActivationError::AccessDenied`] if the subject may not
    /// join at all, and with [`ActivationError::ConstraintsUnsatisfied`] if
    /// it could join once the listed constraints are met.
    pub fn join(
        &self,
        subject: &Subject,
        inputs: &Inputs,
        now: DateTime<Utc>,
    ) -> Result<JoinOutcome, ActivationError> {
        let analysis = self.analyze_join(subject, inputs, now);
        let duration = match analysis.decision {
            JoinDecision::AlreadyJoined => {
                return Err(ActivationError::InvalidState(format!(
                    "{} is already a member of {}",
                    subject.user(),
                    analysis.group
                )))
            }
            JoinDecision::Disallowed => {
                return Err(ActivationError::AccessDenied(format!(
                    "{} is not allowed to join {}",
                    subject.user(),
                    analysis.group
                )))
            }
            JoinDecision::InputRequired | JoinDecision::ConstraintsFailed => {
                return Err(unsatisfied(&analysis))
            }
            JoinDecision::AllowedWithApproval | JoinDecision::AllowedWithoutApproval => analysis
                .constraints
                .expiry
                .ok_or_else(|| unsatisfied(&analysis))?,
        };

        if analysis.decision == JoinDecision::AllowedWithoutApproval {
            let grant = self.grant(subject.user().clone(), now, duration)?;
            info!(
                event = events::ACTIVATION_GRANTED,
                group = %grant.group,
                user = %grant.user,
                until = %grant.validity.end(),
                "self-approved activation"
            );
            return Ok(JoinOutcome::Activated(grant));
        }

        let expires_at = now
            .checked_add_signed(self.approval_timeout())
            .ok_or_else(|| {
                ActivationError::InvalidState(format!(
                    "approval timeout for {} is out of range",
                    analysis.group
                ))
            })?;
        let proposal = Proposal {
            requester: subject.user().clone(),
            group: analysis.group,
            inputs: inputs.clone(),
            duration,
            min_reviewers: self.min_reviewers(),
            created_at: now,
            expires_at,
            reviewers: Vec::new(),
            state: ProposalState::Pending,
        };
        info!(
            event = events::PROPOSAL_TRANSITION,
            group = %proposal.group,
            user = %proposal.requester,
            state = %proposal.state,
            "proposed activation"
        );
        Ok(JoinOutcome::Proposed(proposal))
    }

    fn grant(&self, user: UserId, now: DateTime<Utc>, duration: Duration) -> Result<Grant, ActivationError> {
        let validity = TimeSpan::starting_at(now, duration)
            .map_err(|e| ActivationError::InvalidState(e.to_string()))?;
        Ok(Grant::new(user, self.id(), self.group().privileges().to_vec(), validity))
    }
}

fn unsatisfied(analysis: &JoinAnalysis) -> ActivationError {
    let report = &analysis.constraints;
    let mut names = report.unsatisfied.clone();
    names.extend(report.failed.iter().map(|(name, _)| name.clone()));
    if names.is_empty() {
        names.push("expiry".to_string());
    }
    ActivationError::ConstraintsUnsatisfied(names)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalState {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ProposalState::Pending => "pending",
            ProposalState::Approved => "approved",
            ProposalState::Rejected => "rejected",
            ProposalState::Expired => "expired",
        };
        f.write_str(text)
    }
}

/// A join request awaiting peer approval
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    requester: UserId,
    group: JitGroupId,
    inputs: Inputs,
    duration: Duration,
    min_reviewers: u32,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    reviewers: Vec<UserId>,
    state: ProposalState,
}

impl Proposal {
    pub fn requester(&self) -> &UserId {
        &self.requester
    }

    pub fn group(&self) -> &JitGroupId {
        &self.group
    }

    /// Inputs the requester supplied to the join constraints
    pub fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    /// Requested activation duration
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn min_reviewers(&self) -> u32 {
        self.min_reviewers
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Reviewers who approved so far
    pub fn reviewers(&self) -> &[UserId] {
        &self.reviewers
    }

    pub fn state(&self) -> ProposalState {
        self.state
    }

    /// Principals that may review this proposal, for notification
    ///
    /// Group principals still need to be expanded by the caller.
    pub fn candidate_reviewers<'c>(&self, context: &JitGroupContext<'c>) -> Vec<&'c PrincipalId> {
        let requester = PrincipalId::User(self.requester.clone());
        context
            .effective_acl()
            .map(|acl| {
                acl.principals_with(Permission::APPROVE_OTHERS)
                    .filter(|p| **p != requester)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Move to `Expired` if the approval window has passed
    ///
    /// Returns whether the proposal is expired.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.state == ProposalState::Pending && now >= self.expires_at {
            self.transition(ProposalState::Expired);
        }
        self.state == ProposalState::Expired
    }

    /// Record an approval
    ///
    /// Returns the grant once `min_reviewers` distinct reviewers approved,
    /// `None` while more approvals are needed.
    pub fn approve(
        &mut self,
        context: &JitGroupContext<'_>,
        reviewer: &Subject,
        inputs: &Inputs,
        now: DateTime<Utc>,
    ) -> Result<Option<Grant>, ActivationError> {
        self.check_reviewable(context, reviewer, now)?;

        if self.reviewers.contains(reviewer.user()) {
            return Err(ActivationError::InvalidState(format!(
                "{} already approved this proposal",
                reviewer.user()
            )));
        }

        let report = context.evaluate_constraints(ConstraintClass::Approve, reviewer, inputs, now);
        if !report.is_satisfied() {
            let mut names = report.unsatisfied;
            names.extend(report.failed.into_iter().map(|(name, _)| name));
            return Err(ActivationError::ConstraintsUnsatisfied(names));
        }

        let grant = if self.reviewers.len() + 1 >= self.min_reviewers as usize {
            Some(context.grant(self.requester.clone(), now, self.duration)?)
        } else {
            None
        };

        self.reviewers.push(reviewer.user().clone());
        debug!(
            event = events::PROPOSAL_TRANSITION,
            group = %self.group,
            reviewer = %reviewer.user(),
            approvals = self.reviewers.len(),
            required = self.min_reviewers,
            "recorded approval"
        );

        let Some(grant) = grant else {
            return Ok(None);
        };

        self.transition(ProposalState::Approved);
        info!(
            event = events::ACTIVATION_GRANTED,
            group = %grant.group,
            user = %grant.user,
            until = %grant.validity.end(),
            "peer-approved activation"
        );
        Ok(Some(grant))
    }

    /// Reject the proposal; only qualified reviewers may do so
    pub fn reject(
        &mut self,
        context: &JitGroupContext<'_>,
        reviewer: &Subject,
        now: DateTime<Utc>,
    ) -> Result<(), ActivationError> {
        self.check_reviewable(context, reviewer, now)?;
        self.transition(ProposalState::Rejected);
        Ok(())
    }

    fn check_reviewable(
        &mut self,
        context: &JitGroupContext<'_>,
        reviewer: &Subject,
        now: DateTime<Utc>,
    ) -> Result<(), ActivationError> {
        if self.expire_if_due(now) {
            return Err(ActivationError::Expired(self.expires_at.to_rfc3339()));
        }
        if self.state != ProposalState::Pending {
            return Err(ActivationError::InvalidState(format!(
                "proposal is {}",
                self.state
            )));
        }
        if context.id() != self.group {
            return Err(ActivationError::InvalidState(format!(
                "proposal is for {}, not {}",
                self.group,
                context.id()
            )));
        }
        if reviewer.user() == &self.requester {
            return Err(ActivationError::SelfApproval);
        }
        if !context.is_allowed(reviewer, Permission::APPROVE_OTHERS, now) {
            return Err(ActivationError::AccessDenied(format!(
                "{} is not allowed to approve requests for {}",
                reviewer.user(),
                self.group
            )));
        }
        Ok(())
    }

    fn transition(&mut self, state: ProposalState) {
        debug!(
            event = events::PROPOSAL_TRANSITION,
            group = %self.group,
            user = %self.requester,
            from = %self.state,
            to = %state,
            "proposal transition"
        );
        self.state = state;
    }
}
