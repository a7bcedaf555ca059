//! Eligibility markers in legacy binding conditions
//!
//! A binding is eligible for just-in-time activation if one top-level clause
//! of its condition is a marker:
//!
//! ```text
//! has({}.jitaccessconstraint)             self-approval
//! has({}.multipartyapprovalconstraint)    peer approval
//! ```
//!
//! The other clauses scope the role to resources and are kept as the
//! privilege's condition.

use crate::core::acl::Permission;
use crate::core::error::ImportError;
use crate::core::expression::{reformat, split_and};
use crate::core::temporary::TemporaryCondition;
use once_cell::sync::Lazy;
use regex::Regex;

static JIT_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^has\(\{\}\.jitaccessconstraint\)$").expect("JIT marker pattern is valid")
});

static MPA_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^has\(\{\}\.multipartyapprovalconstraint\)$").expect("MPA marker pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// Members may approve their own activation
    Jit,
    /// Members need approval by another member
    Mpa,
}

impl Eligibility {
    /// Permissions granted to the members of an eligible binding
    pub fn permissions(self) -> Permission {
        match self {
            Eligibility::Jit => Permission::JOIN | Permission::APPROVE_SELF,
            Eligibility::Mpa => Permission::JOIN | Permission::APPROVE_OTHERS,
        }
    }
}

/// An eligibility marker together with the remaining resource condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibleCondition {
    pub eligibility: Eligibility,
    /// Remaining clauses in canonical form, `None` if there were none
    pub resource_condition: Option<String>,
}

fn marker(clause: &str) -> Option<Eligibility> {
    let compact: String = clause.chars().filter(|c| !c.is_whitespace()).collect();
    if JIT_MARKER.is_match(&compact) {
        Some(Eligibility::Jit)
    } else if MPA_MARKER.is_match(&compact) {
        Some(Eligibility::Mpa)
    } else {
        None
    }
}

/// Look for an eligibility marker among the top-level clauses of `condition`
///
/// Returns `Ok(None)` for conditions without a marker. Fails if the
/// remaining clauses do not parse, if both markers are present, or if the
/// remainder is a temporary condition (an activation, not an eligibility).
pub fn classify(condition: &str) -> Result<Option<EligibleCondition>, ImportError> {
    let mut eligibility = None;
    let mut remaining = Vec::new();

    for clause in split_and(condition) {
        match (marker(&clause), eligibility) {
            (Some(found), None) => eligibility = Some(found),
            (Some(found), Some(previous)) if found == previous => {}
            (Some(_), Some(_)) => {
                return Err(ImportError::UnsupportedCondition(
                    "condition carries both JIT and MPA markers".to_string(),
                ))
            }
            (None, _) => remaining.push(clause.trim().to_string()),
        }
    }

    let Some(eligibility) = eligibility else {
        return Ok(None);
    };

    let resource_condition = if remaining.is_empty() {
        None
    } else {
        let joined = remaining
            .iter()
            .map(|clause| format!("({})", clause))
            .collect::<Vec<_>>()
            .join(" && ");
        let canonical = reformat(&joined)?;
        if TemporaryCondition::is_temporary_condition(&canonical) {
            return Err(ImportError::UnsupportedCondition(format!(
                "temporary condition on an eligible binding: {}",
                canonical
            )));
        }
        Some(canonical)
    };

    Ok(Some(EligibleCondition {
        eligibility,
        resource_condition,
    }))
}
