//! Planner malfunctions.
//!
//! Everything here is a programming or configuration error and aborts the
//! planning session. "No plan exists" is not an error; it is reported as
//! [`PlanOutcome::NotFound`](crate::PlanOutcome::NotFound).

use thiserror::Error;

use crate::graph::Achievement;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("state `{state}` requires live inquiry but has no inquiry callback")]
    MissingInquiry { state: String },

    #[error("inquiry for state `{state}` returned no value")]
    InquiryUndefined { state: String },

    #[error("state `{state}` cannot be evaluated while its owners are unbound")]
    Ungrounded { state: String },

    #[error("invalid rule `{rule}`: {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("state node `{state}` expected to be {expected:?}, found {found:?}")]
    UnexpectedStatus {
        state: String,
        expected: Achievement,
        found: Achievement,
    },
}

impl PlanError {
    pub(crate) fn invalid_rule(rule: &str, reason: impl Into<String>) -> Self {
        PlanError::InvalidRule {
            rule: rule.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PlanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_name_the_offending_state() {
        let err = PlanError::InquiryUndefined {
            state: "Energy(avatar)".to_string(),
        };
        assert!(err.to_string().contains("Energy(avatar)"));

        let err = PlanError::invalid_rule("eat", "no effects");
        assert_eq!(err.to_string(), "invalid rule `eat`: no effects");
    }
}
