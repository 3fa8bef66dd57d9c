use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard ceiling on caller-supplied iteration budgets.
pub const MAX_ITERATIONS_CEILING: u32 = 10;

fn default_max_iterations() -> u32 {
    3
}

/// Product criteria a campaign is started from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MvpCriteria {
    pub target_user: String,
    pub primary_outcome: String,
    pub must_haves: Vec<String>,
    #[serde(default)]
    pub ux_rules: Vec<String>,
    #[serde(default)]
    pub non_goals: Vec<String>,
    #[serde(default)]
    pub perf: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub accessibility: BTreeMap<String, serde_json::Value>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

#[derive(Debug, Error, PartialEq)]
pub enum CriteriaError {
    #[error("field '{0}' must not be empty")]
    Empty(&'static str),

    #[error("max_iterations must be between 1 and {ceiling}, got {value}")]
    IterationsOutOfRange { value: u32, ceiling: u32 },
}

impl MvpCriteria {
    pub fn validate(&self) -> Result<(), CriteriaError> {
        if self.target_user.trim().is_empty() {
            return Err(CriteriaError::Empty("target_user"));
        }
        if self.primary_outcome.trim().is_empty() {
            return Err(CriteriaError::Empty("primary_outcome"));
        }
        if self.must_haves.iter().all(|m| m.trim().is_empty()) {
            return Err(CriteriaError::Empty("must_haves"));
        }
        if self.max_iterations == 0 || self.max_iterations > MAX_ITERATIONS_CEILING {
            return Err(CriteriaError::IterationsOutOfRange {
                value: self.max_iterations,
                ceiling: MAX_ITERATIONS_CEILING,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> serde_json::Value {
        serde_json::json!({
            "target_user": "retail investors",
            "primary_outcome": "see market movers at a glance",
            "must_haves": ["top gainers", "top losers"]
        })
    }

    #[test]
    fn test_defaults_applied() {
        let criteria: MvpCriteria = serde_json::from_value(minimal_json()).unwrap();
        assert_eq!(criteria.max_iterations, 3);
        assert!(criteria.ux_rules.is_empty());
        assert!(criteria.perf.is_empty());
        assert!(criteria.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_must_haves() {
        let mut criteria: MvpCriteria = serde_json::from_value(minimal_json()).unwrap();
        criteria.must_haves = vec!["  ".into()];
        assert_eq!(criteria.validate(), Err(CriteriaError::Empty("must_haves")));
    }

    #[test]
    fn test_validate_rejects_zero_iterations() {
        let mut criteria: MvpCriteria = serde_json::from_value(minimal_json()).unwrap();
        criteria.max_iterations = 0;
        assert!(matches!(
            criteria.validate(),
            Err(CriteriaError::IterationsOutOfRange { value: 0, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_iterations_above_ceiling() {
        let mut criteria: MvpCriteria = serde_json::from_value(minimal_json()).unwrap();
        criteria.max_iterations = MAX_ITERATIONS_CEILING + 1;
        assert!(criteria.validate().is_err());
        criteria.max_iterations = MAX_ITERATIONS_CEILING;
        assert!(criteria.validate().is_ok());
    }

    #[test]
    fn test_missing_required_field_fails_to_parse() {
        let result = serde_json::from_value::<MvpCriteria>(serde_json::json!({
            "target_user": "x",
            "must_haves": []
        }));
        assert!(result.is_err());
    }
}
