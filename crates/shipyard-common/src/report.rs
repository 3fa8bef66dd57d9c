use serde::{Deserialize, Serialize};

/// Verdict for a single acceptance check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_id: String,
    pub passed: bool,
}

/// Evaluator output for one QA pass, in check order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceReport {
    pub results: Vec<CheckResult>,
    pub passed: bool,
}

impl AcceptanceReport {
    /// Build a report; `passed` is the AND over every result, so an empty
    /// result list passes.
    pub fn from_results(results: Vec<CheckResult>) -> Self {
        let passed = results.iter().all(|r| r.passed);
        Self { results, passed }
    }

    pub fn failing(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    pub fn failing_count(&self) -> usize {
        self.failing().count()
    }
}
