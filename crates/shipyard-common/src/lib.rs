//! Shared domain types for the shipyard campaign orchestrator.
//!
//! Everything here is plain data: the criteria a campaign starts from, the
//! application spec produced by the model, the declarative acceptance checks
//! the evaluator runs, and the run record the controller mutates.

pub mod criteria;
pub mod report;
pub mod run;
pub mod spec;

pub use criteria::{CriteriaError, MvpCriteria};
pub use report::{AcceptanceReport, CheckResult};
pub use run::{BuildComplete, InvalidTransition, RunRecord, RunStatus};
pub use spec::{
    AcceptanceCheck, AppSpec, ChangeRequest, CheckFormatError, CheckMethod, Gesture, Idea,
    SwipeDirection, Theme, select_top_idea,
};
