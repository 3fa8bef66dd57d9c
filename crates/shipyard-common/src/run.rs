use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::criteria::MvpCriteria;
use crate::report::AcceptanceReport;
use crate::spec::AppSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Created,
    Building,
    Built,
    Passed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Building => "building",
            Self::Built => "built",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }

    /// Transitions of the campaign state machine. `Built → Building` is the
    /// only backwards edge (one correction cycle).
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Building)
                | (Self::Building, Self::Built)
                | (Self::Built, Self::Passed)
                | (Self::Built, Self::Building)
                | (Self::Built, Self::Failed)
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "building" => Ok(Self::Building),
            "built" => Ok(Self::Built),
            "passed" => Ok(Self::Passed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid run status: {}", s)),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("invalid run transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: RunStatus,
    pub to: RunStatus,
}

/// One campaign execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub status: RunStatus,
    pub iterations: u32,
    pub max_iterations: u32,
    pub external_id: Option<String>,
    pub preview_location: Option<String>,
    pub spec: AppSpec,
    pub criteria: MvpCriteria,
    /// Most recent QA report. Kept after a terminal failure for diagnosis.
    pub last_report: Option<AcceptanceReport>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn new(criteria: MvpCriteria, spec: AppSpec, max_iterations: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: RunStatus::Created,
            iterations: 0,
            max_iterations,
            external_id: None,
            preview_location: None,
            spec,
            criteria,
            last_report: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition_to(&mut self, next: RunStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn iterations_remaining(&self) -> u32 {
        self.max_iterations.saturating_sub(self.iterations)
    }
}

/// Build-complete signal, delivered by the builder's webhook or synthesized in-process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildComplete {
    pub run_id: Uuid,
    #[serde(default, alias = "app_id")]
    pub external_id: Option<String>,
    #[serde(default, alias = "preview_url")]
    pub preview_location: Option<String>,
}
