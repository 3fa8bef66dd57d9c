//! Evaluate acceptance checks against a live preview: `shipyard qa`.

use std::path::Path;

use anyhow::{Context, Result};
use shipyard::app::acceptance_runner;
use shipyard::config::ShipyardToml;
use shipyard_common::AppSpec;

use super::read_json;

pub async fn cmd_qa(config: &ShipyardToml, spec_path: &Path, url: &str) -> Result<()> {
    let spec: AppSpec = serde_json::from_value(read_json(spec_path)?)
        .with_context(|| format!("{} is not a valid app spec", spec_path.display()))?;

    let report = acceptance_runner(config)
        .evaluate(url, &spec.acceptance_tests)
        .await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.passed {
        anyhow::bail!(
            "{} of {} checks failed",
            report.failing_count(),
            report.results.len()
        );
    }
    Ok(())
}
