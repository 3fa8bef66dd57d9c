//! Acceptance evaluator: runs declarative checks against a rendered preview.
//!
//! Failing checks are data, not errors. Only evaluator mechanics (browser
//! unavailable, preview unreachable) surface as [`QaError`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shipyard_common::{
    AcceptanceCheck, AcceptanceReport, CheckMethod, CheckResult, Gesture, SwipeDirection,
};
use tracing::{debug, info, warn};

use crate::browser::{Browser, BrowserSession, Locator, SessionOptions};
use crate::errors::{BrowserError, QaError};

/// Pointer origin and horizontal displacement of a synthetic swipe.
const SWIPE_ORIGIN: (i64, i64) = (400, 400);
const SWIPE_DISTANCE: i64 = 400;

#[async_trait]
pub trait AcceptanceRunner: Send + Sync {
    async fn evaluate(
        &self,
        location: &str,
        checks: &[AcceptanceCheck],
    ) -> Result<AcceptanceReport, QaError>;
}

#[derive(Debug, Clone)]
pub struct QaSettings {
    pub network_idle_timeout: Duration,
    pub quiet_window: Duration,
}

impl Default for QaSettings {
    fn default() -> Self {
        Self {
            network_idle_timeout: Duration::from_secs(30),
            quiet_window: Duration::from_millis(500),
        }
    }
}

/// Opens one headless session per evaluation and always closes it.
pub struct BrowserEvaluator {
    browser: Arc<dyn Browser>,
    settings: QaSettings,
}

impl BrowserEvaluator {
    pub fn new(browser: Arc<dyn Browser>, settings: QaSettings) -> Self {
        Self { browser, settings }
    }

    async fn evaluate_in(
        &self,
        session: &mut dyn BrowserSession,
        location: &str,
        checks: &[AcceptanceCheck],
    ) -> Result<AcceptanceReport, QaError> {
        session
            .goto(location)
            .await
            .map_err(|source| QaError::Unreachable {
                location: location.to_string(),
                source,
            })?;
        session
            .wait_for_network_idle(self.settings.network_idle_timeout, self.settings.quiet_window)
            .await?;
        Ok(run_checks(session, checks).await?)
    }
}

#[async_trait]
impl AcceptanceRunner for BrowserEvaluator {
    async fn evaluate(
        &self,
        location: &str,
        checks: &[AcceptanceCheck],
    ) -> Result<AcceptanceReport, QaError> {
        let options = SessionOptions {
            headless: true,
            profile_dir: None,
        };
        let mut session = self.browser.open(&options).await?;
        let result = self.evaluate_in(session.as_mut(), location, checks).await;
        if let Err(e) = session.close().await {
            warn!(error = %e, "failed to close QA session");
        }
        if let Ok(report) = &result {
            info!(
                location,
                passed = report.passed,
                failing = report.failing_count(),
                "acceptance checks evaluated"
            );
        }
        result
    }
}

/// Evaluate every check in order on an already-loaded page. An empty list
/// passes.
pub async fn run_checks(
    session: &mut dyn BrowserSession,
    checks: &[AcceptanceCheck],
) -> Result<AcceptanceReport, BrowserError> {
    let mut results = Vec::with_capacity(checks.len());
    for check in checks {
        let passed = evaluate_check(session, check).await?;
        debug!(check_id = %check.id, method = check.method.name(), passed, "check evaluated");
        results.push(CheckResult {
            check_id: check.id.clone(),
            passed,
        });
    }
    Ok(AcceptanceReport::from_results(results))
}

async fn evaluate_check(
    session: &mut dyn BrowserSession,
    check: &AcceptanceCheck,
) -> Result<bool, BrowserError> {
    let target = Locator::css(check.target.clone());
    match &check.method {
        CheckMethod::StructuralAssert { assert } => {
            let html = match session.find(&target).await {
                Ok(element) => session.inner_html(&element).await?,
                // A missing target fails the check; it does not abort the pass.
                Err(BrowserError::NoSuchElement { .. }) => return Ok(false),
                Err(e) => return Err(e),
            };
            Ok(assert.iter().all(|needle| html.contains(needle.as_str())))
        }
        CheckMethod::CountAssert { assert_count } => {
            for (label, expected) in assert_count {
                let labelled =
                    Locator::css(format!("{} [data-test=\"{}\"]", check.target, label));
                let count = session.find_all(&labelled).await?.len();
                if count != *expected {
                    debug!(check_id = %check.id, label = %label, count, expected, "count mismatch");
                    return Ok(false);
                }
            }
            Ok(true)
        }
        CheckMethod::RangeAssert { range: (lo, hi) } => {
            let count = session.find_all(&target).await?.len();
            Ok(*lo <= count && count <= *hi)
        }
        CheckMethod::InteractionSequence { actions } => {
            for action in actions {
                perform(session, action).await?;
            }
            // Verifies the gestures are performable, not their visual effect.
            Ok(true)
        }
    }
}

async fn perform(session: &mut dyn BrowserSession, gesture: &Gesture) -> Result<(), BrowserError> {
    match gesture {
        Gesture::Swipe(direction) => {
            let dx = match direction {
                SwipeDirection::Left => -SWIPE_DISTANCE,
                SwipeDirection::Right => SWIPE_DISTANCE,
            };
            let (x, y) = SWIPE_ORIGIN;
            session.drag((x, y), (x + dx, y)).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBrowser, FakeElement, FakeSession};
    use serde_json::json;

    fn check(value: serde_json::Value) -> AcceptanceCheck {
        serde_json::from_value(value).unwrap()
    }

    fn movers_page(gainers: usize, losers: usize) -> FakeSession {
        let session = FakeSession::default();
        for _ in 0..gainers {
            session.add(
                Locator::css("#movers [data-test=\"gainer\"]"),
                FakeElement::new("li"),
            );
        }
        for _ in 0..losers {
            session.add(
                Locator::css("#movers [data-test=\"loser\"]"),
                FakeElement::new("li"),
            );
        }
        session
    }

    fn count_check(gainer: usize, loser: usize) -> AcceptanceCheck {
        check(json!({
            "id": "T2", "method": "count-assert", "target": "#movers",
            "assert_count": {"gainer": gainer, "loser": loser}
        }))
    }

    #[tokio::test]
    async fn test_count_assert_exact_match_passes() {
        let mut session = movers_page(3, 3);
        let report = run_checks(&mut session, &[count_check(3, 3)]).await.unwrap();
        assert!(report.passed);
    }

    #[tokio::test]
    async fn test_count_assert_off_by_one_fails() {
        for (g, l) in [(2, 3), (4, 3), (3, 2), (3, 4)] {
            let mut session = movers_page(3, 3);
            let report = run_checks(&mut session, &[count_check(g, l)]).await.unwrap();
            assert!(!report.passed, "expected {{gainer: {g}, loser: {l}}} to fail");
        }
    }

    #[tokio::test]
    async fn test_range_assert_bounds_are_inclusive() {
        let range_check = check(json!({
            "id": "T3", "method": "range-assert", "target": ".news-item", "range": [3, 5]
        }));
        for (n, expected) in [(2, false), (3, true), (4, true), (5, true), (6, false)] {
            let mut session = FakeSession::default();
            for _ in 0..n {
                session.add(Locator::css(".news-item"), FakeElement::new("article"));
            }
            let report = run_checks(&mut session, std::slice::from_ref(&range_check))
                .await
                .unwrap();
            assert_eq!(report.passed, expected, "count {n}");
        }
    }

    #[tokio::test]
    async fn test_structural_assert_requires_every_substring() {
        let mut session = FakeSession::default();
        session.add(
            Locator::css("#overview"),
            FakeElement::new("section").html("<h1>Today</h1><p>Top movers</p>"),
        );
        let all_present = check(json!({
            "id": "T1", "method": "structural-assert", "target": "#overview",
            "assert": ["Today", "Top movers"]
        }));
        let one_missing = check(json!({
            "id": "T1b", "method": "structural-assert", "target": "#overview",
            "assert": ["Today", "Headlines"]
        }));
        let report = run_checks(&mut session, &[all_present, one_missing])
            .await
            .unwrap();
        assert!(report.results[0].passed);
        assert!(!report.results[1].passed);
        assert!(!report.passed);
    }

    #[tokio::test]
    async fn test_structural_assert_missing_target_fails_check_only() {
        let mut session = FakeSession::default();
        let missing = check(json!({
            "id": "T1", "method": "structural-assert", "target": "#nope", "assert": ["x"]
        }));
        let report = run_checks(&mut session, &[missing]).await.unwrap();
        assert_eq!(report.results.len(), 1);
        assert!(!report.passed);
    }

    #[tokio::test]
    async fn test_interaction_sequence_swipes_and_passes() {
        let mut session = FakeSession::default();
        let swipe = check(json!({
            "id": "T4", "method": "playwright",
            "actions": [{"swipe": "left"}, {"swipe": "right"}]
        }));
        let report = run_checks(&mut session, &[swipe]).await.unwrap();
        assert!(report.passed);
        assert_eq!(
            session.log(),
            vec!["drag 400,400 -> 0,400", "drag 400,400 -> 800,400"]
        );
    }

    #[tokio::test]
    async fn test_empty_check_list_passes() {
        let mut session = FakeSession::default();
        let report = run_checks(&mut session, &[]).await.unwrap();
        assert!(report.passed);
        assert!(report.results.is_empty());
    }

    #[tokio::test]
    async fn test_evaluator_closes_session_and_reports() {
        let browser = FakeBrowser::new();
        browser.add(Locator::css(".news-item"), FakeElement::new("article"));
        let evaluator = BrowserEvaluator::new(Arc::new(browser.clone()), QaSettings::default());
        let checks = vec![check(json!({
            "id": "T3", "method": "range-assert", "target": ".news-item", "range": [1, 2]
        }))];
        let report = evaluator
            .evaluate("https://preview.test/app_1", &checks)
            .await
            .unwrap();
        assert!(report.passed);
        assert_eq!(browser.open_sessions(), 0);
        assert!(browser.log().contains(&"goto https://preview.test/app_1".to_string()));
    }

    #[tokio::test]
    async fn test_unreachable_preview_is_error_and_session_closed() {
        let browser = FakeBrowser::new();
        browser.fail_navigation();
        let evaluator = BrowserEvaluator::new(Arc::new(browser.clone()), QaSettings::default());
        let err = evaluator
            .evaluate("https://preview.test/gone", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, QaError::Unreachable { .. }));
        assert_eq!(browser.open_sessions(), 0);
    }
}
