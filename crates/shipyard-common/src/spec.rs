use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One ranked product idea returned by ideation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Idea {
    pub idea: String,
    pub score: f64,
}

/// Pick the highest-scoring idea. Equal scores keep the first-listed idea.
pub fn select_top_idea(ideas: &[Idea]) -> Option<&Idea> {
    let mut best: Option<&Idea> = None;
    for idea in ideas.iter().filter(|i| !i.score.is_nan()) {
        if best.is_none_or(|b| idea.score > b.score) {
            best = Some(idea);
        }
    }
    best.or_else(|| ideas.first())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Theme {
    #[default]
    MinimalDark,
    Light,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MinimalDark => "minimal-dark",
            Self::Light => "light",
        }
    }
}

/// Structured application description produced once per run by spec-writing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSpec {
    pub name: String,
    #[serde(default)]
    pub screens: Vec<serde_json::Value>,
    #[serde(default)]
    pub interaction: serde_json::Value,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub datasources: BTreeMap<String, String>,
    pub acceptance_tests: Vec<AcceptanceCheck>,
}

/// Minimal corrective instruction produced by critique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRequest {
    #[serde(alias = "app_id")]
    pub target_id: String,
    pub reason: String,
    #[serde(default)]
    pub changes: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    Left,
    Right,
}

/// A single gesture in an interaction sequence. Serialized as `{"swipe": "left"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gesture {
    Swipe(SwipeDirection),
}

/// How a check inspects the rendered page. Each variant carries only the
/// parameters its method needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum CheckMethod {
    /// Every substring must appear in the target's inner markup.
    StructuralAssert { assert: Vec<String> },
    /// Each `data-test` label under the target must occur exactly this often.
    CountAssert { assert_count: BTreeMap<String, usize> },
    /// The number of elements matching the target must fall in `[lo, hi]`.
    RangeAssert { range: (usize, usize) },
    /// Gestures are performed in order; the check passes once they complete.
    InteractionSequence { actions: Vec<Gesture> },
}

impl CheckMethod {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StructuralAssert { .. } => "structural-assert",
            Self::CountAssert { .. } => "count-assert",
            Self::RangeAssert { .. } => "range-assert",
            Self::InteractionSequence { .. } => "interaction-sequence",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCheck")]
pub struct AcceptanceCheck {
    pub id: String,
    pub target: String,
    #[serde(flatten)]
    pub method: CheckMethod,
}

#[derive(Debug, Error, PartialEq)]
pub enum CheckFormatError {
    #[error("check {id}: unknown method '{method}'")]
    UnknownMethod { id: String, method: String },

    #[error("check {id}: method '{method}' is missing '{field}'")]
    MissingField {
        id: String,
        method: String,
        field: &'static str,
    },

    #[error("check {id}: range lower bound {lo} exceeds upper bound {hi}")]
    InvertedRange { id: String, lo: usize, hi: usize },
}

/// Accepts both the tagged wire form and the model's older `dom` / `playwright` shape.
#[derive(Deserialize)]
struct RawCheck {
    #[serde(default)]
    id: Option<String>,
    method: String,
    #[serde(default, alias = "selector")]
    target: Option<String>,
    #[serde(default)]
    assert: Option<Vec<String>>,
    #[serde(default)]
    assert_count: Option<BTreeMap<String, usize>>,
    #[serde(default)]
    range: Option<(usize, usize)>,
    #[serde(default)]
    actions: Option<Vec<Gesture>>,
}

impl TryFrom<RawCheck> for AcceptanceCheck {
    type Error = CheckFormatError;

    fn try_from(raw: RawCheck) -> Result<Self, Self::Error> {
        let id = raw.id.unwrap_or_else(|| "T?".to_string());
        let missing = |field: &'static str| CheckFormatError::MissingField {
            id: id.clone(),
            method: raw.method.clone(),
            field,
        };

        let method = match raw.method.as_str() {
            "structural-assert" => CheckMethod::StructuralAssert {
                assert: raw.assert.ok_or_else(|| missing("assert"))?,
            },
            "count-assert" => CheckMethod::CountAssert {
                assert_count: raw.assert_count.ok_or_else(|| missing("assert_count"))?,
            },
            "range-assert" => CheckMethod::RangeAssert {
                range: raw.range.ok_or_else(|| missing("range"))?,
            },
            "interaction-sequence" | "playwright" => CheckMethod::InteractionSequence {
                actions: raw.actions.unwrap_or_default(),
            },
            "dom" => {
                if let Some(assert) = raw.assert {
                    CheckMethod::StructuralAssert { assert }
                } else if let Some(assert_count) = raw.assert_count {
                    CheckMethod::CountAssert { assert_count }
                } else if let Some(range) = raw.range {
                    CheckMethod::RangeAssert { range }
                } else {
                    return Err(missing("assert | assert_count | range"));
                }
            }
            other => {
                return Err(CheckFormatError::UnknownMethod {
                    id,
                    method: other.to_string(),
                });
            }
        };

        if let CheckMethod::RangeAssert { range: (lo, hi) } = method
            && lo > hi
        {
            return Err(CheckFormatError::InvertedRange { id, lo, hi });
        }

        let target = raw.target.unwrap_or_default();
        if target.trim().is_empty() && !matches!(method, CheckMethod::InteractionSequence { .. }) {
            return Err(missing("target"));
        }

        Ok(Self { id, target, method })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn idea(name: &str, score: f64) -> Idea {
        Idea {
            idea: name.to_string(),
            score,
        }
    }

    #[test]
    fn test_select_top_idea_highest_score() {
        let ideas = vec![idea("a", 0.4), idea("b", 0.9), idea("c", 0.7)];
        assert_eq!(select_top_idea(&ideas).unwrap().idea, "b");
    }

    #[test]
    fn test_select_top_idea_tie_keeps_first_listed() {
        let ideas = vec![idea("a", 0.5), idea("b", 0.8), idea("c", 0.8)];
        assert_eq!(select_top_idea(&ideas).unwrap().idea, "b");
    }

    #[test]
    fn test_select_top_idea_empty() {
        assert!(select_top_idea(&[]).is_none());
    }

    #[test]
    fn test_select_top_idea_ignores_nan() {
        let ideas = vec![idea("a", 0.2), idea("b", f64::NAN)];
        assert_eq!(select_top_idea(&ideas).unwrap().idea, "a");
    }

    #[test]
    fn test_tagged_check_parses() {
        let check: AcceptanceCheck = serde_json::from_value(json!({
            "id": "T1",
            "method": "count-assert",
            "target": "[data-test=movers]",
            "assert_count": {"gainer": 3, "loser": 3}
        }))
        .unwrap();
        assert_eq!(check.id, "T1");
        match check.method {
            CheckMethod::CountAssert { assert_count } => {
                assert_eq!(assert_count["gainer"], 3);
                assert_eq!(assert_count["loser"], 3);
            }
            other => panic!("Expected CountAssert, got {:?}", other),
        }
    }

    #[test]
    fn test_legacy_dom_shapes_parse() {
        let structural: AcceptanceCheck = serde_json::from_value(json!({
            "id": "T1", "method": "dom", "selector": "#root", "assert": ["overview"]
        }))
        .unwrap();
        assert_eq!(structural.method.name(), "structural-assert");
        assert_eq!(structural.target, "#root");

        let range: AcceptanceCheck = serde_json::from_value(json!({
            "id": "T2", "method": "dom", "selector": "[data-test=news-item]", "range": [3, 10]
        }))
        .unwrap();
        assert_eq!(range.method, CheckMethod::RangeAssert { range: (3, 10) });
    }

    #[test]
    fn test_legacy_playwright_swipe_parses() {
        let check: AcceptanceCheck = serde_json::from_value(json!({
            "method": "playwright",
            "actions": [{"swipe": "left"}, {"swipe": "right"}]
        }))
        .unwrap();
        assert_eq!(check.id, "T?");
        assert_eq!(
            check.method,
            CheckMethod::InteractionSequence {
                actions: vec![
                    Gesture::Swipe(SwipeDirection::Left),
                    Gesture::Swipe(SwipeDirection::Right)
                ]
            }
        );
    }

    #[test]
    fn test_unknown_method_rejected() {
        let err = serde_json::from_value::<AcceptanceCheck>(json!({
            "id": "T9", "method": "visual-diff", "target": "body"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("visual-diff"));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = serde_json::from_value::<AcceptanceCheck>(json!({
            "id": "T3", "method": "range-assert", "target": "li", "range": [5, 2]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn test_dom_check_without_target_rejected() {
        let err = serde_json::from_value::<AcceptanceCheck>(json!({
            "id": "T4", "method": "structural-assert", "assert": ["x"]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("target"));
    }

    #[test]
    fn test_serialized_check_reads_back() {
        let check = AcceptanceCheck {
            id: "T5".into(),
            target: "#app".into(),
            method: CheckMethod::StructuralAssert {
                assert: vec!["news".into()],
            },
        };
        let value = serde_json::to_value(&check).unwrap();
        assert_eq!(value["method"], "structural-assert");
        let back: AcceptanceCheck = serde_json::from_value(value).unwrap();
        assert_eq!(back, check);
    }

    #[test]
    fn test_change_request_accepts_app_id_alias() {
        let cr: ChangeRequest = serde_json::from_value(json!({
            "app_id": "app_1234",
            "reason": "movers list shows 2 gainers",
            "changes": [{"screen": "movers", "fix": "render 3 gainers"}]
        }))
        .unwrap();
        assert_eq!(cr.target_id, "app_1234");
        assert_eq!(cr.changes.len(), 1);
    }

    #[test]
    fn test_app_spec_defaults() {
        let spec: AppSpec = serde_json::from_value(json!({
            "name": "Movers",
            "acceptance_tests": []
        }))
        .unwrap();
        assert_eq!(spec.theme, Theme::MinimalDark);
        assert!(spec.screens.is_empty());
        assert!(spec.datasources.is_empty());
    }
}
