//! Model collaborator: ideation, spec writing and critique.
//!
//! The campaign controller only sees [`ProductModel`]; [`OpenAiModel`] is the
//! chat-completions implementation. Response parsing lives here so it can be
//! tested without a network.

pub mod openai;

use async_trait::async_trait;
use serde_json::Value;
use shipyard_common::{AcceptanceReport, AppSpec, ChangeRequest, Idea, MvpCriteria};

use crate::errors::LlmError;

pub use openai::{LlmSettings, OpenAiModel};

#[async_trait]
pub trait ProductModel: Send + Sync {
    /// Ranked app ideas for the criteria. Never empty on success.
    async fn ideate(&self, criteria: &MvpCriteria) -> Result<Vec<Idea>, LlmError>;

    async fn write_spec(&self, criteria: &MvpCriteria, idea: &Idea) -> Result<AppSpec, LlmError>;

    /// Smallest change that should make the failing checks pass.
    async fn critique(
        &self,
        spec: &AppSpec,
        report: &AcceptanceReport,
    ) -> Result<ChangeRequest, LlmError>;
}

fn parse_json(raw: &str, what: &str) -> Result<Value, LlmError> {
    serde_json::from_str(raw).map_err(|e| LlmError::Format(format!("{what} returned non-JSON: {e}")))
}

/// Accepts a bare array, or an object wrapping exactly one array (JSON-object
/// response mode forces the model to wrap lists).
pub fn parse_ideas(raw: &str) -> Result<Vec<Idea>, LlmError> {
    let value = parse_json(raw, "ideate")?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => {
            let mut arrays = map.into_iter().filter_map(|(_, v)| match v {
                Value::Array(items) => Some(items),
                _ => None,
            });
            match (arrays.next(), arrays.next()) {
                (Some(items), None) => items,
                _ => {
                    return Err(LlmError::Format(
                        "ideate must return a JSON array of ideas".to_string(),
                    ));
                }
            }
        }
        _ => {
            return Err(LlmError::Format(
                "ideate must return a JSON array of ideas".to_string(),
            ));
        }
    };
    if items.is_empty() {
        return Err(LlmError::Format(
            "ideate must return a non-empty JSON array".to_string(),
        ));
    }
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value::<Idea>(item)
                .map_err(|e| LlmError::Format(format!("ideate item {i} missing required keys: {e}")))
        })
        .collect()
}

pub fn parse_spec(raw: &str) -> Result<AppSpec, LlmError> {
    let value = parse_json(raw, "spec writer")?;
    serde_json::from_value(value).map_err(|e| LlmError::Format(format!("spec: {e}")))
}

/// The model sometimes omits the target id; the caller's artifact id fills it.
pub fn parse_change_request(raw: &str, fallback_target: &str) -> Result<ChangeRequest, LlmError> {
    let mut value = parse_json(raw, "critique")?;
    if let Value::Object(map) = &mut value
        && !map.contains_key("target_id")
        && !map.contains_key("app_id")
    {
        map.insert(
            "target_id".to_string(),
            Value::String(fallback_target.to_string()),
        );
    }
    serde_json::from_value(value).map_err(|e| LlmError::Format(format!("change request: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ideas_bare_array() {
        let ideas = parse_ideas(r#"[{"idea":"Pulse","score":0.8},{"idea":"Ledger","score":0.6}]"#)
            .unwrap();
        assert_eq!(ideas.len(), 2);
        assert_eq!(ideas[0].idea, "Pulse");
    }

    #[test]
    fn test_parse_ideas_wrapped_in_object() {
        let ideas = parse_ideas(r#"{"ideas":[{"idea":"Pulse","score":7}]}"#).unwrap();
        assert_eq!(ideas[0].score, 7.0);
    }

    #[test]
    fn test_parse_ideas_rejects_empty_and_malformed() {
        assert!(matches!(parse_ideas("[]"), Err(LlmError::Format(_))));
        assert!(matches!(parse_ideas("not json"), Err(LlmError::Format(_))));
        assert!(matches!(
            parse_ideas(r#"[{"idea":"no score"}]"#),
            Err(LlmError::Format(msg)) if msg.contains("item 0")
        ));
        assert!(matches!(
            parse_ideas(r#"{"a":[],"b":[]}"#),
            Err(LlmError::Format(_))
        ));
        assert!(matches!(parse_ideas("42"), Err(LlmError::Format(_))));
    }

    #[test]
    fn test_parse_spec_with_legacy_checks() {
        let spec = parse_spec(
            r##"{"name":"Pulse","screens":[],"interaction":{},"datasources":{},
               "acceptance_tests":[{"id":"T1","method":"dom","selector":"#movers","range":[1,3]}]}"##,
        )
        .unwrap();
        assert_eq!(spec.acceptance_tests[0].target, "#movers");
    }

    #[test]
    fn test_parse_spec_rejects_unknown_method() {
        let err = parse_spec(
            r#"{"name":"Pulse","acceptance_tests":[{"id":"T1","method":"vibes","target":"x"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, LlmError::Format(msg) if msg.contains("vibes")));
    }

    #[test]
    fn test_parse_change_request_fills_missing_target() {
        let cr = parse_change_request(r#"{"reason":"T2 failed","changes":["add row"]}"#, "app_1")
            .unwrap();
        assert_eq!(cr.target_id, "app_1");

        let cr = parse_change_request(
            r#"{"app_id":"app_from_model","reason":"r","changes":[]}"#,
            "app_1",
        )
        .unwrap();
        assert_eq!(cr.target_id, "app_from_model");
    }
}
