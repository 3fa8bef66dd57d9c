//! Render specs and change requests into builder prompt text.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use shipyard_common::{AppSpec, ChangeRequest, CheckMethod};

static DATA_TEST_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-test\s*=\s*["']?([A-Za-z0-9_-]+)"#).unwrap());

/// `data-test` labels the acceptance checks will look for, in sorted order.
pub fn data_test_labels(spec: &AppSpec) -> Vec<String> {
    let mut labels = BTreeSet::new();
    for check in &spec.acceptance_tests {
        for caps in DATA_TEST_REGEX.captures_iter(&check.target) {
            labels.insert(caps[1].to_string());
        }
        if let CheckMethod::CountAssert { assert_count } = &check.method {
            labels.extend(assert_count.keys().cloned());
        }
    }
    labels.into_iter().collect()
}

pub fn build_prompt(spec: &AppSpec) -> String {
    let mut out = String::new();
    let screens = spec.screens.len();
    let _ = writeln!(
        out,
        "Build a {} mobile UI named \"{}\" with {} swipeable screen{}.",
        spec.theme.as_str(),
        spec.name,
        screens,
        if screens == 1 { "" } else { "s" }
    );

    let labels = data_test_labels(spec);
    if !labels.is_empty() {
        let _ = writeln!(out, "Selectors: data-test='{}'.", labels.join("|"));
    }

    out.push_str("Follow constraints exactly. If a datasource is unavailable, stub clearly.\n");
    if !spec.datasources.is_empty() {
        let names: Vec<&str> = spec.datasources.keys().map(String::as_str).collect();
        let _ = writeln!(out, "Datasources: {}.", names.join(", "));
    }

    let json = serde_json::to_string_pretty(spec).unwrap_or_default();
    let _ = write!(out, "SPEC JSON:\n{json}\n");
    out
}

pub fn change_prompt(change: &ChangeRequest) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Apply the following minimal change to the app.");
    let _ = writeln!(out, "Reason: {}", change.reason);
    if change.changes.is_empty() {
        return out;
    }
    out.push_str("Changes:\n");
    for item in &change.changes {
        match item.as_str() {
            Some(text) => {
                let _ = writeln!(out, "- {text}");
            }
            None => {
                let _ = writeln!(out, "- {item}");
            }
        }
    }
    out
}
