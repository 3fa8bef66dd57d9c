use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

static APP_ID_QUERY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]app_id=([A-Za-z0-9_-]+)").unwrap());

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    pub external_id: String,
    pub preview_location: String,
    /// The id could not be read from the location and was made up locally.
    pub id_synthesized: bool,
}

impl BuildArtifact {
    pub fn new(external_id: impl Into<String>, preview_location: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            preview_location: preview_location.into(),
            id_synthesized: false,
        }
    }

    /// Derive the artifact id from the preview location. When neither the
    /// path form (`<marker><id>`) nor the `app_id` query form matches, an
    /// `unknown_<unix seconds>` id is synthesized so the run stays trackable.
    pub fn from_location(preview_location: String, marker: &str) -> Self {
        match extract_external_id(&preview_location, marker) {
            Some(external_id) => Self {
                external_id,
                preview_location,
                id_synthesized: false,
            },
            None => {
                let external_id = format!("unknown_{}", chrono::Utc::now().timestamp());
                warn!(
                    %preview_location,
                    %external_id,
                    "could not extract artifact id from preview location, synthesized one"
                );
                Self {
                    external_id,
                    preview_location,
                    id_synthesized: true,
                }
            }
        }
    }
}

pub fn extract_external_id(location: &str, marker: &str) -> Option<String> {
    if !marker.is_empty() {
        let path_form = Regex::new(&format!("{}([A-Za-z0-9_-]+)", regex::escape(marker))).ok()?;
        if let Some(caps) = path_form.captures(location) {
            return Some(caps[1].to_string());
        }
    }
    APP_ID_QUERY_REGEX
        .captures(location)
        .map(|caps| caps[1].to_string())
}
