//! Build drivers: turn a build prompt or a change request into a built
//! artifact in the external builder.
//!
//! | Driver | Transport |
//! |--------|-----------|
//! | [`UiBuildDriver`] | Browser automation against the builder's web UI |
//! | [`ApiBuildDriver`] | Builder HTTP API (`apps.create` / `apps.update`) |
//! | [`StubBuildDriver`] | In-process double for development |

pub mod api;
pub mod artifact;
pub mod prompt;
pub mod stub;
pub mod ui;

use async_trait::async_trait;
use shipyard_common::ChangeRequest;

use crate::errors::DriverError;

pub use api::ApiBuildDriver;
pub use artifact::{BuildArtifact, extract_external_id};
pub use prompt::{build_prompt, change_prompt};
pub use stub::StubBuildDriver;
pub use ui::{UiBuildDriver, UiSettings};

#[async_trait]
pub trait BuildDriver: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Materialize a new artifact from `prompt`.
    async fn create(&self, prompt: &str) -> Result<BuildArtifact, DriverError>;

    /// Apply `change` to an existing artifact. Returns the new preview
    /// location when the builder issued one.
    async fn update(
        &self,
        external_id: &str,
        change: &ChangeRequest,
    ) -> Result<Option<String>, DriverError>;
}
