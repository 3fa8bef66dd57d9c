pub mod completion;
pub mod controller;
pub mod registry;
pub mod store;

use serde_json::Value;
use shipyard_common::MvpCriteria;

pub use completion::{BuildTicket, CallbackCompletion, CompletionSource, InlineCompletion};
pub use controller::CampaignController;
pub use registry::{RunHandle, RunRegistry, RunSlot};
pub use store::{MemoryRunStore, RunStore, StatusUpdate};

/// Deserialize criteria, filling `max_iterations` from the configured default
/// when the caller left it out.
pub fn criteria_from_value(
    mut value: Value,
    default_max_iterations: u32,
) -> Result<MvpCriteria, serde_json::Error> {
    if let Value::Object(map) = &mut value
        && !map.contains_key("max_iterations")
    {
        map.insert("max_iterations".to_string(), Value::from(default_max_iterations));
    }
    serde_json::from_value(value)
}
