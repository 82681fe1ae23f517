//! Session title capability

use canvas_assistant::{BoxedCapability, CapabilityError, capability_fn};
use serde_json::{Value, json};

use super::SharedHostState;

/// `set_title`: rename the current session
pub fn set_title(state: SharedHostState) -> BoxedCapability {
    capability_fn(
        "set_title",
        "Set a short title for the current chat session.",
        json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Title to show for this session"
                }
            },
            "required": ["title"]
        }),
        move |arguments: Value| {
            let state = state.clone();
            async move {
                let title = arguments
                    .get("title")
                    .and_then(|v| v.as_str())
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| CapabilityError::handler("title must not be blank"))?
                    .to_string();

                tracing::info!("Session title set to {:?}", title);
                state.lock().title = Some(title.clone());
                Ok::<_, CapabilityError>(json!({ "status": "success", "title": title }))
            }
        },
    )
}
