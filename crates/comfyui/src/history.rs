//! Parsing of ComfyUI `/history/{prompt_id}` records.
//!
//! A finished prompt looks like:
//!
//! ```json
//! {
//!   "<prompt_id>": {
//!     "outputs": {
//!       "9": { "images": [{ "filename": "out.png", "subfolder": "", "type": "output" }] }
//!     }
//!   }
//! }
//! ```
//!
//! An unfinished prompt is reported as `{}`.

use serde_json::Value;

/// Default `type` for image descriptors that omit it.
pub const DEFAULT_IMAGE_TYPE: &str = "output";

/// Location of one output image on the ComfyUI server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    pub filename: String,
    pub subfolder: String,
    /// ComfyUI folder type (`output`, `temp`, `input`).
    pub kind: String,
}

/// Find the first output image recorded for `prompt_id`.
///
/// Output nodes are visited in the order the engine reported them; within
/// a node only the first image descriptor is considered, and it must carry
/// a non-empty `filename`. Returns `None` when the prompt has no history
/// yet or produced no images.
pub fn first_image(history: &Value, prompt_id: &str) -> Option<ImageDescriptor> {
    let outputs = history.get(prompt_id)?.get("outputs")?.as_object()?;

    outputs.values().find_map(|node_output| {
        let image = node_output.get("images")?.as_array()?.first()?;
        let filename = image.get("filename")?.as_str().filter(|f| !f.is_empty())?;

        Some(ImageDescriptor {
            filename: filename.to_string(),
            subfolder: string_or(image.get("subfolder"), ""),
            kind: string_or(image.get("type"), DEFAULT_IMAGE_TYPE),
        })
    })
}

/// Return the engine's error message when the prompt finished with an
/// execution error (`status.status_str == "error"`).
///
/// The message is taken from the `execution_error` entry of
/// `status.messages` when present.
pub fn execution_error(history: &Value, prompt_id: &str) -> Option<String> {
    let status = history.get(prompt_id)?.get("status")?;
    if status.get("status_str").and_then(Value::as_str) != Some("error") {
        return None;
    }

    let message = status
        .get("messages")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_array)
        .find(|entry| entry.first().and_then(Value::as_str) == Some("execution_error"))
        .and_then(|entry| entry.get(1)?.get("exception_message")?.as_str())
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty());

    Some(message.unwrap_or_else(|| "execution failed".to_string()))
}

/// Whether a history response is the empty "not finished" placeholder.
pub fn is_empty_history(history: &Value) -> bool {
    match history {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn string_or(value: Option<&Value>, default: &str) -> String {
    value
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn finds_first_image() {
        let history = json!({
            "abc": { "outputs": { "9": { "images": [
                { "filename": "out.png", "subfolder": "", "type": "output" },
                { "filename": "second.png", "subfolder": "", "type": "output" }
            ] } } }
        });
        let image = first_image(&history, "abc").unwrap();
        assert_eq!(image.filename, "out.png");
        assert_eq!(image.subfolder, "");
        assert_eq!(image.kind, "output");
    }

    #[test]
    fn missing_subfolder_and_type_use_defaults() {
        let history = json!({ "abc": { "outputs": { "9": { "images": [{ "filename": "x.png" }] } } } });
        let image = first_image(&history, "abc").unwrap();
        assert_eq!(image.subfolder, "");
        assert_eq!(image.kind, DEFAULT_IMAGE_TYPE);
    }

    #[test]
    fn skips_nodes_without_images() {
        let history = json!({
            "abc": { "outputs": {
                "3": { "latents": [1, 2] },
                "7": { "images": [] },
                "9": { "images": [{ "filename": "late.png", "subfolder": "sub", "type": "temp" }] }
            } }
        });
        let image = first_image(&history, "abc").unwrap();
        assert_eq!(image.filename, "late.png");
        assert_eq!(image.subfolder, "sub");
        assert_eq!(image.kind, "temp");
    }

    #[test]
    fn follows_engine_key_order() {
        let history = json!({
            "abc": { "outputs": {
                "20": { "images": [{ "filename": "first.png" }] },
                "10": { "images": [{ "filename": "second.png" }] }
            } }
        });
        assert_eq!(first_image(&history, "abc").unwrap().filename, "first.png");
    }

    #[test]
    fn descriptor_without_filename_is_skipped() {
        let history = json!({
            "abc": { "outputs": {
                "8": { "images": [{ "subfolder": "" }] },
                "9": { "images": [{ "filename": "ok.png" }] }
            } }
        });
        assert_eq!(first_image(&history, "abc").unwrap().filename, "ok.png");
    }

    #[test]
    fn other_prompt_ids_are_ignored() {
        let history = json!({ "other": { "outputs": { "9": { "images": [{ "filename": "x.png" }] } } } });
        assert!(first_image(&history, "abc").is_none());
    }

    #[test]
    fn no_outputs_yet() {
        assert!(first_image(&json!({ "abc": { "outputs": {} } }), "abc").is_none());
        assert!(first_image(&json!({ "abc": { "status": {} } }), "abc").is_none());
    }

    #[test]
    fn execution_error_with_message() {
        let history = json!({
            "abc": {
                "outputs": {},
                "status": {
                    "status_str": "error",
                    "completed": false,
                    "messages": [
                        ["execution_start", { "prompt_id": "abc" }],
                        ["execution_error", { "prompt_id": "abc", "exception_message": "CUDA out of memory\n" }]
                    ]
                }
            }
        });
        assert_eq!(execution_error(&history, "abc").unwrap(), "CUDA out of memory");
    }

    #[test]
    fn execution_error_without_messages() {
        let history = json!({ "abc": { "status": { "status_str": "error" } } });
        assert_eq!(execution_error(&history, "abc").unwrap(), "execution failed");
    }

    #[test]
    fn successful_status_is_not_an_error() {
        let history = json!({ "abc": { "status": { "status_str": "success", "completed": true } } });
        assert!(execution_error(&history, "abc").is_none());
    }

    #[test]
    fn empty_history_detection() {
        assert!(is_empty_history(&json!({})));
        assert!(is_empty_history(&Value::Null));
        assert!(!is_empty_history(&json!({ "abc": {} })));
    }
}
