//! Evaluation request envelopes.
//!
//! A run is triggered either by a tagged text message:
//!
//! ```text
//! <white_agent_url>http://localhost:9002/</white_agent_url>
//! <evaluation_config>{"task_subset": "pm", "max_tasks": 3}</evaluation_config>
//! ```
//!
//! or by a YAML/JSON document with an `agent_url` and selection keys.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::RequestError;
use crate::selection::SelectionRequest;

pub const AGENT_URL_TAG: &str = "white_agent_url";
pub const CONFIG_TAG: &str = "evaluation_config";

/// A fully resolved request: which subject to evaluate and on which tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationRequest {
    pub agent_url: String,
    pub selection: SelectionRequest,
}

/// Returns the trimmed contents of the first `<tag>...</tag>` block.
pub fn extract_tag(message: &str, tag: &str) -> Option<String> {
    let tag = regex::escape(tag);
    let pattern = Regex::new(&format!(r"(?s)<{tag}>\s*(.*?)\s*</{tag}>")).ok()?;
    pattern
        .captures(message)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Parses a tagged request message.
///
/// A missing or malformed config block yields the default selection. The
/// subject URL is required unless `fallback_url` supplies one.
pub fn parse_evaluation_request(
    message: &str,
    fallback_url: Option<&str>,
) -> Result<EvaluationRequest, RequestError> {
    let agent_url = extract_tag(message, AGENT_URL_TAG)
        .filter(|url| !url.is_empty())
        .or_else(|| fallback_url.map(str::to_string))
        .ok_or(RequestError::MissingAgentUrl)?;

    let selection = extract_tag(message, CONFIG_TAG)
        .map(|config| selection_from_config(&config))
        .unwrap_or_default();

    Ok(EvaluationRequest {
        agent_url,
        selection,
    })
}

/// Reads selection keys from an `<evaluation_config>` JSON body.
///
/// Keys are read independently: a badly typed key is ignored with a warning
/// and does not discard the others. Unparseable JSON yields the default
/// selection.
pub fn selection_from_config(config: &str) -> SelectionRequest {
    let value: Value = match serde_json::from_str(config) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Malformed evaluation config, using default selection");
            return SelectionRequest::default();
        }
    };
    let Some(fields) = value.as_object() else {
        warn!("Evaluation config is not a JSON object, using default selection");
        return SelectionRequest::default();
    };

    let mut selection = SelectionRequest::default();

    if let Some(names) = fields.get("task_names") {
        match names.as_array() {
            Some(items) => {
                selection.task_names = items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect();
                if selection.task_names.len() != items.len() {
                    warn!("Ignoring non-string entries in task_names");
                }
            }
            None => warn!("Ignoring task_names: expected an array of strings"),
        }
    }

    if let Some(subset) = fields.get("task_subset").or_else(|| fields.get("subset")) {
        match subset.as_str() {
            Some(name) => selection.subset = Some(name.to_string()),
            None => warn!("Ignoring task_subset: expected a string"),
        }
    }

    if let Some(max) = fields.get("max_tasks") {
        match unsigned_field(max) {
            Some(max) => selection.max_tasks = usize::try_from(max).ok(),
            None => warn!(value = %max, "Ignoring max_tasks: expected a non-negative integer"),
        }
    }

    if let Some(seed) = fields.get("random_seed").or_else(|| fields.get("seed")) {
        match unsigned_field(seed) {
            Some(seed) => selection.seed = Some(seed),
            None => warn!(value = %seed, "Ignoring random_seed: expected a non-negative integer"),
        }
    }

    selection
}

/// Accepts JSON integers and integer strings.
fn unsigned_field(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct RequestDocument {
    #[serde(default, alias = "white_agent_url")]
    agent_url: Option<String>,
    #[serde(flatten)]
    selection: SelectionRequest,
}

/// Parses a request file, accepting either the tagged form or a YAML/JSON
/// document.
pub fn parse_request_file(
    contents: &str,
    fallback_url: Option<&str>,
) -> Result<EvaluationRequest, RequestError> {
    let tagged = [AGENT_URL_TAG, CONFIG_TAG]
        .iter()
        .any(|tag| contents.contains(&format!("<{tag}>")));
    if tagged {
        return parse_evaluation_request(contents, fallback_url);
    }

    let document: RequestDocument = serde_yaml::from_str(contents)?;
    let agent_url = document
        .agent_url
        .filter(|url| !url.trim().is_empty())
        .or_else(|| fallback_url.map(str::to_string))
        .ok_or(RequestError::MissingAgentUrl)?;

    Ok(EvaluationRequest {
        agent_url,
        selection: document.selection,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE: &str = r#"Your task is to begin an assessment of the agent located at:

<white_agent_url>
http://localhost:9002/
</white_agent_url>

Use the following evaluation configuration:

<evaluation_config>
{
  "task_subset": "pm",
  "max_tasks": 3,
  "random_seed": 42
}
</evaluation_config>
"#;

    #[test]
    fn test_parse_tagged_message() {
        let request = parse_evaluation_request(MESSAGE, None).expect("parse");
        assert_eq!(request.agent_url, "http://localhost:9002/");
        assert_eq!(request.selection.subset.as_deref(), Some("pm"));
        assert_eq!(request.selection.max_tasks, Some(3));
        assert_eq!(request.selection.seed, Some(42));
    }

    #[test]
    fn test_malformed_config_uses_default_selection() {
        let message = "<white_agent_url>http://a</white_agent_url>\
                       <evaluation_config>{not json</evaluation_config>";
        let request = parse_evaluation_request(message, None).expect("parse");
        assert_eq!(request.selection, SelectionRequest::default());
    }

    #[test]
    fn test_badly_typed_key_keeps_task_names() {
        let message = r#"<white_agent_url>http://a</white_agent_url>
<evaluation_config>{"task_names": ["sde-create-new-repo"], "random_seed": -1, "max_tasks": "3"}</evaluation_config>"#;
        let request = parse_evaluation_request(message, None).expect("parse");
        assert_eq!(request.selection.task_names, vec!["sde-create-new-repo"]);
        assert_eq!(request.selection.seed, None);
        assert_eq!(request.selection.max_tasks, Some(3));
    }

    #[test]
    fn test_non_object_config_uses_default_selection() {
        assert_eq!(selection_from_config("[1, 2]"), SelectionRequest::default());
        assert_eq!(
            selection_from_config(r#"{"task_subset": 5, "max_tasks": 2}"#),
            SelectionRequest::default().with_max_tasks(2)
        );
    }

    #[test]
    fn test_missing_url() {
        let err = parse_evaluation_request("<evaluation_config>{}</evaluation_config>", None)
            .expect_err("no url");
        assert!(matches!(err, RequestError::MissingAgentUrl));

        let request = parse_evaluation_request(
            "<evaluation_config>{}</evaluation_config>",
            Some("http://fallback"),
        )
        .expect("fallback");
        assert_eq!(request.agent_url, "http://fallback");
    }

    #[test]
    fn test_explicit_task_names_in_config() {
        let message = r#"<white_agent_url>http://a</white_agent_url>
<evaluation_config>{"task_names": ["pm-send-hello-message"]}</evaluation_config>"#;
        let request = parse_evaluation_request(message, None).expect("parse");
        assert_eq!(request.selection.task_names, vec!["pm-send-hello-message"]);
    }

    #[test]
    fn test_yaml_request_file() {
        let yaml = "agent_url: http://localhost:9002\ntask_subset: hr\nmax_tasks: 2\n";
        let request = parse_request_file(yaml, None).expect("parse");
        assert_eq!(request.agent_url, "http://localhost:9002");
        assert_eq!(request.selection.subset.as_deref(), Some("hr"));
        assert_eq!(request.selection.max_tasks, Some(2));
    }

    #[test]
    fn test_json_request_file_with_fallback_url() {
        let json = r#"{"task_names": ["sde-create-new-repo"], "seed": 7}"#;
        let request = parse_request_file(json, Some("http://env-url")).expect("parse");
        assert_eq!(request.agent_url, "http://env-url");
        assert_eq!(request.selection.seed, Some(7));
    }

    #[test]
    fn test_request_file_tagged_form() {
        let request = parse_request_file(MESSAGE, None).expect("parse");
        assert_eq!(request.selection.max_tasks, Some(3));
    }
}
