//! Tool descriptors and the normalization applied to a configured tool list.

use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashSet;
use tracing::warn;

/// Name of the built-in tool that displays the QR image.
pub const SHOW_QR_TOOL: &str = "show_qr";
/// Name of the built-in tool that puts the session to sleep.
pub const SLEEP_TOOL: &str = "sleep";

/// Where a tool call is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchKind {
    /// A built-in action executed by the client itself.
    Local,
    /// An HTTP request to the tool's configured endpoint.
    #[default]
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

/// Dispatch metadata. Never sent to the remote model.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dispatch {
    #[serde(default)]
    pub kind: DispatchKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Dispatch {
    /// The configured endpoint, treating a blank string as absent.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

/// A named, schema-described action the remote model may request.
///
/// The settings document carries the dispatch object under `meta`, the key
/// the admin page reads and writes. `dispatch` is accepted on input too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,
    #[serde(default, rename = "meta", alias = "dispatch")]
    pub dispatch: Dispatch,
}

impl ToolDescriptor {
    /// Creates a remote tool dispatched over HTTP.
    pub fn remote(
        name: impl Into<String>,
        description: impl Into<String>,
        method: HttpMethod,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: empty_object_schema(),
            dispatch: Dispatch {
                kind: DispatchKind::Remote,
                method: Some(method),
                endpoint: Some(endpoint.into()),
            },
        }
    }

    /// The model-facing view of this tool: name, description and parameter schema.
    pub fn to_function(&self) -> FunctionDefinition {
        FunctionDefinition {
            kind: "function".to_string(),
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// A tool as declared to the remote model in `session.update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Arguments accepted by the show-QR tool.
#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShowQrArgs {
    /// Address of the QR image to display. The configured image is used when omitted.
    #[serde(default)]
    pub qr_url: Option<String>,
}

/// The sleep tool takes no arguments.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct SleepArgs {}

pub fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {}, "required": [] })
}

fn schema_of<T: JsonSchema>() -> Value {
    match serde_json::to_value(schema_for!(T)) {
        Ok(Value::Object(mut schema)) => {
            schema.remove("$schema");
            schema.remove("title");
            Value::Object(schema)
        }
        _ => empty_object_schema(),
    }
}

/// The tools every session carries unless the configuration overrides them by name.
pub fn builtin_tools() -> Vec<ToolDescriptor> {
    let local = Dispatch {
        kind: DispatchKind::Local,
        method: None,
        endpoint: None,
    };
    vec![
        ToolDescriptor {
            name: SHOW_QR_TOOL.to_string(),
            description: "Show the QR code image on the screen for a few seconds.".to_string(),
            parameters: schema_of::<ShowQrArgs>(),
            dispatch: local.clone(),
        },
        ToolDescriptor {
            name: SLEEP_TOOL.to_string(),
            description: "Go to sleep: stop listening until the wake word is spoken.".to_string(),
            parameters: schema_of::<SleepArgs>(),
            dispatch: local,
        },
    ]
}

pub fn is_builtin(name: &str) -> bool {
    name == SHOW_QR_TOOL || name == SLEEP_TOOL
}

/// Normalizes a configured tool list.
///
/// Names are unique in the result (the first entry for a name wins), and the
/// built-in tools are appended when the list does not already define them.
pub fn normalize_tools(tools: Vec<ToolDescriptor>) -> Vec<ToolDescriptor> {
    let mut seen = HashSet::new();
    let mut normalized = Vec::with_capacity(tools.len() + 2);
    for tool in tools {
        if seen.insert(tool.name.clone()) {
            normalized.push(tool);
        } else {
            warn!(tool = %tool.name, "Dropping duplicate tool descriptor");
        }
    }
    for builtin in builtin_tools() {
        if seen.insert(builtin.name.clone()) {
            normalized.push(builtin);
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(tools: &[ToolDescriptor], name: &str) -> usize {
        tools.iter().filter(|t| t.name == name).count()
    }

    #[test]
    fn test_normalize_adds_missing_builtins() {
        let tools = normalize_tools(vec![ToolDescriptor::remote(
            "weather",
            "Current weather",
            HttpMethod::Get,
            "http://localhost/weather",
        )]);

        assert_eq!(tools.len(), 3);
        assert_eq!(count(&tools, SHOW_QR_TOOL), 1);
        assert_eq!(count(&tools, SLEEP_TOOL), 1);
        assert_eq!(tools[0].name, "weather");
    }

    #[test]
    fn test_normalize_keeps_caller_override() {
        let custom_sleep = ToolDescriptor::remote(
            SLEEP_TOOL,
            "Custom sleep",
            HttpMethod::Post,
            "http://localhost/sleep",
        );
        let tools = normalize_tools(vec![custom_sleep.clone()]);

        assert_eq!(count(&tools, SLEEP_TOOL), 1);
        assert_eq!(count(&tools, SHOW_QR_TOOL), 1);
        let sleep = tools.iter().find(|t| t.name == SLEEP_TOOL).unwrap();
        assert_eq!(sleep, &custom_sleep);
    }

    #[test]
    fn test_normalize_empty_list_and_idempotence() {
        let once = normalize_tools(vec![]);
        assert_eq!(once.len(), 2);
        let twice = normalize_tools(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_normalize_drops_duplicate_names() {
        let a = ToolDescriptor::remote("lookup", "first", HttpMethod::Get, "http://a");
        let b = ToolDescriptor::remote("lookup", "second", HttpMethod::Get, "http://b");
        let tools = normalize_tools(vec![a, b]);

        assert_eq!(count(&tools, "lookup"), 1);
        assert_eq!(tools[0].description, "first");
    }

    #[test]
    fn test_descriptor_accepts_legacy_meta_key() {
        let json = r#"{
            "type": "function",
            "name": "lights",
            "description": "Toggle lights",
            "parameters": {"type": "object", "properties": {}, "required": []},
            "meta": {"method": "POST", "endpoint": "http://home/lights"}
        }"#;
        let tool: ToolDescriptor = serde_json::from_str(json).unwrap();

        assert_eq!(tool.dispatch.kind, DispatchKind::Remote);
        assert_eq!(tool.dispatch.method, Some(HttpMethod::Post));
        assert_eq!(tool.dispatch.endpoint(), Some("http://home/lights"));
    }

    #[test]
    fn test_descriptor_writes_meta_key() {
        let tool = ToolDescriptor::remote("lights", "Toggle", HttpMethod::Post, "http://home/l");
        let value = serde_json::to_value(&tool).unwrap();

        assert_eq!(value["meta"]["method"], "POST");
        assert_eq!(value["meta"]["endpoint"], "http://home/l");
        assert!(value.get("dispatch").is_none());

        let reread: ToolDescriptor = serde_json::from_value(value).unwrap();
        assert_eq!(reread, tool);
    }

    #[test]
    fn test_descriptor_accepts_dispatch_key() {
        let tool: ToolDescriptor = serde_json::from_str(
            r#"{"name": "w", "dispatch": {"method": "GET", "endpoint": "http://w"}}"#,
        )
        .unwrap();
        assert_eq!(tool.dispatch.endpoint(), Some("http://w"));
    }

    #[test]
    fn test_blank_endpoint_is_absent() {
        let tool = ToolDescriptor::remote("x", "", HttpMethod::Get, "   ");
        assert_eq!(tool.dispatch.endpoint(), None);
    }

    #[test]
    fn test_function_definition_omits_dispatch() {
        let tool = ToolDescriptor::remote("x", "desc", HttpMethod::Post, "http://secret");
        let value = serde_json::to_value(tool.to_function()).unwrap();

        assert_eq!(value["type"], "function");
        assert_eq!(value["name"], "x");
        assert!(value.get("meta").is_none());
        assert!(!value.to_string().contains("http://secret"));
    }

    #[test]
    fn test_builtin_schemas_are_objects() {
        for tool in builtin_tools() {
            assert_eq!(tool.parameters["type"], "object", "{}", tool.name);
            assert!(tool.parameters.get("$schema").is_none());
        }
        let qr = &builtin_tools()[0];
        assert!(qr.parameters["properties"].get("qrUrl").is_some());
    }
}
