//! Invocation types: one tool call as delivered by the agent platform.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One agent-supplied parameter. Values are always transmitted as strings,
/// whatever their logical type; [`crate::decode`] recovers the typed value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub value: String,
    /// Type hint the platform attaches to some parameters. Informational
    /// only; the decode schema is authoritative.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            type_hint: None,
        }
    }
}

/// How the invocation identifies the requested operation. The platform uses
/// exactly one of the two styles per action group, never both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Dispatch {
    #[serde(rename_all = "camelCase")]
    Api {
        api_path: String,
        http_method: String,
    },
    Function { function: String },
}

/// A tool invocation from the agent platform.
///
/// Parameter names are unique within one invocation; order is preserved as
/// received for diagnostics. Unknown fields on the platform event (agent
/// metadata, prompt attributes) are ignored on deserialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub action_group: String,
    #[serde(flatten)]
    pub dispatch: Dispatch,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default = "default_message_version")]
    pub message_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_attributes: Option<IndexMap<String, String>>,
}

fn default_message_version() -> String {
    "1.0".to_owned()
}

impl ToolInvocation {
    pub fn function(
        action_group: impl Into<String>,
        function: impl Into<String>,
        parameters: Vec<Parameter>,
    ) -> Self {
        Self {
            action_group: action_group.into(),
            dispatch: Dispatch::Function {
                function: function.into(),
            },
            parameters,
            message_version: default_message_version(),
            session_attributes: None,
        }
    }

    pub fn api(
        action_group: impl Into<String>,
        api_path: impl Into<String>,
        http_method: impl Into<String>,
        parameters: Vec<Parameter>,
    ) -> Self {
        Self {
            action_group: action_group.into(),
            dispatch: Dispatch::Api {
                api_path: api_path.into(),
                http_method: http_method.into(),
            },
            parameters,
            message_version: default_message_version(),
            session_attributes: None,
        }
    }

    /// The requested operation: the function name or the API path.
    pub fn operation(&self) -> &str {
        match &self.dispatch {
            Dispatch::Function { function } => function,
            Dispatch::Api { api_path, .. } => api_path,
        }
    }

    pub fn is_api_style(&self) -> bool {
        matches!(self.dispatch, Dispatch::Api { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn function_style_event_deserializes() {
        let event = json!({
            "messageVersion": "1.0",
            "agent": {"name": "research-agent", "id": "AGENT123"},
            "actionGroup": "survival-data",
            "function": "group_survival_data",
            "parameters": [
                {"name": "threshold", "type": "number", "value": "10"},
                {"name": "biomarker", "type": "array", "value": "[1, 2, 3]"}
            ]
        });

        let invocation: ToolInvocation = serde_json::from_value(event).unwrap();
        assert_eq!(invocation.action_group, "survival-data");
        assert_eq!(invocation.operation(), "group_survival_data");
        assert!(!invocation.is_api_style());
        assert_eq!(invocation.parameters.len(), 2);
        assert_eq!(invocation.parameters[0].name, "threshold");
        assert_eq!(invocation.parameters[1].value, "[1, 2, 3]");
    }

    #[test]
    fn api_style_event_deserializes() {
        let event = json!({
            "messageVersion": "1.0",
            "actionGroup": "database",
            "apiPath": "/queryredshift",
            "httpMethod": "POST",
            "parameters": [{"name": "query", "type": "string", "value": "SELECT 1"}]
        });

        let invocation: ToolInvocation = serde_json::from_value(event).unwrap();
        assert!(invocation.is_api_style());
        assert_eq!(invocation.operation(), "/queryredshift");
        match &invocation.dispatch {
            Dispatch::Api { http_method, .. } => assert_eq!(http_method, "POST"),
            Dispatch::Function { .. } => panic!("expected api dispatch"),
        }
    }

    #[test]
    fn missing_parameters_default_to_empty() {
        let event = json!({
            "actionGroup": "database",
            "apiPath": "/getschema",
            "httpMethod": "GET"
        });

        let invocation: ToolInvocation = serde_json::from_value(event).unwrap();
        assert!(invocation.parameters.is_empty());
        assert_eq!(invocation.message_version, "1.0");
    }

    #[test]
    fn dispatch_roundtrips_wire_casing() {
        let invocation =
            ToolInvocation::api("literature", "/query-pubmed", "GET", vec![Parameter::new(
                "query",
                "NSCLC EGFR",
            )]);
        let value = serde_json::to_value(&invocation).unwrap();
        assert_eq!(value["apiPath"], "/query-pubmed");
        assert_eq!(value["httpMethod"], "GET");
        assert_eq!(value["actionGroup"], "literature");

        let back: ToolInvocation = serde_json::from_value(value).unwrap();
        assert_eq!(back, invocation);
    }
}
