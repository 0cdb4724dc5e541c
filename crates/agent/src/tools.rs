//! The tool contract and registry.
//!
//! A tool is a named, schema-described capability the model may request. The
//! registry is assembled once at process start and advertised to the model on
//! every round-trip; arguments are validated against the declared schema at
//! this edge, so a tool's `execute` never sees a payload missing required
//! fields. Tools authorize their own effects against the caller identity —
//! the engine passes identity through and never treats tool output as
//! pre-authorized.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use relay_core::domain::request::{TenantId, UserId};
use relay_core::fingerprint::catalog_digest;

use crate::llm::ToolSpec;

/// Identity of the requester, forwarded to every tool execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallerContext {
    pub tenant_id: TenantId,
    pub user_id: UserId,
}

/// Declared parameter contract, rendered to JSON schema for the model.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterSchema {
    pub properties: Vec<ParameterSpec>,
    pub required: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParameterKind,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParameterKind {
    fn json_type(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

impl ParameterSchema {
    pub fn to_json_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        for spec in &self.properties {
            properties.insert(
                spec.name.clone(),
                serde_json::json!({
                    "type": spec.kind.json_type(),
                    "description": spec.description,
                }),
            );
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": self.required,
        })
    }

    /// Checks the required-field list against the supplied arguments.
    pub fn validate(&self, arguments: &serde_json::Value) -> Result<(), ToolError> {
        let object = arguments
            .as_object()
            .ok_or_else(|| ToolError::InvalidArguments("arguments must be an object".to_string()))?;

        for field in &self.required {
            match object.get(field) {
                None | Some(serde_json::Value::Null) => {
                    return Err(ToolError::InvalidArguments(format!(
                        "missing required field `{field}`"
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Failures a tool may surface. Messages cross back to the model and the end
/// user, so they carry no stack traces or internal identifiers.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("not authorized: {0}")]
    Unauthorized(String),
    #[error("{0}")]
    Failed(String),
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn parameters(&self) -> ParameterSchema;

    async fn execute(
        &self,
        arguments: serde_json::Value,
        caller: &CallerContext,
    ) -> Result<serde_json::Value, ToolError>;
}

/// One model-requested invocation within an orchestration run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Outcome of one invocation, keyed by the correlation id of its call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub success: bool,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, output: serde_json::Value) -> Self {
        Self { call_id: call_id.into(), success: true, output: Some(output), error: None }
    }

    pub fn failed(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), success: false, output: None, error: Some(message.into()) }
    }

    /// Serialized form fed back to the model as a tool_result block.
    pub fn content_for_model(&self) -> String {
        match (&self.output, &self.error) {
            (Some(output), _) => output.to_string(),
            (None, Some(error)) => error.clone(),
            (None, None) => "null".to_string(),
        }
    }
}

/// Immutable catalog of callable capabilities, built at process start.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Catalog advertised to the model, in stable name order.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.parameters().to_json_schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Stable digest of the advertised catalog; part of cache fingerprints.
    pub fn catalog_digest(&self) -> String {
        catalog_digest(self.tools.keys().map(String::as_str))
    }
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::testing::{EchoTool, FailingTool};
    use super::{ParameterSchema, ToolError, ToolRegistry, ToolResult};

    #[test]
    fn registry_advertises_specs_in_stable_order() {
        let mut registry = ToolRegistry::new();
        registry.register(FailingTool);
        registry.register(EchoTool);

        let specs = registry.specs();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "always_fails");
        assert_eq!(specs[1].name, "echo");
        assert_eq!(specs[1].input_schema["type"], "object");
        assert_eq!(specs[1].input_schema["required"][0], "message");
    }

    #[test]
    fn catalog_digest_changes_with_membership_not_order() {
        let mut ab = ToolRegistry::new();
        ab.register(EchoTool);
        ab.register(FailingTool);

        let mut ba = ToolRegistry::new();
        ba.register(FailingTool);
        ba.register(EchoTool);

        let mut solo = ToolRegistry::new();
        solo.register(EchoTool);

        assert_eq!(ab.catalog_digest(), ba.catalog_digest());
        assert_ne!(ab.catalog_digest(), solo.catalog_digest());
    }

    #[test]
    fn schema_validation_catches_missing_and_null_required_fields() {
        let schema = ParameterSchema {
            properties: Vec::new(),
            required: vec!["email".to_string()],
        };

        assert!(schema.validate(&json!({ "email": "dana@acme.test" })).is_ok());
        assert!(matches!(
            schema.validate(&json!({})),
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            schema.validate(&json!({ "email": null })),
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            schema.validate(&json!("not an object")),
            Err(ToolError::InvalidArguments(_))
        ));
    }

    #[test]
    fn result_content_prefers_output_over_error() {
        let ok = ToolResult::ok("call-1", json!({"id": "c-7"}));
        assert_eq!(ok.content_for_model(), "{\"id\":\"c-7\"}");

        let failed = ToolResult::failed("call-2", "unknown tool");
        assert_eq!(failed.content_for_model(), "unknown tool");
        assert!(!failed.success);
    }
}
