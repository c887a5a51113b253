//! Tool system: the actions the agent may take during a turn.
//!
//! Each tool declares a small parameter schema (name, text-or-list kind,
//! required flag). Raw parsed calls are validated against that schema before
//! dispatch — a call missing a required parameter is never invoked. The
//! registry renders the invocation format for the system prompt, so the
//! model always sees exactly the tools that are actually callable.

pub mod notes;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// How a declared parameter is typed after binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// A single string value.
    Text,
    /// A comma-separated list; split at binding time.
    List,
}

/// One declared parameter of a tool.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
}

impl ParamSpec {
    pub const fn required(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

/// A bound parameter value: the closed set of shapes a tool can receive.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    List(Vec<String>),
}

/// Validated parameters, keyed by declared name.
#[derive(Debug, Clone, Default)]
pub struct ToolParams(HashMap<String, ParamValue>);

impl ToolParams {
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(ParamValue::Text(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn list(&self, name: &str) -> Option<&[String]> {
        match self.0.get(name) {
            Some(ParamValue::List(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: Vec<(&str, ParamValue)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

/// What a tool hands back to the agent loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolReply {
    /// A result string, fed back into the conversation.
    Text(String),
    /// The completion sentinel: the user's request is fully handled and the
    /// loop must stop.
    TaskComplete,
}

/// Seam for delivering a message to the user on whatever platform the turn
/// came from. Adapters implement it; tests capture through it.
#[async_trait]
pub trait Replier: Send + Sync {
    async fn reply(&self, text: &str) -> Result<()>;
}

/// An action the agent can invoke during its turn.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name used in invocation markup (e.g. "saveNote").
    fn name(&self) -> &str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &str;

    /// Declared parameters, validated before dispatch.
    fn params(&self) -> &[ParamSpec];

    /// Execute with validated parameters.
    async fn execute(&self, params: &ToolParams) -> Result<ToolReply>;
}

/// Validate raw string parameters against a tool's declared schema.
///
/// Unknown parameters are carried through as text (the model sometimes adds
/// extras; dropping them silently loses information the tool may tolerate).
/// List-typed parameters are split on commas here and nowhere else. A
/// missing required parameter rejects the whole call.
pub fn bind_params(specs: &[ParamSpec], raw: &[(String, String)]) -> Result<ToolParams, String> {
    let mut bound = HashMap::new();

    for (key, value) in raw {
        let kind = specs
            .iter()
            .find(|s| s.name == key)
            .map(|s| s.kind)
            .unwrap_or(ParamKind::Text);

        let value = match kind {
            ParamKind::Text => ParamValue::Text(value.clone()),
            ParamKind::List => ParamValue::List(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
        };
        bound.insert(key.clone(), value);
    }

    for spec in specs.iter().filter(|s| s.required) {
        if !bound.contains_key(spec.name) {
            return Err(format!("missing required parameter '{}'", spec.name));
        }
    }

    Ok(ToolParams(bound))
}

/// The set of tools available within one turn, bound to one user.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. Later registrations win on name collision.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        tracing::debug!("Registered tool: {}", tool.name());
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Render every tool as a prompt block: description, required
    /// parameters, and an example invocation in the wire syntax.
    pub fn prompt_blocks(&self) -> String {
        let mut out = String::new();
        for tool in &self.tools {
            let required: Vec<&str> = tool
                .params()
                .iter()
                .filter(|p| p.required)
                .map(|p| p.name)
                .collect();

            out.push_str(&format!("\n- {}: {}\n", tool.name(), tool.description()));
            out.push_str(&format!(
                "  Required parameters: {}\n",
                if required.is_empty() {
                    "(none)".to_string()
                } else {
                    required.join(", ")
                }
            ));
            out.push_str("  Call format:\n");
            out.push_str(&format!("  <invoke name=\"{}\">\n", tool.name()));
            for param in tool.params().iter().filter(|p| p.required) {
                out.push_str(&format!(
                    "    <parameter name=\"{}\">value</parameter>\n",
                    param.name
                ));
            }
            out.push_str("  </invoke>\n");
        }
        out
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes back the message parameter"
        }

        fn params(&self) -> &[ParamSpec] {
            const PARAMS: &[ParamSpec] = &[ParamSpec::required("message", ParamKind::Text)];
            PARAMS
        }

        async fn execute(&self, params: &ToolParams) -> Result<ToolReply> {
            Ok(ToolReply::Text(
                params.text("message").unwrap_or("(no message)").to_string(),
            ))
        }
    }

    fn raw(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn bind_accepts_complete_params() {
        let specs = [
            ParamSpec::required("title", ParamKind::Text),
            ParamSpec::required("tags", ParamKind::List),
        ];
        let params =
            bind_params(&specs, &raw(&[("title", "T"), ("tags", "a, b ,c")])).unwrap();

        assert_eq!(params.text("title"), Some("T"));
        assert_eq!(
            params.list("tags"),
            Some(&["a".to_string(), "b".to_string(), "c".to_string()][..])
        );
    }

    #[test]
    fn bind_rejects_missing_required() {
        let specs = [ParamSpec::required("message", ParamKind::Text)];
        let err = bind_params(&specs, &raw(&[("other", "x")])).unwrap_err();
        assert!(err.contains("message"));
    }

    #[test]
    fn bind_splits_lists_only_for_list_kind() {
        let specs = [
            ParamSpec::required("content", ParamKind::Text),
            ParamSpec::required("tags", ParamKind::List),
        ];
        let params = bind_params(
            &specs,
            &raw(&[("content", "a, b"), ("tags", "a, b")]),
        )
        .unwrap();

        // Same raw value, different schema kinds.
        assert_eq!(params.text("content"), Some("a, b"));
        assert_eq!(params.list("tags").unwrap().len(), 2);
    }

    #[test]
    fn bind_tolerates_unknown_params_as_text() {
        let specs = [ParamSpec::required("message", ParamKind::Text)];
        let params =
            bind_params(&specs, &raw(&[("message", "hi"), ("mood", "cheerful")])).unwrap();
        assert_eq!(params.text("mood"), Some("cheerful"));
    }

    #[test]
    fn optional_params_may_be_absent() {
        let specs = [ParamSpec::optional("tag", ParamKind::Text)];
        let params = bind_params(&specs, &[]).unwrap();
        assert_eq!(params.text("tag"), None);
    }

    #[tokio::test]
    async fn registry_lookup_and_dispatch() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());

        let specs = registry.get("echo").unwrap().params().to_vec();
        let params = bind_params(&specs, &raw(&[("message", "hello")])).unwrap();
        let reply = registry
            .get("echo")
            .unwrap()
            .execute(&params)
            .await
            .unwrap();
        assert_eq!(reply, ToolReply::Text("hello".to_string()));
    }

    #[test]
    fn prompt_blocks_render_example_invocations() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let blocks = registry.prompt_blocks();
        assert!(blocks.contains("- echo: Echoes back the message parameter"));
        assert!(blocks.contains("<invoke name=\"echo\">"));
        assert!(blocks.contains("<parameter name=\"message\">value</parameter>"));
    }
}
