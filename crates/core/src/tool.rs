//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are implemented outside the core (web search, file access,
//! code-hosting queries, ...). The core only registers them, resolves them
//! for agents, and invokes them when the model asks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// The core Tool trait.
///
/// Tools are registered once at startup and referenced (never owned) by agents.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique identifier of this tool (e.g., "web-search").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's input.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Whether the tool bounds its own running time. Such tools are not
    /// wrapped in the per-call tool timeout.
    fn self_limiting(&self) -> bool {
        false
    }

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The outcome of resolving a list of tool ids against the registry.
#[derive(Default)]
pub struct ToolResolution {
    /// Every requested id that is registered.
    pub found: HashMap<String, Arc<dyn Tool>>,
    /// Requested ids with no registration, in request order, without duplicates.
    pub missing: Vec<String>,
}

impl ToolResolution {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// The static mapping from tool identifier to implementation.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool under its name.
    ///
    /// Last write wins. Returns `true` when an existing registration was
    /// overwritten.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> bool {
        let name = tool.name().to_string();
        let replaced = self.tools.insert(name.clone(), tool).is_some();
        if replaced {
            warn!(tool = %name, "Tool re-registered, previous implementation replaced");
        }
        replaced
    }

    /// Resolve a list of tool ids. Never fails; the caller decides whether
    /// missing ids are fatal.
    pub fn resolve<S: AsRef<str>>(&self, ids: &[S]) -> ToolResolution {
        let mut resolution = ToolResolution::default();
        let mut seen_missing = HashSet::new();

        for id in ids {
            let id = id.as_ref();
            match self.tools.get(id) {
                Some(tool) => {
                    resolution.found.insert(id.to_string(), tool.clone());
                }
                None => {
                    if seen_missing.insert(id.to_string()) {
                        resolution.missing.push(id.to_string());
                    }
                }
            }
        }

        resolution
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Get all tool definitions.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
