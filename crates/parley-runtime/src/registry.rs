use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{InvokeError, RegistryError, ToolError};
use crate::protocol::{ToolCallRequest, ToolSchema};
use crate::tool::Tool;

/// A registered tool: schema, positional argument order and executor
#[derive(Clone)]
pub struct ToolDefinition {
    schema: ToolSchema,
    argument_order: Vec<String>,
    tool: Arc<dyn Tool>,
}

impl ToolDefinition {
    pub fn new(tool: Arc<dyn Tool>) -> Self {
        Self {
            schema: tool.schema(),
            argument_order: tool.argument_order(),
            tool,
        }
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    pub fn argument_order(&self) -> &[String] {
        &self.argument_order
    }

    pub async fn execute(&self, argv: Vec<String>) -> Result<String, ToolError> {
        self.tool.execute(argv).await
    }
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.schema.name)
            .field("argument_order", &self.argument_order)
            .finish()
    }
}

/// Name-keyed tool table. Built once, then shared read-only behind an `Arc`.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
    default_timeout: Option<Duration>,
    tool_timeouts: HashMap<String, Duration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a timeout to every tool without its own
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Register a tool; a second tool with the same name is rejected
    pub fn register(&mut self, def: ToolDefinition) -> Result<(), RegistryError> {
        if self.index.contains_key(def.name()) {
            warn!(tool = def.name(), "Duplicate tool registration rejected");
            return Err(RegistryError::DuplicateToolName(def.name().to_string()));
        }
        info!(tool = def.name(), "Registered tool");
        self.index.insert(def.name().to_string(), self.tools.len());
        self.tools.push(def);
        Ok(())
    }

    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        self.register(ToolDefinition::new(tool))
    }

    pub fn lookup(&self, name: &str) -> Result<&ToolDefinition, RegistryError> {
        self.index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Schemas in registration order
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema.clone()).collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Configure timeout for specific tool
    pub fn configure_timeout(&mut self, tool_name: &str, timeout: Duration) {
        self.tool_timeouts.insert(tool_name.to_string(), timeout);
    }

    /// Get timeout for tool (custom or default)
    pub fn timeout_for(&self, tool_name: &str) -> Option<Duration> {
        self.tool_timeouts
            .get(tool_name)
            .copied()
            .or(self.default_timeout)
    }

    /// Resolve a backend tool call, extract positional arguments and run it
    pub async fn invoke(&self, call: &ToolCallRequest) -> Result<String, InvokeError> {
        let def = self
            .lookup(&call.name)
            .map_err(|_| InvokeError::UnknownTool(call.name.clone()))?;

        let argv = call.positional(def.argument_order());
        info!(tool = %call.name, argc = argv.len(), "Executing tool call");

        let result = match self.timeout_for(&call.name) {
            Some(timeout) => match tokio::time::timeout(timeout, def.execute(argv)).await {
                Ok(result) => result,
                Err(_) => Err(ToolError::timed_out(timeout)),
            },
            None => def.execute(argv).await,
        };

        result.map_err(|source| {
            warn!(tool = %call.name, error = %source, "Tool execution failed");
            InvokeError::Execution {
                tool: call.name.clone(),
                source,
            }
        })
    }
}
