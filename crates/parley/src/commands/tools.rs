use anyhow::{Context, Result};
use parley_runtime::ChatRequest;
use serde_json::Value;

use crate::commands::chat::build_registry;
use crate::config::Config;

/// Print the `tools` array the backend would receive, in registration order
pub fn execute(config: &Config) -> Result<()> {
    let registry = build_registry(config)?;
    let request = ChatRequest::initial(None, Vec::new(), registry.schemas());
    let tools = request
        .to_json()
        .get("tools")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));
    let json = serde_json::to_string_pretty(&tools).context("Failed to serialize tool schemas")?;
    println!("{json}");
    Ok(())
}
