pub mod location_tool;
pub mod weather_tool;

pub use location_tool::{
    Coordinates, GetLocationTool, LocationBridge, LocationResponder, LocationSource,
    StaticLocation,
};
pub use weather_tool::GetWeatherTool;

use std::sync::Arc;

use anyhow::Result;
use parley_runtime::ToolRegistry;

/// Register `get_location` backed by `source`.
pub fn register_location_tool(
    registry: &mut ToolRegistry,
    source: Arc<dyn LocationSource>,
) -> Result<()> {
    registry.register_tool(Arc::new(GetLocationTool::new(source)))?;
    Ok(())
}

/// Register `get_weather`, optionally against a non-default Open-Meteo server.
pub fn register_weather_tool(registry: &mut ToolRegistry, base_url: Option<&str>) -> Result<()> {
    let mut tool = GetWeatherTool::new()?;
    if let Some(url) = base_url {
        tool = tool.with_base_url(url);
    }
    registry.register_tool(Arc::new(tool))?;
    Ok(())
}
