use anyhow::{Context, Result};
use std::path::Path;

const DEFAULT_CONFIG: &str = r#"# Parley Configuration

[backend]
endpoint = "http://localhost:11434/api/chat"
# model = "llama3.2"
# "event_blocks" (event:/data: blocks) or "lines" (one JSON object per line)
mode = "event_blocks"
timeout_secs = 600

[session]
# Request rounds per message, tool follow-ups included
max_rounds = 4

[tools.location]
enabled = true
# get_location is only offered when both are set
# latitude = 37.7749
# longitude = -122.4194

[tools.weather]
enabled = true
# base_url = "https://api.open-meteo.com"

[tools.timeouts]
# get_weather = 15
"#;

/// Initialize a new config file
pub fn run_init(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("Config already exists at {:?}", path);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .context(format!("Failed to create config directory: {:?}", parent))?;
    }
    std::fs::write(path, DEFAULT_CONFIG)
        .context(format!("Failed to write config: {:?}", path))?;
    println!("Created config at {:?}", path);
    Ok(())
}
