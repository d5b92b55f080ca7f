use anyhow::{Context, Result};
use parley_runtime::{HttpTransportConfig, SessionConfig, WireMode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub session: SessionSection,

    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BackendConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Empty = let the backend choose
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub mode: WireMode,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SessionSection {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub location: LocationConfig,

    #[serde(default)]
    pub weather: WeatherConfig,

    /// Per-tool execution timeout in seconds
    #[serde(default)]
    pub timeouts: HashMap<String, u64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LocationConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WeatherConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Open-Meteo compatible server; the public API when unset
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_endpoint() -> String {
    "http://localhost:11434/api/chat".to_string()
}

fn default_timeout() -> u64 {
    600
}

fn default_max_rounds() -> usize {
    4
}

fn default_enabled() -> bool {
    true
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: String::new(),
            mode: WireMode::default(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
        }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            latitude: None,
            longitude: None,
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            base_url: None,
        }
    }
}

impl Config {
    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::default()
            .with_mode(self.backend.mode)
            .with_max_rounds(self.session.max_rounds);
        if !self.backend.model.is_empty() {
            config = config.with_model(&self.backend.model);
        }
        config
    }

    pub fn transport_config(&self) -> HttpTransportConfig {
        HttpTransportConfig::default()
            .with_endpoint(&self.backend.endpoint)
            .with_mode(self.backend.mode)
            .with_timeout(Duration::from_secs(self.backend.timeout_secs))
    }
}

/// Load config from file or use defaults
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        let content =
            fs::read_to_string(path).context(format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content).context("Failed to parse TOML config")?;

        Ok(config)
    } else {
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.backend.endpoint, "http://localhost:11434/api/chat");
        assert_eq!(config.backend.timeout_secs, 600);
        assert_eq!(config.session.max_rounds, 4);
        assert!(config.tools.weather.enabled);
        assert!(config.session_config().model.is_none());
    }

    #[test]
    fn test_full_config() {
        let config: Config = toml::from_str(
            r#"
            [backend]
            endpoint = "http://gpu-box:11434/api/chat"
            model = "llama3.2"
            mode = "lines"
            timeout_secs = 30

            [session]
            max_rounds = 2

            [tools.location]
            latitude = 37.7
            longitude = -122.4

            [tools.weather]
            enabled = false

            [tools.timeouts]
            get_weather = 15
            "#,
        )
        .unwrap();

        let session = config.session_config();
        assert_eq!(session.model.as_deref(), Some("llama3.2"));
        assert_eq!(session.mode, WireMode::Lines);
        assert_eq!(session.max_rounds, 2);

        let transport = config.transport_config();
        assert_eq!(transport.timeout, Duration::from_secs(30));
        assert_eq!(transport.mode.accept_header(), "application/x-ndjson");

        assert_eq!(config.tools.location.latitude, Some(37.7));
        assert!(!config.tools.weather.enabled);
        assert_eq!(config.tools.timeouts.get("get_weather"), Some(&15));
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = load_config(Some(Path::new("/nonexistent/parley.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
