use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parley_runtime::{ParameterProperty, Tool, ToolError, ToolSchema};
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::Deserialize;
use tracing::{info, warn};

const OPEN_METEO_URL: &str = "https://api.open-meteo.com";

/// `get_weather`: current temperature at a coordinate, from Open-Meteo
pub struct GetWeatherTool {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    latitude: f64,
    longitude: f64,
    current: CurrentConditions,
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    temperature_2m: f64,
}

impl GetWeatherTool {
    pub fn new() -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: OPEN_METEO_URL.to_string(),
        })
    }

    /// Point at an Open-Meteo compatible server
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    async fn forecast(&self, latitude: &str, longitude: &str) -> Result<String, ToolError> {
        let url = format!("{}/v1/forecast", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("latitude", latitude),
                ("longitude", longitude),
                ("current", "temperature_2m"),
                ("temperature_unit", "fahrenheit"),
            ])
            .send()
            .await
            .map_err(|e| ToolError::new(format!("Cannot connect to Open Meteo: {e}")))?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(status = status.as_u16(), "Open-Meteo request rejected");
            return Err(ToolError::new(format!(
                "Open-meteo response: {}",
                status.as_u16()
            )));
        }

        let forecast: ForecastResponse = response
            .json()
            .await
            .map_err(|e| ToolError::new(format!("Cannot connect to Open Meteo: {e}")))?;

        Ok(format!(
            "Weather at lat: {:?}, lon: {:?} is {:?}ºF",
            forecast.latitude, forecast.longitude, forecast.current.temperature_2m
        ))
    }
}

#[async_trait]
impl Tool for GetWeatherTool {
    async fn execute(&self, argv: Vec<String>) -> Result<String, ToolError> {
        let latitude = argv
            .first()
            .ok_or_else(|| ToolError::missing_argument("latitude"))?;
        let longitude = argv
            .get(1)
            .ok_or_else(|| ToolError::missing_argument("longitude"))?;

        info!(%latitude, %longitude, "Fetching current weather");
        self.forecast(latitude, longitude).await
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("get_weather", "Get current temperature")
            .with_parameter(
                "latitude",
                ParameterProperty::string("latitude of location of interest"),
                true,
            )
            .with_parameter(
                "longitude",
                ParameterProperty::string("longitude of location of interest"),
                true,
            )
    }

    fn argument_order(&self) -> Vec<String> {
        vec!["latitude".to_string(), "longitude".to_string()]
    }
}
