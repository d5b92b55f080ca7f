use std::sync::Arc;

use httpmock::prelude::*;
use parley_adapters::{register_location_tool, register_weather_tool, Coordinates, GetWeatherTool, StaticLocation};
use parley_runtime::{Tool, ToolCallRequest, ToolRegistry};
use serde_json::json;

fn forecast_body() -> serde_json::Value {
    json!({
        "latitude": 37.75,
        "longitude": -122.375,
        "current": {"time": "2026-10-19T12:00", "temperature_2m": 64.5}
    })
}

#[tokio::test]
async fn test_weather_tool_formats_current_temperature() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/v1/forecast")
                .query_param("latitude", "37.7")
                .query_param("longitude", "-122.4")
                .query_param("current", "temperature_2m")
                .query_param("temperature_unit", "fahrenheit");
            then.status(200).json_body(forecast_body());
        })
        .await;

    let tool = GetWeatherTool::new().unwrap().with_base_url(&server.base_url());
    let result = tool
        .execute(vec!["37.7".into(), "-122.4".into()])
        .await
        .unwrap();

    assert_eq!(result, "Weather at lat: 37.75, lon: -122.375 is 64.5ºF");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_weather_tool_non_ok_status() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/forecast");
            then.status(400).body("bad coordinates");
        })
        .await;

    let tool = GetWeatherTool::new().unwrap().with_base_url(&server.base_url());
    let err = tool
        .execute(vec!["999".into(), "999".into()])
        .await
        .unwrap_err();
    assert_eq!(err.message, "Open-meteo response: 400");
}

#[tokio::test]
async fn test_weather_tool_unreachable_server() {
    let tool = GetWeatherTool::new()
        .unwrap()
        .with_base_url("http://127.0.0.1:9");
    let err = tool
        .execute(vec!["1".into(), "2".into()])
        .await
        .unwrap_err();
    assert!(err.message.starts_with("Cannot connect to Open Meteo:"));
}

#[tokio::test]
async fn test_weather_tool_missing_longitude() {
    let tool = GetWeatherTool::new().unwrap();
    let err = tool.execute(vec!["1".into()]).await.unwrap_err();
    assert!(err.message.contains("longitude"));
}

#[tokio::test]
async fn test_registered_tools_invoked_by_name() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/forecast");
            then.status(200).json_body(forecast_body());
        })
        .await;

    let mut registry = ToolRegistry::new();
    register_location_tool(
        &mut registry,
        Arc::new(StaticLocation(Coordinates::new(1.0, 2.0))),
    )
    .unwrap();
    register_weather_tool(&mut registry, Some(&server.base_url())).unwrap();

    assert_eq!(registry.tool_names(), vec!["get_location", "get_weather"]);
    let weather = registry.lookup("get_weather").unwrap();
    assert_eq!(weather.argument_order(), ["latitude", "longitude"]);

    let location = registry
        .invoke(&ToolCallRequest::new("get_location"))
        .await
        .unwrap();
    assert_eq!(location, "latitude: 1.0, longitude: 2.0");

    let call = ToolCallRequest::new("get_weather")
        .with_argument("longitude", "-122.4")
        .with_argument("latitude", "37.7");
    let weather = registry.invoke(&call).await.unwrap();
    assert!(weather.ends_with("64.5ºF"));

    // second registration of the same tool is rejected
    assert!(register_weather_tool(&mut registry, None).is_err());
}
