use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parley_runtime::{Tool, ToolError, ToolSchema};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Where `get_location` gets the device position from
#[async_trait]
pub trait LocationSource: Send + Sync {
    async fn current(&self) -> Result<Coordinates>;
}

/// Fixed coordinates, e.g. from config
pub struct StaticLocation(pub Coordinates);

#[async_trait]
impl LocationSource for StaticLocation {
    async fn current(&self) -> Result<Coordinates> {
        Ok(self.0)
    }
}

enum BridgeState {
    Pending(oneshot::Receiver<Coordinates>),
    Resolved(Coordinates),
    Abandoned,
}

/// Location supplied later by a UI thread through its `LocationResponder`.
///
/// The first `current` call waits for the responder; the answer is cached for
/// every later call.
pub struct LocationBridge {
    state: Mutex<BridgeState>,
}

/// Sending half of a `LocationBridge`; consumed by the single `resolve`
pub struct LocationResponder {
    tx: oneshot::Sender<Coordinates>,
}

impl LocationBridge {
    pub fn new() -> (Self, LocationResponder) {
        let (tx, rx) = oneshot::channel();
        let bridge = Self {
            state: Mutex::new(BridgeState::Pending(rx)),
        };
        (bridge, LocationResponder { tx })
    }
}

impl LocationResponder {
    pub fn resolve(self, coordinates: Coordinates) -> Result<()> {
        self.tx
            .send(coordinates)
            .map_err(|_| anyhow!("location bridge was dropped before resolve"))
    }
}

#[async_trait]
impl LocationSource for LocationBridge {
    async fn current(&self) -> Result<Coordinates> {
        let mut state = self.state.lock().await;
        match &mut *state {
            BridgeState::Resolved(coordinates) => Ok(*coordinates),
            BridgeState::Abandoned => Err(anyhow!("location was never provided")),
            BridgeState::Pending(rx) => {
                debug!("Waiting for location from responder");
                match rx.await {
                    Ok(coordinates) => {
                        *state = BridgeState::Resolved(coordinates);
                        Ok(coordinates)
                    }
                    Err(_) => {
                        *state = BridgeState::Abandoned;
                        Err(anyhow!("location was never provided"))
                    }
                }
            }
        }
    }
}

/// `get_location`: reports the device coordinates, takes no arguments
pub struct GetLocationTool {
    source: Arc<dyn LocationSource>,
}

impl GetLocationTool {
    pub fn new(source: Arc<dyn LocationSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Tool for GetLocationTool {
    async fn execute(&self, _argv: Vec<String>) -> Result<String, ToolError> {
        let Coordinates {
            latitude,
            longitude,
        } = self.source.current().await?;
        info!(latitude, longitude, "Resolved location");
        Ok(format!("latitude: {latitude:?}, longitude: {longitude:?}"))
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("get_location", "Get the user's current location")
    }

    fn argument_order(&self) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_location_format() {
        let tool = GetLocationTool::new(Arc::new(StaticLocation(Coordinates::new(1.0, 2.0))));
        assert_eq!(
            tool.execute(vec![]).await.unwrap(),
            "latitude: 1.0, longitude: 2.0"
        );
        assert!(tool.schema().parameters.is_none());
    }

    #[tokio::test]
    async fn test_bridge_resolves_once_and_caches() {
        let (bridge, responder) = LocationBridge::new();
        let bridge = Arc::new(bridge);

        let waiter = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.current().await })
        };
        responder.resolve(Coordinates::new(37.7, -122.4)).unwrap();

        assert_eq!(waiter.await.unwrap().unwrap(), Coordinates::new(37.7, -122.4));
        // second call served from cache
        assert_eq!(bridge.current().await.unwrap(), Coordinates::new(37.7, -122.4));
    }

    #[tokio::test]
    async fn test_dropped_responder_is_tool_error() {
        let (bridge, responder) = LocationBridge::new();
        drop(responder);
        let tool = GetLocationTool::new(Arc::new(bridge));

        let err = tool.execute(vec![]).await.unwrap_err();
        assert!(err.message.contains("never provided"));
        // stays failed rather than hanging
        assert!(tool.execute(vec![]).await.is_err());
    }
}
