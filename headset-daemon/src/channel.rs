/*!
 * Method Channel
 * Named channel that maps method calls from the host app to handlers
 */

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::platform::HostPlatform;
use crate::status::HeadsetStatusQuery;

pub const HEADSET_CHANNEL: &str = "inc.buddie.memx/headset";
pub const GET_HEADSET_STATUS: &str = "getHeadsetStatus";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[cfg(test)]
impl MethodCall {
    pub fn new(method: &str) -> Self {
        Self {
            method: method.to_string(),
            arguments: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MethodResponse {
    Success {
        result: Value,
    },
    Error {
        code: String,
        message: String,
        #[serde(default)]
        details: Option<Value>,
    },
    NotImplemented,
}

impl MethodResponse {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        MethodResponse::Error {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }
}

pub trait MethodCallHandler: Send + Sync {
    fn on_method_call(&self, call: &MethodCall) -> MethodResponse;
}

/// Handler for the headset channel.
pub struct HeadsetChannel {
    platform: Arc<dyn HostPlatform>,
}

impl HeadsetChannel {
    pub fn new(platform: Arc<dyn HostPlatform>) -> Self {
        Self { platform }
    }
}

impl MethodCallHandler for HeadsetChannel {
    fn on_method_call(&self, call: &MethodCall) -> MethodResponse {
        match call.method.as_str() {
            GET_HEADSET_STATUS => {
                let status = HeadsetStatusQuery::new(self.platform.as_ref()).query();
                tracing::debug!("Headset status: {} ({})", status.connected, status.reason);
                match serde_json::to_value(&status) {
                    Ok(result) => MethodResponse::Success { result },
                    Err(e) => MethodResponse::error("encode_failed", e.to_string()),
                }
            }
            other => {
                tracing::debug!("Method not implemented: {}", other);
                MethodResponse::NotImplemented
            }
        }
    }
}

/// Channels registered with the bridge, by name.
#[derive(Default, Clone)]
pub struct ChannelRegistry {
    handlers: HashMap<String, Arc<dyn MethodCallHandler>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, channel: impl Into<String>, handler: Arc<dyn MethodCallHandler>) {
        let channel = channel.into();
        tracing::info!("Registered method channel: {}", channel);
        self.handlers.insert(channel, handler);
    }

    pub fn handler(&self, channel: &str) -> Option<Arc<dyn MethodCallHandler>> {
        self.handlers.get(channel).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fixture::{FixtureDevice, FixturePlatform, FixtureState};
    use crate::platform::{AudioDeviceType, BluetoothProfile, UnavailablePlatform};
    use serde_json::json;

    fn buds_channel() -> HeadsetChannel {
        let state = FixtureState {
            output_devices: vec![AudioDeviceType::BluetoothA2dp],
            devices: vec![FixtureDevice::new(
                "00:1B:66:A1:B2:C3",
                Some("MyBuds"),
                &[BluetoothProfile::A2dp],
            )],
            ..Default::default()
        };
        HeadsetChannel::new(Arc::new(FixturePlatform::new(state)))
    }

    #[test]
    fn get_headset_status_returns_status_map() {
        let response = buds_channel().on_method_call(&MethodCall::new(GET_HEADSET_STATUS));
        assert_eq!(
            response,
            MethodResponse::Success {
                result: json!({
                    "connected": true,
                    "name": "MyBuds",
                    "devices": ["MyBuds"],
                    "bluetoothEnabled": true,
                    "routedToBluetooth": true,
                    "reason": "ok",
                }),
            }
        );
    }

    #[test]
    fn arguments_are_ignored() {
        let call = MethodCall {
            method: GET_HEADSET_STATUS.to_string(),
            arguments: Some(json!({"verbose": true})),
        };
        assert!(matches!(
            buds_channel().on_method_call(&call),
            MethodResponse::Success { .. }
        ));
    }

    #[test]
    fn unavailable_platform_still_succeeds() {
        let channel = HeadsetChannel::new(Arc::new(UnavailablePlatform));
        match channel.on_method_call(&MethodCall::new(GET_HEADSET_STATUS)) {
            MethodResponse::Success { result } => {
                assert_eq!(result["reason"], "bluetooth_manager_unavailable");
                assert_eq!(result["connected"], false);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn unknown_method_is_not_implemented() {
        let response = buds_channel().on_method_call(&MethodCall::new("setHeadsetRoute"));
        assert_eq!(response, MethodResponse::NotImplemented);
    }

    #[test]
    fn response_wire_format() {
        let encoded = serde_json::to_value(MethodResponse::NotImplemented).unwrap();
        assert_eq!(encoded, json!({"type": "NotImplemented"}));

        let encoded = serde_json::to_value(MethodResponse::error("unknown_channel", "nope")).unwrap();
        assert_eq!(
            encoded,
            json!({"type": "Error", "code": "unknown_channel", "message": "nope", "details": null})
        );
    }

    #[test]
    fn registry_lookup() {
        let mut registry = ChannelRegistry::new();
        registry.register(HEADSET_CHANNEL, Arc::new(buds_channel()));
        assert!(registry.handler(HEADSET_CHANNEL).is_some());
        assert!(registry.handler("other/channel").is_none());
    }
}
