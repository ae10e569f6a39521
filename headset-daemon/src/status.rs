/*!
 * Headset Status Query
 * Is audio going to a Bluetooth headset, and which one
 */

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

use crate::platform::{
    self, BluetoothDevice, BluetoothService, HostPlatform, Permission, PlatformCapabilities,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusReason {
    Ok,
    BluetoothManagerUnavailable,
    BluetoothNotSupported,
    BluetoothDisabled,
    BluetoothConnectPermissionMissing,
}

impl fmt::Display for StatusReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusReason::Ok => write!(f, "ok"),
            StatusReason::BluetoothManagerUnavailable => write!(f, "bluetooth_manager_unavailable"),
            StatusReason::BluetoothNotSupported => write!(f, "bluetooth_not_supported"),
            StatusReason::BluetoothDisabled => write!(f, "bluetooth_disabled"),
            StatusReason::BluetoothConnectPermissionMissing => {
                write!(f, "bluetooth_connect_permission_missing")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResult {
    pub connected: bool,
    pub name: Option<String>,
    pub devices: Vec<String>,
    pub bluetooth_enabled: bool,
    pub routed_to_bluetooth: bool,
    pub reason: StatusReason,
}

impl StatusResult {
    /// Negative answer for a short-circuited query.
    fn inactive(reason: StatusReason) -> Self {
        Self {
            connected: false,
            name: None,
            devices: Vec::new(),
            bluetooth_enabled: false,
            routed_to_bluetooth: false,
            reason,
        }
    }
}

/// One-shot status query over a borrowed host platform.
pub struct HeadsetStatusQuery<'a> {
    platform: &'a dyn HostPlatform,
    capabilities: PlatformCapabilities,
}

impl<'a> HeadsetStatusQuery<'a> {
    pub fn new(platform: &'a dyn HostPlatform) -> Self {
        Self {
            platform,
            capabilities: platform.capabilities(),
        }
    }

    /// Never fails; every problem is folded into `reason` or a fallback value.
    pub fn query(&self) -> StatusResult {
        match self.platform.freeze() {
            Some(frozen) => HeadsetStatusQuery::new(frozen.as_ref()).resolve(),
            None => self.resolve(),
        }
    }

    fn resolve(&self) -> StatusResult {
        let Some(bluetooth) = self.platform.bluetooth_service() else {
            debug!("Bluetooth service unavailable");
            return StatusResult::inactive(StatusReason::BluetoothManagerUnavailable);
        };

        let Some(adapter) = bluetooth.adapter() else {
            debug!("No Bluetooth adapter present");
            return StatusResult::inactive(StatusReason::BluetoothNotSupported);
        };

        if !adapter.is_enabled() {
            debug!("Bluetooth adapter is off");
            return StatusResult::inactive(StatusReason::BluetoothDisabled);
        }

        // Without the permission only routing is observable.
        if !self.has_connect_permission() {
            let routed = self.is_audio_routed_to_bluetooth();
            debug!(routed, "Bluetooth connect permission missing");
            return StatusResult {
                connected: routed,
                name: None,
                devices: Vec::new(),
                bluetooth_enabled: true,
                routed_to_bluetooth: routed,
                reason: StatusReason::BluetoothConnectPermissionMissing,
            };
        }

        let profile_devices = self.connected_profile_devices(bluetooth.as_ref());
        let routed = self.is_audio_routed_to_bluetooth();

        let mut devices: Vec<String> = Vec::with_capacity(profile_devices.len());
        for device in &profile_devices {
            let display = self.display_name(device.as_ref());
            if !devices.contains(&display) {
                devices.push(display);
            }
        }

        let result = StatusResult {
            connected: !profile_devices.is_empty() || routed,
            name: devices.first().cloned(),
            devices,
            bluetooth_enabled: true,
            routed_to_bluetooth: routed,
            reason: StatusReason::Ok,
        };
        debug!(
            connected = result.connected,
            routed = result.routed_to_bluetooth,
            devices = result.devices.len(),
            "Headset status resolved"
        );
        result
    }

    fn has_connect_permission(&self) -> bool {
        !self.capabilities.connect_permission_required
            || self
                .platform
                .permissions()
                .is_granted(Permission::BluetoothConnect)
    }

    /// Connected devices across audio profiles, unique by address in first-seen order.
    fn connected_profile_devices<'b>(
        &self,
        bluetooth: &'b dyn BluetoothService,
    ) -> Vec<Box<dyn BluetoothDevice + 'b>> {
        let mut seen = HashSet::new();
        let mut devices = Vec::new();

        for profile in self.capabilities.profiles() {
            let lookup = format!("{} connected devices", profile);
            for device in best_effort(&lookup, bluetooth.connected_devices(profile)) {
                if seen.insert(device.address().to_string()) {
                    devices.push(device);
                }
            }
        }

        devices
    }

    fn is_audio_routed_to_bluetooth(&self) -> bool {
        let Some(audio) = self.platform.audio_service() else {
            return false;
        };

        if self.capabilities.output_device_api {
            return best_effort("audio output devices", audio.output_devices())
                .into_iter()
                .any(|device_type| self.capabilities.is_bluetooth_route(device_type));
        }

        audio.is_bluetooth_a2dp_on() || audio.is_bluetooth_sco_on()
    }

    fn display_name(&self, device: &dyn BluetoothDevice) -> String {
        if !self.has_connect_permission() {
            return device.address().to_string();
        }
        match best_effort("device name", device.name()) {
            Some(name) if !name.trim().is_empty() => name,
            _ => device.address().to_string(),
        }
    }
}

/// Collapse a failed platform lookup to its empty value.
fn best_effort<T: Default>(lookup: &str, result: platform::Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            debug!(lookup, error = %e, "Platform lookup failed, using fallback");
            T::default()
        }
    }
}
