/*!
 * Platform Interfaces
 * Read-only views of the host Bluetooth, audio and permission subsystems
 */

pub mod fixture;
#[cfg(feature = "bluez")]
pub mod bluez;

use anyhow::{Context, Result as AnyResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{Backend, PlatformConfig};
use fixture::FixturePlatform;

/// Bluetooth profiles that can carry headset audio, in enumeration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BluetoothProfile {
    Headset,
    A2dp,
    HearingAid,
    LeAudio,
}

impl BluetoothProfile {
    pub const ALL: [BluetoothProfile; 4] = [
        BluetoothProfile::Headset,
        BluetoothProfile::A2dp,
        BluetoothProfile::HearingAid,
        BluetoothProfile::LeAudio,
    ];
}

impl fmt::Display for BluetoothProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BluetoothProfile::Headset => write!(f, "headset"),
            BluetoothProfile::A2dp => write!(f, "a2dp"),
            BluetoothProfile::HearingAid => write!(f, "hearing_aid"),
            BluetoothProfile::LeAudio => write!(f, "le_audio"),
        }
    }
}

/// Kind of output device reported by the audio subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioDeviceType {
    BuiltinSpeaker,
    WiredHeadset,
    BluetoothA2dp,
    BluetoothSco,
    HearingAid,
    BleHeadset,
    Usb,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Access to paired device identities (names)
    BluetoothConnect,
}

/// What the current host can do. Replaces OS-version checks at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformCapabilities {
    pub connect_permission_required: bool,
    pub hearing_aid_profile: bool,
    pub le_audio_profile: bool,
    pub output_device_api: bool,
    pub hearing_aid_route: bool,
    pub ble_headset_route: bool,
}

impl PlatformCapabilities {
    /// Capabilities of an Android host at the given SDK level.
    pub fn for_api_level(level: u32) -> Self {
        Self {
            connect_permission_required: level >= 31,
            hearing_aid_profile: level >= 28,
            le_audio_profile: level >= 33,
            output_device_api: level >= 23,
            hearing_aid_route: level >= 28,
            ble_headset_route: level >= 31,
        }
    }

    /// Every profile and route check available, no runtime permission gate.
    pub fn full() -> Self {
        Self {
            connect_permission_required: false,
            hearing_aid_profile: true,
            le_audio_profile: true,
            output_device_api: true,
            hearing_aid_route: true,
            ble_headset_route: true,
        }
    }

    /// Profiles to enumerate, in order.
    pub fn profiles(&self) -> Vec<BluetoothProfile> {
        BluetoothProfile::ALL
            .into_iter()
            .filter(|profile| match profile {
                BluetoothProfile::Headset | BluetoothProfile::A2dp => true,
                BluetoothProfile::HearingAid => self.hearing_aid_profile,
                BluetoothProfile::LeAudio => self.le_audio_profile,
            })
            .collect()
    }

    pub fn is_bluetooth_route(&self, device_type: AudioDeviceType) -> bool {
        match device_type {
            AudioDeviceType::BluetoothA2dp | AudioDeviceType::BluetoothSco => true,
            AudioDeviceType::HearingAid => self.hearing_aid_route,
            AudioDeviceType::BleHeadset => self.ble_headset_route,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Platform fault: {0}")]
    Fault(String),

    #[cfg(feature = "bluez")]
    #[error("D-Bus error: {0}")]
    Bus(#[from] dbus::Error),
}

pub type Result<T> = std::result::Result<T, PlatformError>;

pub trait BluetoothDevice {
    /// Hardware address; always readable.
    fn address(&self) -> &str;

    /// Display name, if the device exposes one.
    fn name(&self) -> Result<Option<String>>;
}

pub trait BluetoothAdapter {
    fn is_enabled(&self) -> bool;
}

pub trait BluetoothService {
    /// The local adapter, or `None` when the hardware has no Bluetooth.
    fn adapter(&self) -> Option<&dyn BluetoothAdapter>;

    fn connected_devices(
        &self,
        profile: BluetoothProfile,
    ) -> Result<Vec<Box<dyn BluetoothDevice + '_>>>;
}

pub trait AudioService {
    fn output_devices(&self) -> Result<Vec<AudioDeviceType>>;

    fn is_bluetooth_a2dp_on(&self) -> bool;

    fn is_bluetooth_sco_on(&self) -> bool;
}

pub trait PermissionChecker {
    fn is_granted(&self, permission: Permission) -> bool;
}

/// Entry point to the host's subsystems. Services are borrowed for one query.
pub trait HostPlatform: Send + Sync {
    /// One consistent view of the host for a single query. `None` when every
    /// service call already reads the same state.
    fn freeze(&self) -> Option<Box<dyn HostPlatform + '_>> {
        None
    }

    fn capabilities(&self) -> PlatformCapabilities;

    fn bluetooth_service(&self) -> Option<Box<dyn BluetoothService + '_>>;

    fn audio_service(&self) -> Option<Box<dyn AudioService + '_>>;

    fn permissions(&self) -> &dyn PermissionChecker;
}

pub struct AlwaysGranted;

impl PermissionChecker for AlwaysGranted {
    fn is_granted(&self, _permission: Permission) -> bool {
        true
    }
}

/// Host with no reachable Bluetooth or audio service.
#[cfg(any(test, not(feature = "bluez")))]
pub struct UnavailablePlatform;

#[cfg(any(test, not(feature = "bluez")))]
impl HostPlatform for UnavailablePlatform {
    fn capabilities(&self) -> PlatformCapabilities {
        PlatformCapabilities::full()
    }

    fn bluetooth_service(&self) -> Option<Box<dyn BluetoothService + '_>> {
        None
    }

    fn audio_service(&self) -> Option<Box<dyn AudioService + '_>> {
        None
    }

    fn permissions(&self) -> &dyn PermissionChecker {
        &AlwaysGranted
    }
}

/// Build the configured backend.
pub fn build(config: &PlatformConfig) -> AnyResult<Arc<dyn HostPlatform>> {
    match config.backend {
        Backend::Fixture => {
            let path = config
                .fixture_path
                .as_deref()
                .context("fixture backend requires platform.fixture_path")?;
            let platform = FixturePlatform::load(Path::new(path))?;
            tracing::info!(
                "Using fixture platform from {} ({} devices)",
                path,
                platform.state().devices.len()
            );
            Ok(Arc::new(platform))
        }
        Backend::Bluez => bluez_platform(config),
    }
}

#[cfg(feature = "bluez")]
fn bluez_platform(config: &PlatformConfig) -> AnyResult<Arc<dyn HostPlatform>> {
    tracing::info!("Using BlueZ platform over the system bus");
    Ok(Arc::new(bluez::BluezPlatform::new(
        std::time::Duration::from_millis(config.bus_timeout_ms),
    )))
}

#[cfg(not(feature = "bluez"))]
fn bluez_platform(_config: &PlatformConfig) -> AnyResult<Arc<dyn HostPlatform>> {
    tracing::warn!("Built without the bluez feature; Bluetooth will report unavailable");
    Ok(Arc::new(UnavailablePlatform))
}
