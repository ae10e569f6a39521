/*!
 * Fixture Platform
 * Declarative host snapshot loaded from TOML, for tests and hardware-free runs
 */

use anyhow::{Context, Result as AnyResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::{
    AudioDeviceType, AudioService, BluetoothAdapter, BluetoothDevice, BluetoothProfile,
    BluetoothService, HostPlatform, Permission, PermissionChecker, PlatformCapabilities,
    PlatformError, Result,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureState {
    pub api_level: u32,
    /// Explicit flags; takes precedence over `api_level`
    pub capabilities: Option<PlatformCapabilities>,
    pub manager_available: bool,
    pub adapter_present: bool,
    pub adapter_enabled: bool,
    pub connect_permission_granted: bool,
    pub audio_available: bool,
    pub a2dp_on: bool,
    pub sco_on: bool,
    pub output_devices: Vec<AudioDeviceType>,
    pub output_devices_fail: bool,
    pub failing_profiles: Vec<BluetoothProfile>,
    pub devices: Vec<FixtureDevice>,
}

impl Default for FixtureState {
    fn default() -> Self {
        Self {
            api_level: 34,
            capabilities: None,
            manager_available: true,
            adapter_present: true,
            adapter_enabled: true,
            connect_permission_granted: true,
            audio_available: true,
            a2dp_on: false,
            sco_on: false,
            output_devices: Vec::new(),
            output_devices_fail: false,
            failing_profiles: Vec::new(),
            devices: Vec::new(),
        }
    }
}

impl FixtureState {
    pub fn load(path: &Path) -> AnyResult<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing fixture {}", path.display()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureDevice {
    pub address: String,
    pub name: Option<String>,
    /// Reading the name raises a fault
    pub name_fails: bool,
    pub profiles: Vec<BluetoothProfile>,
}

#[cfg(test)]
impl FixtureDevice {
    pub fn new(address: &str, name: Option<&str>, profiles: &[BluetoothProfile]) -> Self {
        Self {
            address: address.to_string(),
            name: name.map(str::to_string),
            name_fails: false,
            profiles: profiles.to_vec(),
        }
    }
}

impl BluetoothDevice for FixtureDevice {
    fn address(&self) -> &str {
        &self.address
    }

    fn name(&self) -> Result<Option<String>> {
        if self.name_fails {
            return Err(PlatformError::PermissionDenied(format!(
                "name of {} is not readable",
                self.address
            )));
        }
        Ok(self.name.clone())
    }
}

pub struct FixturePlatform {
    state: FixtureState,
    capabilities: PlatformCapabilities,
}

impl FixturePlatform {
    pub fn new(state: FixtureState) -> Self {
        let capabilities = state
            .capabilities
            .unwrap_or_else(|| PlatformCapabilities::for_api_level(state.api_level));
        Self {
            state,
            capabilities,
        }
    }

    pub fn load(path: &Path) -> AnyResult<Self> {
        Ok(Self::new(FixtureState::load(path)?))
    }

    pub fn state(&self) -> &FixtureState {
        &self.state
    }
}

impl HostPlatform for FixturePlatform {
    fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }

    fn bluetooth_service(&self) -> Option<Box<dyn BluetoothService + '_>> {
        if !self.state.manager_available {
            return None;
        }
        let adapter = self.state.adapter_present.then_some(FixtureAdapter {
            enabled: self.state.adapter_enabled,
        });
        Some(Box::new(FixtureBluetooth {
            state: &self.state,
            adapter,
        }))
    }

    fn audio_service(&self) -> Option<Box<dyn AudioService + '_>> {
        if !self.state.audio_available {
            return None;
        }
        Some(Box::new(FixtureAudio { state: &self.state }))
    }

    fn permissions(&self) -> &dyn PermissionChecker {
        self
    }
}

impl PermissionChecker for FixturePlatform {
    fn is_granted(&self, permission: Permission) -> bool {
        match permission {
            Permission::BluetoothConnect => self.state.connect_permission_granted,
        }
    }
}

struct FixtureAdapter {
    enabled: bool,
}

impl BluetoothAdapter for FixtureAdapter {
    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

struct FixtureBluetooth<'a> {
    state: &'a FixtureState,
    adapter: Option<FixtureAdapter>,
}

impl BluetoothService for FixtureBluetooth<'_> {
    fn adapter(&self) -> Option<&dyn BluetoothAdapter> {
        self.adapter
            .as_ref()
            .map(|adapter| adapter as &dyn BluetoothAdapter)
    }

    fn connected_devices(
        &self,
        profile: BluetoothProfile,
    ) -> Result<Vec<Box<dyn BluetoothDevice + '_>>> {
        if self.state.failing_profiles.contains(&profile) {
            return Err(PlatformError::Fault(format!(
                "{} profile proxy not connected",
                profile
            )));
        }
        Ok(self
            .state
            .devices
            .iter()
            .filter(|device| device.profiles.contains(&profile))
            .map(|device| Box::new(device.clone()) as Box<dyn BluetoothDevice>)
            .collect())
    }
}

struct FixtureAudio<'a> {
    state: &'a FixtureState,
}

impl AudioService for FixtureAudio<'_> {
    fn output_devices(&self) -> Result<Vec<AudioDeviceType>> {
        if self.state.output_devices_fail {
            return Err(PlatformError::Fault("output device query failed".to_string()));
        }
        Ok(self.state.output_devices.clone())
    }

    fn is_bluetooth_a2dp_on(&self) -> bool {
        self.state.a2dp_on
    }

    fn is_bluetooth_sco_on(&self) -> bool {
        self.state.sco_on
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = include_str!("../../fixtures/a2dp-buds.toml");

    #[test]
    fn parses_sample_fixture() {
        let state: FixtureState = toml::from_str(SAMPLE).unwrap();
        assert_eq!(state.api_level, 34);
        assert_eq!(state.devices.len(), 1);
        assert_eq!(state.devices[0].name.as_deref(), Some("MyBuds"));
        assert_eq!(state.devices[0].profiles, vec![BluetoothProfile::A2dp]);
        assert_eq!(state.output_devices, vec![AudioDeviceType::BluetoothA2dp]);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let state: FixtureState = toml::from_str("adapter_enabled = false").unwrap();
        assert!(!state.adapter_enabled);
        assert!(state.manager_available);
        assert!(state.devices.is_empty());
        assert_eq!(state.api_level, 34);
    }

    #[test]
    fn explicit_capabilities_override_api_level() {
        let state = FixtureState {
            api_level: 34,
            capabilities: Some(PlatformCapabilities::for_api_level(21)),
            ..Default::default()
        };
        let platform = FixturePlatform::new(state);
        assert!(!platform.capabilities().output_device_api);
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FixturePlatform::load(&dir.path().join("absent.toml")).err().unwrap();
        assert!(err.to_string().contains("reading fixture"));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let platform = FixturePlatform::load(file.path()).unwrap();
        assert_eq!(platform.state().devices[0].address, "00:1B:66:A1:B2:C3");
    }

    #[test]
    fn profile_listing_honors_faults() {
        let state = FixtureState {
            failing_profiles: vec![BluetoothProfile::Headset],
            devices: vec![FixtureDevice::new(
                "00:00:00:00:00:01",
                Some("Buds"),
                &[BluetoothProfile::Headset, BluetoothProfile::A2dp],
            )],
            ..Default::default()
        };
        let platform = FixturePlatform::new(state);
        let bluetooth = platform.bluetooth_service().unwrap();
        assert!(bluetooth.connected_devices(BluetoothProfile::Headset).is_err());
        let a2dp = bluetooth.connected_devices(BluetoothProfile::A2dp).unwrap();
        assert_eq!(a2dp.len(), 1);
        assert_eq!(a2dp[0].address(), "00:00:00:00:00:01");
    }

    #[test]
    fn missing_adapter_and_services() {
        let platform = FixturePlatform::new(FixtureState {
            adapter_present: false,
            audio_available: false,
            ..Default::default()
        });
        assert!(platform.bluetooth_service().unwrap().adapter().is_none());
        assert!(platform.audio_service().is_none());

        let platform = FixturePlatform::new(FixtureState {
            manager_available: false,
            ..Default::default()
        });
        assert!(platform.bluetooth_service().is_none());
    }
}
