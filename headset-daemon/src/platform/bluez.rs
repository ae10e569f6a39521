/*!
 * BlueZ Platform
 * Adapter, connected audio devices and active transports via the BlueZ D-Bus API
 */

use dbus::arg::{prop_cast, PropMap, RefArg};
use dbus::blocking::stdintf::org_freedesktop_dbus::ObjectManager;
use dbus::blocking::Connection;
use std::collections::HashMap;
use std::time::Duration;

use super::{
    AlwaysGranted, AudioDeviceType, AudioService, BluetoothAdapter, BluetoothDevice,
    BluetoothProfile, BluetoothService, HostPlatform, PermissionChecker, PlatformCapabilities,
    Result,
};

const BLUEZ_SERVICE: &str = "org.bluez";
const ADAPTER_INTERFACE: &str = "org.bluez.Adapter1";
const DEVICE_INTERFACE: &str = "org.bluez.Device1";
const TRANSPORT_INTERFACE: &str = "org.bluez.MediaTransport1";

// Service class UUIDs, as BlueZ reports them
const HSP_HS_UUID: &str = "00001108-0000-1000-8000-00805f9b34fb";
const HSP_AG_UUID: &str = "00001112-0000-1000-8000-00805f9b34fb";
const HFP_HF_UUID: &str = "0000111e-0000-1000-8000-00805f9b34fb";
const HFP_AG_UUID: &str = "0000111f-0000-1000-8000-00805f9b34fb";
const A2DP_SOURCE_UUID: &str = "0000110a-0000-1000-8000-00805f9b34fb";
const A2DP_SINK_UUID: &str = "0000110b-0000-1000-8000-00805f9b34fb";
const A2DP_UUID: &str = "0000110d-0000-1000-8000-00805f9b34fb";
const ASHA_UUID: &str = "0000fdf0-0000-1000-8000-00805f9b34fb";
const PACS_UUID: &str = "00001850-0000-1000-8000-00805f9b34fb";
const ASCS_UUID: &str = "0000184e-0000-1000-8000-00805f9b34fb";
const PAC_SINK_UUID: &str = "00002bc9-0000-1000-8000-00805f9b34fb";
const PAC_SOURCE_UUID: &str = "00002bcb-0000-1000-8000-00805f9b34fb";

type ManagedObjects = HashMap<dbus::Path<'static>, HashMap<String, PropMap>>;

fn profile_uuids(profile: BluetoothProfile) -> &'static [&'static str] {
    match profile {
        BluetoothProfile::Headset => &[HSP_HS_UUID, HSP_AG_UUID, HFP_HF_UUID, HFP_AG_UUID],
        BluetoothProfile::A2dp => &[A2DP_SOURCE_UUID, A2DP_SINK_UUID, A2DP_UUID],
        BluetoothProfile::HearingAid => &[ASHA_UUID],
        BluetoothProfile::LeAudio => &[PACS_UUID, ASCS_UUID],
    }
}

fn supports_profile(uuids: &[String], profile: BluetoothProfile) -> bool {
    let wanted = profile_uuids(profile);
    uuids.iter().any(|uuid| wanted.contains(&uuid.as_str()))
}

/// Output type of a media transport, by its UUID. BlueZ labels a transport with
/// the local endpoint's role, so a host streaming to headphones has a source.
fn transport_output_type(uuid: &str) -> Option<AudioDeviceType> {
    match uuid {
        A2DP_SINK_UUID | A2DP_SOURCE_UUID => Some(AudioDeviceType::BluetoothA2dp),
        HSP_HS_UUID | HSP_AG_UUID | HFP_HF_UUID | HFP_AG_UUID => Some(AudioDeviceType::BluetoothSco),
        ASHA_UUID => Some(AudioDeviceType::HearingAid),
        PAC_SINK_UUID | PAC_SOURCE_UUID => Some(AudioDeviceType::BleHeadset),
        _ => None,
    }
}

fn prop_string(props: &PropMap, key: &str) -> Option<String> {
    prop_cast::<String>(props, key).cloned()
}

fn prop_bool(props: &PropMap, key: &str) -> bool {
    prop_cast::<bool>(props, key).copied().unwrap_or(false)
}

fn prop_strings(props: &PropMap, key: &str) -> Vec<String> {
    props
        .get(key)
        .and_then(|value| value.0.as_iter())
        .map(|items| {
            items
                .filter_map(|item| item.as_str().map(str::to_lowercase))
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
struct AdapterEntry {
    path: String,
    powered: bool,
}

#[derive(Debug, Clone)]
struct BluezDevice {
    path: String,
    address: String,
    name: Option<String>,
    connected: bool,
    uuids: Vec<String>,
}

#[derive(Debug, Clone)]
struct TransportEntry {
    uuid: String,
    active: bool,
}

/// Point-in-time copy of the BlueZ object tree.
struct BluezSnapshot {
    adapters: Vec<AdapterEntry>,
    devices: Vec<BluezDevice>,
    transports: Vec<TransportEntry>,
}

impl BluezSnapshot {
    fn fetch(timeout: Duration) -> Result<Self> {
        let conn = Connection::new_system()?;
        let proxy = conn.with_proxy(BLUEZ_SERVICE, "/", timeout);
        let objects: ManagedObjects = proxy.get_managed_objects()?;
        Ok(Self::from_objects(&objects))
    }

    fn from_objects(objects: &ManagedObjects) -> Self {
        let mut snapshot = Self {
            adapters: Vec::new(),
            devices: Vec::new(),
            transports: Vec::new(),
        };

        for (path, interfaces) in objects {
            let path = path.to_string();
            if let Some(props) = interfaces.get(ADAPTER_INTERFACE) {
                snapshot.adapters.push(AdapterEntry {
                    path: path.clone(),
                    powered: prop_bool(props, "Powered"),
                });
            }
            if let Some(props) = interfaces.get(DEVICE_INTERFACE) {
                let Some(address) = prop_string(props, "Address") else {
                    continue;
                };
                snapshot.devices.push(BluezDevice {
                    path: path.clone(),
                    address,
                    name: prop_string(props, "Name").or_else(|| prop_string(props, "Alias")),
                    connected: prop_bool(props, "Connected"),
                    uuids: prop_strings(props, "UUIDs"),
                });
            }
            if let Some(props) = interfaces.get(TRANSPORT_INTERFACE) {
                snapshot.transports.push(TransportEntry {
                    uuid: prop_string(props, "UUID").unwrap_or_default().to_lowercase(),
                    active: prop_string(props, "State").as_deref() == Some("active"),
                });
            }
        }

        // Stable order: hci0 before hci1, devices by object path
        snapshot.adapters.sort_by(|a, b| a.path.cmp(&b.path));
        snapshot.devices.sort_by(|a, b| a.path.cmp(&b.path));
        snapshot
    }
}

impl BluetoothDevice for BluezDevice {
    fn address(&self) -> &str {
        &self.address
    }

    fn name(&self) -> Result<Option<String>> {
        Ok(self.name.clone())
    }
}

struct BluezAdapter {
    path: String,
    powered: bool,
}

impl BluetoothAdapter for BluezAdapter {
    fn is_enabled(&self) -> bool {
        self.powered
    }
}

struct BluezBluetooth {
    devices: Vec<BluezDevice>,
    adapter: Option<BluezAdapter>,
}

impl BluezBluetooth {
    fn from_snapshot(snapshot: &BluezSnapshot) -> Self {
        Self {
            devices: snapshot.devices.clone(),
            adapter: snapshot.adapters.first().map(|entry| BluezAdapter {
                path: entry.path.clone(),
                powered: entry.powered,
            }),
        }
    }
}

impl BluetoothService for BluezBluetooth {
    fn adapter(&self) -> Option<&dyn BluetoothAdapter> {
        self.adapter
            .as_ref()
            .map(|adapter| adapter as &dyn BluetoothAdapter)
    }

    fn connected_devices(
        &self,
        profile: BluetoothProfile,
    ) -> Result<Vec<Box<dyn BluetoothDevice + '_>>> {
        let Some(adapter) = &self.adapter else {
            return Ok(Vec::new());
        };
        let prefix = format!("{}/", adapter.path);
        Ok(self
            .devices
            .iter()
            .filter(|device| {
                device.connected
                    && device.path.starts_with(&prefix)
                    && supports_profile(&device.uuids, profile)
            })
            .map(|device| Box::new(device.clone()) as Box<dyn BluetoothDevice>)
            .collect())
    }
}

struct BluezAudio {
    transports: Vec<TransportEntry>,
}

impl BluezAudio {
    fn from_snapshot(snapshot: &BluezSnapshot) -> Self {
        Self {
            transports: snapshot.transports.clone(),
        }
    }

    fn active_outputs(&self) -> impl Iterator<Item = AudioDeviceType> + '_ {
        self.transports
            .iter()
            .filter(|transport| transport.active)
            .filter_map(|transport| transport_output_type(&transport.uuid))
    }
}

impl AudioService for BluezAudio {
    fn output_devices(&self) -> Result<Vec<AudioDeviceType>> {
        Ok(self.active_outputs().collect())
    }

    fn is_bluetooth_a2dp_on(&self) -> bool {
        self.active_outputs()
            .any(|output| output == AudioDeviceType::BluetoothA2dp)
    }

    fn is_bluetooth_sco_on(&self) -> bool {
        self.active_outputs()
            .any(|output| output == AudioDeviceType::BluetoothSco)
    }
}

/// BlueZ state fetched once; `None` when the bus or org.bluez is unreachable.
struct FrozenBluez {
    snapshot: Option<BluezSnapshot>,
}

impl HostPlatform for FrozenBluez {
    fn capabilities(&self) -> PlatformCapabilities {
        PlatformCapabilities::full()
    }

    fn bluetooth_service(&self) -> Option<Box<dyn BluetoothService + '_>> {
        let snapshot = self.snapshot.as_ref()?;
        Some(Box::new(BluezBluetooth::from_snapshot(snapshot)))
    }

    fn audio_service(&self) -> Option<Box<dyn AudioService + '_>> {
        let snapshot = self.snapshot.as_ref()?;
        Some(Box::new(BluezAudio::from_snapshot(snapshot)))
    }

    fn permissions(&self) -> &dyn PermissionChecker {
        &AlwaysGranted
    }
}

pub struct BluezPlatform {
    timeout: Duration,
}

impl BluezPlatform {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn fetch(&self) -> FrozenBluez {
        let snapshot = match BluezSnapshot::fetch(self.timeout) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::debug!("BlueZ not reachable: {}", e);
                None
            }
        };
        FrozenBluez { snapshot }
    }
}

impl HostPlatform for BluezPlatform {
    fn freeze(&self) -> Option<Box<dyn HostPlatform + '_>> {
        Some(Box::new(self.fetch()))
    }

    fn capabilities(&self) -> PlatformCapabilities {
        PlatformCapabilities::full()
    }

    fn bluetooth_service(&self) -> Option<Box<dyn BluetoothService + '_>> {
        let snapshot = self.fetch().snapshot?;
        Some(Box::new(BluezBluetooth::from_snapshot(&snapshot)))
    }

    fn audio_service(&self) -> Option<Box<dyn AudioService + '_>> {
        let snapshot = self.fetch().snapshot?;
        Some(Box::new(BluezAudio::from_snapshot(&snapshot)))
    }

    fn permissions(&self) -> &dyn PermissionChecker {
        &AlwaysGranted
    }
}
