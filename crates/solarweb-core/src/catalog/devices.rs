// ── Device discovery ──
//
// One pass at startup: list the account's PV systems, declare their
// nodes, and list each system's sub-devices. The result is published
// wholesale through an `ArcSwap` and never re-discovered during a run.

use std::sync::Arc;

use arc_swap::ArcSwap;
use secrecy::SecretString;
use serde_json::Value;
use solarweb_api::SolarWebClient;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::projector::{JsonTreeProjector, ProjectionOptions};
use crate::store::{NodePath, NodeSpec, ScalarType, StateSink, sanitize_segment};

/// Sub-device type tag of the auxiliary unit (heat-pump/boiler controller).
pub const AUX_UNIT_DEVICE_TYPE: &str = "Ohmpilot";

/// Name of the per-system command leaf below `remote`.
pub const REFRESH_COMMAND: &str = "Refresh";

const SYSTEM_ID_FIELD: &str = "pvSystemId";
const SYSTEM_NAME_FIELD: &str = "name";
const DEVICE_ID_FIELD: &str = "deviceId";
const DEVICE_NAME_FIELD: &str = "deviceName";
const DEVICE_TYPE_FIELD: &str = "deviceType";

/// A device attached to a PV system (inverter, meter, battery, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubDevice {
    pub id: String,
    pub name: String,
    pub device_type: Option<String>,
}

/// A discovered PV system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// `pvSystemId` as returned by the API.
    pub id: String,
    pub display_name: String,
    /// Mount path of the system's node.
    pub path: NodePath,
    pub sub_devices: Vec<SubDevice>,
    /// First sub-device of type [`AUX_UNIT_DEVICE_TYPE`].
    pub aux_unit_id: Option<String>,
}

impl Device {
    /// Path of this system's `remote.Refresh` command leaf.
    pub fn refresh_command_path(&self) -> NodePath {
        self.path.child("remote").child(REFRESH_COMMAND)
    }
}

/// The systems discovered at startup.
pub struct DeviceCatalog {
    devices: ArcSwap<Vec<Device>>,
}

impl Default for DeviceCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceCatalog {
    pub fn new() -> Self {
        Self {
            devices: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Current snapshot (cheap `Arc` clone).
    pub fn devices(&self) -> Arc<Vec<Device>> {
        self.devices.load_full()
    }

    pub fn len(&self) -> usize {
        self.devices.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.load().is_empty()
    }

    /// Find the system owning a `{id}.remote.Refresh` command path.
    pub fn by_refresh_path(&self, path: &NodePath) -> Option<Device> {
        self.devices
            .load()
            .iter()
            .find(|d| d.refresh_command_path() == *path)
            .cloned()
    }

    /// Run discovery and publish the result.
    ///
    /// A failed system listing leaves the catalog empty and is returned
    /// as an error; a failed sub-device listing only loses that system's
    /// sub-devices.
    pub async fn discover<S: StateSink + ?Sized>(
        &self,
        client: &SolarWebClient,
        token: &SecretString,
        sink: &S,
    ) -> Result<usize, CoreError> {
        let systems = client.list_systems(token).await?;
        debug!(count = systems.len(), "system list received");

        let mut devices = Vec::with_capacity(systems.len());
        for system in &systems {
            let Some(mut device) = declare_system(system, sink) else {
                warn!("skipping system entry without a usable {SYSTEM_ID_FIELD}");
                continue;
            };

            match client.list_system_devices(token, &device.id).await {
                Ok(entries) => {
                    device.sub_devices = declare_sub_devices(&device.path, &entries, sink);
                    device.aux_unit_id = device
                        .sub_devices
                        .iter()
                        .find(|d| d.device_type.as_deref() == Some(AUX_UNIT_DEVICE_TYPE))
                        .map(|d| d.id.clone());
                }
                Err(e) => warn!(system = %device.id, error = %e, "sub-device listing failed"),
            }

            info!(
                system = %device.id,
                name = %device.display_name,
                sub_devices = device.sub_devices.len(),
                aux_unit = device.aux_unit_id.is_some(),
                "system discovered"
            );
            devices.push(device);
        }

        let count = devices.len();
        self.devices.store(Arc::new(devices));
        Ok(count)
    }
}

/// Declare the nodes of one system and project its description.
fn declare_system<S: StateSink + ?Sized>(system: &Value, sink: &S) -> Option<Device> {
    let id = system.get(SYSTEM_ID_FIELD)?.as_str()?.to_owned();
    let path = NodePath::root().child(sanitize_segment(&id)?);
    let display_name = system
        .get(SYSTEM_NAME_FIELD)
        .and_then(Value::as_str)
        .unwrap_or(id.as_str())
        .to_owned();

    sink.ensure_node(&path, &NodeSpec::container(&display_name));
    sink.ensure_node(&path.child("remote"), &NodeSpec::container("Remote Controls"));
    sink.ensure_node(
        &path.child("remote").child(REFRESH_COMMAND),
        &NodeSpec::leaf("True = Refresh", ScalarType::Boolean).writable(),
    );

    let general = path.child("general");
    sink.ensure_node(&general, &NodeSpec::container("General Information"));
    JsonTreeProjector::default().project(sink, system, &general);

    Some(Device {
        id,
        display_name,
        path,
        sub_devices: Vec::new(),
        aux_unit_id: None,
    })
}

fn declare_sub_devices<S: StateSink + ?Sized>(
    system_path: &NodePath,
    entries: &[Value],
    sink: &S,
) -> Vec<SubDevice> {
    let container = system_path.child("devices");
    sink.ensure_node(&container, &NodeSpec::container("Devices"));

    entries
        .iter()
        .filter_map(|entry| {
            let id = entry.get(DEVICE_ID_FIELD)?.as_str()?.to_owned();
            let segment = sanitize_segment(&id)?;
            let name = entry
                .get(DEVICE_NAME_FIELD)
                .and_then(Value::as_str)
                .unwrap_or(id.as_str())
                .to_owned();
            let device_type = entry
                .get(DEVICE_TYPE_FIELD)
                .and_then(Value::as_str)
                .map(str::to_owned);

            let projector = JsonTreeProjector::new(ProjectionOptions::labelled(&name));
            projector.project(sink, entry, &container.child(segment));

            Some(SubDevice {
                id,
                name,
                device_type,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ScalarValue, TreeStore};
    use serde_json::json;

    #[test]
    fn system_nodes_are_declared() {
        let store = TreeStore::new();
        let device = declare_system(
            &json!({ "pvSystemId": "sys-1", "name": "Roof", "peakPower": 9800 }),
            &store,
        )
        .expect("device");

        let p = NodePath::parse;
        assert_eq!(device.display_name, "Roof");
        assert_eq!(store.label(&p("sys-1")).as_deref(), Some("Roof"));
        assert_eq!(store.label(&p("sys-1.remote")).as_deref(), Some("Remote Controls"));
        assert_eq!(store.label(&p("sys-1.general")).as_deref(), Some("General Information"));
        assert_eq!(
            store.value(&p("sys-1.general.peakPower")),
            Some(ScalarValue::Number(9800.0))
        );

        let refresh = store.get(&device.refresh_command_path()).expect("refresh leaf");
        assert!(refresh.spec.writable);
        assert_eq!(refresh.spec.label, "True = Refresh");
    }

    #[test]
    fn system_without_id_is_skipped() {
        let store = TreeStore::new();
        assert!(declare_system(&json!({ "name": "anonymous" }), &store).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn sub_devices_are_projected() {
        let store = TreeStore::new();
        let subs = declare_sub_devices(
            &NodePath::parse("sys-1"),
            &[
                json!({ "deviceId": "inv-1", "deviceName": "Symo", "deviceType": "Inverter" }),
                json!({ "deviceName": "no id" }),
                json!({ "deviceId": "ohm-1", "deviceType": "Ohmpilot" }),
            ],
            &store,
        );

        assert_eq!(subs.len(), 2);
        assert_eq!(subs[1].name, "ohm-1");
        assert_eq!(
            store.label(&NodePath::parse("sys-1.devices.inv-1")).as_deref(),
            Some("Symo")
        );
        assert_eq!(
            store.value(&NodePath::parse("sys-1.devices.inv-1.deviceType")),
            Some(ScalarValue::from("Inverter"))
        );
    }
}
