//! Shared application state handed to every axum handler, mirroring the
//! teacher's `AppState` (`infra/app_state.rs`): a small `Clone`able bundle
//! of `Arc`s, no business logic of its own.

use pulseone_config::RuntimeConfig;
use pulseone_core::Runtime;
use pulseone_model::{DataPoint, Device, DeviceId};
use std::collections::HashMap;
use std::sync::Arc;

/// Boot-time snapshot of each device's static metadata, used only to
/// answer introspection reads and to re-seed a `reload` (§6). The live,
/// mutable state (connection/lifecycle, current values) always comes
/// from the running `Runtime`, never from this snapshot.
#[derive(Clone)]
pub struct DeviceDirectory {
    devices: Arc<HashMap<DeviceId, Device>>,
    points: Arc<HashMap<DeviceId, Vec<DataPoint>>>,
}

impl DeviceDirectory {
    pub fn new(devices: Vec<Device>, points_by_device: Vec<(DeviceId, Vec<DataPoint>)>) -> Self {
        Self {
            devices: Arc::new(devices.into_iter().map(|d| (d.id, d)).collect()),
            points: Arc::new(points_by_device.into_iter().collect()),
        }
    }

    pub fn all(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(&id)
    }

    pub fn points(&self, id: DeviceId) -> &[DataPoint] {
        self.points.get(&id).map(Vec::as_slice).unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<Runtime>,
    pub directory: DeviceDirectory,
    pub config: Arc<RuntimeConfig>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
