// src/scheduler/conditions.rs

use serde::{Deserialize, Serialize};

/// Connectivity as seen by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkState {
    Disconnected,
    Metered,
    #[default]
    Unmetered,
}

/// Snapshot of the resource conditions constraints are evaluated against.
///
/// The default is a healthy device on an unmetered network that is neither
/// charging nor idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceConditions {
    pub network: NetworkState,
    pub roaming: bool,
    pub charging: bool,
    pub battery_low: bool,
    pub idle: bool,
    pub storage_low: bool,
}

impl DeviceConditions {
    /// Conditions under which any constraint set is satisfied.
    pub fn ideal() -> Self {
        Self {
            network: NetworkState::Unmetered,
            roaming: false,
            charging: true,
            battery_low: false,
            idle: true,
            storage_low: false,
        }
    }
}
