// src/constraints.rs

//! Constraint translation.
//!
//! Workers declare their run conditions with a loose, string based
//! [`ConstraintSpec`] (the shape the host sends over the wire). The scheduler
//! works with the strongly typed [`Constraints`]. Translation never fails:
//! anything missing or unrecognised becomes the least restrictive value.

use serde::{Deserialize, Serialize};

use crate::scheduler::{DeviceConditions, NetworkState};

/// Declarative constraint descriptor, as supplied at registration.
///
/// ```toml
/// [worker.sync.constraints]
/// network = "unmetered"
/// battery = "notLow"
/// idle = true
/// storage = "notLow"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSpec {
    /// `notRequired`, `connected`, `metered`, `unmetered` or `notRoaming`.
    #[serde(default)]
    pub network: Option<String>,

    /// `notRequired`, `charging` or `notLow`.
    #[serde(default)]
    pub battery: Option<String>,

    #[serde(default)]
    pub idle: bool,

    /// `notRequired` or `notLow`.
    #[serde(default)]
    pub storage: Option<String>,
}

/// Network requirement understood by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    #[default]
    NotRequired,
    Connected,
    Metered,
    Unmetered,
    NotRoaming,
}

/// Scheduler-native constraint set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Constraints {
    pub network: NetworkType,
    pub requires_charging: bool,
    pub requires_battery_not_low: bool,
    pub requires_device_idle: bool,
    pub requires_storage_not_low: bool,
}

impl Constraints {
    /// Constraints that are always satisfied.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_unconstrained(&self) -> bool {
        *self == Self::none()
    }

    /// Whether a device in the given condition may run work with these
    /// constraints right now.
    pub fn satisfied_by(&self, device: &DeviceConditions) -> bool {
        let network_ok = match self.network {
            NetworkType::NotRequired => true,
            NetworkType::Connected => device.network != NetworkState::Disconnected,
            NetworkType::Metered => device.network == NetworkState::Metered,
            NetworkType::Unmetered => device.network == NetworkState::Unmetered,
            NetworkType::NotRoaming => {
                device.network != NetworkState::Disconnected && !device.roaming
            }
        };

        network_ok
            && (!self.requires_charging || device.charging)
            && (!self.requires_battery_not_low || !device.battery_low)
            && (!self.requires_device_idle || device.idle)
            && (!self.requires_storage_not_low || !device.storage_low)
    }
}

fn network_type(value: Option<&str>) -> NetworkType {
    match value.map(str::trim) {
        Some("connected") => NetworkType::Connected,
        Some("metered") => NetworkType::Metered,
        Some("unmetered") => NetworkType::Unmetered,
        Some("notRoaming") => NetworkType::NotRoaming,
        _ => NetworkType::NotRequired,
    }
}

/// Translate a constraint descriptor into the scheduler's constraint set.
pub fn translate(spec: &ConstraintSpec) -> Constraints {
    let battery = spec.battery.as_deref().map(str::trim);
    let storage = spec.storage.as_deref().map(str::trim);

    Constraints {
        network: network_type(spec.network.as_deref()),
        requires_charging: battery == Some("charging"),
        requires_battery_not_low: battery == Some("notLow"),
        requires_device_idle: spec.idle,
        requires_storage_not_low: storage == Some("notLow"),
    }
}

impl From<&ConstraintSpec> for Constraints {
    fn from(spec: &ConstraintSpec) -> Self {
        translate(spec)
    }
}
