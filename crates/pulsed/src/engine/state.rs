use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use super::alarm_control_panel::AlarmPanelFeatures;
use super::alarm_control_panel::AlarmState;
use super::binary_sensor::BinarySensorDeviceClass;

type Attributes = serde_json::Map<String, serde_json::Value>;

/// State of an alarm control panel entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmPanelState {
    pub name: String,

    pub unique_id: String,

    /// Normalized alarm state; `None` when the vendor state is unknown.
    pub state: Option<AlarmState>,

    pub icon: Option<String>,

    pub supported_features: AlarmPanelFeatures,

    /// Format of the code required to arm/disarm, if any.
    pub code_format: Option<String>,

    pub attributes: Attributes,
}

/// State of a binary sensor entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BinarySensorState {
    pub name: String,

    pub unique_id: String,

    /// Whether the sensor is active (meaning depends on device class:
    /// door open, motion detected, gateway online, etc.)
    pub on: bool,

    pub device_class: Option<BinarySensorDeviceClass>,

    pub icon: Option<String>,

    pub attribution: Option<String>,

    pub attributes: Attributes,
}

/// Centralized snapshot of the entire engine state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub alarm_panels: HashMap<String, AlarmPanelState>,
    pub binary_sensors: HashMap<String, BinarySensorState>,
}
