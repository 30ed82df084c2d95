//! Alarm control panel platform vocabulary.

use bitflags::bitflags;
use serde::Deserialize;
use serde::Serialize;
use strum::Display;
use strum::EnumString;

/// State of an alarm control panel, matching Home Assistant's alarm states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlarmState {
    ArmedAway,
    ArmedHome,
    Arming,
    Disarmed,
    Disarming,
}

/// Commands an alarm control panel can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlarmCommand {
    Disarm,
    ArmHome,
    ArmAway,
    /// Arm while bypassing open zones
    ArmCustomBypass,
}

impl AlarmCommand {
    /// Feature flag a panel must advertise to accept this command.
    pub fn required_feature(self) -> Option<AlarmPanelFeatures> {
        match self {
            AlarmCommand::Disarm => None,
            AlarmCommand::ArmHome => Some(AlarmPanelFeatures::ARM_HOME),
            AlarmCommand::ArmAway => Some(AlarmPanelFeatures::ARM_AWAY),
            AlarmCommand::ArmCustomBypass => Some(AlarmPanelFeatures::ARM_CUSTOM_BYPASS),
        }
    }
}

bitflags! {
    /// Supported feature flags, bit-compatible with Home Assistant.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AlarmPanelFeatures: u32 {
        const ARM_HOME          = 1;
        const ARM_AWAY          = 2;
        const ARM_NIGHT         = 4;
        const TRIGGER           = 8;
        const ARM_CUSTOM_BYPASS = 16;
        const ARM_VACATION      = 32;
    }
}

impl Serialize for AlarmPanelFeatures {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}
