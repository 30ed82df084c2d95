//! Alarm control panel entity for an ADT Pulse site.

use std::str::FromStr;
use std::sync::Arc;

use tracing::debug;
use tracing::warn;

use super::client::AdtAlarmStatus;
use super::client::PulseSite;
use crate::engine::AlarmCommand;
use crate::engine::AlarmPanelFeatures;
use crate::engine::AlarmPanelState;
use crate::engine::AlarmState;
use crate::engine::Entity;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;
use crate::engine::slugify;
use crate::engine::suggest_entity_id;

/// Map a Pulse alarm status to the platform alarm state.
///
/// `unknown` and anything outside the Pulse vocabulary map to `None`.
pub fn alarm_state_for(status: &str) -> Option<AlarmState> {
    match AdtAlarmStatus::from_str(status).ok()? {
        AdtAlarmStatus::Arming => Some(AlarmState::Arming),
        AdtAlarmStatus::Away => Some(AlarmState::ArmedAway),
        AdtAlarmStatus::Disarming => Some(AlarmState::Disarming),
        AdtAlarmStatus::Home => Some(AlarmState::ArmedHome),
        AdtAlarmStatus::Off => Some(AlarmState::Disarmed),
        AdtAlarmStatus::Unknown => None,
    }
}

/// Alarm control panel backed by one Pulse site.
pub struct AdtPulseAlarm {
    site: Arc<dyn PulseSite>,
    name: String,
    entity_id: String,
}

impl AdtPulseAlarm {
    pub fn new(site: Arc<dyn PulseSite>) -> Self {
        debug!("adtpulse: adding alarm control panel for {}", site.id());
        let name = slugify(&format!("ADT {}", site.name()));
        let entity_id = suggest_entity_id("alarm_control_panel", &name);
        Self {
            site,
            name,
            entity_id,
        }
    }

    /// Replace the suggested entity id, e.g. with one made unique.
    pub fn set_entity_id(&mut self, entity_id: String) {
        self.entity_id = entity_id;
    }

    pub fn state(&self) -> Option<AlarmState> {
        alarm_state_for(&self.site.status())
    }

    pub fn supported_features(&self) -> AlarmPanelFeatures {
        AlarmPanelFeatures::ARM_AWAY
            | AlarmPanelFeatures::ARM_CUSTOM_BYPASS
            | AlarmPanelFeatures::ARM_HOME
    }

    /// Pulse does not take a code for arming or disarming.
    pub fn code_format(&self) -> Option<String> {
        None
    }

    pub fn snapshot(&self) -> AlarmPanelState {
        AlarmPanelState {
            name: self.name(),
            unique_id: self.unique_id(),
            state: self.state(),
            icon: self.icon(),
            supported_features: self.supported_features(),
            code_format: self.code_format(),
            attributes: self.extra_state_attributes(),
        }
    }

    /// Publish the current state to the engine.
    pub async fn write_state(&self, to_engine: &FromIntegrationSender) {
        let msg = FromIntegrationMessage::AlarmPanelStateChanged {
            entity_id: self.entity_id(),
            state: self.snapshot(),
        };
        if let Err(e) = to_engine.send(msg).await {
            warn!("Failed to send AlarmPanelStateChanged message: {}", e);
        }
    }

    /// Coordinator callback: the site data may have changed.
    pub async fn handle_coordinator_update(&self, to_engine: &FromIntegrationSender) {
        debug!(
            "Updating Pulse alarm to {:?} for site {}",
            self.state(),
            self.site.id()
        );
        self.write_state(to_engine).await;
    }

    /// Forward a command to the site. On success the new state is written
    /// once; on failure only a warning is logged.
    pub async fn perform_alarm_action(
        &self,
        command: AlarmCommand,
        to_engine: &FromIntegrationSender,
    ) -> bool {
        let action = match command {
            AlarmCommand::Disarm => "disarm",
            AlarmCommand::ArmHome => "arm home",
            AlarmCommand::ArmAway => "arm away",
            AlarmCommand::ArmCustomBypass => "force arm",
        };
        debug!("adtpulse: Setting Alarm to {}", action);

        let success = match command {
            AlarmCommand::Disarm => self.site.disarm().await,
            AlarmCommand::ArmHome => self.site.arm_home(false).await,
            AlarmCommand::ArmAway => self.site.arm_away(false).await,
            // Pulse can arm away with bypass
            AlarmCommand::ArmCustomBypass => self.site.arm_away(true).await,
        };

        if success {
            self.write_state(to_engine).await;
        } else {
            warn!("Could not {} ADT Pulse alarm", action);
        }
        success
    }
}

impl Entity for AdtPulseAlarm {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn unique_id(&self) -> String {
        format!("adt_pulse_alarm_{}", self.site.id())
    }

    fn platform(&self) -> &'static str {
        "alarm_control_panel"
    }

    fn entity_id(&self) -> String {
        self.entity_id.clone()
    }

    fn icon(&self) -> Option<String> {
        Some("mdi:security".to_string())
    }

    fn extra_state_attributes(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut attributes = serde_json::Map::new();
        attributes.insert("site_id".to_string(), self.site.id().into());
        attributes.insert(
            "last_update_time".to_string(),
            serde_json::json!(self.site.last_updated()),
        );
        attributes.insert("alarm_state".to_string(), self.site.status().into());
        attributes
    }

    fn state_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::integrations::adtpulse::client::mock::MockPulseSite;

    fn alarm(site: &Arc<MockPulseSite>) -> AdtPulseAlarm {
        AdtPulseAlarm::new(site.clone() as Arc<dyn PulseSite>)
    }

    #[test]
    fn test_alarm_state_mapping() {
        assert_eq!(alarm_state_for("arming"), Some(AlarmState::Arming));
        assert_eq!(alarm_state_for("away"), Some(AlarmState::ArmedAway));
        assert_eq!(alarm_state_for("disarming"), Some(AlarmState::Disarming));
        assert_eq!(alarm_state_for("stay"), Some(AlarmState::ArmedHome));
        assert_eq!(alarm_state_for("off"), Some(AlarmState::Disarmed));
        assert_eq!(alarm_state_for("unknown"), None);
    }

    #[test]
    fn test_unrecognized_status_is_undefined() {
        assert_eq!(alarm_state_for("Armed Night"), None);
        assert_eq!(alarm_state_for(""), None);
        assert_eq!(alarm_state_for("AWAY"), None);
    }

    #[test]
    fn test_entity_properties() {
        let site = Arc::new(MockPulseSite::new("160-1234", "Lake House"));
        site.set_status("stay");
        let alarm = alarm(&site);

        assert_eq!(alarm.name(), "adt_lake_house");
        assert_eq!(alarm.unique_id(), "adt_pulse_alarm_160-1234");
        assert_eq!(alarm.entity_id(), "alarm_control_panel.adt_lake_house");
        assert_eq!(alarm.icon().as_deref(), Some("mdi:security"));
        assert_eq!(alarm.code_format(), None);
        assert_eq!(alarm.supported_features().bits(), 19);

        let attributes = alarm.extra_state_attributes();
        assert_eq!(attributes["site_id"], "160-1234");
        assert_eq!(attributes["alarm_state"], "stay");
        assert_eq!(attributes["last_update_time"], 1_700_000_000.0);

        let json = alarm.state_json();
        assert_eq!(json["state"], "armed_home");
        assert_eq!(json["supported_features"], 19);
    }

    #[test]
    fn test_accented_site_name_is_transliterated() {
        let site = Arc::new(MockPulseSite::new("7", "Café Résidence"));
        let mut alarm = alarm(&site);
        assert_eq!(alarm.name(), "adt_cafe_residence");
        assert_eq!(alarm.entity_id(), "alarm_control_panel.adt_cafe_residence");

        alarm.set_entity_id("alarm_control_panel.adt_cafe_residence_2".to_string());
        assert_eq!(alarm.entity_id(), "alarm_control_panel.adt_cafe_residence_2");
        assert_eq!(alarm.unique_id(), "adt_pulse_alarm_7");
    }

    #[test]
    fn test_state_reads_through_to_site() {
        let site = Arc::new(MockPulseSite::new("1", "Home"));
        let alarm = alarm(&site);
        assert_eq!(alarm.state(), Some(AlarmState::Disarmed));

        site.set_status("arming");
        assert_eq!(alarm.state(), Some(AlarmState::Arming));

        site.set_status("unknown");
        assert_eq!(alarm.snapshot().state, None);
    }

    #[tokio::test]
    async fn test_successful_command_writes_state_once() {
        let site = Arc::new(MockPulseSite::new("1", "Home"));
        let alarm = alarm(&site);
        let (tx, mut rx) = mpsc::channel(8);

        assert!(alarm.perform_alarm_action(AlarmCommand::ArmAway, &tx).await);
        drop(tx);

        let mut writes = Vec::new();
        while let Some(msg) = rx.recv().await {
            writes.push(msg);
        }
        assert_eq!(writes.len(), 1);
        match &writes[0] {
            FromIntegrationMessage::AlarmPanelStateChanged { entity_id, state } => {
                assert_eq!(entity_id, "alarm_control_panel.adt_home");
                assert_eq!(state.state, Some(AlarmState::ArmedAway));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_command_writes_nothing() {
        let site = Arc::new(MockPulseSite::new("1", "Home"));
        site.accept_commands
            .store(false, std::sync::atomic::Ordering::SeqCst);
        let alarm = alarm(&site);
        let (tx, mut rx) = mpsc::channel(8);

        assert!(!alarm.perform_alarm_action(AlarmCommand::Disarm, &tx).await);
        drop(tx);

        assert!(rx.recv().await.is_none());
        assert_eq!(site.calls.lock().unwrap().as_slice(), ["disarm"]);
    }

    #[tokio::test]
    async fn test_commands_forwarded_to_site() {
        let site = Arc::new(MockPulseSite::new("1", "Home"));
        let alarm = alarm(&site);
        let (tx, _rx) = mpsc::channel(8);

        alarm.perform_alarm_action(AlarmCommand::ArmHome, &tx).await;
        alarm.perform_alarm_action(AlarmCommand::ArmAway, &tx).await;
        alarm
            .perform_alarm_action(AlarmCommand::ArmCustomBypass, &tx)
            .await;
        alarm.perform_alarm_action(AlarmCommand::Disarm, &tx).await;

        assert_eq!(
            site.calls.lock().unwrap().as_slice(),
            [
                "arm_home(force=false)",
                "arm_away(force=false)",
                "arm_away(force=true)",
                "disarm",
            ]
        );
    }
}
