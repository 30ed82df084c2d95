use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::alarm_control_panel::AdtPulseAlarm;
use super::binary_sensor::AdtPulseGatewaySensor;
use super::binary_sensor::AdtPulseZoneSensor;
use super::client::PulseService;
use crate::engine::AlarmCommand;
use crate::engine::CoordinatorListener;
use crate::engine::DataUpdateCoordinator;
use crate::engine::Entity;
use crate::engine::EntityIdRegistry;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;
use crate::engine::Integration;
use crate::engine::ToIntegrationMessage;

/// Delay before polling again after the service reported an error.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(30);

/// Entities created for one Pulse service.
#[derive(Default)]
struct Entities {
    alarms: HashMap<String, Arc<AdtPulseAlarm>>,
    zones: Vec<Arc<AdtPulseZoneSensor>>,
    gateway: Option<Arc<AdtPulseGatewaySensor>>,
}

impl Entities {
    fn entity_ids(&self) -> Vec<String> {
        self.alarms
            .keys()
            .cloned()
            .chain(self.zones.iter().map(|z| z.entity_id()))
            .chain(self.gateway.iter().map(|g| g.entity_id()))
            .collect()
    }

    /// Write the state of every entity.
    async fn write_all(&self, to_engine: &FromIntegrationSender) {
        for alarm in self.alarms.values() {
            alarm.handle_coordinator_update(to_engine).await;
        }
        for zone in &self.zones {
            zone.handle_coordinator_update(to_engine).await;
        }
        if let Some(gateway) = &self.gateway {
            gateway.handle_coordinator_update(to_engine).await;
        }
    }
}

/// ADT Pulse integration for pulsed
///
/// Exposes each Pulse site as an alarm control panel, each supported zone as a
/// binary sensor and the gateway as a connectivity sensor.
pub struct AdtPulseIntegration<S: PulseService> {
    service: Arc<S>,
    coordinator: Arc<DataUpdateCoordinator>,
    entities: Arc<Entities>,
    to_engine: Option<FromIntegrationSender>,
    /// Polls the service and signals the coordinator
    poll_task: Option<JoinHandle<()>>,
    /// Refreshes entity state on coordinator updates
    listener_task: Option<JoinHandle<()>>,
}

impl<S: PulseService + 'static> AdtPulseIntegration<S> {
    pub fn new(service: S) -> Self {
        Self {
            service: Arc::new(service),
            coordinator: Arc::new(DataUpdateCoordinator::new("adtpulse")),
            entities: Arc::new(Entities::default()),
            to_engine: None,
            poll_task: None,
            listener_task: None,
        }
    }

    /// Create one alarm control panel per site.
    fn create_alarms(service: &S) -> Vec<AdtPulseAlarm> {
        let sites = service.sites();
        if sites.is_empty() {
            error!("ADT Pulse service failed to return sites, cannot setup alarm platform");
            return Vec::new();
        }
        sites.into_iter().map(AdtPulseAlarm::new).collect()
    }

    /// Create zone sensors for every site plus the gateway sensor.
    ///
    /// Zones with unsupported tags are skipped individually.
    fn create_sensors(
        service: &Arc<S>,
    ) -> (Vec<AdtPulseZoneSensor>, Option<AdtPulseGatewaySensor>) {
        let sites = service.sites();
        if sites.is_empty() {
            error!("ADT's Pulse service returned NO sites, cannot create sensors");
            return (Vec::new(), None);
        }

        let mut zones = Vec::new();
        for site in sites {
            let zone_ids: Vec<u32> = site.zones().into_keys().collect();
            if zone_ids.is_empty() {
                error!(
                    "ADT's Pulse service returned NO zones (sensors) for site: {}",
                    site.id()
                );
                continue;
            }
            for zone_id in zone_ids {
                match AdtPulseZoneSensor::new(site.clone(), zone_id) {
                    Ok(sensor) => zones.push(sensor),
                    Err(e) => warn!("Skipping ADT Pulse zone {}: {}", zone_id, e),
                }
            }
        }

        let gateway = AdtPulseGatewaySensor::new(service.clone() as Arc<dyn PulseService>);
        (zones, gateway)
    }

    async fn register_entity(entity_id: &str, to_engine: &FromIntegrationSender) {
        let msg = FromIntegrationMessage::EntityDiscovered {
            entity_id: entity_id.to_string(),
            integration_name: "adtpulse".to_string(),
        };
        if let Err(e) = to_engine.send(msg).await {
            warn!("Failed to send EntityDiscovered message: {}", e);
        } else {
            info!("Registered entity: {}", entity_id);
        }
    }

    /// Wait for vendor updates and signal the coordinator.
    async fn run_poller(service: Arc<S>, coordinator: Arc<DataUpdateCoordinator>) {
        loop {
            match service.wait_for_update().await {
                Ok(true) => {
                    coordinator.set_updated();
                }
                Ok(false) => debug!(
                    "ADT Pulse poll returned no changes (still generation {})",
                    coordinator.generation()
                ),
                Err(e) => {
                    warn!("ADT Pulse update failed: {}", e);
                    tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                }
            }
        }
    }

    /// Refresh every entity once per coordinator update.
    async fn run_listener(
        coordinator: Arc<DataUpdateCoordinator>,
        mut listener: CoordinatorListener,
        entities: Arc<Entities>,
        to_engine: FromIntegrationSender,
    ) {
        while listener.changed().await.is_ok() {
            let generation = *listener.borrow_and_update();
            debug!(
                "Coordinator {} refreshing entities for generation {}",
                coordinator.name(),
                generation
            );
            entities.write_all(&to_engine).await;
        }
    }

    /// Forward an alarm command; returns the vendor outcome.
    async fn handle_alarm_command(
        &self,
        entity_id: &str,
        command: AlarmCommand,
        code: Option<String>,
    ) -> Result<bool, Box<dyn Error + Send>> {
        let alarm = self
            .entities
            .alarms
            .get(entity_id)
            .ok_or_else(|| -> Box<dyn Error + Send> {
                Box::new(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("Alarm control panel not found: {}", entity_id),
                ))
            })?;

        if let Some(feature) = command.required_feature() {
            if !alarm.supported_features().contains(feature) {
                warn!("{} does not support {}", entity_id, command);
                return Ok(false);
            }
        }
        if code.is_some() {
            debug!("Ignoring code for {}: ADT Pulse does not use one", entity_id);
        }

        let to_engine = self.to_engine.as_ref().ok_or_else(|| -> Box<dyn Error + Send> {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "ADT Pulse integration not set up",
            ))
        })?;

        Ok(alarm.perform_alarm_action(command, to_engine).await)
    }
}

#[async_trait]
impl<S: PulseService + 'static> Integration for AdtPulseIntegration<S> {
    fn name(&self) -> &str {
        "adtpulse"
    }

    async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
        self.to_engine = Some(tx.clone());

        info!("Connecting to ADT Pulse");
        self.service
            .login()
            .await
            .map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })?;

        // Names are not unique across sites, so ids are reserved in creation order.
        let mut ids = EntityIdRegistry::new();
        let mut entities = Entities::default();
        for mut alarm in Self::create_alarms(&self.service) {
            let entity_id = ids.assign(&alarm.entity_id());
            alarm.set_entity_id(entity_id.clone());
            entities.alarms.insert(entity_id, Arc::new(alarm));
        }
        let (zones, gateway) = Self::create_sensors(&self.service);
        for mut zone in zones {
            zone.set_entity_id(ids.assign(&zone.entity_id()));
            entities.zones.push(Arc::new(zone));
        }
        entities.gateway = gateway.map(|mut gateway| {
            gateway.set_entity_id(ids.assign(&gateway.entity_id()));
            Arc::new(gateway)
        });

        for entity_id in entities.entity_ids() {
            Self::register_entity(&entity_id, &tx).await;
        }
        entities.write_all(&tx).await;

        let entities = Arc::new(entities);
        self.entities = entities.clone();

        info!(
            "ADT Pulse integration setup complete ({} alarm panels, {} zone sensors)",
            entities.alarms.len(),
            entities.zones.len()
        );

        // Subscribe before polling starts so no update is missed.
        let listener = self.coordinator.add_listener();
        self.listener_task = Some(tokio::spawn(Self::run_listener(
            self.coordinator.clone(),
            listener,
            entities,
            tx,
        )));
        self.poll_task = Some(tokio::spawn(Self::run_poller(
            self.service.clone(),
            self.coordinator.clone(),
        )));

        Ok(())
    }

    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>> {
        match msg {
            ToIntegrationMessage::AlarmCommand {
                entity_id,
                command,
                code,
                respond_to,
            } => {
                info!("Handling alarm command for {}: {}", entity_id, command);
                let result = self.handle_alarm_command(&entity_id, command, code).await;
                let outcome = *result.as_ref().unwrap_or(&false);
                if respond_to.send(outcome).is_err() {
                    debug!("Caller stopped waiting for {} outcome", entity_id);
                }
                result.map(|_| ())
            }
        }
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
        info!("ADT Pulse integration shutting down");
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        if let Some(task) = self.listener_task.take() {
            task.abort();
        }
        self.service
            .logout()
            .await
            .map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use tokio::sync::mpsc;
    use tokio::sync::oneshot;

    use super::*;
    use crate::engine::AlarmState;
    use crate::integrations::adtpulse::client::mock::MockPulseService;
    use crate::integrations::adtpulse::client::mock::MockPulseSite;
    use crate::integrations::adtpulse::client::mock::zone;

    fn home_site() -> Arc<MockPulseSite> {
        Arc::new(
            MockPulseSite::new("160-1234", "Home")
                .with_zone(1, zone("sensor-1", "Front Door", &["sensor", "doorWindow"], "OK"))
                .with_zone(2, zone("sensor-2", "Hall Motion", &["sensor", "motion"], "OK"))
                .with_zone(3, zone("sensor-3", "Keypad", &["sensor", "keypad"], "OK")),
        )
    }

    fn drain(rx: &mut mpsc::Receiver<FromIntegrationMessage>) -> Vec<FromIntegrationMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            messages.push(msg);
        }
        messages
    }

    fn discovered(messages: &[FromIntegrationMessage]) -> Vec<String> {
        let mut ids: Vec<String> = messages
            .iter()
            .filter_map(|m| match m {
                FromIntegrationMessage::EntityDiscovered { entity_id, .. } => {
                    Some(entity_id.clone())
                }
                _ => None,
            })
            .collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn test_setup_registers_entities() {
        let service = MockPulseService::new(vec![home_site()]);
        let mut integration = AdtPulseIntegration::new(service);
        let (tx, mut rx) = mpsc::channel(64);

        integration.setup(tx).await.unwrap();

        let messages = drain(&mut rx);
        // The keypad zone is unsupported and must not be created.
        assert_eq!(
            discovered(&messages),
            [
                "alarm_control_panel.adt_home",
                "binary_sensor.front_door",
                "binary_sensor.hall_motion",
                "binary_sensor.home_pulse_gateway_status",
            ]
        );
        let state_writes = messages
            .iter()
            .filter(|m| !matches!(m, FromIntegrationMessage::EntityDiscovered { .. }))
            .count();
        assert_eq!(state_writes, 4);
        assert_eq!(integration.service.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_setup_without_sites() {
        let service = MockPulseService::new(Vec::new());
        let mut integration = AdtPulseIntegration::new(service);
        let (tx, mut rx) = mpsc::channel(64);

        integration.setup(tx).await.unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_site_without_zones_still_gets_alarm() {
        let service = MockPulseService::new(vec![Arc::new(MockPulseSite::new("1", "Cabin"))]);
        let mut integration = AdtPulseIntegration::new(service);
        let (tx, mut rx) = mpsc::channel(64);

        integration.setup(tx).await.unwrap();
        assert_eq!(
            discovered(&drain(&mut rx)),
            [
                "alarm_control_panel.adt_cabin",
                "binary_sensor.cabin_pulse_gateway_status",
            ]
        );
    }

    #[tokio::test]
    async fn test_duplicate_names_get_distinct_entity_ids() {
        let home = Arc::new(
            MockPulseSite::new("1", "Home")
                .with_zone(1, zone("sensor-1", "Front Door", &["sensor", "doorWindow"], "OK")),
        );
        let cabin = Arc::new(
            MockPulseSite::new("2", "home")
                .with_zone(1, zone("sensor-1", "Front Door", &["sensor", "doorWindow"], "Open")),
        );
        let service = MockPulseService::new(vec![home, cabin]);
        let mut integration = AdtPulseIntegration::new(service);
        let (tx, mut rx) = mpsc::channel(64);

        integration.setup(tx).await.unwrap();

        let messages = drain(&mut rx);
        assert_eq!(
            discovered(&messages),
            [
                "alarm_control_panel.adt_home",
                "alarm_control_panel.adt_home_2",
                "binary_sensor.front_door",
                "binary_sensor.front_door_2",
                "binary_sensor.home_pulse_gateway_status",
            ]
        );
        assert_eq!(integration.entities.alarms.len(), 2);

        // Each zone writes its own state under its own id.
        let doors: HashMap<String, bool> = messages
            .iter()
            .filter_map(|m| match m {
                FromIntegrationMessage::BinarySensorStateChanged { entity_id, state }
                    if entity_id.starts_with("binary_sensor.front_door") =>
                {
                    Some((entity_id.clone(), state.on))
                }
                _ => None,
            })
            .collect();
        assert_eq!(doors.len(), 2);
        assert_eq!(doors.values().filter(|on| **on).count(), 1);
    }

    #[tokio::test]
    async fn test_commands_reach_each_duplicate_named_site() {
        let first = Arc::new(MockPulseSite::new("1", "Home"));
        let second = Arc::new(MockPulseSite::new("2", "home"));
        let service = MockPulseService::new(vec![first.clone(), second.clone()]);
        let mut integration = AdtPulseIntegration::new(service);
        let (tx, _rx) = mpsc::channel(64);
        integration.setup(tx).await.unwrap();

        for entity_id in ["alarm_control_panel.adt_home", "alarm_control_panel.adt_home_2"] {
            let (respond_to, response) = oneshot::channel();
            integration
                .handle_message(ToIntegrationMessage::AlarmCommand {
                    entity_id: entity_id.to_string(),
                    command: AlarmCommand::ArmHome,
                    code: None,
                    respond_to,
                })
                .await
                .unwrap();
            assert!(response.await.unwrap());
        }

        assert_eq!(first.calls.lock().unwrap().as_slice(), ["arm_home(force=false)"]);
        assert_eq!(second.calls.lock().unwrap().as_slice(), ["arm_home(force=false)"]);
    }

    #[tokio::test]
    async fn test_setup_fails_when_login_fails() {
        let mut service = MockPulseService::new(vec![home_site()]);
        service.fail_login = true;
        let mut integration = AdtPulseIntegration::new(service);
        let (tx, _rx) = mpsc::channel(64);

        assert!(integration.setup(tx).await.is_err());
    }

    #[tokio::test]
    async fn test_coordinator_update_refreshes_entities() {
        let site = home_site();
        let service = MockPulseService::new(vec![site.clone()]);
        let mut integration = AdtPulseIntegration::new(service);
        let (tx, mut rx) = mpsc::channel(64);
        integration.setup(tx).await.unwrap();
        drain(&mut rx);

        site.set_zone_state(1, "Open");
        integration.service.trigger_update();

        let mut front_door = None;
        for _ in 0..4 {
            let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("no state written after update")
                .unwrap();
            if let FromIntegrationMessage::BinarySensorStateChanged { entity_id, state } = msg {
                if entity_id == "binary_sensor.front_door" {
                    front_door = Some(state);
                }
            }
        }
        let front_door = front_door.expect("front door state not written");
        assert!(front_door.on);
        assert_eq!(front_door.icon.as_deref(), Some("mdi:door-open"));
    }

    #[tokio::test]
    async fn test_alarm_command_replies_after_vendor_call() {
        let site = home_site();
        let service = MockPulseService::new(vec![site.clone()]);
        let mut integration = AdtPulseIntegration::new(service);
        let (tx, mut rx) = mpsc::channel(64);
        integration.setup(tx).await.unwrap();
        drain(&mut rx);

        let (respond_to, response) = oneshot::channel();
        integration
            .handle_message(ToIntegrationMessage::AlarmCommand {
                entity_id: "alarm_control_panel.adt_home".to_string(),
                command: AlarmCommand::ArmCustomBypass,
                code: None,
                respond_to,
            })
            .await
            .unwrap();

        assert!(response.await.unwrap());
        assert_eq!(site.calls.lock().unwrap().as_slice(), ["arm_away(force=true)"]);

        let writes = drain(&mut rx);
        assert_eq!(writes.len(), 1);
        match &writes[0] {
            FromIntegrationMessage::AlarmPanelStateChanged { state, .. } => {
                assert_eq!(state.state, Some(AlarmState::ArmedAway));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejected_alarm_command() {
        let site = home_site();
        site.accept_commands.store(false, Ordering::SeqCst);
        let service = MockPulseService::new(vec![site.clone()]);
        let mut integration = AdtPulseIntegration::new(service);
        let (tx, mut rx) = mpsc::channel(64);
        integration.setup(tx).await.unwrap();
        drain(&mut rx);

        let (respond_to, response) = oneshot::channel();
        integration
            .handle_message(ToIntegrationMessage::AlarmCommand {
                entity_id: "alarm_control_panel.adt_home".to_string(),
                command: AlarmCommand::Disarm,
                code: None,
                respond_to,
            })
            .await
            .unwrap();

        assert!(!response.await.unwrap());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_alarm_command_for_unknown_panel() {
        let service = MockPulseService::new(vec![home_site()]);
        let mut integration = AdtPulseIntegration::new(service);
        let (tx, _rx) = mpsc::channel(64);
        integration.setup(tx).await.unwrap();

        let (respond_to, response) = oneshot::channel();
        let result = integration
            .handle_message(ToIntegrationMessage::AlarmCommand {
                entity_id: "alarm_control_panel.elsewhere".to_string(),
                command: AlarmCommand::ArmHome,
                code: None,
                respond_to,
            })
            .await;

        assert!(result.is_err());
        assert!(!response.await.unwrap());
    }

    #[tokio::test]
    async fn test_shutdown_logs_out() {
        let service = MockPulseService::new(vec![home_site()]);
        let mut integration = AdtPulseIntegration::new(service);
        let (tx, _rx) = mpsc::channel(64);
        integration.setup(tx).await.unwrap();

        integration.shutdown().await.unwrap();
        assert_eq!(integration.service.logouts.load(Ordering::SeqCst), 1);
        assert!(integration.poll_task.is_none());
    }
}
