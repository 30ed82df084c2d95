//! ADT Pulse binary sensors.
//!
//! Every zone configured in Pulse becomes a binary sensor whose device class
//! is derived from the zone's tags, so the proper status and icons are
//! displayed. The gateway gets a connectivity sensor of its own.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::ADTPULSE_DATA_ATTRIBUTION;
use super::client::PulseService;
use super::client::PulseSite;
use super::client::Zone;
use crate::engine::BinarySensorDeviceClass;
use crate::engine::BinarySensorState;
use crate::engine::Entity;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;
use crate::engine::suggest_entity_id;

/// Pulse tag → device class, in priority order.
/// Please keep these alphabetized to make changes easier.
const ADT_DEVICE_CLASS_TAG_MAP: [(&str, BinarySensorDeviceClass); 8] = [
    ("co", BinarySensorDeviceClass::CarbonMonoxide),
    ("doorWindow", BinarySensorDeviceClass::Door),
    ("flood", BinarySensorDeviceClass::Moisture),
    ("garage", BinarySensorDeviceClass::GarageDoor),
    ("fire", BinarySensorDeviceClass::Heat),
    ("motion", BinarySensorDeviceClass::Motion),
    ("smoke", BinarySensorDeviceClass::Smoke),
    ("glass", BinarySensorDeviceClass::Tamper),
];

/// Icon shown for a sensor with no entry in the icon table.
const UNKNOWN_SENSOR_ICON: &str = "mdi:alert-octogram";

/// Icons for a device class as (active, inactive).
pub fn sensor_icons(device_class: BinarySensorDeviceClass) -> Option<(&'static str, &'static str)> {
    use BinarySensorDeviceClass::*;

    match device_class {
        CarbonMonoxide => Some(("mdi:molecule-co", "mdi:checkbox-marked-circle")),
        Door => Some(("mdi:door-open", "mdi:door")),
        GarageDoor => Some(("mdi:garage-open-variant", "mdi:garage-variant")),
        Heat => Some(("mdi:fire", "mdi:smoke-detector-variant")),
        Moisture => Some(("mdi:home-flood", "mdi:heat-wave")),
        Motion => Some(("mdi:run-fast", "mdi:motion-sensor")),
        Smoke => Some(("mdi:fire", "mdi:smoke-detector-variant")),
        Tamper => Some(("mdi:window-open", "mdi:window-closed")),
        Window => Some(("mdi:window-open-variant", "mdi:window-closed-variant")),
        _ => None,
    }
}

/// Pick the icon for a sensor in the given state.
pub fn sensor_icon(device_class: BinarySensorDeviceClass, is_on: bool) -> &'static str {
    match sensor_icons(device_class) {
        Some((active, _)) if is_on => active,
        Some((_, inactive)) => inactive,
        None => {
            error!("Unknown ADT Pulse binary sensor device type {}", device_class);
            UNKNOWN_SENSOR_ICON
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("Unsupported ADT Pulse sensor with tags {0:?}")]
    UnsupportedSensor(BTreeSet<String>),

    #[error("ADT Pulse returned no zone {zone_id} for site {site_id}")]
    MissingZone { site_id: String, zone_id: u32 },
}

/// Map the Pulse device type tags of a zone to a binary sensor class.
///
/// Pulse does not separate door and window sensors, so a door whose name
/// mentions a window is reported as a window.
pub fn determine_device_class(zone: &Zone) -> Result<BinarySensorDeviceClass, ClassifyError> {
    let tags = &zone.tags;
    let device_class = if tags.contains("sensor") {
        ADT_DEVICE_CLASS_TAG_MAP
            .iter()
            .find(|(tag, _)| tags.contains(*tag))
            .map(|(_, class)| *class)
    } else {
        None
    };

    let Some(mut device_class) = device_class else {
        warn!(
            "Ignoring unsupported sensor type from ADT Pulse cloud service configured tags: {:?}",
            tags
        );
        return Err(ClassifyError::UnsupportedSensor(tags.clone()));
    };

    if device_class == BinarySensorDeviceClass::Door
        && zone.name.to_lowercase().contains("window")
    {
        device_class = BinarySensorDeviceClass::Window;
    }

    info!(
        "Determined {} device class {} from ADT Pulse service configured tags {:?}",
        zone.name, device_class, tags
    );
    Ok(device_class)
}

/// Binary sensor for one Pulse zone.
pub struct AdtPulseZoneSensor {
    site: Arc<dyn PulseSite>,
    zone_id: u32,
    device_class: BinarySensorDeviceClass,
    /// Name at creation; the entity id must stay stable if the zone is renamed
    name: String,
    entity_id: String,
}

impl AdtPulseZoneSensor {
    pub fn new(site: Arc<dyn PulseSite>, zone_id: u32) -> Result<Self, ClassifyError> {
        debug!("adtpulse: adding zone sensor for site {}", site.id());
        let zone = site.zone(zone_id).ok_or_else(|| ClassifyError::MissingZone {
            site_id: site.id(),
            zone_id,
        })?;
        let device_class = determine_device_class(&zone)?;
        debug!("Created ADT Pulse '{}' sensor '{}'", device_class, zone.name);

        Ok(Self {
            site,
            zone_id,
            device_class,
            entity_id: suggest_entity_id("binary_sensor", &zone.name),
            name: zone.name,
        })
    }

    /// Replace the suggested entity id, e.g. with one made unique.
    pub fn set_entity_id(&mut self, entity_id: String) {
        self.entity_id = entity_id;
    }

    fn zone(&self) -> Option<Zone> {
        self.site.zone(self.zone_id)
    }

    /// Portal id of the zone, e.g. `sensor-12`
    pub fn id(&self) -> String {
        self.zone().map(|z| z.id).unwrap_or_default()
    }

    pub fn device_class(&self) -> BinarySensorDeviceClass {
        self.device_class
    }

    /// A zone is on (tripped) when its state is anything but OK.
    pub fn is_on(&self) -> bool {
        self.zone().is_some_and(|z| z.is_tripped())
    }

    pub fn snapshot(&self) -> BinarySensorState {
        BinarySensorState {
            name: self.name(),
            unique_id: self.unique_id(),
            on: self.is_on(),
            device_class: Some(self.device_class),
            icon: self.icon(),
            attribution: self.attribution().map(String::from),
            attributes: self.extra_state_attributes(),
        }
    }

    pub async fn write_state(&self, to_engine: &FromIntegrationSender) {
        write_binary_sensor_state(self.entity_id(), self.snapshot(), to_engine).await;
    }

    pub async fn handle_coordinator_update(&self, to_engine: &FromIntegrationSender) {
        debug!(
            "Setting ADT Pulse zone {} to {} at timestamp {:?}",
            self.id(),
            self.is_on(),
            self.zone().map(|z| z.last_activity_timestamp)
        );
        self.write_state(to_engine).await;
    }
}

impl Entity for AdtPulseZoneSensor {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn unique_id(&self) -> String {
        format!("adt_pulse_sensor_{}_{}", self.site.id(), self.zone_id)
    }

    fn platform(&self) -> &'static str {
        "binary_sensor"
    }

    fn entity_id(&self) -> String {
        self.entity_id.clone()
    }

    fn icon(&self) -> Option<String> {
        Some(sensor_icon(self.device_class, self.is_on()).to_string())
    }

    fn extra_state_attributes(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut attributes = serde_json::Map::new();
        if let Some(zone) = self.zone() {
            attributes.insert("status".to_string(), zone.status.into());
            attributes.insert(
                "last_activity_timestamp".to_string(),
                zone.last_activity_timestamp.into(),
            );
        }
        attributes
    }

    fn attribution(&self) -> Option<&'static str> {
        Some(ADTPULSE_DATA_ATTRIBUTION)
    }

    fn state_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or_default()
    }
}

/// Connectivity sensor for the Pulse gateway.
pub struct AdtPulseGatewaySensor {
    service: Arc<dyn PulseService>,
    site_id: String,
    name: String,
    entity_id: String,
}

impl AdtPulseGatewaySensor {
    /// Gateways report for the first site of the service. Returns `None` when
    /// the service has no sites.
    pub fn new(service: Arc<dyn PulseService>) -> Option<Self> {
        let site = service.sites().into_iter().next()?;
        debug!(
            "adtpulse: adding gateway status sensor for site {}",
            site.name()
        );
        let name = format!("{} Pulse Gateway Status", site.name());
        Some(Self {
            entity_id: suggest_entity_id("binary_sensor", &name),
            name,
            site_id: site.id(),
            service,
        })
    }

    /// Replace the suggested entity id, e.g. with one made unique.
    pub fn set_entity_id(&mut self, entity_id: String) {
        self.entity_id = entity_id;
    }

    pub fn device_class(&self) -> BinarySensorDeviceClass {
        BinarySensorDeviceClass::Connectivity
    }

    pub fn is_on(&self) -> bool {
        self.service.gateway_online()
    }

    pub fn snapshot(&self) -> BinarySensorState {
        BinarySensorState {
            name: self.name(),
            unique_id: self.unique_id(),
            on: self.is_on(),
            device_class: Some(self.device_class()),
            icon: self.icon(),
            attribution: self.attribution().map(String::from),
            attributes: self.extra_state_attributes(),
        }
    }

    pub async fn write_state(&self, to_engine: &FromIntegrationSender) {
        write_binary_sensor_state(self.entity_id(), self.snapshot(), to_engine).await;
    }

    pub async fn handle_coordinator_update(&self, to_engine: &FromIntegrationSender) {
        debug!("Setting Pulse Gateway status to {}", self.is_on());
        self.write_state(to_engine).await;
    }
}

impl Entity for AdtPulseGatewaySensor {
    fn name(&self) -> String {
        self.name.clone()
    }

    // TODO: a service with several sites may have one gateway per site; needs
    // a multi-site account to confirm what the portal reports.
    fn unique_id(&self) -> String {
        format!("adt_pulse_gateway_{}", self.site_id)
    }

    fn platform(&self) -> &'static str {
        "binary_sensor"
    }

    fn entity_id(&self) -> String {
        self.entity_id.clone()
    }

    fn icon(&self) -> Option<String> {
        let icon = if self.is_on() {
            "mdi:lan-connect"
        } else {
            "mdi:lan-disconnect"
        };
        Some(icon.to_string())
    }

    fn attribution(&self) -> Option<&'static str> {
        Some(ADTPULSE_DATA_ATTRIBUTION)
    }

    fn state_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or_default()
    }
}

async fn write_binary_sensor_state(
    entity_id: String,
    state: BinarySensorState,
    to_engine: &FromIntegrationSender,
) {
    let msg = FromIntegrationMessage::BinarySensorStateChanged { entity_id, state };
    if let Err(e) = to_engine.send(msg).await {
        warn!("Failed to send BinarySensorStateChanged message: {}", e);
    }
}
