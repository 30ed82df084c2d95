//! Type-safe message system for pulsed
//!
//! Messages are split by direction to enforce correct usage at compile time:
//! - `FromIntegrationMessage`: Events from integrations to the engine
//! - `ToIntegrationMessage`: Commands from the engine to integrations

use tokio::sync::oneshot;

use super::alarm_control_panel::AlarmCommand;
use super::state::AlarmPanelState;
use super::state::BinarySensorState;

/// Messages FROM integrations TO the engine (events/state updates)
#[derive(Debug, Clone)]
pub enum FromIntegrationMessage {
    /// An entity was discovered and registered
    EntityDiscovered {
        entity_id: String,
        integration_name: String,
    },

    /// An alarm panel wrote its state
    AlarmPanelStateChanged {
        entity_id: String,
        state: AlarmPanelState,
    },

    /// A binary sensor wrote its state (zone tripped, gateway offline, ...)
    BinarySensorStateChanged {
        entity_id: String,
        state: BinarySensorState,
    },
}

/// Messages FROM the engine TO integrations (commands)
#[derive(Debug)]
pub enum ToIntegrationMessage {
    /// Command an alarm panel. The integration answers on `respond_to` once
    /// the vendor call has completed.
    AlarmCommand {
        entity_id: String,
        command: AlarmCommand,
        code: Option<String>,
        respond_to: oneshot::Sender<bool>,
    },
}

impl ToIntegrationMessage {
    /// Entity the message is addressed to, used for routing.
    pub fn entity_id(&self) -> &str {
        match self {
            ToIntegrationMessage::AlarmCommand { entity_id, .. } => entity_id,
        }
    }
}
