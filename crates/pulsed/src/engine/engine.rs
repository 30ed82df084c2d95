use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::alarm_control_panel::AlarmCommand;
use super::integration::FromIntegrationReceiver;
use super::integration::FromIntegrationSender;
use super::integration::Integration;
use super::integration::ToIntegrationSender;
use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use super::state::State;
use crate::engine::IntegrationContext;

/// Errors returned when routing a command to an integration.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("No integration found for entity: {0}")]
    UnknownEntity(String),

    #[error("Integration channel not found: {0}")]
    IntegrationGone(String),

    #[error("Integration {0} dropped the command without answering")]
    NoResponse(String),
}

/// pulsed engine
///
/// This structure handles the flow of events, sending commands to the correct
/// integration, and maintaining a view of the world with State.
pub struct Engine {
    /// Centralized state snapshot (readers load the Arc, writer stores a new one)
    state: ArcSwap<State>,

    /// Map of entity_id -> integration name for routing messages
    entity_integration_map: std::sync::Mutex<HashMap<String, String>>,

    /// Communication channels to integrations (for commands)
    integration_channels: std::sync::Mutex<HashMap<String, ToIntegrationSender>>,

    /// Receive messages from integrations (events)
    message_rx: Mutex<FromIntegrationReceiver>,

    /// Sender for integrations to report events back to the engine
    message_tx: FromIntegrationSender,

    /// Handles for integration tasks
    integration_handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

/// Capacity for the integration→engine message channel
/// Provides backpressure when integrations send faster than the engine can process
const FROM_INTEGRATION_CHANNEL_SIZE: usize = 1024;

impl Engine {
    /// Create a new Engine instance
    pub fn new() -> Self {
        let (message_tx, message_rx) = mpsc::channel(FROM_INTEGRATION_CHANNEL_SIZE);
        Self {
            state: ArcSwap::new(Arc::default()),
            entity_integration_map: std::sync::Mutex::new(HashMap::new()),
            integration_channels: std::sync::Mutex::new(HashMap::new()),
            message_rx: Mutex::new(message_rx),
            message_tx,
            integration_handles: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Register integrations from configuration
    ///
    /// Runs every factory in the integration registry and registers the ones
    /// that are configured and enabled.
    pub fn register_integrations_from_config(&mut self, cfg: &crate::config::Config) {
        let ctx = IntegrationContext { config: cfg };
        for constr in super::integration::REGISTRY {
            let integration = match constr(&ctx) {
                Ok(Some(i)) => i,
                Err(e) => {
                    error!("failed to setup integration: {:#}", e);
                    continue;
                }
                Ok(None) => continue,
            };
            let name = integration.name().to_string();
            self.register_integration(name, integration);
        }
    }

    /// Register an integration with the engine
    ///
    /// This spawns the integration in a background task, wires up channels,
    /// and starts its setup process.
    pub fn register_integration(&mut self, name: String, mut integration: Box<dyn Integration>) {
        let (to_integration_tx, mut to_integration_rx) = mpsc::unbounded_channel();
        let from_integration_tx = self.message_tx.clone();

        if let Ok(channels) = self.integration_channels.get_mut() {
            channels.insert(name.clone(), to_integration_tx);
        }

        info!("Registering integration '{}'", name);

        // Spawn integration task
        let handle = tokio::spawn(async move {
            // Setup integration (gives it the sender for events)
            if let Err(e) = integration.setup(from_integration_tx).await {
                warn!("Integration '{}' setup failed: {}", name, e);
                return;
            }

            // Process commands from engine
            while let Some(msg) = to_integration_rx.recv().await {
                if let Err(e) = integration.handle_message(msg).await {
                    warn!("Integration '{}' failed to handle message: {}", name, e);
                }
            }

            if let Err(e) = integration.shutdown().await {
                warn!("Integration '{}' shutdown failed: {}", name, e);
            }
        });

        if let Ok(mut handles) = self.integration_handles.lock() {
            handles.push(handle);
        }
    }

    /// Send a command to an integration
    ///
    /// Routes the command to the appropriate integration based on entity_id.
    pub fn send_command(&self, msg: ToIntegrationMessage) -> Result<(), CommandError> {
        let entity_id = msg.entity_id().to_string();

        let integration_name = {
            let map = self
                .entity_integration_map
                .lock()
                .map_err(|_| CommandError::UnknownEntity(entity_id.clone()))?;
            map.get(&entity_id)
                .cloned()
                .ok_or_else(|| CommandError::UnknownEntity(entity_id.clone()))?
        };

        let channels = self
            .integration_channels
            .lock()
            .map_err(|_| CommandError::IntegrationGone(integration_name.clone()))?;
        let tx = channels
            .get(&integration_name)
            .ok_or_else(|| CommandError::IntegrationGone(integration_name.clone()))?;

        tx.send(msg)
            .map_err(|_| CommandError::IntegrationGone(integration_name))
    }

    /// Command an alarm control panel and wait for the integration to report
    /// whether the vendor accepted it.
    pub async fn send_alarm_command(
        &self,
        entity_id: String,
        command: AlarmCommand,
        code: Option<String>,
    ) -> Result<bool, CommandError> {
        let (respond_to, response) = oneshot::channel();
        let msg = ToIntegrationMessage::AlarmCommand {
            entity_id: entity_id.clone(),
            command,
            code,
            respond_to,
        };
        self.send_command(msg)?;

        response
            .await
            .map_err(|_| CommandError::NoResponse(entity_id))
    }

    /// Run the engine's main event loop
    ///
    /// Processes incoming events from integrations and updates state.
    pub async fn run(&self) -> Result<(), Box<dyn Error + Send>> {
        info!("Engine starting");

        let mut rx = self.message_rx.lock().await;
        while let Some(msg) = rx.recv().await {
            self.handle_event(msg);
        }

        info!("Engine shutting down");
        Ok(())
    }

    /// Shut down all integrations
    ///
    /// Closing the command channels lets each integration task leave its
    /// command loop and run `Integration::shutdown`. Tasks that do not finish
    /// within `grace` are aborted.
    pub async fn shutdown(&self, grace: Duration) {
        if let Ok(mut channels) = self.integration_channels.lock() {
            channels.clear();
        }

        let handles: Vec<JoinHandle<()>> = match self.integration_handles.lock() {
            Ok(mut handles) => handles.drain(..).collect(),
            Err(_) => return,
        };

        for mut handle in handles {
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                warn!("Integration task did not stop within {:?}, aborting", grace);
                handle.abort();
            }
        }
    }

    /// Get a snapshot of the current engine state.
    ///
    /// Clones the `Arc` (atomic refcount bump), essentially free.
    pub fn state_snapshot(&self) -> Arc<State> {
        self.state.load_full()
    }

    /// Handle an event from an integration
    fn handle_event(&self, msg: FromIntegrationMessage) {
        match msg {
            FromIntegrationMessage::EntityDiscovered {
                entity_id,
                integration_name,
            } => {
                info!(
                    "Entity discovered: {} (from {})",
                    entity_id, integration_name
                );

                // Record which integration owns this entity for command routing.
                // State is not populated until the first state-change message arrives.
                if let Ok(mut map) = self.entity_integration_map.lock() {
                    if let Some(previous) = map.get(&entity_id) {
                        if *previous != integration_name {
                            warn!(
                                "Entity {} moved from integration {} to {}",
                                entity_id, previous, integration_name
                            );
                        }
                    }
                    map.insert(entity_id, integration_name);
                }
            }
            FromIntegrationMessage::AlarmPanelStateChanged { entity_id, state } => {
                debug!(
                    "Alarm panel state changed: {} -> {:?}",
                    entity_id, state.state
                );

                self.state.rcu(|current| {
                    let mut snapshot = State::clone(current);
                    snapshot
                        .alarm_panels
                        .insert(entity_id.clone(), state.clone());
                    snapshot
                });
            }
            FromIntegrationMessage::BinarySensorStateChanged { entity_id, state } => {
                debug!("Binary sensor state changed: {} -> on={}", entity_id, state.on);

                self.state.rcu(|current| {
                    let mut snapshot = State::clone(current);
                    snapshot
                        .binary_sensors
                        .insert(entity_id.clone(), state.clone());
                    snapshot
                });
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
