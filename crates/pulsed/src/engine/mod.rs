pub mod alarm_control_panel;
pub mod binary_sensor;
mod coordinator;
#[allow(clippy::module_inception)]
mod engine;
mod entity;
mod integration;
mod message;
pub mod state;

pub use alarm_control_panel::AlarmCommand;
pub use alarm_control_panel::AlarmPanelFeatures;
pub use alarm_control_panel::AlarmState;
pub use binary_sensor::BinarySensorDeviceClass;
pub use coordinator::CoordinatorListener;
pub use coordinator::DataUpdateCoordinator;
pub use engine::CommandError;
pub use engine::Engine;
pub use entity::Entity;
pub use entity::EntityIdRegistry;
pub use entity::slugify;
pub use entity::suggest_entity_id;
pub use integration::FromIntegrationSender;
pub use integration::Integration;
pub use integration::IntegrationContext;
pub use integration::IntegrationFactoryResult;
pub use integration::REGISTRY as INTEGRATION_REGISTRY;
pub use message::FromIntegrationMessage;
pub use message::ToIntegrationMessage;
pub use state::AlarmPanelState;
pub use state::BinarySensorState;
pub use state::State;
