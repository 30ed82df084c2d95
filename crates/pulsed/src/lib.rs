pub mod api;
pub mod config;
mod engine;
mod integrations;

pub use config::Config;
pub use config::LogLevel;
pub use engine::AlarmCommand;
pub use engine::AlarmPanelState;
pub use engine::AlarmState;
pub use engine::BinarySensorState;
pub use engine::CommandError;
pub use engine::Engine;
pub use engine::State;
