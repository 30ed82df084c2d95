mod alarm_control_panel;
mod binary_sensor;
mod bridge;
mod client;
mod config;
// Private module - allowed by clippy.toml allow-private-module-inception
#[allow(clippy::module_inception)]
mod adtpulse;

pub use adtpulse::AdtPulseIntegration;
use anyhow::Context;
pub use bridge::BridgeClient;
pub use config::Config as AdtPulseConfig;
use linkme::distributed_slice;

use crate::engine;

pub const ADTPULSE_DATA_ATTRIBUTION: &str = "Data provided by ADT Pulse";

#[distributed_slice(engine::INTEGRATION_REGISTRY)]
fn init_adtpulse(ctx: &engine::IntegrationContext) -> engine::IntegrationFactoryResult {
    let adtpulse_config = match &ctx.config.integrations.adtpulse {
        Some(c) if c.enabled => c,
        Some(_) => {
            tracing::info!("ADT Pulse integration is disabled, skipping");
            return Ok(None);
        }
        None => return Ok(None),
    };

    let client =
        BridgeClient::new(adtpulse_config).context("Failed to create ADT Pulse bridge client")?;
    Ok(Some(Box::new(AdtPulseIntegration::new(client))))
}
