#[cfg(feature = "integration_adtpulse")]
pub mod adtpulse;
