pub mod config;
pub mod error;
pub mod event_bus;

pub use config::{AppConfig, InAppConfig};
pub use error::{CampaignError, CampaignResult};
