//! In-app campaign decisioning — decides, when a trigger event fires on the
//! device, whether a campaign shows something, which item it shows, and how
//! campaign state moves afterward.

pub mod assets;
pub mod campaign;
pub mod catalog;
pub mod clock;
pub mod conversation;
pub mod definition;
pub mod eligibility;
pub mod message;
pub mod rotation;
pub mod state;
pub mod status;

pub use assets::{AssetOracle, FsAssetOracle, MemoryAssetOracle};
pub use campaign::{Campaign, CampaignContent, ContentItem, ContentRef};
pub use catalog::{
    definitions_from_document, CampaignCatalog, CampaignSummary, Diagnostics, LoadReport,
    Selection, TriggerOutcome,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use conversation::Conversation;
pub use definition::DefinitionError;
pub use eligibility::{EligibilityWindow, SkipReason};
pub use message::{Message, MessageFormat, Orientation};
pub use state::{CampaignState, JsonFileStorage, MemoryStorage, StateStorage};
pub use status::CampaignStatus;
