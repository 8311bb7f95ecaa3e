use serde::{Deserialize, Serialize};

/// Lifecycle stage of a campaign. Ordered: a campaign only ever moves
/// forward through these, except via an explicit reset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    #[default]
    Unseen,
    Seen,
    Deleted,
}

impl CampaignStatus {
    /// Lenient parse of a persisted value. Case-insensitive; anything
    /// unrecognized is `Unseen`.
    pub fn from_persisted(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "seen" => Self::Seen,
            "deleted" => Self::Deleted,
            _ => Self::Unseen,
        }
    }

    pub fn as_persisted(&self) -> &'static str {
        match self {
            Self::Unseen => "Unseen",
            Self::Seen => "Seen",
            Self::Deleted => "Deleted",
        }
    }

    /// Move forward to `target`, never backward.
    pub fn advance_to(self, target: Self) -> Self {
        self.max(target)
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_persisted())
    }
}
