use serde::{Deserialize, Serialize};

use crate::campaign::ContentItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
    #[default]
    Any,
}

impl Orientation {
    /// `Any` on either side matches everything.
    pub fn matches(self, other: Orientation) -> bool {
        self == Orientation::Any || other == Orientation::Any || self == other
    }
}

/// One way of rendering a message, e.g. a portrait modal or a landscape banner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFormat {
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub assets: Vec<String>,
}

impl MessageFormat {
    fn asset_ids(&self) -> impl Iterator<Item = &str> {
        self.image.iter().chain(self.assets.iter()).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: String,
    pub formats: Vec<MessageFormat>,
    manifest: Vec<String>,
}

impl Message {
    /// Returns `None` for a message with no formats; it could never be rendered.
    pub fn new(id: impl Into<String>, formats: Vec<MessageFormat>) -> Option<Self> {
        if formats.is_empty() {
            return None;
        }
        let mut manifest: Vec<String> = Vec::new();
        for asset in formats.iter().flat_map(MessageFormat::asset_ids) {
            if !manifest.iter().any(|m| m == asset) {
                manifest.push(asset.to_string());
            }
        }
        Some(Self {
            id: id.into(),
            formats,
            manifest,
        })
    }

    /// First format usable in `orientation`.
    pub fn format_for(&self, orientation: Orientation) -> Option<&MessageFormat> {
        self.formats
            .iter()
            .find(|f| f.orientation.matches(orientation))
    }
}

impl ContentItem for Message {
    const KIND: &'static str = "messages";

    fn item_id(&self) -> &str {
        &self.id
    }

    fn manifest(&self) -> &[String] {
        &self.manifest
    }

    fn supports(&self, orientation: Orientation) -> bool {
        self.format_for(orientation).is_some()
    }
}
