//! Conversations — multi-page content trees handed to the renderer as-is.
//!
//! The engine only looks inside the tree to find which images it needs.

use serde::Serialize;
use serde_json::Value;

use crate::campaign::ContentItem;
use crate::definition::DefinitionError;

const IMAGE_BLOCK: &str = "image";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub id: String,
    manifest: Vec<String>,
    /// The full `pages` array, untouched.
    tree: Value,
}

impl Conversation {
    pub fn from_pages(id: impl Into<String>, pages: Value) -> Result<Self, DefinitionError> {
        let manifest = extract_image_assets(&pages)?;
        Ok(Self {
            id: id.into(),
            manifest,
            tree: pages,
        })
    }

    pub fn tree(&self) -> &Value {
        &self.tree
    }

    pub fn page_count(&self) -> usize {
        self.tree.as_array().map_or(0, Vec::len)
    }
}

impl ContentItem for Conversation {
    const KIND: &'static str = "conversations";

    fn item_id(&self) -> &str {
        &self.id
    }

    fn manifest(&self) -> &[String] {
        &self.manifest
    }
}

/// Walk `pages[*].content[*]` and collect the `value` of every image block,
/// in encounter order, without duplicates. A page without `content` has no
/// blocks.
pub fn extract_image_assets(pages: &Value) -> Result<Vec<String>, DefinitionError> {
    let pages = pages.as_array().ok_or(DefinitionError::PagesNotArray)?;
    let mut manifest: Vec<String> = Vec::new();

    for (page_index, page) in pages.iter().enumerate() {
        let page = page
            .as_object()
            .ok_or(DefinitionError::MalformedPage { page: page_index })?;
        let blocks = match page.get("content") {
            None | Some(Value::Null) => continue,
            Some(Value::Array(blocks)) => blocks,
            Some(_) => return Err(DefinitionError::MalformedPage { page: page_index }),
        };

        for (block_index, block) in blocks.iter().enumerate() {
            if block.get("type").and_then(Value::as_str) != Some(IMAGE_BLOCK) {
                continue;
            }
            let asset = block.get("value").and_then(Value::as_str).ok_or(
                DefinitionError::ImageWithoutValue {
                    page: page_index,
                    block: block_index,
                },
            )?;
            if !manifest.iter().any(|m| m == asset) {
                manifest.push(asset.to_string());
            }
        }
    }

    Ok(manifest)
}
