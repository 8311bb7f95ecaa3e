use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::assets::AssetLocator;
use crate::conversation::Conversation;
use crate::eligibility::{self, EligibilityWindow, SkipReason};
use crate::message::{Message, Orientation};
use crate::rotation;
use crate::state::CampaignState;

/// Capability shared by everything a campaign can show.
pub trait ContentItem {
    /// Plural noun used in diagnostics ("no messages in campaign").
    const KIND: &'static str;

    fn item_id(&self) -> &str;

    /// Asset ids that must be on disk before this item is displayable.
    fn manifest(&self) -> &[String];

    fn supports(&self, _orientation: Orientation) -> bool {
        true
    }

    /// Evaluated live on every call.
    fn is_downloaded(&self, assets: &AssetLocator<'_>) -> bool {
        assets.all_present(self.manifest())
    }
}

#[derive(Debug, Clone)]
pub enum CampaignContent {
    Messages(Vec<Message>),
    Conversations(Vec<Conversation>),
}

/// Borrowed view of one selectable item.
#[derive(Debug, Clone, Copy)]
pub enum ContentRef<'a> {
    Message(&'a Message),
    Conversation(&'a Conversation),
}

impl<'a> ContentRef<'a> {
    pub fn item_id(&self) -> &'a str {
        match *self {
            Self::Message(m) => m.item_id(),
            Self::Conversation(c) => c.item_id(),
        }
    }

    pub fn manifest(&self) -> &'a [String] {
        match *self {
            Self::Message(m) => m.manifest(),
            Self::Conversation(c) => c.manifest(),
        }
    }
}

/// Immutable campaign definition. Mutable fields (status, impressions,
/// cursor, throttle) live in [`CampaignState`], owned by the catalog.
#[derive(Debug, Clone)]
pub struct Campaign {
    pub id: i64,
    pub triggers: HashSet<String>,
    pub window: EligibilityWindow,
    pub redisplay_delay: Duration,
    pub random_order: bool,
    pub priority: i32,
    pub content: CampaignContent,
}

impl Campaign {
    pub fn kind(&self) -> &'static str {
        match &self.content {
            CampaignContent::Messages(_) => Message::KIND,
            CampaignContent::Conversations(_) => Conversation::KIND,
        }
    }

    pub fn len(&self) -> usize {
        match &self.content {
            CampaignContent::Messages(items) => items.len(),
            CampaignContent::Conversations(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of items the cursor rotates over, or `None` in random mode.
    pub fn rotation_len(&self) -> Option<usize> {
        (!self.random_order).then(|| self.len())
    }

    pub fn item(&self, index: usize) -> Option<ContentRef<'_>> {
        match &self.content {
            CampaignContent::Messages(items) => items.get(index).map(ContentRef::Message),
            CampaignContent::Conversations(items) => {
                items.get(index).map(ContentRef::Conversation)
            }
        }
    }

    pub fn items(&self) -> impl Iterator<Item = ContentRef<'_>> {
        (0..self.len()).filter_map(move |index| self.item(index))
    }

    /// Choose the index of the item to show for `trigger`, or say why not.
    pub fn select<R: Rng + ?Sized>(
        &self,
        state: &CampaignState,
        trigger: &str,
        now: DateTime<Utc>,
        assets: &AssetLocator<'_>,
        orientation: Orientation,
        rng: &mut R,
    ) -> Result<usize, SkipReason> {
        match &self.content {
            CampaignContent::Messages(items) => {
                self.select_from(items, state, trigger, now, assets, orientation, rng)
            }
            CampaignContent::Conversations(items) => {
                self.select_from(items, state, trigger, now, assets, orientation, rng)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn select_from<T: ContentItem, R: Rng + ?Sized>(
        &self,
        items: &[T],
        state: &CampaignState,
        trigger: &str,
        now: DateTime<Utc>,
        assets: &AssetLocator<'_>,
        orientation: Orientation,
        rng: &mut R,
    ) -> Result<usize, SkipReason> {
        if items.is_empty() {
            return Err(SkipReason::NoContent { kind: T::KIND });
        }
        eligibility::check(self, state, trigger, now)?;

        let ready = |item: &T| {
            if !item.supports(orientation) {
                Err(SkipReason::NoFormatForOrientation)
            } else if !item.is_downloaded(assets) {
                Err(SkipReason::NotDownloaded)
            } else {
                Ok(())
            }
        };
        rotation::pick(items, self.random_order, state.cursor, ready, rng)
    }

    /// True when every item's assets are on disk, regardless of rotation
    /// or eligibility.
    pub fn assets_downloaded(&self, assets: &AssetLocator<'_>) -> bool {
        match &self.content {
            CampaignContent::Messages(items) => items.iter().all(|m| m.is_downloaded(assets)),
            CampaignContent::Conversations(items) => {
                items.iter().all(|c| c.is_downloaded(assets))
            }
        }
    }

    /// Union of all item manifests, in item order, without duplicates.
    pub fn manifest(&self) -> Vec<&str> {
        let mut manifest: Vec<&str> = Vec::new();
        for item in self.items() {
            for asset in item.manifest() {
                if !manifest.contains(&asset.as_str()) {
                    manifest.push(asset);
                }
            }
        }
        manifest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssetOracle;
    use crate::message::MessageFormat;
    use crate::status::CampaignStatus;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;
    use std::path::PathBuf;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn message(id: &str, image: &str, orientation: Orientation) -> Message {
        Message::new(
            id,
            vec![MessageFormat {
                orientation,
                image: Some(image.to_string()),
                assets: vec![],
            }],
        )
        .unwrap()
    }

    fn messages_campaign(random_order: bool) -> Campaign {
        Campaign {
            id: 7,
            triggers: ["purchase".to_string()].into_iter().collect(),
            window: EligibilityWindow {
                start: Some(ts(0)),
                end: Some(ts(1_000)),
            },
            redisplay_delay: Duration::zero(),
            random_order,
            priority: 0,
            content: CampaignContent::Messages(vec![
                message("m0", "a.png", Orientation::Any),
                message("m1", "b.png", Orientation::Any),
                message("m2", "c.png", Orientation::Landscape),
            ]),
        }
    }

    #[test]
    fn test_empty_campaign_reports_no_content_before_eligibility() {
        let mut campaign = messages_campaign(false);
        campaign.content = CampaignContent::Messages(vec![]);
        let oracle = MemoryAssetOracle::new();
        let root = PathBuf::new();
        let locator = AssetLocator {
            oracle: &oracle,
            storage_root: &root,
        };
        let state = CampaignState {
            status: CampaignStatus::Deleted,
            ..CampaignState::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        let err = campaign
            .select(&state, "nope", ts(5_000), &locator, Orientation::Any, &mut rng)
            .unwrap_err();
        assert_eq!(err.to_string(), "no messages in campaign");
    }

    #[test]
    fn test_orientation_filter() {
        let campaign = messages_campaign(false);
        let oracle = MemoryAssetOracle::new();
        oracle.mark_present("c.png");
        let root = PathBuf::new();
        let locator = AssetLocator {
            oracle: &oracle,
            storage_root: &root,
        };
        let state = CampaignState {
            cursor: 2,
            ..CampaignState::default()
        };
        let mut rng = StdRng::seed_from_u64(0);

        assert_eq!(
            campaign.select(&state, "purchase", ts(10), &locator, Orientation::Portrait, &mut rng),
            Err(SkipReason::NoFormatForOrientation)
        );
        assert_eq!(
            campaign.select(&state, "purchase", ts(10), &locator, Orientation::Landscape, &mut rng),
            Ok(2)
        );
    }

    #[test]
    fn test_assets_downloaded_is_all_items() {
        let campaign = messages_campaign(true);
        let oracle = MemoryAssetOracle::new();
        let root = PathBuf::new();
        let locator = AssetLocator {
            oracle: &oracle,
            storage_root: &root,
        };
        oracle.mark_present("a.png");
        oracle.mark_present("b.png");
        assert!(!campaign.assets_downloaded(&locator));
        assert!(!campaign.assets_downloaded(&locator));

        oracle.mark_present("c.png");
        assert!(campaign.assets_downloaded(&locator));
        assert_eq!(campaign.manifest(), vec!["a.png", "b.png", "c.png"]);
    }

    #[test]
    fn test_conversation_campaign_selection() {
        let conversation = Conversation::from_pages(
            "7",
            json!([{ "content": [ { "type": "image", "value": "hello.png" } ] }]),
        )
        .unwrap();
        let mut campaign = messages_campaign(false);
        campaign.content = CampaignContent::Conversations(vec![conversation]);
        assert_eq!(campaign.kind(), "conversations");

        let oracle = MemoryAssetOracle::new();
        let root = PathBuf::new();
        let locator = AssetLocator {
            oracle: &oracle,
            storage_root: &root,
        };
        let state = CampaignState::default();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            campaign.select(&state, "purchase", ts(10), &locator, Orientation::Any, &mut rng),
            Err(SkipReason::NotDownloaded)
        );

        oracle.mark_present("hello.png");
        assert_eq!(
            campaign.select(&state, "purchase", ts(10), &locator, Orientation::Any, &mut rng),
            Ok(0)
        );
        assert_eq!(campaign.item(0).unwrap().item_id(), "7");
    }
}
