//! Campaign catalog — the entry point when a trigger event fires.
//!
//! Definitions are held in an immutable [`CatalogSnapshot`] that is swapped
//! wholesale on reload. Per-campaign state lives next to it, keyed by
//! campaign id, so it carries across snapshots.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use campaign_core::event_bus::{make_event, noop_sink, DiagnosticKind, DiagnosticsSink};
use campaign_core::{CampaignError, CampaignResult};
use chrono::Duration;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::assets::{AssetLocator, AssetOracle, FsAssetOracle};
use crate::campaign::{Campaign, ContentRef};
use crate::clock::{Clock, SystemClock};
use crate::definition::{self, DefinitionError};
use crate::message::Orientation;
use crate::state::{self, CampaignState, StateStorage};
use crate::status::CampaignStatus;

/// Campaign id → human-readable reason, for every candidate that produced
/// nothing during one evaluation pass.
pub type Diagnostics = BTreeMap<i64, String>;

/// Immutable set of loaded campaigns, indexed by trigger.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    campaigns: Vec<Arc<Campaign>>,
    by_id: HashMap<i64, usize>,
    /// Indices into `campaigns`, highest priority first, ties in load order.
    by_trigger: HashMap<String, Vec<usize>>,
}

impl CatalogSnapshot {
    fn new(campaigns: Vec<Campaign>) -> Self {
        let campaigns: Vec<Arc<Campaign>> = campaigns.into_iter().map(Arc::new).collect();
        let by_id = campaigns
            .iter()
            .enumerate()
            .map(|(index, c)| (c.id, index))
            .collect();

        let mut by_trigger: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, campaign) in campaigns.iter().enumerate() {
            for trigger in &campaign.triggers {
                by_trigger.entry(trigger.clone()).or_default().push(index);
            }
        }
        for indices in by_trigger.values_mut() {
            // Stable sort keeps load order among equal priorities.
            indices.sort_by_key(|&index| std::cmp::Reverse(campaigns[index].priority));
        }

        Self {
            campaigns,
            by_id,
            by_trigger,
        }
    }

    pub fn len(&self) -> usize {
        self.campaigns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.campaigns.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&Arc<Campaign>> {
        self.by_id.get(&id).map(|&index| &self.campaigns[index])
    }

    pub fn campaigns(&self) -> &[Arc<Campaign>] {
        &self.campaigns
    }

    /// Campaigns registered for `trigger`, in the order they are tried.
    pub fn candidates<'a>(&'a self, trigger: &str) -> impl Iterator<Item = &'a Arc<Campaign>> {
        self.by_trigger
            .get(trigger)
            .into_iter()
            .flatten()
            .map(move |&index| &self.campaigns[index])
    }
}

/// Content chosen for a trigger. Hand it to the renderer, then call
/// [`CampaignCatalog::acknowledge_display`] once it is actually on screen.
#[derive(Debug, Clone)]
pub struct Selection {
    pub campaign: Arc<Campaign>,
    pub index: usize,
    pub trigger: String,
}

impl Selection {
    pub fn campaign_id(&self) -> i64 {
        self.campaign.id
    }

    pub fn content(&self) -> Option<ContentRef<'_>> {
        self.campaign.item(self.index)
    }
}

#[derive(Debug, Clone)]
pub struct TriggerOutcome {
    pub selection: Option<Selection>,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedDefinition {
    /// Position in the input list.
    pub index: usize,
    pub campaign_id: Option<i64>,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub loaded: Vec<i64>,
    pub rejected: Vec<RejectedDefinition>,
}

/// Read-only view of one campaign for hosts and tooling.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignSummary {
    pub id: i64,
    pub kind: &'static str,
    pub items: usize,
    pub random_order: bool,
    pub priority: i32,
    pub assets_downloaded: bool,
    pub state: CampaignState,
}

pub struct CampaignCatalog {
    snapshot: RwLock<Arc<CatalogSnapshot>>,
    states: DashMap<i64, CampaignState>,
    storage: Arc<dyn StateStorage>,
    oracle: Arc<dyn AssetOracle>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn DiagnosticsSink>,
    storage_root: PathBuf,
    default_delay: Duration,
    rng: Mutex<StdRng>,
    /// Serializes encode+save so the newest state always lands last.
    persist_lock: Mutex<()>,
}

impl std::fmt::Debug for CampaignCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampaignCatalog")
            .field("campaigns", &self.snapshot.read().len())
            .field("states", &self.states.len())
            .field("storage_root", &self.storage_root)
            .finish()
    }
}

impl CampaignCatalog {
    /// Creates an empty catalog and seeds campaign state from `storage`.
    /// An unreadable store starts empty rather than failing.
    pub fn new(storage: Arc<dyn StateStorage>, storage_root: impl Into<PathBuf>) -> Self {
        let persisted = storage.load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read campaign state, starting fresh");
            if let Err(e) = storage.quarantine() {
                warn!(error = %e, "Failed to set aside unreadable campaign state");
            }
            Default::default()
        });
        let states: DashMap<i64, CampaignState> = state::decode(&persisted).into_iter().collect();
        info!(campaigns = states.len(), "Campaign state loaded");

        Self {
            snapshot: RwLock::new(Arc::new(CatalogSnapshot::default())),
            states,
            storage,
            oracle: Arc::new(FsAssetOracle),
            clock: Arc::new(SystemClock),
            sink: noop_sink(),
            storage_root: storage_root.into(),
            default_delay: Duration::zero(),
            rng: Mutex::new(StdRng::from_entropy()),
            persist_lock: Mutex::new(()),
        }
    }

    pub fn with_asset_oracle(mut self, oracle: Arc<dyn AssetOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach a sink for per-decision diagnostics.
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Redisplay delay for definitions that don't specify one.
    pub fn with_default_redisplay_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Fixed RNG seed, for reproducible random-mode selection.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.snapshot.read().clone()
    }

    fn locator(&self) -> AssetLocator<'_> {
        AssetLocator {
            oracle: self.oracle.as_ref(),
            storage_root: &self.storage_root,
        }
    }

    /// Parse `definitions`, merge with existing state by campaign id and
    /// publish the result. Bad definitions are skipped and reported.
    ///
    /// State of campaigns no longer present is dropped, except for ids whose
    /// definition was rejected this time around.
    pub fn load(&self, definitions: &[Value]) -> LoadReport {
        let mut report = LoadReport::default();
        let mut campaigns = Vec::with_capacity(definitions.len());
        let mut seen: HashSet<i64> = HashSet::new();
        let mut keep: HashSet<i64> = HashSet::new();

        for (index, raw) in definitions.iter().enumerate() {
            let parsed = definition::parse_campaign(raw, self.default_delay).and_then(|c| {
                if seen.insert(c.id) {
                    Ok(c)
                } else {
                    Err(DefinitionError::DuplicateId(c.id))
                }
            });
            match parsed {
                Ok(campaign) => {
                    report.loaded.push(campaign.id);
                    keep.insert(campaign.id);
                    campaigns.push(campaign);
                }
                Err(error) => {
                    let campaign_id = definition::peek_id(raw);
                    if let Some(id) = campaign_id {
                        keep.insert(id);
                    }
                    warn!(index, campaign_id = ?campaign_id, error = %error, "Rejected campaign definition");
                    metrics::counter!("inapp.definitions_rejected").increment(1);
                    self.sink.record(make_event(
                        DiagnosticKind::Rejected,
                        campaign_id,
                        None,
                        error.to_string(),
                    ));
                    report.rejected.push(RejectedDefinition {
                        index,
                        campaign_id,
                        error: error.to_string(),
                    });
                }
            }
        }

        let snapshot = Arc::new(CatalogSnapshot::new(campaigns));
        *self.snapshot.write() = snapshot.clone();

        // Clamp after the swap; acknowledgments clamp against whichever
        // snapshot is current.
        self.states.retain(|id, _| keep.contains(id));
        for campaign in snapshot.campaigns() {
            let mut state = self.states.entry(campaign.id).or_default();
            state.clamp_cursor(campaign.len());
        }

        self.persist();

        info!(
            loaded = report.loaded.len(),
            rejected = report.rejected.len(),
            "Campaign catalog loaded"
        );
        report
    }

    /// Replace the current definitions. Same semantics as [`Self::load`];
    /// state carries over by campaign id.
    pub fn reload(&self, definitions: &[Value]) -> LoadReport {
        self.load(definitions)
    }

    /// Evaluate `trigger` for any orientation.
    pub fn on_trigger(&self, trigger: &str) -> TriggerOutcome {
        self.on_trigger_for(trigger, Orientation::Any)
    }

    /// Try each campaign registered for `trigger`, highest priority first,
    /// and return the first content that can be shown now.
    pub fn on_trigger_for(&self, trigger: &str, orientation: Orientation) -> TriggerOutcome {
        metrics::counter!("inapp.triggers").increment(1);
        let snapshot = self.snapshot();
        let now = self.clock.now();
        let locator = self.locator();
        let mut diagnostics = Diagnostics::new();

        for campaign in snapshot.candidates(trigger) {
            let state = self.state(campaign.id).unwrap_or_default();
            let picked = {
                let mut rng = self.rng.lock();
                campaign.select(&state, trigger, now, &locator, orientation, &mut *rng)
            };

            match picked {
                Ok(index) => {
                    let item_id = campaign
                        .item(index)
                        .map(|item| item.item_id().to_string())
                        .unwrap_or_default();
                    debug!(campaign_id = campaign.id, item_id = %item_id, trigger, "Selected in-app content");
                    metrics::counter!("inapp.selections").increment(1);
                    self.sink.record(make_event(
                        DiagnosticKind::Selected,
                        Some(campaign.id),
                        Some(trigger),
                        format!("{} {}", campaign.kind(), item_id),
                    ));
                    return TriggerOutcome {
                        selection: Some(Selection {
                            campaign: campaign.clone(),
                            index,
                            trigger: trigger.to_string(),
                        }),
                        diagnostics,
                    };
                }
                Err(reason) => {
                    let reason = reason.to_string();
                    debug!(campaign_id = campaign.id, trigger, reason = %reason, "Campaign skipped");
                    self.sink.record(make_event(
                        DiagnosticKind::Skipped,
                        Some(campaign.id),
                        Some(trigger),
                        reason.clone(),
                    ));
                    diagnostics.insert(campaign.id, reason);
                }
            }
        }

        metrics::counter!("inapp.misses").increment(1);
        TriggerOutcome {
            selection: None,
            diagnostics,
        }
    }

    /// Record that content from `campaign_id` was presented. Call at most
    /// once per presentation, after a successful selection.
    pub fn acknowledge_display(&self, campaign_id: i64) {
        let Some(campaign) = self.snapshot().get(campaign_id).cloned() else {
            warn!(campaign_id, "Display acknowledged for unknown campaign");
            return;
        };
        let now = self.clock.now();

        let updated = {
            let mut state = self.states.entry(campaign_id).or_default();
            state.record_display(now, campaign.redisplay_delay, campaign.rotation_len());
            if let Some(current) = self.snapshot.read().get(campaign_id) {
                state.clamp_cursor(current.len());
            }
            *state
        };

        info!(
            campaign_id,
            impressions = updated.impressions,
            cursor = updated.cursor,
            "In-app content displayed"
        );
        metrics::counter!("inapp.impressions").increment(1);
        self.sink.record(make_event(
            DiagnosticKind::Displayed,
            Some(campaign_id),
            None,
            format!("impression {}", updated.impressions),
        ));
        self.persist();
    }

    /// Move a campaign to `Deleted`; it will never be selected again unless
    /// reset.
    pub fn mark_deleted(&self, campaign_id: i64) -> CampaignResult<()> {
        self.require_known(campaign_id)?;
        {
            let mut state = self.states.entry(campaign_id).or_default();
            state.status = state.status.advance_to(CampaignStatus::Deleted);
        }
        info!(campaign_id, "Campaign deleted");
        self.sink.record(make_event(
            DiagnosticKind::Deleted,
            Some(campaign_id),
            None,
            "deleted by host",
        ));
        self.persist();
        Ok(())
    }

    /// Explicit external reset: status, impressions, cursor and throttle go
    /// back to defaults.
    pub fn reset_campaign(&self, campaign_id: i64) -> CampaignResult<()> {
        self.require_known(campaign_id)?;
        self.states.insert(campaign_id, CampaignState::default());
        info!(campaign_id, "Campaign state reset");
        self.sink.record(make_event(
            DiagnosticKind::Reset,
            Some(campaign_id),
            None,
            "state reset",
        ));
        self.persist();
        Ok(())
    }

    pub fn state(&self, campaign_id: i64) -> Option<CampaignState> {
        self.states.get(&campaign_id).map(|s| *s)
    }

    /// Whether every item of the campaign has its assets on disk. `None` for
    /// an unknown campaign.
    pub fn assets_ready(&self, campaign_id: i64) -> Option<bool> {
        let campaign = self.snapshot().get(campaign_id).cloned()?;
        Some(campaign.assets_downloaded(&self.locator()))
    }

    /// Asset ids referenced by any live campaign that are not on disk yet,
    /// in catalog order, without duplicates. Deleted campaigns are skipped.
    pub fn missing_assets(&self) -> Vec<String> {
        let snapshot = self.snapshot();
        let locator = self.locator();
        let mut missing: Vec<String> = Vec::new();

        for campaign in snapshot.campaigns() {
            if self
                .state(campaign.id)
                .is_some_and(|s| s.status == CampaignStatus::Deleted)
            {
                continue;
            }
            for asset in locator.missing(&campaign.manifest()) {
                if !missing.iter().any(|m| m == asset) {
                    missing.push(asset.to_string());
                }
            }
        }
        missing
    }

    pub fn summaries(&self) -> Vec<CampaignSummary> {
        let snapshot = self.snapshot();
        let locator = self.locator();
        snapshot
            .campaigns()
            .iter()
            .map(|campaign| CampaignSummary {
                id: campaign.id,
                kind: campaign.kind(),
                items: campaign.len(),
                random_order: campaign.random_order,
                priority: campaign.priority,
                assets_downloaded: campaign.assets_downloaded(&locator),
                state: self.state(campaign.id).unwrap_or_default(),
            })
            .collect()
    }

    fn require_known(&self, campaign_id: i64) -> CampaignResult<()> {
        if self.snapshot().get(campaign_id).is_some() {
            Ok(())
        } else {
            Err(CampaignError::UnknownCampaign(campaign_id))
        }
    }

    /// Write every campaign's state back to storage. Failures are logged,
    /// never surfaced to the trigger path.
    fn persist(&self) {
        let _guard = self.persist_lock.lock();
        let snapshot: Vec<(i64, CampaignState)> =
            self.states.iter().map(|e| (*e.key(), *e.value())).collect();
        let map = state::encode(snapshot.iter().map(|(id, s)| (*id, s)));
        if let Err(e) = self.storage.save(&map) {
            warn!(error = %e, "Failed to persist campaign state");
        }
    }
}

/// Accepts either a bare array of definitions or `{ "campaigns": [...] }`.
pub fn definitions_from_document(document: Value) -> CampaignResult<Vec<Value>> {
    match document {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("campaigns") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(CampaignError::Definition(
                "expected a `campaigns` array".to_string(),
            )),
        },
        _ => Err(CampaignError::Definition(
            "expected an array of campaign definitions".to_string(),
        )),
    }
}
