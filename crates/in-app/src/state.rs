//! Campaign state persistence.
//!
//! On disk the state is a flat string map keyed `"<Field><campaignId>"`
//! (`Next7`, `Impressions7`, `Status7`, `ThrottleUntil7`). It is decoded into
//! typed [`CampaignState`] records as soon as it is read and re-encoded on
//! every write; nothing else in the engine touches the raw map.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use campaign_core::{CampaignError, CampaignResult};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::status::CampaignStatus;

const NEXT: &str = "Next";
const IMPRESSIONS: &str = "Impressions";
const STATUS: &str = "Status";
const THROTTLE_UNTIL: &str = "ThrottleUntil";

pub type StateMap = BTreeMap<String, String>;

/// Mutable per-campaign fields. Lives outside the immutable campaign
/// definitions so it survives catalog reloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CampaignState {
    pub status: CampaignStatus,
    pub impressions: u64,
    /// Index of the next item to offer in sequential mode.
    pub cursor: usize,
    pub throttle_until: Option<DateTime<Utc>>,
}

impl CampaignState {
    /// Whether the redisplay delay has elapsed at `now`.
    pub fn throttle_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.throttle_until.map_or(true, |until| now >= until)
    }

    /// Apply a display acknowledgment. `sequential_len` is the number of
    /// rotating items when the campaign is in sequential mode, `None` in
    /// random mode.
    pub fn record_display(
        &mut self,
        now: DateTime<Utc>,
        redisplay_delay: Duration,
        sequential_len: Option<usize>,
    ) {
        self.status = self.status.advance_to(CampaignStatus::Seen);
        self.impressions = self.impressions.saturating_add(1);

        let until = now
            .checked_add_signed(redisplay_delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.throttle_until = Some(match self.throttle_until {
            Some(previous) if previous > until => previous,
            _ => until,
        });

        if let Some(len) = sequential_len.filter(|len| *len > 0) {
            self.cursor = (self.cursor + 1) % len;
        }
    }

    /// Pull the cursor back to 0 if the item sequence shrank below it.
    pub fn clamp_cursor(&mut self, len: usize) {
        if self.cursor >= len {
            self.cursor = 0;
        }
    }

    fn write_into(&self, id: i64, map: &mut StateMap) {
        map.insert(format!("{NEXT}{id}"), self.cursor.to_string());
        map.insert(format!("{IMPRESSIONS}{id}"), self.impressions.to_string());
        map.insert(format!("{STATUS}{id}"), self.status.as_persisted().to_string());
        if let Some(until) = self.throttle_until {
            map.insert(
                format!("{THROTTLE_UNTIL}{id}"),
                until.timestamp_millis().to_string(),
            );
        }
    }
}

/// Decode the wire map into typed records. Unparseable values fall back to
/// defaults; keys that don't name a known field are ignored.
pub fn decode(map: &StateMap) -> HashMap<i64, CampaignState> {
    let mut states: HashMap<i64, CampaignState> = HashMap::new();

    for (key, value) in map {
        let Some((field, id)) = split_key(key) else {
            debug!(key = %key, "ignoring unrecognized state key");
            continue;
        };
        let state = states.entry(id).or_default();
        match field {
            NEXT => state.cursor = value.trim().parse().unwrap_or(0),
            IMPRESSIONS => state.impressions = value.trim().parse().unwrap_or(0),
            STATUS => state.status = CampaignStatus::from_persisted(value),
            THROTTLE_UNTIL => {
                state.throttle_until = value
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(DateTime::from_timestamp_millis);
            }
            _ => {}
        }
    }

    states
}

pub fn encode<'a>(states: impl IntoIterator<Item = (i64, &'a CampaignState)>) -> StateMap {
    let mut map = StateMap::new();
    for (id, state) in states {
        state.write_into(id, &mut map);
    }
    map
}

fn split_key(key: &str) -> Option<(&'static str, i64)> {
    [THROTTLE_UNTIL, IMPRESSIONS, STATUS, NEXT]
        .into_iter()
        .find_map(|field| {
            key.strip_prefix(field)
                .and_then(|rest| rest.parse::<i64>().ok())
                .map(|id| (field, id))
        })
}

/// Where the wire map lives between sessions.
pub trait StateStorage: Send + Sync {
    fn load(&self) -> CampaignResult<StateMap>;
    fn save(&self, map: &StateMap) -> CampaignResult<()>;

    /// Move unreadable contents out of the way so the next save can't
    /// overwrite them.
    fn quarantine(&self) -> CampaignResult<()> {
        Ok(())
    }
}

/// JSON object on disk. A missing file reads as an empty map.
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StateStorage for JsonFileStorage {
    fn load(&self) -> CampaignResult<StateMap> {
        if !self.path.exists() {
            return Ok(StateMap::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(StateMap::new());
        }
        let map: StateMap = serde_json::from_str(&raw).map_err(|e| {
            CampaignError::StateStore(format!("{}: {e}", self.path.display()))
        })?;
        Ok(map)
    }

    fn save(&self, map: &StateMap) -> CampaignResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        // Write-then-rename so a crash never leaves a truncated file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(map)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Renames the file to `<name>.corrupt`, replacing any earlier copy.
    fn quarantine(&self) -> CampaignResult<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let mut aside = self.path.clone().into_os_string();
        aside.push(".corrupt");
        let aside = PathBuf::from(aside);
        std::fs::rename(&self.path, &aside)?;
        warn!(path = %aside.display(), "Unreadable campaign state set aside");
        Ok(())
    }
}

/// Keeps the map in memory. Used by tests and by hosts that persist the
/// map through their own key-value store.
#[derive(Default)]
pub struct MemoryStorage {
    map: Mutex<StateMap>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_map(map: StateMap) -> Self {
        Self {
            map: Mutex::new(map),
        }
    }

    pub fn snapshot(&self) -> StateMap {
        self.map.lock().clone()
    }
}

impl StateStorage for MemoryStorage {
    fn load(&self) -> CampaignResult<StateMap> {
        Ok(self.map.lock().clone())
    }

    fn save(&self, map: &StateMap) -> CampaignResult<()> {
        *self.map.lock() = map.clone();
        Ok(())
    }
}
