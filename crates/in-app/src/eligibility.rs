//! Eligibility: may this campaign show anything for this trigger, now?

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::campaign::Campaign;
use crate::state::CampaignState;
use crate::status::CampaignStatus;

/// Why a candidate campaign produced nothing. The `Display` text is what
/// ends up in the diagnostics map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    NoContent { kind: &'static str },
    Deleted,
    NotTriggered { trigger: String },
    OutsideWindow,
    Throttled { until: DateTime<Utc> },
    NotDownloaded,
    NoFormatForOrientation,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoContent { kind } => write!(f, "no {kind} in campaign"),
            Self::Deleted => f.write_str("campaign was deleted"),
            Self::NotTriggered { trigger } => write!(f, "not triggered by {trigger}"),
            Self::OutsideWindow => f.write_str("outside eligibility window"),
            Self::Throttled { until } => write!(f, "throttled until {}", until.to_rfc3339()),
            Self::NotDownloaded => f.write_str("hasn't finished downloading"),
            Self::NoFormatForOrientation => f.write_str("no format for orientation"),
        }
    }
}

/// Half-open `[start, end)` window. A missing bound is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EligibilityWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl EligibilityWindow {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| now >= start) && self.end.map_or(true, |end| now < end)
    }
}

/// Ordered, short-circuiting checks: status, trigger, window, throttle.
pub fn check(
    campaign: &Campaign,
    state: &CampaignState,
    trigger: &str,
    now: DateTime<Utc>,
) -> Result<(), SkipReason> {
    if state.status == CampaignStatus::Deleted {
        return Err(SkipReason::Deleted);
    }
    if !campaign.triggers.contains(trigger) {
        return Err(SkipReason::NotTriggered {
            trigger: trigger.to_string(),
        });
    }
    if !campaign.window.contains(now) {
        return Err(SkipReason::OutsideWindow);
    }
    if let Some(until) = state.throttle_until.filter(|until| now < *until) {
        return Err(SkipReason::Throttled { until });
    }
    Ok(())
}
