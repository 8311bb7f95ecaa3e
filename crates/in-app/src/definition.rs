//! Parsing raw campaign definitions into [`Campaign`]s.
//!
//! A definition that fails to parse is rejected on its own; the caller keeps
//! loading the rest.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::campaign::{Campaign, CampaignContent};
use crate::conversation::Conversation;
use crate::eligibility::EligibilityWindow;
use crate::message::{Message, MessageFormat};

#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("malformed campaign definition: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("campaign {0} has no content: expected `messages`, `pages` or `conversations`")]
    MissingContent(i64),

    #[error("campaign {0} declares more than one kind of content")]
    AmbiguousContent(i64),

    #[error("campaign {id}: invalid timestamp `{value}` for `{field}`")]
    InvalidTimestamp {
        id: i64,
        field: &'static str,
        value: String,
    },

    #[error("campaign {0}: throttle delay must not be negative")]
    NegativeThrottle(i64),

    #[error("campaign {id}: throttle delay of {secs}s is out of range")]
    ThrottleOutOfRange { id: i64, secs: i64 },

    #[error("duplicate campaign id {0}")]
    DuplicateId(i64),

    #[error("`pages` must be an array")]
    PagesNotArray,

    #[error("page {page} is not an object with a `content` array")]
    MalformedPage { page: usize },

    #[error("image block {block} on page {page} has no string `value`")]
    ImageWithoutValue { page: usize, block: usize },
}

/// Campaign id of a raw definition, when it has a readable one.
pub fn peek_id(raw: &Value) -> Option<i64> {
    raw.get("id").and_then(Value::as_i64)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Ident {
    Number(i64),
    Text(String),
}

impl Ident {
    fn into_string(self) -> String {
        match self {
            Ident::Number(n) => n.to_string(),
            Ident::Text(s) => s,
        }
    }
}

/// Epoch seconds or RFC 3339.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Timestamp {
    Epoch(i64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct MessageDef {
    id: Ident,
    #[serde(default)]
    formats: Vec<MessageFormat>,
}

#[derive(Debug, Deserialize)]
struct ConversationDef {
    id: Ident,
    pages: Value,
}

#[derive(Debug, Deserialize)]
struct CampaignDef {
    id: i64,
    triggers: Vec<String>,
    #[serde(default)]
    start: Option<Timestamp>,
    #[serde(default)]
    end: Option<Timestamp>,
    /// Seconds.
    #[serde(default)]
    throttle_delay: Option<i64>,
    #[serde(default)]
    random_order: bool,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    messages: Option<Vec<MessageDef>>,
    #[serde(default)]
    pages: Option<Value>,
    #[serde(default)]
    conversations: Option<Vec<ConversationDef>>,
}

/// Build a campaign from one raw definition. `default_delay` applies when
/// the definition has no `throttle_delay`.
pub fn parse_campaign(raw: &Value, default_delay: Duration) -> Result<Campaign, DefinitionError> {
    let def = CampaignDef::deserialize(raw)?;
    let id = def.id;

    let window = EligibilityWindow {
        start: def
            .start
            .map(|t| parse_timestamp(id, "start", t))
            .transpose()?,
        end: def
            .end
            .map(|t| parse_timestamp(id, "end", t))
            .transpose()?,
    };

    let redisplay_delay = match def.throttle_delay {
        Some(secs) if secs < 0 => return Err(DefinitionError::NegativeThrottle(id)),
        Some(secs) => Duration::try_seconds(secs)
            .ok_or(DefinitionError::ThrottleOutOfRange { id, secs })?,
        None => default_delay,
    };

    let content = match (def.messages, def.pages, def.conversations) {
        (Some(messages), None, None) => CampaignContent::Messages(build_messages(id, messages)),
        (None, Some(pages), None) => {
            CampaignContent::Conversations(vec![Conversation::from_pages(id.to_string(), pages)?])
        }
        (None, None, Some(conversations)) => CampaignContent::Conversations(
            conversations
                .into_iter()
                .map(|c| Conversation::from_pages(c.id.into_string(), c.pages))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        (None, None, None) => return Err(DefinitionError::MissingContent(id)),
        _ => return Err(DefinitionError::AmbiguousContent(id)),
    };

    Ok(Campaign {
        id,
        triggers: def.triggers.into_iter().collect::<HashSet<_>>(),
        window,
        redisplay_delay,
        random_order: def.random_order,
        priority: def.priority,
        content,
    })
}

fn build_messages(campaign_id: i64, defs: Vec<MessageDef>) -> Vec<Message> {
    defs.into_iter()
        .filter_map(|def| {
            let id = def.id.into_string();
            let message = Message::new(id.clone(), def.formats);
            if message.is_none() {
                debug!(campaign_id, message_id = %id, "dropping message with no formats");
            }
            message
        })
        .collect()
}

fn parse_timestamp(
    id: i64,
    field: &'static str,
    value: Timestamp,
) -> Result<DateTime<Utc>, DefinitionError> {
    let invalid = |value: String| DefinitionError::InvalidTimestamp { id, field, value };
    match value {
        Timestamp::Epoch(secs) => {
            DateTime::from_timestamp(secs, 0).ok_or_else(|| invalid(secs.to_string()))
        }
        Timestamp::Text(text) => DateTime::parse_from_rfc3339(&text)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| invalid(text)),
    }
}
