use serde::{Serialize, Deserialize};
use std::fmt;
use time::OffsetDateTime;

use crate::error::MalformedEvent;

/// The two ballot options. Wire form is `"A"`/`"B"`; the lowercase values the
/// browser form submits are accepted as aliases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum VoteChoice {
    #[serde(alias = "a")]
    A,
    #[serde(alias = "b")]
    B,
}

impl VoteChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteChoice::A => "A",
            VoteChoice::B => "B",
        }
    }

    /// Reads a stored column value back into a choice, tolerating either case.
    pub fn from_column(value: &str) -> Option<Self> {
        match value {
            "A" | "a" => Some(VoteChoice::A),
            "B" | "b" => Some(VoteChoice::B),
            _ => None,
        }
    }
}

impl fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single vote submission as it travels through the queue:
/// `{"voter_id": "...", "vote": "A"}`. Not inherently unique per voter — the
/// client may retransmit, and a voter may change their mind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteEvent {
    pub voter_id: String,
    #[serde(rename = "vote")]
    pub choice: VoteChoice,
}

impl VoteEvent {
    /// Validates a raw queue entry into a typed event. Bad payloads become a
    /// typed error at this boundary instead of surfacing mid-loop.
    pub fn from_json(raw: &str) -> Result<Self, MalformedEvent> {
        let event: VoteEvent = serde_json::from_str(raw)?;
        if event.voter_id.is_empty() {
            return Err(MalformedEvent::EmptyVoterId);
        }
        Ok(event)
    }
}

/// The durable row: at most one per voter, last write wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteRecord {
    pub voter_id: String,
    pub choice: VoteChoice,
    pub recorded_at: OffsetDateTime,
}

/// Aggregate counts, recomputed from the store on every broadcast tick.
/// Serializes to the broadcast payload `{"a": n, "b": n}`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tally {
    #[serde(rename = "a")]
    pub count_a: i64,
    #[serde(rename = "b")]
    pub count_b: i64,
}

impl Tally {
    pub fn total(&self) -> i64 {
        self.count_a + self.count_b
    }
}
