use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::records::EntityKind;

/// Why a raw row was rejected. Row-level only: the rest of the batch keeps going.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SchemaError {
    #[error("missing field `{field}`")]
    MissingField { field: &'static str },

    #[error("field `{field}` is not a whole number: {value:?}")]
    BadNumber { field: &'static str, value: String },

    #[error("field `{field}` is negative: {value:?}")]
    Negative { field: &'static str, value: String },

    #[error("field `{field}` is not a percentage: {value:?}")]
    BadPercentage { field: &'static str, value: String },

    #[error("unrecognized date {value:?}")]
    BadDate { value: String },

    #[error("date {date} outside season {start}..={end}")]
    OutsideSeason {
        date: NaiveDate,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("{team} listed as both home and away")]
    SameTeam { team: String },

    #[error("minute {value:?} outside 0..={max}")]
    MinuteOutOfRange { value: String, max: u32 },

    #[error("unknown event kind {value:?}")]
    UnknownEventKind { value: String },

    #[error("event references unknown match {match_id}")]
    UnknownMatch { match_id: String },
}

/// A raw name that no alias resolved; it was given a fresh canonical identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedIdentity {
    pub kind: EntityKind,
    pub raw: String,
    pub assigned: String,
}

/// Two raw names of one match resolved to the same canonical team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameCollision {
    pub match_id: String,
    pub line: usize,
    pub team: String,
    pub dropped_events: usize,
}

/// An event whose resolved team is neither side of its kept match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanEvent {
    pub match_id: String,
    pub line: usize,
    pub team: String,
    pub player: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum QueryError {
    #[error("no entity matches {filter}")]
    NotFound { filter: String },

    #[error("window {window} was not computed for this analysis")]
    WindowNotComputed { window: String },
}
