//! Module: cursor
//! Responsibility: resumable, persisted cursors over search results.
//! Does not own: compiling the search (see `query`).
//!
//! State machine: Empty -> Computing -> Ready, and Ready -> Stale on reset.
//! Movement requires Ready. Ids whose rows have disappeared are skipped,
//! never reported as errors.

mod run;
mod store;


pub use run::{RunBackend, RunSource, SearchRun};
pub use store::{CursorHandle, CursorStore, SqlBackend};

use crate::store::StoreError;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// CursorError
///

#[derive(Debug, ThisError)]
pub enum CursorError {
    #[error("cursor is {state}, not ready")]
    NotReady { state: RunState },

    #[error(transparent)]
    Store(#[from] StoreError),
}

///
/// CursorTarget
///
/// What a cursor walks: a saved search definition, or a fixed upstream batch
/// such as a prior import.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum CursorTarget {
    Search(i64),
    Batch(i64),
}

impl CursorTarget {
    #[must_use]
    pub const fn kind(self) -> &'static str {
        match self {
            Self::Search(_) => "search",
            Self::Batch(_) => "batch",
        }
    }

    #[must_use]
    pub const fn id(self) -> i64 {
        match self {
            Self::Search(id) | Self::Batch(id) => id,
        }
    }

    #[must_use]
    pub fn from_parts(kind: &str, id: i64) -> Option<Self> {
        match kind {
            "search" => Some(Self::Search(id)),
            "batch" => Some(Self::Batch(id)),
            _ => None,
        }
    }
}

///
/// RunState
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum RunState {
    #[default]
    #[display("empty")]
    Empty,
    #[display("computing")]
    Computing,
    #[display("ready")]
    Ready,
    #[display("stale")]
    Stale,
}

impl RunState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Computing => "computing",
            Self::Ready => "ready",
            Self::Stale => "stale",
        }
    }

    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        [Self::Empty, Self::Computing, Self::Ready, Self::Stale]
            .into_iter()
            .find(|state| state.as_str() == text)
    }
}

///
/// RunKey
///
/// Identity of a cursor: one per (owner, target).
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct RunKey {
    pub owner: i64,
    pub target: CursorTarget,
}
