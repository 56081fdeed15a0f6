// Core types for the extraction pipeline.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One table row as extracted from the portal: normalized header -> cell
/// text. Carries no identity of its own until a key is resolved for it.
pub type ExtractedRow = BTreeMap<String, String>;

/// A deduplicated, keyed record extracted from a portal table row.
///
/// Serializes to the exact payload shape the webhook receives. `key` is
/// stable across runs for unchanged rows; `fetched_at` and `url` are
/// provenance only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub source: String,
    pub key: String,
    pub fetched_at: DateTime<Utc>,
    pub url: String,
    pub row_index: usize,
    pub row: ExtractedRow,
}

/// Lifecycle of a run record. `Pending` is the only non-terminal state and
/// every run leaves it exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Pending,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}
