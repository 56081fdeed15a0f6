// Error taxonomy for the extraction pipeline.
//
// Everything the browser layer can throw is translated into one of these
// kinds at the engine boundary; downstream stages never see a raw WebDriver
// error type.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Missing credentials, login UI not found in time, or a rejected
    /// one-time code. Fatal to the run; extraction and dispatch never start.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The portal address did not load within the page timeout.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Browser-side failure while locating or reading tables.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Run ledger or lead store unavailable.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Seen-key state or another run artifact could not be written.
    #[error("state file error: {0}")]
    State(#[from] std::io::Error),
}

impl ScrapeError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ScrapeError::Auth(_))
    }
}

/// Webhook delivery failure. Recoverable per lead: the key stays out of the
/// seen set and the lead is retried on the next run.
#[derive(Debug, Error)]
#[error("webhook delivery failed for {key}: {reason}")]
pub struct NotifyError {
    pub key: String,
    pub reason: String,
}
