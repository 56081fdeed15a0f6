// Live run status: bounded progress ring plus the run exclusivity flag.
//
// One board is created at the scheduling boundary and handed to the engine
// explicitly; nothing in here is process-global. Pollers read the ring
// without blocking a run in progress.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

/// Most-recent progress messages kept for pollers.
const MESSAGE_CAP: usize = 200;

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub at: DateTime<Utc>,
    pub text: String,
}

#[derive(Debug, Default)]
struct BoardInner {
    messages: VecDeque<StatusMessage>,
    running: bool,
}

/// Thread-safe progress board shared by the scheduler, the engine and any
/// status poller.
#[derive(Debug, Default)]
pub struct StatusBoard {
    inner: Mutex<BoardInner>,
}

impl StatusBoard {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Append a progress line, evicting the oldest once the cap is reached.
    pub fn push(&self, text: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        if inner.messages.len() == MESSAGE_CAP {
            inner.messages.pop_front();
        }
        inner.messages.push_back(StatusMessage {
            at: Utc::now(),
            text: text.into(),
        });
    }

    /// Snapshot of the ring, oldest first.
    pub fn messages(&self) -> Vec<StatusMessage> {
        self.inner.lock().unwrap().messages.iter().cloned().collect()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().unwrap().running
    }

    /// Claim the exclusive-run flag. `None` means a run is already active.
    /// The flag clears when the guard drops, so an aborted run can never
    /// leave it wedged.
    pub fn begin_run(self: &Arc<Self>) -> Option<RunGuard> {
        let mut inner = self.inner.lock().unwrap();
        if inner.running {
            return None;
        }
        inner.running = true;
        Some(RunGuard {
            board: Arc::clone(self),
        })
    }
}

/// Holds the exclusive-run flag for the duration of one run.
pub struct RunGuard {
    board: Arc<StatusBoard>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.board.inner.lock().unwrap().running = false;
    }
}
