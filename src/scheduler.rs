// Run scheduling: the exclusivity gate and the watch loop.
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::ledger::Ledger;
use crate::notify::NotificationSink;
use crate::run;
use crate::status::StatusBoard;

/// Bounds for the randomized pause between watch-mode passes. A fixed
/// cadence is easy for the portal to spot.
const MIN_PAUSE_SECS: u64 = 5 * 60;
const MAX_PAUSE_SECS: u64 = 20 * 60;

fn next_pause() -> Duration {
    Duration::from_secs(rand::thread_rng().gen_range(MIN_PAUSE_SECS..=MAX_PAUSE_SECS))
}

/// Run forever: one gated pass, then a randomized pause. A failed pass is
/// logged and the loop keeps going; only the operator stops watch mode.
pub async fn watch(
    config: &Config,
    ledger: &Ledger,
    board: &Arc<StatusBoard>,
    sink: &dyn NotificationSink,
) {
    loop {
        match board.begin_run() {
            Some(_guard) => {
                if let Err(e) = run::execute(config, ledger, board.as_ref(), sink).await {
                    error!("run failed: {e}");
                }
            }
            None => warn!("previous run still active, skipping this trigger"),
        }
        let pause = next_pause();
        info!("next run in {} min", pause.as_secs() / 60);
        tokio::time::sleep(pause).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_stays_within_bounds() {
        for _ in 0..100 {
            let pause = next_pause().as_secs();
            assert!((MIN_PAUSE_SECS..=MAX_PAUSE_SECS).contains(&pause));
        }
    }
}
