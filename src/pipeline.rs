// Dedup and dispatch: route genuinely-new leads to the notification sink.
use tracing::{error, info};

use crate::notify::NotificationSink;
use crate::state::SeenKeys;
use crate::types::Lead;

/// One pass over the extracted leads, strictly in table-then-row order.
///
/// Every lead is logged whether or not it was seen before. A key enters
/// `seen` only after the sink accepted it, so a failed dispatch stays
/// eligible on the next run; nothing is retried within a run. Returns how
/// many leads were newly delivered.
pub async fn process(leads: &[Lead], seen: &mut SeenKeys, sink: &dyn NotificationSink) -> usize {
    let mut new_count = 0;
    for lead in leads {
        info!(
            "lead observed [{}] (row {}) key={} -> {:?}",
            lead.source, lead.row_index, lead.key, lead.row
        );
        if seen.contains(&lead.key) {
            continue;
        }
        match sink.deliver(lead).await {
            Ok(()) => {
                seen.insert(lead.key.clone());
                new_count += 1;
            }
            Err(e) => error!("{e}"),
        }
    }
    new_count
}
