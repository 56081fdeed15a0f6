// One end-to-end pass: extract, dedup, dispatch, persist, document.
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::ScrapeError;
use crate::extraction;
use crate::ledger::Ledger;
use crate::notify::NotificationSink;
use crate::pipeline;
use crate::state;
use crate::status::StatusBoard;
use crate::types::RunStatus;
use crate::webhook_doc;

/// Outcome summary of a completed pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunSummary {
    pub leads_seen: usize,
    pub new_leads: usize,
}

/// Execute one run. The caller holds the exclusivity guard.
///
/// Always leaves a terminal run record, success or failure.
pub async fn execute(
    config: &Config,
    ledger: &Ledger,
    board: &StatusBoard,
    sink: &dyn NotificationSink,
) -> Result<RunSummary, ScrapeError> {
    let run_id = ledger.begin_run()?;
    info!("run {run_id} started");
    board.push(format!("run {run_id} started"));

    match run_inner(config, ledger, board, sink, run_id).await {
        Ok(summary) => {
            ledger.finish_run(
                run_id,
                RunStatus::Success,
                Some(&format!("{} leads, {} new", summary.leads_seen, summary.new_leads)),
            )?;
            board.push(format!("run {run_id} finished: {} new leads", summary.new_leads));
            info!(
                "run {run_id} finished: {} leads seen, {} new",
                summary.leads_seen, summary.new_leads
            );
            Ok(summary)
        }
        Err(e) => {
            board.push(format!("run {run_id} failed: {e}"));
            if let Err(ledger_err) = ledger.finish_run(run_id, RunStatus::Failed, Some(&e.to_string())) {
                warn!("could not record failure for run {run_id}: {ledger_err}");
            }
            Err(e)
        }
    }
}

async fn run_inner(
    config: &Config,
    ledger: &Ledger,
    board: &StatusBoard,
    sink: &dyn NotificationSink,
    run_id: i64,
) -> Result<RunSummary, ScrapeError> {
    let leads = extraction::run_extraction(config, ledger, board, run_id).await?;

    let mut seen = state::load_seen_keys(&config.state_file);
    let new_leads = pipeline::process(&leads, &mut seen, sink).await;
    state::save_seen_keys(&config.state_file, &seen)?;

    let stored = ledger.store_leads(&leads)?;
    if stored > 0 {
        info!("{stored} leads stored for the dashboard");
    }

    if let Some(example) = leads.first() {
        if let Err(e) = webhook_doc::write_payload_doc(example, &config.webhook_doc_file) {
            warn!("payload doc not rewritten: {e}");
        }
    }

    Ok(RunSummary {
        leads_seen: leads.len(),
        new_leads,
    })
}
