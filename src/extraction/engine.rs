// The extraction run: a linear state machine over one browser session.
//
// Navigation and authentication failures are fatal. Everything in the
// readiness-wait stage is best effort: the portal frequently has usable
// tables even while its own loading signals disagree, so a wait that times
// out logs a warning and moves on.
use std::path::Path;
use std::time::Duration;

use thirtyfour::error::WebDriverError;
use thirtyfour::prelude::*;
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::ScrapeError;
use crate::extraction::auth::{self, AuthStrategy};
use crate::extraction::{session, tables};
use crate::ledger::Ledger;
use crate::status::StatusBoard;
use crate::types::Lead;

/// Selectors that should match the portal's main content once the
/// client-side app has booted.
const ROOT_CONTENT_SELECTORS: &[&str] = &["main", "[role=\"main\"]", "app-root", "#root", "body"];

/// Table-like structures, most specific first.
const TABLE_SELECTORS: &[&str] = &["table", "[role=\"table\"]", "[role=\"grid\"]"];

/// Overlays that block interaction while the portal loads.
const LOADING_SELECTORS: &[&str] = &[".loading", ".spinner", "[aria-busy=\"true\"]", "mat-spinner"];

/// Fallback wait when the page exposes no readiness hook.
const RENDER_FALLBACK_DELAY: Duration = Duration::from_secs(5);

/// Fixed settle time for animations after everything else reports ready.
const SETTLE_DELAY: Duration = Duration::from_millis(750);

/// Asks the client-side framework whether it has settled. Yields null on
/// pages that expose no testability hook.
const STABILITY_HOOK: &str = "return (function() { \
    if (window.getAllAngularTestabilities) { \
        return window.getAllAngularTestabilities().every(function(t) { return t.isStable(); }); \
    } \
    return null; \
})();";

/// Run one extraction pass: navigate, authenticate, wait for the app to
/// render, and harvest table rows into leads.
///
/// The browser session is released on every exit path before this returns.
pub async fn run_extraction(
    config: &Config,
    ledger: &Ledger,
    board: &StatusBoard,
    run_id: i64,
) -> Result<Vec<Lead>, ScrapeError> {
    board.push("starting browser");
    ledger.set_connect_phase(run_id, "starting browser")?;
    let driver = session::start(&config.webdriver_url, config.page_timeout).await?;

    let outcome = drive(config, ledger, board, run_id, &driver).await;
    session::release(driver).await;
    outcome
}

async fn drive(
    config: &Config,
    ledger: &Ledger,
    board: &StatusBoard,
    run_id: i64,
    driver: &WebDriver,
) -> Result<Vec<Lead>, ScrapeError> {
    // Navigating
    board.push(format!("navigating to {}", config.portal_url));
    ledger.set_connect_phase(run_id, "navigating")?;
    driver
        .goto(&config.portal_url)
        .await
        .map_err(|e| ScrapeError::Navigation(format!("portal did not load: {e}")))?;

    // Authenticating
    board.push("checking authentication");
    ledger.set_connect_phase(run_id, "authenticating")?;
    let strategy = AuthStrategy::select(&config.cookies_file);
    auth::ensure_authenticated(driver, &strategy, config).await?;
    ledger.set_connect_phase(run_id, "authenticated")?;

    // Diagnostic snapshot of whatever the portal showed us post-auth.
    if let Some(name) = capture_screenshot(driver, &config.artifacts_dir, run_id).await {
        ledger.set_screenshot(run_id, &name)?;
    }

    // AwaitingRender
    board.push("waiting for the app to render");
    ledger.set_extract_phase(run_id, "awaiting render")?;
    await_render(driver, config).await;

    if let Ok(body) = driver.find(By::Css("body")).await {
        if let Ok(text) = body.text().await {
            info!("rendered body text: {} chars", text.len());
        }
    }

    // LocatingTables
    board.push("locating tables");
    ledger.set_extract_phase(run_id, "locating tables")?;
    let found = session::probe_all(driver, TABLE_SELECTORS, config.page_timeout).await;
    if found.is_empty() {
        warn!("no tables found (0 leads)");
        board.push("no tables found");
        ledger.set_extract_phase(run_id, "no tables found")?;
        return Ok(Vec::new());
    }
    info!("found {} table(s)", found.len());

    // ExtractingRows
    ledger.set_extract_phase(run_id, "extracting rows")?;
    let mut leads = Vec::new();
    for (index, table) in found.iter().take(config.table_sources.len()).enumerate() {
        let source = &config.table_sources[index];
        board.push(format!("extracting table {} as [{source}]", index + 1));

        let (raw_headers, header_in_first_row) = header_texts(table).await.map_err(extraction_err)?;
        let raw_rows = body_row_texts(table, header_in_first_row)
            .await
            .map_err(extraction_err)?;
        let table_leads =
            tables::assemble_leads(source, &config.portal_url, &raw_headers, &raw_rows, config.key_hash_len);
        info!(
            "table {}: {} headers, {} rows, {} leads kept",
            index + 1,
            raw_headers.len(),
            raw_rows.len(),
            table_leads.len()
        );
        leads.extend(table_leads);
    }

    ledger.set_extract_phase(run_id, &format!("extracted {} leads", leads.len()))?;
    board.push(format!("{} leads extracted", leads.len()));
    Ok(leads)
}

/// Stepwise readiness wait. Each step is independently bounded and
/// optional; a timeout is ambiguity, not failure.
async fn await_render(driver: &WebDriver, config: &Config) {
    let timeout = config.page_timeout;

    // (a) root content element
    let root = session::probe(driver, ROOT_CONTENT_SELECTORS, timeout).await;
    if root.is_none() {
        warn!("no root content element within {timeout:?}, proceeding anyway");
    }

    // (b) visible and non-empty
    if let Some(root) = root {
        if !wait_populated(&root, timeout).await {
            warn!("root content still empty or hidden after {timeout:?}, proceeding anyway");
        }
    }

    // (c) framework readiness hook, or a fixed fallback delay without one
    match framework_stable(driver).await {
        None => {
            session::wait_for_condition(driver, "return document.readyState === 'complete'", timeout).await;
            tokio::time::sleep(RENDER_FALLBACK_DELAY).await;
        }
        Some(true) => {}
        Some(false) => {
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                if framework_stable(driver).await == Some(true) {
                    break;
                }
                if tokio::time::Instant::now() >= deadline {
                    warn!("readiness signal never settled within {timeout:?}, proceeding anyway");
                    break;
                }
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        }
    }

    // (d) blocking loading indicator
    if !wait_overlay_gone(driver, timeout).await {
        warn!("loading indicator still visible after {timeout:?}, proceeding anyway");
    }

    // (e) settle for animations
    tokio::time::sleep(SETTLE_DELAY).await;
}

async fn framework_stable(driver: &WebDriver) -> Option<bool> {
    match driver.execute(STABILITY_HOOK, vec![]).await {
        Ok(ret) => ret.json().as_bool(),
        Err(_) => None,
    }
}

async fn wait_populated(element: &WebElement, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let visible = element.is_displayed().await.unwrap_or(false);
        let has_text = element
            .text()
            .await
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false);
        if visible && has_text {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

async fn wait_overlay_gone(driver: &WebDriver, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let mut blocking = false;
        for sel in LOADING_SELECTORS {
            if let Ok(found) = driver.find_all(By::Css(*sel)).await {
                for element in found {
                    if element.is_displayed().await.unwrap_or(false) {
                        blocking = true;
                        break;
                    }
                }
            }
            if blocking {
                break;
            }
        }
        if !blocking {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

/// Headers from a dedicated header section first, then first-row th, then
/// first-row td. The flag reports whether the first `tr` supplied them.
async fn header_texts(table: &WebElement) -> Result<(Vec<String>, bool), WebDriverError> {
    let thead = table.find_all(By::Css("thead th")).await?;
    if !thead.is_empty() {
        return Ok((element_texts(&thead).await?, false));
    }
    let rows = table.find_all(By::Css("tr")).await?;
    let Some(first) = rows.first() else {
        return Ok((Vec::new(), false));
    };
    let ths = first.find_all(By::Css("th")).await?;
    if !ths.is_empty() {
        return Ok((element_texts(&ths).await?, true));
    }
    let tds = first.find_all(By::Css("td")).await?;
    Ok((element_texts(&tds).await?, true))
}

/// Body rows as raw cell text. A table without a `thead` keeps its header
/// row inside the implicit `tbody`, so when the header came from the first
/// row the body is everything after that row, never `tbody tr` as-is.
async fn body_row_texts(
    table: &WebElement,
    header_in_first_row: bool,
) -> Result<Vec<Vec<String>>, WebDriverError> {
    let rows: Vec<WebElement> = if header_in_first_row {
        let all = table.find_all(By::Css("tr")).await?;
        all.into_iter().skip(1).collect()
    } else {
        let mut rows = table.find_all(By::Css("tbody tr")).await?;
        if rows.is_empty() {
            rows = table.find_all(By::Css("tr")).await?;
        }
        rows
    };
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let cells = row.find_all(By::Css("td")).await?;
        out.push(element_texts(&cells).await?);
    }
    Ok(out)
}

async fn element_texts(elements: &[WebElement]) -> Result<Vec<String>, WebDriverError> {
    let mut texts = Vec::with_capacity(elements.len());
    for element in elements {
        texts.push(element.text().await?.trim().to_string());
    }
    Ok(texts)
}

/// Best effort: a failed screenshot never fails the run.
async fn capture_screenshot(driver: &WebDriver, dir: &Path, run_id: i64) -> Option<String> {
    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!("cannot create artifacts dir {}: {e}", dir.display());
        return None;
    }
    let name = format!("run_{run_id}_page.png");
    match driver.screenshot(&dir.join(&name)).await {
        Ok(()) => {
            info!("screenshot saved: {name}");
            Some(name)
        }
        Err(e) => {
            warn!("screenshot failed: {e}");
            None
        }
    }
}

fn extraction_err(e: WebDriverError) -> ScrapeError {
    ScrapeError::Extraction(e.to_string())
}
