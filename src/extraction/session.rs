// Browser session lifecycle and element probing.
use std::time::Duration;

use thirtyfour::error::WebDriverError;
use thirtyfour::prelude::*;
use thirtyfour::ChromiumLikeCapabilities;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::errors::ScrapeError;

/// Desktop user agent presented to the portal.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Poll interval for element probes.
const PROBE_INTERVAL: Duration = Duration::from_millis(250);

/// Start a hardened headless Chrome session against the configured
/// WebDriver endpoint.
pub async fn start(webdriver_url: &str, page_timeout: Duration) -> Result<WebDriver, ScrapeError> {
    let mut caps = DesiredCapabilities::chrome();
    for arg in [
        "--headless=new",
        "--no-sandbox",
        "--disable-dev-shm-usage",
        "--disable-blink-features=AutomationControlled",
    ] {
        caps.add_arg(arg).map_err(into_nav)?;
    }
    caps.add_arg(&format!("--user-agent={USER_AGENT}")).map_err(into_nav)?;

    let driver = WebDriver::new(webdriver_url, caps).await.map_err(into_nav)?;
    driver.set_page_load_timeout(page_timeout).await.map_err(into_nav)?;
    // Scrub the one property naive bot checks look at first.
    driver
        .execute(
            "Object.defineProperty(navigator, 'webdriver', {get: () => undefined})",
            vec![],
        )
        .await
        .map_err(into_nav)?;
    Ok(driver)
}

/// Close the session, tolerating an already-dead browser.
pub async fn release(driver: WebDriver) {
    if let Err(e) = driver.quit().await {
        debug!("browser session already gone: {e}");
    }
}

fn into_nav(e: WebDriverError) -> ScrapeError {
    ScrapeError::Navigation(e.to_string())
}

/// Find the first present element among candidate selectors, polling until
/// the deadline. `None` means nothing matched in time; absence is a value
/// here, not an error to branch on.
pub async fn probe(driver: &WebDriver, selectors: &[&str], timeout: Duration) -> Option<WebElement> {
    let deadline = Instant::now() + timeout;
    loop {
        for sel in selectors {
            if let Ok(found) = driver.find_all(By::Css(*sel)).await {
                if let Some(element) = found.into_iter().next() {
                    return Some(element);
                }
            }
        }
        if Instant::now() >= deadline {
            return None;
        }
        sleep(PROBE_INTERVAL).await;
    }
}

/// All elements matching the first selector that yields any, in document
/// order. Empty when nothing matched before the deadline.
pub async fn probe_all(driver: &WebDriver, selectors: &[&str], timeout: Duration) -> Vec<WebElement> {
    let deadline = Instant::now() + timeout;
    loop {
        for sel in selectors {
            if let Ok(found) = driver.find_all(By::Css(*sel)).await {
                if !found.is_empty() {
                    return found;
                }
            }
        }
        if Instant::now() >= deadline {
            return Vec::new();
        }
        sleep(PROBE_INTERVAL).await;
    }
}

/// Evaluate a script expected to yield a boolean; any failure counts as
/// `false`.
pub async fn eval_bool(driver: &WebDriver, script: &str) -> bool {
    match driver.execute(script, vec![]).await {
        Ok(ret) => ret.json().as_bool().unwrap_or(false),
        Err(_) => false,
    }
}

/// Wait until a script yields true, or the timeout lapses.
pub async fn wait_for_condition(driver: &WebDriver, script: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if eval_bool(driver, script).await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(PROBE_INTERVAL).await;
    }
}
