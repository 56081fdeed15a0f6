// Portal authentication: injected session cookies or the credential flow.
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thirtyfour::prelude::*;
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::ScrapeError;
use crate::extraction::session;

/// URL fragments that mark an authentication page.
const AUTH_URL_MARKERS: &[&str] = &["auth", "login", "signin"];

/// How long to look for a login prompt before concluding there is none.
const PROMPT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Cookie file shape produced by the capture tooling.
#[derive(Debug, Deserialize)]
struct CookieFile {
    #[serde(default)]
    cookies: Vec<StoredCookie>,
    #[serde(default)]
    saved_at: Option<String>,
}

/// Tolerant cookie record: only name and value are required.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub secure: Option<bool>,
}

/// How this run will authenticate. Selected from what is on disk before the
/// browser starts; cookie mode falls back to credentials when the injected
/// session turns out to be stale.
#[derive(Debug)]
pub enum AuthStrategy {
    Cookies { cookies: Vec<StoredCookie> },
    Credentials,
}

impl AuthStrategy {
    /// Prefer a captured session when one is on disk.
    pub fn select(cookies_file: &Path) -> Self {
        match load_cookies(cookies_file) {
            Some(cookies) if !cookies.is_empty() => AuthStrategy::Cookies { cookies },
            _ => AuthStrategy::Credentials,
        }
    }
}

fn load_cookies(path: &Path) -> Option<Vec<StoredCookie>> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<CookieFile>(&raw) {
        Ok(file) => {
            info!(
                "loaded {} stored cookies (saved_at {})",
                file.cookies.len(),
                file.saved_at.as_deref().unwrap_or("unknown")
            );
            Some(file.cookies)
        }
        Err(e) => {
            warn!("cookie file {} unreadable: {e}", path.display());
            None
        }
    }
}

/// Make sure the session is authenticated, whatever that takes.
///
/// No login prompt on the page means we are already in; this is then an
/// idempotent no-op.
pub async fn ensure_authenticated(
    driver: &WebDriver,
    strategy: &AuthStrategy,
    config: &Config,
) -> Result<(), ScrapeError> {
    if !login_prompt_visible(driver, config).await {
        info!("no login prompt, already authenticated");
        return Ok(());
    }
    match strategy {
        AuthStrategy::Cookies { cookies } => {
            if inject_cookies(driver, cookies, config).await? {
                info!("stored session accepted");
                return Ok(());
            }
            warn!("stored session rejected, falling back to credential login");
            credential_login(driver, config).await
        }
        AuthStrategy::Credentials => credential_login(driver, config).await,
    }
}

async fn login_prompt_visible(driver: &WebDriver, config: &Config) -> bool {
    session::probe(driver, &[config.selectors.email_input.as_str()], PROMPT_PROBE_TIMEOUT)
        .await
        .is_some()
}

/// True when the current address still looks like an auth page.
async fn on_auth_page(driver: &WebDriver) -> bool {
    match driver.current_url().await {
        Ok(url) => {
            let url = url.as_str().to_lowercase();
            AUTH_URL_MARKERS.iter().any(|marker| url.contains(marker))
        }
        Err(_) => true,
    }
}

/// Inject stored cookies scoped to the portal host, re-navigate, and report
/// whether the portal let us through.
async fn inject_cookies(
    driver: &WebDriver,
    cookies: &[StoredCookie],
    config: &Config,
) -> Result<bool, ScrapeError> {
    let host = driver
        .current_url()
        .await
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_default();

    let mut injected = 0;
    for stored in cookies {
        if !domain_matches(stored.domain.as_deref(), &host) {
            continue;
        }
        let mut cookie = Cookie::new(stored.name.clone(), stored.value.clone());
        cookie.domain = stored
            .domain
            .as_deref()
            .map(|d| d.trim_start_matches('.').to_string());
        cookie.path = Some(stored.path.clone().unwrap_or_else(|| "/".to_string()));
        cookie.secure = stored.secure;
        if let Err(e) = driver.add_cookie(cookie).await {
            warn!("cookie {} rejected by the browser: {e}", stored.name);
            continue;
        }
        injected += 1;
    }
    info!("injected {injected}/{} stored cookies for host {host}", cookies.len());
    if injected == 0 {
        return Ok(false);
    }

    driver
        .goto(&config.portal_url)
        .await
        .map_err(|e| ScrapeError::Navigation(e.to_string()))?;
    Ok(!on_auth_page(driver).await)
}

/// A stored cookie applies when its domain, minus any leading dot, is the
/// portal host or a parent of it.
fn domain_matches(cookie_domain: Option<&str>, host: &str) -> bool {
    match cookie_domain {
        None => true,
        Some(domain) => {
            let domain = domain.trim_start_matches('.');
            !domain.is_empty() && (host == domain || host.ends_with(&format!(".{domain}")))
        }
    }
}

/// Email -> password -> one-time-code challenge. Every interaction is
/// bounded by the auth timeout; a missing element is an authentication
/// failure, never a silent pass.
async fn credential_login(driver: &WebDriver, config: &Config) -> Result<(), ScrapeError> {
    let (email, password, totp_secret) = match (&config.email, &config.password, &config.totp_secret) {
        (Some(e), Some(p), Some(t)) => (e, p, t),
        _ => {
            return Err(ScrapeError::Auth(
                "PORTAL_EMAIL, PORTAL_PASSWORD and TOTP_SECRET must all be set".to_string(),
            ))
        }
    };
    let sel = &config.selectors;
    let timeout = config.auth_timeout;

    fill(driver, &sel.email_input, email, timeout).await?;
    click(driver, &sel.next_button, timeout).await?;
    fill(driver, &sel.password_input, password, timeout).await?;
    click(driver, &sel.signin_button, timeout).await?;

    // The code challenge only appears for accounts with a second factor
    // enrolled; a short probe decides whether to fulfill it.
    if session::probe(driver, &[sel.otp_input.as_str()], timeout).await.is_some() {
        let code = one_time_code(totp_secret)?;
        fill(driver, &sel.otp_input, &code, timeout).await?;
        click(driver, &sel.verify_button, timeout).await?;
    }

    settle_after_login(driver, config).await
}

/// Wait for the post-login redirect to carry us off the auth flow.
async fn settle_after_login(driver: &WebDriver, config: &Config) -> Result<(), ScrapeError> {
    session::wait_for_condition(
        driver,
        "return document.readyState === 'complete'",
        config.auth_timeout,
    )
    .await;

    let deadline = tokio::time::Instant::now() + config.page_timeout;
    loop {
        if !on_auth_page(driver).await {
            info!("authentication succeeded");
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(ScrapeError::Auth(
                "still on the auth page after login; code rejected or flow changed".to_string(),
            ));
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

async fn fill(driver: &WebDriver, selector: &str, value: &str, timeout: Duration) -> Result<(), ScrapeError> {
    let element = session::probe(driver, &[selector], timeout)
        .await
        .ok_or_else(|| ScrapeError::Auth(format!("login element {selector} not found within {timeout:?}")))?;
    element.clear().await.map_err(auth_err)?;
    element.send_keys(value).await.map_err(auth_err)?;
    Ok(())
}

async fn click(driver: &WebDriver, selector: &str, timeout: Duration) -> Result<(), ScrapeError> {
    let element = session::probe(driver, &[selector], timeout)
        .await
        .ok_or_else(|| ScrapeError::Auth(format!("login element {selector} not found within {timeout:?}")))?;
    element.click().await.map_err(auth_err)?;
    Ok(())
}

fn auth_err(e: thirtyfour::error::WebDriverError) -> ScrapeError {
    ScrapeError::Auth(e.to_string())
}

/// Standard 30-second-step RFC 6238 code for the shared secret. One shot:
/// if the portal rejects it, the whole attempt fails rather than retrying
/// with the next window.
fn one_time_code(secret: &str) -> Result<String, ScrapeError> {
    totp_for_secret(secret)?
        .generate_current()
        .map_err(|e| ScrapeError::Auth(format!("system clock unavailable: {e}")))
}

fn totp_for_secret(secret: &str) -> Result<TOTP, ScrapeError> {
    let bytes = Secret::Encoded(secret.trim().to_string())
        .to_bytes()
        .map_err(|e| ScrapeError::Auth(format!("TOTP secret is not valid base32: {e:?}")))?;
    TOTP::new(Algorithm::SHA1, 6, 1, 30, bytes)
        .map_err(|e| ScrapeError::Auth(format!("TOTP setup failed: {e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_filter_scopes_to_host() {
        assert!(domain_matches(Some("partners.example.com"), "partners.example.com"));
        assert!(domain_matches(Some(".example.com"), "partners.example.com"));
        assert!(domain_matches(Some("example.com"), "partners.example.com"));
        assert!(domain_matches(None, "partners.example.com"));

        assert!(!domain_matches(Some("other.com"), "partners.example.com"));
        assert!(!domain_matches(Some("ample.com"), "partners.example.com"));
        assert!(!domain_matches(Some(""), "partners.example.com"));
    }

    #[test]
    fn one_time_code_matches_reference_vector() {
        // RFC 6238 appendix B secret, SHA-1, at T=59s.
        let totp = totp_for_secret("GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ").unwrap();
        assert_eq!(totp.generate(59), "287082");
    }

    #[test]
    fn invalid_secret_is_an_auth_error() {
        let err = totp_for_secret("not base32 at all!").unwrap_err();
        assert!(err.is_auth());
    }

    #[test]
    fn cookie_file_tolerates_missing_fields() {
        let raw = r#"{"cookies": [{"name": "sid", "value": "abc"}], "saved_at": "2024-06-01T00:00:00Z"}"#;
        let file: CookieFile = serde_json::from_str(raw).unwrap();
        assert_eq!(file.cookies.len(), 1);
        assert!(file.cookies[0].domain.is_none());
    }

    #[test]
    fn strategy_defaults_to_credentials_without_cookie_file() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = AuthStrategy::select(&dir.path().join("cookies.json"));
        assert!(matches!(strategy, AuthStrategy::Credentials));
    }

    #[test]
    fn strategy_prefers_stored_cookies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        std::fs::write(&path, r#"{"cookies": [{"name": "sid", "value": "abc"}]}"#).unwrap();
        assert!(matches!(AuthStrategy::select(&path), AuthStrategy::Cookies { .. }));
    }
}
