// Environment-sourced configuration.
//
// Every knob has a default except the credential triple and the webhook
// address; those stay optional so a read-only pass against an already
// authenticated session is still possible.
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::keys::DEFAULT_KEY_HASH_LEN;

/// UI locators for the portal's login form, all overridable per deployment.
/// The defaults match a conventional email/password/one-time-code form.
#[derive(Debug, Clone)]
pub struct Selectors {
    pub email_input: String,
    pub next_button: String,
    pub password_input: String,
    pub signin_button: String,
    pub otp_input: String,
    pub verify_button: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            email_input: r#"input[type="email"]"#.to_string(),
            next_button: r#"button[type="submit"]"#.to_string(),
            password_input: r#"input[type="password"]"#.to_string(),
            signin_button: r#"button[type="submit"]"#.to_string(),
            otp_input: r#"input[autocomplete="one-time-code"], input[type="text"]"#.to_string(),
            verify_button: r#"button[type="submit"]"#.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Portal address the tables live at.
    pub portal_url: String,
    pub email: Option<String>,
    pub password: Option<String>,
    pub totp_secret: Option<String>,
    pub webhook_url: Option<String>,
    /// chromedriver (or compatible) endpoint.
    pub webdriver_url: String,
    pub state_file: PathBuf,
    pub log_file: PathBuf,
    pub webhook_doc_file: PathBuf,
    pub db_file: PathBuf,
    pub cookies_file: PathBuf,
    pub artifacts_dir: PathBuf,
    /// Source label per discovered table, by position. Tables beyond this
    /// list are ignored.
    pub table_sources: Vec<String>,
    pub selectors: Selectors,
    pub page_timeout: Duration,
    pub auth_timeout: Duration,
    /// Hex width of the content-hash fallback key.
    pub key_hash_len: usize,
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Selectors::default();
        let selectors = Selectors {
            email_input: var_or("SEL_EMAIL_INPUT", &defaults.email_input),
            next_button: var_or("SEL_NEXT_BTN", &defaults.next_button),
            password_input: var_or("SEL_PASS_INPUT", &defaults.password_input),
            signin_button: var_or("SEL_SIGNIN_BTN", &defaults.signin_button),
            otp_input: var_or("SEL_OTP_INPUT", &defaults.otp_input),
            verify_button: var_or("SEL_VERIFY_BTN", &defaults.verify_button),
        };
        Self {
            portal_url: var_or("PORTAL_URL", "https://partners.example.com/home/leads"),
            email: var_opt("PORTAL_EMAIL"),
            password: var_opt("PORTAL_PASSWORD"),
            totp_secret: var_opt("TOTP_SECRET"),
            webhook_url: var_opt("WEBHOOK_URL"),
            webdriver_url: var_or("WEBDRIVER_URL", "http://localhost:9515"),
            state_file: var_or("STATE_FILE", "data/state.json").into(),
            log_file: var_or("LOG_FILE", "data/leads.log").into(),
            webhook_doc_file: var_or("WEBHOOK_DOC_FILE", "data/README_webhook.md").into(),
            db_file: var_or("DB_FILE", "data/leads.db").into(),
            cookies_file: var_or("COOKIES_FILE", "data/cookies.json").into(),
            artifacts_dir: var_or("ARTIFACTS_DIR", "data/artifacts").into(),
            table_sources: split_sources(&var_or("TABLE_SOURCES", "portal.example.com,shop.example.com")),
            selectors,
            page_timeout: Duration::from_secs(var_secs("PAGE_TIMEOUT_SECS", 60)),
            auth_timeout: Duration::from_secs(var_secs("AUTH_TIMEOUT_SECS", 5)),
            key_hash_len: env::var("KEY_HASH_LEN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_KEY_HASH_LEN),
        }
    }

    /// Credential-based login needs all three of email, password and the
    /// one-time-code seed.
    pub fn has_credentials(&self) -> bool {
        self.email.is_some() && self.password.is_some() && self.totp_secret.is_some()
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn var_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn var_secs(name: &str, default: u64) -> u64 {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn split_sources(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
