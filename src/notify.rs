// Outbound webhook dispatch.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use crate::errors::NotifyError;
use crate::types::Lead;

/// Per-call webhook timeout.
const DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Where new leads go. A trait so the pipeline can run against a recording
/// fake in tests.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, lead: &Lead) -> Result<(), NotifyError>;
}

/// Posts each lead as a JSON payload to the configured webhook address.
pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: String) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(DISPATCH_TIMEOUT).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, lead: &Lead) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(lead)
            .send()
            .await
            .map_err(|e| NotifyError {
                key: lead.key.clone(),
                reason: e.to_string(),
            })?;
        response.error_for_status().map_err(|e| NotifyError {
            key: lead.key.clone(),
            reason: e.to_string(),
        })?;
        info!("lead {} delivered to webhook", lead.key);
        Ok(())
    }
}

/// Stands in when no webhook address is configured. Every dispatch fails
/// softly, so keys stay eligible for a later run with a real sink.
pub struct UnconfiguredSink;

#[async_trait]
impl NotificationSink for UnconfiguredSink {
    async fn deliver(&self, lead: &Lead) -> Result<(), NotifyError> {
        Err(NotifyError {
            key: lead.key.clone(),
            reason: "WEBHOOK_URL is not set".to_string(),
        })
    }
}
