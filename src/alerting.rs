//! The `sendBatch` skill logic (component C7): batch-level dedup, per-channel
//! rendering, and retrying delivery.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use lettre::message::{header::ContentType, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::warn;

use crate::idempotency::content_hash;
use crate::store::AlertStore;
use crate::tasks::alert::{AlertBatch, AlertDelivery, DeliveryStatus, ScheduleType};
use crate::utils::config::AlertConfig;
use crate::utils::error::{WatchError, WatchResult};

/// One initial attempt plus up to 3 retries, backing off 2s/4s/8s between them.
const MAX_DELIVERY_ATTEMPTS: u32 = 4;
const RETRY_BACKOFFS_SECS: [u64; 3] = [2, 4, 8];

#[derive(Debug, Clone, Deserialize)]
pub struct AlertItem {
    pub title: String,
    pub message: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

fn default_priority() -> String {
    "medium".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendBatchParams {
    pub batch_id: String,
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub items: Vec<AlertItem>,
    pub channels: Vec<String>,
    #[serde(default = "default_schedule")]
    pub schedule_type: String,
    #[serde(default = "default_priority")]
    pub priority: String,
}

fn default_schedule() -> String {
    "immediate".to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct SendBatchResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub successful_deliveries: i64,
    pub failed_deliveries: i64,
}

pub struct Alerter {
    store: AlertStore,
    config: AlertConfig,
    http_client: reqwest::Client,
    seen_batch_hashes: Arc<Mutex<HashSet<String>>>,
}

impl Alerter {
    #[must_use]
    pub fn new(store: AlertStore, config: AlertConfig, http_client: reqwest::Client) -> Self {
        Self {
            store,
            config,
            http_client,
            seen_batch_hashes: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Dispatch a batch to every requested channel, honoring dedup and the
    /// empty-batch rejection, and persisting one `AlertBatch` plus one
    /// `AlertDelivery` row per channel.
    pub async fn send_batch(&self, params: SendBatchParams) -> WatchResult<SendBatchResult> {
        if params.items.is_empty() {
            return Ok(SendBatchResult {
                status: "error".to_string(),
                reason: None,
                error: Some("empty_batch".to_string()),
                successful_deliveries: 0,
                failed_deliveries: 0,
            });
        }

        let dedup_hash = batch_dedup_hash(&params);
        {
            let mut seen = self.seen_batch_hashes.lock().await;
            if !seen.insert(dedup_hash) {
                return Ok(SendBatchResult {
                    status: "skipped".to_string(),
                    reason: Some("duplicate_batch".to_string()),
                    error: None,
                    successful_deliveries: 0,
                    failed_deliveries: 0,
                });
            }
        }

        let schedule_type = ScheduleType::from_str(&params.schedule_type).unwrap_or(ScheduleType::Immediate);
        let batch = AlertBatch::new(
            params.title.clone(),
            params.summary.clone(),
            params.items.len() as i64,
            params.priority.clone(),
            params.channels.clone(),
            schedule_type,
        );
        self.store.insert_batch(&batch).await?;

        let mut successful = 0i64;
        let mut failed = 0i64;

        for channel in &params.channels {
            let mut delivery = AlertDelivery::new(&batch.batch_id, channel);
            let outcome = self.deliver_with_retry(channel, &params).await;
            match outcome {
                Ok(message_id) => {
                    delivery.status = DeliveryStatus::Sent;
                    delivery.message_id = message_id;
                    delivery.sent_at = Some(chrono::Utc::now());
                    successful += 1;
                }
                Err(err) => {
                    delivery.status = DeliveryStatus::Failed;
                    delivery.error_message = Some(err.to_string());
                    failed += 1;
                }
            }
            self.store.insert_delivery(&delivery).await?;
        }

        if failed == 0 {
            self.store.mark_batch_sent(&batch.batch_id).await?;
        } else if successful == 0 {
            self.store.mark_batch_failed(&batch.batch_id, "all channel deliveries failed").await?;
        } else {
            self.store.mark_batch_sent(&batch.batch_id).await?;
        }

        let status = if failed == 0 {
            "success"
        } else if successful == 0 {
            "failed"
        } else {
            "partial_success"
        };

        Ok(SendBatchResult {
            status: status.to_string(),
            reason: None,
            error: None,
            successful_deliveries: successful,
            failed_deliveries: failed,
        })
    }

    async fn deliver_with_retry(&self, channel: &str, params: &SendBatchParams) -> WatchResult<Option<String>> {
        let mut last_err = None;
        for attempt in 0..MAX_DELIVERY_ATTEMPTS {
            if attempt > 0 {
                let backoff = RETRY_BACKOFFS_SECS[(attempt - 1) as usize];
                tokio::time::sleep(Duration::from_secs(backoff)).await;
            }
            match self.deliver_once(channel, params).await {
                Ok(id) => return Ok(id),
                Err(err) => {
                    let retriable = err.is_retriable();
                    last_err = Some(err);
                    if !retriable {
                        break;
                    }
                }
            }
        }
        Err(last_err.unwrap_or(WatchError::Upstream {
            agent_type: "alert-agent".to_string(),
            skill: "sendBatch".to_string(),
            reason: format!("no delivery attempt made for channel {channel}"),
        }))
    }

    async fn deliver_once(&self, channel: &str, params: &SendBatchParams) -> WatchResult<Option<String>> {
        match channel {
            "slack" => self.deliver_slack(params).await,
            "email" => self.deliver_email(params).await,
            other => Err(WatchError::Validation {
                reason: format!("unsupported alert channel: {other}"),
            }),
        }
    }

    async fn deliver_slack(&self, params: &SendBatchParams) -> WatchResult<Option<String>> {
        let Some(webhook_url) = self.config.slack_webhook_url.as_ref() else {
            return Err(WatchError::Configuration {
                reason: "slack_webhook_url is not configured".to_string(),
            });
        };

        let payload = render_slack_payload(params);
        let response = self
            .http_client
            .post(webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| WatchError::Transport {
                agent_type: "alert-agent".to_string(),
                skill: "sendBatch".to_string(),
                reason: e.to_string(),
            })?;

        if response.status().is_client_error() {
            return Err(WatchError::UpstreamPermanent {
                agent_type: "alert-agent".to_string(),
                skill: "sendBatch".to_string(),
                reason: format!("slack webhook rejected the payload: {}", response.status()),
            });
        }
        if !response.status().is_success() {
            return Err(WatchError::Upstream {
                agent_type: "alert-agent".to_string(),
                skill: "sendBatch".to_string(),
                reason: format!("slack webhook returned {}", response.status()),
            });
        }
        Ok(None)
    }

    async fn deliver_email(&self, params: &SendBatchParams) -> WatchResult<Option<String>> {
        let (Some(host), Some(from), recipients) = (
            self.config.smtp_host.as_ref(),
            self.config.smtp_from.as_ref(),
            &self.config.email_recipients,
        ) else {
            return Err(WatchError::Configuration {
                reason: "smtp_host/smtp_from are not configured".to_string(),
            });
        };

        if recipients.is_empty() {
            return Err(WatchError::Configuration {
                reason: "no email_recipients configured".to_string(),
            });
        }

        let (plain, html) = render_email_bodies(params);
        let mut builder = Message::builder()
            .from(from.parse().map_err(|e| WatchError::Validation { reason: format!("invalid from address: {e}") })?)
            .subject(&params.title);
        for recipient in recipients {
            builder = builder.to(recipient
                .parse()
                .map_err(|e| WatchError::Validation { reason: format!("invalid recipient address: {e}") })?);
        }

        let email = builder
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::builder().header(ContentType::TEXT_PLAIN).body(plain))
                    .singlepart(SinglePart::builder().header(ContentType::TEXT_HTML).body(html)),
            )
            .map_err(|e| WatchError::Validation {
                reason: format!("failed to build email: {e}"),
            })?;

        let mut transport_builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host).map_err(|e| WatchError::Transport {
            agent_type: "alert-agent".to_string(),
            skill: "sendBatch".to_string(),
            reason: e.to_string(),
        })?;

        if let (Some(username), Some(password)) = (&self.config.smtp_username, &self.config.smtp_password) {
            transport_builder = transport_builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let transport = transport_builder.port(self.config.smtp_port).build();

        transport.send(email).await.map_err(|e| WatchError::Transport {
            agent_type: "alert-agent".to_string(),
            skill: "sendBatch".to_string(),
            reason: e.to_string(),
        })?;

        Ok(None)
    }
}

fn priority_color(priority: &str) -> &'static str {
    match priority {
        "critical" => "#d32f2f",
        "high" => "#f57c00",
        "low" => "#9e9e9e",
        _ => "#fbbc04",
    }
}

fn render_slack_payload(params: &SendBatchParams) -> Value {
    let fields: Vec<Value> = params
        .items
        .iter()
        .take(20)
        .map(|item| {
            let mut value = item.message.clone();
            if let Some(url) = &item.url {
                value.push_str(&format!("\n{url}"));
            }
            json!({
                "title": item.title,
                "value": value,
                "short": false,
            })
        })
        .collect();

    json!({
        "text": params.title,
        "attachments": [{
            "color": priority_color(&params.priority),
            "title": params.title,
            "text": params.summary,
            "fields": fields,
        }]
    })
}

fn render_email_bodies(params: &SendBatchParams) -> (String, String) {
    let mut plain = format!("{}\n\n{}\n\n", params.title, params.summary);
    let mut html = format!("<h2>{}</h2><p>{}</p><ul>", escape_html(&params.title), escape_html(&params.summary));
    for item in &params.items {
        plain.push_str(&format!("- {}: {}\n", item.title, item.message));
        html.push_str(&format!("<li><strong>{}</strong>: {}</li>", escape_html(&item.title), escape_html(&item.message)));
    }
    html.push_str("</ul>");
    (plain, html)
}

fn escape_html(input: &str) -> String {
    input.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Hash of `(title, summary, sorted item titles, channels)` used to detect a
/// repeated `sendBatch` call for the same content.
fn batch_dedup_hash(params: &SendBatchParams) -> String {
    let mut item_titles: Vec<&str> = params.items.iter().map(|i| i.title.as_str()).collect();
    item_titles.sort_unstable();
    let mut channels = params.channels.clone();
    channels.sort();
    let canonical = json!({
        "title": params.title,
        "summary": params.summary,
        "items": item_titles,
        "channels": channels,
    });
    content_hash(serde_json::to_vec(&canonical).unwrap_or_default().as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_params() -> SendBatchParams {
        SendBatchParams {
            batch_id: "b1".to_string(),
            title: "New items".to_string(),
            summary: "summary text".to_string(),
            items: vec![AlertItem {
                title: "post 1".to_string(),
                message: "body".to_string(),
                priority: "high".to_string(),
                source: None,
                url: None,
            }],
            channels: vec!["slack".to_string()],
            schedule_type: "immediate".to_string(),
            priority: "high".to_string(),
        }
    }

    #[test]
    fn dedup_hash_ignores_item_order() {
        let mut a = sample_params();
        a.items.push(AlertItem {
            title: "post 2".to_string(),
            message: "body2".to_string(),
            priority: "low".to_string(),
            source: None,
            url: None,
        });
        let mut b = a.clone();
        b.items.reverse();
        assert_eq!(batch_dedup_hash(&a), batch_dedup_hash(&b));
    }

    #[test]
    fn slack_payload_includes_priority_color() {
        let params = sample_params();
        let payload = render_slack_payload(&params);
        assert_eq!(payload["attachments"][0]["color"], "#f57c00");
    }

    #[test]
    fn email_body_escapes_html() {
        let mut params = sample_params();
        params.items[0].title = "<script>".to_string();
        let (_, html) = render_email_bodies(&params);
        assert!(html.contains("&lt;script&gt;"));
    }
}
