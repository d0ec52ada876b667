//! The `AlertBatch`/`AlertDelivery` entities: an aggregated notification and
//! its per-channel delivery attempts (component C7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleType {
    Immediate,
    Hourly,
    Daily,
}

impl ScheduleType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleType::Immediate => "immediate",
            ScheduleType::Hourly => "hourly",
            ScheduleType::Daily => "daily",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "immediate" => Some(ScheduleType::Immediate),
            "hourly" => Some(ScheduleType::Hourly),
            "daily" => Some(ScheduleType::Daily),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    Pending,
    Sent,
    Failed,
}

impl BatchStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Sent => "sent",
            BatchStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BatchStatus::Pending),
            "sent" => Some(BatchStatus::Sent),
            "failed" => Some(BatchStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

impl DeliveryStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DeliveryStatus::Pending),
            "sent" => Some(DeliveryStatus::Sent),
            "failed" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertBatch {
    pub batch_id: String,
    pub title: String,
    pub summary: String,
    pub total_items: i64,
    pub priority: String,
    pub channels: Vec<String>,
    pub schedule_type: ScheduleType,
    pub status: BatchStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivery_attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AlertBatch {
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        summary: impl Into<String>,
        total_items: i64,
        priority: impl Into<String>,
        channels: Vec<String>,
        schedule_type: ScheduleType,
    ) -> Self {
        Self {
            batch_id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            summary: summary.into(),
            total_items,
            priority: priority.into(),
            channels,
            schedule_type,
            status: BatchStatus::Pending,
            sent_at: None,
            delivery_attempts: 0,
            last_error: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertDelivery {
    pub delivery_id: String,
    pub alert_batch_id: String,
    pub channel: String,
    pub status: DeliveryStatus,
    pub recipient: Option<String>,
    pub webhook_url: Option<String>,
    pub message_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivery_time_ms: Option<i64>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
}

impl AlertDelivery {
    #[must_use]
    pub fn new(alert_batch_id: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            delivery_id: uuid::Uuid::new_v4().to_string(),
            alert_batch_id: alert_batch_id.into(),
            channel: channel.into(),
            status: DeliveryStatus::Pending,
            recipient: None,
            webhook_url: None,
            message_id: None,
            sent_at: None,
            delivery_time_ms: None,
            error_message: None,
            retry_count: 0,
            created_at: Utc::now(),
        }
    }
}
