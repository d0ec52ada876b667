//! The `ContentDedup` entity: tracks which external Reddit content has
//! already been seen, so repeat retrieval passes don't reprocess it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    Post,
    Comment,
    Subreddit,
}

impl ContentType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Post => "post",
            ContentType::Comment => "comment",
            ContentType::Subreddit => "subreddit",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "post" => Some(ContentType::Post),
            "comment" => Some(ContentType::Comment),
            "subreddit" => Some(ContentType::Subreddit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingStatus {
    New,
    Processing,
    Processed,
    Failed,
}

impl ProcessingStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::New => "new",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Processed => "processed",
            ProcessingStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "new" => Some(ProcessingStatus::New),
            "processing" => Some(ProcessingStatus::Processing),
            "processed" => Some(ProcessingStatus::Processed),
            "failed" => Some(ProcessingStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentDedup {
    pub content_hash: String,
    pub content_type: ContentType,
    pub external_id: String,
    pub processing_status: ProcessingStatus,
    pub first_seen_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub source_agent: Option<String>,
    pub workflow_id: Option<String>,
    pub metadata: serde_json::Value,
}

impl ContentDedup {
    #[must_use]
    pub fn new(content_hash: impl Into<String>, content_type: ContentType, external_id: impl Into<String>) -> Self {
        Self {
            content_hash: content_hash.into(),
            content_type,
            external_id: external_id.into(),
            processing_status: ProcessingStatus::New,
            first_seen_at: Utc::now(),
            processed_at: None,
            source_agent: None,
            workflow_id: None,
            metadata: serde_json::json!({}),
        }
    }
}
