//! JSON-RPC 2.0 envelope for the `/a2a` endpoint (`message/send`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct A2aRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: A2aParams,
    pub id: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct A2aParams {
    pub message: A2aMessage,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct A2aMessage {
    pub role: String,
    pub parts: Vec<A2aPart>,
    #[serde(rename = "messageId")]
    pub message_id: String,
    #[serde(rename = "contextId", default)]
    pub context_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum A2aPart {
    Text { text: String },
    Data { data: Value },
}

#[derive(Debug, Clone, Serialize)]
pub struct A2aResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    pub result: A2aResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct A2aResult {
    pub kind: &'static str,
    pub id: String,
    pub status: A2aStatus,
    #[serde(flatten)]
    pub output: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct A2aStatus {
    pub state: &'static str,
}

/// A `{skill, parameters}` directive extracted from the message: either a
/// `data` part carrying it directly, or a `skill`/`parameters` pair in
/// `metadata`.
pub struct SkillDirective {
    pub skill: String,
    pub parameters: Value,
}

impl A2aRequest {
    #[must_use]
    pub fn extract_directive(&self) -> Option<SkillDirective> {
        if let Some(skill) = self.params.metadata.get("skill").and_then(Value::as_str) {
            let parameters = self.params.metadata.get("parameters").cloned().unwrap_or(Value::Null);
            return Some(SkillDirective {
                skill: skill.to_string(),
                parameters,
            });
        }

        for part in &self.params.message.parts {
            match part {
                A2aPart::Data { data } => {
                    let skill = data.get("skill").and_then(Value::as_str)?;
                    let parameters = data.get("parameters").cloned().unwrap_or(Value::Null);
                    return Some(SkillDirective {
                        skill: skill.to_string(),
                        parameters,
                    });
                }
                A2aPart::Text { text } => {
                    if let Ok(parsed) = serde_json::from_str::<Value>(text) {
                        if let Some(skill) = parsed.get("skill").and_then(Value::as_str) {
                            let parameters = parsed.get("parameters").cloned().unwrap_or(Value::Null);
                            return Some(SkillDirective {
                                skill: skill.to_string(),
                                parameters,
                            });
                        }
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_directive_from_metadata() {
        let request: A2aRequest = serde_json::from_value(serde_json::json!({
            "jsonrpc": "2.0",
            "method": "message/send",
            "params": {
                "message": {
                    "role": "user",
                    "parts": [{"kind": "text", "text": "scan"}],
                    "messageId": "m1",
                    "contextId": "c1"
                },
                "metadata": {"skill": "scan_subreddit", "parameters": {"subreddit": "rust"}}
            },
            "id": 1
        }))
        .unwrap();

        let directive = request.extract_directive().unwrap();
        assert_eq!(directive.skill, "scan_subreddit");
        assert_eq!(directive.parameters["subreddit"], "rust");
    }

    #[test]
    fn extracts_directive_from_data_part_when_metadata_absent() {
        let request: A2aRequest = serde_json::from_value(serde_json::json!({
            "jsonrpc": "2.0",
            "method": "message/send",
            "params": {
                "message": {
                    "role": "user",
                    "parts": [{"kind": "data", "data": {"skill": "send_batch", "parameters": {"batch_id": "b1"}}}],
                    "messageId": "m2"
                }
            },
            "id": 2
        }))
        .unwrap();

        let directive = request.extract_directive().unwrap();
        assert_eq!(directive.skill, "send_batch");
    }
}
