//! Reply drafting through a chat-completion service.

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::ChatConfig;
use crate::context::Context;
use crate::error::PlatformError;
use crate::platform::ReplyDrafter;

/// What the chat service needs to draft a reply to one review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewChatParam {
    pub item_id: String,
    pub item_info: String,
    pub review_content: String,
}

impl ReviewChatParam {
    fn validate(&self) -> Result<(), PlatformError> {
        for (field, value) in [
            ("item_id", &self.item_id),
            ("item_info", &self.item_info),
            ("review_content", &self.review_content),
        ] {
            if value.trim().is_empty() {
                return Err(PlatformError::InvalidParameters(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

pub struct ChatClient {
    http: reqwest::Client,
    url: String,
    api_key: SecretString,
    user: String,
    catalog: HashMap<String, String>,
}

impl ChatClient {
    pub fn new(config: &ChatConfig) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PlatformError::RequestFailed {
                url: config.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            url: format!("{}/chat-messages", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            user: config.user.clone(),
            catalog: config.catalog.clone(),
        })
    }

    /// Build the blocking chat request for `param`.
    fn request_body(
        &self,
        ctx: &Context,
        param: &ReviewChatParam,
    ) -> Result<serde_json::Value, PlatformError> {
        let entry = self.catalog.get(&param.item_id).ok_or_else(|| {
            PlatformError::InvalidParameters(format!(
                "no catalog entry for item {}",
                param.item_id
            ))
        })?;
        let (item_type, introduction) = entry.split_once('|').ok_or_else(|| {
            PlatformError::InvalidParameters(format!("catalog entry for {} has no type", param.item_id))
        })?;

        ctx.report(format!("item {} -> type {item_type}", param.item_id));

        let query = json!({
            "sku_info": {
                "item_type": item_type,
                "item_introduction": introduction,
            },
            "review_info": {
                "text": param.review_content,
            },
        });

        Ok(json!({
            "query": query.to_string(),
            "response_mode": "blocking",
            "user": self.user,
            "conversation_id": "",
            "inputs": {},
        }))
    }
}

#[async_trait]
impl ReplyDrafter for ChatClient {
    async fn interact(&self, ctx: &Context, param: &ReviewChatParam) -> Result<String, PlatformError> {
        param.validate()?;
        let body = self.request_body(ctx, param)?;
        tracing::info!(item_id = %param.item_id, "Requesting reply draft");

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::RequestFailed {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PlatformError::RequestFailed {
                url: self.url.clone(),
                reason: format!("failed to read body: {e}"),
            })?;

        if !status.is_success() {
            tracing::error!(url = %self.url, status = status.as_u16(), "Chat request failed");
            return Err(PlatformError::BadStatus {
                url: self.url.clone(),
                status: status.as_u16(),
                body: text,
            });
        }

        extract_answer(&self.url, &text)
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    answer: Option<String>,
}

fn extract_answer(url: &str, text: &str) -> Result<String, PlatformError> {
    let response: ChatResponse = serde_json::from_str(text)?;
    response.answer.ok_or_else(|| PlatformError::InvalidResponse {
        url: url.to_string(),
        reason: format!("answer missing from response: {text}"),
    })
}
