//! Product reviews: search and reply.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PlatformError;
use crate::platform::client::PlatformClient;
use crate::platform::ReviewApi;

const SEARCH_PATH: &str = "/api/edith/review/search";
const REPLY_PATH: &str = "/api/edith/review/reply";
const REVIEW_REFERER: &str = "/app-item/review/list";

/// Content type for reviews that carry text.
pub const CONTENT_TYPE_TEXT: i64 = 2;
/// Reply status for reviews that have not been answered yet.
pub const REPLY_STATUS_UNREPLIED: i64 = 2;

const DEFAULT_PAGE_SIZE: u32 = 20;

/// Filter for [`ReviewApi::search_reviews`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReviewSearchParam {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub content_type_list: Vec<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub review_reply_status_list: Vec<i64>,
    #[serde(
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_time: Option<DateTime<Utc>>,
    pub page_no: u32,
    pub page_size: u32,
}

impl ReviewSearchParam {
    /// Every review left on one order.
    pub fn for_order(order_id: impl Into<String>) -> Self {
        Self {
            order_id: Some(order_id.into()),
            page_no: 1,
            page_size: DEFAULT_PAGE_SIZE,
            ..Default::default()
        }
    }

    /// Unanswered text reviews from the trailing `window`.
    pub fn unreplied_since(window: Duration) -> Self {
        let end = Utc::now();
        Self {
            content_type_list: vec![CONTENT_TYPE_TEXT],
            review_reply_status_list: vec![REPLY_STATUS_UNREPLIED],
            start_time: Some(end - window),
            end_time: Some(end),
            page_no: 1,
            page_size: DEFAULT_PAGE_SIZE,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), PlatformError> {
        let has_order = self.order_id.as_deref().is_some_and(|id| !id.trim().is_empty());
        let has_window = self.start_time.is_some() && self.end_time.is_some();
        if !has_order && !has_window {
            return Err(PlatformError::InvalidParameters(
                "review search needs an order id or a time window".into(),
            ));
        }
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start > end {
                return Err(PlatformError::InvalidParameters(format!(
                    "review search window starts after it ends: {start} > {end}"
                )));
            }
        }
        if self.page_size == 0 {
            return Err(PlatformError::InvalidParameters("page size must be positive".into()));
        }
        Ok(())
    }
}

/// Reply text for one or more reviews.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewReplyParam {
    pub review_ids: Vec<String>,
    pub reply_content: String,
}

impl ReviewReplyParam {
    pub fn validate(&self) -> Result<(), PlatformError> {
        if self.review_ids.iter().all(|id| id.trim().is_empty()) {
            return Err(PlatformError::InvalidParameters("no review ids to reply to".into()));
        }
        if self.reply_content.trim().is_empty() {
            return Err(PlatformError::InvalidParameters("reply content is empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SkuInfo {
    pub item_id: String,
    pub sku_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReviewScore {
    pub product: i64,
    pub logistics: i64,
    pub service: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Review {
    pub id: String,
    pub content: String,
    pub sku_info: SkuInfo,
    pub score: ReviewScore,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReviewPage {
    reviews: Vec<Review>,
}

#[async_trait]
impl ReviewApi for PlatformClient {
    async fn search_reviews(&self, param: &ReviewSearchParam) -> Result<Vec<Review>, PlatformError> {
        param.validate()?;
        let page: ReviewPage = self
            .post(SEARCH_PATH, REVIEW_REFERER, param)
            .await?
            .into_data()?;
        tracing::info!(
            order_id = param.order_id.as_deref().unwrap_or("-"),
            found = page.reviews.len(),
            "Fetched reviews"
        );
        Ok(page.reviews)
    }

    async fn reply(&self, param: &ReviewReplyParam) -> Result<(), PlatformError> {
        param.validate()?;
        self.post(REPLY_PATH, REVIEW_REFERER, param).await?;
        tracing::info!(review_ids = ?param.review_ids, "Replied to reviews");
        Ok(())
    }
}
