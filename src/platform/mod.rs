//! Upstream services the jobs read from and write to.
//!
//! The jobs depend on the traits below rather than on the HTTP clients, so
//! they can be exercised against in-memory fakes.

pub mod chat;
pub mod client;
pub mod logistics;
pub mod review;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::PlatformError;

pub use chat::{ChatClient, ReviewChatParam};
pub use client::PlatformClient;
pub use logistics::DeliveryStatistics;
pub use review::{Review, ReviewReplyParam, ReviewScore, ReviewSearchParam, SkuInfo};

/// Source of abnormal-shipment statistics.
#[async_trait]
pub trait LogisticsApi: Send + Sync {
    async fn fetch_logistics_statistics(&self) -> Result<DeliveryStatistics, PlatformError>;
}

/// Product review search and reply.
#[async_trait]
pub trait ReviewApi: Send + Sync {
    async fn search_reviews(&self, param: &ReviewSearchParam) -> Result<Vec<Review>, PlatformError>;

    async fn reply(&self, param: &ReviewReplyParam) -> Result<(), PlatformError>;
}

/// Drafts a reply to a review.
#[async_trait]
pub trait ReplyDrafter: Send + Sync {
    async fn interact(&self, ctx: &Context, param: &ReviewChatParam) -> Result<String, PlatformError>;
}
