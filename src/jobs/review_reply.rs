//! Review replies: find reviews, draft an answer for each, post the answers.
//!
//! Progress is reported line by line through the context's progress sink so
//! an HTTP caller can follow the run.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::{AggregateError, PlatformError, TaskError, UnitFailure};
use crate::platform::{ReplyDrafter, ReviewApi, ReviewChatParam, ReviewReplyParam, ReviewSearchParam};
use crate::task::{Delivery, Handler, Provider, Task};

const PROVIDER_NAME: &str = "review-drafts";

/// One drafted reply, ready to post.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewReplyData {
    pub review_ids: Vec<String>,
    pub review_content: String,
    pub reply_content: String,
}

/// Searches reviews and drafts a reply for every match.
pub struct ReviewProvider {
    reviews: Arc<dyn ReviewApi>,
    drafter: Arc<dyn ReplyDrafter>,
    param: ReviewSearchParam,
}

impl ReviewProvider {
    pub fn new(
        reviews: Arc<dyn ReviewApi>,
        drafter: Arc<dyn ReplyDrafter>,
        param: ReviewSearchParam,
    ) -> Self {
        Self {
            reviews,
            drafter,
            param,
        }
    }
}

impl Provider<Vec<ReviewReplyData>> for ReviewProvider {
    fn provide(&self, ctx: &Context) -> Delivery<Vec<ReviewReplyData>> {
        if let Err(e) = self.param.validate() {
            return Delivery::failed(TaskError::provider(PROVIDER_NAME, e));
        }
        let reviews = Arc::clone(&self.reviews);
        let drafter = Arc::clone(&self.drafter);
        let param = self.param.clone();
        let progress = ctx.clone();

        Delivery::spawn(ctx, async move {
            let fail = |e: PlatformError| TaskError::provider(PROVIDER_NAME, e);

            progress.report("-- fetching reviews --");
            let found = reviews.search_reviews(&param).await.map_err(fail)?;
            progress.report(format!("found {} review(s)", found.len()));

            let mut drafts = Vec::with_capacity(found.len());
            for review in found {
                progress.report(format!("review {}: {}", review.id, review.content));
                let chat = ReviewChatParam {
                    item_id: review.sku_info.item_id.clone(),
                    item_info: review.sku_info.sku_name.clone(),
                    review_content: review.content.clone(),
                };
                let answer = drafter.interact(&progress, &chat).await.map_err(fail)?;
                progress.report(format!("draft for {}: {answer}", review.id));

                drafts.push(ReviewReplyData {
                    review_ids: vec![review.id],
                    review_content: review.content,
                    reply_content: answer,
                });
            }
            Ok(drafts)
        })
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}

/// Posts every drafted reply, continuing past individual failures.
pub struct ReviewReplyHandler {
    reviews: Arc<dyn ReviewApi>,
}

impl ReviewReplyHandler {
    pub fn new(reviews: Arc<dyn ReviewApi>) -> Self {
        Self { reviews }
    }
}

#[async_trait]
impl Handler<Vec<ReviewReplyData>> for ReviewReplyHandler {
    async fn execute(&self, ctx: &Context, data: &Vec<ReviewReplyData>) -> Result<(), TaskError> {
        if data.is_empty() {
            ctx.report("no reviews to reply to");
            return Ok(());
        }
        ctx.report("-- posting replies --");

        let mut failures = Vec::new();
        for (index, draft) in data.iter().enumerate() {
            let param = ReviewReplyParam {
                review_ids: draft.review_ids.clone(),
                reply_content: draft.reply_content.clone(),
            };
            let name = draft.review_ids.join(",");
            match self.reviews.reply(&param).await {
                Ok(()) => ctx.report(format!("replied to {name}")),
                Err(e) => {
                    tracing::warn!(review_ids = %name, error = %e, "Reply failed");
                    ctx.report(format!("reply to {name} failed: {e}"));
                    failures.push(UnitFailure {
                        index,
                        error: TaskError::handler(self.name(), e),
                        name,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TaskError::Aggregate(AggregateError::new(failures)))
        }
    }

    fn name(&self) -> &str {
        "review-reply"
    }
}

/// Reviews matching `param` -> drafts -> posted replies.
pub fn review_reply_task(
    reviews: Arc<dyn ReviewApi>,
    drafter: Arc<dyn ReplyDrafter>,
    param: ReviewSearchParam,
) -> Task<Vec<ReviewReplyData>> {
    Task::<Vec<ReviewReplyData>>::builder(
        Arc::new(ReviewProvider::new(Arc::clone(&reviews), drafter, param)),
        Arc::new(ReviewReplyHandler::new(reviews)),
    )
    .name("review-reply")
    .build()
}
