//! Concrete pipelines and the services they are wired from.

pub mod delivery_alarm;
pub mod review_reply;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::email::{EmailSender, SmtpEmailSender};
use crate::error::PlatformError;
use crate::platform::{
    ChatClient, DeliveryStatistics, LogisticsApi, PlatformClient, ReplyDrafter, ReviewApi,
    ReviewSearchParam,
};
use crate::task::{Executable, ExecutableContainer, Task};

pub use delivery_alarm::{
    StatisticsEmailHandler, StatisticsProvider, ValidStatisticsFilter, delivery_alarm_task,
};
pub use review_reply::{ReviewProvider, ReviewReplyData, ReviewReplyHandler, review_reply_task};

/// Look-back window for the scheduled reply run.
const UNREPLIED_WINDOW_HOURS: i64 = 24;

/// Shared clients every job is built from.
#[derive(Clone)]
pub struct Services {
    pub logistics: Arc<dyn LogisticsApi>,
    pub reviews: Arc<dyn ReviewApi>,
    pub drafter: Arc<dyn ReplyDrafter>,
    pub email: Arc<dyn EmailSender>,
    pub alarm_subject: String,
    pub logistics_page: String,
}

impl Services {
    pub fn from_config(config: &AppConfig) -> Result<Self, PlatformError> {
        let platform = Arc::new(PlatformClient::new(&config.platform)?);
        Ok(Self {
            logistics: platform.clone(),
            reviews: platform,
            drafter: Arc::new(ChatClient::new(&config.chat)?),
            email: Arc::new(SmtpEmailSender::new(config.email.clone())),
            alarm_subject: config.email.subject.clone(),
            logistics_page: config.email.logistics_page.clone(),
        })
    }

    pub fn delivery_alarm(&self) -> Task<DeliveryStatistics> {
        delivery_alarm_task(
            Arc::clone(&self.logistics),
            Arc::clone(&self.email),
            &self.alarm_subject,
            &self.logistics_page,
        )
    }

    /// Reply to every review on one order.
    pub fn order_reply(&self, order_id: &str) -> Task<Vec<ReviewReplyData>> {
        review_reply_task(
            Arc::clone(&self.reviews),
            Arc::clone(&self.drafter),
            ReviewSearchParam::for_order(order_id),
        )
    }

    /// Reply to text reviews from the last day that have no answer yet.
    pub fn unreplied_reply(&self) -> Task<Vec<ReviewReplyData>> {
        review_reply_task(
            Arc::clone(&self.reviews),
            Arc::clone(&self.drafter),
            ReviewSearchParam::unreplied_since(chrono::Duration::hours(UNREPLIED_WINDOW_HOURS)),
        )
        .with_name("unreplied-review-reply")
    }

    /// Everything the scheduler runs on each fire, as one bounded batch.
    pub fn scheduled_batch(&self, pool_size: usize) -> ExecutableContainer {
        let tasks: Vec<Arc<dyn Executable>> = vec![
            Arc::new(self.delivery_alarm()),
            Arc::new(self.unreplied_reply()),
        ];
        ExecutableContainer::new(tasks)
            .with_pool_size(pool_size)
            .with_name("scheduled")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use secrecy::SecretString;

    use super::*;
    use crate::config::{ChatConfig, EmailConfig, PlatformConfig, SchedulerConfig, ServerConfig};

    fn config() -> AppConfig {
        AppConfig {
            platform: PlatformConfig {
                auth_token: SecretString::from("AT-test"),
                base_url: "http://127.0.0.1:9".into(),
                timeout: Duration::from_secs(1),
            },
            chat: ChatConfig {
                api_key: SecretString::from("app-test"),
                base_url: "http://127.0.0.1:9/v1".into(),
                timeout: Duration::from_secs(1),
                user: "tester".into(),
                catalog: Default::default(),
            },
            email: EmailConfig {
                smtp_host: "smtp.example.com".into(),
                smtp_port: 465,
                username: "alerts@example.com".into(),
                password: SecretString::from("pw"),
                from_address: "alerts@example.com".into(),
                recipients: vec!["ops@example.com".into()],
                subject: "Alert".into(),
                logistics_page: "https://example.com/logistics".into(),
            },
            scheduler: SchedulerConfig {
                schedule: "0 0 12 * * *".parse().unwrap(),
                delay_range_minutes: 0,
                run_timeout: Duration::from_secs(1),
                pool_size: 2,
            },
            server: ServerConfig::default(),
        }
    }

    #[test]
    fn scheduled_batch_holds_both_jobs() {
        let services = Services::from_config(&config()).unwrap();
        let batch = services.scheduled_batch(0);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.pool_size(), 1);
        assert_eq!(batch.name(), "scheduled");
    }

    #[test]
    fn job_names_identify_failures() {
        let services = Services::from_config(&config()).unwrap();
        assert_eq!(services.delivery_alarm().name(), "delivery-alarm");
        assert_eq!(services.order_reply("P1").name(), "review-reply");
        assert_eq!(services.unreplied_reply().name(), "unreplied-review-reply");
    }
}
