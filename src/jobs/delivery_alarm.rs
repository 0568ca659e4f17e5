//! Abnormal-shipment alarm: fetch statistics, drop quiet periods, email the rest.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::email::{EmailSender, render_alarm_body};
use crate::error::TaskError;
use crate::platform::{DeliveryStatistics, LogisticsApi};
use crate::task::{Delivery, Filter, FilterChain, Handler, Provider, Task};

const PROVIDER_NAME: &str = "logistics-statistics";

/// Fetches the current abnormal-shipment counters.
pub struct StatisticsProvider {
    api: Arc<dyn LogisticsApi>,
}

impl StatisticsProvider {
    pub fn new(api: Arc<dyn LogisticsApi>) -> Self {
        Self { api }
    }
}

impl Provider<DeliveryStatistics> for StatisticsProvider {
    fn provide(&self, ctx: &Context) -> Delivery<DeliveryStatistics> {
        let api = Arc::clone(&self.api);
        Delivery::spawn(ctx, async move {
            api.fetch_logistics_statistics()
                .await
                .map_err(|e| TaskError::provider(PROVIDER_NAME, e))
        })
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}

/// Passes statistics on only when something actionable is abnormal.
pub struct ValidStatisticsFilter;

#[async_trait]
impl Filter<DeliveryStatistics> for ValidStatisticsFilter {
    async fn do_filter(
        &self,
        ctx: &Context,
        data: &mut DeliveryStatistics,
        chain: &mut (dyn FilterChain<DeliveryStatistics> + Send),
    ) -> Result<(), TaskError> {
        let valid_total = data.valid_total();
        if valid_total > 0 {
            tracing::info!(valid_total, total = data.total, "Abnormal shipments found");
            return chain.proceed(ctx, data).await;
        }
        tracing::info!(total = data.total, "No actionable abnormal shipments");
        Ok(())
    }

    fn name(&self) -> &str {
        "valid-statistics"
    }
}

/// Emails the alarm for the statistics it receives.
pub struct StatisticsEmailHandler {
    sender: Arc<dyn EmailSender>,
    subject: String,
    logistics_page: String,
}

impl StatisticsEmailHandler {
    pub fn new(
        sender: Arc<dyn EmailSender>,
        subject: impl Into<String>,
        logistics_page: impl Into<String>,
    ) -> Self {
        Self {
            sender,
            subject: subject.into(),
            logistics_page: logistics_page.into(),
        }
    }
}

#[async_trait]
impl Handler<DeliveryStatistics> for StatisticsEmailHandler {
    async fn execute(&self, _ctx: &Context, data: &DeliveryStatistics) -> Result<(), TaskError> {
        let body = render_alarm_body(data, &self.logistics_page);
        self.sender
            .send(&self.subject, &body)
            .await
            .map_err(|e| TaskError::handler(self.name(), e))
    }

    fn name(&self) -> &str {
        "alarm-email"
    }
}

/// Statistics -> [`ValidStatisticsFilter`] -> alarm email.
pub fn delivery_alarm_task(
    api: Arc<dyn LogisticsApi>,
    sender: Arc<dyn EmailSender>,
    subject: &str,
    logistics_page: &str,
) -> Task<DeliveryStatistics> {
    Task::<DeliveryStatistics>::builder(
        Arc::new(StatisticsProvider::new(api)),
        Arc::new(StatisticsEmailHandler::new(sender, subject, logistics_page)),
    )
    .name("delivery-alarm")
    .filter(Arc::new(ValidStatisticsFilter))
    .build()
}
