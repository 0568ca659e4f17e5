//! Abnormal-shipment statistics.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PlatformError;
use crate::platform::client::PlatformClient;
use crate::platform::LogisticsApi;

const STATISTICS_PATH: &str = "/api/edith/logistics/abnormal/count";
const STATISTICS_REFERER: &str = "/app-order/abnormal/order/logistics";

/// Look-back window for shipments.
const SHIPMENT_WINDOW_DAYS: i64 = 7;
/// Status code the platform uses for "abnormal, not yet handled".
const STATUS_ABNORMAL: i64 = 100;

/// Counters of abnormal shipments. Counters missing from a response are 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryStatistics {
    pub total: i64,
    pub collect_timeout_count: i64,
    pub collect_warn_count: i64,
    pub return_reject_count: i64,
    pub logistics_standstill_count: i64,
    pub collect_transport_warn_count: i64,
    pub collect_transport_timeout_count: i64,
    pub delivery_sign_timeout_count: i64,
    pub logistics_route_timeout_count: i64,
}

impl DeliveryStatistics {
    /// Abnormal shipments the seller can still act on.
    ///
    /// Rejected returns and carrier-side timeouts or standstills are excluded.
    pub fn valid_total(&self) -> i64 {
        self.total
            - self.return_reject_count
            - self.logistics_route_timeout_count
            - self.delivery_sign_timeout_count
            - self.logistics_standstill_count
    }
}

/// Request body for the statistics endpoint.
#[derive(Debug, Serialize)]
struct StatisticsQuery {
    status: [i64; 1],
    marked: i64,
    shipment_start_time: i64,
    shipment_end_time: i64,
    package_finished_flag: i64,
}

impl StatisticsQuery {
    fn ending_at(now: DateTime<Utc>) -> Self {
        Self {
            status: [STATUS_ABNORMAL],
            marked: 0,
            shipment_start_time: (now - Duration::days(SHIPMENT_WINDOW_DAYS)).timestamp_millis(),
            shipment_end_time: now.timestamp_millis(),
            package_finished_flag: 0,
        }
    }
}

#[async_trait]
impl LogisticsApi for PlatformClient {
    async fn fetch_logistics_statistics(&self) -> Result<DeliveryStatistics, PlatformError> {
        let query = StatisticsQuery::ending_at(Utc::now());
        tracing::debug!(?query, "Fetching logistics statistics");

        let statistics: DeliveryStatistics = self
            .post(STATISTICS_PATH, STATISTICS_REFERER, &query)
            .await?
            .into_data()?;
        tracing::info!(
            total = statistics.total,
            valid_total = statistics.valid_total(),
            "Fetched logistics statistics"
        );
        Ok(statistics)
    }
}
