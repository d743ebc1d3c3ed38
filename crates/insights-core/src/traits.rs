use async_trait::async_trait;

use crate::error::InsightsResult;
use crate::types::{
    CalculatedFeatures, DateRange, Granularity, InsightPayload, Metric, TimeSeriesPoint,
};

/// Backend-agnostic source of metric time series (the analytics upstream).
#[async_trait]
pub trait TimeSeriesProvider: Send + Sync {
    async fn fetch_time_series(
        &self,
        metric: Metric,
        range: &DateRange,
        granularity: Granularity,
    ) -> InsightsResult<Vec<TimeSeriesPoint>>;
}

/// Turns extracted features into a narrative payload.
///
/// Implemented by the remote chat-completions client; the pipeline falls
/// back to a locally synthesized payload when this call fails.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        features: &CalculatedFeatures,
        metric: Metric,
        range: &DateRange,
    ) -> InsightsResult<InsightPayload>;
}

/// Produces a complete insight for one metric window.
///
/// The prefetcher treats this as an opaque remote operation and applies
/// its own timeout budget around it.
#[async_trait]
pub trait InsightGenerator: Send + Sync {
    async fn generate(
        &self,
        metric: Metric,
        range: &DateRange,
        granularity: Granularity,
    ) -> InsightsResult<InsightPayload>;
}
