pub mod fallback;
pub mod openai;

pub use fallback::fallback_insights;
pub use openai::{OpenAiConfig, OpenAiSummarizer};

use std::sync::Arc;

use async_trait::async_trait;
use insights_core::{
    DateRange, Granularity, InsightGenerator, InsightPayload, InsightsResult, Metric, Summarizer,
    TimeSeriesProvider,
};
use metric_features::FeatureExtractor;

/// End-to-end insight generation for one metric window: fetch the current
/// and prior-year series, extract features, then summarize.
///
/// A summarizer failure degrades to the local fallback payload instead of
/// failing the whole generation; feature-extraction errors propagate.
pub struct InsightPipeline {
    provider: Arc<dyn TimeSeriesProvider>,
    summarizer: Arc<dyn Summarizer>,
    extractor: FeatureExtractor,
}

impl InsightPipeline {
    pub fn new(provider: Arc<dyn TimeSeriesProvider>, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            provider,
            summarizer,
            extractor: FeatureExtractor::new(),
        }
    }

    pub fn with_extractor(mut self, extractor: FeatureExtractor) -> Self {
        self.extractor = extractor;
        self
    }
}

#[async_trait]
impl InsightGenerator for InsightPipeline {
    async fn generate(
        &self,
        metric: Metric,
        range: &DateRange,
        granularity: Granularity,
    ) -> InsightsResult<InsightPayload> {
        tracing::info!("Generating insights for {} ({})", metric, range);

        let previous_range = range.previous_year();
        let current = self
            .provider
            .fetch_time_series(metric, range, granularity)
            .await?;
        let previous = self
            .provider
            .fetch_time_series(metric, &previous_range, granularity)
            .await?;

        let features = self.extractor.compute_features(&current, &previous)?;

        match self.summarizer.summarize(&features, metric, range).await {
            Ok(payload) => Ok(payload),
            Err(e) => {
                tracing::warn!("Summarizer failed for {}, using fallback: {}", metric, e);
                Ok(fallback_insights(&features, metric, range))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insights_core::{
        CalculatedFeatures, Confidence, InsightsError, TimeSeriesPoint,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct CannedProvider {
        current: Vec<TimeSeriesPoint>,
        previous: Vec<TimeSeriesPoint>,
        requested_ranges: Mutex<Vec<DateRange>>,
    }

    #[async_trait]
    impl TimeSeriesProvider for CannedProvider {
        async fn fetch_time_series(
            &self,
            _metric: Metric,
            range: &DateRange,
            _granularity: Granularity,
        ) -> InsightsResult<Vec<TimeSeriesPoint>> {
            let mut ranges = self.requested_ranges.lock().unwrap();
            let series = if ranges.is_empty() {
                self.current.clone()
            } else {
                self.previous.clone()
            };
            ranges.push(*range);
            Ok(series)
        }
    }

    struct FailingSummarizer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Summarizer for FailingSummarizer {
        async fn summarize(
            &self,
            _features: &CalculatedFeatures,
            _metric: Metric,
            _range: &DateRange,
        ) -> InsightsResult<InsightPayload> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(InsightsError::RemoteUnavailable("api down".to_string()))
        }
    }

    struct EchoSummarizer;

    #[async_trait]
    impl Summarizer for EchoSummarizer {
        async fn summarize(
            &self,
            features: &CalculatedFeatures,
            metric: Metric,
            _range: &DateRange,
        ) -> InsightsResult<InsightPayload> {
            Ok(InsightPayload {
                summary_markdown: format!("{} total {:.0}", metric, features.total),
                actions: Vec::new(),
                anomalies: Vec::new(),
                confidence: Confidence::High,
            })
        }
    }

    fn points(values: &[f64]) -> Vec<TimeSeriesPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| TimeSeriesPoint {
                date: format!("2025-06-{:02}", i + 1),
                value,
            })
            .collect()
    }

    fn june() -> DateRange {
        DateRange::new(
            "2025-06-01".parse().unwrap(),
            "2025-06-30".parse().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_pipeline_fetches_current_and_previous_year() {
        let provider = Arc::new(CannedProvider {
            current: points(&[10.0, 20.0]),
            previous: points(&[5.0, 5.0]),
            requested_ranges: Mutex::new(Vec::new()),
        });
        let pipeline = InsightPipeline::new(provider.clone(), Arc::new(EchoSummarizer));

        let payload = pipeline
            .generate(Metric::Pageviews, &june(), Granularity::Day)
            .await
            .unwrap();

        assert_eq!(payload.summary_markdown, "pageviews total 30");
        let ranges = provider.requested_ranges.lock().unwrap();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0], june());
        assert_eq!(ranges[1], june().previous_year());
    }

    #[tokio::test]
    async fn test_summarizer_failure_returns_fallback() {
        let provider = Arc::new(CannedProvider {
            current: points(&[10.0, 20.0, 30.0]),
            previous: points(&[10.0]),
            requested_ranges: Mutex::new(Vec::new()),
        });
        let summarizer = Arc::new(FailingSummarizer {
            calls: AtomicUsize::new(0),
        });
        let pipeline = InsightPipeline::new(provider, summarizer.clone());

        let payload = pipeline
            .generate(Metric::Sessions, &june(), Granularity::Day)
            .await
            .unwrap();

        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(payload.confidence, Confidence::Low);
        assert!(payload.summary_markdown.contains("generated locally"));
    }

    #[tokio::test]
    async fn test_empty_series_propagates_invalid_input() {
        let provider = Arc::new(CannedProvider {
            current: Vec::new(),
            previous: Vec::new(),
            requested_ranges: Mutex::new(Vec::new()),
        });
        let pipeline = InsightPipeline::new(provider, Arc::new(EchoSummarizer));

        let result = pipeline
            .generate(Metric::Users, &june(), Granularity::Day)
            .await;
        assert!(matches!(result, Err(InsightsError::InvalidInput(_))));
    }
}
