use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use insights_cache::InsightsCache;
use insights_core::{
    CacheKey, DateRange, Granularity, InsightGenerator, InsightPayload, InsightsError, Metric,
};

/// Per-metric lifecycle status reported through the progress callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchStatus {
    Started,
    Completed,
    Error,
}

pub type ProgressCallback = Arc<dyn Fn(Metric, PrefetchStatus) + Send + Sync>;

/// One batch request: a date window, a bucketing unit and the metrics to warm
pub struct PrefetchOptions {
    pub range: DateRange,
    pub granularity: Granularity,
    pub metrics: Vec<Metric>,
    pub on_progress: Option<ProgressCallback>,
}

#[derive(Debug, Clone)]
pub struct MetricError {
    pub metric: Metric,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct PrefetchResult {
    pub success: Vec<Metric>,
    pub errors: Vec<MetricError>,
}

/// Timeout budgets for per-metric fetches.
///
/// Longer date windows get proportionally longer budgets, never less than
/// the floor.
#[derive(Debug, Clone, Copy)]
pub struct PrefetcherConfig {
    pub min_fetch_timeout: Duration,
    pub per_day_budget: Duration,
}

impl Default for PrefetcherConfig {
    fn default() -> Self {
        Self {
            min_fetch_timeout: Duration::from_secs(60),
            per_day_budget: Duration::from_secs(1),
        }
    }
}

impl PrefetcherConfig {
    pub fn fetch_budget(&self, range: &DateRange) -> Duration {
        let days = range.span_days() as u32;
        self.min_fetch_timeout.max(self.per_day_budget * days)
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<InsightPayload, String>>>;

/// Orchestrates concurrent fetch-and-populate of the insights cache.
///
/// Guarantees at most one batch in flight process-wide and at most one
/// outbound call per (metric, range, granularity) fingerprint; concurrent
/// requests for the same fingerprint await the same shared fetch.
pub struct InsightsPrefetcher {
    cache: Arc<InsightsCache>,
    generator: Arc<dyn InsightGenerator>,
    config: PrefetcherConfig,
    batch_active: AtomicBool,
    in_flight: DashMap<String, SharedFetch>,
}

impl InsightsPrefetcher {
    pub fn new(cache: Arc<InsightsCache>, generator: Arc<dyn InsightGenerator>) -> Self {
        Self::with_config(cache, generator, PrefetcherConfig::default())
    }

    pub fn with_config(
        cache: Arc<InsightsCache>,
        generator: Arc<dyn InsightGenerator>,
        config: PrefetcherConfig,
    ) -> Self {
        Self {
            cache,
            generator,
            config,
            batch_active: AtomicBool::new(false),
            in_flight: DashMap::new(),
        }
    }

    /// Warm the cache for a batch of metrics over one date window.
    ///
    /// Metrics are fetched concurrently; a single metric's failure never
    /// aborts its siblings. If another batch is already running the call
    /// returns immediately with empty results.
    pub async fn prefetch_insights(&self, options: PrefetchOptions) -> PrefetchResult {
        if self
            .batch_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Prefetch already in progress, skipping");
            return PrefetchResult::default();
        }

        let PrefetchOptions {
            range,
            granularity,
            metrics,
            on_progress,
        } = options;

        tracing::info!("Starting insights prefetch for {} metrics ({})", metrics.len(), range);

        let branches = metrics.into_iter().map(|metric| {
            let on_progress = on_progress.clone();
            async move {
                let outcome = self
                    .prefetch_metric(metric, range, granularity, on_progress.as_ref())
                    .await;
                (metric, outcome)
            }
        });

        let outcomes = futures_util::future::join_all(branches).await;
        self.batch_active.store(false, Ordering::SeqCst);

        let mut result = PrefetchResult::default();
        for (metric, outcome) in outcomes {
            match outcome {
                Ok(()) => result.success.push(metric),
                Err(error) => {
                    tracing::warn!("Prefetch failed for {}: {}", metric, error);
                    result.errors.push(MetricError { metric, error });
                }
            }
        }

        tracing::info!(
            "Prefetch completed: {} succeeded, {} failed",
            result.success.len(),
            result.errors.len()
        );
        result
    }

    async fn prefetch_metric(
        &self,
        metric: Metric,
        range: DateRange,
        granularity: Granularity,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<(), String> {
        let key = CacheKey::new(metric, range, granularity);

        if self.cache.has(&key) {
            tracing::debug!("Insights already cached for {}", metric);
            report(on_progress, metric, PrefetchStatus::Completed);
            return Ok(());
        }

        let fingerprint = key.fingerprint();
        let (fetch, is_owner) = match self.in_flight.entry(fingerprint.clone()) {
            Entry::Occupied(entry) => {
                tracing::debug!("Already fetching {}, awaiting in-flight call", metric);
                (entry.get().clone(), false)
            }
            Entry::Vacant(slot) => {
                let generator = Arc::clone(&self.generator);
                let budget = self.config.fetch_budget(&range);
                let fetch: BoxFuture<'static, Result<InsightPayload, String>> = async move {
                    match tokio::time::timeout(
                        budget,
                        generator.generate(metric, &range, granularity),
                    )
                    .await
                    {
                        Ok(Ok(payload)) => Ok(payload),
                        Ok(Err(e)) => Err(e.to_string()),
                        Err(_) => Err(InsightsError::Timeout(budget).to_string()),
                    }
                }
                .boxed();
                let shared = fetch.shared();
                slot.insert(shared.clone());
                (shared, true)
            }
        };

        if is_owner {
            report(on_progress, metric, PrefetchStatus::Started);
        }

        let outcome = fetch.await;

        // The slot must be freed whatever the outcome, or the fingerprint
        // would be stuck "in progress" forever
        if is_owner {
            self.in_flight.remove(&fingerprint);
        }

        match outcome {
            Ok(payload) => {
                if is_owner {
                    self.cache.set(&key, payload);
                    report(on_progress, metric, PrefetchStatus::Completed);
                }
                Ok(())
            }
            Err(error) => {
                if is_owner {
                    report(on_progress, metric, PrefetchStatus::Error);
                }
                Err(error)
            }
        }
    }

    /// Read-only cache lookup for consumers that want to skip a fetch
    pub fn get_cached_insights(
        &self,
        metric: Metric,
        range: &DateRange,
        granularity: Granularity,
    ) -> Option<InsightPayload> {
        self.cache.get(&CacheKey::new(metric, *range, granularity))
    }

    /// Whether an outbound fetch for this fingerprint is currently in flight
    pub fn is_prefetching_metric(
        &self,
        metric: Metric,
        range: &DateRange,
        granularity: Granularity,
    ) -> bool {
        self.in_flight
            .contains_key(&CacheKey::new(metric, *range, granularity).fingerprint())
    }

    /// Drop cached insights for a date window, across all metrics.
    /// Called when the active date window changes.
    pub fn invalidate_cache(&self, range: &DateRange) {
        self.cache.invalidate_by_date_range(range);
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

fn report(on_progress: Option<&ProgressCallback>, metric: Metric, status: PrefetchStatus) {
    if let Some(callback) = on_progress {
        callback(metric, status);
    }
}
