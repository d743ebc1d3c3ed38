use insights_core::{
    AnomalyPoint, CalculatedFeatures, InsightsError, InsightsResult, OutlierPoint, TimeSeriesPoint,
};

/// Classification cutoffs for spike/dip/outlier detection.
///
/// The defaults are empirically tuned, not derived from a statistical
/// standard; the asymmetry between spikes and dips is intentional.
#[derive(Debug, Clone, Copy)]
pub struct AnomalyThresholds {
    /// Point-over-point percent change above which a point is a spike
    pub spike_pct: f64,
    /// Point-over-point percent change below which a point is a dip
    pub dip_pct: f64,
    /// Absolute z-score above which a point is an outlier
    pub z_score_cutoff: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            spike_pct: 30.0,
            dip_pct: -20.0,
            z_score_cutoff: 2.0,
        }
    }
}

/// Pure feature extraction over a metric time series.
///
/// Deterministic and side-effect free; safe to call concurrently.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor {
    thresholds: AnomalyThresholds,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thresholds(thresholds: AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &AnomalyThresholds {
        &self.thresholds
    }

    /// Compute descriptive statistics and anomaly flags for the current
    /// window, with a year-over-year comparison against the prior window.
    ///
    /// The series need not have equal lengths; `current` must be non-empty.
    pub fn compute_features(
        &self,
        current: &[TimeSeriesPoint],
        previous: &[TimeSeriesPoint],
    ) -> InsightsResult<CalculatedFeatures> {
        if current.is_empty() {
            return Err(InsightsError::InvalidInput(
                "cannot compute features for an empty time series".to_string(),
            ));
        }

        let values: Vec<f64> = current.iter().map(|p| p.value).collect();
        let n = values.len();

        let total: f64 = values.iter().sum();
        let average = total / n as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let median = median(&values);
        let std_dev = population_std_dev(&values, average);
        let trend = ols_slope(&values);

        // YoY compares period totals; a zero prior total yields 0, not infinity
        let previous_total: f64 = previous.iter().map(|p| p.value).sum();
        let yoy_change = if previous_total > 0.0 {
            (total - previous_total) / previous_total * 100.0
        } else {
            0.0
        };

        let (spikes, dips) = self.classify_changes(current, &values);
        let outliers = self.detect_outliers(current, &values, average, std_dev);

        Ok(CalculatedFeatures {
            total,
            average,
            min,
            max,
            median,
            std_dev,
            trend,
            yoy_change,
            spikes,
            dips,
            outliers,
        })
    }

    /// Point-over-point spike/dip classification with strict thresholds.
    /// A zero previous value makes the percent change undefined; the point
    /// is skipped rather than classified from a division by zero.
    fn classify_changes(
        &self,
        points: &[TimeSeriesPoint],
        values: &[f64],
    ) -> (Vec<AnomalyPoint>, Vec<AnomalyPoint>) {
        let mut spikes = Vec::new();
        let mut dips = Vec::new();

        for i in 1..values.len() {
            if values[i - 1] == 0.0 {
                continue;
            }
            let change_pct = (values[i] - values[i - 1]) / values[i - 1] * 100.0;
            if change_pct > self.thresholds.spike_pct {
                spikes.push(AnomalyPoint {
                    date: points[i].date.clone(),
                    value: values[i],
                    change_pct,
                });
            } else if change_pct < self.thresholds.dip_pct {
                dips.push(AnomalyPoint {
                    date: points[i].date.clone(),
                    value: values[i],
                    change_pct,
                });
            }
        }

        (spikes, dips)
    }

    /// Z-scores against the whole-series mean and standard deviation.
    /// A zero std-dev (constant series) makes every z-score 0.
    fn detect_outliers(
        &self,
        points: &[TimeSeriesPoint],
        values: &[f64],
        mean: f64,
        std_dev: f64,
    ) -> Vec<OutlierPoint> {
        if std_dev == 0.0 {
            return Vec::new();
        }

        let mut outliers = Vec::new();
        for (i, &value) in values.iter().enumerate() {
            let z_score = ((value - mean) / std_dev).abs();
            if z_score > self.thresholds.z_score_cutoff {
                outliers.push(OutlierPoint {
                    date: points[i].date.clone(),
                    value,
                    z_score,
                });
            }
        }
        outliers
    }
}

/// Median of the values; even-length series average the two middle elements
fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Population standard deviation (divides by n, not n-1)
fn population_std_dev(values: &[f64], mean: f64) -> f64 {
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Closed-form simple linear regression slope over x = 0..n-1.
/// Degenerate for a single point, where the slope is 0.
fn ols_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, v)| i as f64 * v).sum();
    let sum_xx: f64 = (0..values.len()).map(|i| (i * i) as f64).sum();

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator == 0.0 {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denominator
}
