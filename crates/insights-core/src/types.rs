use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::InsightsError;

/// Analytics metric tracked by the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Pageviews,
    Sessions,
    Users,
    Engagement,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Pageviews => "pageviews",
            Metric::Sessions => "sessions",
            Metric::Users => "users",
            Metric::Engagement => "engagement",
        }
    }

    pub const ALL: [Metric; 4] = [
        Metric::Pageviews,
        Metric::Sessions,
        Metric::Users,
        Metric::Engagement,
    ];
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = InsightsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pageviews" => Ok(Metric::Pageviews),
            "sessions" => Ok(Metric::Sessions),
            "users" => Ok(Metric::Users),
            "engagement" => Ok(Metric::Engagement),
            other => Err(InsightsError::InvalidInput(format!(
                "unknown metric '{other}', expected one of: pageviews, sessions, users, engagement"
            ))),
        }
    }
}

/// Time-bucketing unit for time-series aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Granularity {
    Day,
    Week,
    Month,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Day => "DAY",
            Granularity::Week => "WEEK",
            Granularity::Month => "MONTH",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive calendar date window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Whole days spanned by the range, never negative
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days().max(0)
    }

    /// Same window shifted one calendar year back.
    /// Feb 29 clamps to Feb 28 in non-leap years.
    pub fn previous_year(&self) -> Self {
        Self {
            start: shift_year_back(self.start),
            end: shift_year_back(self.end),
        }
    }
}

fn shift_year_back(date: NaiveDate) -> NaiveDate {
    date.with_year(date.year() - 1).unwrap_or_else(|| {
        NaiveDate::from_ymd_opt(date.year() - 1, 2, 28).expect("Feb 28 exists in every year")
    })
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// One bucket of a metric time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub date: String,
    pub value: f64,
}

/// Point flagged by period-over-period change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyPoint {
    pub date: String,
    pub value: f64,
    /// Percent change vs the immediately preceding point
    pub change_pct: f64,
}

/// Point flagged by deviation from the whole-series mean
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierPoint {
    pub date: String,
    pub value: f64,
    pub z_score: f64,
}

/// Descriptive statistics and anomaly flags for one metric window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculatedFeatures {
    pub total: f64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub std_dev: f64,
    /// OLS slope of value over bucket index
    pub trend: f64,
    /// Percent change of the period total vs the prior-year total
    pub yoy_change: f64,
    pub spikes: Vec<AnomalyPoint>,
    pub dips: Vec<AnomalyPoint>,
    pub outliers: Vec<OutlierPoint>,
}

/// Summarizer confidence in its own narrative
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[default]
    Low,
    Medium,
    High,
}

/// AI-generated (or locally synthesized) narrative over a metric window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightPayload {
    pub summary_markdown: String,
    pub actions: Vec<String>,
    pub anomalies: Vec<String>,
    pub confidence: Confidence,
}

/// Composite identity of a cached insight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub metric: Metric,
    pub range: DateRange,
    pub granularity: Granularity,
}

impl CacheKey {
    pub fn new(metric: Metric, range: DateRange, granularity: Granularity) -> Self {
        Self {
            metric,
            range,
            granularity,
        }
    }

    /// Canonical string form, shared by the cache store and the in-flight map
    pub fn fingerprint(&self) -> String {
        format!(
            "insight:{}:{}:{}:{}",
            self.metric, self.range.start, self.range.end, self.granularity
        )
    }
}
