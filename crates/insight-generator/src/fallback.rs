use insights_core::{CalculatedFeatures, Confidence, DateRange, InsightPayload, Metric};

/// Locally synthesized insight used when the remote summarizer fails.
///
/// Built only from the extracted features; performs no network calls.
pub fn fallback_insights(
    features: &CalculatedFeatures,
    metric: Metric,
    range: &DateRange,
) -> InsightPayload {
    let trend_direction = if features.trend > 0.0 {
        "Upward"
    } else if features.trend < 0.0 {
        "Downward"
    } else {
        "Flat"
    };

    let summary_markdown = format!(
        "<h3>Analysis of {} data</h3>\n\
         <p><strong>Period:</strong> {}</p>\n\
         <p><strong>Total:</strong> {:.0}</p>\n\
         <p><strong>Average per bucket:</strong> {:.2}</p>\n\
         <p><strong>Trend:</strong> {} ({}{:.2} per bucket)</p>\n\
         <p><strong>Year-over-year change:</strong> {}{:.1}%</p>\n\
         <p><em>AI analysis is currently unavailable; this summary was generated locally.</em></p>",
        metric,
        range,
        features.total,
        features.average,
        trend_direction,
        if features.trend > 0.0 { "+" } else { "" },
        features.trend,
        if features.yoy_change > 0.0 { "+" } else { "" },
        features.yoy_change,
    );

    let actions = vec![
        format!("Review {} acquisition channels for this period", metric),
        "Compare the flagged dates against campaign and release calendars".to_string(),
        "Re-run the analysis once the AI summarizer is reachable".to_string(),
    ];

    let anomalies = if features.outliers.is_empty() {
        vec!["No anomalies detected".to_string()]
    } else {
        let max_z = features
            .outliers
            .iter()
            .map(|o| o.z_score)
            .fold(0.0_f64, f64::max);
        vec![
            format!("Detected {} outlying data points", features.outliers.len()),
            format!("Largest deviation: {:.2} standard deviations", max_z),
        ]
    };

    InsightPayload {
        summary_markdown,
        actions,
        anomalies,
        confidence: Confidence::Low,
    }
}
