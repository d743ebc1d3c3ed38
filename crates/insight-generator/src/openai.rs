use serde::{Deserialize, Serialize};
use std::time::Duration;

use async_trait::async_trait;
use insights_core::{
    CalculatedFeatures, Confidence, DateRange, InsightPayload, InsightsError, InsightsResult,
    Metric, Summarizer,
};

const SYSTEM_PROMPT: &str = "You are a senior data analyst specializing in web analytics. \
Analyze the provided metric data and identify patterns, trends, and anomalies. Compare the \
current period with the previous year and give actionable, data-driven recommendations.\n\n\
Respond with ONLY valid JSON using the keys summary_markdown (HTML-formatted summary), \
actions (array of strings), anomalies (array of strings) and confidence (\"low\", \"medium\" \
or \"high\"). Do not include markdown code blocks or any text outside the JSON object.";

/// Configuration for the chat-completions summarizer
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Build from environment: `OPENAI_API_KEY` (required), `OPENAI_BASE_URL`
    /// and `OPENAI_MODEL` (optional overrides).
    pub fn from_env() -> InsightsResult<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            InsightsError::InvalidInput("OPENAI_API_KEY environment variable not set".to_string())
        })?;

        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            config.base_url = base_url;
        }
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            config.model = model;
        }
        Ok(config)
    }
}

/// Remote summarizer backed by a chat-completions API
#[derive(Clone)]
pub struct OpenAiSummarizer {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiSummarizer {
    pub fn new(config: OpenAiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    pub fn from_env() -> InsightsResult<Self> {
        Ok(Self::new(OpenAiConfig::from_env()?))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Model output fields; anything missing falls back to defaults
#[derive(Debug, Deserialize)]
struct RawInsight {
    #[serde(default)]
    summary_markdown: String,
    #[serde(default)]
    actions: Vec<String>,
    #[serde(default)]
    anomalies: Vec<String>,
    #[serde(default)]
    confidence: Confidence,
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(
        &self,
        features: &CalculatedFeatures,
        metric: Metric,
        range: &DateRange,
    ) -> InsightsResult<InsightPayload> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_user_prompt(features, metric, range),
                },
            ],
            temperature: 0.1,
            max_tokens: 1500,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| InsightsError::RemoteUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InsightsError::RemoteUnavailable(format!(
                "chat completions returned {}: {}",
                status, body
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| InsightsError::InvalidResponse(e.to_string()))?;

        let content = body
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .ok_or_else(|| {
                InsightsError::InvalidResponse("no content in completion response".to_string())
            })?;

        tracing::debug!("Summarizer produced {} chars for {}", content.len(), metric);
        parse_insight_content(content)
    }
}

/// Parse model output into a payload, tolerating markdown code fences
pub(crate) fn parse_insight_content(content: &str) -> InsightsResult<InsightPayload> {
    let cleaned = strip_code_fences(content.trim());

    let raw: RawInsight = serde_json::from_str(cleaned)
        .map_err(|e| InsightsError::InvalidResponse(format!("malformed insight JSON: {e}")))?;

    let summary_markdown = if raw.summary_markdown.is_empty() {
        "No summary available.".to_string()
    } else {
        raw.summary_markdown
    };

    Ok(InsightPayload {
        summary_markdown,
        actions: raw.actions,
        anomalies: raw.anomalies,
        confidence: raw.confidence,
    })
}

fn strip_code_fences(content: &str) -> &str {
    let stripped = content
        .strip_prefix("```json")
        .or_else(|| content.strip_prefix("```"))
        .unwrap_or(content);
    stripped.strip_suffix("```").unwrap_or(stripped).trim()
}

fn build_user_prompt(features: &CalculatedFeatures, metric: Metric, range: &DateRange) -> String {
    let mut prompt = format!(
        "Analyze the following {} data for the period {}:\n\n\
         CURRENT PERIOD STATISTICS:\n\
         - Total: {:.0}\n\
         - Average: {:.2}\n\
         - Min: {:.0}\n\
         - Max: {:.0}\n\
         - Median: {:.2}\n\
         - Standard Deviation: {:.2}\n\
         - Trend: {}{:.2} per bucket\n\
         - Year-over-Year Change: {}{:.1}%\n\n\
         ANOMALIES DETECTED:\n\
         - Spikes: {} detected\n\
         - Dips: {} detected\n\
         - Outliers: {} detected\n",
        metric,
        range,
        features.total,
        features.average,
        features.min,
        features.max,
        features.median,
        features.std_dev,
        if features.trend > 0.0 { "+" } else { "" },
        features.trend,
        if features.yoy_change > 0.0 { "+" } else { "" },
        features.yoy_change,
        features.spikes.len(),
        features.dips.len(),
        features.outliers.len(),
    );

    if !features.spikes.is_empty() {
        let spikes: Vec<String> = features
            .spikes
            .iter()
            .map(|s| format!("{}: +{:.1}%", s.date, s.change_pct))
            .collect();
        prompt.push_str(&format!("\nSPIKES: {}", spikes.join(", ")));
    }
    if !features.dips.is_empty() {
        let dips: Vec<String> = features
            .dips
            .iter()
            .map(|d| format!("{}: {:.1}%", d.date, d.change_pct))
            .collect();
        prompt.push_str(&format!("\nDIPS: {}", dips.join(", ")));
    }
    if !features.outliers.is_empty() {
        let outliers: Vec<String> = features
            .outliers
            .iter()
            .map(|o| format!("{}: z-score {:.2}", o.date, o.z_score))
            .collect();
        prompt.push_str(&format!("\nOUTLIERS: {}", outliers.join(", ")));
    }

    prompt.push_str(
        "\n\nFocus on overall performance, likely causes of the anomalies, and specific \
         actionable recommendations. Respond with ONLY valid JSON.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use insights_core::AnomalyPoint;

    fn sample_features() -> CalculatedFeatures {
        CalculatedFeatures {
            total: 1200.0,
            average: 40.0,
            min: 10.0,
            max: 90.0,
            median: 38.5,
            std_dev: 12.3,
            trend: 1.7,
            yoy_change: -8.2,
            spikes: vec![AnomalyPoint {
                date: "2025-06-14".to_string(),
                value: 90.0,
                change_pct: 45.0,
            }],
            dips: Vec::new(),
            outliers: Vec::new(),
        }
    }

    #[test]
    fn test_parse_plain_json() {
        let payload = parse_insight_content(
            r#"{"summary_markdown":"<p>Traffic grew.</p>","actions":["a"],"anomalies":[],"confidence":"high"}"#,
        )
        .unwrap();
        assert_eq!(payload.summary_markdown, "<p>Traffic grew.</p>");
        assert_eq!(payload.confidence, Confidence::High);
    }

    #[test]
    fn test_parse_fenced_json() {
        let content = "```json\n{\"summary_markdown\":\"<p>ok</p>\"}\n```";
        let payload = parse_insight_content(content).unwrap();
        assert_eq!(payload.summary_markdown, "<p>ok</p>");
        assert!(payload.actions.is_empty());
        assert_eq!(payload.confidence, Confidence::Low);
    }

    #[test]
    fn test_parse_empty_summary_gets_default() {
        let payload = parse_insight_content(r#"{"actions":["check"]}"#).unwrap();
        assert_eq!(payload.summary_markdown, "No summary available.");
    }

    #[test]
    fn test_parse_rejects_non_json() {
        let result = parse_insight_content("The metric looks fine to me.");
        assert!(matches!(result, Err(InsightsError::InvalidResponse(_))));
    }

    #[test]
    fn test_user_prompt_includes_statistics_and_anomalies() {
        let range = DateRange::new(
            "2025-06-01".parse().unwrap(),
            "2025-06-30".parse().unwrap(),
        );
        let prompt = build_user_prompt(&sample_features(), Metric::Pageviews, &range);

        assert!(prompt.contains("pageviews"));
        assert!(prompt.contains("Total: 1200"));
        assert!(prompt.contains("-8.2%"));
        assert!(prompt.contains("SPIKES: 2025-06-14: +45.0%"));
        assert!(!prompt.contains("DIPS:"));
    }
}
