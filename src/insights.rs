//! Prompt-template selection plus a pass-through call to a text-generation
//! API. No caching and no retries.

use crate::config::{AiConfig, ProviderConfig};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    PerformanceAnalysis,
    Recommendations,
    Summary,
    AnomalyDetection,
}

impl InsightType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "performance_analysis" => Some(Self::PerformanceAnalysis),
            "recommendations" => Some(Self::Recommendations),
            "summary" => Some(Self::Summary),
            "anomaly_detection" => Some(Self::AnomalyDetection),
            _ => None,
        }
    }

    pub fn system_prompt(self) -> &'static str {
        match self {
            InsightType::PerformanceAnalysis => {
                "You are an expert performance analyst for a Bitcoin education company.
Analyze the provided performance metrics and give actionable insights.
Focus on trends, areas of improvement, and notable achievements.
Be concise and specific with your analysis."
            }
            InsightType::Recommendations => {
                "You are a professional development coach for Bitcoin educators.
Based on the provided data, give specific, actionable recommendations to improve performance.
Focus on practical steps that can be implemented immediately.
Keep recommendations prioritized and realistic."
            }
            InsightType::Summary => {
                "You are a business intelligence analyst for a Bitcoin education company.
Summarize the provided data into key insights and takeaways.
Highlight the most important metrics and trends.
Be clear and executive-friendly in your summary."
            }
            InsightType::AnomalyDetection => {
                "You are a data analyst specializing in performance metrics.
Identify any anomalies, outliers, or unusual patterns in the provided data.
Explain what these anomalies might indicate and recommend follow-up actions.
Be specific about what makes each finding unusual."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiProvider {
    Openai,
    Anthropic,
}

impl AiProvider {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "openai" => Some(Self::Openai),
            "anthropic" => Some(Self::Anthropic),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AiProvider::Openai => "openai",
            AiProvider::Anthropic => "anthropic",
        }
    }
}

pub fn user_prompt(data: &Value, context: Option<&str>) -> String {
    let pretty = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
    let mut prompt = format!("Please analyze the following data:\n\n{}", pretty);
    if let Some(ctx) = context.map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str("\n\nAdditional context: ");
        prompt.push_str(ctx);
    }
    prompt
}

#[derive(Debug, Error)]
pub enum InsightError {
    #[error("{0} API key is not configured")]
    MissingApiKey(&'static str),
    #[error("{provider} API error {status}: {body}")]
    Http {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("{provider} request failed: {message}")]
    Transport {
        provider: &'static str,
        message: String,
    },
    #[error("{0} returned no text")]
    EmptyResponse(&'static str),
}

/// One text completion: system prompt + single user turn.
pub trait CompletionClient {
    fn complete(&self, system: &str, user: &str) -> Result<String, InsightError>;
}

fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 500;
    if body.len() <= LIMIT {
        return body.to_string();
    }
    let mut end = LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}

fn post_json(
    provider: &'static str,
    req: ureq::Request,
    body: Value,
) -> Result<Value, InsightError> {
    match req.send_json(body) {
        Ok(resp) => resp.into_json::<Value>().map_err(|e| InsightError::Transport {
            provider,
            message: e.to_string(),
        }),
        Err(ureq::Error::Status(status, resp)) => {
            let body = resp.into_string().unwrap_or_default();
            Err(InsightError::Http {
                provider,
                status,
                body: truncate_body(&body),
            })
        }
        Err(e) => Err(InsightError::Transport {
            provider,
            message: e.to_string(),
        }),
    }
}

pub struct OpenAiClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(cfg: &ProviderConfig, api_key: &str, timeout: Duration, max_tokens: u32) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: cfg.model.clone(),
            max_tokens,
        }
    }
}

impl CompletionClient for OpenAiClient {
    fn complete(&self, system: &str, user: &str) -> Result<String, InsightError> {
        let url = format!("{}/chat/completions", self.base_url);
        let req = self
            .agent
            .post(&url)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Content-Type", "application/json");
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "max_tokens": self.max_tokens,
        });
        let resp = post_json("openai", req, body)?;
        let text = resp
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        Ok(text)
    }
}

pub struct AnthropicClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(cfg: &ProviderConfig, api_key: &str, timeout: Duration, max_tokens: u32) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: cfg.model.clone(),
            max_tokens,
        }
    }
}

impl CompletionClient for AnthropicClient {
    fn complete(&self, system: &str, user: &str) -> Result<String, InsightError> {
        let url = format!("{}/messages", self.base_url);
        let req = self
            .agent
            .post(&url)
            .set("x-api-key", &self.api_key)
            .set("anthropic-version", "2023-06-01")
            .set("Content-Type", "application/json");
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": system,
            "messages": [{ "role": "user", "content": user }],
        });
        let resp = post_json("anthropic", req, body)?;
        // First text block wins; tool or thinking blocks are ignored.
        let text = resp
            .get("content")
            .and_then(|c| c.as_array())
            .and_then(|blocks| {
                blocks
                    .iter()
                    .find(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
            })
            .and_then(|b| b.get("text"))
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .to_string();
        Ok(text)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Insight {
    pub content: String,
    pub provider: AiProvider,
}

/// Routes an insight request to the configured provider client.
pub struct InsightService {
    openai: Option<Box<dyn CompletionClient>>,
    anthropic: Option<Box<dyn CompletionClient>>,
}

impl InsightService {
    pub fn from_config(cfg: &AiConfig) -> Self {
        let timeout = Duration::from_secs(cfg.timeout_secs);
        let openai = cfg.openai.api_key.as_deref().map(|key| {
            Box::new(OpenAiClient::new(&cfg.openai, key, timeout, cfg.max_tokens))
                as Box<dyn CompletionClient>
        });
        let anthropic = cfg.anthropic.api_key.as_deref().map(|key| {
            Box::new(AnthropicClient::new(
                &cfg.anthropic,
                key,
                timeout,
                cfg.max_tokens,
            )) as Box<dyn CompletionClient>
        });
        Self { openai, anthropic }
    }

    #[allow(dead_code)]
    pub fn with_clients(
        openai: Option<Box<dyn CompletionClient>>,
        anthropic: Option<Box<dyn CompletionClient>>,
    ) -> Self {
        Self { openai, anthropic }
    }

    pub fn generate(
        &self,
        insight_type: InsightType,
        data: &Value,
        context: Option<&str>,
        provider: AiProvider,
    ) -> Result<Insight, InsightError> {
        let client = match provider {
            AiProvider::Openai => self.openai.as_deref(),
            AiProvider::Anthropic => self.anthropic.as_deref(),
        }
        .ok_or(InsightError::MissingApiKey(provider.as_str()))?;

        debug!(provider = provider.as_str(), ?insight_type, "requesting insight");
        let content = client
            .complete(insight_type.system_prompt(), &user_prompt(data, context))
            .map_err(|e| {
                warn!(provider = provider.as_str(), error = %e, "insight request failed");
                e
            })?;
        if content.trim().is_empty() {
            return Err(InsightError::EmptyResponse(provider.as_str()));
        }
        Ok(Insight { content, provider })
    }
}
