//! Anthropic Claude strategy generator.
//!
//! Implements `StrategyGenerator` using the Anthropic Messages API.
//! Handles prompt construction, rate limiting with exponential backoff,
//! and lenient JSON extraction. Any failure (transport, HTTP, parse)
//! falls back to the default blueprint for the requested type.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use super::{build_context, extract_json, StrategyBlueprint, StrategyDefaults, StrategyGenerator};
use crate::config::LlmConfig;
use crate::types::{Market, Opportunity, StrategyDescriptor, StrategyType};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Maximum retries on rate limit / server errors.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (ms).
const BASE_BACKOFF_MS: u64 = 1000;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct AnthropicStrategyGenerator {
    http: Client,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
    defaults: StrategyDefaults,
    total_calls: AtomicU64,
}

impl AnthropicStrategyGenerator {
    pub fn new(api_key: SecretString, cfg: &LlmConfig, defaults: StrategyDefaults) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to build Anthropic HTTP client")?;

        Ok(Self {
            http,
            api_key,
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            defaults,
            total_calls: AtomicU64::new(0),
        })
    }

    /// Successful API calls so far.
    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    /// Send a messages request with retry + backoff.
    async fn call_api(&self, user_message: &str) -> Result<String> {
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user".to_string(),
                content: user_message.to_string(),
            }],
        };

        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, delay_ms = delay, "Retrying Anthropic API call");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            let resp = self
                .http
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", self.api_key.expose_secret())
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: MessagesResponse = response
                            .json()
                            .await
                            .context("Failed to parse Anthropic response")?;

                        let text = body
                            .content
                            .iter()
                            .filter_map(|b| b.text.as_deref())
                            .collect::<Vec<_>>()
                            .join("");

                        if let Some(usage) = body.usage {
                            debug!(
                                input_tokens = usage.input_tokens,
                                output_tokens = usage.output_tokens,
                                "Anthropic usage"
                            );
                        }
                        self.total_calls.fetch_add(1, Ordering::Relaxed);
                        return Ok(text);
                    }

                    // Retryable errors: 429 (rate limit), 500+, 529 (overloaded)
                    if status.as_u16() == 429 || status.as_u16() >= 500 {
                        let error_text = response.text().await.unwrap_or_default();
                        warn!(status = %status, attempt, error = %error_text, "Retryable Anthropic API error");
                        last_error = Some(format!("HTTP {status}: {error_text}"));
                        continue;
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    anyhow::bail!("Anthropic API error {status}: {error_text}");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Anthropic request failed");
                    last_error = Some(format!("Request error: {e}"));
                }
            }
        }

        anyhow::bail!(
            "Anthropic API failed after {} retries: {}",
            MAX_RETRIES,
            last_error.unwrap_or_default()
        )
    }

    /// Build the blueprint prompt for one strategy type.
    pub fn build_prompt(strategy_type: StrategyType, context: &str) -> String {
        format!(
            r#"You are an expert trading strategy developer for prediction markets (Polymarket).

Create a trading strategy blueprint in JSON format based on the following:

Strategy Type: {strategy_type}
Context:
{context}

Generate a strategy that:
1. Has clear entry and exit rules
2. Includes risk management parameters
3. Is specific and actionable
4. Has a descriptive name and explanation

Return ONLY valid JSON in this exact format:
{{
  "name": "strategy_name",
  "description": "Strategy description",
  "parameters": {{"param1": "value1"}},
  "entry_rules": {{
    "YES": ["condition1", "condition2"],
    "NO": ["condition1"]
  }},
  "exit_rules": {{
    "YES": ["exit_condition"],
    "NO": ["exit_condition"]
  }},
  "risk_management": {{
    "stop_loss_pct": 0.1,
    "take_profit_pct": 0.2,
    "max_position_size": 0.2,
    "max_drawdown": 0.2
  }}
}}

Be creative but realistic. Focus on {strategy_type} strategies."#
        )
    }

    /// Parse a blueprint out of free-form model output.
    pub fn parse_blueprint(text: &str) -> Result<StrategyBlueprint> {
        let json = extract_json(text);
        let blueprint: StrategyBlueprint =
            serde_json::from_str(json).context("Model output is not a strategy blueprint")?;
        if blueprint.name.trim().is_empty() {
            anyhow::bail!("Strategy blueprint has an empty name");
        }
        Ok(blueprint)
    }
}

#[async_trait]
impl StrategyGenerator for AnthropicStrategyGenerator {
    async fn generate(
        &self,
        strategy_type: StrategyType,
        markets: &[Market],
        opportunities: &[Opportunity],
    ) -> Result<StrategyDescriptor> {
        let context = build_context(strategy_type, &self.defaults, markets, opportunities);
        let prompt = Self::build_prompt(strategy_type, &context);

        let blueprint = match self.call_api(&prompt).await {
            Ok(text) => Self::parse_blueprint(&text).unwrap_or_else(|e| {
                warn!(strategy_type = %strategy_type, error = %e, "Unusable blueprint, using default");
                StrategyBlueprint::default_for(strategy_type, &self.defaults)
            }),
            Err(e) => {
                warn!(strategy_type = %strategy_type, error = %e, "Strategy generation failed, using default");
                StrategyBlueprint::default_for(strategy_type, &self.defaults)
            }
        };

        let descriptor = blueprint.into_descriptor(strategy_type, &self.defaults);
        info!(
            strategy = %descriptor.name,
            strategy_type = %strategy_type,
            win_rate = descriptor.test_results.win_rate,
            total_return = descriptor.test_results.total_return,
            "Strategy generated"
        );
        Ok(descriptor)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
