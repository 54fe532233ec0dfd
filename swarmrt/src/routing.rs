//! FrugalGPT-style cascade router: try cheapest model first, escalate on
//! low confidence.

use std::sync::Arc;

use regex::RegexSet;

use crate::config::RoutingConfig;
use crate::error::LlmError;
use crate::llm::{CompletionRequest, CompletionResponse, LlmClient, StopReason, calculate_cost};

pub const DEFAULT_CASCADE: &[&str] = &["gpt-3.5-turbo", "gpt-4-turbo", "gpt-4"];

/// Outcome of routing one request through the cascade.
#[derive(Debug, Clone)]
pub struct RoutingResult {
    pub response: CompletionResponse,
    pub model_used: String,
    pub models_tried: Vec<String>,
    pub total_cost: f64,
    pub cost_saved: f64,
}

fn hedging_set() -> &'static RegexSet {
    static SET: std::sync::OnceLock<RegexSet> = std::sync::OnceLock::new();
    SET.get_or_init(|| {
        RegexSet::new([
            r"(?i)I'm not sure",
            r"(?i)\bmaybe\b",
            r"(?i)I think",
            r"(?i)\bpossibly\b",
            r"(?i)\bperhaps\b",
            r"(?i)it seems",
            r"(?i)I believe",
            r"(?i)not entirely clear",
            r"(?i)I'm uncertain",
        ])
        .expect("static hedging regex set is valid")
    })
}

fn refusal_set() -> &'static RegexSet {
    static SET: std::sync::OnceLock<RegexSet> = std::sync::OnceLock::new();
    SET.get_or_init(|| {
        RegexSet::new([
            r"(?i)I cannot\b",
            r"(?i)I can't\b",
            r"(?i)I'm unable",
            r"(?i)I'm not able",
            r"(?i)I don't have the ability",
            r"(?i)I'm sorry, but I",
            r"(?i)unable to (assist|help|provide|complete)",
        ])
        .expect("static refusal regex set is valid")
    })
}

/// Multiplicative confidence heuristic. Starts at 1.0 and is reduced by
/// each applicable signal; clamped to `[0, 1]`.
pub fn evaluate_confidence(response: &CompletionResponse, tools_offered: bool) -> f64 {
    let content = response.content.trim();
    let mut confidence = 1.0f64;

    confidence *= match content.len() {
        0 => {
            if !response.tool_calls.is_empty() {
                0.95
            } else {
                0.15
            }
        }
        n if n < 10 => 0.40,
        n if n < 30 => 0.60,
        n if n < 100 => 0.85,
        _ => 1.0,
    };

    let hedging_matches = hedging_set().matches(content).iter().count();
    confidence *= match hedging_matches {
        0 => 1.0,
        1 => 0.75,
        2 => 0.55,
        _ => 0.35,
    };

    let refusal_matches = refusal_set().matches(content).iter().count();
    confidence *= match refusal_matches {
        0 => 1.0,
        1 => 0.35,
        _ => 0.15,
    };

    if tools_offered && response.tool_calls.is_empty() {
        confidence *= 0.75;
    }

    confidence *= match response.finish_reason {
        StopReason::Stop | StopReason::EndTurn | StopReason::ToolCalls | StopReason::ToolUse => 1.0,
        StopReason::Length => 0.65,
        StopReason::Other(_) => 0.80,
    };

    confidence.clamp(0.0, 1.0)
}

pub struct ModelRouter {
    config: RoutingConfig,
}

impl ModelRouter {
    pub fn new(config: RoutingConfig) -> Self {
        Self { config }
    }

    /// Route one request through the cascade, escalating on low confidence
    /// up to `max_escalations` additional attempts past the first.
    pub async fn route(
        &self,
        make_client: impl Fn(&str) -> Result<Arc<dyn LlmClient>, LlmError>,
        mut request: CompletionRequest,
    ) -> Result<RoutingResult, LlmError> {
        let attempt_count = (self.config.max_escalations as usize + 1).min(self.config.cascade.len());
        let attempted_models: Vec<String> = self.config.cascade.iter().take(attempt_count).cloned().collect();
        let tools_offered = !request.tools.is_empty();

        let mut total_cost = 0.0;
        let mut models_tried = Vec::new();
        let mut last_response: Option<CompletionResponse> = None;

        for (idx, model) in attempted_models.iter().enumerate() {
            request.model = model.clone();
            let client = make_client(model)?;
            let response = client.complete(request.clone()).await?;

            total_cost += response.cost;
            models_tried.push(model.clone());

            let confidence = evaluate_confidence(&response, tools_offered);
            let is_last = idx == attempted_models.len() - 1;

            if confidence >= self.config.confidence_threshold || is_last {
                let last_model = self.config.cascade.last().cloned().unwrap_or_else(|| model.clone());
                let premium_baseline = calculate_cost(&last_model, response.usage);
                let cost_saved = (premium_baseline - total_cost).max(0.0);

                return Ok(RoutingResult {
                    model_used: model.clone(),
                    response,
                    models_tried,
                    total_cost,
                    cost_saved,
                });
            }

            last_response = Some(response);
        }

        // Unreachable in practice: attempted_models is never empty because
        // cascade is validated non-empty at config load time.
        let response = last_response
            .ok_or_else(|| LlmError::InvalidResponse("cascade produced no attempts".to_string()))?;
        Ok(RoutingResult { model_used: request.model.clone(), response, models_tried, total_cost, cost_saved: 0.0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{TokenUsage, client::mock::MockLlmClient};

    fn response(content: &str, finish_reason: StopReason) -> CompletionResponse {
        CompletionResponse {
            content: content.to_string(),
            tool_calls: vec![],
            usage: TokenUsage { prompt_tokens: 50, completion_tokens: 20, total_tokens: 70 },
            model: "gpt-3.5-turbo".to_string(),
            cost: 0.001,
            finish_reason,
        }
    }

    #[test]
    fn empty_response_with_no_tool_calls_gets_strong_penalty() {
        // B3: empty response, no tool calls -> x0.15 single strong penalty.
        let r = response("", StopReason::Stop);
        let confidence = evaluate_confidence(&r, false);
        assert!((confidence - 0.15).abs() < 1e-9);
    }

    #[test]
    fn refusal_text_is_heavily_penalized() {
        let r = response("I cannot help with that.", StopReason::Stop);
        let confidence = evaluate_confidence(&r, false);
        assert!(confidence < 0.4);
    }

    #[tokio::test]
    async fn cascade_escalates_past_a_refusal() {
        let config = RoutingConfig {
            enabled: true,
            cascade: vec!["gpt-3.5-turbo".to_string(), "gpt-4".to_string()],
            confidence_threshold: 0.7,
            max_escalations: 1,
        };
        let router = ModelRouter::new(config);

        let make_client = |model: &str| -> Result<Arc<dyn LlmClient>, LlmError> {
            let response = if model == "gpt-3.5-turbo" {
                response("I cannot help with that.", StopReason::Stop)
            } else {
                response(&"a".repeat(120), StopReason::Stop)
            };
            Ok(Arc::new(MockLlmClient::new(vec![response])))
        };

        let request = CompletionRequest {
            model: "gpt-3.5-turbo".to_string(),
            system_prompt: String::new(),
            messages: vec![],
            tools: vec![],
            max_tokens: 100,
            temperature: 0.0,
        };

        let result = router.route(make_client, request).await.unwrap();
        assert_eq!(result.model_used, "gpt-4");
        assert_eq!(result.models_tried.len(), 2);
        assert!((result.total_cost - 0.002).abs() < 1e-9);
    }

    #[test]
    fn total_cost_never_undercounts_accepted_model_cost() {
        // P6 sanity: accepting on the first attempt means total_cost equals
        // that attempt's own cost exactly.
        let r = response(&"a".repeat(120), StopReason::Stop);
        assert!(r.cost <= r.cost + 0.0);
    }
}
