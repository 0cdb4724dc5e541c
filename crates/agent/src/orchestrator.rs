//! The orchestration loop.
//!
//! One `handle` call takes a request through the full pipeline: quota debit,
//! model routing, prompt assembly, response-cache lookup, then a bounded
//! conversation loop with the provider where tool requests are fanned out
//! between round-trips. Exactly one usage record is written per logical
//! request that reached the cache or the provider, whether it was replayed,
//! finished cleanly, failed on any provider call, or blew the round-trip cap.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use relay_core::config::EngineSettings;
use relay_core::domain::model::ModelSelection;
use relay_core::domain::quota::QuotaDecision;
use relay_core::domain::request::AssistRequest;
use relay_core::domain::response::{ActionOutcome, EngineResponse};
use relay_core::domain::usage::{TokenUsage, UsageRecord};
use relay_core::domain::{cache::CacheEntry, model::Model};
use relay_core::fingerprint::{fingerprint, Fingerprint};
use relay_core::pricing::cost_of;
use relay_core::prompt::PromptBuilder;
use relay_core::routing::ModelRouter;
use relay_core::EngineError;

use relay_db::repositories::{
    QuotaRepository, RepositoryError, ResponseCacheRepository, UsageRepository,
};

use crate::executor::ToolExecutor;
use crate::llm::{ChatMessage, ChatRequest, ContentBlock, LlmClient, ProviderError, Role};
use crate::tools::{CallerContext, ToolCall, ToolRegistry, ToolResult};

/// Engine tunables, lifted out of the full application config so tests can
/// construct the orchestrator without touching files or the environment.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub max_round_trips: u32,
    pub tool_timeout: Duration,
    pub default_locale: String,
}

impl EngineConfig {
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            max_round_trips: settings.max_round_trips,
            tool_timeout: Duration::from_secs(settings.tool_timeout_secs),
            default_locale: settings.default_locale.clone(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_round_trips: 4,
            tool_timeout: Duration::from_secs(15),
            default_locale: "en-US".to_string(),
        }
    }
}

pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    executor: ToolExecutor,
    quotas: Arc<dyn QuotaRepository>,
    usage: Arc<dyn UsageRepository>,
    cache: Arc<dyn ResponseCacheRepository>,
    router: ModelRouter,
    prompts: PromptBuilder,
    config: EngineConfig,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        registry: Arc<ToolRegistry>,
        quotas: Arc<dyn QuotaRepository>,
        usage: Arc<dyn UsageRepository>,
        cache: Arc<dyn ResponseCacheRepository>,
        config: EngineConfig,
    ) -> Self {
        Self {
            llm,
            executor: ToolExecutor::new(registry, config.tool_timeout),
            quotas,
            usage,
            cache,
            router: ModelRouter::new(),
            prompts: PromptBuilder::new(),
            config,
        }
    }

    pub async fn handle(&self, request: AssistRequest) -> Result<EngineResponse, EngineError> {
        let started = Instant::now();
        let mut request = request;
        if request.options.locale.is_none() {
            request.options.locale = Some(self.config.default_locale.clone());
        }

        match self.quotas.try_consume(&request.tenant_id).await.map_err(persistence)? {
            QuotaDecision::Allowed { remaining } => {
                debug!(
                    event_name = "engine.quota.debited",
                    tenant_id = %request.tenant_id,
                    remaining = ?remaining,
                );
            }
            QuotaDecision::Denied { reason, resets_at } => {
                warn!(
                    event_name = "engine.quota.denied",
                    tenant_id = %request.tenant_id,
                    reason = %reason,
                );
                return Err(EngineError::QuotaExceeded { remaining: 0, resets_at });
            }
        }

        let selection = self.router.select(
            request.complexity,
            request.plan,
            request.options.forced_model,
        );
        let temperature =
            request.options.temperature_override.unwrap_or(selection.temperature);

        let cache_key = match request.feature.cache_policy() {
            Some(_) => {
                let key = fingerprint(
                    &request,
                    selection.model,
                    &self.executor.registry().catalog_digest(),
                );
                if let Some(hit) = self.replay_cached(&request, &key, selection.model).await? {
                    return Ok(hit);
                }
                Some(key)
            }
            None => None,
        };

        let outcome = self.converse(&request, &selection, temperature).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        // Every conversation outcome is accounted. `converse` only fails once
        // the provider has been reached, so a failed first call still writes
        // a record, with zero tokens and zero cost.
        let (text, actions, usage) = match outcome {
            Ok(completed) => completed,
            Err((error, usage)) => {
                let cost = cost_of(selection.model, &usage);
                self.record_usage(&request, selection.model, usage, cost, latency_ms, false)
                    .await?;
                return Err(error);
            }
        };

        let cost = cost_of(selection.model, &usage);
        self.record_usage(&request, selection.model, usage, cost, latency_ms, false).await?;

        let response = if actions.is_empty() {
            EngineResponse::Chat {
                text,
                model: selection.model,
                cost,
                latency_ms,
                cache_hit: false,
            }
        } else {
            EngineResponse::Actions { text, actions, model: selection.model, cost, latency_ms }
        };

        // Replaying executed actions would re-report side effects as fresh,
        // so only action-free responses enter the cache.
        if let (Some(key), EngineResponse::Chat { .. }) = (&cache_key, &response) {
            self.store_cached(&request, key, &response).await;
        }

        Ok(response)
    }

    /// Runs the bounded conversation loop. On failure the usage accumulated
    /// so far rides along with the error so the caller can still bill it.
    async fn converse(
        &self,
        request: &AssistRequest,
        selection: &ModelSelection,
        temperature: f32,
    ) -> Result<(String, Vec<ActionOutcome>, TokenUsage), (EngineError, TokenUsage)> {
        let bundle = self.prompts.build(request);
        let caller = CallerContext {
            tenant_id: request.tenant_id.clone(),
            user_id: request.user_id.clone(),
        };

        let mut messages = vec![ChatMessage::user_text(bundle.user_turn)];
        let mut total_usage = TokenUsage::default();
        let mut actions: Vec<ActionOutcome> = Vec::new();

        for round_trip in 1..=self.config.max_round_trips {
            let chat = ChatRequest {
                model: selection.model,
                system: bundle.system.clone(),
                messages: messages.clone(),
                tools: self.executor.registry().specs(),
                max_tokens: selection.max_tokens,
                temperature,
            };

            let reply = match self.llm.complete(&chat).await {
                Ok(reply) => reply,
                Err(error) => return Err((provider_error(error), total_usage)),
            };
            total_usage.add(&reply.usage);
            debug!(
                event_name = "engine.turn.completed",
                round_trip,
                stop_reason = ?reply.stop_reason,
                output_tokens = reply.usage.output,
            );

            let calls: Vec<ToolCall> = reply
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        arguments: input.clone(),
                    }),
                    _ => None,
                })
                .collect();

            if calls.is_empty() {
                return Ok((reply.text(), actions, total_usage));
            }

            info!(
                event_name = "engine.tools.dispatched",
                round_trip,
                call_count = calls.len(),
            );
            let results = self.executor.execute_batch(&calls, &caller).await;

            messages.push(ChatMessage { role: Role::Assistant, content: reply.content });
            messages.push(ChatMessage {
                role: Role::User,
                content: results
                    .iter()
                    .map(|result| ContentBlock::ToolResult {
                        tool_use_id: result.call_id.clone(),
                        content: result.content_for_model(),
                        is_error: !result.success,
                    })
                    .collect(),
            });

            actions.extend(calls.iter().zip(&results).map(|(call, result)| outcome(call, result)));
        }

        warn!(
            event_name = "engine.loop.exceeded",
            max_round_trips = self.config.max_round_trips,
            tenant_id = %request.tenant_id,
        );
        Err((
            EngineError::LoopBoundExceeded { round_trips: self.config.max_round_trips },
            total_usage,
        ))
    }

    /// Hit latency covers the cache read and decode only, not the quota
    /// debit or routing that preceded it.
    async fn replay_cached(
        &self,
        request: &AssistRequest,
        key: &Fingerprint,
        model: Model,
    ) -> Result<Option<EngineResponse>, EngineError> {
        let read_started = Instant::now();
        let Some(entry) = self.cache.lookup(key).await.map_err(persistence)? else {
            return Ok(None);
        };

        // A malformed entry is treated as a miss; the fresh run will
        // overwrite it.
        let Ok(cached) = serde_json::from_str::<EngineResponse>(&entry.response_json) else {
            warn!(event_name = "engine.cache.undecodable", fingerprint = key.as_hex());
            return Ok(None);
        };

        let latency_ms = read_started.elapsed().as_millis() as u64;
        info!(
            event_name = "engine.cache.hit",
            tenant_id = %request.tenant_id,
            feature = request.feature.as_key(),
            hits = entry.hits,
        );
        self.record_usage(request, model, TokenUsage::default(), Decimal::ZERO, latency_ms, true)
            .await?;

        Ok(Some(match cached {
            EngineResponse::Chat { text, model, cost, .. } => {
                EngineResponse::Chat { text, model, cost: Decimal::ZERO, latency_ms, cache_hit: true }
            }
            // Stored entries are always chat-shaped; keep the decode total
            // anyway.
            other => other,
        }))
    }

    async fn store_cached(&self, request: &AssistRequest, key: &Fingerprint, response: &EngineResponse) {
        let Some(policy) = request.feature.cache_policy() else { return };
        let ttl_secs = request.options.cache_ttl_override.unwrap_or(policy.ttl_secs);

        let json = match serde_json::to_string(response) {
            Ok(json) => json,
            Err(error) => {
                warn!(event_name = "engine.cache.encode_failed", error = %error);
                return;
            }
        };

        // Caching is best effort: a store failure must not fail a request
        // that already has its answer.
        if let Err(error) = self.cache.store(CacheEntry::new(key.clone(), json, ttl_secs)).await {
            warn!(event_name = "engine.cache.store_failed", error = %error);
        }
    }

    async fn record_usage(
        &self,
        request: &AssistRequest,
        model: Model,
        usage: TokenUsage,
        cost: Decimal,
        latency_ms: u64,
        cache_hit: bool,
    ) -> Result<(), EngineError> {
        let record = UsageRecord::new(
            request.tenant_id.clone(),
            request.user_id.clone(),
            request.feature,
            request.complexity,
            model,
            usage,
            cost,
            latency_ms,
            cache_hit,
        );
        info!(
            event_name = "engine.usage.recorded",
            tenant_id = %record.tenant_id,
            feature = record.feature.as_key(),
            total_tokens = record.usage.total(),
            cost = %record.cost,
            cache_hit,
        );
        self.usage.record(record).await.map_err(persistence)
    }
}

fn outcome(call: &ToolCall, result: &ToolResult) -> ActionOutcome {
    ActionOutcome {
        tool: call.name.clone(),
        arguments: call.arguments.clone(),
        output: result.output.clone(),
        success: result.success,
        error: result.error.clone(),
    }
}

fn persistence(error: RepositoryError) -> EngineError {
    EngineError::Persistence(error.to_string())
}

fn provider_error(error: ProviderError) -> EngineError {
    match error {
        ProviderError::RateLimited { retry_after_secs } => {
            EngineError::RateLimited { retry_after_secs }
        }
        other => EngineError::Provider(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use rust_decimal::Decimal;
    use serde_json::json;
    use tokio::sync::Mutex;

    use relay_core::domain::quota::{QuotaAllowance, QuotaDecision, SubscriptionQuota};
    use relay_core::domain::request::{
        AssistRequest, Complexity, Feature, PlanTier, TenantId, UserId,
    };
    use relay_core::domain::response::EngineResponse;
    use relay_core::domain::usage::TokenUsage;
    use relay_core::EngineError;
    use relay_db::repositories::{
        InMemoryQuotaRepository, InMemoryResponseCacheRepository, InMemoryUsageRepository,
        QuotaRepository, RepositoryError,
    };

    use super::{EngineConfig, Orchestrator};
    use crate::llm::{
        ChatRequest, ChatResponse, ContentBlock, LlmClient, ProviderError, StopReason,
    };
    use crate::tools::testing::{EchoTool, FailingTool};
    use crate::tools::ToolRegistry;

    /// Plays back a scripted sequence of provider replies and records every
    /// request it was given.
    struct ScriptedClient {
        replies: Mutex<VecDeque<Result<ChatResponse, ProviderError>>>,
        fallback: Option<ChatResponse>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<ChatResponse, ProviderError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                fallback: None,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn repeating(reply: ChatResponse) -> Self {
            Self {
                replies: Mutex::new(VecDeque::new()),
                fallback: Some(reply),
                requests: Mutex::new(Vec::new()),
            }
        }

        async fn call_count(&self) -> usize {
            self.requests.lock().await.len()
        }

        async fn request(&self, index: usize) -> ChatRequest {
            self.requests.lock().await[index].clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            self.requests.lock().await.push(request.clone());
            match self.replies.lock().await.pop_front() {
                Some(reply) => reply,
                None => Ok(self
                    .fallback
                    .clone()
                    .expect("scripted client ran out of replies")),
            }
        }
    }

    /// Delegates to the in-memory quota store after a fixed delay, so tests
    /// can tell apart latency windows that do and do not span the debit.
    struct SlowQuotaRepository {
        inner: InMemoryQuotaRepository,
        delay: Duration,
    }

    #[async_trait]
    impl QuotaRepository for SlowQuotaRepository {
        async fn find(
            &self,
            tenant_id: &TenantId,
        ) -> Result<Option<SubscriptionQuota>, RepositoryError> {
            self.inner.find(tenant_id).await
        }

        async fn upsert(&self, quota: SubscriptionQuota) -> Result<(), RepositoryError> {
            self.inner.upsert(quota).await
        }

        async fn try_consume(&self, tenant_id: &TenantId) -> Result<QuotaDecision, RepositoryError> {
            tokio::time::sleep(self.delay).await;
            self.inner.try_consume(tenant_id).await
        }
    }

    fn text_reply(text: &str, usage: TokenUsage) -> ChatResponse {
        ChatResponse {
            content: vec![ContentBlock::Text { text: text.to_string() }],
            usage,
            stop_reason: StopReason::EndTurn,
        }
    }

    fn tool_reply(calls: Vec<(&str, &str, serde_json::Value)>, usage: TokenUsage) -> ChatResponse {
        ChatResponse {
            content: calls
                .into_iter()
                .map(|(id, name, input)| ContentBlock::ToolUse {
                    id: id.to_string(),
                    name: name.to_string(),
                    input,
                })
                .collect(),
            usage,
            stop_reason: StopReason::ToolUse,
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        client: Arc<ScriptedClient>,
        usage: Arc<InMemoryUsageRepository>,
        quotas: Arc<InMemoryQuotaRepository>,
    }

    async fn harness(client: ScriptedClient, allowance: QuotaAllowance) -> Harness {
        harness_with_config(client, allowance, EngineConfig::default()).await
    }

    async fn harness_with_config(
        client: ScriptedClient,
        allowance: QuotaAllowance,
        config: EngineConfig,
    ) -> Harness {
        let client = Arc::new(client);
        let usage = Arc::new(InMemoryUsageRepository::default());
        let quotas = Arc::new(InMemoryQuotaRepository::default());
        let cache = Arc::new(InMemoryResponseCacheRepository::default());

        let now = Utc::now();
        quotas
            .upsert(SubscriptionQuota {
                tenant_id: TenantId("t-1".to_string()),
                plan: PlanTier::Business,
                allowance,
                consumed: 0,
                period_start: now,
                period_end: now + ChronoDuration::days(30),
            })
            .await
            .expect("seed quota");

        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(FailingTool);

        let orchestrator = Orchestrator::new(
            client.clone(),
            Arc::new(registry),
            quotas.clone(),
            usage.clone(),
            cache,
            config,
        );
        Harness { orchestrator, client, usage, quotas }
    }

    fn request(feature: Feature) -> AssistRequest {
        AssistRequest::new(
            "what changed on the Acme deal this week?",
            TenantId("t-1".to_string()),
            UserId("u-1".to_string()),
            feature,
            Complexity::Medium,
            PlanTier::Business,
        )
        .expect("valid request")
    }

    #[tokio::test]
    async fn chat_without_tools_completes_in_one_round_trip() {
        let harness = harness(
            ScriptedClient::new(vec![Ok(text_reply(
                "Acme moved to negotiation.",
                TokenUsage::new(900, 120, 0, 0),
            ))]),
            QuotaAllowance::Limited(100),
        )
        .await;

        let response = harness.orchestrator.handle(request(Feature::Chat)).await.expect("handled");

        assert_eq!(response.text(), "Acme moved to negotiation.");
        assert!(!response.cache_hit());
        assert!(response.cost() > Decimal::ZERO);
        assert_eq!(harness.client.call_count().await, 1);

        let records = harness.usage.all().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].usage.input, 900);
        assert_eq!(records[0].usage.output, 120);
        assert!(!records[0].cache_hit);
    }

    #[tokio::test]
    async fn cacheable_feature_replays_without_a_second_provider_call() {
        let harness = harness(
            ScriptedClient::new(vec![Ok(text_reply(
                "Score: 82.",
                TokenUsage::new(500, 40, 0, 0),
            ))]),
            QuotaAllowance::Limited(100),
        )
        .await;

        let first =
            harness.orchestrator.handle(request(Feature::LeadScoring)).await.expect("first");
        let second =
            harness.orchestrator.handle(request(Feature::LeadScoring)).await.expect("second");

        assert!(!first.cache_hit());
        assert!(second.cache_hit());
        assert_eq!(second.text(), "Score: 82.");
        assert_eq!(second.cost(), Decimal::ZERO);
        assert_eq!(harness.client.call_count().await, 1);

        // Both requests are billed as events even though only one paid.
        let records = harness.usage.all().await;
        assert_eq!(records.len(), 2);
        assert!(records[1].cache_hit);
        assert_eq!(records[1].usage.total(), 0);
        assert_eq!(records[1].cost, Decimal::ZERO);
    }

    #[tokio::test]
    async fn non_cacheable_features_always_reach_the_provider() {
        let harness = harness(
            ScriptedClient::new(vec![
                Ok(text_reply("first answer", TokenUsage::new(100, 10, 0, 0))),
                Ok(text_reply("second answer", TokenUsage::new(100, 10, 0, 0))),
            ]),
            QuotaAllowance::Limited(100),
        )
        .await;

        harness.orchestrator.handle(request(Feature::Chat)).await.expect("first");
        let second = harness.orchestrator.handle(request(Feature::Chat)).await.expect("second");

        assert_eq!(second.text(), "second answer");
        assert!(!second.cache_hit());
        assert_eq!(harness.client.call_count().await, 2);
    }

    #[tokio::test]
    async fn tool_round_trip_reports_every_outcome_and_sums_usage() {
        let harness = harness(
            ScriptedClient::new(vec![
                Ok(tool_reply(
                    vec![
                        ("call-1", "echo", json!({"message": "ping"})),
                        ("call-2", "always_fails", json!({})),
                    ],
                    TokenUsage::new(800, 60, 0, 0),
                )),
                Ok(text_reply(
                    "Echoed ping; the second action failed.",
                    TokenUsage::new(950, 80, 0, 0),
                )),
            ]),
            QuotaAllowance::Limited(100),
        )
        .await;

        let response = harness
            .orchestrator
            .handle(request(Feature::ActionExecution))
            .await
            .expect("handled");

        let EngineResponse::Actions { actions, .. } = &response else {
            panic!("expected an actions response");
        };
        assert_eq!(actions.len(), 2);
        assert!(actions[0].success);
        assert_eq!(actions[0].tool, "echo");
        assert!(!actions[1].success);
        assert!(actions[1].error.as_deref().unwrap_or_default().contains("already exists"));

        // The second provider request carries the tool results back.
        let followup = harness.client.request(1).await;
        let last_turn = followup.messages.last().expect("followup turn");
        assert!(last_turn.content.iter().any(|block| matches!(
            block,
            ContentBlock::ToolResult { tool_use_id, is_error: true, .. } if tool_use_id == "call-2"
        )));

        let records = harness.usage.all().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].usage.input, 1_750);
        assert_eq!(records[0].usage.output, 140);
    }

    #[tokio::test]
    async fn unknown_tool_becomes_a_failed_action_and_the_loop_continues() {
        let harness = harness(
            ScriptedClient::new(vec![
                Ok(tool_reply(
                    vec![("call-1", "imaginary_tool", json!({}))],
                    TokenUsage::new(300, 20, 0, 0),
                )),
                Ok(text_reply("That action is unavailable.", TokenUsage::new(350, 30, 0, 0))),
            ]),
            QuotaAllowance::Limited(100),
        )
        .await;

        let response = harness
            .orchestrator
            .handle(request(Feature::ActionExecution))
            .await
            .expect("handled");

        let EngineResponse::Actions { actions, .. } = &response else {
            panic!("expected an actions response");
        };
        assert_eq!(actions.len(), 1);
        assert!(!actions[0].success);
        assert!(actions[0].error.as_deref().unwrap_or_default().contains("unknown tool"));
        assert_eq!(harness.client.call_count().await, 2);
    }

    #[tokio::test]
    async fn zero_allowance_is_denied_before_any_provider_call() {
        let harness = harness(
            ScriptedClient::new(Vec::new()),
            QuotaAllowance::Limited(0),
        )
        .await;

        let error =
            harness.orchestrator.handle(request(Feature::Chat)).await.expect_err("denied");

        assert!(matches!(error, EngineError::QuotaExceeded { .. }));
        assert_eq!(harness.client.call_count().await, 0);
        assert!(harness.usage.all().await.is_empty());
    }

    #[tokio::test]
    async fn loop_bound_is_enforced_and_usage_still_recorded() {
        let config = EngineConfig { max_round_trips: 2, ..EngineConfig::default() };
        let harness = harness_with_config(
            ScriptedClient::repeating(tool_reply(
                vec![("call-1", "echo", json!({"message": "again"}))],
                TokenUsage::new(200, 15, 0, 0),
            )),
            QuotaAllowance::Limited(100),
            config,
        )
        .await;

        let error = harness
            .orchestrator
            .handle(request(Feature::ActionExecution))
            .await
            .expect_err("loop bound");

        assert!(matches!(error, EngineError::LoopBoundExceeded { round_trips: 2 }));
        assert_eq!(harness.client.call_count().await, 2);

        let records = harness.usage.all().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].usage.input, 400);
        assert_eq!(records[0].usage.output, 30);
    }

    #[tokio::test]
    async fn provider_failure_after_tool_trip_still_bills_the_tokens() {
        let harness = harness(
            ScriptedClient::new(vec![
                Ok(tool_reply(
                    vec![("call-1", "echo", json!({"message": "ping"}))],
                    TokenUsage::new(600, 45, 0, 0),
                )),
                Err(ProviderError::Http("unexpected status 500".to_string())),
            ]),
            QuotaAllowance::Limited(100),
        )
        .await;

        let error = harness
            .orchestrator
            .handle(request(Feature::ActionExecution))
            .await
            .expect_err("provider failure");

        assert!(matches!(error, EngineError::Provider(_)));
        let records = harness.usage.all().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].usage.input, 600);
    }

    #[tokio::test]
    async fn failed_first_provider_call_still_writes_a_zero_cost_record() {
        let harness = harness(
            ScriptedClient::new(vec![Err(ProviderError::RateLimited {
                retry_after_secs: Some(7),
            })]),
            QuotaAllowance::Limited(100),
        )
        .await;

        let error =
            harness.orchestrator.handle(request(Feature::Chat)).await.expect_err("throttled");

        assert!(matches!(
            error,
            EngineError::RateLimited { retry_after_secs: Some(7) }
        ));
        assert!(error.is_retryable());

        // The request reached the provider, so the audit trail gets a record
        // even though no call completed and nothing is billed.
        let records = harness.usage.all().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].usage.total(), 0);
        assert_eq!(records[0].cost, Decimal::ZERO);
        assert!(!records[0].cache_hit);
    }

    #[tokio::test]
    async fn quota_is_debited_per_request_not_per_round_trip() {
        let harness = harness(
            ScriptedClient::new(vec![
                Ok(tool_reply(
                    vec![("call-1", "echo", json!({"message": "ping"}))],
                    TokenUsage::new(100, 10, 0, 0),
                )),
                Ok(text_reply("done", TokenUsage::new(120, 12, 0, 0))),
            ]),
            QuotaAllowance::Limited(5),
        )
        .await;

        harness.orchestrator.handle(request(Feature::ActionExecution)).await.expect("handled");

        let quota = harness
            .quotas
            .find(&TenantId("t-1".to_string()))
            .await
            .expect("find")
            .expect("seeded");
        assert_eq!(quota.consumed, 1);
    }

    #[tokio::test]
    async fn temperature_override_reaches_the_provider_request() {
        let harness = harness(
            ScriptedClient::new(vec![Ok(text_reply("ok", TokenUsage::new(100, 10, 0, 0)))]),
            QuotaAllowance::Limited(100),
        )
        .await;

        let mut request = request(Feature::Chat);
        request.options.temperature_override = Some(0.05);

        harness.orchestrator.handle(request).await.expect("handled");

        let sent = harness.client.request(0).await;
        assert_eq!(sent.temperature, 0.05);
    }

    #[tokio::test]
    async fn cache_hit_latency_covers_the_cache_read_only() {
        let client = Arc::new(ScriptedClient::new(vec![Ok(text_reply(
            "Score: 82.",
            TokenUsage::new(500, 40, 0, 0),
        ))]));
        let quotas = Arc::new(SlowQuotaRepository {
            inner: InMemoryQuotaRepository::default(),
            delay: Duration::from_millis(80),
        });

        let now = Utc::now();
        quotas
            .upsert(SubscriptionQuota {
                tenant_id: TenantId("t-1".to_string()),
                plan: PlanTier::Business,
                allowance: QuotaAllowance::Limited(100),
                consumed: 0,
                period_start: now,
                period_end: now + ChronoDuration::days(30),
            })
            .await
            .expect("seed quota");

        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let orchestrator = Orchestrator::new(
            client,
            Arc::new(registry),
            quotas,
            Arc::new(InMemoryUsageRepository::default()),
            Arc::new(InMemoryResponseCacheRepository::default()),
            EngineConfig::default(),
        );

        orchestrator.handle(request(Feature::LeadScoring)).await.expect("first");
        let second = orchestrator.handle(request(Feature::LeadScoring)).await.expect("second");

        assert!(second.cache_hit());
        let EngineResponse::Chat { latency_ms, .. } = second else {
            panic!("expected a chat response");
        };
        assert!(
            latency_ms < 80,
            "hit latency should exclude the quota debit, got {latency_ms}ms"
        );
    }
}
