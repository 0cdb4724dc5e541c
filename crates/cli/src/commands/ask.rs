use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use secrecy::SecretString;

use relay_agent::crm_tools::{builtin_registry, InMemoryCrmStore};
use relay_agent::orchestrator::{EngineConfig, Orchestrator};
use relay_agent::provider::HttpLlmClient;
use relay_core::config::{AppConfig, LoadOptions, LogFormat};
use relay_core::domain::quota::{QuotaAllowance, SubscriptionQuota};
use relay_core::domain::request::{
    AssistRequest, Complexity, Feature, PlanTier, TenantId, UserId,
};
use relay_core::domain::response::EngineResponse;
use relay_db::repositories::{
    QuotaRepository, SqlQuotaRepository, SqlResponseCacheRepository, SqlUsageRepository,
};

use crate::commands::{open_database, CommandFailure, CommandResult};

#[derive(Debug)]
pub struct AskArgs {
    pub instruction: String,
    pub feature: String,
    pub complexity: String,
    pub plan: String,
    pub tenant: String,
    pub user: String,
    pub json: bool,
}

pub fn run(args: AskArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    init_logging(&config);

    let Some(feature) = Feature::from_key(&args.feature) else {
        return CommandResult::failure(
            "ask",
            "invalid_argument",
            format!("unknown feature `{}`", args.feature),
            2,
        );
    };
    let Some(complexity) = Complexity::from_key(&args.complexity) else {
        return CommandResult::failure(
            "ask",
            "invalid_argument",
            format!("unknown complexity `{}`", args.complexity),
            2,
        );
    };
    let Some(plan) = PlanTier::from_key(&args.plan) else {
        return CommandResult::failure(
            "ask",
            "invalid_argument",
            format!("unknown plan `{}`", args.plan),
            2,
        );
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(execute(&config, &args, feature, complexity, plan));
    match result {
        Ok(response) => render_response(&response, args.json),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("ask", error_class, message, exit_code)
        }
    }
}

async fn execute(
    config: &AppConfig,
    args: &AskArgs,
    feature: Feature,
    complexity: Complexity,
    plan: PlanTier,
) -> Result<EngineResponse, CommandFailure> {
    let (pool, _) = open_database(config).await?;

    let quotas = Arc::new(SqlQuotaRepository::new(pool.clone()));
    let usage = Arc::new(SqlUsageRepository::new(pool.clone()));
    let cache = Arc::new(SqlResponseCacheRepository::new(pool.clone()));

    let tenant_id = TenantId(args.tenant.clone());
    ensure_quota(quotas.as_ref(), &tenant_id, plan)
        .await
        .map_err(|error| ("quota_setup", error, 5u8))?;

    // The CLI runs against the bundled demo CRM dataset.
    let store = Arc::new(InMemoryCrmStore::new());
    store.seed_demo(&tenant_id).await;
    let registry = builtin_registry(store);

    let api_key: SecretString = config
        .llm
        .api_key
        .clone()
        .ok_or_else(|| ("config_validation", "llm.api_key is not configured".to_string(), 2u8))?;
    let llm = HttpLlmClient::new(
        config.llm.base_url.clone(),
        api_key,
        Duration::from_secs(config.llm.timeout_secs),
    )
    .map_err(|error| ("provider_init", error.to_string(), 6u8))?;

    let orchestrator = Orchestrator::new(
        Arc::new(llm),
        Arc::new(registry),
        quotas,
        usage,
        cache,
        EngineConfig::from_settings(&config.engine),
    );

    let request = AssistRequest::new(
        args.instruction.clone(),
        tenant_id,
        UserId(args.user.clone()),
        feature,
        complexity,
        plan,
    )
    .map_err(|error| ("invalid_argument", error.to_string(), 2u8))?;

    let response = orchestrator
        .handle(request)
        .await
        .map_err(|error| ("engine", format!("{error} ({})", error.user_message()), 6u8))?;

    pool.close().await;
    Ok(response)
}

/// Seeds a quota row on first use so a fresh install can run `ask` right
/// after `migrate`, using the plan's default allowance.
async fn ensure_quota(
    quotas: &SqlQuotaRepository,
    tenant_id: &TenantId,
    plan: PlanTier,
) -> Result<(), String> {
    let existing = quotas.find(tenant_id).await.map_err(|error| error.to_string())?;
    if existing.is_some() {
        return Ok(());
    }

    let now = Utc::now();
    quotas
        .upsert(SubscriptionQuota {
            tenant_id: tenant_id.clone(),
            plan,
            allowance: QuotaAllowance::for_plan(plan),
            consumed: 0,
            period_start: now,
            period_end: now + ChronoDuration::days(30),
        })
        .await
        .map_err(|error| error.to_string())
}

fn render_response(response: &EngineResponse, json: bool) -> CommandResult {
    if json {
        return match serde_json::to_string_pretty(response) {
            Ok(output) => CommandResult::raw(output),
            Err(error) => CommandResult::failure("ask", "serialization", error.to_string(), 6),
        };
    }

    let mut lines = vec![response.text().to_string()];
    match response {
        EngineResponse::Chat { model, cost, latency_ms, cache_hit, .. } => {
            lines.push(format!(
                "-- model={model} cost={cost} latency_ms={latency_ms} cache_hit={cache_hit}"
            ));
        }
        EngineResponse::Actions { actions, model, cost, latency_ms, .. } => {
            for action in actions {
                let marker = if action.success { "ok" } else { "fail" };
                let detail = action
                    .error
                    .clone()
                    .or_else(|| action.output.as_ref().map(|output| output.to_string()))
                    .unwrap_or_default();
                lines.push(format!("- [{marker}] {}: {detail}", action.tool));
            }
            lines.push(format!("-- model={model} cost={cost} latency_ms={latency_ms}"));
        }
    }
    CommandResult::raw(lines.join("\n"))
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    // `try_init` so a second command invocation in-process does not panic.
    let result = match config.logging.format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .compact()
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .pretty()
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .json()
            .try_init(),
    };
    let _ = result;
}
