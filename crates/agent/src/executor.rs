//! Fan-out execution of one batch of tool calls.
//!
//! Calls within a batch are independent by contract, so they run
//! concurrently; results are re-associated with their originating call by
//! correlation id, never by completion order. Every failure mode — unknown
//! tool, argument validation, timeout, panic, domain error — is folded into a
//! `ToolResult { success: false }` so one bad call can never abort the batch.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::warn;

use crate::tools::{CallerContext, ToolCall, ToolRegistry, ToolResult};

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    call_timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, call_timeout: Duration) -> Self {
        Self { registry, call_timeout }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Runs every call in the batch and returns exactly one result per call,
    /// in the order the calls were given.
    pub async fn execute_batch(
        &self,
        calls: &[ToolCall],
        caller: &CallerContext,
    ) -> Vec<ToolResult> {
        let mut join_set = JoinSet::new();

        for call in calls {
            let registry = Arc::clone(&self.registry);
            let caller = caller.clone();
            let call = call.clone();
            let call_timeout = self.call_timeout;

            join_set.spawn(async move { execute_one(registry, call, caller, call_timeout).await });
        }

        let mut results: Vec<ToolResult> = Vec::with_capacity(calls.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                // A panicking tool must not take the batch down with it. The
                // correlation id is unrecoverable from a join error, so the
                // orphaned call is matched up below.
                Err(error) => warn!(
                    event_name = "engine.tools.task_panicked",
                    error = %error,
                    "tool task panicked"
                ),
            }
        }

        // Barrier reached: re-associate by correlation id and synthesize
        // failures for any call whose task never reported back.
        calls
            .iter()
            .map(|call| {
                results
                    .iter()
                    .find(|result| result.call_id == call.id)
                    .cloned()
                    .unwrap_or_else(|| {
                        ToolResult::failed(call.id.clone(), "tool execution aborted unexpectedly")
                    })
            })
            .collect()
    }
}

async fn execute_one(
    registry: Arc<ToolRegistry>,
    call: ToolCall,
    caller: CallerContext,
    call_timeout: Duration,
) -> ToolResult {
    let Some(tool) = registry.get(&call.name) else {
        return ToolResult::failed(call.id, format!("unknown tool `{}`", call.name));
    };

    if let Err(error) = tool.parameters().validate(&call.arguments) {
        return ToolResult::failed(call.id, error.to_string());
    }

    match tokio::time::timeout(call_timeout, tool.execute(call.arguments, &caller)).await {
        Ok(Ok(output)) => ToolResult::ok(call.id, output),
        Ok(Err(error)) => ToolResult::failed(call.id, error.to_string()),
        Err(_) => ToolResult::failed(
            call.id,
            format!("tool `{}` timed out after {}s", call.name, call_timeout.as_secs()),
        ),
    }
}
