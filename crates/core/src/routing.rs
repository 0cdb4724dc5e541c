//! Deterministic model routing.
//!
//! Maps (complexity, plan, optional pin) to a model tier, output budget, and
//! sampling temperature. Pure table lookups with no I/O, so the same inputs
//! always produce the same selection.

use crate::domain::model::{Model, ModelSelection};
use crate::domain::request::{Complexity, PlanTier};

#[derive(Clone, Copy, Debug, Default)]
pub struct ModelRouter;

impl ModelRouter {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the model for a request.
    ///
    /// An explicit pin always wins. Otherwise the plan supplies a baseline;
    /// Business promotes complex work one tier past its baseline, and
    /// Enterprise re-derives the tier purely from complexity.
    pub fn select(
        &self,
        complexity: Complexity,
        plan: PlanTier,
        forced: Option<Model>,
    ) -> ModelSelection {
        let model = forced.unwrap_or_else(|| resolve_model(complexity, plan));
        ModelSelection {
            model,
            max_tokens: model.max_output_tokens(),
            temperature: temperature_for(complexity),
        }
    }
}

fn resolve_model(complexity: Complexity, plan: PlanTier) -> Model {
    let baseline = plan_baseline(plan);
    match plan {
        PlanTier::Enterprise => complexity_model(complexity),
        PlanTier::Business if complexity == Complexity::Complex => baseline.promoted(),
        _ => baseline,
    }
}

fn plan_baseline(plan: PlanTier) -> Model {
    match plan {
        PlanTier::Free | PlanTier::Starter => Model::Haiku35,
        PlanTier::Business | PlanTier::Enterprise => Model::Sonnet4,
    }
}

fn complexity_model(complexity: Complexity) -> Model {
    match complexity {
        Complexity::Simple => Model::Haiku35,
        Complexity::Medium => Model::Sonnet4,
        Complexity::Complex => Model::Opus4,
    }
}

fn temperature_for(complexity: Complexity) -> f32 {
    match complexity {
        Complexity::Simple => 0.2,
        Complexity::Medium => 0.5,
        Complexity::Complex => 0.7,
    }
}
