use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::model::Model;
use crate::errors::EngineError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request classification. The feature decides prompt framing and whether the
/// response cache participates at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Chat,
    ActionExecution,
    LeadScoring,
    DealSummary,
    EmailDraft,
    DataEnrichment,
}

/// Static cache policy for a feature class. Cacheability is a property of the
/// feature, never of an individual request; TTLs accept staleness for data
/// that changes slowly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl_secs: u64,
}

impl Feature {
    pub fn as_key(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::ActionExecution => "action_execution",
            Self::LeadScoring => "lead_scoring",
            Self::DealSummary => "deal_summary",
            Self::EmailDraft => "email_draft",
            Self::DataEnrichment => "data_enrichment",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "chat" => Some(Self::Chat),
            "action_execution" => Some(Self::ActionExecution),
            "lead_scoring" => Some(Self::LeadScoring),
            "deal_summary" => Some(Self::DealSummary),
            "email_draft" => Some(Self::EmailDraft),
            "data_enrichment" => Some(Self::DataEnrichment),
            _ => None,
        }
    }

    /// Features whose answers may be replayed within a TTL window. Chat,
    /// action execution, and email drafting always require a live round-trip.
    pub fn cache_policy(&self) -> Option<CachePolicy> {
        match self {
            Self::LeadScoring => Some(CachePolicy { ttl_secs: 3_600 }),
            Self::DealSummary => Some(CachePolicy { ttl_secs: 900 }),
            Self::DataEnrichment => Some(CachePolicy { ttl_secs: 21_600 }),
            Self::Chat | Self::ActionExecution | Self::EmailDraft => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    pub fn as_key(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "simple" => Some(Self::Simple),
            "medium" => Some(Self::Medium),
            "complex" => Some(Self::Complex),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Starter,
    Business,
    Enterprise,
}

impl PlanTier {
    pub fn as_key(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Business => "business",
            Self::Enterprise => "enterprise",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "free" => Some(Self::Free),
            "starter" => Some(Self::Starter),
            "business" => Some(Self::Business),
            "enterprise" => Some(Self::Enterprise),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelatedRecord {
    pub record_type: String,
    pub label: String,
}

/// Structured CRM context attached to a request: the entity the user is
/// looking at plus whatever surrounding data the caller chose to include.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityContext {
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default)]
    pub snapshot: serde_json::Value,
    #[serde(default)]
    pub recent_activity: Vec<String>,
    #[serde(default)]
    pub related_records: Vec<RelatedRecord>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Pins the model regardless of routing rules. Used for tests and
    /// enterprise configurations with a contractual model.
    pub forced_model: Option<Model>,
    pub temperature_override: Option<f32>,
    pub cache_ttl_override: Option<u64>,
    /// Replaces the feature-specific instruction block; the shared base block
    /// and its variable substitution still apply.
    pub system_prompt_override: Option<String>,
    pub locale: Option<String>,
    pub streaming: bool,
}

/// One inbound assistant request. Immutable once constructed; `new` is the
/// single validation gate for required fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssistRequest {
    pub instruction: String,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub feature: Feature,
    pub complexity: Complexity,
    pub plan: PlanTier,
    pub entity: Option<EntityContext>,
    pub options: RequestOptions,
}

impl AssistRequest {
    pub fn new(
        instruction: impl Into<String>,
        tenant_id: TenantId,
        user_id: UserId,
        feature: Feature,
        complexity: Complexity,
        plan: PlanTier,
    ) -> Result<Self, EngineError> {
        let instruction = instruction.into();
        if instruction.trim().is_empty() {
            return Err(EngineError::Validation("instruction must not be empty".to_string()));
        }
        if tenant_id.0.trim().is_empty() {
            return Err(EngineError::Validation("tenant_id must not be empty".to_string()));
        }
        if user_id.0.trim().is_empty() {
            return Err(EngineError::Validation("user_id must not be empty".to_string()));
        }

        Ok(Self {
            instruction,
            tenant_id,
            user_id,
            feature,
            complexity,
            plan,
            entity: None,
            options: RequestOptions::default(),
        })
    }

    pub fn with_entity(mut self, entity: EntityContext) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{AssistRequest, Complexity, Feature, PlanTier, TenantId, UserId};
    use crate::errors::EngineError;

    fn request(instruction: &str) -> Result<AssistRequest, EngineError> {
        AssistRequest::new(
            instruction,
            TenantId("t-1".to_string()),
            UserId("u-1".to_string()),
            Feature::Chat,
            Complexity::Simple,
            PlanTier::Business,
        )
    }

    #[test]
    fn valid_request_is_accepted() {
        let request = request("what is my pipeline value?").expect("valid request");
        assert_eq!(request.feature, Feature::Chat);
        assert!(request.entity.is_none());
    }

    #[test]
    fn blank_instruction_is_rejected_before_any_paid_call() {
        let error = request("   ").expect_err("blank instruction");
        assert!(matches!(error, EngineError::Validation(_)));
    }

    #[test]
    fn blank_tenant_is_rejected() {
        let error = AssistRequest::new(
            "hello",
            TenantId(String::new()),
            UserId("u-1".to_string()),
            Feature::Chat,
            Complexity::Simple,
            PlanTier::Free,
        )
        .expect_err("blank tenant");
        assert!(matches!(error, EngineError::Validation(_)));
    }

    #[test]
    fn cache_policy_is_a_feature_property() {
        assert!(Feature::LeadScoring.cache_policy().is_some());
        assert!(Feature::DataEnrichment.cache_policy().is_some());
        assert!(Feature::Chat.cache_policy().is_none());
        assert!(Feature::ActionExecution.cache_policy().is_none());
        assert_eq!(Feature::LeadScoring.cache_policy().map(|p| p.ttl_secs), Some(3_600));
    }
}
