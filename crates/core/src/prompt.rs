//! Prompt and context assembly.
//!
//! Produces the system instructions and the user turn for one request.
//! Assembly is deterministic and section order in the user turn is fixed,
//! so the same request always yields the same provider payload. The cache
//! key is derived from the request fields, not from the assembled text
//! (see `fingerprint`).

use chrono::{NaiveDate, Utc};

use crate::domain::request::{AssistRequest, EntityContext, Feature};

const DEFAULT_LOCALE: &str = "en-US";

const BASE_PROMPT: &str = "You are the built-in assistant of a CRM used by sales teams. \
Today's date is {current_date}. Respond in the conventions of the {locale} locale. \
Ground every statement in the CRM data provided; when a requested action is available \
as a tool, call the tool instead of describing the action. Never invent record ids.";

/// Assembled prompt material for one provider round-trip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptBundle {
    pub system: String,
    pub user_turn: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, request: &AssistRequest) -> PromptBundle {
        self.build_with_date(request, Utc::now().date_naive())
    }

    /// Date is injected so tests stay deterministic.
    pub fn build_with_date(&self, request: &AssistRequest, today: NaiveDate) -> PromptBundle {
        let locale = request.options.locale.as_deref().unwrap_or(DEFAULT_LOCALE);
        let base = BASE_PROMPT
            .replace("{current_date}", &today.format("%Y-%m-%d").to_string())
            .replace("{locale}", locale);

        // An override replaces the feature block only; base substitution has
        // already happened above.
        let feature_block = match request.options.system_prompt_override.as_deref() {
            Some(custom) => custom.to_string(),
            None => feature_instructions(request.feature).to_string(),
        };

        let system = format!("{base}\n\n{feature_block}");

        let mut user_turn = String::new();
        if let Some(entity) = &request.entity {
            push_entity_sections(&mut user_turn, entity);
        }
        user_turn.push_str(&request.instruction);

        PromptBundle { system, user_turn }
    }
}

fn feature_instructions(feature: Feature) -> &'static str {
    match feature {
        Feature::Chat => {
            "Answer questions about the tenant's contacts, deals, tasks, and pipeline. \
             Keep answers short and concrete."
        }
        Feature::ActionExecution => {
            "Carry out the user's instruction using the available tools. Execute every \
             independent action the instruction asks for; report each outcome, including \
             failures, without retrying on your own."
        }
        Feature::LeadScoring => {
            "Score the lead described in the context from 0 to 100 and justify the score \
             with the strongest three signals. Output the score first."
        }
        Feature::DealSummary => {
            "Summarize the deal in the context: stage, value, blockers, and the single \
             most useful next step."
        }
        Feature::EmailDraft => {
            "Draft the requested email in the user's voice. Plain text, no signature, \
             ready to paste."
        }
        Feature::DataEnrichment => {
            "Derive the requested fields from the context provided. Output only fields \
             you can support with the given data; mark the rest unknown."
        }
    }
}

// Section order is load-bearing; see module docs.
fn push_entity_sections(buffer: &mut String, entity: &EntityContext) {
    buffer.push_str(&format!("=== {} {} ===\n", entity.entity_type.to_uppercase(), entity.entity_id));
    if !entity.snapshot.is_null() {
        buffer.push_str(&entity.snapshot.to_string());
        buffer.push('\n');
    }

    if !entity.recent_activity.is_empty() {
        buffer.push_str("=== RECENT ACTIVITY ===\n");
        for line in &entity.recent_activity {
            buffer.push_str("- ");
            buffer.push_str(line);
            buffer.push('\n');
        }
    }

    if !entity.related_records.is_empty() {
        buffer.push_str("=== RELATED RECORDS ===\n");
        for record in &entity.related_records {
            buffer.push_str(&format!("- [{}] {}\n", record.record_type, record.label));
        }
    }

    if !entity.custom_fields.is_empty() {
        buffer.push_str("=== CUSTOM FIELDS ===\n");
        for (name, value) in &entity.custom_fields {
            buffer.push_str(&format!("- {name}: {value}\n"));
        }
    }

    buffer.push('\n');
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;
    use serde_json::json;

    use super::PromptBuilder;
    use crate::domain::request::{
        AssistRequest, Complexity, EntityContext, Feature, PlanTier, RelatedRecord,
        RequestOptions, TenantId, UserId,
    };

    fn request_with_entity() -> AssistRequest {
        let entity = EntityContext {
            entity_type: "deal".to_string(),
            entity_id: "deal-77".to_string(),
            snapshot: json!({"name": "Acme expansion", "value": 120000}),
            recent_activity: vec!["2026-08-20 call with CTO".to_string()],
            related_records: vec![RelatedRecord {
                record_type: "contact".to_string(),
                label: "Dana Reeve <dana@acme.test>".to_string(),
            }],
            custom_fields: BTreeMap::from([("region".to_string(), "EMEA".to_string())]),
        };
        AssistRequest::new(
            "summarize this deal",
            TenantId("t-1".to_string()),
            UserId("u-1".to_string()),
            Feature::DealSummary,
            Complexity::Medium,
            PlanTier::Business,
        )
        .expect("valid request")
        .with_entity(entity)
    }

    fn fixed_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 29).expect("valid date")
    }

    #[test]
    fn base_block_substitutes_date_and_locale() {
        let mut request = request_with_entity();
        request.options.locale = Some("de-DE".to_string());
        let bundle = PromptBuilder::new().build_with_date(&request, fixed_date());

        assert!(bundle.system.contains("2026-08-29"));
        assert!(bundle.system.contains("de-DE"));
        assert!(!bundle.system.contains("{current_date}"));
        assert!(!bundle.system.contains("{locale}"));
    }

    #[test]
    fn sections_appear_in_fixed_order_with_instruction_last() {
        let request = request_with_entity();
        let bundle = PromptBuilder::new().build_with_date(&request, fixed_date());

        let snapshot = bundle.user_turn.find("=== DEAL deal-77 ===").expect("snapshot section");
        let activity = bundle.user_turn.find("=== RECENT ACTIVITY ===").expect("activity section");
        let related = bundle.user_turn.find("=== RELATED RECORDS ===").expect("related section");
        let custom = bundle.user_turn.find("=== CUSTOM FIELDS ===").expect("custom section");
        let instruction = bundle.user_turn.find("summarize this deal").expect("instruction");

        assert!(snapshot < activity && activity < related && related < custom);
        assert!(custom < instruction);
        assert!(bundle.user_turn.ends_with("summarize this deal"));
    }

    #[test]
    fn empty_context_sections_are_omitted_entirely() {
        let mut request = request_with_entity();
        let entity = request.entity.as_mut().expect("entity");
        entity.recent_activity.clear();
        entity.custom_fields.clear();

        let bundle = PromptBuilder::new().build_with_date(&request, fixed_date());
        assert!(!bundle.user_turn.contains("RECENT ACTIVITY"));
        assert!(!bundle.user_turn.contains("CUSTOM FIELDS"));
        assert!(bundle.user_turn.contains("RELATED RECORDS"));
    }

    #[test]
    fn override_replaces_feature_block_but_keeps_substituted_base() {
        let mut request = request_with_entity();
        request.options = RequestOptions {
            system_prompt_override: Some("Only answer in bullet points.".to_string()),
            ..RequestOptions::default()
        };

        let bundle = PromptBuilder::new().build_with_date(&request, fixed_date());
        assert!(bundle.system.contains("Only answer in bullet points."));
        assert!(bundle.system.contains("2026-08-29"));
        assert!(!bundle.system.contains("Summarize the deal"));
    }

    #[test]
    fn identical_requests_assemble_identical_prompts() {
        let request = request_with_entity();
        let builder = PromptBuilder::new();
        assert_eq!(
            builder.build_with_date(&request, fixed_date()),
            builder.build_with_date(&request, fixed_date())
        );
    }
}
