//! Built-in CRM tool set.
//!
//! The engine itself is tool-agnostic; these adapters cover the common CRM
//! verbs (contact search, deal search, pipeline forecast, task creation) on
//! top of a `CrmStore` boundary so the CLI and tests have a working catalog.
//! Every adapter scopes its reads and writes to the caller's tenant.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use relay_core::domain::request::TenantId;

use crate::tools::{
    CallerContext, ParameterKind, ParameterSchema, ParameterSpec, Tool, ToolError, ToolRegistry,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub email: String,
    pub company: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStage {
    Prospecting,
    Qualification,
    Proposal,
    Negotiation,
    ClosedWon,
    ClosedLost,
}

impl DealStage {
    /// Close probability used for weighted pipeline forecasts.
    pub fn win_probability(&self) -> Decimal {
        match self {
            Self::Prospecting => Decimal::new(10, 2),
            Self::Qualification => Decimal::new(25, 2),
            Self::Proposal => Decimal::new(50, 2),
            Self::Negotiation => Decimal::new(75, 2),
            Self::ClosedWon => Decimal::ONE,
            Self::ClosedLost => Decimal::ZERO,
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, Self::ClosedWon | Self::ClosedLost)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: String,
    pub name: String,
    pub stage: DealStage,
    pub value: Decimal,
    pub contact_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub due_date: Option<String>,
    pub related_deal_id: Option<String>,
}

/// Backing store for the built-in tools. The real product plugs its CRM
/// database in here; the in-memory store below serves the CLI and tests.
#[async_trait]
pub trait CrmStore: Send + Sync {
    async fn search_contacts(
        &self,
        tenant: &TenantId,
        query: &str,
    ) -> Result<Vec<Contact>, ToolError>;

    async fn search_deals(&self, tenant: &TenantId, query: &str) -> Result<Vec<Deal>, ToolError>;

    async fn create_task(&self, tenant: &TenantId, task: Task) -> Result<Task, ToolError>;
}

/// Registry with all four built-in tools wired to one store.
pub fn builtin_registry(store: Arc<dyn CrmStore>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(SearchContactsTool { store: store.clone() });
    registry.register(SearchDealsTool { store: store.clone() });
    registry.register(DealForecastTool { store: store.clone() });
    registry.register(CreateTaskTool { store });
    registry
}

fn string_param(name: &str, description: &str) -> ParameterSpec {
    ParameterSpec {
        name: name.to_string(),
        kind: ParameterKind::String,
        description: description.to_string(),
    }
}

fn required_str(arguments: &serde_json::Value, field: &str) -> Result<String, ToolError> {
    arguments[field]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ToolError::InvalidArguments(format!("`{field}` must be a string")))
}

pub struct SearchContactsTool {
    store: Arc<dyn CrmStore>,
}

#[async_trait]
impl Tool for SearchContactsTool {
    fn name(&self) -> &'static str {
        "search_contacts"
    }

    fn description(&self) -> &'static str {
        "Search the tenant's contacts by name, email, or company."
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema {
            properties: vec![string_param("query", "Name, email, or company fragment")],
            required: vec!["query".to_string()],
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        caller: &CallerContext,
    ) -> Result<serde_json::Value, ToolError> {
        let query = required_str(&arguments, "query")?;
        let contacts = self.store.search_contacts(&caller.tenant_id, &query).await?;
        Ok(json!({ "count": contacts.len(), "contacts": contacts }))
    }
}

pub struct SearchDealsTool {
    store: Arc<dyn CrmStore>,
}

#[async_trait]
impl Tool for SearchDealsTool {
    fn name(&self) -> &'static str {
        "search_deals"
    }

    fn description(&self) -> &'static str {
        "Search the tenant's deals by name. An empty query lists all deals."
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema {
            properties: vec![string_param("query", "Deal name fragment; empty for all deals")],
            required: vec!["query".to_string()],
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        caller: &CallerContext,
    ) -> Result<serde_json::Value, ToolError> {
        let query = required_str(&arguments, "query")?;
        let deals = self.store.search_deals(&caller.tenant_id, &query).await?;
        Ok(json!({ "count": deals.len(), "deals": deals }))
    }
}

pub struct DealForecastTool {
    store: Arc<dyn CrmStore>,
}

#[async_trait]
impl Tool for DealForecastTool {
    fn name(&self) -> &'static str {
        "deal_forecast"
    }

    fn description(&self) -> &'static str {
        "Forecast the open pipeline: total value and stage-weighted expected value."
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::default()
    }

    async fn execute(
        &self,
        _arguments: serde_json::Value,
        caller: &CallerContext,
    ) -> Result<serde_json::Value, ToolError> {
        let deals = self.store.search_deals(&caller.tenant_id, "").await?;
        let open: Vec<&Deal> = deals.iter().filter(|deal| deal.stage.is_open()).collect();

        let total: Decimal = open.iter().map(|deal| deal.value).sum();
        let weighted: Decimal =
            open.iter().map(|deal| deal.value * deal.stage.win_probability()).sum();

        Ok(json!({
            "open_deals": open.len(),
            "pipeline_value": total,
            "weighted_forecast": weighted,
        }))
    }
}

pub struct CreateTaskTool {
    store: Arc<dyn CrmStore>,
}

#[async_trait]
impl Tool for CreateTaskTool {
    fn name(&self) -> &'static str {
        "create_task"
    }

    fn description(&self) -> &'static str {
        "Create a follow-up task, optionally tied to a deal."
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema {
            properties: vec![
                string_param("title", "Short task title"),
                string_param("due_date", "Due date as YYYY-MM-DD"),
                string_param("deal_id", "Deal to attach the task to"),
            ],
            required: vec!["title".to_string()],
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        caller: &CallerContext,
    ) -> Result<serde_json::Value, ToolError> {
        let task = Task {
            id: Uuid::new_v4().to_string(),
            title: required_str(&arguments, "title")?,
            due_date: arguments["due_date"].as_str().map(str::to_string),
            related_deal_id: arguments["deal_id"].as_str().map(str::to_string),
        };
        let created = self.store.create_task(&caller.tenant_id, task).await?;
        Ok(json!({ "created": created }))
    }
}

#[derive(Default)]
struct TenantData {
    contacts: Vec<Contact>,
    deals: Vec<Deal>,
    tasks: Vec<Task>,
}

/// Tenant-partitioned in-memory store, seedable for demos.
#[derive(Default)]
pub struct InMemoryCrmStore {
    tenants: Mutex<HashMap<String, TenantData>>,
}

impl InMemoryCrmStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populates a tenant with a small demo book of business.
    pub async fn seed_demo(&self, tenant: &TenantId) {
        let mut tenants = self.tenants.lock().await;
        let data = tenants.entry(tenant.0.clone()).or_default();
        data.contacts = vec![
            Contact {
                id: "contact-1".to_string(),
                name: "Dana Reyes".to_string(),
                email: "dana@acme.test".to_string(),
                company: "Acme Corp".to_string(),
            },
            Contact {
                id: "contact-2".to_string(),
                name: "Priya Natarajan".to_string(),
                email: "priya@globex.test".to_string(),
                company: "Globex".to_string(),
            },
        ];
        data.deals = vec![
            Deal {
                id: "deal-1".to_string(),
                name: "Acme expansion".to_string(),
                stage: DealStage::Negotiation,
                value: Decimal::new(48_000, 0),
                contact_id: Some("contact-1".to_string()),
            },
            Deal {
                id: "deal-2".to_string(),
                name: "Globex pilot".to_string(),
                stage: DealStage::Proposal,
                value: Decimal::new(12_000, 0),
                contact_id: Some("contact-2".to_string()),
            },
            Deal {
                id: "deal-3".to_string(),
                name: "Initech renewal".to_string(),
                stage: DealStage::ClosedWon,
                value: Decimal::new(30_000, 0),
                contact_id: None,
            },
        ];
    }

    pub async fn tasks(&self, tenant: &TenantId) -> Vec<Task> {
        let tenants = self.tenants.lock().await;
        tenants.get(&tenant.0).map(|data| data.tasks.clone()).unwrap_or_default()
    }
}

fn matches_query(haystack: &str, query: &str) -> bool {
    query.is_empty() || haystack.to_lowercase().contains(&query.to_lowercase())
}

#[async_trait]
impl CrmStore for InMemoryCrmStore {
    async fn search_contacts(
        &self,
        tenant: &TenantId,
        query: &str,
    ) -> Result<Vec<Contact>, ToolError> {
        let tenants = self.tenants.lock().await;
        Ok(tenants
            .get(&tenant.0)
            .map(|data| {
                data.contacts
                    .iter()
                    .filter(|contact| {
                        matches_query(&contact.name, query)
                            || matches_query(&contact.email, query)
                            || matches_query(&contact.company, query)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn search_deals(&self, tenant: &TenantId, query: &str) -> Result<Vec<Deal>, ToolError> {
        let tenants = self.tenants.lock().await;
        Ok(tenants
            .get(&tenant.0)
            .map(|data| {
                data.deals
                    .iter()
                    .filter(|deal| matches_query(&deal.name, query))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_task(&self, tenant: &TenantId, task: Task) -> Result<Task, ToolError> {
        let mut tenants = self.tenants.lock().await;
        let data = tenants.entry(tenant.0.clone()).or_default();
        data.tasks.push(task.clone());
        Ok(task)
    }
}
