//! Deterministic step planning.
//!
//! The plan for a run is a pure function of which source kinds are attached
//! and the external-LLM feature flag: same inputs, same ordered step list.
//! That stability is what lets the plan be frozen at start and shown as a
//! fixed checklist while the run executes.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use prospector_common::{Result, SourceType};
use prospector_store::{NewRunStep, ResearchRunPlan, ResearchRunStep, ResearchStore};

pub const STEP_EXTERNAL_LLM: &str = "external_llm_company_discovery";
pub const STEP_FETCH: &str = "fetch_url_sources";
pub const STEP_EXTRACT: &str = "extract_url_sources";
pub const STEP_CLASSIFY: &str = "classify_sources";
pub const STEP_PROCESS: &str = "process_sources";
pub const STEP_ENTITIES: &str = "entity_resolution";
pub const STEP_PEOPLE: &str = "canonical_people";
pub const STEP_COMPANIES: &str = "canonical_companies";
pub const STEP_LISTS: &str = "ingest_lists";
pub const STEP_PROPOSALS: &str = "ingest_proposals";
pub const STEP_FINALIZE: &str = "finalize";

#[derive(Debug, Clone, Copy)]
pub struct PlannerConfig {
    pub external_llm_enabled: bool,
    pub step_max_attempts: i32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self { external_llm_enabled: false, step_max_attempts: 2 }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedStep {
    pub step_key: String,
    pub step_order: i32,
    pub enabled: bool,
    pub max_attempts: i32,
    pub rationale: String,
}

/// Build the full total-ordered step list for a run given the source kinds
/// currently attached. Disabled steps stay in the plan for transparency but
/// are never upserted as executable step rows.
pub fn build_plan(config: &PlannerConfig, source_types: &BTreeSet<String>) -> Vec<PlannedStep> {
    let has = |t: SourceType| source_types.contains(t.as_str());
    let llm = config.external_llm_enabled || has(SourceType::LlmJson);
    let url = has(SourceType::Url);
    let textual = url || has(SourceType::Text);

    let step = |key: &str, order: i32, enabled: bool, rationale: &str| PlannedStep {
        step_key: key.to_string(),
        step_order: order,
        enabled,
        max_attempts: config.step_max_attempts,
        rationale: rationale.to_string(),
    };

    vec![
        step(STEP_EXTERNAL_LLM, 4, llm, "external llm flag or llm_json sources present"),
        step(STEP_FETCH, 10, url, "url sources present"),
        step(STEP_EXTRACT, 15, url, "url sources present"),
        step(STEP_CLASSIFY, 17, textual, "url or text sources present"),
        step(STEP_PROCESS, 20, textual, "url or text sources present"),
        step(STEP_ENTITIES, 25, true, "always"),
        step(STEP_PEOPLE, 27, true, "always"),
        step(STEP_COMPANIES, 28, true, "always"),
        step(STEP_LISTS, 30, has(SourceType::ManualList), "manual_list sources present"),
        step(STEP_PROPOSALS, 40, has(SourceType::AiProposal), "ai_proposal sources present"),
        step(STEP_FINALIZE, 99, true, "always"),
    ]
}

/// Create the plan if missing and upsert enabled steps as pending rows.
/// Both halves are idempotent, so calling this on every start/retry is safe.
pub async fn ensure_plan_and_steps<S>(
    store: &S,
    tenant: Uuid,
    run_id: Uuid,
    config: &PlannerConfig,
) -> Result<(ResearchRunPlan, Vec<ResearchRunStep>)>
where
    S: ResearchStore + ?Sized,
{
    let sources = store.list_sources_for_run(tenant, run_id).await?;
    let source_types: BTreeSet<String> =
        sources.into_iter().map(|s| s.source_type).collect();

    let planned = build_plan(config, &source_types);
    let plan_json = json!({ "steps": planned });
    let plan = store.create_plan_if_missing(tenant, run_id, plan_json, 1).await?;

    let new_steps: Vec<NewRunStep> = planned
        .iter()
        .filter(|p| p.enabled)
        .map(|p| NewRunStep {
            step_key: p.step_key.clone(),
            step_order: p.step_order,
            max_attempts: p.max_attempts,
            input_json: None,
        })
        .collect();
    let steps = store.upsert_steps(tenant, run_id, new_steps).await?;

    debug!(%run_id, steps = steps.len(), "plan ensured");
    Ok((plan, steps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospector_store::{MemoryStore, NewResearchRun, NewSourceDocument, PlanRepo, RunRepo, SourceDocumentRepo};

    fn types(list: &[SourceType]) -> BTreeSet<String> {
        list.iter().map(|t| t.as_str().to_string()).collect()
    }

    #[test]
    fn plan_is_deterministic_and_total_ordered() {
        let config = PlannerConfig::default();
        let sources = types(&[SourceType::Url, SourceType::ManualList]);
        let a = build_plan(&config, &sources);
        let b = build_plan(&config, &sources);
        assert_eq!(serde_json::to_value(&a).unwrap(), serde_json::to_value(&b).unwrap());

        let orders: Vec<i32> = a.iter().map(|s| s.step_order).collect();
        let mut sorted = orders.clone();
        sorted.sort();
        assert_eq!(orders, sorted);
    }

    #[test]
    fn enablement_follows_source_kinds_and_flag() {
        let config = PlannerConfig::default();
        let plan = build_plan(&config, &types(&[SourceType::ManualList]));
        let enabled: Vec<&str> = plan
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.step_key.as_str())
            .collect();
        assert_eq!(
            enabled,
            vec![STEP_ENTITIES, STEP_PEOPLE, STEP_COMPANIES, STEP_LISTS, STEP_FINALIZE]
        );

        let flagged = PlannerConfig { external_llm_enabled: true, ..PlannerConfig::default() };
        let plan = build_plan(&flagged, &types(&[]));
        assert!(plan.iter().any(|s| s.step_key == STEP_EXTERNAL_LLM && s.enabled));
    }

    #[tokio::test]
    async fn ensure_is_idempotent_for_plan_and_steps() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = store
            .create_run(
                tenant,
                NewResearchRun {
                    role_mandate_id: None,
                    name: "planner".into(),
                    sector: None,
                    region_scope: None,
                    config: None,
                },
            )
            .await
            .unwrap()
            .id;
        store
            .add_source(
                tenant,
                NewSourceDocument {
                    run_id,
                    source_type: SourceType::ManualList.as_str().to_string(),
                    content_text: Some("Acme".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let config = PlannerConfig::default();
        let (plan_a, steps_a) = ensure_plan_and_steps(&store, tenant, run_id, &config)
            .await
            .unwrap();
        let (plan_b, steps_b) = ensure_plan_and_steps(&store, tenant, run_id, &config)
            .await
            .unwrap();
        assert_eq!(plan_a.id, plan_b.id);
        assert_eq!(steps_a.len(), steps_b.len());
        assert_eq!(steps_a.len(), 5);

        let stored = store.list_steps(tenant, run_id).await.unwrap();
        assert_eq!(stored.len(), 5);
        assert!(stored.iter().all(|s| s.status == "pending"));
    }
}
