//! In-memory [`ResearchStore`] mirroring the Postgres semantics, including
//! the idempotency constraints. Backs engine unit tests without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use prospector_common::{ProspectorError, Result};

use crate::pg::backfill_source;
use crate::records::*;
use crate::traits::*;

#[derive(Default)]
struct State {
    runs: Vec<ResearchRun>,
    plans: Vec<ResearchRunPlan>,
    steps: Vec<ResearchRunStep>,
    sources: Vec<SourceDocument>,
    prospects: Vec<CompanyProspect>,
    company_evidence: Vec<CompanyProspectEvidence>,
    executives: Vec<ExecutiveProspect>,
    exec_evidence: Vec<ExecutiveProspectEvidence>,
    resolved: Vec<ResolvedEntity>,
    merge_links: Vec<EntityMergeLink>,
    people: Vec<CanonicalPerson>,
    person_emails: Vec<CanonicalPersonEmail>,
    person_links: Vec<CanonicalPersonLink>,
    companies: Vec<CanonicalCompany>,
    company_domains: Vec<CanonicalCompanyDomain>,
    company_links: Vec<CanonicalCompanyLink>,
    enrichment_records: Vec<AiEnrichmentRecord>,
    assignments: Vec<EnrichmentAssignment>,
    jobs: Vec<ResearchJob>,
    events: Vec<ResearchEvent>,
    activity: Vec<ActivityLogEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RunRepo for MemoryStore {
    async fn create_run(&self, tenant: Uuid, data: NewResearchRun) -> Result<ResearchRun> {
        let run = ResearchRun {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            role_mandate_id: data.role_mandate_id,
            name: data.name,
            status: "planned".into(),
            sector: data.sector,
            region_scope: data.region_scope,
            config: data.config,
            last_error: None,
            started_at: None,
            finished_at: None,
            created_at: Utc::now(),
        };
        self.lock().runs.push(run.clone());
        Ok(run)
    }

    async fn get_run(&self, tenant: Uuid, run_id: Uuid) -> Result<Option<ResearchRun>> {
        let state = self.lock();
        Ok(state
            .runs
            .iter()
            .find(|r| r.tenant_id == tenant && r.id == run_id)
            .cloned())
    }

    async fn set_run_status(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        update: RunStatusUpdate,
    ) -> Result<()> {
        let mut state = self.lock();
        if let Some(run) = state
            .runs
            .iter_mut()
            .find(|r| r.tenant_id == tenant && r.id == run_id)
        {
            run.status = update.status;
            run.last_error = update.last_error;
            if let Some(at) = update.started_at {
                run.started_at = Some(at);
            }
            if update.clear_finished_at {
                run.finished_at = None;
            } else if let Some(at) = update.finished_at {
                run.finished_at = Some(at);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PlanRepo for MemoryStore {
    async fn get_plan(&self, tenant: Uuid, run_id: Uuid) -> Result<Option<ResearchRunPlan>> {
        let state = self.lock();
        Ok(state
            .plans
            .iter()
            .find(|p| p.tenant_id == tenant && p.run_id == run_id)
            .cloned())
    }

    async fn create_plan_if_missing(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        plan_json: Value,
        version: i32,
    ) -> Result<ResearchRunPlan> {
        let mut state = self.lock();
        if let Some(existing) = state
            .plans
            .iter()
            .find(|p| p.tenant_id == tenant && p.run_id == run_id)
        {
            return Ok(existing.clone());
        }
        let plan = ResearchRunPlan {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            run_id,
            version,
            plan_json,
            locked_at: None,
            created_at: Utc::now(),
        };
        state.plans.push(plan.clone());
        Ok(plan)
    }

    async fn lock_plan(&self, tenant: Uuid, run_id: Uuid) -> Result<Option<ResearchRunPlan>> {
        let mut state = self.lock();
        if let Some(plan) = state
            .plans
            .iter_mut()
            .find(|p| p.tenant_id == tenant && p.run_id == run_id)
        {
            plan.locked_at.get_or_insert_with(Utc::now);
            return Ok(Some(plan.clone()));
        }
        Ok(None)
    }

    async fn upsert_steps(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        steps: Vec<NewRunStep>,
    ) -> Result<Vec<ResearchRunStep>> {
        {
            let mut state = self.lock();
            for step in steps {
                let exists = state.steps.iter().any(|s| {
                    s.tenant_id == tenant && s.run_id == run_id && s.step_key == step.step_key
                });
                if exists {
                    continue;
                }
                state.steps.push(ResearchRunStep {
                    id: Uuid::new_v4(),
                    tenant_id: tenant,
                    run_id,
                    step_key: step.step_key,
                    step_order: step.step_order,
                    status: "pending".into(),
                    attempt_count: 0,
                    max_attempts: step.max_attempts,
                    input_json: step.input_json,
                    output_json: None,
                    last_error: None,
                    next_retry_at: None,
                    started_at: None,
                    finished_at: None,
                    created_at: Utc::now(),
                });
            }
        }
        self.list_steps(tenant, run_id).await
    }

    async fn list_steps(&self, tenant: Uuid, run_id: Uuid) -> Result<Vec<ResearchRunStep>> {
        let state = self.lock();
        let mut steps: Vec<_> = state
            .steps
            .iter()
            .filter(|s| s.tenant_id == tenant && s.run_id == run_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.step_order);
        Ok(steps)
    }

    async fn claim_next_step(
        &self,
        tenant: Uuid,
        run_id: Uuid,
    ) -> Result<Option<ResearchRunStep>> {
        let now = Utc::now();
        let mut state = self.lock();
        let mut candidates: Vec<_> = state
            .steps
            .iter_mut()
            .filter(|s| {
                s.tenant_id == tenant
                    && s.run_id == run_id
                    && (s.status == "pending" || s.status == "failed")
                    && s.attempt_count < s.max_attempts
                    && s.next_retry_at.map_or(true, |at| at <= now)
            })
            .collect();
        candidates.sort_by_key(|s| s.step_order);
        if let Some(step) = candidates.into_iter().next() {
            step.status = "running".into();
            step.attempt_count += 1;
            step.started_at.get_or_insert(now);
            step.next_retry_at = None;
            return Ok(Some(step.clone()));
        }
        Ok(None)
    }

    async fn mark_step_ok(&self, step_id: Uuid, output_json: Option<Value>) -> Result<()> {
        let mut state = self.lock();
        if let Some(step) = state.steps.iter_mut().find(|s| s.id == step_id) {
            step.status = "ok".into();
            step.finished_at = Some(Utc::now());
            if output_json.is_some() {
                step.output_json = output_json;
            }
        }
        Ok(())
    }

    async fn mark_step_failed(
        &self,
        step_id: Uuid,
        last_error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut state = self.lock();
        if let Some(step) = state.steps.iter_mut().find(|s| s.id == step_id) {
            step.status = "failed".into();
            step.last_error = Some(last_error.to_string());
            step.finished_at = Some(Utc::now());
            step.next_retry_at = next_retry_at;
        }
        Ok(())
    }

    async fn cancel_pending_steps(&self, tenant: Uuid, run_id: Uuid, reason: &str) -> Result<u64> {
        let mut state = self.lock();
        let mut cancelled = 0u64;
        for step in state.steps.iter_mut().filter(|s| {
            s.tenant_id == tenant
                && s.run_id == run_id
                && matches!(s.status.as_str(), "pending" | "running" | "failed")
        }) {
            step.status = "cancelled".into();
            step.last_error = Some(reason.to_string());
            step.finished_at = Some(Utc::now());
            cancelled += 1;
        }
        Ok(cancelled)
    }

    async fn reset_failed_steps(&self, tenant: Uuid, run_id: Uuid) -> Result<u64> {
        let mut state = self.lock();
        let mut reset = 0u64;
        for step in state.steps.iter_mut().filter(|s| {
            s.tenant_id == tenant
                && s.run_id == run_id
                && matches!(s.status.as_str(), "failed" | "cancelled")
        }) {
            step.status = "pending".into();
            step.attempt_count = 0;
            step.last_error = None;
            step.next_retry_at = None;
            step.finished_at = None;
            reset += 1;
        }
        Ok(reset)
    }
}

#[async_trait]
impl SourceDocumentRepo for MemoryStore {
    async fn add_source(&self, tenant: Uuid, data: NewSourceDocument) -> Result<SourceDocument> {
        let data = backfill_source(data);
        let mut state = self.lock();
        // Mirror the partial unique index on llm_json content hashes.
        if data.source_type == "llm_json" {
            let duplicate = state.sources.iter().any(|s| {
                s.tenant_id == tenant
                    && s.run_id == data.run_id
                    && s.source_type == "llm_json"
                    && s.content_hash.is_some()
                    && s.content_hash == data.content_hash
            });
            if duplicate {
                return Err(ProspectorError::Database(
                    "duplicate key value violates unique constraint \
                     \"uq_source_documents_llm_json_hash\""
                        .into(),
                ));
            }
        }
        let source = SourceDocument {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            run_id: data.run_id,
            source_type: data.source_type,
            title: data.title,
            url: data.url,
            url_normalized: data.url_normalized,
            content_text: data.content_text,
            content_bytes: data.content_bytes,
            content_size: data.content_size,
            content_hash: data.content_hash,
            status: "new".into(),
            meta: data.meta,
            error_message: None,
            created_at: Utc::now(),
        };
        state.sources.push(source.clone());
        Ok(source)
    }

    async fn add_source_if_new(
        &self,
        tenant: Uuid,
        data: NewSourceDocument,
    ) -> Result<(SourceDocument, bool)> {
        let data = backfill_source(data);
        if data.source_type == "llm_json" {
            let existing = {
                let state = self.lock();
                state
                    .sources
                    .iter()
                    .find(|s| {
                        s.tenant_id == tenant
                            && s.run_id == data.run_id
                            && s.source_type == "llm_json"
                            && s.content_hash.is_some()
                            && s.content_hash == data.content_hash
                    })
                    .cloned()
            };
            if let Some(existing) = existing {
                return Ok((existing, false));
            }
        }
        let source = self.add_source(tenant, data).await?;
        Ok((source, true))
    }

    async fn get_source(&self, tenant: Uuid, source_id: Uuid) -> Result<Option<SourceDocument>> {
        let state = self.lock();
        Ok(state
            .sources
            .iter()
            .find(|s| s.tenant_id == tenant && s.id == source_id)
            .cloned())
    }

    async fn list_sources_for_run(
        &self,
        tenant: Uuid,
        run_id: Uuid,
    ) -> Result<Vec<SourceDocument>> {
        let state = self.lock();
        Ok(state
            .sources
            .iter()
            .filter(|s| s.tenant_id == tenant && s.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn list_sources_by_status(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        source_type: &str,
        status: &str,
    ) -> Result<Vec<SourceDocument>> {
        let state = self.lock();
        Ok(state
            .sources
            .iter()
            .filter(|s| {
                s.tenant_id == tenant
                    && s.run_id == run_id
                    && s.source_type == source_type
                    && s.status == status
            })
            .cloned()
            .collect())
    }

    async fn find_llm_json_by_hash(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        content_hash: &str,
    ) -> Result<Option<SourceDocument>> {
        let state = self.lock();
        Ok(state
            .sources
            .iter()
            .find(|s| {
                s.tenant_id == tenant
                    && s.run_id == run_id
                    && s.source_type == "llm_json"
                    && s.content_hash.as_deref() == Some(content_hash)
            })
            .cloned())
    }

    async fn url_source_exists(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        url_normalized: &str,
    ) -> Result<bool> {
        let state = self.lock();
        Ok(state.sources.iter().any(|s| {
            s.tenant_id == tenant
                && s.run_id == run_id
                && s.url_normalized.as_deref() == Some(url_normalized)
        }))
    }

    async fn set_source_status(
        &self,
        tenant: Uuid,
        source_id: Uuid,
        status: &str,
        error_message: Option<&str>,
    ) -> Result<()> {
        let mut state = self.lock();
        if let Some(source) = state
            .sources
            .iter_mut()
            .find(|s| s.tenant_id == tenant && s.id == source_id)
        {
            source.status = status.to_string();
            source.error_message = error_message.map(str::to_string);
        }
        Ok(())
    }

    async fn set_source_content(
        &self,
        tenant: Uuid,
        source_id: Uuid,
        content_text: &str,
        content_hash: &str,
        status: &str,
    ) -> Result<()> {
        let mut state = self.lock();
        if let Some(source) = state
            .sources
            .iter_mut()
            .find(|s| s.tenant_id == tenant && s.id == source_id)
        {
            source.content_text = Some(content_text.to_string());
            source.content_hash = Some(content_hash.to_string());
            source.content_size = Some(content_text.len() as i64);
            source.status = status.to_string();
        }
        Ok(())
    }
}

#[async_trait]
impl ProspectRepo for MemoryStore {
    async fn insert_prospect(
        &self,
        tenant: Uuid,
        data: NewCompanyProspect,
    ) -> Result<(CompanyProspect, bool)> {
        let mut state = self.lock();
        if let Some(existing) = state.prospects.iter().find(|p| {
            p.tenant_id == tenant
                && p.run_id == data.run_id
                && p.name_normalized == data.name_normalized
        }) {
            return Ok((existing.clone(), false));
        }
        let prospect = CompanyProspect {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            run_id: data.run_id,
            role_mandate_id: data.role_mandate_id,
            name_raw: data.name_raw,
            name_normalized: data.name_normalized,
            website_url: data.website_url,
            hq_country: data.hq_country,
            hq_city: data.hq_city,
            sector: data.sector,
            subsector: data.subsector,
            relevance_score: data.relevance_score,
            evidence_score: data.evidence_score,
            manual_priority: None,
            is_pinned: false,
            status: "new".into(),
            review_status: "new".into(),
            verification_status: "unverified".into(),
            discovered_by: data.discovered_by,
            exec_search_enabled: false,
            created_at: Utc::now(),
        };
        state.prospects.push(prospect.clone());
        Ok((prospect, true))
    }

    async fn get_prospect(
        &self,
        tenant: Uuid,
        prospect_id: Uuid,
    ) -> Result<Option<CompanyProspect>> {
        let state = self.lock();
        Ok(state
            .prospects
            .iter()
            .find(|p| p.tenant_id == tenant && p.id == prospect_id)
            .cloned())
    }

    async fn get_prospect_by_normalized_name(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        name_normalized: &str,
    ) -> Result<Option<CompanyProspect>> {
        let state = self.lock();
        Ok(state
            .prospects
            .iter()
            .find(|p| {
                p.tenant_id == tenant
                    && p.run_id == run_id
                    && p.name_normalized == name_normalized
            })
            .cloned())
    }

    async fn list_prospects_for_run(
        &self,
        tenant: Uuid,
        run_id: Uuid,
    ) -> Result<Vec<CompanyProspect>> {
        let state = self.lock();
        Ok(state
            .prospects
            .iter()
            .filter(|p| p.tenant_id == tenant && p.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn set_discovered_by(
        &self,
        tenant: Uuid,
        prospect_id: Uuid,
        discovered_by: &str,
    ) -> Result<()> {
        let mut state = self.lock();
        if let Some(prospect) = state
            .prospects
            .iter_mut()
            .find(|p| p.tenant_id == tenant && p.id == prospect_id)
        {
            prospect.discovered_by = Some(discovered_by.to_string());
        }
        Ok(())
    }

    async fn set_review_status(
        &self,
        tenant: Uuid,
        prospect_id: Uuid,
        review_status: &str,
    ) -> Result<Option<CompanyProspect>> {
        let mut state = self.lock();
        if let Some(prospect) = state
            .prospects
            .iter_mut()
            .find(|p| p.tenant_id == tenant && p.id == prospect_id)
        {
            prospect.review_status = review_status.to_string();
            return Ok(Some(prospect.clone()));
        }
        Ok(None)
    }

    async fn set_exec_search_enabled(
        &self,
        tenant: Uuid,
        prospect_id: Uuid,
        enabled: bool,
    ) -> Result<Option<CompanyProspect>> {
        let mut state = self.lock();
        if let Some(prospect) = state
            .prospects
            .iter_mut()
            .find(|p| p.tenant_id == tenant && p.id == prospect_id)
        {
            prospect.exec_search_enabled = enabled;
            return Ok(Some(prospect.clone()));
        }
        Ok(None)
    }

    async fn add_evidence_if_new(
        &self,
        tenant: Uuid,
        data: NewCompanyEvidence,
    ) -> Result<(CompanyProspectEvidence, bool)> {
        let mut state = self.lock();
        if let Some(existing) = state.company_evidence.iter().find(|e| {
            e.tenant_id == tenant
                && e.company_prospect_id == data.company_prospect_id
                && e.source_url == data.source_url
                && e.source_name == data.source_name
        }) {
            return Ok((existing.clone(), false));
        }
        let evidence = CompanyProspectEvidence {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            company_prospect_id: data.company_prospect_id,
            source_type: data.source_type,
            source_name: data.source_name,
            source_url: data.source_url,
            raw_snippet: data.raw_snippet,
            source_document_id: data.source_document_id,
            source_content_hash: data.source_content_hash,
            created_at: Utc::now(),
        };
        state.company_evidence.push(evidence.clone());
        Ok((evidence, true))
    }

    async fn list_evidence_for_prospects(
        &self,
        tenant: Uuid,
        prospect_ids: &[Uuid],
    ) -> Result<Vec<CompanyProspectEvidence>> {
        let state = self.lock();
        Ok(state
            .company_evidence
            .iter()
            .filter(|e| e.tenant_id == tenant && prospect_ids.contains(&e.company_prospect_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ExecutiveRepo for MemoryStore {
    async fn insert_executive(
        &self,
        tenant: Uuid,
        data: NewExecutiveProspect,
    ) -> Result<(ExecutiveProspect, bool)> {
        let mut state = self.lock();
        if let Some(existing) = state.executives.iter().find(|x| {
            x.tenant_id == tenant
                && x.company_prospect_id == data.company_prospect_id
                && x.name_normalized == data.name_normalized
        }) {
            return Ok((existing.clone(), false));
        }
        let exec = ExecutiveProspect {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            run_id: data.run_id,
            company_prospect_id: data.company_prospect_id,
            name_raw: data.name_raw,
            name_normalized: data.name_normalized,
            title: data.title,
            email: data.email,
            linkedin_url: data.linkedin_url,
            location: data.location,
            confidence: data.confidence,
            status: "new".into(),
            discovered_by: data.discovered_by,
            source_document_id: data.source_document_id,
            created_at: Utc::now(),
        };
        state.executives.push(exec.clone());
        Ok((exec, true))
    }

    async fn list_executives_for_run(
        &self,
        tenant: Uuid,
        run_id: Uuid,
    ) -> Result<Vec<ExecutiveProspect>> {
        let state = self.lock();
        Ok(state
            .executives
            .iter()
            .filter(|x| x.tenant_id == tenant && x.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn add_exec_evidence_if_new(
        &self,
        tenant: Uuid,
        data: NewExecutiveEvidence,
    ) -> Result<(ExecutiveProspectEvidence, bool)> {
        let mut state = self.lock();
        if let Some(existing) = state.exec_evidence.iter().find(|e| {
            e.tenant_id == tenant
                && e.executive_prospect_id == data.executive_prospect_id
                && e.source_url == data.source_url
                && e.source_name == data.source_name
        }) {
            return Ok((existing.clone(), false));
        }
        let evidence = ExecutiveProspectEvidence {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            executive_prospect_id: data.executive_prospect_id,
            source_type: data.source_type,
            source_name: data.source_name,
            source_url: data.source_url,
            raw_snippet: data.raw_snippet,
            source_document_id: data.source_document_id,
            source_content_hash: data.source_content_hash,
            created_at: Utc::now(),
        };
        state.exec_evidence.push(evidence.clone());
        Ok((evidence, true))
    }

    async fn list_exec_evidence_for_ids(
        &self,
        tenant: Uuid,
        executive_ids: &[Uuid],
    ) -> Result<Vec<ExecutiveProspectEvidence>> {
        let state = self.lock();
        Ok(state
            .exec_evidence
            .iter()
            .filter(|e| e.tenant_id == tenant && executive_ids.contains(&e.executive_prospect_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ResolutionRepo for MemoryStore {
    async fn upsert_resolved_entity(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        data: NewResolvedEntity,
    ) -> Result<(ResolvedEntity, bool)> {
        let mut state = self.lock();
        if let Some(existing) = state.resolved.iter().find(|r| {
            r.tenant_id == tenant && r.run_id == run_id && r.resolution_hash == data.resolution_hash
        }) {
            return Ok((existing.clone(), false));
        }
        let entity = ResolvedEntity {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            run_id,
            entity_type: data.entity_type,
            canonical_entity_id: data.canonical_entity_id,
            match_keys: data.match_keys,
            reason_codes: data.reason_codes,
            evidence_source_document_ids: data.evidence_source_document_ids,
            resolution_hash: data.resolution_hash,
            created_at: Utc::now(),
        };
        state.resolved.push(entity.clone());
        Ok((entity, true))
    }

    async fn upsert_merge_link(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        data: NewEntityMergeLink,
    ) -> Result<(EntityMergeLink, bool)> {
        let mut state = self.lock();
        if let Some(existing) = state.merge_links.iter().find(|l| {
            l.tenant_id == tenant && l.run_id == run_id && l.resolution_hash == data.resolution_hash
        }) {
            return Ok((existing.clone(), false));
        }
        let link = EntityMergeLink {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            run_id,
            entity_type: data.entity_type,
            resolved_entity_id: data.resolved_entity_id,
            canonical_entity_id: data.canonical_entity_id,
            duplicate_entity_id: data.duplicate_entity_id,
            match_keys: data.match_keys,
            reason_codes: data.reason_codes,
            evidence_source_document_ids: data.evidence_source_document_ids,
            resolution_hash: data.resolution_hash,
            created_at: Utc::now(),
        };
        state.merge_links.push(link.clone());
        Ok((link, true))
    }

    async fn list_resolved_entities_for_run(
        &self,
        tenant: Uuid,
        run_id: Uuid,
    ) -> Result<Vec<ResolvedEntity>> {
        let state = self.lock();
        Ok(state
            .resolved
            .iter()
            .filter(|r| r.tenant_id == tenant && r.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn list_merge_links_for_run(
        &self,
        tenant: Uuid,
        run_id: Uuid,
    ) -> Result<Vec<EntityMergeLink>> {
        let state = self.lock();
        Ok(state
            .merge_links
            .iter()
            .filter(|l| l.tenant_id == tenant && l.run_id == run_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CanonicalPersonRepo for MemoryStore {
    async fn get_person_by_email(
        &self,
        tenant: Uuid,
        email: &str,
    ) -> Result<Option<CanonicalPerson>> {
        let state = self.lock();
        let person_id = state
            .person_emails
            .iter()
            .find(|e| e.tenant_id == tenant && e.email == email)
            .map(|e| e.canonical_person_id);
        Ok(person_id.and_then(|id| state.people.iter().find(|p| p.id == id).cloned()))
    }

    async fn create_person(
        &self,
        tenant: Uuid,
        data: NewCanonicalPerson,
    ) -> Result<CanonicalPerson> {
        let person = CanonicalPerson {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            canonical_full_name: data.canonical_full_name,
            primary_email: data.primary_email,
            primary_linkedin_url: data.primary_linkedin_url,
            created_at: Utc::now(),
        };
        self.lock().people.push(person.clone());
        Ok(person)
    }

    async fn upsert_person_email(
        &self,
        tenant: Uuid,
        canonical_person_id: Uuid,
        email: &str,
    ) -> Result<CanonicalPersonEmail> {
        let mut state = self.lock();
        if let Some(existing) = state
            .person_emails
            .iter()
            .find(|e| e.tenant_id == tenant && e.email == email)
        {
            return Ok(existing.clone());
        }
        let row = CanonicalPersonEmail {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            canonical_person_id,
            email: email.to_string(),
            created_at: Utc::now(),
        };
        state.person_emails.push(row.clone());
        Ok(row)
    }

    async fn upsert_person_link(
        &self,
        tenant: Uuid,
        data: NewCanonicalPersonLink,
    ) -> Result<(CanonicalPersonLink, bool)> {
        let mut state = self.lock();
        if let Some(existing) = state.person_links.iter().find(|l| {
            l.tenant_id == tenant
                && l.canonical_person_id == data.canonical_person_id
                && l.person_entity_id == data.person_entity_id
        }) {
            return Ok((existing.clone(), false));
        }
        let link = CanonicalPersonLink {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            canonical_person_id: data.canonical_person_id,
            person_entity_id: data.person_entity_id,
            match_rule: data.match_rule,
            evidence_source_document_id: data.evidence_source_document_id,
            evidence_run_id: data.evidence_run_id,
            created_at: Utc::now(),
        };
        state.person_links.push(link.clone());
        Ok((link, true))
    }

    async fn list_person_links(&self, tenant: Uuid) -> Result<Vec<CanonicalPersonLink>> {
        let state = self.lock();
        Ok(state
            .person_links
            .iter()
            .filter(|l| l.tenant_id == tenant)
            .cloned()
            .collect())
    }

    async fn count_people(&self, tenant: Uuid) -> Result<i64> {
        let state = self.lock();
        Ok(state.people.iter().filter(|p| p.tenant_id == tenant).count() as i64)
    }

    async fn find_person_by_name_company(
        &self,
        tenant: Uuid,
        name_normalized: &str,
        company_prospect_id: Uuid,
    ) -> Result<(Option<CanonicalPerson>, bool)> {
        let state = self.lock();
        let mut person_ids: Vec<Uuid> = state
            .executives
            .iter()
            .filter(|x| {
                x.tenant_id == tenant
                    && x.name_normalized == name_normalized
                    && x.company_prospect_id == company_prospect_id
            })
            .flat_map(|x| {
                state
                    .person_links
                    .iter()
                    .filter(move |l| l.person_entity_id == x.id)
                    .map(|l| l.canonical_person_id)
            })
            .collect();
        person_ids.sort();
        person_ids.dedup();
        let ambiguous = person_ids.len() > 1;
        let person = person_ids
            .first()
            .and_then(|id| state.people.iter().find(|p| p.id == *id).cloned());
        Ok((person, ambiguous))
    }
}

#[async_trait]
impl CanonicalCompanyRepo for MemoryStore {
    async fn get_company_by_domain(
        &self,
        tenant: Uuid,
        domain: &str,
    ) -> Result<Option<CanonicalCompany>> {
        let state = self.lock();
        let company_id = state
            .company_domains
            .iter()
            .find(|d| d.tenant_id == tenant && d.domain == domain)
            .map(|d| d.canonical_company_id);
        Ok(company_id.and_then(|id| state.companies.iter().find(|c| c.id == id).cloned()))
    }

    async fn get_company_by_name_country(
        &self,
        tenant: Uuid,
        name_normalized: &str,
        country_code: &str,
    ) -> Result<Option<CanonicalCompany>> {
        let state = self.lock();
        Ok(state
            .companies
            .iter()
            .find(|c| {
                c.tenant_id == tenant
                    && c.canonical_name
                        .as_deref()
                        .is_some_and(|n| n.to_lowercase() == name_normalized)
                    && c.country_code.as_deref() == Some(country_code)
            })
            .cloned())
    }

    async fn create_company(
        &self,
        tenant: Uuid,
        data: NewCanonicalCompany,
    ) -> Result<CanonicalCompany> {
        let company = CanonicalCompany {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            canonical_name: data.canonical_name,
            primary_domain: data.primary_domain,
            country_code: data.country_code,
            created_at: Utc::now(),
        };
        self.lock().companies.push(company.clone());
        Ok(company)
    }

    async fn upsert_company_domain(
        &self,
        tenant: Uuid,
        canonical_company_id: Uuid,
        domain: &str,
    ) -> Result<CanonicalCompanyDomain> {
        let mut state = self.lock();
        if let Some(existing) = state
            .company_domains
            .iter()
            .find(|d| d.tenant_id == tenant && d.domain == domain)
        {
            return Ok(existing.clone());
        }
        let row = CanonicalCompanyDomain {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            canonical_company_id,
            domain: domain.to_string(),
            created_at: Utc::now(),
        };
        state.company_domains.push(row.clone());
        Ok(row)
    }

    async fn upsert_company_link(
        &self,
        tenant: Uuid,
        data: NewCanonicalCompanyLink,
    ) -> Result<(CanonicalCompanyLink, bool)> {
        let mut state = self.lock();
        if let Some(existing) = state.company_links.iter().find(|l| {
            l.tenant_id == tenant
                && l.canonical_company_id == data.canonical_company_id
                && l.company_entity_id == data.company_entity_id
        }) {
            return Ok((existing.clone(), false));
        }
        let link = CanonicalCompanyLink {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            canonical_company_id: data.canonical_company_id,
            company_entity_id: data.company_entity_id,
            match_rule: data.match_rule,
            evidence_source_document_id: data.evidence_source_document_id,
            evidence_run_id: data.evidence_run_id,
            created_at: Utc::now(),
        };
        state.company_links.push(link.clone());
        Ok((link, true))
    }

    async fn list_company_links(&self, tenant: Uuid) -> Result<Vec<CanonicalCompanyLink>> {
        let state = self.lock();
        Ok(state
            .company_links
            .iter()
            .filter(|l| l.tenant_id == tenant)
            .cloned()
            .collect())
    }

    async fn count_companies(&self, tenant: Uuid) -> Result<i64> {
        let state = self.lock();
        Ok(state
            .companies
            .iter()
            .filter(|c| c.tenant_id == tenant)
            .count() as i64)
    }

    async fn canonical_ids_for_prospects(
        &self,
        tenant: Uuid,
        prospect_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Uuid>> {
        let state = self.lock();
        Ok(state
            .company_links
            .iter()
            .filter(|l| l.tenant_id == tenant && prospect_ids.contains(&l.company_entity_id))
            .map(|l| (l.company_entity_id, l.canonical_company_id))
            .collect())
    }
}

#[async_trait]
impl EnrichmentRepo for MemoryStore {
    async fn insert_enrichment_record_if_new(
        &self,
        tenant: Uuid,
        data: NewAiEnrichmentRecord,
    ) -> Result<(AiEnrichmentRecord, bool)> {
        let mut state = self.lock();
        if let Some(existing) = state.enrichment_records.iter().find(|r| {
            r.tenant_id == tenant
                && r.run_id == data.run_id
                && r.purpose == data.purpose
                && r.provider == data.provider
                && r.content_hash == data.content_hash
        }) {
            return Ok((existing.clone(), false));
        }
        let record = AiEnrichmentRecord {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            run_id: data.run_id,
            purpose: data.purpose,
            provider: data.provider,
            model: data.model,
            content_hash: data.content_hash,
            source_document_id: data.source_document_id,
            response_summary: data.response_summary,
            created_at: Utc::now(),
        };
        state.enrichment_records.push(record.clone());
        Ok((record, true))
    }

    async fn insert_assignment_if_new(
        &self,
        tenant: Uuid,
        data: NewEnrichmentAssignment,
    ) -> Result<(EnrichmentAssignment, bool)> {
        let mut state = self.lock();
        if let Some(existing) = state.assignments.iter().find(|a| {
            a.tenant_id == tenant
                && a.entity_type == data.entity_type
                && a.entity_id == data.entity_id
                && a.field_key == data.field_key
                && a.content_hash == data.content_hash
                && a.source_document_id == data.source_document_id
        }) {
            return Ok((existing.clone(), false));
        }
        let assignment = EnrichmentAssignment {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            entity_type: data.entity_type,
            entity_id: data.entity_id,
            field_key: data.field_key,
            value_json: data.value_json,
            value_normalized: data.value_normalized,
            confidence: data.confidence,
            derived_by: data.derived_by,
            content_hash: data.content_hash,
            source_document_id: data.source_document_id,
            created_at: Utc::now(),
        };
        state.assignments.push(assignment.clone());
        Ok((assignment, true))
    }

    async fn list_assignments_for_entity(
        &self,
        tenant: Uuid,
        entity_type: &str,
        entity_id: Uuid,
    ) -> Result<Vec<EnrichmentAssignment>> {
        let state = self.lock();
        Ok(state
            .assignments
            .iter()
            .filter(|a| {
                a.tenant_id == tenant && a.entity_type == entity_type && a.entity_id == entity_id
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl JobQueueRepo for MemoryStore {
    async fn enqueue_job(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        job_type: &str,
        max_attempts: i32,
    ) -> Result<ResearchJob> {
        let mut state = self.lock();
        if let Some(active) = state.jobs.iter().find(|j| {
            j.tenant_id == tenant
                && j.run_id == run_id
                && j.job_type == job_type
                && matches!(j.status.as_str(), "queued" | "running")
        }) {
            return Ok(active.clone());
        }
        let job = ResearchJob {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            run_id,
            job_type: job_type.to_string(),
            status: "queued".into(),
            attempt_count: 0,
            max_attempts,
            retry_at: None,
            locked_by: None,
            locked_at: None,
            cancel_requested: false,
            last_error: None,
            created_at: Utc::now(),
        };
        state.jobs.push(job.clone());
        Ok(job)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ResearchJob>> {
        let state = self.lock();
        Ok(state.jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn claim_next_job(
        &self,
        worker_id: &str,
        stale_lock_secs: i64,
    ) -> Result<Option<ResearchJob>> {
        let now = Utc::now();
        let stale_before = now - chrono::Duration::seconds(stale_lock_secs);
        let mut state = self.lock();
        let claimable = state.jobs.iter_mut().find(|j| {
            (j.status == "queued" && j.retry_at.map_or(true, |at| at <= now))
                || (j.status == "running" && j.locked_at.is_some_and(|at| at < stale_before))
        });
        if let Some(job) = claimable {
            job.status = "running".into();
            job.attempt_count += 1;
            job.locked_by = Some(worker_id.to_string());
            job.locked_at = Some(now);
            job.retry_at = None;
            return Ok(Some(job.clone()));
        }
        Ok(None)
    }

    async fn mark_job_succeeded(&self, job_id: Uuid) -> Result<()> {
        let mut state = self.lock();
        if let Some(job) = state.jobs.iter_mut().find(|j| j.id == job_id) {
            job.status = "succeeded".into();
            job.locked_by = None;
            job.locked_at = None;
            job.last_error = None;
        }
        Ok(())
    }

    async fn mark_job_failed(
        &self,
        job_id: Uuid,
        last_error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut state = self.lock();
        if let Some(job) = state.jobs.iter_mut().find(|j| j.id == job_id) {
            job.last_error = Some(last_error.to_string());
            job.locked_by = None;
            job.locked_at = None;
            match retry_at {
                Some(at) => {
                    job.status = "queued".into();
                    job.retry_at = Some(at);
                }
                None => {
                    job.status = "failed".into();
                    job.retry_at = None;
                }
            }
        }
        Ok(())
    }

    async fn mark_job_cancelled(&self, job_id: Uuid, reason: Option<&str>) -> Result<()> {
        let mut state = self.lock();
        if let Some(job) = state.jobs.iter_mut().find(|j| j.id == job_id) {
            job.status = "cancelled".into();
            job.retry_at = None;
            job.last_error = reason.map(str::to_string);
            job.locked_by = None;
            job.locked_at = None;
        }
        Ok(())
    }

    async fn request_cancel(&self, tenant: Uuid, run_id: Uuid) -> Result<bool> {
        let mut state = self.lock();
        let mut flagged = false;
        for job in state.jobs.iter_mut().filter(|j| {
            j.tenant_id == tenant
                && j.run_id == run_id
                && matches!(j.status.as_str(), "queued" | "running")
        }) {
            job.cancel_requested = true;
            flagged = true;
        }
        Ok(flagged)
    }
}

#[async_trait]
impl EventRepo for MemoryStore {
    async fn append_event(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        data: NewResearchEvent,
    ) -> Result<ResearchEvent> {
        let event = ResearchEvent {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            run_id,
            event_type: data.event_type,
            status: data.status,
            message: data.message,
            meta: data.meta,
            created_at: Utc::now(),
        };
        self.lock().events.push(event.clone());
        Ok(event)
    }

    async fn list_events_for_run(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ResearchEvent>> {
        let state = self.lock();
        let mut events: Vec<_> = state
            .events
            .iter()
            .filter(|e| e.tenant_id == tenant && e.run_id == run_id)
            .cloned()
            .collect();
        events.reverse();
        events.truncate(limit as usize);
        Ok(events)
    }

    async fn append_activity(
        &self,
        tenant: Uuid,
        data: NewActivityEntry,
    ) -> Result<ActivityLogEntry> {
        let entry = ActivityLogEntry {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            actor: data.actor,
            action: data.action,
            entity_type: data.entity_type,
            entity_id: data.entity_id,
            detail: data.detail,
            created_at: Utc::now(),
        };
        self.lock().activity.push(entry.clone());
        Ok(entry)
    }

    async fn list_activity_for_entity(
        &self,
        tenant: Uuid,
        entity_id: Uuid,
    ) -> Result<Vec<ActivityLogEntry>> {
        let state = self.lock();
        Ok(state
            .activity
            .iter()
            .filter(|a| a.tenant_id == tenant && a.entity_id == entity_id)
            .cloned()
            .collect())
    }
}
