//! Repository contracts, one trait per aggregate.
//!
//! All cross-entity relationships are explicit foreign-key fields resolved
//! through these calls; there is no lazy graph traversal. Every method is
//! implicitly tenant-scoped by its first argument.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use prospector_common::Result;

use crate::records::*;

#[async_trait]
pub trait RunRepo: Send + Sync {
    async fn create_run(&self, tenant: Uuid, data: NewResearchRun) -> Result<ResearchRun>;
    async fn get_run(&self, tenant: Uuid, run_id: Uuid) -> Result<Option<ResearchRun>>;
    async fn set_run_status(&self, tenant: Uuid, run_id: Uuid, update: RunStatusUpdate)
        -> Result<()>;
}

#[async_trait]
pub trait PlanRepo: Send + Sync {
    async fn get_plan(&self, tenant: Uuid, run_id: Uuid) -> Result<Option<ResearchRunPlan>>;

    /// Create the plan once; a second call returns the existing row unchanged.
    async fn create_plan_if_missing(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        plan_json: Value,
        version: i32,
    ) -> Result<ResearchRunPlan>;

    /// Freeze the plan. Idempotent: an already-locked plan keeps its lock time.
    async fn lock_plan(&self, tenant: Uuid, run_id: Uuid) -> Result<Option<ResearchRunPlan>>;

    /// Insert missing steps in `pending` status; existing steps are untouched.
    async fn upsert_steps(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        steps: Vec<NewRunStep>,
    ) -> Result<Vec<ResearchRunStep>>;

    async fn list_steps(&self, tenant: Uuid, run_id: Uuid) -> Result<Vec<ResearchRunStep>>;

    /// Claim the lowest-ordered runnable step (pending/failed, attempts left,
    /// retry due), marking it running and incrementing its attempt count.
    async fn claim_next_step(&self, tenant: Uuid, run_id: Uuid)
        -> Result<Option<ResearchRunStep>>;

    async fn mark_step_ok(&self, step_id: Uuid, output_json: Option<Value>) -> Result<()>;
    async fn mark_step_failed(
        &self,
        step_id: Uuid,
        last_error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
    async fn cancel_pending_steps(&self, tenant: Uuid, run_id: Uuid, reason: &str) -> Result<u64>;

    /// Put failed/cancelled steps back to `pending` with a fresh attempt
    /// budget. Used by run retry.
    async fn reset_failed_steps(&self, tenant: Uuid, run_id: Uuid) -> Result<u64>;
}

#[async_trait]
pub trait SourceDocumentRepo: Send + Sync {
    /// Insert a source document, back-filling content_hash (bytes preferred,
    /// else text), url_normalized, and content_size when absent.
    async fn add_source(&self, tenant: Uuid, data: NewSourceDocument) -> Result<SourceDocument>;

    /// Like [`add_source`](Self::add_source), but an llm_json content-hash
    /// conflict returns the already-stored row with `created = false` instead
    /// of a database error. Closes the probe-then-insert race on duplicate
    /// payload submissions.
    async fn add_source_if_new(
        &self,
        tenant: Uuid,
        data: NewSourceDocument,
    ) -> Result<(SourceDocument, bool)>;

    async fn get_source(&self, tenant: Uuid, source_id: Uuid) -> Result<Option<SourceDocument>>;
    async fn list_sources_for_run(&self, tenant: Uuid, run_id: Uuid)
        -> Result<Vec<SourceDocument>>;

    /// Sources of one type in one status, oldest first.
    async fn list_sources_by_status(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        source_type: &str,
        status: &str,
    ) -> Result<Vec<SourceDocument>>;

    /// The llm_json idempotency probe: any source in this run with this hash.
    async fn find_llm_json_by_hash(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        content_hash: &str,
    ) -> Result<Option<SourceDocument>>;

    async fn url_source_exists(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        url_normalized: &str,
    ) -> Result<bool>;

    async fn set_source_status(
        &self,
        tenant: Uuid,
        source_id: Uuid,
        status: &str,
        error_message: Option<&str>,
    ) -> Result<()>;

    /// Store fetched content and transition status in one write.
    async fn set_source_content(
        &self,
        tenant: Uuid,
        source_id: Uuid,
        content_text: &str,
        content_hash: &str,
        status: &str,
    ) -> Result<()>;
}

#[async_trait]
pub trait ProspectRepo: Send + Sync {
    /// Insert a prospect; on a (tenant, run, name_normalized) conflict the
    /// existing row is returned with `created == false`.
    async fn insert_prospect(
        &self,
        tenant: Uuid,
        data: NewCompanyProspect,
    ) -> Result<(CompanyProspect, bool)>;

    async fn get_prospect(&self, tenant: Uuid, prospect_id: Uuid)
        -> Result<Option<CompanyProspect>>;
    async fn get_prospect_by_normalized_name(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        name_normalized: &str,
    ) -> Result<Option<CompanyProspect>>;
    async fn list_prospects_for_run(&self, tenant: Uuid, run_id: Uuid)
        -> Result<Vec<CompanyProspect>>;

    async fn set_discovered_by(
        &self,
        tenant: Uuid,
        prospect_id: Uuid,
        discovered_by: &str,
    ) -> Result<()>;
    async fn set_review_status(
        &self,
        tenant: Uuid,
        prospect_id: Uuid,
        review_status: &str,
    ) -> Result<Option<CompanyProspect>>;
    async fn set_exec_search_enabled(
        &self,
        tenant: Uuid,
        prospect_id: Uuid,
        enabled: bool,
    ) -> Result<Option<CompanyProspect>>;

    /// Insert evidence unless a row with the same (prospect, source_url,
    /// source_name) already exists. Returns `created`.
    async fn add_evidence_if_new(
        &self,
        tenant: Uuid,
        data: NewCompanyEvidence,
    ) -> Result<(CompanyProspectEvidence, bool)>;

    async fn list_evidence_for_prospects(
        &self,
        tenant: Uuid,
        prospect_ids: &[Uuid],
    ) -> Result<Vec<CompanyProspectEvidence>>;
}

#[async_trait]
pub trait ExecutiveRepo: Send + Sync {
    /// Insert an executive; on a (tenant, company_prospect, name_normalized)
    /// conflict the existing row is returned with `created == false`.
    async fn insert_executive(
        &self,
        tenant: Uuid,
        data: NewExecutiveProspect,
    ) -> Result<(ExecutiveProspect, bool)>;

    async fn list_executives_for_run(
        &self,
        tenant: Uuid,
        run_id: Uuid,
    ) -> Result<Vec<ExecutiveProspect>>;

    async fn add_exec_evidence_if_new(
        &self,
        tenant: Uuid,
        data: NewExecutiveEvidence,
    ) -> Result<(ExecutiveProspectEvidence, bool)>;

    async fn list_exec_evidence_for_ids(
        &self,
        tenant: Uuid,
        executive_ids: &[Uuid],
    ) -> Result<Vec<ExecutiveProspectEvidence>>;
}

#[async_trait]
pub trait ResolutionRepo: Send + Sync {
    /// Keyed by resolution_hash; a rerun over unchanged input creates no rows.
    async fn upsert_resolved_entity(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        data: NewResolvedEntity,
    ) -> Result<(ResolvedEntity, bool)>;

    async fn upsert_merge_link(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        data: NewEntityMergeLink,
    ) -> Result<(EntityMergeLink, bool)>;

    async fn list_resolved_entities_for_run(
        &self,
        tenant: Uuid,
        run_id: Uuid,
    ) -> Result<Vec<ResolvedEntity>>;

    async fn list_merge_links_for_run(
        &self,
        tenant: Uuid,
        run_id: Uuid,
    ) -> Result<Vec<EntityMergeLink>>;
}

#[async_trait]
pub trait CanonicalPersonRepo: Send + Sync {
    async fn get_person_by_email(&self, tenant: Uuid, email: &str)
        -> Result<Option<CanonicalPerson>>;
    async fn create_person(&self, tenant: Uuid, data: NewCanonicalPerson)
        -> Result<CanonicalPerson>;

    /// Bind an email to a person. On a (tenant, email) conflict the winning
    /// row is returned so the caller links against the winner.
    async fn upsert_person_email(
        &self,
        tenant: Uuid,
        canonical_person_id: Uuid,
        email: &str,
    ) -> Result<CanonicalPersonEmail>;

    async fn upsert_person_link(
        &self,
        tenant: Uuid,
        data: NewCanonicalPersonLink,
    ) -> Result<(CanonicalPersonLink, bool)>;

    async fn list_person_links(&self, tenant: Uuid) -> Result<Vec<CanonicalPersonLink>>;
    async fn count_people(&self, tenant: Uuid) -> Result<i64>;

    /// Find a canonical person already linked to an executive with this
    /// normalized name at this company. `true` when multiple candidates match.
    async fn find_person_by_name_company(
        &self,
        tenant: Uuid,
        name_normalized: &str,
        company_prospect_id: Uuid,
    ) -> Result<(Option<CanonicalPerson>, bool)>;
}

#[async_trait]
pub trait CanonicalCompanyRepo: Send + Sync {
    async fn get_company_by_domain(
        &self,
        tenant: Uuid,
        domain: &str,
    ) -> Result<Option<CanonicalCompany>>;
    async fn get_company_by_name_country(
        &self,
        tenant: Uuid,
        name_normalized: &str,
        country_code: &str,
    ) -> Result<Option<CanonicalCompany>>;
    async fn create_company(
        &self,
        tenant: Uuid,
        data: NewCanonicalCompany,
    ) -> Result<CanonicalCompany>;

    async fn upsert_company_domain(
        &self,
        tenant: Uuid,
        canonical_company_id: Uuid,
        domain: &str,
    ) -> Result<CanonicalCompanyDomain>;

    async fn upsert_company_link(
        &self,
        tenant: Uuid,
        data: NewCanonicalCompanyLink,
    ) -> Result<(CanonicalCompanyLink, bool)>;

    async fn list_company_links(&self, tenant: Uuid) -> Result<Vec<CanonicalCompanyLink>>;
    async fn count_companies(&self, tenant: Uuid) -> Result<i64>;

    /// Map company prospects to their canonical companies (ranking reads
    /// enrichment through this).
    async fn canonical_ids_for_prospects(
        &self,
        tenant: Uuid,
        prospect_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Uuid>>;
}

#[async_trait]
pub trait EnrichmentRepo: Send + Sync {
    async fn insert_enrichment_record_if_new(
        &self,
        tenant: Uuid,
        data: NewAiEnrichmentRecord,
    ) -> Result<(AiEnrichmentRecord, bool)>;

    async fn insert_assignment_if_new(
        &self,
        tenant: Uuid,
        data: NewEnrichmentAssignment,
    ) -> Result<(EnrichmentAssignment, bool)>;

    async fn list_assignments_for_entity(
        &self,
        tenant: Uuid,
        entity_type: &str,
        entity_id: Uuid,
    ) -> Result<Vec<EnrichmentAssignment>>;
}

#[async_trait]
pub trait JobQueueRepo: Send + Sync {
    /// Enqueue a job unless one is already queued or running for this
    /// (tenant, run, job_type); in that case the active job is returned.
    async fn enqueue_job(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        job_type: &str,
        max_attempts: i32,
    ) -> Result<ResearchJob>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ResearchJob>>;

    /// Atomically claim one due job (queued and retry-due, or running with a
    /// lock older than `stale_lock_secs`), marking it running under
    /// `worker_id` and incrementing its attempt count. Safe under concurrent
    /// workers.
    async fn claim_next_job(
        &self,
        worker_id: &str,
        stale_lock_secs: i64,
    ) -> Result<Option<ResearchJob>>;

    async fn mark_job_succeeded(&self, job_id: Uuid) -> Result<()>;

    /// Requeue for `retry_at` when Some, otherwise permanently failed.
    async fn mark_job_failed(
        &self,
        job_id: Uuid,
        last_error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn mark_job_cancelled(&self, job_id: Uuid, reason: Option<&str>) -> Result<()>;

    /// Flag the active job for cooperative cancellation. False when no job is
    /// queued or running.
    async fn request_cancel(&self, tenant: Uuid, run_id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait EventRepo: Send + Sync {
    async fn append_event(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        data: NewResearchEvent,
    ) -> Result<ResearchEvent>;

    async fn list_events_for_run(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ResearchEvent>>;

    async fn append_activity(&self, tenant: Uuid, data: NewActivityEntry)
        -> Result<ActivityLogEntry>;

    async fn list_activity_for_entity(
        &self,
        tenant: Uuid,
        entity_id: Uuid,
    ) -> Result<Vec<ActivityLogEntry>>;
}

/// Umbrella trait: the full persistence surface the research engine needs.
pub trait ResearchStore:
    RunRepo
    + PlanRepo
    + SourceDocumentRepo
    + ProspectRepo
    + ExecutiveRepo
    + ResolutionRepo
    + CanonicalPersonRepo
    + CanonicalCompanyRepo
    + EnrichmentRepo
    + JobQueueRepo
    + EventRepo
{
}

impl<T> ResearchStore for T where
    T: RunRepo
        + PlanRepo
        + SourceDocumentRepo
        + ProspectRepo
        + ExecutiveRepo
        + ResolutionRepo
        + CanonicalPersonRepo
        + CanonicalCompanyRepo
        + EnrichmentRepo
        + JobQueueRepo
        + EventRepo
{
}
