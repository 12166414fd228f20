//! Plain row records and insert parameter structs for every aggregate.
//!
//! Statuses and enum-ish columns are stored as TEXT and surfaced as `String`;
//! engine code converts through the `prospector_common` enums at its edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Research runs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ResearchRun {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub role_mandate_id: Option<Uuid>,
    pub name: String,
    pub status: String,
    pub sector: Option<String>,
    pub region_scope: Option<String>,
    pub config: Option<Value>,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewResearchRun {
    pub role_mandate_id: Option<Uuid>,
    pub name: String,
    pub sector: Option<String>,
    pub region_scope: Option<String>,
    pub config: Option<Value>,
}

/// Status transition parameters for a run.
#[derive(Debug, Clone, Default)]
pub struct RunStatusUpdate {
    pub status: String,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// When false, started_at/finished_at are left untouched if None.
    pub clear_finished_at: bool,
}

// ---------------------------------------------------------------------------
// Plans and steps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ResearchRunPlan {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub run_id: Uuid,
    pub version: i32,
    pub plan_json: Value,
    pub locked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ResearchRunStep {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub run_id: Uuid,
    pub step_key: String,
    pub step_order: i32,
    pub status: String,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub input_json: Option<Value>,
    pub output_json: Option<Value>,
    pub last_error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRunStep {
    pub step_key: String,
    pub step_order: i32,
    pub max_attempts: i32,
    pub input_json: Option<Value>,
}

// ---------------------------------------------------------------------------
// Source documents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SourceDocument {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub run_id: Uuid,
    pub source_type: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub url_normalized: Option<String>,
    pub content_text: Option<String>,
    pub content_bytes: Option<Vec<u8>>,
    pub content_size: Option<i64>,
    pub content_hash: Option<String>,
    pub status: String,
    pub meta: Option<Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewSourceDocument {
    pub run_id: Uuid,
    pub source_type: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub url_normalized: Option<String>,
    pub content_text: Option<String>,
    pub content_bytes: Option<Vec<u8>>,
    pub content_size: Option<i64>,
    pub content_hash: Option<String>,
    pub meta: Option<Value>,
}

// ---------------------------------------------------------------------------
// Company prospects and evidence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CompanyProspect {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub run_id: Uuid,
    pub role_mandate_id: Option<Uuid>,
    pub name_raw: String,
    pub name_normalized: String,
    pub website_url: Option<String>,
    pub hq_country: Option<String>,
    pub hq_city: Option<String>,
    pub sector: Option<String>,
    pub subsector: Option<String>,
    pub relevance_score: Option<f64>,
    pub evidence_score: Option<f64>,
    pub manual_priority: Option<i32>,
    pub is_pinned: bool,
    pub status: String,
    pub review_status: String,
    pub verification_status: String,
    pub discovered_by: Option<String>,
    pub exec_search_enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewCompanyProspect {
    pub run_id: Uuid,
    pub role_mandate_id: Option<Uuid>,
    pub name_raw: String,
    pub name_normalized: String,
    pub website_url: Option<String>,
    pub hq_country: Option<String>,
    pub hq_city: Option<String>,
    pub sector: Option<String>,
    pub subsector: Option<String>,
    pub relevance_score: Option<f64>,
    pub evidence_score: Option<f64>,
    pub discovered_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CompanyProspectEvidence {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub company_prospect_id: Uuid,
    pub source_type: String,
    pub source_name: Option<String>,
    pub source_url: Option<String>,
    pub raw_snippet: Option<String>,
    pub source_document_id: Option<Uuid>,
    pub source_content_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewCompanyEvidence {
    pub company_prospect_id: Uuid,
    pub source_type: String,
    pub source_name: Option<String>,
    pub source_url: Option<String>,
    pub raw_snippet: Option<String>,
    pub source_document_id: Option<Uuid>,
    pub source_content_hash: Option<String>,
}

// ---------------------------------------------------------------------------
// Executive prospects and evidence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExecutiveProspect {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub run_id: Uuid,
    pub company_prospect_id: Uuid,
    pub name_raw: String,
    pub name_normalized: String,
    pub title: Option<String>,
    pub email: Option<String>,
    pub linkedin_url: Option<String>,
    pub location: Option<String>,
    pub confidence: Option<f64>,
    pub status: String,
    pub discovered_by: Option<String>,
    pub source_document_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewExecutiveProspect {
    pub run_id: Uuid,
    pub company_prospect_id: Uuid,
    pub name_raw: String,
    pub name_normalized: String,
    pub title: Option<String>,
    pub email: Option<String>,
    pub linkedin_url: Option<String>,
    pub location: Option<String>,
    pub confidence: Option<f64>,
    pub discovered_by: Option<String>,
    pub source_document_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExecutiveProspectEvidence {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub executive_prospect_id: Uuid,
    pub source_type: String,
    pub source_name: Option<String>,
    pub source_url: Option<String>,
    pub raw_snippet: Option<String>,
    pub source_document_id: Option<Uuid>,
    pub source_content_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewExecutiveEvidence {
    pub executive_prospect_id: Uuid,
    pub source_type: String,
    pub source_name: Option<String>,
    pub source_url: Option<String>,
    pub raw_snippet: Option<String>,
    pub source_document_id: Option<Uuid>,
    pub source_content_hash: Option<String>,
}

// ---------------------------------------------------------------------------
// Run-scoped entity resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ResolvedEntity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub run_id: Uuid,
    pub entity_type: String,
    pub canonical_entity_id: Uuid,
    pub match_keys: Value,
    pub reason_codes: Value,
    pub evidence_source_document_ids: Value,
    pub resolution_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewResolvedEntity {
    pub entity_type: String,
    pub canonical_entity_id: Uuid,
    pub match_keys: Value,
    pub reason_codes: Value,
    pub evidence_source_document_ids: Value,
    pub resolution_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EntityMergeLink {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub run_id: Uuid,
    pub entity_type: String,
    pub resolved_entity_id: Option<Uuid>,
    pub canonical_entity_id: Uuid,
    pub duplicate_entity_id: Uuid,
    pub match_keys: Value,
    pub reason_codes: Value,
    pub evidence_source_document_ids: Value,
    pub resolution_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEntityMergeLink {
    pub entity_type: String,
    pub resolved_entity_id: Option<Uuid>,
    pub canonical_entity_id: Uuid,
    pub duplicate_entity_id: Uuid,
    pub match_keys: Value,
    pub reason_codes: Value,
    pub evidence_source_document_ids: Value,
    pub resolution_hash: String,
}

// ---------------------------------------------------------------------------
// Canonical people
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CanonicalPerson {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub canonical_full_name: Option<String>,
    pub primary_email: Option<String>,
    pub primary_linkedin_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewCanonicalPerson {
    pub canonical_full_name: Option<String>,
    pub primary_email: Option<String>,
    pub primary_linkedin_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CanonicalPersonEmail {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub canonical_person_id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CanonicalPersonLink {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub canonical_person_id: Uuid,
    pub person_entity_id: Uuid,
    pub match_rule: String,
    pub evidence_source_document_id: Option<Uuid>,
    pub evidence_run_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCanonicalPersonLink {
    pub canonical_person_id: Uuid,
    pub person_entity_id: Uuid,
    pub match_rule: String,
    pub evidence_source_document_id: Option<Uuid>,
    pub evidence_run_id: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// Canonical companies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CanonicalCompany {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub canonical_name: Option<String>,
    pub primary_domain: Option<String>,
    pub country_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewCanonicalCompany {
    pub canonical_name: Option<String>,
    pub primary_domain: Option<String>,
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CanonicalCompanyDomain {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub canonical_company_id: Uuid,
    pub domain: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CanonicalCompanyLink {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub canonical_company_id: Uuid,
    pub company_entity_id: Uuid,
    pub match_rule: String,
    pub evidence_source_document_id: Option<Uuid>,
    pub evidence_run_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCanonicalCompanyLink {
    pub canonical_company_id: Uuid,
    pub company_entity_id: Uuid,
    pub match_rule: String,
    pub evidence_source_document_id: Option<Uuid>,
    pub evidence_run_id: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EnrichmentAssignment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub field_key: String,
    pub value_json: Value,
    pub value_normalized: Option<String>,
    pub confidence: f64,
    pub derived_by: String,
    pub content_hash: String,
    pub source_document_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEnrichmentAssignment {
    pub entity_type: String,
    pub entity_id: Uuid,
    pub field_key: String,
    pub value_json: Value,
    pub value_normalized: Option<String>,
    pub confidence: f64,
    pub derived_by: String,
    pub content_hash: String,
    pub source_document_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AiEnrichmentRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub run_id: Uuid,
    pub purpose: String,
    pub provider: String,
    pub model: Option<String>,
    pub content_hash: String,
    pub source_document_id: Option<Uuid>,
    pub response_summary: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAiEnrichmentRecord {
    pub run_id: Uuid,
    pub purpose: String,
    pub provider: String,
    pub model: Option<String>,
    pub content_hash: String,
    pub source_document_id: Option<Uuid>,
    pub response_summary: Option<Value>,
}

// ---------------------------------------------------------------------------
// Job queue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ResearchJob {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub run_id: Uuid,
    pub job_type: String,
    pub status: String,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub retry_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub cancel_requested: bool,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Events and audit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ResearchEvent {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub run_id: Uuid,
    pub event_type: String,
    pub status: String,
    pub message: Option<String>,
    pub meta: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewResearchEvent {
    pub event_type: String,
    pub status: String,
    pub message: Option<String>,
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivityLogEntry {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub detail: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewActivityEntry {
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub detail: Option<Value>,
}
