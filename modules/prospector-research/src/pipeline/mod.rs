//! Ingestion pipelines, one per source kind.
//!
//! Every pipeline is idempotent on `sha256(canonical_json(payload))`: a
//! payload whose hash already exists for the run returns `skipped = true`
//! with zero-delta stats and touches no other tables.

pub mod fetch;
pub mod llm_companies;
pub mod llm_executives;
pub mod manual_lists;
pub mod process_sources;
pub mod proposals;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use prospector_common::{normalize, ProspectorError, Result, SourceType};
use prospector_store::{NewSourceDocument, ResearchStore, SourceDocument};

pub const DUPLICATE_HASH: &str = "duplicate_hash";

/// Per-source error messages are truncated before persisting.
const ERROR_TRUNCATE: usize = 500;

pub(crate) fn truncate_error(msg: &str) -> String {
    if msg.len() <= ERROR_TRUNCATE {
        return msg.to_string();
    }
    let mut cut = ERROR_TRUNCATE;
    while !msg.is_char_boundary(cut) {
        cut -= 1;
    }
    msg[..cut].to_string()
}

/// An LLM-JSON submission: provider metadata plus the raw payload.
#[derive(Debug, Clone)]
pub struct LlmJsonRequest {
    pub provider: String,
    pub model: Option<String>,
    pub purpose: String,
    pub payload: Value,
}

#[derive(Debug, Default, Serialize)]
pub struct CompanyIngestSummary {
    pub skipped: bool,
    pub reason: Option<String>,
    pub source_id: Option<Uuid>,
    pub enrichment_id: Option<Uuid>,
    pub content_hash: String,
    pub companies_new: u64,
    pub companies_existing: u64,
    pub evidence_created: u64,
    pub urls_created: u64,
    pub urls_existing: u64,
}

#[derive(Debug, Serialize)]
pub struct CompanyExecSummary {
    pub company: String,
    pub executives_new: u64,
    pub executives_existing: u64,
    pub evidence_created: u64,
}

#[derive(Debug, Default, Serialize)]
pub struct ExecutiveIngestSummary {
    pub skipped: bool,
    pub reason: Option<String>,
    pub source_id: Option<Uuid>,
    pub enrichment_id: Option<Uuid>,
    pub content_hash: String,
    pub eligible_company_count: u64,
    pub processed_company_count: u64,
    pub company_summaries: Vec<CompanyExecSummary>,
    pub executives_new: u64,
    pub executives_existing: u64,
    pub evidence_created: u64,
    pub urls_created: u64,
    pub urls_existing: u64,
}

#[derive(Debug, Default, Serialize)]
pub struct ListIngestSummary {
    pub skipped: bool,
    pub reason: Option<String>,
    pub source_id: Option<Uuid>,
    pub content_hash: String,
    pub lines_seen: u64,
    pub companies_new: u64,
    pub companies_existing: u64,
    pub evidence_created: u64,
}

/// Outcome of a bulk pass over pending sources. One item's failure never
/// aborts its siblings.
#[derive(Debug, Default, Serialize)]
pub struct BatchSummary {
    pub processed: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Purpose strings accepted on the LLM-JSON endpoint.
pub fn validate_purpose(purpose: &str) -> Result<()> {
    match purpose {
        "company_discovery" | "executive_discovery" => Ok(()),
        other => Err(ProspectorError::validation(
            "invalid_purpose",
            format!("unknown purpose '{other}'"),
        )),
    }
}

/// Scan a run's sources of one type for a content hash. Used by the pipelines
/// whose source types are not covered by the llm_json unique index.
pub(crate) async fn find_source_by_hash<S>(
    store: &S,
    tenant: Uuid,
    run_id: Uuid,
    source_type: SourceType,
    content_hash: &str,
) -> Result<Option<SourceDocument>>
where
    S: ResearchStore + ?Sized,
{
    let sources = store.list_sources_for_run(tenant, run_id).await?;
    Ok(sources.into_iter().find(|s| {
        s.source_type == source_type.as_str() && s.content_hash.as_deref() == Some(content_hash)
    }))
}

/// Promote an evidence URL into a `url`-typed source for later fetching.
/// Returns true when a new source row was created.
pub(crate) async fn promote_evidence_url<S>(
    store: &S,
    tenant: Uuid,
    run_id: Uuid,
    raw_url: &str,
    title: Option<&str>,
) -> Result<bool>
where
    S: ResearchStore + ?Sized,
{
    let normalized = match normalize::normalize_url(raw_url) {
        Ok(n) => n,
        // Unparseable evidence URLs are kept as evidence text only.
        Err(_) => return Ok(false),
    };
    if store.url_source_exists(tenant, run_id, &normalized).await? {
        return Ok(false);
    }
    store
        .add_source(
            tenant,
            NewSourceDocument {
                run_id,
                source_type: SourceType::Url.as_str().to_string(),
                title: title.map(str::to_string),
                url: Some(raw_url.to_string()),
                url_normalized: Some(normalized),
                ..Default::default()
            },
        )
        .await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purpose_validation() {
        assert!(validate_purpose("company_discovery").is_ok());
        assert!(validate_purpose("executive_discovery").is_ok());
        let err = validate_purpose("enrich_everything").unwrap_err();
        assert_eq!(err.code(), "invalid_purpose");
    }

    #[test]
    fn error_truncation_respects_char_boundaries() {
        let long = "é".repeat(600);
        let cut = truncate_error(&long);
        assert!(cut.len() <= 500);
        assert!(cut.chars().all(|c| c == 'é'));
    }
}
