//! Line-based company-name extraction from fetched and pasted text sources.
//!
//! The heuristics are deliberately deterministic: the same source text always
//! yields the same candidate set, so reprocessing a run is stable.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use prospector_common::{normalize, DiscoveredBy, ProspectorError, Result, SourceStatus, SourceType};
use prospector_store::{
    NewCompanyEvidence, NewCompanyProspect, NewResearchEvent, ResearchStore, SourceDocument,
};

use super::{truncate_error, BatchSummary};

static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*•–—>]+|\d{1,3}[.)])\s*").unwrap());
static URL_OR_EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://|www\.|@").unwrap());

const MAX_CANDIDATE_LEN: usize = 80;
const MAX_CANDIDATE_WORDS: usize = 6;
const GARBAGE_RATIO: f64 = 0.7;

/// Extract company-name candidates from free text, one per line.
///
/// Bullets and list numbering are stripped, lines that look like prose, URLs
/// or addresses are dropped, and if more than 70% of what survives is short
/// single words the whole source is treated as navigation garbage and yields
/// nothing.
pub fn extract_company_candidates(text: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    for line in text.lines() {
        let stripped = BULLET_RE.replace(line, "");
        let trimmed = stripped.trim().trim_end_matches([',', ';', ':', '.']);
        if trimmed.is_empty() || trimmed.len() > MAX_CANDIDATE_LEN {
            continue;
        }
        if URL_OR_EMAIL_RE.is_match(trimmed) {
            continue;
        }
        let words = trimmed.split_whitespace().count();
        if words > MAX_CANDIDATE_WORDS {
            continue;
        }
        if !trimmed.chars().any(|c| c.is_alphabetic()) {
            continue;
        }
        candidates.push(trimmed.to_string());
    }

    let weak = candidates
        .iter()
        .filter(|c| !c.contains(' ') && c.len() < 4)
        .count();
    if !candidates.is_empty() && weak as f64 / candidates.len() as f64 > GARBAGE_RATIO {
        return Vec::new();
    }
    candidates
}

/// Turn every fetched `url` source and pending `text` source into prospects.
pub async fn process_pending_sources<S>(
    store: &S,
    tenant: Uuid,
    run_id: Uuid,
) -> Result<BatchSummary>
where
    S: ResearchStore + ?Sized,
{
    let mut pending = store
        .list_sources_by_status(
            tenant,
            run_id,
            SourceType::Url.as_str(),
            SourceStatus::Fetched.as_str(),
        )
        .await?;
    pending.extend(
        store
            .list_sources_by_status(
                tenant,
                run_id,
                SourceType::Text.as_str(),
                SourceStatus::New.as_str(),
            )
            .await?,
    );

    let mut summary = BatchSummary::default();
    for source in pending {
        match apply_source(store, tenant, run_id, &source).await {
            Ok(()) => {
                store
                    .set_source_status(tenant, source.id, SourceStatus::Processed.as_str(), None)
                    .await?;
                summary.processed += 1;
            }
            Err(err) => {
                let message = truncate_error(&err.to_string());
                warn!(source_id = %source.id, error = %message, "source processing failed");
                store
                    .set_source_status(
                        tenant,
                        source.id,
                        SourceStatus::Failed.as_str(),
                        Some(&message),
                    )
                    .await?;
                summary.failed += 1;
            }
        }
    }

    info!(
        %run_id,
        processed = summary.processed,
        failed = summary.failed,
        "source processing batch complete"
    );
    Ok(summary)
}

async fn apply_source<S>(
    store: &S,
    tenant: Uuid,
    run_id: Uuid,
    source: &SourceDocument,
) -> Result<()>
where
    S: ResearchStore + ?Sized,
{
    let text = source
        .content_text
        .as_deref()
        .ok_or_else(|| ProspectorError::validation("invalid_payload", "source has no content"))?;
    let candidates = extract_company_candidates(text);

    // Group raw variants by normalized name before touching the store.
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for raw in candidates {
        let normalized = normalize::normalize_company_name(&raw);
        if !normalized.is_empty() {
            grouped.entry(normalized).or_default().push(raw);
        }
    }

    let source_name = source
        .title
        .clone()
        .or_else(|| source.url_normalized.clone())
        .unwrap_or_else(|| source.source_type.clone());
    let candidate_count: usize = grouped.values().map(Vec::len).sum();
    let mut companies_new = 0u64;
    let mut companies_existing = 0u64;

    for (name_normalized, raw_variants) in grouped {
        let (prospect, created) = store
            .insert_prospect(
                tenant,
                NewCompanyProspect {
                    run_id,
                    name_raw: raw_variants[0].clone(),
                    name_normalized,
                    discovered_by: Some(DiscoveredBy::Internal.as_str().to_string()),
                    ..Default::default()
                },
            )
            .await?;
        if created {
            companies_new += 1;
        } else {
            companies_existing += 1;
        }

        store
            .add_evidence_if_new(
                tenant,
                NewCompanyEvidence {
                    company_prospect_id: prospect.id,
                    source_type: source.source_type.clone(),
                    source_name: Some(source_name.clone()),
                    source_url: source.url_normalized.clone(),
                    raw_snippet: Some(raw_variants.join("\n")),
                    source_document_id: Some(source.id),
                    source_content_hash: source.content_hash.clone(),
                },
            )
            .await?;
    }

    store
        .append_event(
            tenant,
            run_id,
            NewResearchEvent {
                event_type: "process_sources".to_string(),
                status: "ok".to_string(),
                message: Some(format!("deduped {candidate_count} candidates")),
                meta: Some(json!({
                    "source_id": source.id,
                    "candidates": candidate_count,
                    "companies_new": companies_new,
                    "companies_existing": companies_existing,
                })),
            },
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospector_store::{
        EventRepo, MemoryStore, NewResearchRun, NewSourceDocument, ProspectRepo, RunRepo,
        SourceDocumentRepo,
    };

    #[test]
    fn bullets_and_numbering_are_stripped() {
        let text = "- Acme Corp\n2) Globex Inc\n• Initech\n";
        assert_eq!(
            extract_company_candidates(text),
            vec!["Acme Corp", "Globex Inc", "Initech"]
        );
    }

    #[test]
    fn urls_prose_and_noise_are_dropped() {
        let text = "https://acme.example\ncontact@acme.example\n\
                    This long sentence describes the market landscape in great detail today\n\
                    Acme Corp\n12345\n";
        assert_eq!(extract_company_candidates(text), vec!["Acme Corp"]);
    }

    #[test]
    fn navigation_garbage_yields_nothing() {
        // Mostly short single words, as a scraped nav menu would produce.
        let text = "Home\nUs\nFAQ\nOn\nOff\nTop\nNew\nAcme Corp\n";
        assert!(extract_company_candidates(text).is_empty());
    }

    async fn seeded_run(store: &MemoryStore, tenant: Uuid) -> Uuid {
        store
            .create_run(
                tenant,
                NewResearchRun {
                    role_mandate_id: None,
                    name: "process".into(),
                    sector: None,
                    region_scope: None,
                    config: None,
                },
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn text_source_becomes_prospects_with_event() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        store
            .add_source(
                tenant,
                NewSourceDocument {
                    run_id,
                    source_type: SourceType::Text.as_str().to_string(),
                    title: Some("pasted notes".into()),
                    content_text: Some("- Acme Corp\n- Acme Corporation\n- Globex Inc\n".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let summary = process_pending_sources(&store, tenant, run_id).await.unwrap();
        assert_eq!(summary.processed, 1);

        let prospects = store.list_prospects_for_run(tenant, run_id).await.unwrap();
        let mut names: Vec<_> = prospects.iter().map(|p| p.name_normalized.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["acme", "globex"]);

        let events = store.list_events_for_run(tenant, run_id, 10).await.unwrap();
        assert!(events.iter().any(|e| e.event_type == "process_sources"));
    }

    #[tokio::test]
    async fn fetched_url_source_is_consumed_and_marked_processed() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        let source = store
            .add_source(
                tenant,
                NewSourceDocument {
                    run_id,
                    source_type: SourceType::Url.as_str().to_string(),
                    url: Some("https://acme.example/portfolio".into()),
                    content_text: Some("Acme Corp\nGlobex Inc".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
            .set_source_status(tenant, source.id, SourceStatus::Fetched.as_str(), None)
            .await
            .unwrap();

        let summary = process_pending_sources(&store, tenant, run_id).await.unwrap();
        assert_eq!(summary.processed, 1);

        let updated = store.get_source(tenant, source.id).await.unwrap().unwrap();
        assert_eq!(updated.status, "processed");

        let prospects = store.list_prospects_for_run(tenant, run_id).await.unwrap();
        let acme = prospects.iter().find(|p| p.name_normalized == "acme").unwrap();
        let evidence = store
            .list_evidence_for_prospects(tenant, &[acme.id])
            .await
            .unwrap();
        assert_eq!(
            evidence[0].source_url.as_deref(),
            Some("https://acme.example/portfolio")
        );
    }
}
