//! Manual list ingestion: newline-delimited company names pasted by a user.

use std::collections::BTreeMap;

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use prospector_common::{canonical, normalize, DiscoveredBy, Result, SourceStatus, SourceType};
use prospector_store::{
    NewCompanyEvidence, NewCompanyProspect, NewSourceDocument, ResearchStore, SourceDocument,
};

use super::{find_source_by_hash, truncate_error, BatchSummary, ListIngestSummary, DUPLICATE_HASH};
use crate::orchestrator::ensure_sources_unlocked;

/// Ingest a pasted list of company names.
///
/// Lines are grouped by normalized name so several raw spellings of one
/// company collapse into a single prospect, and evidence is recorded once per
/// (source kind, label) pair per prospect rather than once per mention.
pub async fn ingest_manual_list<S>(
    store: &S,
    tenant: Uuid,
    run_id: Uuid,
    text: &str,
    source_label: &str,
) -> Result<ListIngestSummary>
where
    S: ResearchStore + ?Sized,
{
    ensure_sources_unlocked(store, tenant, run_id).await?;

    let payload = json!({"source_label": source_label, "text": text});
    let content_hash = canonical::content_hash(&payload);

    if let Some(existing) =
        find_source_by_hash(store, tenant, run_id, SourceType::ManualList, &content_hash).await?
    {
        return Ok(ListIngestSummary {
            skipped: true,
            reason: Some(DUPLICATE_HASH.to_string()),
            source_id: Some(existing.id),
            content_hash,
            ..Default::default()
        });
    }

    let source = store
        .add_source(
            tenant,
            NewSourceDocument {
                run_id,
                source_type: SourceType::ManualList.as_str().to_string(),
                title: Some(source_label.to_string()),
                content_text: Some(text.to_string()),
                content_hash: Some(content_hash.clone()),
                meta: Some(json!({"source_label": source_label})),
                ..Default::default()
            },
        )
        .await?;

    let mut summary = apply_list_source(store, tenant, run_id, &source).await?;
    summary.content_hash = content_hash;
    store
        .set_source_status(tenant, source.id, SourceStatus::Processed.as_str(), None)
        .await?;

    info!(
        %run_id,
        lines = summary.lines_seen,
        companies_new = summary.companies_new,
        "manual list ingested"
    );
    Ok(summary)
}

/// Step entry point: consume every pending `manual_list` source already
/// attached to the run.
pub async fn process_pending_lists<S>(store: &S, tenant: Uuid, run_id: Uuid) -> Result<BatchSummary>
where
    S: ResearchStore + ?Sized,
{
    let pending = store
        .list_sources_by_status(
            tenant,
            run_id,
            SourceType::ManualList.as_str(),
            SourceStatus::New.as_str(),
        )
        .await?;

    let mut summary = BatchSummary::default();
    for source in pending {
        match apply_list_source(store, tenant, run_id, &source).await {
            Ok(_) => {
                store
                    .set_source_status(tenant, source.id, SourceStatus::Processed.as_str(), None)
                    .await?;
                summary.processed += 1;
            }
            Err(err) => {
                let message = truncate_error(&err.to_string());
                warn!(source_id = %source.id, error = %message, "list ingestion failed");
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
    Ok(summary)
}

async fn apply_list_source<S>(
    store: &S,
    tenant: Uuid,
    run_id: Uuid,
    source: &SourceDocument,
) -> Result<ListIngestSummary>
where
    S: ResearchStore + ?Sized,
{
    let text = source.content_text.as_deref().unwrap_or_default();
    let source_label = source
        .title
        .clone()
        .unwrap_or_else(|| SourceType::ManualList.as_str().to_string());

    // Group raw lines by normalized name; BTreeMap keeps iteration stable.
    let mut lines_seen = 0u64;
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        lines_seen += 1;
        let normalized = normalize::normalize_company_name(trimmed);
        if normalized.is_empty() {
            continue;
        }
        grouped.entry(normalized).or_default().push(trimmed.to_string());
    }

    let mut summary = ListIngestSummary {
        source_id: Some(source.id),
        content_hash: source.content_hash.clone().unwrap_or_default(),
        lines_seen,
        ..Default::default()
    };

    for (name_normalized, raw_variants) in grouped {
        let (prospect, created) = store
            .insert_prospect(
                tenant,
                NewCompanyProspect {
                    run_id,
                    name_raw: raw_variants[0].clone(),
                    name_normalized,
                    discovered_by: Some(DiscoveredBy::Manual.as_str().to_string()),
                    ..Default::default()
                },
            )
            .await?;
        if created {
            summary.companies_new += 1;
        } else {
            summary.companies_existing += 1;
        }

        // One evidence row per (source_type, label) pair per prospect; the
        // dedup key inside add_evidence_if_new keeps repeat mentions single.
        let (_, evidence_created) = store
            .add_evidence_if_new(
                tenant,
                NewCompanyEvidence {
                    company_prospect_id: prospect.id,
                    source_type: SourceType::ManualList.as_str().to_string(),
                    source_name: Some(source_label.clone()),
                    source_url: None,
                    raw_snippet: Some(raw_variants.join("\n")),
                    source_document_id: Some(source.id),
                    source_content_hash: source.content_hash.clone(),
                },
            )
            .await?;
        if evidence_created {
            summary.evidence_created += 1;
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospector_store::{MemoryStore, NewResearchRun, ProspectRepo, RunRepo};

    async fn seeded_run(store: &MemoryStore, tenant: Uuid) -> Uuid {
        store
            .create_run(
                tenant,
                NewResearchRun {
                    role_mandate_id: None,
                    name: "lists".into(),
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
    async fn variants_collapse_to_one_prospect_with_one_evidence_row() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;

        let text = "Acme Corp\nAcme Corporation Ltd\n\nGlobex Inc\n";
        let summary = ingest_manual_list(&store, tenant, run_id, text, "target list Q3")
            .await
            .unwrap();
        assert_eq!(summary.lines_seen, 3);
        assert_eq!(summary.companies_new, 2);
        assert_eq!(summary.evidence_created, 2);

        let prospects = store.list_prospects_for_run(tenant, run_id).await.unwrap();
        let mut names: Vec<_> = prospects.iter().map(|p| p.name_normalized.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["acme", "globex"]);
    }

    #[tokio::test]
    async fn identical_list_is_skipped() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;

        ingest_manual_list(&store, tenant, run_id, "Acme Corp", "list")
            .await
            .unwrap();
        let second = ingest_manual_list(&store, tenant, run_id, "Acme Corp", "list")
            .await
            .unwrap();
        assert!(second.skipped);
        assert_eq!(second.reason.as_deref(), Some(DUPLICATE_HASH));
        assert_eq!(second.companies_new, 0);
    }

    #[tokio::test]
    async fn same_text_different_label_is_new_evidence() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;

        ingest_manual_list(&store, tenant, run_id, "Acme Corp", "list a")
            .await
            .unwrap();
        let second = ingest_manual_list(&store, tenant, run_id, "Acme Corp", "list b")
            .await
            .unwrap();
        assert!(!second.skipped);
        assert_eq!(second.companies_existing, 1);
        assert_eq!(second.evidence_created, 1);
    }

    #[tokio::test]
    async fn started_run_rejects_new_lists() {
        use crate::orchestrator::start_run;
        use crate::planner::PlannerConfig;
        use prospector_store::SourceDocumentRepo;

        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        start_run(&store, tenant, run_id, &PlannerConfig::default())
            .await
            .unwrap();

        let err = ingest_manual_list(&store, tenant, run_id, "Acme Corp", "late list")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "run_locked");
        assert!(store
            .list_sources_for_run(tenant, run_id)
            .await
            .unwrap()
            .is_empty());
    }
}
