//! LLM-JSON company discovery.

use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use prospector_common::{canonical, normalize, DiscoveredBy, Result, SourceStatus, SourceType};
use prospector_store::{
    NewAiEnrichmentRecord, NewCompanyEvidence, NewCompanyProspect, NewSourceDocument,
    ResearchStore,
};

use super::{
    promote_evidence_url, truncate_error, BatchSummary, CompanyIngestSummary, LlmJsonRequest,
    DUPLICATE_HASH,
};
use crate::orchestrator::ensure_sources_unlocked;
use crate::payload::CompanyDiscoveryPayload;

/// Ingest a company-discovery payload submitted over the wire.
///
/// Re-posting an identical payload is side-effect-free: the content hash is
/// probed before any write and a duplicate returns `skipped = true`.
pub async fn ingest_company_discovery<S>(
    store: &S,
    tenant: Uuid,
    run_id: Uuid,
    request: &LlmJsonRequest,
) -> Result<CompanyIngestSummary>
where
    S: ResearchStore + ?Sized,
{
    ensure_sources_unlocked(store, tenant, run_id).await?;

    let content_hash = canonical::content_hash(&request.payload);

    if let Some(existing) = store
        .find_llm_json_by_hash(tenant, run_id, &content_hash)
        .await?
    {
        debug!(%run_id, hash = %content_hash, "duplicate company payload, skipping");
        return Ok(CompanyIngestSummary {
            skipped: true,
            reason: Some(DUPLICATE_HASH.to_string()),
            source_id: Some(existing.id),
            content_hash,
            ..Default::default()
        });
    }

    // Validate before the first write; a bad payload leaves no rows behind.
    let payload = CompanyDiscoveryPayload::from_value(&request.payload)?;

    let (source, created) = store
        .add_source_if_new(
            tenant,
            NewSourceDocument {
                run_id,
                source_type: SourceType::LlmJson.as_str().to_string(),
                title: Some(format!("{} company discovery", request.provider)),
                content_text: Some(canonical::canonical_json(&request.payload)),
                content_hash: Some(content_hash.clone()),
                meta: Some(json!({
                    "provider": request.provider,
                    "model": request.model,
                    "purpose": "company_discovery",
                })),
                ..Default::default()
            },
        )
        .await?;
    if !created {
        // A concurrent identical submission won the insert.
        debug!(%run_id, hash = %content_hash, "duplicate company payload, skipping");
        return Ok(CompanyIngestSummary {
            skipped: true,
            reason: Some(DUPLICATE_HASH.to_string()),
            source_id: Some(source.id),
            content_hash,
            ..Default::default()
        });
    }

    let (enrichment, _) = store
        .insert_enrichment_record_if_new(
            tenant,
            NewAiEnrichmentRecord {
                run_id,
                purpose: "company_discovery".to_string(),
                provider: request.provider.clone(),
                model: request.model.clone(),
                content_hash: content_hash.clone(),
                source_document_id: Some(source.id),
                response_summary: None,
            },
        )
        .await?;

    let mut summary = apply_company_payload(
        store,
        tenant,
        run_id,
        &payload,
        source.id,
        &content_hash,
        DiscoveredBy::External,
    )
    .await?;
    summary.source_id = Some(source.id);
    summary.enrichment_id = Some(enrichment.id);

    store
        .set_source_status(tenant, source.id, SourceStatus::Processed.as_str(), None)
        .await?;

    info!(
        %run_id,
        companies_new = summary.companies_new,
        companies_existing = summary.companies_existing,
        evidence_created = summary.evidence_created,
        urls_created = summary.urls_created,
        "company discovery ingested"
    );
    Ok(summary)
}

/// Apply a parsed company payload against the prospect store. Shared between
/// the wire path and the bulk step over pending sources.
pub(crate) async fn apply_company_payload<S>(
    store: &S,
    tenant: Uuid,
    run_id: Uuid,
    payload: &CompanyDiscoveryPayload,
    source_id: Uuid,
    content_hash: &str,
    discovered_by: DiscoveredBy,
) -> Result<CompanyIngestSummary>
where
    S: ResearchStore + ?Sized,
{
    let mut summary = CompanyIngestSummary {
        content_hash: content_hash.to_string(),
        ..Default::default()
    };

    for company in payload.companies() {
        let name_normalized = normalize::normalize_company_name(&company.name);
        if name_normalized.is_empty() {
            warn!(%run_id, raw = %company.name, "company name normalizes to empty, skipping");
            continue;
        }

        let hq_country = company
            .hq_country
            .as_deref()
            .and_then(normalize::normalize_country)
            .or_else(|| company.hq_country.clone());

        let (prospect, created) = store
            .insert_prospect(
                tenant,
                NewCompanyProspect {
                    run_id,
                    name_raw: company.name.clone(),
                    name_normalized,
                    website_url: company.website_url.clone(),
                    hq_country,
                    hq_city: company.hq_city.clone(),
                    sector: company.sector.clone(),
                    subsector: company.subsector.clone(),
                    relevance_score: company.confidence,
                    discovered_by: Some(discovered_by.as_str().to_string()),
                    ..Default::default()
                },
            )
            .await?;

        if created {
            summary.companies_new += 1;
        } else {
            summary.companies_existing += 1;
            let current = prospect.discovered_by.as_deref().and_then(DiscoveredBy::parse);
            let merged = DiscoveredBy::merge(current, Some(discovered_by));
            if merged != current {
                if let Some(label) = merged {
                    store
                        .set_discovered_by(tenant, prospect.id, label.as_str())
                        .await?;
                }
            }
        }

        for item in &company.evidence {
            let (_, evidence_created) = store
                .add_evidence_if_new(
                    tenant,
                    NewCompanyEvidence {
                        company_prospect_id: prospect.id,
                        source_type: SourceType::LlmJson.as_str().to_string(),
                        source_name: item.label_or_kind().map(str::to_string),
                        source_url: item.url.clone(),
                        raw_snippet: item.snippet.clone(),
                        source_document_id: Some(source_id),
                        source_content_hash: Some(content_hash.to_string()),
                    },
                )
                .await?;
            if evidence_created {
                summary.evidence_created += 1;
            }

            if let Some(url) = &item.url {
                if promote_evidence_url(store, tenant, run_id, url, item.label_or_kind()).await? {
                    summary.urls_created += 1;
                } else {
                    summary.urls_existing += 1;
                }
            }
        }
    }

    Ok(summary)
}

/// Bulk pass over pending `llm_json` sources tagged for company discovery.
/// One bad source is marked failed and does not abort its siblings.
pub async fn process_pending_company_sources<S>(
    store: &S,
    tenant: Uuid,
    run_id: Uuid,
) -> Result<BatchSummary>
where
    S: ResearchStore + ?Sized,
{
    let pending = store
        .list_sources_by_status(
            tenant,
            run_id,
            SourceType::LlmJson.as_str(),
            SourceStatus::New.as_str(),
        )
        .await?;

    let mut batch = BatchSummary::default();
    for source in pending {
        let purpose = source
            .meta
            .as_ref()
            .and_then(|m| m.get("purpose"))
            .and_then(Value::as_str)
            .unwrap_or("company_discovery");
        if purpose != "company_discovery" {
            batch.skipped += 1;
            continue;
        }

        let outcome = apply_stored_source(store, tenant, run_id, &source).await;
        match outcome {
            Ok(()) => {
                store
                    .set_source_status(tenant, source.id, SourceStatus::Processed.as_str(), None)
                    .await?;
                batch.processed += 1;
            }
            Err(e) => {
                warn!(%run_id, source_id = %source.id, error = %e, "company source failed");
                store
                    .set_source_status(
                        tenant,
                        source.id,
                        SourceStatus::Failed.as_str(),
                        Some(&truncate_error(&e.to_string())),
                    )
                    .await?;
                batch.failed += 1;
            }
        }
    }
    Ok(batch)
}

async fn apply_stored_source<S>(
    store: &S,
    tenant: Uuid,
    run_id: Uuid,
    source: &prospector_store::SourceDocument,
) -> Result<()>
where
    S: ResearchStore + ?Sized,
{
    let text = source.content_text.as_deref().unwrap_or_default();
    let value: Value = serde_json::from_str(text).map_err(|e| {
        prospector_common::ProspectorError::validation(
            "invalid_payload",
            format!("stored payload is not JSON: {e}"),
        )
    })?;
    let payload = CompanyDiscoveryPayload::from_value(&value)?;
    let hash = source
        .content_hash
        .clone()
        .unwrap_or_else(|| canonical::content_hash(&value));
    apply_company_payload(
        store,
        tenant,
        run_id,
        &payload,
        source.id,
        &hash,
        DiscoveredBy::External,
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospector_store::{MemoryStore, NewResearchRun, ProspectRepo, RunRepo, SourceDocumentRepo};
    use serde_json::json;

    async fn seeded_run(store: &MemoryStore, tenant: Uuid) -> Uuid {
        store
            .create_run(
                tenant,
                NewResearchRun {
                    role_mandate_id: None,
                    name: "discovery".into(),
                    sector: None,
                    region_scope: None,
                    config: None,
                },
            )
            .await
            .unwrap()
            .id
    }

    fn acme_request() -> LlmJsonRequest {
        LlmJsonRequest {
            provider: "acme-llm".into(),
            model: Some("m1".into()),
            purpose: "company_discovery".into(),
            payload: json!({
                "schema_version": "1",
                "companies": [{
                    "name": "Acme Corp Inc",
                    "website_url": "https://acme.com",
                    "confidence": 0.9,
                    "evidence": [{"url": "https://acme.com/about", "kind": "profile"}]
                }]
            }),
        }
    }

    #[tokio::test]
    async fn acme_scenario_creates_prospect_evidence_and_url_source() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;

        let summary = ingest_company_discovery(&store, tenant, run_id, &acme_request())
            .await
            .unwrap();
        assert!(!summary.skipped);
        assert_eq!(summary.companies_new, 1);
        assert_eq!(summary.evidence_created, 1);
        assert_eq!(summary.urls_created, 1);

        let prospects = store.list_prospects_for_run(tenant, run_id).await.unwrap();
        assert_eq!(prospects.len(), 1);
        assert_eq!(prospects[0].name_normalized, "acme");
        assert_eq!(prospects[0].discovered_by.as_deref(), Some("external"));

        let sources = store.list_sources_for_run(tenant, run_id).await.unwrap();
        let url_sources: Vec<_> = sources.iter().filter(|s| s.source_type == "url").collect();
        assert_eq!(url_sources.len(), 1);
        assert_eq!(url_sources[0].url.as_deref(), Some("https://acme.com/about"));
    }

    #[tokio::test]
    async fn identical_payload_is_skipped_second_time() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;

        let first = ingest_company_discovery(&store, tenant, run_id, &acme_request())
            .await
            .unwrap();
        let second = ingest_company_discovery(&store, tenant, run_id, &acme_request())
            .await
            .unwrap();

        assert!(!first.skipped);
        assert!(second.skipped);
        assert_eq!(second.reason.as_deref(), Some(DUPLICATE_HASH));
        assert_eq!(second.companies_new, 0);
        assert_eq!(second.companies_existing, 0);
        assert_eq!(second.evidence_created, 0);

        // Exactly one llm_json source with that hash.
        let sources = store.list_sources_for_run(tenant, run_id).await.unwrap();
        let llm: Vec<_> = sources
            .iter()
            .filter(|s| s.source_type == "llm_json")
            .collect();
        assert_eq!(llm.len(), 1);
        assert_eq!(llm[0].content_hash.as_deref(), Some(first.content_hash.as_str()));
    }

    #[tokio::test]
    async fn field_order_does_not_defeat_idempotency() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;

        let mut reordered = acme_request();
        reordered.payload = json!({
            "companies": [{
                "evidence": [{"kind": "profile", "url": "https://acme.com/about"}],
                "confidence": 0.9,
                "website_url": "https://acme.com",
                "name": "Acme Corp Inc"
            }],
            "schema_version": "1"
        });

        ingest_company_discovery(&store, tenant, run_id, &acme_request())
            .await
            .unwrap();
        let second = ingest_company_discovery(&store, tenant, run_id, &reordered)
            .await
            .unwrap();
        assert!(second.skipped);
    }

    #[tokio::test]
    async fn conflicting_provenance_collapses_to_both() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;

        ingest_company_discovery(&store, tenant, run_id, &acme_request())
            .await
            .unwrap();

        let prospect = store
            .get_prospect_by_normalized_name(tenant, run_id, "acme")
            .await
            .unwrap()
            .unwrap();
        store
            .set_discovered_by(tenant, prospect.id, "internal")
            .await
            .unwrap();

        // Same company from a different payload (hash differs).
        let mut request = acme_request();
        request.payload = json!({
            "schema_version": "1",
            "companies": [{"name": "Acme Corporation", "confidence": 0.7}]
        });
        let summary = ingest_company_discovery(&store, tenant, run_id, &request)
            .await
            .unwrap();
        assert_eq!(summary.companies_existing, 1);

        let prospect = store
            .get_prospect(tenant, prospect.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prospect.discovered_by.as_deref(), Some("both"));
    }

    #[tokio::test]
    async fn invalid_payload_writes_nothing() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;

        let mut request = acme_request();
        request.payload = json!({"schema_version": "1", "companies": []});
        let err = ingest_company_discovery(&store, tenant, run_id, &request)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "no_companies_in_payload");

        assert!(store
            .list_sources_for_run(tenant, run_id)
            .await
            .unwrap()
            .is_empty());
        assert!(store
            .list_prospects_for_run(tenant, run_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn losing_a_duplicate_insert_yields_the_winning_source() {
        use prospector_common::SourceType;
        use prospector_store::NewSourceDocument;

        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        let request = acme_request();
        let hash = canonical::content_hash(&request.payload);

        let doc = |hash: &str| NewSourceDocument {
            run_id,
            source_type: SourceType::LlmJson.as_str().to_string(),
            content_text: Some(canonical::canonical_json(&request.payload)),
            content_hash: Some(hash.to_string()),
            ..Default::default()
        };

        // Winner of the concurrent insert.
        let winner = store.add_source(tenant, doc(&hash)).await.unwrap();
        // The loser's insert must surface the winner's row, not a database
        // error from the unique index.
        let (source, created) = store.add_source_if_new(tenant, doc(&hash)).await.unwrap();
        assert!(!created);
        assert_eq!(source.id, winner.id);

        // The whole submission still reads as a duplicate.
        let summary = ingest_company_discovery(&store, tenant, run_id, &request)
            .await
            .unwrap();
        assert!(summary.skipped);
        assert_eq!(summary.reason.as_deref(), Some("duplicate_hash"));
        assert_eq!(
            store.list_sources_for_run(tenant, run_id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn started_run_rejects_new_payloads() {
        use crate::orchestrator::start_run;
        use crate::planner::PlannerConfig;

        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        start_run(&store, tenant, run_id, &PlannerConfig::default())
            .await
            .unwrap();

        let err = ingest_company_discovery(&store, tenant, run_id, &acme_request())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "run_locked");
        assert!(store
            .list_sources_for_run(tenant, run_id)
            .await
            .unwrap()
            .is_empty());
        assert!(store
            .list_prospects_for_run(tenant, run_id)
            .await
            .unwrap()
            .is_empty());
    }
}
