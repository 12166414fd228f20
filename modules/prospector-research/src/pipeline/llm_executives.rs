//! LLM-JSON executive discovery.
//!
//! Strictly gated: every referenced company must be review-accepted with
//! executive search enabled, checked at call time against the store. A single
//! ineligible company rejects the whole payload before any write.

use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use prospector_common::{
    canonical, normalize, DiscoveredBy, ProspectorError, Result, ReviewStatus, SourceStatus,
    SourceType,
};
use prospector_store::{
    CompanyProspect, NewAiEnrichmentRecord, NewExecutiveEvidence, NewExecutiveProspect,
    NewSourceDocument, ResearchStore,
};

use super::{
    promote_evidence_url, CompanyExecSummary, ExecutiveIngestSummary, LlmJsonRequest,
    DUPLICATE_HASH,
};
use crate::orchestrator::ensure_sources_unlocked;
use crate::payload::ExecutiveDiscoveryPayload;

pub async fn ingest_executive_discovery<S>(
    store: &S,
    tenant: Uuid,
    run_id: Uuid,
    request: &LlmJsonRequest,
) -> Result<ExecutiveIngestSummary>
where
    S: ResearchStore + ?Sized,
{
    ensure_sources_unlocked(store, tenant, run_id).await?;

    let content_hash = canonical::content_hash(&request.payload);

    if let Some(existing) = store
        .find_llm_json_by_hash(tenant, run_id, &content_hash)
        .await?
    {
        debug!(%run_id, hash = %content_hash, "duplicate executive payload, skipping");
        return Ok(ExecutiveIngestSummary {
            skipped: true,
            reason: Some(DUPLICATE_HASH.to_string()),
            source_id: Some(existing.id),
            content_hash,
            ..Default::default()
        });
    }

    let payload = ExecutiveDiscoveryPayload::from_value(&request.payload)?;

    // Eligibility gate, re-checked at call time. All-or-nothing: collect every
    // ineligible name so the caller sees the full picture, and write nothing.
    let mut eligible: Vec<(CompanyProspect, usize)> = Vec::new();
    let mut ineligible: Vec<String> = Vec::new();
    for (idx, group) in payload.companies().iter().enumerate() {
        let name_normalized = normalize::normalize_company_name(&group.company_name);
        let prospect = store
            .get_prospect_by_normalized_name(tenant, run_id, &name_normalized)
            .await?;
        match prospect {
            Some(p)
                if p.review_status == ReviewStatus::Accepted.as_str()
                    && p.exec_search_enabled =>
            {
                eligible.push((p, idx));
            }
            _ => ineligible.push(name_normalized),
        }
    }
    if !ineligible.is_empty() {
        return Err(ProspectorError::IneligibleCompanies(ineligible));
    }

    let (source, created) = store
        .add_source_if_new(
            tenant,
            NewSourceDocument {
                run_id,
                source_type: SourceType::LlmJson.as_str().to_string(),
                title: Some(format!("{} executive discovery", request.provider)),
                content_text: Some(canonical::canonical_json(&request.payload)),
                content_hash: Some(content_hash.clone()),
                meta: Some(json!({
                    "provider": request.provider,
                    "model": request.model,
                    "purpose": "executive_discovery",
                })),
                ..Default::default()
            },
        )
        .await?;
    if !created {
        // A concurrent identical submission won the insert.
        debug!(%run_id, hash = %content_hash, "duplicate executive payload, skipping");
        return Ok(ExecutiveIngestSummary {
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
                purpose: "executive_discovery".to_string(),
                provider: request.provider.clone(),
                model: request.model.clone(),
                content_hash: content_hash.clone(),
                source_document_id: Some(source.id),
                response_summary: None,
            },
        )
        .await?;

    let mut summary = ExecutiveIngestSummary {
        source_id: Some(source.id),
        enrichment_id: Some(enrichment.id),
        content_hash: content_hash.clone(),
        eligible_company_count: eligible.len() as u64,
        ..Default::default()
    };

    for (prospect, idx) in eligible {
        let group = &payload.companies()[idx];
        let mut company_summary = CompanyExecSummary {
            company: prospect.name_normalized.clone(),
            executives_new: 0,
            executives_existing: 0,
            evidence_created: 0,
        };

        for exec in &group.executives {
            let name_normalized = normalize::normalize_person_name(&exec.name);
            if name_normalized.is_empty() {
                continue;
            }
            let email = exec
                .email
                .as_deref()
                .map(normalize::normalize_email)
                .filter(|e| !e.is_empty());

            let (executive, created) = store
                .insert_executive(
                    tenant,
                    NewExecutiveProspect {
                        run_id,
                        company_prospect_id: prospect.id,
                        name_raw: exec.name.clone(),
                        name_normalized,
                        title: exec.title.clone(),
                        email,
                        linkedin_url: exec.linkedin_url.clone(),
                        location: exec.location.clone(),
                        confidence: exec.confidence,
                        discovered_by: Some(DiscoveredBy::External.as_str().to_string()),
                        source_document_id: Some(source.id),
                    },
                )
                .await?;
            if created {
                company_summary.executives_new += 1;
            } else {
                company_summary.executives_existing += 1;
            }

            for item in &exec.evidence {
                let (_, evidence_created) = store
                    .add_exec_evidence_if_new(
                        tenant,
                        NewExecutiveEvidence {
                            executive_prospect_id: executive.id,
                            source_type: SourceType::LlmJson.as_str().to_string(),
                            source_name: item.label_or_kind().map(str::to_string),
                            source_url: item.url.clone(),
                            raw_snippet: item.snippet.clone(),
                            source_document_id: Some(source.id),
                            source_content_hash: Some(content_hash.clone()),
                        },
                    )
                    .await?;
                if evidence_created {
                    company_summary.evidence_created += 1;
                }

                if let Some(url) = &item.url {
                    if promote_evidence_url(store, tenant, run_id, url, item.label_or_kind())
                        .await?
                    {
                        summary.urls_created += 1;
                    } else {
                        summary.urls_existing += 1;
                    }
                }
            }
        }

        summary.executives_new += company_summary.executives_new;
        summary.executives_existing += company_summary.executives_existing;
        summary.evidence_created += company_summary.evidence_created;
        summary.processed_company_count += 1;
        summary.company_summaries.push(company_summary);
    }

    store
        .set_source_status(tenant, source.id, SourceStatus::Processed.as_str(), None)
        .await?;

    info!(
        %run_id,
        companies = summary.processed_company_count,
        executives_new = summary.executives_new,
        executives_existing = summary.executives_existing,
        "executive discovery ingested"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospector_store::{
        ExecutiveRepo, MemoryStore, NewCompanyProspect, NewResearchRun, ProspectRepo, RunRepo,
        SourceDocumentRepo,
    };
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

    async fn seeded_company(
        store: &MemoryStore,
        tenant: Uuid,
        run_id: Uuid,
        name: &str,
        accepted: bool,
    ) -> Uuid {
        let (prospect, _) = store
            .insert_prospect(
                tenant,
                NewCompanyProspect {
                    run_id,
                    name_raw: name.to_string(),
                    name_normalized: normalize::normalize_company_name(name),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        if accepted {
            store
                .set_review_status(tenant, prospect.id, "accepted")
                .await
                .unwrap();
            store
                .set_exec_search_enabled(tenant, prospect.id, true)
                .await
                .unwrap();
        }
        prospect.id
    }

    fn exec_request(company: &str) -> LlmJsonRequest {
        LlmJsonRequest {
            provider: "acme-llm".into(),
            model: None,
            purpose: "executive_discovery".into(),
            payload: json!({
                "schema_version": "1",
                "companies": [{
                    "company_name": company,
                    "executives": [{
                        "name": "Jane Doe",
                        "title": "CEO",
                        "email": "Jane@Acme.com",
                        "evidence": [{"url": "https://acme.com/team", "kind": "profile"}]
                    }]
                }]
            }),
        }
    }

    #[tokio::test]
    async fn accepted_company_gets_executives() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        seeded_company(&store, tenant, run_id, "Acme Corp", true).await;

        let summary = ingest_executive_discovery(&store, tenant, run_id, &exec_request("Acme"))
            .await
            .unwrap();
        assert_eq!(summary.eligible_company_count, 1);
        assert_eq!(summary.executives_new, 1);
        assert_eq!(summary.evidence_created, 1);
        assert_eq!(summary.urls_created, 1);

        let execs = store.list_executives_for_run(tenant, run_id).await.unwrap();
        assert_eq!(execs.len(), 1);
        assert_eq!(execs[0].name_normalized, "jane doe");
        assert_eq!(execs[0].email.as_deref(), Some("jane@acme.com"));
    }

    #[tokio::test]
    async fn ineligible_company_rejects_whole_payload() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        seeded_company(&store, tenant, run_id, "Acme Corp", true).await;
        // Globex exists but was never accepted.
        seeded_company(&store, tenant, run_id, "Globex Ltd", false).await;

        let request = LlmJsonRequest {
            provider: "acme-llm".into(),
            model: None,
            purpose: "executive_discovery".into(),
            payload: json!({
                "schema_version": "1",
                "companies": [
                    {"company_name": "Acme", "executives": [{"name": "Jane Doe"}]},
                    {"company_name": "Globex", "executives": [{"name": "Hank Scorpio"}]}
                ]
            }),
        };
        let err = ingest_executive_discovery(&store, tenant, run_id, &request)
            .await
            .unwrap_err();
        match err {
            ProspectorError::IneligibleCompanies(names) => {
                assert_eq!(names, vec!["globex".to_string()]);
            }
            other => panic!("expected ineligible_companies, got {other}"),
        }

        // No partial writes anywhere.
        assert!(store
            .list_executives_for_run(tenant, run_id)
            .await
            .unwrap()
            .is_empty());
        assert!(store
            .list_sources_for_run(tenant, run_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn gate_rejects_accepted_but_disabled_company() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        let prospect_id = seeded_company(&store, tenant, run_id, "Acme Corp", true).await;
        store
            .set_exec_search_enabled(tenant, prospect_id, false)
            .await
            .unwrap();

        let err = ingest_executive_discovery(&store, tenant, run_id, &exec_request("Acme"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ineligible_companies");
    }

    #[tokio::test]
    async fn duplicate_executive_payload_is_skipped() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        seeded_company(&store, tenant, run_id, "Acme Corp", true).await;

        let request = exec_request("Acme");
        let first = ingest_executive_discovery(&store, tenant, run_id, &request)
            .await
            .unwrap();
        let second = ingest_executive_discovery(&store, tenant, run_id, &request)
            .await
            .unwrap();
        assert!(!first.skipped);
        assert!(second.skipped);
        assert_eq!(second.executives_new, 0);
        assert_eq!(
            store
                .list_executives_for_run(tenant, run_id)
                .await
                .unwrap()
                .len(),
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
        seeded_company(&store, tenant, run_id, "Acme Corp", true).await;
        start_run(&store, tenant, run_id, &PlannerConfig::default())
            .await
            .unwrap();

        let err = ingest_executive_discovery(&store, tenant, run_id, &exec_request("Acme Corp"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "run_locked");
        assert!(store
            .list_executives_for_run(tenant, run_id)
            .await
            .unwrap()
            .is_empty());
    }
}
