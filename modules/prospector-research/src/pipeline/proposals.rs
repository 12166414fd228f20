//! AI proposal ingestion: structured company suggestions produced by an
//! assistant and attached to the run as `ai_proposal` sources.
//!
//! Parsing is delegated to a [`ProposalParser`]; this module only orchestrates
//! the batch, isolating per-source failures so one bad proposal never aborts
//! its siblings.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use prospector_common::{normalize, DiscoveredBy, ProspectorError, Result, SourceStatus, SourceType};
use prospector_store::{
    NewCompanyEvidence, NewCompanyProspect, ResearchStore, SourceDocument,
};

use super::{promote_evidence_url, truncate_error, BatchSummary};
use crate::payload::EvidenceItem;

/// A single company suggestion extracted from a proposal document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProposedCompany {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub website_url: Option<String>,
    pub hq_country: Option<String>,
    pub hq_city: Option<String>,
    pub sector: Option<String>,
    pub subsector: Option<String>,
    pub confidence: Option<f64>,
    pub rationale: Option<String>,
    #[serde(default)]
    pub metrics: Map<String, Value>,
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
}

/// Turns a raw proposal document into structured company suggestions.
pub trait ProposalParser: Send + Sync {
    fn parse(&self, source: &SourceDocument) -> Result<Vec<ProposedCompany>>;
}

/// Default parser for proposals stored as JSON text: either a bare array of
/// companies or an object with a `companies` key.
#[derive(Debug, Default)]
pub struct JsonProposalParser;

impl ProposalParser for JsonProposalParser {
    fn parse(&self, source: &SourceDocument) -> Result<Vec<ProposedCompany>> {
        let text = source
            .content_text
            .as_deref()
            .ok_or_else(|| ProspectorError::validation("invalid_payload", "proposal has no content"))?;
        let value: Value = serde_json::from_str(text).map_err(|e| {
            ProspectorError::validation("invalid_payload", format!("proposal is not valid JSON: {e}"))
        })?;
        let companies = match value {
            Value::Array(_) => value,
            Value::Object(ref map) => map
                .get("companies")
                .cloned()
                .ok_or_else(|| {
                    ProspectorError::validation("invalid_payload", "proposal has no companies key")
                })?,
            _ => {
                return Err(ProspectorError::validation(
                    "invalid_payload",
                    "proposal must be a JSON array or object",
                ))
            }
        };
        serde_json::from_value(companies).map_err(|e| {
            ProspectorError::validation("invalid_payload", format!("malformed company entry: {e}"))
        })
    }
}

/// Process every pending `ai_proposal` source for a run.
pub async fn ingest_proposals<S, P>(
    store: &S,
    tenant: Uuid,
    run_id: Uuid,
    parser: &P,
) -> Result<BatchSummary>
where
    S: ResearchStore + ?Sized,
    P: ProposalParser + ?Sized,
{
    let pending = store
        .list_sources_by_status(
            tenant,
            run_id,
            SourceType::AiProposal.as_str(),
            SourceStatus::New.as_str(),
        )
        .await?;

    let mut summary = BatchSummary::default();
    for source in pending {
        match apply_proposal(store, tenant, run_id, parser, &source).await {
            Ok(()) => {
                store
                    .set_source_status(tenant, source.id, SourceStatus::Processed.as_str(), None)
                    .await?;
                summary.processed += 1;
            }
            Err(err) => {
                let message = truncate_error(&err.to_string());
                warn!(source_id = %source.id, error = %message, "proposal ingestion failed");
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
        "proposal batch complete"
    );
    Ok(summary)
}

async fn apply_proposal<S, P>(
    store: &S,
    tenant: Uuid,
    run_id: Uuid,
    parser: &P,
    source: &SourceDocument,
) -> Result<()>
where
    S: ResearchStore + ?Sized,
    P: ProposalParser + ?Sized,
{
    let companies = parser.parse(source)?;
    let source_name = source.title.clone().unwrap_or_else(|| "ai proposal".to_string());

    for company in companies {
        let name_normalized = normalize::normalize_company_name(&company.name);
        if name_normalized.is_empty() {
            warn!(source_id = %source.id, "skipping proposal entry with empty name");
            continue;
        }

        let website_url = company
            .website_url
            .as_deref()
            .and_then(|u| normalize::normalize_url(u).ok());
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
                    website_url,
                    hq_country,
                    hq_city: company.hq_city.clone(),
                    sector: company.sector.clone(),
                    subsector: company.subsector.clone(),
                    relevance_score: company.confidence,
                    discovered_by: Some(DiscoveredBy::Grok.as_str().to_string()),
                    ..Default::default()
                },
            )
            .await?;
        if !created {
            let current = prospect.discovered_by.as_deref().and_then(DiscoveredBy::parse);
            let merged = DiscoveredBy::merge(current, Some(DiscoveredBy::Grok));
            if merged != current {
                if let Some(label) = merged {
                    store
                        .set_discovered_by(tenant, prospect.id, label.as_str())
                        .await?;
                }
            }
        }

        let snippet = company.rationale.clone().or_else(|| {
            if company.metrics.is_empty() {
                None
            } else {
                serde_json::to_string(&company.metrics).ok()
            }
        });
        store
            .add_evidence_if_new(
                tenant,
                NewCompanyEvidence {
                    company_prospect_id: prospect.id,
                    source_type: SourceType::AiProposal.as_str().to_string(),
                    source_name: Some(source_name.clone()),
                    source_url: None,
                    raw_snippet: snippet,
                    source_document_id: Some(source.id),
                    source_content_hash: source.content_hash.clone(),
                },
            )
            .await?;

        for item in &company.evidence {
            if let Some(url) = &item.url {
                promote_evidence_url(store, tenant, run_id, url, item.label_or_kind()).await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use prospector_store::{
        MemoryStore, NewResearchRun, NewSourceDocument, ProspectRepo, RunRepo, SourceDocumentRepo,
    };

    async fn seeded_run(store: &MemoryStore, tenant: Uuid) -> Uuid {
        store
            .create_run(
                tenant,
                NewResearchRun {
                    role_mandate_id: None,
                    name: "proposals".into(),
                    sector: None,
                    region_scope: None,
                    config: None,
                },
            )
            .await
            .unwrap()
            .id
    }

    async fn attach_proposal(
        store: &MemoryStore,
        tenant: Uuid,
        run_id: Uuid,
        title: &str,
        body: Value,
    ) -> Uuid {
        store
            .add_source(
                tenant,
                NewSourceDocument {
                    run_id,
                    source_type: SourceType::AiProposal.as_str().to_string(),
                    title: Some(title.to_string()),
                    content_text: Some(body.to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn proposal_creates_prospect_with_evidence() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        attach_proposal(
            &store,
            tenant,
            run_id,
            "expansion shortlist",
            json!({"companies": [{
                "name": "Acme Corp",
                "website_url": "https://acme.example/about",
                "hq_country": "United Kingdom",
                "confidence": 0.8,
                "rationale": "strong regional fit"
            }]}),
        )
        .await;

        let summary = ingest_proposals(&store, tenant, run_id, &JsonProposalParser)
            .await
            .unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed, 0);

        let prospect = store
            .get_prospect_by_normalized_name(tenant, run_id, "acme")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prospect.discovered_by.as_deref(), Some("grok"));
        assert_eq!(prospect.hq_country.as_deref(), Some("GB"));

        let evidence = store
            .list_evidence_for_prospects(tenant, &[prospect.id])
            .await
            .unwrap();
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].source_name.as_deref(), Some("expansion shortlist"));
    }

    #[tokio::test]
    async fn evidence_urls_are_promoted_to_url_sources() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        attach_proposal(
            &store,
            tenant,
            run_id,
            "with evidence",
            json!({"companies": [{
                "name": "Acme Corp",
                "confidence": 0.7,
                "evidence": [
                    {"url": "https://acme.example/team", "kind": "profile"},
                    {"snippet": "mentioned in passing"}
                ]
            }]}),
        )
        .await;

        let summary = ingest_proposals(&store, tenant, run_id, &JsonProposalParser)
            .await
            .unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed, 0);

        // The url-bearing item becomes a fetchable source; the url-less one
        // stays evidence text only.
        let sources = store.list_sources_for_run(tenant, run_id).await.unwrap();
        let urls: Vec<_> = sources
            .iter()
            .filter(|s| s.source_type == SourceType::Url.as_str())
            .collect();
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].url.as_deref(), Some("https://acme.example/team"));
        assert_eq!(urls[0].title.as_deref(), Some("profile"));
    }

    #[tokio::test]
    async fn bad_proposal_fails_alone() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        let bad_id = store
            .add_source(
                tenant,
                NewSourceDocument {
                    run_id,
                    source_type: SourceType::AiProposal.as_str().to_string(),
                    content_text: Some("not json at all".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .id;
        attach_proposal(
            &store,
            tenant,
            run_id,
            "good",
            json!([{"name": "Globex"}]),
        )
        .await;

        let summary = ingest_proposals(&store, tenant, run_id, &JsonProposalParser)
            .await
            .unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed, 1);

        let bad = store.get_source(tenant, bad_id).await.unwrap().unwrap();
        assert_eq!(bad.status, "failed");
        assert!(bad.error_message.as_deref().unwrap().contains("JSON"));
        assert!(store
            .get_prospect_by_normalized_name(tenant, run_id, "globex")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn reprocessing_leaves_nothing_pending() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        attach_proposal(&store, tenant, run_id, "list", json!([{"name": "Acme"}])).await;

        let first = ingest_proposals(&store, tenant, run_id, &JsonProposalParser)
            .await
            .unwrap();
        assert_eq!(first.processed, 1);
        let second = ingest_proposals(&store, tenant, run_id, &JsonProposalParser)
            .await
            .unwrap();
        assert_eq!(second.processed, 0);
        assert_eq!(second.failed, 0);
    }
}
