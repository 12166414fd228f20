//! Evidence-weighted prospect ranking.
//!
//! Scores are built from the prospect's own relevance and evidence plus
//! bonuses derived from enrichment assignments on its canonical company.
//! Every nonzero bonus lands in `why_included`, so an ordering is always
//! explainable by construction.

use std::cmp::Ordering;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use prospector_common::Result;
use prospector_store::{CompanyProspect, EnrichmentAssignment, ResearchStore};

/// Entity type under which company enrichment assignments are stored.
pub const ENRICHMENT_ENTITY_COMPANY: &str = "canonical_company";

pub const FIELD_HQ_COUNTRY: &str = "hq_country";
pub const FIELD_OWNERSHIP: &str = "ownership_signal";
pub const FIELD_INDUSTRY: &str = "industry_keywords";

/// Bonus weights. Defaults mirror the documented scoring constants; runs may
/// override them through `config.ranking`.
#[derive(Debug, Clone, Copy)]
pub struct RankingWeights {
    pub evidence: f64,
    pub hq_country: f64,
    pub ownership: f64,
    pub industry_match: f64,
    pub industry_presence: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            evidence: 0.2,
            hq_country: 0.2,
            ownership: 0.1,
            industry_match: 0.15,
            industry_presence: 0.05,
        }
    }
}

impl RankingWeights {
    /// Read overrides from a run's config JSON (`ranking` object), falling
    /// back to the defaults for anything absent.
    pub fn from_run_config(config: Option<&Value>) -> Self {
        let mut weights = Self::default();
        let Some(ranking) = config.and_then(|c| c.get("ranking")) else {
            return weights;
        };
        let read = |key: &str| ranking.get(key).and_then(Value::as_f64);
        if let Some(v) = read("evidence_weight") {
            weights.evidence = v;
        }
        if let Some(v) = read("hq_country_weight") {
            weights.hq_country = v;
        }
        if let Some(v) = read("ownership_weight") {
            weights.ownership = v;
        }
        if let Some(v) = read("industry_match_weight") {
            weights.industry_match = v;
        }
        if let Some(v) = read("industry_presence_weight") {
            weights.industry_presence = v;
        }
        weights
    }
}

/// One nonzero scoring contribution.
#[derive(Debug, Clone, Serialize)]
pub struct ProspectSignalEvidence {
    pub field_key: String,
    pub value: Value,
    pub confidence: f64,
    pub source_document_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedProspect {
    pub prospect: CompanyProspect,
    pub score: f64,
    pub why_included: Vec<ProspectSignalEvidence>,
    pub has_hq_match: bool,
    pub has_ownership_signal: bool,
    pub has_industry_match: bool,
}

/// Post-ranking filters. Applied to the ordered list without reordering it.
#[derive(Debug, Clone, Default)]
pub struct RankingFilters {
    pub min_score: Option<f64>,
    pub has_hq: Option<bool>,
    pub has_ownership_signal: Option<bool>,
    pub has_industry_match: Option<bool>,
    pub review_status: Option<String>,
    pub verification_status: Option<String>,
    pub discovered_by: Option<String>,
    pub exec_search_enabled: Option<bool>,
}

pub async fn rank_prospects<S>(
    store: &S,
    tenant: Uuid,
    run_id: Uuid,
    filters: &RankingFilters,
    weights: &RankingWeights,
) -> Result<Vec<RankedProspect>>
where
    S: ResearchStore + ?Sized,
{
    let prospects = store.list_prospects_for_run(tenant, run_id).await?;
    let prospect_ids: Vec<Uuid> = prospects.iter().map(|p| p.id).collect();
    let canonical_ids = store.canonical_ids_for_prospects(tenant, &prospect_ids).await?;

    let mut ranked = Vec::with_capacity(prospects.len());
    for prospect in prospects {
        let mut assignments = Vec::new();
        if let Some(canonical_id) = canonical_ids.get(&prospect.id) {
            assignments = store
                .list_assignments_for_entity(tenant, ENRICHMENT_ENTITY_COMPANY, *canonical_id)
                .await?;
            // Stable order so repeated calls yield identical why_included.
            assignments.sort_by(|a, b| {
                (a.field_key.as_str(), a.content_hash.as_str(), a.id)
                    .cmp(&(b.field_key.as_str(), b.content_hash.as_str(), b.id))
            });
        }
        ranked.push(score_prospect(prospect, &assignments, weights));
    }

    ranked.sort_by(compare_ranked);
    debug!(%run_id, prospects = ranked.len(), "prospects ranked");

    Ok(ranked
        .into_iter()
        .filter(|r| passes(r, filters))
        .collect())
}

fn score_prospect(
    prospect: CompanyProspect,
    assignments: &[EnrichmentAssignment],
    weights: &RankingWeights,
) -> RankedProspect {
    let mut score =
        prospect.relevance_score.unwrap_or(0.0) + prospect.evidence_score.unwrap_or(0.0) * weights.evidence;
    let mut why_included = Vec::new();
    let mut has_hq_match = false;
    let mut has_ownership_signal = false;
    let mut has_industry_match = false;

    for assignment in assignments {
        let bonus = match assignment.field_key.as_str() {
            FIELD_HQ_COUNTRY => {
                let matches = assignment
                    .value_normalized
                    .as_deref()
                    .zip(prospect.hq_country.as_deref())
                    .map_or(false, |(a, b)| a.eq_ignore_ascii_case(b));
                if matches {
                    has_hq_match = true;
                    assignment.confidence * weights.hq_country
                } else {
                    0.0
                }
            }
            FIELD_OWNERSHIP => {
                has_ownership_signal = true;
                assignment.confidence * weights.ownership
            }
            FIELD_INDUSTRY => {
                let haystack = format!(
                    "{} {}",
                    prospect.sector.as_deref().unwrap_or(""),
                    prospect.subsector.as_deref().unwrap_or("")
                )
                .to_lowercase();
                let matched = industry_keywords(assignment)
                    .iter()
                    .any(|k| !k.is_empty() && haystack.contains(&k.to_lowercase()));
                if matched {
                    has_industry_match = true;
                    assignment.confidence * weights.industry_match
                } else {
                    assignment.confidence * weights.industry_presence
                }
            }
            _ => 0.0,
        };
        if bonus != 0.0 {
            score += bonus;
            why_included.push(ProspectSignalEvidence {
                field_key: assignment.field_key.clone(),
                value: assignment.value_json.clone(),
                confidence: assignment.confidence,
                source_document_id: assignment.source_document_id,
            });
        }
    }

    RankedProspect {
        score,
        why_included,
        has_hq_match,
        has_ownership_signal,
        has_industry_match,
        prospect,
    }
}

fn industry_keywords(assignment: &EnrichmentAssignment) -> Vec<String> {
    match &assignment.value_json {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Value::String(s) => vec![s.clone()],
        _ => assignment
            .value_normalized
            .clone()
            .map(|v| vec![v])
            .unwrap_or_default(),
    }
}

/// Ordering key: pinned first, then manual priority ascending with nulls
/// last, then score and evidence descending, then name as the stable
/// alphabetical tie-break.
fn compare_ranked(a: &RankedProspect, b: &RankedProspect) -> Ordering {
    (!a.prospect.is_pinned)
        .cmp(&!b.prospect.is_pinned)
        .then_with(|| {
            (a.prospect.manual_priority.is_none(), a.prospect.manual_priority)
                .cmp(&(b.prospect.manual_priority.is_none(), b.prospect.manual_priority))
        })
        .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal))
        .then_with(|| {
            b.prospect
                .evidence_score
                .unwrap_or(0.0)
                .partial_cmp(&a.prospect.evidence_score.unwrap_or(0.0))
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.prospect.name_normalized.cmp(&b.prospect.name_normalized))
}

fn passes(ranked: &RankedProspect, filters: &RankingFilters) -> bool {
    if let Some(min) = filters.min_score {
        if ranked.score < min {
            return false;
        }
    }
    if let Some(want) = filters.has_hq {
        if ranked.has_hq_match != want {
            return false;
        }
    }
    if let Some(want) = filters.has_ownership_signal {
        if ranked.has_ownership_signal != want {
            return false;
        }
    }
    if let Some(want) = filters.has_industry_match {
        if ranked.has_industry_match != want {
            return false;
        }
    }
    if let Some(status) = &filters.review_status {
        if &ranked.prospect.review_status != status {
            return false;
        }
    }
    if let Some(status) = &filters.verification_status {
        if &ranked.prospect.verification_status != status {
            return false;
        }
    }
    if let Some(label) = &filters.discovered_by {
        if ranked.prospect.discovered_by.as_deref() != Some(label.as_str()) {
            return false;
        }
    }
    if let Some(enabled) = filters.exec_search_enabled {
        if ranked.prospect.exec_search_enabled != enabled {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use prospector_common::normalize;
    use prospector_store::{
        CanonicalCompanyRepo, EnrichmentRepo, MemoryStore, NewCanonicalCompany,
        NewCanonicalCompanyLink, NewCompanyProspect, NewEnrichmentAssignment, NewResearchRun,
        ProspectRepo, RunRepo,
    };

    async fn seeded_run(store: &MemoryStore, tenant: Uuid) -> Uuid {
        store
            .create_run(
                tenant,
                NewResearchRun {
                    role_mandate_id: None,
                    name: "ranking".into(),
                    sector: None,
                    region_scope: None,
                    config: None,
                },
            )
            .await
            .unwrap()
            .id
    }

    async fn prospect(
        store: &MemoryStore,
        tenant: Uuid,
        run_id: Uuid,
        name: &str,
        relevance: f64,
        evidence: f64,
    ) -> Uuid {
        store
            .insert_prospect(
                tenant,
                NewCompanyProspect {
                    run_id,
                    name_raw: name.into(),
                    name_normalized: normalize::normalize_company_name(name),
                    hq_country: Some("AE".into()),
                    sector: Some("logistics".into()),
                    relevance_score: Some(relevance),
                    evidence_score: Some(evidence),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .0
            .id
    }

    async fn enrich(
        store: &MemoryStore,
        tenant: Uuid,
        prospect_id: Uuid,
        field_key: &str,
        value: Value,
        value_normalized: Option<&str>,
        confidence: f64,
    ) {
        let company = store
            .create_company(
                tenant,
                NewCanonicalCompany {
                    canonical_name: None,
                    primary_domain: None,
                    country_code: None,
                },
            )
            .await
            .unwrap();
        store
            .upsert_company_link(
                tenant,
                NewCanonicalCompanyLink {
                    canonical_company_id: company.id,
                    company_entity_id: prospect_id,
                    match_rule: "domain_exact".into(),
                    evidence_source_document_id: None,
                    evidence_run_id: None,
                },
            )
            .await
            .unwrap();
        store
            .insert_assignment_if_new(
                tenant,
                NewEnrichmentAssignment {
                    entity_type: ENRICHMENT_ENTITY_COMPANY.into(),
                    entity_id: company.id,
                    field_key: field_key.into(),
                    value_json: value.clone(),
                    value_normalized: value_normalized.map(str::to_string),
                    confidence,
                    derived_by: "test".into(),
                    content_hash: prospector_common::canonical::content_hash(&value),
                    source_document_id: None,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn bonuses_accumulate_and_are_explained() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        let id = prospect(&store, tenant, run_id, "Acme Corp", 0.5, 1.0).await;
        enrich(&store, tenant, id, FIELD_HQ_COUNTRY, json!("AE"), Some("AE"), 0.9).await;

        let ranked = rank_prospects(
            &store,
            tenant,
            run_id,
            &RankingFilters::default(),
            &RankingWeights::default(),
        )
        .await
        .unwrap();
        assert_eq!(ranked.len(), 1);
        // 0.5 + 1.0*0.2 + 0.9*0.2
        assert!((ranked[0].score - 0.88).abs() < 1e-9);
        assert_eq!(ranked[0].why_included.len(), 1);
        assert_eq!(ranked[0].why_included[0].field_key, FIELD_HQ_COUNTRY);
        assert!(ranked[0].has_hq_match);
    }

    #[tokio::test]
    async fn industry_keywords_distinguish_match_from_presence() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        let matched = prospect(&store, tenant, run_id, "Acme", 0.0, 0.0).await;
        enrich(
            &store, tenant, matched, FIELD_INDUSTRY, json!(["logistics", "freight"]), None, 1.0,
        )
        .await;
        let present = prospect(&store, tenant, run_id, "Globex", 0.0, 0.0).await;
        enrich(&store, tenant, present, FIELD_INDUSTRY, json!(["fintech"]), None, 1.0).await;

        let ranked = rank_prospects(
            &store,
            tenant,
            run_id,
            &RankingFilters::default(),
            &RankingWeights::default(),
        )
        .await
        .unwrap();
        let acme = ranked.iter().find(|r| r.prospect.id == matched).unwrap();
        let globex = ranked.iter().find(|r| r.prospect.id == present).unwrap();
        assert!((acme.score - 0.15).abs() < 1e-9);
        assert!(acme.has_industry_match);
        assert!((globex.score - 0.05).abs() < 1e-9);
        assert!(!globex.has_industry_match);
    }

    #[tokio::test]
    async fn ordering_is_deterministic_and_explainable_twice() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        prospect(&store, tenant, run_id, "Beta Corp", 0.4, 0.0).await;
        prospect(&store, tenant, run_id, "Alpha Corp", 0.4, 0.0).await;
        prospect(&store, tenant, run_id, "Gamma Corp", 0.9, 0.0).await;

        let filters = RankingFilters::default();
        let weights = RankingWeights::default();
        let first = rank_prospects(&store, tenant, run_id, &filters, &weights).await.unwrap();
        let second = rank_prospects(&store, tenant, run_id, &filters, &weights).await.unwrap();

        let names: Vec<&str> = first.iter().map(|r| r.prospect.name_normalized.as_str()).collect();
        // Highest score first; equal scores fall back to alphabetical.
        assert_eq!(names, vec!["gamma", "alpha", "beta"]);
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn filters_drop_rows_without_reordering() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        prospect(&store, tenant, run_id, "Low Co", 0.1, 0.0).await;
        prospect(&store, tenant, run_id, "High Co", 0.9, 0.0).await;
        prospect(&store, tenant, run_id, "Mid Co", 0.5, 0.0).await;

        let filters = RankingFilters { min_score: Some(0.4), ..Default::default() };
        let ranked = rank_prospects(&store, tenant, run_id, &filters, &RankingWeights::default())
            .await
            .unwrap();
        let names: Vec<&str> = ranked.iter().map(|r| r.prospect.name_normalized.as_str()).collect();
        assert_eq!(names, vec!["high", "mid"]);
    }

    #[test]
    fn run_config_overrides_weights() {
        let config = json!({"ranking": {"evidence_weight": 0.5, "ownership_weight": 0.3}});
        let weights = RankingWeights::from_run_config(Some(&config));
        assert_eq!(weights.evidence, 0.5);
        assert_eq!(weights.ownership, 0.3);
        assert_eq!(weights.hq_country, 0.2);
    }
}
