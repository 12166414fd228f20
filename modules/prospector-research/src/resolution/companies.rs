//! Tenant-scoped canonical company resolution, domain-first with a
//! name-plus-country fallback. Same structural idempotency as people.

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use prospector_common::{normalize, Result};
use prospector_store::{
    NewCanonicalCompany, NewCanonicalCompanyLink, NewResearchEvent, ResearchStore,
};

use super::CanonicalResolutionSummary;

pub async fn resolve_canonical_companies<S>(
    store: &S,
    tenant: Uuid,
    run_id: Uuid,
) -> Result<CanonicalResolutionSummary>
where
    S: ResearchStore + ?Sized,
{
    let count_before = store.count_companies(tenant).await?;
    let prospects = store.list_prospects_for_run(tenant, run_id).await?;
    let mut summary = CanonicalResolutionSummary {
        inputs_considered: prospects.len() as u64,
        count_before,
        ..Default::default()
    };

    for prospect in &prospects {
        let domain = prospect.website_url.as_deref().and_then(normalize::normalize_domain);
        let country = prospect.hq_country.as_deref().and_then(normalize::normalize_country);

        let (company_id, match_rule) = match domain {
            Some(domain) => {
                let company_id = match store.get_company_by_domain(tenant, &domain).await? {
                    Some(company) => company.id,
                    None => {
                        let company = store
                            .create_company(
                                tenant,
                                NewCanonicalCompany {
                                    canonical_name: Some(prospect.name_normalized.clone()),
                                    primary_domain: Some(domain.clone()),
                                    country_code: country.clone(),
                                },
                            )
                            .await?;
                        summary.canonical_new += 1;
                        // Bind against whichever row won the domain.
                        let binding = store
                            .upsert_company_domain(tenant, company.id, &domain)
                            .await?;
                        binding.canonical_company_id
                    }
                };
                (company_id, "domain_exact")
            }
            None => {
                let Some(country) = country else {
                    summary.skipped_unkeyed += 1;
                    continue;
                };
                match store
                    .get_company_by_name_country(tenant, &prospect.name_normalized, &country)
                    .await?
                {
                    Some(company) => (company.id, "name_country_exact"),
                    None => {
                        let company = store
                            .create_company(
                                tenant,
                                NewCanonicalCompany {
                                    canonical_name: Some(prospect.name_normalized.clone()),
                                    primary_domain: None,
                                    country_code: Some(country),
                                },
                            )
                            .await?;
                        summary.canonical_new += 1;
                        (company.id, "name_country_exact")
                    }
                }
            }
        };

        let evidence_doc = store
            .list_evidence_for_prospects(tenant, &[prospect.id])
            .await?
            .into_iter()
            .find_map(|e| e.source_document_id);
        let (_, created) = store
            .upsert_company_link(
                tenant,
                NewCanonicalCompanyLink {
                    canonical_company_id: company_id,
                    company_entity_id: prospect.id,
                    match_rule: match_rule.to_string(),
                    evidence_source_document_id: evidence_doc,
                    evidence_run_id: Some(run_id),
                },
            )
            .await?;
        if created {
            summary.links_new += 1;
        } else {
            summary.links_existing += 1;
        }
    }

    summary.count_after = store.count_companies(tenant).await?;
    store
        .append_event(
            tenant,
            run_id,
            NewResearchEvent {
                event_type: "canonical_companies".to_string(),
                status: "ok".to_string(),
                message: None,
                meta: Some(json!({
                    "inputs_considered": summary.inputs_considered,
                    "companies_before": summary.count_before,
                    "companies_after": summary.count_after,
                    "links_new": summary.links_new,
                    "links_existing": summary.links_existing,
                    "skipped_unkeyed": summary.skipped_unkeyed,
                })),
            },
        )
        .await?;

    info!(
        %run_id,
        companies_before = summary.count_before,
        companies_after = summary.count_after,
        links_new = summary.links_new,
        "canonical company resolution complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospector_store::{
        CanonicalCompanyRepo, MemoryStore, NewCompanyProspect, NewResearchRun, ProspectRepo,
        RunRepo,
    };

    async fn seeded_run(store: &MemoryStore, tenant: Uuid) -> Uuid {
        store
            .create_run(
                tenant,
                NewResearchRun {
                    role_mandate_id: None,
                    name: "companies".into(),
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
        website: Option<&str>,
        country: Option<&str>,
    ) -> Uuid {
        store
            .insert_prospect(
                tenant,
                NewCompanyProspect {
                    run_id,
                    name_raw: name.into(),
                    name_normalized: normalize::normalize_company_name(name),
                    website_url: website.map(str::to_string),
                    hq_country: country.map(str::to_string),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .0
            .id
    }

    #[tokio::test]
    async fn shared_domain_across_runs_is_one_company() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_a = seeded_run(&store, tenant).await;
        prospect(&store, tenant, run_a, "Acme Corp", Some("https://www.acme.example"), None).await;
        let first = resolve_canonical_companies(&store, tenant, run_a).await.unwrap();
        assert_eq!(first.canonical_new, 1);
        assert_eq!(first.links_new, 1);

        let run_b = seeded_run(&store, tenant).await;
        prospect(&store, tenant, run_b, "ACME Inc", Some("http://acme.example/team"), None).await;
        let second = resolve_canonical_companies(&store, tenant, run_b).await.unwrap();
        assert_eq!(second.canonical_new, 0);
        assert_eq!(second.links_new, 1);
        assert_eq!(store.count_companies(tenant).await.unwrap(), 1);

        let links = store.list_company_links(tenant).await.unwrap();
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| l.match_rule == "domain_exact"));
        assert_eq!(links[0].canonical_company_id, links[1].canonical_company_id);
    }

    #[tokio::test]
    async fn name_country_fallback_converges() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        prospect(&store, tenant, run_id, "Globex Ltd", None, Some("UK")).await;

        let first = resolve_canonical_companies(&store, tenant, run_id).await.unwrap();
        assert_eq!(first.canonical_new, 1);
        assert_eq!(first.links_new, 1);

        let second = resolve_canonical_companies(&store, tenant, run_id).await.unwrap();
        assert_eq!(second.canonical_new, 0);
        assert_eq!(second.links_new, 0);
        assert_eq!(second.links_existing, 1);
        assert_eq!(store.count_companies(tenant).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn prospect_without_domain_or_country_is_skipped() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        prospect(&store, tenant, run_id, "Mystery Co", None, None).await;

        let summary = resolve_canonical_companies(&store, tenant, run_id).await.unwrap();
        assert_eq!(summary.skipped_unkeyed, 1);
        assert_eq!(store.count_companies(tenant).await.unwrap(), 0);
    }
}
