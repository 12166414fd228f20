//! Tenant-scoped canonical person resolution, email-first.
//!
//! Idempotency is structural rather than hash-based: lookups hit the unique
//! (tenant, email) and (person, entity) keys, and a losing concurrent writer
//! links against whichever row won the email.

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use prospector_common::{normalize, Result};
use prospector_store::{
    NewCanonicalPerson, NewCanonicalPersonLink, NewResearchEvent, ResearchStore,
};

use super::CanonicalResolutionSummary;

pub async fn resolve_canonical_people<S>(
    store: &S,
    tenant: Uuid,
    run_id: Uuid,
) -> Result<CanonicalResolutionSummary>
where
    S: ResearchStore + ?Sized,
{
    let count_before = store.count_people(tenant).await?;
    let executives = store.list_executives_for_run(tenant, run_id).await?;
    let mut summary = CanonicalResolutionSummary {
        inputs_considered: executives.len() as u64,
        count_before,
        ..Default::default()
    };

    for exec in &executives {
        let email = exec
            .email
            .as_deref()
            .map(normalize::normalize_email)
            .filter(|e| !e.is_empty());

        let (person_id, match_rule) = match email {
            Some(email) => {
                let person_id = match store.get_person_by_email(tenant, &email).await? {
                    Some(person) => person.id,
                    None => {
                        let person = store
                            .create_person(
                                tenant,
                                NewCanonicalPerson {
                                    canonical_full_name: Some(exec.name_raw.clone()),
                                    primary_email: Some(email.clone()),
                                    primary_linkedin_url: exec.linkedin_url.clone(),
                                },
                            )
                            .await?;
                        // A concurrent writer may have claimed the email; the
                        // returned binding names the winner to link against,
                        // and only a won claim counts as a new person.
                        let binding = store
                            .upsert_person_email(tenant, person.id, &email)
                            .await?;
                        if binding.canonical_person_id == person.id {
                            summary.canonical_new += 1;
                        }
                        binding.canonical_person_id
                    }
                };
                (person_id, "email_exact")
            }
            None => {
                let (found, ambiguous) = store
                    .find_person_by_name_company(
                        tenant,
                        &exec.name_normalized,
                        exec.company_prospect_id,
                    )
                    .await?;
                if ambiguous {
                    summary.skipped_ambiguous += 1;
                    continue;
                }
                match found {
                    Some(person) => (person.id, "name_company_exact"),
                    None => {
                        // No identity key to anchor on; leave unresolved.
                        summary.skipped_unkeyed += 1;
                        continue;
                    }
                }
            }
        };

        let (_, created) = store
            .upsert_person_link(
                tenant,
                NewCanonicalPersonLink {
                    canonical_person_id: person_id,
                    person_entity_id: exec.id,
                    match_rule: match_rule.to_string(),
                    evidence_source_document_id: exec.source_document_id,
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

    summary.count_after = store.count_people(tenant).await?;
    store
        .append_event(
            tenant,
            run_id,
            NewResearchEvent {
                event_type: "canonical_people".to_string(),
                status: "ok".to_string(),
                message: None,
                meta: Some(json!({
                    "inputs_considered": summary.inputs_considered,
                    "people_before": summary.count_before,
                    "people_after": summary.count_after,
                    "links_new": summary.links_new,
                    "links_existing": summary.links_existing,
                    "skipped_ambiguous": summary.skipped_ambiguous,
                    "skipped_unkeyed": summary.skipped_unkeyed,
                })),
            },
        )
        .await?;

    info!(
        %run_id,
        people_before = summary.count_before,
        people_after = summary.count_after,
        links_new = summary.links_new,
        "canonical people resolution complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospector_store::{
        CanonicalPersonRepo, ExecutiveRepo, MemoryStore, NewCompanyProspect, NewExecutiveProspect,
        NewResearchRun, ProspectRepo, RunRepo,
    };

    async fn seeded(store: &MemoryStore, tenant: Uuid) -> (Uuid, Uuid) {
        let run_id = store
            .create_run(
                tenant,
                NewResearchRun {
                    role_mandate_id: None,
                    name: "people".into(),
                    sector: None,
                    region_scope: None,
                    config: None,
                },
            )
            .await
            .unwrap()
            .id;
        let (company, _) = store
            .insert_prospect(
                tenant,
                NewCompanyProspect {
                    run_id,
                    name_raw: "Acme".into(),
                    name_normalized: "acme".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        (run_id, company.id)
    }

    async fn exec(
        store: &MemoryStore,
        tenant: Uuid,
        run_id: Uuid,
        company_id: Uuid,
        name: &str,
        email: Option<&str>,
    ) -> Uuid {
        store
            .insert_executive(
                tenant,
                NewExecutiveProspect {
                    run_id,
                    company_prospect_id: company_id,
                    name_raw: name.into(),
                    name_normalized: normalize::normalize_person_name(name),
                    email: email.map(str::to_string),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .0
            .id
    }

    #[tokio::test]
    async fn email_creates_person_then_links_on_repeat() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let (run_id, company_id) = seeded(&store, tenant).await;
        exec(&store, tenant, run_id, company_id, "Jane Doe", Some("jane@acme.example")).await;

        let first = resolve_canonical_people(&store, tenant, run_id).await.unwrap();
        assert_eq!(first.canonical_new, 1);
        assert_eq!(first.links_new, 1);
        assert_eq!(first.count_after, 1);

        // Convergence: a second identical pass writes nothing new.
        let second = resolve_canonical_people(&store, tenant, run_id).await.unwrap();
        assert_eq!(second.canonical_new, 0);
        assert_eq!(second.links_new, 0);
        assert_eq!(second.links_existing, 1);
        assert_eq!(second.count_after, 1);
    }

    #[tokio::test]
    async fn same_email_across_runs_resolves_to_one_person() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let (run_a, company_a) = seeded(&store, tenant).await;
        exec(&store, tenant, run_a, company_a, "Jane Doe", Some("jane@acme.example")).await;
        resolve_canonical_people(&store, tenant, run_a).await.unwrap();

        let (run_b, company_b) = seeded(&store, tenant).await;
        exec(&store, tenant, run_b, company_b, "J. Doe", Some("JANE@acme.example")).await;
        let second = resolve_canonical_people(&store, tenant, run_b).await.unwrap();
        assert_eq!(second.canonical_new, 0);
        assert_eq!(second.links_new, 1);
        assert_eq!(store.count_people(tenant).await.unwrap(), 1);

        let links = store.list_person_links(tenant).await.unwrap();
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| l.match_rule == "email_exact"));
        assert_eq!(links[0].canonical_person_id, links[1].canonical_person_id);
    }

    #[tokio::test]
    async fn missing_email_without_prior_link_is_left_unresolved() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let (run_id, company_id) = seeded(&store, tenant).await;
        exec(&store, tenant, run_id, company_id, "John Smith", None).await;

        let summary = resolve_canonical_people(&store, tenant, run_id).await.unwrap();
        assert_eq!(summary.skipped_unkeyed, 1);
        assert_eq!(summary.links_new, 0);
        assert_eq!(store.count_people(tenant).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn lost_email_claim_binds_the_winner() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let (run_id, company_id) = seeded(&store, tenant).await;

        // State a concurrent resolver leaves behind: the winner holds the
        // email binding.
        let winner = store
            .create_person(
                tenant,
                NewCanonicalPerson {
                    canonical_full_name: Some("Jane Doe".into()),
                    primary_email: Some("jane@acme.example".into()),
                    primary_linkedin_url: None,
                },
            )
            .await
            .unwrap();
        store
            .upsert_person_email(tenant, winner.id, "jane@acme.example")
            .await
            .unwrap();

        // A late claimant's bind lands on the winner's row, not its own.
        let loser = store
            .create_person(
                tenant,
                NewCanonicalPerson {
                    canonical_full_name: Some("Jane Doe".into()),
                    primary_email: Some("jane@acme.example".into()),
                    primary_linkedin_url: None,
                },
            )
            .await
            .unwrap();
        let binding = store
            .upsert_person_email(tenant, loser.id, "jane@acme.example")
            .await
            .unwrap();
        assert_eq!(binding.canonical_person_id, winner.id);

        // Resolution over the claimed email links the winner and does not
        // count a new person.
        exec(&store, tenant, run_id, company_id, "Jane Doe", Some("jane@acme.example")).await;
        let summary = resolve_canonical_people(&store, tenant, run_id).await.unwrap();
        assert_eq!(summary.canonical_new, 0);
        assert_eq!(summary.links_new, 1);
        let links = store.list_person_links(tenant).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].canonical_person_id, winner.id);
    }
}
