//! Run-scoped executive deduplication.
//!
//! The per-company unique key already prevents literal duplicates, so the
//! signal here is the same normalized name appearing under several company
//! prospects in one run. Groups with conflicting emails are left alone;
//! a shared email strengthens the match. Each ResolvedEntity and
//! EntityMergeLink is keyed by a hash over its inputs, so re-running against
//! unchanged data writes nothing.

use std::collections::BTreeMap;

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use prospector_common::{canonical, normalize, Result};
use prospector_store::{
    ExecutiveProspect, NewEntityMergeLink, NewResearchEvent, NewResolvedEntity, ResearchStore,
};

use super::EntityResolutionSummary;

const ENTITY_TYPE: &str = "executive";

pub async fn resolve_run_entities<S>(
    store: &S,
    tenant: Uuid,
    run_id: Uuid,
) -> Result<EntityResolutionSummary>
where
    S: ResearchStore + ?Sized,
{
    let executives = store.list_executives_for_run(tenant, run_id).await?;
    let mut summary = EntityResolutionSummary {
        inputs_considered: executives.len() as u64,
        ..Default::default()
    };

    // Group by normalized name; BTreeMap keeps group order stable across runs.
    let mut groups: BTreeMap<String, Vec<&ExecutiveProspect>> = BTreeMap::new();
    for exec in &executives {
        groups.entry(exec.name_normalized.clone()).or_default().push(exec);
    }

    for (name_normalized, mut members) in groups {
        if members.len() < 2 {
            continue;
        }

        // Distinct emails inside one name group mean distinct people; leave
        // the group untouched rather than guess.
        let mut emails: Vec<String> = members
            .iter()
            .filter_map(|m| m.email.as_deref())
            .map(normalize::normalize_email)
            .collect();
        emails.sort();
        emails.dedup();
        if emails.len() > 1 {
            continue;
        }
        let shared_email = emails.into_iter().next();

        // Oldest row wins as canonical; id as tie-break for equal timestamps.
        members.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        let canonical_exec = members[0];

        let member_ids: Vec<Uuid> = {
            let mut ids: Vec<Uuid> = members.iter().map(|m| m.id).collect();
            ids.sort();
            ids
        };
        let evidence = store.list_exec_evidence_for_ids(tenant, &member_ids).await?;
        let mut doc_ids: Vec<Uuid> = members
            .iter()
            .filter_map(|m| m.source_document_id)
            .chain(evidence.iter().filter_map(|e| e.source_document_id))
            .collect();
        doc_ids.sort();
        doc_ids.dedup();

        let mut reason_codes = vec!["name_exact"];
        if shared_email.is_some() {
            reason_codes.push("email_exact");
        }
        let match_keys = json!({
            "name_normalized": name_normalized,
            "email": shared_email,
        });
        let entity_hash = canonical::content_hash(&json!({
            "entity_type": ENTITY_TYPE,
            "members": member_ids,
        }));
        let (entity, entity_created) = store
            .upsert_resolved_entity(
                tenant,
                run_id,
                NewResolvedEntity {
                    entity_type: ENTITY_TYPE.to_string(),
                    canonical_entity_id: canonical_exec.id,
                    match_keys: match_keys.clone(),
                    reason_codes: json!(reason_codes),
                    evidence_source_document_ids: json!(doc_ids),
                    resolution_hash: entity_hash,
                },
            )
            .await?;
        if entity_created {
            summary.resolved_entities_new += 1;
        } else {
            summary.resolved_entities_existing += 1;
        }

        for duplicate in &members[1..] {
            let link_hash = canonical::content_hash(&json!({
                "canonical": canonical_exec.id,
                "duplicate": duplicate.id,
                "evidence": doc_ids,
            }));
            let (_, link_created) = store
                .upsert_merge_link(
                    tenant,
                    run_id,
                    NewEntityMergeLink {
                        entity_type: ENTITY_TYPE.to_string(),
                        resolved_entity_id: Some(entity.id),
                        canonical_entity_id: canonical_exec.id,
                        duplicate_entity_id: duplicate.id,
                        match_keys: match_keys.clone(),
                        reason_codes: json!(reason_codes),
                        evidence_source_document_ids: json!(doc_ids),
                        resolution_hash: link_hash,
                    },
                )
                .await?;
            if link_created {
                summary.merge_links_new += 1;
            } else {
                summary.merge_links_existing += 1;
            }
        }
    }

    store
        .append_event(
            tenant,
            run_id,
            NewResearchEvent {
                event_type: "entity_resolution".to_string(),
                status: "ok".to_string(),
                message: None,
                meta: Some(json!({
                    "inputs_considered": summary.inputs_considered,
                    "resolved_entities_new": summary.resolved_entities_new,
                    "resolved_entities_existing": summary.resolved_entities_existing,
                    "merge_links_new": summary.merge_links_new,
                    "merge_links_existing": summary.merge_links_existing,
                })),
            },
        )
        .await?;

    info!(
        %run_id,
        inputs = summary.inputs_considered,
        entities_new = summary.resolved_entities_new,
        links_new = summary.merge_links_new,
        "entity resolution complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospector_store::{
        ExecutiveRepo, MemoryStore, NewCompanyProspect, NewExecutiveProspect, NewResearchRun,
        ProspectRepo, ResolutionRepo, RunRepo,
    };

    async fn seeded_run(store: &MemoryStore, tenant: Uuid) -> Uuid {
        store
            .create_run(
                tenant,
                NewResearchRun {
                    role_mandate_id: None,
                    name: "resolution".into(),
                    sector: None,
                    region_scope: None,
                    config: None,
                },
            )
            .await
            .unwrap()
            .id
    }

    async fn company(store: &MemoryStore, tenant: Uuid, run_id: Uuid, name: &str) -> Uuid {
        store
            .insert_prospect(
                tenant,
                NewCompanyProspect {
                    run_id,
                    name_raw: name.into(),
                    name_normalized: name.to_lowercase(),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .0
            .id
    }

    async fn exec(
        store: &MemoryStore,
        tenant: Uuid,
        run_id: Uuid,
        company_id: Uuid,
        name_normalized: &str,
        email: Option<&str>,
    ) -> Uuid {
        store
            .insert_executive(
                tenant,
                NewExecutiveProspect {
                    run_id,
                    company_prospect_id: company_id,
                    name_raw: name_normalized.into(),
                    name_normalized: name_normalized.into(),
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
    async fn singletons_produce_no_rows() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        let acme = company(&store, tenant, run_id, "Acme").await;
        exec(&store, tenant, run_id, acme, "jane doe", None).await;

        let summary = resolve_run_entities(&store, tenant, run_id).await.unwrap();
        assert_eq!(summary.inputs_considered, 1);
        assert_eq!(summary.resolved_entities_new, 0);
        assert_eq!(summary.merge_links_new, 0);
    }

    #[tokio::test]
    async fn same_name_across_companies_merges_and_converges() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        let acme = company(&store, tenant, run_id, "Acme").await;
        let globex = company(&store, tenant, run_id, "Globex").await;
        exec(&store, tenant, run_id, acme, "jane doe", Some("jane@acme.example")).await;
        exec(&store, tenant, run_id, globex, "jane doe", None).await;
        exec(&store, tenant, run_id, acme, "john smith", None).await;

        let first = resolve_run_entities(&store, tenant, run_id).await.unwrap();
        assert_eq!(first.inputs_considered, 3);
        assert_eq!(first.resolved_entities_new, 1);
        assert_eq!(first.merge_links_new, 1);

        // Unchanged input: everything resolves to existing rows.
        let second = resolve_run_entities(&store, tenant, run_id).await.unwrap();
        assert_eq!(second.resolved_entities_new, 0);
        assert_eq!(second.merge_links_new, 0);
        assert_eq!(second.resolved_entities_existing, 1);
        assert_eq!(second.merge_links_existing, 1);

        assert_eq!(
            store.list_merge_links_for_run(tenant, run_id).await.unwrap().len(),
            1
        );
        let entities = store.list_resolved_entities_for_run(tenant, run_id).await.unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].reason_codes, json!(["name_exact", "email_exact"]));
    }

    #[tokio::test]
    async fn conflicting_emails_block_the_merge() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        let acme = company(&store, tenant, run_id, "Acme").await;
        let globex = company(&store, tenant, run_id, "Globex").await;
        exec(&store, tenant, run_id, acme, "jane doe", Some("jane@acme.example")).await;
        exec(&store, tenant, run_id, globex, "jane doe", Some("jane@globex.example")).await;

        let summary = resolve_run_entities(&store, tenant, run_id).await.unwrap();
        assert_eq!(summary.resolved_entities_new, 0);
        assert_eq!(summary.merge_links_new, 0);
    }
}
