use async_trait::async_trait;
use uuid::Uuid;

use prospector_common::{ProspectorError, Result};

use super::{db_err, PgStore};
use crate::records::{EntityMergeLink, NewEntityMergeLink, NewResolvedEntity, ResolvedEntity};
use crate::traits::ResolutionRepo;

#[async_trait]
impl ResolutionRepo for PgStore {
    async fn upsert_resolved_entity(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        data: NewResolvedEntity,
    ) -> Result<(ResolvedEntity, bool)> {
        let inserted = sqlx::query_as::<_, ResolvedEntity>(
            r#"
            INSERT INTO resolved_entities
                (id, tenant_id, run_id, entity_type, canonical_entity_id, match_keys,
                 reason_codes, evidence_source_document_ids, resolution_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (tenant_id, run_id, resolution_hash) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(run_id)
        .bind(&data.entity_type)
        .bind(data.canonical_entity_id)
        .bind(&data.match_keys)
        .bind(&data.reason_codes)
        .bind(&data.evidence_source_document_ids)
        .bind(&data.resolution_hash)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        if let Some(entity) = inserted {
            return Ok((entity, true));
        }

        let existing = sqlx::query_as::<_, ResolvedEntity>(
            r#"
            SELECT * FROM resolved_entities
            WHERE tenant_id = $1 AND run_id = $2 AND resolution_hash = $3
            "#,
        )
        .bind(tenant)
        .bind(run_id)
        .bind(&data.resolution_hash)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?
        .ok_or_else(|| ProspectorError::Database("resolved entity upsert returned no row".into()))?;

        Ok((existing, false))
    }

    async fn upsert_merge_link(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        data: NewEntityMergeLink,
    ) -> Result<(EntityMergeLink, bool)> {
        let inserted = sqlx::query_as::<_, EntityMergeLink>(
            r#"
            INSERT INTO entity_merge_links
                (id, tenant_id, run_id, entity_type, resolved_entity_id,
                 canonical_entity_id, duplicate_entity_id, match_keys, reason_codes,
                 evidence_source_document_ids, resolution_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (tenant_id, run_id, resolution_hash) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(run_id)
        .bind(&data.entity_type)
        .bind(data.resolved_entity_id)
        .bind(data.canonical_entity_id)
        .bind(data.duplicate_entity_id)
        .bind(&data.match_keys)
        .bind(&data.reason_codes)
        .bind(&data.evidence_source_document_ids)
        .bind(&data.resolution_hash)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        if let Some(link) = inserted {
            return Ok((link, true));
        }

        let existing = sqlx::query_as::<_, EntityMergeLink>(
            r#"
            SELECT * FROM entity_merge_links
            WHERE tenant_id = $1 AND run_id = $2 AND resolution_hash = $3
            "#,
        )
        .bind(tenant)
        .bind(run_id)
        .bind(&data.resolution_hash)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?
        .ok_or_else(|| ProspectorError::Database("merge link upsert returned no row".into()))?;

        Ok((existing, false))
    }

    async fn list_resolved_entities_for_run(
        &self,
        tenant: Uuid,
        run_id: Uuid,
    ) -> Result<Vec<ResolvedEntity>> {
        let entities = sqlx::query_as::<_, ResolvedEntity>(
            r#"
            SELECT * FROM resolved_entities
            WHERE tenant_id = $1 AND run_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant)
        .bind(run_id)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(entities)
    }

    async fn list_merge_links_for_run(
        &self,
        tenant: Uuid,
        run_id: Uuid,
    ) -> Result<Vec<EntityMergeLink>> {
        let links = sqlx::query_as::<_, EntityMergeLink>(
            r#"
            SELECT * FROM entity_merge_links
            WHERE tenant_id = $1 AND run_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant)
        .bind(run_id)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(links)
    }
}
