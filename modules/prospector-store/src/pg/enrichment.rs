use async_trait::async_trait;
use uuid::Uuid;

use prospector_common::{ProspectorError, Result};

use super::{db_err, PgStore};
use crate::records::{
    AiEnrichmentRecord, EnrichmentAssignment, NewAiEnrichmentRecord, NewEnrichmentAssignment,
};
use crate::traits::EnrichmentRepo;

#[async_trait]
impl EnrichmentRepo for PgStore {
    async fn insert_enrichment_record_if_new(
        &self,
        tenant: Uuid,
        data: NewAiEnrichmentRecord,
    ) -> Result<(AiEnrichmentRecord, bool)> {
        let inserted = sqlx::query_as::<_, AiEnrichmentRecord>(
            r#"
            INSERT INTO ai_enrichment_records
                (id, tenant_id, run_id, purpose, provider, model, content_hash,
                 source_document_id, response_summary)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (tenant_id, run_id, purpose, provider, content_hash) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(data.run_id)
        .bind(&data.purpose)
        .bind(&data.provider)
        .bind(&data.model)
        .bind(&data.content_hash)
        .bind(data.source_document_id)
        .bind(&data.response_summary)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        if let Some(record) = inserted {
            return Ok((record, true));
        }

        let existing = sqlx::query_as::<_, AiEnrichmentRecord>(
            r#"
            SELECT * FROM ai_enrichment_records
            WHERE tenant_id = $1 AND run_id = $2 AND purpose = $3
              AND provider = $4 AND content_hash = $5
            "#,
        )
        .bind(tenant)
        .bind(data.run_id)
        .bind(&data.purpose)
        .bind(&data.provider)
        .bind(&data.content_hash)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?
        .ok_or_else(|| {
            ProspectorError::Database("enrichment record upsert returned no row".into())
        })?;

        Ok((existing, false))
    }

    async fn insert_assignment_if_new(
        &self,
        tenant: Uuid,
        data: NewEnrichmentAssignment,
    ) -> Result<(EnrichmentAssignment, bool)> {
        let inserted = sqlx::query_as::<_, EnrichmentAssignment>(
            r#"
            INSERT INTO enrichment_assignments
                (id, tenant_id, entity_type, entity_id, field_key, value_json,
                 value_normalized, confidence, derived_by, content_hash, source_document_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (tenant_id, entity_type, entity_id, field_key, content_hash,
                         source_document_id)
                DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(&data.entity_type)
        .bind(data.entity_id)
        .bind(&data.field_key)
        .bind(&data.value_json)
        .bind(&data.value_normalized)
        .bind(data.confidence)
        .bind(&data.derived_by)
        .bind(&data.content_hash)
        .bind(data.source_document_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        if let Some(assignment) = inserted {
            return Ok((assignment, true));
        }

        let existing = sqlx::query_as::<_, EnrichmentAssignment>(
            r#"
            SELECT * FROM enrichment_assignments
            WHERE tenant_id = $1 AND entity_type = $2 AND entity_id = $3
              AND field_key = $4 AND content_hash = $5
              AND source_document_id IS NOT DISTINCT FROM $6
            "#,
        )
        .bind(tenant)
        .bind(&data.entity_type)
        .bind(data.entity_id)
        .bind(&data.field_key)
        .bind(&data.content_hash)
        .bind(data.source_document_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?
        .ok_or_else(|| ProspectorError::Database("assignment upsert returned no row".into()))?;

        Ok((existing, false))
    }

    async fn list_assignments_for_entity(
        &self,
        tenant: Uuid,
        entity_type: &str,
        entity_id: Uuid,
    ) -> Result<Vec<EnrichmentAssignment>> {
        let assignments = sqlx::query_as::<_, EnrichmentAssignment>(
            r#"
            SELECT * FROM enrichment_assignments
            WHERE tenant_id = $1 AND entity_type = $2 AND entity_id = $3
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant)
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(assignments)
    }
}
