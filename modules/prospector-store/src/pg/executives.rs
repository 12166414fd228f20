use async_trait::async_trait;
use uuid::Uuid;

use prospector_common::{ProspectorError, Result};

use super::{db_err, PgStore};
use crate::records::{
    ExecutiveProspect, ExecutiveProspectEvidence, NewExecutiveEvidence, NewExecutiveProspect,
};
use crate::traits::ExecutiveRepo;

#[async_trait]
impl ExecutiveRepo for PgStore {
    async fn insert_executive(
        &self,
        tenant: Uuid,
        data: NewExecutiveProspect,
    ) -> Result<(ExecutiveProspect, bool)> {
        let inserted = sqlx::query_as::<_, ExecutiveProspect>(
            r#"
            INSERT INTO executive_prospects
                (id, tenant_id, run_id, company_prospect_id, name_raw, name_normalized,
                 title, email, linkedin_url, location, confidence, discovered_by,
                 source_document_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (tenant_id, company_prospect_id, name_normalized) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(data.run_id)
        .bind(data.company_prospect_id)
        .bind(&data.name_raw)
        .bind(&data.name_normalized)
        .bind(&data.title)
        .bind(&data.email)
        .bind(&data.linkedin_url)
        .bind(&data.location)
        .bind(data.confidence)
        .bind(&data.discovered_by)
        .bind(data.source_document_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        if let Some(exec) = inserted {
            return Ok((exec, true));
        }

        let existing = sqlx::query_as::<_, ExecutiveProspect>(
            r#"
            SELECT * FROM executive_prospects
            WHERE tenant_id = $1 AND company_prospect_id = $2 AND name_normalized = $3
            "#,
        )
        .bind(tenant)
        .bind(data.company_prospect_id)
        .bind(&data.name_normalized)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?
        .ok_or_else(|| ProspectorError::Database("executive upsert returned no row".into()))?;

        Ok((existing, false))
    }

    async fn list_executives_for_run(
        &self,
        tenant: Uuid,
        run_id: Uuid,
    ) -> Result<Vec<ExecutiveProspect>> {
        let execs = sqlx::query_as::<_, ExecutiveProspect>(
            r#"
            SELECT * FROM executive_prospects
            WHERE tenant_id = $1 AND run_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant)
        .bind(run_id)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(execs)
    }

    async fn add_exec_evidence_if_new(
        &self,
        tenant: Uuid,
        data: NewExecutiveEvidence,
    ) -> Result<(ExecutiveProspectEvidence, bool)> {
        let existing = sqlx::query_as::<_, ExecutiveProspectEvidence>(
            r#"
            SELECT * FROM executive_prospect_evidence
            WHERE tenant_id = $1 AND executive_prospect_id = $2
              AND source_url IS NOT DISTINCT FROM $3
              AND source_name IS NOT DISTINCT FROM $4
            LIMIT 1
            "#,
        )
        .bind(tenant)
        .bind(data.executive_prospect_id)
        .bind(&data.source_url)
        .bind(&data.source_name)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        if let Some(evidence) = existing {
            return Ok((evidence, false));
        }

        let evidence = sqlx::query_as::<_, ExecutiveProspectEvidence>(
            r#"
            INSERT INTO executive_prospect_evidence
                (id, tenant_id, executive_prospect_id, source_type, source_name,
                 source_url, raw_snippet, source_document_id, source_content_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(data.executive_prospect_id)
        .bind(&data.source_type)
        .bind(&data.source_name)
        .bind(&data.source_url)
        .bind(&data.raw_snippet)
        .bind(data.source_document_id)
        .bind(&data.source_content_hash)
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;

        Ok((evidence, true))
    }

    async fn list_exec_evidence_for_ids(
        &self,
        tenant: Uuid,
        executive_ids: &[Uuid],
    ) -> Result<Vec<ExecutiveProspectEvidence>> {
        let evidence = sqlx::query_as::<_, ExecutiveProspectEvidence>(
            r#"
            SELECT * FROM executive_prospect_evidence
            WHERE tenant_id = $1 AND executive_prospect_id = ANY($2)
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant)
        .bind(executive_ids)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(evidence)
    }
}
