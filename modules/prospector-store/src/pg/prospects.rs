use async_trait::async_trait;
use uuid::Uuid;

use prospector_common::Result;

use super::{db_err, PgStore};
use crate::records::{
    CompanyProspect, CompanyProspectEvidence, NewCompanyEvidence, NewCompanyProspect,
};
use crate::traits::ProspectRepo;

#[async_trait]
impl ProspectRepo for PgStore {
    async fn insert_prospect(
        &self,
        tenant: Uuid,
        data: NewCompanyProspect,
    ) -> Result<(CompanyProspect, bool)> {
        let inserted = sqlx::query_as::<_, CompanyProspect>(
            r#"
            INSERT INTO company_prospects
                (id, tenant_id, run_id, role_mandate_id, name_raw, name_normalized,
                 website_url, hq_country, hq_city, sector, subsector,
                 relevance_score, evidence_score, discovered_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (tenant_id, run_id, name_normalized) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(data.run_id)
        .bind(data.role_mandate_id)
        .bind(&data.name_raw)
        .bind(&data.name_normalized)
        .bind(&data.website_url)
        .bind(&data.hq_country)
        .bind(&data.hq_city)
        .bind(&data.sector)
        .bind(&data.subsector)
        .bind(data.relevance_score)
        .bind(data.evidence_score)
        .bind(&data.discovered_by)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        if let Some(prospect) = inserted {
            return Ok((prospect, true));
        }

        let existing = self
            .get_prospect_by_normalized_name(tenant, data.run_id, &data.name_normalized)
            .await?
            .ok_or_else(|| {
                prospector_common::ProspectorError::Database(
                    "prospect upsert returned no row".into(),
                )
            })?;
        Ok((existing, false))
    }

    async fn get_prospect(
        &self,
        tenant: Uuid,
        prospect_id: Uuid,
    ) -> Result<Option<CompanyProspect>> {
        let prospect = sqlx::query_as::<_, CompanyProspect>(
            "SELECT * FROM company_prospects WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant)
        .bind(prospect_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(prospect)
    }

    async fn get_prospect_by_normalized_name(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        name_normalized: &str,
    ) -> Result<Option<CompanyProspect>> {
        let prospect = sqlx::query_as::<_, CompanyProspect>(
            r#"
            SELECT * FROM company_prospects
            WHERE tenant_id = $1 AND run_id = $2 AND name_normalized = $3
            "#,
        )
        .bind(tenant)
        .bind(run_id)
        .bind(name_normalized)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(prospect)
    }

    async fn list_prospects_for_run(
        &self,
        tenant: Uuid,
        run_id: Uuid,
    ) -> Result<Vec<CompanyProspect>> {
        let prospects = sqlx::query_as::<_, CompanyProspect>(
            r#"
            SELECT * FROM company_prospects
            WHERE tenant_id = $1 AND run_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant)
        .bind(run_id)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(prospects)
    }

    async fn set_discovered_by(
        &self,
        tenant: Uuid,
        prospect_id: Uuid,
        discovered_by: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE company_prospects SET discovered_by = $3 WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant)
        .bind(prospect_id)
        .bind(discovered_by)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn set_review_status(
        &self,
        tenant: Uuid,
        prospect_id: Uuid,
        review_status: &str,
    ) -> Result<Option<CompanyProspect>> {
        let prospect = sqlx::query_as::<_, CompanyProspect>(
            r#"
            UPDATE company_prospects
            SET review_status = $3
            WHERE tenant_id = $1 AND id = $2
            RETURNING *
            "#,
        )
        .bind(tenant)
        .bind(prospect_id)
        .bind(review_status)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(prospect)
    }

    async fn set_exec_search_enabled(
        &self,
        tenant: Uuid,
        prospect_id: Uuid,
        enabled: bool,
    ) -> Result<Option<CompanyProspect>> {
        let prospect = sqlx::query_as::<_, CompanyProspect>(
            r#"
            UPDATE company_prospects
            SET exec_search_enabled = $3
            WHERE tenant_id = $1 AND id = $2
            RETURNING *
            "#,
        )
        .bind(tenant)
        .bind(prospect_id)
        .bind(enabled)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(prospect)
    }

    async fn add_evidence_if_new(
        &self,
        tenant: Uuid,
        data: NewCompanyEvidence,
    ) -> Result<(CompanyProspectEvidence, bool)> {
        // Evidence dedup key: (prospect, source_url, source_name). NULLs
        // compare as equal here so repeated label-only evidence stays single.
        let existing = sqlx::query_as::<_, CompanyProspectEvidence>(
            r#"
            SELECT * FROM company_prospect_evidence
            WHERE tenant_id = $1 AND company_prospect_id = $2
              AND source_url IS NOT DISTINCT FROM $3
              AND source_name IS NOT DISTINCT FROM $4
            LIMIT 1
            "#,
        )
        .bind(tenant)
        .bind(data.company_prospect_id)
        .bind(&data.source_url)
        .bind(&data.source_name)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        if let Some(evidence) = existing {
            return Ok((evidence, false));
        }

        let evidence = sqlx::query_as::<_, CompanyProspectEvidence>(
            r#"
            INSERT INTO company_prospect_evidence
                (id, tenant_id, company_prospect_id, source_type, source_name, source_url,
                 raw_snippet, source_document_id, source_content_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(data.company_prospect_id)
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

    async fn list_evidence_for_prospects(
        &self,
        tenant: Uuid,
        prospect_ids: &[Uuid],
    ) -> Result<Vec<CompanyProspectEvidence>> {
        let evidence = sqlx::query_as::<_, CompanyProspectEvidence>(
            r#"
            SELECT * FROM company_prospect_evidence
            WHERE tenant_id = $1 AND company_prospect_id = ANY($2)
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant)
        .bind(prospect_ids)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(evidence)
    }
}
