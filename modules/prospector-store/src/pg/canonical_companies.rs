use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use prospector_common::{ProspectorError, Result};

use super::{db_err, PgStore};
use crate::records::{
    CanonicalCompany, CanonicalCompanyDomain, CanonicalCompanyLink, NewCanonicalCompany,
    NewCanonicalCompanyLink,
};
use crate::traits::CanonicalCompanyRepo;

#[async_trait]
impl CanonicalCompanyRepo for PgStore {
    async fn get_company_by_domain(
        &self,
        tenant: Uuid,
        domain: &str,
    ) -> Result<Option<CanonicalCompany>> {
        let company = sqlx::query_as::<_, CanonicalCompany>(
            r#"
            SELECT c.* FROM canonical_companies c
            JOIN canonical_company_domains d ON d.canonical_company_id = c.id
            WHERE c.tenant_id = $1 AND d.domain = $2
            "#,
        )
        .bind(tenant)
        .bind(domain)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(company)
    }

    async fn get_company_by_name_country(
        &self,
        tenant: Uuid,
        name_normalized: &str,
        country_code: &str,
    ) -> Result<Option<CanonicalCompany>> {
        let company = sqlx::query_as::<_, CanonicalCompany>(
            r#"
            SELECT * FROM canonical_companies
            WHERE tenant_id = $1 AND lower(canonical_name) = $2 AND country_code = $3
            LIMIT 1
            "#,
        )
        .bind(tenant)
        .bind(name_normalized)
        .bind(country_code)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(company)
    }

    async fn create_company(
        &self,
        tenant: Uuid,
        data: NewCanonicalCompany,
    ) -> Result<CanonicalCompany> {
        let company = sqlx::query_as::<_, CanonicalCompany>(
            r#"
            INSERT INTO canonical_companies
                (id, tenant_id, canonical_name, primary_domain, country_code)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(&data.canonical_name)
        .bind(&data.primary_domain)
        .bind(&data.country_code)
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;

        Ok(company)
    }

    async fn upsert_company_domain(
        &self,
        tenant: Uuid,
        canonical_company_id: Uuid,
        domain: &str,
    ) -> Result<CanonicalCompanyDomain> {
        let inserted = sqlx::query_as::<_, CanonicalCompanyDomain>(
            r#"
            INSERT INTO canonical_company_domains (id, tenant_id, canonical_company_id, domain)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id, domain) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(canonical_company_id)
        .bind(domain)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        if let Some(row) = inserted {
            return Ok(row);
        }

        let existing = sqlx::query_as::<_, CanonicalCompanyDomain>(
            "SELECT * FROM canonical_company_domains WHERE tenant_id = $1 AND domain = $2",
        )
        .bind(tenant)
        .bind(domain)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?
        .ok_or_else(|| ProspectorError::Database("company domain upsert returned no row".into()))?;

        Ok(existing)
    }

    async fn upsert_company_link(
        &self,
        tenant: Uuid,
        data: NewCanonicalCompanyLink,
    ) -> Result<(CanonicalCompanyLink, bool)> {
        let inserted = sqlx::query_as::<_, CanonicalCompanyLink>(
            r#"
            INSERT INTO canonical_company_links
                (id, tenant_id, canonical_company_id, company_entity_id, match_rule,
                 evidence_source_document_id, evidence_run_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tenant_id, canonical_company_id, company_entity_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(data.canonical_company_id)
        .bind(data.company_entity_id)
        .bind(&data.match_rule)
        .bind(data.evidence_source_document_id)
        .bind(data.evidence_run_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        if let Some(link) = inserted {
            return Ok((link, true));
        }

        let existing = sqlx::query_as::<_, CanonicalCompanyLink>(
            r#"
            SELECT * FROM canonical_company_links
            WHERE tenant_id = $1 AND canonical_company_id = $2 AND company_entity_id = $3
            "#,
        )
        .bind(tenant)
        .bind(data.canonical_company_id)
        .bind(data.company_entity_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?
        .ok_or_else(|| ProspectorError::Database("company link upsert returned no row".into()))?;

        Ok((existing, false))
    }

    async fn list_company_links(&self, tenant: Uuid) -> Result<Vec<CanonicalCompanyLink>> {
        let links = sqlx::query_as::<_, CanonicalCompanyLink>(
            "SELECT * FROM canonical_company_links WHERE tenant_id = $1 ORDER BY created_at ASC",
        )
        .bind(tenant)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(links)
    }

    async fn count_companies(&self, tenant: Uuid) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT count(*) FROM canonical_companies WHERE tenant_id = $1")
                .bind(tenant)
                .fetch_one(self.pool())
                .await
                .map_err(db_err)?;

        Ok(count.0)
    }

    async fn canonical_ids_for_prospects(
        &self,
        tenant: Uuid,
        prospect_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Uuid>> {
        let rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
            r#"
            SELECT company_entity_id, canonical_company_id
            FROM canonical_company_links
            WHERE tenant_id = $1 AND company_entity_id = ANY($2)
            "#,
        )
        .bind(tenant)
        .bind(prospect_ids)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().collect())
    }
}
