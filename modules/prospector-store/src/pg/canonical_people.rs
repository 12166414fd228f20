use async_trait::async_trait;
use uuid::Uuid;

use prospector_common::{ProspectorError, Result};

use super::{db_err, PgStore};
use crate::records::{
    CanonicalPerson, CanonicalPersonEmail, CanonicalPersonLink, NewCanonicalPerson,
    NewCanonicalPersonLink,
};
use crate::traits::CanonicalPersonRepo;

#[async_trait]
impl CanonicalPersonRepo for PgStore {
    async fn get_person_by_email(
        &self,
        tenant: Uuid,
        email: &str,
    ) -> Result<Option<CanonicalPerson>> {
        let person = sqlx::query_as::<_, CanonicalPerson>(
            r#"
            SELECT p.* FROM canonical_people p
            JOIN canonical_person_emails e ON e.canonical_person_id = p.id
            WHERE p.tenant_id = $1 AND e.email = $2
            "#,
        )
        .bind(tenant)
        .bind(email)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(person)
    }

    async fn create_person(
        &self,
        tenant: Uuid,
        data: NewCanonicalPerson,
    ) -> Result<CanonicalPerson> {
        let person = sqlx::query_as::<_, CanonicalPerson>(
            r#"
            INSERT INTO canonical_people
                (id, tenant_id, canonical_full_name, primary_email, primary_linkedin_url)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(&data.canonical_full_name)
        .bind(&data.primary_email)
        .bind(&data.primary_linkedin_url)
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;

        Ok(person)
    }

    async fn upsert_person_email(
        &self,
        tenant: Uuid,
        canonical_person_id: Uuid,
        email: &str,
    ) -> Result<CanonicalPersonEmail> {
        let inserted = sqlx::query_as::<_, CanonicalPersonEmail>(
            r#"
            INSERT INTO canonical_person_emails (id, tenant_id, canonical_person_id, email)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id, email) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(canonical_person_id)
        .bind(email)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        if let Some(row) = inserted {
            return Ok(row);
        }

        // The email is already bound; return the winning binding.
        let existing = sqlx::query_as::<_, CanonicalPersonEmail>(
            "SELECT * FROM canonical_person_emails WHERE tenant_id = $1 AND email = $2",
        )
        .bind(tenant)
        .bind(email)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?
        .ok_or_else(|| ProspectorError::Database("person email upsert returned no row".into()))?;

        Ok(existing)
    }

    async fn upsert_person_link(
        &self,
        tenant: Uuid,
        data: NewCanonicalPersonLink,
    ) -> Result<(CanonicalPersonLink, bool)> {
        let inserted = sqlx::query_as::<_, CanonicalPersonLink>(
            r#"
            INSERT INTO canonical_person_links
                (id, tenant_id, canonical_person_id, person_entity_id, match_rule,
                 evidence_source_document_id, evidence_run_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tenant_id, canonical_person_id, person_entity_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(data.canonical_person_id)
        .bind(data.person_entity_id)
        .bind(&data.match_rule)
        .bind(data.evidence_source_document_id)
        .bind(data.evidence_run_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        if let Some(link) = inserted {
            return Ok((link, true));
        }

        let existing = sqlx::query_as::<_, CanonicalPersonLink>(
            r#"
            SELECT * FROM canonical_person_links
            WHERE tenant_id = $1 AND canonical_person_id = $2 AND person_entity_id = $3
            "#,
        )
        .bind(tenant)
        .bind(data.canonical_person_id)
        .bind(data.person_entity_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?
        .ok_or_else(|| ProspectorError::Database("person link upsert returned no row".into()))?;

        Ok((existing, false))
    }

    async fn list_person_links(&self, tenant: Uuid) -> Result<Vec<CanonicalPersonLink>> {
        let links = sqlx::query_as::<_, CanonicalPersonLink>(
            "SELECT * FROM canonical_person_links WHERE tenant_id = $1 ORDER BY created_at ASC",
        )
        .bind(tenant)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(links)
    }

    async fn count_people(&self, tenant: Uuid) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT count(*) FROM canonical_people WHERE tenant_id = $1")
                .bind(tenant)
                .fetch_one(self.pool())
                .await
                .map_err(db_err)?;

        Ok(count.0)
    }

    async fn find_person_by_name_company(
        &self,
        tenant: Uuid,
        name_normalized: &str,
        company_prospect_id: Uuid,
    ) -> Result<(Option<CanonicalPerson>, bool)> {
        let people = sqlx::query_as::<_, CanonicalPerson>(
            r#"
            SELECT DISTINCT p.* FROM canonical_people p
            JOIN canonical_person_links l ON l.canonical_person_id = p.id
            JOIN executive_prospects x ON x.id = l.person_entity_id
            WHERE p.tenant_id = $1
              AND x.name_normalized = $2
              AND x.company_prospect_id = $3
            "#,
        )
        .bind(tenant)
        .bind(name_normalized)
        .bind(company_prospect_id)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        let ambiguous = people.len() > 1;
        Ok((people.into_iter().next(), ambiguous))
    }
}
