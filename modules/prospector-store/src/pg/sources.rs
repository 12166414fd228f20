use async_trait::async_trait;
use uuid::Uuid;

use prospector_common::{canonical, normalize, ProspectorError, Result};

use super::{db_err, PgStore};
use crate::records::{NewSourceDocument, SourceDocument};
use crate::traits::SourceDocumentRepo;

/// Back-fill derived fields before insert: content hash (bytes preferred),
/// normalized URL, content size. Never errors; invalid URLs simply leave
/// url_normalized unset (validation is the pipelines' job).
pub(crate) fn backfill(mut data: NewSourceDocument) -> NewSourceDocument {
    if data.content_hash.is_none() {
        if let Some(bytes) = &data.content_bytes {
            data.content_hash = Some(canonical::sha256_hex(bytes));
        } else if let Some(text) = &data.content_text {
            data.content_hash = Some(canonical::sha256_hex(text.as_bytes()));
        }
    }
    if data.url_normalized.is_none() {
        if let Some(url) = &data.url {
            data.url_normalized = normalize::normalize_url(url).ok();
        }
    }
    if data.content_size.is_none() {
        if let Some(bytes) = &data.content_bytes {
            data.content_size = Some(bytes.len() as i64);
        }
    }
    data
}

#[async_trait]
impl SourceDocumentRepo for PgStore {
    async fn add_source(&self, tenant: Uuid, data: NewSourceDocument) -> Result<SourceDocument> {
        let data = backfill(data);

        let source = sqlx::query_as::<_, SourceDocument>(
            r#"
            INSERT INTO source_documents
                (id, tenant_id, run_id, source_type, title, url, url_normalized,
                 content_text, content_bytes, content_size, content_hash, status, meta)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'new', $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(data.run_id)
        .bind(&data.source_type)
        .bind(&data.title)
        .bind(&data.url)
        .bind(&data.url_normalized)
        .bind(&data.content_text)
        .bind(&data.content_bytes)
        .bind(data.content_size)
        .bind(&data.content_hash)
        .bind(&data.meta)
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;

        Ok(source)
    }

    async fn add_source_if_new(
        &self,
        tenant: Uuid,
        data: NewSourceDocument,
    ) -> Result<(SourceDocument, bool)> {
        let data = backfill(data);

        let inserted = sqlx::query_as::<_, SourceDocument>(
            r#"
            INSERT INTO source_documents
                (id, tenant_id, run_id, source_type, title, url, url_normalized,
                 content_text, content_bytes, content_size, content_hash, status, meta)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'new', $12)
            ON CONFLICT (tenant_id, run_id, content_hash)
                WHERE source_type = 'llm_json'
                DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(data.run_id)
        .bind(&data.source_type)
        .bind(&data.title)
        .bind(&data.url)
        .bind(&data.url_normalized)
        .bind(&data.content_text)
        .bind(&data.content_bytes)
        .bind(data.content_size)
        .bind(&data.content_hash)
        .bind(&data.meta)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        if let Some(source) = inserted {
            return Ok((source, true));
        }
        let hash = data.content_hash.as_deref().unwrap_or_default();
        let existing = self
            .find_llm_json_by_hash(tenant, data.run_id, hash)
            .await?
            .ok_or_else(|| {
                ProspectorError::Database("conflicting source row disappeared".into())
            })?;
        Ok((existing, false))
    }

    async fn get_source(&self, tenant: Uuid, source_id: Uuid) -> Result<Option<SourceDocument>> {
        let source = sqlx::query_as::<_, SourceDocument>(
            "SELECT * FROM source_documents WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant)
        .bind(source_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(source)
    }

    async fn list_sources_for_run(
        &self,
        tenant: Uuid,
        run_id: Uuid,
    ) -> Result<Vec<SourceDocument>> {
        let sources = sqlx::query_as::<_, SourceDocument>(
            r#"
            SELECT * FROM source_documents
            WHERE tenant_id = $1 AND run_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant)
        .bind(run_id)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(sources)
    }

    async fn list_sources_by_status(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        source_type: &str,
        status: &str,
    ) -> Result<Vec<SourceDocument>> {
        let sources = sqlx::query_as::<_, SourceDocument>(
            r#"
            SELECT * FROM source_documents
            WHERE tenant_id = $1 AND run_id = $2 AND source_type = $3 AND status = $4
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant)
        .bind(run_id)
        .bind(source_type)
        .bind(status)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(sources)
    }

    async fn find_llm_json_by_hash(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        content_hash: &str,
    ) -> Result<Option<SourceDocument>> {
        let source = sqlx::query_as::<_, SourceDocument>(
            r#"
            SELECT * FROM source_documents
            WHERE tenant_id = $1 AND run_id = $2
              AND source_type = 'llm_json' AND content_hash = $3
            LIMIT 1
            "#,
        )
        .bind(tenant)
        .bind(run_id)
        .bind(content_hash)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(source)
    }

    async fn url_source_exists(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        url_normalized: &str,
    ) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM source_documents
            WHERE tenant_id = $1 AND run_id = $2
              AND source_type = 'url' AND url_normalized = $3
            "#,
        )
        .bind(tenant)
        .bind(run_id)
        .bind(url_normalized)
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;

        Ok(count > 0)
    }

    async fn set_source_status(
        &self,
        tenant: Uuid,
        source_id: Uuid,
        status: &str,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE source_documents
            SET status = $3, error_message = $4
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant)
        .bind(source_id)
        .bind(status)
        .bind(error_message)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn set_source_content(
        &self,
        tenant: Uuid,
        source_id: Uuid,
        content_text: &str,
        content_hash: &str,
        status: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE source_documents
            SET content_text = $3,
                content_hash = $4,
                content_size = $5,
                status = $6,
                error_message = NULL
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant)
        .bind(source_id)
        .bind(content_text)
        .bind(content_hash)
        .bind(content_text.len() as i64)
        .bind(status)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }
}
