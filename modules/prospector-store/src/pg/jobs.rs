use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use prospector_common::{ProspectorError, Result};

use super::{db_err, PgStore};
use crate::records::ResearchJob;
use crate::traits::JobQueueRepo;

#[async_trait]
impl JobQueueRepo for PgStore {
    async fn enqueue_job(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        job_type: &str,
        max_attempts: i32,
    ) -> Result<ResearchJob> {
        let inserted = sqlx::query_as::<_, ResearchJob>(
            r#"
            INSERT INTO research_jobs (id, tenant_id, run_id, job_type, max_attempts)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tenant_id, run_id, job_type) WHERE status IN ('queued', 'running')
                DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(run_id)
        .bind(job_type)
        .bind(max_attempts)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        if let Some(job) = inserted {
            return Ok(job);
        }

        let active = sqlx::query_as::<_, ResearchJob>(
            r#"
            SELECT * FROM research_jobs
            WHERE tenant_id = $1 AND run_id = $2 AND job_type = $3
              AND status IN ('queued', 'running')
            "#,
        )
        .bind(tenant)
        .bind(run_id)
        .bind(job_type)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?
        .ok_or_else(|| ProspectorError::Database("job enqueue returned no row".into()))?;

        Ok(active)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ResearchJob>> {
        let job = sqlx::query_as::<_, ResearchJob>("SELECT * FROM research_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;

        Ok(job)
    }

    async fn claim_next_job(
        &self,
        worker_id: &str,
        stale_lock_secs: i64,
    ) -> Result<Option<ResearchJob>> {
        // Claimable: queued with retry due, or running but abandoned (lock
        // older than the stale threshold). SKIP LOCKED keeps concurrent
        // workers from fighting over the same row.
        let job = sqlx::query_as::<_, ResearchJob>(
            r#"
            UPDATE research_jobs
            SET status = 'running',
                attempt_count = attempt_count + 1,
                locked_by = $1,
                locked_at = now(),
                retry_at = NULL
            WHERE id = (
                SELECT id FROM research_jobs
                WHERE (status = 'queued' AND (retry_at IS NULL OR retry_at <= now()))
                   OR (status = 'running'
                       AND locked_at < now() - make_interval(secs => $2))
                ORDER BY created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .bind(stale_lock_secs as f64)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(job)
    }

    async fn mark_job_succeeded(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE research_jobs
            SET status = 'succeeded', locked_by = NULL, locked_at = NULL, last_error = NULL
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn mark_job_failed(
        &self,
        job_id: Uuid,
        last_error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        match retry_at {
            Some(at) => {
                sqlx::query(
                    r#"
                    UPDATE research_jobs
                    SET status = 'queued', retry_at = $2, last_error = $3,
                        locked_by = NULL, locked_at = NULL
                    WHERE id = $1
                    "#,
                )
                .bind(job_id)
                .bind(at)
                .bind(last_error)
                .execute(self.pool())
                .await
                .map_err(db_err)?;
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE research_jobs
                    SET status = 'failed', retry_at = NULL, last_error = $2,
                        locked_by = NULL, locked_at = NULL
                    WHERE id = $1
                    "#,
                )
                .bind(job_id)
                .bind(last_error)
                .execute(self.pool())
                .await
                .map_err(db_err)?;
            }
        }

        Ok(())
    }

    async fn mark_job_cancelled(&self, job_id: Uuid, reason: Option<&str>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE research_jobs
            SET status = 'cancelled', retry_at = NULL, last_error = $2,
                locked_by = NULL, locked_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(reason)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn request_cancel(&self, tenant: Uuid, run_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE research_jobs
            SET cancel_requested = TRUE
            WHERE tenant_id = $1 AND run_id = $2 AND status IN ('queued', 'running')
            "#,
        )
        .bind(tenant)
        .bind(run_id)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }
}
