use async_trait::async_trait;
use uuid::Uuid;

use prospector_common::Result;

use super::{db_err, PgStore};
use crate::records::{NewResearchRun, ResearchRun, RunStatusUpdate};
use crate::traits::RunRepo;

#[async_trait]
impl RunRepo for PgStore {
    async fn create_run(&self, tenant: Uuid, data: NewResearchRun) -> Result<ResearchRun> {
        let run = sqlx::query_as::<_, ResearchRun>(
            r#"
            INSERT INTO research_runs
                (id, tenant_id, role_mandate_id, name, status, sector, region_scope, config)
            VALUES ($1, $2, $3, $4, 'planned', $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(data.role_mandate_id)
        .bind(&data.name)
        .bind(&data.sector)
        .bind(&data.region_scope)
        .bind(&data.config)
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;

        Ok(run)
    }

    async fn get_run(&self, tenant: Uuid, run_id: Uuid) -> Result<Option<ResearchRun>> {
        let run = sqlx::query_as::<_, ResearchRun>(
            "SELECT * FROM research_runs WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant)
        .bind(run_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(run)
    }

    async fn set_run_status(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        update: RunStatusUpdate,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE research_runs
            SET status = $3,
                last_error = $4,
                started_at = COALESCE($5, started_at),
                finished_at = CASE WHEN $7 THEN NULL ELSE COALESCE($6, finished_at) END
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant)
        .bind(run_id)
        .bind(&update.status)
        .bind(&update.last_error)
        .bind(update.started_at)
        .bind(update.finished_at)
        .bind(update.clear_finished_at)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }
}
