use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use prospector_common::Result;

use super::{db_err, PgStore};
use crate::records::{NewRunStep, ResearchRunPlan, ResearchRunStep};
use crate::traits::PlanRepo;

#[async_trait]
impl PlanRepo for PgStore {
    async fn get_plan(&self, tenant: Uuid, run_id: Uuid) -> Result<Option<ResearchRunPlan>> {
        let plan = sqlx::query_as::<_, ResearchRunPlan>(
            "SELECT * FROM research_run_plans WHERE tenant_id = $1 AND run_id = $2",
        )
        .bind(tenant)
        .bind(run_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(plan)
    }

    async fn create_plan_if_missing(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        plan_json: Value,
        version: i32,
    ) -> Result<ResearchRunPlan> {
        let inserted = sqlx::query_as::<_, ResearchRunPlan>(
            r#"
            INSERT INTO research_run_plans (id, tenant_id, run_id, version, plan_json)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tenant_id, run_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(run_id)
        .bind(version)
        .bind(&plan_json)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        if let Some(plan) = inserted {
            return Ok(plan);
        }

        // Lost the race (or plan already existed) — return the winner.
        let existing = self.get_plan(tenant, run_id).await?;
        existing.ok_or_else(|| {
            prospector_common::ProspectorError::Database("plan upsert returned no row".into())
        })
    }

    async fn lock_plan(&self, tenant: Uuid, run_id: Uuid) -> Result<Option<ResearchRunPlan>> {
        let plan = sqlx::query_as::<_, ResearchRunPlan>(
            r#"
            UPDATE research_run_plans
            SET locked_at = COALESCE(locked_at, now())
            WHERE tenant_id = $1 AND run_id = $2
            RETURNING *
            "#,
        )
        .bind(tenant)
        .bind(run_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(plan)
    }

    async fn upsert_steps(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        steps: Vec<NewRunStep>,
    ) -> Result<Vec<ResearchRunStep>> {
        for step in &steps {
            sqlx::query(
                r#"
                INSERT INTO research_run_steps
                    (id, tenant_id, run_id, step_key, step_order, status, max_attempts, input_json)
                VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7)
                ON CONFLICT (tenant_id, run_id, step_key) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(tenant)
            .bind(run_id)
            .bind(&step.step_key)
            .bind(step.step_order)
            .bind(step.max_attempts)
            .bind(&step.input_json)
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        }

        self.list_steps(tenant, run_id).await
    }

    async fn list_steps(&self, tenant: Uuid, run_id: Uuid) -> Result<Vec<ResearchRunStep>> {
        let steps = sqlx::query_as::<_, ResearchRunStep>(
            r#"
            SELECT * FROM research_run_steps
            WHERE tenant_id = $1 AND run_id = $2
            ORDER BY step_order
            "#,
        )
        .bind(tenant)
        .bind(run_id)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(steps)
    }

    async fn claim_next_step(
        &self,
        tenant: Uuid,
        run_id: Uuid,
    ) -> Result<Option<ResearchRunStep>> {
        let step = sqlx::query_as::<_, ResearchRunStep>(
            r#"
            UPDATE research_run_steps
            SET status = 'running',
                attempt_count = attempt_count + 1,
                started_at = COALESCE(started_at, now()),
                next_retry_at = NULL
            WHERE id = (
                SELECT id FROM research_run_steps
                WHERE tenant_id = $1 AND run_id = $2
                  AND status IN ('pending', 'failed')
                  AND attempt_count < max_attempts
                  AND (next_retry_at IS NULL OR next_retry_at <= now())
                ORDER BY step_order
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(tenant)
        .bind(run_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        Ok(step)
    }

    async fn mark_step_ok(&self, step_id: Uuid, output_json: Option<Value>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE research_run_steps
            SET status = 'ok', finished_at = now(), output_json = COALESCE($2, output_json)
            WHERE id = $1
            "#,
        )
        .bind(step_id)
        .bind(&output_json)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn mark_step_failed(
        &self,
        step_id: Uuid,
        last_error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE research_run_steps
            SET status = 'failed', last_error = $2, finished_at = now(), next_retry_at = $3
            WHERE id = $1
            "#,
        )
        .bind(step_id)
        .bind(last_error)
        .bind(next_retry_at)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn cancel_pending_steps(&self, tenant: Uuid, run_id: Uuid, reason: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE research_run_steps
            SET status = 'cancelled', last_error = $3, finished_at = now()
            WHERE tenant_id = $1 AND run_id = $2
              AND status IN ('pending', 'running', 'failed')
            "#,
        )
        .bind(tenant)
        .bind(run_id)
        .bind(reason)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }

    async fn reset_failed_steps(&self, tenant: Uuid, run_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE research_run_steps
            SET status = 'pending', attempt_count = 0, last_error = NULL,
                next_retry_at = NULL, finished_at = NULL
            WHERE tenant_id = $1 AND run_id = $2 AND status IN ('failed', 'cancelled')
            "#,
        )
        .bind(tenant)
        .bind(run_id)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }
}
