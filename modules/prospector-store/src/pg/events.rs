use async_trait::async_trait;
use uuid::Uuid;

use prospector_common::Result;

use super::{db_err, PgStore};
use crate::records::{ActivityLogEntry, NewActivityEntry, NewResearchEvent, ResearchEvent};
use crate::traits::EventRepo;

#[async_trait]
impl EventRepo for PgStore {
    async fn append_event(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        data: NewResearchEvent,
    ) -> Result<ResearchEvent> {
        let event = sqlx::query_as::<_, ResearchEvent>(
            r#"
            INSERT INTO research_events (id, tenant_id, run_id, event_type, status, message, meta)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(run_id)
        .bind(&data.event_type)
        .bind(&data.status)
        .bind(&data.message)
        .bind(&data.meta)
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;

        Ok(event)
    }

    async fn list_events_for_run(
        &self,
        tenant: Uuid,
        run_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ResearchEvent>> {
        let events = sqlx::query_as::<_, ResearchEvent>(
            r#"
            SELECT * FROM research_events
            WHERE tenant_id = $1 AND run_id = $2
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(tenant)
        .bind(run_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(events)
    }

    async fn append_activity(
        &self,
        tenant: Uuid,
        data: NewActivityEntry,
    ) -> Result<ActivityLogEntry> {
        let entry = sqlx::query_as::<_, ActivityLogEntry>(
            r#"
            INSERT INTO activity_log (id, tenant_id, actor, action, entity_type, entity_id, detail)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(&data.actor)
        .bind(&data.action)
        .bind(&data.entity_type)
        .bind(data.entity_id)
        .bind(&data.detail)
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;

        Ok(entry)
    }

    async fn list_activity_for_entity(
        &self,
        tenant: Uuid,
        entity_id: Uuid,
    ) -> Result<Vec<ActivityLogEntry>> {
        let entries = sqlx::query_as::<_, ActivityLogEntry>(
            r#"
            SELECT * FROM activity_log
            WHERE tenant_id = $1 AND entity_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant)
        .bind(entity_id)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        Ok(entries)
    }
}
