//! Run lifecycle: start, retry, cancel, and the plan-lock gate that keeps
//! source attachment out of an in-flight run.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use prospector_common::{ProspectorError, Result, RunStatus};
use prospector_store::{ResearchJob, ResearchRun, ResearchStore, RunStatusUpdate};

use crate::planner::{ensure_plan_and_steps, PlannerConfig};

pub const JOB_TYPE_RESEARCH: &str = "research_run";
pub const JOB_MAX_ATTEMPTS: i32 = 3;

/// Outcome of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The active job was flagged; the worker winds down at its next
    /// between-step checkpoint.
    CancelRequested,
    /// Nothing was queued or running; the run was closed directly.
    NoActiveJob,
    /// The run was already terminal.
    AlreadyTerminal,
}

impl CancelOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CancelRequested => "cancel_requested",
            Self::NoActiveJob => "no_active_job",
            Self::AlreadyTerminal => "already_terminal",
        }
    }
}

async fn require_run<S>(store: &S, tenant: Uuid, run_id: Uuid) -> Result<ResearchRun>
where
    S: ResearchStore + ?Sized,
{
    store
        .get_run(tenant, run_id)
        .await?
        .ok_or(ProspectorError::RunNotFound)
}

/// Reject source attachment once the run's plan is frozen or the run is
/// actively executing. Ingestion entry points call this before any write.
pub async fn ensure_sources_unlocked<S>(store: &S, tenant: Uuid, run_id: Uuid) -> Result<()>
where
    S: ResearchStore + ?Sized,
{
    let run = require_run(store, tenant, run_id).await?;
    if matches!(
        RunStatus::parse(&run.status),
        Some(RunStatus::Queued | RunStatus::Running | RunStatus::CancelRequested)
    ) {
        return Err(ProspectorError::RunLocked);
    }
    if let Some(plan) = store.get_plan(tenant, run_id).await? {
        if plan.locked_at.is_some() {
            return Err(ProspectorError::PlanLocked);
        }
    }
    Ok(())
}

/// Build and freeze the plan, enqueue the background job, and move the run
/// to `queued`. Calling start on an already queued or running run is rejected.
pub async fn start_run<S>(
    store: &S,
    tenant: Uuid,
    run_id: Uuid,
    config: &PlannerConfig,
) -> Result<ResearchJob>
where
    S: ResearchStore + ?Sized,
{
    let run = require_run(store, tenant, run_id).await?;
    if matches!(
        RunStatus::parse(&run.status),
        Some(RunStatus::Queued | RunStatus::Running | RunStatus::CancelRequested)
    ) {
        return Err(ProspectorError::RunLocked);
    }

    ensure_plan_and_steps(store, tenant, run_id, config).await?;
    store.lock_plan(tenant, run_id).await?;
    let job = store
        .enqueue_job(tenant, run_id, JOB_TYPE_RESEARCH, JOB_MAX_ATTEMPTS)
        .await?;
    store
        .set_run_status(
            tenant,
            run_id,
            RunStatusUpdate {
                status: RunStatus::Queued.as_str().to_string(),
                last_error: None,
                started_at: None,
                finished_at: None,
                clear_finished_at: true,
            },
        )
        .await?;

    info!(%run_id, job_id = %job.id, "run queued");
    Ok(job)
}

/// Re-arm a failed or cancelled run: failed steps go back to pending with a
/// fresh attempt budget, then the run is queued again under the same plan.
pub async fn retry_run<S>(
    store: &S,
    tenant: Uuid,
    run_id: Uuid,
    config: &PlannerConfig,
) -> Result<ResearchJob>
where
    S: ResearchStore + ?Sized,
{
    let run = require_run(store, tenant, run_id).await?;
    if matches!(
        RunStatus::parse(&run.status),
        Some(RunStatus::Queued | RunStatus::Running | RunStatus::CancelRequested)
    ) {
        return Err(ProspectorError::RunLocked);
    }

    ensure_plan_and_steps(store, tenant, run_id, config).await?;
    let reset = store.reset_failed_steps(tenant, run_id).await?;
    store.lock_plan(tenant, run_id).await?;
    let job = store
        .enqueue_job(tenant, run_id, JOB_TYPE_RESEARCH, JOB_MAX_ATTEMPTS)
        .await?;
    store
        .set_run_status(
            tenant,
            run_id,
            RunStatusUpdate {
                status: RunStatus::Queued.as_str().to_string(),
                last_error: None,
                started_at: None,
                finished_at: None,
                clear_finished_at: true,
            },
        )
        .await?;

    info!(%run_id, job_id = %job.id, steps_reset = reset, "run requeued for retry");
    Ok(job)
}

/// Cooperative cancellation. Terminal runs are untouched; with no active job
/// the run is closed directly, otherwise the job is flagged and the worker
/// finishes the current step before stopping.
pub async fn cancel_run<S>(store: &S, tenant: Uuid, run_id: Uuid) -> Result<CancelOutcome>
where
    S: ResearchStore + ?Sized,
{
    let run = require_run(store, tenant, run_id).await?;
    if RunStatus::parse(&run.status).map_or(false, |s| s.is_terminal()) {
        return Ok(CancelOutcome::AlreadyTerminal);
    }

    if store.request_cancel(tenant, run_id).await? {
        store
            .set_run_status(
                tenant,
                run_id,
                RunStatusUpdate {
                    status: RunStatus::CancelRequested.as_str().to_string(),
                    ..Default::default()
                },
            )
            .await?;
        info!(%run_id, "cancel requested");
        return Ok(CancelOutcome::CancelRequested);
    }

    store.cancel_pending_steps(tenant, run_id, "run cancelled").await?;
    store
        .set_run_status(
            tenant,
            run_id,
            RunStatusUpdate {
                status: RunStatus::Cancelled.as_str().to_string(),
                finished_at: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await?;
    info!(%run_id, "run cancelled with no active job");
    Ok(CancelOutcome::NoActiveJob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospector_common::SourceType;
    use prospector_store::{
        JobQueueRepo, MemoryStore, NewResearchRun, NewSourceDocument, PlanRepo, RunRepo,
        SourceDocumentRepo,
    };

    async fn seeded_run(store: &MemoryStore, tenant: Uuid) -> Uuid {
        let run_id = store
            .create_run(
                tenant,
                NewResearchRun {
                    role_mandate_id: None,
                    name: "orchestrator".into(),
                    sector: None,
                    region_scope: None,
                    config: None,
                },
            )
            .await
            .unwrap()
            .id;
        store
            .add_source(
                tenant,
                NewSourceDocument {
                    run_id,
                    source_type: SourceType::ManualList.as_str().to_string(),
                    content_text: Some("Acme".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        run_id
    }

    #[tokio::test]
    async fn start_locks_plan_and_queues_exactly_one_job() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;

        let job = start_run(&store, tenant, run_id, &PlannerConfig::default())
            .await
            .unwrap();
        assert_eq!(job.status, "queued");

        let run = store.get_run(tenant, run_id).await.unwrap().unwrap();
        assert_eq!(run.status, "queued");
        let plan = store.get_plan(tenant, run_id).await.unwrap().unwrap();
        assert!(plan.locked_at.is_some());

        // A queued run cannot be started again.
        let err = start_run(&store, tenant, run_id, &PlannerConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "run_locked");
    }

    #[tokio::test]
    async fn locked_plan_rejects_new_sources() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        assert!(ensure_sources_unlocked(&store, tenant, run_id).await.is_ok());

        start_run(&store, tenant, run_id, &PlannerConfig::default())
            .await
            .unwrap();
        let err = ensure_sources_unlocked(&store, tenant, run_id).await.unwrap_err();
        assert_eq!(err.code(), "run_locked");
    }

    #[tokio::test]
    async fn cancel_without_job_closes_the_run() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;

        let outcome = cancel_run(&store, tenant, run_id).await.unwrap();
        assert_eq!(outcome, CancelOutcome::NoActiveJob);
        let run = store.get_run(tenant, run_id).await.unwrap().unwrap();
        assert_eq!(run.status, "cancelled");

        // Terminal now: cancel again is a no-op.
        let outcome = cancel_run(&store, tenant, run_id).await.unwrap();
        assert_eq!(outcome, CancelOutcome::AlreadyTerminal);
    }

    #[tokio::test]
    async fn cancel_with_active_job_flags_it() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        let job = start_run(&store, tenant, run_id, &PlannerConfig::default())
            .await
            .unwrap();

        let outcome = cancel_run(&store, tenant, run_id).await.unwrap();
        assert_eq!(outcome, CancelOutcome::CancelRequested);
        let job = store.get_job(job.id).await.unwrap().unwrap();
        assert!(job.cancel_requested);
        let run = store.get_run(tenant, run_id).await.unwrap().unwrap();
        assert_eq!(run.status, "cancel_requested");
    }

    #[tokio::test]
    async fn missing_run_is_reported() {
        let store = MemoryStore::new();
        let err = start_run(&store, Uuid::new_v4(), Uuid::new_v4(), &PlannerConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "run_not_found");
    }
}
