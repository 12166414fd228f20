//! Background job execution.
//!
//! Workers are stateless: they poll the durable job queue, claim one job at a
//! time, and walk the run's step list in order. Cancellation is checked
//! between steps, never inside one. A failing step retries within its own
//! attempt budget; a step that exhausts it fails the job attempt, which backs
//! off exponentially until the job's own budget runs out.

use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use regex::Regex;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use prospector_common::{Config, Result, RunStatus, SourceStatus, SourceType};
use prospector_store::{
    NewResearchEvent, ResearchJob, ResearchStore, RunStatusUpdate,
};

use crate::pipeline::fetch::{fetch_url_sources, SourceFetcher};
use crate::pipeline::llm_companies::process_pending_company_sources;
use crate::pipeline::manual_lists::process_pending_lists;
use crate::pipeline::process_sources::{extract_company_candidates, process_pending_sources};
use crate::pipeline::proposals::{ingest_proposals, ProposalParser};
use crate::planner::{
    PlannerConfig, STEP_CLASSIFY, STEP_COMPANIES, STEP_ENTITIES, STEP_EXTERNAL_LLM, STEP_EXTRACT,
    STEP_FETCH, STEP_FINALIZE, STEP_LISTS, STEP_PEOPLE, STEP_PROCESS, STEP_PROPOSALS,
};
use crate::resolution::companies::resolve_canonical_companies;
use crate::resolution::entities::resolve_run_entities;
use crate::resolution::people::resolve_canonical_people;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").unwrap());

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub poll_secs: u64,
    pub stale_lock_secs: i64,
    pub base_backoff_secs: i64,
    pub backoff_multiplier: f64,
    pub planner: PlannerConfig,
}

impl WorkerConfig {
    pub fn from_config(config: &Config, worker_id: String) -> Self {
        Self {
            worker_id,
            poll_secs: config.worker_poll_secs,
            stale_lock_secs: config.job_stale_lock_secs,
            base_backoff_secs: config.job_base_backoff_secs,
            backoff_multiplier: config.job_backoff_multiplier,
            planner: PlannerConfig {
                external_llm_enabled: config.external_llm_enabled,
                ..PlannerConfig::default()
            },
        }
    }
}

/// Exponential backoff for attempt N (1-based): `base * multiplier^(N-1)`.
pub fn backoff_delay(base_secs: i64, multiplier: f64, attempt: i32) -> Duration {
    let exponent = attempt.saturating_sub(1).max(0);
    let secs = base_secs as f64 * multiplier.powi(exponent);
    Duration::seconds(secs.round() as i64)
}

pub struct Worker<S: ?Sized> {
    store: Arc<S>,
    fetcher: Box<dyn SourceFetcher>,
    parser: Box<dyn ProposalParser>,
    config: WorkerConfig,
}

impl<S> Worker<S>
where
    S: ResearchStore + ?Sized,
{
    pub fn new(
        store: Arc<S>,
        fetcher: Box<dyn SourceFetcher>,
        parser: Box<dyn ProposalParser>,
        config: WorkerConfig,
    ) -> Self {
        Self { store, fetcher, parser, config }
    }

    /// Poll until the process is stopped. Claim errors are logged and retried
    /// after the poll interval rather than tearing the worker down.
    pub async fn run(&self) {
        info!(worker_id = %self.config.worker_id, "worker started");
        loop {
            match self.run_once().await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::time::sleep(StdDuration::from_secs(self.config.poll_secs)).await;
                }
                Err(err) => {
                    error!(error = %err, "worker iteration failed");
                    tokio::time::sleep(StdDuration::from_secs(self.config.poll_secs)).await;
                }
            }
        }
    }

    /// Claim and execute at most one job. Returns whether a job was claimed.
    pub async fn run_once(&self) -> Result<bool> {
        let Some(job) = self
            .store
            .claim_next_job(&self.config.worker_id, self.config.stale_lock_secs)
            .await?
        else {
            return Ok(false);
        };
        self.execute_job(job).await?;
        Ok(true)
    }

    async fn execute_job(&self, job: ResearchJob) -> Result<()> {
        let store = &*self.store;
        let tenant = job.tenant_id;
        let run_id = job.run_id;
        info!(job_id = %job.id, %run_id, attempt = job.attempt_count, "job claimed");

        store
            .append_event(
                tenant,
                run_id,
                NewResearchEvent {
                    event_type: "worker_claimed".to_string(),
                    status: "ok".to_string(),
                    message: Some(self.config.worker_id.clone()),
                    meta: Some(json!({ "attempt": job.attempt_count })),
                },
            )
            .await?;

        let run = store.get_run(tenant, run_id).await?;
        let started_at = match &run {
            Some(run) if run.started_at.is_none() => Some(Utc::now()),
            Some(_) => None,
            None => {
                // Run row gone; nothing to retry against.
                store.mark_job_failed(job.id, "run not found", None).await?;
                return Ok(());
            }
        };
        store
            .set_run_status(
                tenant,
                run_id,
                RunStatusUpdate {
                    status: RunStatus::Running.as_str().to_string(),
                    started_at,
                    ..Default::default()
                },
            )
            .await?;

        loop {
            // Cooperative cancel checkpoint between steps.
            let current = store.get_job(job.id).await?;
            if current.map_or(false, |j| j.cancel_requested) {
                return self.finish_cancelled(&job).await;
            }

            let Some(step) = store.claim_next_step(tenant, run_id).await? else {
                break;
            };
            info!(step = %step.step_key, attempt = step.attempt_count, "step claimed");

            match self.execute_step(tenant, run_id, &step.step_key).await {
                Ok(output) => {
                    store.mark_step_ok(step.id, output).await?;
                }
                Err(err) => {
                    let message = crate::pipeline::truncate_error(&err.to_string());
                    warn!(step = %step.step_key, error = %message, "step failed");
                    if step.attempt_count < step.max_attempts {
                        // Immediately eligible again; the loop re-claims it
                        // before any higher-ordered step.
                        store
                            .mark_step_failed(step.id, &message, Some(Utc::now()))
                            .await?;
                    } else {
                        store.mark_step_failed(step.id, &message, None).await?;
                        return self.finish_failed(&job, &message).await;
                    }
                }
            }
        }

        // A step may have burned its whole budget inside this loop.
        let steps = store.list_steps(tenant, run_id).await?;
        if let Some(failed) = steps.iter().find(|s| s.status == "failed") {
            let message = failed
                .last_error
                .clone()
                .unwrap_or_else(|| format!("step {} failed", failed.step_key));
            return self.finish_failed(&job, &message).await;
        }

        self.finish_succeeded(&job).await
    }

    async fn execute_step(&self, tenant: Uuid, run_id: Uuid, step_key: &str) -> Result<Option<Value>> {
        let store = &*self.store;
        let output = match step_key {
            STEP_EXTERNAL_LLM => {
                step_output(&process_pending_company_sources(store, tenant, run_id).await?)?
            }
            STEP_FETCH => {
                step_output(&fetch_url_sources(store, tenant, run_id, &*self.fetcher).await?)?
            }
            STEP_EXTRACT => Some(self.extract_sources(tenant, run_id).await?),
            STEP_CLASSIFY => Some(self.classify_sources(tenant, run_id).await?),
            STEP_PROCESS => step_output(&process_pending_sources(store, tenant, run_id).await?)?,
            STEP_ENTITIES => step_output(&resolve_run_entities(store, tenant, run_id).await?)?,
            STEP_PEOPLE => step_output(&resolve_canonical_people(store, tenant, run_id).await?)?,
            STEP_COMPANIES => {
                step_output(&resolve_canonical_companies(store, tenant, run_id).await?)?
            }
            STEP_LISTS => step_output(&process_pending_lists(store, tenant, run_id).await?)?,
            STEP_PROPOSALS => {
                step_output(&ingest_proposals(store, tenant, run_id, &*self.parser).await?)?
            }
            STEP_FINALIZE => Some(self.finalize_summary(tenant, run_id).await?),
            other => {
                warn!(step = other, "unknown step key; skipping");
                None
            }
        };
        Ok(output)
    }

    /// Strip markup out of fetched url sources so extraction sees plain text.
    async fn extract_sources(&self, tenant: Uuid, run_id: Uuid) -> Result<Value> {
        let store = &*self.store;
        let fetched = store
            .list_sources_by_status(
                tenant,
                run_id,
                SourceType::Url.as_str(),
                SourceStatus::Fetched.as_str(),
            )
            .await?;
        let mut cleaned = 0u64;
        for source in &fetched {
            let Some(text) = source.content_text.as_deref() else { continue };
            if !text.contains('<') {
                continue;
            }
            let plain = strip_html(text);
            let hash = source.content_hash.clone().unwrap_or_default();
            store
                .set_source_content(tenant, source.id, &plain, &hash, SourceStatus::Fetched.as_str())
                .await?;
            cleaned += 1;
        }
        Ok(json!({ "sources_seen": fetched.len(), "sources_cleaned": cleaned }))
    }

    /// Read-only pass over textual sources: report how list-like each one
    /// looks so reviewers can see what extraction will work with.
    async fn classify_sources(&self, tenant: Uuid, run_id: Uuid) -> Result<Value> {
        let store = &*self.store;
        let sources = store.list_sources_for_run(tenant, run_id).await?;
        let mut classified = Vec::new();
        for source in sources {
            if source.source_type != SourceType::Url.as_str()
                && source.source_type != SourceType::Text.as_str()
            {
                continue;
            }
            let Some(text) = source.content_text.as_deref() else { continue };
            let lines = text.lines().filter(|l| !l.trim().is_empty()).count();
            let candidates = extract_company_candidates(text).len();
            let kind = if lines > 0 && candidates * 2 >= lines { "list" } else { "prose" };
            classified.push(json!({
                "source_id": source.id,
                "lines": lines,
                "candidates": candidates,
                "kind": kind,
            }));
        }
        Ok(json!({ "classified": classified }))
    }

    async fn finalize_summary(&self, tenant: Uuid, run_id: Uuid) -> Result<Value> {
        let store = &*self.store;
        let prospects = store.list_prospects_for_run(tenant, run_id).await?;
        let executives = store.list_executives_for_run(tenant, run_id).await?;
        let unreviewed = prospects.iter().filter(|p| p.review_status == "new").count();
        Ok(json!({
            "prospects": prospects.len(),
            "executives": executives.len(),
            "unreviewed": unreviewed,
        }))
    }

    async fn finish_succeeded(&self, job: &ResearchJob) -> Result<()> {
        let store = &*self.store;
        store.mark_job_succeeded(job.id).await?;

        // Unreviewed prospects hold the run at the review gate.
        let prospects = store.list_prospects_for_run(job.tenant_id, job.run_id).await?;
        let unreviewed = prospects.iter().filter(|p| p.review_status == "new").count();
        let status = if unreviewed > 0 { RunStatus::NeedsReview } else { RunStatus::Succeeded };
        store
            .set_run_status(
                job.tenant_id,
                job.run_id,
                RunStatusUpdate {
                    status: status.as_str().to_string(),
                    finished_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;
        store
            .append_event(
                job.tenant_id,
                job.run_id,
                NewResearchEvent {
                    event_type: "worker_completed".to_string(),
                    status: "ok".to_string(),
                    message: None,
                    meta: Some(json!({ "final_status": status.as_str(), "unreviewed": unreviewed })),
                },
            )
            .await?;
        info!(run_id = %job.run_id, status = status.as_str(), "job complete");
        Ok(())
    }

    async fn finish_failed(&self, job: &ResearchJob, message: &str) -> Result<()> {
        let store = &*self.store;
        let will_retry = job.attempt_count < job.max_attempts;
        if will_retry {
            let delay = backoff_delay(
                self.config.base_backoff_secs,
                self.config.backoff_multiplier,
                job.attempt_count,
            );
            store
                .mark_job_failed(job.id, message, Some(Utc::now() + delay))
                .await?;
            store
                .set_run_status(
                    job.tenant_id,
                    job.run_id,
                    RunStatusUpdate {
                        status: RunStatus::Queued.as_str().to_string(),
                        last_error: Some(message.to_string()),
                        ..Default::default()
                    },
                )
                .await?;
        } else {
            store.mark_job_failed(job.id, message, None).await?;
            store
                .set_run_status(
                    job.tenant_id,
                    job.run_id,
                    RunStatusUpdate {
                        status: RunStatus::Failed.as_str().to_string(),
                        last_error: Some(message.to_string()),
                        finished_at: Some(Utc::now()),
                        ..Default::default()
                    },
                )
                .await?;
        }
        store
            .append_event(
                job.tenant_id,
                job.run_id,
                NewResearchEvent {
                    event_type: "worker_failed".to_string(),
                    status: "error".to_string(),
                    message: Some(message.to_string()),
                    meta: Some(json!({ "attempt": job.attempt_count, "will_retry": will_retry })),
                },
            )
            .await?;
        warn!(run_id = %job.run_id, will_retry, "job failed");
        Ok(())
    }

    async fn finish_cancelled(&self, job: &ResearchJob) -> Result<()> {
        let store = &*self.store;
        store.mark_job_cancelled(job.id, Some("cancel requested")).await?;
        store
            .cancel_pending_steps(job.tenant_id, job.run_id, "run cancelled")
            .await?;
        store
            .set_run_status(
                job.tenant_id,
                job.run_id,
                RunStatusUpdate {
                    status: RunStatus::Cancelled.as_str().to_string(),
                    finished_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;
        store
            .append_event(
                job.tenant_id,
                job.run_id,
                NewResearchEvent {
                    event_type: "worker_cancelled".to_string(),
                    status: "ok".to_string(),
                    message: None,
                    meta: None,
                },
            )
            .await?;
        info!(run_id = %job.run_id, "job cancelled");
        Ok(())
    }
}

fn step_output<T: serde::Serialize>(summary: &T) -> Result<Option<Value>> {
    let value = serde_json::to_value(summary).map_err(anyhow::Error::from)?;
    Ok(Some(value))
}

fn strip_html(input: &str) -> String {
    let without_blocks = SCRIPT_RE.replace_all(input, " ");
    let without_tags = TAG_RE.replace_all(&without_blocks, "\n");
    let decoded = without_tags
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");
    decoded
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
