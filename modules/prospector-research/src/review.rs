//! Human review gate.
//!
//! `review_status` is the sole switch controlling whether a company may feed
//! executive discovery; every change is audited. Executive ingestion re-checks
//! the gate at call time rather than trusting anything cached at planning.

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use prospector_common::{ProspectorError, Result, ReviewStatus};
use prospector_store::{CompanyProspect, NewActivityEntry, ResearchStore};

const ENTITY_COMPANY_PROSPECT: &str = "company_prospect";

/// Move a prospect to a new review status, auditing the old and new values.
/// Setting the current status again is a no-op and writes no audit entry.
pub async fn update_review_status<S>(
    store: &S,
    tenant: Uuid,
    prospect_id: Uuid,
    new_status: &str,
    actor: &str,
) -> Result<CompanyProspect>
where
    S: ResearchStore + ?Sized,
{
    let status = ReviewStatus::parse(new_status).ok_or_else(|| {
        ProspectorError::validation(
            "invalid_review_status",
            format!("unknown review status '{new_status}'"),
        )
    })?;

    let current = store
        .get_prospect(tenant, prospect_id)
        .await?
        .ok_or_else(|| {
            ProspectorError::validation("prospect_not_found", "company prospect not found")
        })?;
    if current.review_status == status.as_str() {
        return Ok(current);
    }

    let updated = store
        .set_review_status(tenant, prospect_id, status.as_str())
        .await?
        .ok_or_else(|| {
            ProspectorError::validation("prospect_not_found", "company prospect not found")
        })?;
    store
        .append_activity(
            tenant,
            NewActivityEntry {
                actor: actor.to_string(),
                action: "review_status_changed".to_string(),
                entity_type: ENTITY_COMPANY_PROSPECT.to_string(),
                entity_id: prospect_id,
                detail: Some(json!({
                    "old": current.review_status,
                    "new": status.as_str(),
                })),
            },
        )
        .await?;

    info!(%prospect_id, from = %current.review_status, to = status.as_str(), "review status changed");
    Ok(updated)
}

/// Toggle executive-discovery eligibility for a prospect, with audit.
pub async fn set_exec_search_enabled<S>(
    store: &S,
    tenant: Uuid,
    prospect_id: Uuid,
    enabled: bool,
    actor: &str,
) -> Result<CompanyProspect>
where
    S: ResearchStore + ?Sized,
{
    let current = store
        .get_prospect(tenant, prospect_id)
        .await?
        .ok_or_else(|| {
            ProspectorError::validation("prospect_not_found", "company prospect not found")
        })?;
    if current.exec_search_enabled == enabled {
        return Ok(current);
    }

    let updated = store
        .set_exec_search_enabled(tenant, prospect_id, enabled)
        .await?
        .ok_or_else(|| {
            ProspectorError::validation("prospect_not_found", "company prospect not found")
        })?;
    store
        .append_activity(
            tenant,
            NewActivityEntry {
                actor: actor.to_string(),
                action: "exec_search_toggled".to_string(),
                entity_type: ENTITY_COMPANY_PROSPECT.to_string(),
                entity_id: prospect_id,
                detail: Some(json!({ "old": current.exec_search_enabled, "new": enabled })),
            },
        )
        .await?;

    info!(%prospect_id, enabled, "exec search toggled");
    Ok(updated)
}
