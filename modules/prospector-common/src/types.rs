use serde::{Deserialize, Serialize};

// --- Run lifecycle ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Planned,
    Active,
    Queued,
    Running,
    NeedsReview,
    Succeeded,
    Failed,
    Cancelled,
    CancelRequested,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Active => "active",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::NeedsReview => "needs_review",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::CancelRequested => "cancel_requested",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "planned" => Self::Planned,
            "active" => Self::Active,
            "queued" => Self::Queued,
            "running" => Self::Running,
            "needs_review" => Self::NeedsReview,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            "cancel_requested" => Self::CancelRequested,
            _ => return None,
        })
    }
}

// --- Source documents ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Text,
    Url,
    ManualList,
    AiProposal,
    LlmJson,
    Pdf,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Url => "url",
            Self::ManualList => "manual_list",
            Self::AiProposal => "ai_proposal",
            Self::LlmJson => "llm_json",
            Self::Pdf => "pdf",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "text" => Self::Text,
            "url" => Self::Url,
            "manual_list" => Self::ManualList,
            "ai_proposal" => Self::AiProposal,
            "llm_json" => Self::LlmJson,
            "pdf" => Self::Pdf,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    New,
    Fetched,
    Processed,
    Failed,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Fetched => "fetched",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }
}

// --- Review gate ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    New,
    Accepted,
    Hold,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Accepted => "accepted",
            Self::Hold => "hold",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "new" => Self::New,
            "accepted" => Self::Accepted,
            "hold" => Self::Hold,
            "rejected" => Self::Rejected,
            _ => return None,
        })
    }
}

/// Verification confidence ladder; merges only ever promote upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Unverified,
    Partial,
    Verified,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unverified => "unverified",
            Self::Partial => "partial",
            Self::Verified => "verified",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "unverified" => Self::Unverified,
            "partial" => Self::Partial,
            "verified" => Self::Verified,
            _ => return None,
        })
    }

    /// Promote toward the higher rung, never demote.
    pub fn promote(self, incoming: Self) -> Self {
        self.max(incoming)
    }
}

// --- Discovery provenance lattice ---

/// Which discovery path produced a prospect. Merging provenance from two
/// sources follows a small lattice: same label is idempotent, any mismatch
/// collapses to `Both`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveredBy {
    Internal,
    External,
    Both,
    Manual,
    Grok,
}

impl DiscoveredBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::External => "external",
            Self::Both => "both",
            Self::Manual => "manual",
            Self::Grok => "grok",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "internal" => Self::Internal,
            "external" => Self::External,
            "both" => Self::Both,
            "manual" => Self::Manual,
            "grok" => Self::Grok,
            _ => return None,
        })
    }

    /// Merge provenance: unseen label replaces None, same label is idempotent,
    /// any mismatch collapses to `Both`. Total over every input pair.
    pub fn merge(current: Option<Self>, incoming: Option<Self>) -> Option<Self> {
        match (current, incoming) {
            (cur, None) => cur,
            (None, inc) => inc,
            (Some(a), Some(b)) if a == b => Some(a),
            (Some(_), Some(_)) => Some(Self::Both),
        }
    }
}

// --- Jobs and steps ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Ok,
    Failed,
    Cancelled,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Ok => "ok",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "ok" => Self::Ok,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            _ => return None,
        })
    }
}
