use thiserror::Error;

/// Result type alias for research-pipeline operations.
pub type Result<T> = std::result::Result<T, ProspectorError>;

#[derive(Error, Debug)]
pub enum ProspectorError {
    /// Malformed input rejected before any write. Carries a stable machine code.
    #[error("Validation error ({code}): {message}")]
    Validation { code: &'static str, message: String },

    /// Executive discovery referenced companies that are not review-accepted
    /// with exec search enabled. Lists normalized company names.
    #[error("ineligible_companies: {}", .0.join(", "))]
    IneligibleCompanies(Vec<String>),

    #[error("Research run not found")]
    RunNotFound,

    /// Plan is locked; source composition cannot change mid-flight.
    #[error("Plan locked; cannot modify sources after start")]
    PlanLocked,

    #[error("Run is locked by another operation")]
    RunLocked,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProspectorError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
        }
    }

    /// Stable machine-readable code. Clients treat unknown codes as generic failures.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { code, .. } => code,
            Self::IneligibleCompanies(_) => "ineligible_companies",
            Self::RunNotFound => "run_not_found",
            Self::PlanLocked => "plan_locked",
            Self::RunLocked => "run_locked",
            Self::Database(_) => "database_error",
            Self::Fetch(_) => "fetch_failed",
            Self::Other(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            ProspectorError::validation("invalid_purpose", "bad purpose").code(),
            "invalid_purpose"
        );
        assert_eq!(
            ProspectorError::IneligibleCompanies(vec!["acme".into()]).code(),
            "ineligible_companies"
        );
        assert_eq!(ProspectorError::PlanLocked.code(), "plan_locked");
    }

    #[test]
    fn ineligible_message_lists_names() {
        let err = ProspectorError::IneligibleCompanies(vec!["acme".into(), "globex".into()]);
        assert_eq!(err.to_string(), "ineligible_companies: acme, globex");
    }
}
