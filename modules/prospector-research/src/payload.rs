//! Wire payloads for the LLM-JSON discovery pipelines.
//!
//! Payloads are discriminated unions keyed by `schema_version`, validated at
//! the boundary before any write.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use prospector_common::{ProspectorError, Result};

/// One evidence item attached to a discovered company or executive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceItem {
    #[serde(default)]
    pub url: Option<String>,
    /// Source kind (`profile`, `news`, `filing`, ...).
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
}

impl EvidenceItem {
    /// Display label for dedup: explicit label wins, else the kind.
    pub fn label_or_kind(&self) -> Option<&str> {
        self.label.as_deref().or(self.kind.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveredCompany {
    pub name: String,
    #[serde(default)]
    pub website_url: Option<String>,
    #[serde(default)]
    pub hq_country: Option<String>,
    #[serde(default)]
    pub hq_city: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub subsector: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
}

/// Company-discovery payload, versioned by `schema_version`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "schema_version")]
pub enum CompanyDiscoveryPayload {
    #[serde(rename = "1")]
    V1 {
        #[serde(default)]
        provider: Option<String>,
        companies: Vec<DiscoveredCompany>,
    },
}

impl CompanyDiscoveryPayload {
    /// Parse and validate from raw JSON. Empty company lists are rejected
    /// before any write.
    pub fn from_value(value: &Value) -> Result<Self> {
        let payload: Self = serde_json::from_value(value.clone()).map_err(|e| {
            ProspectorError::validation("invalid_payload", format!("bad company payload: {e}"))
        })?;
        let Self::V1 { companies, .. } = &payload;
        if companies.is_empty() {
            return Err(ProspectorError::validation(
                "no_companies_in_payload",
                "payload contains no companies",
            ));
        }
        Ok(payload)
    }

    pub fn companies(&self) -> &[DiscoveredCompany] {
        let Self::V1 { companies, .. } = self;
        companies
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveredExecutive {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
}

/// Executives grouped under the company they were discovered for. The company
/// is referenced by name and matched against the run's prospects.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompanyExecutives {
    pub company_name: String,
    #[serde(default)]
    pub executives: Vec<DiscoveredExecutive>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "schema_version")]
pub enum ExecutiveDiscoveryPayload {
    #[serde(rename = "1")]
    V1 {
        #[serde(default)]
        provider: Option<String>,
        companies: Vec<CompanyExecutives>,
    },
}

impl ExecutiveDiscoveryPayload {
    pub fn from_value(value: &Value) -> Result<Self> {
        let payload: Self = serde_json::from_value(value.clone()).map_err(|e| {
            ProspectorError::validation("invalid_payload", format!("bad executive payload: {e}"))
        })?;
        let Self::V1 { companies, .. } = &payload;
        if companies.is_empty() {
            return Err(ProspectorError::validation(
                "no_companies_in_payload",
                "payload references no companies",
            ));
        }
        Ok(payload)
    }

    pub fn companies(&self) -> &[CompanyExecutives] {
        let Self::V1 { companies, .. } = self;
        companies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn company_payload_v1_parses() {
        let value = json!({
            "schema_version": "1",
            "provider": "acme-llm",
            "companies": [
                {"name": "Acme Corp Inc", "website_url": "https://acme.com",
                 "confidence": 0.9,
                 "evidence": [{"url": "https://acme.com/about", "kind": "profile"}]}
            ]
        });
        let payload = CompanyDiscoveryPayload::from_value(&value).unwrap();
        assert_eq!(payload.companies().len(), 1);
        assert_eq!(payload.companies()[0].name, "Acme Corp Inc");
        assert_eq!(
            payload.companies()[0].evidence[0].label_or_kind(),
            Some("profile")
        );
    }

    #[test]
    fn empty_companies_rejected() {
        let value = json!({"schema_version": "1", "companies": []});
        let err = CompanyDiscoveryPayload::from_value(&value).unwrap_err();
        assert_eq!(err.code(), "no_companies_in_payload");
    }

    #[test]
    fn unknown_schema_version_rejected() {
        let value = json!({"schema_version": "99", "companies": [{"name": "X"}]});
        let err = CompanyDiscoveryPayload::from_value(&value).unwrap_err();
        assert_eq!(err.code(), "invalid_payload");
    }

    #[test]
    fn executive_payload_v1_parses() {
        let value = json!({
            "schema_version": "1",
            "companies": [
                {"company_name": "Acme", "executives": [
                    {"name": "Jane Doe", "title": "CEO", "email": "jane@acme.com"}
                ]}
            ]
        });
        let payload = ExecutiveDiscoveryPayload::from_value(&value).unwrap();
        assert_eq!(payload.companies()[0].executives.len(), 1);
    }
}
