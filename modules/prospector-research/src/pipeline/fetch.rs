//! URL source fetching. Bodies are content-hashed on arrival so a page that
//! was already fetched under another URL is marked processed instead of being
//! extracted twice.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use prospector_common::{canonical, ProspectorError, Result, SourceStatus, SourceType};
use prospector_store::ResearchStore;

use super::{truncate_error, BatchSummary};

/// Retrieves the body of a URL source. Implemented over HTTP in production
/// and by fixtures in tests.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// reqwest-backed fetcher with a per-request timeout.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProspectorError::Fetch(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProspectorError::Fetch(format!("request to {url} failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProspectorError::Fetch(format!(
                "{url} returned status {status}"
            )));
        }
        response
            .text()
            .await
            .map_err(|e| ProspectorError::Fetch(format!("reading body of {url} failed: {e}")))
    }
}

/// Fetch every pending `url` source for a run.
///
/// A body whose hash matches content already present in the run is a
/// duplicate: the source is stored and marked processed so extraction skips
/// it. Fetch failures are isolated per source.
pub async fn fetch_url_sources<S, F>(
    store: &S,
    tenant: Uuid,
    run_id: Uuid,
    fetcher: &F,
) -> Result<BatchSummary>
where
    S: ResearchStore + ?Sized,
    F: SourceFetcher + ?Sized,
{
    let pending = store
        .list_sources_by_status(
            tenant,
            run_id,
            SourceType::Url.as_str(),
            SourceStatus::New.as_str(),
        )
        .await?;

    let mut summary = BatchSummary::default();
    for source in pending {
        let url = match source.url_normalized.as_deref().or(source.url.as_deref()) {
            Some(u) => u.to_string(),
            None => {
                store
                    .set_source_status(
                        tenant,
                        source.id,
                        SourceStatus::Failed.as_str(),
                        Some("url source has no url"),
                    )
                    .await?;
                summary.failed += 1;
                continue;
            }
        };

        match fetcher.fetch(&url).await {
            Ok(body) => {
                let body_hash = canonical::sha256_hex(body.as_bytes());
                let known = store.list_sources_for_run(tenant, run_id).await?;
                let duplicate = known.iter().any(|s| {
                    s.id != source.id && s.content_hash.as_deref() == Some(body_hash.as_str())
                });
                if duplicate {
                    // Keep the body for audit but skip extraction.
                    store
                        .set_source_content(
                            tenant,
                            source.id,
                            &body,
                            &body_hash,
                            SourceStatus::Processed.as_str(),
                        )
                        .await?;
                    store
                        .set_source_status(
                            tenant,
                            source.id,
                            SourceStatus::Processed.as_str(),
                            Some("duplicate_content"),
                        )
                        .await?;
                    summary.skipped += 1;
                } else {
                    store
                        .set_source_content(
                            tenant,
                            source.id,
                            &body,
                            &body_hash,
                            SourceStatus::Fetched.as_str(),
                        )
                        .await?;
                    summary.processed += 1;
                }
            }
            Err(err) => {
                let message = truncate_error(&err.to_string());
                warn!(source_id = %source.id, url = %url, error = %message, "fetch failed");
                store
                    .set_source_status(
                        tenant,
                        source.id,
                        SourceStatus::Failed.as_str(),
                        Some(&message),
                    )
                    .await?;
                summary.failed += 1;
            }
        }
    }

    info!(
        %run_id,
        fetched = summary.processed,
        duplicates = summary.skipped,
        failed = summary.failed,
        "url fetch batch complete"
    );
    Ok(summary)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use prospector_store::{
        MemoryStore, NewResearchRun, NewSourceDocument, RunRepo, SourceDocumentRepo,
    };

    /// Fixture fetcher returning canned bodies keyed by URL.
    pub(crate) struct FixtureFetcher {
        pub bodies: HashMap<String, String>,
    }

    #[async_trait]
    impl SourceFetcher for FixtureFetcher {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.bodies
                .get(url)
                .cloned()
                .ok_or_else(|| ProspectorError::Fetch(format!("no fixture for {url}")))
        }
    }

    async fn seeded_run(store: &MemoryStore, tenant: Uuid) -> Uuid {
        store
            .create_run(
                tenant,
                NewResearchRun {
                    role_mandate_id: None,
                    name: "fetch".into(),
                    sector: None,
                    region_scope: None,
                    config: None,
                },
            )
            .await
            .unwrap()
            .id
    }

    async fn url_source(store: &MemoryStore, tenant: Uuid, run_id: Uuid, url: &str) -> Uuid {
        store
            .add_source(
                tenant,
                NewSourceDocument {
                    run_id,
                    source_type: SourceType::Url.as_str().to_string(),
                    url: Some(url.to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn fetched_body_is_stored_with_hash() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        let id = url_source(&store, tenant, run_id, "https://acme.example/about").await;

        let fetcher = FixtureFetcher {
            bodies: HashMap::from([(
                "https://acme.example/about".to_string(),
                "Acme builds rockets".to_string(),
            )]),
        };
        let summary = fetch_url_sources(&store, tenant, run_id, &fetcher).await.unwrap();
        assert_eq!(summary.processed, 1);

        let source = store.get_source(tenant, id).await.unwrap().unwrap();
        assert_eq!(source.status, "fetched");
        assert_eq!(source.content_text.as_deref(), Some("Acme builds rockets"));
        assert_eq!(
            source.content_hash.as_deref(),
            Some(canonical::sha256_hex(b"Acme builds rockets").as_str())
        );
    }

    #[tokio::test]
    async fn identical_body_under_second_url_is_marked_processed() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        url_source(&store, tenant, run_id, "https://acme.example/a").await;
        let second = url_source(&store, tenant, run_id, "https://acme.example/b").await;

        let body = "same page either way".to_string();
        let fetcher = FixtureFetcher {
            bodies: HashMap::from([
                ("https://acme.example/a".to_string(), body.clone()),
                ("https://acme.example/b".to_string(), body),
            ]),
        };
        let summary = fetch_url_sources(&store, tenant, run_id, &fetcher).await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped, 1);

        let dup = store.get_source(tenant, second).await.unwrap().unwrap();
        assert_eq!(dup.status, "processed");
        assert_eq!(dup.error_message.as_deref(), Some("duplicate_content"));
    }

    #[tokio::test]
    async fn fetch_failure_is_isolated() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let run_id = seeded_run(&store, tenant).await;
        let broken = url_source(&store, tenant, run_id, "https://down.example/").await;
        url_source(&store, tenant, run_id, "https://up.example/").await;

        let fetcher = FixtureFetcher {
            bodies: HashMap::from([("https://up.example/".to_string(), "ok".to_string())]),
        };
        let summary = fetch_url_sources(&store, tenant, run_id, &fetcher).await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed, 1);

        let source = store.get_source(tenant, broken).await.unwrap().unwrap();
        assert_eq!(source.status, "failed");
        assert!(source.error_message.as_deref().unwrap().contains("no fixture"));
    }
}
