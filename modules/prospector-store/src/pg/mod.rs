// Postgres implementations of the repository traits, one file per aggregate.

mod canonical_companies;
mod canonical_people;
mod enrichment;
mod events;
mod executives;
mod jobs;
mod plans;
mod prospects;
mod resolution;
mod runs;
mod sources;

pub(crate) use sources::backfill as backfill_source;

use sqlx::PgPool;

use prospector_common::{ProspectorError, Result};

/// Postgres-backed [`crate::traits::ResearchStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await.map_err(db_err)?;
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ProspectorError::Database(e.to_string()))?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub(crate) fn db_err(e: sqlx::Error) -> ProspectorError {
    ProspectorError::Database(e.to_string())
}
