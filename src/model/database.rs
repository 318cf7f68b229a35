use std::time::Duration;

use sqlx::{PgPool, postgres::PgPoolOptions};
use crate::model::error::DatabaseResult;

#[derive(Debug, Clone)]
pub struct DbConnection {
    pool: PgPool, // cloning is cheap, pool is just a wrapper around Arc<>
}

impl DbConnection {
    pub fn connect(connection_str: &str) -> DatabaseResult<Self> {
        let pool = PgPool::connect_lazy(connection_str)?;
        Ok(Self { pool })
    }

    /// Eagerly connects, retrying with a linear backoff. Used at startup when the database may
    /// still be booting next to us.
    #[tracing::instrument(skip(connection_str))]
    pub async fn connect_with_retry(
        connection_str: &str,
        attempts: u32,
        delay: Duration,
    ) -> DatabaseResult<Self> {
        let mut attempt = 1;
        loop {
            match PgPoolOptions::new()
                .max_connections(10)
                .connect(connection_str)
                .await
            {
                Ok(pool) => return Ok(Self { pool }),
                Err(e) if attempt < attempts => {
                    tracing::warn!(attempt, error = %e, "database connection failed, retrying");
                    tokio::time::sleep(delay * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}
