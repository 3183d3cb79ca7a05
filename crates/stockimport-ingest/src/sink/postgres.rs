//! Postgres storage for imported elements
//!
//! Each import replaces the contents of the `element` table: `initialize`
//! creates it when missing and truncates it otherwise. Batches are written in
//! one transaction per batch as multi-row INSERTs of at most
//! `insert_chunk_size` rows.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::time::Duration;
use stockimport_common::Element;
use tracing::{debug, info, instrument};

use super::ElementSink;
use crate::config::DatabaseConfig;

/// Destination table
pub const ELEMENT_TABLE: &str = "element";

const CREATE_ELEMENT_TABLE: &str = r#"
    CREATE TABLE element (
        id BIGSERIAL PRIMARY KEY,
        point_of_sale VARCHAR(100) NOT NULL,
        product VARCHAR(100) NOT NULL,
        date DATE NOT NULL,
        stock INTEGER NOT NULL
    )
"#;

pub struct PostgresElementSink {
    pool: PgPool,
    insert_chunk_size: usize,
}

impl PostgresElementSink {
    pub fn new(pool: PgPool, insert_chunk_size: usize) -> Self {
        Self {
            pool,
            insert_chunk_size: insert_chunk_size.max(1),
        }
    }

    /// Open a pool from `config`
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect(&config.url)
            .await
            .context("Failed to connect to database")?;

        info!("Database connection pool established");

        Ok(Self::new(pool, config.insert_chunk_size))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn table_exists(&self) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = current_schema() AND table_name = $1
            )
            "#,
        )
        .bind(ELEMENT_TABLE)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check for element table")?;

        Ok(exists)
    }

    async fn insert_rows(
        tx: &mut Transaction<'_, Postgres>,
        rows: &[Element],
    ) -> Result<()> {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} ({}) ",
            ELEMENT_TABLE,
            Element::COLUMNS.join(", ")
        ));

        query_builder.push_values(rows, |mut b, element| {
            b.push_bind(&element.point_of_sale)
                .push_bind(&element.product)
                .push_bind(element.date)
                .push_bind(element.stock);
        });

        query_builder.build().execute(&mut **tx).await?;

        Ok(())
    }
}

#[async_trait]
impl ElementSink for PostgresElementSink {
    #[instrument(skip(self))]
    async fn initialize(&self) -> Result<()> {
        if self.table_exists().await? {
            sqlx::query(&format!("TRUNCATE TABLE {} RESTART IDENTITY", ELEMENT_TABLE))
                .execute(&self.pool)
                .await
                .context("Failed to truncate element table")?;
            info!(table = ELEMENT_TABLE, "Truncated existing table");
        } else {
            sqlx::query(CREATE_ELEMENT_TABLE)
                .execute(&self.pool)
                .await
                .context("Failed to create element table")?;
            info!(table = ELEMENT_TABLE, "Created table");
        }

        Ok(())
    }

    #[instrument(skip(self, elements), fields(count = elements.len()))]
    async fn save_collection(&self, elements: Vec<Element>) -> Result<()> {
        if elements.is_empty() {
            return Ok(());
        }

        // dropping the transaction on error rolls it back
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        for (chunk_idx, rows) in elements.chunks(self.insert_chunk_size).enumerate() {
            Self::insert_rows(&mut tx, rows)
                .await
                .with_context(|| format!("Failed to insert rows chunk {}", chunk_idx))?;
        }

        tx.commit().await.context("Failed to commit batch")?;

        debug!(rows = elements.len(), "Batch committed");

        Ok(())
    }
}
