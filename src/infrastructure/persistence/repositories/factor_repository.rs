use crate::domain::factor::{ChartHint, Factor, NewFactor};
use crate::domain::repositories::{FactorRepository, Page, PageRequest};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::info;

pub struct SqliteFactorRepository {
    pool: SqlitePool,
}

impl SqliteFactorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_row(row: &sqlx::sqlite::SqliteRow) -> Result<Factor> {
        let hint: String = row.try_get("chart_hint")?;
        let created_at: i64 = row.try_get("created_at")?;
        Ok(Factor {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            transform: row.try_get("transform")?,
            chart_hint: ChartHint::from_str(&hint).unwrap_or_default(),
            created_at: Utc
                .timestamp_opt(created_at, 0)
                .single()
                .unwrap_or_else(Utc::now),
        })
    }
}

#[async_trait]
impl FactorRepository for SqliteFactorRepository {
    async fn create(&self, factor: &NewFactor) -> Result<Factor> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO factors (name, description, transform, chart_hint, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&factor.name)
        .bind(&factor.description)
        .bind(&factor.transform)
        .bind(factor.chart_hint.to_string())
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to insert factor")?;

        let id = result.last_insert_rowid();
        info!("Persisted factor {} ({})", id, factor.name);
        self.find_by_id(id)
            .await?
            .context("Inserted factor could not be read back")
    }

    async fn update(&self, id: i64, factor: &NewFactor) -> Result<Option<Factor>> {
        let result = sqlx::query(
            r#"
            UPDATE factors
            SET name = ?, description = ?, transform = ?, chart_hint = ?
            WHERE id = ?
            "#,
        )
        .bind(&factor.name)
        .bind(&factor.description)
        .bind(&factor.transform)
        .bind(factor.chart_hint.to_string())
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to update factor")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM factors WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete factor")?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Factor>> {
        let row = sqlx::query("SELECT * FROM factors WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn list(&self, page: PageRequest) -> Result<Page<Factor>> {
        let total: i64 = sqlx::query("SELECT COUNT(*) as count FROM factors")
            .fetch_one(&self.pool)
            .await?
            .try_get("count")?;

        let rows = sqlx::query("SELECT * FROM factors ORDER BY id LIMIT ? OFFSET ?")
            .bind(page.size as i64)
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await?;
        let items = rows.iter().map(Self::map_row).collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            total: total as usize,
        })
    }
}
