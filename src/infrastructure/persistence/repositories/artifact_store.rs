use crate::domain::ports::{ModelArtifact, ModelArtifactStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

pub struct SqliteModelArtifactStore {
    pool: SqlitePool,
}

impl SqliteModelArtifactStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ModelArtifactStore for SqliteModelArtifactStore {
    async fn save(&self, name: &str, artifact: &ModelArtifact) -> Result<String> {
        let artifact_ref = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO model_artifacts (name, artifact_ref, topology_json, weights, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                artifact_ref = excluded.artifact_ref,
                topology_json = excluded.topology_json,
                weights = excluded.weights,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(&artifact_ref)
        .bind(&artifact.topology)
        .bind(&artifact.weights)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .context("Failed to save model artifact")?;

        info!(
            "Persisted model for {} ({} weight bytes)",
            name,
            artifact.weights.len()
        );
        Ok(artifact_ref)
    }

    async fn load(&self, name: &str) -> Result<Option<ModelArtifact>> {
        let row = sqlx::query("SELECT topology_json, weights FROM model_artifacts WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load model artifact")?;

        match row {
            Some(row) => Ok(Some(ModelArtifact {
                topology: row.try_get("topology_json")?,
                weights: row.try_get("weights")?,
            })),
            None => Ok(None),
        }
    }
}
