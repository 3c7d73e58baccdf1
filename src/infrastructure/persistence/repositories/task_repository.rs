use crate::domain::repositories::{Page, PageRequest, TaskRepository};
use crate::domain::task::TrainingTask;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

/// Stores each task as JSON next to the columns it is queried or mutated by
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_row(row: &sqlx::sqlite::SqliteRow) -> Result<TrainingTask> {
        let json: String = row.try_get("config_json")?;
        let mut task: TrainingTask =
            serde_json::from_str(&json).context("Stored task definition is not valid JSON")?;
        task.id = Some(row.try_get("id")?);
        task.finished = row.try_get("finished")?;
        task.artifact_ref = row.try_get("artifact_ref")?;
        Ok(task)
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: &TrainingTask) -> Result<TrainingTask> {
        if self.find_by_name(&task.name).await?.is_some() {
            bail!("Task '{}' already exists", task.name);
        }
        let json = serde_json::to_string(task)?;
        sqlx::query(
            r#"
            INSERT INTO tasks (name, config_json, finished, artifact_ref, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.name)
        .bind(json)
        .bind(task.finished)
        .bind(&task.artifact_ref)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .context("Failed to insert task")?;

        info!("Persisted task {}", task.name);
        self.find_by_name(&task.name)
            .await?
            .context("Inserted task could not be read back")
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .context("Failed to delete task")?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<TrainingTask>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn list(&self, page: PageRequest) -> Result<Page<TrainingTask>> {
        let total: i64 = sqlx::query("SELECT COUNT(*) as count FROM tasks")
            .fetch_one(&self.pool)
            .await?
            .try_get("count")?;
        let rows = sqlx::query("SELECT * FROM tasks ORDER BY id LIMIT ? OFFSET ?")
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

    async fn mark_finished(&self, name: &str, artifact_ref: &str) -> Result<()> {
        let result = sqlx::query("UPDATE tasks SET finished = 1, artifact_ref = ? WHERE name = ?")
            .bind(artifact_ref)
            .bind(name)
            .execute(&self.pool)
            .await
            .context("Failed to mark task finished")?;
        if result.rows_affected() == 0 {
            warn!("mark_finished: no stored task named {}", name);
        }
        Ok(())
    }
}
