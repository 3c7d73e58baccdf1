//! In-memory implementations of the domain repositories and ports.
//!
//! Used by tests and by the CLI when `DATABASE_URL` is not set. Everything
//! lives behind `Arc<RwLock>` and is lost when the process exits.

use crate::domain::factor::{Factor, NewFactor};
use crate::domain::market::RawObservation;
use crate::domain::ports::{HistoricalDataSource, HistoryQuery, ModelArtifact, ModelArtifactStore};
use crate::domain::repositories::{FactorRepository, Page, PageRequest, TaskRepository};
use crate::domain::task::TrainingTask;
use crate::infrastructure::market_data::shape_series;
use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

fn paginate<T: Clone>(items: &[T], page: PageRequest) -> Page<T> {
    Page {
        items: items
            .iter()
            .skip(page.offset())
            .take(page.size)
            .cloned()
            .collect(),
        total: items.len(),
    }
}

#[derive(Default)]
struct FactorTable {
    next_id: i64,
    rows: Vec<Factor>,
}

/// Factors ordered by insertion, ids assigned from 1
#[derive(Default)]
pub struct InMemoryFactorRepository {
    table: Arc<RwLock<FactorTable>>,
}

impl InMemoryFactorRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FactorRepository for InMemoryFactorRepository {
    async fn create(&self, factor: &NewFactor) -> Result<Factor> {
        let mut table = self.table.write().await;
        table.next_id += 1;
        let stored = Factor {
            id: table.next_id,
            name: factor.name.clone(),
            description: factor.description.clone(),
            transform: factor.transform.clone(),
            chart_hint: factor.chart_hint,
            created_at: Utc::now(),
        };
        table.rows.push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, id: i64, factor: &NewFactor) -> Result<Option<Factor>> {
        let mut table = self.table.write().await;
        Ok(table.rows.iter_mut().find(|f| f.id == id).map(|f| {
            f.name = factor.name.clone();
            f.description = factor.description.clone();
            f.transform = factor.transform.clone();
            f.chart_hint = factor.chart_hint;
            f.clone()
        }))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let mut table = self.table.write().await;
        let before = table.rows.len();
        table.rows.retain(|f| f.id != id);
        Ok(table.rows.len() < before)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Factor>> {
        let table = self.table.read().await;
        Ok(table.rows.iter().find(|f| f.id == id).cloned())
    }

    async fn list(&self, page: PageRequest) -> Result<Page<Factor>> {
        Ok(paginate(&self.table.read().await.rows, page))
    }
}

#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: Arc<RwLock<Vec<TrainingTask>>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn create(&self, task: &TrainingTask) -> Result<TrainingTask> {
        let mut tasks = self.tasks.write().await;
        if tasks.iter().any(|t| t.name == task.name) {
            bail!("Task '{}' already exists", task.name);
        }
        let mut stored = task.clone();
        stored.id = Some(tasks.iter().filter_map(|t| t.id).max().unwrap_or(0) + 1);
        tasks.push(stored.clone());
        Ok(stored)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|t| t.name != name);
        Ok(tasks.len() < before)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<TrainingTask>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.iter().find(|t| t.name == name).cloned())
    }

    async fn list(&self, page: PageRequest) -> Result<Page<TrainingTask>> {
        Ok(paginate(&self.tasks.read().await, page))
    }

    async fn mark_finished(&self, name: &str, artifact_ref: &str) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        match tasks.iter_mut().find(|t| t.name == name) {
            Some(task) => {
                task.finished = true;
                task.artifact_ref = Some(artifact_ref.to_string());
            }
            None => warn!("mark_finished: no task named {}", name),
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryModelArtifactStore {
    artifacts: Arc<RwLock<HashMap<String, ModelArtifact>>>,
}

impl InMemoryModelArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModelArtifactStore for InMemoryModelArtifactStore {
    async fn save(&self, name: &str, artifact: &ModelArtifact) -> Result<String> {
        self.artifacts
            .write()
            .await
            .insert(name.to_string(), artifact.clone());
        Ok(Uuid::new_v4().to_string())
    }

    async fn load(&self, name: &str) -> Result<Option<ModelArtifact>> {
        Ok(self.artifacts.read().await.get(name).cloned())
    }
}

/// Daily bars held per ticker, shaped on fetch like the persistent sources
#[derive(Default)]
pub struct InMemoryObservationSource {
    bars: Arc<RwLock<HashMap<String, Vec<RawObservation>>>>,
}

impl InMemoryObservationSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(bars: Vec<RawObservation>) -> Self {
        let mut by_ticker: HashMap<String, Vec<RawObservation>> = HashMap::new();
        for bar in bars {
            by_ticker.entry(bar.ticker.clone()).or_default().push(bar);
        }
        Self {
            bars: Arc::new(RwLock::new(by_ticker)),
        }
    }

    pub async fn insert(&self, bars: Vec<RawObservation>) {
        let mut map = self.bars.write().await;
        for bar in bars {
            map.entry(bar.ticker.clone()).or_default().push(bar);
        }
    }
}

#[async_trait]
impl HistoricalDataSource for InMemoryObservationSource {
    async fn fetch(&self, query: &HistoryQuery) -> Result<Vec<RawObservation>> {
        let map = self.bars.read().await;
        let mut out = Vec::new();
        for ticker in &query.tickers {
            let daily = map.get(ticker).cloned().unwrap_or_default();
            out.extend(shape_series(daily, query)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::factor::ChartHint;

    #[tokio::test]
    async fn test_factor_ids_are_stable_after_delete() {
        let repo = InMemoryFactorRepository::new();
        let f = NewFactor {
            name: "x".into(),
            description: String::new(),
            transform: "$f_x = close".into(),
            chart_hint: ChartHint::Line,
        };
        let a = repo.create(&f).await.unwrap();
        repo.delete(a.id).await.unwrap();
        let b = repo.create(&f).await.unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(repo.list(PageRequest::new(1, 10)).await.unwrap().total, 1);
    }

    #[test]
    fn test_mark_finished_unknown_task_is_noop() {
        let repo = InMemoryTaskRepository::new();
        tokio_test::block_on(async {
            repo.mark_finished("ghost", "ref").await.unwrap();
            assert!(repo.find_by_name("ghost").await.unwrap().is_none());
        });
    }
}
