//! Repository abstractions for factors and training tasks.
//!
//! Sqlite implementations live in `infrastructure::persistence`, in-memory
//! ones in `infrastructure::repositories`.

use crate::domain::factor::{Factor, NewFactor};
use crate::domain::task::TrainingTask;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 1-based page selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: usize,
    pub size: usize,
}

impl PageRequest {
    pub fn new(page: usize, size: usize) -> Self {
        Self {
            page: page.max(1),
            size: size.max(1),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page - 1) * self.size
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 50)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

/// Repository for user-authored factors
#[async_trait]
pub trait FactorRepository: Send + Sync {
    async fn create(&self, factor: &NewFactor) -> Result<Factor>;

    /// Returns `None` when no factor has this id
    async fn update(&self, id: i64, factor: &NewFactor) -> Result<Option<Factor>>;

    /// Returns whether a row was deleted
    async fn delete(&self, id: i64) -> Result<bool>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Factor>>;

    /// Factors ordered by id
    async fn list(&self, page: PageRequest) -> Result<Page<Factor>>;
}

/// Repository for training task definitions
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: &TrainingTask) -> Result<TrainingTask>;

    async fn delete(&self, name: &str) -> Result<bool>;

    async fn find_by_name(&self, name: &str) -> Result<Option<TrainingTask>>;

    async fn list(&self, page: PageRequest) -> Result<Page<TrainingTask>>;

    /// Flips `finished` and attaches the artifact reference
    async fn mark_finished(&self, name: &str, artifact_ref: &str) -> Result<()>;
}
