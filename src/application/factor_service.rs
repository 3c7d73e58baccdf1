use crate::domain::factor::{Factor, FactorProgram, NewFactor, validate_factor};
use crate::domain::market::RawObservation;
use crate::domain::repositories::FactorRepository;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Authoring-side factor management. Nothing is persisted unless the
/// program parses and honours the output contract on the sample.
pub struct FactorService {
    repository: Arc<dyn FactorRepository>,
}

impl FactorService {
    pub fn new(repository: Arc<dyn FactorRepository>) -> Self {
        Self { repository }
    }

    /// Parses and dry-runs `transform`, returning the keys it adds.
    pub fn check(&self, transform: &str, sample: &[RawObservation]) -> Result<Vec<String>> {
        let program = FactorProgram::parse(transform).context("Factor program does not parse")?;
        let keys = validate_factor(&program, sample).context("Factor failed validation")?;
        Ok(keys)
    }

    pub async fn create(&self, factor: &NewFactor, sample: &[RawObservation]) -> Result<Factor> {
        self.check(&factor.transform, sample)?;
        let created = self.repository.create(factor).await?;
        info!("Created factor {} ({})", created.id, created.name);
        Ok(created)
    }

    pub async fn update(
        &self,
        id: i64,
        factor: &NewFactor,
        sample: &[RawObservation],
    ) -> Result<Option<Factor>> {
        self.check(&factor.transform, sample)?;
        self.repository.update(id, factor).await
    }
}
