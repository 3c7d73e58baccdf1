use crate::domain::factor::{Factor, SeriesTransform, validate_output};
use crate::domain::errors::FactorError;
use crate::domain::market::RawObservation;
use crate::domain::repositories::{FactorRepository, PageRequest};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

const FACTOR_PAGE_SIZE: usize = 1000;

/// Applies stored factors to a raw series, isolating per-factor failures.
pub struct FactorEvaluator {
    factors: Arc<dyn FactorRepository>,
}

impl FactorEvaluator {
    pub fn new(factors: Arc<dyn FactorRepository>) -> Self {
        Self { factors }
    }

    /// Resolves `factor_ids` against the store and applies them in caller order.
    /// Unknown ids are skipped. A factor that fails leaves the series unchanged.
    pub async fn apply(
        &self,
        factor_ids: &[i64],
        series: &[RawObservation],
    ) -> Result<Vec<RawObservation>> {
        if factor_ids.is_empty() {
            return Ok(series.to_vec());
        }
        let catalog = self.load_catalog().await?;
        let resolved: Vec<(i64, Option<&Factor>)> = factor_ids
            .iter()
            .map(|id| (*id, catalog.get(id)))
            .collect();
        Ok(apply_factors(&resolved, series))
    }

    /// Every stored factor keyed by id
    pub async fn load_catalog(&self) -> Result<HashMap<i64, Factor>> {
        let mut page = self
            .factors
            .list(PageRequest::new(1, FACTOR_PAGE_SIZE))
            .await
            .context("Failed to list factors")?;
        if page.total > page.items.len() {
            page = self
                .factors
                .list(PageRequest::new(1, page.total))
                .await
                .context("Failed to list factors")?;
        }
        Ok(page.items.into_iter().map(|f| (f.id, f)).collect())
    }
}

/// Applies already-resolved factors. `None` entries are unknown ids.
pub fn apply_factors(
    factors: &[(i64, Option<&Factor>)],
    series: &[RawObservation],
) -> Vec<RawObservation> {
    let mut current = series.to_vec();
    for (id, factor) in factors {
        let Some(factor) = factor else {
            warn!("Factor {} not found, skipping", id);
            continue;
        };
        match factor.compile().and_then(|p| run_checked(&p, &current)) {
            Ok(next) => {
                debug!("Applied factor {} ({})", id, factor.name);
                current = next;
            }
            Err(e) => warn!("Factor {} ({}) failed: {}", id, factor.name, e),
        }
    }
    current
}

/// Applies a sequence of transforms with the same isolation rules.
pub fn apply_transforms(
    transforms: &[(&str, &dyn SeriesTransform)],
    series: &[RawObservation],
) -> Vec<RawObservation> {
    let mut current = series.to_vec();
    for (label, transform) in transforms {
        match run_checked(*transform, &current) {
            Ok(next) => current = next,
            Err(e) => warn!("Transform {} failed: {}", label, e),
        }
    }
    current
}

fn run_checked(
    transform: &dyn SeriesTransform,
    series: &[RawObservation],
) -> Result<Vec<RawObservation>, FactorError> {
    let output = transform.transform(series)?;
    validate_output(series, &output)?;
    Ok(output)
}

/// Identity transform
pub struct Passthrough;

impl SeriesTransform for Passthrough {
    fn transform(&self, series: &[RawObservation]) -> Result<Vec<RawObservation>, FactorError> {
        Ok(series.to_vec())
    }
}
