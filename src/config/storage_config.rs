//! Storage configuration parsing from environment variables.

use anyhow::Result;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Where historical bars are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataSourceKind {
    #[default]
    Sqlite,
    Csv,
}

impl FromStr for DataSourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(DataSourceKind::Sqlite),
            "csv" => Ok(DataSourceKind::Csv),
            _ => anyhow::bail!("Invalid DATA_SOURCE: {}. Must be 'sqlite' or 'csv'", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageEnvConfig {
    pub database_url: String,
    pub data_dir: PathBuf,
    pub data_source: DataSourceKind,
}

impl Default for StorageEnvConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/factorlab.db".to_string(),
            data_dir: PathBuf::from("data/csv"),
            data_source: DataSourceKind::Sqlite,
        }
    }
}

impl StorageEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let data_source = match env::var("DATA_SOURCE") {
            Ok(s) => s.parse()?,
            Err(_) => defaults.data_source,
        };
        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            data_source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_source_parsing() {
        assert_eq!("CSV".parse::<DataSourceKind>().unwrap(), DataSourceKind::Csv);
        assert_eq!(
            "sqlite".parse::<DataSourceKind>().unwrap(),
            DataSourceKind::Sqlite
        );
        assert!("parquet".parse::<DataSourceKind>().is_err());
    }
}
