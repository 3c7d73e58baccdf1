pub mod artifact_store;
pub mod factor_repository;
pub mod observation_source;
pub mod task_repository;

pub use artifact_store::SqliteModelArtifactStore;
pub use factor_repository::SqliteFactorRepository;
pub use observation_source::SqliteObservationSource;
pub use task_repository::SqliteTaskRepository;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::factor::{ChartHint, NewFactor};
    use crate::domain::market::{DateRange, Interval, RawObservation};
    use crate::domain::ports::{
        HistoricalDataSource, HistoryQuery, IndicatorRequest, ModelArtifact, ModelArtifactStore,
    };
    use crate::domain::repositories::{FactorRepository, PageRequest, TaskRepository};
    use crate::domain::task::fixtures::task;
    use crate::infrastructure::persistence::Database;
    use chrono::NaiveDate;

    fn new_factor(name: &str) -> NewFactor {
        NewFactor {
            name: name.into(),
            description: "range".into(),
            transform: "$f_range = high - low".into(),
            chart_hint: ChartHint::Bar,
        }
    }

    #[tokio::test]
    async fn test_factor_crud_and_paging() {
        let db = Database::in_memory().await.unwrap();
        let repo = SqliteFactorRepository::new(db.pool.clone());

        let a = repo.create(&new_factor("a")).await.unwrap();
        let b = repo.create(&new_factor("b")).await.unwrap();
        repo.create(&new_factor("c")).await.unwrap();
        assert!(b.id > a.id);
        assert_eq!(a.chart_hint, ChartHint::Bar);

        let page = repo.list(PageRequest::new(2, 2)).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].name, "c");

        let updated = repo.update(a.id, &new_factor("a2")).await.unwrap().unwrap();
        assert_eq!(updated.name, "a2");
        assert!(repo.update(999, &new_factor("x")).await.unwrap().is_none());

        assert!(repo.delete(b.id).await.unwrap());
        assert!(!repo.delete(b.id).await.unwrap());
        assert!(repo.find_by_id(b.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_task_roundtrip_and_finish() {
        let db = Database::in_memory().await.unwrap();
        let repo = SqliteTaskRepository::new(db.pool.clone());

        let stored = repo.create(&task()).await.unwrap();
        assert!(stored.id.is_some());
        assert!(!stored.finished);
        assert!(repo.create(&task()).await.is_err());

        repo.mark_finished("ndx-trend", "ref-1").await.unwrap();
        let done = repo.find_by_name("ndx-trend").await.unwrap().unwrap();
        assert!(done.finished);
        assert_eq!(done.artifact_ref.as_deref(), Some("ref-1"));
        assert_eq!(done.window_length, 3);

        // Unknown names are ignored
        repo.mark_finished("missing", "ref-2").await.unwrap();
        assert_eq!(repo.list(PageRequest::default()).await.unwrap().total, 1);
        assert!(repo.delete("ndx-trend").await.unwrap());
    }

    #[tokio::test]
    async fn test_artifact_store_overwrites_by_name() {
        let db = Database::in_memory().await.unwrap();
        let store = SqliteModelArtifactStore::new(db.pool.clone());
        assert!(store.load("t").await.unwrap().is_none());

        let first = ModelArtifact {
            topology: "{}".into(),
            weights: vec![1, 2, 3, 4],
        };
        let r1 = store.save("t", &first).await.unwrap();
        let second = ModelArtifact {
            topology: "{\"v\":2}".into(),
            weights: vec![5, 6, 7, 8],
        };
        let r2 = store.save("t", &second).await.unwrap();
        assert_ne!(r1, r2);
        assert_eq!(store.load("t").await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_observation_source_filters_and_shapes() {
        let db = Database::in_memory().await.unwrap();
        let source = SqliteObservationSource::new(db.pool.clone());
        let day = |d| NaiveDate::from_ymd_opt(2024, 2, d).unwrap();
        let bars: Vec<_> = (1..=10)
            .map(|d| RawObservation::new("NDX", day(d), 1.0, 2.0, 0.5, d as f64, 10.0))
            .collect();
        assert_eq!(source.save_batch(&bars).await.unwrap(), 10);
        // Upsert keeps a single row per date
        source.save_batch(&bars[..2]).await.unwrap();
        assert_eq!(source.count("NDX").await.unwrap(), 10);

        let query = HistoryQuery {
            tickers: vec!["NDX".into()],
            range: DateRange::new(day(3), day(9)).unwrap(),
            interval: Interval::Daily,
            indicators: IndicatorRequest::all(),
        };
        let got = source.fetch(&query).await.unwrap();
        assert_eq!(got.len(), 7);
        assert_eq!(got[0].close, 3.0);
        assert!(got.iter().all(|b| b.extra.contains_key("rsi14")));
    }
}
