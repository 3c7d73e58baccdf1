use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use factorlab::application::factor_service::FactorService;
use factorlab::application::worker::{JobClient, WorkerContext};
use factorlab::config::{Config, DataSourceKind, Definitions};
use factorlab::domain::factor::{ChartHint, NewFactor};
use factorlab::domain::market::{DateRange, Interval, RawObservation};
use factorlab::domain::ports::{HistoricalDataSource, HistoryQuery, IndicatorRequest};
use factorlab::domain::repositories::{FactorRepository, PageRequest, TaskRepository};
use factorlab::domain::task::TrainingTask;
use factorlab::infrastructure::market_data::CsvObservationSource;
use factorlab::infrastructure::persistence::Database;
use factorlab::infrastructure::persistence::repositories::{
    SqliteFactorRepository, SqliteModelArtifactStore, SqliteObservationSource,
    SqliteTaskRepository,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::prelude::*;

/// Bars used to dry-run a factor before it is stored
const FACTOR_SAMPLE_BARS: usize = 200;

#[derive(Parser)]
#[command(name = "factorlab", version, about = "Factor research and trend-model training")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage factor programs
    Factor {
        #[command(subcommand)]
        action: FactorAction,
    },
    /// Manage training tasks
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Train the model of a stored task
    Train { name: String },
    /// Backtest a trained task over a date range
    Backtest {
        name: String,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
    },
    /// Predict the direction of the next bar
    Predict {
        name: String,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Import every `{TICKER}.csv` of a directory into the database
    Import { dir: PathBuf },
}

#[derive(Subcommand)]
enum FactorAction {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        transform: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "line")]
        chart: ChartHint,
        /// Ticker whose recent bars validate the program
        #[arg(long)]
        sample: String,
    },
    List {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 50)]
        size: usize,
    },
    Check {
        #[arg(long)]
        transform: String,
        #[arg(long)]
        sample: String,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Import factors and tasks from a TOML definitions file
    Add { file: PathBuf },
    List {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 50)]
        size: usize,
    },
}

struct App {
    config: Config,
    factors: Arc<SqliteFactorRepository>,
    tasks: Arc<SqliteTaskRepository>,
    observations: Arc<SqliteObservationSource>,
    ctx: WorkerContext,
}

impl App {
    async fn build(config: Config) -> Result<Self> {
        let db = Database::new(&config.storage.database_url).await?;
        let factors = Arc::new(SqliteFactorRepository::new(db.pool.clone()));
        let tasks = Arc::new(SqliteTaskRepository::new(db.pool.clone()));
        let observations = Arc::new(SqliteObservationSource::new(db.pool.clone()));
        let source: Arc<dyn HistoricalDataSource> = match config.storage.data_source {
            DataSourceKind::Sqlite => observations.clone(),
            DataSourceKind::Csv => Arc::new(CsvObservationSource::new(&config.storage.data_dir)),
        };
        let ctx = WorkerContext {
            source,
            factors: factors.clone(),
            tasks: tasks.clone(),
            artifacts: Arc::new(SqliteModelArtifactStore::new(db.pool.clone())),
            settings: config.job_settings(),
        };
        Ok(Self {
            config,
            factors,
            tasks,
            observations,
            ctx,
        })
    }

    async fn task(&self, name: &str) -> Result<TrainingTask> {
        self.tasks
            .find_by_name(name)
            .await?
            .with_context(|| format!("No task named '{}'", name))
    }

    async fn sample(&self, ticker: &str) -> Result<Vec<RawObservation>> {
        let query = HistoryQuery {
            tickers: vec![ticker.to_string()],
            range: DateRange::new(NaiveDate::MIN, Utc::now().date_naive())?,
            interval: Interval::Daily,
            indicators: IndicatorRequest::all(),
        };
        let mut bars = self.ctx.source.fetch(&query).await?;
        if bars.is_empty() {
            bail!("No bars available for {}", ticker);
        }
        let skip = bars.len().saturating_sub(FACTOR_SAMPLE_BARS);
        Ok(bars.split_off(skip))
    }
}

async fn run(cli: Cli, app: App) -> Result<()> {
    let client = JobClient::new(app.ctx.clone());

    match cli.command {
        Command::Factor { action } => {
            let service = FactorService::new(app.factors.clone());
            match action {
                FactorAction::Add {
                    name,
                    transform,
                    description,
                    chart,
                    sample,
                } => {
                    let sample = app.sample(&sample).await?;
                    let factor = NewFactor {
                        name,
                        description,
                        transform,
                        chart_hint: chart,
                    };
                    let created = service.create(&factor, &sample).await?;
                    println!("{}", serde_json::to_string_pretty(&created)?);
                }
                FactorAction::List { page, size } => {
                    let page = app.factors.list(PageRequest::new(page, size)).await?;
                    println!("{} factor(s)", page.total);
                    for f in page.items {
                        println!("{:>4}  {:<24} {}", f.id, f.name, f.transform.replace('\n', "; "));
                    }
                }
                FactorAction::Check { transform, sample } => {
                    let sample = app.sample(&sample).await?;
                    let keys = service.check(&transform, &sample)?;
                    println!("OK, adds: {}", keys.join(", "));
                }
            }
        }
        Command::Task { action } => match action {
            TaskAction::Add { file } => {
                let defs = Definitions::load(&file)?;
                for factor in &defs.factors {
                    let created = app.factors.create(factor).await?;
                    info!("Imported factor {} ({})", created.id, created.name);
                }
                for task in &defs.tasks {
                    task.validate()
                        .with_context(|| format!("Task '{}' is invalid", task.name))?;
                    app.tasks.create(task).await?;
                    info!("Imported task {}", task.name);
                }
                println!(
                    "Imported {} factor(s) and {} task(s)",
                    defs.factors.len(),
                    defs.tasks.len()
                );
            }
            TaskAction::List { page, size } => {
                let page = app.tasks.list(PageRequest::new(page, size)).await?;
                println!("{} task(s)", page.total);
                for t in page.items {
                    println!(
                        "{:<24} {:<14} W={:<4} {}",
                        t.name,
                        t.model_kind,
                        t.window_length,
                        if t.finished { "trained" } else { "untrained" }
                    );
                }
            }
        },
        Command::Train { name } => {
            let task = app.task(&name).await?;
            let outcome = client
                .train(&task, None, |p| {
                    info!(
                        "epoch {:>3}  loss {:.4}  accuracy {:.3}",
                        p.epoch, p.loss, p.accuracy
                    )
                })
                .await?;
            println!("Trained {} -> {}", outcome.task_name, outcome.artifact_ref);
        }
        Command::Backtest { name, start, end } => {
            let task = app.task(&name).await?;
            let report = client.backtest(&task, DateRange::new(start, end)?).await?;
            let (always, predicted, oracle) = report.final_balances();
            println!("steps:        {}", report.steps);
            println!("accuracy:     {:.3}", report.accuracy_rate);
            println!("baseline:     {:.3}", report.baseline_rate);
            println!("always buy:   {:.2}", always);
            println!("predicted:    {:.2}", predicted);
            println!("oracle:       {:.2}", oracle);
        }
        Command::Predict { name, start, end } => {
            let task = app.task(&name).await?;
            let range = DateRange::new(
                start.unwrap_or(task.date_range.start),
                end.unwrap_or_else(|| Utc::now().date_naive()),
            )?;
            let prediction = client.predict_current(&task, range).await?;
            println!("{}", serde_json::to_string_pretty(&prediction)?);
        }
        Command::Import { dir } => {
            let csv = CsvObservationSource::new(&dir);
            let tickers = csv.tickers()?;
            if tickers.is_empty() {
                warn!("No CSV files found in {:?}", dir);
            }
            for ticker in tickers {
                let bars = csv.read_daily(&ticker).await?;
                let saved = app.observations.save_batch(&bars).await?;
                println!("{:<10} {} bars", ticker, saved);
            }
            if app.config.storage.data_source == DataSourceKind::Csv {
                warn!("DATA_SOURCE=csv: imported bars are not read until DATA_SOURCE=sqlite");
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let app = App::build(config).await?;
    run(cli, app).await
}
