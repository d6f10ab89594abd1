//! `reportctl`: report configuration tool.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: flags, with environment fallbacks for the
//!    catalog path, the customer and the log format.
//! 2. **Wire observability**: a `tracing-subscriber` layer writing to stderr,
//!    JSON or human-readable, filtered by `RUST_LOG` (default `info`).
//! 3. **Construct infrastructure**: load the catalog snapshot and inject it
//!    into the translator and validator as every collaborator port.
//! 4. **Run one subcommand**, writing JSON to stdout. `process` runs the
//!    result pipeline in order: splits, row limits, then the aggregator.
//!
//! Exit status is 0 on success, 2 when the input has field errors (printed as
//! a JSON document), and 1 for any other failure.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use catalog::SnapshotCatalog;
use clap::{Parser, Subcommand, ValueEnum};
use reports::field_id::{attribution_group_key, attribution_key};
use reports::ports::{
    Attribution, AttributionDirectory, AttributionGroup, AttributionGroupDirectory,
};
use reports::splits::StructuralSplitValidator;
use reports::{
    apply_aggregator, apply_limits, apply_splits, AttributionGroupId, AttributionId, Cell,
    CustomerId, ExternalReport, FieldError, MetricResolver, Report, ReportConfig, ReportError,
    ReportId, ReportTranslator, ReportValidator, ResultLayout, SplitTranslator,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const ENV_CATALOG: &str = "REPORTCTL_CATALOG";
const ENV_CUSTOMER: &str = "REPORTCTL_CUSTOMER";
const ENV_LOG_FORMAT: &str = "REPORTCTL_LOG_FORMAT";

const EXIT_INVALID: u8 = 2;

#[derive(Parser)]
#[command(name = "reportctl")]
#[command(version, about = "Translate, validate and post-process report configurations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Catalog snapshot answering metric and attribution lookups
    #[arg(long, global = true, env = ENV_CATALOG)]
    catalog: Option<PathBuf>,

    /// Customer the request is scoped to
    #[arg(long, global = true, env = ENV_CUSTOMER, default_value = "default")]
    customer: String,

    /// Log output format (logs go to stderr)
    #[arg(long, global = true, env = ENV_LOG_FORMAT, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Command {
    /// Print a new report with the default configuration
    New {
        /// Report name
        #[arg(long)]
        name: Option<String>,
    },
    /// Merge an external report into a persisted one, then validate it
    Merge {
        /// Persisted report to update; a new report when omitted
        #[arg(long)]
        report: Option<PathBuf>,

        /// External report to apply
        #[arg(long)]
        external: PathBuf,
    },
    /// Run the business rules against a persisted report
    Validate {
        #[arg(long)]
        report: PathBuf,
    },
    /// Print the complete external form of a persisted report
    Export {
        #[arg(long)]
        report: PathBuf,
    },
    /// Convert query results into percentages
    Aggregate {
        /// percent_total, percent_row or percent_col; other text is rejected
        #[arg(long)]
        aggregator: Option<String>,

        /// Number of leading row-dimension columns
        #[arg(long)]
        rows: usize,

        /// Number of column-dimension columns following the row dimensions
        #[arg(long)]
        cols: usize,

        /// JSON array of result rows
        #[arg(long)]
        result: PathBuf,
    },
    /// Apply a persisted report's splits, row limits and aggregator to query results
    Process {
        #[arg(long)]
        report: PathBuf,

        /// Number of metric cells after the dimension cells
        #[arg(long, default_value_t = 1)]
        metrics: usize,

        /// Metric cell that row limits rank groups by
        #[arg(long, default_value_t = 0)]
        limit_metric: usize,

        /// JSON array of result rows
        #[arg(long)]
        result: PathBuf,
    },
}

/// Core services built from one catalog.
struct Services {
    catalog: Arc<SnapshotCatalog>,
    translator: ReportTranslator,
    validator: ReportValidator,
}

impl Services {
    fn new(catalog: Arc<SnapshotCatalog>) -> Self {
        let metrics = MetricResolver::new(catalog.clone(), catalog.clone());
        let splits = SplitTranslator::new(
            catalog.clone(),
            catalog.clone(),
            Arc::new(StructuralSplitValidator),
        );
        Self {
            translator: ReportTranslator::new(metrics, splits, catalog.clone()),
            validator: ReportValidator::with_default_rules(catalog.clone()),
            catalog,
        }
    }

    /// Attributions named by the splits and attribution groups used as rows.
    async fn result_names(
        &self,
        config: &ReportConfig,
    ) -> Result<(Vec<Attribution>, Vec<AttributionGroup>), ReportError> {
        let attribution_ids: Vec<AttributionId> = config
            .splits
            .iter()
            .flat_map(|s| std::iter::once(&s.origin).chain(s.targets.iter().map(|t| &t.id)))
            .filter_map(|id| attribution_key(id).and_then(|k| AttributionId::new(k)))
            .collect();
        let group_ids: Vec<AttributionGroupId> = config
            .rows
            .iter()
            .filter_map(|id| attribution_group_key(id).and_then(|k| AttributionGroupId::new(k)))
            .collect();

        let attributions = self
            .catalog
            .find_attributions(&attribution_ids)
            .await
            .map_err(|e| ReportError::collaborator("attribution directory", e))?;
        let groups = self
            .catalog
            .find_attribution_groups(&group_ids)
            .await
            .map_err(|e| ReportError::collaborator("attribution group directory", e))?;
        Ok((attributions, groups))
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    match run(&cli).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => match err.downcast_ref::<ReportError>() {
            Some(ReportError::Validation(errors)) => {
                print_json(&ValidationReport { errors })?;
                Ok(ExitCode::from(EXIT_INVALID))
            }
            Some(report_error) => {
                error!(error = ?err, "command failed");
                Err(anyhow::anyhow!(report_error.client_message()))
            }
            None => Err(err),
        },
    }
}

#[derive(Serialize)]
struct ValidationReport<'a> {
    errors: &'a [FieldError],
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::New { name } => {
            let mut report = Report::new_default();
            report.id = Some(ReportId::new_random());
            if let Some(name) = name {
                report.name = name.clone();
            }
            print_json(&report)
        }
        Command::Merge { report, external } => {
            let services = services(cli).await?;
            let customer = customer(cli)?;
            let external: ExternalReport = read_json(external).await?;
            let mut report = match report {
                Some(path) => read_json(path).await?,
                None => Report::new_default(),
            };

            services
                .translator
                .update_report_with_external(&customer, &mut report, &external)
                .await?;
            services.validator.validate(&report).await?;
            if report.id.is_none() {
                report.id = Some(ReportId::new_random());
            }

            info!(report = %report.name, "merged report");
            print_json(&report)
        }
        Command::Validate { report } => {
            let services = services(cli).await?;
            let report: Report = read_json(report).await?;
            services.validator.validate(&report).await?;
            info!(report = %report.name, "report is valid");
            Ok(())
        }
        Command::Export { report } => {
            let services = services(cli).await?;
            let customer = customer(cli)?;
            let report: Report = read_json(report).await?;
            let external = services.translator.report_to_external(&customer, &report).await?;
            print_json(&external)
        }
        Command::Aggregate {
            aggregator,
            rows,
            cols,
            result,
        } => {
            let mut table: Vec<Vec<Cell>> = read_json(result).await?;
            apply_aggregator(aggregator.as_deref(), *rows, *cols, &mut table)?;
            print_json(&table)
        }
        Command::Process {
            report,
            metrics,
            limit_metric,
            result,
        } => {
            let services = services(cli).await?;
            let report: Report = read_json(report).await?;
            let mut table: Vec<Vec<Cell>> = read_json(result).await?;
            let config = &report.config;
            let layout = ResultLayout::for_config(config, *metrics);
            let (attributions, groups) = services.result_names(config).await?;

            apply_splits(&config.splits, &layout, &attributions, &mut table)?;
            let mut table = apply_limits(config, &layout, *limit_metric, &groups, table)?;
            apply_aggregator(
                Some(config.aggregator.as_str()),
                layout.rows.len(),
                layout.cols.len(),
                &mut table,
            )?;

            info!(report = %report.name, rows = table.len(), "processed result");
            print_json(&table)
        }
    }
}

async fn services(cli: &Cli) -> Result<Services> {
    let catalog = match &cli.catalog {
        Some(path) => SnapshotCatalog::load(path)
            .await
            .with_context(|| format!("loading catalog {}", path.display()))?,
        None => {
            info!("no catalog configured; every lookup will miss");
            SnapshotCatalog::empty()
        }
    };
    Ok(Services::new(Arc::new(catalog)))
}

fn customer(cli: &Cli) -> Result<CustomerId> {
    CustomerId::new(cli.customer.clone()).context("customer must not be empty")
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.compact().init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "reportctl",
            "aggregate",
            "--aggregator",
            "percent_row",
            "--rows",
            "1",
            "--cols",
            "1",
            "--result",
            "rows.json",
            "--customer",
            "c1",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.customer, "c1");
        assert!(matches!(cli.log_format, LogFormat::Json));
        assert!(matches!(
            cli.command,
            Command::Aggregate { rows: 1, cols: 1, .. }
        ));
    }

    #[test]
    fn process_defaults_to_one_metric() {
        let cli = Cli::try_parse_from([
            "reportctl",
            "process",
            "--report",
            "report.json",
            "--result",
            "rows.json",
        ])
        .unwrap();

        assert!(matches!(
            cli.command,
            Command::Process {
                metrics: 1,
                limit_metric: 0,
                ..
            }
        ));
    }

    #[test]
    fn merge_requires_external() {
        assert!(Cli::try_parse_from(["reportctl", "merge"]).is_err());
    }

    #[tokio::test]
    async fn result_names_come_from_the_catalog() {
        let catalog = SnapshotCatalog::from_json(
            r#"{
                "attributions": [{"id": "333", "name": "Shared"}],
                "attributionGroups": [{"id": "111", "name": "Teams"}]
            }"#,
        )
        .unwrap();
        let services = Services::new(Arc::new(catalog));
        let mut report = Report::new_default();
        report.config.rows = vec!["attribution_group:111".into()];
        report.config.splits = vec![reports::config::Split {
            id: "attribution_group:111".into(),
            field_type: reports::FieldType::AttributionGroup,
            mode: reports::types::SplitMode::Even,
            origin: "attribution:333".into(),
            include_origin: false,
            targets: Vec::new(),
        }];

        let (attributions, groups) = services.result_names(&report.config).await.unwrap();
        assert_eq!(attributions[0].name, "Shared");
        assert_eq!(groups[0].name, "Teams");
    }

    #[tokio::test]
    async fn empty_catalog_services_accept_the_default_report() {
        let services = Services::new(Arc::new(SnapshotCatalog::empty()));
        services.validator.validate(&Report::new_default()).await.unwrap();
    }
}
