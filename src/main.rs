use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{debug, error, info};

use urbanlens::config::Config;
use urbanlens::constants::{
    CRIME_RANKING_FILE, CRIME_RATES_DIR, SALARY_AGGREGATE_FILE, ZORI_RAW_FILE, ZORI_TRAILING_MONTHS,
    ZORI_YEARLY_FILE, ZORI_YEARLY_YEARS,
};
use urbanlens::logging;
use urbanlens::pipeline::{CacheUse, Pipeline, RankOutcome, RankReport, RankRequest};
use urbanlens::prepare::{crime_rates, salary, zori, PrepareSummary};
use urbanlens::query::{Aggregate, ZoriTable};

#[derive(Parser)]
#[command(name = "urbanlens")]
#[command(about = "Rank cities by salary, rent and safety for a job and state")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to config.toml
    #[arg(long, global = true, env = "URBANLENS_CONFIG")]
    config: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank the most affordable cities for a job in a state
    Rank {
        /// Job title or menu number (prompted when omitted)
        #[arg(long)]
        job: Option<String>,
        /// State code or full name (prompted when omitted)
        #[arg(long)]
        state: Option<String>,
        /// Number of cities to return
        #[arg(long)]
        top: Option<usize>,
        /// Recompute even when a fresh snapshot exists
        #[arg(long)]
        force: bool,
    },
    /// List the configured job titles
    Jobs,
    /// Average the trailing months of the raw ZORI city file into the rent table
    PrepareRent {
        #[arg(long)]
        raw: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = ZORI_TRAILING_MONTHS)]
        months: usize,
    },
    /// Average the raw ZORI file by calendar year (avg_<year> columns)
    ZoriYearly {
        #[arg(long)]
        raw: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Comma-separated years, e.g. 2024,2025
        #[arg(long, value_delimiter = ',')]
        years: Vec<i32>,
    },
    /// Build the state crime tables from saved FBI rate responses
    PrepareCrime {
        /// Directory holding <ST>_V.json and <ST>_P.json
        #[arg(long)]
        rates_dir: Option<PathBuf>,
        #[arg(long)]
        ranking_out: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Copy the aggregated salary export into every job's salary file
    SplitSalary {
        #[arg(long)]
        source: Option<PathBuf>,
    },
    /// Look up a ZORI value by city/state and month
    ZoriQuery {
        #[arg(long)]
        csv: Option<PathBuf>,
        /// City name; aggregates over the state when omitted
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        state: Option<String>,
        /// Year-month such as 2024-07
        #[arg(long)]
        ym: Option<String>,
        /// For state-only queries: mean, median, min or max
        #[arg(long, default_value = "mean")]
        aggregate: String,
        /// List the month columns and exit
        #[arg(long)]
        list_dates: bool,
        /// Print the query context along with the value
        #[arg(long)]
        explain: bool,
    },
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let _guard = logging::init_logging(cli.verbose);

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    debug!("Data directory: {}", config.paths.data_dir.display());

    match cli.command {
        Commands::Rank {
            job,
            state,
            top,
            force,
        } => {
            let interactive = job.is_none() || state.is_none();
            if interactive {
                let stdin = io::stdin();
                run_interactive(&config, &mut stdin.lock(), &mut io::stdout(), job, state, top, force)?;
            } else {
                let request = RankRequest {
                    job: job.unwrap_or_default(),
                    state: state.unwrap_or_default(),
                    top_n: top,
                    force,
                };
                run_rank(&config, &request)?;
            }
        }
        Commands::Jobs => {
            for (i, job) in config.jobs.iter().enumerate() {
                let path = config.salary_path(job);
                let marker = if path.is_file() { "✓" } else { "⚠ missing" };
                println!("{}. {} ({}) {}", i + 1, job.title, path.display(), marker);
            }
        }
        Commands::PrepareRent { raw, out, months } => {
            let raw = raw.unwrap_or_else(|| config.paths.data_dir.join(ZORI_RAW_FILE));
            let out = out.unwrap_or_else(|| config.rent_path());
            println!("🏠 Preparing rent table from {}...", raw.display());
            let summary = zori::prepare_rent(&raw, &out, months)
                .with_context(|| format!("failed to prepare rent table from {}", raw.display()))?;
            print_summary(&summary);
        }
        Commands::ZoriYearly { raw, out, years } => {
            let raw = raw.unwrap_or_else(|| config.paths.data_dir.join(ZORI_RAW_FILE));
            let out = out.unwrap_or_else(|| config.paths.data_dir.join(ZORI_YEARLY_FILE));
            let years = if years.is_empty() {
                ZORI_YEARLY_YEARS.to_vec()
            } else {
                years
            };
            println!("📅 Averaging {} by year...", raw.display());
            let summary = zori::prepare_yearly_rent(&raw, &out, &years)
                .with_context(|| format!("failed to average {} by year", raw.display()))?;
            print_summary(&summary);
        }
        Commands::PrepareCrime {
            rates_dir,
            ranking_out,
            out,
        } => {
            let rates_dir = rates_dir.unwrap_or_else(|| config.paths.data_dir.join(CRIME_RATES_DIR));
            let ranking_out =
                ranking_out.unwrap_or_else(|| config.paths.data_dir.join(CRIME_RANKING_FILE));
            let out = out.unwrap_or_else(|| config.crime_path());
            println!("🚓 Preparing crime tables from {}...", rates_dir.display());
            let summary = crime_rates::prepare_crime(&rates_dir, &ranking_out, &out)
                .context("failed to prepare crime tables")?;
            print_summary(&summary);
        }
        Commands::SplitSalary { source } => {
            let source = source.unwrap_or_else(|| config.paths.data_dir.join(SALARY_AGGREGATE_FILE));
            let targets: Vec<PathBuf> = config.jobs.iter().map(|job| config.salary_path(job)).collect();
            println!("💼 Splitting {} into {} job files...", source.display(), targets.len());
            let summary = salary::split_salary(&source, &targets)
                .with_context(|| format!("failed to split {}", source.display()))?;
            print_summary(&summary);
        }
        Commands::ZoriQuery {
            csv,
            city,
            state,
            ym,
            aggregate,
            list_dates,
            explain,
        } => {
            let csv = csv.unwrap_or_else(|| config.paths.data_dir.join(ZORI_RAW_FILE));
            let table = ZoriTable::load(&csv)
                .with_context(|| format!("failed to load {}", csv.display()))?;

            if list_dates {
                let dates: Vec<String> = table.dates().iter().map(|d| d.to_string()).collect();
                println!("{}", dates.join(", "));
                return Ok(());
            }

            let Some(state) = state else {
                bail!("--state is required unless you use --list-dates");
            };
            let Some(ym) = ym else {
                bail!("--ym is required unless you use --list-dates");
            };
            let aggregate: Aggregate = aggregate.parse()?;

            let value = match &city {
                Some(city) => table.city_value(city, &state, &ym)?,
                None => table.state_value(&state, &ym, aggregate)?,
            };
            if explain {
                let who = match &city {
                    Some(city) => format!("City='{city}', State='{state}'"),
                    None => format!("State='{state}', agg='{aggregate}'"),
                };
                println!("{who}, YM='{ym}' → {value}");
            } else {
                println!("{value}");
            }
        }
    }
    Ok(())
}

fn run_rank(config: &Config, request: &RankRequest) -> Result<()> {
    let pipeline = Pipeline::new(config);
    println!("\nAnalyzing {} positions in {}...", request.job, request.state);
    match pipeline.rank(request)? {
        RankOutcome::Ranked(report) => print_report(&report, config),
        RankOutcome::NoData(report) => {
            println!(
                "⚠ No matching cities found for {} in {}",
                report.job, report.state
            );
            print_drops(&report);
        }
    }
    Ok(())
}

fn prompt<R: BufRead, W: Write>(input: &mut R, out: &mut W, message: &str) -> Result<Option<String>> {
    write!(out, "{message}")?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Ends an interactive session, surfacing the most recent failed analysis so
/// the process exits non-zero.
fn finish<W: Write>(out: &mut W, last_error: Option<anyhow::Error>) -> Result<()> {
    writeln!(out, "Thank you for using our system. Goodbye!")?;
    match last_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn run_interactive<R: BufRead, W: Write>(
    config: &Config,
    input: &mut R,
    out: &mut W,
    job: Option<String>,
    state: Option<String>,
    top: Option<usize>,
    force: bool,
) -> Result<()> {
    let mut last_error = None;
    loop {
        let job = match &job {
            Some(job) => job.clone(),
            None => {
                writeln!(out, "\nPlease select a job position:")?;
                for (i, job) in config.jobs.iter().enumerate() {
                    writeln!(out, "{}. {}", i + 1, job.title)?;
                }
                writeln!(out, "0. Exit Program")?;
                let message = format!("\nEnter job number (0-{}): ", config.jobs.len());
                match prompt(input, out, &message)? {
                    Some(choice) if choice != "0" => choice,
                    _ => return finish(out, last_error),
                }
            }
        };

        let state = match &state {
            Some(state) => state.clone(),
            None => match prompt(input, out, "Enter state abbreviation (e.g., CA, NY, TX): ")? {
                None => return finish(out, last_error),
                Some(state) if state.is_empty() => {
                    writeln!(out, "⚠ State name cannot be empty")?;
                    continue;
                }
                Some(state) => state,
            },
        };

        let request = RankRequest {
            job,
            state,
            top_n: top,
            force,
        };
        match run_rank(config, &request) {
            Ok(()) => last_error = None,
            Err(e) => {
                error!("Ranking failed: {:#}", e);
                writeln!(out, "⚠ Error: {e:#}")?;
                last_error = Some(e);
            }
        }

        match prompt(input, out, "\nContinue analysis? (y/n): ")? {
            Some(answer) if answer.eq_ignore_ascii_case("y") => continue,
            _ => return finish(out, last_error),
        }
    }
}

fn print_report(report: &RankReport, config: &Config) {
    let rule = "-".repeat(80);
    let crime = report
        .crime_score
        .map(|score| format!("{score:.2}"))
        .unwrap_or_else(|| "n/a".to_string());

    println!("\n{rule}");
    println!(
        "{} State (Crime Score: {}) - {} Position - Top {} Recommended Cities",
        report.state, crime, report.job, report.top_n
    );
    println!("{rule}");
    println!(
        "{:<4} {:<20} {:<14} {:<12} {:<12}",
        "Rank", "City", "Avg Salary($)", "Avg Rent($)", "Comp. Index"
    );
    println!("{rule}");
    for row in &report.rows {
        println!(
            "{:<4} {:<20} {:<14} {:<12} {:<12.2}",
            row.rank,
            row.city,
            with_thousands(row.salary),
            with_thousands(row.rent),
            row.affordability_index
        );
    }
    println!("{}", "=".repeat(80));
    println!("Note: {}", config.index.describe());
    println!(" Higher composite index indicates better balance between salary, cost of living, and safety");

    match &report.cache {
        CacheUse::Reused => println!("\n📦 Reused snapshot"),
        CacheUse::Computed { reason } => {
            info!("Recomputed ranking ({})", reason);
        }
    }
    if let Some(path) = &report.output_file {
        println!("   Output file: {}", path.display());
    }
    print_drops(report);
}

fn print_drops(report: &RankReport) {
    if !report.drops.is_empty() {
        println!("\n⚠️  Dropped {} rows: {}", report.drops.total(), report.drops);
    }
}

fn print_summary(summary: &PrepareSummary) {
    println!("✅ Wrote {} rows ({} skipped)", summary.rows_written, summary.rows_skipped);
    for file in &summary.output_files {
        println!("   Output file: {}", file.display());
    }
}

/// Whole-dollar amount with comma separators.
fn with_thousands(value: f64) -> String {
    let digits = format!("{:.0}", value.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if value < 0.0 {
        out.insert(0, '-');
    }
    out
}
