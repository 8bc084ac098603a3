use std::{
    io::{self, Write},
    path::PathBuf,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gymcrowd::{
    common::{Stage, DEFAULT_URL, DEFAULT_USER_AGENT},
    data::{registry::DEFAULT_GYMS, Database},
    reconcile::resolve::{resolver, MatchStrategy},
    scraper::{fetch::Fetcher, scrape, RunReport},
};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
/// Keeps the gym crowd table in sync with the Connect2Concepts occupancy page.
struct Args {
    /// Deployment stage, picks the default database file
    #[arg(long, env = "STAGE", default_value = "local")]
    stage: String,

    /// SQLite database to write to, overriding the stage default
    #[arg(long, env = "GYMCROWD_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch the occupancy page and upsert crowd data for every known gym
    Scrape(ScrapeArgs),
    /// Insert or refresh the built-in list of gyms
    Seed,
    /// Print the latest crowd data of every gym
    Status {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct ScrapeArgs {
    #[arg(long, env = "GYMCROWD_URL", default_value = DEFAULT_URL)]
    url: String,

    #[arg(long, env = "GYMCROWD_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Wait before the single retry of a failed request, in milliseconds
    #[arg(long, value_name = "MILLIS", default_value_t = 2000)]
    retry_delay: u64,

    /// How scraped names are matched against registered gyms
    #[arg(long, value_enum, default_value_t = MatchStrategy::Exact)]
    matching: MatchStrategy,

    /// Keep running, scraping every SECONDS. A failed run is logged and retried on the next
    /// tick
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    interval: Option<u64>,

    /// Seed the gym registry before the first run
    #[arg(long, default_value_t = false)]
    seed: bool,

    /// Print each run report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| ["crowd_scraper=info", "gymcrowd=debug"].join(",").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let path = args
        .db
        .unwrap_or_else(|| Stage::from(args.stage).default_db_path());
    let db = Database::open(&path)?;
    info!("using database {}", path.display());

    match args.command {
        Command::Scrape(scrape_args) => run(&db, scrape_args).await,
        Command::Seed => {
            db.seed_gyms(DEFAULT_GYMS)?;
            Ok(())
        }
        Command::Status { json } => status(&db, json),
    }
}

async fn run(db: &Database, args: ScrapeArgs) -> Result<()> {
    if args.seed {
        db.seed_gyms(DEFAULT_GYMS)?;
    }

    let fetcher = Fetcher::new(
        &args.url,
        &args.user_agent,
        Duration::from_secs(args.timeout),
        Duration::from_millis(args.retry_delay),
    )?;

    let Some(period) = args.interval else {
        let report = run_once(db, &fetcher, args.matching).await?;
        return print_report(&report, args.json, &mut io::stdout().lock());
    };

    let mut ticker = tokio::time::interval(Duration::from_secs(period));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let result = run_once(db, &fetcher, args.matching).await;
        finish_tick(result, args.json, &mut io::stdout().lock(), period);
    }
}

/// Reports one interval run. Nothing that goes wrong here stops the loop.
fn finish_tick(result: Result<RunReport>, json: bool, out: &mut impl Write, period: u64) {
    let outcome = result.and_then(|report| print_report(&report, json, out));
    if let Err(e) = outcome {
        error!("scrape failed, retrying in {period}s: {e:#}");
    }
}

async fn run_once(db: &Database, fetcher: &Fetcher, matching: MatchStrategy) -> Result<RunReport> {
    let resolver = resolver(matching, db)?;
    let report = scrape(fetcher, resolver.as_ref(), db)
        .await
        .context("scrape aborted")?;
    report.log();
    Ok(report)
}

fn print_report(report: &RunReport, json: bool, out: &mut impl Write) -> Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string(report)?).context("failed to print report")?;
    }
    Ok(())
}

fn status(db: &Database, json: bool) -> Result<()> {
    let statuses = db.crowd_data()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    for status in statuses {
        let Some(occupancy) = status.occupancy else {
            println!("{}: no data", status.gym.name);
            continue;
        };
        let percentage = occupancy
            .percentage_full
            .map(|p| format!("{p}%"))
            .unwrap_or_else(|| "NA".to_string());
        let updated = occupancy
            .updated_at
            .map(|t| t.to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{}: {} people, {} full, updated {}",
            status.gym.name, occupancy.occupancy_count, percentage, updated
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use gymcrowd::reconcile::ReconcileReport;

    use super::*;

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
    }

    fn report() -> RunReport {
        RunReport {
            status: 200,
            fragments: 0,
            extracted: 0,
            skipped: vec![],
            reconcile: ReconcileReport::default(),
        }
    }

    #[test]
    fn print_report_surfaces_write_errors() {
        assert!(print_report(&report(), true, &mut ClosedPipe).is_err());
        assert!(print_report(&report(), false, &mut ClosedPipe).is_ok());

        let mut out = Vec::new();
        print_report(&report(), true, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("{\"status\":200"));
    }

    #[test]
    fn failed_tick_does_not_stop_the_loop() {
        finish_tick(Ok(report()), true, &mut ClosedPipe, 60);
        finish_tick(Err(anyhow!("scrape aborted")), true, &mut ClosedPipe, 60);
    }
}
