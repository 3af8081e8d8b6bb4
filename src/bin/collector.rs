use std::io::Stdout;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::time;
use tracing::{error, info, warn};

use vmperf::collectors::{CollectionOrchestrator, PassReport};
use vmperf::config::{
    CollectorConfig, CounterDefinitions, PartitionSelector, DEFAULT_MAX_IN_FLIGHT,
};
use vmperf::storage::{JsonSink, MetricSink, SqliteSink};
use vmperf::target::{FixtureTarget, TargetApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Output {
    Json,
    Sqlite,
}

/// Collects vSphere performance counters and inventory summaries.
#[derive(Parser, Debug)]
#[command(name = "vmperf-collector")]
#[command(version, about, long_about = None)]
struct Args {
    /// Inventory snapshot to replay as the target endpoint
    #[arg(short, long, env = "VMPERF_SNAPSHOT")]
    snapshot: PathBuf,

    /// Datacenter to collect: "default", "all" or a datacenter name
    #[arg(long, env = "VMPERF_DATACENTER", default_value = "default")]
    datacenter: String,

    /// Counter definitions file (JSON); built-in lists when absent
    #[arg(short, long, env = "VMPERF_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum concurrent performance queries
    #[arg(long, default_value_t = DEFAULT_MAX_IN_FLIGHT)]
    max_in_flight: usize,

    #[arg(long, value_enum, default_value = "json")]
    output: Output,

    /// SQLite database path (default: ~/.vmperf/vmperf.db)
    #[arg(long)]
    db_path: Option<String>,

    /// Seconds between passes; 0 runs a single pass
    #[arg(short, long, default_value_t = 0)]
    interval: u64,

    /// Log every counter the endpoint advertises
    #[arg(long)]
    log_available_counters: bool,

    /// Enable debug logging
    #[arg(short, long, env = "VMPERF_VERBOSE")]
    verbose: bool,
}

enum Sink {
    Json(JsonSink<Stdout>),
    Sqlite(SqliteSink),
}

impl Sink {
    fn open(args: &Args) -> vmperf::Result<Self> {
        match args.output {
            Output::Json => Ok(Sink::Json(JsonSink::new(std::io::stdout(), false))),
            Output::Sqlite => {
                let sink = SqliteSink::new(args.db_path.clone());
                sink.initialize()?;
                info!("Database initialized at {}", sink.path());
                Ok(Sink::Sqlite(sink))
            }
        }
    }

    fn as_sink(&mut self) -> &mut dyn MetricSink {
        match self {
            Sink::Json(sink) => sink,
            Sink::Sqlite(sink) => sink,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    vmperf::logging::init(args.verbose)?;

    let counters = match &args.config {
        Some(path) => CounterDefinitions::from_file(path)?,
        None => CounterDefinitions::builtin(),
    };
    let config = CollectorConfig {
        partition: args.datacenter.parse::<PartitionSelector>()?,
        counters,
        max_in_flight: args.max_in_flight,
        log_available_counters: args.log_available_counters,
        ..Default::default()
    };

    let target = FixtureTarget::from_file(&args.snapshot)?;
    info!(endpoint = target.name(), datacenter = %config.partition, "Starting collector");

    let orchestrator = CollectionOrchestrator::new(&target, &config)?;
    let mut sink = Sink::open(&args)?;

    if let Sink::Sqlite(storage) = &sink {
        show_stats(storage)?;
    }

    if args.interval == 0 {
        run_pass(&orchestrator, &mut sink)?;
        return Ok(());
    }

    info!("Collecting every {}s, press Ctrl+C to stop", args.interval);
    let mut interval = time::interval(Duration::from_secs(args.interval));

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping collector");
                break;
            }
        }

        // The pass is a chain of blocking round trips.
        let result = tokio::task::block_in_place(|| run_pass(&orchestrator, &mut sink));
        if let Err(e) = result {
            error!(scope = e.scope(), "Collection pass failed: {}", e);
        }

        if let Sink::Sqlite(storage) = &sink {
            show_stats(storage)?;
        }
    }

    Ok(())
}

fn run_pass<T: TargetApi + ?Sized>(
    orchestrator: &CollectionOrchestrator<'_, T>,
    sink: &mut Sink,
) -> vmperf::Result<PassReport> {
    let sink = sink.as_sink();
    let report = orchestrator.run(sink)?;

    for partition in &report.partitions {
        if let Some(err) = &partition.catalog_error {
            warn!(partition = %partition.partition, "Summaries only: {}", err);
        }
        for type_report in &partition.entity_types {
            if let Some(err) = &type_report.error {
                warn!(
                    partition = %partition.partition,
                    entity_type = %type_report.entity_type,
                    "{}",
                    err
                );
            }
        }
    }

    let round = sink.finish()?;
    info!(
        sink = sink.name(),
        "Published {} records (round: {})",
        round.records_count,
        &round.id[..8]
    );
    Ok(report)
}

fn show_stats(storage: &SqliteSink) -> vmperf::Result<()> {
    let stats = storage.get_stats()?;

    println!("📊 Database Statistics:");
    println!("  Total records: {}", stats.total_records);
    println!("  Collection rounds: {}", stats.total_collection_rounds);

    if let Some(size) = stats.database_size_bytes {
        println!("  Database size: {:.2} KB", size as f64 / 1024.0);
    }

    if let Some(latest) = &stats.latest_collection {
        println!(
            "  Latest collection: {} ({} records)",
            latest.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            latest.records_count
        );
    }

    println!();
    Ok(())
}
