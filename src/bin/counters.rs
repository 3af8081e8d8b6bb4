use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use tracing::error;

use vmperf::collectors::{CollectionOrchestrator, CounterCatalog};
use vmperf::config::{CollectorConfig, PartitionSelector};
use vmperf::target::{FixtureTarget, PartitionRef, TargetApi};

/// Prints the performance counters a datacenter advertises.
#[derive(Parser, Debug)]
#[command(name = "vmperf-counters")]
#[command(version, about, long_about = None)]
struct Args {
    /// Inventory snapshot to replay as the target endpoint
    #[arg(short, long, env = "VMPERF_SNAPSHOT")]
    snapshot: PathBuf,

    /// Datacenter to list: "default", "all" or a datacenter name
    #[arg(long, env = "VMPERF_DATACENTER", default_value = "default")]
    datacenter: String,

    /// Only print counters whose name starts with this prefix
    #[arg(short, long)]
    group: Option<String>,

    #[arg(short, long, env = "VMPERF_VERBOSE")]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    vmperf::logging::init(args.verbose)?;

    let config = CollectorConfig {
        partition: args.datacenter.parse::<PartitionSelector>()?,
        ..Default::default()
    };
    let target = FixtureTarget::from_file(&args.snapshot)?;
    let orchestrator = CollectionOrchestrator::new(&target, &config)?;

    let partitions = orchestrator.resolve_partitions()?;
    let stdout = std::io::stdout();
    write_listing(&mut stdout.lock(), &target, &partitions, args.group.as_deref())?;

    Ok(())
}

/// Writes every partition's catalog as `name [level]`. A partition whose
/// counters cannot be fetched is reported and skipped.
fn write_listing<T: TargetApi + ?Sized, W: Write>(
    out: &mut W,
    target: &T,
    partitions: &[PartitionRef],
    group: Option<&str>,
) -> std::io::Result<()> {
    for partition in partitions {
        let catalog = match CounterCatalog::build(target, partition, false) {
            Ok(catalog) => catalog,
            Err(e) => {
                error!(partition = %partition.name, scope = e.scope(), "{}", e);
                writeln!(out, "{} (counters unavailable)", partition.name)?;
                writeln!(out)?;
                continue;
            }
        };
        writeln!(out, "{} ({} counters)", partition.name, catalog.len())?;

        for (name, level) in catalog.entries() {
            if group.is_some_and(|prefix| !name.starts_with(prefix)) {
                continue;
            }
            writeln!(out, "\t {} [{}]", name, level)?;
        }
        writeln!(out)?;
    }
    Ok(())
}
