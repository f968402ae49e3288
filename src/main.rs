//! lumagraph - Command-line driver for the node-graph engine
//!
//! Loads graph documents, checks them and runs them at a fixed tick rate
//! without any renderer attached.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use lumagraph_rs::config::EngineConfig;
use lumagraph_rs::graph::{
    deserialize, Graph, GraphDocument, LoadReport, NodeType, NodeTypeRegistry, TickInfo,
};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "lumagraph")]
#[command(author, version, about = "Node-graph dataflow engine", long_about = None)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a graph and evaluate it tick by tick
    Run(RunArgs),

    /// Load a graph and report everything the load had to skip
    Check(CheckArgs),

    /// List the registered node types and their ports
    Types,
}

#[derive(Args)]
struct RunArgs {
    /// Graph document (JSON)
    graph: PathBuf,

    /// Ticks per second (overrides config)
    #[arg(long)]
    rate: Option<f64>,

    /// Stop after this many ticks (overrides config)
    #[arg(long)]
    ticks: Option<u64>,

    /// Use a simulated clock and run as fast as possible
    #[arg(long)]
    offline: bool,
}

#[derive(Args)]
struct CheckArgs {
    /// Graph document (JSON)
    graph: PathBuf,

    /// Exit with an error if the load produced warnings
    #[arg(long)]
    strict: bool,
}

fn init_logging(config: &EngineConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .context("Invalid log filter")?;

    let (file_layer, guard) = match &config.logging.log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .context("Log file path has no file name")?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(guard)
}

fn load_graph(path: &Path, config: &EngineConfig) -> anyhow::Result<(Graph, LoadReport)> {
    let doc = GraphDocument::load(path).with_context(|| format!("Failed to load {:?}", path))?;
    let mut graph = Graph::new(NodeTypeRegistry::global(), config.graph.clone());
    let report = deserialize(&mut graph, &doc, false);
    Ok((graph, report))
}

fn run(args: RunArgs, config: &EngineConfig) -> anyhow::Result<()> {
    let rate = args.rate.unwrap_or(config.runtime.tick_rate_hz);
    anyhow::ensure!(rate.is_finite() && rate > 0.0, "Tick rate must be positive");
    let max_ticks = args.ticks.or(config.runtime.max_ticks);

    let (mut graph, report) = load_graph(&args.graph, config)?;
    tracing::info!(
        "Running {:?}: {} node(s) at {} Hz",
        args.graph,
        graph.len(),
        rate
    );
    if !report.is_clean() {
        tracing::warn!("Loaded with {} warning(s)", report.warnings.len());
    }

    let period = Duration::try_from_secs_f64(1.0 / rate)
        .map_err(|e| anyhow::anyhow!("Tick rate {} Hz is too low: {}", rate, e))?;
    let stats_every = rate.ceil().max(1.0) as u64;
    let mut recomputed_total = 0usize;
    let mut tick = 0u64;

    while max_ticks.map_or(true, |max| tick < max) {
        let started = Instant::now();
        let evaluation = if args.offline {
            graph.evaluate_tick(TickInfo::fixed(tick, rate), true)
        } else {
            graph.evaluate(true)
        };
        recomputed_total += evaluation.recomputed.len();
        tick += 1;

        if tick % stats_every == 0 {
            tracing::info!(
                "Tick {}: {:.1} node(s) recomputed per tick",
                tick,
                recomputed_total as f64 / stats_every as f64
            );
            recomputed_total = 0;
        }

        if !args.offline {
            if let Some(rest) = period.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
    }

    tracing::info!("Stopped after {} tick(s)", tick);
    Ok(())
}

fn check(args: CheckArgs, config: &EngineConfig) -> anyhow::Result<()> {
    let (mut graph, report) = load_graph(&args.graph, config)?;

    println!(
        "{} node(s), {} connection(s) loaded",
        graph.len(),
        graph.connection_count()
    );
    if !report.ignored_nodes.is_empty() {
        println!("Ignored node ids: {:?}", report.ignored_nodes);
    }
    if report.skipped_connections > 0 {
        println!("Skipped connections: {}", report.skipped_connections);
    }
    for warning in &report.warnings {
        println!("warning: {}", warning);
    }

    let unordered = graph.unordered_connections().to_vec();
    for c in &unordered {
        println!(
            "cycle: {}.{} -> {}.{} reads a stale value",
            c.src, c.src_port, c.dst, c.dst_port
        );
    }

    if args.strict {
        anyhow::ensure!(
            report.is_clean() && unordered.is_empty(),
            "{} warning(s), {} unordered connection(s)",
            report.warnings.len(),
            unordered.len()
        );
    }
    Ok(())
}

fn types() {
    let registry = NodeTypeRegistry::global();
    for name in registry.names() {
        let Some(descriptor) = registry.get(name) else {
            continue;
        };
        let mut flags = Vec::new();
        if descriptor.is_virtual() {
            flags.push("virtual");
        }
        if descriptor.options().always_evaluate {
            flags.push("always");
        }
        if descriptor.options().breaks_cycles {
            flags.push("delay");
        }

        print!("{}", name);
        if let Some(base) = descriptor.base() {
            print!(" : {}", base);
        }
        if !flags.is_empty() {
            print!(" [{}]", flags.join(", "));
        }
        println!();
        if !descriptor.options().description.is_empty() {
            println!("    {}", descriptor.options().description);
        }
        for port in descriptor.declared_ports() {
            println!("    {} ({})", port.id(), port.dtype);
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = EngineConfig::load_or_default(cli.config.as_deref());
    let _guard = init_logging(&config)?;

    match cli.command {
        Commands::Run(args) => run(args, &config),
        Commands::Check(args) => check(args, &config),
        Commands::Types => {
            types();
            Ok(())
        }
    }
}
