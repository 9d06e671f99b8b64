//! KleptoSyn CLI
//!
//! - `generate`: sample a population, plant motifs, write graph + events + manifest
//! - `motifs`: list the catalog or check template files
//! - `config init`: emit the default generation config
//! - `inspect`: summarize (and optionally prune) a node-link graph

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use kleptosyn_motif::{MotifLibrary, Relation};
use kleptosyn_synth::{Generation, Generator, NodeLinkGraph, SynthConfig};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kleptosyn")]
#[command(
    author,
    version,
    about = "KleptoSyn: motif-driven synthetic investigative graphs"
)]
struct Cli {
    /// More log output (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a labeled graph, its transaction log and a manifest.
    Generate(GenerateArgs),

    /// Motif template catalog.
    Motifs {
        #[command(subcommand)]
        command: MotifsCommands,
    },

    /// Generation config helpers.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Summarize a node-link graph written by `generate`.
    Inspect {
        /// Node-link JSON file
        graph: PathBuf,
        /// Drop weak components smaller than this from the `--out` copy
        #[arg(long)]
        min_component: Option<usize>,
        /// Write the (pruned) graph here
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// Generation config (JSON). Built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directories of additional motif templates (`*.json`)
    #[arg(long = "motifs")]
    motif_dirs: Vec<PathBuf>,
    /// Output directory
    #[arg(short, long, default_value = "out")]
    out_dir: PathBuf,
    /// Override the config seed
    #[arg(long)]
    seed: Option<u64>,
    /// Plan motif instances on the calling thread only
    #[arg(long)]
    serial: bool,
}

#[derive(Subcommand)]
enum MotifsCommands {
    /// List built-in templates plus any loaded from `--dir`.
    List {
        #[arg(long = "dir")]
        dirs: Vec<PathBuf>,
    },
    /// Validate template files or directories of them.
    Check {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write the default config (stdout when `--out` is omitted).
    Init {
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Generate(args) => cmd_generate(&args),
        Commands::Motifs { command } => match command {
            MotifsCommands::List { dirs } => cmd_motifs_list(&dirs),
            MotifsCommands::Check { paths } => cmd_motifs_check(&paths),
        },
        Commands::Config { command } => match command {
            ConfigCommands::Init { out } => cmd_config_init(out.as_deref()),
        },
        Commands::Inspect {
            graph,
            min_component,
            out,
        } => cmd_inspect(&graph, min_component, out.as_deref()),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "kleptosyn_synth={level},kleptosyn_motif={level},warn"
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_library(dirs: &[PathBuf]) -> Result<MotifLibrary> {
    let mut library = MotifLibrary::builtin().context("built-in motif catalog is invalid")?;
    for dir in dirs {
        let names = library
            .load_dir(dir)
            .with_context(|| format!("loading motif templates from {}", dir.display()))?;
        tracing::info!(dir = %dir.display(), templates = names.len(), "loaded motif templates");
    }
    Ok(library)
}

// ============================================================================
// generate
// ============================================================================

fn cmd_generate(args: &GenerateArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => SynthConfig::load(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => SynthConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.serial {
        config.parallel = false;
    }

    let library = load_library(&args.motif_dirs)?;
    let generator = Generator::new(config, library)?;
    let generation = generator.run()?;
    let paths = generator.write_outputs(&generation, &args.out_dir)?;

    print_summary(&generation);
    for path in [&paths.graph, &paths.events, &paths.transactions, &paths.manifest] {
        eprintln!("{} {}", "wrote".green().bold(), path.display().to_string().bold());
    }
    Ok(())
}

fn print_summary(generation: &Generation) {
    let report = &generation.report;
    let counts = &report.counts;
    println!(
        "{} seed {}: {} entities ({} anomalies), {} edges ({} motif, {} background), {} events, {} components",
        "generated".green().bold(),
        report.seed,
        counts.entities,
        counts.anomalies,
        counts.edges,
        counts.motif_edges,
        counts.background_edges,
        counts.events,
        counts.components
    );
    for row in &report.templates {
        let status = if row.dropped == 0 {
            "ok".green().bold()
        } else {
            "partial".yellow().bold()
        };
        let relaxed = if row.relaxed > 0 {
            format!(", {} relaxed", row.relaxed)
        } else {
            String::new()
        };
        println!(
            "  {:<8} {:<20} {}/{} achieved, {} dropped{relaxed}",
            status, row.template, row.achieved, row.requested, row.dropped
        );
    }
    for dropped in &report.dropped {
        println!(
            "  {} {} ({:?}): {}",
            "dropped".yellow().bold(),
            dropped.instance,
            dropped.reason,
            dropped.detail
        );
    }
}

// ============================================================================
// motifs
// ============================================================================

fn cmd_motifs_list(dirs: &[PathBuf]) -> Result<()> {
    let library = load_library(dirs)?;
    for template in library.iter() {
        let t = template.template();
        println!(
            "{:<20} {:<6} {} roles, {} edges  {}",
            t.name.as_str().bold(),
            t.shape.label(),
            t.roles.len(),
            t.edges.len(),
            t.description.as_str().dimmed()
        );
    }
    Ok(())
}

fn cmd_motifs_check(paths: &[PathBuf]) -> Result<()> {
    let mut failures = 0usize;
    for path in paths {
        let mut library = MotifLibrary::new();
        let result = if path.is_dir() {
            library.load_dir(path).map(|names| names.len())
        } else {
            library.load_file(path).map(|_| 1)
        };
        match result {
            Ok(n) => println!("{} {} ({n} template(s))", "ok".green().bold(), path.display()),
            Err(err) => {
                failures += 1;
                println!("{} {}: {err}", "error".red().bold(), path.display());
            }
        }
    }
    if failures > 0 {
        return Err(anyhow!("{failures} of {} path(s) failed validation", paths.len()));
    }
    Ok(())
}

// ============================================================================
// config
// ============================================================================

fn cmd_config_init(out: Option<&Path>) -> Result<()> {
    let text = SynthConfig::default().to_json_pretty()? + "\n";
    match out {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("{} {}", "wrote".green().bold(), path.display().to_string().bold());
        }
        None => print!("{text}"),
    }
    Ok(())
}

// ============================================================================
// inspect
// ============================================================================

fn cmd_inspect(path: &Path, min_component: Option<usize>, out: Option<&Path>) -> Result<()> {
    let doc = NodeLinkGraph::read(path)
        .with_context(|| format!("reading graph {}", path.display()))?;
    let graph = doc
        .to_graph()
        .with_context(|| format!("{} is not a consistent graph", path.display()))?;

    let mut by_relation: BTreeMap<&'static str, (usize, usize)> = BTreeMap::new();
    for e in graph.edges() {
        let entry = by_relation.entry(e.relation.as_str()).or_default();
        if e.origin.is_background() {
            entry.1 += 1;
        } else {
            entry.0 += 1;
        }
    }
    let transfers = graph
        .edges()
        .iter()
        .filter(|e| e.relation == Relation::Transfer)
        .count();

    println!(
        "{} {}: {} nodes, {} edges ({} transfers), {} components (seed {})",
        "graph".green().bold(),
        path.display(),
        graph.node_count(),
        graph.edge_count(),
        transfers,
        graph.component_count(),
        doc.graph.seed
    );
    for (relation, (motif, background)) in &by_relation {
        println!("  {relation:<12} {motif:>6} motif {background:>6} background");
    }

    let mut central: Vec<_> = graph.nodes().iter().collect();
    central.sort_by(|a, b| {
        b.metrics
            .degree_centrality
            .total_cmp(&a.metrics.degree_centrality)
            .then(a.entity.id.cmp(&b.entity.id))
    });
    println!("  {}", "most central:".bold());
    for node in central.iter().take(5) {
        println!(
            "    {:>5} {:<32} {} {:.4}",
            node.entity.id.index(),
            node.entity.name,
            node.entity.country,
            node.metrics.degree_centrality
        );
    }

    let doc = match min_component {
        Some(min) => {
            let pruned = doc.prune_components(min);
            println!(
                "  pruned components below {min}: {} nodes, {} edges remain",
                pruned.nodes.len(),
                pruned.edges.len()
            );
            pruned
        }
        None => doc,
    };
    if let Some(out) = out {
        doc.write(out)?;
        eprintln!("{} {}", "wrote".green().bold(), out.display().to_string().bold());
    }
    Ok(())
}
