use anyhow::{Context, Result};
use clap::Parser;
use speedwell::config::Config;
use speedwell::formats;
use speedwell::optimizer::Optimizer;
use speedwell::scorer::DefaultScorer;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Transit graph as JSON (see formats::GraphFile).
    graph: PathBuf,

    /// Optimizer configuration as JSON; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the resulting per-edge ordering as JSON here instead of stdout.
    #[arg(short, long)]
    ordering_out: Option<PathBuf>,

    /// Dump the model as MPS.
    #[arg(long)]
    mps_out: Option<PathBuf>,

    /// Dump the model in human readable form.
    #[arg(long)]
    human_readable_out: Option<PathBuf>,

    /// Dump the full MIP solution.
    #[arg(long)]
    solution_out: Option<PathBuf>,

    /// External solver command template ({INPUT}, {OUTPUT}, {THREADS}).
    #[arg(long)]
    external_solver: Option<String>,

    /// Overall solve time limit in milliseconds.
    #[arg(long)]
    time_limit_ms: Option<u64>,

    /// Skip the chain-collapsing simplification pass.
    #[arg(long)]
    no_simplify: bool,

    /// Log optimization graph and ILP statistics.
    #[arg(long)]
    stats: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut cfg: Config = match &args.config {
        Some(path) => {
            let f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            serde_json::from_reader(BufReader::new(f))
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => Config::default(),
    };

    // CLI flags override the config file.
    if args.no_simplify {
        cfg.create_core_optim_graph = false;
    }
    if args.stats {
        cfg.output_stats = true;
    }
    if let Some(v) = args.time_limit_ms {
        cfg.time_limit_ms = Some(v);
    }
    if args.external_solver.is_some() {
        cfg.external_solver = args.external_solver.clone();
    }
    if args.mps_out.is_some() {
        cfg.mps_output_path = args.mps_out.clone();
    }
    if args.human_readable_out.is_some() {
        cfg.human_readable_output_path = args.human_readable_out.clone();
    }
    if args.solution_out.is_some() {
        cfg.solution_output_path = args.solution_out.clone();
    }

    let f = File::open(&args.graph)
        .with_context(|| format!("opening {}", args.graph.display()))?;
    let file: formats::GraphFile = serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("parsing {}", args.graph.display()))?;
    let mut g = formats::build_graph(&file)?;

    println!(
        "Loaded graph '{}': {} nodes, {} edges",
        g.name,
        g.num_nodes(),
        g.num_edges()
    );

    let scorer = DefaultScorer::default();
    let summary = Optimizer::new(&cfg, &scorer).optimize(&mut g)?;

    println!(
        "Solved in {} ms, objective {} ({} cols, {} rows)",
        summary.solve_time.as_millis(),
        summary.objective,
        summary.num_cols,
        summary.num_rows
    );

    let out = formats::ordering_file(&g);
    match &args.ordering_out {
        Some(path) => {
            let f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            serde_json::to_writer_pretty(f, &out)?;
            println!("Ordering written to {}", path.display());
        }
        None => {
            serde_json::to_writer_pretty(std::io::stdout().lock(), &out)?;
            println!();
        }
    }

    Ok(())
}
