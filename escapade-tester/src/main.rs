mod common;
mod logic;
mod scenario;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::time::Instant;

use common::split_csv;
use logic::{LogicTester, ScenarioResult};
use scenario::{ScenarioCtx, StoreKind, all_scenario_names, get_scenario, list_scenarios};

#[derive(Debug, Parser)]
#[command(name = "escapade-tester", version = "0.1.0")]
#[command(
    about = "Classroom simulation for Escapade - many learner clients racing over one shared store"
)]
struct Args {
    /// Scenarios to run (comma-separated, or "all")
    #[arg(long, default_value = "classroom")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Seeds to run (comma-separated)
    #[arg(long, default_value = "1337")]
    seeds: String,

    /// Number of iterations per scenario and seed
    #[arg(long, default_value_t = 3)]
    iterations: usize,

    /// Simulated learners per scenario
    #[arg(long, default_value_t = 6)]
    learners: u32,

    /// Shared store backing the simulated clients
    #[arg(long, value_enum, default_value_t = StoreKind::Memory)]
    store: StoreKind,

    /// Root directory for file stores (defaults to the system temp dir)
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console"])]
    report: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }

    announce_banner();

    let start_time = Instant::now();
    let scenarios = expand_scenarios(&args.scenarios);
    let seeds = parse_seeds(&args.seeds)?;

    let results = run_scenarios(&args, &scenarios, &seeds).await?;

    write_reports(&args, &results, start_time)?;

    if results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }

    Ok(())
}

fn maybe_list_scenarios(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available scenarios:")?;
    for (key, description) in list_scenarios() {
        writeln!(output_target.writer(), "  {key:15} - {description}")?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "🎓 Escapade Classroom Tester".bright_cyan().bold());
    println!("{}", "============================".cyan());
}

fn expand_scenarios(scenarios_arg: &str) -> Vec<String> {
    let mut scenarios = split_csv(scenarios_arg);
    if scenarios.iter().any(|s| s == "all") {
        scenarios.retain(|s| s != "all");
        for name in all_scenario_names() {
            if !scenarios.contains(&name) {
                scenarios.push(name);
            }
        }
    }
    scenarios
}

fn parse_seeds(seeds_arg: &str) -> Result<Vec<u64>> {
    split_csv(seeds_arg)
        .iter()
        .map(|token| {
            token
                .parse::<u64>()
                .with_context(|| format!("invalid seed {token:?}"))
        })
        .collect()
}

/// Each scenario and seed pair runs on a blocking worker of its own. The
/// simulated clients inside one job share a single thread, like tabs in
/// one browser.
async fn run_scenarios(
    args: &Args,
    scenarios: &[String],
    seeds: &[u64],
) -> Result<Vec<ScenarioResult>> {
    println!("{}", "🧠 Running Scenarios".bright_yellow().bold());
    println!("{}", "-".repeat(30).yellow());

    let tester = LogicTester::new(args.verbose);
    let mut handles = Vec::new();

    for scenario_name in scenarios {
        let Some(scenario) = get_scenario(scenario_name) else {
            eprintln!("⚠️  Unknown scenario: {}", scenario_name.yellow());
            continue;
        };
        for &seed in seeds {
            let ctx = ScenarioCtx {
                seed,
                learners: args.learners,
                store: args.store,
                store_root: args.store_dir.clone(),
                verbose: args.verbose,
            };
            let iterations = args.iterations;
            handles.push(tokio::task::spawn_blocking(move || {
                tester.run_scenario(scenario, &ctx, iterations)
            }));
        }
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        let result = handle.await.context("scenario worker panicked")?;
        log::debug!(
            "{} seed {} finished: passed={}",
            result.scenario_name,
            result.seed,
            result.passed
        );
        results.push(result);
    }
    Ok(results)
}

fn write_reports(args: &Args, results: &[ScenarioResult], start_time: Instant) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report.as_str() {
        "json" => {
            if results.is_empty() {
                writeln!(&mut output_target, "[]")?;
            } else {
                logic::reports::generate_json_report(&mut output_target, results)?;
            }
        }
        "markdown" => {
            if results.is_empty() {
                writeln!(
                    &mut output_target,
                    "# Escapade Classroom Simulation Results\n\n_No scenarios executed._"
                )?;
            } else {
                logic::reports::generate_markdown_report(&mut output_target, results)?;
            }
        }
        _ => {
            let duration = start_time.elapsed();
            if results.is_empty() {
                writeln!(&mut output_target, "No scenarios executed.")?;
            } else {
                logic::reports::generate_console_report(&mut output_target, results, duration)?;
            }
            writeln!(&mut output_target)?;
            writeln!(&mut output_target, "🏁 Total time: {duration:?}")?;
        }
    }

    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}
