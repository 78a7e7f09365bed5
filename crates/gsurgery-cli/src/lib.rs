//! `gsurgery` command-line front end
//!
//! Every subcommand reads a graph file, runs one or more passes and writes
//! the result (or a report). Files ending in `.json` use the JSON form, all
//! others the binary codec.
//!
//! Option files given with `--rules`, `--taxonomy` or `--config` share the
//! pipeline schema; each subcommand reads the section it needs.
//!
//! # Exit status
//!
//! | Code | Meaning |
//! |---|---|
//! | 0 | success |
//! | 1 | I/O or other failure |
//! | 2 | graph file could not be parsed |
//! | 3 | missing output node or unresolved input |
//! | 4 | rewrite failure |
//! | 5 | configuration error |
//! | 6 | structural validation failure |
//! | 64 | invalid command line ([`USAGE_EXIT`]) |

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod report;

pub use report::{JsonSink, TextSink, DEFAULT_TOP};

use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use gsurgery_graph::{to_json, write_graph, Fingerprint, Graph};
use gsurgery_passes::{
    candidates, extract, sanitize, ModelLoader, Pipeline, PipelineConfig, PipelineOutcome,
    ReportSink, Stage, StoreLoader, SurgeryError, SurgeryResult,
};
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit status for arguments clap rejects (`EX_USAGE` from sysexits)
pub const USAGE_EXIT: u8 = 64;

fn graph_arg(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help(help)
}

fn options_arg(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .long(id)
        .value_name("FILE")
        .value_parser(value_parser!(PathBuf))
        .help(help)
}

/// Argument definitions
#[must_use]
pub fn command() -> Command {
    Command::new("gsurgery")
        .version(VERSION)
        .about("Load, analyze and rewrite serialized dataflow graphs")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .global(true)
                .help("Raise log verbosity (-v info, -vv debug, -vvv trace)"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Emit logs as JSON lines on stderr"),
        )
        .subcommand(
            Command::new("inspect")
                .about("Classify operators and report dynamic-shape hazards")
                .arg(graph_arg("graph", "Graph file"))
                .arg(options_arg("taxonomy", "Option file with a [taxonomy] section"))
                .arg(
                    Arg::new("top")
                        .long("top")
                        .default_value("10")
                        .value_parser(value_parser!(usize))
                        .help("Operators shown in the histogram"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("sanitize")
                .about("Drop attributes older consumers reject")
                .arg(graph_arg("input", "Graph to read"))
                .arg(graph_arg("output", "Graph to write"))
                .arg(options_arg("rules", "Option file with [[rules]] entries")),
        )
        .subcommand(
            Command::new("extract")
                .about("Keep only the nodes the given outputs depend on")
                .arg(graph_arg("input", "Graph to read"))
                .arg(graph_arg("output", "Graph to write"))
                .arg(
                    Arg::new("outputs")
                        .long("outputs")
                        .required(true)
                        .value_name("NAMES")
                        .value_delimiter(',')
                        .action(ArgAction::Append)
                        .help("Comma-separated output node names"),
                ),
        )
        .subcommand(
            Command::new("rewrite")
                .about("Replace disallowed operators with pass-through nodes")
                .arg(graph_arg("input", "Graph to read"))
                .arg(graph_arg("output", "Graph to write"))
                .arg(options_arg(
                    "rules",
                    "Option file with a [rewrite] section; its outputs enable the branch check",
                )),
        )
        .subcommand(
            Command::new("run")
                .about("Run a configured pipeline")
                .arg(graph_arg("input", "Graph to read"))
                .arg(graph_arg("output", "Graph to write"))
                .arg(options_arg("config", "Pipeline file (TOML, YAML or JSON)").required(true)),
        )
        .subcommand(
            Command::new("candidates")
                .about("Suggest input and output node names")
                .arg(graph_arg("graph", "Graph file"))
                .arg(
                    Arg::new("op")
                        .long("op")
                        .default_value("Conv2D")
                        .help("Operator of the output heads"),
                )
                .arg(
                    Arg::new("last")
                        .long("last")
                        .default_value("5")
                        .value_parser(value_parser!(usize))
                        .help("Number of trailing head nodes to list"),
                ),
        )
        .subcommand(
            Command::new("validate")
                .about("Check names, references and acyclicity")
                .arg(graph_arg("graph", "Graph file")),
        )
        .subcommand(
            Command::new("dump")
                .about("Print the JSON form of a graph")
                .arg(graph_arg("graph", "Graph file")),
        )
}

/// Install the global subscriber on stderr
///
/// `RUST_LOG` wins over `verbosity`. A second call is a no-op.
pub fn init_tracing(verbosity: u8, json: bool) {
    let default = match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .from_env_lossy();
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    if installed.is_err() {
        tracing::debug!("subscriber already installed");
    }
}

/// Exit status for a failed command
///
/// Taken from the first [`SurgeryError`] in the chain; anything else is 1.
#[must_use]
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<SurgeryError>())
        .map_or(1, SurgeryError::exit_code)
}

/// Parse `args` and run the command, printing to stdout
pub fn run<I, T>(args: I) -> u8
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let stdout = std::io::stdout();
    run_with(args, &mut stdout.lock())
}

/// Parse `args` and run the command, printing to `out`
pub fn run_with<I, T>(args: I, out: &mut dyn Write) -> u8
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = match command().try_get_matches_from(args) {
        Ok(matches) => matches,
        Err(err) => {
            let _ = err.print();
            // --help and --version also arrive here, with status 0
            return if err.exit_code() == 0 { 0 } else { USAGE_EXIT };
        }
    };
    init_tracing(matches.get_count("verbose"), matches.get_flag("log-json"));

    match dispatch(&matches, out) {
        Ok(()) => 0,
        Err(err) => {
            let code = exit_code(&err);
            tracing::debug!(code, "command failed");
            eprintln!("error: {err:#}");
            code
        }
    }
}

fn dispatch(matches: &ArgMatches, out: &mut dyn Write) -> anyhow::Result<()> {
    match matches.subcommand() {
        Some(("inspect", args)) => inspect(args, out),
        Some(("sanitize", args)) => sanitize_cmd(args, out),
        Some(("extract", args)) => extract_cmd(args, out),
        Some(("rewrite", args)) => rewrite_cmd(args, out),
        Some(("run", args)) => run_cmd(args, out),
        Some(("candidates", args)) => candidates_cmd(args, out),
        Some(("validate", args)) => validate(args, out),
        Some(("dump", args)) => dump(args, out),
        Some((name, _)) => bail!("unknown command: {name}"),
        None => bail!("no command given"),
    }
}

fn path<'a>(args: &'a ArgMatches, id: &str) -> anyhow::Result<&'a Path> {
    args.get_one::<PathBuf>(id)
        .map(PathBuf::as_path)
        .with_context(|| format!("missing argument <{id}>"))
}

fn load(path: &Path) -> SurgeryResult<Graph> {
    Ok(StoreLoader::new(path).load()?.graph)
}

fn store(path: &Path, graph: &Graph, out: &mut dyn Write) -> anyhow::Result<()> {
    write_graph(path, graph).map_err(SurgeryError::from)?;
    writeln!(
        out,
        "wrote {} ({} nodes, {})",
        path.display(),
        graph.len(),
        Fingerprint::of_graph(graph).short()
    )?;
    Ok(())
}

/// Option file at `--<id>`, or the defaults
fn options(args: &ArgMatches, id: &str) -> SurgeryResult<PipelineConfig> {
    match args.get_one::<PathBuf>(id) {
        Some(path) => Ok(PipelineConfig::from_path(path)?),
        None => Ok(PipelineConfig::default()),
    }
}

fn inspect(args: &ArgMatches, out: &mut dyn Write) -> anyhow::Result<()> {
    let path = path(args, "graph")?;
    let graph = load(path)?;
    let taxonomy = options(args, "taxonomy")?.taxonomy;
    let report = gsurgery_passes::classify(&graph, &taxonomy);

    if args.get_flag("json") {
        JsonSink::new(&mut *out).emit(&report)?;
    } else {
        let top = args.get_one::<usize>("top").copied().unwrap_or(DEFAULT_TOP);
        writeln!(
            out,
            "graph: {} ({})",
            path.display(),
            Fingerprint::of_graph(&graph).short()
        )?;
        TextSink::new(&mut *out).with_top(top).emit(&report)?;
    }
    Ok(())
}

fn sanitize_cmd(args: &ArgMatches, out: &mut dyn Write) -> anyhow::Result<()> {
    let graph = load(path(args, "input")?)?;
    let rules = options(args, "rules")?.rules;
    let outcome = sanitize(&graph, &rules);

    writeln!(out, "fixed {} attributes", outcome.fixed)?;
    for (key, count) in &outcome.by_key {
        writeln!(out, "  {key:<28} {count}")?;
    }
    store(path(args, "output")?, &outcome.graph, out)
}

fn extract_cmd(args: &ArgMatches, out: &mut dyn Write) -> anyhow::Result<()> {
    let graph = load(path(args, "input")?)?;
    let outputs: Vec<&String> = args
        .get_many::<String>("outputs")
        .map(Iterator::collect)
        .unwrap_or_default();
    let extracted = extract(&graph, &outputs).map_err(SurgeryError::from)?;

    writeln!(out, "kept {} of {} nodes", extracted.len(), graph.len())?;
    store(path(args, "output")?, &extracted, out)
}

fn rewrite_cmd(args: &ArgMatches, out: &mut dyn Write) -> anyhow::Result<()> {
    let graph = load(path(args, "input")?)?;
    let config = PipelineConfig {
        stages: vec![Stage::Rewrite],
        ..options(args, "rules")?
    };
    let outcome = Pipeline::new(config)
        .map_err(SurgeryError::from)?
        .run(&graph)?;

    print_rewrites(&outcome, out)?;
    store(path(args, "output")?, &outcome.graph, out)
}

fn run_cmd(args: &ArgMatches, out: &mut dyn Write) -> anyhow::Result<()> {
    let graph = load(path(args, "input")?)?;
    let pipeline = Pipeline::from_path(path(args, "config")?).map_err(SurgeryError::from)?;
    let outcome = pipeline.run(&graph)?;

    for summary in &outcome.stages {
        writeln!(
            out,
            "{:<9} {} -> {} nodes, {} changed",
            summary.stage, summary.nodes_before, summary.nodes_after, summary.changed
        )?;
    }
    print_rewrites(&outcome, out)?;
    TextSink::new(&mut *out).emit(&outcome.report)?;
    store(path(args, "output")?, &outcome.graph, out)
}

fn print_rewrites(outcome: &PipelineOutcome, out: &mut dyn Write) -> anyhow::Result<()> {
    writeln!(out, "rewrote {} nodes", outcome.rewrites.len())?;
    for record in &outcome.rewrites {
        writeln!(out, "  {} ({}) keeps {}", record.node, record.op, record.kept)?;
    }
    if let Some(branches) = &outcome.branches {
        for branch in &branches.severed {
            writeln!(out, "  severed: {} dropped {}", branch.node, branch.producer)?;
        }
    }
    Ok(())
}

fn candidates_cmd(args: &ArgMatches, out: &mut dyn Write) -> anyhow::Result<()> {
    let graph = load(path(args, "graph")?)?;
    let op = args.get_one::<String>("op").map_or("Conv2D", String::as_str);
    let last = args.get_one::<usize>("last").copied().unwrap_or(5);
    let found = candidates(&graph, op, last);

    writeln!(out, "inputs: {}", found.inputs.join(", "))?;
    writeln!(out, "heads ({op}): {}", found.heads.join(", "))?;
    writeln!(out, "sinks: {}", found.sinks.join(", "))?;
    Ok(())
}

fn validate(args: &ArgMatches, out: &mut dyn Write) -> anyhow::Result<()> {
    let path = path(args, "graph")?;
    let graph = load(path)?;
    graph.validate().map_err(SurgeryError::from)?;
    writeln!(
        out,
        "{}: ok ({} nodes, {})",
        path.display(),
        graph.len(),
        Fingerprint::of_graph(&graph).short()
    )?;
    Ok(())
}

fn dump(args: &ArgMatches, out: &mut dyn Write) -> anyhow::Result<()> {
    let graph = load(path(args, "graph")?)?;
    out.write_all(&to_json(&graph).map_err(SurgeryError::from)?)?;
    Ok(())
}
