//! `unitport` command line
//!
//! Thin shell over [`unitport_core::Migrator`]: argument parsing, tracing
//! setup and human or JSON output. Exit code 1 reports a completed command
//! with a negative result (parse issues, unresolved closure, conflicts that
//! need a choice, incomplete rollback or recovery).

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use unitport_block::BlockParser;
use unitport_conflict::{Decisions, ResolutionAction};
use unitport_core::{MigrationRequest, Migrator, UnitportConfig};
use unitport_graph::{NodeStatus, TracingSink};
use unitport_merge::MergeStrategy;

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("verbose"));

    match run(&matches).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn path_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).required(true).value_parser(value_parser!(PathBuf)).help(help)
}

fn unit_arg() -> Arg {
    Arg::new("unit").required(true).help("Name of the unit to migrate (root definition)")
}

fn json_arg() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Output as JSON")
}

fn cli() -> Command {
    Command::new("unitport")
        .version(unitport_core::VERSION)
        .about("Resolve, diagnose, migrate and roll back game units between installations")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Debug logging (RUST_LOG takes precedence)"),
        )
        .subcommand(
            Command::new("parse")
                .about("Parse one definition file and report structural issues")
                .arg(path_arg("file", "Definition file to parse"))
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("resolve")
                .about("Resolve a unit's dependency closure in a source installation")
                .arg(path_arg("source", "Source installation root"))
                .arg(unit_arg())
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("conflicts")
                .about("Dry run: detect and diagnose conflicts with a target installation")
                .arg(path_arg("source", "Source installation root"))
                .arg(unit_arg())
                .arg(path_arg("target", "Target installation root"))
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("migrate")
                .about("Migrate a unit and its closure into a target installation")
                .arg(path_arg("source", "Source installation root"))
                .arg(unit_arg())
                .arg(path_arg("target", "Target installation root"))
                .arg(
                    Arg::new("strategy")
                        .long("strategy")
                        .value_parser(value_parser!(MergeStrategy))
                        .help("Merge strategy: source-wins, target-wins or smart"),
                )
                .arg(
                    Arg::new("choose")
                        .long("choose")
                        .action(ArgAction::Append)
                        .value_name("KEY=ACTION")
                        .help("Resolve a conflict explicitly, e.g. name:TankGun=rename:MyGun or file:Data/INI/Weapon.ini=merge"),
                )
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("history")
                .about("List journaled migrations of a target installation, newest first")
                .arg(path_arg("target", "Target installation root"))
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("rollback")
                .about("Undo a successful migration")
                .arg(path_arg("target", "Target installation root"))
                .arg(Arg::new("id").required(true).help("Migration id from history")),
        )
        .subcommand(
            Command::new("recover")
                .about("Clean up after an interrupted migration")
                .arg(path_arg("target", "Target installation root")),
        )
}

fn load_config(matches: &ArgMatches) -> Result<UnitportConfig> {
    let path = matches.get_one::<PathBuf>("config");
    UnitportConfig::load_or_default(path.map(PathBuf::as_path))
        .with_context(|| match path {
            Some(path) => format!("loading configuration from {}", path.display()),
            None => "building default configuration".to_string(),
        })
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a Path> {
    args.get_one::<PathBuf>(name)
        .map(PathBuf::as_path)
        .with_context(|| format!("missing <{name}>"))
}

fn unit(args: &ArgMatches) -> Result<&str> {
    args.get_one::<String>("unit")
        .map(String::as_str)
        .context("missing <unit>")
}

/// Parse a `KEY=ACTION` choice
///
/// Actions are `overwrite`, `skip`, `merge`, `rename` (generated name) and
/// `rename:<NewName>`.
fn parse_choice(raw: &str) -> Result<(String, ResolutionAction)> {
    let Some((key, action)) = raw.rsplit_once('=') else {
        bail!("choice `{raw}` is not KEY=ACTION");
    };
    let action = match action.split_once(':') {
        Some(("rename", name)) => ResolutionAction::Rename {
            new_name: name.to_string(),
        },
        None if action == "rename" => ResolutionAction::Rename { new_name: String::new() },
        None if action == "overwrite" => ResolutionAction::Overwrite,
        None if action == "skip" => ResolutionAction::Skip,
        None if action == "merge" => ResolutionAction::Merge,
        _ => bail!("unknown action `{action}` in choice `{raw}`"),
    };
    Ok((key.to_string(), action))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("serializing output")?);
    Ok(())
}

/// Run one command; `Ok(false)` is a completed command with a negative result
async fn run(matches: &ArgMatches) -> Result<bool> {
    let config = load_config(matches)?;
    let migrator = Migrator::new(config);
    let sink = TracingSink;

    match matches.subcommand() {
        Some(("parse", args)) => {
            let file = required(args, "file")?;
            let bytes = tokio::fs::read(file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let text = String::from_utf8_lossy(&bytes);
            let outcome = BlockParser::new(migrator.config().parser.clone()).parse(&text);

            if args.get_flag("json") {
                print_json(&serde_json::json!({
                    "blocks": outcome.blocks,
                    "issues": outcome.issues,
                }))?;
            } else {
                for block in &outcome.blocks {
                    println!(
                        "{} {} (lines {}-{}, {} fields)",
                        block.block_type,
                        block.name,
                        block.start_line,
                        block.end_line,
                        block.fields.len()
                    );
                }
                for issue in &outcome.issues {
                    println!("issue: {issue}");
                }
            }
            Ok(!outcome.has_issues())
        }
        Some(("resolve", args)) => {
            let source = required(args, "source")?;
            let unit = unit(args)?;
            let index = migrator
                .open_source(source)
                .await
                .with_context(|| format!("indexing {}", source.display()))?;
            let graph = migrator.resolve(unit, &index, &sink).await;

            if args.get_flag("json") {
                print_json(&graph)?;
            } else {
                for level in graph.nodes_by_depth() {
                    for node in level {
                        let location = node.location.as_ref().map(ToString::to_string).unwrap_or_default();
                        println!(
                            "{}{} {} [{:?}] {location}",
                            "  ".repeat(node.depth),
                            node.kind,
                            node.name,
                            node.status
                        );
                    }
                }
                println!(
                    "{} nodes, {} found, {} missing, depth {} ({:.1}% complete)",
                    graph.len(),
                    graph.found_count(),
                    graph.missing_count(),
                    graph.max_depth(),
                    graph.completion()
                );
            }
            let resolved = graph.nodes().all(|n| n.status == NodeStatus::Found);
            Ok(resolved)
        }
        Some(("conflicts", args)) => {
            let analysis = migrator
                .analyze(required(args, "source")?, unit(args)?, required(args, "target")?, &sink)
                .await
                .context("analysis failed")?;

            if args.get_flag("json") {
                print_json(&serde_json::json!({
                    "conflicts": analysis.conflicts,
                    "diagnoses": analysis.diagnoses,
                    "source_issues": analysis.source_issues,
                }))?;
            } else {
                if analysis.diagnoses.is_empty() {
                    println!("no conflicts");
                }
                for diagnosis in &analysis.diagnoses {
                    println!("[{}] {} ({})", diagnosis.severity, diagnosis.conflict, diagnosis.conflict.key());
                    for option in &diagnosis.options {
                        let marker = if option.auto_applicable { "auto" } else { "explicit" };
                        println!("    {}. {} ({marker}): {}", option.rank, option.action, option.description);
                    }
                }
                for issue in &analysis.source_issues {
                    println!("source issue: {} {}", issue.location, issue.issue);
                }
            }
            let all_decided = analysis.needing_choice().next().is_none();
            Ok(all_decided)
        }
        Some(("migrate", args)) => {
            let mut decisions = Decisions::new();
            for raw in args.get_many::<String>("choose").into_iter().flatten() {
                let (key, action) = parse_choice(raw)?;
                decisions = decisions.with_choice(key, action);
            }
            let mut request = MigrationRequest::new(required(args, "source")?, unit(args)?, required(args, "target")?)
                .with_decisions(decisions);
            if let Some(strategy) = args.get_one::<MergeStrategy>("strategy") {
                request = request.with_strategy(*strategy);
            }

            let report = migrator.migrate(&request, &sink).await.context("migration failed")?;
            if args.get_flag("json") {
                print_json(&report)?;
            } else {
                println!("{}", report.summary());
            }
            Ok(true)
        }
        Some(("history", args)) => {
            let entries = migrator.history(required(args, "target")?).await.context("reading journal")?;

            if args.get_flag("json") {
                print_json(&entries)?;
            } else if entries.is_empty() {
                println!("no migrations recorded");
            } else {
                for entry in &entries {
                    println!(
                        "{}  {}  {:<12} {} ({} operations, {} ms)",
                        entry.id,
                        entry.started_at.format("%Y-%m-%d %H:%M:%S"),
                        entry.state.to_string(),
                        entry.unit,
                        entry.operations.len(),
                        entry.duration_ms
                    );
                }
            }
            Ok(true)
        }
        Some(("rollback", args)) => {
            let target = required(args, "target")?;
            let id = args.get_one::<String>("id").context("missing <id>")?;
            let outcome = migrator
                .rollback(target, id, &sink)
                .await
                .with_context(|| format!("rolling back {id}"))?;

            println!(
                "rolled back {} ({}): {} operations undone",
                outcome.migration_id, outcome.unit, outcome.operations
            );
            for path in &outcome.modified_since {
                println!("warning: {} had changed since the migration", path.display());
            }
            Ok(true)
        }
        Some(("recover", args)) => {
            let report = migrator
                .recover(required(args, "target")?, &sink)
                .await
                .context("recovery failed")?;

            println!(
                "removed {} temp files, recovered {} interrupted migrations",
                report.temp_files_removed.len(),
                report.recovered.len()
            );
            for error in &report.errors {
                println!("error: {error}");
            }
            Ok(report.is_clean())
        }
        Some((other, _)) => bail!("unknown command `{other}`"),
        None => bail!("no command given"),
    }
}
