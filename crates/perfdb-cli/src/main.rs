mod transport;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use perfdb_core::{FormatTag, ReconcilePolicy};
use perfdb_format::{guess_format, FormatRegistry};
use perfdb_import::{
    import_and_report, import_file, read_input, render, run_capture, write_output, CommitMode, ImportSummary, Instance,
};
use perfdb_storage::InMemoryStore;

#[derive(Parser)]
#[command(name = "perfdb", version, about = "Import performance test reports into a perfdb instance")]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new instance directory (perfdb.toml + database)
    Create { instance: PathBuf },

    /// Check a report file without touching any instance (`-` reads stdin)
    Checkformat {
        #[arg(default_value = "-")]
        file: PathBuf,
        #[arg(long, default_value = FormatTag::JSON)]
        format: String,
    },

    /// Convert a report between formats (`-` for stdin/stdout)
    Convert {
        #[arg(default_value = "-")]
        input: PathBuf,
        #[arg(default_value = "-")]
        output: PathBuf,
        /// Input format; `auto` picks by extension, then tries every decoder
        #[arg(long, default_value = FormatTag::AUTO)]
        from: String,
        #[arg(long, default_value = FormatTag::JSON)]
        to: String,
    },

    /// Import report files into a local instance
    Import {
        instance: PathBuf,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Report format; `auto` picks by extension, then tries every decoder
        #[arg(long, default_value = FormatTag::AUTO)]
        format: String,
        #[arg(long, default_value_t = true, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
        commit: bool,
        #[arg(short, long)]
        verbose: bool,
        /// Print summaries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Submit report files to a server URL or a local instance
    Submit {
        target: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long, default_value = FormatTag::AUTO)]
        format: String,
        #[arg(long, default_value_t = false, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
        commit: bool,
        #[arg(short, long)]
        verbose: bool,
    },

    /// Run a test-runner command that prints a report, then submit or simulate it
    Runtest {
        /// Server URL or local instance to submit to; simulated when absent
        #[arg(long)]
        submit: Option<String>,
        #[arg(long, default_value_t = true, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
        commit: bool,
        /// Also write the raw report here (`-` for stdout)
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, default_value = FormatTag::JSON)]
        format: String,
        #[arg(short, long)]
        verbose: bool,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Bring an instance database schema up to date
    Update { instance: PathBuf },
}

fn mode(commit: bool) -> CommitMode {
    if commit {
        CommitMode::Commit
    } else {
        CommitMode::DryRun
    }
}

fn print_summary(summary: &ImportSummary, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        print!("{summary}");
    }
    Ok(())
}

fn finish(summaries: &[ImportSummary]) -> anyhow::Result<()> {
    let rejected = summaries.iter().filter(|s| s.is_rejected()).count();
    if rejected > 0 {
        bail!("{rejected} of {} report(s) rejected", summaries.len());
    }
    Ok(())
}

fn import_local(
    instance: &Instance,
    registry: &FormatRegistry,
    file: &Path,
    format: &FormatTag,
    commit: bool,
    verbose: bool,
) -> anyhow::Result<ImportSummary> {
    let outcome = import_file(
        &instance.store,
        registry,
        file,
        format,
        mode(commit),
        &instance.cfg.reconcile,
    )?;
    Ok(render(&outcome, verbose))
}

/// Hand a payload to a server or a local instance.
async fn submit_payload(
    client: &reqwest::Client,
    target: &str,
    payload: Vec<u8>,
    format: &FormatTag,
    commit: bool,
    verbose: bool,
) -> anyhow::Result<ImportSummary> {
    if transport::is_remote(target) {
        let mut summary = transport::submit(client, target, payload, format, commit).await?;
        if !verbose {
            summary.samples.clear();
        }
        return Ok(summary);
    }
    let instance = Instance::open(PathBuf::from(target))?;
    let outcome = import_and_report(
        &instance.store,
        &FormatRegistry::with_builtin(),
        &payload,
        format,
        mode(commit),
        &instance.cfg.reconcile,
    )?;
    Ok(render(&outcome, verbose))
}

/// Import into a throwaway in-memory store; nothing persists.
fn simulate(payload: &[u8], format: &FormatTag, verbose: bool) -> anyhow::Result<ImportSummary> {
    let store = InMemoryStore::new();
    let outcome = import_and_report(
        &store,
        &FormatRegistry::with_builtin(),
        payload,
        format,
        CommitMode::Commit,
        &ReconcilePolicy::default(),
    )?;
    Ok(render(&outcome, verbose))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let registry = FormatRegistry::with_builtin();
    let client = reqwest::Client::new();

    match cli.cmd {
        Command::Create { instance } => {
            let created = Instance::create(&instance)?;
            println!(
                "Created instance '{}' in {}",
                created.cfg.instance.name,
                instance.display()
            );
        }
        Command::Checkformat { file, format } => {
            let payload = read_input(&file)?;
            let summary = simulate(&payload, &FormatTag::from_str(format), true)?;
            print_summary(&summary, false)?;
            finish(&[summary])?;
        }
        Command::Convert { input, output, from, to } => {
            let payload = read_input(&input)?;
            let from = FormatTag::from_str(from);
            let from = if from.is_auto() { guess_format(&input) } else { from };
            let to = FormatTag::from_str(to);
            let bytes = registry
                .convert(&payload, &from, &to)
                .with_context(|| format!("convert {} to {to}", input.display()))?;
            tracing::info!(input = %input.display(), from = %from, to = %to, "converted report");
            write_output(&output, &bytes)?;
        }
        Command::Import {
            instance,
            files,
            format,
            commit,
            verbose,
            json,
        } => {
            let instance = Instance::open(instance)?;
            let format = FormatTag::from_str(format);
            let mut summaries = vec![];
            for file in &files {
                let summary = import_local(&instance, &registry, file, &format, commit, verbose)
                    .with_context(|| format!("import {}", file.display()))?;
                print_summary(&summary, json)?;
                summaries.push(summary);
            }
            finish(&summaries)?;
        }
        Command::Submit {
            target,
            files,
            format,
            commit,
            verbose,
        } => {
            let format = FormatTag::from_str(format);
            let mut summaries = vec![];
            for file in &files {
                let payload = tokio::fs::read(file)
                    .await
                    .with_context(|| format!("read {}", file.display()))?;
                let format = if format.is_auto() { guess_format(file) } else { format.clone() };
                tracing::info!(file = %file.display(), target = %target, "submitting report");
                let summary = submit_payload(&client, &target, payload, &format, commit, verbose)
                    .await
                    .with_context(|| format!("submit {}", file.display()))?;
                print_summary(&summary, false)?;
                summaries.push(summary);
            }
            finish(&summaries)?;
        }
        Command::Runtest {
            submit,
            commit,
            output,
            format,
            verbose,
            command,
        } => {
            let Some((program, args)) = command.split_first() else {
                bail!("runtest needs a command to run");
            };
            let format = FormatTag::from_str(format);
            tracing::info!(program = %program, "running test command");
            let payload = run_capture(program, args)?;
            if let Some(output) = &output {
                write_output(output, &payload)?;
            }
            let summary = match &submit {
                Some(target) => {
                    tracing::info!(target = %target, "submitting result");
                    submit_payload(&client, target, payload, &format, commit, verbose).await?
                }
                None => {
                    tracing::info!("submitting result to a temporary in-memory instance");
                    simulate(&payload, &format, verbose)?
                }
            };
            print_summary(&summary, false)?;
            finish(&[summary])?;
        }
        Command::Update { instance } => {
            let version = Instance::update(instance.clone())?;
            println!("Instance {} is at schema version {}", instance.display(), version);
        }
    }

    Ok(())
}
