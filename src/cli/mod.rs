mod daemon;
mod doctor;

use std::path::PathBuf;

use anyhow::Result;
use console::style;

use crate::core::domain::ReportKind;
use crate::core::terminal::{self, GuideSection};
use crate::platform::{NativePlatform, Platform};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Daemon")
        .command("run", "Start the scheduler and the slash command listener")
        .print();

    GuideSection::new("One-shot")
        .command("now [--topic <topic>]", "Generate and publish one summary now")
        .command("report weekly|monthly", "Publish a usage report for the last period")
        .print();

    GuideSection::new("Diagnostics")
        .command("doctor", "Check configuration, database, generator and integrations")
        .command("help", "Show this message")
        .print();

    println!(
        "\n {} {} [--config <path>] <command>\n",
        style("Usage:").bold(),
        style("daily-bot").green()
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CliCommand {
    Run,
    Now { topic: Option<String> },
    Doctor,
    Report(ReportKind),
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CliArgs {
    pub command: CliCommand,
    pub config: Option<PathBuf>,
}

/// Parses everything after the binary name. `--config` may appear anywhere.
pub(crate) fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut config = None;
    let mut rest = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                let path = args.get(i + 1).ok_or("--config needs a path")?;
                config = Some(PathBuf::from(path));
                i += 2;
            }
            other => {
                rest.push(other);
                i += 1;
            }
        }
    }

    let command = match rest.as_slice() {
        [] | ["help"] | ["--help"] | ["-h"] => CliCommand::Help,
        ["run"] => CliCommand::Run,
        ["doctor"] => CliCommand::Doctor,
        ["now"] => CliCommand::Now { topic: None },
        ["now", "--topic" | "-t", topic @ ..] if !topic.is_empty() => {
            let topic = topic.join(" ");
            if topic.trim().is_empty() {
                return Err("--topic needs a value".into());
            }
            CliCommand::Now { topic: Some(topic) }
        }
        ["now", ..] => return Err("usage: daily-bot now [--topic <topic>]".into()),
        ["report", kind] => CliCommand::Report(
            kind.parse::<ReportKind>()
                .map_err(|_| format!("unknown report '{}'; use weekly or monthly", kind))?,
        ),
        ["report", ..] => return Err("usage: daily-bot report weekly|monthly".into()),
        [other, ..] => return Err(format!("unknown command '{}'", other)),
    };
    Ok(CliArgs { command, config })
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let parsed = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            print_help();
            anyhow::bail!(e);
        }
    };

    let data_dir = NativePlatform::data_dir();
    let config_path = parsed.config.as_deref();
    match parsed.command {
        CliCommand::Help => {
            print_help();
            Ok(())
        }
        CliCommand::Run => daemon::run_daemon(config_path, &data_dir).await,
        CliCommand::Now { topic } => daemon::run_once(config_path, &data_dir, topic.as_deref()).await,
        CliCommand::Doctor => doctor::run_doctor(config_path, &data_dir).await,
        CliCommand::Report(kind) => daemon::run_report(config_path, &data_dir, kind).await,
    }
}
