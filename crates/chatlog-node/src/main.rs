mod cli;

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use chatlog_logging::{ChatlogSubscriberBuilder, FileConfig, LogConfig};
use chatlog_node::{ChannelKey, ChatEvent, ChatLogger, MergeWriter, NodeConfig};
use clap::Parser;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use cli::{Cli, Command, RunArgs};

/// The optional `[log]` table of the configuration file
#[derive(Debug, Default, Deserialize)]
struct LogSection {
    #[serde(default)]
    log: Option<LogConfig>,
}

/// Upper bound on waiting for blocking filesystem calls at exit
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let result = runtime.block_on(async move {
        match cli.command {
            Command::Run(args) => run(args).await,
            Command::Show {
                channel,
                dir,
                config,
            } => {
                let mut node_config = load_config(config.as_deref())?;
                if let Some(dir) = dir {
                    node_config.writer.base_dir = dir;
                }
                show(node_config, ChannelKey::new(channel)).await
            }
        }
    });

    // A flush still stuck on the filesystem must not hold the process open
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    result
}

fn load_config(path: Option<&Path>) -> anyhow::Result<NodeConfig> {
    match path {
        Some(path) => NodeConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(NodeConfig::default()),
    }
}

fn load_log_config(path: Option<&Path>) -> anyhow::Result<LogConfig> {
    let Some(path) = path else {
        return Ok(LogConfig::default());
    };
    let source = std::fs::read_to_string(path)?;
    let section: LogSection = toml::from_str(&source)
        .with_context(|| format!("Invalid [log] table in {}", path.display()))?;
    Ok(section.log.unwrap_or_default())
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(dir) = args.dir {
        config.writer.base_dir = dir;
    }
    if let Some(batch_size) = args.batch_size {
        config.policy.batch_size = batch_size;
    }
    if let Some(chars) = args.long_message_chars {
        config.policy.long_message_chars = chars;
    }
    if let Some(secs) = args.flush_interval {
        config.flush_interval = Some(Duration::from_secs(secs));
    }

    let log_config = load_log_config(args.config.as_deref())?;
    let mut subscriber = ChatlogSubscriberBuilder::new().with_config(log_config);
    if let Some(level) = args.log_level {
        subscriber = subscriber.with_level(level);
    }
    if args.pretty {
        subscriber = subscriber.with_pretty_console(true);
    }
    if let Some(dir) = args.log_dir {
        subscriber = subscriber.with_file_output(FileConfig::in_directory(dir));
    }
    let _guard = subscriber.init();

    let logger = ChatLogger::new(config)?;
    logger.start().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut accepted = 0usize;
    let mut skipped = 0usize;
    let mut line_no = 0usize;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = &mut ctrl_c => {
                eprintln!("Interrupted, flushing pending logs");
                break;
            }
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                break;
            }
        };
        line_no += 1;

        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<ChatEvent>(&line) {
            Ok(event) => {
                if logger.append(event).await.is_accepted() {
                    accepted += 1;
                } else {
                    skipped += 1;
                }
            }
            Err(e) => {
                eprintln!("line {}: skipped malformed event: {}", line_no, e);
                skipped += 1;
            }
        }
    }

    let report = logger.stop().await?;

    println!(
        "{} messages logged, {} skipped, {} entries saved across {} channels",
        accepted,
        skipped,
        report.total_written(),
        report.len()
    );
    for (channel, err) in report.failures() {
        println!("  channel {}: {}", channel, err);
    }

    if !report.is_success() {
        anyhow::bail!("{} channel(s) failed to save", report.failures().count());
    }
    Ok(())
}

async fn show(config: NodeConfig, channel: ChannelKey) -> anyhow::Result<()> {
    let writer = MergeWriter::new(config.writer);
    let entries = writer
        .read_log(&channel)
        .await
        .with_context(|| format!("Failed to read log for channel {}", channel))?;

    if entries.is_empty() {
        println!("No entries for channel {}", channel);
        return Ok(());
    }

    for entry in &entries {
        println!(
            "[{}] #{} <{}> {}",
            entry.timestamp_utc, entry.channel_name, entry.author, entry.text
        );
    }
    println!("{} entries in {}", entries.len(), writer.log_path(&channel).display());
    Ok(())
}
