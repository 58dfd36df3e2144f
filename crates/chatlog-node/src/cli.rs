use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chatlog", about = "Buffered per-channel chat log writer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Log chat events read as JSON lines from stdin
    Run(RunArgs),
    /// Print a channel's persisted log
    Show {
        /// Channel key
        channel: String,
        /// Directory holding channel logs
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Configuration file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Directory holding channel logs
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Flush a channel once it holds this many pending entries
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Flush a channel immediately after a message longer than this many characters
    #[arg(long)]
    pub long_message_chars: Option<usize>,
    /// Flush every pending channel on this period, in seconds
    #[arg(long)]
    pub flush_interval: Option<u64>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
    /// Human-readable console logs instead of JSON
    #[arg(long)]
    pub pretty: bool,
    /// Also write diagnostic logs as rolling JSON files in this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_overrides() {
        let cli = Cli::try_parse_from([
            "chatlog",
            "run",
            "--dir",
            "/tmp/logs",
            "--batch-size",
            "5",
            "--flush-interval",
            "30",
            "--pretty",
            "--log-dir",
            "/tmp/diag",
        ])
        .unwrap();

        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.dir, Some(PathBuf::from("/tmp/logs")));
        assert_eq!(args.batch_size, Some(5));
        assert_eq!(args.flush_interval, Some(30));
        assert!(args.long_message_chars.is_none());
        assert!(args.pretty);
        assert_eq!(args.log_dir, Some(PathBuf::from("/tmp/diag")));
    }

    #[test]
    fn test_parse_show() {
        let cli = Cli::try_parse_from(["chatlog", "show", "42"]).unwrap();
        assert!(matches!(cli.command, Command::Show { ref channel, .. } if channel == "42"));
    }
}
