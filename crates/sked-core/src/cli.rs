use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "sked",
    version,
    about = "Sked: a personal task scheduler with repeat rules",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "skedrc", global = true)]
    pub skedrc: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the next occurrence of a repeat rule.
    #[command(name = "nextdate")]
    NextDate {
        /// Start date, YYYYMMDD.
        #[arg(long)]
        date: String,

        /// Repeat rule, e.g. "d 7" or "y".
        #[arg(long)]
        repeat: String,

        /// Reference date, YYYYMMDD. Defaults to today.
        #[arg(long)]
        now: Option<String>,
    },

    /// Add a task.
    Add {
        title: String,

        #[command(flatten)]
        fields: TaskFields,
    },

    /// List upcoming tasks, earliest first.
    List {
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one task.
    Info { id: String },

    /// Change fields of an existing task.
    Modify {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[command(flatten)]
        fields: TaskFields,
    },

    /// Complete a task: one-off tasks are removed, repeating ones rescheduled.
    Done { id: String },

    /// Delete a task.
    Delete { id: String },

    /// Serve the JSON API over HTTP.
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print the effective configuration.
    Show,
}

#[derive(Args, Debug, Clone, Default)]
pub struct TaskFields {
    /// Due date, YYYYMMDD.
    #[arg(long)]
    pub date: Option<String>,

    #[arg(long)]
    pub comment: Option<String>,

    /// Repeat rule; pass an empty string to stop repeating.
    #[arg(long)]
    pub repeat: Option<String>,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
