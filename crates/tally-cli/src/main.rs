//! Tally CLI - feed commands to tallyd and watch what it reports.

mod commands;

use clap::{Parser, Subcommand};
use tallyd::config::{DEFAULT_QUEUE, DEFAULT_REDIS_URL, DEFAULT_TOPIC};

/// Tally CLI - Drive a tallyd instance over Redis.
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Send commands to tallyd and watch its reports")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Redis connection URL
    #[arg(long, env = "REDIS_URL", default_value = DEFAULT_REDIS_URL, global = true)]
    redis_url: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Append commands to the inbound queue
    Send {
        /// Commands to send, in order (e.g. start inc val)
        #[arg(required_unless_present = "scenario")]
        commands: Vec<String>,

        /// Send the built-in demo script instead
        #[arg(long, conflicts_with = "commands")]
        scenario: bool,

        /// Stream key to append to
        #[arg(long, env = "TALLY_QUEUE", default_value = DEFAULT_QUEUE)]
        queue: String,

        /// Pause between commands, in milliseconds
        #[arg(long, default_value = "500")]
        interval_ms: u64,
    },

    /// Print reports as they are published
    Watch {
        /// Channel to subscribe to
        #[arg(long, env = "TALLY_TOPIC", default_value = DEFAULT_TOPIC)]
        topic: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    observability::init_with_config(observability::LogConfig {
        service_name: "tally".into(),
        default_level: cli.log_level.clone(),
        also_stderr: true,
        ..Default::default()
    });

    match cli.command {
        Commands::Send {
            commands: to_send,
            scenario,
            queue,
            interval_ms,
        } => {
            let script: Vec<String> = if scenario {
                commands::send::SCENARIO.iter().map(|c| c.to_string()).collect()
            } else {
                to_send
            };
            commands::send::run(&cli.redis_url, &queue, &script, interval_ms).await
        }
        Commands::Watch { topic } => commands::watch::run(&cli.redis_url, &topic).await,
    }
}
