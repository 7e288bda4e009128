//! tallyd binary entry point.
//!
//! Usage: tallyd [--account <id>] [--redis-url <url>] [--queue <key>] [--topic <channel>]

use clap::Parser;
use std::sync::Arc;
use tallyd::config::DEFAULT_ACCOUNT;
use tallyd::{
    establish_session, provider_from_config, CounterService, QueueListener, RedisQueueConsumer,
    RedisTopicPublisher, TallyConfig, TallydResult,
};
use tracing::{error, info};

/// tallyd: session-bound counter driven by a command queue.
#[derive(Parser, Debug)]
#[command(name = "tallyd")]
#[command(about = "Session-bound counter service driven by a Redis Streams command queue")]
struct Args {
    /// Account used to request the session.
    #[arg(long, env = "TALLY_ACCOUNT", default_value = DEFAULT_ACCOUNT)]
    account: String,

    /// Redis connection URL.
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Stream key commands are read from.
    #[arg(long, env = "TALLY_QUEUE")]
    queue: Option<String>,

    /// Channel reports are published to.
    #[arg(long, env = "TALLY_TOPIC")]
    topic: Option<String>,

    /// Base URL of a remote session issuer.
    #[arg(long, env = "TALLY_SESSION_URL")]
    session_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Write JSON logs to ~/.tally/logs/dev.jsonl instead of stderr.
    #[arg(long)]
    log_file: bool,
}

#[tokio::main]
async fn main() -> TallydResult<()> {
    let args = Args::parse();

    observability::init_with_config(observability::LogConfig {
        service_name: "tallyd".into(),
        default_level: args.log_level.clone(),
        file_output: args.log_file,
        also_stderr: true,
        ..Default::default()
    });

    info!("tallyd starting...");

    let mut config = TallyConfig::new(args.account)?;

    // CLI flags win over the environment
    if let Some(redis_url) = args.redis_url {
        config.redis_url = redis_url;
    }
    if let Some(queue) = args.queue {
        config.queue = queue;
    }
    if let Some(topic) = args.topic {
        config.topic = topic;
    }
    if args.session_url.is_some() {
        config.session_url = args.session_url;
    }

    info!(
        redis_url = %config.redis_url,
        queue = %config.queue,
        topic = %config.topic,
        account_id = %config.account_id,
        consumer = %config.consumer_name,
        overflow = ?config.overflow,
        "Configuration loaded"
    );

    let provider = provider_from_config(&config)?;
    let session = establish_session(provider.as_ref(), &config.account_id, &config.session_retry).await;

    let publisher = Arc::new(RedisTopicPublisher::new(&config.redis_url, config.topic.clone())?);
    let service = CounterService::new(
        session,
        config.overflow,
        publisher,
        config.publish_timeout,
        config.publish_queue_capacity,
    );

    let consumer = RedisQueueConsumer::connect(config).await?;
    let mut listener = QueueListener::new(consumer, service);

    let ctrl_c = tokio::signal::ctrl_c();

    let outcome = tokio::select! {
        result = listener.run() => result,
        _ = ctrl_c => {
            info!("Received shutdown signal, draining reports...");
            Ok(())
        }
    };

    if let Err(e) = &outcome {
        error!(error = %e, "Queue listener exited with error");
    }

    listener.into_service().shutdown().await;
    outcome
}
