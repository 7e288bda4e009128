//! `tally watch`.

use futures_util::StreamExt;
use tallyd::decode_report;
use tracing::{info, warn};

/// Render one report payload for the terminal.
pub fn format_report(payload: &str) -> String {
    match decode_report(payload) {
        Some((session, value)) => format!("session={} value={}", session, value),
        None => payload.to_string(),
    }
}

pub async fn run(redis_url: &str, topic: &str) -> anyhow::Result<()> {
    let client = redis::Client::open(redis_url)?;
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(topic).await?;
    info!(topic = %topic, "Subscribed");

    let mut messages = pubsub.on_message();
    while let Some(message) = messages.next().await {
        match message.get_payload::<String>() {
            Ok(payload) => println!("{}", format_report(&payload)),
            Err(e) => warn!(error = %e, "Skipping non-text report"),
        }
    }

    anyhow::bail!("Subscription to {} closed", topic)
}
