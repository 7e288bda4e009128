//! `tally send`.

use redis::AsyncCommands;
use std::time::Duration;
use tallyd::redis_consumer::TEXT_FIELD;
use tracing::debug;

/// Demo script: every command kind, including rejected ones.
///
/// Against a fresh instance with a session this reports 1, 0, 2, 31, 3, 4.
pub const SCENARIO: &[&str] = &[
    "start", "inc", "inc", "dec", "val", "err", "start", "tfujstary", "err", "inc/50", "dec/h",
    "dec/20", "val", "err", "stop", "stop", "err",
];

pub async fn run(
    redis_url: &str,
    queue: &str,
    commands: &[String],
    interval_ms: u64,
) -> anyhow::Result<()> {
    let client = redis::Client::open(redis_url)?;
    let mut conn = client.get_multiplexed_async_connection().await?;

    for (i, command) in commands.iter().enumerate() {
        if i > 0 && interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        }

        let message_id: String = conn
            .xadd(queue, "*", &[(TEXT_FIELD, command.as_str())])
            .await?;
        debug!(queue = %queue, message_id = %message_id, "XADD");
        println!("Sent {:<12} ({})", command, message_id);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{CounterStateMachine, InboundPayload, Session, SessionToken};

    #[test]
    fn test_scenario_reports() {
        let mut machine = CounterStateMachine::new(Session::Established(SessionToken::new("s")));

        let values: Vec<i64> = SCENARIO
            .iter()
            .filter_map(|c| machine.apply_inbound(&InboundPayload::Text(c.to_string())))
            .map(|event| event.value)
            .collect();

        assert_eq!(values, vec![1, 0, 2, 31, 3, 4]);
    }
}
