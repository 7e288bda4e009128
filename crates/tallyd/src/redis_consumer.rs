//! Redis Streams consumer for the inbound command queue.
//!
//! Handles XREADGROUP and XACK against the command stream. Each stream entry
//! carries its command in the `text` field.

use crate::config::TallyConfig;
use crate::error::{TallydError, TallydResult};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisResult, Value};
use tally_core::InboundPayload;
use tracing::{debug, info, warn};

/// Stream entry field holding the command text.
pub const TEXT_FIELD: &str = "text";

/// A message read from the inbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Queue-assigned ID (e.g., "1234567890-0"), used to acknowledge.
    pub message_id: String,
    pub payload: InboundPayload,
}

/// Source of inbound commands.
#[async_trait]
pub trait InboundQueue: Send {
    /// Wait for the next message. `None` means nothing arrived in time.
    async fn read_next(&mut self) -> TallydResult<Option<InboundMessage>>;

    /// Mark a message as processed.
    async fn ack(&mut self, message_id: &str) -> TallydResult<()>;

    /// Re-establish the underlying connection after an error.
    async fn reconnect(&mut self) -> TallydResult<()>;
}

/// Redis Streams consumer.
pub struct RedisQueueConsumer {
    client: Client,
    conn: MultiplexedConnection,
    config: TallyConfig,
}

impl RedisQueueConsumer {
    /// Connect to Redis and make sure the consumer group exists.
    pub async fn connect(config: TallyConfig) -> TallydResult<Self> {
        let client = Client::open(config.redis_url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;

        let consumer = Self {
            client,
            conn,
            config,
        };
        consumer.ensure_consumer_group().await?;

        Ok(consumer)
    }

    async fn ensure_consumer_group(&self) -> TallydResult<()> {
        // XGROUP CREATE key group $ MKSTREAM: only messages sent from now on
        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.queue)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut self.conn.clone())
            .await;

        match result {
            Ok(()) => {
                info!(
                    stream = %self.config.queue,
                    group = %self.config.consumer_group,
                    "Created consumer group"
                );
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(
                    stream = %self.config.queue,
                    group = %self.config.consumer_group,
                    "Consumer group already exists"
                );
            }
            Err(e) => return Err(e.into()),
        }

        Ok(())
    }
}

#[async_trait]
impl InboundQueue for RedisQueueConsumer {
    async fn read_next(&mut self) -> TallydResult<Option<InboundMessage>> {
        let value: Value = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_name)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(self.config.block_timeout_ms)
            .arg("STREAMS")
            .arg(&self.config.queue)
            .arg(">")
            .query_async(&mut self.conn)
            .await?;

        parse_xreadgroup_response(value)
    }

    async fn ack(&mut self, message_id: &str) -> TallydResult<()> {
        let acked: i64 = self
            .conn
            .xack(&self.config.queue, &self.config.consumer_group, &[message_id])
            .await?;

        if acked != 1 {
            warn!(
                message_id = %message_id,
                stream = %self.config.queue,
                "XACK returned {}, message may not exist",
                acked
            );
        }

        Ok(())
    }

    async fn reconnect(&mut self) -> TallydResult<()> {
        info!("Reconnecting to Redis...");
        self.conn = self.client.get_multiplexed_async_connection().await?;
        self.ensure_consumer_group().await
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(bytes) => String::from_utf8(bytes.clone()).ok(),
        Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}

fn expect_array<'a>(value: &'a Value, what: &str) -> TallydResult<&'a [Value]> {
    match value {
        Value::Array(items) => Ok(items.as_slice()),
        other => Err(TallydError::Protocol(format!(
            "Expected array for {}, got {:?}",
            what, other
        ))),
    }
}

/// Parse `[[stream, [[id, [field, value, ...]]]]]` into one message.
fn parse_xreadgroup_response(value: Value) -> TallydResult<Option<InboundMessage>> {
    if matches!(value, Value::Nil) {
        return Ok(None);
    }

    let streams = expect_array(&value, "XREADGROUP reply")?;
    let Some(stream) = streams.first() else {
        return Ok(None);
    };

    let stream = expect_array(stream, "stream entry")?;
    let Some(messages) = stream.get(1) else {
        return Err(TallydError::Protocol("Stream entry too short".into()));
    };

    let messages = expect_array(messages, "messages")?;
    let Some(message) = messages.first() else {
        return Ok(None);
    };

    let message = expect_array(message, "message")?;
    let (Some(id), Some(fields)) = (message.first(), message.get(1)) else {
        return Err(TallydError::Protocol("Message entry too short".into()));
    };

    let message_id = as_text(id).ok_or_else(|| {
        TallydError::Protocol(format!("Expected string for message ID, got {:?}", id))
    })?;

    let fields = expect_array(fields, "fields")?;
    let payload = fields
        .chunks_exact(2)
        .find(|pair| as_text(&pair[0]).as_deref() == Some(TEXT_FIELD))
        .and_then(|pair| as_text(&pair[1]))
        .map_or(InboundPayload::NonText, InboundPayload::Text);

    debug!(
        message_id = %message_id,
        text = matches!(payload, InboundPayload::Text(_)),
        "Read message from stream"
    );

    Ok(Some(InboundMessage {
        message_id,
        payload,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    fn reply(id: &str, fields: Vec<Value>) -> Value {
        Value::Array(vec![Value::Array(vec![
            bulk("tally:commands"),
            Value::Array(vec![Value::Array(vec![bulk(id), Value::Array(fields)])]),
        ])])
    }

    #[test]
    fn test_parse_text_message() {
        let value = reply("1700000000000-0", vec![bulk("text"), bulk("inc/50")]);

        let message = parse_xreadgroup_response(value).unwrap().unwrap();
        assert_eq!(message.message_id, "1700000000000-0");
        assert_eq!(message.payload, InboundPayload::Text("inc/50".into()));
    }

    #[test]
    fn test_parse_picks_text_among_other_fields() {
        let value = reply(
            "1-0",
            vec![bulk("origin"), bulk("cli"), bulk("text"), bulk("val")],
        );

        let message = parse_xreadgroup_response(value).unwrap().unwrap();
        assert_eq!(message.payload, InboundPayload::Text("val".into()));
    }

    #[test]
    fn test_parse_missing_text_is_non_text() {
        let value = reply("2-0", vec![bulk("bytes"), bulk("\u{1}\u{2}")]);

        let message = parse_xreadgroup_response(value).unwrap().unwrap();
        assert_eq!(message.message_id, "2-0");
        assert_eq!(message.payload, InboundPayload::NonText);
    }

    #[test]
    fn test_parse_invalid_utf8_is_non_text() {
        let value = reply("3-0", vec![bulk("text"), Value::BulkString(vec![0xff, 0xfe])]);

        let message = parse_xreadgroup_response(value).unwrap().unwrap();
        assert_eq!(message.payload, InboundPayload::NonText);
    }

    #[test]
    fn test_parse_empty_replies() {
        assert!(parse_xreadgroup_response(Value::Nil).unwrap().is_none());
        assert!(parse_xreadgroup_response(Value::Array(vec![]))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_parse_malformed_reply() {
        assert!(parse_xreadgroup_response(Value::Int(1)).is_err());
        let short = Value::Array(vec![Value::Array(vec![bulk("tally:commands")])]);
        assert!(parse_xreadgroup_response(short).is_err());
    }
}
