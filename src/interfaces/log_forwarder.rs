use std::sync::Arc;

use async_trait::async_trait;

use super::forwarders::{
    ConnectivityForwarder, ForwardMessage, ForwardReply, Forwarders, NoticeForwarder,
    RequestForwarder, StreamForwarder,
};
use crate::data_mgmt::models::TagValue;
use crate::errors::TagError;

/// Writes every forwarded message to the log as JSON. Used by `tagex run`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogForwarder;

impl LogForwarder {
    /// A forwarder set with this logger in every slot.
    pub fn all() -> Forwarders {
        let f = Arc::new(LogForwarder);
        Forwarders::new()
            .with_connectivity(f.clone())
            .with_notice(f.clone())
            .with_request(f.clone())
            .with_stream(f)
    }
}

fn to_json(message: &ForwardMessage) -> String {
    serde_json::to_string(message).unwrap_or_else(|e| format!("<unserialisable: {e}>"))
}

#[async_trait]
impl ConnectivityForwarder for LogForwarder {
    async fn on_connectivity_changed(
        &self,
        channel: &str,
        device: &str,
        tag: &str,
        online: bool,
    ) -> Result<(), TagError> {
        log::info!(
            "[{}/{}] {} is {}",
            channel,
            device,
            tag,
            if online { "online" } else { "offline" }
        );
        Ok(())
    }
}

#[async_trait]
impl NoticeForwarder for LogForwarder {
    async fn publish(
        &self,
        message: &ForwardMessage,
        previous: Option<&TagValue>,
    ) -> Result<(), TagError> {
        match previous {
            Some(previous) => log::info!("Notice (was {}): {}", previous, to_json(message)),
            None => log::info!("Notice: {}", to_json(message)),
        }
        Ok(())
    }
}

#[async_trait]
impl RequestForwarder for LogForwarder {
    async fn send(&self, message: &ForwardMessage) -> Result<ForwardReply, TagError> {
        log::info!("Request: {}", to_json(message));
        Ok(ForwardReply::ok(0))
    }
}

#[async_trait]
impl StreamForwarder for LogForwarder {
    async fn on_start(&self, message: &ForwardMessage) -> Result<(), TagError> {
        log::info!("Stream start: {}", to_json(message));
        Ok(())
    }

    async fn on_sample(&self, message: &ForwardMessage) -> Result<(), TagError> {
        log::debug!("Stream sample: {}", to_json(message));
        Ok(())
    }

    async fn on_stop(&self, message: &ForwardMessage) -> Result<(), TagError> {
        log::info!("Stream stop: {}", to_json(message));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_mgmt::topology::Flag;

    #[tokio::test]
    async fn request_answers_success() {
        let message = ForwardMessage::new(Flag::Trigger, "c", "d", None, "t", vec![]);
        let reply = LogForwarder.send(&message).await.unwrap();
        assert!(reply.success);
        assert_eq!(reply.status_code, 0);
        assert!(reply.callback_items.is_empty());
    }

    #[test]
    fn reply_parses_camel_case() {
        let reply: ForwardReply = serde_json::from_str(
            r#"{"success": true, "statusCode": 7, "callbackItems": {"Result": 12.5}}"#,
        )
        .unwrap();
        assert_eq!(reply.status_code, 7);
        assert_eq!(reply.callback_items["Result"], serde_json::json!(12.5));
    }
}
