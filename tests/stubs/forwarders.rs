use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use tagex::data_mgmt::TagValue;
use tagex::interfaces::{
    ConnectivityForwarder, ForwardMessage, ForwardReply, Forwarders, NoticeForwarder,
    RequestForwarder, StreamForwarder,
};
use tagex::TagError;

/// Keeps everything it is sent; answers requests with `reply`.
pub struct Recorder {
    pub requests: Mutex<Vec<ForwardMessage>>,
    pub notices: Mutex<Vec<(ForwardMessage, Option<TagValue>)>>,
    pub connectivity: Mutex<Vec<(String, bool)>>,
    pub stream: Mutex<Vec<(&'static str, ForwardMessage)>>,
    pub reply: Mutex<Result<ForwardReply, TagError>>,
    pub delay: Mutex<Duration>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            notices: Mutex::new(Vec::new()),
            connectivity: Mutex::new(Vec::new()),
            stream: Mutex::new(Vec::new()),
            reply: Mutex::new(Ok(ForwardReply::ok(0))),
            delay: Mutex::new(Duration::ZERO),
        })
    }

    pub fn forwarders(self: &Arc<Self>) -> Forwarders {
        Forwarders::new()
            .with_connectivity(self.clone())
            .with_notice(self.clone())
            .with_request(self.clone())
            .with_stream(self.clone())
    }

    pub fn answer(&self, reply: Result<ForwardReply, TagError>) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn stream_kinds(&self) -> Vec<&'static str> {
        self.stream.lock().unwrap().iter().map(|(k, _)| *k).collect()
    }
}

#[async_trait]
impl ConnectivityForwarder for Recorder {
    async fn on_connectivity_changed(
        &self,
        _channel: &str,
        _device: &str,
        tag: &str,
        online: bool,
    ) -> Result<(), TagError> {
        self.connectivity.lock().unwrap().push((tag.to_string(), online));
        Ok(())
    }
}

#[async_trait]
impl NoticeForwarder for Recorder {
    async fn publish(
        &self,
        message: &ForwardMessage,
        previous: Option<&TagValue>,
    ) -> Result<(), TagError> {
        self.notices
            .lock()
            .unwrap()
            .push((message.clone(), previous.cloned()));
        Ok(())
    }
}

#[async_trait]
impl RequestForwarder for Recorder {
    async fn send(&self, message: &ForwardMessage) -> Result<ForwardReply, TagError> {
        self.requests.lock().unwrap().push(message.clone());
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.reply.lock().unwrap().clone()
    }
}

#[async_trait]
impl StreamForwarder for Recorder {
    async fn on_start(&self, message: &ForwardMessage) -> Result<(), TagError> {
        self.stream.lock().unwrap().push(("start", message.clone()));
        Ok(())
    }

    async fn on_sample(&self, message: &ForwardMessage) -> Result<(), TagError> {
        self.stream.lock().unwrap().push(("sample", message.clone()));
        Ok(())
    }

    async fn on_stop(&self, message: &ForwardMessage) -> Result<(), TagError> {
        self.stream.lock().unwrap().push(("stop", message.clone()));
        Ok(())
    }
}
