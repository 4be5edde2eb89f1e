use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::broker::Publisher;
use super::detect::{notice_fires, HeartbeatDetector, SwitchDetector, TriggerDetector};
use super::events::{TagContext, TagEvent};
use super::handlers::write_ack;
use super::Services;
use crate::data_mgmt::models::PayloadData;
use crate::node_mgmt::topology::Flag;

enum Detector {
    Heartbeat(HeartbeatDetector),
    Trigger(TriggerDetector),
    Notice,
    Switch(SwitchDetector),
}

impl Detector {
    fn for_context(ctx: &TagContext) -> Option<Self> {
        match ctx.tag.flag {
            Flag::Normal => None,
            Flag::Heartbeat => Some(Detector::Heartbeat(HeartbeatDetector::new(ctx.tag.auto_ack))),
            Flag::Trigger => Some(Detector::Trigger(TriggerDetector::new(ctx.runtime.armed_value))),
            Flag::Notice => Some(Detector::Notice),
            Flag::Switch => Some(Detector::Switch(SwitchDetector::new())),
        }
    }
}

struct Poller {
    ctx: Arc<TagContext>,
    services: Arc<Services>,
    publisher: Publisher<TagEvent>,
    token: CancellationToken,
}

impl Poller {
    fn detect(&self, detector: &mut Detector, payload: PayloadData) -> Option<TagEvent> {
        let ctx = self.ctx.clone();
        match detector {
            Detector::Heartbeat(d) => {
                let recorded = self.services.snapshot.get(self.ctx.tag.id);
                let online = d.observe(&payload.value, recorded.as_ref())?;
                Some(TagEvent::Heartbeat {
                    ctx,
                    payload,
                    online,
                })
            }
            Detector::Trigger(d) => d
                .observe(&payload.value)
                .then_some(TagEvent::Trigger { ctx, payload }),
            Detector::Notice => {
                let previous = self
                    .services
                    .snapshot
                    .set(payload.clone())
                    .map(|e| e.payload.value);
                notice_fires(self.ctx.tag.publish_mode, previous.as_ref(), &payload.value).then_some(
                    TagEvent::Notice {
                        ctx,
                        payload,
                        previous,
                    },
                )
            }
            Detector::Switch(d) => {
                let on = d.observe(&payload.value)?;
                Some(TagEvent::Switch { ctx, payload, on })
            }
        }
    }

    /// Deliver an acknowledgement left over from an earlier trigger.
    /// Returns true once it went through.
    async fn retry_pending_ack(&self) -> bool {
        let Some(pending) = self.services.ledger.pending(self.ctx.tag.id) else {
            return false;
        };
        match write_ack(&self.services, &self.ctx, pending.status_code, &self.token).await {
            Ok(_) => {
                log::info!(
                    "[{}] Delivered pending acknowledge {}",
                    self.ctx.label(),
                    pending.status_code
                );
                true
            }
            Err(e) => {
                log::debug!("[{}] Pending acknowledge still undelivered: {}", self.ctx.label(), e);
                false
            }
        }
    }

    async fn run(self) {
        let Some(mut detector) = Detector::for_context(&self.ctx) else {
            return;
        };
        let every = self
            .ctx
            .tag
            .scan_interval(self.services.settings.default_scan_rate());
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::debug!("[{}] Polling every {:?}", self.ctx.label(), every);

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let payload = match self.ctx.runtime.read_one(&self.ctx.tag, &self.token).await {
                Ok(payload) => payload,
                Err(e) if e.is_cancelled() => break,
                Err(e) => {
                    log::warn!("[{}] Read failed: {}", self.ctx.label(), e);
                    continue;
                }
            };

            // the reading that is still waiting for this ack must not fire again
            if matches!(detector, Detector::Trigger(_)) && self.retry_pending_ack().await {
                self.detect(&mut detector, payload);
                continue;
            }

            if let Some(event) = self.detect(&mut detector, payload) {
                log::debug!("[{}] Detected {}", self.ctx.label(), event.kind());
                if self.publisher.publish(event, &self.token).await.is_err() {
                    break;
                }
            }
        }
        log::debug!("[{}] Poller stopped", self.ctx.label());
    }
}

pub async fn run_poller(
    ctx: Arc<TagContext>,
    services: Arc<Services>,
    publisher: Publisher<TagEvent>,
    token: CancellationToken,
) {
    Poller {
        ctx,
        services,
        publisher,
        token,
    }
    .run()
    .await
}
