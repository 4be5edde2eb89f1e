//! Reactions to detected events, one per flag.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use super::broker::{EventHandler, Publisher};
use super::events::{TagContext, TagEvent};
use super::Services;
use crate::constants::status_codes;
use crate::data_mgmt::ack_ledger::PendingAck;
use crate::data_mgmt::models::{PayloadData, TagValue};
use crate::errors::TagError;
use crate::interfaces::ForwardMessage;
use crate::node_mgmt::topology::{Flag, Tag, TagId};

/// Status as written to the device: a code equal to the armed value would
/// look like a new trigger, so it goes out as 0.
pub fn ack_code(status: i64, armed_value: i64) -> i64 {
    if status == armed_value {
        0
    } else {
        status
    }
}

/// Tag receiving a trigger's status: its `ack_tag` when configured and
/// resolvable, the trigger itself otherwise.
fn ack_target(ctx: &TagContext) -> &Tag {
    ctx.tag
        .ack_tag
        .as_deref()
        .and_then(|name| ctx.device().resolve_tag(ctx.group(), name))
        .unwrap_or(&ctx.tag)
}

/// Write a trigger status back to the device and record the written value.
pub(super) async fn write_ack(
    services: &Services,
    ctx: &TagContext,
    code: i64,
    token: &CancellationToken,
) -> Result<PayloadData, TagError> {
    let target = ack_target(ctx);
    let written = ctx
        .runtime
        .write(target, &TagValue::from_json(&code.into())?, token)
        .await?;
    services.snapshot.set(written.clone());
    services.ledger.clear(ctx.tag.id).await;
    Ok(written)
}

struct SwitchSession {
    id: u64,
    token: CancellationToken,
}

pub struct Handlers {
    services: Arc<Services>,
    publisher: Publisher<TagEvent>,
    token: CancellationToken,
    switches: DashMap<TagId, SwitchSession>,
    next_session: AtomicU64,
}

impl Handlers {
    pub fn new(
        services: Arc<Services>,
        publisher: Publisher<TagEvent>,
        token: CancellationToken,
    ) -> Self {
        Self {
            services,
            publisher,
            token,
            switches: DashMap::new(),
            next_session: AtomicU64::new(1),
        }
    }

    /// A forwarder call that gives up once the engine stops.
    async fn forward<T>(
        &self,
        call: impl Future<Output = Result<T, TagError>>,
    ) -> Result<T, TagError> {
        tokio::select! {
            result = call => result,
            _ = self.token.cancelled() => Err(TagError::cancelled()),
        }
    }

    fn message(ctx: &TagContext, flag: Flag, values: Vec<PayloadData>) -> ForwardMessage {
        ForwardMessage::new(
            flag,
            ctx.channel_name(),
            &ctx.device().name,
            ctx.group_name(),
            &ctx.tag.name,
            values,
        )
    }

    async fn on_heartbeat(&self, ctx: &TagContext, payload: PayloadData, online: bool) {
        self.services.snapshot.set(payload.clone());

        if ctx.tag.auto_ack {
            let complement = TagValue::Bool(!online);
            // recorded ahead of the write: the poller may read the complement
            // back before this task resumes
            self.services
                .snapshot
                .set(PayloadData::new(&ctx.tag, complement.clone()));
            match ctx.runtime.write(&ctx.tag, &complement, &self.token).await {
                Ok(written) => {
                    self.services.snapshot.set(written);
                }
                Err(e) => {
                    log::warn!("[{}] Heartbeat acknowledge failed: {}", ctx.label(), e);
                    self.services.snapshot.set(payload);
                }
            }
        }

        if ctx.tag.signal_only {
            return;
        }
        let Some(forwarder) = &self.services.forwarders.connectivity else {
            return;
        };
        let call = forwarder.on_connectivity_changed(
            ctx.channel_name(),
            &ctx.device().name,
            &ctx.tag.name,
            online,
        );
        if let Err(e) = self.forward(call).await {
            log::warn!("[{}] Connectivity forward failed: {}", ctx.label(), e);
        }
    }

    async fn on_notice(&self, ctx: &TagContext, payload: PayloadData, previous: Option<TagValue>) {
        let companions = match ctx.runtime.read(&ctx.tag.normal_tags, &self.token).await {
            Ok(values) => values,
            Err(e) => {
                log::warn!("[{}] Notice companion read failed: {}", ctx.label(), e);
                return;
            }
        };

        let mut values = Vec::with_capacity(companions.len() + 1);
        values.push(payload);
        values.extend(companions);
        self.services.snapshot.set_many(values.iter().cloned());

        let Some(forwarder) = &self.services.forwarders.notice else {
            log::debug!("[{}] No notice forwarder registered", ctx.label());
            return;
        };
        let message = Self::message(ctx, Flag::Notice, values);
        match self.forward(forwarder.publish(&message, previous.as_ref())).await {
            Ok(()) => log::info!("[{}] Notice {} published", ctx.label(), message.id),
            Err(e) => log::warn!("[{}] Notice publish failed: {}", ctx.label(), e),
        }
    }

    /// Read companions, forward, apply callback items. Returns the status to
    /// write back, or `None` when the engine stopped before an outcome was
    /// known; the device stays armed and the next run fires again.
    async fn process_trigger(&self, ctx: &TagContext, payload: PayloadData) -> Option<i64> {
        let companions = match ctx.runtime.read(&ctx.tag.normal_tags, &self.token).await {
            Ok(values) => values,
            Err(e) if e.is_cancelled() => return None,
            Err(e) => {
                log::warn!("[{}] Trigger companion read failed: {}", ctx.label(), e);
                return Some(status_codes::MULTI_READ_ERROR);
            }
        };

        let Some(forwarder) = &self.services.forwarders.request else {
            log::warn!("[{}] No request forwarder registered", ctx.label());
            return Some(status_codes::NO_FORWARDER);
        };

        let mut values = Vec::with_capacity(companions.len() + 1);
        values.push(payload);
        values.extend(companions);
        let message = Self::message(ctx, Flag::Trigger, values);

        let timeout = self.services.settings.forward_timeout();
        let sent = tokio::select! {
            sent = tokio::time::timeout(timeout, forwarder.send(&message)) => sent,
            _ = self.token.cancelled() => {
                log::info!("[{}] Trigger {} abandoned on shutdown", ctx.label(), message.id);
                return None;
            }
        };
        let reply = match sent {
            Err(_) => {
                log::warn!(
                    "[{}] Request forwarder did not answer within {:?}",
                    ctx.label(),
                    timeout
                );
                return Some(status_codes::FORWARD_TIMEOUT);
            }
            Ok(Err(TagError::Forwarder {
                status_code,
                message,
            })) => {
                log::warn!(
                    "[{}] Request forwarder failed with {}: {}",
                    ctx.label(),
                    status_code,
                    message
                );
                return Some(status_code);
            }
            Ok(Err(e)) => {
                log::warn!("[{}] Request forwarder failed: {}", ctx.label(), e);
                return Some(status_codes::FORWARD_ERROR);
            }
            Ok(Ok(reply)) if !reply.success => {
                log::warn!(
                    "[{}] Request forwarder rejected {} with {}: {}",
                    ctx.label(),
                    message.id,
                    reply.status_code,
                    reply.message.as_deref().unwrap_or("")
                );
                return Some(match reply.status_code {
                    0 => status_codes::FORWARD_ERROR,
                    code => code,
                });
            }
            Ok(Ok(reply)) => reply,
        };

        let items_ok = self.write_callback_items(ctx, &reply.callback_items).await;
        if self.token.is_cancelled() {
            return None;
        }
        if !items_ok {
            return Some(status_codes::CALLBACK_ITEM_ERROR);
        }
        log::info!(
            "[{}] Trigger {} forwarded, status {}",
            ctx.label(),
            message.id,
            reply.status_code
        );
        Some(reply.status_code)
    }

    /// Returns false if any item could not be resolved, converted or written.
    async fn write_callback_items(
        &self,
        ctx: &TagContext,
        items: &BTreeMap<String, serde_json::Value>,
    ) -> bool {
        let mut all_ok = true;
        for (name, raw) in items {
            match self.write_callback_item(ctx, name, raw).await {
                Ok(written) => {
                    self.services.snapshot.set(written);
                }
                Err(e) => {
                    log::warn!("[{}] Callback item '{}' failed: {}", ctx.label(), name, e);
                    all_ok = false;
                }
            }
        }
        all_ok
    }

    async fn write_callback_item(
        &self,
        ctx: &TagContext,
        name: &str,
        raw: &serde_json::Value,
    ) -> Result<PayloadData, TagError> {
        let tag = ctx
            .device()
            .resolve_tag(ctx.group(), name)
            .ok_or_else(|| TagError::AddressResolution(name.to_string()))?;
        let value = TagValue::from_json(raw)?;
        ctx.runtime.write(tag, &value, &self.token).await
    }

    async fn on_trigger(&self, ctx: &TagContext, payload: PayloadData) {
        let Some(status) = self.process_trigger(ctx, payload).await else {
            return;
        };
        let code = ack_code(status, ctx.runtime.armed_value);

        match write_ack(&self.services, ctx, code, &self.token).await {
            Ok(written) => log::debug!("[{}] Acknowledged with {}", ctx.label(), written.value),
            Err(e) if e.is_cancelled() => {
                log::info!("[{}] Acknowledge {} dropped on shutdown", ctx.label(), code);
            }
            Err(e @ (TagError::ConnectionUnavailable(_) | TagError::Transport { .. })) => {
                log::warn!("[{}] Acknowledge {} not delivered: {}", ctx.label(), code, e);
                self.services
                    .ledger
                    .mark(PendingAck {
                        tag_id: ctx.tag.id,
                        device_id: ctx.device().id,
                        status_code: code,
                        recorded_at: Utc::now(),
                    })
                    .await;
            }
            Err(e) => log::error!("[{}] Acknowledge {} rejected: {}", ctx.label(), code, e),
        }
    }

    async fn on_switch(&self, ctx: Arc<TagContext>, payload: PayloadData, on: bool) {
        self.services.snapshot.set(payload.clone());
        let message = Self::message(&ctx, Flag::Switch, vec![payload]);
        let stream = self.services.forwarders.stream.as_ref();

        if on {
            if self.switches.contains_key(&ctx.tag.id) {
                return;
            }
            let session = SwitchSession {
                id: self.next_session.fetch_add(1, Ordering::Relaxed),
                token: self.token.child_token(),
            };
            tokio::spawn(run_sampler(
                ctx.clone(),
                self.services.clone(),
                self.publisher.clone(),
                session.id,
                session.token.clone(),
            ));
            self.switches.insert(ctx.tag.id, session);
            log::info!("[{}] Switch on, sampling companions", ctx.label());
            if let Some(stream) = stream {
                if let Err(e) = self.forward(stream.on_start(&message)).await {
                    log::warn!("[{}] Stream start forward failed: {}", ctx.label(), e);
                }
            }
        } else {
            let Some((_, session)) = self.switches.remove(&ctx.tag.id) else {
                return;
            };
            session.token.cancel();
            log::info!("[{}] Switch off", ctx.label());
            if let Some(stream) = stream {
                if let Err(e) = self.forward(stream.on_stop(&message)).await {
                    log::warn!("[{}] Stream stop forward failed: {}", ctx.label(), e);
                }
            }
        }
    }

    async fn on_switch_sample(&self, ctx: &TagContext, session: u64, values: Vec<PayloadData>) {
        let current = self.switches.get(&ctx.tag.id).map(|s| s.id);
        if current != Some(session) {
            log::trace!("[{}] Dropping sample of a finished switch session", ctx.label());
            return;
        }
        self.services.snapshot.set_many(values.iter().cloned());
        if let Some(stream) = &self.services.forwarders.stream {
            let message = Self::message(ctx, Flag::Switch, values);
            if let Err(e) = self.forward(stream.on_sample(&message)).await {
                log::warn!("[{}] Stream sample forward failed: {}", ctx.label(), e);
            }
        }
    }
}

#[async_trait]
impl EventHandler<TagEvent> for Handlers {
    async fn handle(&self, event: TagEvent) {
        log::trace!("[{}] Handling {} event", event.context().label(), event.kind());
        match event {
            TagEvent::Heartbeat {
                ctx,
                payload,
                online,
            } => self.on_heartbeat(&ctx, payload, online).await,
            TagEvent::Trigger { ctx, payload } => self.on_trigger(&ctx, payload).await,
            TagEvent::Notice {
                ctx,
                payload,
                previous,
            } => self.on_notice(&ctx, payload, previous).await,
            TagEvent::Switch { ctx, payload, on } => self.on_switch(ctx, payload, on).await,
            TagEvent::SwitchSample {
                ctx,
                session,
                values,
            } => self.on_switch_sample(&ctx, session, values).await,
        }
    }
}

/// Read a switch's companions at its sample rate until the session ends.
async fn run_sampler(
    ctx: Arc<TagContext>,
    services: Arc<Services>,
    publisher: Publisher<TagEvent>,
    session: u64,
    token: CancellationToken,
) {
    let every = ctx
        .tag
        .sample_interval(services.settings.switch_sample_rate());
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let values = match ctx.runtime.read(&ctx.tag.normal_tags, &token).await {
            Ok(values) => values,
            Err(e) if e.is_cancelled() => break,
            Err(e) => {
                log::warn!("[{}] Switch sample read failed: {}", ctx.label(), e);
                continue;
            }
        };
        let event = TagEvent::SwitchSample {
            ctx: ctx.clone(),
            session,
            values,
        };
        if publisher.publish(event, &token).await.is_err() {
            break;
        }
    }
    log::debug!("[{}] Sampler stopped", ctx.label());
}
