//! AMQP 0-9-1 Channel Multiplexing
//!
//! This module provides the channel table that maps channel numbers to
//! handlers, the id allocator, and the exchange/queue handlers with their
//! consumer records.
//!
//! # Overview
//!
//! A connection multiplexes up to `channel-max` lightweight channels over one
//! transport. Channel 0 is reserved for the connection itself and is never
//! allocated here; every other channel belongs to one handler that receives
//! the method, content-header, and content-body events arriving on its id.
//!
//! Handlers emit their own outbound frames through the [`FrameSink`] passed
//! into each callback, so they hold no reference back to the connection.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use log::{debug, trace, warn};
use uuid::Uuid;

use crate::codec::FrameEncoder;
use crate::error::{AmqpError, AmqpResult};
use crate::methods::{self, BasicProperties, Method};
use crate::types::{FieldTable, FieldValue};

/// Lifecycle of a channel or consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Channel.Open sent, declare cascade in flight.
    Opening,
    /// Declared and usable.
    Open,
    /// Torn down locally or by the server.
    Closed,
}

/// Outbound frame queue handed to handlers during dispatch.
///
/// Frames are appended fully serialized and in invocation order; the driver
/// writes them to the transport afterwards.
pub struct FrameSink<'a> {
    frames: &'a mut FrameEncoder,
    outbound: &'a mut VecDeque<Bytes>,
}

impl<'a> FrameSink<'a> {
    pub fn new(frames: &'a mut FrameEncoder, outbound: &'a mut VecDeque<Bytes>) -> Self {
        FrameSink { frames, outbound }
    }

    /// Serialize and queue a method frame.
    pub fn send_method(&mut self, channel: u16, method: &Method) -> AmqpResult<()> {
        trace!("send {} on channel {}", method.def.name, channel);
        let frame = self.frames.method_frame(channel, method)?;
        self.outbound.push_back(frame);
        Ok(())
    }

    /// Serialize and queue a content header plus its body frames.
    pub fn send_content(
        &mut self,
        channel: u16,
        properties: &BasicProperties,
        body: &[u8],
    ) -> AmqpResult<()> {
        let header = self
            .frames
            .content_header_frame(channel, body.len() as u64, properties)?;
        self.outbound.push_back(header);
        for frame in self.frames.body_frames(channel, body) {
            self.outbound.push_back(frame);
        }
        Ok(())
    }
}

/// What a handler multiplexes: used to clean the name→channel maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Exchange,
    Queue,
}

/// A channel's event callbacks.
///
/// `on_method` is mandatory for every handler; content callbacks only fire on
/// channels that carry deliveries or returns.
pub trait ChannelHandler: Send {
    fn name(&self) -> &str;
    fn kind(&self) -> HandlerKind;
    fn state(&self) -> ChannelState;

    fn on_method(&mut self, method: Method, out: &mut FrameSink) -> AmqpResult<()>;
    fn on_content_header(
        &mut self,
        body_size: u64,
        properties: BasicProperties,
        out: &mut FrameSink,
    ) -> AmqpResult<()>;
    fn on_content(&mut self, payload: &[u8], out: &mut FrameSink) -> AmqpResult<()>;

    /// Force the channel (and any consumers) into the closed state without a
    /// close handshake; used by the reconnection supervisor on teardown.
    fn mark_closed(&mut self);

    /// Re-drive the open/declare/consume cascade after a reconnect.
    fn restore(&mut self, out: &mut FrameSink) -> AmqpResult<()>;

    fn as_queue(&mut self) -> Option<&mut QueueHandler> {
        None
    }
}

/// Sparse channel-number → handler table with wrapping id allocation.
#[derive(Default)]
pub struct ChannelTable {
    entries: HashMap<u16, Box<dyn ChannelHandler>>,
    counter: u16,
    channel_max: u16,
    exchanges: HashMap<String, u16>,
    queues: HashMap<String, u16>,
}

impl ChannelTable {
    pub fn new(channel_max: u16) -> Self {
        ChannelTable { channel_max, ..Default::default() }
    }

    pub fn set_channel_max(&mut self, channel_max: u16) {
        self.channel_max = channel_max;
    }

    pub fn channel_max(&self) -> u16 {
        self.channel_max
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Allocate a fresh channel id.
    ///
    /// Scans from `counter % channel_max + 1` upward modulo the range
    /// 1..=channel_max; a full cycle with no free slot fails.
    pub fn allocate_channel_id(&mut self) -> AmqpResult<u16> {
        if self.channel_max == 0 {
            return Err(AmqpError::NoChannelsAvailable);
        }
        let mut candidate = self.counter % self.channel_max + 1;
        for _ in 0..self.channel_max {
            if !self.entries.contains_key(&candidate) {
                self.counter = candidate;
                return Ok(candidate);
            }
            candidate = candidate % self.channel_max + 1;
        }
        Err(AmqpError::NoChannelsAvailable)
    }

    /// Register a handler on a previously allocated id. Channel 0 belongs to
    /// the connection and is rejected.
    pub fn register(&mut self, channel: u16, handler: Box<dyn ChannelHandler>) -> AmqpResult<()> {
        if channel == 0 {
            return Err(AmqpError::invalid_state("channel 0 is reserved for the connection"));
        }
        match handler.kind() {
            HandlerKind::Exchange => {
                self.exchanges.insert(handler.name().to_string(), channel);
            }
            HandlerKind::Queue => {
                self.queues.insert(handler.name().to_string(), channel);
            }
        }
        self.entries.insert(channel, handler);
        Ok(())
    }

    pub fn get_mut(&mut self, channel: u16) -> Option<&mut Box<dyn ChannelHandler>> {
        self.entries.get_mut(&channel)
    }

    /// Release a slot whose handler reached the closed state.
    pub fn release(&mut self, channel: u16) {
        if let Some(handler) = self.entries.remove(&channel) {
            match handler.kind() {
                HandlerKind::Exchange => self.exchange_closed(handler.name()),
                HandlerKind::Queue => self.queue_closed(handler.name()),
            }
        }
    }

    pub fn exchange_closed(&mut self, name: &str) {
        self.exchanges.remove(name);
    }

    pub fn queue_closed(&mut self, name: &str) {
        self.queues.remove(name);
    }

    pub fn exchange_channel(&self, name: &str) -> Option<u16> {
        self.exchanges.get(name).copied()
    }

    pub fn queue_channel(&self, name: &str) -> Option<u16> {
        self.queues.get(name).copied()
    }

    /// Mark every channel closed without releasing slots; the reconnection
    /// supervisor restores them in place.
    pub fn mark_all_closed(&mut self) {
        for handler in self.entries.values_mut() {
            handler.mark_closed();
        }
    }

    /// Run `restore` on every handler, in channel order.
    pub fn restore_all(&mut self, out: &mut FrameSink) -> AmqpResult<()> {
        let mut ids: Vec<u16> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            if let Some(handler) = self.entries.get_mut(&id) {
                handler.restore(out)?;
            }
        }
        Ok(())
    }
}

/// Exchange declaration options.
#[derive(Debug, Clone)]
pub struct ExchangeOptions {
    pub exchange_type: String,
    pub passive: bool,
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    pub arguments: FieldTable,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        ExchangeOptions {
            exchange_type: "topic".to_string(),
            passive: false,
            durable: false,
            auto_delete: false,
            internal: false,
            arguments: FieldTable::new(),
        }
    }
}

/// Queue declaration options.
#[derive(Debug, Clone, Default)]
pub struct QueueOptions {
    pub passive: bool,
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
    pub arguments: FieldTable,
}

/// Consumer registration options.
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    pub no_local: bool,
    /// Fire-and-forget deliveries; the default, matching `ack: false`.
    pub no_ack: bool,
    pub exclusive: bool,
    pub arguments: FieldTable,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        SubscribeOptions {
            no_local: false,
            no_ack: true,
            exclusive: false,
            arguments: FieldTable::new(),
        }
    }
}

/// A message handed to a consumer callback.
#[derive(Debug)]
pub struct Delivery {
    pub consumer_tag: String,
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
    pub properties: BasicProperties,
    pub body: Vec<u8>,
}

pub type DeliveryCallback = Box<dyn FnMut(Delivery) + Send>;
pub type OpenCallback = Box<dyn FnOnce() + Send>;

/// One consumer registered on a queue.
pub struct Consumer {
    pub tag: String,
    pub options: SubscribeOptions,
    pub state: ChannelState,
    callback: DeliveryCallback,
}

fn consumer_tag() -> String {
    format!("warren-ctag-{}", Uuid::new_v4().simple())
}

/// In-flight inbound message: Basic.Deliver seen, body still assembling.
struct PartialDelivery {
    consumer_tag: String,
    delivery_tag: u64,
    redelivered: bool,
    exchange: String,
    routing_key: String,
    properties: BasicProperties,
    body_size: u64,
    body: Vec<u8>,
}

fn str_arg(method: &Method, name: &str) -> String {
    method.arg(name).and_then(FieldValue::as_str).unwrap_or_default().to_string()
}

fn u64_arg(method: &Method, name: &str) -> u64 {
    method.arg(name).and_then(FieldValue::as_u64).unwrap_or_default()
}

fn bool_arg(method: &Method, name: &str) -> bool {
    method.arg(name).and_then(FieldValue::as_bool).unwrap_or_default()
}

/// Channel handler for one exchange.
pub struct ExchangeHandler {
    channel: u16,
    name: String,
    options: ExchangeOptions,
    state: ChannelState,
    open_callback: Option<OpenCallback>,
    pending_return: Option<(u16, String)>,
}

impl ExchangeHandler {
    pub fn new(
        channel: u16,
        name: impl Into<String>,
        options: ExchangeOptions,
        open_callback: Option<OpenCallback>,
    ) -> Self {
        ExchangeHandler {
            channel,
            name: name.into(),
            options,
            state: ChannelState::Opening,
            open_callback,
            pending_return: None,
        }
    }

    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// The default exchange pre-exists server-side and is never declared.
    fn is_default(&self) -> bool {
        self.name.is_empty()
    }

    fn declare(&self) -> Method {
        Method::new(
            &methods::EXCHANGE_DECLARE,
            vec![
                FieldValue::U16(0),
                FieldValue::short_string(self.name.clone()),
                FieldValue::short_string(self.options.exchange_type.clone()),
                FieldValue::Bool(self.options.passive),
                FieldValue::Bool(self.options.durable),
                FieldValue::Bool(self.options.auto_delete),
                FieldValue::Bool(self.options.internal),
                FieldValue::Bool(false),
                FieldValue::Table(self.options.arguments.clone()),
            ],
        )
    }

    fn open(&mut self) {
        self.state = ChannelState::Open;
        if let Some(callback) = self.open_callback.take() {
            callback();
        }
    }
}

impl ChannelHandler for ExchangeHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Exchange
    }

    fn state(&self) -> ChannelState {
        self.state
    }

    fn on_method(&mut self, method: Method, out: &mut FrameSink) -> AmqpResult<()> {
        if method.is(&methods::CHANNEL_OPEN_OK) {
            if self.is_default() {
                self.open();
            } else {
                out.send_method(self.channel, &self.declare())?;
            }
        } else if method.is(&methods::EXCHANGE_DECLARE_OK) {
            self.open();
        } else if method.is(&methods::BASIC_RETURN) {
            self.pending_return =
                Some((u64_arg(&method, "reply-code") as u16, str_arg(&method, "reply-text")));
        } else if method.is(&methods::CHANNEL_CLOSE) {
            warn!(
                "exchange '{}' channel closed by server: {} {}",
                self.name,
                u64_arg(&method, "reply-code"),
                str_arg(&method, "reply-text")
            );
            out.send_method(self.channel, &Method::new(&methods::CHANNEL_CLOSE_OK, vec![]))?;
            self.state = ChannelState::Closed;
        } else if method.is(&methods::CHANNEL_CLOSE_OK) {
            self.state = ChannelState::Closed;
        } else {
            debug!("exchange '{}' ignoring {}", self.name, method.def.name);
        }
        Ok(())
    }

    fn on_content_header(
        &mut self,
        body_size: u64,
        _properties: BasicProperties,
        _out: &mut FrameSink,
    ) -> AmqpResult<()> {
        if body_size == 0 {
            if let Some((code, text)) = self.pending_return.take() {
                warn!("message returned from exchange '{}': {} {}", self.name, code, text);
            }
        }
        Ok(())
    }

    fn on_content(&mut self, _payload: &[u8], _out: &mut FrameSink) -> AmqpResult<()> {
        if let Some((code, text)) = self.pending_return.take() {
            warn!("message returned from exchange '{}': {} {}", self.name, code, text);
        }
        Ok(())
    }

    fn mark_closed(&mut self) {
        self.state = ChannelState::Closed;
    }

    fn restore(&mut self, out: &mut FrameSink) -> AmqpResult<()> {
        self.state = ChannelState::Opening;
        out.send_method(
            self.channel,
            &Method::new(&methods::CHANNEL_OPEN, vec![FieldValue::short_string("")]),
        )
    }
}

/// Channel handler for one queue and its consumers.
pub struct QueueHandler {
    channel: u16,
    name: String,
    options: QueueOptions,
    state: ChannelState,
    open_callback: Option<OpenCallback>,
    consumers: Vec<Consumer>,
    message_count: u32,
    consumer_count: u32,
    partial: Option<PartialDelivery>,
}

impl QueueHandler {
    pub fn new(
        channel: u16,
        name: impl Into<String>,
        options: QueueOptions,
        open_callback: Option<OpenCallback>,
    ) -> Self {
        QueueHandler {
            channel,
            name: name.into(),
            options,
            state: ChannelState::Opening,
            open_callback,
            consumers: Vec::new(),
            message_count: 0,
            consumer_count: 0,
            partial: None,
        }
    }

    pub fn channel(&self) -> u16 {
        self.channel
    }

    pub fn message_count(&self) -> u32 {
        self.message_count
    }

    pub fn consumer_count(&self) -> u32 {
        self.consumer_count
    }

    pub fn consumers(&self) -> impl Iterator<Item = &Consumer> {
        self.consumers.iter()
    }

    fn declare(&self) -> Method {
        Method::new(
            &methods::QUEUE_DECLARE,
            vec![
                FieldValue::U16(0),
                FieldValue::short_string(self.name.clone()),
                FieldValue::Bool(self.options.passive),
                FieldValue::Bool(self.options.durable),
                FieldValue::Bool(self.options.exclusive),
                FieldValue::Bool(self.options.auto_delete),
                FieldValue::Bool(false),
                FieldValue::Table(self.options.arguments.clone()),
            ],
        )
    }

    fn consume_method(&self, consumer: &Consumer) -> Method {
        Method::new(
            &methods::BASIC_CONSUME,
            vec![
                FieldValue::U16(0),
                FieldValue::short_string(self.name.clone()),
                FieldValue::short_string(consumer.tag.clone()),
                FieldValue::Bool(consumer.options.no_local),
                FieldValue::Bool(consumer.options.no_ack),
                FieldValue::Bool(consumer.options.exclusive),
                FieldValue::Bool(false),
                FieldValue::Table(consumer.options.arguments.clone()),
            ],
        )
    }

    /// Register a consumer. Basic.Consume goes out immediately on an open
    /// queue, otherwise after Queue.DeclareOk.
    pub fn subscribe(
        &mut self,
        options: SubscribeOptions,
        callback: DeliveryCallback,
        out: &mut FrameSink,
    ) -> AmqpResult<String> {
        let consumer = Consumer {
            tag: consumer_tag(),
            options,
            state: ChannelState::Opening,
            callback,
        };
        let tag = consumer.tag.clone();
        if self.state == ChannelState::Open {
            out.send_method(self.channel, &self.consume_method(&consumer))?;
        }
        self.consumers.push(consumer);
        Ok(tag)
    }

    /// Acknowledge a delivery.
    pub fn ack(&self, delivery_tag: u64, multiple: bool, out: &mut FrameSink) -> AmqpResult<()> {
        out.send_method(
            self.channel,
            &Method::new(
                &methods::BASIC_ACK,
                vec![FieldValue::U64(delivery_tag), FieldValue::Bool(multiple)],
            ),
        )
    }

    /// Re-request every consumer that is not currently open.
    fn resubscribe(&mut self, out: &mut FrameSink) -> AmqpResult<()> {
        let pending: Vec<Method> = self
            .consumers
            .iter()
            .filter(|c| c.state != ChannelState::Open)
            .map(|c| self.consume_method(c))
            .collect();
        for method in pending {
            out.send_method(self.channel, &method)?;
        }
        Ok(())
    }

    fn complete_delivery(&mut self) {
        if let Some(partial) = self.partial.take() {
            let delivery = Delivery {
                consumer_tag: partial.consumer_tag,
                delivery_tag: partial.delivery_tag,
                redelivered: partial.redelivered,
                exchange: partial.exchange,
                routing_key: partial.routing_key,
                properties: partial.properties,
                body: partial.body,
            };
            match self
                .consumers
                .iter_mut()
                .find(|c| c.tag == delivery.consumer_tag)
            {
                Some(consumer) => (consumer.callback)(delivery),
                None => debug!(
                    "queue '{}' dropping delivery for unknown consumer {}",
                    self.name, delivery.consumer_tag
                ),
            }
        }
    }
}

impl ChannelHandler for QueueHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Queue
    }

    fn state(&self) -> ChannelState {
        self.state
    }

    fn on_method(&mut self, method: Method, out: &mut FrameSink) -> AmqpResult<()> {
        if method.is(&methods::CHANNEL_OPEN_OK) {
            out.send_method(self.channel, &self.declare())?;
        } else if method.is(&methods::QUEUE_DECLARE_OK) {
            // adopt the server-generated name when we declared anonymously
            let declared = str_arg(&method, "queue");
            if self.name.is_empty() {
                self.name = declared;
            }
            self.message_count = u64_arg(&method, "message-count") as u32;
            self.consumer_count = u64_arg(&method, "consumer-count") as u32;
            self.state = ChannelState::Open;
            if let Some(callback) = self.open_callback.take() {
                callback();
            }
            self.resubscribe(out)?;
        } else if method.is(&methods::BASIC_CONSUME_OK) {
            let tag = str_arg(&method, "consumer-tag");
            if let Some(consumer) = self.consumers.iter_mut().find(|c| c.tag == tag) {
                consumer.state = ChannelState::Open;
            }
        } else if method.is(&methods::BASIC_DELIVER) {
            self.partial = Some(PartialDelivery {
                consumer_tag: str_arg(&method, "consumer-tag"),
                delivery_tag: u64_arg(&method, "delivery-tag"),
                redelivered: bool_arg(&method, "redelivered"),
                exchange: str_arg(&method, "exchange"),
                routing_key: str_arg(&method, "routing-key"),
                properties: BasicProperties::default(),
                body_size: 0,
                body: Vec::new(),
            });
        } else if method.is(&methods::BASIC_CANCEL_OK) {
            let tag = str_arg(&method, "consumer-tag");
            self.consumers.retain(|c| c.tag != tag);
        } else if method.is(&methods::CHANNEL_CLOSE) {
            warn!(
                "queue '{}' channel closed by server: {} {}",
                self.name,
                u64_arg(&method, "reply-code"),
                str_arg(&method, "reply-text")
            );
            out.send_method(self.channel, &Method::new(&methods::CHANNEL_CLOSE_OK, vec![]))?;
            self.mark_closed();
        } else if method.is(&methods::CHANNEL_CLOSE_OK) {
            self.mark_closed();
        } else {
            debug!("queue '{}' ignoring {}", self.name, method.def.name);
        }
        Ok(())
    }

    fn on_content_header(
        &mut self,
        body_size: u64,
        properties: BasicProperties,
        _out: &mut FrameSink,
    ) -> AmqpResult<()> {
        if let Some(partial) = self.partial.as_mut() {
            partial.body_size = body_size;
            partial.properties = properties;
            partial.body.reserve(body_size as usize);
            if body_size == 0 {
                self.complete_delivery();
            }
        }
        Ok(())
    }

    fn on_content(&mut self, payload: &[u8], _out: &mut FrameSink) -> AmqpResult<()> {
        if let Some(partial) = self.partial.as_mut() {
            partial.body.extend_from_slice(payload);
            if partial.body.len() as u64 >= partial.body_size {
                self.complete_delivery();
            }
        }
        Ok(())
    }

    fn mark_closed(&mut self) {
        self.state = ChannelState::Closed;
        self.partial = None;
        for consumer in &mut self.consumers {
            consumer.state = ChannelState::Closed;
        }
    }

    fn restore(&mut self, out: &mut FrameSink) -> AmqpResult<()> {
        self.state = ChannelState::Opening;
        out.send_method(
            self.channel,
            &Method::new(&methods::CHANNEL_OPEN, vec![FieldValue::short_string("")]),
        )
    }

    fn as_queue(&mut self) -> Option<&mut QueueHandler> {
        Some(self)
    }
}
