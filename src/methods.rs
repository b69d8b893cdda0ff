//! AMQP 0-9-1 Method Registry
//!
//! A static table enumerating every method this client encodes or decodes,
//! with its wire id and ordered field list. The registry is the single source
//! of truth for the `(class_id, method_id)` ↔ name mapping; both the frame
//! serializer and the parser consult it, and a lookup miss fails decoding
//! with [`AmqpError::UnknownMethod`].
//!
//! The Basic class (60) is the only content-bearing class; its property
//! descriptor lives here too as [`BasicProperties`].
//!
//! # Examples
//!
//! ```rust
//! use warren_amqp::methods::{self, Method};
//! use warren_amqp::types::FieldValue;
//!
//! let close = Method::new(
//!     &methods::CONNECTION_CLOSE,
//!     vec![
//!         FieldValue::U16(200),
//!         FieldValue::short_string("client disconnect"),
//!         FieldValue::U16(0),
//!         FieldValue::U16(0),
//!     ],
//! );
//! assert_eq!(close.arg("reply-code").and_then(|v| v.as_u64()), Some(200));
//! ```

use crate::codec::{Decoder, Encoder};
use crate::error::{AmqpError, AmqpResult};
use crate::types::{Domain, FieldValue};

/// One field of a method or property descriptor.
#[derive(Debug)]
pub struct FieldDef {
    pub name: &'static str,
    pub domain: Domain,
}

/// One method of the protocol.
#[derive(Debug)]
pub struct MethodDef {
    pub class_id: u16,
    pub method_id: u16,
    pub name: &'static str,
    pub fields: &'static [FieldDef],
}

const fn f(name: &'static str, domain: Domain) -> FieldDef {
    FieldDef { name, domain }
}

use crate::types::Domain::{Bit, Long, LongLong, LongStr, Octet, Short, ShortStr, Table, Timestamp};

pub const CONNECTION_CLASS_ID: u16 = 10;
pub const CHANNEL_CLASS_ID: u16 = 20;
pub const EXCHANGE_CLASS_ID: u16 = 40;
pub const QUEUE_CLASS_ID: u16 = 50;
pub const BASIC_CLASS_ID: u16 = 60;
pub const CONFIRM_CLASS_ID: u16 = 85;
pub const TX_CLASS_ID: u16 = 90;

pub static CONNECTION_START: MethodDef = MethodDef {
    class_id: CONNECTION_CLASS_ID,
    method_id: 10,
    name: "connection.start",
    fields: &[
        f("version-major", Octet),
        f("version-minor", Octet),
        f("server-properties", Table),
        f("mechanisms", LongStr),
        f("locales", LongStr),
    ],
};

pub static CONNECTION_START_OK: MethodDef = MethodDef {
    class_id: CONNECTION_CLASS_ID,
    method_id: 11,
    name: "connection.start-ok",
    fields: &[
        f("client-properties", Table),
        f("mechanism", ShortStr),
        f("response", LongStr),
        f("locale", ShortStr),
    ],
};

pub static CONNECTION_TUNE: MethodDef = MethodDef {
    class_id: CONNECTION_CLASS_ID,
    method_id: 30,
    name: "connection.tune",
    fields: &[f("channel-max", Short), f("frame-max", Long), f("heartbeat", Short)],
};

pub static CONNECTION_TUNE_OK: MethodDef = MethodDef {
    class_id: CONNECTION_CLASS_ID,
    method_id: 31,
    name: "connection.tune-ok",
    fields: &[f("channel-max", Short), f("frame-max", Long), f("heartbeat", Short)],
};

pub static CONNECTION_OPEN: MethodDef = MethodDef {
    class_id: CONNECTION_CLASS_ID,
    method_id: 40,
    name: "connection.open",
    fields: &[f("virtual-host", ShortStr), f("reserved-1", ShortStr), f("reserved-2", Bit)],
};

pub static CONNECTION_OPEN_OK: MethodDef = MethodDef {
    class_id: CONNECTION_CLASS_ID,
    method_id: 41,
    name: "connection.open-ok",
    fields: &[f("reserved-1", ShortStr)],
};

pub static CONNECTION_CLOSE: MethodDef = MethodDef {
    class_id: CONNECTION_CLASS_ID,
    method_id: 50,
    name: "connection.close",
    fields: &[
        f("reply-code", Short),
        f("reply-text", ShortStr),
        f("class-id", Short),
        f("method-id", Short),
    ],
};

pub static CONNECTION_CLOSE_OK: MethodDef = MethodDef {
    class_id: CONNECTION_CLASS_ID,
    method_id: 51,
    name: "connection.close-ok",
    fields: &[],
};

pub static CONNECTION_BLOCKED: MethodDef = MethodDef {
    class_id: CONNECTION_CLASS_ID,
    method_id: 60,
    name: "connection.blocked",
    fields: &[f("reason", ShortStr)],
};

pub static CONNECTION_UNBLOCKED: MethodDef = MethodDef {
    class_id: CONNECTION_CLASS_ID,
    method_id: 61,
    name: "connection.unblocked",
    fields: &[],
};

pub static CHANNEL_OPEN: MethodDef = MethodDef {
    class_id: CHANNEL_CLASS_ID,
    method_id: 10,
    name: "channel.open",
    fields: &[f("reserved-1", ShortStr)],
};

pub static CHANNEL_OPEN_OK: MethodDef = MethodDef {
    class_id: CHANNEL_CLASS_ID,
    method_id: 11,
    name: "channel.open-ok",
    fields: &[f("reserved-1", LongStr)],
};

pub static CHANNEL_FLOW: MethodDef = MethodDef {
    class_id: CHANNEL_CLASS_ID,
    method_id: 20,
    name: "channel.flow",
    fields: &[f("active", Bit)],
};

pub static CHANNEL_FLOW_OK: MethodDef = MethodDef {
    class_id: CHANNEL_CLASS_ID,
    method_id: 21,
    name: "channel.flow-ok",
    fields: &[f("active", Bit)],
};

pub static CHANNEL_CLOSE: MethodDef = MethodDef {
    class_id: CHANNEL_CLASS_ID,
    method_id: 40,
    name: "channel.close",
    fields: &[
        f("reply-code", Short),
        f("reply-text", ShortStr),
        f("class-id", Short),
        f("method-id", Short),
    ],
};

pub static CHANNEL_CLOSE_OK: MethodDef = MethodDef {
    class_id: CHANNEL_CLASS_ID,
    method_id: 41,
    name: "channel.close-ok",
    fields: &[],
};

pub static EXCHANGE_DECLARE: MethodDef = MethodDef {
    class_id: EXCHANGE_CLASS_ID,
    method_id: 10,
    name: "exchange.declare",
    fields: &[
        f("reserved-1", Short),
        f("exchange", ShortStr),
        f("type", ShortStr),
        f("passive", Bit),
        f("durable", Bit),
        f("auto-delete", Bit),
        f("internal", Bit),
        f("no-wait", Bit),
        f("arguments", Table),
    ],
};

pub static EXCHANGE_DECLARE_OK: MethodDef = MethodDef {
    class_id: EXCHANGE_CLASS_ID,
    method_id: 11,
    name: "exchange.declare-ok",
    fields: &[],
};

pub static EXCHANGE_DELETE: MethodDef = MethodDef {
    class_id: EXCHANGE_CLASS_ID,
    method_id: 20,
    name: "exchange.delete",
    fields: &[
        f("reserved-1", Short),
        f("exchange", ShortStr),
        f("if-unused", Bit),
        f("no-wait", Bit),
    ],
};

pub static EXCHANGE_DELETE_OK: MethodDef = MethodDef {
    class_id: EXCHANGE_CLASS_ID,
    method_id: 21,
    name: "exchange.delete-ok",
    fields: &[],
};

pub static EXCHANGE_BIND: MethodDef = MethodDef {
    class_id: EXCHANGE_CLASS_ID,
    method_id: 30,
    name: "exchange.bind",
    fields: &[
        f("reserved-1", Short),
        f("destination", ShortStr),
        f("source", ShortStr),
        f("routing-key", ShortStr),
        f("no-wait", Bit),
        f("arguments", Table),
    ],
};

pub static EXCHANGE_BIND_OK: MethodDef = MethodDef {
    class_id: EXCHANGE_CLASS_ID,
    method_id: 31,
    name: "exchange.bind-ok",
    fields: &[],
};

pub static EXCHANGE_UNBIND: MethodDef = MethodDef {
    class_id: EXCHANGE_CLASS_ID,
    method_id: 40,
    name: "exchange.unbind",
    fields: &[
        f("reserved-1", Short),
        f("destination", ShortStr),
        f("source", ShortStr),
        f("routing-key", ShortStr),
        f("no-wait", Bit),
        f("arguments", Table),
    ],
};

pub static EXCHANGE_UNBIND_OK: MethodDef = MethodDef {
    class_id: EXCHANGE_CLASS_ID,
    method_id: 51,
    name: "exchange.unbind-ok",
    fields: &[],
};

pub static QUEUE_DECLARE: MethodDef = MethodDef {
    class_id: QUEUE_CLASS_ID,
    method_id: 10,
    name: "queue.declare",
    fields: &[
        f("reserved-1", Short),
        f("queue", ShortStr),
        f("passive", Bit),
        f("durable", Bit),
        f("exclusive", Bit),
        f("auto-delete", Bit),
        f("no-wait", Bit),
        f("arguments", Table),
    ],
};

pub static QUEUE_DECLARE_OK: MethodDef = MethodDef {
    class_id: QUEUE_CLASS_ID,
    method_id: 11,
    name: "queue.declare-ok",
    fields: &[
        f("queue", ShortStr),
        f("message-count", Long),
        f("consumer-count", Long),
    ],
};

pub static QUEUE_BIND: MethodDef = MethodDef {
    class_id: QUEUE_CLASS_ID,
    method_id: 20,
    name: "queue.bind",
    fields: &[
        f("reserved-1", Short),
        f("queue", ShortStr),
        f("exchange", ShortStr),
        f("routing-key", ShortStr),
        f("no-wait", Bit),
        f("arguments", Table),
    ],
};

pub static QUEUE_BIND_OK: MethodDef = MethodDef {
    class_id: QUEUE_CLASS_ID,
    method_id: 21,
    name: "queue.bind-ok",
    fields: &[],
};

pub static QUEUE_PURGE: MethodDef = MethodDef {
    class_id: QUEUE_CLASS_ID,
    method_id: 30,
    name: "queue.purge",
    fields: &[f("reserved-1", Short), f("queue", ShortStr), f("no-wait", Bit)],
};

pub static QUEUE_PURGE_OK: MethodDef = MethodDef {
    class_id: QUEUE_CLASS_ID,
    method_id: 31,
    name: "queue.purge-ok",
    fields: &[f("message-count", Long)],
};

pub static QUEUE_DELETE: MethodDef = MethodDef {
    class_id: QUEUE_CLASS_ID,
    method_id: 40,
    name: "queue.delete",
    fields: &[
        f("reserved-1", Short),
        f("queue", ShortStr),
        f("if-unused", Bit),
        f("if-empty", Bit),
        f("no-wait", Bit),
    ],
};

pub static QUEUE_DELETE_OK: MethodDef = MethodDef {
    class_id: QUEUE_CLASS_ID,
    method_id: 41,
    name: "queue.delete-ok",
    fields: &[f("message-count", Long)],
};

pub static QUEUE_UNBIND: MethodDef = MethodDef {
    class_id: QUEUE_CLASS_ID,
    method_id: 50,
    name: "queue.unbind",
    fields: &[
        f("reserved-1", Short),
        f("queue", ShortStr),
        f("exchange", ShortStr),
        f("routing-key", ShortStr),
        f("arguments", Table),
    ],
};

pub static QUEUE_UNBIND_OK: MethodDef = MethodDef {
    class_id: QUEUE_CLASS_ID,
    method_id: 51,
    name: "queue.unbind-ok",
    fields: &[],
};

pub static BASIC_QOS: MethodDef = MethodDef {
    class_id: BASIC_CLASS_ID,
    method_id: 10,
    name: "basic.qos",
    fields: &[
        f("prefetch-size", Long),
        f("prefetch-count", Short),
        f("global", Bit),
    ],
};

pub static BASIC_QOS_OK: MethodDef = MethodDef {
    class_id: BASIC_CLASS_ID,
    method_id: 11,
    name: "basic.qos-ok",
    fields: &[],
};

pub static BASIC_CONSUME: MethodDef = MethodDef {
    class_id: BASIC_CLASS_ID,
    method_id: 20,
    name: "basic.consume",
    fields: &[
        f("reserved-1", Short),
        f("queue", ShortStr),
        f("consumer-tag", ShortStr),
        f("no-local", Bit),
        f("no-ack", Bit),
        f("exclusive", Bit),
        f("no-wait", Bit),
        f("arguments", Table),
    ],
};

pub static BASIC_CONSUME_OK: MethodDef = MethodDef {
    class_id: BASIC_CLASS_ID,
    method_id: 21,
    name: "basic.consume-ok",
    fields: &[f("consumer-tag", ShortStr)],
};

pub static BASIC_CANCEL: MethodDef = MethodDef {
    class_id: BASIC_CLASS_ID,
    method_id: 30,
    name: "basic.cancel",
    fields: &[f("consumer-tag", ShortStr), f("no-wait", Bit)],
};

pub static BASIC_CANCEL_OK: MethodDef = MethodDef {
    class_id: BASIC_CLASS_ID,
    method_id: 31,
    name: "basic.cancel-ok",
    fields: &[f("consumer-tag", ShortStr)],
};

pub static BASIC_PUBLISH: MethodDef = MethodDef {
    class_id: BASIC_CLASS_ID,
    method_id: 40,
    name: "basic.publish",
    fields: &[
        f("reserved-1", Short),
        f("exchange", ShortStr),
        f("routing-key", ShortStr),
        f("mandatory", Bit),
        f("immediate", Bit),
    ],
};

pub static BASIC_RETURN: MethodDef = MethodDef {
    class_id: BASIC_CLASS_ID,
    method_id: 50,
    name: "basic.return",
    fields: &[
        f("reply-code", Short),
        f("reply-text", ShortStr),
        f("exchange", ShortStr),
        f("routing-key", ShortStr),
    ],
};

pub static BASIC_DELIVER: MethodDef = MethodDef {
    class_id: BASIC_CLASS_ID,
    method_id: 60,
    name: "basic.deliver",
    fields: &[
        f("consumer-tag", ShortStr),
        f("delivery-tag", LongLong),
        f("redelivered", Bit),
        f("exchange", ShortStr),
        f("routing-key", ShortStr),
    ],
};

pub static BASIC_GET: MethodDef = MethodDef {
    class_id: BASIC_CLASS_ID,
    method_id: 70,
    name: "basic.get",
    fields: &[f("reserved-1", Short), f("queue", ShortStr), f("no-ack", Bit)],
};

pub static BASIC_GET_OK: MethodDef = MethodDef {
    class_id: BASIC_CLASS_ID,
    method_id: 71,
    name: "basic.get-ok",
    fields: &[
        f("delivery-tag", LongLong),
        f("redelivered", Bit),
        f("exchange", ShortStr),
        f("routing-key", ShortStr),
        f("message-count", Long),
    ],
};

pub static BASIC_GET_EMPTY: MethodDef = MethodDef {
    class_id: BASIC_CLASS_ID,
    method_id: 72,
    name: "basic.get-empty",
    fields: &[f("reserved-1", ShortStr)],
};

pub static BASIC_ACK: MethodDef = MethodDef {
    class_id: BASIC_CLASS_ID,
    method_id: 80,
    name: "basic.ack",
    fields: &[f("delivery-tag", LongLong), f("multiple", Bit)],
};

pub static BASIC_REJECT: MethodDef = MethodDef {
    class_id: BASIC_CLASS_ID,
    method_id: 90,
    name: "basic.reject",
    fields: &[f("delivery-tag", LongLong), f("requeue", Bit)],
};

pub static BASIC_RECOVER_ASYNC: MethodDef = MethodDef {
    class_id: BASIC_CLASS_ID,
    method_id: 100,
    name: "basic.recover-async",
    fields: &[f("requeue", Bit)],
};

pub static BASIC_RECOVER: MethodDef = MethodDef {
    class_id: BASIC_CLASS_ID,
    method_id: 110,
    name: "basic.recover",
    fields: &[f("requeue", Bit)],
};

pub static BASIC_RECOVER_OK: MethodDef = MethodDef {
    class_id: BASIC_CLASS_ID,
    method_id: 111,
    name: "basic.recover-ok",
    fields: &[],
};

pub static BASIC_NACK: MethodDef = MethodDef {
    class_id: BASIC_CLASS_ID,
    method_id: 120,
    name: "basic.nack",
    fields: &[
        f("delivery-tag", LongLong),
        f("multiple", Bit),
        f("requeue", Bit),
    ],
};

pub static TX_SELECT: MethodDef =
    MethodDef { class_id: TX_CLASS_ID, method_id: 10, name: "tx.select", fields: &[] };
pub static TX_SELECT_OK: MethodDef =
    MethodDef { class_id: TX_CLASS_ID, method_id: 11, name: "tx.select-ok", fields: &[] };
pub static TX_COMMIT: MethodDef =
    MethodDef { class_id: TX_CLASS_ID, method_id: 20, name: "tx.commit", fields: &[] };
pub static TX_COMMIT_OK: MethodDef =
    MethodDef { class_id: TX_CLASS_ID, method_id: 21, name: "tx.commit-ok", fields: &[] };
pub static TX_ROLLBACK: MethodDef =
    MethodDef { class_id: TX_CLASS_ID, method_id: 30, name: "tx.rollback", fields: &[] };
pub static TX_ROLLBACK_OK: MethodDef =
    MethodDef { class_id: TX_CLASS_ID, method_id: 31, name: "tx.rollback-ok", fields: &[] };

pub static CONFIRM_SELECT: MethodDef = MethodDef {
    class_id: CONFIRM_CLASS_ID,
    method_id: 10,
    name: "confirm.select",
    fields: &[f("no-wait", Bit)],
};

pub static CONFIRM_SELECT_OK: MethodDef = MethodDef {
    class_id: CONFIRM_CLASS_ID,
    method_id: 11,
    name: "confirm.select-ok",
    fields: &[],
};

/// Every method the client knows, in class/method order.
pub static METHODS: &[&MethodDef] = &[
    &CONNECTION_START,
    &CONNECTION_START_OK,
    &CONNECTION_TUNE,
    &CONNECTION_TUNE_OK,
    &CONNECTION_OPEN,
    &CONNECTION_OPEN_OK,
    &CONNECTION_CLOSE,
    &CONNECTION_CLOSE_OK,
    &CONNECTION_BLOCKED,
    &CONNECTION_UNBLOCKED,
    &CHANNEL_OPEN,
    &CHANNEL_OPEN_OK,
    &CHANNEL_FLOW,
    &CHANNEL_FLOW_OK,
    &CHANNEL_CLOSE,
    &CHANNEL_CLOSE_OK,
    &EXCHANGE_DECLARE,
    &EXCHANGE_DECLARE_OK,
    &EXCHANGE_DELETE,
    &EXCHANGE_DELETE_OK,
    &EXCHANGE_BIND,
    &EXCHANGE_BIND_OK,
    &EXCHANGE_UNBIND,
    &EXCHANGE_UNBIND_OK,
    &QUEUE_DECLARE,
    &QUEUE_DECLARE_OK,
    &QUEUE_BIND,
    &QUEUE_BIND_OK,
    &QUEUE_PURGE,
    &QUEUE_PURGE_OK,
    &QUEUE_DELETE,
    &QUEUE_DELETE_OK,
    &QUEUE_UNBIND,
    &QUEUE_UNBIND_OK,
    &BASIC_QOS,
    &BASIC_QOS_OK,
    &BASIC_CONSUME,
    &BASIC_CONSUME_OK,
    &BASIC_CANCEL,
    &BASIC_CANCEL_OK,
    &BASIC_PUBLISH,
    &BASIC_RETURN,
    &BASIC_DELIVER,
    &BASIC_GET,
    &BASIC_GET_OK,
    &BASIC_GET_EMPTY,
    &BASIC_ACK,
    &BASIC_REJECT,
    &BASIC_RECOVER_ASYNC,
    &BASIC_RECOVER,
    &BASIC_RECOVER_OK,
    &BASIC_NACK,
    &TX_SELECT,
    &TX_SELECT_OK,
    &TX_COMMIT,
    &TX_COMMIT_OK,
    &TX_ROLLBACK,
    &TX_ROLLBACK_OK,
    &CONFIRM_SELECT,
    &CONFIRM_SELECT_OK,
];

/// Find a method descriptor by wire id.
pub fn lookup(class_id: u16, method_id: u16) -> Option<&'static MethodDef> {
    METHODS
        .iter()
        .find(|m| m.class_id == class_id && m.method_id == method_id)
        .copied()
}

/// A decoded or to-be-encoded method: a descriptor plus positional args.
#[derive(Debug, Clone)]
pub struct Method {
    pub def: &'static MethodDef,
    pub args: Vec<FieldValue>,
}

impl Method {
    pub fn new(def: &'static MethodDef, args: Vec<FieldValue>) -> Self {
        Method { def, args }
    }

    /// Whether this is the given method.
    pub fn is(&self, def: &MethodDef) -> bool {
        self.def.class_id == def.class_id && self.def.method_id == def.method_id
    }

    /// Positional argument by declared field name.
    pub fn arg(&self, name: &str) -> Option<&FieldValue> {
        self.def
            .fields
            .iter()
            .position(|field| field.name == name)
            .and_then(|i| self.args.get(i))
    }

    /// Serialize the argument list, packing consecutive bits into octets.
    pub fn encode_args(&self, encoder: &mut Encoder) -> AmqpResult<()> {
        if self.args.len() != self.def.fields.len() {
            return Err(AmqpError::frame(format!(
                "{} expects {} args, got {}",
                self.def.name,
                self.def.fields.len(),
                self.args.len()
            )));
        }

        let mut bits: u8 = 0;
        let mut nbits: u8 = 0;
        for (field, value) in self.def.fields.iter().zip(&self.args) {
            if field.domain != Domain::Bit && nbits > 0 {
                encoder.encode_octet(bits);
                bits = 0;
                nbits = 0;
            }
            match (field.domain, value) {
                (Domain::Bit, FieldValue::Bool(b)) => {
                    if *b {
                        bits |= 1 << nbits;
                    }
                    nbits += 1;
                    if nbits == 8 {
                        encoder.encode_octet(bits);
                        bits = 0;
                        nbits = 0;
                    }
                }
                (Domain::Octet, FieldValue::U8(n)) => encoder.encode_octet(*n),
                (Domain::Short, FieldValue::U16(n)) => encoder.encode_short(*n),
                (Domain::Long, FieldValue::U32(n)) => encoder.encode_long(*n),
                (Domain::LongLong, FieldValue::U64(n)) => encoder.encode_longlong(*n),
                (Domain::Timestamp, FieldValue::Timestamp(n))
                | (Domain::Timestamp, FieldValue::U64(n)) => encoder.encode_longlong(*n),
                (Domain::ShortStr, FieldValue::ShortString(s)) => {
                    encoder.encode_short_string(s)?
                }
                (Domain::LongStr, FieldValue::LongString(b)) => encoder.encode_long_string(b),
                (Domain::Table, FieldValue::Table(t)) => encoder.encode_table(t)?,
                (domain, value) => {
                    return Err(AmqpError::frame(format!(
                        "{}: field {:?} cannot carry {:?}",
                        self.def.name, domain, value
                    )));
                }
            }
        }
        if nbits > 0 {
            encoder.encode_octet(bits);
        }
        Ok(())
    }

    /// Decode a method frame payload: class id, method id, then the argument
    /// list per the registry descriptor.
    pub fn decode(decoder: &mut Decoder) -> AmqpResult<Method> {
        let class_id = decoder.decode_short()?;
        let method_id = decoder.decode_short()?;
        let def = lookup(class_id, method_id)
            .ok_or(AmqpError::UnknownMethod { class_id, method_id })?;

        let mut args = Vec::with_capacity(def.fields.len());
        let mut bits: u8 = 0;
        let mut nbits: u8 = 0;
        for field in def.fields {
            if field.domain != Domain::Bit {
                nbits = 0;
            }
            let value = match field.domain {
                Domain::Bit => {
                    if nbits == 0 {
                        bits = decoder.decode_octet()?;
                    }
                    let value = FieldValue::Bool(bits & (1 << nbits) != 0);
                    nbits = (nbits + 1) % 8;
                    value
                }
                Domain::Octet => FieldValue::U8(decoder.decode_octet()?),
                Domain::Short => FieldValue::U16(decoder.decode_short()?),
                Domain::Long => FieldValue::U32(decoder.decode_long()?),
                Domain::LongLong => FieldValue::U64(decoder.decode_longlong()?),
                Domain::Timestamp => FieldValue::Timestamp(decoder.decode_longlong()?),
                Domain::ShortStr => FieldValue::ShortString(decoder.decode_short_string()?),
                Domain::LongStr => FieldValue::LongString(decoder.decode_long_string()?),
                Domain::Table => FieldValue::Table(decoder.decode_table()?),
            };
            args.push(value);
        }
        Ok(Method { def, args })
    }
}

/// Ordered Basic-class property descriptor, the source of the property-flags
/// bit layout: flag bit `15 - i` marks field `i` present.
pub static BASIC_PROPERTIES: &[FieldDef] = &[
    f("content-type", ShortStr),
    f("content-encoding", ShortStr),
    f("headers", Table),
    f("delivery-mode", Octet),
    f("priority", Octet),
    f("correlation-id", ShortStr),
    f("reply-to", ShortStr),
    f("expiration", ShortStr),
    f("message-id", ShortStr),
    f("timestamp", Timestamp),
    f("type", ShortStr),
    f("user-id", ShortStr),
    f("app-id", ShortStr),
    f("cluster-id", ShortStr),
];

/// Message metadata carried by Basic-class content headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasicProperties {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub headers: Option<crate::types::FieldTable>,
    pub delivery_mode: Option<u8>,
    pub priority: Option<u8>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub expiration: Option<String>,
    pub message_id: Option<String>,
    pub timestamp: Option<u64>,
    pub message_type: Option<String>,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
    pub cluster_id: Option<String>,
}

impl BasicProperties {
    pub fn is_empty(&self) -> bool {
        *self == BasicProperties::default()
    }

    fn present(&self, index: usize) -> bool {
        match index {
            0 => self.content_type.is_some(),
            1 => self.content_encoding.is_some(),
            2 => self.headers.is_some(),
            3 => self.delivery_mode.is_some(),
            4 => self.priority.is_some(),
            5 => self.correlation_id.is_some(),
            6 => self.reply_to.is_some(),
            7 => self.expiration.is_some(),
            8 => self.message_id.is_some(),
            9 => self.timestamp.is_some(),
            10 => self.message_type.is_some(),
            11 => self.user_id.is_some(),
            12 => self.app_id.is_some(),
            13 => self.cluster_id.is_some(),
            _ => false,
        }
    }

    /// Serialize property flags followed by the present properties in
    /// declared order.
    pub fn encode(&self, encoder: &mut Encoder) -> AmqpResult<()> {
        let mut flags: u16 = 0;
        for i in 0..BASIC_PROPERTIES.len() {
            if self.present(i) {
                flags |= 1 << (15 - i);
            }
        }
        encoder.encode_short(flags);

        if let Some(v) = &self.content_type {
            encoder.encode_short_string(v)?;
        }
        if let Some(v) = &self.content_encoding {
            encoder.encode_short_string(v)?;
        }
        if let Some(v) = &self.headers {
            encoder.encode_table(v)?;
        }
        if let Some(v) = self.delivery_mode {
            encoder.encode_octet(v);
        }
        if let Some(v) = self.priority {
            encoder.encode_octet(v);
        }
        if let Some(v) = &self.correlation_id {
            encoder.encode_short_string(v)?;
        }
        if let Some(v) = &self.reply_to {
            encoder.encode_short_string(v)?;
        }
        if let Some(v) = &self.expiration {
            encoder.encode_short_string(v)?;
        }
        if let Some(v) = &self.message_id {
            encoder.encode_short_string(v)?;
        }
        if let Some(v) = self.timestamp {
            encoder.encode_longlong(v);
        }
        if let Some(v) = &self.message_type {
            encoder.encode_short_string(v)?;
        }
        if let Some(v) = &self.user_id {
            encoder.encode_short_string(v)?;
        }
        if let Some(v) = &self.app_id {
            encoder.encode_short_string(v)?;
        }
        if let Some(v) = &self.cluster_id {
            encoder.encode_short_string(v)?;
        }
        Ok(())
    }

    /// Read the properties marked present in `flags`, in declared order.
    pub fn decode(decoder: &mut Decoder, flags: u16) -> AmqpResult<BasicProperties> {
        let set = |i: usize| flags & (1 << (15 - i)) != 0;
        let mut props = BasicProperties::default();
        if set(0) {
            props.content_type = Some(decoder.decode_short_string()?);
        }
        if set(1) {
            props.content_encoding = Some(decoder.decode_short_string()?);
        }
        if set(2) {
            props.headers = Some(decoder.decode_table()?);
        }
        if set(3) {
            props.delivery_mode = Some(decoder.decode_octet()?);
        }
        if set(4) {
            props.priority = Some(decoder.decode_octet()?);
        }
        if set(5) {
            props.correlation_id = Some(decoder.decode_short_string()?);
        }
        if set(6) {
            props.reply_to = Some(decoder.decode_short_string()?);
        }
        if set(7) {
            props.expiration = Some(decoder.decode_short_string()?);
        }
        if set(8) {
            props.message_id = Some(decoder.decode_short_string()?);
        }
        if set(9) {
            props.timestamp = Some(decoder.decode_longlong()?);
        }
        if set(10) {
            props.message_type = Some(decoder.decode_short_string()?);
        }
        if set(11) {
            props.user_id = Some(decoder.decode_short_string()?);
        }
        if set(12) {
            props.app_id = Some(decoder.decode_short_string()?);
        }
        if set(13) {
            props.cluster_id = Some(decoder.decode_short_string()?);
        }
        Ok(props)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldTable;

    #[test]
    fn test_lookup_known_methods() {
        assert_eq!(lookup(10, 10).map(|m| m.name), Some("connection.start"));
        assert_eq!(lookup(60, 40).map(|m| m.name), Some("basic.publish"));
        assert_eq!(lookup(40, 51).map(|m| m.name), Some("exchange.unbind-ok"));
        assert_eq!(lookup(85, 10).map(|m| m.name), Some("confirm.select"));
    }

    #[test]
    fn test_lookup_miss() {
        assert!(lookup(99, 1).is_none());
        assert!(lookup(10, 99).is_none());
    }

    #[test]
    fn test_registry_ids_are_unique() {
        for (i, a) in METHODS.iter().enumerate() {
            for b in &METHODS[i + 1..] {
                assert!(
                    a.class_id != b.class_id || a.method_id != b.method_id,
                    "duplicate id for {} and {}",
                    a.name,
                    b.name
                );
            }
        }
    }

    fn round_trip(method: &Method) -> Method {
        let mut encoder = Encoder::new();
        encoder.encode_short(method.def.class_id);
        encoder.encode_short(method.def.method_id);
        method.encode_args(&mut encoder).unwrap();
        let mut decoder = Decoder::new(encoder.finish());
        Method::decode(&mut decoder).unwrap()
    }

    #[test]
    fn test_bit_packing_round_trip() {
        // queue.declare has five consecutive bits sharing one octet
        let method = Method::new(
            &QUEUE_DECLARE,
            vec![
                FieldValue::U16(0),
                FieldValue::short_string("tasks"),
                FieldValue::Bool(false),
                FieldValue::Bool(true),
                FieldValue::Bool(false),
                FieldValue::Bool(true),
                FieldValue::Bool(false),
                FieldValue::Table(FieldTable::new()),
            ],
        );
        let decoded = round_trip(&method);
        assert!(decoded.is(&QUEUE_DECLARE));
        assert_eq!(decoded.args, method.args);
    }

    #[test]
    fn test_bit_packing_on_wire() {
        let method = Method::new(
            &BASIC_NACK,
            vec![FieldValue::U64(9), FieldValue::Bool(true), FieldValue::Bool(true)],
        );
        let mut encoder = Encoder::new();
        method.encode_args(&mut encoder).unwrap();
        let bytes = encoder.finish();
        // delivery-tag u64 then one packed octet with both bits set
        assert_eq!(bytes.len(), 9);
        assert_eq!(bytes[8], 0b0000_0011);
    }

    #[test]
    fn test_method_arg_by_name() {
        let method = Method::new(
            &CONNECTION_TUNE,
            vec![FieldValue::U16(2047), FieldValue::U32(131_072), FieldValue::U16(60)],
        );
        assert_eq!(method.arg("frame-max").and_then(|v| v.as_u64()), Some(131_072));
        assert_eq!(method.arg("missing"), None);
    }

    #[test]
    fn test_encode_arity_mismatch() {
        let method = Method::new(&CONNECTION_TUNE, vec![FieldValue::U16(0)]);
        let mut encoder = Encoder::new();
        assert!(method.encode_args(&mut encoder).is_err());
    }

    #[test]
    fn test_encode_domain_mismatch() {
        let method = Method::new(
            &CONNECTION_TUNE,
            vec![
                FieldValue::short_string("nope"),
                FieldValue::U32(0),
                FieldValue::U16(0),
            ],
        );
        let mut encoder = Encoder::new();
        assert!(method.encode_args(&mut encoder).is_err());
    }

    #[test]
    fn test_decode_unknown_method() {
        let mut encoder = Encoder::new();
        encoder.encode_short(10);
        encoder.encode_short(99);
        let mut decoder = Decoder::new(encoder.finish());
        match Method::decode(&mut decoder) {
            Err(crate::error::AmqpError::UnknownMethod { class_id, method_id }) => {
                assert_eq!((class_id, method_id), (10, 99));
            }
            other => panic!("expected UnknownMethod, got {:?}", other.map(|m| m.def.name)),
        }
    }

    #[test]
    fn test_properties_flags_round_trip() {
        let mut headers = FieldTable::new();
        headers.insert("x-origin", FieldValue::long_string("test"));
        let props = BasicProperties {
            content_type: Some("application/json".into()),
            delivery_mode: Some(2),
            headers: Some(headers),
            timestamp: Some(1_700_000_000),
            app_id: Some("warren".into()),
            ..Default::default()
        };

        let mut encoder = Encoder::new();
        props.encode(&mut encoder).unwrap();
        let mut decoder = Decoder::new(encoder.finish());
        let flags = decoder.decode_short().unwrap();
        let decoded = BasicProperties::decode(&mut decoder, flags).unwrap();
        assert_eq!(decoded, props);
        assert!(!decoder.has_remaining());
    }

    #[test]
    fn test_properties_flag_bits() {
        let props = BasicProperties {
            content_type: Some("text/plain".into()),
            ..Default::default()
        };
        let mut encoder = Encoder::new();
        props.encode(&mut encoder).unwrap();
        let bytes = encoder.finish();
        // only bit 15 set
        assert_eq!(&bytes[0..2], &[0x80, 0x00]);
    }
}
