//! AMQP 0-9-1 Frame Parser
//!
//! A stateful consumer that accepts arbitrary byte chunks and yields
//! structured frame events. It reconstructs variable-length frames across
//! chunk boundaries and handles any number of frames per chunk.
//!
//! # Overview
//!
//! Feeding bytes advances a two-phase machine: read the 7-byte frame header
//! (type, channel, payload length), then read the payload plus the
//! terminating `0xCE` octet. Completed frames are decoded through the method
//! registry into [`FrameEvent`]s.
//!
//! A parse failure is terminal: the parser poisons itself and every
//! subsequent `feed` fails, so the host must discard it and tear down the
//! connection.
//!
//! # Examples
//!
//! ```rust
//! use warren_amqp::codec::FrameEncoder;
//! use warren_amqp::parser::{FrameEvent, FrameParser};
//!
//! let mut frames = FrameEncoder::new();
//! let heartbeat = frames.heartbeat_frame();
//!
//! let mut parser = FrameParser::new();
//! let events = parser.feed(&heartbeat)?;
//! assert!(matches!(events[0], FrameEvent::Heartbeat));
//! # Ok::<(), warren_amqp::error::AmqpError>(())
//! ```

use bytes::{Buf, Bytes, BytesMut};
use log::trace;

use crate::codec::{
    Decoder, DEFAULT_FRAME_MAX, FRAME_BODY, FRAME_END, FRAME_HEADER, FRAME_HEARTBEAT,
    FRAME_METHOD,
};
use crate::error::{AmqpError, AmqpResult};
use crate::methods::{BasicProperties, Method, BASIC_CLASS_ID};

/// A completed inbound frame, decoded.
#[derive(Debug)]
pub enum FrameEvent {
    Heartbeat,
    Method {
        channel: u16,
        method: Method,
    },
    ContentHeader {
        channel: u16,
        class_id: u16,
        weight: u16,
        body_size: u64,
        properties: BasicProperties,
    },
    Body {
        channel: u16,
        payload: Bytes,
    },
}

const FRAME_HEADER_SIZE: usize = 7;

/// Incremental frame parser.
pub struct FrameParser {
    buffer: BytesMut,
    /// Parsed header of the frame currently being read.
    pending: Option<(u8, u16, usize)>,
    max_frame: usize,
    poisoned: bool,
}

impl FrameParser {
    pub fn new() -> Self {
        FrameParser {
            buffer: BytesMut::new(),
            pending: None,
            max_frame: DEFAULT_FRAME_MAX as usize,
            poisoned: false,
        }
    }

    /// Update the enforced frame size limit (renegotiated by Connection.Tune).
    pub fn set_max_frame(&mut self, max_frame: u32) {
        self.max_frame = max_frame as usize;
    }

    /// Whether a previous feed failed; a poisoned parser must be discarded.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Consume a chunk, returning every frame event it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> AmqpResult<Vec<FrameEvent>> {
        if self.poisoned {
            return Err(AmqpError::invalid_state("parser is poisoned"));
        }
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        loop {
            match self.step() {
                Ok(Some(event)) => events.push(event),
                Ok(None) => return Ok(events),
                Err(e) => {
                    self.poisoned = true;
                    return Err(e);
                }
            }
        }
    }

    fn step(&mut self) -> AmqpResult<Option<FrameEvent>> {
        if self.pending.is_none() {
            if self.buffer.len() < FRAME_HEADER_SIZE {
                return Ok(None);
            }
            let frame_type = self.buffer.get_u8();
            let channel = self.buffer.get_u16();
            let size = self.buffer.get_u32() as usize;
            if size > self.max_frame {
                return Err(AmqpError::frame(format!(
                    "frame payload of {} bytes exceeds limit {}",
                    size, self.max_frame
                )));
            }
            self.pending = Some((frame_type, channel, size));
        }

        let (frame_type, channel, size) = match self.pending {
            Some(pending) => pending,
            None => return Ok(None),
        };
        if self.buffer.len() < size + 1 {
            return Ok(None);
        }

        let payload = self.buffer.split_to(size).freeze();
        let end = self.buffer.get_u8();
        self.pending = None;
        if end != FRAME_END {
            return Err(AmqpError::frame(format!(
                "expected frame end 0x{:02x}, got 0x{:02x}",
                FRAME_END, end
            )));
        }

        trace!("frame type {} channel {} payload {}B", frame_type, channel, size);
        match frame_type {
            FRAME_HEARTBEAT => Ok(Some(FrameEvent::Heartbeat)),
            FRAME_METHOD => {
                let mut decoder = Decoder::from_bytes(&payload);
                let method = Method::decode(&mut decoder)?;
                if decoder.has_remaining() {
                    return Err(AmqpError::frame(format!(
                        "{} bytes trailing {}",
                        decoder.remaining(),
                        method.def.name
                    )));
                }
                Ok(Some(FrameEvent::Method { channel, method }))
            }
            FRAME_HEADER => {
                let mut decoder = Decoder::from_bytes(&payload);
                let class_id = decoder.decode_short()?;
                if class_id != BASIC_CLASS_ID {
                    return Err(AmqpError::frame(format!(
                        "content header for unsupported class {}",
                        class_id
                    )));
                }
                let weight = decoder.decode_short()?;
                let body_size = decoder.decode_longlong()?;
                let flags = decoder.decode_short()?;
                let properties = BasicProperties::decode(&mut decoder, flags)?;
                Ok(Some(FrameEvent::ContentHeader {
                    channel,
                    class_id,
                    weight,
                    body_size,
                    properties,
                }))
            }
            FRAME_BODY => Ok(Some(FrameEvent::Body { channel, payload })),
            other => Err(AmqpError::frame(format!("unknown frame type {}", other))),
        }
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FrameEncoder;
    use crate::methods;
    use crate::types::{FieldTable, FieldValue};

    fn tune_frame() -> Bytes {
        let mut frames = FrameEncoder::new();
        frames
            .method_frame(
                0,
                &Method::new(
                    &methods::CONNECTION_TUNE,
                    vec![FieldValue::U16(2047), FieldValue::U32(131_072), FieldValue::U16(60)],
                ),
            )
            .unwrap()
    }

    #[test]
    fn test_parse_single_method_frame() {
        let mut parser = FrameParser::new();
        let events = parser.feed(&tune_frame()).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            FrameEvent::Method { channel, method } => {
                assert_eq!(*channel, 0);
                assert!(method.is(&methods::CONNECTION_TUNE));
                assert_eq!(method.arg("channel-max").and_then(|v| v.as_u64()), Some(2047));
            }
            other => panic!("expected method event, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_byte_at_a_time() {
        let frame = tune_frame();
        let mut parser = FrameParser::new();
        let mut events = Vec::new();
        for byte in frame.iter() {
            events.extend(parser.feed(&[*byte]).unwrap());
        }
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], FrameEvent::Method { .. }));
    }

    #[test]
    fn test_parse_multiple_frames_per_chunk() {
        let mut frames = FrameEncoder::new();
        let mut stream = Vec::new();
        stream.extend_from_slice(&tune_frame());
        stream.extend_from_slice(&frames.heartbeat_frame());
        stream.extend_from_slice(&frames.body_frames(3, b"payload")[0]);

        let mut parser = FrameParser::new();
        let events = parser.feed(&stream).unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], FrameEvent::Method { .. }));
        assert!(matches!(events[1], FrameEvent::Heartbeat));
        match &events[2] {
            FrameEvent::Body { channel, payload } => {
                assert_eq!(*channel, 3);
                assert_eq!(payload.as_ref(), b"payload");
            }
            other => panic!("expected body event, got {:?}", other),
        }
    }

    #[test]
    fn test_rechunking_is_invariant() {
        let mut frames = FrameEncoder::new();
        let mut stream = Vec::new();
        for _ in 0..4 {
            stream.extend_from_slice(&tune_frame());
            stream.extend_from_slice(&frames.heartbeat_frame());
        }

        for chunk_size in [1, 2, 3, 5, 11, stream.len()] {
            let mut parser = FrameParser::new();
            let mut events = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                events.extend(parser.feed(chunk).unwrap());
            }
            assert_eq!(events.len(), 8, "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_content_header_event() {
        let mut frames = FrameEncoder::new();
        let props = methods::BasicProperties {
            content_type: Some("application/json".into()),
            delivery_mode: Some(2),
            ..Default::default()
        };
        let frame = frames.content_header_frame(7, 300_000, &props).unwrap();

        let mut parser = FrameParser::new();
        let events = parser.feed(&frame).unwrap();
        match &events[0] {
            FrameEvent::ContentHeader { channel, class_id, weight, body_size, properties } => {
                assert_eq!(*channel, 7);
                assert_eq!(*class_id, BASIC_CLASS_ID);
                assert_eq!(*weight, 0);
                assert_eq!(*body_size, 300_000);
                assert_eq!(properties, &props);
            }
            other => panic!("expected content header, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_frame_end_poisons() {
        let mut frame = tune_frame().to_vec();
        let last = frame.len() - 1;
        frame[last] = 0x00;

        let mut parser = FrameParser::new();
        assert!(matches!(parser.feed(&frame), Err(AmqpError::Frame(_))));
        assert!(parser.is_poisoned());
        assert!(parser.feed(&[]).is_err());
    }

    #[test]
    fn test_oversize_frame_rejected() {
        let mut parser = FrameParser::new();
        parser.set_max_frame(16);
        // header claiming a 1024-byte payload
        let header = [FRAME_BODY, 0, 1, 0, 0, 4, 0];
        assert!(matches!(parser.feed(&header), Err(AmqpError::Frame(_))));
        assert!(parser.is_poisoned());
    }

    #[test]
    fn test_unknown_method_poisons() {
        let mut frames = FrameEncoder::new();
        // splice an unregistered method id into a valid frame
        let good = frames
            .method_frame(0, &Method::new(&methods::CONNECTION_CLOSE_OK, vec![]))
            .unwrap();
        let mut bad = good.to_vec();
        bad[10] = 99;

        let mut parser = FrameParser::new();
        assert!(matches!(
            parser.feed(&bad),
            Err(AmqpError::UnknownMethod { class_id: 10, method_id: 99 })
        ));
        assert!(parser.is_poisoned());
    }

    #[test]
    fn test_method_with_declare_arguments() {
        let mut args = FieldTable::new();
        args.insert("x-message-ttl", FieldValue::I32(60_000));
        let mut frames = FrameEncoder::new();
        let frame = frames
            .method_frame(
                1,
                &Method::new(
                    &methods::QUEUE_DECLARE,
                    vec![
                        FieldValue::U16(0),
                        FieldValue::short_string("tasks"),
                        FieldValue::Bool(false),
                        FieldValue::Bool(true),
                        FieldValue::Bool(false),
                        FieldValue::Bool(false),
                        FieldValue::Bool(false),
                        FieldValue::Table(args.clone()),
                    ],
                ),
            )
            .unwrap();

        let mut parser = FrameParser::new();
        let events = parser.feed(&frame).unwrap();
        match &events[0] {
            FrameEvent::Method { method, .. } => {
                assert_eq!(method.arg("arguments").and_then(FieldValue::as_table), Some(&args));
            }
            other => panic!("expected method event, got {:?}", other),
        }
    }
}
