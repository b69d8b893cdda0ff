//! AMQP 0-9-1 Binary Encoding and Decoding
//!
//! This module translates between structured frames and bytes. It provides
//! value-level encoding (the wire domains and tagged field-table values) and
//! frame-level encoding (method, content header, content body, heartbeat).
//!
//! # Overview
//!
//! Three components:
//!
//! - **Encoder**: writes field values and tables into a growable buffer
//! - **Decoder**: reads them back with bounds checking
//! - **FrameEncoder**: wraps complete frames, reusing one send buffer sized
//!   to the negotiated frame-max
//!
//! # Wire Layout
//!
//! Every frame is `[type:u8][channel:u16][length:u32][payload][0xCE]`, all
//! integers big-endian. The payload length counts the bytes between the
//! 7-byte header and the terminating `0xCE`.
//!
//! # Examples
//!
//! ```rust
//! use warren_amqp::codec::{Decoder, Encoder};
//! use warren_amqp::types::{FieldTable, FieldValue};
//!
//! let mut table = FieldTable::new();
//! table.insert("product", FieldValue::long_string("warren-amqp"));
//!
//! let mut encoder = Encoder::new();
//! encoder.encode_table(&table)?;
//!
//! let mut decoder = Decoder::new(encoder.finish());
//! let decoded = decoder.decode_table()?;
//! assert_eq!(table, decoded);
//! # Ok::<(), warren_amqp::error::AmqpError>(())
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{AmqpError, AmqpResult};
use crate::methods::{BasicProperties, Method, BASIC_CLASS_ID};
use crate::types::{FieldTable, FieldValue};

/// Frame type octets.
pub const FRAME_METHOD: u8 = 1;
pub const FRAME_HEADER: u8 = 2;
pub const FRAME_BODY: u8 = 3;
pub const FRAME_HEARTBEAT: u8 = 8;

/// Every frame ends with this octet.
pub const FRAME_END: u8 = 0xCE;

/// Bytes a body frame adds around its payload: 7-byte header + end octet.
pub const FRAME_OVERHEAD: usize = 8;

/// The sentinel sent once at connection start. Not a frame.
pub const PROTOCOL_HEADER: [u8; 8] = *b"AMQP\x00\x00\x09\x01";

/// Default frame-max before Connection.Tune renegotiates it.
pub const DEFAULT_FRAME_MAX: u32 = 131_072;

/// Minimum usable frame-max: enough to carry the frame overhead itself.
pub const MIN_FRAME_MAX: u32 = 8;

/// Value-level encoder over a growable buffer.
pub struct Encoder {
    buffer: BytesMut,
}

impl Encoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Encoder { buffer: BytesMut::new() }
    }

    /// Create a new encoder with initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Encoder { buffer: BytesMut::with_capacity(capacity) }
    }

    /// Encode an octet
    pub fn encode_octet(&mut self, value: u8) {
        self.buffer.put_u8(value);
    }

    /// Encode a short (u16, big-endian)
    pub fn encode_short(&mut self, value: u16) {
        self.buffer.put_u16(value);
    }

    /// Encode a long (u32, big-endian)
    pub fn encode_long(&mut self, value: u32) {
        self.buffer.put_u32(value);
    }

    /// Encode a long-long (u64, big-endian)
    pub fn encode_longlong(&mut self, value: u64) {
        self.buffer.put_u64(value);
    }

    /// Encode a short string (one-octet length prefix)
    pub fn encode_short_string(&mut self, value: &str) -> AmqpResult<()> {
        let bytes = value.as_bytes();
        if bytes.len() > 255 {
            return Err(AmqpError::frame(format!(
                "short string of {} bytes exceeds 255",
                bytes.len()
            )));
        }
        self.buffer.put_u8(bytes.len() as u8);
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Encode a long string (four-octet length prefix)
    pub fn encode_long_string(&mut self, value: &[u8]) {
        self.buffer.put_u32(value.len() as u32);
        self.buffer.extend_from_slice(value);
    }

    /// Encode a field table: four-octet byte length, then the entries.
    pub fn encode_table(&mut self, table: &FieldTable) -> AmqpResult<()> {
        let body = table_body(table)?;
        self.buffer.put_u32(body.len() as u32);
        self.buffer.extend_from_slice(&body);
        Ok(())
    }

    /// Encode just the entries of a field table, without the length prefix.
    ///
    /// This is the payload of an AMQPLAIN SASL response.
    pub fn encode_table_entries(&mut self, table: &FieldTable) -> AmqpResult<()> {
        let body = table_body(table)?;
        self.buffer.extend_from_slice(&body);
        Ok(())
    }

    fn encode_table_value(&mut self, value: &FieldValue) -> AmqpResult<()> {
        match value {
            FieldValue::Bool(b) => {
                self.buffer.put_u8(b't');
                self.buffer.put_u8(u8::from(*b));
            }
            FieldValue::I8(n) => {
                self.buffer.put_u8(b'b');
                self.buffer.put_i8(*n);
            }
            FieldValue::U8(n) => {
                self.buffer.put_u8(b'b');
                self.buffer.put_i8(*n as i8);
            }
            FieldValue::I16(n) => {
                self.buffer.put_u8(b's');
                self.buffer.put_i16(*n);
            }
            FieldValue::U16(n) => {
                self.buffer.put_u8(b's');
                self.buffer.put_i16(*n as i16);
            }
            FieldValue::I32(n) => {
                self.buffer.put_u8(b'I');
                self.buffer.put_i32(*n);
            }
            FieldValue::U32(n) => {
                self.buffer.put_u8(b'I');
                self.buffer.put_i32(*n as i32);
            }
            FieldValue::I64(n) => {
                self.buffer.put_u8(b'l');
                self.buffer.put_i64(*n);
            }
            FieldValue::U64(n) => {
                self.buffer.put_u8(b'l');
                self.buffer.put_i64(*n as i64);
            }
            FieldValue::F32(n) => {
                self.buffer.put_u8(b'f');
                self.buffer.put_f32(*n);
            }
            FieldValue::F64(n) => {
                self.buffer.put_u8(b'd');
                self.buffer.put_f64(*n);
            }
            FieldValue::ShortString(s) => {
                self.buffer.put_u8(b'S');
                self.encode_long_string(s.as_bytes());
            }
            FieldValue::LongString(b) => {
                self.buffer.put_u8(b'S');
                self.encode_long_string(b);
            }
            FieldValue::Timestamp(t) => {
                self.buffer.put_u8(b'T');
                self.buffer.put_u64(*t);
            }
            FieldValue::Table(t) => {
                self.buffer.put_u8(b'F');
                self.encode_table(t)?;
            }
            FieldValue::Void => {
                self.buffer.put_u8(b'V');
            }
        }
        Ok(())
    }

    /// Get the encoded data
    pub fn finish(self) -> Vec<u8> {
        self.buffer.to_vec()
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

fn table_body(table: &FieldTable) -> AmqpResult<Vec<u8>> {
    let mut entries = Encoder::new();
    for (key, value) in table.iter() {
        entries.encode_short_string(key)?;
        entries.encode_table_value(value)?;
    }
    Ok(entries.finish())
}

/// Bounds-checked value-level decoder.
pub struct Decoder {
    buffer: BytesMut,
}

impl Decoder {
    pub fn new(data: Vec<u8>) -> Self {
        Decoder { buffer: BytesMut::from(data.as_slice()) }
    }

    pub fn from_bytes(data: &[u8]) -> Self {
        Decoder { buffer: BytesMut::from(data) }
    }

    fn need(&self, n: usize, what: &str) -> AmqpResult<()> {
        if self.buffer.remaining() < n {
            return Err(AmqpError::frame(format!("insufficient data for {}", what)));
        }
        Ok(())
    }

    pub fn decode_octet(&mut self) -> AmqpResult<u8> {
        self.need(1, "octet")?;
        Ok(self.buffer.get_u8())
    }

    pub fn decode_short(&mut self) -> AmqpResult<u16> {
        self.need(2, "short")?;
        Ok(self.buffer.get_u16())
    }

    pub fn decode_long(&mut self) -> AmqpResult<u32> {
        self.need(4, "long")?;
        Ok(self.buffer.get_u32())
    }

    pub fn decode_longlong(&mut self) -> AmqpResult<u64> {
        self.need(8, "longlong")?;
        Ok(self.buffer.get_u64())
    }

    pub fn decode_short_string(&mut self) -> AmqpResult<String> {
        let len = self.decode_octet()? as usize;
        self.need(len, "short string")?;
        let data = self.buffer.copy_to_bytes(len);
        String::from_utf8(data.to_vec())
            .map_err(|e| AmqpError::frame(format!("invalid UTF-8 short string: {}", e)))
    }

    pub fn decode_long_string(&mut self) -> AmqpResult<Vec<u8>> {
        let len = self.decode_long()? as usize;
        self.need(len, "long string")?;
        Ok(self.buffer.copy_to_bytes(len).to_vec())
    }

    pub fn decode_table(&mut self) -> AmqpResult<FieldTable> {
        let len = self.decode_long()? as usize;
        self.need(len, "field table")?;
        let body = self.buffer.copy_to_bytes(len);
        let mut inner = Decoder::from_bytes(&body);
        let mut table = FieldTable::new();
        while inner.has_remaining() {
            let key = inner.decode_short_string()?;
            let value = inner.decode_table_value()?;
            table.insert(key, value);
        }
        Ok(table)
    }

    fn decode_table_value(&mut self) -> AmqpResult<FieldValue> {
        let tag = self.decode_octet()?;
        match tag {
            b't' => Ok(FieldValue::Bool(self.decode_octet()? != 0)),
            b'b' => {
                self.need(1, "byte")?;
                Ok(FieldValue::I8(self.buffer.get_i8()))
            }
            b's' => {
                self.need(2, "short int")?;
                Ok(FieldValue::I16(self.buffer.get_i16()))
            }
            b'I' => {
                self.need(4, "long int")?;
                Ok(FieldValue::I32(self.buffer.get_i32()))
            }
            b'l' => {
                self.need(8, "long long int")?;
                Ok(FieldValue::I64(self.buffer.get_i64()))
            }
            b'f' => {
                self.need(4, "float")?;
                Ok(FieldValue::F32(self.buffer.get_f32()))
            }
            b'd' => {
                self.need(8, "double")?;
                Ok(FieldValue::F64(self.buffer.get_f64()))
            }
            b'S' => Ok(FieldValue::LongString(self.decode_long_string()?)),
            b'T' => Ok(FieldValue::Timestamp(self.decode_longlong()?)),
            b'F' => Ok(FieldValue::Table(self.decode_table()?)),
            b'V' => Ok(FieldValue::Void),
            _ => Err(AmqpError::frame(format!("unknown table value tag: 0x{:02x}", tag))),
        }
    }

    /// Check if there's more data to decode
    pub fn has_remaining(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Get remaining bytes
    pub fn remaining(&self) -> usize {
        self.buffer.remaining()
    }
}

/// Frame-level encoder with a reusable send buffer.
///
/// The buffer is sized to the negotiated frame-max and regrown when
/// Connection.Tune renegotiates it. Frames are handed out as frozen `Bytes`
/// snapshots only after the end octet is written; the working buffer is never
/// exposed mid-serialization.
pub struct FrameEncoder {
    frame_max: usize,
    buffer: BytesMut,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self::with_frame_max(DEFAULT_FRAME_MAX)
    }

    pub fn with_frame_max(frame_max: u32) -> Self {
        let frame_max = frame_max.max(MIN_FRAME_MAX) as usize;
        FrameEncoder {
            frame_max,
            buffer: BytesMut::with_capacity(frame_max),
        }
    }

    /// Renegotiate the frame-max, regrowing the send buffer.
    pub fn set_frame_max(&mut self, frame_max: u32) {
        self.frame_max = frame_max.max(MIN_FRAME_MAX) as usize;
        if self.buffer.capacity() < self.frame_max {
            self.buffer.reserve(self.frame_max - self.buffer.len());
        }
    }

    pub fn frame_max(&self) -> usize {
        self.frame_max
    }

    /// Largest body payload a single frame may carry.
    pub fn max_body_payload(&self) -> usize {
        self.frame_max - FRAME_OVERHEAD
    }

    fn wrap(&mut self, frame_type: u8, channel: u16, payload: &[u8]) -> Bytes {
        self.buffer.put_u8(frame_type);
        self.buffer.put_u16(channel);
        self.buffer.put_u32(payload.len() as u32);
        self.buffer.extend_from_slice(payload);
        self.buffer.put_u8(FRAME_END);
        self.buffer.split().freeze()
    }

    /// Encode a method frame: `[class][method][fields]` payload.
    pub fn method_frame(&mut self, channel: u16, method: &Method) -> AmqpResult<Bytes> {
        let mut payload = Encoder::new();
        payload.encode_short(method.def.class_id);
        payload.encode_short(method.def.method_id);
        method.encode_args(&mut payload)?;
        let payload = payload.finish();
        Ok(self.wrap(FRAME_METHOD, channel, &payload))
    }

    /// Encode a content header frame for the Basic class.
    ///
    /// When no properties are supplied the content type defaults to
    /// `application/octet-stream`.
    pub fn content_header_frame(
        &mut self,
        channel: u16,
        body_size: u64,
        properties: &BasicProperties,
    ) -> AmqpResult<Bytes> {
        let mut defaulted;
        let properties = if properties.is_empty() {
            defaulted = properties.clone();
            defaulted.content_type = Some("application/octet-stream".to_string());
            &defaulted
        } else {
            properties
        };

        let mut payload = Encoder::new();
        payload.encode_short(BASIC_CLASS_ID);
        payload.encode_short(0); // weight, reserved
        payload.encode_longlong(body_size);
        properties.encode(&mut payload)?;
        let payload = payload.finish();
        Ok(self.wrap(FRAME_HEADER, channel, &payload))
    }

    /// Split a body into as many frames as the frame-max requires, in order.
    pub fn body_frames(&mut self, channel: u16, body: &[u8]) -> Vec<Bytes> {
        body.chunks(self.max_body_payload())
            .map(|chunk| self.wrap(FRAME_BODY, channel, chunk))
            .collect()
    }

    /// Encode a heartbeat frame: `08 00 00 00 00 00 00 CE`.
    pub fn heartbeat_frame(&mut self) -> Bytes {
        self.wrap(FRAME_HEARTBEAT, 0, &[])
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods;

    #[test]
    fn test_encode_short_string() {
        let mut encoder = Encoder::new();
        encoder.encode_short_string("en_US").unwrap();
        let result = encoder.finish();
        assert_eq!(result[0], 5);
        assert_eq!(&result[1..], b"en_US");
    }

    #[test]
    fn test_encode_short_string_too_long() {
        let mut encoder = Encoder::new();
        let long = "x".repeat(256);
        assert!(encoder.encode_short_string(&long).is_err());
    }

    #[test]
    fn test_encode_long_string() {
        let mut encoder = Encoder::new();
        encoder.encode_long_string(b"PLAIN");
        let result = encoder.finish();
        assert_eq!(&result[0..4], &[0, 0, 0, 5]);
        assert_eq!(&result[4..], b"PLAIN");
    }

    #[test]
    fn test_integers_are_big_endian() {
        let mut encoder = Encoder::new();
        encoder.encode_short(0x0102);
        encoder.encode_long(0x01020304);
        encoder.encode_longlong(0x0102030405060708);
        let result = encoder.finish();
        assert_eq!(result[0..2], [0x01, 0x02]);
        assert_eq!(result[2..6], [0x01, 0x02, 0x03, 0x04]);
        assert_eq!(result[6..14], [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
    }

    #[test]
    fn test_table_round_trip() {
        let mut nested = FieldTable::new();
        nested.insert("publisher_confirms", FieldValue::Bool(true));

        let mut table = FieldTable::new();
        table.insert("product", FieldValue::long_string("warren-amqp"));
        table.insert("version", FieldValue::short_string("0.1.0"));
        table.insert("retries", FieldValue::I32(3));
        table.insert("uptime", FieldValue::Timestamp(1_700_000_000));
        table.insert("capabilities", FieldValue::Table(nested));
        table.insert("padding", FieldValue::Void);

        let mut encoder = Encoder::new();
        encoder.encode_table(&table).unwrap();
        let mut decoder = Decoder::new(encoder.finish());
        let decoded = decoder.decode_table().unwrap();

        // shortstr table values are widened to longstr on the wire
        assert_eq!(decoded.get("product"), table.get("product"));
        assert_eq!(decoded.get("version"), Some(&FieldValue::long_string("0.1.0")));
        assert_eq!(decoded.get("retries"), Some(&FieldValue::I32(3)));
        assert_eq!(decoded.get("uptime"), Some(&FieldValue::Timestamp(1_700_000_000)));
        assert_eq!(decoded.get("padding"), Some(&FieldValue::Void));
        assert_eq!(
            decoded.get("capabilities").and_then(FieldValue::as_table).and_then(|t| t.get("publisher_confirms")),
            Some(&FieldValue::Bool(true))
        );
        assert!(!decoder.has_remaining());
    }

    #[test]
    fn test_table_entries_skip_length_prefix() {
        let mut table = FieldTable::new();
        table.insert("LOGIN", FieldValue::long_string("guest"));

        let mut with_prefix = Encoder::new();
        with_prefix.encode_table(&table).unwrap();
        let mut without_prefix = Encoder::new();
        without_prefix.encode_table_entries(&table).unwrap();

        assert_eq!(&with_prefix.finish()[4..], without_prefix.finish().as_slice());
    }

    #[test]
    fn test_decoder_insufficient_data() {
        let mut decoder = Decoder::new(vec![0x00]);
        assert!(decoder.decode_long().is_err());

        // short string claiming 10 bytes with only 2 present
        let mut decoder = Decoder::new(vec![10, b'a', b'b']);
        assert!(decoder.decode_short_string().is_err());
    }

    #[test]
    fn test_heartbeat_frame_bytes() {
        let mut frames = FrameEncoder::new();
        let frame = frames.heartbeat_frame();
        assert_eq!(frame.as_ref(), &[0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xCE]);
    }

    #[test]
    fn test_protocol_header_bytes() {
        assert_eq!(&PROTOCOL_HEADER, b"AMQP\x00\x00\x09\x01");
    }

    #[test]
    fn test_method_frame_layout() {
        let mut frames = FrameEncoder::new();
        let method = Method::new(
            &methods::CONNECTION_TUNE_OK,
            vec![FieldValue::U16(2047), FieldValue::U32(131_072), FieldValue::U16(60)],
        );
        let frame = frames.method_frame(0, &method).unwrap();

        assert_eq!(frame[0], FRAME_METHOD);
        assert_eq!(&frame[1..3], &[0, 0]); // channel 0
        let len = u32::from_be_bytes([frame[3], frame[4], frame[5], frame[6]]) as usize;
        assert_eq!(len, frame.len() - FRAME_OVERHEAD);
        assert_eq!(frame[frame.len() - 1], FRAME_END);
        // payload starts with class 10, method 31
        assert_eq!(&frame[7..11], &[0, 10, 0, 31]);
    }

    #[test]
    fn test_body_frames_split_at_frame_max() {
        let mut frames = FrameEncoder::with_frame_max(131_072);
        let body = vec![0x42u8; 300_000];
        let chunks = frames.body_frames(5, &body);

        let payload_sizes: Vec<usize> =
            chunks.iter().map(|f| f.len() - FRAME_OVERHEAD).collect();
        assert_eq!(payload_sizes, vec![131_064, 131_064, 37_872]);
        for chunk in &chunks {
            assert_eq!(chunk[0], FRAME_BODY);
            assert_eq!(&chunk[1..3], &[0, 5]);
            assert_eq!(chunk[chunk.len() - 1], FRAME_END);
            assert!(chunk.len() <= 131_072);
        }
    }

    #[test]
    fn test_frame_max_floor() {
        let frames = FrameEncoder::with_frame_max(1);
        assert_eq!(frames.frame_max(), MIN_FRAME_MAX as usize);
    }

    #[test]
    fn test_content_header_defaults_content_type() {
        let mut frames = FrameEncoder::new();
        let frame = frames
            .content_header_frame(1, 12, &BasicProperties::default())
            .unwrap();

        let payload = &frame[7..frame.len() - 1];
        let mut decoder = Decoder::from_bytes(payload);
        assert_eq!(decoder.decode_short().unwrap(), BASIC_CLASS_ID);
        assert_eq!(decoder.decode_short().unwrap(), 0);
        assert_eq!(decoder.decode_longlong().unwrap(), 12);
        let flags = decoder.decode_short().unwrap();
        let props = BasicProperties::decode(&mut decoder, flags).unwrap();
        assert_eq!(props.content_type.as_deref(), Some("application/octet-stream"));
    }
}
