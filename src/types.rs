//! AMQP 0-9-1 Type System
//!
//! This module provides the core type system for AMQP 0-9-1: the field values
//! that travel inside method arguments and field tables, the order-preserving
//! field table itself, and the wire domains that describe how each method
//! argument is serialized.
//!
//! # Overview
//!
//! AMQP 0-9-1 methods are flat records whose fields are typed by *domain*
//! (bit, octet, short, long, longlong, shortstr, longstr, timestamp, table).
//! Field tables are string-keyed maps of tagged values used for server
//! properties, client properties, and declare arguments.
//!
//! ```rust
//! use warren_amqp::types::{FieldTable, FieldValue};
//!
//! let mut table = FieldTable::new();
//! table.insert("product", FieldValue::long_string("warren-amqp"));
//! table.insert("capabilities", FieldValue::Table(FieldTable::new()));
//! assert_eq!(table.len(), 2);
//! ```

use serde::{Deserialize, Serialize};

/// Wire domain of a method field.
///
/// Consecutive `Bit` fields are packed into shared octets; every other domain
/// has a fixed or length-prefixed layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Bit,
    Octet,
    Short,
    Long,
    LongLong,
    ShortStr,
    LongStr,
    Timestamp,
    Table,
}

/// A single AMQP 0-9-1 field value.
///
/// Covers both method-argument domains (unsigned integers, strings, tables)
/// and the tagged values found inside field tables (signed integers, floats,
/// void).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    /// Up to 255 bytes of UTF-8, length-prefixed with one octet.
    ShortString(String),
    /// Arbitrary bytes, length-prefixed with four octets. SASL responses and
    /// mechanism lists travel in this domain, so it is not required to be
    /// valid UTF-8.
    LongString(Vec<u8>),
    /// Seconds since the epoch, 64-bit.
    Timestamp(u64),
    Table(FieldTable),
    Void,
}

impl FieldValue {
    /// Build a `LongString` from text.
    pub fn long_string(s: impl Into<String>) -> Self {
        FieldValue::LongString(s.into().into_bytes())
    }

    /// Build a `ShortString`.
    pub fn short_string(s: impl Into<String>) -> Self {
        FieldValue::ShortString(s.into())
    }

    /// View a string-like value as text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::ShortString(s) => Some(s),
            FieldValue::LongString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// View any non-negative integer-like value widened to u64.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::U8(n) => Some(u64::from(*n)),
            FieldValue::U16(n) => Some(u64::from(*n)),
            FieldValue::U32(n) => Some(u64::from(*n)),
            FieldValue::U64(n) => Some(*n),
            FieldValue::I8(n) if *n >= 0 => Some(*n as u64),
            FieldValue::I16(n) if *n >= 0 => Some(*n as u64),
            FieldValue::I32(n) if *n >= 0 => Some(*n as u64),
            FieldValue::I64(n) if *n >= 0 => Some(*n as u64),
            FieldValue::Timestamp(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&FieldTable> {
        match self {
            FieldValue::Table(t) => Some(t),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::long_string(s)
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::LongString(s.into_bytes())
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::I64(n)
    }
}

/// An order-preserving AMQP field table.
///
/// Serialization order is observable on the wire (and in SASL AMQPLAIN
/// responses), so entries are kept in insertion order rather than hashed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldTable(Vec<(String, FieldValue)>);

impl FieldTable {
    pub fn new() -> Self {
        FieldTable(Vec::new())
    }

    /// Insert a value, replacing any existing entry with the same key in
    /// place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, FieldValue)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for FieldTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = FieldTable::new();
        for (k, v) in iter {
            table.insert(k, v);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_as_str() {
        assert_eq!(FieldValue::short_string("abc").as_str(), Some("abc"));
        assert_eq!(FieldValue::long_string("abc").as_str(), Some("abc"));
        assert_eq!(FieldValue::LongString(vec![0xff, 0xfe]).as_str(), None);
        assert_eq!(FieldValue::U32(1).as_str(), None);
    }

    #[test]
    fn test_field_value_as_u64() {
        assert_eq!(FieldValue::U16(7).as_u64(), Some(7));
        assert_eq!(FieldValue::I32(-1).as_u64(), None);
        assert_eq!(FieldValue::Timestamp(42).as_u64(), Some(42));
    }

    #[test]
    fn test_table_preserves_insertion_order() {
        let mut table = FieldTable::new();
        table.insert("LOGIN", FieldValue::long_string("guest"));
        table.insert("PASSWORD", FieldValue::long_string("guest"));

        let keys: Vec<&str> = table.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["LOGIN", "PASSWORD"]);
    }

    #[test]
    fn test_table_insert_replaces_in_place() {
        let mut table = FieldTable::new();
        table.insert("a", FieldValue::U8(1));
        table.insert("b", FieldValue::U8(2));
        table.insert("a", FieldValue::U8(3));

        assert_eq!(table.len(), 2);
        assert_eq!(table.get("a"), Some(&FieldValue::U8(3)));
        let keys: Vec<&str> = table.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_table_from_iter() {
        let table: FieldTable = vec![("x", FieldValue::Bool(true))].into_iter().collect();
        assert_eq!(table.get("x").and_then(FieldValue::as_bool), Some(true));
    }
}
