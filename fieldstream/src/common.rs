//! Common types used throughout the engine: positional newtypes, the field
//! catalog, and the values flowing through transform chains.

use std::collections::HashSet;
use std::fmt;

// ============================================================================
// Index NewTypes
// ============================================================================

/// Position of a raw field within a record (0-based, left to right).
///
/// Identifiers are assigned once per deployment by a [`FieldCatalog`] and are
/// independent of which fields a run selects for extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FieldId(pub u16);

impl FieldId {
    /// The field's position as a `usize`, for indexing into split records.
    #[inline]
    pub fn position(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 0-based sequence number of a record (line) within the source file.
///
/// Keys are contiguous over the file; records excluded by the missing-value
/// rule leave gaps in an [`OffsetIndex`](crate::index::OffsetIndex).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RecordKey(pub u64);

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Byte location of one field's raw (untrimmed) text inside the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldSpan {
    /// Absolute byte offset of the field's first byte.
    pub offset: u64,
    /// Length of the field in bytes, excluding the delimiter.
    pub len: u32,
}

impl FieldSpan {
    pub const fn new(offset: u64, len: u32) -> Self {
        Self { offset, len }
    }

    /// One past the last byte of the field.
    pub fn end(&self) -> u64 {
        self.offset + self.len as u64
    }
}

// ============================================================================
// Field Catalog
// ============================================================================

/// Fixed enumeration of every raw column a source file can carry.
///
/// Position `i` in `names` is the field with id `FieldId(i)`. Reserved fields
/// (row numbers and other non-feature identifiers) can be indexed by nobody:
/// selecting one is a configuration error.
#[derive(Debug, Clone)]
pub struct FieldCatalog {
    names: Vec<String>,
    reserved: HashSet<FieldId>,
}

impl FieldCatalog {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            reserved: HashSet::new(),
        }
    }

    /// Mark `field` as a non-feature identifier.
    pub fn with_reserved(mut self, field: FieldId) -> Self {
        self.reserved.insert(field);
        self
    }

    /// Number of raw positions in the catalog.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, field: FieldId) -> bool {
        field.position() < self.names.len()
    }

    pub fn is_reserved(&self, field: FieldId) -> bool {
        self.reserved.contains(&field)
    }

    /// Declared name of `field`, if it is part of the catalog.
    pub fn name(&self, field: FieldId) -> Option<&str> {
        self.names.get(field.position()).map(String::as_str)
    }

    /// Resolve a declared name back to its id. Names past the last
    /// addressable [`FieldId`] never resolve.
    pub fn lookup(&self, name: &str) -> Option<FieldId> {
        let position = self.names.iter().position(|n| n == name)?;
        u16::try_from(position).ok().map(FieldId)
    }

    /// Human-readable label for error messages: the declared name when known,
    /// the raw id otherwise.
    pub(crate) fn label(&self, field: FieldId) -> String {
        match self.name(field) {
            Some(name) => name.to_string(),
            None => field.to_string(),
        }
    }
}

// ============================================================================
// Values
// ============================================================================

/// A value flowing through a transform chain.
///
/// Chains start from [`Value::Text`] (the trimmed raw field) and may end in any
/// variant. [`Value::Vector`] is flattened positionally into the output row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
    Vector(Vec<Value>),
}

impl Value {
    /// Short type name used in transform error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bytes(_) => "bytes",
            Value::Vector(_) => "vector",
        }
    }

    /// Number of output columns this value occupies once flattened.
    pub fn width(&self) -> usize {
        match self {
            Value::Vector(items) => items.iter().map(Value::width).sum(),
            _ => 1,
        }
    }

    /// Append this value to `out`, expanding vectors element by element.
    pub fn flatten_into(self, out: &mut Vec<Value>) {
        match self {
            Value::Vector(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
            scalar => out.push(scalar),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            Value::Vector(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}
