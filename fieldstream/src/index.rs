//! Record Offset Indexer.
//!
//! One sequential pass over the source file records, for every eligible
//! record, the byte span of each selected field. Nothing but spans is kept:
//! field text is re-read on demand through a [`ByteSource`](crate::source::ByteSource).
//!
//! A record is excluded iff the trimmed text of any selected field equals the
//! missing-value sentinel. Excluded records still consume their key and their
//! bytes, so keys stay aligned with line numbers and offsets stay exact.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::Bound;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::common::{FieldSpan, RecordKey};
use crate::config::{ExtractOptions, Selection};
use crate::error::{ParseError, Result};

/// Record key -> spans of the selected fields, in selection order.
#[derive(Debug, Clone, Default)]
pub struct OffsetIndex {
    entries: BTreeMap<RecordKey, Vec<FieldSpan>>,
    width: usize,
    records_seen: u64,
    skipped: u64,
    empty_lines: u64,
}

impl OffsetIndex {
    /// Number of indexed (eligible) records, header included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spans per entry, i.e. the number of selected fields.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Records read from the file, including skipped records and empty lines.
    pub fn records_seen(&self) -> u64 {
        self.records_seen
    }

    /// Records excluded by the missing-value rule.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn empty_lines(&self) -> u64 {
        self.empty_lines
    }

    pub fn get(&self, key: RecordKey) -> Option<&[FieldSpan]> {
        self.entries.get(&key).map(Vec::as_slice)
    }

    pub fn contains(&self, key: RecordKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (RecordKey, &[FieldSpan])> {
        self.entries.iter().map(|(key, spans)| (*key, spans.as_slice()))
    }

    pub fn keys(&self) -> impl Iterator<Item = RecordKey> + '_ {
        self.entries.keys().copied()
    }

    /// Entry with the lowest key; for a file with a header line, the header.
    pub fn first(&self) -> Option<(RecordKey, &[FieldSpan])> {
        self.entries
            .first_key_value()
            .map(|(key, spans)| (*key, spans.as_slice()))
    }

    /// First entry with a key strictly greater than `key`.
    pub fn next_after(&self, key: RecordKey) -> Option<(RecordKey, &[FieldSpan])> {
        self.entries
            .range((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .map(|(key, spans)| (*key, spans.as_slice()))
    }
}

/// Index the file at `path`.
pub fn build_index(
    path: impl AsRef<Path>,
    selection: &Selection,
    options: &ExtractOptions,
) -> Result<OffsetIndex> {
    let path = path.as_ref();
    debug!("Indexing {} ({} selected fields)", path.display(), selection.len());
    let reader = BufReader::new(File::open(path)?);
    index_reader(reader, selection, options)
}

/// Index records read sequentially from `reader`. Offsets are counted from the
/// reader's first byte.
pub fn index_reader<R: BufRead>(
    mut reader: R,
    selection: &Selection,
    options: &ExtractOptions,
) -> Result<OffsetIndex> {
    let mut index = OffsetIndex {
        width: selection.len(),
        ..OffsetIndex::default()
    };

    let mut line = Vec::new();
    let mut offset = 0u64;
    loop {
        line.clear();
        let n = reader.read_until(options.terminator, &mut line)?;
        if n == 0 {
            break;
        }
        let record = RecordKey(index.records_seen);
        let start = offset;
        index.records_seen += 1;
        offset += n as u64;

        let content = line.strip_suffix(&[options.terminator]).unwrap_or(&line[..]);
        if content.is_empty() {
            warn!("Record {record} is an empty line, not indexed");
            index.empty_lines += 1;
            continue;
        }

        match index_record(record, start, content, selection, options)? {
            Some(spans) => {
                index.entries.insert(record, spans);
            }
            None => index.skipped += 1,
        }
    }

    info!(
        "Indexed {} of {} records ({} skipped for missing values, {} empty lines)",
        index.len(),
        index.records_seen,
        index.skipped,
        index.empty_lines
    );
    Ok(index)
}

/// Spans of the selected fields of one record, or `None` if any of them holds
/// the missing-value sentinel.
fn index_record(
    record: RecordKey,
    start: u64,
    content: &[u8],
    selection: &Selection,
    options: &ExtractOptions,
) -> Result<Option<Vec<FieldSpan>>> {
    let width = selection.len();
    let last = selection.max_position();
    let missing = options.missing.as_bytes();

    let mut spans = vec![FieldSpan::new(0, 0); width];
    let mut filled = 0usize;
    let mut has_missing = false;
    let mut found = 0usize;
    let mut field_offset = start;

    for (position, raw) in content.split(|b| *b == options.delimiter).enumerate() {
        found = position + 1;
        if let Some(slot) = selection.slot_at(position) {
            spans[slot] = field_span(record, position, field_offset, raw.len())?;
            filled += 1;
            has_missing |= raw.trim_ascii() == missing;
        }
        if position == last {
            break;
        }
        field_offset += raw.len() as u64 + 1;
    }

    if filled < width {
        return Err(ParseError::MissingFields {
            record,
            expected: last + 1,
            found,
        }
        .into());
    }
    Ok((!has_missing).then_some(spans))
}

fn field_span(
    record: RecordKey,
    position: usize,
    offset: u64,
    len: usize,
) -> std::result::Result<FieldSpan, ParseError> {
    let len = u32::try_from(len).map_err(|_| ParseError::FieldTooLong {
        record,
        position,
        len,
    })?;
    Ok(FieldSpan::new(offset, len))
}
