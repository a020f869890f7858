//! Random-access byte sources and the Column Reader.
//!
//! Every field value is fetched with one bounded read at its indexed span;
//! nothing here assumes the reads arrive in file order.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use memmap2::Mmap;

use crate::common::{FieldSpan, RecordKey};
use crate::error::ParseError;
use crate::index::OffsetIndex;

// ============================================================================
// Byte Sources
// ============================================================================

/// Read-only random access to the bytes of an indexed file.
pub trait ByteSource {
    /// Read exactly `len` bytes starting at `offset`.
    fn read_at(&mut self, offset: u64, len: u32) -> io::Result<Vec<u8>>;
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read_at(&mut self, offset: u64, len: u32) -> io::Result<Vec<u8>> {
        (**self).read_at(offset, len)
    }
}

/// Seek-then-read on an open file handle.
#[derive(Debug)]
pub struct FileSource {
    file: File,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            file: File::open(path)?,
        })
    }
}

impl ByteSource for FileSource {
    fn read_at(&mut self, offset: u64, len: u32) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Reads served from a read-only memory map of the whole file.
#[derive(Debug)]
pub struct MappedSource {
    mmap: Mmap,
}

impl MappedSource {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the file must not be truncated while mapped.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { mmap })
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

impl ByteSource for MappedSource {
    fn read_at(&mut self, offset: u64, len: u32) -> io::Result<Vec<u8>> {
        let start = usize::try_from(offset).map_err(|_| out_of_bounds(offset, len))?;
        let end = start
            .checked_add(len as usize)
            .filter(|end| *end <= self.mmap.len())
            .ok_or_else(|| out_of_bounds(offset, len))?;
        Ok(self.mmap[start..end].to_vec())
    }
}

fn out_of_bounds(offset: u64, len: u32) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("span {offset}+{len} is past the end of the mapped file"),
    )
}

/// How a session reads field bytes back from an indexed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    /// Independent seek + read per value.
    #[default]
    File,
    /// Read-only memory map.
    Mapped,
}

pub fn open_source(path: impl AsRef<Path>, kind: SourceKind) -> io::Result<Box<dyn ByteSource>> {
    Ok(match kind {
        SourceKind::File => Box::new(FileSource::open(path)?),
        SourceKind::Mapped => Box::new(MappedSource::open(path)?),
    })
}

// ============================================================================
// Column Reader
// ============================================================================

/// Read the raw (untrimmed) text of one field at `span`.
pub fn read_field<S>(
    source: &mut S,
    record: RecordKey,
    field: &str,
    span: FieldSpan,
) -> Result<String, ParseError>
where
    S: ByteSource + ?Sized,
{
    let bytes = source
        .read_at(span.offset, span.len)
        .map_err(|source| ParseError::Read {
            record,
            field: field.to_string(),
            offset: span.offset,
            len: span.len,
            source,
        })?;
    String::from_utf8(bytes).map_err(|_| ParseError::InvalidUtf8 {
        record,
        field: field.to_string(),
    })
}

/// Lazy sequence of the raw values of one slot, in ascending record order.
///
/// Yields one item per index entry, header record included. The sequence ends
/// after the first error. Calling [`read_column`] again restarts it.
pub struct ColumnReader<'a, S: ?Sized> {
    source: &'a mut S,
    index: &'a OffsetIndex,
    slot: usize,
    field: &'a str,
    cursor: Option<RecordKey>,
    done: bool,
}

pub fn read_column<'a, S>(
    source: &'a mut S,
    index: &'a OffsetIndex,
    slot: usize,
    field: &'a str,
) -> ColumnReader<'a, S>
where
    S: ByteSource + ?Sized,
{
    ColumnReader {
        source,
        index,
        slot,
        field,
        cursor: None,
        done: false,
    }
}

impl<S: ByteSource + ?Sized> Iterator for ColumnReader<'_, S> {
    type Item = Result<String, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let entry = match self.cursor {
            None => self.index.first(),
            Some(key) => self.index.next_after(key),
        };
        let Some((record, spans)) = entry else {
            self.done = true;
            return None;
        };
        self.cursor = Some(record);

        let item = match spans.get(self.slot) {
            Some(span) => read_field(&mut *self.source, record, self.field, *span),
            None => Err(ParseError::SlotOutOfRange {
                record,
                slot: self.slot,
                width: spans.len(),
            }),
        };
        self.done = item.is_err();
        Some(item)
    }
}
