//! Row/Header Generator.
//!
//! A [`Session`] owns the configuration, the offset index of the last indexed
//! file and the category maps of the current run, and walks them through
//!
//! ```text
//! Uninitialized -> Indexed -> MapsBuilt -> Streaming -> Done
//! ```
//!
//! [`Session::index`] enters `Indexed`. Every [`Session::rows`] call starts a
//! new run: category maps are reset and rebuilt from the full column of every
//! one-hot field (`MapsBuilt`) before the returned iterator emits the header
//! row and then one row per eligible record (`Streaming`, then `Done`).

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::categories::CategoryMaps;
use crate::common::{FieldSpan, RecordKey, Value};
use crate::config::{ExtractConfig, Selection};
use crate::error::{ConfigError, PreconditionError, Result};
use crate::index::{OffsetIndex, build_index};
use crate::source::{ByteSource, SourceKind, open_source, read_column, read_field};
use crate::transform::transform_row;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Indexed,
    MapsBuilt,
    Streaming,
    Done,
}

/// One element of the output sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    /// Column names, one-hot fields expanded to `{field}_{value}`.
    Header(Vec<String>),
    /// Flattened values of one eligible record, aligned with the header.
    Record { key: RecordKey, values: Vec<Value> },
}

#[derive(Debug)]
struct IndexedFile {
    /// Canonical path of the indexed file.
    path: PathBuf,
    index: OffsetIndex,
}

fn transition(phase: &mut Phase, next: Phase) {
    debug!("Session phase {:?} -> {:?}", *phase, next);
    *phase = next;
}

pub struct Session {
    config: ExtractConfig,
    source_kind: SourceKind,
    phase: Phase,
    indexed: Option<IndexedFile>,
    categories: CategoryMaps,
}

impl Session {
    pub fn new(config: ExtractConfig) -> std::result::Result<Self, ConfigError> {
        config.options.validate()?;
        Ok(Self {
            config,
            source_kind: SourceKind::default(),
            phase: Phase::Uninitialized,
            indexed: None,
            categories: CategoryMaps::new(),
        })
    }

    /// Choose how field bytes are read back during a run.
    pub fn with_source(mut self, kind: SourceKind) -> Self {
        self.source_kind = kind;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    pub fn selection(&self) -> &Selection {
        &self.config.selection
    }

    /// Index of the last indexed file, if any.
    pub fn offset_index(&self) -> Option<&OffsetIndex> {
        self.indexed.as_ref().map(|indexed| &indexed.index)
    }

    /// Canonical path of the last indexed file, if any.
    pub fn indexed_path(&self) -> Option<&Path> {
        self.indexed.as_ref().map(|indexed| indexed.path.as_path())
    }

    /// Category maps of the current (or last) run.
    pub fn categories(&self) -> &CategoryMaps {
        &self.categories
    }

    /// Replace the configuration. Any existing index was built for the old
    /// selection and is dropped.
    pub fn reconfigure(&mut self, config: ExtractConfig) -> std::result::Result<(), ConfigError> {
        config.options.validate()?;
        self.config = config;
        self.close();
        Ok(())
    }

    /// Discard the state of the current run. The index is kept; the session
    /// goes back to `Indexed`, or stays `Uninitialized` if nothing is indexed.
    pub fn reset(&mut self) {
        self.categories.reset();
        let next = match self.indexed {
            Some(_) => Phase::Indexed,
            None => Phase::Uninitialized,
        };
        if self.phase != next {
            transition(&mut self.phase, next);
        }
    }

    /// Drop the index and category maps and return to `Uninitialized`.
    pub fn close(&mut self) {
        self.indexed = None;
        self.categories.reset();
        if self.phase != Phase::Uninitialized {
            transition(&mut self.phase, Phase::Uninitialized);
        }
    }

    /// Build a fresh offset index for `path`, replacing any previous one.
    ///
    /// On failure the session is left `Uninitialized`.
    pub fn index(&mut self, path: impl AsRef<Path>) -> Result<&OffsetIndex> {
        self.close();
        let path = fs::canonicalize(path.as_ref())?;
        let index = build_index(&path, &self.config.selection, &self.config.options)?;
        info!("Indexed {}: {} eligible records", path.display(), index.len());

        transition(&mut self.phase, Phase::Indexed);
        let indexed = self.indexed.insert(IndexedFile { path, index });
        Ok(&indexed.index)
    }

    /// Start a transformation run over `path`, which must be the file last
    /// indexed.
    ///
    /// Category maps are rebuilt before this returns, so configuration,
    /// precondition and column read errors surface here. Errors on individual
    /// records surface from the iterator.
    pub fn rows(&mut self, path: impl AsRef<Path>) -> Result<Rows<'_>> {
        self.check_file(path.as_ref())?;
        self.reset();

        let Self {
            config,
            source_kind,
            phase,
            indexed,
            categories,
        } = self;
        let indexed = indexed.as_ref().ok_or(PreconditionError::NotIndexed)?;

        let mut source = open_source(&indexed.path, *source_kind)?;
        if let Err(err) =
            build_category_maps(source.as_mut(), &indexed.index, &config.selection, categories)
        {
            categories.reset();
            return Err(err);
        }
        transition(phase, Phase::MapsBuilt);

        Ok(Rows {
            source,
            index: &indexed.index,
            selection: &config.selection,
            categories,
            phase,
            cursor: None,
            done: false,
        })
    }

    /// `path` must name the file last indexed.
    fn check_file(&self, path: &Path) -> std::result::Result<(), PreconditionError> {
        let indexed = self.indexed.as_ref().ok_or(PreconditionError::NotIndexed)?;
        let requested = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if requested != indexed.path {
            return Err(PreconditionError::FileMismatch {
                requested,
                indexed: indexed.path.clone(),
            });
        }
        Ok(())
    }
}

/// Build the category map of every one-hot field from its full column.
///
/// The first indexed record is the header; its text names the map's expanded
/// columns and is not itself a category.
pub fn build_category_maps<S>(
    source: &mut S,
    index: &OffsetIndex,
    selection: &Selection,
    maps: &mut CategoryMaps,
) -> Result<()>
where
    S: ByteSource + ?Sized,
{
    for slot in selection.one_hot_slots() {
        let field = selection.field(slot);
        let name = selection.field_name(slot);
        let mut column = read_column(&mut *source, index, slot, name);
        let header = match column.next() {
            Some(header) => header?,
            None => return Ok(()),
        };
        let headers = maps.build(field, &header, column)?;
        debug!("Field {name} expands to {} columns", headers.len());
    }
    Ok(())
}

/// Lazy output sequence of one run: the header row, then one row per eligible
/// record in ascending key order. Ends after the first error.
pub struct Rows<'a> {
    source: Box<dyn ByteSource>,
    index: &'a OffsetIndex,
    selection: &'a Selection,
    categories: &'a CategoryMaps,
    phase: &'a mut Phase,
    cursor: Option<RecordKey>,
    done: bool,
}

impl Rows<'_> {
    fn header(&mut self, record: RecordKey, spans: &[FieldSpan]) -> Result<Vec<String>> {
        let mut header = Vec::with_capacity(spans.len());
        for (slot, span) in spans.iter().enumerate() {
            match self.categories.get(self.selection.field(slot)) {
                Some(map) => header.extend(map.headers().iter().cloned()),
                None => {
                    let name = self.selection.field_name(slot);
                    let raw = read_field(self.source.as_mut(), record, name, *span)?;
                    header.push(raw.trim().to_string());
                }
            }
        }
        Ok(header)
    }

    fn finish(&mut self) {
        self.done = true;
        transition(self.phase, Phase::Done);
    }
}

impl Iterator for Rows<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let index = self.index;
        let entry = match self.cursor {
            None => index.first(),
            Some(key) => index.next_after(key),
        };
        let Some((key, spans)) = entry else {
            self.finish();
            return None;
        };

        let item = match self.cursor.replace(key) {
            None => {
                transition(self.phase, Phase::Streaming);
                self.header(key, spans).map(Row::Header)
            }
            Some(_) => transform_row(
                self.source.as_mut(),
                key,
                spans,
                self.selection,
                self.categories,
            )
            .map(|values| Row::Record { key, values }),
        };
        if item.is_err() {
            self.finish();
        }
        Some(item)
    }
}
