//! Category maps for one-hot encoded fields.
//!
//! A map assigns each distinct value of a field a dense index in order of first
//! occurrence. The one-hot width of a field is the final size of its map, so a
//! map must see the entire column before any row of that field is encoded.

use std::collections::HashMap;

use indexmap::IndexSet;
use tracing::debug;

use crate::common::{FieldId, Value};
use crate::error::TransformError;

/// Value -> index mapping for a single one-hot field.
#[derive(Debug, Clone, Default)]
pub struct CategoryMap {
    /// Distinct values; a value's position in the set is its index.
    values: IndexSet<String>,
    /// Expanded header tokens (`{header}_{value}`), parallel to `values`.
    headers: Vec<String>,
}

impl CategoryMap {
    /// Number of distinct values, i.e. the width of the one-hot vector.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Index assigned to `value`, if it has been observed.
    pub fn index_of(&self, value: &str) -> Option<usize> {
        self.values.get_index_of(value)
    }

    /// Observed values in index order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }

    /// Expanded header tokens in index order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Record `value`, returning its index. Existing values keep their index.
    fn observe(&mut self, value: &str) -> usize {
        match self.values.get_index_of(value) {
            Some(idx) => idx,
            None => self.values.insert_full(value.to_string()).0,
        }
    }

    fn rebuild_headers(&mut self, header: &str) {
        self.headers = self
            .values
            .iter()
            .map(|value| format!("{header}_{value}"))
            .collect();
    }

    /// One-hot encode `value`: a vector of `len()` zeros with a single 1 at the
    /// value's index.
    pub fn encode(&self, value: &str) -> Result<Value, TransformError> {
        let hot = self
            .index_of(value)
            .ok_or_else(|| TransformError::UnseenCategory(value.to_string()))?;
        let vector = (0..self.len())
            .map(|i| Value::Int(i64::from(i == hot)))
            .collect();
        Ok(Value::Vector(vector))
    }
}

/// Per-field category maps for one transformation run.
///
/// Owned by a [`Session`](crate::session::Session) and cleared with
/// [`reset`](Self::reset) at the start of every run.
#[derive(Debug, Clone, Default)]
pub struct CategoryMaps {
    maps: HashMap<FieldId, CategoryMap>,
}

impl CategoryMaps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a field's full column and extend its map.
    ///
    /// `header` is the field's header token; `values` are the field's data
    /// values (header excluded). Values are trimmed before they are recorded.
    /// Returns the expanded header tokens for the whole map, in index order.
    ///
    /// A read error from `values` aborts the build and is returned as is;
    /// the map keeps whatever it observed up to that point.
    pub fn build<I, E>(&mut self, field: FieldId, header: &str, values: I) -> Result<&[String], E>
    where
        I: IntoIterator<Item = Result<String, E>>,
    {
        let map = self.maps.entry(field).or_default();
        let mut observed = 0usize;
        for value in values {
            map.observe(value?.trim());
            observed += 1;
        }
        map.rebuild_headers(header.trim());
        debug!(
            "Category map for field {field}: {} distinct values over {observed} records",
            map.len()
        );
        Ok(map.headers())
    }

    pub fn get(&self, field: FieldId) -> Option<&CategoryMap> {
        self.maps.get(&field)
    }

    /// Number of fields with a map.
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Drop every map. Stale entries from a previous run must never leak into
    /// the next one.
    pub fn reset(&mut self) {
        self.maps.clear();
    }
}
