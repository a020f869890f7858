//! Extraction configuration: file format options, the field selection and its
//! transform registry.
//!
//! A [`Selection`] is validated when it is built, so every later phase can
//! assume a non-empty, duplicate-free list of catalog fields that each own
//! exactly one non-empty chain.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::common::{FieldCatalog, FieldId};
use crate::error::{ConfigError, ExtractError};
use crate::transform::{ScaleOp, Transform};

// ============================================================================
// Format Options
// ============================================================================

/// Layout of the source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Field separator.
    pub delimiter: u8,
    /// Record separator. A trailing terminator at end of file is optional.
    pub terminator: u8,
    /// Sentinel marking a missing value. Compared against the trimmed field.
    pub missing: String,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            delimiter: b';',
            terminator: b'\n',
            missing: "-".to_string(),
        }
    }
}

impl ExtractOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delimiter == self.terminator {
            return Err(ConfigError::InvalidOption {
                name: "delimiter",
                reason: "must differ from the record terminator".into(),
            });
        }
        if self.missing.is_empty() || self.missing.trim() != self.missing {
            return Err(ConfigError::InvalidOption {
                name: "missing",
                reason: format!("{:?} must be non-empty and carry no surrounding whitespace", self.missing),
            });
        }
        if self.missing.bytes().any(|b| b == self.delimiter || b == self.terminator) {
            return Err(ConfigError::InvalidOption {
                name: "missing",
                reason: "must not contain the delimiter or terminator".into(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Ordered transform chain for one field.
pub type Chain = Vec<Transform>;

/// The fields chosen for extraction, in output order, with their chains.
///
/// Output positions are called *slots*: slot `i` holds `fields()[i]`.
#[derive(Debug, Clone)]
pub struct Selection {
    catalog: Arc<FieldCatalog>,
    fields: Vec<FieldId>,
    chains: Vec<Chain>,
    /// Raw position -> slot, for every position up to the largest selected.
    slots: Vec<Option<usize>>,
}

impl Selection {
    /// Build a selection from ordered `(field, chain)` pairs.
    pub fn new<I>(catalog: Arc<FieldCatalog>, entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (FieldId, Chain)>,
    {
        let entries: Vec<(FieldId, Chain)> = entries.into_iter().collect();
        let fields: Vec<FieldId> = entries.iter().map(|(field, _)| *field).collect();
        Self::from_parts(catalog, &fields, entries)
    }

    /// Build a selection from an ordered field list and a separate chain
    /// registry. Every selected field must have exactly one chain and every
    /// registered chain must belong to a selected field.
    pub fn from_parts<I>(
        catalog: Arc<FieldCatalog>,
        fields: &[FieldId],
        registry: I,
    ) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (FieldId, Chain)>,
    {
        if fields.is_empty() {
            return Err(ConfigError::EmptySelection);
        }

        let mut seen = HashSet::with_capacity(fields.len());
        for &field in fields {
            if !catalog.contains(field) {
                return Err(ConfigError::UnknownFieldId {
                    field,
                    catalog_len: catalog.len(),
                });
            }
            if catalog.is_reserved(field) {
                return Err(ConfigError::ReservedField(catalog.label(field)));
            }
            if !seen.insert(field) {
                return Err(ConfigError::DuplicateField(catalog.label(field)));
            }
        }

        let mut registered: HashMap<FieldId, Chain> = HashMap::with_capacity(fields.len());
        for (field, chain) in registry {
            if !seen.contains(&field) {
                return Err(ConfigError::UnselectedChain(catalog.label(field)));
            }
            if registered.insert(field, chain).is_some() {
                return Err(ConfigError::DuplicateChain(catalog.label(field)));
            }
        }

        let mut chains = Vec::with_capacity(fields.len());
        for &field in fields {
            let chain = registered
                .remove(&field)
                .filter(|chain| !chain.is_empty())
                .ok_or_else(|| ConfigError::MissingChain(catalog.label(field)))?;
            if chain.iter().skip(1).any(Transform::is_one_hot) {
                return Err(ConfigError::MisplacedOneHot(catalog.label(field)));
            }
            chains.push(chain);
        }

        let max_position = fields.iter().map(|f| f.position()).max().unwrap_or(0);
        let mut slots = vec![None; max_position + 1];
        for (slot, field) in fields.iter().enumerate() {
            slots[field.position()] = Some(slot);
        }

        Ok(Self {
            catalog,
            fields: fields.to_vec(),
            chains,
            slots,
        })
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    pub fn fields(&self) -> &[FieldId] {
        &self.fields
    }

    /// Number of selected fields (the width of an index entry).
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Slot of the field at raw `position`, if it is selected.
    #[inline]
    pub fn slot_at(&self, position: usize) -> Option<usize> {
        self.slots.get(position).copied().flatten()
    }

    /// Largest raw position any selected field occupies.
    pub fn max_position(&self) -> usize {
        self.slots.len() - 1
    }

    pub fn field(&self, slot: usize) -> FieldId {
        self.fields[slot]
    }

    pub fn field_name(&self, slot: usize) -> &str {
        self.catalog.name(self.fields[slot]).unwrap_or_default()
    }

    pub fn chain(&self, slot: usize) -> &[Transform] {
        &self.chains[slot]
    }

    /// Slots whose chain starts with a one-hot step.
    pub fn one_hot_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.chains
            .iter()
            .enumerate()
            .filter(|(_, chain)| chain.first().is_some_and(Transform::is_one_hot))
            .map(|(slot, _)| slot)
    }
}

/// Everything a session needs to index and transform one file.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub options: ExtractOptions,
    pub selection: Selection,
}

impl ExtractConfig {
    pub fn new(selection: Selection) -> Self {
        Self {
            options: ExtractOptions::default(),
            selection,
        }
    }

    pub fn with_options(mut self, options: ExtractOptions) -> Self {
        self.options = options;
        self
    }
}

// ============================================================================
// Selection Files
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    options: RawOptions,
    fields: IndexMap<String, Vec<RawTransform>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawOptions {
    delimiter: Option<char>,
    terminator: Option<char>,
    missing: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum RawTransform {
    OneHot,
    OrdinalWord,
    DecimalComma,
    Int,
    Float,
    Equals {
        value: String,
    },
    Scale {
        op: ScaleOp,
        operand: f64,
    },
    Encode {
        #[serde(default = "default_encoding")]
        encoding: String,
    },
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

impl RawTransform {
    fn resolve(self) -> Result<Transform, ConfigError> {
        Ok(match self {
            RawTransform::OneHot => Transform::OneHot,
            RawTransform::OrdinalWord => Transform::OrdinalWord,
            RawTransform::DecimalComma => Transform::DecimalComma,
            RawTransform::Int => Transform::ParseInt,
            RawTransform::Float => Transform::ParseFloat,
            RawTransform::Equals { value } => Transform::equals(value),
            RawTransform::Scale { op, operand } => Transform::scale(op, operand),
            RawTransform::Encode { encoding } => Transform::encode(&encoding)?,
        })
    }
}

fn ascii_option(name: &'static str, c: char) -> Result<u8, ConfigError> {
    if c.is_ascii() {
        Ok(c as u8)
    } else {
        Err(ConfigError::InvalidOption {
            name,
            reason: format!("{c:?} is not an ASCII character"),
        })
    }
}

/// Parse a JSON selection file against `catalog`.
///
/// ```json
/// {
///   "options": {"delimiter": ";", "missing": "-"},
///   "fields": {
///     "aspiration": [{"kind": "one_hot"}],
///     "price": [{"kind": "scale", "op": "div", "operand": 100}]
///   }
/// }
/// ```
///
/// Field order in `fields` is the output order.
pub fn parse_config(text: &str, catalog: Arc<FieldCatalog>) -> Result<ExtractConfig, ConfigError> {
    let raw: RawConfig = serde_json::from_str(text)?;

    let mut options = ExtractOptions::default();
    if let Some(c) = raw.options.delimiter {
        options.delimiter = ascii_option("delimiter", c)?;
    }
    if let Some(c) = raw.options.terminator {
        options.terminator = ascii_option("terminator", c)?;
    }
    if let Some(missing) = raw.options.missing {
        options.missing = missing;
    }
    options.validate()?;

    let mut entries = Vec::with_capacity(raw.fields.len());
    for (name, steps) in raw.fields {
        let field = catalog
            .lookup(&name)
            .ok_or_else(|| ConfigError::UnknownFieldName(name.clone()))?;
        let chain = steps
            .into_iter()
            .map(RawTransform::resolve)
            .collect::<Result<Chain, _>>()?;
        entries.push((field, chain));
    }

    let selection = Selection::new(catalog, entries)?;
    Ok(ExtractConfig { options, selection })
}

/// Read and parse a JSON selection file.
pub fn load_config(
    path: impl AsRef<Path>,
    catalog: Arc<FieldCatalog>,
) -> Result<ExtractConfig, ExtractError> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_config(&text, catalog)?)
}
