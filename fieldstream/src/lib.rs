//! Index a delimited text file once, then stream selected fields back out
//! through per-field transform chains, including two-pass one-hot encoding.

pub mod categories;
pub mod common;
pub mod config;
pub mod error;
pub mod index;
pub mod session;
pub mod source;
pub mod transform;

pub use common::{FieldCatalog, FieldId, FieldSpan, RecordKey, Value};
pub use config::{Chain, ExtractConfig, ExtractOptions, Selection, load_config, parse_config};
pub use error::{ExtractError, Result};
pub use session::{Phase, Row, Rows, Session};
pub use source::SourceKind;
pub use transform::{ScaleOp, TextEncoding, Transform};
