//! Per-field transform chains.
//!
//! Each selected field owns an ordered chain of [`Transform`]s. A raw field is
//! trimmed, wrapped in [`Value::Text`] and threaded through the chain left to
//! right; the final value is flattened into the output row. Transforms never
//! swallow errors: a value a transform cannot handle aborts the run.

use std::fmt;
use std::sync::Arc;

use encoding_rs::{Encoding, UTF_8, mem};
use serde::Deserialize;

use crate::categories::{CategoryMap, CategoryMaps};
use crate::common::{FieldSpan, RecordKey, Value};
use crate::config::Selection;
use crate::error::{ConfigError, ExtractError, TransformError};
use crate::source::{ByteSource, read_field};

/// Binary operator applied by [`Transform::Scale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ScaleOp {
    pub fn apply(self, lhs: f64, rhs: f64) -> Result<f64, TransformError> {
        match self {
            ScaleOp::Add => Ok(lhs + rhs),
            ScaleOp::Sub => Ok(lhs - rhs),
            ScaleOp::Mul => Ok(lhs * rhs),
            ScaleOp::Div if rhs == 0.0 => Err(TransformError::DivisionByZero),
            ScaleOp::Div => Ok(lhs / rhs),
        }
    }
}

/// Labels resolved to ISO-8859-1 proper rather than the WHATWG mapping to
/// windows-1252.
const LATIN1_LABELS: [&str; 7] = [
    "latin-1",
    "latin_1",
    "latin1",
    "l1",
    "iso-8859-1",
    "iso8859-1",
    "iso_8859-1",
];

/// Target encoding of [`Transform::Encode`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// ISO-8859-1: code points `U+0000..=U+00FF` map to the byte of the same
    /// value, everything else is unencodable.
    Latin1,
    Whatwg(&'static Encoding),
}

impl TextEncoding {
    /// Resolve `label`, checking the ISO-8859-1 aliases before WHATWG labels.
    pub fn for_label(label: &str) -> Result<Self, ConfigError> {
        let label = label.trim();
        if LATIN1_LABELS.iter().any(|l| l.eq_ignore_ascii_case(label)) {
            return Ok(TextEncoding::Latin1);
        }
        let encoding = Encoding::for_label(label.as_bytes())
            .ok_or_else(|| ConfigError::UnknownEncoding(label.to_string()))?;
        if encoding.output_encoding() != encoding {
            return Err(ConfigError::UnsupportedEncoding(encoding.name()));
        }
        Ok(TextEncoding::Whatwg(encoding))
    }

    pub fn name(self) -> &'static str {
        match self {
            TextEncoding::Latin1 => "ISO-8859-1",
            TextEncoding::Whatwg(encoding) => encoding.name(),
        }
    }

    /// Encoded bytes of `text`, or `None` if any character has no mapping.
    pub fn encode(self, text: &str) -> Option<Vec<u8>> {
        match self {
            TextEncoding::Latin1 => {
                mem::is_str_latin1(text).then(|| mem::encode_latin1_lossy(text).into_owned())
            }
            TextEncoding::Whatwg(encoding) => {
                let (bytes, _, unmappable) = encoding.encode(text);
                (!unmappable).then(|| bytes.into_owned())
            }
        }
    }
}

impl fmt::Debug for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.name())
    }
}

/// Caller-supplied scalar transform.
pub type CustomFn = Arc<dyn Fn(Value) -> Result<Value, TransformError> + Send + Sync>;

/// One step of a transform chain.
#[derive(Clone)]
pub enum Transform {
    /// Categorical value -> one-hot vector, using the field's [`CategoryMap`].
    OneHot,
    /// Number words `zero`..`nine` (any case) -> integer.
    OrdinalWord,
    /// `"2.000.000,50"` -> `"2000000.50"`: drop `.` thousands separators, then
    /// turn the `,` decimal separator into `.`.
    DecimalComma,
    /// Integer conversion. Floats truncate toward zero.
    ParseInt,
    /// Float conversion.
    ParseFloat,
    /// 1 if the input equals the (lowercased) target ignoring case, else 0.
    Equals(String),
    /// `op(float(input), operand)`, e.g. cents -> currency units.
    Scale { op: ScaleOp, operand: f64 },
    /// Text -> bytes in the given encoding.
    Encode(TextEncoding),
    Custom { name: String, func: CustomFn },
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Equals(target) => f.debug_tuple("Equals").field(target).finish(),
            Transform::Scale { op, operand } => f
                .debug_struct("Scale")
                .field("op", op)
                .field("operand", operand)
                .finish(),
            Transform::Encode(encoding) => f.debug_tuple("Encode").field(encoding).finish(),
            Transform::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish(),
            other => f.write_str(other.name()),
        }
    }
}

impl Transform {
    pub fn equals(target: impl Into<String>) -> Self {
        Transform::Equals(target.into().to_lowercase())
    }

    pub fn scale(op: ScaleOp, operand: f64) -> Self {
        Transform::Scale { op, operand }
    }

    /// Encode as UTF-8.
    pub fn utf8() -> Self {
        Transform::Encode(TextEncoding::Whatwg(UTF_8))
    }

    /// Encode with the encoding registered under `label`: ISO-8859-1 for the
    /// `latin-1` family, WHATWG labels (e.g. `"utf-8"`, `"windows-1252"`)
    /// otherwise.
    ///
    /// Encodings that cannot produce their own bytes on output (UTF-16 and
    /// `replacement`) are rejected.
    pub fn encode(label: &str) -> Result<Self, ConfigError> {
        TextEncoding::for_label(label).map(Transform::Encode)
    }

    pub fn custom<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Value) -> Result<Value, TransformError> + Send + Sync + 'static,
    {
        Transform::Custom {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Transform::OneHot => "OneHot",
            Transform::OrdinalWord => "OrdinalWord",
            Transform::DecimalComma => "DecimalComma",
            Transform::ParseInt => "ParseInt",
            Transform::ParseFloat => "ParseFloat",
            Transform::Equals(_) => "Equals",
            Transform::Scale { .. } => "Scale",
            Transform::Encode(_) => "Encode",
            Transform::Custom { name, .. } => name,
        }
    }

    pub fn is_one_hot(&self) -> bool {
        matches!(self, Transform::OneHot)
    }

    /// Apply this step to `value`. `categories` is the field's map and is only
    /// consulted by [`Transform::OneHot`].
    pub fn apply(
        &self,
        value: Value,
        categories: Option<&CategoryMap>,
    ) -> Result<Value, TransformError> {
        match self {
            Transform::OneHot => {
                let text = expect_text("OneHot", value)?;
                categories
                    .ok_or(TransformError::MissingCategoryMap)?
                    .encode(&text)
            }
            Transform::OrdinalWord => {
                let text = expect_text("OrdinalWord", value)?;
                ordinal_word(&text).map(Value::Int)
            }
            Transform::DecimalComma => {
                let text = expect_text("DecimalComma", value)?;
                Ok(Value::Text(text.replace('.', "").replace(',', ".")))
            }
            Transform::ParseInt => to_int(value).map(Value::Int),
            Transform::ParseFloat => to_float("ParseFloat", value).map(Value::Float),
            Transform::Equals(target) => {
                let text = expect_text("Equals", value)?;
                Ok(Value::Int(i64::from(text.to_lowercase() == *target)))
            }
            Transform::Scale { op, operand } => {
                let lhs = to_float("Scale", value)?;
                op.apply(lhs, *operand).map(Value::Float)
            }
            Transform::Encode(encoding) => {
                let text = expect_text("Encode", value)?;
                match encoding.encode(&text) {
                    Some(bytes) => Ok(Value::Bytes(bytes)),
                    None => Err(TransformError::Unencodable {
                        value: text,
                        encoding: encoding.name(),
                    }),
                }
            }
            Transform::Custom { func, .. } => func(value),
        }
    }
}

fn expect_text(transform: &'static str, value: Value) -> Result<String, TransformError> {
    match value {
        Value::Text(text) => Ok(text),
        other => Err(TransformError::TypeMismatch {
            transform,
            expected: "text",
            found: other.kind(),
        }),
    }
}

fn ordinal_word(text: &str) -> Result<i64, TransformError> {
    let n = match text.to_lowercase().as_str() {
        "zero" => 0,
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        _ => return Err(TransformError::NotANumberWord(text.to_string())),
    };
    Ok(n)
}

fn to_int(value: Value) -> Result<i64, TransformError> {
    match value {
        Value::Int(i) => Ok(i),
        Value::Float(x) if x.is_finite() => Ok(x.trunc() as i64),
        Value::Float(x) => Err(TransformError::InvalidNumber {
            value: x.to_string(),
            target: "integer",
        }),
        Value::Text(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| TransformError::InvalidNumber {
                value: text,
                target: "integer",
            }),
        other => Err(TransformError::TypeMismatch {
            transform: "ParseInt",
            expected: "text or number",
            found: other.kind(),
        }),
    }
}

fn to_float(transform: &'static str, value: Value) -> Result<f64, TransformError> {
    match value {
        Value::Float(x) => Ok(x),
        Value::Int(i) => Ok(i as f64),
        Value::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| TransformError::InvalidNumber {
                value: text,
                target: "float",
            }),
        other => Err(TransformError::TypeMismatch {
            transform,
            expected: "text or number",
            found: other.kind(),
        }),
    }
}

/// Run `raw` through `chain`: `h(g(f(raw.trim())))` for a chain `[f, g, h]`.
pub fn transform_value(
    raw: &str,
    chain: &[Transform],
    categories: Option<&CategoryMap>,
) -> Result<Value, TransformError> {
    chain
        .iter()
        .try_fold(Value::Text(raw.trim().to_string()), |value, step| {
            step.apply(value, categories)
        })
}

/// Read every selected field of one record, transform it with its chain and
/// flatten the results into a single row.
pub fn transform_row<S>(
    source: &mut S,
    record: RecordKey,
    spans: &[FieldSpan],
    selection: &Selection,
    categories: &CategoryMaps,
) -> Result<Vec<Value>, ExtractError>
where
    S: ByteSource + ?Sized,
{
    let mut row = Vec::with_capacity(spans.len());
    for (slot, span) in spans.iter().enumerate() {
        let field = selection.field(slot);
        let name = selection.field_name(slot);
        let raw = read_field(source, record, name, *span)?;
        let value = transform_value(&raw, selection.chain(slot), categories.get(field))
            .map_err(|source| ExtractError::Transform {
                record,
                field: name.to_string(),
                source,
            })?;
        value.flatten_into(&mut row);
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::FieldId;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_ordinal_word() {
        let cases = [
            ("zero", 0),
            ("one", 1),
            ("two", 2),
            ("three", 3),
            ("four", 4),
            ("five", 5),
            ("six", 6),
            ("seven", 7),
            ("eight", 8),
            ("nine", 9),
            ("One", 1),
            ("twO", 2),
            ("FIVE", 5),
        ];
        for (word, expected) in cases {
            assert_eq!(
                Transform::OrdinalWord.apply(text(word), None).unwrap(),
                Value::Int(expected),
                "{word}"
            );
        }
    }

    #[test]
    fn test_ordinal_word_rejects_other_input() {
        let err = Transform::OrdinalWord.apply(text("ten"), None).unwrap_err();
        assert_eq!(err, TransformError::NotANumberWord("ten".into()));

        let err = Transform::OrdinalWord.apply(Value::Int(3), None).unwrap_err();
        assert!(matches!(err, TransformError::TypeMismatch { found: "int", .. }));
    }

    #[test]
    fn test_decimal_comma() {
        let cases = [
            ("2.000.000,50", "2000000.50"),
            ("1,2", "1.2"),
            ("2,105", "2.105"),
            ("100.000", "100000"),
            ("4.000", "4000"),
            ("1.000", "1000"),
        ];
        for (input, expected) in cases {
            assert_eq!(
                Transform::DecimalComma.apply(text(input), None).unwrap(),
                text(expected)
            );
        }
    }

    #[test]
    fn test_decimal_comma_on_plain_numbers() {
        let twice = |input: &str| {
            let once = Transform::DecimalComma.apply(text(input), None).unwrap();
            Transform::DecimalComma.apply(once, None).unwrap()
        };
        assert_eq!(twice("1000"), text("1000"));
        assert_eq!(twice("2000000"), text("2000000"));
        assert_eq!(twice("1,5"), text("15"));
        // A converted value keeps its `.` only until the next pass.
        assert_eq!(
            Transform::DecimalComma.apply(text("2000000.50"), None).unwrap(),
            text("200000050")
        );
        assert_eq!(twice("2.000.000,50"), text("200000050"));
    }

    #[test]
    fn test_equals() {
        let turbo = Transform::equals("turbo");
        assert_eq!(turbo.apply(text("turbo"), None).unwrap(), Value::Int(1));
        assert_eq!(turbo.apply(text("TURBO"), None).unwrap(), Value::Int(1));
        assert_eq!(turbo.apply(text("sedan"), None).unwrap(), Value::Int(0));
        assert_eq!(turbo.apply(text("hatchback"), None).unwrap(), Value::Int(0));

        let sedan = Transform::equals("Sedan");
        assert_eq!(sedan.apply(text("turbo"), None).unwrap(), Value::Int(0));
        assert_eq!(sedan.apply(text("sedan"), None).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_scale() {
        let div = Transform::scale(ScaleOp::Div, 100.0);
        for (input, expected) in [(10025, 100.25), (125, 1.25), (501, 5.01)] {
            assert_eq!(
                div.apply(Value::Int(input), None).unwrap(),
                Value::Float(expected)
            );
        }

        let mul = Transform::scale(ScaleOp::Mul, 2.0);
        for (input, expected) in [("10", 20.0), ("5", 10.0), ("1", 2.0), ("7", 14.0)] {
            assert_eq!(
                mul.apply(text(input), None).unwrap(),
                Value::Float(expected)
            );
        }

        let sub = Transform::scale(ScaleOp::Sub, 0.5);
        assert_eq!(sub.apply(Value::Float(1.0), None).unwrap(), Value::Float(0.5));
    }

    #[test]
    fn test_scale_errors() {
        let div = Transform::scale(ScaleOp::Div, 0.0);
        assert_eq!(
            div.apply(Value::Int(1), None).unwrap_err(),
            TransformError::DivisionByZero
        );

        let add = Transform::scale(ScaleOp::Add, 1.0);
        assert_eq!(
            add.apply(text("12a"), None).unwrap_err(),
            TransformError::InvalidNumber {
                value: "12a".into(),
                target: "float"
            }
        );
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(Transform::ParseInt.apply(text("2548"), None).unwrap(), Value::Int(2548));
        assert_eq!(Transform::ParseInt.apply(text("-7"), None).unwrap(), Value::Int(-7));
        assert_eq!(
            Transform::ParseInt.apply(Value::Float(3.9), None).unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            Transform::ParseInt.apply(Value::Float(-3.9), None).unwrap(),
            Value::Int(-3)
        );
        assert!(matches!(
            Transform::ParseInt.apply(text("3.5"), None),
            Err(TransformError::InvalidNumber { target: "integer", .. })
        ));
        assert!(matches!(
            Transform::ParseInt.apply(Value::Float(f64::NAN), None),
            Err(TransformError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(
            Transform::ParseFloat.apply(text("111.5"), None).unwrap(),
            Value::Float(111.5)
        );
        assert_eq!(
            Transform::ParseFloat.apply(Value::Int(4), None).unwrap(),
            Value::Float(4.0)
        );
        assert!(matches!(
            Transform::ParseFloat.apply(Value::Bytes(vec![1]), None),
            Err(TransformError::TypeMismatch { found: "bytes", .. })
        ));
    }

    #[test]
    fn test_encode() {
        let utf8 = Transform::encode("utf-8").unwrap();
        assert_eq!(
            utf8.apply(text("áeíoú"), None).unwrap(),
            Value::Bytes(b"\xc3\xa1e\xc3\xado\xc3\xba".to_vec())
        );
        assert_eq!(
            utf8.apply(text("abcñ123"), None).unwrap(),
            Value::Bytes(b"abc\xc3\xb1123".to_vec())
        );

        let latin1 = Transform::encode("latin-1").unwrap();
        assert_eq!(
            latin1.apply(text("áeíoú"), None).unwrap(),
            Value::Bytes(b"\xe1e\xedo\xfa".to_vec())
        );
        assert_eq!(
            latin1.apply(text("abcñ123"), None).unwrap(),
            Value::Bytes(b"abc\xf1123".to_vec())
        );
    }

    #[test]
    fn test_encode_rejects_unmappable_characters() {
        let latin1 = Transform::encode("latin-1").unwrap();
        for value in ["漢", "€", "price: 5€"] {
            assert_eq!(
                latin1.apply(text(value), None).unwrap_err(),
                TransformError::Unencodable {
                    value: value.into(),
                    encoding: "ISO-8859-1"
                }
            );
        }

        let cp1252 = Transform::encode("windows-1252").unwrap();
        assert_eq!(
            cp1252.apply(text("€"), None).unwrap(),
            Value::Bytes(vec![0x80])
        );
        assert!(matches!(
            cp1252.apply(text("\u{80}"), None),
            Err(TransformError::Unencodable { encoding: "windows-1252", .. })
        ));
    }

    #[test]
    fn test_latin1_covers_every_byte() {
        let latin1 = Transform::encode("latin-1").unwrap();
        assert_eq!(
            latin1.apply(text("\u{80}"), None).unwrap(),
            Value::Bytes(vec![0x80])
        );
        assert_eq!(
            latin1.apply(text("\u{9f}ÿ"), None).unwrap(),
            Value::Bytes(vec![0x9f, 0xff])
        );
    }

    #[test]
    fn test_latin1_labels() {
        for label in ["latin-1", "latin_1", "latin1", "L1", "ISO-8859-1", " iso8859-1 "] {
            assert_eq!(
                TextEncoding::for_label(label).unwrap(),
                TextEncoding::Latin1,
                "{label}"
            );
        }
        assert_eq!(
            TextEncoding::for_label("cp1252").unwrap(),
            TextEncoding::Whatwg(encoding_rs::WINDOWS_1252)
        );
    }

    #[test]
    fn test_encode_label_validation() {
        assert!(matches!(
            Transform::encode("klingon"),
            Err(ConfigError::UnknownEncoding(_))
        ));
        assert!(matches!(
            Transform::encode("utf-16le"),
            Err(ConfigError::UnsupportedEncoding("UTF-16LE"))
        ));
    }

    #[test]
    fn test_one_hot_needs_a_map() {
        let err = Transform::OneHot.apply(text("std"), None).unwrap_err();
        assert_eq!(err, TransformError::MissingCategoryMap);

        let mut maps = CategoryMaps::new();
        maps.build(
            FieldId(1),
            "aspiration",
            ["std", "turbo"].map(|v| Ok::<_, ()>(v.to_string())),
        )
        .unwrap();
        let value = Transform::OneHot
            .apply(text("turbo"), maps.get(FieldId(1)))
            .unwrap();
        assert_eq!(value, Value::Vector(vec![Value::Int(0), Value::Int(1)]));
    }

    #[test]
    fn test_chain_applies_left_to_right() {
        let chain = [Transform::DecimalComma, Transform::ParseFloat];
        assert_eq!(
            transform_value(" 1.111,5 ", &chain, None).unwrap(),
            Value::Float(1111.5)
        );

        let chain = [Transform::DecimalComma, Transform::ParseInt];
        assert_eq!(transform_value("2.548", &chain, None).unwrap(), Value::Int(2548));

        let chain = [Transform::scale(ScaleOp::Div, 100.0), Transform::ParseFloat];
        assert_eq!(
            transform_value("1643000", &chain, None).unwrap(),
            Value::Float(16430.0)
        );
    }

    #[test]
    fn test_chain_stops_at_first_error() {
        let chain = [Transform::ParseInt, Transform::scale(ScaleOp::Mul, 2.0)];
        assert!(matches!(
            transform_value("four", &chain, None),
            Err(TransformError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_custom_transform() {
        let double = Transform::custom("double", |value| match value {
            Value::Int(i) => Ok(Value::Int(i * 2)),
            other => Err(TransformError::Custom {
                name: "double".into(),
                message: format!("unexpected {}", other.kind()),
            }),
        });
        assert_eq!(double.name(), "double");

        let chain = [Transform::ParseInt, double];
        assert_eq!(transform_value("21", &chain, None).unwrap(), Value::Int(42));
        assert!(matches!(
            transform_value("x", &chain[1..], None),
            Err(TransformError::Custom { .. })
        ));
    }

    #[test]
    fn test_debug_names() {
        assert_eq!(format!("{:?}", Transform::OneHot), "OneHot");
        assert_eq!(format!("{:?}", Transform::utf8()), "Encode(\"UTF-8\")");
        assert_eq!(
            format!("{:?}", Transform::scale(ScaleOp::Div, 100.0)),
            "Scale { op: Div, operand: 100.0 }"
        );
    }
}
