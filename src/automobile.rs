//! The automobile dataset: its 27-column field catalog, the default feature
//! selection and the transform chain of every default feature.

use std::sync::Arc;

use fieldstream::config::{Chain, ExtractConfig, Selection};
use fieldstream::error::ConfigError;
use fieldstream::{FieldCatalog, FieldId, ScaleOp, Transform};

/// Raw columns of an automobile record, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Field {
    /// Row number. Not a feature.
    Number = 0,
    Aspiration,
    BodyStyle,
    Bore,
    CityMpg,
    CompressionRatio,
    CurbWeight,
    DriveWheels,
    EngineLocation,
    EngineSize,
    EngineType,
    FuelSystem,
    FuelType,
    Height,
    HighwayMpg,
    Horsepower,
    Length,
    Make,
    NormalizedLosses,
    NumOfCylinders,
    NumOfDoors,
    PeakRpm,
    Price,
    Stroke,
    Weight,
    WheelBase,
    Width,
}

impl Field {
    pub const ALL: [Field; 27] = [
        Field::Number,
        Field::Aspiration,
        Field::BodyStyle,
        Field::Bore,
        Field::CityMpg,
        Field::CompressionRatio,
        Field::CurbWeight,
        Field::DriveWheels,
        Field::EngineLocation,
        Field::EngineSize,
        Field::EngineType,
        Field::FuelSystem,
        Field::FuelType,
        Field::Height,
        Field::HighwayMpg,
        Field::Horsepower,
        Field::Length,
        Field::Make,
        Field::NormalizedLosses,
        Field::NumOfCylinders,
        Field::NumOfDoors,
        Field::PeakRpm,
        Field::Price,
        Field::Stroke,
        Field::Weight,
        Field::WheelBase,
        Field::Width,
    ];

    pub fn id(self) -> FieldId {
        FieldId(self as u16)
    }

    /// Column name as it appears in the file header and selection files.
    pub fn name(self) -> &'static str {
        match self {
            Field::Number => "number",
            Field::Aspiration => "aspiration",
            Field::BodyStyle => "body-style",
            Field::Bore => "bore",
            Field::CityMpg => "city-mpg",
            Field::CompressionRatio => "compression-ratio",
            Field::CurbWeight => "curb-weight",
            Field::DriveWheels => "drive-wheels",
            Field::EngineLocation => "engine-location",
            Field::EngineSize => "engine-size",
            Field::EngineType => "engine-type",
            Field::FuelSystem => "fuel-system",
            Field::FuelType => "fuel-type",
            Field::Height => "height",
            Field::HighwayMpg => "highway-mpg",
            Field::Horsepower => "horsepower",
            Field::Length => "length",
            Field::Make => "make",
            Field::NormalizedLosses => "normalized-losses",
            Field::NumOfCylinders => "num-of-cylinders",
            Field::NumOfDoors => "num-of-doors",
            Field::PeakRpm => "peak-rpm",
            Field::Price => "price",
            Field::Stroke => "stroke",
            Field::Weight => "weight",
            Field::WheelBase => "wheel-base",
            Field::Width => "width",
        }
    }
}

pub fn catalog() -> Arc<FieldCatalog> {
    Arc::new(FieldCatalog::new(Field::ALL.map(Field::name)).with_reserved(Field::Number.id()))
}

/// Features extracted when no selection file is given, in output order.
pub const DEFAULT_SELECTION: [Field; 8] = [
    Field::EngineLocation,
    Field::NumOfCylinders,
    Field::EngineSize,
    Field::Weight,
    Field::Horsepower,
    Field::Aspiration,
    Field::Price,
    Field::Make,
];

/// Transform chain registered for `field`, if it has a default one.
///
/// Sizes and horsepower use a decimal comma with `.` thousands separators;
/// prices are stored in cents.
pub fn default_chain(field: Field) -> Option<Chain> {
    let chain = match field {
        Field::EngineLocation => vec![Transform::OneHot],
        Field::NumOfCylinders => vec![Transform::OrdinalWord],
        Field::EngineSize => vec![Transform::DecimalComma, Transform::ParseInt],
        Field::Weight => vec![Transform::ParseInt],
        Field::Horsepower => vec![Transform::DecimalComma, Transform::ParseFloat],
        Field::Aspiration => vec![Transform::equals("turbo")],
        Field::Price => vec![Transform::scale(ScaleOp::Div, 100.0)],
        Field::Make => vec![Transform::utf8()],
        _ => return None,
    };
    Some(chain)
}

pub fn default_selection() -> Result<Selection, ConfigError> {
    let fields = DEFAULT_SELECTION.map(Field::id);
    let registry = DEFAULT_SELECTION
        .iter()
        .filter_map(|&field| default_chain(field).map(|chain| (field.id(), chain)));
    Selection::from_parts(catalog(), &fields, registry)
}

pub fn default_config() -> Result<ExtractConfig, ConfigError> {
    Ok(ExtractConfig::new(default_selection()?))
}
