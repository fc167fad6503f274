//! Definitions and functions to create and manipulate kernel schema

use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use arrow::datatypes::{
    DataType as ArrowDataType, Field as ArrowField, Schema as ArrowSchema, TimeUnit,
};
use itertools::Itertools;

use crate::utils::require;
use crate::{DeltaResult, Error};

pub type SchemaRef = Arc<StructType>;

/// Precision and scale of a decimal column. Precision is bounded by 38 digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecimalType {
    precision: u8,
    scale: u8,
}

impl DecimalType {
    /// Check that the given precision and scale are valid and return a new DecimalType
    pub fn try_new(precision: u8, scale: u8) -> DeltaResult<Self> {
        require!(
            0 < precision && precision <= 38,
            Error::invalid_argument(format!(
                "precision must be in range 1..38 inclusive, found: {precision}."
            ))
        );
        require!(
            scale <= precision,
            Error::invalid_argument(format!(
                "scale must be in range 0..precision inclusive, found: {scale}."
            ))
        );
        Ok(Self { precision, scale })
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn scale(&self) -> u8 {
        self.scale
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    /// UTF-8 encoded string of characters
    String,
    /// i64: 8-byte signed integer. Range: -9223372036854775808 to 9223372036854775807
    Long,
    /// i32: 4-byte signed integer. Range: -2147483648 to 2147483647
    Integer,
    /// i16: 2-byte signed integer numbers. Range: -32768 to 32767
    Short,
    /// i8: 1-byte signed integer number. Range: -128 to 127
    Byte,
    /// f32: 4-byte single-precision floating-point numbers
    Float,
    /// f64: 8-byte double-precision floating-point numbers
    Double,
    Boolean,
    Binary,
    Date,
    /// Microsecond precision timestamp, adjusted to UTC.
    Timestamp,
    /// Microsecond precision timestamp without a timezone.
    TimestampNtz,
    Decimal(DecimalType),
}

impl PrimitiveType {
    pub fn decimal(precision: u8, scale: u8) -> DeltaResult<Self> {
        Ok(Self::Decimal(DecimalType::try_new(precision, scale)?))
    }
}

impl Display for PrimitiveType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PrimitiveType::String => write!(f, "string"),
            PrimitiveType::Long => write!(f, "long"),
            PrimitiveType::Integer => write!(f, "integer"),
            PrimitiveType::Short => write!(f, "short"),
            PrimitiveType::Byte => write!(f, "byte"),
            PrimitiveType::Float => write!(f, "float"),
            PrimitiveType::Double => write!(f, "double"),
            PrimitiveType::Boolean => write!(f, "boolean"),
            PrimitiveType::Binary => write!(f, "binary"),
            PrimitiveType::Date => write!(f, "date"),
            PrimitiveType::Timestamp => write!(f, "timestamp"),
            PrimitiveType::TimestampNtz => write!(f, "timestamp_ntz"),
            PrimitiveType::Decimal(dtype) => {
                write!(f, "decimal({},{})", dtype.precision(), dtype.scale())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayType {
    element_type: DataType,
    contains_null: bool,
}

impl ArrayType {
    pub fn new(element_type: DataType, contains_null: bool) -> Self {
        Self {
            element_type,
            contains_null,
        }
    }

    pub fn element_type(&self) -> &DataType {
        &self.element_type
    }

    pub fn contains_null(&self) -> bool {
        self.contains_null
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    Primitive(PrimitiveType),
    Array(Box<ArrayType>),
    Struct(Box<StructType>),
}

impl DataType {
    pub const STRING: Self = DataType::Primitive(PrimitiveType::String);
    pub const LONG: Self = DataType::Primitive(PrimitiveType::Long);
    pub const INTEGER: Self = DataType::Primitive(PrimitiveType::Integer);
    pub const SHORT: Self = DataType::Primitive(PrimitiveType::Short);
    pub const BYTE: Self = DataType::Primitive(PrimitiveType::Byte);
    pub const FLOAT: Self = DataType::Primitive(PrimitiveType::Float);
    pub const DOUBLE: Self = DataType::Primitive(PrimitiveType::Double);
    pub const BOOLEAN: Self = DataType::Primitive(PrimitiveType::Boolean);
    pub const BINARY: Self = DataType::Primitive(PrimitiveType::Binary);
    pub const DATE: Self = DataType::Primitive(PrimitiveType::Date);
    pub const TIMESTAMP: Self = DataType::Primitive(PrimitiveType::Timestamp);
    pub const TIMESTAMP_NTZ: Self = DataType::Primitive(PrimitiveType::TimestampNtz);

    pub fn decimal(precision: u8, scale: u8) -> DeltaResult<Self> {
        Ok(PrimitiveType::decimal(precision, scale)?.into())
    }

    pub fn as_primitive_opt(&self) -> Option<&PrimitiveType> {
        match self {
            DataType::Primitive(ptype) => Some(ptype),
            _ => None,
        }
    }
}

impl From<PrimitiveType> for DataType {
    fn from(ptype: PrimitiveType) -> Self {
        DataType::Primitive(ptype)
    }
}

impl From<StructType> for DataType {
    fn from(struct_type: StructType) -> Self {
        DataType::Struct(Box::new(struct_type))
    }
}

impl From<ArrayType> for DataType {
    fn from(array_type: ArrayType) -> Self {
        DataType::Array(Box::new(array_type))
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Primitive(p) => write!(f, "{p}"),
            DataType::Array(a) => write!(f, "array<{}>", a.element_type),
            DataType::Struct(s) => {
                write!(f, "struct<")?;
                for (i, field) in s.fields().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.data_type)?;
                }
                write!(f, ">")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructField {
    /// Name of this (possibly nested) column
    pub name: String,
    /// The data type of this field
    pub data_type: DataType,
    /// Denotes whether this Field can be null
    pub nullable: bool,
}

impl StructField {
    /// Creates a new field
    pub fn new(name: impl Into<String>, data_type: impl Into<DataType>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
        }
    }

    /// Creates a new nullable field
    pub fn nullable(name: impl Into<String>, data_type: impl Into<DataType>) -> Self {
        Self::new(name, data_type, true)
    }

    /// Creates a new non-nullable field
    pub fn not_null(name: impl Into<String>, data_type: impl Into<DataType>) -> Self {
        Self::new(name, data_type, false)
    }

    #[inline]
    pub fn name(&self) -> &String {
        &self.name
    }

    #[inline]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    #[inline]
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }
}

/// A struct is used to represent both the top-level schema of the table
/// as well as struct columns that contain nested columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructType {
    fields: Vec<StructField>,
}

impl StructType {
    /// Builds a struct from `fields`, rejecting names that collide case-insensitively.
    pub fn try_new(fields: impl IntoIterator<Item = StructField>) -> DeltaResult<Self> {
        let fields: Vec<_> = fields.into_iter().collect();
        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            let lowered = field.name.to_ascii_lowercase();
            require!(
                seen.insert(lowered),
                Error::schema(format!("Duplicate column name: {}", field.name))
            );
        }
        Ok(Self { fields })
    }

    /// Builds a struct without checking for duplicate names.
    pub fn new_unchecked(fields: impl IntoIterator<Item = StructField>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn fields(&self) -> impl ExactSizeIterator<Item = &StructField> {
        self.fields.iter()
    }

    pub fn field_names(&self) -> impl ExactSizeIterator<Item = &String> {
        self.fields.iter().map(|f| &f.name)
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn field_at(&self, index: usize) -> Option<&StructField> {
        self.fields.get(index)
    }

    /// Look a field up by name, ignoring ASCII case.
    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.index_of(name).and_then(|i| self.fields.get(i))
    }

    /// Position of the field called `name`, ignoring ASCII case.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Returns a new struct with `field` appended.
    pub fn with_field(&self, field: StructField) -> DeltaResult<Self> {
        Self::try_new(self.fields.iter().cloned().chain(std::iter::once(field)))
    }
}

impl Display for StructType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let fields = self
            .fields
            .iter()
            .map(|field| format!("{}: {}", field.name, field.data_type))
            .join(", ");
        write!(f, "{{{fields}}}")
    }
}

impl TryFrom<&DataType> for ArrowDataType {
    type Error = Error;

    fn try_from(dt: &DataType) -> DeltaResult<Self> {
        let arrow_type = match dt {
            DataType::Primitive(p) => match p {
                PrimitiveType::String => ArrowDataType::Utf8,
                PrimitiveType::Long => ArrowDataType::Int64,
                PrimitiveType::Integer => ArrowDataType::Int32,
                PrimitiveType::Short => ArrowDataType::Int16,
                PrimitiveType::Byte => ArrowDataType::Int8,
                PrimitiveType::Float => ArrowDataType::Float32,
                PrimitiveType::Double => ArrowDataType::Float64,
                PrimitiveType::Boolean => ArrowDataType::Boolean,
                PrimitiveType::Binary => ArrowDataType::Binary,
                PrimitiveType::Date => ArrowDataType::Date32,
                PrimitiveType::Timestamp => {
                    ArrowDataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
                }
                PrimitiveType::TimestampNtz => {
                    ArrowDataType::Timestamp(TimeUnit::Microsecond, None)
                }
                PrimitiveType::Decimal(dtype) => {
                    ArrowDataType::Decimal128(dtype.precision(), dtype.scale() as i8)
                }
            },
            DataType::Array(a) => ArrowDataType::List(Arc::new(ArrowField::new(
                "element",
                ArrowDataType::try_from(a.element_type())?,
                a.contains_null(),
            ))),
            DataType::Struct(s) => {
                let fields: Vec<ArrowField> = s.fields().map(TryFrom::try_from).try_collect()?;
                ArrowDataType::Struct(fields.into())
            }
        };
        Ok(arrow_type)
    }
}

impl TryFrom<&StructField> for ArrowField {
    type Error = Error;

    fn try_from(f: &StructField) -> DeltaResult<Self> {
        Ok(ArrowField::new(
            f.name(),
            ArrowDataType::try_from(f.data_type())?,
            f.is_nullable(),
        ))
    }
}

impl TryFrom<&StructType> for ArrowSchema {
    type Error = Error;

    fn try_from(s: &StructType) -> DeltaResult<Self> {
        let fields: Vec<ArrowField> = s.fields().map(TryFrom::try_from).try_collect()?;
        Ok(ArrowSchema::new(fields))
    }
}

impl TryFrom<&ArrowDataType> for DataType {
    type Error = Error;

    fn try_from(arrow_type: &ArrowDataType) -> DeltaResult<Self> {
        let dt = match arrow_type {
            ArrowDataType::Utf8 | ArrowDataType::LargeUtf8 | ArrowDataType::Utf8View => {
                DataType::STRING
            }
            ArrowDataType::Int64 => DataType::LONG,
            ArrowDataType::Int32 => DataType::INTEGER,
            ArrowDataType::Int16 => DataType::SHORT,
            ArrowDataType::Int8 => DataType::BYTE,
            ArrowDataType::Float32 => DataType::FLOAT,
            ArrowDataType::Float64 => DataType::DOUBLE,
            ArrowDataType::Boolean => DataType::BOOLEAN,
            ArrowDataType::Binary | ArrowDataType::LargeBinary | ArrowDataType::BinaryView => {
                DataType::BINARY
            }
            ArrowDataType::Date32 => DataType::DATE,
            ArrowDataType::Timestamp(_, Some(_)) => DataType::TIMESTAMP,
            ArrowDataType::Timestamp(_, None) => DataType::TIMESTAMP_NTZ,
            ArrowDataType::Decimal128(precision, scale) => {
                let scale = u8::try_from(*scale).map_err(|_| {
                    Error::unsupported(format!("negative decimal scale {scale}"))
                })?;
                DataType::decimal(*precision, scale)?
            }
            ArrowDataType::List(field) | ArrowDataType::LargeList(field) => ArrayType::new(
                DataType::try_from(field.data_type())?,
                field.is_nullable(),
            )
            .into(),
            ArrowDataType::Struct(fields) => {
                let fields: Vec<StructField> = fields
                    .iter()
                    .map(|f| -> DeltaResult<_> {
                        Ok(StructField::new(
                            f.name(),
                            DataType::try_from(f.data_type())?,
                            f.is_nullable(),
                        ))
                    })
                    .try_collect()?;
                StructType::try_new(fields)?.into()
            }
            other => {
                return Err(Error::unsupported(format!(
                    "Arrow type {other} has no Delta equivalent"
                )))
            }
        };
        Ok(dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_names_are_rejected_case_insensitively() {
        let result = StructType::try_new([
            StructField::nullable("id", DataType::LONG),
            StructField::nullable("ID", DataType::STRING),
        ]);
        assert!(matches!(result, Err(Error::Schema(_))));
    }

    #[test]
    fn field_lookup_ignores_case() {
        let schema = StructType::try_new([
            StructField::nullable("id", DataType::LONG),
            StructField::nullable("Region", DataType::STRING),
        ])
        .unwrap();
        assert_eq!(schema.index_of("region"), Some(1));
        assert_eq!(schema.field("REGION").unwrap().name(), "Region");
        assert!(schema.field("missing").is_none());
    }

    #[test]
    fn decimal_bounds() {
        assert!(DecimalType::try_new(38, 10).is_ok());
        assert!(DecimalType::try_new(0, 0).is_err());
        assert!(DecimalType::try_new(39, 0).is_err());
        assert!(DecimalType::try_new(5, 6).is_err());
    }

    #[test]
    fn arrow_conversion() {
        let cases = [
            (DataType::LONG, ArrowDataType::Int64),
            (DataType::STRING, ArrowDataType::Utf8),
            (DataType::BINARY, ArrowDataType::Binary),
            (DataType::DATE, ArrowDataType::Date32),
            (
                DataType::TIMESTAMP,
                ArrowDataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            ),
            (
                DataType::decimal(10, 2).unwrap(),
                ArrowDataType::Decimal128(10, 2),
            ),
        ];
        for (kernel_type, arrow_type) in cases {
            assert_eq!(ArrowDataType::try_from(&kernel_type).unwrap(), arrow_type);
            assert_eq!(DataType::try_from(&arrow_type).unwrap(), kernel_type);
        }
    }

    #[test]
    fn display() {
        assert_eq!(DataType::decimal(10, 2).unwrap().to_string(), "decimal(10,2)");
        let schema = StructType::try_new([
            StructField::nullable("a", DataType::LONG),
            StructField::nullable("b", ArrayType::new(DataType::STRING, true)),
        ])
        .unwrap();
        assert_eq!(schema.to_string(), "{a: long, b: array<string>}");
    }
}
