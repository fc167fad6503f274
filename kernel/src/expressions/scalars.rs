use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use arrow::array::{
    new_null_array, ArrayRef, BinaryArray, BooleanArray, Date32Array, Decimal128Array,
    Float32Array, Float64Array, Int16Array, Int32Array, Int64Array, Int8Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::DataType as ArrowDataType;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::schema::{DataType, DecimalType, PrimitiveType};
use crate::{DeltaResult, Error};

/// A single value, which has a known [`DataType`]
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// 32bit integer
    Integer(i32),
    /// 64bit integer
    Long(i64),
    /// 16bit integer
    Short(i16),
    /// 8bit integer
    Byte(i8),
    /// 32bit floating point
    Float(f32),
    /// 64bit floating point
    Double(f64),
    /// utf-8 encoded string.
    String(String),
    /// true or false value
    Boolean(bool),
    /// Microsecond precision timestamp, adjusted to UTC.
    Timestamp(i64),
    /// Microsecond precision timestamp, with no timezone.
    TimestampNtz(i64),
    /// Date stored as a signed 32bit int days since UNIX epoch 1970-01-01
    Date(i32),
    /// Binary data
    Binary(Vec<u8>),
    /// Decimal value with a given precision and scale.
    Decimal(i128, DecimalType),
    /// Null value with a given data type.
    Null(DataType),
}

impl Scalar {
    /// Returns the data type of this scalar.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Integer(_) => DataType::INTEGER,
            Self::Long(_) => DataType::LONG,
            Self::Short(_) => DataType::SHORT,
            Self::Byte(_) => DataType::BYTE,
            Self::Float(_) => DataType::FLOAT,
            Self::Double(_) => DataType::DOUBLE,
            Self::String(_) => DataType::STRING,
            Self::Boolean(_) => DataType::BOOLEAN,
            Self::Timestamp(_) => DataType::TIMESTAMP,
            Self::TimestampNtz(_) => DataType::TIMESTAMP_NTZ,
            Self::Date(_) => DataType::DATE,
            Self::Binary(_) => DataType::BINARY,
            Self::Decimal(_, dtype) => PrimitiveType::Decimal(*dtype).into(),
            Self::Null(data_type) => data_type.clone(),
        }
    }

    /// Returns true if this scalar is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }

    /// Broadcast this scalar into an arrow array of `num_rows` identical values.
    pub fn to_array(&self, num_rows: usize) -> DeltaResult<ArrayRef> {
        let array: ArrayRef = match self {
            Self::Integer(v) => Arc::new(Int32Array::from_value(*v, num_rows)),
            Self::Long(v) => Arc::new(Int64Array::from_value(*v, num_rows)),
            Self::Short(v) => Arc::new(Int16Array::from_value(*v, num_rows)),
            Self::Byte(v) => Arc::new(Int8Array::from_value(*v, num_rows)),
            Self::Float(v) => Arc::new(Float32Array::from_value(*v, num_rows)),
            Self::Double(v) => Arc::new(Float64Array::from_value(*v, num_rows)),
            Self::String(v) => Arc::new(StringArray::from_iter_values(
                std::iter::repeat_n(v.as_str(), num_rows),
            )),
            Self::Boolean(v) => Arc::new(BooleanArray::from(vec![*v; num_rows])),
            Self::Timestamp(v) => {
                Arc::new(TimestampMicrosecondArray::from_value(*v, num_rows).with_timezone("UTC"))
            }
            Self::TimestampNtz(v) => Arc::new(TimestampMicrosecondArray::from_value(*v, num_rows)),
            Self::Date(v) => Arc::new(Date32Array::from_value(*v, num_rows)),
            Self::Binary(v) => Arc::new(BinaryArray::from_iter_values(std::iter::repeat_n(
                v.as_slice(),
                num_rows,
            ))),
            Self::Decimal(v, dtype) => Arc::new(
                Decimal128Array::from_value(*v, num_rows)
                    .with_precision_and_scale(dtype.precision(), dtype.scale() as i8)?,
            ),
            Self::Null(data_type) => {
                let arrow_type = ArrowDataType::try_from(data_type)?;
                new_null_array(&arrow_type, num_rows)
            }
        };
        Ok(array)
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            Self::Long(i) => write!(f, "{i}"),
            Self::Short(i) => write!(f, "{i}"),
            Self::Byte(i) => write!(f, "{i}"),
            Self::Float(fl) => write!(f, "{fl}"),
            Self::Double(fl) => write!(f, "{fl}"),
            Self::String(s) => write!(f, "'{s}'"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Timestamp(ts) => write!(f, "{ts}"),
            Self::TimestampNtz(ts) => write!(f, "{ts}"),
            Self::Date(d) => write!(f, "{d}"),
            Self::Binary(b) => write!(f, "{b:?}"),
            Self::Decimal(value, dtype) => {
                let scale = u32::from(dtype.scale());
                if scale == 0 {
                    return write!(f, "{value}");
                }
                let divisor = 10_i128.pow(scale);
                let sign = if *value < 0 { "-" } else { "" };
                let abs = value.unsigned_abs();
                let divisor = divisor.unsigned_abs();
                write!(
                    f,
                    "{sign}{}.{:0width$}",
                    abs / divisor,
                    abs % divisor,
                    width = scale as usize
                )
            }
            Self::Null(_) => write!(f, "NULL"),
        }
    }
}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        use Scalar::*;
        match (self, other) {
            // NOTE: NULL values are incomparable by definition
            (Null(_), _) | (_, Null(_)) => None,
            (Integer(a), Integer(b)) => a.partial_cmp(b),
            (Long(a), Long(b)) => a.partial_cmp(b),
            (Short(a), Short(b)) => a.partial_cmp(b),
            (Byte(a), Byte(b)) => a.partial_cmp(b),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Double(a), Double(b)) => a.partial_cmp(b),
            (String(a), String(b)) => a.partial_cmp(b),
            (Boolean(a), Boolean(b)) => a.partial_cmp(b),
            (Timestamp(a), Timestamp(b)) => a.partial_cmp(b),
            (TimestampNtz(a), TimestampNtz(b)) => a.partial_cmp(b),
            (Date(a), Date(b)) => a.partial_cmp(b),
            (Binary(a), Binary(b)) => a.partial_cmp(b),
            (Decimal(a, adt), Decimal(b, bdt)) if adt.scale() == bdt.scale() => a.partial_cmp(b),
            // integer literals compare against partition values of any integral width
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }
}

impl Scalar {
    fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Long(v) => Some(*v),
            Self::Integer(v) => Some(i64::from(*v)),
            Self::Short(v) => Some(i64::from(*v)),
            Self::Byte(v) => Some(i64::from(*v)),
            _ => None,
        }
    }
}

impl From<i8> for Scalar {
    fn from(i: i8) -> Self {
        Self::Byte(i)
    }
}

impl From<i16> for Scalar {
    fn from(i: i16) -> Self {
        Self::Short(i)
    }
}

impl From<i32> for Scalar {
    fn from(i: i32) -> Self {
        Self::Integer(i)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Self::Long(i)
    }
}

impl From<f32> for Scalar {
    fn from(i: f32) -> Self {
        Self::Float(i)
    }
}

impl From<f64> for Scalar {
    fn from(i: f64) -> Self {
        Self::Double(i)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::String(s.into())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&[u8]> for Scalar {
    fn from(b: &[u8]) -> Self {
        Self::Binary(b.into())
    }
}

impl PrimitiveType {
    /// Parse a partition value string into a scalar of this type.
    ///
    /// Binary values are taken as the raw bytes of `raw`. An empty string is null for every type
    /// except string.
    pub fn parse_scalar(&self, raw: &str) -> DeltaResult<Scalar> {
        if raw.is_empty() && *self != Self::String {
            return Ok(Scalar::Null((*self).into()));
        }

        let parse_error = || Error::parse_error(raw, (*self).into());
        match self {
            Self::String => Ok(Scalar::String(raw.to_string())),
            Self::Binary => Ok(Scalar::Binary(raw.as_bytes().to_vec())),
            Self::Byte => raw.parse().map(Scalar::Byte).map_err(|_| parse_error()),
            Self::Short => raw.parse().map(Scalar::Short).map_err(|_| parse_error()),
            Self::Integer => raw.parse().map(Scalar::Integer).map_err(|_| parse_error()),
            Self::Long => raw.parse().map(Scalar::Long).map_err(|_| parse_error()),
            Self::Float => raw.parse().map(Scalar::Float).map_err(|_| parse_error()),
            Self::Double => raw.parse().map(Scalar::Double).map_err(|_| parse_error()),
            Self::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" => Ok(Scalar::Boolean(true)),
                "false" => Ok(Scalar::Boolean(false)),
                _ => Err(parse_error()),
            },
            Self::Date => {
                let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| parse_error())?;
                let days = date
                    .signed_duration_since(DateTime::UNIX_EPOCH.date_naive())
                    .num_days()
                    .try_into()
                    .map_err(|_| parse_error())?;
                Ok(Scalar::Date(days))
            }
            Self::Timestamp => {
                let micros = parse_timestamp_micros(raw, true).ok_or_else(parse_error)?;
                Ok(Scalar::Timestamp(micros))
            }
            Self::TimestampNtz => {
                let micros = parse_timestamp_micros(raw, false).ok_or_else(parse_error)?;
                Ok(Scalar::TimestampNtz(micros))
            }
            Self::Decimal(dtype) => {
                let value = parse_decimal(raw, dtype).ok_or_else(parse_error)?;
                Ok(Scalar::Decimal(value, *dtype))
            }
        }
    }
}

/// Partition timestamps are written as `yyyy-MM-dd HH:mm:ss[.SSSSSS]`, optionally as an RFC 3339
/// string when they carry an offset.
fn parse_timestamp_micros(raw: &str, allow_offset: bool) -> Option<i64> {
    if allow_offset {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.timestamp_micros());
        }
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|ts| Utc.from_utc_datetime(&ts).timestamp_micros())
}

fn parse_decimal(raw: &str, dtype: &DecimalType) -> Option<i128> {
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    let scale = usize::from(dtype.scale());
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if int_part.is_empty() && frac_part.is_empty()
        || !all_digits(int_part)
        || !all_digits(frac_part)
        || frac_part.len() > scale
    {
        return None;
    }
    let int_part = int_part.trim_start_matches('0');
    if int_part.len() + scale > usize::from(dtype.precision()) {
        return None;
    }
    let mut value: i128 = 0;
    for b in int_part.bytes().chain(frac_part.bytes()) {
        value = value.checked_mul(10)?.checked_add(i128::from(b - b'0'))?;
    }
    for _ in frac_part.len()..scale {
        value = value.checked_mul(10)?;
    }
    Some(if negative { -value } else { value })
}

/// Parse a partition value for a column of `data_type`. `None` yields a typed null.
pub(crate) fn parse_partition_value(
    raw: Option<&str>,
    data_type: &DataType,
) -> DeltaResult<Scalar> {
    match (raw, data_type.as_primitive_opt()) {
        (Some(raw), Some(primitive)) => primitive.parse_scalar(raw),
        (Some(_), None) => Err(Error::generic(format!(
            "Unexpected partition column type: {data_type:?}"
        ))),
        _ => Ok(Scalar::Null(data_type.clone())),
    }
}
