//! Field definitions and the native-value tagged union documents are stored as.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::CoreError;

/// The declared type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldType {
    Str,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
    Date,
    Time,
    Datetime,
    Timestamp,
    Json,
}

impl FieldType {
    /// Parse a user-supplied type name; empty string defaults to `str`.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw.trim() {
            "" | "str" | "string" => Ok(Self::Str),
            "i8" => Ok(Self::I8),
            "i16" => Ok(Self::I16),
            "i32" => Ok(Self::I32),
            "i64" => Ok(Self::I64),
            "u8" => Ok(Self::U8),
            "u16" => Ok(Self::U16),
            "u32" => Ok(Self::U32),
            "u64" => Ok(Self::U64),
            "f32" => Ok(Self::F32),
            "f64" => Ok(Self::F64),
            "bool" => Ok(Self::Bool),
            "date" => Ok(Self::Date),
            "time" => Ok(Self::Time),
            "datetime" => Ok(Self::Datetime),
            "timestamp" => Ok(Self::Timestamp),
            "json" => Ok(Self::Json),
            other => Err(CoreError::invalid_schema(format!(
                "unknown field type: {other}"
            ))),
        }
    }

    /// `timestamp` is an i64-seconds alias, not a datetime-family type: it
    /// carries no text layout and is never reformatted on output.
    #[must_use]
    pub const fn is_datetime_family(self) -> bool {
        matches!(self, Self::Date | Self::Time | Self::Datetime)
    }

    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::I8
                | Self::I16
                | Self::I32
                | Self::I64
                | Self::U8
                | Self::U16
                | Self::U32
                | Self::U64
                | Self::F32
                | Self::F64
        )
    }

    /// The default `time-fmt` a field of this type gets when none is configured.
    #[must_use]
    pub const fn default_time_fmt(self) -> &'static str {
        match self {
            Self::Date => "%Y-%m-%d",
            Self::Time => "%H:%M:%S",
            Self::Datetime => "%Y-%m-%d %H:%M:%S",
            _ => "",
        }
    }
}

/// How a string field's values are split into index tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tokenizer {
    /// CJK character-splitting (plus whitespace tokenization of any non-Han runs).
    Zh,
    /// Whitespace tokenization. The default when a field omits `tokenizer`.
    #[default]
    Space,
    /// No tokenization: the trimmed value is the single token.
    None,
}

impl Tokenizer {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw.trim() {
            "" | "space" => Ok(Self::Space),
            "zh" => Ok(Self::Zh),
            "none" => Ok(Self::None),
            other => Err(CoreError::invalid_schema(format!(
                "unknown tokenizer: {other}"
            ))),
        }
    }
}

/// A field's default sort direction contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Sorting {
    Asc,
    Desc,
    #[default]
    None,
}

impl Sorting {
    #[must_use]
    pub const fn is_ascending(self) -> bool {
        matches!(self, Self::Asc)
    }
}

/// One field definition within a `Schema`. Immutable once the schema is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(default)]
    pub pk: bool,
    #[serde(rename = "type", default)]
    pub field_type: FieldTypeRaw,
    #[serde(default)]
    pub tokenizer: TokenizerRaw,
    #[serde(rename = "time-fmt", default)]
    pub time_fmt: String,
    #[serde(default)]
    pub sorting: Sorting,
}

/// Raw on-the-wire representation of `type`, defaulted/validated at load time
/// rather than at deserialize time so an empty string is legal JSON input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldTypeRaw(pub String);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenizerRaw(pub String);

impl Field {
    /// Resolve this field's raw `type`/`tokenizer` strings and apply datetime
    /// defaulting, producing the values `Schema` actually works with.
    pub fn resolve(&self) -> Result<(FieldType, Tokenizer), CoreError> {
        let ty = FieldType::parse(&self.field_type.0)?;
        let tok = Tokenizer::parse(&self.tokenizer.0)?;
        Ok((ty, tok))
    }

    /// Effective time format: the declared one, or the type's default.
    #[must_use]
    pub fn effective_time_fmt(&self, ty: FieldType) -> String {
        if self.time_fmt.is_empty() {
            ty.default_time_fmt().to_string()
        } else {
            self.time_fmt.clone()
        }
    }

    /// Convert a raw JSON value to this field's native type.
    ///
    /// Empty strings become the zero value of the target type; numeric strings
    /// are parsed; `bool` additionally accepts `0`/`1` and the case-insensitive
    /// strings `yes`/`y`/`true`; date/time strings are parsed with
    /// `effective_time_fmt` and stored as nanoseconds since the epoch.
    pub fn to_native_value(
        &self,
        ty: FieldType,
        value: &JsonValue,
        tz_offset_secs: i32,
    ) -> Result<NativeValue, CoreError> {
        if ty == FieldType::Json {
            return Ok(NativeValue::Json(value.clone()));
        }

        let as_str = value_as_trimmed_string(value);

        if as_str.as_deref() == Some("") {
            return Ok(NativeValue::zero(ty));
        }

        match ty {
            FieldType::Str => Ok(NativeValue::Str(as_str.unwrap_or_else(|| stringify_any(value)))),
            FieldType::Bool => self.parse_bool(value, as_str.as_deref()),
            // i64-seconds alias (index-schema's "timestamp单位秒，是i64的别名"):
            // goes through the same integer path as i64, never the datetime one.
            FieldType::Timestamp => self.parse_numeric(FieldType::I64, value, as_str.as_deref()),
            t if t.is_numeric() => self.parse_numeric(t, value, as_str.as_deref()),
            t if t.is_datetime_family() => {
                self.parse_datetime(t, as_str.as_deref().unwrap_or_default(), tz_offset_secs)
            }
            FieldType::Json => unreachable!("handled above"),
        }
    }

    fn parse_bool(
        &self,
        value: &JsonValue,
        as_str: Option<&str>,
    ) -> Result<NativeValue, CoreError> {
        if let Some(b) = value.as_bool() {
            return Ok(NativeValue::Bool(b));
        }
        if let Some(n) = value.as_i64() {
            return Ok(NativeValue::Bool(n != 0));
        }
        match as_str.map(str::to_lowercase).as_deref() {
            Some("true" | "yes" | "y") => Ok(NativeValue::Bool(true)),
            Some("false" | "no" | "n") => Ok(NativeValue::Bool(false)),
            _ => Err(CoreError::conversion(&self.name, "not a valid bool")),
        }
    }

    fn parse_numeric(
        &self,
        ty: FieldType,
        value: &JsonValue,
        as_str: Option<&str>,
    ) -> Result<NativeValue, CoreError> {
        let s;
        let text = if let Some(t) = as_str {
            t
        } else if let Some(n) = value.as_f64() {
            s = n.to_string();
            s.as_str()
        } else {
            return Err(CoreError::conversion(&self.name, "not a number"));
        };

        let bad = || CoreError::conversion(&self.name, format!("invalid numeric literal: {text}"));
        match ty {
            FieldType::I8 => text.parse::<i8>().map(NativeValue::I8).map_err(|_| bad()),
            FieldType::I16 => text.parse::<i16>().map(NativeValue::I16).map_err(|_| bad()),
            FieldType::I32 => text.parse::<i32>().map(NativeValue::I32).map_err(|_| bad()),
            FieldType::I64 => text.parse::<i64>().map(NativeValue::I64).map_err(|_| bad()),
            FieldType::U8 => text.parse::<u8>().map(NativeValue::U8).map_err(|_| bad()),
            FieldType::U16 => text.parse::<u16>().map(NativeValue::U16).map_err(|_| bad()),
            FieldType::U32 => text.parse::<u32>().map(NativeValue::U32).map_err(|_| bad()),
            FieldType::U64 => text.parse::<u64>().map(NativeValue::U64).map_err(|_| bad()),
            FieldType::F32 => text.parse::<f32>().map(NativeValue::F32).map_err(|_| bad()),
            FieldType::F64 => text.parse::<f64>().map(NativeValue::F64).map_err(|_| bad()),
            _ => unreachable!("only called for numeric types"),
        }
    }

    fn parse_datetime(
        &self,
        ty: FieldType,
        text: &str,
        tz_offset_secs: i32,
    ) -> Result<NativeValue, CoreError> {
        let fmt = self.effective_time_fmt(ty);
        let chrono_fmt = go_to_chrono_format(&fmt);

        let naive_ns = match ty {
            FieldType::Date => NaiveDate::parse_from_str(text, &chrono_fmt)
                .map(|d| d.and_hms_opt(0, 0, 0).unwrap())
                .map_err(|e| CoreError::conversion(&self.name, e.to_string()))?,
            FieldType::Time => {
                let t = NaiveTime::parse_from_str(text, &chrono_fmt)
                    .map_err(|e| CoreError::conversion(&self.name, e.to_string()))?;
                NaiveDate::from_ymd_opt(1970, 1, 1).unwrap().and_time(t)
            }
            FieldType::Datetime => NaiveDateTime::parse_from_str(text, &chrono_fmt)
                .map_err(|e| CoreError::conversion(&self.name, e.to_string()))?,
            _ => unreachable!("only called for datetime-family types"),
        };

        let offset = chrono::FixedOffset::east_opt(tz_offset_secs)
            .ok_or_else(|| CoreError::conversion(&self.name, "invalid time zone offset"))?;
        let with_tz = offset
            .from_local_datetime(&naive_ns)
            .single()
            .ok_or_else(|| CoreError::conversion(&self.name, "ambiguous local time"))?;
        let ns = with_tz.timestamp_nanos_opt().ok_or_else(|| {
            CoreError::conversion(&self.name, "timestamp out of representable range")
        })?;
        Ok(NativeValue::I64(ns))
    }

    /// Format a stored nanosecond timestamp back into this field's declared format.
    pub fn format_datetime(
        &self,
        ty: FieldType,
        ns: i64,
        tz_offset_secs: i32,
    ) -> Result<String, CoreError> {
        let fmt = self.effective_time_fmt(ty);
        let chrono_fmt = go_to_chrono_format(&fmt);
        let offset = chrono::FixedOffset::east_opt(tz_offset_secs)
            .ok_or_else(|| CoreError::conversion(&self.name, "invalid time zone offset"))?;
        let dt: DateTime<chrono::Utc> = DateTime::from_timestamp(
            ns.div_euclid(1_000_000_000),
            u32::try_from(ns.rem_euclid(1_000_000_000)).unwrap_or(0),
        )
        .ok_or_else(|| CoreError::conversion(&self.name, "timestamp out of range"))?;
        Ok(dt.with_timezone(&offset).format(&chrono_fmt).to_string())
    }
}

/// Translate the small subset of Go's reference-time layout this schema uses
/// (`2006-01-02`, `15:04:05`, `2006-01-02 15:04:05`) into a `chrono` strftime
/// string. Schemas are expected to only ever use these three defaults or a
/// caller-supplied `chrono` format directly; if the string already looks like
/// a `chrono` format (contains `%`) it is passed through unchanged.
fn go_to_chrono_format(fmt: &str) -> String {
    if fmt.contains('%') {
        return fmt.to_string();
    }
    fmt.replace("2006", "%Y")
        .replace("01", "%m")
        .replace("02", "%d")
        .replace("15", "%H")
        .replace("04", "%M")
        .replace("05", "%S")
}

fn value_as_trimmed_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.trim().to_string()),
        JsonValue::Null => Some(String::new()),
        _ => None,
    }
}

/// Stringify a non-string JSON scalar the way `fmt.Sprintf("%v", value)`
/// would, so a `str` field never silently loses a numeric/bool/array/object
/// input by defaulting it to empty.
fn stringify_any(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.trim().to_string(),
        JsonValue::Null => String::new(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Array(_) | JsonValue::Object(_) => value.to_string(),
    }
}

/// The tagged union a `StoredDoc` field value is represented as once converted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum NativeValue {
    Str(String),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Json(JsonValue),
}

impl NativeValue {
    #[must_use]
    pub fn zero(ty: FieldType) -> Self {
        match ty {
            FieldType::Str => Self::Str(String::new()),
            FieldType::I8 => Self::I8(0),
            FieldType::I16 => Self::I16(0),
            FieldType::I32 => Self::I32(0),
            FieldType::I64 | FieldType::Date | FieldType::Time | FieldType::Datetime | FieldType::Timestamp => {
                Self::I64(0)
            }
            FieldType::U8 => Self::U8(0),
            FieldType::U16 => Self::U16(0),
            FieldType::U32 => Self::U32(0),
            FieldType::U64 => Self::U64(0),
            FieldType::F32 => Self::F32(0.0),
            FieldType::F64 => Self::F64(0.0),
            FieldType::Bool => Self::Bool(false),
            FieldType::Json => Self::Json(JsonValue::Null),
        }
    }

    /// The value as `f64`, used for numeric sort keys and range comparisons.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::I8(v) => Some(f64::from(*v)),
            Self::I16(v) => Some(f64::from(*v)),
            Self::I32(v) => Some(f64::from(*v)),
            Self::I64(v) => Some(*v as f64),
            Self::U8(v) => Some(f64::from(*v)),
            Self::U16(v) => Some(f64::from(*v)),
            Self::U32(v) => Some(f64::from(*v)),
            Self::U64(v) => Some(*v as f64),
            Self::F32(v) => Some(f64::from(*v)),
            Self::F64(v) => Some(*v),
            Self::Bool(b) => Some(if *b { 2.0 } else { 1.0 }),
            Self::Str(_) | Self::Json(_) => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s}"),
            Self::I8(v) => write!(f, "{v}"),
            Self::I16(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::U8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_type_defaults_empty_to_str() {
        assert_eq!(FieldType::parse("").unwrap(), FieldType::Str);
    }

    #[test]
    fn tokenizer_defaults_empty_to_space() {
        assert_eq!(Tokenizer::parse("").unwrap(), Tokenizer::Space);
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(FieldType::parse("bogus").is_err());
    }

    #[test]
    fn bool_accepts_yes_no_and_ints() {
        let field = Field {
            name: "flag".into(),
            pk: false,
            field_type: FieldTypeRaw("bool".into()),
            tokenizer: TokenizerRaw::default(),
            time_fmt: String::new(),
            sorting: Sorting::None,
        };
        assert_eq!(
            field.to_native_value(FieldType::Bool, &json!("yes"), 0).unwrap(),
            NativeValue::Bool(true)
        );
        assert_eq!(
            field.to_native_value(FieldType::Bool, &json!(0), 0).unwrap(),
            NativeValue::Bool(false)
        );
    }

    #[test]
    fn empty_string_is_zero_value() {
        let field = Field {
            name: "n".into(),
            pk: false,
            field_type: FieldTypeRaw("i32".into()),
            tokenizer: TokenizerRaw::default(),
            time_fmt: String::new(),
            sorting: Sorting::None,
        };
        assert_eq!(
            field.to_native_value(FieldType::I32, &json!(""), 0).unwrap(),
            NativeValue::I32(0)
        );
    }

    #[test]
    fn timestamp_is_not_datetime_family_and_parses_as_i64_seconds() {
        assert!(!FieldType::Timestamp.is_datetime_family());
        assert_eq!(FieldType::Timestamp.default_time_fmt(), "");

        let field = Field {
            name: "ts".into(),
            pk: false,
            field_type: FieldTypeRaw("timestamp".into()),
            tokenizer: TokenizerRaw::default(),
            time_fmt: String::new(),
            sorting: Sorting::None,
        };
        assert_eq!(
            field.to_native_value(FieldType::Timestamp, &json!(1_700_000_000), 0).unwrap(),
            NativeValue::I64(1_700_000_000)
        );
    }

    #[test]
    fn str_field_stringifies_non_string_scalars_instead_of_dropping_them() {
        let field = Field {
            name: "title".into(),
            pk: false,
            field_type: FieldTypeRaw("str".into()),
            tokenizer: TokenizerRaw::default(),
            time_fmt: String::new(),
            sorting: Sorting::None,
        };
        assert_eq!(
            field.to_native_value(FieldType::Str, &json!(42), 0).unwrap(),
            NativeValue::Str("42".to_string())
        );
        assert_eq!(
            field.to_native_value(FieldType::Str, &json!(true), 0).unwrap(),
            NativeValue::Str("true".to_string())
        );
    }
}
