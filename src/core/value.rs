use crate::core::{ModelError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"];

/// A value flowing into a placeholder or out of a result row.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// Set-membership argument, expanded into one placeholder per item.
    List(Vec<Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Integer(_) => "INTEGER",
            Self::Float(_) => "FLOAT",
            Self::Text(_) => "TEXT",
            Self::Boolean(_) => "BOOLEAN",
            Self::Date(_) => "DATE",
            Self::DateTime(_) => "DATETIME",
            Self::List(_) => "LIST",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            // i64::MAX as f64 rounds up to 2^63, which is already out of range.
            Self::Float(f) if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 => {
                Some(*f as i64)
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Render as a SQL literal. Only used for column defaults in DDL;
    /// query arguments always travel as placeholders.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Self::Date(d) => format!("'{}'", d.format(DATE_FORMAT)),
            Self::DateTime(dt) => format!("'{}'", dt.format(DATETIME_FORMATS[0])),
            Self::List(items) => format!(
                "({})",
                items
                    .iter()
                    .map(Value::to_sql_literal)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::DateTime(a), Self::DateTime(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Integer(_), Self::Float(_)) | (Self::Float(_), Self::Integer(_)) => {
                self.as_i64() == other.as_i64()
            }
            _ => false,
        }
    }
}

impl Eq for Value {}

/// Integral floats hash like the integer they equal.
impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        if let Some(i) = self.as_i64() {
            1u8.hash(state);
            i.hash(state);
            return;
        }
        match self {
            Self::Null => 0u8.hash(state),
            Self::Integer(i) => {
                1u8.hash(state);
                i.hash(state);
            }
            Self::Float(f) => {
                2u8.hash(state);
                let bits = if f.is_nan() { f64::NAN.to_bits() } else { f.to_bits() };
                bits.hash(state);
            }
            Self::Text(s) => {
                3u8.hash(state);
                s.hash(state);
            }
            Self::Boolean(b) => {
                4u8.hash(state);
                b.hash(state);
            }
            Self::Date(d) => {
                5u8.hash(state);
                d.hash(state);
            }
            Self::DateTime(dt) => {
                6u8.hash(state);
                dt.hash(state);
            }
            Self::List(items) => {
                7u8.hash(state);
                items.hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(fl) => write!(f, "{}", fl),
            Self::Text(s) => write!(f, "{}", s),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Self::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMATS[0])),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Self::DateTime(dt)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

/// Storage type of a scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Float,
    Text,
    Boolean,
    Date,
    DateTime,
}

impl DataType {
    pub fn is_compatible(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (Self::Integer, Value::Integer(_))
                | (Self::Float, Value::Float(_))
                | (Self::Float, Value::Integer(_))
                | (Self::Text, Value::Text(_))
                | (Self::Boolean, Value::Boolean(_))
                | (Self::Date, Value::Date(_))
                | (Self::DateTime, Value::DateTime(_))
        )
    }

    /// Convert a value scanned from a driver into this type.
    ///
    /// Drivers without native booleans or dates hand back integers and
    /// text; anything else that does not fit is a data error.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        if self.is_compatible(&value) {
            return Ok(match (self, value) {
                (Self::Float, Value::Integer(i)) => Value::Float(i as f64),
                (_, v) => v,
            });
        }

        let converted = match (self, &value) {
            (Self::Integer, Value::Float(_)) => value.as_i64().map(Value::Integer),
            (Self::Integer, Value::Text(s)) => s.trim().parse().ok().map(Value::Integer),
            (Self::Float, Value::Text(s)) => s.trim().parse().ok().map(Value::Float),
            (Self::Boolean, Value::Integer(i)) => Some(Value::Boolean(*i != 0)),
            (Self::Boolean, Value::Text(s)) => match s.as_str() {
                "t" | "true" | "1" => Some(Value::Boolean(true)),
                "f" | "false" | "0" => Some(Value::Boolean(false)),
                _ => None,
            },
            (Self::Date, Value::Text(s)) => NaiveDate::parse_from_str(s, DATE_FORMAT)
                .ok()
                .map(Value::Date),
            (Self::Date, Value::DateTime(dt)) => Some(Value::Date(dt.date())),
            (Self::DateTime, Value::Text(s)) => DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(Value::DateTime),
            (Self::Text, Value::Integer(i)) => Some(Value::Text(i.to_string())),
            _ => None,
        };

        converted.ok_or_else(|| {
            ModelError::TypeMismatch(format!(
                "Cannot scan {} value '{}' into {}",
                value.type_name(),
                value,
                self
            ))
        })
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
            Self::Text => write!(f, "TEXT"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Date => write!(f, "DATE"),
            Self::DateTime => write!(f, "DATETIME"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::Integer(42), Value::Integer(42));
        assert_eq!(Value::Integer(3), Value::Float(3.0));
        assert_ne!(Value::Integer(3), Value::Float(3.5));
        assert_ne!(Value::Float(1.0), Value::Float(1.0 + f64::EPSILON));
        assert_ne!(Value::Integer(1), Value::Integer(2));
        assert_eq!(Value::from(vec![1i64, 2]), Value::List(vec![Value::Integer(1), Value::Integer(2)]));
    }

    #[test]
    fn test_equal_values_hash_alike() {
        use std::collections::HashSet;
        let set: HashSet<Value> = [Value::Integer(1), Value::Float(1.0), Value::Float(-0.0), Value::Integer(0)]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
        assert!(set.contains(&Value::Float(0.0)));
    }

    #[test]
    fn test_out_of_range_float_is_not_an_integer() {
        assert_eq!(Value::Float(9.0e18).as_i64(), Some(9_000_000_000_000_000_000));
        assert_eq!(Value::Float(1.0e19).as_i64(), None);
        assert_eq!(Value::Float(-1.0e19).as_i64(), None);
        assert_eq!(Value::Float(f64::INFINITY).as_i64(), None);
        assert!(DataType::Integer.coerce(Value::Float(1.0e19)).is_err());
        assert_ne!(Value::Float(1.0e19), Value::Integer(i64::MAX));
    }

    #[test]
    fn test_type_compatibility() {
        let int_type = DataType::Integer;
        assert!(int_type.is_compatible(&Value::Integer(42)));
        assert!(int_type.is_compatible(&Value::Null));
        assert!(!int_type.is_compatible(&Value::Text("hello".into())));
    }

    #[test]
    fn test_coerce_driver_values() {
        assert_eq!(DataType::Boolean.coerce(Value::Integer(1)).unwrap(), Value::Boolean(true));
        assert_eq!(
            DataType::Date.coerce(Value::Text("2016-03-01".into())).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2016, 3, 1).unwrap())
        );
        assert_eq!(DataType::Float.coerce(Value::Integer(2)).unwrap(), Value::Float(2.0));

        let err = DataType::Integer.coerce(Value::Text("abc".into())).unwrap_err();
        assert!(err.is_data());
    }

    #[test]
    fn test_sql_literal_escapes_quotes() {
        assert_eq!(Value::from("O'Hara").to_sql_literal(), "'O''Hara'");
        assert_eq!(Value::Boolean(false).to_sql_literal(), "FALSE");
    }
}
