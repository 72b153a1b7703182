use super::MethodCall;
use crate::core::{ModelError, Result, Value};
use crate::recordset::RecordSet;
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;
use std::sync::Arc;

/// Kind of one method parameter or return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// The record handle a method is invoked on. Only valid as the first
    /// parameter.
    RecordSet,
    Integer,
    Float,
    Text,
    Boolean,
    Date,
    DateTime,
    /// Any value.
    Value,
    List,
    /// No value; `()` in typed layers.
    Unit,
}

impl ParamKind {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::RecordSet => false,
            Self::Integer => matches!(value, Value::Integer(_)),
            Self::Float => matches!(value, Value::Float(_) | Value::Integer(_)),
            Self::Text => matches!(value, Value::Text(_)),
            Self::Boolean => matches!(value, Value::Boolean(_)),
            Self::Date => matches!(value, Value::Date(_)),
            Self::DateTime => matches!(value, Value::DateTime(_)),
            Self::Value => true,
            Self::List => matches!(value, Value::List(_)),
            Self::Unit => value.is_null(),
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RecordSet => "RecordSet",
            Self::Integer => "Integer",
            Self::Float => "Float",
            Self::Text => "Text",
            Self::Boolean => "Boolean",
            Self::Date => "Date",
            Self::DateTime => "DateTime",
            Self::Value => "Value",
            Self::List => "List",
            Self::Unit => "()",
        };
        f.write_str(name)
    }
}

/// Parameter and return kinds of a method. The receiver is the first
/// parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub params: Vec<ParamKind>,
    pub returns: ParamKind,
}

impl Signature {
    pub fn new(params: Vec<ParamKind>, returns: ParamKind) -> Self {
        Self { params, returns }
    }

    /// Receiver plus `args`.
    pub fn method(args: &[ParamKind], returns: ParamKind) -> Self {
        let mut params = Vec::with_capacity(args.len() + 1);
        params.push(ParamKind::RecordSet);
        params.extend_from_slice(args);
        Self { params, returns }
    }

    /// Kinds of the arguments after the receiver.
    pub fn args(&self) -> &[ParamKind] {
        self.params.get(1..).unwrap_or_default()
    }

    pub(crate) fn check_shape(&self) -> std::result::Result<(), String> {
        match self.params.first() {
            Some(ParamKind::RecordSet) => {}
            Some(other) => {
                return Err(format!(
                    "first parameter must be RecordSet, found {}",
                    other
                ));
            }
            None => return Err("first parameter must be RecordSet, found none".to_string()),
        }
        if self.args().contains(&ParamKind::RecordSet) {
            return Err("RecordSet is only allowed as the first parameter".to_string());
        }
        if self.args().contains(&ParamKind::Unit) {
            return Err("() is only allowed as a return kind".to_string());
        }
        if self.returns == ParamKind::RecordSet {
            return Err("methods cannot return a RecordSet".to_string());
        }
        Ok(())
    }

    /// Data check of call arguments against this signature.
    pub(crate) fn check_args(&self, method: &str, args: &[Value]) -> Result<()> {
        let expected = self.args();
        if expected.len() != args.len() {
            return Err(ModelError::TypeMismatch(format!(
                "{} takes {} arguments, {} given",
                method,
                expected.len(),
                args.len()
            )));
        }
        for (i, (kind, value)) in expected.iter().zip(args).enumerate() {
            if !kind.accepts(value) {
                return Err(ModelError::TypeMismatch(format!(
                    "{}: argument {} should be {}, got {}",
                    method,
                    i + 1,
                    kind,
                    value.type_name()
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn check_return(&self, method: &str, value: &Value) -> Result<()> {
        if self.returns.accepts(value) {
            return Ok(());
        }
        Err(ModelError::TypeMismatch(format!(
            "{} should return {}, returned {}",
            method,
            self.returns,
            value.type_name()
        )))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        write!(f, "fn({}) -> {}", params.join(", "), self.returns)
    }
}

/// A type usable as a typed layer argument.
pub trait Param: Sized {
    const KIND: ParamKind;

    fn from_value(value: Value) -> Result<Self>;
}

/// A type usable as a typed layer return value.
pub trait Output {
    const KIND: ParamKind;

    fn into_value(self) -> Value;
}

fn mismatch<T>(kind: ParamKind, value: &Value) -> Result<T> {
    Err(ModelError::TypeMismatch(format!(
        "expected {}, got {}",
        kind,
        value.type_name()
    )))
}

macro_rules! impl_param {
    ($ty:ty, $kind:ident, $pat:pat => $out:expr, $into:expr) => {
        impl Param for $ty {
            const KIND: ParamKind = ParamKind::$kind;

            fn from_value(value: Value) -> Result<Self> {
                match value {
                    $pat => Ok($out),
                    other => mismatch(<Self as Param>::KIND, &other),
                }
            }
        }

        impl Output for $ty {
            const KIND: ParamKind = ParamKind::$kind;

            fn into_value(self) -> Value {
                $into(self)
            }
        }
    };
}

impl_param!(i64, Integer, Value::Integer(i) => i, Value::Integer);
impl_param!(String, Text, Value::Text(s) => s, Value::Text);
impl_param!(bool, Boolean, Value::Boolean(b) => b, Value::Boolean);
impl_param!(NaiveDate, Date, Value::Date(d) => d, Value::Date);
impl_param!(NaiveDateTime, DateTime, Value::DateTime(dt) => dt, Value::DateTime);
impl_param!(Vec<Value>, List, Value::List(items) => items, Value::List);

impl Param for f64 {
    const KIND: ParamKind = ParamKind::Float;

    fn from_value(value: Value) -> Result<Self> {
        match value.as_f64() {
            Some(f) => Ok(f),
            None => mismatch(<Self as Param>::KIND, &value),
        }
    }
}

impl Output for f64 {
    const KIND: ParamKind = ParamKind::Float;

    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl Param for Value {
    const KIND: ParamKind = ParamKind::Value;

    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl Output for Value {
    const KIND: ParamKind = ParamKind::Value;

    fn into_value(self) -> Value {
        self
    }
}

impl Output for () {
    const KIND: ParamKind = ParamKind::Unit;

    fn into_value(self) -> Value {
        Value::Null
    }
}

/// Type-erased layer body.
pub type Callable = Arc<dyn Fn(&MethodCall<'_>, &RecordSet, &[Value]) -> Result<Value> + Send + Sync>;

/// A function usable as a method layer.
///
/// Implemented for every `Fn(&MethodCall, &RecordSet, A1, .., An) -> Result<R>`
/// with up to four arguments, where each `Ai` is a [`Param`] and `R` an
/// [`Output`]. The signature is derived from the types, so typed layers
/// can only disagree with each other when they name different types.
pub trait LayerFn<Args>: Send + Sync + 'static {
    fn signature() -> Signature;

    fn into_callable(self) -> Callable;
}

macro_rules! impl_layer_fn {
    ($($ty:ident $var:ident),*) => {
        impl<F, R, $($ty,)*> LayerFn<($($ty,)*)> for F
        where
            F: Fn(&MethodCall<'_>, &RecordSet, $($ty),*) -> Result<R> + Send + Sync + 'static,
            R: Output + 'static,
            $($ty: Param + 'static,)*
        {
            fn signature() -> Signature {
                Signature::method(&[$($ty::KIND),*], R::KIND)
            }

            fn into_callable(self) -> Callable {
                Arc::new(move |call: &MethodCall<'_>, rs: &RecordSet, args: &[Value]| {
                    #[allow(unused_mut, unused_variables)]
                    let mut args = args.iter().cloned();
                    $(
                        let $var = $ty::from_value(args.next().ok_or_else(|| {
                            ModelError::TypeMismatch("missing method argument".into())
                        })?)?;
                    )*
                    (self)(call, rs, $($var),*).map(Output::into_value)
                })
            }
        }
    };
}

impl_layer_fn!();
impl_layer_fn!(A1 a1);
impl_layer_fn!(A1 a1, A2 a2);
impl_layer_fn!(A1 a1, A2 a2, A3 a3);
impl_layer_fn!(A1 a1, A2 a2, A3 a3, A4 a4);
