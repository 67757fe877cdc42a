//! Runtime values that flow through deferred calls.
//!
//! A [`Value`] is a cheap, reference-counted handle. Cloning a value clones
//! the handle, not the data, so every clone shares one identity. The result
//! cache keys on that identity ([`ObjectId`]); the context conflict rule uses
//! [`Value::same`], which also treats equal immutable scalars as the same.

use serde::{Serialize, Serializer};
use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Identity token of a value handle.
///
/// Only meaningful while the value is alive: the result cache keeps every
/// value it fingerprints alive so tokens are never reused under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(usize);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// An opaque host object carried through the engine untouched.
pub struct Object {
    type_name: &'static str,
    inner: Box<dyn Any + Send + Sync>,
}

/// The payload behind a [`Value`] handle.
pub enum Data {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Object(Object),
}

/// A reference-counted runtime value.
#[derive(Clone)]
pub struct Value(Arc<Data>);

impl Value {
    pub fn null() -> Self {
        Self(Arc::new(Data::Null))
    }

    pub fn bool(b: bool) -> Self {
        Self(Arc::new(Data::Bool(b)))
    }

    pub fn int(i: i64) -> Self {
        Self(Arc::new(Data::Int(i)))
    }

    pub fn float(f: f64) -> Self {
        Self(Arc::new(Data::Float(f)))
    }

    pub fn str(s: impl Into<String>) -> Self {
        Self(Arc::new(Data::Str(s.into())))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Self(Arc::new(Data::List(items)))
    }

    /// Wrap an arbitrary host object. Objects only ever compare by identity.
    pub fn object<T: Any + Send + Sync>(inner: T) -> Self {
        Self(Arc::new(Data::Object(Object {
            type_name: std::any::type_name::<T>(),
            inner: Box::new(inner),
        })))
    }

    pub fn data(&self) -> &Data {
        &self.0
    }

    /// Identity token of this handle.
    pub fn id(&self) -> ObjectId {
        ObjectId(Arc::as_ptr(&self.0) as *const () as usize)
    }

    /// Whether both handles point at the same allocation.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Identity, or structural equality when neither side holds an object.
    pub fn same(&self, other: &Value) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (self.data(), other.data()) {
            (Data::Null, Data::Null) => true,
            (Data::Bool(a), Data::Bool(b)) => a == b,
            (Data::Int(a), Data::Int(b)) => a == b,
            (Data::Str(a), Data::Str(b)) => a == b,
            (Data::List(a), Data::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same(y))
            }
            (Data::Object(_), _) | (_, Data::Object(_)) => false,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Short name of the value's kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self.data() {
            Data::Null => "null",
            Data::Bool(_) => "bool",
            Data::Int(_) => "int",
            Data::Float(_) => "float",
            Data::Str(_) => "str",
            Data::List(_) => "list",
            Data::Object(o) => o.type_name,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.data(), Data::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.data() {
            Data::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.data() {
            Data::Int(i) => Some(*i),
            Data::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Numeric view; integers widen to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self.data() {
            Data::Float(f) => Some(*f),
            Data::Int(i) => Some(*i as f64),
            Data::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.data() {
            Data::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self.data() {
            Data::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self.data() {
            Data::Object(o) => o.inner.downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self.data() {
            Data::Null => false,
            Data::Bool(b) => *b,
            Data::Int(i) => *i != 0,
            Data::Float(f) => *f != 0.0,
            Data::Str(s) => !s.is_empty(),
            Data::List(items) => !items.is_empty(),
            Data::Object(_) => true,
        }
    }

    // ── Arithmetic ──────────────────────────────────────────────────────

    pub fn add(&self, rhs: &Value) -> Result<Value> {
        match (self.data(), rhs.data()) {
            (Data::Int(a), Data::Int(b)) => checked("add", a.checked_add(*b)),
            (Data::Str(a), Data::Str(b)) => Ok(Value::str(format!("{a}{b}"))),
            (Data::List(a), Data::List(b)) => {
                Ok(Value::list(a.iter().chain(b).cloned().collect()))
            }
            _ => self.float_op("add", rhs, |a, b| a + b),
        }
    }

    pub fn sub(&self, rhs: &Value) -> Result<Value> {
        match (self.data(), rhs.data()) {
            (Data::Int(a), Data::Int(b)) => checked("subtract", a.checked_sub(*b)),
            _ => self.float_op("subtract", rhs, |a, b| a - b),
        }
    }

    pub fn mul(&self, rhs: &Value) -> Result<Value> {
        match (self.data(), rhs.data()) {
            (Data::Int(a), Data::Int(b)) => checked("multiply", a.checked_mul(*b)),
            _ => self.float_op("multiply", rhs, |a, b| a * b),
        }
    }

    /// True division: the result is always a float.
    pub fn div(&self, rhs: &Value) -> Result<Value> {
        if rhs.as_f64() == Some(0.0) {
            return Err(Error::operation("divide", "division by zero"));
        }
        self.float_op("divide", rhs, |a, b| a / b)
    }

    pub fn pow(&self, rhs: &Value) -> Result<Value> {
        if let (Data::Int(base), Data::Int(exp)) = (self.data(), rhs.data()) {
            if let Ok(exp) = u32::try_from(*exp) {
                return checked("power", base.checked_pow(exp));
            }
        }
        self.float_op("power", rhs, f64::powf)
    }

    pub fn neg(&self) -> Result<Value> {
        match self.data() {
            Data::Int(i) => checked("negate", i.checked_neg()),
            Data::Float(f) => Ok(Value::float(-f)),
            _ => Err(Error::operation(
                "negate",
                format!("bad operand kind: {}", self.kind()),
            )),
        }
    }

    /// Index into a list or string; negative indices count from the end.
    pub fn get_at(&self, index: &Value) -> Result<Value> {
        let i = index.as_i64().ok_or_else(|| {
            Error::type_mismatch("index", "int", index.kind())
        })?;
        let resolve = |len: usize| -> Result<usize> {
            let len = len as i64;
            let at = if i < 0 { len + i } else { i };
            if at < 0 || at >= len {
                return Err(Error::operation("get_at", format!("index {i} out of range")));
            }
            Ok(at as usize)
        };
        match self.data() {
            Data::List(items) => Ok(items[resolve(items.len())?].clone()),
            Data::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                Ok(Value::str(chars[resolve(chars.len())?].to_string()))
            }
            _ => Err(Error::type_mismatch("target", "list or str", self.kind())),
        }
    }

    /// Ordering between numbers or between strings.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self.data(), other.data()) {
            (Data::Int(a), Data::Int(b)) => Some(a.cmp(b)),
            (Data::Str(a), Data::Str(b)) => Some(a.cmp(b)),
            _ => self.as_f64()?.partial_cmp(&other.as_f64()?),
        }
    }

    fn float_op(&self, op: &str, rhs: &Value, f: impl Fn(f64, f64) -> f64) -> Result<Value> {
        match (self.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::float(f(a, b))),
            _ => Err(Error::operation(
                op,
                format!("unsupported operand kinds: {} and {}", self.kind(), rhs.kind()),
            )),
        }
    }
}

fn checked(op: &str, result: Option<i64>) -> Result<Value> {
    result
        .map(Value::int)
        .ok_or_else(|| Error::operation(op, "integer overflow"))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.data() {
            Data::Null => write!(f, "null"),
            Data::Bool(b) => write!(f, "{b}"),
            Data::Int(i) => write!(f, "{i}"),
            Data::Float(x) => write!(f, "{x}"),
            Data::Str(s) => write!(f, "{s}"),
            Data::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item:?}")?;
                }
                write!(f, "]")
            }
            Data::Object(o) => write!(f, "<object {}>", o.type_name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.data() {
            Data::Str(s) => write!(f, "{s:?}"),
            _ => write!(f, "{self}"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.data() {
            Data::Null => serializer.serialize_unit(),
            Data::Bool(b) => serializer.serialize_bool(*b),
            Data::Int(i) => serializer.serialize_i64(*i),
            Data::Float(x) => serializer.serialize_f64(*x),
            Data::Str(s) => serializer.serialize_str(s),
            Data::List(items) => items.serialize(serializer),
            Data::Object(o) => serializer.serialize_str(&format!("<object {}>", o.type_name)),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::null()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}
