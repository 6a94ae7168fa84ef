use std::rc::Rc;

use super::{ObjectRef, TypeRef, Value};

/// Largest magnitude printed as an integer; beyond it the shortest round-trip form is used.
const INTEGRAL_LIMIT: f64 = 1e15;

/// Canonical text form of a number.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n.fract() == 0.0 && n.abs() < INTEGRAL_LIMIT {
        let mut buf = itoa::Buffer::new();
        return buf.format(n as i64).to_string();
    }
    let mut buf = ryu::Buffer::new();
    buf.format_finite(n).to_string()
}

/// What a conversion produced before object attributes are consulted.
pub(crate) enum Converted<T> {
    Done(T),
    /// Object without an intrinsic conversion; the VM consults its attribute set.
    Object(ObjectRef),
    Invalid,
}

pub(crate) fn number_of(value: &Value) -> Converted<f64> {
    match value {
        Value::Number(n) => Converted::Done(*n),
        Value::Boolean(b) => Converted::Done(if *b { 1.0 } else { 0.0 }),
        Value::Object(obj) => Converted::Object(obj.clone()),
        Value::Empty | Value::String(_) | Value::Type(_) => Converted::Invalid,
    }
}

pub(crate) fn string_of(value: &Value) -> Converted<Rc<str>> {
    match value {
        Value::String(s) => Converted::Done(s.clone()),
        Value::Number(n) => Converted::Done(Rc::from(format_number(*n))),
        Value::Boolean(b) => Converted::Done(Rc::from(if *b { "true" } else { "false" })),
        Value::Type(ty) => Converted::Done(Rc::from(ty.name())),
        Value::Object(obj) => Converted::Object(obj.clone()),
        Value::Empty => Converted::Invalid,
    }
}

pub(crate) fn boolean_of(value: &Value) -> Converted<bool> {
    match value {
        Value::Empty => Converted::Done(false),
        Value::Boolean(b) => Converted::Done(*b),
        Value::Number(n) => Converted::Done(*n != 0.0),
        Value::String(_) | Value::Type(_) => Converted::Done(true),
        Value::Object(obj) => {
            if obj.borrow().is_function() {
                Converted::Done(true)
            } else {
                Converted::Object(obj.clone())
            }
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::String(s)
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}

impl From<TypeRef> for Value {
    fn from(ty: TypeRef) -> Self {
        Value::Type(ty)
    }
}
