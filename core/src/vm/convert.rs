use std::rc::Rc;

use anyhow::Result;

use crate::val::convert::{Converted, boolean_of, number_of, string_of};
use crate::val::{BuiltinType, ObjectRef, TypeRef, Value, is_a};

use super::Vm;

impl Vm {
    pub fn as_number(&mut self, value: &Value) -> Result<f64> {
        match number_of(value) {
            Converted::Done(n) => Ok(n),
            Converted::Object(obj) => match self.convert_object(&obj, BuiltinType::Number)? {
                Value::Number(n) => Ok(n),
                other => Err(self.conversion_result_error(BuiltinType::Number, &other)),
            },
            Converted::Invalid => Err(self.conversion_error(value, BuiltinType::Number)),
        }
    }

    pub fn as_string(&mut self, value: &Value) -> Result<Rc<str>> {
        match string_of(value) {
            Converted::Done(s) => Ok(s),
            Converted::Object(obj) => match self.convert_object(&obj, BuiltinType::String)? {
                Value::String(s) => Ok(s),
                other => Err(self.conversion_result_error(BuiltinType::String, &other)),
            },
            Converted::Invalid => Err(self.conversion_error(value, BuiltinType::String)),
        }
    }

    pub fn as_boolean(&mut self, value: &Value) -> Result<bool> {
        match boolean_of(value) {
            Converted::Done(b) => Ok(b),
            Converted::Object(obj) => match self.convert_object(&obj, BuiltinType::Boolean)? {
                Value::Boolean(b) => Ok(b),
                other => Err(self.conversion_result_error(BuiltinType::Boolean, &other)),
            },
            Converted::Invalid => Err(self.conversion_error(value, BuiltinType::Boolean)),
        }
    }

    /// Convert through the attribute set entry keyed by the target type.
    fn convert_object(&mut self, obj: &ObjectRef, target: BuiltinType) -> Result<Value> {
        let ty = self.builtin_type(target);
        match self.attribute_for_type(obj, &ty) {
            Some(converter) => self.call_no_args(&converter),
            None => {
                let kind = if obj.borrow().is_function() { "Function" } else { "Object" };
                Err(self.raise_message(format!("Cannot convert {} to {}", kind, target.name())))
            }
        }
    }

    fn conversion_error(&mut self, value: &Value, target: BuiltinType) -> anyhow::Error {
        self.raise_message(format!("Cannot convert {} to {}", value.kind_name(), target.name()))
    }

    fn conversion_result_error(&mut self, target: BuiltinType, got: &Value) -> anyhow::Error {
        self.raise_message(format!(
            "{} conversion attribute returned {} instead",
            target.name(),
            got.kind_name()
        ))
    }

    /// `Type(from: value)`: convert to builtin kinds, pass through values that
    /// already satisfy the type, else use an attribute keyed by the type.
    pub fn convert_to_type(&mut self, value: &Value, ty: &TypeRef) -> Result<Value> {
        match BuiltinType::from_id(ty.id()) {
            Some(BuiltinType::Number) => return self.as_number(value).map(Value::Number),
            Some(BuiltinType::String) => return self.as_string(value).map(Value::String),
            Some(BuiltinType::Boolean) => return self.as_boolean(value).map(Value::Boolean),
            Some(BuiltinType::Type) => return Ok(Value::Type(self.type_of(value))),
            _ => {}
        }
        if is_a(value, ty) {
            return Ok(value.clone());
        }
        if let Value::Object(obj) = value {
            if let Some(converter) = self.attribute_for_type(obj, ty) {
                let converted = self.call_no_args(&converter)?;
                if is_a(&converted, ty) {
                    return Ok(converted);
                }
            }
        }
        Err(self.raise_message(format!("Cannot convert {} to {}", value.kind_name(), ty.name())))
    }
}
