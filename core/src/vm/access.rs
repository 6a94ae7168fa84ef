use anyhow::Result;

use crate::val::{Key, KeyError, Member, ObjectRef, TypeRef, Value, is_a};

use super::Vm;

/// Which accessor attribute a member access consults: `[]` or `.`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessor {
    Bracket,
    Dot,
}

impl Accessor {
    pub fn from_u8(raw: u8) -> Self {
        if raw == 1 { Accessor::Dot } else { Accessor::Bracket }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Accessor::Bracket => "[]",
            Accessor::Dot => ".",
        }
    }
}

/// How a member access on a particular object resolves.
enum Route {
    Interface(Option<Member>, Option<Value>),
    Record(Option<TypeRef>),
    Plain,
}

impl Vm {
    /// Attribute-set entry stored under a string name.
    pub(crate) fn attribute(&self, obj: &ObjectRef, name: &str) -> Option<Value> {
        let attrs = obj.borrow().attributes()?.clone();
        let value = attrs.borrow().get_str(name)?;
        (!value.is_empty()).then_some(value)
    }

    /// Attribute-set entry keyed by a type, used for conversions.
    pub(crate) fn attribute_for_type(&self, obj: &ObjectRef, ty: &TypeRef) -> Option<Value> {
        let attrs = obj.borrow().attributes()?.clone();
        let value = attrs.borrow().get(&Key::Type(ty.clone()))?;
        (!value.is_empty()).then_some(value)
    }

    fn route(&mut self, target: &Value, key: &Value, write: bool) -> Result<(ObjectRef, Route)> {
        let Value::Object(obj) = target else {
            let verb = if write { "set" } else { "access" };
            return Err(self.raise_message(format!(
                "Cannot {} a member of a {} value",
                verb,
                target.kind_name()
            )));
        };
        let route = {
            let o = obj.borrow();
            if o.is_function() {
                None
            } else if let Some(iface) = o.interface() {
                match key.as_str() {
                    Some(name) => Some(Route::Interface(iface.members.get(name).cloned(), iface.private.clone())),
                    None => {
                        return Err(self.raise_message("Interface members can only be accessed with string keys"));
                    }
                }
            } else if let Some(layout) = o.layout() {
                Some(Route::Record(key.as_str().and_then(|name| layout.get(name).cloned())))
            } else {
                Some(Route::Plain)
            }
        };
        match route {
            Some(route) => Ok((obj.clone(), route)),
            None => Err(self.raise_message("Functions have no members")),
        }
    }

    /// Read `target[key]` with interface, accessor-attribute and record rules.
    pub fn get_member(&mut self, target: &Value, key: &Value, accessor: Accessor) -> Result<Value> {
        let (obj, route) = self.route(target, key, false)?;
        match route {
            Route::Interface(member, private) => match member {
                Some(Member::Method(method)) => Ok(method),
                Some(Member::Accessor { get: Some(getter), .. }) => {
                    self.call_inner(&getter, &[] as &[(&str, Value)], private)
                }
                Some(Member::Accessor { get: None, .. }) => Err(self.raise_message(format!(
                    "Interface member '{}' cannot be read",
                    key.as_str().unwrap_or_default()
                ))),
                None => Err(self.raise_message(format!(
                    "Interface has no member '{}'",
                    key.as_str().unwrap_or_default()
                ))),
            },
            _ if self.accessor_part(&obj, accessor, "get").is_function() => {
                let getter = self.accessor_part(&obj, accessor, "get");
                self.call_inner(&getter, &[("key", key.clone())], None)
            }
            Route::Record(declared) => {
                if declared.is_none() {
                    return Err(self.record_key_error(&obj, key));
                }
                Ok(read_direct(&obj, key))
            }
            Route::Plain => {
                match Key::from_value(key) {
                    Ok(key) => Ok(obj.borrow().get(&key).unwrap_or_default()),
                    Err(KeyError::InvalidIndex(_)) => Ok(Value::Empty),
                    Err(e) => Err(self.raise_message(e)),
                }
            }
        }
    }

    /// Write `target[key] = value`; returns the value stored.
    pub fn set_member(&mut self, target: &Value, key: &Value, value: Value, accessor: Accessor) -> Result<Value> {
        let (obj, route) = self.route(target, key, true)?;
        match route {
            Route::Interface(member, private) => match member {
                Some(Member::Accessor { set: Some(setter), .. }) => {
                    self.call_inner(&setter, &[("value", value.clone())], private)?;
                    Ok(value)
                }
                Some(_) => Err(self.raise_message(format!(
                    "Interface member '{}' cannot be written",
                    key.as_str().unwrap_or_default()
                ))),
                None => Err(self.raise_message(format!(
                    "Interface has no member '{}'",
                    key.as_str().unwrap_or_default()
                ))),
            },
            _ if self.accessor_part(&obj, accessor, "set").is_function() => {
                let setter = self.accessor_part(&obj, accessor, "set");
                self.call_inner(&setter, &[("key", key.clone()), ("value", value.clone())], None)?;
                Ok(value)
            }
            Route::Record(declared) => {
                let Some(ty) = declared else {
                    return Err(self.record_key_error(&obj, key));
                };
                if !is_a(&value, &ty) {
                    let got = self.type_of(&value);
                    return Err(self.raise_message(format!(
                        "Record member '{}' requires {}, got {}",
                        key.as_str().unwrap_or_default(),
                        ty.name(),
                        got.name()
                    )));
                }
                write_direct(&obj, key, value.clone());
                Ok(value)
            }
            Route::Plain => {
                let stored = Key::from_value(key).and_then(|k| obj.borrow_mut().try_set(k, value.clone()));
                match stored {
                    Ok(()) => Ok(value),
                    Err(e) => Err(self.raise_message(e)),
                }
            }
        }
    }

    /// `get`/`set` half of an accessor attribute. A bare function acts as the getter.
    fn accessor_part(&self, obj: &ObjectRef, accessor: Accessor, part: &str) -> Value {
        match self.attribute(obj, accessor.symbol()) {
            Some(func) if func.is_function() => {
                if part == "get" {
                    func
                } else {
                    Value::Empty
                }
            }
            Some(Value::Object(pair)) => pair.borrow().get_str(part).unwrap_or_default(),
            _ => Value::Empty,
        }
    }

    fn record_key_error(&mut self, obj: &ObjectRef, key: &Value) -> anyhow::Error {
        let type_name = obj.borrow().type_ref().name().to_string();
        let shown = match key {
            Value::String(s) => format!("'{}'", s),
            other => other.kind_name().to_string(),
        };
        self.raise_message(format!("{} is not a member of record type {}", shown, type_name))
    }

    /// Enumeration order keys, or the `keys` attribute's result.
    pub fn object_keys(&mut self, obj: &ObjectRef) -> Result<Vec<Value>> {
        if let Some(hook) = self.attribute(obj, "keys") {
            return self.enumeration_override(&hook, "keys");
        }
        let keys = obj.borrow().keys();
        Ok(keys)
    }

    /// Values matching [`Vm::object_keys`]; interface members are read through their getters.
    pub fn object_values(&mut self, obj: &ObjectRef) -> Result<Vec<Value>> {
        if let Some(hook) = self.attribute(obj, "values") {
            return self.enumeration_override(&hook, "values");
        }
        if obj.borrow().interface().is_none() {
            let values = obj.borrow().values();
            return Ok(values);
        }
        let target = Value::Object(obj.clone());
        let keys = obj.borrow().keys();
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            let value = match key {
                Value::String(_) => self.get_member(&target, &key, Accessor::Dot)?,
                other => read_direct(obj, &other),
            };
            values.push(value);
        }
        Ok(values)
    }

    fn enumeration_override(&mut self, hook: &Value, what: &str) -> Result<Vec<Value>> {
        let result = if hook.is_function() {
            self.call_no_args(hook)?
        } else {
            hook.clone()
        };
        match result {
            Value::Object(list) => Ok(list.borrow().indices().to_vec()),
            other => Err(self.raise_message(format!(
                "'{}' attribute must produce an Object, got {}",
                what,
                other.kind_name()
            ))),
        }
    }
}

fn read_direct(obj: &ObjectRef, key: &Value) -> Value {
    match Key::from_value(key) {
        Ok(key) => obj.borrow().get(&key).unwrap_or_default(),
        Err(_) => Value::Empty,
    }
}

fn write_direct(obj: &ObjectRef, key: &Value, value: Value) {
    if let Ok(key) = Key::from_value(key) {
        obj.borrow_mut().set(key, value);
    }
}
