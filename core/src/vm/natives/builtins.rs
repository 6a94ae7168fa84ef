use std::f64::consts::PI;
use std::rc::Rc;

use anyhow::{Result, bail};
use tracing::debug;

use crate::val::{BuiltinType, Facet, Layout, Object, TypeRef, Value, is_a, json};

use super::{arg, object_arg, string_arg};
use crate::vm::Vm;

pub(super) fn noop(_vm: &mut Vm, _args: &[Value]) -> Result<Value> {
    Ok(Value::Empty)
}

pub(super) fn import(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let module = string_arg(args, 0, "module")?;
    vm.import_module(&module)
}

pub(super) fn print(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let text = vm.as_string(&arg(args, 0))?;
    vm.host.print(&text);
    Ok(Value::Empty)
}

pub(super) fn send(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    Err(vm.raise_send(arg(args, 0)))
}

pub(super) fn error(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    Err(vm.raise_error(arg(args, 0)))
}

/// Single-use lookup: the name is consumed by the first successful retrieval.
pub(super) fn get_external_function(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let name = string_arg(args, 0, "name")?;
    match vm.external_names.remove(name.as_ref()) {
        Some(id) => vm.native_value(id),
        None => bail!("unable to find external function '{}'", name),
    }
}

pub(super) fn number_parse(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let text = vm.as_string(&arg(args, 0))?;
    match text.trim().parse::<f64>() {
        Ok(n) => Ok(Value::Number(n)),
        Err(_) => bail!("'{}' is not a valid Number", text),
    }
}

pub(super) fn number_pi(_vm: &mut Vm, _args: &[Value]) -> Result<Value> {
    Ok(Value::Number(PI))
}

pub(super) fn number_random(_vm: &mut Vm, _args: &[Value]) -> Result<Value> {
    Ok(Value::Number(rand::random::<f64>()))
}

pub(super) fn string_combine(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let strings = object_arg(args, 0, "strings")?;
    let mut out = String::new();
    for value in vm.object_values(&strings)? {
        out.push_str(&vm.as_string(&value)?);
    }
    Ok(Value::from(out))
}

pub(super) fn new_type(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let name: Rc<str> = match arg(args, 0) {
        Value::Empty => Rc::from("Unnamed"),
        other => vm.as_string(&other)?,
    };
    let inherits = match arg(args, 1) {
        Value::Empty => None,
        Value::Object(list) => {
            let mut parents = Vec::new();
            for value in vm.object_values(&list)? {
                match value {
                    Value::Type(ty) => parents.push(ty),
                    other => bail!("inherits may only contain Types, found {}", other.kind_name()),
                }
            }
            Some(parents)
        }
        other => bail!("inherits must be an Object of Types, got {}", other.kind_name()),
    };
    let layout = match arg(args, 2) {
        Value::Empty => None,
        Value::Object(fields) => {
            let mut layout = Layout::new();
            for (key, value) in fields.borrow().string_entries() {
                match value {
                    Value::Type(ty) => {
                        layout.insert(key.clone(), ty.clone());
                    }
                    other => bail!("layout entry '{}' must be a Type, got {}", key, other.kind_name()),
                }
            }
            Some(layout)
        }
        other => bail!("layout must be an Object, got {}", other.kind_name()),
    };
    let ty = vm.types.create(&name, inherits, layout)?;
    Ok(Value::Type(ty))
}

pub(super) fn instantiate(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let ty: TypeRef = match arg(args, 0) {
        Value::Type(ty) => ty,
        other => bail!("instantiate requires a Type, got {}", other.kind_name()),
    };
    if let Some(builtin) = BuiltinType::from_id(ty.id()) {
        if builtin != BuiltinType::Object {
            bail!("Cannot instantiate builtin type {}", builtin.name());
        }
    }
    let facet = match ty.data().layout() {
        Some(layout) => Facet::Record(layout.clone()),
        None => Facet::None,
    };
    let obj = vm.new_object_with(Object::with_facet(ty, facet));
    Ok(Value::Object(obj))
}

pub(super) fn freeze_gc(_vm: &mut Vm, _args: &[Value]) -> Result<Value> {
    debug!(target: "mat::gc", "freezeGC is a no-op");
    Ok(Value::Empty)
}

pub(super) fn thaw_gc(_vm: &mut Vm, _args: &[Value]) -> Result<Value> {
    debug!(target: "mat::gc", "thawGC is a no-op");
    Ok(Value::Empty)
}

pub(super) fn garbage_collect(_vm: &mut Vm, _args: &[Value]) -> Result<Value> {
    debug!(target: "mat::gc", "garbageCollect is a no-op");
    Ok(Value::Empty)
}

pub(super) fn json_encode(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let text = json::encode(vm, &arg(args, 0))?;
    Ok(Value::from(text))
}

pub(super) fn json_decode(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let text = string_arg(args, 0, "string")?;
    json::decode(vm, &text)
}

/// `x->atan2(y:)` is the angle of the point (x, y).
pub(super) fn atan2(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let Value::Number(x) = arg(args, 0) else {
        bail!("atan2 requires a Number base");
    };
    let y = vm.as_number(&arg(args, 1))?;
    Ok(Value::Number(y.atan2(x)))
}

pub(super) fn isa(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    match arg(args, 1) {
        Value::Type(ty) => Ok(Value::Boolean(is_a(&arg(args, 0), &ty))),
        other => bail!("isa requires a Type, got {}", other.kind_name()),
    }
}
