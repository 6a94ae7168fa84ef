use std::rc::Rc;

use anyhow::{Result, bail};

use crate::util::fast_map::OrderedMap;
use crate::val::{Facet, InterfaceFacet, Key, MAX_INDEX, Member, ObjectRef, Value};
use crate::vm::Vm;

use super::{arg, index_arg, object_arg};

/// Object base that may hold data (function objects have no members).
fn base(args: &[Value]) -> Result<ObjectRef> {
    let obj = object_arg(args, 0, "base")?;
    if obj.borrow().is_function() {
        bail!("Functions have no members");
    }
    Ok(obj)
}

fn callback(args: &[Value], index: usize, what: &str) -> Result<Value> {
    let func = arg(args, index);
    if !func.is_function() {
        bail!("{} must be a function, got {}", what, func.kind_name());
    }
    Ok(func)
}

pub(super) fn push(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let obj = base(args)?;
    obj.borrow_mut().push(arg(args, 1));
    Ok(Value::Object(obj))
}

pub(super) fn insert(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let obj = base(args)?;
    let at = index_arg(args, 1, "at")?;
    {
        let mut o = obj.borrow_mut();
        let len = o.index_count();
        if at > len {
            bail!("insert position {} is past the end ({})", at, len);
        }
        o.indices_mut().insert(at, arg(args, 2));
    }
    Ok(Value::Object(obj))
}

/// Remove a key; later indices shift down. Returns the removed value.
pub(super) fn remove(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let obj = base(args)?;
    let key = Key::from_value(&arg(args, 1)).map_err(anyhow::Error::msg)?;
    let removed = obj.borrow_mut().remove(&key);
    Ok(removed.unwrap_or_default())
}

pub(super) fn set_attributes(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let obj = base(args)?;
    let attributes = match arg(args, 1) {
        Value::Empty => None,
        Value::Object(attrs) => Some(attrs),
        other => bail!("attributes must be an Object, got {}", other.kind_name()),
    };
    obj.borrow_mut().set_attributes(attributes);
    Ok(Value::Object(obj))
}

fn merge_sort(vm: &mut Vm, comparator: &Value, mut items: Vec<Value>) -> Result<Vec<Value>> {
    if items.len() < 2 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(vm, comparator, items)?;
    let right = merge_sort(vm, comparator, right)?;

    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        match (left.peek(), right.peek()) {
            (Some(a), Some(b)) => {
                let order = vm.call_inner(comparator, &[("a", a.clone()), ("b", b.clone())], None)?;
                let take_left = vm.as_number(&order)? <= 0.0;
                let next = if take_left { left.next() } else { right.next() };
                out.extend(next);
            }
            (Some(_), None) => {
                out.extend(left);
                break;
            }
            (None, _) => {
                out.extend(right);
                break;
            }
        }
    }
    Ok(out)
}

/// Stable in-place sort of the indices by `comparator(a:, b:)`.
pub(super) fn sort(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let obj = base(args)?;
    let comparator = callback(args, 1, "comparator")?;
    let items = obj.borrow().indices().to_vec();
    let sorted = merge_sort(vm, &comparator, items)?;
    *obj.borrow_mut().indices_mut() = sorted;
    Ok(Value::Object(obj))
}

/// Inclusive `[from, to]` slice of a string or of an object's indices.
pub(super) fn subset(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let from = index_arg(args, 1, "from")?;
    let to = index_arg(args, 2, "to")?;
    if from > to {
        bail!("subset range {}..{} is reversed", from, to);
    }
    match arg(args, 0) {
        Value::String(s) => {
            let len = s.chars().count();
            if to >= len {
                bail!("subset end {} is out of range for a string of length {}", to, len);
            }
            let out: String = s.chars().skip(from).take(to - from + 1).collect();
            Ok(Value::from(out))
        }
        Value::Object(obj) => {
            let slice = {
                let o = obj.borrow();
                let len = o.index_count();
                if to >= len {
                    bail!("subset end {} is out of range for {} indices", to, len);
                }
                o.indices()[from..=to].to_vec()
            };
            Ok(vm.new_index_object(slice))
        }
        other => bail!("subset requires a String or Object base, got {}", other.kind_name()),
    }
}

pub(super) fn filter(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let obj = base(args)?;
    let by = callback(args, 1, "by")?;
    let items = obj.borrow().indices().to_vec();
    let mut kept = Vec::new();
    for value in items {
        let keep = vm.call_inner(&by, &[("value", value.clone())], None)?;
        if vm.as_boolean(&keep)? {
            kept.push(value);
        }
    }
    Ok(vm.new_index_object(kept))
}

pub(super) fn find_index(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let obj = base(args)?;
    let needle = arg(args, 1);
    let found = obj.borrow().indices().iter().position(|v| *v == needle);
    Ok(Value::Number(found.map_or(-1.0, |i| i as f64)))
}

pub(super) fn map(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let obj = base(args)?;
    let to = callback(args, 1, "to")?;
    let items = obj.borrow().indices().to_vec();
    let mut mapped = Vec::with_capacity(items.len());
    for value in items {
        mapped.push(vm.call_inner(&to, &[("value", value)], None)?);
    }
    Ok(vm.new_index_object(mapped))
}

pub(super) fn reduce(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let obj = base(args)?;
    let to = callback(args, 1, "to")?;
    let items = obj.borrow().indices().to_vec();
    let mut previous = Value::Empty;
    for value in items {
        previous = vm.call_inner(&to, &[("previous", previous), ("value", value)], None)?;
    }
    Ok(previous)
}

fn any_or_all(vm: &mut Vm, args: &[Value], want: bool) -> Result<Value> {
    let obj = base(args)?;
    let condition = callback(args, 1, "condition")?;
    let items = obj.borrow().indices().to_vec();
    for value in items {
        let hit = vm.call_inner(&condition, &[("value", value)], None)?;
        if vm.as_boolean(&hit)? == want {
            return Ok(Value::Boolean(want));
        }
    }
    Ok(Value::Boolean(!want))
}

pub(super) fn any(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    any_or_all(vm, args, true)
}

pub(super) fn all(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    any_or_all(vm, args, false)
}

pub(super) fn foreach(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let obj = base(args)?;
    let body = callback(args, 1, "do")?;
    let keys = vm.object_keys(&obj)?;
    let values = vm.object_values(&obj)?;
    for (key, value) in keys.into_iter().zip(values) {
        vm.call_inner(&body, &[("key", key), ("value", value)], None)?;
    }
    Ok(Value::Object(obj))
}

pub(super) fn set_size(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let obj = base(args)?;
    let size = index_arg(args, 1, "size")?;
    if size > MAX_INDEX + 1 {
        bail!("Invalid index {}", size);
    }
    obj.borrow_mut().indices_mut().resize(size, Value::Empty);
    Ok(Value::Object(obj))
}

/// Turn the object's string members into an interface (or drop the interface).
/// Functions become methods; `{get, set}` objects become accessors.
pub(super) fn set_is_interface(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let obj = base(args)?;
    let enabled = vm.as_boolean(&arg(args, 1))?;
    if obj.borrow().layout().is_some() {
        bail!("A record object cannot become an interface");
    }
    if !enabled {
        let members: Option<Vec<(Rc<str>, Member)>> = obj
            .borrow()
            .interface()
            .map(|iface| iface.members.iter().map(|(k, m)| (k.clone(), m.clone())).collect());
        let Some(members) = members else {
            return Ok(Value::Object(obj));
        };
        obj.borrow_mut().set_facet(Facet::None);
        for (name, member) in members {
            let value = match member {
                Member::Method(method) => method,
                Member::Accessor { get, set } => {
                    let pair = vm.new_object();
                    let mut p = pair.borrow_mut();
                    p.set_str("get", get.unwrap_or_default());
                    p.set_str("set", set.unwrap_or_default());
                    drop(p);
                    Value::Object(pair)
                }
            };
            obj.borrow_mut().set_str(&name, value);
        }
        return Ok(Value::Object(obj));
    }

    let private = match arg(args, 2) {
        Value::Empty => None,
        value => Some(value),
    };
    // Already an interface: members stay, only a new private binding applies.
    let already_interface = {
        let mut o = obj.borrow_mut();
        match o.facet_mut() {
            Facet::Interface(iface) => {
                if private.is_some() {
                    iface.private = private.clone();
                }
                true
            }
            _ => false,
        }
    };
    if already_interface {
        return Ok(Value::Object(obj));
    }

    let entries: Vec<(Rc<str>, Value)> = obj
        .borrow()
        .string_entries()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let mut members = OrderedMap::new();
    for (name, value) in entries {
        let member = match &value {
            v if v.is_function() => Member::Method(value.clone()),
            Value::Object(pair) => {
                let pair = pair.borrow();
                let get = pair.get_str("get").filter(|g| !g.is_empty());
                let set = pair.get_str("set").filter(|s| !s.is_empty());
                if get.is_none() && set.is_none() {
                    bail!("interface member '{}' needs a get or set function", name);
                }
                Member::Accessor { get, set }
            }
            other => bail!(
                "interface member '{}' must be a function or accessor, got {}",
                name,
                other.kind_name()
            ),
        };
        members.insert(name, member);
    }
    let mut o = obj.borrow_mut();
    for name in members.keys() {
        o.remove(&Key::String(name.clone()));
    }
    o.set_facet(Facet::Interface(InterfaceFacet { members, private }));
    drop(o);
    Ok(Value::Object(obj))
}
