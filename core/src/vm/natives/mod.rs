//! Built-in native functions.
//!
//! Ids are dense and stable: the core primitives first, then one native per
//! parameterized query (in [`Query::PARAMETERIZED`] order), then host functions
//! appended through [`Vm::set_external_function`].

use std::rc::Rc;

use anyhow::{Result, bail};

use crate::val::{ObjectRef, Value};

use super::query::Query;
use super::{NativeFn, Vm};

mod builtins;
mod object;
mod string;

type BuiltinFn = fn(&mut Vm, &[Value]) -> Result<Value>;

const CORE: &[(&str, &[&str], BuiltinFn)] = &[
    ("noop", &[], builtins::noop),
    ("import", &["module"], builtins::import),
    ("print", &["message"], builtins::print),
    ("send", &["message"], builtins::send),
    ("error", &["detail"], builtins::error),
    ("getExternalFunction", &["name"], builtins::get_external_function),
    ("Number.parse", &["string"], builtins::number_parse),
    ("Number.PI", &[], builtins::number_pi),
    ("Number.random", &[], builtins::number_random),
    ("String.combine", &["strings"], builtins::string_combine),
    ("Object.newType", &["name", "inherits", "layout"], builtins::new_type),
    ("Object.instantiate", &["type"], builtins::instantiate),
    ("Object.freezeGC", &[], builtins::freeze_gc),
    ("Object.thawGC", &[], builtins::thaw_gc),
    ("Object.garbageCollect", &[], builtins::garbage_collect),
    ("JSON.encode", &["value"], builtins::json_encode),
    ("JSON.decode", &["string"], builtins::json_decode),
];

/// Native id of the first query native.
pub(crate) const QUERY_BASE: u32 = CORE.len() as u32;

fn query_native(query: Query) -> (&'static [&'static str], BuiltinFn) {
    match query {
        Query::Atan2 => (&["base", "y"], builtins::atan2),
        Query::Search => (&["base", "key"], string::search),
        Query::SearchAll => (&["base", "key"], string::search_all),
        Query::Contains => (&["base", "key"], string::contains),
        Query::Replace => (&["base", "key", "with", "keys"], string::replace),
        Query::Count => (&["base", "key"], string::count),
        Query::CharCodeAt => (&["base", "index"], string::char_code_at),
        Query::CharAt => (&["base", "index"], string::char_at),
        Query::SetCharCodeAt => (&["base", "index", "value"], string::set_char_code_at),
        Query::SetCharAt => (&["base", "index", "value"], string::set_char_at),
        Query::RemoveChar => (&["base", "index"], string::remove_char),
        Query::Split => (&["base", "token"], string::split),
        Query::Format => (&["base", "items"], string::format),
        Query::Push => (&["base", "value"], object::push),
        Query::Insert => (&["base", "at", "value"], object::insert),
        Query::Remove => (&["base", "key"], object::remove),
        Query::SetAttributes => (&["base", "attributes"], object::set_attributes),
        Query::Sort => (&["base", "comparator"], object::sort),
        Query::Subset => (&["base", "from", "to"], object::subset),
        Query::Filter => (&["base", "by"], object::filter),
        Query::FindIndex => (&["base", "value"], object::find_index),
        Query::IsA => (&["base", "type"], builtins::isa),
        Query::Map => (&["base", "to"], object::map),
        Query::Reduce => (&["base", "to"], object::reduce),
        Query::Any => (&["base", "condition"], object::any),
        Query::All => (&["base", "condition"], object::all),
        Query::Foreach => (&["base", "do"], object::foreach),
        Query::SetSize => (&["base", "size"], object::set_size),
        Query::SetIsInterface => (&["base", "enabled", "private"], object::set_is_interface),
        _ => (&["base"], builtins::noop),
    }
}

pub(crate) fn install(vm: &mut Vm) {
    for (name, arg_names, body) in CORE {
        let body: NativeFn = Rc::new(*body);
        vm.register_native(name, arg_names, body);
    }
    for query in Query::PARAMETERIZED {
        let (arg_names, body) = query_native(query);
        let body: NativeFn = Rc::new(body);
        vm.register_native(query.name(), arg_names, body);
    }
}

#[inline]
fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn object_arg(args: &[Value], index: usize, what: &str) -> Result<ObjectRef> {
    match args.get(index) {
        Some(Value::Object(obj)) => Ok(obj.clone()),
        Some(other) => bail!("{} must be an Object, got {}", what, other.kind_name()),
        None => bail!("{} must be an Object, got Empty", what),
    }
}

fn string_arg(args: &[Value], index: usize, what: &str) -> Result<Rc<str>> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => bail!("{} must be a String, got {}", what, other.kind_name()),
        None => bail!("{} must be a String, got Empty", what),
    }
}

/// Non-negative integral index argument.
fn index_arg(args: &[Value], index: usize, what: &str) -> Result<usize> {
    match args.get(index) {
        Some(Value::Number(n)) if *n >= 0.0 && n.is_finite() => Ok(*n as usize),
        Some(Value::Number(n)) => bail!("{} must be a non-negative index, got {}", what, n),
        Some(other) => bail!("{} must be a Number, got {}", what, other.kind_name()),
        None => bail!("{} must be a Number, got Empty", what),
    }
}
