use std::rc::Rc;

use anyhow::{Result, bail};

use crate::val::Value;
use crate::vm::Vm;

use super::{arg, index_arg, object_arg, string_arg};

fn base(args: &[Value]) -> Result<Rc<str>> {
    string_arg(args, 0, "base")
}

/// Char offset of a byte offset inside `s`.
fn char_offset(s: &str, byte: usize) -> usize {
    s[..byte].chars().count()
}

fn needle(vm: &mut Vm, args: &[Value], index: usize) -> Result<Rc<str>> {
    let key = vm.as_string(&arg(args, index))?;
    if key.is_empty() {
        bail!("search key must not be empty");
    }
    Ok(key)
}

pub(super) fn search(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let s = base(args)?;
    let key = needle(vm, args, 1)?;
    let found = s.find(key.as_ref()).map(|byte| char_offset(&s, byte) as f64);
    Ok(Value::Number(found.unwrap_or(-1.0)))
}

pub(super) fn search_all(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let s = base(args)?;
    let key = needle(vm, args, 1)?;
    let hits = s
        .match_indices(key.as_ref())
        .map(|(byte, _)| Value::Number(char_offset(&s, byte) as f64))
        .collect();
    Ok(vm.new_index_object(hits))
}

pub(super) fn contains(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let s = base(args)?;
    let key = vm.as_string(&arg(args, 1))?;
    Ok(Value::Boolean(s.contains(key.as_ref())))
}

pub(super) fn replace(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let s = base(args)?;
    let with = vm.as_string(&arg(args, 2))?;
    let mut targets: Vec<Rc<str>> = Vec::new();
    match arg(args, 1) {
        Value::Empty => {}
        key => targets.push(vm.as_string(&key)?),
    }
    if let Value::Object(keys) = arg(args, 3) {
        for key in vm.object_values(&keys)? {
            targets.push(vm.as_string(&key)?);
        }
    }
    if targets.is_empty() {
        bail!("replace requires 'key' or 'keys'");
    }
    let mut out = s.to_string();
    for target in targets.iter().filter(|t| !t.is_empty()) {
        out = out.replace(target.as_ref(), &with);
    }
    Ok(Value::from(out))
}

pub(super) fn count(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let s = base(args)?;
    let key = needle(vm, args, 1)?;
    Ok(Value::Number(s.matches(key.as_ref()).count() as f64))
}

fn char_at_index(s: &str, index: usize) -> Result<char> {
    match s.chars().nth(index) {
        Some(c) => Ok(c),
        None => bail!("index {} is out of range for a string of length {}", index, s.chars().count()),
    }
}

pub(super) fn char_code_at(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let s = base(args)?;
    let c = char_at_index(&s, index_arg(args, 1, "index")?)?;
    Ok(Value::Number(c as u32 as f64))
}

pub(super) fn char_at(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let s = base(args)?;
    let c = char_at_index(&s, index_arg(args, 1, "index")?)?;
    Ok(Value::from(c.to_string()))
}

/// New string with the char at `index` replaced by `with` (or removed when `None`).
fn splice(s: &str, index: usize, with: Option<&str>) -> Result<String> {
    char_at_index(s, index)?;
    let mut out = String::with_capacity(s.len());
    for (i, c) in s.chars().enumerate() {
        if i == index {
            if let Some(with) = with {
                out.push_str(with);
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

pub(super) fn set_char_code_at(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let s = base(args)?;
    let index = index_arg(args, 1, "index")?;
    let code = vm.as_number(&arg(args, 2))?;
    let Some(c) = char::from_u32(code as u32) else {
        bail!("{} is not a valid character code", code);
    };
    Ok(Value::from(splice(&s, index, Some(c.encode_utf8(&mut [0; 4])))?))
}

pub(super) fn set_char_at(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let s = base(args)?;
    let index = index_arg(args, 1, "index")?;
    let with = vm.as_string(&arg(args, 2))?;
    Ok(Value::from(splice(&s, index, Some(&with))?))
}

pub(super) fn remove_char(_vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let s = base(args)?;
    let index = index_arg(args, 1, "index")?;
    Ok(Value::from(splice(&s, index, None)?))
}

pub(super) fn split(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let s = base(args)?;
    let token = vm.as_string(&arg(args, 1))?;
    let pieces: Vec<Value> = if token.is_empty() {
        s.chars().map(|c| Value::from(c.to_string())).collect()
    } else {
        s.split(token.as_ref()).map(Value::from).collect()
    };
    Ok(vm.new_index_object(pieces))
}

/// Substitute `$0`, `$1`, ... with the string forms of `items`.
pub(super) fn format(vm: &mut Vm, args: &[Value]) -> Result<Value> {
    let s = base(args)?;
    let items = object_arg(args, 1, "items")?;
    let values = items.borrow().indices().to_vec();
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' || !chars.peek().is_some_and(char::is_ascii_digit) {
            out.push(c);
            continue;
        }
        let mut digits = String::new();
        while let Some(d) = chars.next_if(char::is_ascii_digit) {
            digits.push(d);
        }
        let index: usize = digits.parse()?;
        match values.get(index) {
            Some(value) => out.push_str(&vm.as_string(value)?),
            None => bail!("format item ${} was not supplied", index),
        }
    }
    Ok(Value::from(out))
}
