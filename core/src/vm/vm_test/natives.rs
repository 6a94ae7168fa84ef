use super::*;

/// `base->query(args...)` evaluated from Rust.
fn q(vm: &mut Vm, base: &Value, query: Query, args: &[(&str, Value)]) -> Value {
    let bound = vm.query(base, query as u32).unwrap();
    call(vm, &bound, args)
}

fn q_err(vm: &mut Vm, base: &Value, query: Query, args: &[(&str, Value)]) -> String {
    let bound = vm.query(base, query as u32).unwrap();
    unhandled(vm.call_function(&bound, args)).summary
}

fn list(vm: &mut Vm, values: &[Value]) -> Value {
    vm.new_index_object(values.to_vec())
}

fn s(text: &str) -> Value {
    Value::from(text)
}

fn n(value: f64) -> Value {
    Value::Number(value)
}

#[test]
fn external_function_is_retrievable_once() {
    let mut vm = new_vm();
    vm.set_external_function("double", &["value"], |vm, args| {
        let v = vm.as_number(&args[0])?;
        Ok(Value::Number(v * 2.0))
    });
    // getExternalFunction("double")(21)
    let main = StubBuilder::new(0)
        .ext(native::GET_EXTERNAL)
        .string("")
        .string("double")
        .call(1)
        .string("")
        .num(21.0)
        .call(1)
        .ret()
        .build();
    assert_eq!(run(&mut vm, vec![main.clone()]).unwrap(), n(42.0));

    let err = unhandled(run(&mut vm, vec![main]));
    assert_eq!(err.summary, "unable to find external function 'double'");
}

#[test]
fn print_writes_string_forms_to_the_host() {
    let (mut vm, output) = vm_with_output();
    let main = StubBuilder::new(0)
        .ext(native::PRINT)
        .string("")
        .string("hello")
        .call(1)
        .pop()
        .ext(native::PRINT)
        .string("message")
        .num(3.0)
        .call(1)
        .pop()
        .ext(native::PRINT)
        .string("")
        .boolean(false)
        .call(1)
        .ret()
        .build();
    assert_eq!(run(&mut vm, vec![main]).unwrap(), Value::Empty);
    assert_eq!(output.borrow().as_slice(), ["hello", "3", "false"]);
}

#[test]
fn imports_run_once_and_are_cached() {
    let mut host = BufferHost::new();
    let output = host.output.clone();
    let lib = StubBuilder::new(0)
        .ext(native::PRINT)
        .string("")
        .string("loading lib")
        .call(1)
        .pop()
        .string("answer")
        .num(42.0)
        .op(Opcode::Cas, 1.0)
        .ret()
        .build();
    host.modules.insert("lib".to_string(), crate::testutil::module(vec![lib]));
    let mut vm = Vm::new(VmConfig::default(), Box::new(host));

    // a := import("lib"); b := import("lib"); return [a == b, a.answer]
    let import = |b: StubBuilder| b.ext(native::IMPORT).string("").string("lib").call(1);
    let main = import(StubBuilder::new(0));
    let main = import(main)
        .oper(Operator::Eq)
        .ext(native::IMPORT)
        .string("module")
        .string("lib")
        .call(1)
        .string("answer")
        .get_dot()
        .op(Opcode::Caa, 2.0)
        .ret()
        .build();
    let out = run(&mut vm, vec![main]).unwrap();
    assert_eq!(indices(&out), vec![Value::Boolean(true), n(42.0)]);
    assert_eq!(output.borrow().as_slice(), ["loading lib"]);
}

#[test]
fn missing_import_is_catchable() {
    let main = StubBuilder::new(0)
        .ext(native::IMPORT)
        .string("")
        .string("nope")
        .call(1)
        .ret()
        .build();
    let err = unhandled(run_fresh(vec![main]));
    assert_eq!(err.summary, "could not import module 'nope': no module named 'nope'");
}

#[test]
fn number_and_string_helpers() {
    let mut vm = new_vm();
    let parse = vm.native_value(native::NUMBER_PARSE).unwrap();
    assert_eq!(call(&mut vm, &parse, &[("", s(" 2.5 "))]), n(2.5));
    let err = unhandled(vm.call_function(&parse, &[("string", s("abc"))]));
    assert_eq!(err.summary, "'abc' is not a valid Number");

    let combine = vm.native_value(native::STRING_COMBINE).unwrap();
    let parts = list(&mut vm, &[s("a"), n(1.0), Value::Boolean(true)]);
    assert_eq!(call(&mut vm, &combine, &[("", parts)]), s("a1true"));

    let pi = vm.native_value(7).unwrap();
    assert_eq!(call(&mut vm, &pi, &[]), n(std::f64::consts::PI));
    let random = vm.native_value(8).unwrap();
    for _ in 0..16 {
        let r = as_num(&call(&mut vm, &random, &[]));
        assert!((0.0..1.0).contains(&r));
    }
    for gc in 12..=14 {
        let hook = vm.native_value(gc).unwrap();
        assert_eq!(call(&mut vm, &hook, &[]), Value::Empty);
    }
}

#[test]
fn json_encode_arrays_maps_and_scalars() {
    let mut vm = new_vm();
    let encode = vm.native_value(native::JSON_ENCODE).unwrap();

    let arr = list(&mut vm, &[n(1.0), s("a"), Value::Boolean(true), Value::Empty, n(0.5)]);
    assert_eq!(call(&mut vm, &encode, &[("", arr)]), s(r#"[1,"a",true,null,0.5]"#));

    let inner = vm.new_object();
    inner.borrow_mut().set_str("x", n(2.5));
    let obj = vm.new_object();
    obj.borrow_mut().set_str("b", n(1.0));
    obj.borrow_mut().set_str("a", Value::Object(inner));
    obj.borrow_mut().push(s("zero"));
    assert_eq!(
        call(&mut vm, &encode, &[("", Value::Object(obj))]),
        s(r#"{"b":1,"a":{"x":2.5},"0":"zero"}"#)
    );

    let empty = Value::Object(vm.new_object());
    assert_eq!(call(&mut vm, &encode, &[("", empty)]), s("[]"));
    let number = Value::Type(vm.builtin_type(BuiltinType::Number));
    assert_eq!(call(&mut vm, &encode, &[("", number)]), s(r#""Number""#));
}

#[test]
fn json_encode_rejects_cycles() {
    let mut vm = new_vm();
    let encode = vm.native_value(native::JSON_ENCODE).unwrap();
    let obj = vm.new_object();
    obj.borrow_mut().push(Value::Object(obj.clone()));
    let err = unhandled(vm.call_function(&encode, &[("value", Value::Object(obj.clone()))]));
    assert_eq!(err.summary, "cannot encode a cyclic object as JSON");
    obj.borrow_mut().indices_mut().clear();
}

#[test]
fn json_decode_builds_objects() {
    let mut vm = new_vm();
    let decode = vm.native_value(native::JSON_DECODE).unwrap();
    let out = call(&mut vm, &decode, &[("", s(r#"{"name":"mat","list":[1,2,null],"ok":false}"#))]);
    let Value::Object(obj) = &out else {
        panic!("expected an object");
    };
    assert_eq!(obj.borrow().get_str("name"), Some(s("mat")));
    assert_eq!(obj.borrow().get_str("ok"), Some(Value::Boolean(false)));
    let list = obj.borrow().get_str("list").unwrap();
    assert_eq!(indices(&list), vec![n(1.0), n(2.0), Value::Empty]);
    let keys = vm.query(&out, Query::Keys as u32).unwrap();
    assert_eq!(indices(&keys), vec![s("name"), s("list"), s("ok")]);

    let err = unhandled(vm.call_function(&decode, &[("string", s("{oops"))]));
    assert!(err.summary.starts_with("invalid JSON"), "{}", err.summary);
}

#[test]
fn string_search_queries() {
    let mut vm = new_vm();
    let text = s("hello world");
    assert_eq!(q(&mut vm, &text, Query::Search, &[("", s("o"))]), n(4.0));
    assert_eq!(q(&mut vm, &text, Query::Search, &[("key", s("z"))]), n(-1.0));
    assert_eq!(q(&mut vm, &text, Query::Contains, &[("", s("lo w"))]), Value::Boolean(true));

    let banana = s("banana");
    let hits = q(&mut vm, &banana, Query::SearchAll, &[("", s("an"))]);
    assert_eq!(numbers(&hits), vec![1.0, 3.0]);
    assert_eq!(q(&mut vm, &banana, Query::Count, &[("", s("a"))]), n(3.0));
    assert_eq!(
        q_err(&mut vm, &banana, Query::Count, &[("", s(""))]),
        "search key must not be empty"
    );
}

#[test]
fn string_edit_queries() {
    let mut vm = new_vm();
    let dashed = s("a-b-c");
    assert_eq!(
        q(&mut vm, &dashed, Query::Replace, &[("key", s("-")), ("with", s("+"))]),
        s("a+b+c")
    );
    let keys = list(&mut vm, &[s("a"), s("b")]);
    assert_eq!(
        q(&mut vm, &dashed, Query::Replace, &[("keys", keys), ("with", s(""))]),
        s("--c")
    );

    let accented = s("héllo");
    assert_eq!(q(&mut vm, &accented, Query::CharAt, &[("", n(1.0))]), s("é"));
    assert_eq!(q(&mut vm, &s("A"), Query::CharCodeAt, &[("", n(0.0))]), n(65.0));
    assert_eq!(
        q(&mut vm, &s("cat"), Query::SetCharAt, &[("index", n(0.0)), ("value", s("b"))]),
        s("bat")
    );
    assert_eq!(
        q(&mut vm, &s("cat"), Query::SetCharCodeAt, &[("index", n(0.0)), ("value", n(104.0))]),
        s("hat")
    );
    assert_eq!(q(&mut vm, &s("cart"), Query::RemoveChar, &[("", n(2.0))]), s("cat"));
    assert_eq!(
        q_err(&mut vm, &s("abc"), Query::CharAt, &[("", n(5.0))]),
        "index 5 is out of range for a string of length 3"
    );
}

#[test]
fn string_split_format_and_immediates() {
    let mut vm = new_vm();
    let parts = q(&mut vm, &s("a,b,c"), Query::Split, &[("", s(","))]);
    assert_eq!(indices(&parts), vec![s("a"), s("b"), s("c")]);
    let chars = q(&mut vm, &s("ab"), Query::Split, &[("", s(""))]);
    assert_eq!(indices(&chars), vec![s("a"), s("b")]);

    let items = list(&mut vm, &[n(1.0), n(2.0), n(3.0)]);
    let template = s("$0 + $1 = $2, costs $");
    assert_eq!(
        q(&mut vm, &template, Query::Format, &[("", items.clone())]),
        s("1 + 2 = 3, costs $")
    );
    assert_eq!(
        q_err(&mut vm, &s("$3"), Query::Format, &[("items", items)]),
        "format item $3 was not supplied"
    );

    assert_eq!(vm.query(&s("abc"), Query::ToUpper as u32).unwrap(), s("ABC"));
    assert_eq!(vm.query(&s("  x "), Query::Trim as u32).unwrap(), s("x"));
    assert_eq!(vm.query(&s("héllo"), Query::Length as u32).unwrap(), n(5.0));
    assert_eq!(
        q(&mut vm, &s("hello"), Query::Subset, &[("from", n(1.0)), ("to", n(3.0))]),
        s("ell")
    );
}

#[test]
fn numeric_queries() {
    let mut vm = new_vm();
    assert_eq!(vm.query(&n(-2.5), Query::Abs as u32).unwrap(), n(2.5));
    assert_eq!(vm.query(&n(2.5), Query::Floor as u32).unwrap(), n(2.0));
    assert_eq!(vm.query(&n(f64::NAN), Query::IsNaN as u32).unwrap(), Value::Boolean(true));
    assert_eq!(q(&mut vm, &n(1.0), Query::Atan2, &[("", n(0.0))]), n(0.0));
    assert!(vm.query(&s("x"), Query::Sqrt as u32).is_err());
}

#[test]
fn sort_is_stable_and_uses_the_comparator() {
    let mut vm = new_vm();
    let by_len = native_fn(&mut vm, "byLength", &["a", "b"], |vm, args| {
        let a = vm.as_string(&args[0])?.chars().count() as f64;
        let b = vm.as_string(&args[1])?.chars().count() as f64;
        Ok(Value::Number(a - b))
    });
    let words = list(&mut vm, &[s("bb"), s("a"), s("cc"), s("d"), s("")]);
    let sorted = q(&mut vm, &words, Query::Sort, &[("", by_len.clone())]);
    assert_eq!(sorted, words);
    assert_eq!(indices(&words), vec![s(""), s("a"), s("d"), s("bb"), s("cc")]);

    let not_fn = q_err(&mut vm, &words, Query::Sort, &[("", n(1.0))]);
    assert_eq!(not_fn, "comparator must be a function, got Number");
}

#[test]
fn sort_propagates_comparator_errors() {
    let mut vm = new_vm();
    let failing = native_fn(&mut vm, "failing", &["a", "b"], |_vm, _args| anyhow::bail!("no order"));
    let values = list(&mut vm, &[n(2.0), n(1.0)]);
    assert_eq!(q_err(&mut vm, &values, Query::Sort, &[("", failing)]), "no order");
    assert_eq!(numbers(&values), vec![2.0, 1.0]);
}

#[test]
fn map_filter_reduce() {
    let mut vm = new_vm();
    let values = list(&mut vm, &[n(1.0), n(2.0), n(3.0), n(4.0)]);

    let double = native_fn(&mut vm, "double", &["value"], |vm, args| {
        Ok(Value::Number(vm.as_number(&args[0])? * 2.0))
    });
    let doubled = q(&mut vm, &values, Query::Map, &[("", double)]);
    assert_eq!(numbers(&doubled), vec![2.0, 4.0, 6.0, 8.0]);

    let even = native_fn(&mut vm, "even", &["value"], |vm, args| {
        Ok(Value::Boolean(vm.as_number(&args[0])? % 2.0 == 0.0))
    });
    let evens = q(&mut vm, &values, Query::Filter, &[("", even.clone())]);
    assert_eq!(numbers(&evens), vec![2.0, 4.0]);

    let sum = native_fn(&mut vm, "sum", &["previous", "value"], |vm, args| {
        let value = vm.as_number(&args[1])?;
        match &args[0] {
            Value::Empty => Ok(Value::Number(value)),
            previous => Ok(Value::Number(vm.as_number(previous)? + value)),
        }
    });
    assert_eq!(q(&mut vm, &values, Query::Reduce, &[("", sum.clone())]), n(10.0));
    let nothing = list(&mut vm, &[]);
    assert_eq!(q(&mut vm, &nothing, Query::Reduce, &[("", sum)]), Value::Empty);

    assert_eq!(q(&mut vm, &values, Query::Any, &[("", even.clone())]), Value::Boolean(true));
    assert_eq!(q(&mut vm, &values, Query::All, &[("", even.clone())]), Value::Boolean(false));
    assert_eq!(q(&mut vm, &nothing, Query::Any, &[("", even.clone())]), Value::Boolean(false));
    assert_eq!(q(&mut vm, &nothing, Query::All, &[("", even)]), Value::Boolean(true));
}

#[test]
fn index_editing_queries() {
    let mut vm = new_vm();
    let values = list(&mut vm, &[s("a"), s("c")]);

    q(&mut vm, &values, Query::Insert, &[("at", n(1.0)), ("value", s("b"))]);
    q(&mut vm, &values, Query::Push, &[("", s("d"))]);
    assert_eq!(indices(&values), vec![s("a"), s("b"), s("c"), s("d")]);
    assert_eq!(q(&mut vm, &values, Query::FindIndex, &[("", s("c"))]), n(2.0));
    assert_eq!(q(&mut vm, &values, Query::FindIndex, &[("", s("z"))]), n(-1.0));

    assert_eq!(q(&mut vm, &values, Query::Remove, &[("", n(0.0))]), s("a"));
    assert_eq!(indices(&values), vec![s("b"), s("c"), s("d")]);
    assert_eq!(vm.query(&values, Query::Pop as u32).unwrap(), s("d"));

    let slice = q(&mut vm, &values, Query::Subset, &[("from", n(0.0)), ("to", n(1.0))]);
    assert_eq!(indices(&slice), vec![s("b"), s("c")]);
    assert_eq!(
        q_err(&mut vm, &values, Query::Subset, &[("from", n(1.0)), ("to", n(0.0))]),
        "subset range 1..0 is reversed"
    );
    assert_eq!(
        q_err(&mut vm, &values, Query::Insert, &[("at", n(9.0)), ("value", s("x"))]),
        "insert position 9 is past the end (2)"
    );

    q(&mut vm, &values, Query::SetSize, &[("", n(4.0))]);
    assert_eq!(indices(&values), vec![s("b"), s("c"), Value::Empty, Value::Empty]);
    q(&mut vm, &values, Query::SetSize, &[("", n(1.0))]);
    assert_eq!(indices(&values), vec![s("b")]);
    assert!(q_err(&mut vm, &values, Query::SetSize, &[("", n(1e18))]).starts_with("Invalid index"));
    assert!(q_err(&mut vm, &values, Query::SetSize, &[("", n(f64::INFINITY))]).contains("non-negative index"));
    assert_eq!(indices(&values), vec![s("b")]);
}

#[test]
fn keyed_removal_attributes_and_foreach() {
    let mut vm = new_vm();
    let obj = vm.new_object();
    obj.borrow_mut().set_str("x", n(1.0));
    obj.borrow_mut().set_str("y", n(2.0));
    let target = Value::Object(obj.clone());

    assert_eq!(q(&mut vm, &target, Query::Remove, &[("", s("x"))]), n(1.0));
    assert_eq!(q(&mut vm, &target, Query::Remove, &[("", s("missing"))]), Value::Empty);
    assert_eq!(vm.query(&target, Query::KeyCount as u32).unwrap(), n(1.0));

    let attrs = Value::Object(vm.new_object());
    q(&mut vm, &target, Query::SetAttributes, &[("", attrs.clone())]);
    assert_eq!(vm.query(&target, Query::Attributes as u32).unwrap(), attrs);
    q(&mut vm, &target, Query::SetAttributes, &[("", Value::Empty)]);
    assert_eq!(vm.query(&target, Query::Attributes as u32).unwrap(), Value::Empty);

    let seen = vm.new_object();
    let sink = Value::Object(seen.clone());
    let record = native_fn(&mut vm, "record", &["key", "value"], move |_vm, args| {
        if let Value::Object(seen) = &sink {
            let mut seen = seen.borrow_mut();
            seen.push(args[0].clone());
            seen.push(args[1].clone());
        }
        Ok(Value::Empty)
    });
    obj.borrow_mut().push(s("first"));
    q(&mut vm, &target, Query::Foreach, &[("", record)]);
    assert_eq!(seen.borrow().indices(), &[s("y"), n(2.0), n(0.0), s("first")]);
}

#[test]
fn object_queries_reject_function_bases() {
    let mut vm = new_vm();
    let func = vm.native_value(0).unwrap();
    assert_eq!(q_err(&mut vm, &func, Query::Push, &[("", n(1.0))]), "Functions have no members");
    assert_eq!(
        q_err(&mut vm, &n(1.0), Query::Push, &[("", n(1.0))]),
        "base must be an Object, got Number"
    );
}
