use super::*;

/// `Object.newType(name: <name>, inherits: [<parents>...])` with parents read from locals.
fn new_type(b: StubBuilder, name: &str, parents: &[u32]) -> StubBuilder {
    let mut b = b.ext(native::NEW_TYPE).string("name").string(name);
    if !parents.is_empty() {
        b = b.string("inherits");
        for slot in parents {
            b = b.load(*slot);
        }
        b = b.op(Opcode::Caa, parents.len() as f64).call(2);
    } else {
        b = b.call(1);
    }
    b
}

#[test]
fn inherited_ancestry_is_transitive() {
    // X := newType("X"); A := newType("A", [X]); B := newType("B"); C := newType("C", [A, B])
    // c := instantiate(C); return [c->isa(X), c->isa(A), c->isa(B), c->isa(Number)]
    let mut b = StubBuilder::new(0).locals(&["X", "A", "B", "C", "c"]);
    b = new_type(b, "X", &[]).store(0).pop();
    b = new_type(b, "A", &[0]).store(1).pop();
    b = new_type(b, "B", &[]).store(2).pop();
    b = new_type(b, "C", &[1, 2]).store(3).pop();
    b = b.ext(native::INSTANTIATE).string("type").load(3).call(1).store(4).pop();
    for ty in [0, 1, 2] {
        b = b.load(4).query(Query::IsA).string("").load(ty).call(1);
    }
    b = b
        .load(4)
        .query(Query::IsA)
        .string("")
        .builtin(BuiltinType::Number)
        .call(1)
        .op(Opcode::Caa, 4.0)
        .ret();
    let out = run_fresh(vec![b.build()]).unwrap();
    assert_eq!(
        indices(&out),
        vec![
            Value::Boolean(true),
            Value::Boolean(true),
            Value::Boolean(true),
            Value::Boolean(false)
        ]
    );
}

#[test]
fn any_type_accepts_every_value_through_isa() {
    let mut vm = new_vm();
    let any = Value::Type(vm.builtin_type(BuiltinType::Any));
    let obj = Value::Object(vm.new_object());
    let values = [
        Value::Empty,
        Value::Boolean(true),
        Value::Number(2.0),
        Value::from("s"),
        obj,
        Value::Type(vm.builtin_type(BuiltinType::Type)),
    ];
    for value in values {
        let isa = vm.query(&value, Query::IsA as u32).unwrap();
        assert_eq!(call(&mut vm, &isa, &[("type", any.clone())]), Value::Boolean(true));
    }
}

#[test]
fn type_and_name_queries() {
    let mut vm = new_vm();
    let ty = vm.query(&Value::from("s"), Query::Type as u32).unwrap();
    let name = vm.query(&ty, Query::Name as u32).unwrap();
    assert_eq!(name, Value::from("String"));

    let func = vm.native_value(0).unwrap();
    let ty = vm.query(&func, Query::Type as u32).unwrap();
    assert_eq!(vm.query(&ty, Query::Name as u32).unwrap(), Value::from("Function"));

    assert!(vm.query(&Value::Number(1.0), Query::Name as u32).is_err());
}

#[test]
fn new_types_get_fresh_ids_and_default_names() {
    let mut vm = new_vm();
    let new_type = vm.native_value(native::NEW_TYPE).unwrap();
    let a = call(&mut vm, &new_type, &[]);
    let b = call(&mut vm, &new_type, &[("name", Value::from("B"))]);
    let (Value::Type(a), Value::Type(b)) = (a, b) else {
        panic!("newType should produce types");
    };
    assert_eq!(a.name(), "Unnamed");
    assert_eq!(b.name(), "B");
    assert!(a.id() >= 10 && b.id() > a.id());
}

#[test]
fn empty_inherits_list_raises() {
    let main = StubBuilder::new(0)
        .ext(native::NEW_TYPE)
        .string("inherits")
        .op(Opcode::Caa, 0.0)
        .call(1)
        .ret()
        .build();
    let err = unhandled(run_fresh(vec![main]));
    assert!(err.summary.contains("empty inherits list"), "{}", err.summary);
}

#[test]
fn builtin_types_cannot_be_instantiated_except_object() {
    let mut vm = new_vm();
    let instantiate = vm.native_value(native::INSTANTIATE).unwrap();
    let object = Value::Type(vm.builtin_type(BuiltinType::Object));
    let made = call(&mut vm, &instantiate, &[("type", object)]);
    assert!(matches!(made, Value::Object(_)));

    let number = Value::Type(vm.builtin_type(BuiltinType::Number));
    let err = vm.call_function(&instantiate, &[("type", number)]).unwrap_err();
    let err = err.downcast::<UnhandledError>().unwrap();
    assert_eq!(err.summary, "Cannot instantiate builtin type Number");
}

#[test]
fn conversion_to_user_type_passes_matching_values() {
    let mut vm = new_vm();
    let ty = vm.types.create("Thing", None, None).unwrap();
    let instantiate = vm.native_value(native::INSTANTIATE).unwrap();
    let thing = call(&mut vm, &instantiate, &[("type", Value::Type(ty.clone()))]);
    let same = vm.convert_to_type(&thing, &ty).unwrap();
    assert_eq!(same, thing);

    let plain = Value::Object(vm.new_object());
    assert!(vm.convert_to_type(&plain, &ty).is_err());
    let to_type = vm.convert_to_type(&Value::Number(1.0), &vm.builtin_type(BuiltinType::Type));
    assert_eq!(
        to_type.unwrap(),
        Value::Type(vm.builtin_type(BuiltinType::Number))
    );
}
