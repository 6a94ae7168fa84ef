use super::*;

#[test]
fn recursive_factorial_through_captured_local() {
    // fact := fn(n) { if n <= 1 { return 1 } return n * fact(n - 1) }; fact(5)
    let main = StubBuilder::new(0)
        .locals(&["fact"])
        .closure(1)
        .store(0)
        .pop()
        .load(0)
        .string("")
        .num(5.0)
        .call(1)
        .ret()
        .build();
    let fact = StubBuilder::new(1)
        .args(&["n"])
        .capture(0, 0)
        .load(0)
        .num(1.0)
        .oper(Operator::Le)
        .op(Opcode::Skf, 2.0)
        .num(1.0)
        .ret()
        .load(0)
        .load(1)
        .string("")
        .load(0)
        .num(1.0)
        .oper(Operator::Sub)
        .call(1)
        .oper(Operator::Mul)
        .ret()
        .build();
    assert_eq!(run_fresh(vec![main, fact]).unwrap(), Value::Number(120.0));
}

/// `maker` assigns `x := 1`, then returns `[g, h]`: `g(value)` writes `x`, `h()` reads it.
fn closure_pair_stubs() -> Vec<Stub> {
    let main = StubBuilder::new(0)
        .locals(&["pair"])
        .closure(1)
        .call(0)
        .store(0)
        .pop()
        // pair[0](value: 7)
        .load(0)
        .num(0.0)
        .get_index()
        .string("value")
        .num(7.0)
        .call(1)
        .pop()
        // return pair[1]()
        .load(0)
        .num(1.0)
        .get_index()
        .call(0)
        .ret()
        .build();
    let maker = StubBuilder::new(1)
        .locals(&["x"])
        .num(1.0)
        .store(0)
        .pop()
        .closure(2)
        .closure(3)
        .op(Opcode::Caa, 2.0)
        .ret()
        .build();
    let g = StubBuilder::new(2)
        .args(&["value"])
        .capture(1, 0)
        .load(0)
        .store(1)
        .ret()
        .build();
    let h = StubBuilder::new(3).capture(1, 0).load(0).ret().build();
    vec![main, maker, g, h]
}

#[test]
fn closures_share_captured_slot_after_creator_returns() {
    assert_eq!(run_fresh(closure_pair_stubs()).unwrap(), Value::Number(7.0));
}

#[test]
fn unnamed_argument_binds_to_single_parameter() {
    let main = StubBuilder::new(0)
        .closure(1)
        .string("")
        .num(4.0)
        .call(1)
        .ret()
        .build();
    let square = StubBuilder::new(1)
        .args(&["n"])
        .load(0)
        .load(0)
        .oper(Operator::Mul)
        .ret()
        .build();
    assert_eq!(run_fresh(vec![main, square]).unwrap(), Value::Number(16.0));
}

#[test]
fn missing_arguments_are_empty() {
    let main = StubBuilder::new(0).closure(1).call(0).ret().build();
    let reader = StubBuilder::new(1)
        .args(&["a", "b"])
        .load(1)
        .empty()
        .oper(Operator::Eq)
        .ret()
        .build();
    assert_eq!(run_fresh(vec![main, reader]).unwrap(), Value::Boolean(true));
}

#[test]
fn unknown_argument_name_lists_legal_names() {
    let main = StubBuilder::new(0)
        .closure(1)
        .string("c")
        .num(1.0)
        .call(1)
        .ret()
        .build();
    let two = StubBuilder::new(1).args(&["a", "b"]).load(0).ret().build();
    let err = unhandled(run_fresh(vec![main, two]));
    assert_eq!(err.summary, "Could not bind argument 'c'. Legal parameter names: [a, b]");
    assert_eq!(err.line, 4);
}

#[test]
fn ambiguous_unnamed_argument_is_rejected() {
    let main = StubBuilder::new(0)
        .closure(1)
        .string("")
        .num(1.0)
        .call(1)
        .ret()
        .build();
    let two = StubBuilder::new(1).args(&["a", "b"]).load(0).ret().build();
    let err = unhandled(run_fresh(vec![main, two]));
    assert!(err.summary.starts_with("Could not bind unnamed argument"), "{}", err.summary);
}

#[test]
fn duplicate_argument_is_rejected() {
    let main = StubBuilder::new(0)
        .closure(1)
        .string("a")
        .num(1.0)
        .string("a")
        .num(2.0)
        .call(2)
        .ret()
        .build();
    let one = StubBuilder::new(1).args(&["a"]).load(0).ret().build();
    assert!(unhandled(run_fresh(vec![main, one])).summary.contains("'a'"));
}

#[test]
fn vararg_collects_arguments_into_one_object() {
    let main = StubBuilder::new(0)
        .closure(1)
        .string("")
        .num(10.0)
        .string("")
        .num(20.0)
        .string("tag")
        .string("t")
        .call(3)
        .ret()
        .build();
    // return args.length + args[1] + ... as a string with the tag
    let collect = StubBuilder::new(1)
        .args(&["args"])
        .vararg()
        .load(0)
        .query(Query::Length)
        .load(0)
        .num(1.0)
        .get_index()
        .oper(Operator::Add)
        .load(0)
        .string("tag")
        .get_dot()
        .oper(Operator::Add)
        .ret()
        .build();
    // Number + String converts the right side, so this must fail on "t".
    let err = unhandled(run_fresh(vec![main.clone(), collect]));
    assert_eq!(err.summary, "Cannot convert String to Number");

    let collect = StubBuilder::new(1)
        .args(&["args"])
        .vararg()
        .load(0)
        .string("tag")
        .get_dot()
        .load(0)
        .query(Query::Length)
        .oper(Operator::Add)
        .load(0)
        .num(1.0)
        .get_index()
        .oper(Operator::Add)
        .ret()
        .build();
    assert_eq!(run_fresh(vec![main, collect]).unwrap(), Value::from("t220"));
}

#[test]
fn typed_closure_checks_arguments_and_return() {
    // fn(n: Number) -> String { return n }
    let typed = |arg: f64| {
        StubBuilder::new(0)
            .builtin(BuiltinType::Number)
            .builtin(BuiltinType::String)
            .typed_closure(1)
            .string("n")
            .num(arg)
            .call(1)
            .ret()
            .build()
    };
    let body = StubBuilder::new(1).args(&["n"]).load(0).ret().build();
    let err = unhandled(run_fresh(vec![typed(3.0), body.clone()]));
    assert_eq!(err.summary, "Return value of type Number does not satisfy String");

    let wrong_arg = StubBuilder::new(0)
        .builtin(BuiltinType::Number)
        .builtin(BuiltinType::Any)
        .typed_closure(1)
        .string("n")
        .string("three")
        .call(1)
        .ret()
        .build();
    let err = unhandled(run_fresh(vec![wrong_arg, body.clone()]));
    assert_eq!(err.summary, "Argument 'n' of type String does not satisfy Number");

    let ok = StubBuilder::new(0)
        .builtin(BuiltinType::Number)
        .builtin(BuiltinType::Number)
        .typed_closure(1)
        .string("n")
        .num(3.0)
        .call(1)
        .ret()
        .build();
    assert_eq!(run_fresh(vec![ok, body]).unwrap(), Value::Number(3.0));
}

#[test]
fn calling_a_type_converts() {
    let main = StubBuilder::new(0)
        .builtin(BuiltinType::String)
        .string("")
        .num(42.0)
        .call(1)
        .ret()
        .build();
    assert_eq!(run_fresh(vec![main]).unwrap(), Value::from("42"));

    let main = StubBuilder::new(0)
        .builtin(BuiltinType::Number)
        .string("from")
        .boolean(true)
        .call(1)
        .ret()
        .build();
    assert_eq!(run_fresh(vec![main]).unwrap(), Value::Number(1.0));
}

#[test]
fn calling_a_non_function_raises() {
    let main = StubBuilder::new(0).num(1.0).call(0).ret().build();
    assert_eq!(unhandled(run_fresh(vec![main])).summary, "Number value is not callable");

    let main = StubBuilder::new(0).op(Opcode::Nob, 0.0).call(0).ret().build();
    assert_eq!(unhandled(run_fresh(vec![main])).summary, "Object is not callable");
}

#[test]
fn call_depth_is_limited() {
    let config = VmConfig {
        max_call_depth: 8,
        ..VmConfig::default()
    };
    let mut vm = Vm::new(config, Box::new(BufferHost::new()));
    // loop := fn() { return loop() }
    let main = StubBuilder::new(0)
        .locals(&["loop"])
        .closure(1)
        .store(0)
        .call(0)
        .ret()
        .build();
    let body = StubBuilder::new(1).capture(0, 0).load(0).call(0).ret().build();
    let err = unhandled(run(&mut vm, vec![main, body]));
    assert_eq!(err.summary, "Call stack depth exceeded");
    assert_eq!(vm.depth(), 0);
    assert!(vm.pending().is_none());
}

#[test]
fn frames_grow_past_the_pool() {
    let config = VmConfig {
        frame_pool: 1,
        ..VmConfig::default()
    };
    let mut vm = Vm::new(config, Box::new(BufferHost::new()));
    // countdown := fn(n) { if n <= 0 { return 0 } return 1 + countdown(n - 1) }
    let main = StubBuilder::new(0)
        .locals(&["countdown"])
        .closure(1)
        .store(0)
        .string("")
        .num(40.0)
        .call(1)
        .ret()
        .build();
    let body = StubBuilder::new(1)
        .args(&["n"])
        .capture(0, 0)
        .load(0)
        .num(0.0)
        .oper(Operator::Le)
        .op(Opcode::Skf, 2.0)
        .num(0.0)
        .ret()
        .num(1.0)
        .load(1)
        .string("")
        .load(0)
        .num(1.0)
        .oper(Operator::Sub)
        .call(1)
        .oper(Operator::Add)
        .ret()
        .build();
    assert_eq!(run(&mut vm, vec![main, body]).unwrap(), Value::Number(40.0));
}

#[test]
fn host_can_call_returned_functions() {
    let mut vm = new_vm();
    let main = StubBuilder::new(0).closure(1).ret().build();
    let add = StubBuilder::new(1)
        .args(&["a", "b"])
        .load(0)
        .load(1)
        .oper(Operator::Add)
        .ret()
        .build();
    let func = run(&mut vm, vec![main, add]).unwrap();
    assert!(func.is_function());
    let out = call(&mut vm, &func, &[("b", Value::from(2.0)), ("a", Value::from(40.0))]);
    assert_eq!(out, Value::Number(42.0));
}

#[test]
fn compound_assignment_to_referrable() {
    let main = StubBuilder::new(0)
        .locals(&["x"])
        .num(5.0)
        .store(0)
        .pop()
        .num(3.0)
        .store_with(0, AssignOp::Mul)
        .pop()
        .num(1.0)
        .store_with(0, AssignOp::Sub)
        .ret()
        .build();
    assert_eq!(run_fresh(vec![main]).unwrap(), Value::Number(14.0));
}

#[test]
fn unresolvable_capture_is_fatal() {
    let main = StubBuilder::new(0).closure(1).ret().build();
    let orphan = StubBuilder::new(1).capture(7, 0).load(0).ret().build();
    let err = run_fresh(vec![main, orphan]).unwrap_err();
    assert!(err.is::<crate::vm::FatalError>(), "{:#}", err);
}

#[test]
fn capture_past_owner_referrables_is_fatal() {
    let main = StubBuilder::new(0).locals(&["x"]).closure(1).ret().build();
    let reader = StubBuilder::new(1).capture(0, 3).load(0).ret().build();
    let err = run_fresh(vec![main, reader]).unwrap_err();
    assert!(err.is::<crate::vm::FatalError>(), "{:#}", err);
    assert!(format!("{}", err).contains("has only 1 referrables"), "{}", err);
}
