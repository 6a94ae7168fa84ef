use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use tracing::debug;

use crate::bytecode::{DYNAMIC_BINDING_TOKEN, Stub};
use crate::val::{FunctionFacet, TypeRef, Value, is_a};

use super::frame::{RestartCondition, Scope, Stackframe};
use super::{FatalError, Unwinding, Vm};

const NO_ARGS: &[(&str, Value)] = &[];

impl Vm {
    /// Call `func` with named arguments (`""` marks an unnamed argument).
    /// `private` is the interface binding handed to a `$` parameter.
    pub(crate) fn call_inner<N: AsRef<str>>(
        &mut self,
        func: &Value,
        args: &[(N, Value)],
        private: Option<Value>,
    ) -> Result<Value> {
        self.reentry += 1;
        let result = self.dispatch_call(func, args, private);
        self.reentry -= 1;
        result
    }

    #[inline]
    pub(crate) fn call_no_args(&mut self, func: &Value) -> Result<Value> {
        self.call_inner(func, NO_ARGS, None)
    }

    fn dispatch_call<N: AsRef<str>>(
        &mut self,
        func: &Value,
        args: &[(N, Value)],
        private: Option<Value>,
    ) -> Result<Value> {
        let obj = match func {
            Value::Type(ty) => return self.call_type(ty, args),
            Value::Object(obj) => obj,
            other => {
                return Err(self.raise_message(format!("{} value is not callable", other.kind_name())));
            }
        };
        let facet = obj.borrow().function().cloned();
        let Some(facet) = facet else {
            return Err(self.raise_message("Object is not callable"));
        };

        let slots = self.bind_arguments(&facet, args, private)?;
        if let Some(types) = &facet.types {
            self.check_argument_types(&facet.stub, types, &slots)?;
        }

        let result = if facet.stub.is_native() {
            self.call_native(&facet.stub, &slots)?
        } else {
            self.invoke(&facet, slots, None)?
        };

        if let Some(ret) = facet.types.as_ref().and_then(|types| types.get(facet.stub.arg_count())) {
            if !is_a(&result, ret) {
                let got = self.type_of(&result);
                return Err(self.raise_message(format!(
                    "Return value of type {} does not satisfy {}",
                    got.name(),
                    ret.name()
                )));
            }
        }
        Ok(result)
    }

    /// A Type called with one `from` (or unnamed) argument converts it.
    fn call_type<N: AsRef<str>>(&mut self, ty: &TypeRef, args: &[(N, Value)]) -> Result<Value> {
        match args {
            [(name, value)] if matches!(name.as_ref(), "" | "from") => self.convert_to_type(value, ty),
            _ => Err(self.raise_message(format!(
                "Type {} expects a single 'from' argument to convert",
                ty.name()
            ))),
        }
    }

    fn call_native(&mut self, stub: &Stub, slots: &[Value]) -> Result<Value> {
        let Some(body) = self.natives.get(stub.stub_id as usize).map(|n| n.body.clone()) else {
            return Err(FatalError::new(format!("native {} is not registered", stub.stub_id)).into());
        };
        match body(self, slots) {
            Ok(value) => Ok(value),
            Err(err) if err.is::<Unwinding>() || err.is::<FatalError>() => Err(err),
            Err(err) => Err(self.raise_message(format!("{:#}", err))),
        }
    }

    fn bind_arguments<N: AsRef<str>>(
        &mut self,
        facet: &FunctionFacet,
        args: &[(N, Value)],
        private: Option<Value>,
    ) -> Result<Vec<Value>> {
        let stub = &facet.stub;
        let mut slots = vec![Value::Empty; stub.arg_count()];

        if stub.is_vararg {
            let bag = self.new_object();
            {
                let mut obj = bag.borrow_mut();
                for (name, value) in args {
                    match name.as_ref() {
                        "" => obj.push(value.clone()),
                        name => obj.set_str(name, value.clone()),
                    }
                }
                if let Some(base) = &facet.bound_base {
                    obj.set_str("base", base.clone());
                }
            }
            if let Some(slot) = slots.first_mut() {
                *slot = Value::Object(bag);
            }
        } else {
            let mut bound = vec![false; stub.arg_count()];
            let base_supplied = facet.bound_base.is_some() || args.iter().any(|(name, _)| name.as_ref() == "base");
            let bound_base = facet.bound_base.as_ref().map(|base| ("base", base.clone()));
            let supplied = args
                .iter()
                .map(|(name, value)| (name.as_ref(), value.clone()))
                .chain(bound_base);
            for (name, value) in supplied {
                let index = match name {
                    "" => auto_bind_index(stub, base_supplied),
                    DYNAMIC_BINDING_TOKEN => None,
                    name => stub.arg_index(name),
                };
                match index {
                    Some(i) if !bound[i] => {
                        slots[i] = value;
                        bound[i] = true;
                    }
                    _ => return Err(self.binding_error(stub, name)),
                }
            }
        }

        if let (Some(i), Some(private)) = (stub.arg_index(DYNAMIC_BINDING_TOKEN), private) {
            slots[i] = private;
        }
        Ok(slots)
    }

    fn binding_error(&mut self, stub: &Stub, name: &str) -> anyhow::Error {
        let legal = stub.bindable_names().collect::<Vec<_>>().join(", ");
        let what = if name.is_empty() {
            "unnamed argument".to_string()
        } else {
            format!("argument '{}'", name)
        };
        self.raise_message(format!("Could not bind {}. Legal parameter names: [{}]", what, legal))
    }

    fn check_argument_types(&mut self, stub: &Stub, types: &[TypeRef], slots: &[Value]) -> Result<()> {
        for (i, name) in stub.arg_names.iter().enumerate() {
            if name.as_ref() == DYNAMIC_BINDING_TOKEN {
                continue;
            }
            let (Some(ty), Some(value)) = (types.get(i), slots.get(i)) else {
                continue;
            };
            if !is_a(value, ty) {
                let got = self.type_of(value);
                return Err(self.raise_message(format!(
                    "Argument '{}' of type {} does not satisfy {}",
                    name,
                    got.name(),
                    ty.name()
                )));
            }
        }
        Ok(())
    }

    /// Run an interpreted function in a fresh frame. `args` fills the parameter slots.
    pub(crate) fn invoke(
        &mut self,
        facet: &FunctionFacet,
        args: Vec<Value>,
        restart: Option<RestartCondition>,
    ) -> Result<Value> {
        let index = self.push_frame(facet, args, restart)?;
        let result = self.execute(index);
        self.pop_frame();
        result
    }

    fn push_frame(
        &mut self,
        facet: &FunctionFacet,
        mut args: Vec<Value>,
        restart: Option<RestartCondition>,
    ) -> Result<usize> {
        if self.depth >= self.config.max_call_depth {
            debug!(target: "mat::call", depth = self.depth, "call depth limit reached");
            return Err(self.raise_message("Call stack depth exceeded"));
        }
        let stub = facet.stub.clone();
        args.resize(stub.referrable_count(), Value::Empty);
        let scope = Rc::new(Scope::new(&stub, Rc::new(RefCell::new(args)), facet.origin.clone()));

        if self.depth == self.frames.len() {
            let idle = Stackframe::idle(
                self.idle_stub.clone(),
                self.idle_scope.clone(),
                self.config.value_stack_reserve,
            );
            self.frames.push(idle);
        }
        let frame = &mut self.frames[self.depth];
        frame.pc = 0;
        frame.stub = stub;
        frame.stack.clear();
        frame.scope = scope;
        frame.captures = facet.captures.clone();
        frame.restart = restart;
        self.depth += 1;
        Ok(self.depth - 1)
    }

    /// Truncate the logical depth; the frame stays pooled with its stack capacity.
    fn pop_frame(&mut self) {
        self.depth -= 1;
        let frame = &mut self.frames[self.depth];
        frame.stub = self.idle_stub.clone();
        frame.scope = self.idle_scope.clone();
        frame.stack.clear();
        frame.restart = None;
    }

    fn loop_body(&mut self, func: &Value) -> Result<FunctionFacet> {
        if let Value::Object(obj) = func {
            let facet = obj.borrow().function().cloned();
            if let Some(facet) = facet.filter(|f| !f.stub.is_native()) {
                return Ok(facet);
            }
        }
        Err(self.raise_message("Loop body must be a script function"))
    }

    /// Counting loop over `[from, to)` ascending, or `from` down to `to` exclusive.
    pub(crate) fn count_loop(&mut self, from: f64, to: f64, func: &Value) -> Result<Value> {
        let facet = self.loop_body(func)?;
        if from == to {
            return Ok(Value::Empty);
        }
        let step = if from < to { 1.0 } else { -1.0 };
        let binds_counter = facet.stub.arg_count() > 0;
        let mut args = vec![Value::Empty; facet.stub.arg_count()];
        if binds_counter {
            args[0] = Value::Number(from);
        }
        let restart = RestartCondition::Count {
            current: from,
            end: to,
            step,
            binds_counter,
        };
        self.invoke(&facet, args, Some(restart))
    }

    pub(crate) fn forever_loop(&mut self, func: &Value) -> Result<Value> {
        let facet = self.loop_body(func)?;
        let args = vec![Value::Empty; facet.stub.arg_count()];
        self.invoke(&facet, args, Some(RestartCondition::Forever))
    }

    /// Iterate a key/value snapshot, honoring a `foreach` attribute that supplies
    /// the object to iterate.
    pub(crate) fn foreach_loop(&mut self, target: &Value, func: &Value) -> Result<Value> {
        let Value::Object(obj) = target else {
            return Err(self.raise_message(format!("Cannot iterate a {} value", target.kind_name())));
        };
        let mut obj = obj.clone();
        if let Some(hook) = self.attribute(&obj, "foreach") {
            match self.call_no_args(&hook)? {
                Value::Object(other) => obj = other,
                other => {
                    return Err(self.raise_message(format!(
                        "foreach attribute must return an Object, got {}",
                        other.kind_name()
                    )));
                }
            }
        }
        let facet = self.loop_body(func)?;
        let keys = self.object_keys(&obj)?;
        let values = self.object_values(&obj)?;
        if keys.is_empty() {
            return Ok(Value::Empty);
        }
        let mut args = vec![Value::Empty; facet.stub.arg_count()];
        for (slot, value) in args.iter_mut().zip([keys[0].clone(), values[0].clone()]) {
            *slot = value;
        }
        let restart = RestartCondition::Foreach { keys, values, index: 0 };
        self.invoke(&facet, args, Some(restart))
    }

    /// Call `func`; intercept a catchable it raises through `response.onSend` /
    /// `response.onError`.
    pub(crate) fn listen(&mut self, func: &Value, response: &Value) -> Result<Value> {
        let err = match self.call_no_args(func) {
            Ok(value) => return Ok(value),
            Err(err) if err.is::<Unwinding>() => err,
            Err(err) => return Err(err),
        };
        let Some(catchable) = self.pending.take() else {
            return Err(err);
        };
        let (on_send, on_error) = match response {
            Value::Object(obj) => {
                let obj = obj.borrow();
                (obj.get_str("onSend"), obj.get_str("onError"))
            }
            _ => (None, None),
        };
        let on_send = on_send.filter(|h| !h.is_empty());
        let on_error = on_error.filter(|h| !h.is_empty() && catchable.is_error());
        debug!(target: "mat::catchable", kind = ?catchable.kind, "listen intercepted catchable");
        if let Some(handler) = on_send.or(on_error) {
            return self.call_inner(&handler, &[("message", catchable.payload)], None);
        }
        if !catchable.is_error() {
            return Ok(catchable.payload);
        }
        self.pending = Some(catchable);
        Err(err)
    }
}

/// Parameter an unnamed argument binds to: the only bindable parameter, or the
/// non-`base` one of exactly two when a base is supplied.
fn auto_bind_index(stub: &Stub, base_supplied: bool) -> Option<usize> {
    let bindable: Vec<usize> = (0..stub.arg_count())
        .filter(|&i| stub.arg_names[i].as_ref() != DYNAMIC_BINDING_TOKEN)
        .collect();
    match bindable.as_slice() {
        [only] => Some(*only),
        [a, b] if base_supplied => match (stub.arg_names[*a].as_ref(), stub.arg_names[*b].as_ref()) {
            ("base", _) => Some(*b),
            (_, "base") => Some(*a),
            _ => None,
        },
        _ => None,
    }
}
