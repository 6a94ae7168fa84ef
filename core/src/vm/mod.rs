//! The virtual machine: module loading, the frame pool, and the catchable channel.
//!
//! All mutable runtime state (type table, frames, stub registry, import cache,
//! native table and the pending catchable) lives on one `Vm` value that every
//! operation receives by `&mut`, so independent VMs never share anything.

use std::fmt;
use std::rc::Rc;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};

use crate::bytecode::{Stub, decode_stubs};
use crate::config::VmConfig;
use crate::util::fast_map::{FastHashMap, fast_hash_map_new};
use crate::val::{BuiltinType, Facet, FunctionFacet, Object, ObjectRef, TypeRef, TypeTable, Value};

mod access;
mod call;
mod catchable;
mod convert;
mod exec;
mod frame;
mod host;
mod natives;
mod query;


pub use access::Accessor;
pub use catchable::{Catchable, CatchableKind, FatalError, UnhandledError, Unwinding};
pub use frame::{Capture, Referrables, Scope};
pub use host::Host;
pub use query::Query;

use frame::Stackframe;

/// Native function body. Arguments arrive in parameter order; unbound ones are Empty.
pub type NativeFn = Rc<dyn Fn(&mut Vm, &[Value]) -> Result<Value>>;

pub(crate) struct Native {
    pub(crate) name: Rc<str>,
    pub(crate) stub: Rc<Stub>,
    pub(crate) body: NativeFn,
    /// Function object handed out by `EXT`, created on first use.
    pub(crate) value: Option<Value>,
}

pub struct Vm {
    config: VmConfig,
    host: Box<dyn Host>,
    types: TypeTable,
    next_object_id: u64,
    frames: Vec<Stackframe>,
    depth: usize,
    /// Nested `call_inner` activations (interpreted or native) currently running.
    reentry: usize,
    idle_stub: Rc<Stub>,
    idle_scope: Rc<Scope>,
    stubs: FastHashMap<(u32, u32), Rc<Stub>>,
    files: Vec<Rc<str>>,
    modules: FastHashMap<Rc<str>, Value>,
    natives: Vec<Native>,
    external_names: FastHashMap<String, u32>,
    pending: Option<Catchable>,
    /// `{summary, detail, callstack}` of the most recent unhandled error.
    last_unhandled: Option<Value>,
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("depth", &self.depth)
            .field("files", &self.files)
            .field("natives", &self.natives.len())
            .field("pending", &self.pending)
            .finish()
    }
}

impl Vm {
    pub fn new(config: VmConfig, host: Box<dyn Host>) -> Self {
        let idle_stub = Rc::new(Stub::new(0, u32::MAX));
        let idle_scope = Rc::new(Scope::new(&idle_stub, Rc::default(), None));
        let frames = (0..config.frame_pool)
            .map(|_| Stackframe::idle(idle_stub.clone(), idle_scope.clone(), config.value_stack_reserve))
            .collect();
        let mut vm = Self {
            config,
            host,
            types: TypeTable::new(),
            next_object_id: 1,
            frames,
            depth: 0,
            reentry: 0,
            idle_stub,
            idle_scope,
            stubs: fast_hash_map_new(),
            files: vec![Rc::from("<native>")],
            modules: fast_hash_map_new(),
            natives: Vec::new(),
            external_names: fast_hash_map_new(),
            pending: None,
            last_unhandled: None,
        };
        natives::install(&mut vm);
        vm
    }

    #[inline]
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    #[inline]
    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    #[inline]
    pub fn builtin_type(&self, builtin: BuiltinType) -> TypeRef {
        self.types.builtin(builtin)
    }

    #[inline]
    pub fn type_of(&self, value: &Value) -> TypeRef {
        self.types.type_of(value)
    }

    /// Currently pending catchable, if any.
    #[inline]
    pub fn pending(&self) -> Option<&Catchable> {
        self.pending.as_ref()
    }

    /// Error object behind the most recent [`UnhandledError`]. Kept on the VM
    /// because values are not `Send`.
    #[inline]
    pub fn last_unhandled(&self) -> Option<&Value> {
        self.last_unhandled.as_ref()
    }

    /// Logical call-stack depth (interpreted frames only).
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn new_object_with(&mut self, object: Object) -> ObjectRef {
        let id = self.next_object_id;
        self.next_object_id += 1;
        ObjectRef::new(id, object)
    }

    pub fn new_object(&mut self) -> ObjectRef {
        let ty = self.builtin_type(BuiltinType::Object);
        self.new_object_with(Object::new(ty))
    }

    /// Object holding `values` under indices 0..n.
    pub fn new_index_object(&mut self, values: Vec<Value>) -> Value {
        let obj = self.new_object();
        *obj.borrow_mut().indices_mut() = values;
        Value::Object(obj)
    }

    pub fn new_function(&mut self, facet: FunctionFacet) -> ObjectRef {
        let ty = self.builtin_type(BuiltinType::Function);
        self.new_object_with(Object::with_facet(ty, Facet::Function(facet)))
    }

    pub(crate) fn file_name(&self, file_id: u32) -> Rc<str> {
        self.files
            .get(file_id as usize)
            .cloned()
            .unwrap_or_else(|| Rc::from("<unknown>"))
    }

    pub(crate) fn stub(&self, file_id: u32, stub_id: u32) -> Option<Rc<Stub>> {
        self.stubs.get(&(file_id, stub_id)).cloned()
    }

    /// Decode `bytes` as a new module and register its stubs. Returns the file id.
    pub fn load(&mut self, name: &str, bytes: &[u8]) -> Result<u32> {
        let file_id = u32::try_from(self.files.len())?;
        let stubs = decode_stubs(file_id, bytes)
            .map_err(|e| anyhow::Error::new(FatalError::new(format!("cannot load '{}': {:#}", name, e))))?;
        if !stubs.iter().any(|stub| stub.stub_id == 0) {
            return Err(FatalError::new(format!("module '{}' has no entry stub", name)).into());
        }
        self.files.push(Rc::from(name));
        for stub in stubs {
            self.stubs.insert((file_id, stub.stub_id), Rc::new(stub));
        }
        debug!(target: "mat::decode", module = name, file_id, "module registered");
        Ok(file_id)
    }

    /// Load and run a module's entry stub. The result is cached under `name`.
    pub fn run(&mut self, name: &str, bytes: &[u8]) -> Result<Value> {
        let file_id = self.load(name, bytes)?;
        let result = self.run_file(file_id);
        let value = self.settle(result)?;
        self.modules.insert(Rc::from(name), value.clone());
        Ok(value)
    }

    /// Run a module fetched through the host, at most once per name.
    pub fn import_module(&mut self, name: &str) -> Result<Value> {
        if let Some(value) = self.modules.get(name) {
            debug!(target: "mat::import", module = name, "import cache hit");
            return Ok(value.clone());
        }
        debug!(target: "mat::import", module = name, "resolving module");
        let bytes = self
            .host
            .import(name)
            .with_context(|| format!("could not import module '{}'", name))?;
        let file_id = self.load(name, &bytes)?;
        let result = self.run_file(file_id);
        let value = self.settle(result)?;
        self.modules.insert(Rc::from(name), value.clone());
        Ok(value)
    }

    fn run_file(&mut self, file_id: u32) -> Result<Value> {
        let stub = self
            .stub(file_id, 0)
            .ok_or_else(|| anyhow!(FatalError::new(format!("file {} has no entry stub", file_id))))?;
        let entry = self.new_function(FunctionFacet::new(stub));
        self.call_inner(&Value::Object(entry), &[] as &[(&str, Value)], None)
    }

    /// Call a function value from the host. Catchables that escape are settled
    /// the same way as for [`Vm::run`].
    pub fn call_function<N: AsRef<str>>(&mut self, func: &Value, args: &[(N, Value)]) -> Result<Value> {
        let result = self.call_inner(func, args, None);
        self.settle(result)
    }

    /// Register a host native. It becomes retrievable once by name through
    /// `getExternalFunction`. Returns its native id.
    pub fn set_external_function<F>(&mut self, name: &str, arg_names: &[&str], body: F) -> u32
    where
        F: Fn(&mut Vm, &[Value]) -> Result<Value> + 'static,
    {
        let id = self.register_native(name, arg_names, Rc::new(body));
        self.external_names.insert(name.to_string(), id);
        id
    }

    pub(crate) fn register_native(&mut self, name: &str, arg_names: &[&str], body: NativeFn) -> u32 {
        let id = self.natives.len() as u32;
        self.natives.push(Native {
            name: Rc::from(name),
            stub: Rc::new(Stub::native(id, arg_names)),
            body,
            value: None,
        });
        id
    }

    /// Function object for native `id`, shared across lookups.
    pub(crate) fn native_value(&mut self, id: u32) -> Result<Value> {
        let Some(native) = self.natives.get(id as usize) else {
            return Err(self.raise_message(format!("Unknown external function {}", id)));
        };
        if let Some(value) = &native.value {
            return Ok(value.clone());
        }
        let stub = native.stub.clone();
        let value = Value::Object(self.new_function(FunctionFacet::new(stub)));
        self.natives[id as usize].value = Some(value.clone());
        Ok(value)
    }

    /// Fresh native function object with `base` pre-bound.
    pub(crate) fn bound_native(&mut self, id: u32, base: Value) -> Result<Value> {
        let stub = match self.natives.get(id as usize) {
            Some(native) => native.stub.clone(),
            None => return Err(FatalError::new(format!("native {} is not registered", id)).into()),
        };
        let mut facet = FunctionFacet::new(stub);
        facet.bound_base = Some(base);
        Ok(Value::Object(self.new_function(facet)))
    }

    fn raise_catchable(&mut self, kind: CatchableKind, payload: Value) -> anyhow::Error {
        let (file, line) = match self.depth.checked_sub(1).map(|i| &self.frames[i]) {
            Some(frame) => (self.file_name(frame.stub.file_id), frame.line()),
            None => (Rc::from("<host>"), 0),
        };
        debug!(target: "mat::catchable", ?kind, %file, line, "catchable raised");
        self.pending = Some(Catchable {
            kind,
            payload,
            file,
            line,
        });
        anyhow::Error::new(Unwinding)
    }

    /// Raise an error catchable. The payload becomes `{summary, detail, callstack}`.
    pub fn raise_error(&mut self, detail: Value) -> anyhow::Error {
        let summary: Value = match &detail {
            Value::String(s) => Value::String(s.clone()),
            Value::Object(obj) => match obj.borrow().get_str("summary") {
                Some(Value::String(s)) => Value::String(s),
                _ => Value::from("Unknown error"),
            },
            _ => Value::from("Unknown error"),
        };
        let callstack = self.callstack_value();
        let payload = self.new_object();
        {
            let mut obj = payload.borrow_mut();
            obj.set_str("summary", summary);
            obj.set_str("detail", detail);
            obj.set_str("callstack", callstack);
        }
        self.raise_catchable(CatchableKind::Error, Value::Object(payload))
    }

    /// Raise an error catchable whose summary is `message`.
    pub fn raise_message(&mut self, message: impl fmt::Display) -> anyhow::Error {
        self.raise_error(Value::from(message.to_string()))
    }

    pub fn raise_send(&mut self, message: Value) -> anyhow::Error {
        self.raise_catchable(CatchableKind::Send, message)
    }

    /// Index object of `{file, line}` records, innermost frame first.
    fn callstack_value(&mut self) -> Value {
        let records: Vec<(Rc<str>, u32)> = self.frames[..self.depth]
            .iter()
            .rev()
            .map(|frame| (self.file_name(frame.stub.file_id), frame.line()))
            .collect();
        let entries = records
            .into_iter()
            .map(|(file, line)| {
                let entry = self.new_object();
                {
                    let mut obj = entry.borrow_mut();
                    obj.set_str("file", Value::String(file));
                    obj.set_str("line", Value::Number(line as f64));
                }
                Value::Object(entry)
            })
            .collect();
        self.new_index_object(entries)
    }

    /// Convert an escaped catchable into the host-facing result once the VM is
    /// back at the outermost activation.
    fn settle(&mut self, result: Result<Value>) -> Result<Value> {
        if self.reentry > 0 {
            return result;
        }
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.is::<Unwinding>() {
            self.pending = None;
            return Err(err);
        }
        let Some(catchable) = self.pending.take() else {
            return Err(err);
        };
        if !catchable.is_error() {
            debug!(target: "mat::catchable", "send reached the top level");
            return Ok(catchable.payload);
        }
        let summary = match &catchable.payload {
            Value::Object(obj) => match obj.borrow().get_str("summary") {
                Some(Value::String(s)) => s.to_string(),
                _ => "Unknown error".to_string(),
            },
            _ => "Unknown error".to_string(),
        };
        let unhandled = UnhandledError {
            file: catchable.file.to_string(),
            line: catchable.line,
            summary,
        };
        self.last_unhandled = Some(catchable.payload);
        warn!(target: "mat::catchable", file = %unhandled.file, line = unhandled.line, summary = %unhandled.summary, "unhandled error");
        self.host.unhandled_error(&unhandled);
        Err(unhandled.into())
    }
}
