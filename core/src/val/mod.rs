//! Tagged values and the object/type store.
//!
//! `Value` is a closed sum over the six runtime kinds. Objects and types have
//! identity: they are shared handles carrying a creation-order id, while booleans,
//! numbers and strings are plain values.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

pub(crate) mod convert;
pub mod json;
mod object;
mod types;


pub use convert::format_number;
pub use object::{Facet, FunctionFacet, InterfaceFacet, Key, KeyError, MAX_INDEX, Member, Object};
pub use types::{BuiltinType, Layout, TypeData, TypeTable, is_a};

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Empty,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjectRef),
    Type(TypeRef),
}

impl Value {
    /// Kind name used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Empty => "Empty",
            Value::Boolean(_) => "Boolean",
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::Object(_) => "Object",
            Value::Type(_) => "Type",
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    #[inline]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    #[inline]
    pub fn as_type(&self) -> Option<&TypeRef> {
        match self {
            Value::Type(ty) => Some(ty),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// True for objects carrying a function facet.
    pub fn is_function(&self) -> bool {
        match self {
            Value::Object(obj) => obj.borrow().is_function(),
            _ => false,
        }
    }
}

/// Identity equality: structural for primitives, handle identity for objects and types.
/// Language-level `==` (with overloads and conversions) lives in the operator layer.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Empty, Value::Empty) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Type(a), Value::Type(b)) => a.id() == b.id(),
            _ => false,
        }
    }
}

// Objects can reference themselves, so Debug never descends into object contents.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => f.write_str("Empty"),
            Value::Boolean(b) => write!(f, "Boolean({})", b),
            Value::Number(n) => write!(f, "Number({})", format_number(*n)),
            Value::String(s) => write!(f, "String({:?})", s.as_ref()),
            Value::Object(obj) => write!(f, "{:?}", obj),
            Value::Type(ty) => write!(f, "{:?}", ty),
        }
    }
}

struct ObjectCell {
    id: u64,
    data: RefCell<Object>,
}

/// Shared handle to an object. Cloning the handle aliases the same object.
#[derive(Clone)]
pub struct ObjectRef(Rc<ObjectCell>);

impl ObjectRef {
    pub(crate) fn new(id: u64, object: Object) -> Self {
        Self(Rc::new(ObjectCell {
            id,
            data: RefCell::new(object),
        }))
    }

    /// Creation-order id, unique per VM.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    #[inline]
    pub fn borrow(&self) -> Ref<'_, Object> {
        self.0.data.borrow()
    }

    #[inline]
    pub fn borrow_mut(&self) -> RefMut<'_, Object> {
        self.0.data.borrow_mut()
    }

    #[inline]
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.data.try_borrow() {
            Ok(obj) if obj.is_function() => write!(f, "Function#{}", self.0.id),
            _ => write!(f, "Object#{}", self.0.id),
        }
    }
}

/// Shared handle to an immutable type record.
#[derive(Clone)]
pub struct TypeRef(Rc<TypeData>);

impl TypeRef {
    pub(crate) fn new(data: TypeData) -> Self {
        Self(Rc::new(data))
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.0.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[inline]
    pub fn data(&self) -> &TypeData {
        &self.0
    }

    #[inline]
    pub fn is(&self, builtin: BuiltinType) -> bool {
        self.0.id == builtin as u32
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({}#{})", self.0.name, self.0.id)
    }
}
