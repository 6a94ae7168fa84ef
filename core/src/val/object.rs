use std::fmt;
use std::rc::Rc;

use crate::bytecode::Stub;
use crate::util::fast_map::OrderedMap;
use crate::vm::{Capture, Scope};

use super::{Layout, ObjectRef, TypeRef, Value};

/// An object key, partitioned by kind.
#[derive(Debug, Clone)]
pub enum Key {
    String(Rc<str>),
    Index(usize),
    Boolean(bool),
    Object(ObjectRef),
    Type(TypeRef),
}

/// Largest index a write may grow the index partition to. Reads and
/// overwrites of existing indices are not limited.
pub const MAX_INDEX: usize = (1 << 24) - 1;

#[derive(Debug, Clone, PartialEq)]
pub enum KeyError {
    EmptyKey,
    InvalidIndex(f64),
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyError::EmptyKey => f.write_str("Empty cannot be used as an object key"),
            KeyError::InvalidIndex(n) => write!(f, "Invalid index {}", super::format_number(*n)),
        }
    }
}

impl Key {
    /// Number keys truncate toward zero; NaN, infinite and negative indices are rejected.
    pub fn from_value(value: &Value) -> Result<Key, KeyError> {
        match value {
            Value::Empty => Err(KeyError::EmptyKey),
            Value::Boolean(b) => Ok(Key::Boolean(*b)),
            Value::Number(n) => {
                let idx = n.trunc();
                if !idx.is_finite() || idx < 0.0 {
                    Err(KeyError::InvalidIndex(*n))
                } else {
                    Ok(Key::Index(idx as usize))
                }
            }
            Value::String(s) => Ok(Key::String(s.clone())),
            Value::Object(obj) => Ok(Key::Object(obj.clone())),
            Value::Type(ty) => Ok(Key::Type(ty.clone())),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::String(s) => Value::String(s.clone()),
            Key::Index(i) => Value::Number(*i as f64),
            Key::Boolean(b) => Value::Boolean(*b),
            Key::Object(obj) => Value::Object(obj.clone()),
            Key::Type(ty) => Value::Type(ty.clone()),
        }
    }
}

/// Callable facet: prototype, resolved captures and optional type constraints.
#[derive(Clone)]
pub struct FunctionFacet {
    pub stub: Rc<Stub>,
    pub captures: Rc<[Capture]>,
    /// Argument types in stub order followed by the return type.
    pub types: Option<Rc<[TypeRef]>>,
    /// Scope the closure was created in, used to resolve nested captures.
    pub origin: Option<Rc<Scope>>,
    /// Base value pre-bound by a query; passed as the `base` argument on call.
    pub bound_base: Option<Value>,
}

impl FunctionFacet {
    pub fn new(stub: Rc<Stub>) -> Self {
        Self {
            stub,
            captures: Rc::from(Vec::new()),
            types: None,
            origin: None,
            bound_base: None,
        }
    }
}

/// Interface member: a plain method, or an accessor pair.
#[derive(Clone)]
pub enum Member {
    Method(Value),
    Accessor { get: Option<Value>, set: Option<Value> },
}

#[derive(Clone)]
pub struct InterfaceFacet {
    pub members: OrderedMap<Rc<str>, Member>,
    pub private: Option<Value>,
}

#[derive(Clone, Default)]
pub enum Facet {
    #[default]
    None,
    Function(FunctionFacet),
    Record(Rc<Layout>),
    Interface(InterfaceFacet),
}

/// Heterogeneous ordered map with key partitions and an optional facet.
pub struct Object {
    type_ref: TypeRef,
    strings: OrderedMap<Rc<str>, Value>,
    indices: Vec<Value>,
    booleans: Vec<(bool, Value)>,
    objects: OrderedMap<u64, (ObjectRef, Value)>,
    types: OrderedMap<u32, (TypeRef, Value)>,
    facet: Facet,
    attributes: Option<ObjectRef>,
}

impl Object {
    pub fn new(type_ref: TypeRef) -> Self {
        Self {
            type_ref,
            strings: OrderedMap::new(),
            indices: Vec::new(),
            booleans: Vec::new(),
            objects: OrderedMap::new(),
            types: OrderedMap::new(),
            facet: Facet::None,
            attributes: None,
        }
    }

    pub fn with_facet(type_ref: TypeRef, facet: Facet) -> Self {
        let mut obj = Self::new(type_ref);
        obj.facet = facet;
        obj
    }

    #[inline]
    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    #[inline]
    pub fn facet(&self) -> &Facet {
        &self.facet
    }

    #[inline]
    pub fn facet_mut(&mut self) -> &mut Facet {
        &mut self.facet
    }

    #[inline]
    pub fn set_facet(&mut self, facet: Facet) {
        self.facet = facet;
    }

    #[inline]
    pub fn is_function(&self) -> bool {
        matches!(self.facet, Facet::Function(_))
    }

    pub fn function(&self) -> Option<&FunctionFacet> {
        match &self.facet {
            Facet::Function(func) => Some(func),
            _ => None,
        }
    }

    pub fn layout(&self) -> Option<&Rc<Layout>> {
        match &self.facet {
            Facet::Record(layout) => Some(layout),
            _ => None,
        }
    }

    pub fn interface(&self) -> Option<&InterfaceFacet> {
        match &self.facet {
            Facet::Interface(iface) => Some(iface),
            _ => None,
        }
    }

    #[inline]
    pub fn attributes(&self) -> Option<&ObjectRef> {
        self.attributes.as_ref()
    }

    #[inline]
    pub fn set_attributes(&mut self, attributes: Option<ObjectRef>) {
        self.attributes = attributes;
    }

    /// Raw partition lookup (no facet or attribute redirection).
    pub fn get(&self, key: &Key) -> Option<Value> {
        match key {
            Key::String(s) => self.strings.get(s).cloned(),
            Key::Index(i) => self.indices.get(*i).cloned(),
            Key::Boolean(b) => self
                .booleans
                .iter()
                .find(|(k, _)| k == b)
                .map(|(_, v)| v.clone()),
            Key::Object(obj) => self.objects.get(&obj.id()).map(|(_, v)| v.clone()),
            Key::Type(ty) => self.types.get(&ty.id()).map(|(_, v)| v.clone()),
        }
    }

    #[inline]
    pub fn get_str(&self, key: &str) -> Option<Value> {
        self.strings.get(key).cloned()
    }

    /// Raw partition write. Index writes past the end gap-fill with Empty.
    pub fn set(&mut self, key: Key, value: Value) {
        match key {
            Key::String(s) => {
                self.strings.insert(s, value);
            }
            Key::Index(i) => {
                if i >= self.indices.len() {
                    self.indices.resize(i + 1, Value::Empty);
                }
                self.indices[i] = value;
            }
            Key::Boolean(b) => match self.booleans.iter_mut().find(|(k, _)| *k == b) {
                Some(slot) => slot.1 = value,
                None => self.booleans.push((b, value)),
            },
            Key::Object(obj) => {
                self.objects.insert(obj.id(), (obj, value));
            }
            Key::Type(ty) => {
                self.types.insert(ty.id(), (ty, value));
            }
        }
    }

    /// [`Object::set`] that refuses to grow the indices past [`MAX_INDEX`].
    pub fn try_set(&mut self, key: Key, value: Value) -> Result<(), KeyError> {
        if let Key::Index(i) = key {
            if i >= self.indices.len() && i > MAX_INDEX {
                return Err(KeyError::InvalidIndex(i as f64));
            }
        }
        self.set(key, value);
        Ok(())
    }

    #[inline]
    pub fn set_str(&mut self, key: &str, value: Value) {
        self.strings.insert(Rc::from(key), value);
    }

    /// Remove a key. Removing an index shifts later indices down.
    pub fn remove(&mut self, key: &Key) -> Option<Value> {
        match key {
            Key::String(s) => self.strings.remove(s),
            Key::Index(i) => (*i < self.indices.len()).then(|| self.indices.remove(*i)),
            Key::Boolean(b) => {
                let pos = self.booleans.iter().position(|(k, _)| k == b)?;
                Some(self.booleans.remove(pos).1)
            }
            Key::Object(obj) => self.objects.remove(&obj.id()).map(|(_, v)| v),
            Key::Type(ty) => self.types.remove(&ty.id()).map(|(_, v)| v),
        }
    }

    #[inline]
    pub fn indices(&self) -> &[Value] {
        &self.indices
    }

    #[inline]
    pub fn indices_mut(&mut self) -> &mut Vec<Value> {
        &mut self.indices
    }

    #[inline]
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn push(&mut self, value: Value) {
        self.indices.push(value);
    }

    pub fn string_entries(&self) -> impl Iterator<Item = (&Rc<str>, &Value)> {
        self.strings.iter()
    }

    #[inline]
    fn hides_indices(&self) -> bool {
        matches!(self.facet, Facet::Record(_) | Facet::Interface(_))
    }

    /// Number of enumerable keys.
    pub fn key_count(&self) -> usize {
        let strings = match &self.facet {
            Facet::Interface(iface) => iface.members.len(),
            _ => self.strings.len(),
        };
        let indices = if self.hides_indices() { 0 } else { self.indices.len() };
        strings + indices + self.objects.len() + self.booleans.len() + self.types.len()
    }

    /// Ordered keys: strings, indices, object keys, boolean keys, type keys.
    pub fn keys(&self) -> Vec<Value> {
        let mut out = Vec::with_capacity(self.key_count());
        match &self.facet {
            Facet::Interface(iface) => out.extend(iface.members.keys().map(|k| Value::String(k.clone()))),
            _ => out.extend(self.strings.keys().map(|k| Value::String(k.clone()))),
        }
        if !self.hides_indices() {
            out.extend((0..self.indices.len()).map(|i| Value::Number(i as f64)));
        }
        out.extend(self.objects.values().map(|(k, _)| Value::Object(k.clone())));
        out.extend(self.booleans.iter().map(|(k, _)| Value::Boolean(*k)));
        out.extend(self.types.values().map(|(k, _)| Value::Type(k.clone())));
        out
    }

    /// Ordered raw values matching [`Object::keys`]. Interface members are not
    /// resolved here; accessor evaluation needs the VM.
    pub fn values(&self) -> Vec<Value> {
        let mut out = Vec::with_capacity(self.key_count());
        out.extend(self.strings.values().cloned());
        if !self.hides_indices() {
            out.extend(self.indices.iter().cloned());
        }
        out.extend(self.objects.values().map(|(_, v)| v.clone()));
        out.extend(self.booleans.iter().map(|(_, v)| v.clone()));
        out.extend(self.types.values().map(|(_, v)| v.clone()));
        out
    }
}
