use std::rc::Rc;

use anyhow::{Result, bail};

use crate::util::fast_map::OrderedMap;

use super::{TypeRef, Value};

/// Reserved type ids 1..=9.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinType {
    Empty = 1,
    Boolean = 2,
    Number = 3,
    String = 4,
    Object = 5,
    Function = 6,
    Type = 7,
    Any = 8,
    Nullable = 9,
}

impl BuiltinType {
    pub const ALL: [BuiltinType; 9] = [
        BuiltinType::Empty,
        BuiltinType::Boolean,
        BuiltinType::Number,
        BuiltinType::String,
        BuiltinType::Object,
        BuiltinType::Function,
        BuiltinType::Type,
        BuiltinType::Any,
        BuiltinType::Nullable,
    ];

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get((id as usize).checked_sub(1)?).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            BuiltinType::Empty => "Empty",
            BuiltinType::Boolean => "Boolean",
            BuiltinType::Number => "Number",
            BuiltinType::String => "String",
            BuiltinType::Object => "Object",
            BuiltinType::Function => "Function",
            BuiltinType::Type => "Type",
            BuiltinType::Any => "Any",
            BuiltinType::Nullable => "Nullable",
        }
    }
}

/// Record layout: string key to the type every stored value must satisfy.
pub type Layout = OrderedMap<Rc<str>, TypeRef>;

pub struct TypeData {
    pub(super) id: u32,
    pub(super) name: Rc<str>,
    /// Flattened ancestry, nearest first, without duplicates.
    pub(super) isa: Vec<TypeRef>,
    pub(super) layout: Option<Rc<Layout>>,
}

impl TypeData {
    #[inline]
    pub fn isa(&self) -> &[TypeRef] {
        &self.isa
    }

    #[inline]
    pub fn layout(&self) -> Option<&Rc<Layout>> {
        self.layout.as_ref()
    }
}

/// Per-VM type registry: the nine builtins and the custom id counter.
pub struct TypeTable {
    builtins: Vec<TypeRef>,
    next_id: u32,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    pub fn new() -> Self {
        let builtins = BuiltinType::ALL
            .iter()
            .map(|b| {
                TypeRef::new(TypeData {
                    id: *b as u32,
                    name: Rc::from(b.name()),
                    isa: Vec::new(),
                    layout: None,
                })
            })
            .collect();
        Self {
            builtins,
            next_id: BuiltinType::Nullable as u32 + 1,
        }
    }

    #[inline]
    pub fn builtin(&self, builtin: BuiltinType) -> TypeRef {
        self.builtins[builtin as usize - 1].clone()
    }

    pub fn builtin_by_id(&self, id: u32) -> Option<TypeRef> {
        BuiltinType::from_id(id).map(|b| self.builtin(b))
    }

    /// Allocate a new nominal type. Ancestry is flattened transitively and the
    /// layout is merged from `layout` plus every ancestor's layout.
    pub fn create(&mut self, name: &str, inherits: Option<Vec<TypeRef>>, layout: Option<Layout>) -> Result<TypeRef> {
        let mut isa: Vec<TypeRef> = Vec::new();
        if let Some(parents) = inherits {
            if parents.is_empty() {
                bail!("Type '{}' has an empty inherits list", name);
            }
            for parent in parents {
                let chain = std::iter::once(parent.clone()).chain(parent.data().isa().iter().cloned());
                for ancestor in chain {
                    if !isa.iter().any(|t| t.id() == ancestor.id()) {
                        isa.push(ancestor);
                    }
                }
            }
        }

        let mut merged = layout;
        for ancestor in &isa {
            let Some(inherited) = ancestor.data().layout() else {
                continue;
            };
            let target = merged.get_or_insert_with(Layout::new);
            for (key, ty) in inherited.iter() {
                match target.get(key) {
                    Some(existing) if existing.id() != ty.id() => bail!(
                        "Type '{}' inherits conflicting layout entry '{}' ({} vs {})",
                        name,
                        key,
                        existing.name(),
                        ty.name()
                    ),
                    Some(_) => {}
                    None => {
                        target.insert(key.clone(), ty.clone());
                    }
                }
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        Ok(TypeRef::new(TypeData {
            id,
            name: Rc::from(name),
            isa,
            layout: merged.map(Rc::new),
        }))
    }

    /// Intrinsic type of a value; objects report the type they were created with.
    pub fn type_of(&self, value: &Value) -> TypeRef {
        match value {
            Value::Empty => self.builtin(BuiltinType::Empty),
            Value::Boolean(_) => self.builtin(BuiltinType::Boolean),
            Value::Number(_) => self.builtin(BuiltinType::Number),
            Value::String(_) => self.builtin(BuiltinType::String),
            Value::Type(_) => self.builtin(BuiltinType::Type),
            Value::Object(obj) => obj.borrow().type_ref().clone(),
        }
    }
}

/// `isA` relation between a value and a type.
pub fn is_a(value: &Value, ty: &TypeRef) -> bool {
    if ty.is(BuiltinType::Any) {
        return true;
    }
    match value {
        Value::Object(obj) => {
            if ty.is(BuiltinType::Nullable) || ty.is(BuiltinType::Object) {
                return true;
            }
            let obj = obj.borrow();
            if ty.is(BuiltinType::Function) {
                return obj.is_function();
            }
            let own = obj.type_ref();
            own.id() == ty.id() || own.data().isa().iter().any(|t| t.id() == ty.id())
        }
        Value::Empty => ty.is(BuiltinType::Empty) || ty.is(BuiltinType::Nullable),
        Value::Boolean(_) => ty.is(BuiltinType::Boolean),
        Value::Number(_) => ty.is(BuiltinType::Number),
        Value::String(_) => ty.is(BuiltinType::String),
        Value::Type(_) => ty.is(BuiltinType::Type),
    }
}
