use std::cell::RefCell;
use std::rc::Rc;

use crate::bytecode::Stub;
use crate::val::Value;

/// Argument and local slots of one activation, shared with every closure that captures them.
pub type Referrables = Rc<RefCell<Vec<Value>>>;

/// Lexical link from an activation to the scope its function was created in.
pub struct Scope {
    pub(crate) file_id: u32,
    pub(crate) stub_id: u32,
    pub(crate) referrables: Referrables,
    pub(crate) parent: Option<Rc<Scope>>,
}

impl Scope {
    pub(crate) fn new(stub: &Stub, referrables: Referrables, parent: Option<Rc<Scope>>) -> Self {
        Self {
            file_id: stub.file_id,
            stub_id: stub.stub_id,
            referrables,
            parent,
        }
    }

    /// Nearest scope on the chain (self included) that belongs to `stub_id`.
    pub(crate) fn find(self: &Rc<Self>, file_id: u32, stub_id: u32) -> Option<&Rc<Scope>> {
        let mut cur = Some(self);
        while let Some(scope) = cur {
            if scope.file_id == file_id && scope.stub_id == stub_id {
                return Some(scope);
            }
            cur = scope.parent.as_ref();
        }
        None
    }
}

/// A resolved capture: a live slot in some ancestor's referrables.
#[derive(Clone)]
pub struct Capture {
    pub(crate) referrables: Referrables,
    pub(crate) index: usize,
}

impl Capture {
    pub(crate) fn get(&self) -> Value {
        self.referrables.borrow().get(self.index).cloned().unwrap_or_default()
    }

    pub(crate) fn set(&self, value: Value) -> bool {
        match self.referrables.borrow_mut().get_mut(self.index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

/// Re-entry state consulted when a loop body's frame runs off its last instruction.
pub(crate) enum RestartCondition {
    Count {
        current: f64,
        end: f64,
        step: f64,
        binds_counter: bool,
    },
    Forever,
    Foreach {
        keys: Vec<Value>,
        values: Vec<Value>,
        index: usize,
    },
}

pub(crate) struct Stackframe {
    pub(crate) pc: usize,
    pub(crate) stub: Rc<Stub>,
    pub(crate) stack: Vec<Value>,
    pub(crate) scope: Rc<Scope>,
    pub(crate) captures: Rc<[Capture]>,
    pub(crate) restart: Option<RestartCondition>,
}

impl Stackframe {
    pub(crate) fn idle(stub: Rc<Stub>, scope: Rc<Scope>, reserve: usize) -> Self {
        Self {
            pc: 0,
            stub,
            stack: Vec::with_capacity(reserve),
            scope,
            captures: Rc::from(Vec::new()),
            restart: None,
        }
    }

    #[inline]
    pub(crate) fn referrables(&self) -> &Referrables {
        &self.scope.referrables
    }

    /// Line of the instruction currently executing.
    pub(crate) fn line(&self) -> u32 {
        self.stub.line_at(self.pc.saturating_sub(1))
    }
}
