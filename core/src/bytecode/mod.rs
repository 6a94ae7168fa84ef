//! MAT stub format: decoded function prototypes and their binary codec.
//!
//! A bytecode buffer is a concatenation of stub records. Each record is self
//! describing (header, argument/local names, string pool, capture descriptors and
//! instructions), so the decoder simply walks records until the buffer is exhausted.

mod decode;
mod disasm;
mod encode;
mod opcode;


use std::rc::Rc;

pub use decode::decode_stubs;
pub use disasm::disassemble;
pub use encode::encode_stubs;
pub use opcode::Opcode;

/// Magic bytes opening every stub record: "MAT", 0x01, 0x06, 'B'.
pub const MAGIC: [u8; 6] = [0x4D, 0x41, 0x54, 0x01, 0x06, 0x42];
/// The only stub record version this reader understands.
pub const VERSION: u8 = 1;

/// File id reserved for native (external) functions.
pub const NATIVE_FILE_ID: u32 = 0;

/// Reserved argument name that receives an interface's private binding.
pub const DYNAMIC_BINDING_TOKEN: &str = "$";

/// Inline instruction operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Number(f64),
    Stub(u32),
}

impl Operand {
    /// Numeric view of the operand; stub ids widen losslessly.
    #[inline]
    pub fn as_f64(self) -> f64 {
        match self {
            Operand::Number(n) => n,
            Operand::Stub(id) => id as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instruction {
    pub line: u32,
    /// Raw opcode byte; resolved with [`Opcode::from_u8`] at dispatch time so an
    /// unknown opcode surfaces as a catchable error instead of a decode failure.
    pub opcode: u8,
    pub operand: Operand,
}

impl Instruction {
    pub fn new(line: u32, opcode: Opcode, operand: f64) -> Self {
        Self {
            line,
            opcode: opcode as u8,
            operand: Operand::Number(operand),
        }
    }

    pub fn function(line: u32, opcode: Opcode, stub_id: u32) -> Self {
        Self {
            line,
            opcode: opcode as u8,
            operand: Operand::Stub(stub_id),
        }
    }
}

/// Where a captured variable lives: the stub that defines it and its referrable slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureDesc {
    pub stub_id: u32,
    pub slot: u32,
}

/// Immutable decoded function prototype, shared by every closure created from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Stub {
    pub file_id: u32,
    pub stub_id: u32,
    pub is_vararg: bool,
    pub arg_names: Vec<Rc<str>>,
    pub local_names: Vec<Rc<str>>,
    pub strings: Vec<Rc<str>>,
    pub captures: Vec<CaptureDesc>,
    pub instructions: Vec<Instruction>,
}

impl Stub {
    pub fn new(file_id: u32, stub_id: u32) -> Self {
        Self {
            file_id,
            stub_id,
            is_vararg: false,
            arg_names: Vec::new(),
            local_names: Vec::new(),
            strings: Vec::new(),
            captures: Vec::new(),
            instructions: Vec::new(),
        }
    }

    /// Minimal stub describing a native function's parameters so natives share the
    /// interpreted calling convention.
    pub fn native(native_id: u32, arg_names: &[&str]) -> Self {
        let mut stub = Self::new(NATIVE_FILE_ID, native_id);
        stub.arg_names = arg_names.iter().map(|name| Rc::from(*name)).collect();
        stub
    }

    #[inline]
    pub fn is_native(&self) -> bool {
        self.file_id == NATIVE_FILE_ID
    }

    #[inline]
    pub fn arg_count(&self) -> usize {
        self.arg_names.len()
    }

    #[inline]
    pub fn local_count(&self) -> usize {
        self.local_names.len()
    }

    /// Number of own referrable slots (arguments followed by locals).
    #[inline]
    pub fn referrable_count(&self) -> usize {
        self.arg_names.len() + self.local_names.len()
    }

    pub fn arg_index(&self, name: &str) -> Option<usize> {
        self.arg_names.iter().position(|arg| arg.as_ref() == name)
    }

    /// Argument names a caller may bind (everything except the dynamic-binding token).
    pub fn bindable_names(&self) -> impl Iterator<Item = &str> {
        self.arg_names
            .iter()
            .map(|name| name.as_ref())
            .filter(|name| *name != DYNAMIC_BINDING_TOKEN)
    }

    pub fn line_at(&self, pc: usize) -> u32 {
        self.instructions.get(pc).map(|ins| ins.line).unwrap_or(0)
    }
}
