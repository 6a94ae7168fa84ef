use std::fmt;

/// Instruction opcodes. Every instruction carries one inline operand; only the
/// function-literal opcodes (`Nfn`, `Nsf`) encode it as a stub id instead of an `f64`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Nop = 0x00,
    /// Push referrable (own slots first, then captures).
    Prf = 0x01,
    /// Push Empty.
    Nem = 0x02,
    /// Push number literal.
    Nnm = 0x03,
    /// Push boolean literal.
    Nbl = 0x04,
    /// Push string from the stub's string pool.
    Nst = 0x05,
    /// Push a new empty object.
    Nob = 0x06,
    /// New closure.
    Nfn = 0x07,
    /// New type-checked closure.
    Nsf = 0x08,
    /// Collect array.
    Caa = 0x09,
    /// Collect static (key/value pairs).
    Cas = 0x0A,
    /// Push built-in type.
    Pto = 0x0B,
    Cal = 0x0C,
    /// Assign referrable.
    Arf = 0x0D,
    /// Object set.
    Osn = 0x0E,
    /// Object lookup.
    Olk = 0x0F,
    Opr = 0x10,
    /// Push external (native) function.
    Ext = 0x11,
    Pop = 0x12,
    Cpy = 0x13,
    Ret = 0x14,
    Skp = 0x15,
    /// Skip if false (pops).
    Skf = 0x16,
    /// Short-circuit and (peeks).
    Sca = 0x17,
    /// Short-circuit or (peeks).
    Sco = 0x18,
    /// Bounded counting loop.
    Lop = 0x19,
    /// Unbounded loop.
    Fvr = 0x1A,
    /// Key/value foreach.
    Fch = 0x1B,
    Qry = 0x1C,
    /// Listen.
    Lst = 0x1D,
}

impl Opcode {
    pub const ALL: [Opcode; 30] = [
        Opcode::Nop,
        Opcode::Prf,
        Opcode::Nem,
        Opcode::Nnm,
        Opcode::Nbl,
        Opcode::Nst,
        Opcode::Nob,
        Opcode::Nfn,
        Opcode::Nsf,
        Opcode::Caa,
        Opcode::Cas,
        Opcode::Pto,
        Opcode::Cal,
        Opcode::Arf,
        Opcode::Osn,
        Opcode::Olk,
        Opcode::Opr,
        Opcode::Ext,
        Opcode::Pop,
        Opcode::Cpy,
        Opcode::Ret,
        Opcode::Skp,
        Opcode::Skf,
        Opcode::Sca,
        Opcode::Sco,
        Opcode::Lop,
        Opcode::Fvr,
        Opcode::Fch,
        Opcode::Qry,
        Opcode::Lst,
    ];

    #[inline]
    pub fn from_u8(byte: u8) -> Option<Opcode> {
        Self::ALL.get(byte as usize).copied()
    }

    /// Function-literal opcodes carry a `u32` stub id plus 4 reserved bytes.
    #[inline]
    pub fn takes_stub_operand(byte: u8) -> bool {
        byte == Opcode::Nfn as u8 || byte == Opcode::Nsf as u8
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::Prf => "PRF",
            Opcode::Nem => "NEM",
            Opcode::Nnm => "NNM",
            Opcode::Nbl => "NBL",
            Opcode::Nst => "NST",
            Opcode::Nob => "NOB",
            Opcode::Nfn => "NFN",
            Opcode::Nsf => "NSF",
            Opcode::Caa => "CAA",
            Opcode::Cas => "CAS",
            Opcode::Pto => "PTO",
            Opcode::Cal => "CAL",
            Opcode::Arf => "ARF",
            Opcode::Osn => "OSN",
            Opcode::Olk => "OLK",
            Opcode::Opr => "OPR",
            Opcode::Ext => "EXT",
            Opcode::Pop => "POP",
            Opcode::Cpy => "CPY",
            Opcode::Ret => "RET",
            Opcode::Skp => "SKP",
            Opcode::Skf => "SKF",
            Opcode::Sca => "SCA",
            Opcode::Sco => "SCO",
            Opcode::Lop => "LOP",
            Opcode::Fvr => "FVR",
            Opcode::Fch => "FCH",
            Opcode::Qry => "QRY",
            Opcode::Lst => "LST",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
