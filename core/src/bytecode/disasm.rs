use std::fmt::Write as _;

use super::{Opcode, Operand, Stub};

/// Human-readable listing of a stub: a header line, then `line | pc | MNEMONIC operand`.
pub fn disassemble(stub: &Stub) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "stub {} (file {}){} args=[{}] locals=[{}] captures={}",
        stub.stub_id,
        stub.file_id,
        if stub.is_vararg { " vararg" } else { "" },
        stub.arg_names.join(", "),
        stub.local_names.join(", "),
        stub.captures.len()
    );
    for (pc, ins) in stub.instructions.iter().enumerate() {
        let mnemonic = Opcode::from_u8(ins.opcode).map(Opcode::mnemonic).unwrap_or("???");
        let operand = match (Opcode::from_u8(ins.opcode), ins.operand) {
            (_, Operand::Stub(id)) => format!("stub#{}", id),
            (Some(Opcode::Nst), Operand::Number(n)) => match stub.strings.get(n as usize) {
                Some(s) => format!("{:?}", s.as_ref()),
                None => format!("<bad string {}>", n),
            },
            (Some(Opcode::Nem | Opcode::Nob | Opcode::Cpy | Opcode::Ret | Opcode::Nop), _) => String::new(),
            (_, Operand::Number(n)) => format!("{}", n),
        };
        let _ = writeln!(out, "{:>5} | {:>4} | {} {}", ins.line, pc, mnemonic, operand);
    }
    out
}
