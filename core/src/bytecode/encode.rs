use anyhow::{Result, anyhow, ensure};

use super::{MAGIC, Operand, Stub, VERSION};

/// Encode stubs into concatenated stub records, the exact inverse of
/// [`decode_stubs`](super::decode_stubs). The file id is not part of the format.
pub fn encode_stubs(stubs: &[Stub]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for stub in stubs {
        encode_stub(&mut out, stub)?;
    }
    Ok(out)
}

fn encode_stub(out: &mut Vec<u8>, stub: &Stub) -> Result<()> {
    out.extend_from_slice(&MAGIC);
    write_u8(out, VERSION);
    write_u32(out, stub.stub_id);
    write_u8(out, stub.is_vararg as u8);

    write_u8(out, small_count(stub.arg_names.len(), "argument")?);
    for name in &stub.arg_names {
        write_str(out, name)?;
    }
    write_u8(out, small_count(stub.local_names.len(), "local")?);
    for name in &stub.local_names {
        write_str(out, name)?;
    }
    write_u32(out, u32::try_from(stub.strings.len())?);
    for s in &stub.strings {
        write_str(out, s)?;
    }

    let capture_count =
        u16::try_from(stub.captures.len()).map_err(|_| anyhow!("stub {} has too many captures", stub.stub_id))?;
    write_u16(out, capture_count);
    for capture in &stub.captures {
        write_u32(out, capture.stub_id);
        write_u32(out, capture.slot);
    }

    write_u32(out, u32::try_from(stub.instructions.len())?);
    let base_line = stub.instructions.iter().map(|ins| ins.line).min().unwrap_or(0);
    write_u32(out, base_line);
    for ins in &stub.instructions {
        let delta = ins.line - base_line;
        ensure!(
            delta <= u16::MAX as u32,
            "line {} is too far from base line {} in stub {}",
            ins.line,
            base_line,
            stub.stub_id
        );
        write_u16(out, delta as u16);
        write_u8(out, ins.opcode);
        match ins.operand {
            Operand::Stub(id) => {
                write_u32(out, id);
                write_u32(out, 0);
            }
            Operand::Number(n) => write_f64(out, n),
        }
    }
    Ok(())
}

fn small_count(len: usize, what: &str) -> Result<u8> {
    u8::try_from(len).map_err(|_| anyhow!("too many {} names ({})", what, len))
}

fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_f64(out: &mut Vec<u8>, value: f64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_str(out: &mut Vec<u8>, value: &str) -> Result<()> {
    write_u32(out, u32::try_from(value.chars().count())?);
    out.extend_from_slice(value.as_bytes());
    Ok(())
}
