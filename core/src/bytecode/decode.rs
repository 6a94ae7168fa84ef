use std::rc::Rc;

use anyhow::{Context, Result, bail, ensure};
use tracing::debug;

use super::{CaptureDesc, Instruction, MAGIC, Opcode, Operand, Stub, VERSION};

/// Decode every stub record in `bytes`, tagging each with `file_id`.
///
/// Records are read back to back until the buffer is exhausted; an empty buffer
/// yields no stubs. A missing header or an unsupported version is an error, as is
/// a record cut short.
pub fn decode_stubs(file_id: u32, bytes: &[u8]) -> Result<Vec<Stub>> {
    let mut cursor = 0usize;
    let mut stubs = Vec::new();
    while cursor < bytes.len() {
        let stub = decode_stub(file_id, bytes, &mut cursor)
            .with_context(|| format!("decoding stub record #{} of file {}", stubs.len(), file_id))?;
        stubs.push(stub);
    }
    debug!(target: "mat::decode", file_id, stubs = stubs.len(), "decoded bytecode");
    Ok(stubs)
}

fn decode_stub(file_id: u32, bytes: &[u8], cursor: &mut usize) -> Result<Stub> {
    ensure!(
        bytes.len() >= *cursor + MAGIC.len() + 1,
        "missing stub header at offset {}",
        *cursor
    );
    ensure!(
        bytes[*cursor..*cursor + MAGIC.len()] == MAGIC,
        "invalid stub magic at offset {}",
        *cursor
    );
    *cursor += MAGIC.len();
    let version = read_u8(bytes, cursor)?;
    ensure!(
        version == VERSION,
        "unsupported stub version {} (reader supports {})",
        version,
        VERSION
    );

    let mut stub = Stub::new(file_id, read_u32(bytes, cursor)?);
    stub.is_vararg = read_u8(bytes, cursor)? != 0;

    let arg_count = read_u8(bytes, cursor)? as usize;
    stub.arg_names = read_strings(bytes, cursor, arg_count)?;
    let local_count = read_u8(bytes, cursor)? as usize;
    stub.local_names = read_strings(bytes, cursor, local_count)?;
    let string_count = read_u32(bytes, cursor)? as usize;
    stub.strings = read_strings(bytes, cursor, string_count)?;

    let capture_count = read_u16(bytes, cursor)? as usize;
    stub.captures = Vec::with_capacity(capture_count);
    for _ in 0..capture_count {
        let stub_id = read_u32(bytes, cursor)?;
        let slot = read_u32(bytes, cursor)?;
        stub.captures.push(CaptureDesc { stub_id, slot });
    }

    let instruction_count = read_u32(bytes, cursor)? as usize;
    let base_line = read_u32(bytes, cursor)?;
    stub.instructions = Vec::with_capacity(instruction_count.min(bytes.len()));
    for _ in 0..instruction_count {
        let delta = read_u16(bytes, cursor)?;
        let opcode = read_u8(bytes, cursor)?;
        let operand = if Opcode::takes_stub_operand(opcode) {
            let id = read_u32(bytes, cursor)?;
            let _reserved = read_u32(bytes, cursor)?;
            Operand::Stub(id)
        } else {
            Operand::Number(read_f64(bytes, cursor)?)
        };
        stub.instructions.push(Instruction {
            line: base_line.wrapping_add(delta as u32),
            opcode,
            operand,
        });
    }
    Ok(stub)
}

fn read_strings(bytes: &[u8], cursor: &mut usize, count: usize) -> Result<Vec<Rc<str>>> {
    let mut out = Vec::with_capacity(count.min(bytes.len()));
    for _ in 0..count {
        out.push(Rc::from(read_string(bytes, cursor)?));
    }
    Ok(out)
}

/// Length-prefixed string: a `u32` codepoint count followed by UTF-8 sequences.
///
/// Sequences are walked by their leading byte. A continuation byte that is missing
/// because the buffer ended counts as 0 and is not consumed; leading bytes that
/// match no UTF-8 pattern are taken as a codepoint on their own.
fn read_string(bytes: &[u8], cursor: &mut usize) -> Result<String> {
    let count = read_u32(bytes, cursor)? as usize;
    let mut out = String::with_capacity(count.min(bytes.len()));
    for _ in 0..count {
        let lead = read_u8(bytes, cursor)?;
        let (initial, continuation) = match lead {
            0x00..=0x7F => (lead as u32, 0),
            _ if lead & 0xE0 == 0xC0 => ((lead & 0x1F) as u32, 1),
            _ if lead & 0xF0 == 0xE0 => ((lead & 0x0F) as u32, 2),
            _ if lead & 0xF8 == 0xF0 => ((lead & 0x07) as u32, 3),
            _ => (lead as u32, 0),
        };
        let mut codepoint = initial;
        for _ in 0..continuation {
            let next = match bytes.get(*cursor) {
                Some(byte) => {
                    *cursor += 1;
                    (byte & 0x3F) as u32
                }
                None => 0,
            };
            codepoint = (codepoint << 6) | next;
        }
        out.push(char::from_u32(codepoint).unwrap_or(char::REPLACEMENT_CHARACTER));
    }
    Ok(out)
}

fn read_u8(bytes: &[u8], cursor: &mut usize) -> Result<u8> {
    match bytes.get(*cursor) {
        Some(byte) => {
            *cursor += 1;
            Ok(*byte)
        }
        None => bail!("unexpected end of bytecode at offset {}", *cursor),
    }
}

fn take<const N: usize>(bytes: &[u8], cursor: &mut usize) -> Result<[u8; N]> {
    ensure!(
        *cursor + N <= bytes.len(),
        "unexpected end of bytecode at offset {} (need {} bytes)",
        *cursor,
        N
    );
    let mut buf = [0u8; N];
    buf.copy_from_slice(&bytes[*cursor..*cursor + N]);
    *cursor += N;
    Ok(buf)
}

fn read_u16(bytes: &[u8], cursor: &mut usize) -> Result<u16> {
    Ok(u16::from_le_bytes(take::<2>(bytes, cursor)?))
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32> {
    Ok(u32::from_le_bytes(take::<4>(bytes, cursor)?))
}

fn read_f64(bytes: &[u8], cursor: &mut usize) -> Result<f64> {
    Ok(f64::from_le_bytes(take::<8>(bytes, cursor)?))
}

#[cfg(test)]
pub(super) fn decode_string_for_test(bytes: &[u8]) -> Result<String> {
    let mut cursor = 0;
    read_string(bytes, &mut cursor)
}
