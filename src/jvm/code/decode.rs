//! Decode a code array back into instructions
//!
//! This is the inverse of what the code buffer emits, at the level of opcodes and operands. Short
//! forms of loads and stores are expanded (`iload_2` decodes as `iload 2`) and the `wide` prefix
//! is folded into the instruction it modifies. Jump and switch targets are absolute offsets.

use super::instructions::WIDE;
use crate::jvm::BaseType;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Error, ErrorKind, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodedInstruction {
    /// Opcode with no operands
    Plain(u8),

    /// `bipush`, `sipush`, or `newarray` with its immediate operand
    Immediate(u8, i32),

    /// Load, store, or `ret` with its local index (`wide` or not)
    Local(u8, u16),
    IInc { slot: u16, increment: i16 },

    /// Opcode followed by a constant pool index (`ldc`, field and method instructions, etc.)
    Constant(u8, u16),
    InvokeInterface { index: u16, count: u8 },
    MultiANewArray { index: u16, dimensions: u8 },

    /// Jump (short or wide) to an absolute offset
    Jump(u8, usize),
    TableSwitch {
        default: usize,
        low: i32,
        targets: Vec<usize>,
    },
    LookupSwitch {
        default: usize,
        pairs: Vec<(i32, usize)>,
    },
}

impl DecodedInstruction {
    /// Offset a switch sends a key to
    pub fn switch_target(&self, value: i32) -> Option<usize> {
        match self {
            DecodedInstruction::TableSwitch {
                default,
                low,
                targets,
            } => {
                let idx = value as i64 - *low as i64;
                if idx >= 0 && (idx as usize) < targets.len() {
                    Some(targets[idx as usize])
                } else {
                    Some(*default)
                }
            }
            DecodedInstruction::LookupSwitch { default, pairs } => Some(
                pairs
                    .binary_search_by_key(&value, |(key, _)| *key)
                    .map_or(*default, |idx| pairs[idx].1),
            ),
            _ => None,
        }
    }

    /// Opcode (for `wide` instructions, the modified opcode)
    pub fn opcode(&self) -> u8 {
        match self {
            DecodedInstruction::Plain(opcode)
            | DecodedInstruction::Immediate(opcode, _)
            | DecodedInstruction::Local(opcode, _)
            | DecodedInstruction::Constant(opcode, _)
            | DecodedInstruction::Jump(opcode, _) => *opcode,
            DecodedInstruction::IInc { .. } => 0x84,
            DecodedInstruction::InvokeInterface { .. } => 0xb9,
            DecodedInstruction::MultiANewArray { .. } => 0xc5,
            DecodedInstruction::TableSwitch { .. } => 0xaa,
            DecodedInstruction::LookupSwitch { .. } => 0xab,
        }
    }
}

fn invalid(message: String) -> Error {
    Error::new(ErrorKind::InvalidData, message)
}

fn relative(base: usize, offset: i64) -> Result<usize> {
    let target = base as i64 + offset;
    if target < 0 {
        Err(invalid(format!("jump from {} to negative offset {}", base, target)))
    } else {
        Ok(target as usize)
    }
}

/// Decode every instruction of a code array, along with its offset
pub fn decode_code(code: &[u8]) -> Result<Vec<(usize, DecodedInstruction)>> {
    let mut cursor = Cursor::new(code);
    let mut decoded = vec![];
    while (cursor.position() as usize) < code.len() {
        let offset = cursor.position() as usize;
        let insn = decode_instruction(offset, &mut cursor)?;
        decoded.push((offset, insn));
    }
    Ok(decoded)
}

fn decode_instruction(offset: usize, cursor: &mut Cursor<&[u8]>) -> Result<DecodedInstruction> {
    use DecodedInstruction::*;

    let opcode = cursor.read_u8()?;
    Ok(match opcode {
        0x10 => Immediate(opcode, cursor.read_i8()? as i32),
        0x11 => Immediate(opcode, cursor.read_i16::<BigEndian>()? as i32),
        0xbc => {
            let type_code = cursor.read_u8()?;
            if BaseType::from_array_type_code(type_code).is_none() {
                return Err(invalid(format!("bad newarray type code {}", type_code)));
            }
            Immediate(opcode, type_code as i32)
        }

        0x12 => Constant(opcode, cursor.read_u8()? as u16),
        0x13 | 0x14 | 0xb2..=0xb8 | 0xbb | 0xbd | 0xc0 | 0xc1 => {
            Constant(opcode, cursor.read_u16::<BigEndian>()?)
        }
        0xb9 => {
            let index = cursor.read_u16::<BigEndian>()?;
            let count = cursor.read_u8()?;
            let _zero = cursor.read_u8()?;
            InvokeInterface { index, count }
        }
        0xc5 => MultiANewArray {
            index: cursor.read_u16::<BigEndian>()?,
            dimensions: cursor.read_u8()?,
        },

        0x15..=0x19 | 0x36..=0x3a | 0xa9 => Local(opcode, cursor.read_u8()? as u16),
        0x1a..=0x2d => Local(0x15 + (opcode - 0x1a) / 4, ((opcode - 0x1a) % 4) as u16),
        0x3b..=0x4e => Local(0x36 + (opcode - 0x3b) / 4, ((opcode - 0x3b) % 4) as u16),
        0x84 => IInc {
            slot: cursor.read_u8()? as u16,
            increment: cursor.read_i8()? as i16,
        },
        WIDE => match cursor.read_u8()? {
            0x84 => IInc {
                slot: cursor.read_u16::<BigEndian>()?,
                increment: cursor.read_i16::<BigEndian>()?,
            },
            modified @ (0x15..=0x19 | 0x36..=0x3a | 0xa9) => {
                Local(modified, cursor.read_u16::<BigEndian>()?)
            }
            other => return Err(invalid(format!("opcode {:#x} cannot be wide", other))),
        },

        0x99..=0xa8 | 0xc6 | 0xc7 => {
            Jump(opcode, relative(offset, cursor.read_i16::<BigEndian>()? as i64)?)
        }
        0xc8 | 0xc9 => Jump(opcode, relative(offset, cursor.read_i32::<BigEndian>()? as i64)?),

        0xaa | 0xab => {
            let padding = 3 - offset % 4;
            for _ in 0..padding {
                cursor.read_u8()?;
            }
            let default = relative(offset, cursor.read_i32::<BigEndian>()? as i64)?;
            if opcode == 0xaa {
                let low = cursor.read_i32::<BigEndian>()?;
                let high = cursor.read_i32::<BigEndian>()?;
                if high < low {
                    return Err(invalid(format!("tableswitch bounds {}..={}", low, high)));
                }
                let mut targets = vec![];
                for _ in low as i64..=high as i64 {
                    targets.push(relative(offset, cursor.read_i32::<BigEndian>()? as i64)?);
                }
                TableSwitch {
                    default,
                    low,
                    targets,
                }
            } else {
                let count = cursor.read_i32::<BigEndian>()?;
                let mut pairs = vec![];
                for _ in 0..count {
                    let key = cursor.read_i32::<BigEndian>()?;
                    pairs.push((key, relative(offset, cursor.read_i32::<BigEndian>()? as i64)?));
                }
                LookupSwitch { default, pairs }
            }
        }

        0x00..=0x0f
        | 0x2e..=0x35
        | 0x4f..=0x83
        | 0x85..=0x98
        | 0xac..=0xb1
        | 0xbe
        | 0xbf
        | 0xc2
        | 0xc3 => Plain(opcode),

        other => return Err(invalid(format!("unsupported opcode {:#x}", other))),
    })
}
