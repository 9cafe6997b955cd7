use core::fmt;

use crate::instruction::Instruction;
use crate::op::Op;

/// Malformed code encountered while decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    UnknownOpcode { offset: usize, byte: u8 },
    Truncated { offset: usize, op: Op },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOpcode { offset, byte } => {
                write!(f, "unknown opcode {byte} at offset {offset}")
            }
            Self::Truncated { offset, op } => {
                write!(f, "truncated operand of {} at offset {offset}", op.mnemonic())
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decodes a code body into [`Instruction`]s.
///
/// Unlike the VM's interpreter loop this decoder checks every read, so it can
/// be pointed at arbitrary bytes. It stops after the first error.
pub struct BytecodeDecoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> BytecodeDecoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            failed: false,
        }
    }

    /// Current byte offset in the stream.
    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Decode the next instruction, or `None` at end-of-stream.
    pub fn decode_next(&mut self) -> Option<Result<Instruction, DecodeError>> {
        if self.is_at_end() || self.failed {
            return None;
        }
        let result = self.decode();
        self.failed = result.is_err();
        Some(result)
    }

    fn decode(&mut self) -> Result<Instruction, DecodeError> {
        let offset = self.pos;
        let byte = self.bytes[offset];
        let op = Op::try_from(byte)
            .map_err(|byte| DecodeError::UnknownOpcode { offset, byte })?;
        let end = offset + 1 + op.operand_len();
        if end > self.bytes.len() {
            return Err(DecodeError::Truncated { offset, op });
        }
        let operands = &self.bytes[offset + 1..end];
        self.pos = end;

        let b = |i: usize| operands[i];
        let s = |i: usize| u16::from_be_bytes([operands[i], operands[i + 1]]);

        let insn = match op {
            Op::Load => Instruction::Load { slot: b(0) },
            Op::Load0 | Op::Load1 | Op::Load2 | Op::Load3 => Instruction::LoadN {
                slot: byte - Op::Load0 as u8,
            },
            Op::Store => Instruction::Store { slot: b(0) },
            Op::Store0 | Op::Store1 | Op::Store2 | Op::Store3 => Instruction::StoreN {
                slot: byte - Op::Store0 as u8,
            },
            Op::GetStatic => Instruction::GetStatic { idx: s(0) },
            Op::PutStatic => Instruction::PutStatic { idx: s(0) },
            Op::GetField => Instruction::GetField { offset: s(0) },
            Op::PutField => Instruction::PutField { offset: s(0) },
            Op::Const0 | Op::Const1 | Op::Const2 | Op::Const3 | Op::Const4 | Op::Const5 => {
                Instruction::ConstN {
                    value: (byte - Op::Const0 as u8) as i32,
                }
            }
            Op::ConstM1 => Instruction::ConstN { value: -1 },
            Op::Const => Instruction::Const {
                value: i32::from_be_bytes([operands[0], operands[1], operands[2], operands[3]]),
            },
            Op::Add => Instruction::Add,
            Op::Sub => Instruction::Sub,
            Op::Mul => Instruction::Mul,
            Op::Div => Instruction::Div,
            Op::Rem => Instruction::Rem,
            Op::Neg => Instruction::Neg,
            Op::Shl => Instruction::Shl,
            Op::Shr => Instruction::Shr,
            Op::New => Instruction::New { size: s(0) },
            Op::NewArray => Instruction::NewArray { elem: b(0) },
            Op::ALoad => Instruction::ALoad,
            Op::AStore => Instruction::AStore,
            Op::BALoad => Instruction::BALoad,
            Op::BAStore => Instruction::BAStore,
            Op::ArrayLength => Instruction::ArrayLength,
            Op::Pop => Instruction::Pop,
            Op::Jmp | Op::Jeq | Op::Jne | Op::Jlt | Op::Jle | Op::Jgt | Op::Jge => {
                Instruction::Jump { op, target: s(0) }
            }
            Op::Call => Instruction::Call { target: s(0) },
            Op::Return => Instruction::Return,
            Op::Enter => Instruction::Enter {
                params: b(0),
                locals: b(1),
            },
            Op::Exit => Instruction::Exit,
            Op::Read => Instruction::Read,
            Op::Print => Instruction::Print,
            Op::BRead => Instruction::BRead,
            Op::BPrint => Instruction::BPrint,
            Op::Trap => Instruction::Trap { code: b(0) },
        };
        Ok(insn)
    }
}

impl<'a> Iterator for BytecodeDecoder<'a> {
    type Item = Result<Instruction, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decode_next()
    }
}

/// Decode a whole code body into `(offset, instruction)` pairs.
pub fn disassemble(bytes: &[u8]) -> Result<Vec<(usize, Instruction)>, DecodeError> {
    let mut decoder = BytecodeDecoder::new(bytes);
    let mut out = Vec::new();
    loop {
        let offset = decoder.offset();
        match decoder.decode_next() {
            Some(insn) => out.push((offset, insn?)),
            None => return Ok(out),
        }
    }
}
