use core::fmt;

use crate::op::Op;

/// A decoded instruction with its immediate operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Load { slot: u8 },
    LoadN { slot: u8 },
    Store { slot: u8 },
    StoreN { slot: u8 },
    GetStatic { idx: u16 },
    PutStatic { idx: u16 },
    GetField { offset: u16 },
    PutField { offset: u16 },
    /// One of `const_0..5` or `const_m1`.
    ConstN { value: i32 },
    Const { value: i32 },
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    Shl,
    Shr,
    New { size: u16 },
    NewArray { elem: u8 },
    ALoad,
    AStore,
    BALoad,
    BAStore,
    ArrayLength,
    Pop,
    /// Unconditional or conditional jump; `op` is one of the jump opcodes.
    Jump { op: Op, target: u16 },
    Call { target: u16 },
    Return,
    Enter { params: u8, locals: u8 },
    Exit,
    Read,
    Print,
    BRead,
    BPrint,
    Trap { code: u8 },
}

impl Instruction {
    /// The opcode this instruction was decoded from.
    pub fn op(&self) -> Op {
        match *self {
            Self::Load { .. } => Op::Load,
            Self::LoadN { slot } => match slot {
                0 => Op::Load0,
                1 => Op::Load1,
                2 => Op::Load2,
                _ => Op::Load3,
            },
            Self::Store { .. } => Op::Store,
            Self::StoreN { slot } => match slot {
                0 => Op::Store0,
                1 => Op::Store1,
                2 => Op::Store2,
                _ => Op::Store3,
            },
            Self::GetStatic { .. } => Op::GetStatic,
            Self::PutStatic { .. } => Op::PutStatic,
            Self::GetField { .. } => Op::GetField,
            Self::PutField { .. } => Op::PutField,
            Self::ConstN { value } => match value {
                -1 => Op::ConstM1,
                0 => Op::Const0,
                1 => Op::Const1,
                2 => Op::Const2,
                3 => Op::Const3,
                4 => Op::Const4,
                _ => Op::Const5,
            },
            Self::Const { .. } => Op::Const,
            Self::Add => Op::Add,
            Self::Sub => Op::Sub,
            Self::Mul => Op::Mul,
            Self::Div => Op::Div,
            Self::Rem => Op::Rem,
            Self::Neg => Op::Neg,
            Self::Shl => Op::Shl,
            Self::Shr => Op::Shr,
            Self::New { .. } => Op::New,
            Self::NewArray { .. } => Op::NewArray,
            Self::ALoad => Op::ALoad,
            Self::AStore => Op::AStore,
            Self::BALoad => Op::BALoad,
            Self::BAStore => Op::BAStore,
            Self::ArrayLength => Op::ArrayLength,
            Self::Pop => Op::Pop,
            Self::Jump { op, .. } => op,
            Self::Call { .. } => Op::Call,
            Self::Return => Op::Return,
            Self::Enter { .. } => Op::Enter,
            Self::Exit => Op::Exit,
            Self::Read => Op::Read,
            Self::Print => Op::Print,
            Self::BRead => Op::BRead,
            Self::BPrint => Op::BPrint,
            Self::Trap { .. } => Op::Trap,
        }
    }

    /// Encoded length in bytes, opcode included.
    pub fn encoded_len(&self) -> usize {
        1 + self.op().operand_len()
    }

    /// Jump or call target, if the instruction carries one.
    pub fn target(&self) -> Option<u16> {
        match *self {
            Self::Jump { target, .. } | Self::Call { target } => Some(target),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.op().mnemonic();
        match *self {
            Self::Load { slot } | Self::Store { slot } => write!(f, "{name} {slot}"),
            Self::GetStatic { idx } | Self::PutStatic { idx } => {
                write!(f, "{name} #{idx}")
            }
            Self::GetField { offset } | Self::PutField { offset } => {
                write!(f, "{name} .{offset}")
            }
            Self::Const { value } => write!(f, "{name} {value}"),
            Self::New { size } => write!(f, "{name} {size}"),
            Self::NewArray { elem } => write!(f, "{name} {elem}"),
            Self::Jump { target, .. } | Self::Call { target } => {
                write!(f, "{name} @{target}")
            }
            Self::Enter { params, locals } => write!(f, "{name} {params} {locals}"),
            Self::Trap { code } => write!(f, "{name} {code}"),
            _ => f.write_str(name),
        }
    }
}
