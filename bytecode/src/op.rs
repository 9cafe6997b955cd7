/// Bytecode opcodes of the MicroJava virtual machine.
///
/// Opcodes are numbered from 1. Immediate operands follow the opcode byte and
/// are big-endian: `b` is one byte, `s` two bytes, `w` four bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Op {
    /// Push a local slot. Operands: `slot:b`
    Load = 1,
    Load0,
    Load1,
    Load2,
    Load3,

    /// Pop into a local slot. Operands: `slot:b`
    Store,
    Store0,
    Store1,
    Store2,
    Store3,

    /// Push a global data word. Operands: `idx:s`
    GetStatic,
    /// Pop into a global data word. Operands: `idx:s`
    PutStatic,
    /// Replace the object address on top of the stack with one of its fields.
    /// Operands: `offset:s`
    GetField,
    /// Pop a value and an object address, store the value into the field.
    /// Operands: `offset:s`
    PutField,

    Const0,
    Const1,
    Const2,
    Const3,
    Const4,
    Const5,
    ConstM1,
    /// Push a 32-bit constant. Operands: `value:w`
    Const,

    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    Shl,
    Shr,

    /// Allocate an object. Operands: `size:s` (words)
    New,
    /// Allocate an array, length popped from the stack.
    /// Operands: `elem:b` (0 = bytes, 1 = words)
    NewArray,
    ALoad,
    AStore,
    BALoad,
    BAStore,
    ArrayLength,
    Pop,

    /// Operands: `target:s` (absolute code address)
    Jmp,
    /// Conditional jumps compare the two topmost values.
    /// Operands: `target:s`
    Jeq,
    Jne,
    Jlt,
    Jle,
    Jgt,
    Jge,

    /// Operands: `target:s`
    Call,
    Return,
    /// Build a stack frame. Operands: `params:b`, `locals:b`
    Enter,
    Exit,
    Read,
    Print,
    BRead,
    BPrint,
    /// Abort execution. Operands: `code:b`
    Trap,
}

impl Op {
    pub const FIRST: u8 = Op::Load as u8;
    pub const LAST: u8 = Op::Trap as u8;

    /// Number of immediate operand bytes following the opcode.
    pub const fn operand_len(self) -> usize {
        match self {
            Op::Load | Op::Store | Op::NewArray | Op::Trap => 1,
            Op::GetStatic
            | Op::PutStatic
            | Op::GetField
            | Op::PutField
            | Op::New
            | Op::Jmp
            | Op::Jeq
            | Op::Jne
            | Op::Jlt
            | Op::Jle
            | Op::Jgt
            | Op::Jge
            | Op::Call
            | Op::Enter => 2,
            Op::Const => 4,
            _ => 0,
        }
    }

    /// Whether the opcode is one of the jumps carrying a 2-byte target.
    pub const fn is_jump(self) -> bool {
        matches!(
            self,
            Op::Jmp | Op::Jeq | Op::Jne | Op::Jlt | Op::Jle | Op::Jgt | Op::Jge
        )
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            Op::Load => "load",
            Op::Load0 => "load_0",
            Op::Load1 => "load_1",
            Op::Load2 => "load_2",
            Op::Load3 => "load_3",
            Op::Store => "store",
            Op::Store0 => "store_0",
            Op::Store1 => "store_1",
            Op::Store2 => "store_2",
            Op::Store3 => "store_3",
            Op::GetStatic => "getstatic",
            Op::PutStatic => "putstatic",
            Op::GetField => "getfield",
            Op::PutField => "putfield",
            Op::Const0 => "const_0",
            Op::Const1 => "const_1",
            Op::Const2 => "const_2",
            Op::Const3 => "const_3",
            Op::Const4 => "const_4",
            Op::Const5 => "const_5",
            Op::ConstM1 => "const_m1",
            Op::Const => "const",
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::Div => "div",
            Op::Rem => "rem",
            Op::Neg => "neg",
            Op::Shl => "shl",
            Op::Shr => "shr",
            Op::New => "new",
            Op::NewArray => "newarray",
            Op::ALoad => "aload",
            Op::AStore => "astore",
            Op::BALoad => "baload",
            Op::BAStore => "bastore",
            Op::ArrayLength => "arraylength",
            Op::Pop => "pop",
            Op::Jmp => "jmp",
            Op::Jeq => "jeq",
            Op::Jne => "jne",
            Op::Jlt => "jlt",
            Op::Jle => "jle",
            Op::Jgt => "jgt",
            Op::Jge => "jge",
            Op::Call => "call",
            Op::Return => "return",
            Op::Enter => "enter",
            Op::Exit => "exit",
            Op::Read => "read",
            Op::Print => "print",
            Op::BRead => "bread",
            Op::BPrint => "bprint",
            Op::Trap => "trap",
        }
    }
}

impl TryFrom<u8> for Op {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        if (Self::FIRST..=Self::LAST).contains(&byte) {
            // SAFETY: Op is repr(u8) with contiguous variants from FIRST to LAST.
            Ok(unsafe { core::mem::transmute::<u8, Op>(byte) })
        } else {
            Err(byte)
        }
    }
}

/// Relational operators of a condition, in the order of the conditional jumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl RelOp {
    /// Logical negation: eq/ne, lt/ge, le/gt.
    pub const fn inverse(self) -> RelOp {
        match self {
            RelOp::Eq => RelOp::Ne,
            RelOp::Ne => RelOp::Eq,
            RelOp::Lt => RelOp::Ge,
            RelOp::Ge => RelOp::Lt,
            RelOp::Le => RelOp::Gt,
            RelOp::Gt => RelOp::Le,
        }
    }

    /// The conditional jump taken when the relation holds.
    pub const fn jump(self) -> Op {
        match self {
            RelOp::Eq => Op::Jeq,
            RelOp::Ne => Op::Jne,
            RelOp::Lt => Op::Jlt,
            RelOp::Le => Op::Jle,
            RelOp::Gt => Op::Jgt,
            RelOp::Ge => Op::Jge,
        }
    }

    pub const fn is_equality(self) -> bool {
        matches!(self, RelOp::Eq | RelOp::Ne)
    }
}
