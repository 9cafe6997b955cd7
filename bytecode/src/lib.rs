mod op;
mod instruction;
mod builder;
mod decoder;
mod object;

pub use op::{Op, RelOp};
pub use instruction::Instruction;
pub use builder::{CodeBuffer, DEFAULT_CAPACITY, MAX_CAPACITY};
pub use decoder::{BytecodeDecoder, DecodeError, disassemble};
pub use object::{CodeTransform, Identity, MAGIC, ObjectError, TRAILER_LEN, Trailer};
