//! Object file layout: the (transformed) code body followed by a fixed
//! 14-byte trailer.
//!
//! ```text
//! 'M' 'J' | code_size: u32 | data_size: u32 | main_pc: i32     (big-endian)
//! ```

use core::fmt;
use std::io::{self, Write};

use crate::builder::CodeBuffer;

pub const MAGIC: [u8; 2] = *b"MJ";
pub const TRAILER_LEN: usize = 14;

/// Byte transform applied to the code body before it is written.
///
/// The trailer always describes the untransformed code.
pub trait CodeTransform {
    fn apply(&self, code: &mut [u8]);
}

/// Leaves the code body unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl CodeTransform for Identity {
    fn apply(&self, _code: &mut [u8]) {}
}

impl<F: Fn(&mut [u8])> CodeTransform for F {
    fn apply(&self, code: &mut [u8]) {
        self(code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    pub code_size: u32,
    pub data_size: u32,
    /// `-1` when the program has no `main`.
    pub main_pc: i32,
}

impl Trailer {
    pub fn of(code: &CodeBuffer) -> Self {
        Self {
            code_size: code.pc() as u32,
            data_size: code.data_size(),
            main_pc: code.main_pc().map_or(-1, i32::from),
        }
    }

    pub fn to_bytes(&self) -> [u8; TRAILER_LEN] {
        let mut out = [0u8; TRAILER_LEN];
        out[0..2].copy_from_slice(&MAGIC);
        out[2..6].copy_from_slice(&self.code_size.to_be_bytes());
        out[6..10].copy_from_slice(&self.data_size.to_be_bytes());
        out[10..14].copy_from_slice(&self.main_pc.to_be_bytes());
        out
    }

    /// Read the trailer at the end of an object file.
    pub fn from_object(bytes: &[u8]) -> Option<Self> {
        let start = bytes.len().checked_sub(TRAILER_LEN)?;
        let t = &bytes[start..];
        if t[0..2] != MAGIC {
            return None;
        }
        let word = |i: usize| [t[i], t[i + 1], t[i + 2], t[i + 3]];
        Some(Self {
            code_size: u32::from_be_bytes(word(2)),
            data_size: u32::from_be_bytes(word(6)),
            main_pc: i32::from_be_bytes(word(10)),
        })
    }
}

#[derive(Debug)]
pub enum ObjectError {
    /// The code buffer overflowed during compilation.
    Overflow,
    /// The compilation reported this many errors.
    Rejected(usize),
    Io(io::Error),
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overflow => write!(f, "program too large, no object file written"),
            Self::Rejected(n) => write!(f, "{n} errors detected, no object file written"),
            Self::Io(e) => write!(f, "cannot write object file: {e}"),
        }
    }
}

impl std::error::Error for ObjectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Overflow | Self::Rejected(_) => None,
        }
    }
}

impl From<io::Error> for ObjectError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl CodeBuffer {
    /// Write the transformed code body followed by the trailer.
    pub fn finalize<W: Write>(
        &self,
        transform: &dyn CodeTransform,
        out: &mut W,
    ) -> Result<(), ObjectError> {
        if self.overflowed() {
            return Err(ObjectError::Overflow);
        }
        let trailer = Trailer::of(self);
        let mut body = self.as_bytes().to_vec();
        transform.apply(&mut body);
        out.write_all(&body)?;
        out.write_all(&trailer.to_bytes())?;
        out.flush()?;
        log::debug!(
            "object written: {} code bytes, {} data words, main at {}",
            trailer.code_size,
            trailer.data_size,
            trailer.main_pc
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::Op;

    #[test]
    fn trailer_layout() {
        let mut code = CodeBuffer::new();
        code.emit_op(Op::Return);
        code.inc_data_size();
        code.set_main_pc(0);

        let mut out = Vec::new();
        code.finalize(&Identity, &mut out).unwrap();
        assert_eq!(out, vec![
            Op::Return as u8,
            b'M', b'J',
            0, 0, 0, 1,
            0, 0, 0, 1,
            0, 0, 0, 0,
        ]);
    }

    #[test]
    fn missing_main_is_minus_one() {
        let code = CodeBuffer::new();
        let mut out = Vec::new();
        code.finalize(&Identity, &mut out).unwrap();
        let trailer = Trailer::from_object(&out).unwrap();
        assert_eq!(trailer, Trailer { code_size: 0, data_size: 0, main_pc: -1 });
    }

    #[test]
    fn transform_touches_body_only() {
        let mut code = CodeBuffer::new();
        code.emit_op(Op::Add);
        code.emit_op(Op::Sub);
        let xor = |body: &mut [u8]| body.iter_mut().for_each(|b| *b ^= 0xFF);

        let mut out = Vec::new();
        code.finalize(&xor, &mut out).unwrap();
        assert_eq!(&out[..2], &[!(Op::Add as u8), !(Op::Sub as u8)]);
        assert_eq!(Trailer::from_object(&out).unwrap().code_size, 2);
    }

    #[test]
    fn overflow_refuses_to_write() {
        let mut code = CodeBuffer::with_capacity(1);
        code.emit_short(1);
        let mut out = Vec::new();
        assert!(matches!(
            code.finalize(&Identity, &mut out),
            Err(ObjectError::Overflow)
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn io_failure_is_reported() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::other("disk full"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let code = CodeBuffer::new();
        let err = code.finalize(&Identity, &mut Broken).unwrap_err();
        assert!(err.to_string().contains("disk full"));
    }
}
