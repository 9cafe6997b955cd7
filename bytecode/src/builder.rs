use crate::op::{Op, RelOp};

/// Maximum size of a code body in bytes.
pub const DEFAULT_CAPACITY: usize = 8192;

/// Largest capacity whose addresses all fit the 2-byte jump and call fields.
pub const MAX_CAPACITY: usize = u16::MAX as usize;

/// Fixed-capacity byte buffer the compiler emits code into.
///
/// Jump targets are absolute code addresses. A forward jump is emitted with a
/// placeholder target; the returned field position is later resolved with
/// [`fixup`](Self::fixup).
///
/// Once the capacity is reached further bytes are dropped and
/// [`overflowed`](Self::overflowed) turns true. The cursor never moves past
/// the capacity.
#[derive(Debug, Clone)]
pub struct CodeBuffer {
    buf: Vec<u8>,
    capacity: usize,
    overflowed: bool,
    main_pc: Option<u16>,
    data_size: u32,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Buffer holding at most `capacity` bytes, clamped to [`MAX_CAPACITY`].
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.min(MAX_CAPACITY);
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            overflowed: false,
            main_pc: None,
            data_size: 0,
        }
    }

    /// Address of the next byte to be emitted.
    pub fn pc(&self) -> usize {
        self.buf.len()
    }

    /// [`pc`](Self::pc) as a 2-byte code address.
    pub fn address(&self) -> u16 {
        u16::try_from(self.pc()).unwrap_or(u16::MAX)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether an emit was dropped because the buffer was full.
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn main_pc(&self) -> Option<u16> {
        self.main_pc
    }

    pub fn set_main_pc(&mut self, pc: u16) {
        self.main_pc = Some(pc);
    }

    /// Number of global data words.
    pub fn data_size(&self) -> u32 {
        self.data_size
    }

    pub fn inc_data_size(&mut self) {
        self.data_size += 1;
    }

    // ── emit helpers ───────────────────────────────────────────────

    pub fn emit_byte(&mut self, v: u8) {
        if self.buf.len() >= self.capacity {
            if !self.overflowed {
                log::warn!("code buffer full at {} bytes", self.capacity);
            }
            self.overflowed = true;
            return;
        }
        self.buf.push(v);
    }

    pub fn emit_op(&mut self, op: Op) {
        self.emit_byte(op as u8);
    }

    /// Big-endian 16-bit value.
    pub fn emit_short(&mut self, v: u16) {
        for b in v.to_be_bytes() {
            self.emit_byte(b);
        }
    }

    /// Big-endian 32-bit value, written as two shorts.
    pub fn emit_word(&mut self, v: i32) {
        let v = v as u32;
        self.emit_short((v >> 16) as u16);
        self.emit_short(v as u16);
    }

    /// Overwrite the 2-byte field at `pos` without moving the cursor.
    /// Fields that were never emitted (after an overflow) are left alone.
    pub fn patch_short(&mut self, pos: usize, v: u16) {
        if let Some(field) = self.buf.get_mut(pos..pos + 2) {
            field.copy_from_slice(&v.to_be_bytes());
        }
    }

    // ── jumps ──────────────────────────────────────────────────────

    /// Emit `jmp target`. Returns the position of the target field.
    pub fn put_jump(&mut self, target: usize) -> usize {
        self.emit_jump(Op::Jmp, target)
    }

    /// Emit the conditional jump taken when `relop` does NOT hold.
    /// Returns the position of the target field.
    pub fn put_false_jump(&mut self, relop: RelOp, target: usize) -> usize {
        self.emit_jump(relop.inverse().jump(), target)
    }

    /// Resolve the jump field at `pos` to the current pc.
    pub fn fixup(&mut self, pos: usize) {
        let pc = self.address();
        self.patch_short(pos, pc);
    }

    fn emit_jump(&mut self, op: Op, target: usize) -> usize {
        debug_assert!(op.is_jump());
        self.emit_op(op);
        let pos = self.pc();
        self.emit_short(u16::try_from(target).unwrap_or(u16::MAX));
        pos
    }
}

impl Default for CodeBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorts_and_words_are_big_endian() {
        let mut code = CodeBuffer::new();
        code.emit_short(0x1234);
        code.emit_word(-2);
        assert_eq!(code.as_bytes(), &[0x12, 0x34, 0xFF, 0xFF, 0xFF, 0xFE]);
    }

    #[test]
    fn patch_keeps_cursor() {
        let mut code = CodeBuffer::new();
        code.emit_op(Op::Add);
        code.emit_short(0);
        code.emit_op(Op::Sub);
        code.patch_short(1, 0xBEEF);
        assert_eq!(code.pc(), 4);
        assert_eq!(code.as_bytes(), &[Op::Add as u8, 0xBE, 0xEF, Op::Sub as u8]);
    }

    #[test]
    fn false_jump_uses_inverse_relop() {
        let mut code = CodeBuffer::new();
        let pos = code.put_false_jump(RelOp::Lt, 0);
        assert_eq!(pos, 1);
        assert_eq!(code.as_bytes()[0], Op::Jge as u8);

        code.emit_op(Op::Pop);
        code.fixup(pos);
        assert_eq!(&code.as_bytes()[1..3], &[0, 4]);
    }

    #[test]
    fn capacity_is_limited_to_short_addresses() {
        assert_eq!(CodeBuffer::new().capacity(), DEFAULT_CAPACITY);
        let mut code = CodeBuffer::with_capacity(100_000);
        assert_eq!(code.capacity(), MAX_CAPACITY);

        for _ in 0..MAX_CAPACITY - 3 {
            code.emit_op(Op::Pop);
        }
        let pos = code.put_jump(0);
        assert_eq!(code.pc(), MAX_CAPACITY);
        code.fixup(pos);
        assert_eq!(code.address(), u16::MAX);
        assert_eq!(&code.as_bytes()[pos..pos + 2], &[0xFF, 0xFF]);
        assert!(!code.overflowed());

        code.emit_op(Op::Pop);
        assert!(code.overflowed());
        assert_eq!(code.address(), u16::MAX);
    }

    #[test]
    fn overflow_stops_at_capacity() {
        let mut code = CodeBuffer::with_capacity(3);
        code.emit_op(Op::Add);
        assert!(!code.overflowed());
        code.emit_word(7);
        assert!(code.overflowed());
        assert_eq!(code.pc(), 3);

        // a field straddling the end is ignored
        code.patch_short(2, 0xFFFF);
        assert_eq!(code.as_bytes(), &[Op::Add as u8, 0, 0]);
    }

    #[test]
    fn main_and_data_size() {
        let mut code = CodeBuffer::new();
        assert_eq!(code.main_pc(), None);
        code.set_main_pc(12);
        code.inc_data_size();
        code.inc_data_size();
        assert_eq!(code.main_pc(), Some(12));
        assert_eq!(code.data_size(), 2);
    }
}
