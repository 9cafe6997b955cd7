//! Compile-time descriptors of where a value currently lives, and the
//! load/store instruction selection built on them.

use std::fmt;

use bytecode::{CodeBuffer, Op};

use crate::symtab::{ObjId, ObjKind, SymbolTable, TypeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Place {
    Constant(i32),
    Local(u16),
    Static(u16),
    /// Already on the expression stack.
    Stack,
    /// Object address on the stack, field offset pending.
    Field(u16),
    /// Array address and index on the stack.
    Element,
    Method(ObjId),
    /// Result of a failed production.
    None,
}

impl Place {
    fn describe(self) -> &'static str {
        match self {
            Place::Constant(_) => "a constant",
            Place::Local(_) | Place::Static(_) => "a variable",
            Place::Stack => "a value",
            Place::Field(_) => "a field",
            Place::Element => "an array element",
            Place::Method(_) => "a method",
            Place::None => "nothing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperandError {
    CannotLoad(Place),
    CannotStore(Place),
    WrongKind(String),
    /// A type name where a value was expected.
    TypeAsValue(String),
}

impl fmt::Display for OperandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CannotLoad(p) => write!(f, "cannot load {}", p.describe()),
            Self::CannotStore(p) => write!(f, "cannot assign to {}", p.describe()),
            Self::WrongKind(name) => write!(f, "wrong kind of identifier: {name}"),
            Self::TypeAsValue(name) => write!(f, "{name} is a type, not a value"),
        }
    }
}

impl std::error::Error for OperandError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    pub place: Place,
    pub ty: TypeId,
}

impl Operand {
    pub fn new(place: Place, ty: TypeId) -> Self {
        Self { place, ty }
    }

    pub fn constant(value: i32, ty: TypeId) -> Self {
        Self::new(Place::Constant(value), ty)
    }

    pub fn stack(ty: TypeId) -> Self {
        Self::new(Place::Stack, ty)
    }

    /// Placeholder for a production that failed; loads and stores of it
    /// emit nothing.
    pub fn unresolved() -> Self {
        Self::new(Place::None, TypeId::UNRESOLVED)
    }

    pub fn from_obj(tab: &SymbolTable, id: ObjId) -> Result<Self, OperandError> {
        let obj = tab.obj(id);
        if obj.ty == TypeId::UNRESOLVED {
            return Ok(Self::unresolved());
        }
        let place = match obj.kind {
            ObjKind::Constant { value, .. } => Place::Constant(value),
            ObjKind::Variable { adr, level: 0 } => Place::Static(adr),
            ObjKind::Variable { adr, .. } => Place::Local(adr),
            ObjKind::Method { .. } => Place::Method(id),
            ObjKind::Type => return Err(OperandError::TypeAsValue(obj.name.clone())),
            ObjKind::Program { .. } => return Err(OperandError::WrongKind(obj.name.clone())),
        };
        Ok(Self::new(place, obj.ty))
    }

    fn is_placeholder(&self) -> bool {
        self.place == Place::None && self.ty == TypeId::UNRESOLVED
    }

    /// Push the value onto the expression stack. Afterwards the operand is
    /// [`Place::Stack`].
    pub fn materialize(&mut self, code: &mut CodeBuffer) -> Result<(), OperandError> {
        match self.place {
            Place::Constant(_) if self.ty == TypeId::NULL => code.emit_op(Op::Const0),
            Place::Constant(v) => match v {
                0 => code.emit_op(Op::Const0),
                1 => code.emit_op(Op::Const1),
                2 => code.emit_op(Op::Const2),
                3 => code.emit_op(Op::Const3),
                4 => code.emit_op(Op::Const4),
                5 => code.emit_op(Op::Const5),
                -1 => code.emit_op(Op::ConstM1),
                _ => {
                    code.emit_op(Op::Const);
                    code.emit_word(v);
                }
            },
            Place::Local(adr) => match adr {
                0 => code.emit_op(Op::Load0),
                1 => code.emit_op(Op::Load1),
                2 => code.emit_op(Op::Load2),
                3 => code.emit_op(Op::Load3),
                _ => {
                    code.emit_op(Op::Load);
                    code.emit_byte(adr as u8);
                }
            },
            Place::Static(adr) => {
                code.emit_op(Op::GetStatic);
                code.emit_short(adr);
            }
            Place::Field(offset) => {
                code.emit_op(Op::GetField);
                code.emit_short(offset);
            }
            Place::Element if self.ty == TypeId::CHAR => code.emit_op(Op::BALoad),
            Place::Element => code.emit_op(Op::ALoad),
            Place::Stack => {}
            Place::None if self.is_placeholder() => {}
            Place::Method(_) | Place::None => return Err(OperandError::CannotLoad(self.place)),
        }
        self.place = Place::Stack;
        Ok(())
    }

    /// Emit `self = src`. The source is materialized first; storing a
    /// placeholder emits nothing.
    pub fn store(&self, src: &mut Operand, code: &mut CodeBuffer) -> Result<(), OperandError> {
        if src.is_placeholder() {
            return Ok(());
        }
        src.materialize(code)?;
        match self.place {
            Place::Static(adr) => {
                code.emit_op(Op::PutStatic);
                code.emit_short(adr);
            }
            Place::Local(adr) => {
                code.emit_op(Op::Store);
                code.emit_byte(adr as u8);
            }
            Place::Field(offset) => {
                code.emit_op(Op::PutField);
                code.emit_short(offset);
            }
            Place::Element if src.ty == TypeId::CHAR => code.emit_op(Op::BAStore),
            Place::Element => code.emit_op(Op::AStore),
            Place::None if self.is_placeholder() => {}
            place => return Err(OperandError::CannotStore(place)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::symtab::{Kind, ScopeKind};
    use bytecode::{Instruction, disassemble};

    fn emitted(f: impl FnOnce(&mut CodeBuffer)) -> Vec<Instruction> {
        let mut code = CodeBuffer::new();
        f(&mut code);
        disassemble(code.as_bytes())
            .unwrap()
            .into_iter()
            .map(|(_, i)| i)
            .collect()
    }

    fn load(mut op: Operand) -> Vec<Instruction> {
        emitted(|code| {
            op.materialize(code).unwrap();
            assert_eq!(op.place, Place::Stack);
        })
    }

    #[test]
    fn constants_use_compact_forms() {
        assert_eq!(load(Operand::constant(0, TypeId::INT)), vec![Instruction::ConstN { value: 0 }]);
        assert_eq!(load(Operand::constant(5, TypeId::INT)), vec![Instruction::ConstN { value: 5 }]);
        assert_eq!(load(Operand::constant(-1, TypeId::INT)), vec![Instruction::ConstN { value: -1 }]);
        assert_eq!(load(Operand::constant(6, TypeId::INT)), vec![Instruction::Const { value: 6 }]);
        assert_eq!(load(Operand::constant(-2, TypeId::INT)), vec![Instruction::Const { value: -2 }]);
        assert_eq!(load(Operand::constant(0, TypeId::NULL)), vec![Instruction::ConstN { value: 0 }]);
    }

    #[test]
    fn locals_use_compact_forms() {
        assert_eq!(load(Operand::new(Place::Local(3), TypeId::INT)), vec![Instruction::LoadN { slot: 3 }]);
        assert_eq!(load(Operand::new(Place::Local(4), TypeId::INT)), vec![Instruction::Load { slot: 4 }]);
    }

    #[test]
    fn indirect_loads() {
        assert_eq!(load(Operand::new(Place::Static(300), TypeId::INT)), vec![Instruction::GetStatic { idx: 300 }]);
        assert_eq!(load(Operand::new(Place::Field(2), TypeId::INT)), vec![Instruction::GetField { offset: 2 }]);
        assert_eq!(load(Operand::new(Place::Element, TypeId::CHAR)), vec![Instruction::BALoad]);
        assert_eq!(load(Operand::new(Place::Element, TypeId::INT)), vec![Instruction::ALoad]);
        assert_eq!(load(Operand::stack(TypeId::INT)), vec![]);
        assert_eq!(load(Operand::unresolved()), vec![]);
    }

    #[test]
    fn methods_cannot_be_loaded() {
        let tab = SymbolTable::new();
        let mut op = Operand::from_obj(&tab, tab.ord_obj()).unwrap();
        let mut code = CodeBuffer::new();
        assert_eq!(
            op.materialize(&mut code),
            Err(OperandError::CannotLoad(Place::Method(tab.ord_obj())))
        );
        assert_eq!(code.pc(), 0);
    }

    #[test]
    fn stores_by_destination() {
        let store = |dst: Operand, src: Operand| {
            emitted(|code| {
                let mut src = src;
                dst.store(&mut src, code).unwrap();
            })
        };
        let one = Operand::constant(1, TypeId::INT);
        assert_eq!(store(Operand::new(Place::Static(1), TypeId::INT), one), vec![
            Instruction::ConstN { value: 1 },
            Instruction::PutStatic { idx: 1 },
        ]);
        assert_eq!(store(Operand::new(Place::Local(0), TypeId::INT), one), vec![
            Instruction::ConstN { value: 1 },
            Instruction::Store { slot: 0 },
        ]);
        assert_eq!(store(Operand::new(Place::Field(3), TypeId::INT), one), vec![
            Instruction::ConstN { value: 1 },
            Instruction::PutField { offset: 3 },
        ]);
        let ch = Operand::constant('x' as i32, TypeId::CHAR);
        assert_eq!(store(Operand::new(Place::Element, TypeId::CHAR), ch), vec![
            Instruction::Const { value: 'x' as i32 },
            Instruction::BAStore,
        ]);
        assert_eq!(store(Operand::new(Place::Element, TypeId::INT), one), vec![
            Instruction::ConstN { value: 1 },
            Instruction::AStore,
        ]);
    }

    #[test]
    fn placeholder_source_stores_nothing() {
        let mut code = CodeBuffer::new();
        let dst = Operand::new(Place::Local(0), TypeId::INT);
        dst.store(&mut Operand::unresolved(), &mut code).unwrap();
        assert_eq!(code.pc(), 0);
    }

    #[test]
    fn constants_cannot_be_assigned() {
        let mut code = CodeBuffer::new();
        let mut src = Operand::constant(1, TypeId::INT);
        let dst = Operand::constant(2, TypeId::INT);
        assert_eq!(
            dst.store(&mut src, &mut code),
            Err(OperandError::CannotStore(Place::Constant(2)))
        );
    }

    #[test]
    fn operand_from_entities() {
        let mut tab = SymbolTable::new();
        let mut diag = Diagnostics::new();
        let prog = tab.insert(Kind::Program, "P", TypeId::NONE, &mut diag);
        tab.open_scope(ScopeKind::Program);
        let g = tab.insert(Kind::Variable, "g", TypeId::INT, &mut diag);
        let k = tab.insert(Kind::Constant, "k", TypeId::INT, &mut diag);
        tab.set_const_value(k, 42);
        tab.open_scope(ScopeKind::Method);
        let l = tab.insert(Kind::Variable, "l", TypeId::CHAR, &mut diag);

        assert_eq!(Operand::from_obj(&tab, g).unwrap().place, Place::Static(0));
        assert_eq!(Operand::from_obj(&tab, k).unwrap().place, Place::Constant(42));
        assert_eq!(Operand::from_obj(&tab, l).unwrap(), Operand::new(Place::Local(0), TypeId::CHAR));
        assert_eq!(
            Operand::from_obj(&tab, prog),
            Err(OperandError::WrongKind("P".into()))
        );
        assert_eq!(Operand::from_obj(&tab, tab.no_obj()).unwrap(), Operand::unresolved());

        let int = tab.find("int", &mut diag);
        assert_eq!(
            Operand::from_obj(&tab, int),
            Err(OperandError::TypeAsValue("int".into()))
        );
        assert_eq!(
            OperandError::TypeAsValue("int".into()).to_string(),
            "int is a type, not a value"
        );
        assert!(diag.is_empty());
    }
}
