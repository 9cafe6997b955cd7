//! # mjc
//!
//! A single-pass compiler for MicroJava.
//!
//! ## Architecture
//!
//! ```text
//!  impl Read (file, &[u8], …)
//!      │
//!      ▼
//!  ┌────────┐   Token    ┌────────┐  Operand  ┌────────────┐
//!  │ Lexer  │ ─────────▶ │ Parser │ ────────▶ │ CodeBuffer │ ──▶ .obj
//!  └────────┘ lookahead  └────────┘  load /   └────────────┘
//!                          │    ▲    store
//!                          ▼    │
//!                       ┌─────────────┐
//!                       │ SymbolTable │
//!                       └─────────────┘
//! ```
//!
//! There is no syntax tree: the parser checks types and emits bytecode while
//! it recognizes each production. Errors never abort the run; they are
//! collected in [`Diagnostics`] and the object file is only written when
//! there are none.
//!
//! ```rust
//! let c = mjc::compile_str("program P { void main() { print(42); } }");
//! assert!(c.is_ok());
//!
//! let mut obj = Vec::new();
//! c.write_object(&bytecode::Identity, &mut obj).unwrap();
//! assert_eq!(&obj[obj.len() - 14..obj.len() - 12], b"MJ");
//! ```

use std::io::{self, Write};

use bytecode::{CodeBuffer, CodeTransform, ObjectError};

pub mod diagnostics;
pub mod lexer;
pub mod operand;
pub mod parser;
pub mod span;
pub mod symtab;
pub mod token;

pub use diagnostics::{Diagnostic, Diagnostics};
pub use lexer::Lexer;
pub use operand::{Operand, OperandError, Place};
pub use parser::Parser;
pub use span::{Pos, Span};
pub use symtab::{ObjId, SymbolTable, TypeId};
pub use token::{Token, TokenKind};

/// Everything a finished compilation run produced.
#[derive(Debug)]
pub struct Compilation {
    pub code: CodeBuffer,
    pub symbols: SymbolTable,
    pub diagnostics: Diagnostics,
    /// The program entity, once its header was seen.
    pub program: Option<ObjId>,
}

impl Compilation {
    pub fn error_count(&self) -> usize {
        self.diagnostics.count()
    }

    pub fn is_ok(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Write the object file. Refused when the run reported errors.
    pub fn write_object<W: Write>(
        &self,
        transform: &dyn CodeTransform,
        out: &mut W,
    ) -> Result<(), ObjectError> {
        if !self.is_ok() {
            return Err(ObjectError::Rejected(self.error_count()));
        }
        self.code.finalize(transform, out)
    }
}

/// Compile a source held in memory.
pub fn compile_str(source: &str) -> Compilation {
    compile(source.as_bytes())
}

/// Compile a source read from any stream.
pub fn compile<R: io::Read>(reader: R) -> Compilation {
    Parser::new(reader).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symtab::ObjKind;
    use bytecode::{Identity, Instruction, Op, TRAILER_LEN, Trailer, disassemble};

    fn messages(c: &Compilation) -> Vec<String> {
        c.diagnostics.iter().map(|d| d.message.clone()).collect()
    }

    /// Entities of the program frame, which is closed once parsing ends.
    fn program_locals(c: &Compilation) -> Vec<ObjId> {
        match &c.symbols.obj(c.program.unwrap()).kind {
            ObjKind::Program { locals } => locals.clone(),
            _ => unreachable!(),
        }
    }

    fn object(c: &Compilation) -> Vec<u8> {
        let mut out = Vec::new();
        c.write_object(&Identity, &mut out).unwrap();
        out
    }

    const SIEVE: &str = r#"
program Sieve
  final int MAX = 100;
  int[] primes;
  class Counter { int hits; char mark; }
{
  int isqrt(int n)
    int r;
  {
    r = 0;
    while ((r + 1) * (r + 1) <= n) r = r + 1;
    return r;
  }

  void main()
    int i, j; char[] marks; Counter c;
  {
    marks = new char[MAX + 1];
    c = new Counter;
    i = 2;
    while (i <= isqrt(MAX)) {
      if (ord(marks[i]) == 0) {
        j = i * i;
        while (j <= MAX) { marks[j] = 'x'; j = j + i; }
      }
      i = i + 1;
    }
    i = 2;
    while (i <= MAX) {
      if (marks[i] != 'x') { print(i, 4); c.hits = c.hits + 1; }
      i = i + 1;
    }
    print(c.hits);
  }
}
"#;

    #[test]
    fn scenario_a_constant_and_main() {
        let c = compile_str("program A final int N = 5; { void main() { print(N); } }");
        assert!(c.is_ok(), "{:?}", messages(&c));

        let main = *program_locals(&c).last().unwrap();
        let adr = match c.symbols.obj(main).kind {
            ObjKind::Method { adr, .. } => adr,
            _ => unreachable!(),
        };
        let obj = object(&c);
        let trailer = Trailer::from_object(&obj).unwrap();
        assert_eq!(trailer.main_pc, adr as i32);
        assert_eq!(trailer.data_size, 0);
        assert_eq!(trailer.code_size as usize, obj.len() - TRAILER_LEN);
    }

    #[test]
    fn scenario_b_undeclared_name_reported_once() {
        let c = compile_str("program B { void main() int x; { x = y + y * y; print(x); } }");
        assert_eq!(messages(&c), vec!["y is not defined"]);
    }

    #[test]
    fn scenario_c_field_of_non_class() {
        let c = compile_str("program C { void main() int i, v; { v = i.f; } }");
        assert_eq!(c.error_count(), 1);
        assert!(messages(&c)[0].contains("not a class"));
        let code = disassemble(c.code.as_bytes()).unwrap();
        assert!(
            !code
                .iter()
                .any(|(_, i)| matches!(i, Instruction::GetField { .. }))
        );
    }

    #[test]
    fn scenario_d_local_capacity_reported_once() {
        let names: Vec<String> = (0..129).map(|i| format!("v{i}")).collect();
        let src = format!("program D {{ void main() int {}; {{ }} }}", names.join(", "));
        let c = compile_str(&src);
        assert_eq!(messages(&c), vec![
            "too many variables and constants in one scope (limit 128)"
        ]);
        // reported while the 129th name was being declared
        let col = src.find("v128").unwrap() + 1;
        assert!(c.diagnostics.iter().next().unwrap().pos.column as usize > col);
    }

    #[test]
    fn scenario_e_dead_loop_body_is_emitted() {
        let c = compile_str("program E int g; { void main() { while (1 > 2) g = 7; } }");
        assert!(c.is_ok());
        let code = disassemble(c.code.as_bytes()).unwrap();
        let ops: Vec<_> = code.iter().map(|(_, i)| i.op()).collect();
        assert_eq!(ops, vec![
            Op::Enter,
            Op::Const1,
            Op::Const2,
            Op::Jle,
            Op::Const,
            Op::PutStatic,
            Op::Jmp,
            Op::Exit,
            Op::Return,
        ]);
        assert_eq!(code[3].1.target(), Some(code[7].0 as u16));
        assert_eq!(code[6].1.target(), Some(code[1].0 as u16));
    }

    #[test]
    fn larger_program_compiles() {
        let c = compile_str(SIEVE);
        assert!(c.is_ok(), "{:?}", messages(&c));
        assert_eq!(c.code.data_size(), 1);
        assert!(c.code.main_pc().is_some());
    }

    #[test]
    fn every_jump_lands_inside_the_code() {
        let c = compile_str(SIEVE);
        let len = c.code.pc();
        for (at, insn) in disassemble(c.code.as_bytes()).unwrap() {
            if let Some(target) = insn.target() {
                assert!((target as usize) < len, "{insn} at {at}");
                assert_ne!(target, 0, "unpatched jump at {at}");
            }
        }
    }

    #[test]
    fn scopes_are_balanced() {
        for src in [
            SIEVE,
            "program P { void main() { ",
            "program P class C { int x; { void m( ",
            "",
            "class",
        ] {
            assert_eq!(compile_str(src).symbols.depth(), 1, "{src:?}");
        }
    }

    #[test]
    fn addresses_restart_per_frame() {
        let c = compile_str(
            "program P int g0, g1; { void f(int p) int l; { } void main() int m; { } }",
        );
        let tab = &c.symbols;
        let adr = |id: ObjId| match tab.obj(id).kind {
            ObjKind::Variable { adr, .. } => adr,
            _ => unreachable!(),
        };
        let method_adrs = |id: ObjId| match &tab.obj(id).kind {
            ObjKind::Method { locals, .. } => locals.iter().map(|&l| adr(l)).collect::<Vec<_>>(),
            _ => unreachable!(),
        };

        let globals = program_locals(&c);
        assert_eq!(adr(globals[0]), 0);
        assert_eq!(adr(globals[1]), 1);
        assert_eq!(tab.obj(globals[2]).name, "f");
        assert_eq!(method_adrs(globals[2]), vec![0, 1]);
        assert_eq!(tab.obj(globals[3]).name, "main");
        assert_eq!(method_adrs(globals[3]), vec![0]);
    }

    #[test]
    fn compiling_twice_is_identical() {
        assert_eq!(object(&compile_str(SIEVE)), object(&compile_str(SIEVE)));
    }

    #[test]
    fn store_only_when_assignable() {
        let c = compile_str("program P int g; char h; { void main() { g = 'c'; h = 'c'; } }");
        assert_eq!(messages(&c), vec!["char is not assignable to int"]);
        let stores: Vec<_> = disassemble(c.code.as_bytes())
            .unwrap()
            .into_iter()
            .filter_map(|(_, i)| match i {
                Instruction::PutStatic { idx } => Some(idx),
                _ => None,
            })
            .collect();
        assert_eq!(stores, vec![1]);
    }

    #[test]
    fn object_refused_after_errors() {
        let c = compile_str("program P { void main() { x = 1; } }");
        assert!(!c.is_ok());
        let mut out = Vec::new();
        let err = c.write_object(&Identity, &mut out).unwrap_err();
        assert!(matches!(err, ObjectError::Rejected(1)));
        assert_eq!(err.to_string(), "1 errors detected, no object file written");
        assert!(out.is_empty());
    }

    #[test]
    fn object_refused_after_overflow() {
        let mut src = String::from("program P { void main() int i; {");
        for _ in 0..20 {
            src.push_str(" i = 1000;");
        }
        src.push_str(" } }");
        let c = Parser::with_code_buffer(src.as_bytes(), CodeBuffer::with_capacity(32)).parse();
        assert_eq!(messages(&c), vec!["program too large"]);
        let mut out = Vec::new();
        assert!(c.write_object(&Identity, &mut out).is_err());
    }

    #[test]
    fn no_main_writes_minus_one() {
        let c = compile_str("program P { void helper() { } }");
        let obj = object(&c);
        assert_eq!(Trailer::from_object(&obj).unwrap().main_pc, -1);
    }
}
