//! Single-pass recursive-descent parser.
//!
//! Every production checks types and emits code as soon as it has seen
//! enough input; there is no syntax tree. Operands returned by expression
//! productions are left unmaterialized so their consumer can pick the right
//! instruction (a constant may still be folded, a designator may still be
//! stored into).

use std::io;

use bytecode::{CodeBuffer, Op, RelOp};

use crate::Compilation;
use crate::diagnostics::Diagnostics;
use crate::lexer::Lexer;
use crate::operand::{Operand, Place};
use crate::symtab::{Kind, ObjId, ObjKind, ScopeKind, SymbolTable, TypeId};
use crate::token::{Token, TokenKind, TokenSet};

use crate::token::TokenKind::*;

const EXPR_START: TokenSet = TokenSet::of(&[Ident, Number, CharConst, New, LParen, Minus]);
const STAT_START: TokenSet =
    TokenSet::of(&[Ident, If, While, Read, Return, Print, LBrace, Semicolon]);
const SYNC_STAT: TokenSet =
    TokenSet::of(&[While, If, Read, Return, Print, LBrace, Semicolon, Eof]);
const DECL_SYNC: TokenSet = TokenSet::of(&[Class, LBrace, Eof]);

fn relop_of(kind: TokenKind) -> Option<RelOp> {
    match kind {
        Eql => Some(RelOp::Eq),
        Neq => Some(RelOp::Ne),
        Lss => Some(RelOp::Lt),
        Leq => Some(RelOp::Le),
        Gtr => Some(RelOp::Gt),
        Geq => Some(RelOp::Ge),
        _ => None,
    }
}

pub struct Parser<R: io::Read> {
    lexer: Lexer<R>,
    /// Most recently consumed token.
    t: Token,
    /// Lookahead.
    la: Token,
    tab: SymbolTable,
    code: CodeBuffer,
    diag: Diagnostics,
    program: Option<ObjId>,
    overflow_reported: bool,
}

impl<R: io::Read> Parser<R> {
    pub fn new(reader: R) -> Self {
        Self::with_code_buffer(reader, CodeBuffer::new())
    }

    /// Compile into a caller-provided (typically smaller) code buffer.
    pub fn with_code_buffer(reader: R, code: CodeBuffer) -> Self {
        Self {
            lexer: Lexer::new(reader),
            t: Token::none(),
            la: Token::none(),
            tab: SymbolTable::new(),
            code,
            diag: Diagnostics::new(),
            program: None,
            overflow_reported: false,
        }
    }

    /// Run the whole compilation to end of input.
    pub fn parse(mut self) -> Compilation {
        self.scan();
        self.program();
        if !self.la.is_eof() {
            self.error("end of file expected");
        }
        self.check_overflow();
        log::debug!(
            "compiled {} code bytes with {} error(s)",
            self.code.pc(),
            self.diag.count()
        );
        Compilation {
            code: self.code,
            symbols: self.tab,
            diagnostics: self.diag,
            program: self.program,
        }
    }

    // ── Token handling ─────────────────────────────────────────────

    fn scan(&mut self) {
        let next = self.lexer.next_token();
        self.t = std::mem::replace(&mut self.la, next);
        self.diag.advance(self.la.span.start);
        self.check_overflow();
    }

    fn check(&mut self, expected: TokenKind) {
        if self.la.kind == expected {
            self.scan();
        } else {
            self.error(format!("{} expected", expected.name()));
        }
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.diag.error(msg);
    }

    fn check_overflow(&mut self) {
        if self.code.overflowed() && !self.overflow_reported {
            self.overflow_reported = true;
            self.diag.report("program too large");
        }
    }

    /// Name of the identifier just consumed, if it was one.
    fn ident_name(&self) -> Option<String> {
        (self.t.kind == Ident).then(|| self.t.lexeme.clone())
    }

    fn skip_until(&mut self, set: TokenSet) {
        while !set.contains(self.la.kind) {
            self.scan();
        }
    }

    // ── Operand helpers ────────────────────────────────────────────

    fn load(&mut self, x: &mut Operand) {
        if let Err(e) = x.materialize(&mut self.code) {
            self.error(e.to_string());
        }
    }

    fn operand_of(&mut self, obj: ObjId) -> Operand {
        Operand::from_obj(&self.tab, obj).unwrap_or_else(|e| {
            self.error(e.to_string());
            Operand::unresolved()
        })
    }

    fn is_int(ty: TypeId) -> bool {
        ty == TypeId::INT || ty == TypeId::UNRESOLVED
    }

    fn type_name(&self, ty: TypeId) -> String {
        self.tab.type_name(ty)
    }

    // ── Declarations ───────────────────────────────────────────────

    /// `Program = "program" ident {ConstDecl | VarDecl | ClassDecl} "{" {MethodDecl} "}"`
    fn program(&mut self) {
        self.check(Program);
        self.check(Ident);
        let name = self.ident_name().unwrap_or_else(|| "???".into());
        let prog = self.tab.insert(Kind::Program, &name, TypeId::NONE, &mut self.diag);
        self.program = Some(prog);
        self.tab.open_scope(ScopeKind::Program);

        loop {
            match self.la.kind {
                Final => self.const_decl(),
                Ident => self.var_decl(),
                Class => self.class_decl(),
                LBrace | Eof => break,
                _ => {
                    self.error("declaration expected");
                    self.skip_until(DECL_SYNC);
                }
            }
        }

        self.check(LBrace);
        while matches!(self.la.kind, Ident | Void) {
            self.method_decl();
        }
        self.check(RBrace);

        let scope = self.tab.close_scope();
        self.tab.set_program_locals(prog, scope.locals);
    }

    /// `ConstDecl = "final" Type ident "=" (number | charConst) ";"`
    fn const_decl(&mut self) {
        self.check(Final);
        let ty = self.type_();
        self.check(Ident);
        let name = self.ident_name().unwrap_or_else(|| "???".into());
        let obj = self.tab.insert(Kind::Constant, &name, ty, &mut self.diag);
        self.check(Assign);

        match self.la.kind {
            Number | CharConst => {
                self.scan();
                let literal_ty = if self.t.kind == Number {
                    TypeId::INT
                } else {
                    TypeId::CHAR
                };
                if ty == literal_ty || ty == TypeId::UNRESOLVED {
                    self.tab.set_const_value(obj, self.t.value);
                } else {
                    self.error(format!(
                        "{name}: cannot initialize a {} constant with a {} value",
                        self.type_name(ty),
                        self.type_name(literal_ty)
                    ));
                }
            }
            _ => self.error("number or character constant expected"),
        }

        if let ObjKind::Constant { adr, value } = self.tab.obj(obj).kind {
            let dst = Operand::new(Place::Static(adr), ty);
            let mut src = Operand::constant(value, ty);
            if let Err(e) = dst.store(&mut src, &mut self.code) {
                self.error(e.to_string());
            }
        }
        self.check(Semicolon);
    }

    /// `VarDecl = Type ident {"," ident} ";"`
    fn var_decl(&mut self) {
        let ty = self.type_();
        loop {
            self.check(Ident);
            if let Some(name) = self.ident_name() {
                self.tab.insert(Kind::Variable, &name, ty, &mut self.diag);
                if self.tab.current_scope().kind == ScopeKind::Program {
                    self.code.inc_data_size();
                }
            }
            if self.la.kind == Comma {
                self.scan();
            } else {
                break;
            }
        }
        self.check(Semicolon);
    }

    /// `ClassDecl = "class" ident "{" {VarDecl} "}"`
    fn class_decl(&mut self) {
        self.check(Class);
        self.check(Ident);
        let name = self.ident_name().unwrap_or_else(|| "???".into());
        let class = self.tab.new_class(&name);
        self.tab.insert(Kind::Type, &name, class, &mut self.diag);

        self.tab.open_scope(ScopeKind::Class);
        self.check(LBrace);
        while self.la.kind == Ident {
            self.var_decl();
        }
        let scope = self.tab.close_scope();
        self.tab.set_fields(class, scope);
        self.check(RBrace);
    }

    /// `MethodDecl = (Type | "void") ident "(" [FormPars] ")" {VarDecl} Block`
    fn method_decl(&mut self) {
        let ret = if self.la.kind == Void {
            self.scan();
            TypeId::NONE
        } else {
            self.type_()
        };
        self.check(Ident);
        let name = self.ident_name().unwrap_or_else(|| "???".into());
        let method = self.tab.insert(Kind::Method, &name, ret, &mut self.diag);
        let entry = self.code.address();
        self.tab.set_method_adr(method, entry);
        log::debug!("method {name} at {entry}");

        self.tab.open_scope(ScopeKind::Method);
        self.check(LParen);
        let n_pars = if self.la.kind == Ident {
            self.form_pars()
        } else {
            0
        };
        let params = self.tab.current_scope().locals.clone();
        self.tab.set_method_params(method, params);

        if name == "main" {
            self.code.set_main_pc(entry);
            if ret != TypeId::NONE {
                self.error("main must be void");
            }
            if n_pars != 0 {
                self.error("main must not have parameters");
            }
        }
        self.check(RParen);

        while self.la.kind == Ident {
            self.var_decl();
        }
        let n_vars = self.tab.current_scope().n_vars;
        self.code.emit_op(Op::Enter);
        self.code.emit_byte(u8::try_from(n_pars).unwrap_or(u8::MAX));
        self.code.emit_byte(u8::try_from(n_vars).unwrap_or(u8::MAX));

        self.block(method);

        if ret == TypeId::NONE {
            self.code.emit_op(Op::Exit);
            self.code.emit_op(Op::Return);
        } else {
            // falling off the end of a function is a runtime error
            self.code.emit_op(Op::Trap);
            self.code.emit_byte(1);
        }

        let scope = self.tab.close_scope();
        self.tab.set_method_locals(method, scope.locals);
    }

    /// `FormPars = Type ident {"," Type ident}`. Returns the parameter count.
    fn form_pars(&mut self) -> usize {
        let mut count = 0;
        loop {
            let ty = self.type_();
            self.check(Ident);
            let name = self.ident_name().unwrap_or_else(|| "???".into());
            self.tab.insert(Kind::Variable, &name, ty, &mut self.diag);
            count += 1;
            if self.la.kind == Comma {
                self.scan();
            } else {
                return count;
            }
        }
    }

    /// `Type = ident ["[" "]"]`
    fn type_(&mut self) -> TypeId {
        self.check(Ident);
        let Some(name) = self.ident_name() else {
            return TypeId::UNRESOLVED;
        };
        let obj = self.tab.find(&name, &mut self.diag);
        let mut ty = self.tab.obj(obj).ty;
        if self.tab.obj(obj).kind() != Kind::Type && ty != TypeId::UNRESOLVED {
            self.error(format!("{name} is not a type"));
            ty = TypeId::UNRESOLVED;
        }
        if self.la.kind == LBracket {
            self.scan();
            self.check(RBracket);
            if ty != TypeId::UNRESOLVED {
                ty = self.tab.array_of(ty);
            }
        }
        ty
    }

    // ── Statements ─────────────────────────────────────────────────

    /// `Block = "{" {Statement} "}"`
    fn block(&mut self, method: ObjId) {
        self.check(LBrace);
        loop {
            if STAT_START.contains(self.la.kind) {
                self.statement(method);
            } else if matches!(self.la.kind, RBrace | Eof) {
                break;
            } else {
                self.error("invalid start of statement");
                self.skip_until(SYNC_STAT.union(TokenSet::of(&[RBrace])));
            }
        }
        self.check(RBrace);
    }

    fn statement(&mut self, method: ObjId) {
        if !STAT_START.contains(self.la.kind) {
            self.error("invalid start of statement");
            self.skip_until(SYNC_STAT);
        }

        match self.la.kind {
            Ident => {
                let dst = self.designator();
                match self.la.kind {
                    Assign => {
                        self.scan();
                        let mut src = self.expr();
                        self.assign(dst, &mut src);
                    }
                    LParen => {
                        self.call(dst, true);
                    }
                    _ => self.error("= or ( expected"),
                }
                self.check(Semicolon);
            }
            If => {
                self.scan();
                self.check(LParen);
                let rel = self.condition();
                self.check(RParen);
                let to_else = self.code.put_false_jump(rel, 0);
                self.statement(method);
                if self.la.kind == Else {
                    let to_end = self.code.put_jump(0);
                    self.code.fixup(to_else);
                    self.scan();
                    self.statement(method);
                    self.code.fixup(to_end);
                } else {
                    self.code.fixup(to_else);
                }
            }
            While => {
                self.scan();
                self.check(LParen);
                let top = self.code.pc();
                let rel = self.condition();
                self.check(RParen);
                let exit = self.code.put_false_jump(rel, 0);
                self.statement(method);
                self.code.put_jump(top);
                self.code.fixup(exit);
            }
            Return => {
                self.scan();
                self.return_(method);
                self.check(Semicolon);
            }
            Read => {
                self.scan();
                self.check(LParen);
                let dst = self.designator();
                let op = match dst.ty {
                    TypeId::INT => Some(Op::Read),
                    TypeId::CHAR => Some(Op::BRead),
                    TypeId::UNRESOLVED => None,
                    ty => {
                        let found = self.type_name(ty);
                        self.error(format!("can only read int or char values, found {found}"));
                        None
                    }
                };
                if let Some(op) = op {
                    self.code.emit_op(op);
                    let mut value = Operand::stack(dst.ty);
                    if let Err(e) = dst.store(&mut value, &mut self.code) {
                        self.error(e.to_string());
                    }
                }
                self.check(RParen);
                self.check(Semicolon);
            }
            Print => {
                self.scan();
                self.check(LParen);
                let mut value = self.expr();
                let mut width = 1;
                if self.la.kind == Comma {
                    self.scan();
                    self.check(Number);
                    if self.t.kind == Number {
                        width = self.t.value;
                    }
                }
                let op = match value.ty {
                    TypeId::INT => Some(Op::Print),
                    TypeId::UNRESOLVED => None,
                    TypeId::CHAR => Some(Op::BPrint),
                    ty => {
                        let found = self.type_name(ty);
                        self.error(format!("can only print int or char values, found {found}"));
                        None
                    }
                };
                if let Some(op) = op {
                    self.load(&mut value);
                    self.load(&mut Operand::constant(width, TypeId::INT));
                    self.code.emit_op(op);
                }
                self.check(RParen);
                self.check(Semicolon);
            }
            LBrace => self.block(method),
            Semicolon => self.scan(),
            kind => self.error(format!("{} cannot start a statement", kind.name())),
        }
    }

    /// Store `src` into `dst` when the types allow it.
    fn assign(&mut self, dst: Operand, src: &mut Operand) {
        if self.tab.assignable(src.ty, dst.ty) {
            if let Err(e) = dst.store(src, &mut self.code) {
                self.error(e.to_string());
            }
        } else {
            let msg = format!(
                "{} is not assignable to {}",
                self.type_name(src.ty),
                self.type_name(dst.ty)
            );
            self.error(msg);
        }
    }

    /// `"return" [Expr]`, after the keyword.
    fn return_(&mut self, method: ObjId) {
        let ret = self.tab.obj(method).ty;
        if EXPR_START.contains(self.la.kind) {
            let mut value = self.expr();
            if ret == TypeId::NONE {
                self.error("void method cannot return a value");
            } else if !self.tab.compatible(value.ty, ret) {
                let msg = format!(
                    "return value of type {} does not match {}",
                    self.type_name(value.ty),
                    self.type_name(ret)
                );
                self.error(msg);
            } else {
                self.load(&mut value);
                self.code.emit_op(Op::Exit);
                self.code.emit_op(Op::Return);
            }
        } else if ret == TypeId::NONE {
            self.code.emit_op(Op::Exit);
            self.code.emit_op(Op::Return);
        } else {
            self.error("return value expected");
        }
    }

    // ── Calls ──────────────────────────────────────────────────────

    /// Parse the argument list of a call and emit the call. A value
    /// returned to statement level is discarded.
    fn call(&mut self, callee: Operand, as_statement: bool) -> Operand {
        let Place::Method(method) = callee.place else {
            if callee.ty != TypeId::UNRESOLVED {
                self.error("called object is not a method");
            }
            self.act_pars(None);
            return Operand::unresolved();
        };
        self.act_pars(Some(method));

        if method == self.tab.len_obj() {
            self.code.emit_op(Op::ArrayLength);
        } else if method != self.tab.chr_obj() && method != self.tab.ord_obj() {
            let adr = match self.tab.obj(method).kind {
                ObjKind::Method { adr, .. } => adr,
                _ => 0,
            };
            self.code.emit_op(Op::Call);
            self.code.emit_short(adr);
        }

        let ret = self.tab.obj(method).ty;
        if as_statement && ret != TypeId::NONE {
            self.code.emit_op(Op::Pop);
        }
        Operand::stack(ret)
    }

    /// `ActPars = "(" [Expr {"," Expr}] ")"`
    fn act_pars(&mut self, method: Option<ObjId>) {
        self.check(LParen);
        let params = method.map(|m| self.tab.method_params(m)).unwrap_or_default();
        let mut count = 0;
        if EXPR_START.contains(self.la.kind) {
            loop {
                let mut arg = self.expr();
                self.load(&mut arg);
                if let Some(&param) = params.get(count) {
                    if !self.tab.assignable(arg.ty, param) {
                        let msg = format!(
                            "argument {} is of type {}, expected {}",
                            count + 1,
                            self.type_name(arg.ty),
                            self.type_name(param)
                        );
                        self.error(msg);
                    }
                }
                count += 1;
                if self.la.kind == Comma {
                    self.scan();
                } else {
                    break;
                }
            }
        }
        if let Some(m) = method {
            let name = self.tab.obj(m).name.clone();
            if count < params.len() {
                let msg = format!("too few arguments for {name}: {} expected, got {count}", params.len());
                self.error(msg);
            } else if count > params.len() {
                let msg = format!("too many arguments for {name}: {} expected, got {count}", params.len());
                self.error(msg);
            }
        }
        self.check(RParen);
    }

    // ── Expressions ────────────────────────────────────────────────

    /// `Designator = ident {"." ident | "[" Expr "]"}`
    fn designator(&mut self) -> Operand {
        self.check(Ident);
        let Some(name) = self.ident_name() else {
            return Operand::unresolved();
        };
        let obj = self.tab.find(&name, &mut self.diag);
        let mut x = self.operand_of(obj);

        loop {
            match self.la.kind {
                Period => {
                    self.scan();
                    if self.tab.is_class(x.ty) {
                        self.load(&mut x);
                        self.check(Ident);
                        let field_name = self.ident_name().unwrap_or_default();
                        let field = self.tab.find_field(&field_name, x.ty, &mut self.diag);
                        let field = self.tab.obj(field);
                        x = match field.kind {
                            ObjKind::Variable { adr, .. } if field.ty != TypeId::UNRESOLVED => {
                                Operand::new(Place::Field(adr), field.ty)
                            }
                            _ => Operand::unresolved(),
                        };
                    } else {
                        if x.ty != TypeId::UNRESOLVED {
                            let found = self.type_name(x.ty);
                            self.error(format!("{found} is not a class"));
                        }
                        if self.la.kind == Ident {
                            self.scan();
                        }
                        x = Operand::unresolved();
                    }
                }
                LBracket => {
                    self.scan();
                    match self.tab.elem_type(x.ty) {
                        Some(elem) => {
                            self.load(&mut x);
                            let mut index = self.expr();
                            if !Self::is_int(index.ty) {
                                self.error("array index must be an int");
                            }
                            self.load(&mut index);
                            x = Operand::new(Place::Element, elem);
                        }
                        None => {
                            if x.ty != TypeId::UNRESOLVED {
                                let found = self.type_name(x.ty);
                                self.error(format!("{found} is not an array"));
                            }
                            self.expr();
                            x = Operand::unresolved();
                        }
                    }
                    self.check(RBracket);
                }
                _ => return x,
            }
        }
    }

    /// `Condition = Expr Relop Expr`. Both sides end up on the stack.
    fn condition(&mut self) -> RelOp {
        let mut lhs = self.expr();
        self.load(&mut lhs);

        let rel = match relop_of(self.la.kind) {
            Some(rel) => {
                self.scan();
                rel
            }
            None => {
                self.error("relational operator expected");
                RelOp::Eq
            }
        };

        let mut rhs = self.expr();
        self.load(&mut rhs);

        if !self.tab.compatible(lhs.ty, rhs.ty) {
            let msg = format!(
                "cannot compare {} with {}",
                self.type_name(lhs.ty),
                self.type_name(rhs.ty)
            );
            self.error(msg);
        } else if (self.tab.is_ref(lhs.ty) || self.tab.is_ref(rhs.ty)) && !rel.is_equality() {
            self.error("classes and arrays can only be compared with == or !=");
        }
        rel
    }

    /// `Expr = ["-"] Term {Addop Term}`
    fn expr(&mut self) -> Operand {
        let negate = self.la.kind == Minus;
        if negate {
            self.scan();
        }
        let mut x = self.term();
        if negate {
            if !Self::is_int(x.ty) {
                self.error("operand of unary - must be an int");
            } else if let Place::Constant(v) = x.place {
                x.place = Place::Constant(v.wrapping_neg());
            } else {
                self.load(&mut x);
                self.code.emit_op(Op::Neg);
            }
        }

        while matches!(self.la.kind, Plus | Minus) {
            let op = if self.la.kind == Plus { Op::Add } else { Op::Sub };
            self.scan();
            self.load(&mut x);
            let mut y = self.term();
            self.load(&mut y);
            self.arith(op, x.ty, y.ty);
            x = Operand::stack(TypeId::INT);
        }
        x
    }

    /// `Term = Factor {Mulop Factor}`
    fn term(&mut self) -> Operand {
        let mut x = self.factor();
        while matches!(self.la.kind, Times | Slash | Rem) {
            let op = match self.la.kind {
                Times => Op::Mul,
                Slash => Op::Div,
                _ => Op::Rem,
            };
            self.scan();
            self.load(&mut x);
            let mut y = self.factor();
            self.load(&mut y);
            self.arith(op, x.ty, y.ty);
            x = Operand::stack(TypeId::INT);
        }
        x
    }

    fn arith(&mut self, op: Op, a: TypeId, b: TypeId) {
        if Self::is_int(a) && Self::is_int(b) {
            self.code.emit_op(op);
        } else {
            self.error("arithmetic operands must be int");
        }
    }

    /// `Factor = Designator [ActPars] | number | charConst | "new" ident ["[" Expr "]"] | "(" Expr ")"`
    fn factor(&mut self) -> Operand {
        match self.la.kind {
            Ident => {
                let x = self.designator();
                if self.la.kind == LParen {
                    self.call(x, false)
                } else {
                    x
                }
            }
            Number => {
                self.scan();
                Operand::constant(self.t.value, TypeId::INT)
            }
            CharConst => {
                self.scan();
                Operand::constant(self.t.value, TypeId::CHAR)
            }
            New => {
                self.scan();
                self.allocation()
            }
            LParen => {
                self.scan();
                let x = self.expr();
                self.check(RParen);
                x
            }
            _ => {
                self.error("invalid start of expression");
                Operand::unresolved()
            }
        }
    }

    /// `ident ["[" Expr "]"]` after `new`.
    fn allocation(&mut self) -> Operand {
        self.check(Ident);
        let (name, ty, is_type) = match self.ident_name() {
            Some(name) => {
                let obj = self.tab.find(&name, &mut self.diag);
                let obj = self.tab.obj(obj);
                (name, obj.ty, obj.kind() == Kind::Type)
            }
            None => (String::new(), TypeId::UNRESOLVED, false),
        };
        let resolved = ty != TypeId::UNRESOLVED;

        if self.la.kind == LBracket {
            self.scan();
            if resolved && !is_type {
                self.error(format!("{name} is not a type"));
            }
            let mut len = self.expr();
            if !Self::is_int(len.ty) {
                self.error("array size must be an int");
            }
            self.load(&mut len);
            self.code.emit_op(Op::NewArray);
            self.code.emit_byte(if ty == TypeId::CHAR { 0 } else { 1 });
            self.check(RBracket);
            if resolved && is_type {
                Operand::stack(self.tab.array_of(ty))
            } else {
                Operand::unresolved()
            }
        } else if is_type && self.tab.is_class(ty) {
            self.code.emit_op(Op::New);
            self.code.emit_short(self.tab.n_fields(ty));
            Operand::stack(ty)
        } else {
            if resolved {
                self.error(format!("{name} is not a class"));
            }
            Operand::unresolved()
        }
    }
}
