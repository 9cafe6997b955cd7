//! Scope-nested symbol table.
//!
//! Entities ([`Obj`]) and types ([`Type`]) live in two arenas addressed by
//! [`ObjId`] and [`TypeId`]. Type identity is id equality; only array types
//! compare structurally, by element id. Scopes form a stack of frames, each
//! holding its entities in declaration order.

use std::fmt::Write as _;

use crate::diagnostics::Diagnostics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    /// Return type of void methods and element type of `len`'s parameter.
    pub const NONE: TypeId = TypeId(0);
    pub const INT: TypeId = TypeId(1);
    pub const CHAR: TypeId = TypeId(2);
    /// Type of the `null` constant; a class type without fields.
    pub const NULL: TypeId = TypeId(3);
    /// Type of unresolved names, compatible with everything.
    pub const UNRESOLVED: TypeId = TypeId(4);

    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjId(u32);

impl ObjId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    None,
    Int,
    Char,
    Array { elem: TypeId },
    Class {
        name: String,
        fields: Vec<ObjId>,
        n_fields: u16,
    },
    Unresolved,
}

/// Kind of entity to declare, see [`SymbolTable::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Constant,
    Variable,
    Type,
    Method,
    Program,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjKind {
    Constant { value: i32, adr: u16 },
    /// `level` 0 is the program (static) level.
    Variable { adr: u16, level: u32 },
    Type,
    Method {
        adr: u16,
        n_pars: u16,
        /// Parameters first, then locals.
        locals: Vec<ObjId>,
    },
    Program { locals: Vec<ObjId> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obj {
    pub name: String,
    pub ty: TypeId,
    pub kind: ObjKind,
}

impl Obj {
    pub fn kind(&self) -> Kind {
        match self.kind {
            ObjKind::Constant { .. } => Kind::Constant,
            ObjKind::Variable { .. } => Kind::Variable,
            ObjKind::Type => Kind::Type,
            ObjKind::Method { .. } => Kind::Method,
            ObjKind::Program { .. } => Kind::Program,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Universe,
    Program,
    Class,
    Method,
}

impl ScopeKind {
    /// Maximum number of variables and constants in one frame.
    pub const fn capacity(self) -> Option<u32> {
        match self {
            ScopeKind::Universe => None,
            ScopeKind::Program | ScopeKind::Class => Some(32768),
            ScopeKind::Method => Some(128),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub locals: Vec<ObjId>,
    /// Running address counter for variables and constants.
    pub n_vars: u32,
}

impl Scope {
    fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            locals: Vec::new(),
            n_vars: 0,
        }
    }
}

#[derive(Debug)]
pub struct SymbolTable {
    types: Vec<Type>,
    objs: Vec<Obj>,
    frames: Vec<Scope>,
    no_obj: ObjId,
    chr: ObjId,
    ord: ObjId,
    len: ObjId,
}

impl SymbolTable {
    /// A table holding only the universe frame with the predeclared names.
    pub fn new() -> Self {
        let mut tab = Self {
            types: vec![
                Type::None,
                Type::Int,
                Type::Char,
                Type::Class {
                    name: "null".into(),
                    fields: Vec::new(),
                    n_fields: 0,
                },
                Type::Unresolved,
            ],
            objs: Vec::new(),
            frames: vec![Scope::new(ScopeKind::Universe)],
            no_obj: ObjId(0),
            chr: ObjId(0),
            ord: ObjId(0),
            len: ObjId(0),
        };

        tab.no_obj = tab.alloc(Obj {
            name: "???".into(),
            ty: TypeId::UNRESOLVED,
            kind: ObjKind::Variable { adr: 0, level: 0 },
        });

        let mut diag = Diagnostics::new();
        tab.insert(Kind::Type, "int", TypeId::INT, &mut diag);
        tab.insert(Kind::Type, "char", TypeId::CHAR, &mut diag);
        tab.insert(Kind::Constant, "null", TypeId::NULL, &mut diag);

        let any_array = tab.array_of(TypeId::NONE);
        tab.chr = tab.builtin("chr", TypeId::CHAR, "i", TypeId::INT, &mut diag);
        tab.ord = tab.builtin("ord", TypeId::INT, "ch", TypeId::CHAR, &mut diag);
        tab.len = tab.builtin("len", TypeId::INT, "a", any_array, &mut diag);
        tab
    }

    fn builtin(
        &mut self,
        name: &str,
        ret: TypeId,
        param: &str,
        param_ty: TypeId,
        diag: &mut Diagnostics,
    ) -> ObjId {
        let method = self.insert(Kind::Method, name, ret, diag);
        let par = self.alloc(Obj {
            name: param.into(),
            ty: param_ty,
            kind: ObjKind::Variable { adr: 0, level: 1 },
        });
        self.set_method_params(method, vec![par]);
        method
    }

    fn alloc(&mut self, obj: Obj) -> ObjId {
        let id = ObjId(self.objs.len() as u32);
        self.objs.push(obj);
        id
    }

    // ── Predeclared entities ───────────────────────────────────────

    /// Sentinel returned for names that cannot be resolved.
    pub fn no_obj(&self) -> ObjId {
        self.no_obj
    }

    pub fn chr_obj(&self) -> ObjId {
        self.chr
    }

    pub fn ord_obj(&self) -> ObjId {
        self.ord
    }

    pub fn len_obj(&self) -> ObjId {
        self.len
    }

    // ── Frame management ───────────────────────────────────────────

    pub fn open_scope(&mut self, kind: ScopeKind) {
        self.frames.push(Scope::new(kind));
    }

    /// Pop the innermost frame and hand it back. The universe frame is
    /// never popped.
    pub fn close_scope(&mut self) -> Scope {
        if self.frames.len() > 1 {
            if let Some(scope) = self.frames.pop() {
                return scope;
            }
        }
        log::warn!("close_scope on the universe frame");
        Scope::new(ScopeKind::Universe)
    }

    /// Number of open frames, the universe included.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn current_scope(&self) -> &Scope {
        // frames always holds the universe
        &self.frames[self.frames.len() - 1]
    }

    fn current_scope_mut(&mut self) -> &mut Scope {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Nesting level of the current frame; the program frame is level 0.
    fn level(&self) -> u32 {
        self.frames.len().saturating_sub(2) as u32
    }

    // ── Declaration and lookup ─────────────────────────────────────

    /// Append a new entity to the current frame.
    ///
    /// Variables and constants receive the frame's running count as address.
    /// Exceeding the frame capacity is reported once, when the first entity
    /// past the limit is declared.
    pub fn insert(
        &mut self,
        kind: Kind,
        name: &str,
        ty: TypeId,
        diag: &mut Diagnostics,
    ) -> ObjId {
        let level = self.level();
        let obj_kind = match kind {
            Kind::Constant | Kind::Variable => {
                let scope = self.current_scope();
                if let Some(limit) = scope.kind.capacity() {
                    if scope.n_vars == limit {
                        diag.error(format!(
                            "too many variables and constants in one scope (limit {limit})"
                        ));
                    }
                }
                let adr = u16::try_from(scope.n_vars).unwrap_or(u16::MAX);
                self.current_scope_mut().n_vars += 1;
                if kind == Kind::Constant {
                    ObjKind::Constant { value: 0, adr }
                } else {
                    ObjKind::Variable { adr, level }
                }
            }
            Kind::Type => ObjKind::Type,
            Kind::Method => ObjKind::Method {
                adr: 0,
                n_pars: 0,
                locals: Vec::new(),
            },
            Kind::Program => ObjKind::Program { locals: Vec::new() },
        };

        let id = self.alloc(Obj {
            name: name.to_owned(),
            ty,
            kind: obj_kind,
        });
        self.current_scope_mut().locals.push(id);
        log::debug!(
            "insert {:?} {name}: {} (level {level})",
            kind,
            self.type_name(ty)
        );
        id
    }

    /// Resolve `name` in the current frame and then outward; the first
    /// declaration wins.
    pub fn find(&self, name: &str, diag: &mut Diagnostics) -> ObjId {
        for scope in self.frames.iter().rev() {
            if let Some(&id) = scope.locals.iter().find(|&&id| self.obj(id).name == name) {
                log::trace!("found {name} in {:?} scope", scope.kind);
                return id;
            }
        }
        diag.error(format!("{name} is not defined"));
        self.no_obj
    }

    /// Resolve a field of class type `ty`.
    pub fn find_field(&self, name: &str, ty: TypeId, diag: &mut Diagnostics) -> ObjId {
        match self.ty(ty) {
            Type::Class { fields, .. } => {
                if let Some(&id) = fields.iter().find(|&&id| self.obj(id).name == name) {
                    log::trace!("found field {name}");
                    return id;
                }
                diag.error(format!("no field named {name}"));
            }
            Type::Unresolved => {}
            _ => {
                diag.error(format!("{} is not a class", self.type_name(ty)));
            }
        }
        self.no_obj
    }

    // ── Entity access ──────────────────────────────────────────────

    pub fn obj(&self, id: ObjId) -> &Obj {
        &self.objs[id.index()]
    }

    pub fn obj_mut(&mut self, id: ObjId) -> &mut Obj {
        &mut self.objs[id.index()]
    }

    pub fn set_const_value(&mut self, id: ObjId, v: i32) {
        if let ObjKind::Constant { value, .. } = &mut self.obj_mut(id).kind {
            *value = v;
        }
    }

    pub fn set_method_adr(&mut self, id: ObjId, pc: u16) {
        if let ObjKind::Method { adr, .. } = &mut self.obj_mut(id).kind {
            *adr = pc;
        }
    }

    /// Attach the formal parameters; they stay the prefix of the locals.
    pub fn set_method_params(&mut self, id: ObjId, params: Vec<ObjId>) {
        if let ObjKind::Method { n_pars, locals, .. } = &mut self.obj_mut(id).kind {
            *n_pars = params.len() as u16;
            *locals = params;
        }
    }

    pub fn set_method_locals(&mut self, id: ObjId, all: Vec<ObjId>) {
        if let ObjKind::Method { locals, .. } = &mut self.obj_mut(id).kind {
            *locals = all;
        }
    }

    pub fn set_program_locals(&mut self, id: ObjId, all: Vec<ObjId>) {
        if let ObjKind::Program { locals } = &mut self.obj_mut(id).kind {
            *locals = all;
        }
    }

    /// Declared parameter types of a method, in order.
    pub fn method_params(&self, id: ObjId) -> Vec<TypeId> {
        match &self.obj(id).kind {
            ObjKind::Method { n_pars, locals, .. } => locals
                .iter()
                .take(*n_pars as usize)
                .map(|&p| self.obj(p).ty)
                .collect(),
            _ => Vec::new(),
        }
    }

    // ── Types ──────────────────────────────────────────────────────

    pub fn ty(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    fn alloc_type(&mut self, ty: Type) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    pub fn array_of(&mut self, elem: TypeId) -> TypeId {
        self.alloc_type(Type::Array { elem })
    }

    pub fn new_class(&mut self, name: &str) -> TypeId {
        self.alloc_type(Type::Class {
            name: name.to_owned(),
            fields: Vec::new(),
            n_fields: 0,
        })
    }

    pub fn set_fields(&mut self, class: TypeId, scope: Scope) {
        if let Type::Class {
            fields, n_fields, ..
        } = &mut self.types[class.index()]
        {
            *fields = scope.locals;
            *n_fields = u16::try_from(scope.n_vars).unwrap_or(u16::MAX);
        }
    }

    pub fn elem_type(&self, ty: TypeId) -> Option<TypeId> {
        match self.ty(ty) {
            Type::Array { elem } => Some(*elem),
            _ => None,
        }
    }

    pub fn n_fields(&self, ty: TypeId) -> u16 {
        match self.ty(ty) {
            Type::Class { n_fields, .. } => *n_fields,
            _ => 0,
        }
    }

    pub fn is_class(&self, ty: TypeId) -> bool {
        matches!(self.ty(ty), Type::Class { .. })
    }

    pub fn is_array(&self, ty: TypeId) -> bool {
        matches!(self.ty(ty), Type::Array { .. })
    }

    pub fn is_ref(&self, ty: TypeId) -> bool {
        self.is_class(ty) || self.is_array(ty)
    }

    /// Identity, except that array types are equal when their element
    /// types are identical.
    pub fn same(&self, a: TypeId, b: TypeId) -> bool {
        a == b
            || matches!(
                (self.ty(a), self.ty(b)),
                (Type::Array { elem: x }, Type::Array { elem: y }) if x == y
            )
    }

    /// Whether values of the two types may be compared.
    pub fn compatible(&self, a: TypeId, b: TypeId) -> bool {
        a == TypeId::UNRESOLVED
            || b == TypeId::UNRESOLVED
            || self.same(a, b)
            || (a == TypeId::NULL && self.is_ref(b))
            || (b == TypeId::NULL && self.is_ref(a))
    }

    /// Whether a value of type `src` may be stored into a `dst`.
    pub fn assignable(&self, src: TypeId, dst: TypeId) -> bool {
        src == TypeId::UNRESOLVED
            || dst == TypeId::UNRESOLVED
            || self.same(src, dst)
            || (src == TypeId::NULL && self.is_ref(dst))
            || (self.is_array(src) && self.elem_type(dst) == Some(TypeId::NONE))
    }

    pub fn type_name(&self, ty: TypeId) -> String {
        match self.ty(ty) {
            Type::None => "void".into(),
            Type::Int => "int".into(),
            Type::Char => "char".into(),
            Type::Array { elem } if *elem == TypeId::NONE => "array".into(),
            Type::Array { elem } => format!("{}[]", self.type_name(*elem)),
            Type::Class { name, .. } => name.clone(),
            Type::Unresolved => "???".into(),
        }
    }

    // ── Dump ───────────────────────────────────────────────────────

    /// Textual listing of every open frame and, recursively, of the
    /// entities attached to programs, methods and classes.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for scope in &self.frames {
            let _ = writeln!(out, "{:?} scope", scope.kind);
            for &id in &scope.locals {
                self.dump_obj(&mut out, id, 1);
            }
        }
        out
    }

    fn dump_obj(&self, out: &mut String, id: ObjId, depth: usize) {
        let obj = self.obj(id);
        let indent = "  ".repeat(depth);
        let ty = self.type_name(obj.ty);
        let _ = match &obj.kind {
            ObjKind::Constant { value, adr } => {
                writeln!(out, "{indent}Con  {} = {value} @{adr}: {ty}", obj.name)
            }
            ObjKind::Variable { adr, level } => {
                writeln!(out, "{indent}Var  {} @{adr} level {level}: {ty}", obj.name)
            }
            ObjKind::Type => writeln!(out, "{indent}Type {}: {ty}", obj.name),
            ObjKind::Method { adr, n_pars, .. } => {
                writeln!(out, "{indent}Meth {} @{adr} pars {n_pars}: {ty}", obj.name)
            }
            ObjKind::Program { .. } => writeln!(out, "{indent}Prog {}", obj.name),
        };

        match &obj.kind {
            ObjKind::Method { locals, .. } | ObjKind::Program { locals } => {
                for &local in locals {
                    self.dump_obj(out, local, depth + 1);
                }
            }
            ObjKind::Type => {
                if let Type::Class { fields, .. } = self.ty(obj.ty) {
                    for &field in fields {
                        self.dump_obj(out, field, depth + 1);
                    }
                }
            }
            _ => {}
        }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
