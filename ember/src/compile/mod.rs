//! Bytecode generation.
//!
//! Single pass over the checked tree. Locals and upvalues resolve
//! lexically, each function keeping its own [`FnState`] on a stack while
//! nested functions are compiled. Top-level names are globals and get
//! their slot from a pre-scan, so they can be referenced before the
//! statement that declares them.
mod expr;

use std::{collections::HashMap, rc::Rc};

use smol_str::SmolStr;

use crate::{
    ast::{ClassDecl, EnumDecl, Expr, FnDecl, Stmt},
    chunk::{Chunk, Constant, Function, OpCode, VarArg},
    constants::{MAIN_NAME, MAX_ARGS, MAX_LOCALS, MAX_UPVALUES},
    error::{Diagnostic, DiagnosticKind, Diagnostics, EmberError, EmberResult},
    lex::Span,
    vm::native::native_names,
};

/// Name of the hidden local holding unnamed surplus arguments.
const VARARG_LOCAL: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FnKind {
    Script,
    Function,
    Method,
    Module,
}

struct Local {
    name: SmolStr,
    /// Scope depth, `None` until the initializer has been compiled.
    depth: Option<usize>,
    captured: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UpvalueDesc {
    index: u8,
    is_local: bool,
}

struct LoopState {
    start: usize,
    depth: usize,
    breaks: Vec<usize>,
}

/// Compilation state of one function.
struct FnState {
    function: Function,
    kind: FnKind,
    locals: Vec<Local>,
    upvalues: Vec<UpvalueDesc>,
    scope_depth: usize,
    loops: Vec<LoopState>,
    /// Local bound to the surplus arguments.
    rest: Option<SmolStr>,
}

impl FnState {
    fn new(name: SmolStr, kind: FnKind) -> Self {
        // Slot zero holds the callee, or the receiver of a method.
        let receiver = if kind == FnKind::Method { "this" } else { "" };
        Self {
            function: Function::new(name),
            kind,
            locals: vec![Local {
                name: SmolStr::new(receiver),
                depth: Some(0),
                captured: false,
            }],
            upvalues: Vec::new(),
            scope_depth: 0,
            loops: Vec::new(),
            rest: None,
        }
    }

    fn resolve_local(&self, name: &str) -> Option<usize> {
        self.locals
            .iter()
            .rposition(|local| !local.name.is_empty() && local.name == name)
    }
}

/// Where a declaration stores its value.
#[derive(Debug, Clone, Copy)]
enum Target {
    Global(u16),
    Local,
    /// Pre-declared local of a module body.
    Member(u8),
}

/// Resolved variable.
#[derive(Debug, Clone, Copy)]
enum Access {
    Local(u8),
    Upvalue(u8),
    Global(u16),
}

pub struct Compiler {
    states: Vec<FnState>,
    globals: HashMap<SmolStr, u16>,
    line: u32,
    diagnostics: Diagnostics,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// Compiler for programs running on the standard natives.
    pub fn new() -> Self {
        Self::with_globals(native_names())
    }

    /// Compiler with host defined globals occupying the first slots.
    pub fn with_globals<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut globals = HashMap::new();
        for name in names {
            let slot = globals.len() as u16;
            globals.entry(SmolStr::new(name)).or_insert(slot);
        }
        Self {
            states: Vec::new(),
            globals,
            line: 0,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Compile the top-level scope into the script function.
    pub fn compile(&mut self, root: &Stmt) -> EmberResult<Function> {
        self.states.clear();
        self.states
            .push(FnState::new(SmolStr::new(MAIN_NAME), FnKind::Script));

        let body = match root {
            Stmt::Scope { body, .. } => body.as_slice(),
            other => std::slice::from_ref(other),
        };
        for stmt in body {
            if let Some(name) = stmt.declared_name() {
                self.global_slot(name, stmt.span());
            }
        }
        for stmt in body {
            self.stmt(stmt);
        }
        self.emit_op_u8(OpCode::Return, 0);

        let function = match self.states.pop() {
            Some(state) => state.function,
            None => Function::new(MAIN_NAME),
        };

        if self.diagnostics.has_errors() {
            return Err(EmberError::Compile(std::mem::take(&mut self.diagnostics)));
        }
        log::debug!(
            "compiled {} bytes of code, {} globals",
            function.chunk.len(),
            self.globals.len()
        );
        Ok(function)
    }

    // ------------------------------------------------------------------------
    // Emitting

    fn error(&mut self, span: Span, message: impl ToString) {
        self.diagnostics
            .push(Diagnostic::error(DiagnosticKind::Semantic, span, message));
    }

    fn current(&mut self) -> &mut FnState {
        let last = self.states.len() - 1;
        &mut self.states[last]
    }

    fn chunk(&mut self) -> &mut Chunk {
        &mut self.current().function.chunk
    }

    fn emit_op(&mut self, op: OpCode) {
        let line = self.line;
        self.chunk().write_op(op, line);
    }

    fn emit_u8(&mut self, byte: u8) {
        let line = self.line;
        self.chunk().write_u8(byte, line);
    }

    fn emit_op_u8(&mut self, op: OpCode, operand: u8) {
        self.emit_op(op);
        self.emit_u8(operand);
    }

    fn emit_op_u16(&mut self, op: OpCode, operand: u16) {
        let line = self.line;
        self.emit_op(op);
        self.chunk().write_u16(operand, line);
    }

    fn make_constant(&mut self, constant: Constant, span: Span) -> u16 {
        match self.chunk().add_constant(constant) {
            Some(index) => index,
            None => {
                self.error(span, "too many constants in one function");
                0
            }
        }
    }

    fn name_constant(&mut self, name: &str, span: Span) -> u16 {
        self.make_constant(Constant::Str(SmolStr::new(name)), span)
    }

    fn emit_constant(&mut self, constant: Constant, span: Span) {
        let index = self.make_constant(constant, span);
        self.emit_op_u16(OpCode::Constant, index);
    }

    /// Emit a jump with a placeholder offset, returning the operand position.
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op_u16(op, u16::MAX);
        self.chunk().len() - 2
    }

    /// Point a forward jump at the next instruction.
    fn patch_jump(&mut self, operand: usize, span: Span) {
        let distance = self.chunk().len() - operand - 2;
        match u16::try_from(distance) {
            Ok(distance) => self.chunk().patch_u16(operand, distance),
            Err(_) => self.error(span, "too much code to jump over"),
        }
    }

    fn emit_loop(&mut self, start: usize, span: Span) {
        // The offset is applied after the operand has been read.
        let distance = self.chunk().len() + 3 - start;
        match u16::try_from(distance) {
            Ok(distance) => self.emit_op_u16(OpCode::Loop, distance),
            Err(_) => self.error(span, "loop body too large"),
        }
    }

    fn emit_closure(&mut self, state: FnState, span: Span) {
        let FnState {
            function,
            upvalues,
            ..
        } = state;
        let index = self.make_constant(Constant::Function(Rc::new(function)), span);
        self.emit_op_u16(OpCode::Closure, index);
        for upvalue in upvalues {
            self.emit_u8(upvalue.is_local as u8);
            self.emit_u8(upvalue.index);
        }
    }

    // ------------------------------------------------------------------------
    // Variables

    fn global_slot(&mut self, name: &SmolStr, span: Span) -> u16 {
        if let Some(slot) = self.globals.get(name) {
            return *slot;
        }
        match u16::try_from(self.globals.len()) {
            Ok(slot) => {
                self.globals.insert(name.clone(), slot);
                slot
            }
            Err(_) => {
                self.error(span, "too many global variables");
                0
            }
        }
    }

    fn add_local(&mut self, name: SmolStr, span: Span) {
        if self.current().locals.len() >= MAX_LOCALS {
            self.error(span, "too many local variables in function");
            return;
        }
        self.current().locals.push(Local {
            name,
            depth: None,
            captured: false,
        });
    }

    fn mark_initialized(&mut self) {
        let state = self.current();
        let depth = state.scope_depth;
        if let Some(local) = state.locals.last_mut() {
            local.depth = Some(depth);
        }
    }

    /// Reserve storage for a declared name.
    fn declare(&mut self, name: &SmolStr, span: Span) -> Target {
        let (kind, depth) = (self.current().kind, self.current().scope_depth);
        match (kind, depth) {
            (FnKind::Script, 0) => Target::Global(self.global_slot(name, span)),
            (FnKind::Module, 0) => match self.current().resolve_local(name) {
                Some(slot) => Target::Member(slot as u8),
                None => {
                    self.add_local(name.clone(), span);
                    Target::Local
                }
            },
            _ => {
                self.add_local(name.clone(), span);
                Target::Local
            }
        }
    }

    /// Store the value on top of the stack into a declared target.
    fn define(&mut self, target: Target) {
        match target {
            Target::Global(slot) => self.emit_op_u16(OpCode::DefineGlobal, slot),
            Target::Local => self.mark_initialized(),
            Target::Member(slot) => {
                self.emit_op_u8(OpCode::SetLocal, slot);
                self.emit_op(OpCode::Pop);
            }
        }
    }

    fn resolve_upvalue(&mut self, state: usize, name: &str, span: Span) -> Option<u8> {
        if state == 0 {
            return None;
        }
        let enclosing = state - 1;
        if let Some(slot) = self.states[enclosing].resolve_local(name) {
            self.states[enclosing].locals[slot].captured = true;
            return Some(self.add_upvalue(state, slot as u8, true, span));
        }
        let index = self.resolve_upvalue(enclosing, name, span)?;
        Some(self.add_upvalue(state, index, false, span))
    }

    fn add_upvalue(&mut self, state: usize, index: u8, is_local: bool, span: Span) -> u8 {
        let desc = UpvalueDesc { index, is_local };
        let upvalues = &self.states[state].upvalues;
        if let Some(existing) = upvalues.iter().position(|u| *u == desc) {
            return existing as u8;
        }
        if upvalues.len() >= MAX_UPVALUES {
            self.error(span, "too many captured variables in function");
            return 0;
        }
        let state = &mut self.states[state];
        state.upvalues.push(desc);
        state.function.upvalue_count = state.upvalues.len() as u8;
        (state.upvalues.len() - 1) as u8
    }

    fn resolve(&mut self, name: &str, span: Span) -> Option<Access> {
        let top = self.states.len() - 1;
        if let Some(slot) = self.states[top].resolve_local(name) {
            if self.states[top].locals[slot].depth.is_none() {
                self.error(
                    span,
                    format!("cannot read local variable '{name}' in its own initializer"),
                );
            }
            return Some(Access::Local(slot as u8));
        }
        if let Some(index) = self.resolve_upvalue(top, name, span) {
            return Some(Access::Upvalue(index));
        }
        self.globals.get(name).map(|slot| Access::Global(*slot))
    }

    fn get_variable(&mut self, name: &str, span: Span) {
        match self.resolve(name, span) {
            Some(Access::Local(slot)) => self.emit_op_u8(OpCode::GetLocal, slot),
            Some(Access::Upvalue(index)) => self.emit_op_u8(OpCode::GetUpvalue, index),
            Some(Access::Global(slot)) => self.emit_op_u16(OpCode::GetGlobal, slot),
            None => self.error(span, format!("undefined variable '{name}'")),
        }
    }

    fn set_variable(&mut self, name: &str, span: Span) {
        match self.resolve(name, span) {
            Some(Access::Local(slot)) => self.emit_op_u8(OpCode::SetLocal, slot),
            Some(Access::Upvalue(index)) => self.emit_op_u8(OpCode::SetUpvalue, index),
            Some(Access::Global(slot)) => self.emit_op_u16(OpCode::SetGlobal, slot),
            None => self.error(span, format!("undefined variable '{name}'")),
        }
    }

    // ------------------------------------------------------------------------
    // Scopes

    fn begin_scope(&mut self) {
        self.current().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        let state = self.current();
        state.scope_depth -= 1;
        let depth = state.scope_depth;

        let mut discarded = Vec::new();
        while let Some(local) = state.locals.last() {
            if local.depth.map_or(false, |d| d <= depth) {
                break;
            }
            discarded.push(local.captured);
            state.locals.pop();
        }
        for captured in discarded {
            self.emit_op(if captured {
                OpCode::CloseUpvalue
            } else {
                OpCode::Pop
            });
        }
    }

    /// Emit pops for locals deeper than `depth` without forgetting them,
    /// used when jumping out of a loop body.
    fn discard_locals(&mut self, depth: usize) {
        let captured: Vec<bool> = self
            .current()
            .locals
            .iter()
            .rev()
            .take_while(|local| local.depth.map_or(true, |d| d > depth))
            .map(|local| local.captured)
            .collect();
        for captured in captured {
            self.emit_op(if captured {
                OpCode::CloseUpvalue
            } else {
                OpCode::Pop
            });
        }
    }

    // ------------------------------------------------------------------------
    // Statements

    fn stmt(&mut self, stmt: &Stmt) {
        self.line = stmt.span().line;

        match stmt {
            Stmt::Let { desc, value, .. } => {
                let target = self.declare(&desc.name, desc.span);
                match value {
                    Some(value) => self.expr(value),
                    None => self.emit_op(OpCode::Null),
                }
                self.define(target);
            }
            Stmt::Function(decl) => {
                let target = self.declare(&decl.name, decl.span);
                if let Target::Local = target {
                    // Visible to its own body for recursion.
                    self.mark_initialized();
                }
                self.function(decl, FnKind::Function);
                self.define(target);
            }
            Stmt::Module { name, body, span } => self.module(name, body, *span),
            Stmt::Enum(decl) => {
                let target = self.declare(&decl.name, decl.span);
                self.enum_object(decl);
                self.define(target);
            }
            Stmt::Class(decl) => self.class(decl),
            Stmt::Expr(expr) => {
                self.expr(expr);
                self.emit_op(OpCode::Pop);
            }
            Stmt::Return { value, span } => match value {
                None => self.emit_op_u8(OpCode::Return, 0),
                Some(Expr::Aggregate(values, _)) => {
                    if values.len() > MAX_ARGS {
                        self.error(*span, "too many returned values");
                    }
                    for value in values {
                        self.expr(value);
                    }
                    self.emit_op_u8(OpCode::Return, values.len() as u8);
                }
                Some(value) => {
                    self.expr(value);
                    self.emit_op_u8(OpCode::Return, 1);
                }
            },
            Stmt::If {
                cond,
                then,
                otherwise,
                span,
            } => {
                self.expr(cond);
                let then_jump = self.emit_jump(OpCode::JumpIfFalse);
                self.emit_op(OpCode::Pop);
                self.stmt(then);
                let else_jump = self.emit_jump(OpCode::Jump);
                self.patch_jump(then_jump, *span);
                self.emit_op(OpCode::Pop);
                if let Some(otherwise) = otherwise {
                    self.stmt(otherwise);
                }
                self.patch_jump(else_jump, *span);
            }
            Stmt::Scope { body, .. } => {
                self.begin_scope();
                for stmt in body {
                    self.stmt(stmt);
                }
                self.end_scope();
            }
            Stmt::While { cond, body, span } => {
                let start = self.chunk().len();
                let depth = self.current().scope_depth;
                self.current().loops.push(LoopState {
                    start,
                    depth,
                    breaks: Vec::new(),
                });

                self.expr(cond);
                let exit = self.emit_jump(OpCode::JumpIfFalse);
                self.emit_op(OpCode::Pop);
                self.stmt(body);
                self.emit_loop(start, *span);
                self.patch_jump(exit, *span);
                self.emit_op(OpCode::Pop);

                // Breaks leave with the condition already popped.
                if let Some(state) = self.current().loops.pop() {
                    for jump in state.breaks {
                        self.patch_jump(jump, *span);
                    }
                }
            }
            Stmt::Break(span) => {
                let Some(depth) = self.current().loops.last().map(|l| l.depth) else {
                    self.error(*span, "'break' outside of a loop");
                    return;
                };
                self.discard_locals(depth);
                let jump = self.emit_jump(OpCode::Jump);
                if let Some(state) = self.current().loops.last_mut() {
                    state.breaks.push(jump);
                }
            }
            Stmt::Continue(span) => {
                let Some((start, depth)) = self.current().loops.last().map(|l| (l.start, l.depth))
                else {
                    self.error(*span, "'continue' outside of a loop");
                    return;
                };
                self.discard_locals(depth);
                self.emit_loop(start, *span);
            }
        }
    }

    /// Compile a function body and emit the closure creating it.
    fn function(&mut self, decl: &FnDecl, kind: FnKind) {
        let mut state = FnState::new(decl.name.clone(), kind);
        if decl.params.len() > MAX_ARGS {
            self.error(decl.span, "too many parameters");
        }
        state.function.arity = decl.params.len() as u8;
        state.function.varargs = decl.varargs;
        self.states.push(state);
        self.begin_scope();

        for param in &decl.params {
            self.add_local(param.name.clone(), param.span);
            self.mark_initialized();
        }
        let rest = match (decl.varargs, &decl.rest) {
            (VarArg::None, _) => None,
            (VarArg::Named, Some(name)) => Some(name.clone()),
            _ => Some(SmolStr::new(VARARG_LOCAL)),
        };
        if let Some(rest) = rest {
            self.add_local(rest.clone(), decl.span);
            self.mark_initialized();
            self.current().rest = Some(rest);
        }

        for stmt in &decl.body {
            self.stmt(stmt);
        }
        self.emit_op_u8(OpCode::Return, 0);

        if let Some(state) = self.states.pop() {
            self.emit_closure(state, decl.span);
        }
    }

    /// A module body runs as a function whose locals are the members.
    /// They are all declared up front so members can refer to each other.
    fn module(&mut self, name: &SmolStr, body: &[Stmt], span: Span) {
        let target = self.declare(name, span);
        if let Target::Local = target {
            self.mark_initialized();
        }

        self.states.push(FnState::new(name.clone(), FnKind::Module));
        let members: Vec<SmolStr> = body
            .iter()
            .filter_map(|stmt| stmt.declared_name().cloned())
            .collect();
        for member in &members {
            self.add_local(member.clone(), span);
            self.emit_op(OpCode::Null);
            self.mark_initialized();
        }

        for stmt in body {
            self.stmt(stmt);
        }

        self.line = span.line;
        if members.len() > u16::MAX as usize {
            self.error(span, "too many module members");
        }
        for member in &members {
            let index = self.name_constant(member, span);
            self.emit_op_u16(OpCode::Constant, index);
            self.get_variable(member, span);
        }
        let name_index = self.name_constant(name, span);
        self.emit_op_u16(OpCode::Module, name_index);
        let line = self.line;
        self.chunk().write_u16(members.len() as u16, line);
        self.emit_op_u8(OpCode::Return, 1);

        if let Some(state) = self.states.pop() {
            self.emit_closure(state, span);
        }
        self.emit_op_u8(OpCode::Call, 0);
        self.define(target);
    }

    fn class(&mut self, decl: &ClassDecl) {
        let target = self.declare(&decl.name, decl.span);
        if let Target::Local = target {
            self.mark_initialized();
        }

        for (parent, span) in &decl.parents {
            self.get_variable(parent, *span);
        }
        if decl.parents.len() > u8::MAX as usize {
            self.error(decl.span, "too many parent classes");
        }
        let name = self.name_constant(&decl.name, decl.span);
        self.emit_op_u16(OpCode::Class, name);
        self.emit_u8(decl.parents.len() as u8);

        for member in &decl.members {
            self.line = member.span().line;
            match member {
                Stmt::Let { desc, value, .. } => {
                    match value {
                        Some(value) => self.expr(value),
                        None => self.emit_op(OpCode::Null),
                    }
                    let name = self.name_constant(&desc.name, desc.span);
                    self.emit_op_u16(OpCode::Field, name);
                }
                Stmt::Function(method) => {
                    self.function(method, FnKind::Method);
                    let name = self.name_constant(&method.name, method.span);
                    self.emit_op_u16(OpCode::Decl, name);
                }
                Stmt::Enum(inner) => {
                    self.enum_object(inner);
                    let name = self.name_constant(&inner.name, inner.span);
                    self.emit_op_u16(OpCode::Decl, name);
                }
                other => self.error(other.span(), "unexpected class member"),
            }
        }

        self.define(target);
    }

    fn enum_object(&mut self, decl: &EnumDecl) {
        let name = self.name_constant(&decl.name, decl.span);
        self.emit_op_u16(OpCode::Enum, name);

        let mut next = 0i64;
        for item in &decl.items {
            match &item.value {
                Some(Expr::Literal(Constant::I64(value), span)) => {
                    self.emit_constant(Constant::I64(*value), *span);
                    next = value.wrapping_add(1);
                }
                Some(value) => self.expr(value),
                None => {
                    self.emit_constant(Constant::I64(next), item.span);
                    next = next.wrapping_add(1);
                }
            }
            let name = self.name_constant(&item.name, item.span);
            self.emit_op_u16(OpCode::EnumItem, name);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{lex::tokenize, parse::parse, vm::native::NATIVES};

    fn compile(source: &str) -> EmberResult<Function> {
        let (tokens, _) = tokenize(source);
        let root = parse(tokens, source).map_err(EmberError::Compile)?;
        Compiler::new().compile(&root)
    }

    fn nested_function(function: &Function, name: &str) -> Rc<Function> {
        function
            .chunk
            .constants
            .iter()
            .find_map(|c| match c {
                Constant::Function(f) if f.name == name => Some(f.clone()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_expression_statement() {
        let function = compile("1 + 2;").unwrap();
        let code = &function.chunk.code;
        assert_eq!(
            code,
            &[
                OpCode::Constant as u8, 0, 0,
                OpCode::Constant as u8, 1, 0,
                OpCode::Add as u8,
                OpCode::Pop as u8,
                OpCode::Return as u8, 0,
            ]
        );
        assert_eq!(function.name, MAIN_NAME);
    }

    #[test]
    fn test_globals_follow_natives() {
        let function = compile("let x = 1;").unwrap();
        let slot = NATIVES.len() as u16;
        let code = &function.chunk.code;
        assert_eq!(code[3], OpCode::DefineGlobal as u8);
        assert_eq!(u16::from_le_bytes([code[4], code[5]]), slot);
    }

    #[test]
    fn test_closure_captures_enclosing_local() {
        let function =
            compile("fn outer() { let a = 1; fn inner() { return a; } return inner; }").unwrap();
        let outer = nested_function(&function, "outer");
        let inner = nested_function(&outer, "inner");
        assert_eq!(inner.upvalue_count, 1);

        let code = &outer.chunk.code;
        let at = code
            .iter()
            .position(|b| *b == OpCode::Closure as u8)
            .unwrap();
        // is_local = 1, slot 1 (slot 0 holds the callee)
        assert_eq!(&code[at + 3..at + 5], &[1, 1]);
    }

    #[test]
    fn test_parameters_and_varargs() {
        let function = compile("fn f(a, b, rest...) { return rest; }").unwrap();
        let f = nested_function(&function, "f");
        assert_eq!(f.arity, 2);
        assert_eq!(f.varargs, VarArg::Named);
        assert_eq!(f.param_slots(), 4);
        assert_eq!(&f.chunk.code[..2], &[OpCode::GetLocal as u8, 3]);
    }

    #[test]
    fn test_too_many_locals() {
        let mut source = String::from("fn f() {");
        for i in 0..300 {
            source.push_str(&format!("let v{i} = {i};"));
        }
        source.push('}');
        assert!(matches!(compile(&source), Err(EmberError::Compile(_))));
    }

    #[test]
    fn test_undefined_variable() {
        let Err(EmberError::Compile(diagnostics)) = compile("x;") else {
            panic!("expected compile error");
        };
        assert_eq!(diagnostics.error_count(), 1);
    }
}
