//! Expression lowering.
use smol_str::SmolStr;

use super::{Access, Compiler, FnKind, VARARG_LOCAL};
use crate::{
    ast::{Expr, InfixOp, PostfixOp, PrefixOp},
    chunk::{Constant, OpCode},
    constants::MAX_ARGS,
    lex::Span,
    value::BinaryOp,
};

fn binary_opcode(op: BinaryOp) -> OpCode {
    match op {
        BinaryOp::Add => OpCode::Add,
        BinaryOp::Sub => OpCode::Sub,
        BinaryOp::Mul => OpCode::Mul,
        BinaryOp::Div => OpCode::Div,
        BinaryOp::Rem => OpCode::Rem,
        BinaryOp::BitAnd => OpCode::BitAnd,
        BinaryOp::BitOr => OpCode::BitOr,
        BinaryOp::BitXor => OpCode::BitXor,
        BinaryOp::Shl => OpCode::Shl,
        BinaryOp::Shr => OpCode::Shr,
        BinaryOp::Eq => OpCode::Eq,
        BinaryOp::Ne => OpCode::Ne,
        BinaryOp::Lt => OpCode::Lt,
        BinaryOp::Le => OpCode::Le,
        BinaryOp::Gt => OpCode::Gt,
        BinaryOp::Ge => OpCode::Ge,
    }
}

impl Compiler {
    pub(super) fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(constant, span) => match constant {
                Constant::Null => self.emit_op(OpCode::Null),
                Constant::Bool(true) => self.emit_op(OpCode::True),
                Constant::Bool(false) => self.emit_op(OpCode::False),
                other => self.emit_constant(other.clone(), *span),
            },
            Expr::Ident(name, span) => self.get_variable(name, *span),
            Expr::Group(inner, _) => self.expr(inner),
            Expr::Array(items, span) | Expr::Aggregate(items, span) => {
                for item in items {
                    self.expr(item);
                }
                let count = self.count_u16(items.len(), *span);
                self.emit_op_u16(OpCode::Array, count);
            }
            Expr::Dict(entries, span) => {
                for (key, value) in entries {
                    self.expr(key);
                    self.expr(value);
                }
                let count = self.count_u16(entries.len(), *span);
                self.emit_op_u16(OpCode::Dict, count);
            }
            Expr::Struct(members, span) => {
                for (name, value) in members {
                    let index = self.name_constant(name, *span);
                    self.emit_op_u16(OpCode::Constant, index);
                    self.expr(value);
                }
                let count = self.count_u16(members.len(), *span);
                self.emit_op_u16(OpCode::Struct, count);
            }
            Expr::Prefix { op, expr, .. } => {
                self.expr(expr);
                self.emit_op(match op {
                    PrefixOp::Neg => OpCode::Neg,
                    PrefixOp::Not => OpCode::Not,
                    PrefixOp::BitNot => OpCode::BitNot,
                });
            }
            Expr::Factorial(expr, _) => {
                self.expr(expr);
                self.emit_op(OpCode::Factorial);
            }
            Expr::Infix { op, lhs, rhs, span } => match op {
                InfixOp::Assign => self.assign(lhs, rhs, *span),
                InfixOp::And => {
                    self.expr(lhs);
                    let end = self.emit_jump(OpCode::JumpIfFalse);
                    self.emit_op(OpCode::Pop);
                    self.expr(rhs);
                    self.patch_jump(end, *span);
                }
                InfixOp::Or => {
                    self.expr(lhs);
                    let otherwise = self.emit_jump(OpCode::JumpIfFalse);
                    let end = self.emit_jump(OpCode::Jump);
                    self.patch_jump(otherwise, *span);
                    self.emit_op(OpCode::Pop);
                    self.expr(rhs);
                    self.patch_jump(end, *span);
                }
                InfixOp::Binary(op) => {
                    self.expr(lhs);
                    self.expr(rhs);
                    self.emit_op(binary_opcode(*op));
                }
            },
            Expr::CompoundAssign {
                op,
                target,
                value,
                span,
            } => self.compound_assign(*op, target, value, *span),
            Expr::Postfix { op, expr, span } => {
                let Expr::Ident(name, _) = expr.as_ref() else {
                    self.error(*span, format!("'{op}' expects a variable"));
                    return;
                };
                // Leaves the previous value.
                self.get_variable(name, *span);
                self.emit_op(OpCode::Dup);
                self.emit_op(match op {
                    PostfixOp::Inc => OpCode::Inc,
                    PostfixOp::Dec => OpCode::Dec,
                });
                self.set_variable(name, *span);
                self.emit_op(OpCode::Pop);
            }
            Expr::Conditional {
                cond,
                then,
                otherwise,
                span,
            } => {
                self.expr(cond);
                let else_jump = self.emit_jump(OpCode::JumpIfFalse);
                self.emit_op(OpCode::Pop);
                self.expr(then);
                let end = self.emit_jump(OpCode::Jump);
                self.patch_jump(else_jump, *span);
                self.emit_op(OpCode::Pop);
                self.expr(otherwise);
                self.patch_jump(end, *span);
            }
            Expr::Index { expr, index, .. } => {
                self.expr(expr);
                self.expr(index);
                self.emit_op(OpCode::GetIndex);
            }
            Expr::Ref(inner, span) => self.reference(inner, *span),
            Expr::VarArg(span) => {
                let rest = self
                    .current()
                    .rest
                    .clone()
                    .unwrap_or_else(|| SmolStr::new(VARARG_LOCAL));
                self.get_variable(&rest, *span);
            }
            Expr::Lambda(decl) => self.function(decl, FnKind::Function),
            Expr::Dot { expr, name, span } => {
                self.expr(expr);
                let index = self.name_constant(name, *span);
                self.emit_op_u16(OpCode::GetMember, index);
            }
            Expr::Call { callee, args, span } => {
                self.expr(callee);
                let argc = self.arguments(args, *span);
                self.emit_op_u8(OpCode::Call, argc);
            }
            Expr::New { class, args, span } => {
                self.expr(class);
                let argc = self.arguments(args, *span);
                self.emit_op_u8(OpCode::New, argc);
            }
            Expr::This(span) => self.get_variable("this", *span),
            Expr::Base { name, span } => {
                self.get_variable("this", *span);
                let index = self.name_constant(name, *span);
                self.emit_op_u16(OpCode::GetBase, index);
            }
        }
    }

    fn count_u16(&mut self, count: usize, span: Span) -> u16 {
        u16::try_from(count).unwrap_or_else(|_| {
            self.error(span, "too many elements in literal");
            0
        })
    }

    fn arguments(&mut self, args: &[Expr], span: Span) -> u8 {
        if args.len() > MAX_ARGS {
            self.error(span, format!("cannot pass more than {MAX_ARGS} arguments"));
        }
        for arg in args {
            self.expr(arg);
        }
        args.len() as u8
    }

    /// Plain assignment. The assigned value is left on the stack.
    fn assign(&mut self, target: &Expr, value: &Expr, span: Span) {
        match target {
            Expr::Ident(name, span) => {
                self.expr(value);
                self.set_variable(name, *span);
            }
            Expr::Index { expr, index, .. } => {
                self.expr(expr);
                self.expr(index);
                self.expr(value);
                self.emit_op(OpCode::SetIndex);
            }
            Expr::Dot { expr, name, span } => {
                self.expr(expr);
                self.expr(value);
                let index = self.name_constant(name, *span);
                self.emit_op_u16(OpCode::SetMember, index);
            }
            _ => self.error(span, "invalid assignment target"),
        }
    }

    /// `target op= value`, evaluating the target's container once.
    fn compound_assign(&mut self, op: BinaryOp, target: &Expr, value: &Expr, span: Span) {
        let opcode = binary_opcode(op);
        match target {
            Expr::Ident(name, span) => {
                self.get_variable(name, *span);
                self.expr(value);
                self.emit_op(opcode);
                self.set_variable(name, *span);
            }
            Expr::Index { expr, index, .. } => {
                self.expr(expr);
                self.expr(index);
                self.emit_op(OpCode::Dup2);
                self.emit_op(OpCode::GetIndex);
                self.expr(value);
                self.emit_op(opcode);
                self.emit_op(OpCode::SetIndex);
            }
            Expr::Dot { expr, name, span } => {
                let index = self.name_constant(name, *span);
                self.expr(expr);
                self.emit_op(OpCode::Dup);
                self.emit_op_u16(OpCode::GetMember, index);
                self.expr(value);
                self.emit_op(opcode);
                self.emit_op_u16(OpCode::SetMember, index);
            }
            _ => self.error(span, "invalid assignment target"),
        }
    }

    fn reference(&mut self, target: &Expr, span: Span) {
        match target {
            Expr::Ident(name, span) => match self.resolve(name, *span) {
                Some(Access::Local(slot)) => {
                    // The referenced slot lives on as an upvalue.
                    self.current().locals[slot as usize].captured = true;
                    self.emit_op_u8(OpCode::RefLocal, slot);
                }
                Some(Access::Upvalue(index)) => self.emit_op_u8(OpCode::RefUpvalue, index),
                Some(Access::Global(slot)) => self.emit_op_u16(OpCode::RefGlobal, slot),
                None => self.error(*span, format!("undefined variable '{name}'")),
            },
            Expr::Index { expr, index, .. } => {
                self.expr(expr);
                self.expr(index);
                self.emit_op(OpCode::RefIndex);
            }
            _ => self.error(span, "'ref' expects a variable or an element"),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{
        chunk::{Function, OpCode},
        compile::Compiler,
        lex::tokenize,
        parse::parse,
    };

    fn ops(source: &str) -> Vec<OpCode> {
        let (tokens, _) = tokenize(source);
        let root = parse(tokens, source).unwrap();
        let function: Function = Compiler::new().compile(&root).unwrap();
        let code = &function.chunk.code;

        let mut ops = Vec::new();
        let mut offset = 0;
        while offset < code.len() {
            let op = OpCode::try_from(code[offset]).unwrap();
            offset += 1 + op.operand_size();
            ops.push(op);
        }
        ops
    }

    #[test]
    fn test_short_circuit_and() {
        use OpCode::*;
        assert_eq!(
            ops("let a; let b; a && b;"),
            vec![
                Null, DefineGlobal, Null, DefineGlobal,
                GetGlobal, JumpIfFalse, Pop, GetGlobal, Pop, Return,
            ]
        );
    }

    #[test]
    fn test_compound_index_assignment() {
        use OpCode::*;
        assert_eq!(
            ops("let a = [1]; a[0] += 2;"),
            vec![
                Constant, Array, DefineGlobal,
                GetGlobal, Constant, Dup2, GetIndex, Constant, Add, SetIndex, Pop, Return,
            ]
        );
    }

    #[test]
    fn test_postfix_leaves_previous_value() {
        use OpCode::*;
        assert_eq!(
            ops("let i = 0; i++;"),
            vec![Constant, DefineGlobal, GetGlobal, Dup, Inc, SetGlobal, Pop, Pop, Return]
        );
    }

    #[test]
    fn test_base_reads_receiver() {
        let ops = ops("class A { fn f() { return base.g; } }");
        assert!(ops.contains(&OpCode::Class));
        assert!(ops.contains(&OpCode::Decl));
    }
}
