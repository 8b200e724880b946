//! Canonical printed forms.
//!
//! The printed form is pure and deterministic; two nodes printing the
//! same are semantically equivalent under the same grammar, which is
//! what the factorizer's common-subexpression map relies on. Every
//! form re-parses to an equivalent tree.

use crate::arena::{ExprArena, ExprId};
use crate::expr::{BinaryStyle, Expr, UnaryStyle};

/// Printed form of the subtree rooted at `id`.
pub fn display(arena: &ExprArena, id: ExprId) -> String {
    let mut out = String::new();
    write_expr(arena, id, &mut out);
    out
}

fn write_expr(arena: &ExprArena, id: ExprId, out: &mut String) {
    match arena.expr(id) {
        Expr::Const(c) => match &c.display {
            Some(original) => out.push_str(original),
            None => out.push_str(&c.value.literal()),
        },
        Expr::Fact(f) => {
            out.push('$');
            out.push_str(&f.name);
        }
        Expr::Unary(u) => match u.style {
            UnaryStyle::Prefix => {
                out.push_str(&u.symbol);
                out.push('(');
                write_expr(arena, u.child, out);
                out.push(')');
            }
            UnaryStyle::Attribute => {
                write_expr(arena, u.child, out);
                out.push('.');
                out.push_str(&u.symbol);
            }
        },
        Expr::Binary(b) => match b.style {
            BinaryStyle::Infix => {
                out.push('(');
                write_expr(arena, b.lhs, out);
                out.push(')');
                out.push_str(&b.symbol);
                out.push('(');
                write_expr(arena, b.rhs, out);
                out.push(')');
            }
            BinaryStyle::Spaced => {
                out.push('(');
                write_expr(arena, b.lhs, out);
                out.push_str(") ");
                out.push_str(&b.symbol);
                out.push_str(" (");
                write_expr(arena, b.rhs, out);
                out.push(')');
            }
            BinaryStyle::Index => {
                out.push('(');
                write_expr(arena, b.lhs, out);
                out.push_str(")[");
                write_expr(arena, b.rhs, out);
                out.push(']');
            }
        },
        Expr::And(l) => {
            out.push('(');
            write_expr(arena, l.lhs, out);
            out.push_str(")&&(");
            write_expr(arena, l.rhs, out);
            out.push(')');
        }
        Expr::Or(l) => {
            out.push('(');
            write_expr(arena, l.lhs, out);
            out.push_str(")||(");
            write_expr(arena, l.rhs, out);
            out.push(')');
        }
        Expr::Choice(c) => {
            out.push('(');
            write_expr(arena, c.cond, out);
            out.push_str(") ? (");
            write_expr(arena, c.then, out);
            out.push_str(") : (");
            write_expr(arena, c.otherwise, out);
            out.push(')');
        }
        Expr::Arrow(a) => {
            out.push_str("((");
            write_expr(arena, a.container, out);
            out.push_str(") -> ");
            out.push_str(&a.binding);
            out.push_str(" ? (");
            write_expr(arena, a.predicate, out);
            out.push_str("))");
        }
        // The wrapper is an evaluation detail; it prints as its child.
        Expr::Memo(m) => write_expr(arena, m.child, out),
    }
}
