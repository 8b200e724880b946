//! Tree-walking evaluation.
//!
//! [`EvalCx`] bundles the compiled arena with the evaluating context;
//! operator functors receive it so collection operators can drive
//! filters lazily. Sub-expressions evaluate left-to-right; AND,
//! choice and the right side of OR are short-circuited as specified.

use std::rc::Rc;

use tracing::trace;

use verdict_ir::{FormulaError, FormulaResult, TypeId};

use crate::arena::{ExprArena, ExprId};
use crate::context::Context;
use crate::display::display;
use crate::expr::{ArrowExpr, Expr, FactKind, LogicExpr, MemoExpr};
use crate::filter::{BaseSeq, FilterValue};
use crate::value::{expect_bool, ObjRef, Value};

/// Evaluation state: the compiled tree plus the live context.
pub struct EvalCx<'a, 'c> {
    pub arena: &'a ExprArena,
    pub ctx: &'c mut Context<'a>,
}

/// Evaluate the subtree rooted at `root`.
pub fn evaluate<'a>(
    arena: &'a ExprArena,
    root: ExprId,
    ctx: &mut Context<'a>,
) -> FormulaResult<Value<'a>> {
    EvalCx::new(arena, ctx).eval(root)
}

impl<'a, 'c> EvalCx<'a, 'c> {
    pub fn new(arena: &'a ExprArena, ctx: &'c mut Context<'a>) -> Self {
        EvalCx { arena, ctx }
    }

    pub fn eval(&mut self, id: ExprId) -> FormulaResult<Value<'a>> {
        let arena = self.arena;
        match arena.expr(id) {
            Expr::Const(c) => Ok(c.value.as_value()),
            Expr::Fact(f) => {
                match self.ctx.fact_holder(arena.arena_id(), f.slot, &f.name) {
                    Some(holder) => Ok(holder.get().as_value()),
                    None => match f.kind {
                        FactKind::Grammar => Err(FormulaError::MissingFact(f.name.to_string())),
                        FactKind::Local => Err(FormulaError::ValueMissing(f.name.to_string())),
                    },
                }
            }
            Expr::Unary(u) => {
                let child = self.eval(u.child)?;
                (*u.op)(self, child)
            }
            Expr::Binary(b) => {
                let lhs = self.eval(b.lhs)?;
                let rhs = self.eval(b.rhs)?;
                (*b.op)(self, lhs, rhs)
            }
            Expr::And(l) => self.eval_and(l),
            Expr::Or(l) => self.eval_or(l),
            Expr::Choice(c) => {
                if expect_bool(&self.eval(c.cond)?)? {
                    self.eval(c.then)
                } else {
                    self.eval(c.otherwise)
                }
            }
            Expr::Arrow(a) => self.eval_arrow(a),
            Expr::Memo(m) => self.eval_memo(m),
        }
    }

    /// Short-circuit AND. NaN and errors from either side propagate.
    fn eval_and(&mut self, l: &LogicExpr) -> FormulaResult<Value<'a>> {
        if !expect_bool(&self.eval(l.lhs)?)? {
            return Ok(Value::Bool(false));
        }
        Ok(Value::Bool(expect_bool(&self.eval(l.rhs)?)?))
    }

    /// Short-circuit OR with missing-value recovery: a left operand
    /// that raises a missing value or flags NaN counts as `false` and
    /// the NaN flag is cleared, so one missing side does not poison
    /// the whole disjunction. The right operand's NaN stands.
    fn eval_or(&mut self, l: &LogicExpr) -> FormulaResult<Value<'a>> {
        if self.ctx.is_nan() {
            return Ok(Value::Bool(false));
        }
        let mut left = match self.eval(l.lhs) {
            Ok(value) => expect_bool(&value)?,
            Err(err) if err.is_recoverable() => false,
            Err(err) => return Err(err),
        };
        if self.ctx.is_nan() {
            self.ctx.clear_nan();
            left = false;
        }
        if left {
            return Ok(Value::Bool(true));
        }
        Ok(Value::Bool(expect_bool(&self.eval(l.rhs)?)?))
    }

    /// Build the lazy filtered view; nothing is evaluated beyond the
    /// container expression.
    fn eval_arrow(&mut self, a: &ArrowExpr) -> FormulaResult<Value<'a>> {
        let container = self.eval(a.container)?;
        let base = match container {
            Value::Obj(o) => {
                let any = match o.obj {
                    ObjRef::Borrowed(any) => any,
                    ObjRef::Shared(_) => {
                        return Err(FormulaError::Internal(
                            "cannot filter an object created during evaluation".to_string(),
                        ))
                    }
                };
                let iter = a.base.clone().ok_or_else(|| {
                    FormulaError::Internal("container filter lacks an iterator".to_string())
                })?;
                BaseSeq::Host { any, iter }
            }
            Value::Filter(inner) => BaseSeq::Nested(inner),
            other => {
                return Err(FormulaError::Internal(format!(
                    "arrow applied to a non-container of type {}",
                    other.type_id().label()
                )))
            }
        };
        Ok(Value::Filter(Rc::new(FilterValue {
            type_id: a.out,
            elem_type: a.elem_type,
            base,
            predicate: a.predicate,
            binding: a.binding.clone(),
        })))
    }

    /// Memoized wrapper: key on the controlling fact's value address
    /// or bit pattern; replay restores the NaN outcome. Any trouble
    /// producing the key falls back to plain child evaluation.
    fn eval_memo(&mut self, m: &MemoExpr) -> FormulaResult<Value<'a>> {
        if self.ctx.is_nan() {
            return self.eval(m.child);
        }
        let key = match self.eval(m.fact) {
            Ok(value) => {
                if self.ctx.is_nan() {
                    self.ctx.clear_nan();
                    None
                } else {
                    value.memo_key()
                }
            }
            Err(_) => None,
        };
        let Some(key) = key else {
            return self.eval(m.child);
        };
        let arena_id = self.arena.arena_id();
        if let Some((value, nan)) = self.ctx.memo_get(arena_id, m.slot, key) {
            trace!(slot = m.slot, "memoized result replayed");
            if nan {
                self.ctx.set_nan();
            }
            return Ok(value);
        }
        let value = self.eval(m.child)?;
        let nan = self.ctx.is_nan();
        self.ctx.memo_put(arena_id, m.slot, key, value.clone(), nan);
        Ok(value)
    }
}

/// Verify a node's declared type before a typed evaluation, failing
/// with the printed form and both type labels.
pub fn check_out_type(arena: &ExprArena, id: ExprId, expected: TypeId) -> FormulaResult<()> {
    let actual = arena.out_type(id);
    if actual == expected {
        Ok(())
    } else {
        Err(FormulaError::TypeMismatch {
            expr: display(arena, id),
            expected: expected.label(),
            actual: actual.label(),
        })
    }
}
