//! The typed expression tree.
//!
//! One tagged enum covers every node shape. The structural nodes
//! (constants, facts, choice, arrow, memo) are first-class variants
//! the evaluator knows; everything an operator registration can
//! produce — arithmetic, relations, casts, attributes, `count`,
//! `in`, indexing — is a [`UnaryExpr`] or [`BinaryExpr`] carrying a
//! functor closure, so the operator set stays open while the node
//! shapes stay closed.

use std::rc::Rc;

use verdict_ir::{FormulaResult, TypeId};

use crate::arena::{ExprArena, ExprId};
use crate::eval::EvalCx;
use crate::filter::HostIterFn;
use crate::value::{OwnedValue, Value};

/// Functor of a unary node.
pub type UnaryFn =
    Rc<dyn for<'a, 'c> Fn(&mut EvalCx<'a, 'c>, Value<'a>) -> FormulaResult<Value<'a>>>;

/// Functor of a binary node.
pub type BinaryFn = Rc<
    dyn for<'a, 'c> Fn(&mut EvalCx<'a, 'c>, Value<'a>, Value<'a>) -> FormulaResult<Value<'a>>,
>;

/// Build a [`UnaryFn`], guiding closure inference to the
/// higher-ranked signature.
pub fn unary_fn<F>(f: F) -> UnaryFn
where
    F: for<'a, 'c> Fn(&mut EvalCx<'a, 'c>, Value<'a>) -> FormulaResult<Value<'a>> + 'static,
{
    Rc::new(f)
}

/// Build a [`BinaryFn`].
pub fn binary_fn<F>(f: F) -> BinaryFn
where
    F: for<'a, 'c> Fn(&mut EvalCx<'a, 'c>, Value<'a>, Value<'a>) -> FormulaResult<Value<'a>>
        + 'static,
{
    Rc::new(f)
}

/// Printed form of a unary node.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryStyle {
    /// `sym(child)` — negation, `!`, casts.
    Prefix,
    /// `child.sym` — attributes, `count`, `empty`.
    Attribute,
}

/// Printed form of a binary node.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryStyle {
    /// `(lhs)sym(rhs)`
    Infix,
    /// `(lhs) sym (rhs)` — containment.
    Spaced,
    /// `(lhs)[rhs]`
    Index,
}

/// How a fact node reacts to an unbound name: grammar-registered
/// facts are structural, arrow-locals are recoverable.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FactKind {
    Grammar,
    Local,
}

pub struct ConstExpr {
    pub value: OwnedValue,
    /// Folded constants keep the printed form of the expression they
    /// replaced.
    pub display: Option<Rc<str>>,
}

pub struct FactExpr {
    pub name: Rc<str>,
    pub out: TypeId,
    pub kind: FactKind,
    /// Context cache slot for the resolved holder handle.
    pub slot: u32,
    pub cost: u32,
}

pub struct UnaryExpr {
    pub child: ExprId,
    pub symbol: Rc<str>,
    pub out: TypeId,
    pub style: UnaryStyle,
    pub cost: u32,
    pub op: UnaryFn,
}

pub struct BinaryExpr {
    pub lhs: ExprId,
    pub rhs: ExprId,
    pub symbol: Rc<str>,
    pub out: TypeId,
    pub style: BinaryStyle,
    pub cost: u32,
    pub op: BinaryFn,
}

/// Short-circuit logical pair; the evaluator owns the semantics.
pub struct LogicExpr {
    pub lhs: ExprId,
    pub rhs: ExprId,
}

pub struct ChoiceExpr {
    pub cond: ExprId,
    pub then: ExprId,
    pub otherwise: ExprId,
    pub out: TypeId,
}

pub struct ArrowExpr {
    pub container: ExprId,
    pub predicate: ExprId,
    pub binding: Rc<str>,
    pub elem_type: TypeId,
    /// The filter type id this arrow produces.
    pub out: TypeId,
    /// Iteration over a host container; `None` when the container is
    /// itself a filter.
    pub base: Option<HostIterFn>,
}

pub struct MemoExpr {
    pub child: ExprId,
    /// Resolver of the controlling fact; its value supplies the key.
    pub fact: ExprId,
    /// Context cache slot for the memo entries.
    pub slot: u32,
    pub out: TypeId,
    pub cost: u32,
}

pub enum Expr {
    Const(ConstExpr),
    Fact(FactExpr),
    Unary(UnaryExpr),
    Binary(BinaryExpr),
    And(LogicExpr),
    Or(LogicExpr),
    Choice(ChoiceExpr),
    Arrow(ArrowExpr),
    Memo(MemoExpr),
}

impl Expr {
    /// Declared output type of this node.
    pub fn out_type(&self) -> TypeId {
        match self {
            Expr::Const(c) => c.value.type_id(),
            Expr::Fact(f) => f.out,
            Expr::Unary(u) => u.out,
            Expr::Binary(b) => b.out,
            Expr::And(_) | Expr::Or(_) => TypeId::BOOL,
            Expr::Choice(c) => c.out,
            Expr::Arrow(a) => a.out,
            Expr::Memo(m) => m.out,
        }
    }

    /// Unitary complexity: the node's own cost, excluding children.
    pub fn cost(&self) -> u32 {
        match self {
            Expr::Const(_) => 1,
            Expr::Fact(f) => f.cost,
            Expr::Unary(u) => u.cost,
            Expr::Binary(b) => b.cost,
            Expr::And(_) | Expr::Or(_) => 1,
            Expr::Choice(_) => 1,
            Expr::Arrow(_) => 20,
            Expr::Memo(m) => m.cost,
        }
    }
}

impl ExprArena {
    pub fn const_expr(&mut self, value: OwnedValue) -> ExprId {
        self.alloc(Expr::Const(ConstExpr {
            value,
            display: None,
        }))
    }

    /// Constant that keeps the printed form of a folded expression.
    pub fn const_with_display(&mut self, value: OwnedValue, display: Rc<str>) -> ExprId {
        self.alloc(Expr::Const(ConstExpr {
            value,
            display: Some(display),
        }))
    }

    pub fn fact_expr(&mut self, name: Rc<str>, out: TypeId, kind: FactKind, cost: u32) -> ExprId {
        let slot = self.next_fact_slot();
        self.alloc(Expr::Fact(FactExpr {
            name,
            out,
            kind,
            slot,
            cost,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn unary_expr(
        &mut self,
        child: ExprId,
        symbol: Rc<str>,
        out: TypeId,
        style: UnaryStyle,
        cost: u32,
        op: UnaryFn,
    ) -> ExprId {
        self.alloc(Expr::Unary(UnaryExpr {
            child,
            symbol,
            out,
            style,
            cost,
            op,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn binary_expr(
        &mut self,
        lhs: ExprId,
        rhs: ExprId,
        symbol: Rc<str>,
        out: TypeId,
        style: BinaryStyle,
        cost: u32,
        op: BinaryFn,
    ) -> ExprId {
        self.alloc(Expr::Binary(BinaryExpr {
            lhs,
            rhs,
            symbol,
            out,
            style,
            cost,
            op,
        }))
    }

    pub fn and_expr(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.alloc(Expr::And(LogicExpr { lhs, rhs }))
    }

    pub fn or_expr(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.alloc(Expr::Or(LogicExpr { lhs, rhs }))
    }

    /// Unchecked choice constructor; `ParseDriver::on_choice` performs
    /// the condition/branch type verification.
    pub fn choice_expr(
        &mut self,
        cond: ExprId,
        then: ExprId,
        otherwise: ExprId,
        out: TypeId,
    ) -> ExprId {
        self.alloc(Expr::Choice(ChoiceExpr {
            cond,
            then,
            otherwise,
            out,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn arrow_expr(
        &mut self,
        container: ExprId,
        predicate: ExprId,
        binding: Rc<str>,
        elem_type: TypeId,
        out: TypeId,
        base: Option<HostIterFn>,
    ) -> ExprId {
        self.alloc(Expr::Arrow(ArrowExpr {
            container,
            predicate,
            binding,
            elem_type,
            out,
            base,
        }))
    }

    /// Memoizing wrapper inserted by the factorizer.
    pub fn memo_expr(&mut self, child: ExprId, fact: ExprId, out: TypeId, cost: u32) -> ExprId {
        let slot = self.next_memo_slot();
        self.alloc(Expr::Memo(MemoExpr {
            child,
            fact,
            slot,
            out,
            cost,
        }))
    }

    /// Unitary complexity of a node.
    #[inline]
    pub fn cost(&self, id: ExprId) -> u32 {
        self.expr(id).cost()
    }

    /// Declared output type of a node.
    #[inline]
    pub fn out_type(&self, id: ExprId) -> TypeId {
        self.expr(id).out_type()
    }
}
