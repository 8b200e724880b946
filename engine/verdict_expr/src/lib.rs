//! Verdict Expr - expression arena, typed nodes and evaluation.
//!
//! The heart of the engine: a flat arena of tagged expression nodes,
//! the runtime value model, the evaluation context with its NaN
//! discipline, and the lazy filter machinery. Operator registration
//! lives one layer up in `verdict_grammar`; this crate only knows how
//! to hold and run the nodes the grammar instantiates.

mod arena;
mod context;
mod display;
pub mod element;
mod eval;
mod expr;
mod filter;
mod value;

pub use arena::{ExprArena, ExprId};
pub use context::{Context, FactHolder, FactValue};
pub use display::display;
pub use element::Element;
pub use eval::{check_out_type, evaluate, EvalCx};
pub use expr::{
    binary_fn, unary_fn, ArrowExpr, BinaryExpr, BinaryFn, BinaryStyle, ChoiceExpr, ConstExpr,
    Expr, FactExpr, FactKind, LogicExpr, MemoExpr, UnaryExpr, UnaryFn, UnaryStyle,
};
pub use filter::{BaseSeq, FilterValue, HostIterFn};
pub use value::{
    expect_bool, expect_double, expect_int, ObjRef, ObjValue, OwnedValue, StrRef, Value,
};

// Re-exported for the `fact_object!` macro and downstream crates.
pub use verdict_ir::{FormulaError, FormulaResult, TypeId, TypeRegistry};
